//! Preview rendering: asinh stretches, Lupton color composites and markers

use crate::error::{Result, ScopeError};
use crate::fits::ImagePlane;
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_line_segment_mut, draw_text_mut};
use std::path::Path;

/// Softening of the single-frame asinh stretch
pub const ASINH_A: f32 = 0.01;

/// Lupton composite parameters
pub const LUPTON_Q: f32 = 5.0;
pub const LUPTON_STRETCH: f32 = 200.0;
/// Multipliers applied to the B, R, V layers
pub const LAYER_MULTS: [f32; 3] = [0.95, 1.0, 1.0];
/// Extra red attenuation applied inside the composite
pub const RED_SCALE: f32 = 0.9;

/// Variable-star marker color
pub const VAR_STAR_COLOR: Rgb<u8> = Rgb([255, 127, 14]);
/// Comparison-star marker color
pub const COMP_STAR_COLOR: Rgb<u8> = Rgb([44, 160, 44]);

/// Min-max normalize then apply `asinh(x/a) / asinh(1/a)`
pub fn asinh_stretch(data: &[f32], a: f32) -> Vec<f32> {
    let (lo, hi) = data
        .iter()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = hi - lo;
    let norm = (1.0 / a).asinh();

    data.iter()
        .map(|&v| {
            if !v.is_finite() || range <= 0.0 {
                return 0.0;
            }
            let x = ((v - lo) / range).clamp(0.0, 1.0);
            (x / a).asinh() / norm
        })
        .collect()
}

fn median_of(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n == 0 {
        0.0
    } else if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Median after iterative `sigma` clipping around the median
pub fn sigma_clipped_median(data: &[f32], sigma: f32, max_iters: usize) -> f32 {
    let mut kept: Vec<f32> = data.iter().copied().filter(|v| v.is_finite()).collect();

    for _ in 0..max_iters {
        if kept.is_empty() {
            break;
        }
        let median = median_of(&mut kept);
        let mean = kept.iter().sum::<f32>() / kept.len() as f32;
        let std = (kept.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / kept.len() as f32).sqrt();

        let before = kept.len();
        kept.retain(|v| (v - median).abs() <= sigma * std);
        if kept.len() == before {
            break;
        }
    }

    median_of(&mut kept)
}

/// Lupton et al. (2004) asinh color mapping to 8-bit RGB.
///
/// `minimum` is subtracted per channel before the shared intensity is formed.
pub fn lupton_rgb(r: &[f32], g: &[f32], b: &[f32], minimum: [f32; 3], q: f32, stretch: f32) -> Vec<[u8; 3]> {
    const FRAC: f32 = 0.1;
    const PIXMAX: f32 = 255.0;
    let slope = FRAC * PIXMAX / (FRAC * q).asinh();
    let soften = q / stretch;

    r.iter()
        .zip(g)
        .zip(b)
        .map(|((&r, &g), &b)| {
            let mut c = [r - minimum[0], g - minimum[1], b - minimum[2]];
            let intensity = (c[0] + c[1] + c[2]) / 3.0;
            let fac = if intensity <= 0.0 || !intensity.is_finite() {
                0.0
            } else {
                (intensity * soften).asinh() * slope / intensity
            };
            for v in c.iter_mut() {
                *v = (*v * fac).max(0.0);
            }
            let top = c[0].max(c[1]).max(c[2]);
            if top >= PIXMAX {
                for v in c.iter_mut() {
                    *v *= PIXMAX / top;
                }
            }
            c.map(|v| v.clamp(0.0, PIXMAX).round() as u8)
        })
        .collect()
}

/// Paint rows bottom-up so that north (FITS row 0 at the bottom) stays up
fn to_image(width: usize, height: usize, pixel: impl Fn(usize) -> [u8; 3]) -> RgbImage {
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let row = height - 1 - y as usize;
        Rgb(pixel(row * width + x as usize))
    })
}

/// Single frame with the asinh stretch
pub fn grayscale_image(plane: &ImagePlane) -> RgbImage {
    let stretched = asinh_stretch(&plane.pixels, ASINH_A);
    to_image(plane.width, plane.height, |i| {
        let v = (stretched[i] * 255.0).round() as u8;
        [v, v, v]
    })
}

/// Three filter frames as a Lupton composite. Layers are ordered by filter
/// name (B, R, V) and map to blue, red and green.
pub fn make_color_image(layers: &[(&str, &ImagePlane)]) -> Result<RgbImage> {
    if layers.len() != 3 {
        return Err(ScopeError::Internal(format!("color image needs 3 layers, got {}", layers.len())));
    }
    let (w, h) = (layers[0].1.width, layers[0].1.height);
    if layers.iter().any(|(_, p)| p.width != w || p.height != h) {
        return Err(ScopeError::Internal("color layers differ in size".to_string()));
    }

    let mut order: Vec<usize> = (0..3).collect();
    order.sort_by(|&a, &b| layers[a].0.cmp(layers[b].0));

    let scaled = |slot: usize| -> Vec<f32> {
        let plane = layers[order[slot]].1;
        plane.pixels.iter().map(|v| v * LAYER_MULTS[slot]).collect()
    };
    let (b, r, g) = (scaled(0), scaled(1), scaled(2));

    let minimum = [
        sigma_clipped_median(&r, 3.0, 5),
        sigma_clipped_median(&g, 3.0, 5),
        sigma_clipped_median(&b, 3.0, 5),
    ];
    let red: Vec<f32> = r.iter().map(|v| v * RED_SCALE).collect();
    let rgb = lupton_rgb(&red, &g, &b, minimum, LUPTON_Q, LUPTON_STRETCH);

    Ok(to_image(w, h, |i| rgb[i]))
}

/// A marker in FITS pixel coordinates (0-indexed, y up)
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub x: f64,
    pub y: f64,
    pub color: Rgb<u8>,
    pub label: Option<String>,
}

/// Font and size for marker labels
pub struct LabelStyle {
    font: FontVec,
    scale: PxScale,
}

impl LabelStyle {
    /// Read a TrueType/OpenType font; `None` (with a warning) when it is
    /// missing or unreadable, so previews still render without labels
    pub fn load(path: &Path, px: f32) -> Option<Self> {
        let font = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| FontVec::try_from_vec(bytes).map_err(|e| e.to_string()));
        match font {
            Ok(font) => Some(Self {
                font,
                scale: PxScale::from(px),
            }),
            Err(e) => {
                tracing::warn!("No label font {} ({}), drawing bare markers", path.display(), e);
                None
            }
        }
    }

    /// Text with its top-left corner at image pixel `(x, y)`
    pub fn draw(&self, img: &mut RgbImage, text: &str, x: i32, y: i32, color: Rgb<u8>) {
        draw_text_mut(img, color, x, y, self.scale, &self.font, text);
    }
}

/// Draw open-centred crosshairs, `size` pixels across, with their labels to
/// the right when a label style is given
pub fn draw_markers(img: &mut RgbImage, markers: &[Marker], size: f32, labels: Option<&LabelStyle>) {
    let height = img.height() as f32;
    let outer = size / 2.0;
    let inner = size * 0.2;

    for m in markers {
        let cx = m.x as f32;
        let cy = height - 1.0 - m.y as f32;
        for (dx, dy) in [(1.0, 0.0), (-1.0, 0.0), (0.0, 1.0), (0.0, -1.0)] {
            draw_line_segment_mut(
                img,
                (cx + dx * inner, cy + dy * inner),
                (cx + dx * outer, cy + dy * outer),
                m.color,
            );
        }
        if let (Some(style), Some(text)) = (labels, &m.label) {
            let x = (cx + outer + 2.0).round() as i32;
            let y = (cy - style.scale.y / 2.0).round() as i32;
            style.draw(img, text, x, y, m.color);
        }
    }
}

pub fn save_png(img: &RgbImage, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    img.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}
