//! FITS frames as delivered by the telescope
//!
//! Frames arrive as raw bytes (zip members or downloaded cubes). cfitsio only
//! reads from paths, so the bytes pass through a temporary file once and the
//! keywords the pipeline needs are copied into a plain map.

use crate::error::{Result, ScopeError};
use fitsio::hdu::HduInfo;
use fitsio::FitsFile;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Header keywords copied out of every frame
pub const KNOWN_KEYS: &[&str] = &[
    "OBJECT", "TELESCOP", "INSTRUME", "FILTER", "DATE-OBS", "EXPTIME", "EQUINOX",
    "OBJCTRA", "OBJCTDEC", "MNTRA", "MNTDEC", "RA-TEL", "DEC-TEL",
    "NAXIS1", "NAXIS2", "IMAGEW", "IMAGEH",
    "CTYPE1", "CTYPE2", "CRVAL1", "CRVAL2", "CRPIX1", "CRPIX2",
    "CD1_1", "CD1_2", "CD2_1", "CD2_2", "CDELT1", "CDELT2", "CROTA2",
];

/// Header keyword values kept as the text cfitsio reported
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FitsHeader(BTreeMap<String, String>);

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_uppercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.trim().trim_matches('\'').trim())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)?.parse().ok()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl FromIterator<(String, String)> for FitsHeader {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.to_uppercase(), v)).collect())
    }
}

/// One image plane, row-major, row 0 first as stored in the file
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlane {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<f32>,
}

impl ImagePlane {
    pub fn new(width: usize, height: usize, pixels: Vec<f32>) -> Result<Self> {
        if pixels.len() != width * height {
            return Err(ScopeError::Internal(format!(
                "{}x{} plane with {} pixels",
                width,
                height,
                pixels.len()
            )));
        }
        Ok(Self { width, height, pixels })
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.pixels[y * self.width + x]
    }

    /// Drop the last `margin` rows and columns (the readout overscan strip)
    pub fn crop_overscan(&self, margin: usize) -> ImagePlane {
        let width = self.width.saturating_sub(margin);
        let height = self.height.saturating_sub(margin);
        let pixels = self
            .pixels
            .chunks_exact(self.width.max(1))
            .take(height)
            .flat_map(|row| row[..width].iter().copied())
            .collect();
        ImagePlane { width, height, pixels }
    }

    /// Plane sampled at `(x + dx, y + dy)`; pixels shifted in from outside are NaN
    pub fn shifted(&self, dx: i64, dy: i64) -> ImagePlane {
        let (w, h) = (self.width as i64, self.height as i64);
        let pixels = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x + dx, y + dy)))
            .map(|(sx, sy)| {
                if (0..w).contains(&sx) && (0..h).contains(&sy) {
                    self.get(sx as usize, sy as usize)
                } else {
                    f32::NAN
                }
            })
            .collect();
        ImagePlane {
            width: self.width,
            height: self.height,
            pixels,
        }
    }
}

/// Raw FITS file plus the parts of it the pipeline reads
#[derive(Debug, Clone)]
pub struct FitsFrame {
    pub name: String,
    pub bytes: Vec<u8>,
    pub header: FitsHeader,
    pub image: Option<ImagePlane>,
}

impl FitsFrame {
    /// Parse a frame held in memory
    pub fn from_bytes(name: &str, bytes: Vec<u8>) -> Result<Self> {
        let mut tmp = tempfile::Builder::new().suffix(".fits").tempfile()?;
        tmp.write_all(&bytes)?;
        tmp.flush()?;

        let (header, image) = read_fits(tmp.path())?;
        Ok(Self {
            name: name.to_string(),
            bytes,
            header,
            image,
        })
    }

    pub fn from_parts(name: &str, header: FitsHeader, image: Option<ImagePlane>) -> Self {
        Self {
            name: name.to_string(),
            bytes: Vec::new(),
            header,
            image,
        }
    }

    /// Stable key of the frame contents (first 16 hex digits of its SHA-256)
    pub fn content_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        if self.bytes.is_empty() {
            for (k, v) in self.header.iter() {
                hasher.update(k.as_bytes());
                hasher.update(v.as_bytes());
            }
        }
        hex::encode_upper(hasher.finalize())[..16].to_string()
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }

    pub fn filter(&self) -> Option<&str> {
        self.header.get("FILTER")
    }
}

/// Known header keywords of the primary HDU of a file on disk
pub fn read_header(path: &Path) -> Result<FitsHeader> {
    let mut fptr = FitsFile::open(path)?;
    let hdu = fptr.primary_hdu()?;
    Ok(collect_header(&hdu, &mut fptr))
}

fn collect_header(hdu: &fitsio::hdu::FitsHdu, fptr: &mut FitsFile) -> FitsHeader {
    let mut header = FitsHeader::new();
    for key in KNOWN_KEYS {
        if let Ok(text) = hdu.read_key::<String>(fptr, key) {
            header.insert(key, text);
        } else if let Ok(value) = hdu.read_key::<f64>(fptr, key) {
            header.insert(key, value.to_string());
        }
    }
    header
}

fn read_fits(path: &Path) -> Result<(FitsHeader, Option<ImagePlane>)> {
    let mut fptr = FitsFile::open(path)?;
    let hdu = fptr.primary_hdu()?;
    let header = collect_header(&hdu, &mut fptr);

    let shape = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } => shape.clone(),
        _ => return Ok((header, None)),
    };

    // shape is [planes, height, width] or [height, width]
    let (width, height) = match shape.len() {
        2 => (shape[1], shape[0]),
        3 => (shape[2], shape[1]),
        _ => return Ok((header, None)),
    };
    if width == 0 || height == 0 {
        return Ok((header, None));
    }

    let pixels: Vec<f32> = hdu.read_image(&mut fptr)?;
    let plane = pixels.into_iter().take(width * height).collect();
    Ok((header, Some(ImagePlane::new(width, height, plane)?)))
}
