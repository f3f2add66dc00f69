//! TAN-projection WCS read from a solved frame header

use crate::coords::SkyPosition;
use crate::error::{Result, ScopeError};
use crate::fits::FitsHeader;
use serde::{Deserialize, Serialize};

/// World Coordinate System of a plate-solved image.
///
/// Reference pixel is stored 0-indexed; FITS headers carry it 1-indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wcs {
    pub crpix1: f64,
    pub crpix2: f64,
    pub crval1: f64,
    pub crval2: f64,
    pub cd1_1: f64,
    pub cd1_2: f64,
    pub cd2_1: f64,
    pub cd2_2: f64,
    pub width: usize,
    pub height: usize,
}

/// RA/Dec box of an image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyExtent {
    pub center: SkyPosition,
    /// Width along RA and height along Dec, degrees
    pub width_deg: f64,
    pub height_deg: f64,
}

/// Unwrap `ra` next to `reference` so that differences stay within ±180°
fn unwrap_ra(ra: f64, reference: f64) -> f64 {
    let mut d = ra - reference;
    while d > 180.0 {
        d -= 360.0;
    }
    while d < -180.0 {
        d += 360.0;
    }
    reference + d
}

impl Wcs {
    /// Build from header keywords. The CD matrix is preferred; CDELT/CROTA2
    /// is used when it is absent. Image size comes from IMAGEW/IMAGEH (as
    /// written by solve-field) or NAXIS1/NAXIS2.
    pub fn from_header(header: &FitsHeader) -> Result<Self> {
        let need = |key: &str| {
            header
                .get_f64(key)
                .ok_or_else(|| ScopeError::Solver(format!("WCS header without {key}")))
        };

        let crpix1 = need("CRPIX1")? - 1.0;
        let crpix2 = need("CRPIX2")? - 1.0;
        let crval1 = need("CRVAL1")?;
        let crval2 = need("CRVAL2")?;

        let (cd1_1, cd1_2, cd2_1, cd2_2) = match (
            header.get_f64("CD1_1"),
            header.get_f64("CD1_2"),
            header.get_f64("CD2_1"),
            header.get_f64("CD2_2"),
        ) {
            (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
            _ => {
                let cdelt1 = need("CDELT1")?;
                let cdelt2 = need("CDELT2")?;
                let rot = header.get_f64("CROTA2").unwrap_or(0.0).to_radians();
                (
                    cdelt1 * rot.cos(),
                    -cdelt2 * rot.sin(),
                    cdelt1 * rot.sin(),
                    cdelt2 * rot.cos(),
                )
            }
        };

        let size = |a: &str, b: &str| {
            header
                .get_f64(a)
                .or_else(|| header.get_f64(b))
                .map(|v| v as usize)
                .ok_or_else(|| ScopeError::Solver(format!("WCS header without {a}/{b}")))
        };
        let width = size("IMAGEW", "NAXIS1")?;
        let height = size("IMAGEH", "NAXIS2")?;

        let wcs = Self {
            crpix1,
            crpix2,
            crval1,
            crval2,
            cd1_1,
            cd1_2,
            cd2_1,
            cd2_2,
            width,
            height,
        };
        if wcs.determinant().abs() < 1e-15 {
            return Err(ScopeError::Solver("singular CD matrix".to_string()));
        }
        Ok(wcs)
    }

    fn determinant(&self) -> f64 {
        self.cd1_1 * self.cd2_2 - self.cd1_2 * self.cd2_1
    }

    /// Pixel (0-indexed) to sky, degrees
    pub fn pixel_to_sky(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.crpix1;
        let dy = y - self.crpix2;

        let xi = (self.cd1_1 * dx + self.cd1_2 * dy).to_radians();
        let eta = (self.cd2_1 * dx + self.cd2_2 * dy).to_radians();
        let ra0 = self.crval1.to_radians();
        let dec0 = self.crval2.to_radians();

        let rho = (xi * xi + eta * eta).sqrt();
        if rho < 1e-12 {
            return (self.crval1.rem_euclid(360.0), self.crval2);
        }

        let c = rho.atan();
        let (sin_c, cos_c) = c.sin_cos();
        let dec = (cos_c * dec0.sin() + eta * sin_c * dec0.cos() / rho).asin();
        let ra = ra0 + (xi * sin_c).atan2(rho * dec0.cos() * cos_c - eta * dec0.sin() * sin_c);

        (ra.to_degrees().rem_euclid(360.0), dec.to_degrees())
    }

    /// Sky to pixel (0-indexed); `None` for points on the far hemisphere
    pub fn sky_to_pixel(&self, ra: f64, dec: f64) -> Option<(f64, f64)> {
        let (ra, dec) = (ra.to_radians(), dec.to_radians());
        let ra0 = self.crval1.to_radians();
        let dec0 = self.crval2.to_radians();

        let (sin_dec, cos_dec) = dec.sin_cos();
        let (sin_dec0, cos_dec0) = dec0.sin_cos();
        let (sin_dra, cos_dra) = (ra - ra0).sin_cos();

        let denom = sin_dec * sin_dec0 + cos_dec * cos_dec0 * cos_dra;
        if denom <= 0.0 {
            return None;
        }

        let xi = (cos_dec * sin_dra / denom).to_degrees();
        let eta = ((sin_dec * cos_dec0 - cos_dec * sin_dec0 * cos_dra) / denom).to_degrees();

        let det = self.determinant();
        let dx = (self.cd2_2 * xi - self.cd1_2 * eta) / det;
        let dy = (-self.cd2_1 * xi + self.cd1_1 * eta) / det;
        Some((self.crpix1 + dx, self.crpix2 + dy))
    }

    /// Whether a sky position falls on the image
    pub fn contains(&self, pos: &SkyPosition) -> bool {
        match self.sky_to_pixel(pos.ra_deg, pos.dec_deg) {
            Some((x, y)) => {
                x >= -0.5 && y >= -0.5 && x < self.width as f64 - 0.5 && y < self.height as f64 - 0.5
            }
            None => false,
        }
    }

    /// Sky positions of the four corner pixels
    pub fn footprint(&self) -> [(f64, f64); 4] {
        let (w, h) = ((self.width.max(1) - 1) as f64, (self.height.max(1) - 1) as f64);
        [
            self.pixel_to_sky(0.0, 0.0),
            self.pixel_to_sky(0.0, h),
            self.pixel_to_sky(w, h),
            self.pixel_to_sky(w, 0.0),
        ]
    }

    /// Mean of the footprint corners and their RA/Dec spans
    pub fn extent(&self) -> SkyExtent {
        let corners = self.footprint();
        let reference = corners[0].0;
        let ras: Vec<f64> = corners.iter().map(|(ra, _)| unwrap_ra(*ra, reference)).collect();
        let decs: Vec<f64> = corners.iter().map(|(_, dec)| *dec).collect();

        let span = |v: &[f64]| {
            let lo = v.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            hi - lo
        };
        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;

        SkyExtent {
            center: SkyPosition {
                ra_deg: mean(&ras).rem_euclid(360.0),
                dec_deg: mean(&decs),
            },
            width_deg: span(&ras),
            height_deg: span(&decs),
        }
    }

    pub fn center(&self) -> SkyPosition {
        self.extent().center
    }

    /// Pixel scale in arcseconds
    pub fn pixel_scale_arcsec(&self) -> f64 {
        let sx = (self.cd1_1 * self.cd1_1 + self.cd2_1 * self.cd2_1).sqrt();
        let sy = (self.cd1_2 * self.cd1_2 + self.cd2_2 * self.cd2_2).sqrt();
        (sx + sy) / 2.0 * 3600.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1"/px, north up, east left, centred at (ra, dec)
    fn simple_wcs(ra: f64, dec: f64) -> Wcs {
        Wcs {
            crpix1: 499.5,
            crpix2: 499.5,
            crval1: ra,
            crval2: dec,
            cd1_1: -1.0 / 3600.0,
            cd1_2: 0.0,
            cd2_1: 0.0,
            cd2_2: 1.0 / 3600.0,
            width: 1000,
            height: 1000,
        }
    }

    #[test]
    fn test_reference_pixel_maps_to_crval() {
        let wcs = simple_wcs(180.0, 45.0);
        let (ra, dec) = wcs.pixel_to_sky(499.5, 499.5);
        assert!((ra - 180.0).abs() < 1e-10);
        assert!((dec - 45.0).abs() < 1e-10);
    }

    #[test]
    fn test_pixel_sky_round_trip() {
        let wcs = simple_wcs(83.8, -5.4);
        for (x, y) in [(0.0, 0.0), (999.0, 0.0), (250.5, 730.25), (999.0, 999.0)] {
            let (ra, dec) = wcs.pixel_to_sky(x, y);
            let (bx, by) = wcs.sky_to_pixel(ra, dec).unwrap();
            assert!((bx - x).abs() < 1e-6, "x {x} -> {bx}");
            assert!((by - y).abs() < 1e-6, "y {y} -> {by}");
        }
    }

    #[test]
    fn test_far_side_has_no_pixel() {
        let wcs = simple_wcs(0.0, 0.0);
        assert!(wcs.sky_to_pixel(180.0, 0.0).is_none());
        assert!(!wcs.contains(&SkyPosition { ra_deg: 180.0, dec_deg: 0.0 }));
        assert!(wcs.contains(&SkyPosition { ra_deg: 0.0, dec_deg: 0.0 }));
    }

    #[test]
    fn test_extent_across_ra_zero() {
        let wcs = simple_wcs(0.05, 10.0);
        let ext = wcs.extent();
        // 1000 px at 1"/px is ~0.2775 deg along Dec; RA span widens by 1/cos(dec)
        assert!((ext.height_deg - 999.0 / 3600.0).abs() < 1e-4);
        assert!(ext.width_deg < 1.0, "wrapped RA span {}", ext.width_deg);
        assert!((ext.center.ra_deg - 0.05).abs() < 1e-3);
        assert!((ext.center.dec_deg - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_from_header_cd_and_cdelt() {
        let mut h = FitsHeader::new();
        for (k, v) in [
            ("CRPIX1", "500.5"),
            ("CRPIX2", "500.5"),
            ("CRVAL1", "120.0"),
            ("CRVAL2", "30.0"),
            ("CD1_1", "-0.0003"),
            ("CD1_2", "0"),
            ("CD2_1", "0"),
            ("CD2_2", "0.0003"),
            ("IMAGEW", "1000"),
            ("IMAGEH", "800"),
        ] {
            h.insert(k, v);
        }
        let wcs = Wcs::from_header(&h).unwrap();
        assert_eq!((wcs.width, wcs.height), (1000, 800));
        assert!((wcs.crpix1 - 499.5).abs() < 1e-12);
        assert!((wcs.pixel_scale_arcsec() - 1.08).abs() < 1e-9);

        let mut h = FitsHeader::new();
        for (k, v) in [
            ("CRPIX1", "1"),
            ("CRPIX2", "1"),
            ("CRVAL1", "10"),
            ("CRVAL2", "0"),
            ("CDELT1", "-0.001"),
            ("CDELT2", "0.001"),
            ("NAXIS1", "10"),
            ("NAXIS2", "10"),
        ] {
            h.insert(k, v);
        }
        let wcs = Wcs::from_header(&h).unwrap();
        assert!((wcs.cd1_1 + 0.001).abs() < 1e-12);
        assert!((wcs.cd2_2 - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_from_header_missing_keys() {
        let h = FitsHeader::new();
        assert!(Wcs::from_header(&h).is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let wcs = simple_wcs(10.0, 20.0);
        let text = serde_json::to_string(&wcs).unwrap();
        let back: Wcs = serde_json::from_str(&text).unwrap();
        assert_eq!(wcs, back);
    }
}
