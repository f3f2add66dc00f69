//! Sky coordinates and sexagesimal notation

use crate::error::{Result, ScopeError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Equatorial position, both angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyPosition {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

/// Sexagesimal components of an angle, already rounded to a display precision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sexagesimal {
    pub negative: bool,
    pub units: u32,
    pub minutes: u32,
    pub seconds: f64,
}

impl Sexagesimal {
    /// Split `value` (hours or degrees) so that seconds rounded to `precision`
    /// never display as 60.
    pub fn split(value: f64, precision: usize) -> Self {
        let negative = value < 0.0;
        let scale = 10f64.powi(precision as i32);
        let total = (value.abs() * 3600.0 * scale).round() / scale;

        let units = (total / 3600.0).floor();
        let rest = total - units * 3600.0;
        let minutes = (rest / 60.0).floor();
        let seconds = ((rest - minutes * 60.0) * scale).round() / scale;

        Self {
            negative,
            units: units as u32,
            minutes: minutes as u32,
            seconds,
        }
    }

    pub fn format(&self, sep: &str, precision: usize, always_sign: bool) -> String {
        let sign = if self.negative {
            "-"
        } else if always_sign {
            "+"
        } else {
            ""
        };
        let width = if precision > 0 { precision + 3 } else { 2 };
        format!(
            "{sign}{:02}{sep}{:02}{sep}{:0width$.precision$}",
            self.units,
            self.minutes,
            self.seconds,
            width = width,
            precision = precision
        )
    }
}

/// Parse a sexagesimal or decimal value. Separators may be spaces, colons or
/// unit letters (`12h30m05s`, `-05d12m`).
pub fn parse_sexagesimal(text: &str) -> Result<f64> {
    let cleaned: String = text
        .trim()
        .trim_matches('\'')
        .chars()
        .map(|c| match c {
            ':' | 'h' | 'H' | 'd' | 'D' | 'm' | 'M' | 's' | 'S' | '°' | '\'' | '"' => ' ',
            other => other,
        })
        .collect();

    let fields: Vec<&str> = cleaned.split_whitespace().collect();
    if fields.is_empty() || fields.len() > 3 {
        return Err(ScopeError::Coordinate(text.to_string()));
    }

    let negative = fields[0].starts_with('-');
    let mut value = 0.0;
    for (i, field) in fields.iter().enumerate() {
        let part: f64 = field
            .trim_start_matches(['+', '-'])
            .parse()
            .map_err(|_| ScopeError::Coordinate(text.to_string()))?;
        if i > 0 && !(0.0..60.0).contains(&part) {
            return Err(ScopeError::Coordinate(text.to_string()));
        }
        value += part / 60f64.powi(i as i32);
    }

    Ok(if negative { -value } else { value })
}

impl SkyPosition {
    pub fn new(ra_deg: f64, dec_deg: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&dec_deg) || !ra_deg.is_finite() {
            return Err(ScopeError::Coordinate(format!("{ra_deg} {dec_deg}")));
        }
        Ok(Self {
            ra_deg: ra_deg.rem_euclid(360.0),
            dec_deg,
        })
    }

    /// RA in hours, Dec in degrees, each sexagesimal or decimal
    pub fn from_hours_degrees(ra: &str, dec: &str) -> Result<Self> {
        let ra_hours = parse_sexagesimal(ra)?;
        if !(0.0..24.0).contains(&ra_hours) {
            return Err(ScopeError::Coordinate(ra.to_string()));
        }
        Self::new(ra_hours * 15.0, parse_sexagesimal(dec)?)
    }

    /// Both angles in degrees, each sexagesimal or decimal
    pub fn from_degrees_text(ra: &str, dec: &str) -> Result<Self> {
        Self::new(parse_sexagesimal(ra)?, parse_sexagesimal(dec)?)
    }

    pub fn ra_hours(&self) -> f64 {
        self.ra_deg / 15.0
    }

    pub fn ra_sexagesimal(&self, precision: usize) -> Sexagesimal {
        let mut sx = Sexagesimal::split(self.ra_hours(), precision);
        if sx.units >= 24 {
            sx.units -= 24;
        }
        sx
    }

    pub fn dec_sexagesimal(&self, precision: usize) -> Sexagesimal {
        Sexagesimal::split(self.dec_deg, precision)
    }

    /// RA as zero-padded `HH<sep>MM<sep>SS.ss`
    pub fn format_ra(&self, sep: &str, precision: usize) -> String {
        self.ra_sexagesimal(precision).format(sep, precision, false)
    }

    /// Dec as signed zero-padded `±DD<sep>MM<sep>SS.ss`
    pub fn format_dec(&self, sep: &str, precision: usize) -> String {
        self.dec_sexagesimal(precision).format(sep, precision, true)
    }

    /// Great-circle distance in degrees
    pub fn separation(&self, other: &SkyPosition) -> f64 {
        let (ra1, dec1) = (self.ra_deg.to_radians(), self.dec_deg.to_radians());
        let (ra2, dec2) = (other.ra_deg.to_radians(), other.dec_deg.to_radians());

        let cos_d = dec1.sin() * dec2.sin() + dec1.cos() * dec2.cos() * (ra2 - ra1).cos();
        cos_d.clamp(-1.0, 1.0).acos().to_degrees()
    }
}

impl fmt::Display for SkyPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.format_ra(":", 2), self.format_dec(":", 2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colon_and_space_forms() {
        assert!((parse_sexagesimal("12:30:00").unwrap() - 12.5).abs() < 1e-12);
        assert!((parse_sexagesimal("12 30 00").unwrap() - 12.5).abs() < 1e-12);
        assert!((parse_sexagesimal("12h30m00s").unwrap() - 12.5).abs() < 1e-12);
        assert!((parse_sexagesimal("187.5").unwrap() - 187.5).abs() < 1e-12);
    }

    #[test]
    fn test_parse_negative_zero_degrees() {
        let v = parse_sexagesimal("-00 30 00").unwrap();
        assert!((v + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_sexagesimal("").is_err());
        assert!(parse_sexagesimal("ab:cd").is_err());
        assert!(parse_sexagesimal("10 75 00").is_err());
    }

    #[test]
    fn test_hours_degrees_position() {
        let pos = SkyPosition::from_hours_degrees("21 42 42.80", "+43 35 09.9").unwrap();
        assert!((pos.ra_deg - 325.678333).abs() < 1e-5);
        assert!((pos.dec_deg - 43.586_083).abs() < 1e-5);
    }

    #[test]
    fn test_format_round_trip() {
        let pos = SkyPosition::from_hours_degrees("21:42:42.80", "-05:03:09.90").unwrap();
        assert_eq!(pos.format_ra(":", 2), "21:42:42.80");
        assert_eq!(pos.format_dec(":", 2), "-05:03:09.90");
        assert_eq!(pos.format_ra(" ", 2), "21 42 42.80");
    }

    #[test]
    fn test_format_carries_rounded_seconds() {
        let sx = Sexagesimal::split(1.0 + 59.0 / 60.0 + 59.999 / 3600.0, 2);
        assert_eq!(sx.units, 2);
        assert_eq!(sx.minutes, 0);
        assert_eq!(sx.format(":", 2, false), "02:00:00.00");
    }

    #[test]
    fn test_dec_always_signed() {
        let pos = SkyPosition::new(10.0, 5.5).unwrap();
        assert!(pos.format_dec(":", 2).starts_with('+'));
    }

    #[test]
    fn test_out_of_range() {
        assert!(SkyPosition::new(10.0, 91.0).is_err());
        assert!(SkyPosition::from_hours_degrees("24 00 01", "00 00 00").is_err());
    }

    #[test]
    fn test_separation() {
        let a = SkyPosition::new(0.0, 0.0).unwrap();
        let b = SkyPosition::new(0.0, 1.0).unwrap();
        assert!((a.separation(&b) - 1.0).abs() < 1e-9);
        let c = SkyPosition::new(359.5, 0.0).unwrap();
        assert!((a.separation(&c) - 0.5).abs() < 1e-9);
    }
}
