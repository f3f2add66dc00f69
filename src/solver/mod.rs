//! Plate solving through a local astrometry.net `solve-field`
//!
//! Frames are written to a scratch directory, solved with a position hint
//! from the mount keywords and a per-telescope pixel-scale window, and the
//! resulting WCS is cached as JSON keyed by the frame contents.

mod wcs;

pub use wcs::{SkyExtent, Wcs};

use crate::client::cache_path;
use crate::config::{CacheConfig, SolverConfig};
use crate::coords::SkyPosition;
use crate::error::{Result, ScopeError};
use crate::fits::{self, FitsFrame, FitsHeader};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;

/// CPU limit for solves made while analysing a whole job
pub const JOB_CPU_TIMEOUT: Duration = Duration::from_secs(30);

/// Plate-scale bounds (arcsec/pixel) passed to `-L/-H`
pub fn aperture_bounds(telescope: &str) -> Option<(u32, u32)> {
    match telescope {
        "galaxy" => Some((1, 2)),
        "cluster" => Some((14, 16)),
        "coast" => Some((1, 2)),
        "pirate" => Some((1, 2)),
        "10micron" => Some((1, 2)),
        "cdk17" => Some((1, 2)),
        "unknown" | "undefined" | "'undefined'" => Some((1, 16)),
        _ => None,
    }
}

/// Short telescope name from `TELESCOP`: lowercased, the second word for
/// `brt` instruments and the first otherwise.
pub fn telescope_name(header: &FitsHeader) -> String {
    let tel = match header.get("TELESCOP") {
        Some(t) if !t.is_empty() && t != "undefined" => t.to_lowercase(),
        _ => return "unknown".to_string(),
    };
    let mut words = tel.split_whitespace();
    let word = if tel.contains("brt") {
        words.nth(1)
    } else {
        words.next()
    };
    word.unwrap_or("unknown").to_string()
}

/// Bounds for a frame; names missing from the table use the `unknown` window
pub fn frame_bounds(header: &FitsHeader) -> (u32, u32) {
    let name = telescope_name(header);
    aperture_bounds(&name).unwrap_or_else(|| {
        tracing::warn!("No plate scale for telescope '{}', using the wide window", name);
        (1, 16)
    })
}

/// Pointing of the frame from OBJCTRA/OBJCTDEC, MNTRA/MNTDEC or RA-TEL/DEC-TEL
/// (RA in hours). Unreadable values fail as a solver error for this frame.
pub fn position_hint(header: &FitsHeader) -> Result<SkyPosition> {
    for (ra_key, dec_key) in [("OBJCTRA", "OBJCTDEC"), ("MNTRA", "MNTDEC"), ("RA-TEL", "DEC-TEL")] {
        if let (Some(ra), Some(dec)) = (header.get(ra_key), header.get(dec_key)) {
            return SkyPosition::from_hours_degrees(ra, dec)
                .map_err(|e| ScopeError::Solver(format!("bad pointing {ra_key}/{dec_key}: {e}")));
        }
    }
    Err(ScopeError::Solver("frame has no pointing keywords".to_string()))
}

/// Plate solver seam (allows mocking)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlateSolver: Send + Sync {
    /// WCS of the frame, `None` when it cannot be solved
    async fn solve(&self, frame: &FitsFrame, force: bool) -> Result<Option<Wcs>>;
}

/// Local `solve-field` runner with a WCS cache
pub struct Solver {
    command: String,
    cpu_timeout: Duration,
    radius_deg: f64,
    cache_dir: PathBuf,
}

impl Solver {
    pub fn new(config: &SolverConfig, cache: &CacheConfig) -> Self {
        Self {
            command: config.command.clone(),
            cpu_timeout: Duration::from_secs(config.cpu_timeout_secs),
            radius_deg: config.search_radius_deg,
            cache_dir: cache.wcs_dir(),
        }
    }

    pub fn with_cpu_timeout(mut self, timeout: Duration) -> Self {
        self.cpu_timeout = timeout;
        self
    }

    /// Command-line arguments for one frame
    pub fn solve_field_args(&self, header: &FitsHeader, file: &str) -> Result<Vec<String>> {
        let hint = position_hint(header)?;
        let (lo, hi) = frame_bounds(header);
        Ok(vec![
            "-p".to_string(),
            "-l".to_string(),
            self.cpu_timeout.as_secs().to_string(),
            "-O".to_string(),
            "-L".to_string(),
            lo.to_string(),
            "-H".to_string(),
            hi.to_string(),
            "-u".to_string(),
            "app".to_string(),
            "-3".to_string(),
            format!("{:.6}", hint.ra_deg),
            "-4".to_string(),
            format!("{:.6}", hint.dec_deg),
            "-5".to_string(),
            self.radius_deg.to_string(),
            file.to_string(),
        ])
    }

    fn cache_file(&self, frame: &FitsFrame) -> PathBuf {
        cache_path(&self.cache_dir, &format!("{}.json", frame.content_key()))
    }

    fn load_cached(&self, path: &std::path::Path) -> Result<Wcs> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn store(&self, path: &std::path::Path, wcs: &Wcs) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(wcs)?)?;
        Ok(())
    }

    /// Run the solver on one frame in a scratch directory
    async fn solve_local(&self, frame: &FitsFrame) -> Result<Option<Wcs>> {
        let scratch = tempfile::Builder::new().prefix("field-solver").tempdir()?;
        let input = scratch.path().join("frame.fits");
        frame.write_to(&input)?;

        let args = self.solve_field_args(&frame.header, "frame.fits")?;
        tracing::debug!("{} {}", self.command, args.join(" "));

        let output = Command::new(&self.command)
            .args(&args)
            .current_dir(scratch.path())
            .output()
            .await
            .map_err(|e| ScopeError::Solver(format!("cannot run {}: {}", self.command, e)))?;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!("{}", line.trim());
        }

        let solved = scratch.path().join("frame.new");
        if !solved.is_file() {
            return Ok(None);
        }
        let header = fits::read_header(&solved)?;
        Ok(Some(Wcs::from_header(&header)?))
    }
}

#[async_trait]
impl PlateSolver for Solver {
    async fn solve(&self, frame: &FitsFrame, force: bool) -> Result<Option<Wcs>> {
        let path = self.cache_file(frame);
        let key = frame.content_key();

        if !force && path.is_file() {
            tracing::info!("Getting {} from cache", key);
            return self.load_cached(&path).map(Some);
        }

        tracing::info!("Solving for {}", key);
        let wcs = self.solve_local(frame).await?;
        if let Some(wcs) = &wcs {
            self.store(&path, wcs)?;
        }
        Ok(wcs)
    }
}
