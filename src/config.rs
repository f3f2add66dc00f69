//! Configuration management

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub telescope: TelescopeConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelescopeConfig {
    /// Site root, with trailing slash
    #[serde(default = "default_site_url")]
    pub url: String,
    pub user: String,
    pub password: String,
    /// Budget for waiting on processed images, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Sleep between processed-image polls, in seconds
    #[serde(default = "default_retry_secs")]
    pub retry_secs: u64,
    /// Sleep between image-engine readiness polls, in seconds
    #[serde(default = "default_ready_poll_secs")]
    pub ready_poll_secs: u64,
    /// Readiness polls before giving up
    #[serde(default = "default_ready_poll_max")]
    pub ready_poll_max: u32,
    /// Limit on any single HTTP request, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Downloaded observation archives
    #[serde(default = "default_jobs_cache")]
    pub jobs: String,
    /// Plate solutions
    #[serde(default = "default_wcs_cache")]
    pub wcs: String,
    /// SQLite database with processing state
    #[serde(default = "default_database")]
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolverConfig {
    /// Local astrometry.net executable
    #[serde(default = "default_solver_command")]
    pub command: String,
    /// CPU time limit handed to the solver, in seconds
    #[serde(default = "default_solver_timeout")]
    pub cpu_timeout_secs: u64,
    /// Search radius around the pointing hint, in degrees
    #[serde(default = "default_search_radius")]
    pub search_radius_deg: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_vizier_url")]
    pub vizier_url: String,
    #[serde(default = "default_vsp_url")]
    pub vsp_url: String,
    /// Comparison chart field of view, in arcminutes
    #[serde(default = "default_chart_fov")]
    pub chart_fov_arcmin: u32,
    #[serde(default = "default_chart_maglimit")]
    pub chart_mag_limit: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// TrueType font for preview labels; labels are skipped when it cannot be read
    #[serde(default = "default_label_font")]
    pub font: String,
    /// Label height in pixels
    #[serde(default = "default_label_px")]
    pub label_px: f32,
}

fn default_site_url() -> String {
    "https://www.telescope.org/".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_retry_secs() -> u64 {
    15
}

fn default_ready_poll_secs() -> u64 {
    2
}

fn default_ready_poll_max() -> u32 {
    30
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_label_font() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}

fn default_label_px() -> f32 {
    12.0
}

fn default_jobs_cache() -> String {
    ".cache/jobs".to_string()
}

fn default_wcs_cache() -> String {
    ".cache/wcs".to_string()
}

fn default_database() -> String {
    ".cache/ouscope.db".to_string()
}

fn default_solver_command() -> String {
    "solve-field".to_string()
}

fn default_solver_timeout() -> u64 {
    15
}

fn default_search_radius() -> f64 {
    2.0
}

fn default_vizier_url() -> String {
    "https://vizier.cds.unistra.fr".to_string()
}

fn default_vsp_url() -> String {
    "https://app.aavso.org/vsp".to_string()
}

fn default_chart_fov() -> u32 {
    40
}

fn default_chart_maglimit() -> f64 {
    16.0
}

impl Config {
    /// Load configuration from file, with `OUSCOPE__SECTION__KEY` overrides
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let name = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Config path is not valid UTF-8: {}", path.display()))?;

        let settings = config::Config::builder()
            .add_source(config::File::with_name(name))
            .add_source(config::Environment::with_prefix("OUSCOPE").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }

    /// Load from default locations
    pub fn load_default() -> anyhow::Result<Self> {
        let paths = [
            "ouscope.toml",
            "~/.config/ouscope/config.toml",
            "~/.config/telescope.toml",
        ];

        for path in paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::load(expanded.as_ref());
            }
        }

        anyhow::bail!("No configuration file found")
    }

    /// Load an explicit path when given, otherwise search the default locations
    pub fn load_or_default(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::load(shellexpand::tilde(p).as_ref()),
            None => Self::load_default(),
        }
    }
}

impl TelescopeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }

    pub fn ready_poll(&self) -> Duration {
        Duration::from_secs(self.ready_poll_secs)
    }
}

impl RenderConfig {
    pub fn font_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.font).as_ref())
    }
}

impl CacheConfig {
    pub fn jobs_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.jobs).as_ref())
    }

    pub fn wcs_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.wcs).as_ref())
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.database).as_ref())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs_cache(),
            wcs: default_wcs_cache(),
            database: default_database(),
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            command: default_solver_command(),
            cpu_timeout_secs: default_solver_timeout(),
            search_radius_deg: default_search_radius(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font: default_label_font(),
            label_px: default_label_px(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            vizier_url: default_vizier_url(),
            vsp_url: default_vsp_url(),
            chart_fov_arcmin: default_chart_fov(),
            chart_mag_limit: default_chart_maglimit(),
        }
    }
}
