//! telescope.org session client
//!
//! This module wraps the site's private surfaces:
//! - JSON API (`api-user.php`): request manager, request constructor, image engine
//! - HTML pages: job and request views, job search, request-constructor wizard
//! - File downloads: raw archives, 3D cubes and processed images

mod download;
mod jobs;
mod requests;
pub mod scrape;
mod submit;
#[cfg(test)]
mod tests;

pub use download::{cache_path, ObsArchive};
pub use jobs::{ObsQuery, ObsSearch};

use crate::config::{Config, TelescopeConfig};
use crate::error::{Result, ScopeError};
use crate::fits::FitsFrame;
use crate::types::{JobInfo, RequestInfo};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;

/// Modules reachable through `api-user.php`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiModule {
    RequestManager,
    RequestConstructor,
    ImageEngine,
}

impl ApiModule {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiModule::RequestManager => "request-manager",
            ApiModule::RequestConstructor => "request-constructor",
            ApiModule::ImageEngine => "image-engine",
        }
    }
}

/// Envelope returned by every API call
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub status: Value,
    #[serde(default)]
    pub data: Value,
}

impl ApiResponse {
    /// Status as text regardless of whether the site sent a string or a number
    pub fn status_text(&self) -> String {
        match &self.status {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Logged-in session with the telescope site
pub struct Telescope {
    http: Option<Client>,
    config: TelescopeConfig,
    base_url: String,
    jobs_cache: PathBuf,
}

impl Telescope {
    /// Create a client without logging in
    pub fn new(config: &Config) -> Self {
        let mut base_url = config.telescope.url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Self {
            http: None,
            config: config.telescope.clone(),
            base_url,
            jobs_cache: config.cache.jobs_dir(),
        }
    }

    /// Create a client and log in
    pub async fn connect(config: &Config) -> Result<Self> {
        let mut scope = Self::new(config);
        scope.login().await?;
        Ok(scope)
    }

    /// Log in with the configured credentials, starting a fresh cookie session
    pub async fn login(&mut self) -> Result<()> {
        if self.config.user.is_empty() || self.config.password.is_empty() {
            return Err(ScopeError::Config(
                "telescope.user and telescope.password are required".to_string(),
            ));
        }

        tracing::debug!("Get session ...");
        let http = Client::builder()
            .cookie_store(true)
            .timeout(self.config.request_timeout())
            .build()?;

        tracing::debug!("Logging in as {} ...", self.config.user);
        let resp = http
            .post(self.url("login.php"))
            .form(&[
                ("action", "login"),
                ("username", self.config.user.as_str()),
                ("password", self.config.password.as_str()),
                ("stayloggedin", "true"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ScopeError::Auth(format!("login returned {}", resp.status())));
        }

        self.http = Some(http);
        Ok(())
    }

    /// Log out and drop the session
    pub async fn logout(&mut self) -> Result<()> {
        if let Some(http) = self.http.take() {
            http.post(self.url("logout.php")).send().await?;
            tracing::debug!("Logged out");
        }
        Ok(())
    }

    pub fn is_logged_in(&self) -> bool {
        self.http.is_some()
    }

    pub fn jobs_cache(&self) -> &PathBuf {
        &self.jobs_cache
    }

    pub(crate) fn session(&self) -> Result<&Client> {
        self.http
            .as_ref()
            .ok_or_else(|| ScopeError::Auth("Not logged in".to_string()))
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POST a JSON API request
    pub async fn api_call(
        &self,
        module: ApiModule,
        request: &str,
        params: Option<&Value>,
    ) -> Result<ApiResponse> {
        let mut form: Vec<(&str, String)> = vec![
            ("module", module.as_str().to_string()),
            ("request", request.to_string()),
        ];
        if let Some(params) = params {
            form.push(("params", serde_json::to_string(params)?));
        }

        let body = self
            .session()?
            .post(self.url("api-user.php"))
            .form(&form)
            .send()
            .await?
            .text()
            .await?;

        let resp: ApiResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::debug!("Unparseable {} reply: {}", module.as_str(), scrape::cleanup(&body));
            ScopeError::Api(format!("{} {}: {}", module.as_str(), request, e))
        })?;
        Ok(resp)
    }

    pub(crate) async fn rm_api(&self, request: &str, params: Option<&Value>) -> Result<ApiResponse> {
        self.api_call(ApiModule::RequestManager, request, params).await
    }

    pub(crate) async fn rc_api(&self, request: &str, params: Option<&Value>) -> Result<ApiResponse> {
        self.api_call(ApiModule::RequestConstructor, request, params).await
    }

    pub(crate) async fn ie_api(&self, request: &str, params: Option<&Value>) -> Result<ApiResponse> {
        self.api_call(ApiModule::ImageEngine, request, params).await
    }

    /// POST to a page and return its body
    pub(crate) async fn page(&self, path: &str) -> Result<String> {
        let resp = self.session()?.post(self.url(path)).send().await?;
        if !resp.status().is_success() {
            return Err(ScopeError::Api(format!("{} returned {}", path, resp.status())));
        }
        Ok(resp.text().await?)
    }
}

/// Observation source used by the analysis pipeline (allows mocking)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Observatory: Send + Sync {
    async fn job(&self, jid: u64) -> Result<JobInfo>;
    async fn request(&self, rid: u64) -> Result<RequestInfo>;
    /// Individual filter frames of a finished job
    async fn frames(&self, job: &JobInfo) -> Result<Vec<FitsFrame>>;
    /// Make sure the 3D cube of a job is in the local cache
    async fn cache_cube(&self, job: &JobInfo) -> Result<()>;
}

#[async_trait]
impl Observatory for Telescope {
    async fn job(&self, jid: u64) -> Result<JobInfo> {
        self.get_job(jid).await
    }

    async fn request(&self, rid: u64) -> Result<RequestInfo> {
        self.get_request(rid).await
    }

    async fn frames(&self, job: &JobInfo) -> Result<Vec<FitsFrame>> {
        match self.get_obs(job, false, true, false).await? {
            Some(mut archive) => archive.frames(),
            None => Err(ScopeError::NotFound(format!("frames of job {}", job.jid))),
        }
    }

    async fn cache_cube(&self, job: &JobInfo) -> Result<()> {
        self.get_obs(job, true, true, false).await?;
        Ok(())
    }
}
