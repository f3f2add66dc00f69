//! Watch list of variable stars kept in the observing queue

use crate::catalog::CatalogClient;
use crate::client::Telescope;
use crate::error::{Result, ScopeError};
use crate::types::{Submission, SubmitOptions, UserRequest};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

fn default_exposure() -> f64 {
    180.0
}

/// One star to keep observing
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WatchTarget {
    pub name: String,
    #[serde(default)]
    pub comment: String,
    /// Exposure per filter, seconds
    #[serde(default = "default_exposure")]
    pub exposure_secs: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatchList {
    #[serde(default, rename = "target")]
    pub targets: Vec<WatchTarget>,
}

impl WatchList {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ScopeError::Config(format!("watch list: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Targets without a queued request, in watch-list order
    pub fn missing(&self, requests: &[UserRequest]) -> Vec<&WatchTarget> {
        let queued = queued_names(requests);
        self.targets
            .iter()
            .filter(|t| !queued.contains(t.name.as_str()))
            .collect()
    }
}

/// Object names of requests that are still waiting to be observed
pub fn queued_names(requests: &[UserRequest]) -> HashSet<&str> {
    requests
        .iter()
        .filter(|r| r.status().is_queued())
        .map(|r| r.objectname.as_str())
        .collect()
}

/// Look a star up in GCVS and submit a COAST BVR request for it
pub async fn submit_var_star(
    scope: &Telescope,
    catalog: &CatalogClient,
    name: &str,
    exposure_secs: f64,
    comment: &str,
) -> Result<Submission> {
    let star = catalog.find_variable_star(name).await?;
    tracing::debug!("{} at {}", name, star.position);

    let opts = SubmitOptions {
        exposure_ms: (exposure_secs * 1000.0).round() as u64,
        name: name.to_string(),
        comment: comment.to_string(),
        ..Default::default()
    };
    scope.submit_job_api(&star.position, &opts).await
}
