//! Job search and job/request pages

use super::scrape::{self, SearchSummary};
use super::Telescope;
use crate::error::Result;
use crate::types::{JobInfo, RequestInfo, TelescopeKind};
use chrono::{Datelike, Duration, Local, NaiveDateTime};

/// Parameters of a completed-job search
#[derive(Debug, Clone)]
pub struct ObsQuery {
    /// End of the window in site-local wall-clock time; now when unset
    pub end: Option<NaiveDateTime>,
    pub days: i64,
    pub filter: String,
    pub camera: String,
    pub hour: u32,
    pub minute: u32,
}

impl Default for ObsQuery {
    fn default() -> Self {
        Self {
            end: None,
            days: 1,
            filter: String::new(),
            camera: String::new(),
            hour: 16,
            minute: 0,
        }
    }
}

impl ObsQuery {
    /// Form fields posted to `v3job-search-query.php`
    pub fn form(&self) -> Vec<(&'static str, String)> {
        let end = self.end.unwrap_or_else(|| Local::now().naive_local());
        let start = end - Duration::days(self.days);
        let telescope = TelescopeKind::from_name(&self.camera)
            .map(|k| k.id().to_string())
            .unwrap_or_default();

        let stamp = |t: &NaiveDateTime| -> Vec<String> {
            vec![
                t.day().to_string(),
                t.month().to_string(),
                t.year().to_string(),
                self.hour.to_string(),
                self.minute.to_string(),
            ]
        };

        tracing::debug!(
            "{}/{}/{} -> {}/{}/{}",
            start.day(),
            start.month(),
            start.year(),
            end.day(),
            end.month(),
            end.year()
        );

        let mut form = vec![
            ("sort1", "completetime".to_string()),
            ("sort1order", "desc".to_string()),
        ];
        form.extend(stamp(&start).into_iter().map(|v| ("searchearliestcom[]", v)));
        form.extend(stamp(&end).into_iter().map(|v| ("searchlatestcom[]", v)));
        form.extend([
            ("searchstatus[]", "1".to_string()),
            ("resultsperpage", "1000".to_string()),
            ("searchfilter", self.filter.clone()),
            ("searchtelescope", telescope),
            ("submit", "Go".to_string()),
        ]);
        form
    }
}

/// Result of a job search
#[derive(Debug, Clone, Default)]
pub struct ObsSearch {
    pub job_ids: Vec<u64>,
    pub summary: SearchSummary,
}

impl Telescope {
    /// Jobs completed within `query.days` days before `query.end`
    pub async fn get_obs_list(&self, query: &ObsQuery) -> Result<ObsSearch> {
        let html = self
            .session()?
            .post(self.url("v3job-search-query.php"))
            .form(&query.form())
            .send()
            .await?
            .text()
            .await?;

        Ok(ObsSearch {
            job_ids: scrape::parse_job_ids(&html),
            summary: scrape::parse_search_summary(&html),
        })
    }

    /// Job details for a given JID
    pub async fn get_job(&self, jid: u64) -> Result<JobInfo> {
        tracing::debug!("Job {}", jid);
        let html = self.page(&format!("v4request-view.php?jid={jid}")).await?;
        let job = scrape::parse_job_page(jid, &html);
        tracing::info!(
            "{} [{}, {}, {}]: {} {} {}",
            job.jid,
            job.telescope.as_deref().unwrap_or("?"),
            job.filter.as_deref().unwrap_or("?"),
            job.success.map(|s| s.to_string()).unwrap_or_else(|| "?".to_string()),
            job.object_type.as_deref().unwrap_or("?"),
            job.object_id.as_deref().unwrap_or("?"),
            job.exposure.as_deref().unwrap_or("?"),
        );
        Ok(job)
    }

    /// Request details for a given RID
    pub async fn get_request(&self, rid: u64) -> Result<RequestInfo> {
        tracing::debug!("Request {}", rid);
        let html = self.page(&format!("v4request-view.php?rid={rid}")).await?;
        let req = scrape::parse_request_page(rid, &html);
        tracing::info!(
            "{} [{}, {}, {}]: {} {} {}",
            req.rid,
            req.telescope.as_deref().unwrap_or("?"),
            req.filter.as_deref().unwrap_or("?"),
            req.status.as_deref().unwrap_or("?"),
            req.object_type.as_deref().unwrap_or("?"),
            req.object_id.as_deref().unwrap_or("?"),
            req.exposure.as_deref().unwrap_or("?"),
        );
        Ok(req)
    }
}
