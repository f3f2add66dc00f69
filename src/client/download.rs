//! Observation downloads and the local job cache

use super::{scrape, ApiResponse, Telescope};
use crate::config::TelescopeConfig;
use crate::error::{Result, ScopeError};
use crate::fits::FitsFrame;
use crate::types::JobInfo;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{json, Value};
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use zip::ZipArchive;

/// `<dir>/<c0>/<c1>/<file>`, sharded by the first two characters of the name
pub fn cache_path(dir: &Path, file_name: &str) -> PathBuf {
    let mut chars = file_name.chars();
    let c0 = chars.next().unwrap_or('_').to_string();
    let c1 = chars.next().unwrap_or('_').to_string();
    dir.join(c0).join(c1).join(file_name)
}

/// File name of a raw job download
fn obs_file_name(jid: u64, cube: bool) -> String {
    format!("{}.{}", jid, if cube { "fits" } else { "zip" })
}

/// Downloaded observation: a single 3D FITS cube or a zip of per-filter frames
#[derive(Debug)]
pub enum ObsArchive<R: Read + Seek> {
    Cube(R),
    Frames(ZipArchive<R>),
}

impl<R: Read + Seek> ObsArchive<R> {
    fn open(reader: R, cube: bool) -> Result<Self> {
        if cube {
            Ok(ObsArchive::Cube(reader))
        } else {
            Ok(ObsArchive::Frames(ZipArchive::new(reader)?))
        }
    }

    /// FITS frames in archive order
    pub fn frames(&mut self) -> Result<Vec<FitsFrame>> {
        match self {
            ObsArchive::Cube(reader) => {
                let mut bytes = Vec::new();
                reader.rewind()?;
                reader.read_to_end(&mut bytes)?;
                Ok(vec![FitsFrame::from_bytes("cube.fits", bytes)?])
            }
            ObsArchive::Frames(zip) => {
                let mut frames = Vec::new();
                for i in 0..zip.len() {
                    let mut entry = zip.by_index(i)?;
                    let name = entry.name().to_string();
                    let lower = name.to_lowercase();
                    if !(lower.ends_with(".fits") || lower.ends_with(".fit") || lower.ends_with(".fts")) {
                        continue;
                    }
                    let mut bytes = Vec::with_capacity(entry.size() as usize);
                    entry.read_to_end(&mut bytes)?;
                    frames.push(FitsFrame::from_bytes(&name, bytes)?);
                }
                Ok(frames)
            }
        }
    }

    /// Member names (zip) or an empty list (cube)
    pub fn names(&self) -> Vec<String> {
        match self {
            ObsArchive::Cube(_) => Vec::new(),
            ObsArchive::Frames(zip) => zip.file_names().map(str::to_string).collect(),
        }
    }
}

fn progress_bar(name: &str, size: u64) -> ProgressBar {
    let pb = ProgressBar::new(size);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(name.to_string());
    pb
}

fn ieid_of(resp: &ApiResponse) -> Result<Value> {
    resp.data
        .get("ieID")
        .cloned()
        .ok_or_else(|| ScopeError::Api(format!("no ieID in reply (status {})", resp.status_text())))
}

/// Advertised size of the prepared file
fn advertised_size(resp: &ApiResponse, cube: bool) -> Option<u64> {
    let key = if cube { "fitssize" } else { "fitsbzsize" };
    resp.data.get(key).and_then(crate::types::loose_u64)
}

/// Fail once the image engine has been polled more than `ready_poll_max` times
pub(super) fn check_ready_polls(jid: u64, polls: u32, config: &TelescopeConfig) -> Result<()> {
    if polls > config.ready_poll_max {
        return Err(ScopeError::Timeout {
            what: format!("image engine for job {jid}"),
            secs: config.ready_poll_secs * u64::from(config.ready_poll_max),
        });
    }
    Ok(())
}

/// Keep a download only when its size matches the advertised one
pub(super) fn verified_download(file_name: String, written: u64, advertised: Option<u64>) -> Option<String> {
    match advertised {
        Some(size) if size == written => Some(file_name),
        expected => {
            tracing::warn!("{}: got {} bytes, expected {:?}", file_name, written, expected);
            None
        }
    }
}

/// Open a cached archive. A zip that does not open is deleted and `None`
/// returned so the caller can fetch it again.
pub(super) fn open_cached(path: &Path, cube: bool) -> Result<Option<ObsArchive<File>>> {
    match ObsArchive::open(File::open(path)?, cube) {
        Ok(archive) => Ok(Some(archive)),
        Err(ScopeError::Zip(e)) => {
            tracing::warn!("Corrupted download {}: {}", path.display(), e);
            std::fs::remove_file(path)?;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Processed-page polls that fit in the timeout budget, one per retry interval
pub(super) fn processed_polls(config: &TelescopeConfig) -> u64 {
    config.timeout_secs.div_ceil(config.retry_secs.max(1))
}

impl Telescope {
    /// Stream `url` into `target`, returning the number of bytes written
    async fn stream_to_file(&self, url: &str, target: &Path, progress: bool) -> Result<u64> {
        let resp = self.session()?.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(ScopeError::Api(format!("download returned {}", resp.status())));
        }

        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pb = progress.then(|| progress_bar(&name, resp.content_length().unwrap_or(0)));

        let mut file = tokio::fs::File::create(target).await?;
        let mut written = 0u64;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            if let Some(pb) = &pb {
                pb.inc(chunk.len() as u64);
            }
        }
        file.flush().await?;

        if let Some(pb) = pb {
            pb.finish();
        }
        Ok(written)
    }

    /// Prepare a raw download on the image engine and fetch it into `dir`.
    ///
    /// Returns the file name, or `None` when the size does not match what the
    /// image engine advertised.
    pub async fn download_obs(
        &self,
        job: &JobInfo,
        dir: &Path,
        cube: bool,
        progress: bool,
    ) -> Result<Option<String>> {
        let mut params = json!({ "jid": job.jid });
        if let Some(flat) = job.flat_id {
            params["flatid"] = json!(flat);
        }

        let create = if cube { "0-create-dl3d" } else { "0-create-dlzip" };
        let mut resp = self.ie_api(create, Some(&params)).await?;
        let ieid = ieid_of(&resp)?;

        let mut polls = 0;
        while resp.status_text() != "READY" {
            tracing::debug!("Job {}: {}", job.jid, resp.status_text());
            tokio::time::sleep(self.config.ready_poll()).await;
            polls += 1;
            resp = self.ie_api("0-is-job-ready", Some(&json!({ "ieid": ieid }))).await?;
            check_ready_polls(job.jid, polls, &self.config)?;
        }

        let ieid_text = match &ieid {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let url = self.url(&format!("v3image-download.php?jid={}&ieid={}", job.jid, ieid_text));
        let file_name = obs_file_name(job.jid, cube);
        let written = self.stream_to_file(&url, &dir.join(&file_name), progress).await?;

        Ok(verified_download(file_name, written, advertised_size(&resp, cube)))
    }

    /// Raw observation from the local cache, downloading it when missing.
    ///
    /// A zip that fails to open is removed; with `recurse` it is fetched once
    /// more, otherwise `None` is returned.
    pub async fn get_obs(
        &self,
        job: &JobInfo,
        cube: bool,
        recurse: bool,
        progress: bool,
    ) -> Result<Option<ObsArchive<File>>> {
        let path = cache_path(&self.jobs_cache, &obs_file_name(job.jid, cube));
        let attempts = if recurse { 2 } else { 1 };

        for _ in 0..attempts {
            if path.is_file() {
                tracing::info!("Getting {} from cache", path.display());
            } else {
                tracing::info!("Getting {} from server", path.display());
                let dir = path
                    .parent()
                    .ok_or_else(|| ScopeError::Internal(format!("bad cache path {}", path.display())))?;
                std::fs::create_dir_all(dir)?;
                self.download_obs(job, dir, cube, progress).await?;
            }

            if let Some(archive) = open_cached(&path, cube)? {
                return Ok(Some(archive));
            }
        }

        Ok(None)
    }

    /// Poll the processed-image page until it links the file, within the
    /// configured timeout budget.
    async fn processed_link(&self, job: &JobInfo, cube: bool) -> Result<Option<String>> {
        let kind = if cube { 1 } else { 3 };
        let page = format!("imageengine-request.php?jid={}&type={}", job.jid, kind);

        for _ in 0..processed_polls(&self.config) {
            let html = self.session()?.get(self.url(&page)).send().await?.text().await?;
            if let Some(src) = scrape::find_iframe_src(&html) {
                return Ok(Some(src));
            }
            tracing::warn!("No data. Sleep for {}s ...", self.config.retry_secs);
            tokio::time::sleep(self.config.retry()).await;
        }

        Ok(None)
    }

    /// Download the processed observation into `dir` as `art_<jid>.fits|zip`
    pub async fn download_obs_processed(
        &self,
        job: &JobInfo,
        dir: &Path,
        cube: bool,
        progress: bool,
    ) -> Result<Option<String>> {
        let Some(src) = self.processed_link(job, cube).await? else {
            return Ok(None);
        };
        let file_name = format!("art_{}", obs_file_name(job.jid, cube));
        self.stream_to_file(&self.url(&src), &dir.join(&file_name), progress)
            .await?;
        Ok(Some(file_name))
    }

    /// Processed observation held in memory
    pub async fn get_obs_processed(
        &self,
        job: &JobInfo,
        cube: bool,
    ) -> Result<Option<ObsArchive<Cursor<Vec<u8>>>>> {
        let Some(src) = self.processed_link(job, cube).await? else {
            return Ok(None);
        };
        let bytes = self.session()?.get(self.url(&src)).send().await?.bytes().await?;
        Ok(Some(ObsArchive::open(Cursor::new(bytes.to_vec()), cube)?))
    }
}
