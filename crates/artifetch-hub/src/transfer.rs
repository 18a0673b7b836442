use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION, RANGE};
use reqwest::StatusCode;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{HubError, HubResult};
use crate::repo::ArtifactKey;
use crate::status;

/// Attempts left after a stalled chunk; reset whenever bytes arrive.
pub const MAX_RETRIES: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Progress bar template for files whose size is known.
const PB_TEMPLATE_SIZED: &str =
    "{wide_msg}\n[{bar:50.cyan/blue}] {bytes}/{total_bytes}  {bytes_per_sec}  ETA {eta}";

/// Progress bar template when the total size is not known.
const PB_TEMPLATE_SPINNER: &str =
    "{spinner:.green} {wide_msg}  {bytes}  {bytes_per_sec}  [{elapsed_precise}]";

const DISPLAY_NAME_MAX: usize = 40;

/// One file to fetch into `destination` through `incomplete`.
#[derive(Debug)]
pub(crate) struct TransferRequest<'a> {
    pub key: &'a ArtifactKey,
    pub url: &'a Url,
    pub headers: &'a HeaderMap,
    pub incomplete: &'a Path,
    pub destination: &'a Path,
    pub expected_size: Option<u64>,
    pub force: bool,
}

// ─── Engine ───────────────────────────────────────────────────────────────────

/// Resumable, retried byte transfer with atomic commit.
#[derive(Debug, Clone)]
pub(crate) struct TransferEngine {
    client: reqwest::Client,
    timeout: Duration,
    retry_delay: Duration,
    progress: Option<MultiProgress>,
}

impl TransferEngine {
    pub fn new(
        client: reqwest::Client,
        timeout: Duration,
        retry_delay: Duration,
        progress: Option<MultiProgress>,
    ) -> Self {
        Self {
            client,
            timeout,
            retry_delay,
            progress,
        }
    }

    /// Download into `incomplete`, then move it to `destination`.
    ///
    /// Returns `false` without touching the network when the destination is
    /// already there and `force` is not set.
    pub async fn download_to_tmp_and_move(&self, req: &TransferRequest<'_>) -> HubResult<bool> {
        if req.destination.exists() && !req.force {
            debug!(path = %req.destination.display(), "Destination appeared while waiting");
            return Ok(false);
        }
        if req.force && req.incomplete.exists() {
            std::fs::remove_file(req.incomplete).map_err(HubError::Io)?;
        }
        if let Some(parent) = req.incomplete.parent() {
            std::fs::create_dir_all(parent).map_err(HubError::Io)?;
        }

        if let Some(size) = req.expected_size {
            for dir in [req.incomplete.parent(), req.destination.parent()]
                .into_iter()
                .flatten()
            {
                check_disk_space(size, dir);
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(req.incomplete)
            .map_err(HubError::Io)?;
        let resume = file.metadata().map_err(HubError::Io)?.len();

        info!(
            file = %req.key.label(),
            resume_from = resume,
            "Downloading"
        );
        let written = self.http_get(req, &mut file, resume).await?;
        file.flush().map_err(HubError::Io)?;
        drop(file);

        if let Some(expected) = req.expected_size {
            if expected != written {
                return Err(HubError::Consistency {
                    file: req.key.label(),
                    expected,
                    actual: written,
                });
            }
        }

        chmod_and_move(req.incomplete, req.destination)?;
        info!(path = %req.destination.display(), bytes = written, "Download complete");
        Ok(true)
    }

    /// Stream the body into `file` starting at `resume`, retrying stalled
    /// transfers. Returns the total size of the file afterwards.
    async fn http_get(
        &self,
        req: &TransferRequest<'_>,
        file: &mut File,
        resume: u64,
    ) -> HubResult<u64> {
        let mut offset = resume;
        let mut attempts_left = MAX_RETRIES;
        let mut pb: Option<ProgressBar> = None;

        loop {
            let before = offset;
            match self.stream_once(req, file, &mut offset, &mut pb).await {
                Ok(()) => break,
                Err(err) => {
                    if offset > before {
                        attempts_left = MAX_RETRIES;
                    }
                    if !err.is_transient() || attempts_left == 0 {
                        if let Some(ref pb) = pb {
                            pb.abandon();
                        }
                        return Err(err);
                    }
                    attempts_left -= 1;
                    warn!(
                        file = %req.key.label(),
                        offset,
                        attempts_left,
                        error = %err,
                        "Transfer interrupted, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }

        if let Some(ref pb) = pb {
            pb.finish_with_message(format!("Done  {}", req.key.path()));
        }
        Ok(offset)
    }

    /// One GET from `offset` to the end of the body.
    async fn stream_once(
        &self,
        req: &TransferRequest<'_>,
        file: &mut File,
        offset: &mut u64,
        pb: &mut Option<ProgressBar>,
    ) -> HubResult<()> {
        let mut request = self.client.get(req.url.clone()).headers(req.headers.clone());
        if *offset > 0 {
            let range = HeaderValue::from_str(&format!("bytes={offset}-"))
                .map_err(|e| HubError::InvalidHeader(e.to_string()))?;
            request = request.header(RANGE, range);
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| HubError::Timeout {
                url: req.url.to_string(),
            })?
            .map_err(|e| HubError::from_reqwest(req.url.as_str(), e))?;

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE && Some(*offset) == req.expected_size {
            debug!(file = %req.key.label(), "Partial file already complete");
            return Ok(());
        }
        if let Some(err) = status::classify(status, response.headers(), req.url, req.key) {
            return Err(err);
        }
        if *offset > 0 && status != StatusCode::PARTIAL_CONTENT {
            warn!(file = %req.key.label(), "Server ignored the range request, restarting");
            file.set_len(0).map_err(HubError::Io)?;
            *offset = 0;
            if let Some(ref pb) = pb {
                pb.set_position(0);
            }
        }

        if pb.is_none() {
            *pb = self.progress_bar(req, response.headers(), *offset);
        }

        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::time::timeout(self.timeout, stream.next())
                .await
                .map_err(|_| HubError::Timeout {
                    url: req.url.to_string(),
                })?;
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| HubError::from_reqwest(req.url.as_str(), e))?;
            file.write_all(&chunk).map_err(HubError::Io)?;
            *offset += chunk.len() as u64;
            if let Some(ref pb) = pb {
                pb.inc(chunk.len() as u64);
            }
        }
        Ok(())
    }

    fn progress_bar(
        &self,
        req: &TransferRequest<'_>,
        headers: &HeaderMap,
        position: u64,
    ) -> Option<ProgressBar> {
        let mp = self.progress.as_ref()?;
        let name = display_name(headers, req.url);
        let pb = match req.expected_size {
            Some(total) => {
                let pb = mp.add(ProgressBar::new(total));
                if let Ok(style) = ProgressStyle::with_template(PB_TEMPLATE_SIZED) {
                    pb.set_style(style.progress_chars("##-"));
                }
                pb
            }
            None => {
                let pb = mp.add(ProgressBar::new_spinner());
                if let Ok(style) = ProgressStyle::with_template(PB_TEMPLATE_SPINNER) {
                    pb.set_style(style);
                }
                pb.enable_steady_tick(Duration::from_millis(100));
                pb
            }
        };
        pb.set_message(name);
        pb.set_position(position);
        Some(pb)
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Name shown next to the progress bar: the `Content-Disposition` filename,
/// else the URL, cut to its last 40 characters.
pub(crate) fn display_name(headers: &HeaderMap, url: &Url) -> String {
    let name = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once("filename=\""))
        .and_then(|(_, rest)| rest.split_once('"'))
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| url.to_string());

    let count = name.chars().count();
    if count > DISPLAY_NAME_MAX {
        let tail: String = name.chars().skip(count - DISPLAY_NAME_MAX).collect();
        format!("(…){tail}")
    } else {
        name
    }
}

fn check_disk_space(expected: u64, dir: &Path) {
    let target = dir
        .ancestors()
        .find(|p| p.exists())
        .unwrap_or(dir);
    match fs2::available_space(target) {
        Ok(free) if free < expected => warn!(
            dir = %target.display(),
            expected_mb = expected / 1_000_000,
            free_mb = free / 1_000_000,
            "Not enough free disk space; the download will probably fail"
        ),
        Ok(_) => {}
        Err(e) => debug!(dir = %target.display(), error = %e, "Could not check free disk space"),
    }
}

/// Give `src` the permissions a new file in `dst`'s directory would get,
/// then rename it over `dst`.
pub(crate) fn chmod_and_move(src: &Path, dst: &Path) -> HubResult<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(HubError::Io)?;
        let probe = parent.join(format!("tmp_{}", uuid::Uuid::new_v4()));
        match File::create(&probe).and_then(|f| f.metadata()) {
            Ok(meta) => {
                if let Err(e) = std::fs::set_permissions(src, meta.permissions()) {
                    warn!(path = %src.display(), error = %e, "Could not set file permissions");
                }
            }
            Err(e) => debug!(dir = %parent.display(), error = %e, "Permission probe failed"),
        }
        let _ = std::fs::remove_file(&probe);
    }
    std::fs::rename(src, dst).map_err(HubError::Io)
}
