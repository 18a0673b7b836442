//! Flat cache layout: one file per `(url, etag)` named by their hashes, with
//! a JSON sidecar recording both.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{HubError, HubResult};
use crate::integrity::sha256_hex;
use crate::lock::FileLock;
use crate::probe;
use crate::resolver::CallContext;
use crate::transfer::TransferRequest;

const SIDECAR_SUFFIXES: &[&str] = &[".json", ".lock", ".incomplete"];

/// Sidecar stored as `<file>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRecord {
    pub url: String,
    pub etag: String,
}

/// `sha256(url).sha256(etag)`, plus `.h5` for Keras weights.
pub fn url_to_filename(url: &str, etag: Option<&str>) -> String {
    let mut name = sha256_hex(url);
    if let Some(etag) = etag {
        name.push('.');
        name.push_str(&sha256_hex(etag));
    }
    if url.ends_with(".h5") {
        name.push_str(".h5");
    }
    name
}

/// Most recently modified file in `dir` downloaded from `url`, any ETag.
pub fn latest_for_url(dir: &Path, url: &str) -> Option<PathBuf> {
    let prefix = sha256_hex(url);
    std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            name.starts_with(&prefix) && !SIDECAR_SUFFIXES.iter().any(|s| name.ends_with(s))
        })
        .filter_map(|e| {
            let meta = e.metadata().ok()?;
            meta.is_file()
                .then(|| (meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), e.path()))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

pub(crate) async fn resolve(ctx: &CallContext<'_>, cache_dir: &Path) -> HubResult<PathBuf> {
    std::fs::create_dir_all(cache_dir).map_err(HubError::Io)?;
    let url = ctx.url.to_string();

    let probed = match ctx.network_disabled() {
        Some(err) => Err(err),
        None => {
            probe::head(
                &ctx.clients.probe,
                ctx.url.clone(),
                &ctx.headers,
                ctx.etag_timeout(),
                ctx.key,
            )
            .await
        }
    };

    let probed = probed.and_then(|response| match response.raw_etag() {
        Some(etag) => Ok((response, etag)),
        None => Err(HubError::FileMetadata {
            repo_id: ctx.key.repo_id().to_string(),
            revision: ctx.key.revision().to_string(),
            reason: "server did not return an ETag".to_string(),
        }),
    });
    let (response, etag) = match probed {
        Ok(found) => found,
        Err(err) => {
            let local = if ctx.force() {
                None
            } else {
                latest_for_url(cache_dir, &url)
            };
            return ctx.fallback(err, local);
        }
    };

    let cache_path = cache_dir.join(url_to_filename(&url, Some(&etag)));
    if cache_path.exists() && !ctx.force() {
        debug!(path = %cache_path.display(), "Legacy cache hit");
        return Ok(cache_path);
    }

    let mut headers = ctx.headers.clone();
    let (download_url, expected_size) = match response.redirect_target() {
        Some(target) => {
            headers.remove(AUTHORIZATION);
            (target, None)
        }
        None => (response.url.clone(), response.size()),
    };

    let _lock = FileLock::acquire(with_suffix(&cache_path, ".lock")).await?;
    let incomplete = with_suffix(&cache_path, ".incomplete");
    ctx.transfer
        .download_to_tmp_and_move(&TransferRequest {
            key: ctx.key,
            url: &download_url,
            headers: &headers,
            incomplete: &incomplete,
            destination: &cache_path,
            expected_size,
            force: ctx.force(),
        })
        .await?;

    let record = LegacyRecord { url, etag };
    std::fs::write(
        with_suffix(&cache_path, ".json"),
        serde_json::to_string(&record)?,
    )
    .map_err(HubError::Io)?;
    info!(path = %cache_path.display(), "Stored in legacy cache");
    Ok(cache_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_to_filename() {
        let url = "https://hub.example/orgA/model-x/resolve/main/config.json";
        let name = url_to_filename(url, Some("\"abc\""));
        let (url_hash, etag_hash) = name.split_once('.').unwrap();
        assert_eq!(url_hash, sha256_hex(url));
        assert_eq!(etag_hash, sha256_hex("\"abc\""));

        assert!(url_to_filename("https://hub.example/tf_model.h5", None).ends_with(".h5"));
        assert_eq!(url_to_filename(url, None), sha256_hex(url));
    }

    #[test]
    fn test_latest_for_url_skips_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://hub.example/orgA/model-x/resolve/main/config.json";
        assert_eq!(latest_for_url(dir.path(), url), None);

        let file = dir.path().join(url_to_filename(url, Some("v1")));
        std::fs::write(&file, b"{}").unwrap();
        std::fs::write(with_suffix(&file, ".json"), b"{}").unwrap();
        std::fs::write(with_suffix(&file, ".lock"), b"").unwrap();
        std::fs::write(
            dir.path().join(url_to_filename("https://hub.example/other", Some("v1"))),
            b"x",
        )
        .unwrap();

        assert_eq!(latest_for_url(dir.path(), url), Some(file));
    }

    #[test]
    fn test_record_json_shape() {
        let record = LegacyRecord {
            url: "https://hub.example/x".into(),
            etag: "\"abc\"".into(),
        };
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["url"], "https://hub.example/x");
        assert_eq!(json["etag"], "\"abc\"");
    }
}
