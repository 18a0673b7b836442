//! Plain-file mirror of a repository inside a user-chosen directory.
//!
//! Each downloaded file gets a sidecar under
//! `<dir>/.huggingface/download/<path>.metadata` holding the commit, the
//! ETag and the time it was written. A sidecar only counts while the file has
//! not been modified after that time.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::cache::{CacheLookup, CacheStore};
use crate::error::{HubError, HubResult};
use crate::integrity::matches_sha256;
use crate::lock::FileLock;
use crate::repo::{is_sha256, join_within, ArtifactKey};
use crate::resolver::CallContext;
use crate::transfer::TransferRequest;

pub const METADATA_DIR: &str = ".huggingface";

/// Allowed clock skew between writing a file and stamping its sidecar.
const MTIME_SKEW_SECS: f64 = 1.0;

/// On-disk locations for one file of a local directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPaths {
    pub file: PathBuf,
    pub lock: PathBuf,
    pub metadata: PathBuf,
}

impl LocalPaths {
    pub fn new(dir: &Path, key: &ArtifactKey) -> HubResult<Self> {
        let escape = || key.invalid_path(format!("path escapes '{}'", dir.display()));
        let file = join_within(dir, key.path()).ok_or_else(escape)?;
        let download = dir.join(METADATA_DIR).join("download");
        let metadata =
            join_within(&download, &format!("{}.metadata", key.path())).ok_or_else(escape)?;
        let lock = metadata.with_extension("lock");
        Ok(Self {
            file,
            lock,
            metadata,
        })
    }

    /// `<path>.<etag>.incomplete`, beside the sidecar.
    pub fn incomplete(&self, etag: &str) -> PathBuf {
        self.metadata.with_extension(format!("{etag}.incomplete"))
    }
}

/// Contents of a sidecar file.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFileRecord {
    pub commit_hash: String,
    pub etag: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

impl LocalFileRecord {
    fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines();
        let commit_hash = lines.next()?.trim().to_string();
        let etag = lines.next()?.trim().to_string();
        let timestamp = lines.next()?.trim().parse().ok()?;
        Some(Self {
            commit_hash,
            etag,
            timestamp,
        })
    }
}

/// Read the sidecar for `paths`, dropping it if unreadable or stale.
pub fn read_record(paths: &LocalPaths) -> Option<LocalFileRecord> {
    let text = std::fs::read_to_string(&paths.metadata).ok()?;
    let Some(record) = LocalFileRecord::parse(&text) else {
        warn!(path = %paths.metadata.display(), "Invalid metadata file, removing it");
        if let Err(e) = std::fs::remove_file(&paths.metadata) {
            warn!(path = %paths.metadata.display(), error = %e, "Could not remove metadata file");
        }
        return None;
    };

    let modified = std::fs::metadata(&paths.file)
        .and_then(|m| m.modified())
        .ok()?;
    if epoch_secs(modified) - MTIME_SKEW_SECS <= record.timestamp {
        Some(record)
    } else {
        info!(path = %paths.file.display(), "Ignoring outdated metadata");
        None
    }
}

/// Stamp the sidecar for `paths` with the current time.
pub fn write_record(dir: &Path, paths: &LocalPaths, commit_hash: &str, etag: &str) -> HubResult<()> {
    ensure_metadata_dir(dir)?;
    if let Some(parent) = paths.metadata.parent() {
        std::fs::create_dir_all(parent).map_err(HubError::Io)?;
    }
    let now = epoch_secs(SystemTime::now());
    std::fs::write(&paths.metadata, format!("{commit_hash}\n{etag}\n{now}\n"))
        .map_err(HubError::Io)
}

/// Create `<dir>/.huggingface/` with a `.gitignore` covering everything.
fn ensure_metadata_dir(dir: &Path) -> HubResult<()> {
    let meta_dir = dir.join(METADATA_DIR);
    std::fs::create_dir_all(&meta_dir).map_err(HubError::Io)?;
    // Several processes may race here; whoever loses just skips the write.
    if let Ok(mut f) = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(meta_dir.join(".gitignore"))
    {
        let _ = f.write_all(b"*");
    }
    Ok(())
}

fn epoch_secs(t: SystemTime) -> f64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

// ─── Resolution ───────────────────────────────────────────────────────────────

pub(crate) async fn resolve(
    ctx: &CallContext<'_>,
    dir: &Path,
    cache: &CacheStore,
) -> HubResult<PathBuf> {
    let key = ctx.key;
    let paths = LocalPaths::new(dir, key)?;
    let record = read_record(&paths);

    if !ctx.force()
        && key.is_commit_pinned()
        && paths.file.is_file()
        && record
            .as_ref()
            .is_some_and(|r| r.commit_hash == key.revision())
    {
        debug!(path = %paths.file.display(), "Commit-pinned local hit");
        return Ok(paths.file);
    }

    let meta = match ctx.probe().await {
        Ok(meta) => meta,
        Err(err) => {
            let local = (!ctx.force() && paths.file.is_file()).then(|| paths.file.clone());
            return ctx.fallback(err, local);
        }
    };

    if !ctx.force() {
        if paths.file.is_file() {
            if record.as_ref().is_some_and(|r| r.etag == meta.etag) {
                write_record(dir, &paths, &meta.commit_hash, &meta.etag)?;
                debug!(path = %paths.file.display(), "Local file up to date");
                return Ok(paths.file);
            }
            if is_sha256(&meta.etag) && matches_sha256(&paths.file, &meta.etag)? {
                write_record(dir, &paths, &meta.commit_hash, &meta.etag)?;
                info!(path = %paths.file.display(), "Local file matches remote hash");
                return Ok(paths.file);
            }
        }

        let pinned = key.clone().with_revision(meta.commit_hash.as_str());
        if let CacheLookup::Found(cached) = cache.lookup(&pinned)? {
            let _lock = FileLock::acquire(paths.lock.clone()).await?;
            if let Some(parent) = paths.file.parent() {
                std::fs::create_dir_all(parent).map_err(HubError::Io)?;
            }
            std::fs::copy(&cached, &paths.file).map_err(HubError::Io)?;
            write_record(dir, &paths, &meta.commit_hash, &meta.etag)?;
            info!(path = %paths.file.display(), "Copied from cache");
            return Ok(paths.file);
        }
    }

    let _lock = FileLock::acquire(paths.lock.clone()).await?;
    if !ctx.force()
        && paths.file.is_file()
        && read_record(&paths).is_some_and(|r| r.etag == meta.etag)
    {
        debug!(path = %paths.file.display(), "Resolved by a concurrent download");
        return Ok(paths.file);
    }
    match std::fs::remove_file(&paths.file) {
        Ok(()) => debug!(path = %paths.file.display(), "Removed outdated local file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(HubError::Io(e)),
    }
    let incomplete = paths.incomplete(&meta.etag);
    let headers = ctx.transfer_headers(&meta.location);
    ctx.transfer
        .download_to_tmp_and_move(&TransferRequest {
            key,
            url: &meta.location,
            headers: &headers,
            incomplete: &incomplete,
            destination: &paths.file,
            expected_size: Some(meta.size),
            force: ctx.force(),
        })
        .await?;
    write_record(dir, &paths, &meta.commit_hash, &meta.etag)?;
    Ok(paths.file)
}
