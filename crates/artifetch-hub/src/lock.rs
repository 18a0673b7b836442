use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, info};

use crate::error::{HubError, HubResult};

/// Exclusive advisory lock on a file, released on drop.
///
/// The lock is held by the open file description, so two handles in the same
/// process exclude each other just like two processes do.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock without blocking the async runtime.
    pub async fn acquire(path: PathBuf) -> HubResult<Self> {
        let lock_path = path.clone();
        tokio::task::spawn_blocking(move || Self::acquire_blocking(&lock_path))
            .await
            .map_err(|e| HubError::Lock {
                path,
                source: std::io::Error::other(e),
            })?
    }

    /// Block until the lock at `path` is ours. Parent directories are
    /// created first.
    pub fn acquire_blocking(path: &Path) -> HubResult<Self> {
        let lock_err = |source: std::io::Error| HubError::Lock {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(lock_err)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(lock_err)?;

        if file.try_lock_exclusive().is_err() {
            info!(path = %path.display(), "Waiting for another download to release the lock");
            file.lock_exclusive().map_err(lock_err)?;
        }
        debug!(path = %path.display(), "Lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "Lock released");
    }
}
