//! Snapshot pointers into `blobs/`: relative symlinks where the filesystem
//! allows them, plain files otherwise.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{HubError, HubResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Symlink,
    /// Move freshly downloaded blobs into place, copy existing ones.
    Copy,
}

impl PointerKind {
    /// Find out whether symlinks can be created inside `dir` by making one.
    pub fn detect(dir: &Path) -> PointerKind {
        let probe = || -> std::io::Result<()> {
            std::fs::create_dir_all(dir)?;
            let scratch = tempfile::Builder::new()
                .prefix(".symlink-probe")
                .tempdir_in(dir)?;
            let target = scratch.path().join("target");
            std::fs::write(&target, b"")?;
            make_symlink(Path::new("target"), &scratch.path().join("link"))
        };
        match probe() {
            Ok(()) => PointerKind::Symlink,
            Err(e) => {
                warn!(
                    dir = %dir.display(),
                    error = %e,
                    "Symlinks not supported here; cached files will be stored as copies"
                );
                PointerKind::Copy
            }
        }
    }

    /// Make `pointer` refer to `blob`.
    ///
    /// An existing pointer is left alone, except in copy mode when `new_blob`
    /// is set, where the fresh content replaces it.
    pub fn link(self, blob: &Path, pointer: &Path, new_blob: bool) -> HubResult<()> {
        let exists = pointer.symlink_metadata().is_ok();
        if let Some(parent) = pointer.parent() {
            std::fs::create_dir_all(parent).map_err(HubError::Io)?;
        }

        if self == PointerKind::Symlink {
            if exists {
                debug!(pointer = %pointer.display(), "Pointer already exists");
                return Ok(());
            }
            let relative = relative_to(blob, pointer.parent().unwrap_or(Path::new("")));
            match make_symlink(&relative, pointer) {
                Ok(()) => return Ok(()),
                Err(e) => warn!(
                    pointer = %pointer.display(),
                    error = %e,
                    "Symlink creation failed; falling back to a copy"
                ),
            }
        }

        if exists && !new_blob {
            return Ok(());
        }
        if new_blob {
            debug!(blob = %blob.display(), pointer = %pointer.display(), "Moving blob into snapshot");
            std::fs::rename(blob, pointer).map_err(HubError::Io)?;
        } else {
            debug!(blob = %blob.display(), pointer = %pointer.display(), "Copying blob into snapshot");
            std::fs::copy(blob, pointer).map_err(HubError::Io)?;
        }
        Ok(())
    }
}

/// Path of `target` as seen from directory `from`. Both must be absolute
/// or both relative to the same base.
pub(crate) fn relative_to(target: &Path, from: &Path) -> PathBuf {
    let target: Vec<Component> = target.components().collect();
    let from: Vec<Component> = from.components().collect();
    let common = target
        .iter()
        .zip(from.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for part in &target[common..] {
        rel.push(part.as_os_str());
    }
    rel
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(not(any(unix, windows)))]
fn make_symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks are not available on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_to() {
        let blob = Path::new("/c/models--a--b/blobs/abc");
        let from = Path::new("/c/models--a--b/snapshots/123/sub");
        assert_eq!(
            relative_to(blob, from),
            PathBuf::from("../../../blobs/abc")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_pointer_is_relative() {
        let dir = tempfile::tempdir().unwrap();
        let blob = dir.path().join("blobs").join("abc");
        std::fs::create_dir_all(blob.parent().unwrap()).unwrap();
        std::fs::write(&blob, b"content").unwrap();
        let pointer = dir.path().join("snapshots").join("123").join("config.json");

        assert_eq!(PointerKind::detect(dir.path()), PointerKind::Symlink);
        PointerKind::Symlink.link(&blob, &pointer, true).unwrap();

        let target = std::fs::read_link(&pointer).unwrap();
        assert_eq!(target, PathBuf::from("../../blobs/abc"));
        assert_eq!(std::fs::read(&pointer).unwrap(), b"content");
        // probe leaves nothing behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".symlink-probe"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_copy_mode_moves_new_blobs_and_copies_old_ones() {
        let dir = tempfile::tempdir().unwrap();
        let blob = dir.path().join("blob");
        let pointer = dir.path().join("snap").join("file");

        std::fs::write(&blob, b"v1").unwrap();
        PointerKind::Copy.link(&blob, &pointer, false).unwrap();
        assert!(blob.exists());
        assert_eq!(std::fs::read(&pointer).unwrap(), b"v1");

        std::fs::write(&blob, b"v2").unwrap();
        PointerKind::Copy.link(&blob, &pointer, false).unwrap();
        assert_eq!(std::fs::read(&pointer).unwrap(), b"v1");

        PointerKind::Copy.link(&blob, &pointer, true).unwrap();
        assert!(!blob.exists());
        assert_eq!(std::fs::read(&pointer).unwrap(), b"v2");
    }
}
