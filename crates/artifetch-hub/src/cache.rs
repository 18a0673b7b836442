use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::error::{HubError, HubResult};
use crate::pointer::PointerKind;
use crate::repo::{self, join_within, ArtifactKey, RepoKind};
use crate::settings::expand_tilde;

/// Outcome of a cache lookup that never touches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// The snapshot holds the file.
    Found(PathBuf),
    /// The hub has confirmed the file does not exist at this commit.
    NonExistent,
    /// Nothing known locally.
    Missing,
}

/// One repository folder found by [`CacheStore::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRepo {
    pub kind: RepoKind,
    pub repo_id: String,
    pub path: PathBuf,
    /// Revision name -> commit hash.
    pub refs: BTreeMap<String, String>,
    /// Commit hashes with a snapshot directory.
    pub snapshots: Vec<String>,
    /// Bytes stored in `blobs/`.
    pub size_on_disk: u64,
}

/// The content-addressed cache.
///
/// Layout under the root, one folder per repository:
/// `<kind>s--<owner>--<name>/{blobs/<etag>, refs/<revision>,
/// snapshots/<commit>/<path>, .no_exist/<commit>/<path>, .locks/<etag>.lock}`
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    /// Filled on the first link, so read-only use never touches the disk.
    pointer_kind: Arc<OnceLock<PointerKind>>,
}

impl CacheStore {
    /// Nothing is created on disk until something is stored.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_pointer_slot(root, Arc::default())
    }

    /// Store whose symlink probe result is shared through `slot`.
    pub(crate) fn with_pointer_slot(
        root: impl Into<PathBuf>,
        slot: Arc<OnceLock<PointerKind>>,
    ) -> Self {
        Self {
            root: expand_tilde(&root.into()),
            pointer_kind: slot,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage folder of the key's repository.
    pub fn repo_folder(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(key.folder_name())
    }

    pub fn blob_path(&self, key: &ArtifactKey, etag: &str) -> HubResult<PathBuf> {
        let name = single_component(key, etag, "ETag")?;
        Ok(self.repo_folder(key).join("blobs").join(name))
    }

    /// `snapshots/<commit>/<path>`; the result is guaranteed to stay inside
    /// `snapshots/<commit>/`.
    pub fn pointer_path(&self, key: &ArtifactKey, commit_hash: &str) -> HubResult<PathBuf> {
        let commit = single_component(key, commit_hash, "commit hash")?;
        let snapshot = self.repo_folder(key).join("snapshots").join(commit);
        join_within(&snapshot, key.path())
            .ok_or_else(|| key.invalid_path("path escapes the snapshot directory"))
    }

    pub fn lock_path(&self, key: &ArtifactKey, etag: &str) -> HubResult<PathBuf> {
        let name = single_component(key, etag, "ETag")?;
        Ok(self
            .repo_folder(key)
            .join(".locks")
            .join(format!("{name}.lock")))
    }

    fn ref_path(&self, key: &ArtifactKey) -> HubResult<PathBuf> {
        join_within(&self.repo_folder(key).join("refs"), key.revision())
            .ok_or_else(|| key.invalid_path(format!("invalid revision '{}'", key.revision())))
    }

    fn no_exist_path(&self, key: &ArtifactKey, commit_hash: &str) -> HubResult<PathBuf> {
        let commit = single_component(key, commit_hash, "commit hash")?;
        let base = self.repo_folder(key).join(".no_exist").join(commit);
        join_within(&base, key.path())
            .ok_or_else(|| key.invalid_path("path escapes the snapshot directory"))
    }

    // ─── Refs ─────────────────────────────────────────────────────────────────

    /// Commit hash the key's revision last resolved to.
    pub fn read_ref(&self, key: &ArtifactKey) -> Option<String> {
        let path = self.ref_path(key).ok()?;
        std::fs::read_to_string(path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Record `revision -> commit_hash`. No-op when the revision is the commit
    /// itself or the stored value is already right, so read-only caches keep
    /// working.
    pub fn write_ref(&self, key: &ArtifactKey, commit_hash: &str) -> HubResult<()> {
        if key.revision() == commit_hash || self.read_ref(key).as_deref() == Some(commit_hash) {
            return Ok(());
        }
        let path = self.ref_path(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(HubError::Io)?;
        }
        std::fs::write(&path, commit_hash).map_err(HubError::Io)?;
        debug!(revision = key.revision(), commit = commit_hash, "Updated ref");
        Ok(())
    }

    /// Commit the key's revision resolves to without asking the hub.
    pub fn local_commit(&self, key: &ArtifactKey) -> Option<String> {
        if key.is_commit_pinned() {
            Some(key.revision().to_string())
        } else {
            self.read_ref(key)
        }
    }

    /// Existing pointer for the key, if the revision can be resolved locally.
    pub fn cached_pointer(&self, key: &ArtifactKey) -> Option<PathBuf> {
        let commit = self.local_commit(key)?;
        self.pointer_path(key, &commit)
            .ok()
            .filter(|p| p.exists())
    }

    // ─── Negative lookups ─────────────────────────────────────────────────────

    /// Remember that `key.path` does not exist at `commit_hash`.
    pub fn mark_nonexistent(&self, key: &ArtifactKey, commit_hash: &str) -> HubResult<()> {
        let path = self.no_exist_path(key, commit_hash)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(HubError::Io)?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(HubError::Io)?;
        self.write_ref(key, commit_hash)
    }

    /// Offline lookup: ref, then the negative cache, then the snapshot.
    pub fn lookup(&self, key: &ArtifactKey) -> HubResult<CacheLookup> {
        let Some(commit) = self.local_commit(key) else {
            return Ok(CacheLookup::Missing);
        };
        if self.no_exist_path(key, &commit)?.exists() {
            return Ok(CacheLookup::NonExistent);
        }
        let pointer = self.pointer_path(key, &commit)?;
        if pointer.is_file() {
            Ok(CacheLookup::Found(pointer))
        } else {
            Ok(CacheLookup::Missing)
        }
    }

    /// Point the snapshot entry at its blob.
    pub fn link(&self, blob: &Path, pointer: &Path, new_blob: bool) -> HubResult<()> {
        let kind = *self
            .pointer_kind
            .get_or_init(|| PointerKind::detect(&self.root));
        kind.link(blob, pointer, new_blob)
    }

    // ─── Scan ─────────────────────────────────────────────────────────────────

    /// Every repository folder under the root. Unrecognised entries are skipped.
    pub fn scan(&self) -> HubResult<Vec<CachedRepo>> {
        let mut repos = Vec::new();
        if !self.root.exists() {
            return Ok(repos);
        }
        for entry in std::fs::read_dir(&self.root).map_err(HubError::Io)? {
            let entry = entry.map_err(HubError::Io)?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let Some((kind, repo_id)) = repo::parse_folder_name(&name) else {
                continue;
            };

            let mut refs = BTreeMap::new();
            collect_refs(&path.join("refs"), "", &mut refs);

            let mut snapshots: Vec<String> = std::fs::read_dir(path.join("snapshots"))
                .into_iter()
                .flatten()
                .flatten()
                .filter(|e| e.path().is_dir())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect();
            snapshots.sort();

            let size_on_disk = std::fs::read_dir(path.join("blobs"))
                .into_iter()
                .flatten()
                .flatten()
                .filter_map(|e| e.metadata().ok())
                .filter(|m| m.is_file())
                .map(|m| m.len())
                .sum();

            repos.push(CachedRepo {
                kind,
                repo_id,
                path,
                refs,
                snapshots,
                size_on_disk,
            });
        }
        repos.sort_by(|a, b| (a.kind.as_str(), &a.repo_id).cmp(&(b.kind.as_str(), &b.repo_id)));
        Ok(repos)
    }
}

/// Walk `refs/`, where names like `refs/pr/1` are nested files.
fn collect_refs(dir: &Path, prefix: &str, out: &mut BTreeMap<String, String>) {
    for entry in std::fs::read_dir(dir).into_iter().flatten().flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let full = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        let path = entry.path();
        if path.is_dir() {
            collect_refs(&path, &full, out);
        } else if let Ok(commit) = std::fs::read_to_string(&path) {
            out.insert(full, commit.trim().to_string());
        }
    }
}

/// Reject server-supplied names that are not a single plain path component.
fn single_component<'a>(key: &ArtifactKey, value: &'a str, what: &str) -> HubResult<&'a str> {
    let valid = !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\'])
        && !value.contains('\0');
    if valid {
        Ok(value)
    } else {
        Err(key.invalid_path(format!("invalid {what} '{value}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;

    const COMMIT: &str = "2439f60ef33a0d46d85da5001d52aeda5b00ce9f";

    fn temp_cache(suffix: &str) -> (CacheStore, PathBuf) {
        let dir = temp_dir().join(format!("artifetch_cache_test_{suffix}"));
        std::fs::remove_dir_all(&dir).ok();
        (
            CacheStore::with_pointer_slot(&dir, Arc::new(OnceLock::from(PointerKind::Copy))),
            dir,
        )
    }

    fn key() -> ArtifactKey {
        ArtifactKey::new("orgA/model-x", "config.json").unwrap()
    }

    #[test]
    fn test_layout_paths() {
        let (cache, dir) = temp_cache("layout");
        let k = key();
        let folder = dir.join("models--orgA--model-x");
        assert_eq!(cache.blob_path(&k, "abc123").unwrap(), folder.join("blobs").join("abc123"));
        assert_eq!(
            cache.pointer_path(&k, COMMIT).unwrap(),
            folder.join("snapshots").join(COMMIT).join("config.json")
        );
        assert_eq!(
            cache.lock_path(&k, "abc123").unwrap(),
            folder.join(".locks").join("abc123.lock")
        );
    }

    #[test]
    fn test_pointer_path_rejects_traversal() {
        let (cache, _dir) = temp_cache("traversal");
        let k = ArtifactKey::new("orgA/model-x", "../../../etc/passwd").unwrap();
        assert!(matches!(
            cache.pointer_path(&k, COMMIT),
            Err(HubError::InvalidPath { .. })
        ));
        assert!(cache.pointer_path(&key(), "../x").is_err());
        assert!(cache.blob_path(&key(), "a/b").is_err());
    }

    #[test]
    fn test_refs_written_only_when_changed() {
        let (cache, dir) = temp_cache("refs");
        let k = key();
        assert_eq!(cache.read_ref(&k), None);
        cache.write_ref(&k, COMMIT).unwrap();
        assert_eq!(cache.read_ref(&k).as_deref(), Some(COMMIT));

        let ref_file = dir.join("models--orgA--model-x").join("refs").join("main");
        std::fs::write(&ref_file, format!("{COMMIT}\n")).unwrap();
        cache.write_ref(&k, COMMIT).unwrap();
        assert_eq!(
            std::fs::read_to_string(&ref_file).unwrap(),
            format!("{COMMIT}\n"),
            "unchanged ref must not be rewritten"
        );

        let pinned = key().with_revision(COMMIT);
        cache.write_ref(&pinned, COMMIT).unwrap();
        assert!(!dir
            .join("models--orgA--model-x")
            .join("refs")
            .join(COMMIT)
            .exists());
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_lookup_states() {
        let (cache, dir) = temp_cache("lookup");
        let k = key();
        assert_eq!(cache.lookup(&k).unwrap(), CacheLookup::Missing);

        cache.mark_nonexistent(&k, COMMIT).unwrap();
        assert_eq!(cache.lookup(&k).unwrap(), CacheLookup::NonExistent);

        let other = ArtifactKey::new("orgA/model-x", "weights.bin").unwrap();
        assert_eq!(cache.lookup(&other).unwrap(), CacheLookup::Missing);

        let pointer = cache.pointer_path(&other, COMMIT).unwrap();
        std::fs::create_dir_all(pointer.parent().unwrap()).unwrap();
        std::fs::write(&pointer, b"w").unwrap();
        assert_eq!(cache.lookup(&other).unwrap(), CacheLookup::Found(pointer.clone()));
        assert_eq!(cache.cached_pointer(&other), Some(pointer));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_read_only_use_creates_nothing() {
        let dir = temp_dir().join("artifetch_cache_test_read_only");
        std::fs::remove_dir_all(&dir).ok();
        let cache = CacheStore::new(&dir);
        assert_eq!(cache.lookup(&key()).unwrap(), CacheLookup::Missing);
        assert!(cache.scan().unwrap().is_empty());
        assert_eq!(cache.cached_pointer(&key()), None);
        assert!(!dir.exists());
    }

    #[test]
    fn test_link_detects_pointer_kind_once() {
        let dir = temp_dir().join("artifetch_cache_test_lazy_link");
        std::fs::remove_dir_all(&dir).ok();
        let cache = CacheStore::new(&dir);
        let k = key();
        let blob = cache.blob_path(&k, "abc123").unwrap();
        std::fs::create_dir_all(blob.parent().unwrap()).unwrap();
        std::fs::write(&blob, b"{}").unwrap();

        let pointer = cache.pointer_path(&k, COMMIT).unwrap();
        cache.link(&blob, &pointer, false).unwrap();
        assert_eq!(std::fs::read(&pointer).unwrap(), b"{}");
        assert!(cache.pointer_kind.get().is_some());
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_scan_empty_cache() {
        let (cache, _dir) = temp_cache("scan_empty");
        assert!(cache.scan().unwrap().is_empty());
    }

    #[test]
    fn test_scan_reports_refs_snapshots_and_size() {
        let (cache, dir) = temp_cache("scan");
        let k = key().with_revision("refs/pr/1");
        cache.write_ref(&k, COMMIT).unwrap();
        let blob = cache.blob_path(&k, "abc123").unwrap();
        std::fs::create_dir_all(blob.parent().unwrap()).unwrap();
        std::fs::write(&blob, b"12345").unwrap();
        std::fs::create_dir_all(cache.pointer_path(&k, COMMIT).unwrap().parent().unwrap())
            .unwrap();
        std::fs::create_dir_all(dir.join(".locks")).unwrap();

        let repos = cache.scan().unwrap();
        assert_eq!(repos.len(), 1);
        let repo = &repos[0];
        assert_eq!(repo.kind, RepoKind::Model);
        assert_eq!(repo.repo_id, "orgA/model-x");
        assert_eq!(repo.refs.get("refs/pr/1").map(String::as_str), Some(COMMIT));
        assert_eq!(repo.snapshots, vec![COMMIT.to_string()]);
        assert_eq!(repo.size_on_disk, 5);
        std::fs::remove_dir_all(dir).ok();
    }
}
