//! Repository identity: kinds, revisions and the `(repo, kind, revision, path)`
//! key every resolution is addressed by.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::error::{HubError, HubResult};

pub const DEFAULT_REVISION: &str = "main";

/// Separator used when a repo id is flattened into a single folder name.
/// `--` is not allowed inside repo ids on the hub.
pub const REPO_ID_SEPARATOR: &str = "--";

/// Category of a repository. Only `Model` has no URL prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RepoKind {
    #[default]
    Model,
    Dataset,
    Space,
}

impl RepoKind {
    pub const ALL: [RepoKind; 3] = [RepoKind::Model, RepoKind::Dataset, RepoKind::Space];

    pub fn as_str(&self) -> &'static str {
        match self {
            RepoKind::Model => "model",
            RepoKind::Dataset => "dataset",
            RepoKind::Space => "space",
        }
    }

    /// URL segment inserted before the repo id, if any.
    pub fn url_prefix(&self) -> Option<&'static str> {
        match self {
            RepoKind::Model => None,
            RepoKind::Dataset => Some("datasets"),
            RepoKind::Space => Some("spaces"),
        }
    }

    fn from_folder_prefix(prefix: &str) -> Option<Self> {
        RepoKind::ALL
            .into_iter()
            .find(|k| prefix.strip_suffix('s') == Some(k.as_str()))
    }
}

impl fmt::Display for RepoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepoKind {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "model" => Ok(RepoKind::Model),
            "dataset" => Ok(RepoKind::Dataset),
            "space" => Ok(RepoKind::Space),
            other => Err(HubError::InvalidRepoKind(other.to_string())),
        }
    }
}

/// Identifies one file of one repository at one revision.
///
/// `path` always uses `/` as separator (hub convention). On-disk locations
/// are derived from it with `join_within`, which refuses to leave the base.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    repo_id: String,
    kind: RepoKind,
    revision: String,
    path: String,
}

impl ArtifactKey {
    pub fn new(repo_id: impl Into<String>, path: impl Into<String>) -> HubResult<Self> {
        let repo_id = repo_id.into();
        validate_repo_id(&repo_id)?;
        let path = path.into();
        if path.is_empty() {
            return Err(HubError::InvalidPath {
                repo_id,
                path,
                reason: "path must not be empty".to_string(),
            });
        }
        Ok(Self {
            repo_id,
            kind: RepoKind::Model,
            revision: DEFAULT_REVISION.to_string(),
            path,
        })
    }

    pub fn with_kind(mut self, kind: RepoKind) -> Self {
        self.kind = kind;
        self
    }

    /// An empty revision means the default branch.
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        let revision = revision.into();
        self.revision = if revision.is_empty() {
            DEFAULT_REVISION.to_string()
        } else {
            revision
        };
        self
    }

    /// Prepend `subfolder` to the path. Empty subfolders are ignored.
    pub fn with_subfolder(mut self, subfolder: &str) -> Self {
        let subfolder = subfolder.trim_matches('/');
        if !subfolder.is_empty() {
            self.path = format!("{subfolder}/{}", self.path);
        }
        self
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    pub fn kind(&self) -> RepoKind {
        self.kind
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `true` when the revision is already a full commit hash.
    pub fn is_commit_pinned(&self) -> bool {
        is_commit_hash(&self.revision)
    }

    /// Flattened storage folder name, e.g. `models--julien-c--EsperBERTo-small`.
    pub fn folder_name(&self) -> String {
        let mut parts = vec![format!("{}s", self.kind.as_str())];
        parts.extend(self.repo_id.split('/').map(str::to_string));
        parts.join(REPO_ID_SEPARATOR)
    }

    /// Short human-readable label used in logs and transfer errors.
    pub fn label(&self) -> String {
        format!("{}@{}:{}", self.repo_id, self.revision, self.path)
    }

    pub(crate) fn invalid_path(&self, reason: impl Into<String>) -> HubError {
        HubError::InvalidPath {
            repo_id: self.repo_id.clone(),
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

/// Parse a storage folder name back into `(kind, repo_id)`.
pub(crate) fn parse_folder_name(name: &str) -> Option<(RepoKind, String)> {
    let mut parts = name.split(REPO_ID_SEPARATOR);
    let kind = RepoKind::from_folder_prefix(parts.next()?)?;
    let rest: Vec<&str> = parts.collect();
    if rest.is_empty() || rest.len() > 2 || rest.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some((kind, rest.join("/")))
}

fn validate_repo_id(repo_id: &str) -> HubResult<()> {
    let segments: Vec<&str> = repo_id.split('/').collect();
    let valid = !repo_id.is_empty()
        && segments.len() <= 2
        && !repo_id.contains(REPO_ID_SEPARATOR)
        && segments
            .iter()
            .all(|s| !s.is_empty() && *s != "." && *s != ".." && !s.contains('\\'));
    if valid {
        Ok(())
    } else {
        Err(HubError::InvalidRepoId(repo_id.to_string()))
    }
}

/// 40 hex characters: a git commit id.
pub fn is_commit_hash(value: &str) -> bool {
    value.len() == 40 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// 64 lowercase hex characters: a sha256 content hash (large-file ETag).
pub fn is_sha256(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Join a `/`-separated relative path onto `base`, refusing anything that
/// would leave `base` (absolute paths, `..` climbing above the root).
/// Purely lexical: neither path needs to exist.
pub(crate) fn join_within(base: &Path, relative: &str) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for segment in relative.split('/') {
        for component in Path::new(segment).components() {
            match component {
                Component::Normal(part) => parts.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    parts.pop()?;
                }
                Component::RootDir | Component::Prefix(_) => return None,
            }
        }
    }
    if parts.is_empty() {
        return None;
    }
    let mut joined = base.to_path_buf();
    joined.extend(parts);
    Some(joined)
}
