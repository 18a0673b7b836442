use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("Invalid repository kind '{0}'. Accepted kinds are: model, dataset, space")]
    InvalidRepoKind(String),

    #[error("Invalid repository id '{0}': expected '<owner>/<name>' or '<name>'")]
    InvalidRepoId(String),

    #[error("Invalid path '{path}' in '{repo_id}': {reason}")]
    InvalidPath {
        repo_id: String,
        path: String,
        reason: String,
    },

    #[error(
        "Repository '{repo_id}' not found (revision '{revision}', url {url}). \
         Check the repository id and kind; if the repository is private or gated, pass a token."
    )]
    RepositoryNotFound {
        repo_id: String,
        revision: String,
        url: String,
    },

    #[error(
        "Revision '{revision}' not found in '{repo_id}' (url {url}). \
         Use an existing branch, tag or commit hash."
    )]
    RevisionNotFound {
        repo_id: String,
        revision: String,
        url: String,
    },

    #[error("Entry '{path}' not found in '{repo_id}' at revision '{revision}' (url {url})")]
    EntryNotFound {
        repo_id: String,
        revision: String,
        path: String,
        url: String,
        /// Commit the server resolved the revision to, when it said so.
        commit_hash: Option<String>,
    },

    #[error(
        "Access to gated repository '{repo_id}' is restricted (revision '{revision}', url {url}). \
         Request access on the hub and pass a token."
    )]
    GatedRepository {
        repo_id: String,
        revision: String,
        url: String,
    },

    #[error(
        "Repository '{repo_id}' has been disabled (revision '{revision}', url {url}). \
         Access to this resource is disabled."
    )]
    DisabledRepository {
        repo_id: String,
        revision: String,
        url: String,
    },

    #[error("Bad request for '{repo_id}' at revision '{revision}' (url {url}): {message}")]
    BadRequest {
        repo_id: String,
        revision: String,
        url: String,
        message: String,
    },

    #[error("HTTP {status} for '{repo_id}' at revision '{revision}' (url {url}): {message}")]
    Http {
        repo_id: String,
        revision: String,
        url: String,
        status: u16,
        message: String,
    },

    #[error(
        "Invalid file metadata for '{repo_id}' at revision '{revision}': {reason}. \
         Check your proxy and firewall settings."
    )]
    FileMetadata {
        repo_id: String,
        revision: String,
        reason: String,
    },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Connection error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error(
        "Cannot reach the hub for '{repo_id}' at revision '{revision}': {reason}. \
         Unset `local_files_only` / offline mode to allow network access."
    )]
    OfflineMode {
        repo_id: String,
        revision: String,
        reason: String,
    },

    #[error("Cannot find '{path}' of '{repo_id}' at revision '{revision}' in the local cache: {reason}")]
    LocalEntryNotFound {
        repo_id: String,
        revision: String,
        path: String,
        reason: String,
        #[source]
        cause: Option<Box<HubError>>,
    },

    #[error(
        "Cannot pass `force_download` and `local_files_only` at the same time \
         ('{repo_id}' at revision '{revision}')"
    )]
    ConflictingFlags { repo_id: String, revision: String },

    #[error(
        "Force download of '{repo_id}' at revision '{revision}' failed: the hub could not be reached. \
         Check your connection or drop `force_download` to use the cached copy."
    )]
    ForceDownloadUnavailable {
        repo_id: String,
        revision: String,
        #[source]
        cause: Box<HubError>,
    },

    #[error(
        "Consistency check failed: file should be of size {expected} but has size {actual} ({file}). \
         Please retry with `force_download`."
    )]
    Consistency {
        file: String,
        expected: u64,
        actual: u64,
    },

    #[error("Failed to acquire lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Client(reqwest::Error),
}

impl HubError {
    /// Probe failures that are reported as-is instead of falling back to the
    /// local copy: the repository answered, and it said no.
    pub fn is_probe_fatal(&self) -> bool {
        matches!(
            self,
            HubError::RevisionNotFound { .. } | HubError::EntryNotFound { .. }
        )
    }

    /// Failures that surface unchanged when nothing is cached locally.
    pub(crate) fn is_access_denied(&self) -> bool {
        matches!(
            self,
            HubError::RepositoryNotFound { .. } | HubError::GatedRepository { .. }
        )
    }

    /// Transport-level failures worth retrying mid-transfer.
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            HubError::Timeout { .. } => true,
            HubError::Network { source, .. } => {
                source.is_timeout()
                    || source.is_connect()
                    || source.is_body()
                    || source.is_decode()
                    || source.is_request()
            }
            _ => false,
        }
    }

    pub(crate) fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            HubError::Timeout {
                url: url.to_string(),
            }
        } else {
            HubError::Network {
                url: url.to_string(),
                source,
            }
        }
    }
}

pub type HubResult<T> = Result<T, HubError>;
