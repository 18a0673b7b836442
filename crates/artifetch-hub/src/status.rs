//! Turning hub HTTP error statuses into typed [`HubError`]s.

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use url::Url;

use crate::error::HubError;
use crate::repo::ArtifactKey;

pub const HEADER_ERROR_CODE: &str = "X-Error-Code";
pub const HEADER_ERROR_MESSAGE: &str = "X-Error-Message";
pub const HEADER_REPO_COMMIT: &str = "X-Repo-Commit";

const DISABLED_MESSAGE: &str = "Access to this resource is disabled.";

/// Map a non-success response onto a typed error. Returns `None` for
/// anything below 400.
///
/// `request_url` is the URL that was asked for, which decides whether a bare
/// 401 means "repository not found".
pub(crate) fn classify(
    status: StatusCode,
    headers: &HeaderMap,
    request_url: &Url,
    key: &ArtifactKey,
) -> Option<HubError> {
    if !(status.is_client_error() || status.is_server_error()) {
        return None;
    }

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let code = header(HEADER_ERROR_CODE);
    let message = header(HEADER_ERROR_MESSAGE);

    let repo_id = key.repo_id().to_string();
    let revision = key.revision().to_string();
    let url = request_url.to_string();

    let err = match code {
        Some("RevisionNotFound") => HubError::RevisionNotFound { repo_id, revision, url },
        Some("EntryNotFound") => HubError::EntryNotFound {
            repo_id,
            revision,
            path: key.path().to_string(),
            url,
            commit_hash: header(HEADER_REPO_COMMIT).map(str::to_string),
        },
        Some("GatedRepo") => HubError::GatedRepository { repo_id, revision, url },
        _ if message == Some(DISABLED_MESSAGE) => {
            HubError::DisabledRepository { repo_id, revision, url }
        }
        Some("RepoNotFound") => HubError::RepositoryNotFound { repo_id, revision, url },
        _ if status == StatusCode::UNAUTHORIZED && is_repo_api_url(request_url) => {
            HubError::RepositoryNotFound { repo_id, revision, url }
        }
        _ if status == StatusCode::BAD_REQUEST => HubError::BadRequest {
            repo_id,
            revision,
            url,
            message: message.unwrap_or("Bad request").to_string(),
        },
        _ if status == StatusCode::FORBIDDEN => HubError::Http {
            repo_id,
            revision,
            url,
            status: status.as_u16(),
            message: format!(
                "Forbidden: {}. Make sure your token has access to this content",
                message.unwrap_or("no details")
            ),
        },
        _ => {
            let kind = if status.is_client_error() {
                "Client Error"
            } else {
                "Server Error"
            };
            HubError::Http {
                repo_id,
                revision,
                url,
                status: status.as_u16(),
                message: match message {
                    Some(m) => format!("{kind}: {m}"),
                    None => kind.to_string(),
                },
            }
        }
    };
    Some(err)
}

/// `http(s)://host/api/{models,datasets,spaces}/...` or
/// `http(s)://host/<repo>/resolve/<rest>`.
pub(crate) fn is_repo_api_url(url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return false;
    }
    let segments: Vec<&str> = match url.path_segments() {
        Some(s) => s.collect(),
        None => return false,
    };
    match segments.as_slice() {
        ["api", "models" | "datasets" | "spaces", rest @ ..] => rest.iter().any(|s| !s.is_empty()),
        _ => segments
            .iter()
            .enumerate()
            .any(|(i, s)| *s == "resolve" && i > 0 && i + 1 < segments.len()),
    }
}
