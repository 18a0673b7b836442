//! Metadata probing: canonical URLs and the redirect-aware HEAD request.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, CONTENT_LENGTH, ETAG, LOCATION};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::error::{HubError, HubResult};
use crate::repo::ArtifactKey;
use crate::status::{self, HEADER_REPO_COMMIT};

pub const HEADER_LINKED_ETAG: &str = "X-Linked-Etag";
pub const HEADER_LINKED_SIZE: &str = "X-Linked-Size";

/// Relative redirects followed by hand before giving up.
const MAX_RELATIVE_REDIRECTS: usize = 10;

/// What the hub says about one file at one revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteMetadata {
    pub commit_hash: String,
    /// Normalized: no weak marker, no quotes.
    pub etag: String,
    /// Where the bytes are served from; a CDN host after an absolute redirect.
    pub location: Url,
    pub size: u64,
}

/// `<endpoint>/<prefix?><repo_id>/resolve/<revision>/<path>`.
///
/// Each segment is percent-encoded on its own and the revision is a single
/// segment, so `refs/pr/1` is sent as `refs%2Fpr%2F1`.
pub fn hub_url(endpoint: &str, key: &ArtifactKey) -> HubResult<Url> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| HubError::InvalidUrl(format!("endpoint '{endpoint}': {e}")))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| HubError::InvalidUrl(format!("endpoint '{endpoint}' cannot be a base")))?;
        segments.pop_if_empty();
        if let Some(prefix) = key.kind().url_prefix() {
            segments.push(prefix);
        }
        segments.extend(key.repo_id().split('/'));
        segments.push("resolve");
        segments.push(key.revision());
        segments.extend(key.path().split('/').filter(|s| !s.is_empty()));
    }
    Ok(url)
}

/// A probe response after relative redirects have been followed.
#[derive(Debug)]
pub(crate) struct ProbeResponse {
    /// URL of the last request made.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ProbeResponse {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Linked ETag, else the standard one, normalized.
    pub fn etag(&self) -> Option<String> {
        self.header(HEADER_LINKED_ETAG)
            .or_else(|| self.header(ETAG.as_str()))
            .map(normalize_etag)
            .filter(|e| !e.is_empty())
    }

    /// ETag exactly as sent, used by the flat cache for its file names.
    pub fn raw_etag(&self) -> Option<String> {
        self.header(HEADER_LINKED_ETAG)
            .or_else(|| self.header(ETAG.as_str()))
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
    }

    pub fn commit_hash(&self) -> Option<String> {
        self.header(HEADER_REPO_COMMIT).map(str::to_string)
    }

    /// Linked size, else `Content-Length`; unparsable values count as unknown.
    pub fn size(&self) -> Option<u64> {
        self.header(HEADER_LINKED_SIZE)
            .or_else(|| self.header(CONTENT_LENGTH.as_str()))
            .and_then(|v| v.trim().parse().ok())
    }

    /// Absolute `Location` of an unfollowed redirect.
    pub fn redirect_target(&self) -> Option<Url> {
        if !self.status.is_redirection() {
            return None;
        }
        self.header(LOCATION.as_str())
            .and_then(|loc| self.url.join(loc).ok())
    }
}

/// HEAD `url` with compression disabled, following only relative redirects.
pub(crate) async fn head(
    client: &reqwest::Client,
    url: Url,
    headers: &HeaderMap,
    timeout: Duration,
    key: &ArtifactKey,
) -> HubResult<ProbeResponse> {
    let mut current = url;
    for _ in 0..=MAX_RELATIVE_REDIRECTS {
        let response = client
            .head(current.clone())
            .headers(headers.clone())
            .header(ACCEPT_ENCODING, HeaderValue::from_static("identity"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| HubError::from_reqwest(current.as_str(), e))?;

        let status = response.status();
        let response_headers = response.headers().clone();

        if status.is_redirection() {
            let relative = response_headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .filter(|loc| is_relative_reference(loc))
                .and_then(|loc| current.join(loc).ok());
            if let Some(next) = relative {
                debug!(from = %current, to = %next, "Following relative redirect");
                current = next;
                continue;
            }
        }

        if let Some(err) = status::classify(status, &response_headers, &current, key) {
            return Err(err);
        }
        return Ok(ProbeResponse {
            url: current,
            status,
            headers: response_headers,
        });
    }

    Err(HubError::FileMetadata {
        repo_id: key.repo_id().to_string(),
        revision: key.revision().to_string(),
        reason: format!("more than {MAX_RELATIVE_REDIRECTS} relative redirects"),
    })
}

/// Probe `url` and require all four metadata fields.
pub(crate) async fn fetch_metadata(
    client: &reqwest::Client,
    url: Url,
    headers: &HeaderMap,
    timeout: Duration,
    key: &ArtifactKey,
) -> HubResult<RemoteMetadata> {
    let response = head(client, url, headers, timeout, key).await?;

    let missing = |what: &str| HubError::FileMetadata {
        repo_id: key.repo_id().to_string(),
        revision: key.revision().to_string(),
        reason: format!("server did not return {what}"),
    };

    let commit_hash = response
        .commit_hash()
        .ok_or_else(|| missing("a commit hash"))?;
    let etag = response.etag().ok_or_else(|| missing("an ETag"))?;
    let size = response.size().ok_or_else(|| missing("a file size"))?;
    let location = response
        .redirect_target()
        .unwrap_or_else(|| response.url.clone());

    Ok(RemoteMetadata {
        commit_hash,
        etag,
        location,
        size,
    })
}

/// Strip a leading `W/` and surrounding quotes.
pub fn normalize_etag(raw: &str) -> String {
    let raw = raw.trim();
    let raw = raw.strip_prefix("W/").unwrap_or(raw);
    raw.trim_matches('"').to_string()
}

/// A `Location` with neither scheme nor authority.
fn is_relative_reference(location: &str) -> bool {
    !location.starts_with("//")
        && matches!(
            Url::parse(location),
            Err(url::ParseError::RelativeUrlWithoutBase)
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::RepoKind;

    #[test]
    fn test_normalize_etag() {
        assert_eq!(normalize_etag("W/\"abc123\""), "abc123");
        assert_eq!(normalize_etag("\"abc123\""), "abc123");
        assert_eq!(normalize_etag("abc123"), "abc123");
    }

    #[test]
    fn test_hub_url_shapes() {
        let key = ArtifactKey::new("orgA/model-x", "config.json").unwrap();
        assert_eq!(
            hub_url("https://huggingface.co", &key).unwrap().as_str(),
            "https://huggingface.co/orgA/model-x/resolve/main/config.json"
        );

        let key = ArtifactKey::new("squad", "plain text/train.csv")
            .unwrap()
            .with_kind(RepoKind::Dataset)
            .with_revision("refs/pr/1");
        assert_eq!(
            hub_url("http://localhost:8080/", &key).unwrap().as_str(),
            "http://localhost:8080/datasets/squad/resolve/refs%2Fpr%2F1/plain%20text/train.csv"
        );

        let key = ArtifactKey::new("orgA/demo", "app.py")
            .unwrap()
            .with_kind(RepoKind::Space)
            .with_subfolder("src");
        assert_eq!(
            hub_url("https://mirror.example/hub", &key).unwrap().as_str(),
            "https://mirror.example/hub/spaces/orgA/demo/resolve/main/src/app.py"
        );
    }

    #[test]
    fn test_relative_reference_detection() {
        assert!(is_relative_reference("/api/resolve-cache/abc"));
        assert!(is_relative_reference("other/path"));
        assert!(!is_relative_reference("https://cdn.example/blob"));
        assert!(!is_relative_reference("//cdn.example/blob"));
    }

    #[test]
    fn test_size_is_lenient() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("12"));
        headers.insert(HEADER_LINKED_SIZE, HeaderValue::from_static("not-a-number"));
        let response = ProbeResponse {
            url: Url::parse("https://hub.example/x").unwrap(),
            status: StatusCode::OK,
            headers,
        };
        assert_eq!(response.size(), None);
        assert_eq!(response.redirect_target(), None);
    }
}
