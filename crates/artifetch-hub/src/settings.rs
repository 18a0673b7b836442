//! Environment-controlled defaults.
//!
//! Everything here is read once, either from the process environment
//! ([`HubSettings::from_env`]) or from an injected lookup function so tests
//! never have to mutate global state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";
pub const DEFAULT_ETAG_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 10;

const TRUE_VALUES: &[&str] = &["1", "ON", "YES", "TRUE"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubSettings {
    /// Base URL of the hub, without trailing slash.
    pub endpoint: String,
    /// Root of the content-addressed cache.
    pub cache_dir: PathBuf,
    /// File holding the user's access token.
    pub token_path: PathBuf,
    /// Token taken from `HF_TOKEN` / `HUGGING_FACE_HUB_TOKEN`, if set.
    #[serde(default)]
    pub env_token: Option<String>,
    /// Never touch the network.
    #[serde(default)]
    pub offline: bool,
    /// Timeout for metadata probes.
    #[serde(with = "secs")]
    pub etag_timeout: Duration,
    /// Set when `etag_timeout` came from `HF_HUB_ETAG_TIMEOUT`; it then wins
    /// over any per-call value.
    #[serde(default)]
    pub etag_timeout_pinned: bool,
    /// Timeout for connecting and for each body chunk during transfers.
    #[serde(with = "secs")]
    pub download_timeout: Duration,
    /// Do not send the cached token unless the caller asks for it.
    #[serde(default)]
    pub disable_implicit_token: bool,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl HubSettings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let hf_home = var("HF_HOME").map(PathBuf::from).unwrap_or_else(|| {
            var("XDG_CACHE_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(default_cache_home)
                .join("huggingface")
        });

        let cache_dir = var("HF_HUB_CACHE")
            .or_else(|| var("HUGGINGFACE_HUB_CACHE"))
            .map(|p| expand_tilde(Path::new(&p)))
            .unwrap_or_else(|| hf_home.join("hub"));

        let token_path = var("HF_TOKEN_PATH")
            .map(|p| expand_tilde(Path::new(&p)))
            .unwrap_or_else(|| hf_home.join("token"));

        let env_token = var("HF_TOKEN")
            .or_else(|| var("HUGGING_FACE_HUB_TOKEN"))
            .and_then(|t| clean_token(&t));

        let etag_env = var("HF_HUB_ETAG_TIMEOUT").and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            endpoint: var("HF_ENDPOINT")
                .map(|e| e.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            cache_dir,
            token_path,
            env_token,
            offline: is_true(var("HF_HUB_OFFLINE").as_deref()),
            etag_timeout: Duration::from_secs(etag_env.unwrap_or(DEFAULT_ETAG_TIMEOUT_SECS)),
            etag_timeout_pinned: etag_env.is_some(),
            download_timeout: Duration::from_secs(
                var("HF_HUB_DOWNLOAD_TIMEOUT")
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            ),
            disable_implicit_token: is_true(var("HF_HUB_DISABLE_IMPLICIT_TOKEN").as_deref()),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Probe timeout to use for a call that asked for `requested`.
    pub fn effective_etag_timeout(&self, requested: Option<Duration>) -> Duration {
        match requested {
            Some(d) if !self.etag_timeout_pinned => d,
            _ => self.etag_timeout,
        }
    }

    /// Read the stored token file, if any.
    pub fn read_token_file(&self) -> Option<String> {
        std::fs::read_to_string(&self.token_path)
            .ok()
            .and_then(|t| clean_token(&t))
    }
}

/// `1`, `ON`, `YES` and `TRUE`, in any case.
pub fn is_true(value: Option<&str>) -> bool {
    value.is_some_and(|v| TRUE_VALUES.contains(&v.trim().to_uppercase().as_str()))
}

/// Strip line breaks and surrounding whitespace; an empty token is no token.
pub(crate) fn clean_token(raw: &str) -> Option<String> {
    let cleaned = raw.replace(['\r', '\n'], "");
    let cleaned = cleaned.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

fn default_cache_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache")
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings_from(pairs: &[(&str, &str)]) -> HubSettings {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        HubSettings::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings_from(&[("HF_HOME", "/data/hf")]);
        assert_eq!(s.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(s.cache_dir, PathBuf::from("/data/hf/hub"));
        assert_eq!(s.token_path, PathBuf::from("/data/hf/token"));
        assert_eq!(s.etag_timeout, Duration::from_secs(10));
        assert_eq!(s.download_timeout, Duration::from_secs(10));
        assert!(!s.offline);
        assert!(!s.etag_timeout_pinned);
        assert_eq!(s.env_token, None);
    }

    #[test]
    fn test_cache_dir_precedence() {
        let s = settings_from(&[
            ("HF_HOME", "/data/hf"),
            ("HUGGINGFACE_HUB_CACHE", "/legacy"),
            ("HF_HUB_CACHE", "/new"),
        ]);
        assert_eq!(s.cache_dir, PathBuf::from("/new"));

        let s = settings_from(&[("HUGGINGFACE_HUB_CACHE", "/legacy")]);
        assert_eq!(s.cache_dir, PathBuf::from("/legacy"));

        let s = settings_from(&[("XDG_CACHE_HOME", "/xdg")]);
        assert_eq!(s.cache_dir, PathBuf::from("/xdg/huggingface/hub"));
    }

    #[test]
    fn test_flags_and_timeouts() {
        let s = settings_from(&[
            ("HF_HUB_OFFLINE", "yes"),
            ("HF_HUB_ETAG_TIMEOUT", "3"),
            ("HF_HUB_DOWNLOAD_TIMEOUT", "not-a-number"),
            ("HF_HUB_DISABLE_IMPLICIT_TOKEN", "0"),
            ("HF_ENDPOINT", "http://localhost:8080/"),
        ]);
        assert!(s.offline);
        assert_eq!(s.etag_timeout, Duration::from_secs(3));
        assert!(s.etag_timeout_pinned);
        assert_eq!(s.download_timeout, Duration::from_secs(10));
        assert!(!s.disable_implicit_token);
        assert_eq!(s.endpoint, "http://localhost:8080");
    }

    #[test]
    fn test_pinned_etag_timeout_wins() {
        let pinned = settings_from(&[("HF_HUB_ETAG_TIMEOUT", "3")]);
        assert_eq!(
            pinned.effective_etag_timeout(Some(Duration::from_secs(60))),
            Duration::from_secs(3)
        );
        let free = settings_from(&[]);
        assert_eq!(
            free.effective_etag_timeout(Some(Duration::from_secs(60))),
            Duration::from_secs(60)
        );
        assert_eq!(free.effective_etag_timeout(None), Duration::from_secs(10));
    }

    #[test]
    fn test_env_token_order_and_cleaning() {
        let s = settings_from(&[
            ("HF_TOKEN", "  hf_primary\r\n"),
            ("HUGGING_FACE_HUB_TOKEN", "hf_legacy"),
        ]);
        assert_eq!(s.env_token.as_deref(), Some("hf_primary"));

        let s = settings_from(&[("HUGGING_FACE_HUB_TOKEN", "hf_legacy")]);
        assert_eq!(s.env_token.as_deref(), Some("hf_legacy"));

        assert_eq!(clean_token("\n  \r"), None);
    }

    #[test]
    fn test_is_true() {
        for v in ["1", "on", "Yes", "TRUE"] {
            assert!(is_true(Some(v)), "{v}");
        }
        for v in ["0", "no", "auto", ""] {
            assert!(!is_true(Some(v)), "{v}");
        }
        assert!(!is_true(None));
    }
}
