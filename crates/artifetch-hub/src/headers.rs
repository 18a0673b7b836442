use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT};

use crate::error::{HubError, HubResult};
use crate::settings::HubSettings;

/// Library name reported in the `User-Agent` header.
const LIBRARY_NAME: &str = env!("CARGO_PKG_NAME");
const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Where the bearer token for a call comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TokenSource {
    /// Environment variables, then the token file, unless implicit tokens
    /// are disabled in the settings.
    #[default]
    Implicit,
    Explicit(String),
    /// Never send a token.
    Disabled,
}

impl TokenSource {
    pub fn resolve(&self, settings: &HubSettings) -> Option<String> {
        match self {
            TokenSource::Explicit(token) => crate::settings::clean_token(token),
            TokenSource::Disabled => None,
            TokenSource::Implicit if settings.disable_implicit_token => None,
            TokenSource::Implicit => settings
                .env_token
                .clone()
                .or_else(|| settings.read_token_file()),
        }
    }
}

/// Build the request headers for one call: `User-Agent`, optional
/// `Authorization`, then the caller's own headers on top.
pub fn build_headers(
    settings: &HubSettings,
    token: &TokenSource,
    user_agent: Option<&str>,
    extra: &HeaderMap,
) -> HubResult<HeaderMap> {
    let mut headers = HeaderMap::new();

    let ua = user_agent_string(user_agent);
    headers.insert(USER_AGENT, header_value(&ua)?);

    if let Some(token) = token.resolve(settings) {
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
    }

    for (name, value) in extra {
        headers.insert(name.clone(), value.clone());
    }
    Ok(headers)
}

/// `<library>/<version>; artifetch/<version>[; <suffix>]` with repeated
/// segments dropped, first occurrence wins.
pub fn user_agent_string(suffix: Option<&str>) -> String {
    let mut raw = format!("{LIBRARY_NAME}/{LIBRARY_VERSION}; artifetch/{LIBRARY_VERSION}");
    if let Some(suffix) = suffix.filter(|s| !s.trim().is_empty()) {
        raw.push_str("; ");
        raw.push_str(suffix);
    }

    let mut seen: Vec<&str> = Vec::new();
    for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        if !seen.contains(&part) {
            seen.push(part);
        }
    }
    seen.join("; ")
}

/// Parse `name: value` pairs supplied on the command line or in config.
pub fn parse_header_pairs<'a, I>(pairs: I) -> HubResult<HeaderMap>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut headers = HeaderMap::new();
    for pair in pairs {
        let (name, value) = pair
            .split_once(':')
            .ok_or_else(|| HubError::InvalidHeader(format!("expected 'name: value', got '{pair}'")))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| HubError::InvalidHeader(format!("{name}: {e}")))?;
        headers.insert(name, header_value(value.trim())?);
    }
    Ok(headers)
}

fn header_value(value: &str) -> HubResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| HubError::InvalidHeader(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> HubSettings {
        HubSettings::from_lookup(|_| None).with_cache_dir("/nonexistent")
    }

    #[test]
    fn test_explicit_token_sets_bearer() {
        let headers = build_headers(
            &settings(),
            &TokenSource::Explicit("hf_abc\n".into()),
            None,
            &HeaderMap::new(),
        )
        .unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer hf_abc");
        assert!(headers[USER_AGENT]
            .to_str()
            .unwrap()
            .contains("artifetch/"));
    }

    #[test]
    fn test_implicit_token_respects_disable_flag() {
        let mut s = settings();
        s.env_token = Some("hf_env".into());
        assert_eq!(TokenSource::Implicit.resolve(&s).as_deref(), Some("hf_env"));
        s.disable_implicit_token = true;
        assert_eq!(TokenSource::Implicit.resolve(&s), None);
        assert_eq!(
            TokenSource::Explicit("hf_x".into()).resolve(&s).as_deref(),
            Some("hf_x")
        );
        assert_eq!(TokenSource::Disabled.resolve(&s), None);
    }

    #[test]
    fn test_caller_headers_win() {
        let extra = parse_header_pairs(["User-Agent: custom/1.0", "X-Trace: abc"]).unwrap();
        let headers = build_headers(&settings(), &TokenSource::Disabled, None, &extra).unwrap();
        assert_eq!(headers[USER_AGENT], "custom/1.0");
        assert_eq!(headers["x-trace"], "abc");
        assert!(!headers.contains_key(AUTHORIZATION));
    }

    #[test]
    fn test_user_agent_deduplicates() {
        let ua = user_agent_string(Some("artifetch/0.0.0; tool/2; tool/2"));
        let parts: Vec<&str> = ua.split("; ").collect();
        assert_eq!(parts.iter().filter(|p| **p == "tool/2").count(), 1);
        assert!(parts[0].starts_with("artifetch-hub/"));
    }

    #[test]
    fn test_bad_header_pair() {
        assert!(matches!(
            parse_header_pairs(["no-colon"]),
            Err(HubError::InvalidHeader(_))
        ));
    }
}
