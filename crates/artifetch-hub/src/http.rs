use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::redirect::Policy;
use reqwest::Proxy;
use url::Url;

use crate::error::{HubError, HubResult};

/// Proxy URLs keyed by scheme: `http`, `https` or `all`.
pub type ProxyConfig = BTreeMap<String, String>;

/// The two HTTP clients every call needs.
///
/// Probes must see redirects themselves (relative ones are followed by hand,
/// absolute ones are read but not followed), so the probe client never
/// follows. Transfers follow redirects normally.
#[derive(Debug, Clone)]
pub struct HttpClients {
    pub(crate) probe: reqwest::Client,
    pub(crate) transfer: reqwest::Client,
}

impl HttpClients {
    pub fn new(proxies: Option<&ProxyConfig>) -> HubResult<Self> {
        Ok(Self {
            probe: build_client(Policy::none(), proxies)?,
            transfer: build_client(Policy::default(), proxies)?,
        })
    }
}

fn build_client(policy: Policy, proxies: Option<&ProxyConfig>) -> HubResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder().redirect(policy);
    for (scheme, target) in proxies.into_iter().flatten() {
        let proxy = match scheme.as_str() {
            "http" => Proxy::http(target.as_str()),
            "https" => Proxy::https(target.as_str()),
            "all" => Proxy::all(target.as_str()),
            other => {
                return Err(HubError::InvalidUrl(format!(
                    "unsupported proxy scheme '{other}' (expected http, https or all)"
                )))
            }
        }
        .map_err(HubError::Client)?;
        builder = builder.proxy(proxy);
    }
    builder.build().map_err(HubError::Client)
}

/// Headers to send to `target` after probing `origin`: the bearer token is
/// only forwarded to the same host and port.
pub(crate) fn transfer_headers(headers: &HeaderMap, origin: &Url, target: &Url) -> HeaderMap {
    let mut headers = headers.clone();
    let same_host = origin.host_str() == target.host_str()
        && origin.port_or_known_default() == target.port_or_known_default();
    if !same_host {
        headers.remove(AUTHORIZATION);
    }
    headers
}
