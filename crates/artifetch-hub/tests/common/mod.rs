//! Shared fixtures for the wiremock-backed tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use artifetch_hub::{HubClient, HubSettings};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub const REPO: &str = "orgA/model-x";
pub const COMMIT: &str = "2439f60ef33a0d46d85da5001d52aeda5b00ce9f";
pub const ETAG: &str = "a5d7e2bc2d7b8e0f1c6e4d12b3f0a7c9d8e1f2a3";
pub const BODY: &[u8] = b"hello world!";

/// Client with an empty environment, talking to `endpoint`.
pub fn client(endpoint: &str, cache_dir: &Path) -> HubClient {
    let settings = HubSettings::from_lookup(|_| None)
        .with_endpoint(endpoint)
        .with_cache_dir(cache_dir);
    HubClient::new(settings)
        .unwrap()
        .with_retry_delay(Duration::from_millis(10))
}

pub fn resolve_path(revision: &str, file: &str) -> String {
    format!("/{REPO}/resolve/{revision}/{file}")
}

/// A successful metadata probe for `file` at `revision`.
pub fn head_ok(etag: &str, size: usize) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("X-Repo-Commit", COMMIT)
        .insert_header("ETag", format!("\"{etag}\"").as_str())
        .insert_header("X-Linked-Size", size.to_string().as_str())
}

/// Mount HEAD and GET for `file` on the default branch.
pub async fn mount_file(server: &MockServer, file: &str, etag: &str, body: &[u8]) {
    Mock::given(method("HEAD"))
        .and(path(resolve_path("main", file)))
        .respond_with(head_ok(etag, body.len()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(resolve_path("main", file)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

pub async fn request_count(server: &MockServer, verb: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r: &&Request| r.method.as_str() == verb)
        .count()
}

pub fn repo_folder(cache: &Path) -> PathBuf {
    cache.join("models--orgA--model-x")
}
