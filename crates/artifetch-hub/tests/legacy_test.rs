//! The flat, hash-named cache layout.

mod common;

use artifetch_hub::legacy::{latest_for_url, url_to_filename, LegacyRecord};
use artifetch_hub::{ArtifactKey, Destination, DownloadOptions, HubError};
use common::*;
use wiremock::MockServer;

fn key() -> ArtifactKey {
    ArtifactKey::new(REPO, "config.json").unwrap()
}

#[tokio::test]
async fn download_is_named_by_url_and_etag_hashes() {
    let server = MockServer::start().await;
    mount_file(&server, "config.json", ETAG, BODY).await;
    let cache = tempfile::tempdir().unwrap();
    let client = client(&server.uri(), cache.path());

    let url = client.hub_url(&key()).unwrap().to_string();
    let path = client
        .resolve(&key(), &Destination::Legacy(None), &DownloadOptions::default())
        .await
        .unwrap();

    let raw_etag = format!("\"{ETAG}\"");
    assert_eq!(path, cache.path().join(url_to_filename(&url, Some(&raw_etag))));
    assert_eq!(std::fs::read(&path).unwrap(), BODY);

    let sidecar = path.with_file_name(format!(
        "{}.json",
        path.file_name().unwrap().to_string_lossy()
    ));
    let record: LegacyRecord =
        serde_json::from_str(&std::fs::read_to_string(sidecar).unwrap()).unwrap();
    assert_eq!(record.url, url);
    assert_eq!(record.etag, raw_etag);
}

#[tokio::test]
async fn local_only_uses_latest_download_for_url() {
    let server = MockServer::start().await;
    mount_file(&server, "config.json", ETAG, BODY).await;
    let cache = tempfile::tempdir().unwrap();
    let first = client(&server.uri(), cache.path())
        .resolve(&key(), &Destination::Legacy(None), &DownloadOptions::default())
        .await
        .unwrap();

    let url = client(&server.uri(), cache.path())
        .hub_url(&key())
        .unwrap()
        .to_string();
    assert_eq!(latest_for_url(cache.path(), &url), Some(first.clone()));

    let before = server.received_requests().await.unwrap().len();
    let client = client(&server.uri(), cache.path());
    let options = DownloadOptions {
        local_files_only: true,
        ..Default::default()
    };
    let path = client
        .resolve(&key(), &Destination::Legacy(None), &options)
        .await
        .unwrap();
    assert_eq!(path, first);

    let other = ArtifactKey::new(REPO, "other.json").unwrap();
    let err = client
        .resolve(&other, &Destination::Legacy(None), &options)
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::LocalEntryNotFound { .. }), "got {err:?}");
    assert_eq!(server.received_requests().await.unwrap().len(), before);
}
