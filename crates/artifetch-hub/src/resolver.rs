//! The `resolve` entry point: probing, cache logic and the offline fallback
//! policy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use indicatif::MultiProgress;
use reqwest::header::HeaderMap;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheLookup, CacheStore};
use crate::error::{HubError, HubResult};
use crate::headers::{build_headers, TokenSource};
use crate::http::{transfer_headers, HttpClients, ProxyConfig};
use crate::lock::FileLock;
use crate::pointer::PointerKind;
use crate::probe::{self, RemoteMetadata};
use crate::repo::ArtifactKey;
use crate::settings::HubSettings;
use crate::transfer::{TransferEngine, TransferRequest, DEFAULT_RETRY_DELAY};
use crate::{legacy, local_dir};

/// Where a resolved file should end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// The shared content-addressed cache (`None` = configured root).
    Cache(Option<PathBuf>),
    /// Plain files mirrored into `dir`. `cache_dir` is consulted for blobs
    /// that can be copied instead of downloaded.
    LocalDir {
        dir: PathBuf,
        cache_dir: Option<PathBuf>,
    },
    /// Flat `sha256(url).sha256(etag)` files (`None` = configured root).
    Legacy(Option<PathBuf>),
}

impl Default for Destination {
    fn default() -> Self {
        Destination::Cache(None)
    }
}

/// Per-call transfer options.
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    pub force_download: bool,
    pub local_files_only: bool,
    pub proxies: Option<ProxyConfig>,
    /// Sent with every request; wins over generated headers.
    pub headers: HeaderMap,
    pub token: TokenSource,
    pub etag_timeout: Option<Duration>,
    pub transfer_timeout: Option<Duration>,
    /// Appended to the generated `User-Agent`.
    pub user_agent: Option<String>,
    /// Overrides the configured hub endpoint.
    pub endpoint: Option<String>,
}

// ─── Client ───────────────────────────────────────────────────────────────────

/// Entry point of the engine.
pub struct HubClient {
    settings: HubSettings,
    clients: HttpClients,
    progress: Option<MultiProgress>,
    retry_delay: Duration,
    pointer_kinds: Mutex<HashMap<PathBuf, Arc<OnceLock<PointerKind>>>>,
}

impl HubClient {
    pub fn new(settings: HubSettings) -> HubResult<Self> {
        Ok(Self {
            settings,
            clients: HttpClients::new(None)?,
            progress: None,
            retry_delay: DEFAULT_RETRY_DELAY,
            pointer_kinds: Mutex::new(HashMap::new()),
        })
    }

    /// Client configured from the process environment.
    pub fn from_env() -> HubResult<Self> {
        Self::new(HubSettings::from_env())
    }

    /// Show transfer progress bars in `mp`.
    pub fn with_progress(mut self, mp: MultiProgress) -> Self {
        self.progress = Some(mp);
        self
    }

    /// Pause between transfer retries.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    /// Canonical download URL for `key` on the configured endpoint.
    pub fn hub_url(&self, key: &ArtifactKey) -> HubResult<Url> {
        probe::hub_url(&self.settings.endpoint, key)
    }

    /// The cache store rooted at `cache_dir` (or the configured root).
    ///
    /// Symlink support is probed at most once per cache directory, on the
    /// first link made there.
    pub fn cache_store(&self, cache_dir: Option<&Path>) -> CacheStore {
        let root = cache_dir.unwrap_or(&self.settings.cache_dir);
        let root = crate::settings::expand_tilde(root);
        let slot = self
            .pointer_kinds
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(root.clone())
            .or_default()
            .clone();
        CacheStore::with_pointer_slot(root, slot)
    }

    /// Look a file up in the cache without any network access.
    pub fn try_load_from_cache(
        &self,
        key: &ArtifactKey,
        cache_dir: Option<&Path>,
    ) -> HubResult<CacheLookup> {
        self.cache_store(cache_dir).lookup(key)
    }

    /// Probe the hub for `key`.
    pub async fn file_metadata(
        &self,
        key: &ArtifactKey,
        options: &DownloadOptions,
    ) -> HubResult<RemoteMetadata> {
        self.context(key, options)?.probe().await
    }

    /// Make `key` available on local disk and return its path.
    pub async fn resolve(
        &self,
        key: &ArtifactKey,
        destination: &Destination,
        options: &DownloadOptions,
    ) -> HubResult<PathBuf> {
        let ctx = self.context(key, options)?;
        match destination {
            Destination::Cache(cache_dir) => {
                let store = self.cache_store(cache_dir.as_deref());
                resolve_in_cache(&ctx, &store).await
            }
            Destination::LocalDir { dir, cache_dir } => {
                let store = self.cache_store(cache_dir.as_deref());
                local_dir::resolve(&ctx, dir, &store).await
            }
            Destination::Legacy(cache_dir) => {
                let root = crate::settings::expand_tilde(
                    cache_dir.as_deref().unwrap_or(&self.settings.cache_dir),
                );
                legacy::resolve(&ctx, &root).await
            }
        }
    }

    fn context<'a>(
        &'a self,
        key: &'a ArtifactKey,
        options: &'a DownloadOptions,
    ) -> HubResult<CallContext<'a>> {
        let clients = match options.proxies {
            Some(ref proxies) => HttpClients::new(Some(proxies))?,
            None => self.clients.clone(),
        };
        let headers = build_headers(
            &self.settings,
            &options.token,
            options.user_agent.as_deref(),
            &options.headers,
        )?;
        let endpoint = options
            .endpoint
            .as_deref()
            .unwrap_or(&self.settings.endpoint);
        let url = probe::hub_url(endpoint, key)?;
        let transfer = TransferEngine::new(
            clients.transfer.clone(),
            options
                .transfer_timeout
                .unwrap_or(self.settings.download_timeout),
            self.retry_delay,
            self.progress.clone(),
        );
        Ok(CallContext {
            key,
            options,
            offline: self.settings.offline,
            etag_timeout: self.settings.effective_etag_timeout(options.etag_timeout),
            clients,
            headers,
            url,
            transfer,
        })
    }
}

// ─── Per-call state ───────────────────────────────────────────────────────────

/// Everything one `resolve` call needs, computed up front.
pub(crate) struct CallContext<'a> {
    pub key: &'a ArtifactKey,
    pub options: &'a DownloadOptions,
    offline: bool,
    etag_timeout: Duration,
    pub clients: HttpClients,
    pub headers: HeaderMap,
    /// Canonical URL of the file.
    pub url: Url,
    pub transfer: TransferEngine,
}

impl CallContext<'_> {
    pub fn force(&self) -> bool {
        self.options.force_download
    }

    /// Error for a call that may not use the network, if this is one.
    pub fn network_disabled(&self) -> Option<HubError> {
        let reason = if self.options.local_files_only {
            "`local_files_only` is set"
        } else if self.offline {
            "offline mode is enabled (HF_HUB_OFFLINE)"
        } else {
            return None;
        };
        Some(HubError::OfflineMode {
            repo_id: self.key.repo_id().to_string(),
            revision: self.key.revision().to_string(),
            reason: reason.to_string(),
        })
    }

    pub fn etag_timeout(&self) -> Duration {
        self.etag_timeout
    }

    /// Fetch remote metadata, unless the network is off for this call.
    pub async fn probe(&self) -> HubResult<RemoteMetadata> {
        if let Some(err) = self.network_disabled() {
            return Err(err);
        }
        probe::fetch_metadata(
            &self.clients.probe,
            self.url.clone(),
            &self.headers,
            self.etag_timeout,
            self.key,
        )
        .await
    }

    /// Headers for fetching the bytes from `location`.
    pub fn transfer_headers(&self, location: &Url) -> HeaderMap {
        transfer_headers(&self.headers, &self.url, location)
    }

    /// Decide what a failed probe means given what is on disk.
    ///
    /// `local` is the copy that could stand in for the remote file.
    pub fn fallback(&self, err: HubError, local: Option<PathBuf>) -> HubResult<PathBuf> {
        let repo_id = self.key.repo_id().to_string();
        let revision = self.key.revision().to_string();

        if err.is_probe_fatal() {
            return Err(err);
        }
        match (self.force(), self.options.local_files_only, local) {
            (true, true, _) => Err(HubError::ConflictingFlags { repo_id, revision }),
            (true, false, _) => Err(HubError::ForceDownloadUnavailable {
                repo_id,
                revision,
                cause: Box::new(err),
            }),
            (false, true, Some(path)) => {
                debug!(path = %path.display(), "Using local copy (local_files_only)");
                Ok(path)
            }
            (false, true, None) => Err(HubError::LocalEntryNotFound {
                repo_id,
                revision,
                path: self.key.path().to_string(),
                reason: "no cached copy and network access is disabled (`local_files_only`)"
                    .to_string(),
                cause: None,
            }),
            (false, false, Some(path)) => {
                warn!(
                    file = %self.key.label(),
                    path = %path.display(),
                    error = %err,
                    "Could not reach the hub; using the local copy, which may be outdated"
                );
                Ok(path)
            }
            (false, false, None) if err.is_access_denied() => Err(err),
            (false, false, None) => Err(HubError::LocalEntryNotFound {
                repo_id,
                revision,
                path: self.key.path().to_string(),
                reason: "the hub could not be reached and no cached copy exists. \
                         Check your connection, or pass a cache containing the file"
                    .to_string(),
                cause: Some(Box::new(err)),
            }),
        }
    }
}

// ─── Cache store flow ─────────────────────────────────────────────────────────

pub(crate) async fn resolve_in_cache(ctx: &CallContext<'_>, store: &CacheStore) -> HubResult<PathBuf> {
    let key = ctx.key;

    if key.is_commit_pinned() && !ctx.force() {
        let pointer = store.pointer_path(key, key.revision())?;
        if pointer.exists() {
            debug!(file = %key.label(), "Commit-pinned cache hit");
            return Ok(pointer);
        }
    }

    let meta = match ctx.probe().await {
        Ok(meta) => meta,
        Err(err) => {
            if let HubError::EntryNotFound {
                commit_hash: Some(ref commit),
                ..
            } = err
            {
                if let Err(e) = store.mark_nonexistent(key, commit) {
                    debug!(error = %e, "Could not record missing entry");
                }
            }
            let local = if ctx.force() {
                None
            } else {
                store.cached_pointer(key)
            };
            return ctx.fallback(err, local);
        }
    };

    let blob = store.blob_path(key, &meta.etag)?;
    let pointer = store.pointer_path(key, &meta.commit_hash)?;
    store.write_ref(key, &meta.commit_hash)?;

    for dir in [blob.parent(), pointer.parent()].into_iter().flatten() {
        std::fs::create_dir_all(dir).map_err(HubError::Io)?;
    }

    if !ctx.force() {
        if pointer.exists() {
            debug!(file = %key.label(), "Cache hit");
            return Ok(pointer);
        }
        if blob.exists() {
            debug!(file = %key.label(), "Blob cached, linking snapshot");
            store.link(&blob, &pointer, false)?;
            return Ok(pointer);
        }
    }

    let lock = FileLock::acquire(store.lock_path(key, &meta.etag)?).await?;
    if !ctx.force() && pointer.exists() {
        debug!(file = %key.label(), "Resolved by a concurrent download");
        return Ok(pointer);
    }
    let incomplete = blob.with_file_name(format!("{}.incomplete", meta.etag));
    let headers = ctx.transfer_headers(&meta.location);
    let downloaded = ctx
        .transfer
        .download_to_tmp_and_move(&TransferRequest {
            key,
            url: &meta.location,
            headers: &headers,
            incomplete: &incomplete,
            destination: &blob,
            expected_size: Some(meta.size),
            force: ctx.force(),
        })
        .await?;
    store.link(&blob, &pointer, downloaded)?;
    drop(lock);

    info!(file = %key.label(), path = %pointer.display(), "Resolved");
    Ok(pointer)
}
