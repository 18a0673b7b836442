//! # artifetch-hub
//!
//! Download engine for versioned artifacts hosted on a Hugging Face style
//! hub, with a content-addressed on-disk cache shared safely between
//! processes.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use artifetch_hub::{ArtifactKey, Destination, DownloadOptions, HubClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = HubClient::from_env()?;
//!     let key = ArtifactKey::new("julien-c/EsperBERTo-small", "config.json")?;
//!     let path = client
//!         .resolve(&key, &Destination::default(), &DownloadOptions::default())
//!         .await?;
//!     println!("config at {}", path.display());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;
pub mod headers;
pub mod http;
pub mod integrity;
pub mod legacy;
pub mod local_dir;
pub mod lock;
pub mod pointer;
pub mod probe;
pub mod repo;
pub mod resolver;
pub mod settings;
mod status;
mod transfer;

pub use cache::{CacheLookup, CacheStore, CachedRepo};
pub use error::{HubError, HubResult};
pub use headers::{parse_header_pairs, TokenSource};
pub use http::ProxyConfig;
pub use pointer::PointerKind;
pub use probe::{hub_url, normalize_etag, RemoteMetadata};
pub use repo::{is_commit_hash, is_sha256, ArtifactKey, RepoKind, DEFAULT_REVISION};
pub use resolver::{Destination, DownloadOptions, HubClient};
pub use settings::HubSettings;
