use std::path::PathBuf;

use anyhow::Context;
use indicatif::MultiProgress;
use tracing::info;

use artifetch_hub::{parse_header_pairs, Destination, DownloadOptions, HubClient};

use crate::commands::{AuthArgs, FileArgs};
use crate::config::AppConfig;

/// Options specific to `artifetch download`.
#[derive(Debug, Clone, Default)]
pub struct DownloadRequest {
    pub local_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub force_download: bool,
    pub local_files_only: bool,
    pub legacy: bool,
    pub headers: Vec<String>,
}

impl DownloadRequest {
    fn destination(&self) -> Destination {
        match (&self.local_dir, self.legacy) {
            (Some(dir), _) => Destination::LocalDir {
                dir: dir.clone(),
                cache_dir: self.cache_dir.clone(),
            },
            (None, true) => Destination::Legacy(self.cache_dir.clone()),
            (None, false) => Destination::Cache(self.cache_dir.clone()),
        }
    }
}

/// Resolve one file and print where it landed.
pub async fn run(
    file: &FileArgs,
    auth: &AuthArgs,
    request: &DownloadRequest,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let key = file.key()?;
    let headers = parse_header_pairs(request.headers.iter().map(String::as_str))
        .context("Invalid --header value")?;
    let options = DownloadOptions {
        force_download: request.force_download,
        local_files_only: request.local_files_only,
        headers,
        token: auth.token_source(),
        ..Default::default()
    };
    let destination = request.destination();

    info!(file = %key.label(), destination = ?destination, "Resolving");

    let mut client = HubClient::new(config.hub_settings())?;
    if config.output.progress {
        client = client.with_progress(MultiProgress::new());
    }

    let path = client
        .resolve(&key, &destination, &options)
        .await
        .with_context(|| format!("Failed to download '{}'", key.label()))?;

    println!("{}", path.display());
    Ok(())
}
