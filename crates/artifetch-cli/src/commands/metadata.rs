use anyhow::Context;

use artifetch_hub::{DownloadOptions, HubClient};

use crate::commands::{AuthArgs, FileArgs};
use crate::config::AppConfig;

/// Probe the hub for one file and print what it reports.
pub async fn run(file: &FileArgs, auth: &AuthArgs, config: &AppConfig) -> anyhow::Result<()> {
    let key = file.key()?;
    let client = HubClient::new(config.hub_settings())?;
    let options = DownloadOptions {
        token: auth.token_source(),
        ..Default::default()
    };

    let meta = client
        .file_metadata(&key, &options)
        .await
        .with_context(|| format!("Failed to fetch metadata for '{}'", key.label()))?;

    println!("{:<10} {}", "commit", meta.commit_hash);
    println!("{:<10} {}", "etag", meta.etag);
    println!("{:<10} {}", "size", meta.size);
    println!("{:<10} {}", "location", meta.location);
    Ok(())
}
