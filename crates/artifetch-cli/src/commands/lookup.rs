use std::path::Path;

use artifetch_hub::{CacheLookup, HubClient};

use crate::commands::FileArgs;
use crate::config::AppConfig;

/// Report whether a file is cached, without touching the network.
pub fn run(file: &FileArgs, cache_dir: Option<&Path>, config: &AppConfig) -> anyhow::Result<()> {
    let key = file.key()?;
    let client = HubClient::new(config.hub_settings())?;

    match client.try_load_from_cache(&key, cache_dir)? {
        CacheLookup::Found(path) => println!("{}", path.display()),
        CacheLookup::NonExistent => {
            println!("'{}' is known not to exist at this revision.", key.label());
        }
        CacheLookup::Missing => {
            println!("'{}' is not cached.", key.label());
            println!("Use `artifetch download {} {}` to fetch it.", key.repo_id(), file.filename);
        }
    }
    Ok(())
}
