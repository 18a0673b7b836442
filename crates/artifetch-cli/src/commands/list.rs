use std::path::Path;

use artifetch_hub::HubClient;

use crate::config::AppConfig;

/// List every repository stored in the cache.
pub fn run(cache_dir: Option<&Path>, config: &AppConfig) -> anyhow::Result<()> {
    let client = HubClient::new(config.hub_settings())?;
    let store = client.cache_store(cache_dir);
    let repos = store.scan()?;

    if repos.is_empty() {
        println!("No repositories cached in {}.", store.root().display());
        println!("Use `artifetch download <repo-id> <filename>` to fetch a file.");
        return Ok(());
    }

    println!(
        "{:<8} {:<45} {:<20} {:>12}",
        "TYPE", "REPO ID", "REFS", "SIZE"
    );
    println!("{}", "-".repeat(88));
    for repo in &repos {
        let refs = repo.refs.keys().cloned().collect::<Vec<_>>().join(",");
        println!(
            "{:<8} {:<45} {:<20} {:>12}",
            repo.kind.as_str(),
            repo.repo_id,
            if refs.is_empty() { "-".to_string() } else { refs },
            format_size(repo.size_on_disk)
        );
    }
    println!("\n{} repo(s) cached in {}", repos.len(), store.root().display());

    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
