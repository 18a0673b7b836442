use std::path::{Path, PathBuf};
use std::time::Duration;

use artifetch_hub::settings::expand_tilde;
use artifetch_hub::HubSettings;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Full runtime configuration loaded from TOML + env vars.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub hub: HubConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HubConfig {
    pub endpoint: String,
    pub cache_dir: String,
    pub offline: bool,
    pub etag_timeout_secs: u64,
    pub download_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Draw progress bars for transfers.
    pub progress: bool,
}

impl AppConfig {
    fn from_settings(settings: &HubSettings) -> Self {
        Self {
            hub: HubConfig {
                endpoint: settings.endpoint.clone(),
                cache_dir: settings.cache_dir.to_string_lossy().into_owned(),
                offline: settings.offline,
                etag_timeout_secs: settings.etag_timeout.as_secs(),
                download_timeout_secs: settings.download_timeout.as_secs(),
            },
            output: OutputConfig { progress: true },
        }
    }

    /// Engine settings: the environment's, overridden by this configuration.
    pub fn hub_settings(&self) -> HubSettings {
        let mut settings = HubSettings::from_env()
            .with_endpoint(self.hub.endpoint.as_str())
            .with_cache_dir(self.cache_dir())
            .with_offline(self.hub.offline);
        settings.etag_timeout = Duration::from_secs(self.hub.etag_timeout_secs);
        settings.download_timeout = Duration::from_secs(self.hub.download_timeout_secs);
        settings
    }

    /// `cache_dir` with `~` expanded.
    pub fn cache_dir(&self) -> PathBuf {
        expand_tilde(Path::new(&self.hub.cache_dir))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_settings(&HubSettings::from_env())
    }
}

/// Load configuration from:
/// 1. Defaults taken from the `HF_*` environment
/// 2. `config/default.toml` (if present)
/// 3. A custom config file path (if provided)
/// 4. Environment variables prefixed with `ARTIFETCH_`
pub fn load_config(config_file: Option<&PathBuf>) -> Result<AppConfig, ConfigError> {
    let defaults = AppConfig::default();

    let mut builder = Config::builder()
        // Layer 1: defaults
        .set_default("hub.endpoint", defaults.hub.endpoint)?
        .set_default("hub.cache_dir", defaults.hub.cache_dir)?
        .set_default("hub.offline", defaults.hub.offline)?
        .set_default("hub.etag_timeout_secs", defaults.hub.etag_timeout_secs)?
        .set_default("hub.download_timeout_secs", defaults.hub.download_timeout_secs)?
        .set_default("output.progress", defaults.output.progress)?
        // Layer 2: project default.toml
        .add_source(File::with_name("config/default").required(false));

    // Layer 3: optional user-supplied config file
    if let Some(path) = config_file {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    // Layer 4: environment variables (ARTIFETCH_HUB__ENDPOINT, etc.)
    builder = builder.add_source(
        Environment::with_prefix("ARTIFETCH")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
