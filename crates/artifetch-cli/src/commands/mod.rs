pub mod download;
pub mod list;
pub mod lookup;
pub mod metadata;

use artifetch_hub::{ArtifactKey, RepoKind, TokenSource, DEFAULT_REVISION};
use clap::Args;

/// Identifies one file in one repository.
#[derive(Debug, Clone, Args)]
pub struct FileArgs {
    /// Repository id, e.g. `julien-c/EsperBERTo-small`.
    pub repo_id: String,

    /// File path inside the repository.
    pub filename: String,

    /// Branch, tag or commit hash.
    #[arg(long, default_value = DEFAULT_REVISION)]
    pub revision: String,

    /// Repository type: model, dataset or space.
    #[arg(long, default_value = "model")]
    pub repo_type: RepoKind,

    /// Folder inside the repository holding the file.
    #[arg(long)]
    pub subfolder: Option<String>,
}

impl FileArgs {
    pub fn key(&self) -> anyhow::Result<ArtifactKey> {
        let mut key = ArtifactKey::new(self.repo_id.as_str(), self.filename.as_str())?
            .with_kind(self.repo_type)
            .with_revision(self.revision.as_str());
        if let Some(ref subfolder) = self.subfolder {
            key = key.with_subfolder(subfolder);
        }
        Ok(key)
    }
}

/// How requests authenticate.
#[derive(Debug, Clone, Args)]
pub struct AuthArgs {
    /// Access token. Defaults to `HF_TOKEN` or the stored token file.
    #[arg(long, env = "ARTIFETCH_TOKEN", hide_env_values = true, conflicts_with = "no_token")]
    pub token: Option<String>,

    /// Send no token at all.
    #[arg(long)]
    pub no_token: bool,
}

impl AuthArgs {
    pub fn token_source(&self) -> TokenSource {
        match (&self.token, self.no_token) {
            (_, true) => TokenSource::Disabled,
            (Some(token), false) => TokenSource::Explicit(token.clone()),
            (None, false) => TokenSource::Implicit,
        }
    }
}
