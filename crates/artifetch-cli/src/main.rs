use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;

use commands::{AuthArgs, FileArgs};
use config::load_config;

/// artifetch: fetch and cache files from a Hugging Face style hub
#[derive(Debug, Parser)]
#[command(name = "artifetch", version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    /// Path to a custom configuration file (TOML).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log format: "pretty" (default) or "json".
    #[arg(long, global = true, default_value = "pretty", value_name = "FORMAT")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download a file (or reuse the cached copy) and print its local path.
    Download {
        #[command(flatten)]
        file: FileArgs,

        #[command(flatten)]
        auth: AuthArgs,

        /// Mirror the file into this directory instead of the shared cache.
        #[arg(long, value_name = "DIR", conflicts_with = "legacy")]
        local_dir: Option<PathBuf>,

        /// Cache root (defaults to the configured one).
        #[arg(long, value_name = "DIR")]
        cache_dir: Option<PathBuf>,

        /// Re-download even if a cached copy exists.
        #[arg(long)]
        force_download: bool,

        /// Never touch the network; fail if the file is not cached.
        #[arg(long)]
        local_files_only: bool,

        /// Store the file in the flat, hash-named legacy layout.
        #[arg(long)]
        legacy: bool,

        /// Extra request header, `name: value`. May be repeated.
        #[arg(long = "header", short = 'H', value_name = "HEADER")]
        headers: Vec<String>,
    },

    /// Ask the hub for a file's commit, ETag, size and download location.
    Metadata {
        #[command(flatten)]
        file: FileArgs,

        #[command(flatten)]
        auth: AuthArgs,
    },

    /// Look a file up in the local cache without any network access.
    Lookup {
        #[command(flatten)]
        file: FileArgs,

        /// Cache root (defaults to the configured one).
        #[arg(long, value_name = "DIR")]
        cache_dir: Option<PathBuf>,
    },

    /// List repositories stored in the local cache.
    List {
        /// Cache root (defaults to the configured one).
        #[arg(long, value_name = "DIR")]
        cache_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_format);

    let cfg = load_config(cli.config.as_ref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Download {
            file,
            auth,
            local_dir,
            cache_dir,
            force_download,
            local_files_only,
            legacy,
            headers,
        } => {
            let request = commands::download::DownloadRequest {
                local_dir,
                cache_dir,
                force_download,
                local_files_only,
                legacy,
                headers,
            };
            commands::download::run(&file, &auth, &request, &cfg).await?;
        }
        Commands::Metadata { file, auth } => {
            commands::metadata::run(&file, &auth, &cfg).await?;
        }
        Commands::Lookup { file, cache_dir } => {
            commands::lookup::run(&file, cache_dir.as_deref(), &cfg)?;
        }
        Commands::List { cache_dir } => {
            commands::list::run(cache_dir.as_deref(), &cfg)?;
        }
    }

    Ok(())
}

fn init_tracing(log_format: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if log_format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }
}
