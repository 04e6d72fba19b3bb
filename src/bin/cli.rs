use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use napster_provider as lib;
use lib::api::napster::NapsterProvider;
use lib::api::Provider;
use lib::config::Settings;
use lib::models::{CodecOptions, MediaType, Quality};
use lib::store::JsonFileStore;

#[derive(Parser)]
#[command(name = "napster-provider", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with the configured username/password and store the session
    Login,
    /// Search the catalog
    Search {
        /// Media type: track, album, playlist or artist
        media: MediaType,
        query: String,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show track metadata with bitrate/codec selection
    Track {
        id: String,
        /// Quality tier: minimum, low, medium, high, lossless or hifi
        #[arg(long)]
        quality: Option<Quality>,
    },
    /// Show album metadata and track list
    Album { id: String },
    /// Show playlist metadata and track list
    Playlist { id: String },
    /// Show artist metadata and album list
    Artist { id: String },
    /// Resolve the stream URL for a track at a bitrate/format
    DownloadUrl {
        track_id: String,
        #[arg(long)]
        bitrate: u32,
        #[arg(long)]
        codec: String,
    },
    /// Parse a deep link into entity type and id
    ParseUrl { url: String },
    /// Validate config file and exit
    ConfigValidate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // Resolve config path: explicit --config overrides; otherwise prefer
    // system-wide /etc/napster-provider/config.toml and fall back to the
    // repository example config for local/dev usage.
    let resolved_config_path: PathBuf = match &cli.config {
        Some(p) => p.clone(),
        None => {
            let etc_path = Path::new("/etc/napster-provider/config.toml");
            if etc_path.exists() {
                etc_path.to_path_buf()
            } else {
                PathBuf::from("config/example-config.toml")
            }
        }
    };

    let cfg = Settings::from_path(&resolved_config_path)
        .with_context(|| format!("loading config from {}", resolved_config_path.display()))?;

    // Initialize log->tracing bridge and structured logging.
    // Logs go to both stderr and a daily-rotated file in cfg.log_dir.
    let _ = LogTracer::init();
    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(&cfg.log_dir, "napster-provider.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer().with_writer(non_blocking);
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer);

    tracing_subscriber_global::set_global_default(subscriber)
        .expect("failed to set global tracing subscriber");

    if let Commands::ConfigValidate = cli.command {
        println!("OK");
        return Ok(());
    }

    let store = Arc::new(
        JsonFileStore::open(&cfg.session_path)
            .with_context(|| format!("opening session store {}", cfg.session_path.display()))?,
    );
    let provider = NapsterProvider::connect(&cfg, store)
        .await
        .with_context(|| "restoring provider session".to_string())?;

    match cli.command {
        Commands::Login => {
            provider
                .login(&cfg.username, &cfg.password)
                .await
                .with_context(|| "logging in".to_string())?;
            println!("Logged in; session saved to {}", cfg.session_path.display());
        }
        Commands::Search { media, query, limit } => {
            let results = provider
                .search(media, &query, None, limit.unwrap_or(cfg.search_limit))
                .await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Track { id, quality } => {
            let codecs = CodecOptions {
                proprietary_codecs: cfg.proprietary_codecs,
            };
            let info = provider
                .track_info(&id, quality.unwrap_or(cfg.quality), codecs, None)
                .await?;
            let credits = provider.track_credits(&id, &info.contributors);
            println!("{}", serde_json::to_string_pretty(&info)?);
            if !credits.is_empty() {
                println!("{}", serde_json::to_string_pretty(&credits)?);
            }
        }
        Commands::Album { id } => {
            let info = provider.album_info(&id, None).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Playlist { id } => {
            let info = provider.playlist_info(&id, None).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Artist { id } => {
            let info = provider.artist_info(&id).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::DownloadUrl {
            track_id,
            bitrate,
            codec,
        } => {
            let download = lib::models::DownloadParams {
                bitrate,
                codec,
                track_id,
            };
            let info = provider.track_download(&download).await?;
            println!("{}", info.url);
        }
        Commands::ParseUrl { url } => {
            let ident = provider.parse_url(&url)?;
            println!("{}", serde_json::to_string_pretty(&ident)?);
        }
        Commands::ConfigValidate => unreachable!(),
    }

    Ok(())
}
