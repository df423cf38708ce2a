//! chunkwire uploader entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Upload files in acknowledged chunks over a WebSocket channel.
#[derive(Parser, Debug)]
#[command(name = "chunkwire", version)]
pub struct Args {
    /// Files to upload, in order.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// WebSocket URL of the upload server.
    #[arg(long, short)]
    pub url: Option<String>,

    /// Identity to open the channel for.
    #[arg(long, short)]
    pub identity: Option<String>,

    /// Bytes per chunk.
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Per-reply timeout in milliseconds (0 waits forever).
    #[arg(long)]
    pub ack_timeout_ms: Option<u64>,

    /// Config file (defaults to ~/.config/chunkwire/config.toml).
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = config::Config::load(args.config.as_deref())?;
    config.apply(&args);
    tracing::info!(url = %config.url, files = args.files.len(), "starting upload");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, args.files))
}
