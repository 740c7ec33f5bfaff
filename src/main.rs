// privlens - privacy analysis history, dashboard and Q&A
//
// Keeps the history of per-site privacy analyses, derives dashboard
// statistics from it, and answers questions grounded in one analysis.
//
// Architecture:
// - Storage: durable append-only history (SQLite) behind the HistoryStore trait
// - Background: single owner of the store and the answer provider
// - Messaging: typed request/response channel between UI commands and the background
// - Dashboard / Q&A: thin clients of the channel
// - CLI (clap): record, import, dashboard, ask, chat, native-messaging host

mod aggregate;
mod answer;
mod background;
mod cli;
mod config;
mod dashboard;
mod error;
mod logging;
mod messaging;
mod model;
mod qa;
mod storage;

use anyhow::Result;
use answer::OfflineAnswerer;
use background::Background;
use clap::Parser;
use cli::{App, Cli, Commands};
use config::Config;
use messaging::Transport;
use std::sync::{Arc, Mutex};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config commands run without logging or storage
    if let Commands::Config { show, reset, path } = cli.command {
        return cli::handle_config(show, reset, path);
    }

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();

    let config = Config::from_env()?;

    // Guard keeps the file writer flushing until main returns
    let _log_guard = logging::init(&config.logging);

    tracing::debug!(
        "Config: db={}, provider={}, duplicates={}",
        config.db_path.display(),
        config.preferred_api_provider,
        config.duplicate_policy.as_str()
    );

    let store = storage::open(&config)?;
    let (transport, background) =
        Background::spawn(store, Arc::new(OfflineAnswerer), config.channel_buffer);

    let transport: Arc<dyn Transport> = match config.request_timeout() {
        Some(timeout) => Arc::new(transport.with_timeout(timeout)),
        None => Arc::new(transport),
    };
    let app = App {
        transport,
        provider: Arc::new(Mutex::new(config.preferred_api_provider.clone())),
    };

    let result = cli::run(cli.command, &app).await;

    // Dropping the last transport closes the channel and lets the background drain
    drop(app);
    if let Err(e) = background.await {
        tracing::error!("Background task failed: {}", e);
    }

    result
}
