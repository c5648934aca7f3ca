use anyhow::Result;
use clap::Parser;
use cph_monitor::config::Config;
use cph_monitor::log_tail::{LogTarget, LogWatcher};
use cph_monitor::notifier::TelegramNotifier;
use cph_monitor::peer_geo::PeerGeoService;
use cph_monitor::repository::{WatchStateRepository, WatchlistRepository};
use cph_monitor::rpc::RpcClient;
use cph_monitor::scanner::{ScanSettings, WalletScanner};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "monitor")]
#[command(about = "Watch a node for wallet transfers and log errors", long_about = None)]
struct Cli {
    /// Config file (defaults to $MONITOR_CONFIG or config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting node monitor");

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    info!("Configuration loaded");
    info!("Node IPC: {}", config.node.ipc_path);

    let notifier = Arc::new(TelegramNotifier::from_config(&config.telegram)?);
    if !notifier.is_enabled() {
        info!("Telegram notifications disabled");
    }

    let mut tasks = Vec::new();

    let scanner = WalletScanner::new(
        RpcClient::new(&config.node.ipc_path, config.node.request_timeout())?,
        Arc::clone(&notifier),
        WatchlistRepository::new(&config.wallet_watch.watchlist_path),
        WatchStateRepository::new(&config.wallet_watch.state_path),
        ScanSettings::from_config(&config)?,
    );
    tasks.push(tokio::spawn(async move { scanner.run().await }));

    match &config.log_watch {
        Some(log_watch) => {
            let targets = LogTarget::from_config(log_watch);
            info!("Tailing {} log file(s) in {}", targets.len(), log_watch.logs_dir.display());
            let watcher = Arc::new(LogWatcher::from_config(Arc::clone(&notifier), log_watch));
            tasks.extend(watcher.spawn_all(targets));
        }
        None => info!("No [log_watch] section, log tailing disabled"),
    }

    if config.peer_geo.enabled {
        let service = PeerGeoService::new(
            RpcClient::new(&config.node.ipc_path, config.node.request_timeout())?,
            &config.peer_geo,
        )?;
        tasks.push(tokio::spawn(async move { service.run().await }));
    } else {
        info!("Peer geo refresh disabled");
    }

    for result in futures::future::join_all(tasks).await {
        if let Err(e) = result {
            error!("Monitor task stopped: {}", e);
        }
    }

    Ok(())
}
