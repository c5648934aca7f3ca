use anyhow::Result;
use clap::{Parser, Subcommand};
use cph_monitor::config::Config;
use cph_monitor::query::commands::{
    cmd_balance, cmd_status, cmd_tx, cmd_watch_add, cmd_watch_list, cmd_watch_remove,
};
use cph_monitor::query::formatters::OutputFormat;
use cph_monitor::repository::WatchlistRepository;
use cph_monitor::rpc::RpcClient;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "monitorctl")]
#[command(about = "Manage the watchlist and query the monitored node", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    /// Config file (defaults to $MONITOR_CONFIG or config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    WatchAdd {
        address: String,
    },
    WatchRemove {
        address: String,
    },
    WatchList {
        #[arg(long, default_value = "false")]
        balances: bool,
    },
    Status,
    Balance {
        address: String,
    },
    Tx {
        hash: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    let watchlist = WatchlistRepository::new(&config.wallet_watch.watchlist_path);
    let client = RpcClient::new(&config.node.ipc_path, config.node.request_timeout())?;
    let decimals = config.wallet_watch.decimals;
    let symbol = config.wallet_watch.symbol.as_str();

    match cli.command {
        Commands::WatchAdd { address } => {
            cmd_watch_add(&watchlist, &address, decimals, symbol, &format).await?;
        }
        Commands::WatchRemove { address } => {
            cmd_watch_remove(&watchlist, &address, decimals, symbol, &format).await?;
        }
        Commands::WatchList { balances } => {
            let client = balances.then_some(&client);
            cmd_watch_list(&watchlist, client, decimals, symbol, &format).await?;
        }
        Commands::Status => {
            cmd_status(&client, &format).await?;
        }
        Commands::Balance { address } => {
            cmd_balance(&client, &address, decimals, symbol, &format).await?;
        }
        Commands::Tx { hash } => {
            cmd_tx(&client, &hash, &format).await?;
        }
    }

    Ok(())
}
