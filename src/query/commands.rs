use crate::query::formatters::{
    OutputFormat, format_balance, format_status, format_transaction, format_watchlist,
};
use crate::repository::{WatchAddress, WatchlistRepository};
use crate::rpc::{ChainClient, RpcClient};
use alloy_primitives::U256;
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct WatchEntry {
    pub address: String,
    pub balance: Option<U256>,
}

/// Point-in-time view of the node, as reported over RPC.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syncing: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txpool: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mining_status: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashrate: Option<u64>,
}

impl NodeStatus {
    pub fn disconnected() -> Self {
        NodeStatus::default()
    }
}

pub async fn collect_node_status<C: ChainClient>(client: &C) -> Result<NodeStatus> {
    if !client.is_connected().await {
        return Ok(NodeStatus::disconnected());
    }

    Ok(NodeStatus {
        connected: true,
        block_number: Some(client.block_number().await?),
        peer_count: Some(client.peer_count().await?),
        syncing: Some(client.syncing_status().await?),
        txpool: client.txpool_status().await,
        mining_status: client.miner_status().await,
        hashrate: client.hashrate().await,
    })
}

/// Pairs each address with its balance; a failed lookup leaves the balance empty.
pub async fn collect_balances<C: ChainClient>(client: &C, addresses: &[String]) -> Vec<WatchEntry> {
    let mut entries = Vec::with_capacity(addresses.len());
    for address in addresses {
        let balance = match client.get_balance(address).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!("Failed to fetch balance for {}: {}", address, e);
                None
            }
        };
        entries.push(WatchEntry {
            address: address.clone(),
            balance,
        });
    }
    entries
}

fn plain_entries(addresses: Vec<String>) -> Vec<WatchEntry> {
    addresses
        .into_iter()
        .map(|address| WatchEntry {
            address,
            balance: None,
        })
        .collect()
}

pub async fn cmd_watch_add(
    repo: &WatchlistRepository,
    address: &str,
    decimals: u8,
    symbol: &str,
    format: &OutputFormat,
) -> Result<()> {
    let addresses = repo.add(address).await?;
    let output = format_watchlist(&plain_entries(addresses), decimals, symbol, format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_watch_remove(
    repo: &WatchlistRepository,
    address: &str,
    decimals: u8,
    symbol: &str,
    format: &OutputFormat,
) -> Result<()> {
    let addresses = repo.remove(address).await?;
    let output = format_watchlist(&plain_entries(addresses), decimals, symbol, format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_watch_list<C: ChainClient>(
    repo: &WatchlistRepository,
    client: Option<&C>,
    decimals: u8,
    symbol: &str,
    format: &OutputFormat,
) -> Result<()> {
    let addresses = repo.list().await?;
    let entries = match client {
        Some(client) => collect_balances(client, &addresses).await,
        None => plain_entries(addresses),
    };
    let output = format_watchlist(&entries, decimals, symbol, format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_status<C: ChainClient>(client: &C, format: &OutputFormat) -> Result<()> {
    let status = collect_node_status(client).await?;
    let output = format_status(&status, format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_balance<C: ChainClient>(
    client: &C,
    address: &str,
    decimals: u8,
    symbol: &str,
    format: &OutputFormat,
) -> Result<()> {
    let address = WatchAddress::parse(address)?;
    let balance = client.get_balance(address.as_str()).await?;
    let output = format_balance(address.as_str(), &balance, decimals, symbol, format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_tx(client: &RpcClient, hash: &str, format: &OutputFormat) -> Result<()> {
    let tx = client.get_transaction(hash).await?;
    let output = format_transaction(hash, tx.as_ref(), format);
    println!("{output}");

    Ok(())
}
