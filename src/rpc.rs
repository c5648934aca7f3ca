use crate::error::{WatchError, WatchResult};
use crate::repository::normalize_address;
use alloy::providers::{DynProvider, IpcConnect, Provider, ProviderBuilder};
use alloy::rpc::json_rpc::{RpcError, RpcRecv, RpcSend};
use alloy::rpc::types::BlockNumberOrTag;
use alloy::transports::TransportError;
use alloy_primitives::{Address, B256, U64, U256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

const NO_PARAMS: [(); 0] = [];

/// A transaction as far as transfer matching cares.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionView {
    pub hash: String,
    /// Normalized sender
    pub from: String,
    /// Normalized recipient, `None` for contract creation
    pub to: Option<String>,
    /// Amount in minor units
    pub value: U256,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockView {
    pub number: u64,
    pub transactions: Vec<TransactionView>,
}

/// Node RPC surface used by the loops and the management CLI.
///
/// Each loop owns its own client; implementations need not serialize concurrent
/// callers beyond what `Send + Sync` requires.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Liveness probe. Never fails, a broken node is simply `false`.
    async fn is_connected(&self) -> bool;

    async fn block_number(&self) -> WatchResult<u64>;

    /// Block `number` with transaction bodies inlined.
    async fn get_full_block(&self, number: u64) -> WatchResult<BlockView>;

    /// Latest balance in minor units.
    async fn get_balance(&self, address: &str) -> WatchResult<U256>;

    async fn peer_count(&self) -> WatchResult<u64>;

    async fn syncing_status(&self) -> WatchResult<Value>;

    async fn txpool_status(&self) -> Option<Value>;

    async fn admin_peers(&self) -> Option<Value>;

    async fn miner_status(&self) -> Option<Value> {
        None
    }

    async fn hashrate(&self) -> Option<u64> {
        None
    }
}

#[async_trait]
impl<T: ChainClient + ?Sized> ChainClient for Arc<T> {
    async fn is_connected(&self) -> bool {
        (**self).is_connected().await
    }

    async fn block_number(&self) -> WatchResult<u64> {
        (**self).block_number().await
    }

    async fn get_full_block(&self, number: u64) -> WatchResult<BlockView> {
        (**self).get_full_block(number).await
    }

    async fn get_balance(&self, address: &str) -> WatchResult<U256> {
        (**self).get_balance(address).await
    }

    async fn peer_count(&self) -> WatchResult<u64> {
        (**self).peer_count().await
    }

    async fn syncing_status(&self) -> WatchResult<Value> {
        (**self).syncing_status().await
    }

    async fn txpool_status(&self) -> Option<Value> {
        (**self).txpool_status().await
    }

    async fn admin_peers(&self) -> Option<Value> {
        (**self).admin_peers().await
    }

    async fn miner_status(&self) -> Option<Value> {
        (**self).miner_status().await
    }

    async fn hashrate(&self) -> Option<u64> {
        (**self).hashrate().await
    }
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    #[serde(default)]
    transactions: Vec<RawTransaction>,
}

// Only the fields transfer matching needs, so non-standard headers still decode.
#[derive(Debug, Deserialize)]
struct RawTransaction {
    hash: B256,
    from: Address,
    #[serde(default)]
    to: Option<Address>,
    #[serde(default)]
    value: U256,
}

impl From<RawTransaction> for TransactionView {
    fn from(tx: RawTransaction) -> Self {
        TransactionView {
            hash: format!("{:?}", tx.hash),
            from: normalize_address(&format!("{:?}", tx.from)),
            to: tx.to.map(|to| normalize_address(&format!("{to:?}"))),
            value: tx.value,
        }
    }
}

/// IPC-backed client with lazy (re)connection.
///
/// A transport failure drops the connection; the next call dials the socket again,
/// which is how a node restart is survived.
#[derive(Clone)]
pub struct RpcClient {
    ipc_path: String,
    provider: Arc<Mutex<Option<DynProvider>>>,
    request_timeout: Duration,
    max_retries: usize,
}

impl RpcClient {
    pub fn new(ipc_path: &str, request_timeout: Duration) -> WatchResult<Self> {
        if ipc_path.trim().is_empty() {
            return Err(WatchError::Connectivity(
                "node IPC path must not be empty".to_string(),
            ));
        }

        Ok(RpcClient {
            ipc_path: ipc_path.to_string(),
            provider: Arc::new(Mutex::new(None)),
            request_timeout,
            max_retries: 3,
        })
    }

    pub fn ipc_path(&self) -> &str {
        &self.ipc_path
    }

    async fn get_provider(&self) -> WatchResult<DynProvider> {
        let mut slot = self.provider.lock().await;
        if let Some(provider) = slot.as_ref() {
            return Ok(provider.clone());
        }

        let connect = ProviderBuilder::new().connect_ipc(IpcConnect::new(self.ipc_path.clone()));
        let provider = match timeout(self.request_timeout, connect).await {
            Ok(Ok(provider)) => provider.erased(),
            Ok(Err(e)) => {
                return Err(WatchError::Connectivity(format!(
                    "cannot open {}: {}",
                    self.ipc_path, e
                )));
            }
            Err(_) => {
                return Err(WatchError::Connectivity(format!(
                    "connecting to {} timed out after {} seconds",
                    self.ipc_path,
                    self.request_timeout.as_secs()
                )));
            }
        };

        info!("Connected to node at {}", self.ipc_path);
        *slot = Some(provider.clone());
        Ok(provider)
    }

    async fn reset_provider(&self) {
        let mut slot = self.provider.lock().await;
        if slot.take().is_some() {
            debug!("Dropped IPC connection to {}", self.ipc_path);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> + use<> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(self.max_retries)
    }

    async fn handle_error(&self, method: &str, error: TransportError) -> WatchError {
        match error {
            RpcError::Transport(e) => {
                warn!(
                    "RPC transport error on {} ({}): {}, reconnecting",
                    self.ipc_path, method, e
                );
                self.reset_provider().await;
                WatchError::Connectivity(format!("{method}: {e}"))
            }
            RpcError::DeserError { err, .. } => {
                WatchError::Data(format!("{method}: cannot decode response: {err}"))
            }
            RpcError::NullResp => WatchError::Data(format!("{method}: null response")),
            other => WatchError::Data(format!("{method}: {other}")),
        }
    }

    async fn handle_timeout(&self, method: &str) -> WatchError {
        warn!(
            "Request {} timed out after {} seconds on {}, reconnecting",
            method,
            self.request_timeout.as_secs(),
            self.ipc_path
        );
        self.reset_provider().await;
        WatchError::Connectivity(format!(
            "{method}: timed out after {} seconds",
            self.request_timeout.as_secs()
        ))
    }

    async fn call<P, R>(&self, method: &'static str, params: P) -> WatchResult<R>
    where
        P: RpcSend,
        R: RpcRecv,
    {
        let provider = self.get_provider().await?;
        match timeout(
            self.request_timeout,
            provider.raw_request::<P, R>(method.into(), params),
        )
        .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(self.handle_error(method, e).await),
            Err(_) => Err(self.handle_timeout(method).await),
        }
    }

    /// Retries connectivity failures only; a malformed payload will not fix itself.
    async fn call_with_retry<P, R>(&self, method: &'static str, params: P) -> WatchResult<R>
    where
        P: RpcSend + Clone,
        R: RpcRecv,
    {
        RetryIf::spawn(
            self.get_retry_strategy(),
            || self.call::<P, R>(method, params.clone()),
            |e: &WatchError| matches!(e, WatchError::Connectivity(_)),
        )
        .await
    }

    pub async fn get_transaction(&self, hash: &str) -> WatchResult<Option<Value>> {
        let hash: B256 = hash
            .trim()
            .parse()
            .map_err(|_| WatchError::Data(format!("invalid transaction hash: {hash}")))?;
        self.call("eth_getTransactionByHash", (hash,)).await
    }
}

fn parse_address(address: &str) -> WatchResult<Address> {
    normalize_address(address)
        .parse()
        .map_err(|_| WatchError::InvalidAddress(address.to_string()))
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn is_connected(&self) -> bool {
        match self.call::<_, String>("web3_clientVersion", NO_PARAMS).await {
            Ok(version) => {
                debug!("Node reachable: {}", version);
                true
            }
            Err(e) => {
                debug!("Node not reachable: {}", e);
                false
            }
        }
    }

    async fn block_number(&self) -> WatchResult<u64> {
        let number: U64 = self.call_with_retry("eth_blockNumber", NO_PARAMS).await?;
        Ok(number.to::<u64>())
    }

    async fn get_full_block(&self, number: u64) -> WatchResult<BlockView> {
        let block: Option<RawBlock> = self
            .call_with_retry(
                "eth_getBlockByNumber",
                (BlockNumberOrTag::Number(number), true),
            )
            .await?;

        let block =
            block.ok_or_else(|| WatchError::Data(format!("block {number} not found")))?;

        Ok(BlockView {
            number,
            transactions: block.transactions.into_iter().map(Into::into).collect(),
        })
    }

    async fn get_balance(&self, address: &str) -> WatchResult<U256> {
        let address = parse_address(address)?;
        self.call("eth_getBalance", (address, BlockNumberOrTag::Latest))
            .await
    }

    async fn peer_count(&self) -> WatchResult<u64> {
        let count: U64 = self.call("net_peerCount", NO_PARAMS).await?;
        Ok(count.to::<u64>())
    }

    async fn syncing_status(&self) -> WatchResult<Value> {
        self.call("eth_syncing", NO_PARAMS).await
    }

    async fn txpool_status(&self) -> Option<Value> {
        self.call("txpool_status", NO_PARAMS).await.ok()
    }

    async fn admin_peers(&self) -> Option<Value> {
        self.call("admin_peers", NO_PARAMS).await.ok()
    }

    async fn miner_status(&self) -> Option<Value> {
        self.call("miner_status", NO_PARAMS).await.ok()
    }

    async fn hashrate(&self) -> Option<u64> {
        self.call::<_, U64>("eth_hashrate", NO_PARAMS)
            .await
            .ok()
            .map(|rate| rate.to::<u64>())
    }
}
