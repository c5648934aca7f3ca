use crate::config::{Config, ConfigError};
use crate::error::WatchResult;
use crate::events::AlertPolicy;
use crate::notifier::{Notifier, send_best_effort};
use crate::repository::{WatchStateRepository, WatchlistRepository};
use crate::rpc::ChainClient;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Fixed backoff after a disconnect or a failed iteration, independent of the poll interval.
pub const RETRY_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub poll_interval: Duration,
    pub policy: AlertPolicy,
}

impl ScanSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let watch = &config.wallet_watch;
        let mut policy = AlertPolicy::new(watch.min_amount, watch.decimals, &watch.symbol)?;
        policy.notify_incoming = watch.notify_incoming;
        policy.notify_outgoing = watch.notify_outgoing;

        Ok(ScanSettings {
            poll_interval: config.node.poll_interval(),
            policy,
        })
    }
}

/// What one iteration of the watch loop did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Node not reachable; a connectivity alert was attempted
    Disconnected,
    /// First run: cursor set to the current height, nothing scanned
    Initialized { height: u64 },
    /// No new blocks
    Idle { height: u64 },
    /// Nobody is watched; cursor moved to the current height without fetching
    FastForwarded { from: u64, to: u64 },
    /// Blocks `from..=to` evaluated
    CaughtUp { from: u64, to: u64, alerts: usize },
}

/// Block-by-block transfer watcher for the addresses in the watchlist.
///
/// The cursor and the watchlist are re-read from disk every iteration and the cursor
/// is persisted after each block, so a crash replays at most the block in flight.
/// Alerts for that block may be sent twice in that case.
pub struct WalletScanner<C, N: ?Sized> {
    client: C,
    notifier: Arc<N>,
    watchlist: WatchlistRepository,
    state: WatchStateRepository,
    settings: ScanSettings,
}

impl<C, N> WalletScanner<C, N>
where
    C: ChainClient,
    N: Notifier + ?Sized,
{
    pub fn new(
        client: C,
        notifier: Arc<N>,
        watchlist: WatchlistRepository,
        state: WatchStateRepository,
        settings: ScanSettings,
    ) -> Self {
        WalletScanner {
            client,
            notifier,
            watchlist,
            state,
            settings,
        }
    }

    /// Runs forever. Every failure is reported and followed by [`RETRY_DELAY`].
    pub async fn run(&self) {
        info!(
            "Starting wallet watch (poll every {:?}, threshold {} {})",
            self.settings.poll_interval,
            self.settings.policy.min_amount(),
            self.settings.policy.symbol()
        );

        loop {
            let delay = match self.tick().await {
                Ok(ScanOutcome::Disconnected) => RETRY_DELAY,
                Ok(outcome) => {
                    debug!("Wallet watch iteration: {:?}", outcome);
                    self.settings.poll_interval
                }
                Err(e) => {
                    error!("Wallet watch iteration failed: {}", e);
                    send_best_effort(self.notifier.as_ref(), &format!("⚠️ wallet watch error: {e}"))
                        .await;
                    RETRY_DELAY
                }
            };
            sleep(delay).await;
        }
    }

    /// One iteration of the watch loop, without the trailing sleep.
    pub async fn tick(&self) -> WatchResult<ScanOutcome> {
        if !self.client.is_connected().await {
            warn!("Node not connected, retrying in {:?}", RETRY_DELAY);
            send_best_effort(
                self.notifier.as_ref(),
                "⚠️ Node IPC not connected. Retrying...",
            )
            .await;
            return Ok(ScanOutcome::Disconnected);
        }

        let latest_block = self.client.block_number().await?;

        let Some(last_processed_block) = self.state.get_last_processed_block().await? else {
            self.state.update_last_processed_block(latest_block).await?;
            info!("Initialized watch cursor at block {}", latest_block);
            return Ok(ScanOutcome::Initialized {
                height: latest_block,
            });
        };

        if latest_block <= last_processed_block {
            return Ok(ScanOutcome::Idle {
                height: latest_block,
            });
        }

        let watched = self.watchlist.watched_set().await?;
        if watched.is_empty() {
            self.state.update_last_processed_block(latest_block).await?;
            debug!(
                "Watchlist empty, fast-forwarded from {} to {}",
                last_processed_block, latest_block
            );
            return Ok(ScanOutcome::FastForwarded {
                from: last_processed_block,
                to: latest_block,
            });
        }

        let from = last_processed_block + 1;
        info!(
            "Scanning blocks {} to {} for {} watched address(es)",
            from,
            latest_block,
            watched.len()
        );

        let mut alerts = 0;
        for block_number in from..=latest_block {
            alerts += self.process_block(block_number, &watched).await?;
            self.state.update_last_processed_block(block_number).await?;
        }

        Ok(ScanOutcome::CaughtUp {
            from,
            to: latest_block,
            alerts,
        })
    }

    /// Evaluates every transaction in the block and sends its alerts.
    ///
    /// A delivery failure aborts the block so it is not marked processed.
    async fn process_block(
        &self,
        block_number: u64,
        watched: &HashSet<String>,
    ) -> WatchResult<usize> {
        let block = self.client.get_full_block(block_number).await?;

        let mut sent = 0;
        for tx in &block.transactions {
            let Some(alert) = self.settings.policy.evaluate(block_number, tx, watched) else {
                continue;
            };

            info!(
                "Transfer {} in block {}: {} ({:.6} {})",
                alert.direction, block_number, alert.tx_hash, alert.amount, alert.symbol
            );
            self.notifier.send(&alert.to_string()).await?;
            sent += 1;
        }

        Ok(sent)
    }
}
