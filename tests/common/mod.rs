#![allow(dead_code)]

use alloy_primitives::U256;
use async_trait::async_trait;
use cph_monitor::error::{WatchError, WatchResult};
use cph_monitor::notifier::Notifier;
use cph_monitor::rpc::{BlockView, ChainClient, TransactionView};
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub const ONE_COIN: u128 = 1_000_000_000_000_000_000;
pub const WATCHED: &str = "0xabcabcabcabcabcabcabcabcabcabcabcabcabca";
pub const OTHER: &str = "0x1111111111111111111111111111111111111111";

pub fn transfer(hash: &str, from: &str, to: Option<&str>, value: u128) -> TransactionView {
    TransactionView {
        hash: hash.to_string(),
        from: from.to_string(),
        to: to.map(str::to_string),
        value: U256::from(value),
    }
}

/// Scripted node: a queue of connectivity answers, a height and a block table.
#[derive(Default)]
pub struct FakeChain {
    connectivity: Mutex<VecDeque<bool>>,
    height: AtomicU64,
    blocks: Mutex<HashMap<u64, Vec<TransactionView>>>,
    failing_blocks: Mutex<Vec<u64>>,
    fetched: Mutex<Vec<u64>>,
    peers: Mutex<Option<Value>>,
}

impl FakeChain {
    pub fn at_height(height: u64) -> Self {
        let chain = FakeChain::default();
        chain.set_height(height);
        chain
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// Answers for the next `is_connected` calls; once drained the node is up.
    pub fn script_connectivity(&self, answers: &[bool]) {
        self.connectivity.lock().unwrap().extend(answers.iter().copied());
    }

    pub fn add_block(&self, number: u64, transactions: Vec<TransactionView>) {
        self.blocks.lock().unwrap().insert(number, transactions);
    }

    pub fn fail_block(&self, number: u64) {
        self.failing_blocks.lock().unwrap().push(number);
    }

    pub fn heal_block(&self, number: u64) {
        self.failing_blocks.lock().unwrap().retain(|n| *n != number);
    }

    pub fn set_peers(&self, peers: Value) {
        *self.peers.lock().unwrap() = Some(peers);
    }

    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn is_connected(&self) -> bool {
        self.connectivity.lock().unwrap().pop_front().unwrap_or(true)
    }

    async fn block_number(&self) -> WatchResult<u64> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn get_full_block(&self, number: u64) -> WatchResult<BlockView> {
        self.fetched.lock().unwrap().push(number);
        if self.failing_blocks.lock().unwrap().contains(&number) {
            return Err(WatchError::Connectivity(format!("block {number} timed out")));
        }
        let transactions = self
            .blocks
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .unwrap_or_default();
        Ok(BlockView {
            number,
            transactions,
        })
    }

    async fn get_balance(&self, address: &str) -> WatchResult<U256> {
        if address == WATCHED {
            Ok(U256::from(3 * ONE_COIN))
        } else {
            Err(WatchError::Data(format!("no account {address}")))
        }
    }

    async fn peer_count(&self) -> WatchResult<u64> {
        Ok(4)
    }

    async fn syncing_status(&self) -> WatchResult<Value> {
        Ok(json!(false))
    }

    async fn txpool_status(&self) -> Option<Value> {
        Some(json!({"pending": "0x2", "queued": "0x0"}))
    }

    async fn admin_peers(&self) -> Option<Value> {
        self.peers.lock().unwrap().clone()
    }
}

/// Notifier that records every message and can be switched to failing.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> WatchResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WatchError::Notify("channel unreachable".to_string()));
        }
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}
