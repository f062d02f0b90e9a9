//! In-memory [`Provider`] implementation.
//!
//! Suitable for tests, demos and offline decoding of captured chain data.
//! Thread-safe via `Arc<RwLock<Inner>>`; clones share state.

use crate::error::ProviderError;
use crate::provider::{BlockTag, LogFilter, Provider, RawLog, RawTransaction};
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, RwLock, RwLockReadGuard, RwLockWriteGuard,
    },
};

#[derive(Default)]
struct Inner {
    code: HashMap<Address, Bytes>,
    /// (address, slot) → block → value. Writes without a block land at block 0.
    storage: HashMap<(Address, U256), BTreeMap<u64, B256>>,
    transactions: HashMap<B256, RawTransaction>,
    logs: Vec<RawLog>,
}

#[derive(Default)]
struct Counters {
    storage_reads: AtomicUsize,
    code_reads: AtomicUsize,
    log_queries: AtomicUsize,
}

/// Thread-safe in-memory chain state.
#[derive(Clone)]
pub struct MemoryProvider {
    chain_id: u64,
    inner: Arc<RwLock<Inner>>,
    counters: Arc<Counters>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new(1)
    }
}

impl MemoryProvider {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            inner: Arc::new(RwLock::new(Inner::default())),
            counters: Arc::new(Counters::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_code(&self, address: Address, code: impl Into<Bytes>) {
        self.write().code.insert(address, code.into());
    }

    pub fn set_storage(&self, address: Address, slot: U256, value: B256) {
        self.set_storage_at_block(address, slot, 0, value);
    }

    /// Record `value` as the slot's content from `block` onwards.
    pub fn set_storage_at_block(&self, address: Address, slot: U256, block: u64, value: B256) {
        self.write()
            .storage
            .entry((address, slot))
            .or_default()
            .insert(block, value);
    }

    pub fn add_transaction(&self, tx: RawTransaction) {
        self.write().transactions.insert(tx.hash, tx);
    }

    pub fn add_log(&self, log: RawLog) {
        self.write().logs.push(log);
    }

    /// Number of `get_storage_at` calls served so far.
    pub fn storage_reads(&self) -> usize {
        self.counters.storage_reads.load(Ordering::Relaxed)
    }

    pub fn code_reads(&self) -> usize {
        self.counters.code_reads.load(Ordering::Relaxed)
    }

    pub fn log_queries(&self) -> usize {
        self.counters.log_queries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    async fn get_code(&self, address: Address, _block: BlockTag) -> Result<Bytes, ProviderError> {
        self.counters.code_reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.read().code.get(&address).cloned().unwrap_or_default())
    }

    async fn get_storage_at(
        &self,
        address: Address,
        slot: U256,
        block: BlockTag,
    ) -> Result<B256, ProviderError> {
        self.counters.storage_reads.fetch_add(1, Ordering::Relaxed);
        let inner = self.read();
        let Some(history) = inner.storage.get(&(address, slot)) else {
            return Ok(B256::ZERO);
        };
        let value = match block {
            BlockTag::Latest => history.values().next_back(),
            BlockTag::Number(n) => history.range(..=n).next_back().map(|(_, v)| v),
        };
        Ok(value.copied().unwrap_or(B256::ZERO))
    }

    async fn get_transaction(&self, hash: B256) -> Result<Option<RawTransaction>, ProviderError> {
        Ok(self.read().transactions.get(&hash).cloned())
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, ProviderError> {
        self.counters.log_queries.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .read()
            .logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect())
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(self.chain_id)
    }
}
