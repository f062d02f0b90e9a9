//! The chain-data provider interface.
//!
//! The decoder only ever reads from the chain through [`Provider`]. Every call
//! may fail or stall; errors come back as [`ProviderError`] and are passed to
//! the caller unchanged.

use crate::error::ProviderError;
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which block state a read targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockTag {
    #[default]
    Latest,
    Number(u64),
}

impl std::fmt::Display for BlockTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockTag::Latest => write!(f, "latest"),
            BlockTag::Number(n) => write!(f, "{n}"),
        }
    }
}

/// A log as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: Address,
    /// topics[0] is the event signature hash unless the event is anonymous.
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_index: Option<u64>,
}

impl RawLog {
    pub fn new(address: Address, topics: Vec<B256>, data: impl Into<Bytes>) -> Self {
        Self {
            address,
            topics,
            data: data.into(),
            block_number: None,
            transaction_hash: None,
            log_index: None,
        }
    }

    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// The parts of a transaction the decoder needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    #[serde(default)]
    pub hash: B256,
    #[serde(default)]
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub input: Bytes,
    #[serde(default)]
    pub value: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

impl RawTransaction {
    /// A call to `to` with the given calldata.
    pub fn call(to: Address, input: impl Into<Bytes>) -> Self {
        Self {
            hash: B256::ZERO,
            from: Address::ZERO,
            to: Some(to),
            input: input.into(),
            value: U256::ZERO,
            block_number: None,
        }
    }

    /// A contract-creation transaction carrying creation code plus constructor args.
    pub fn create(input: impl Into<Bytes>) -> Self {
        Self {
            to: None,
            ..Self::call(Address::ZERO, input)
        }
    }
}

/// Filter for [`Provider::get_logs`]. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    /// Accept any of these topic0 values. Empty means any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topic0s: Vec<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_block: Option<u64>,
}

impl LogFilter {
    pub fn matches(&self, log: &RawLog) -> bool {
        if let Some(addr) = self.address {
            if log.address != addr {
                return false;
            }
        }
        if !self.topic0s.is_empty() {
            match log.topic0() {
                Some(t) if self.topic0s.contains(t) => {}
                _ => return false,
            }
        }
        let block = log.block_number.unwrap_or(0);
        if self.from_block.is_some_and(|from| block < from) {
            return false;
        }
        if self.to_block.is_some_and(|to| block > to) {
            return false;
        }
        true
    }
}

/// Read access to chain state.
///
/// Implementations own transport, retries and timeouts; the decoder adds none.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Runtime bytecode at `address`. Empty when no contract is deployed.
    async fn get_code(&self, address: Address, block: BlockTag) -> Result<Bytes, ProviderError>;

    /// One 32-byte storage word.
    async fn get_storage_at(
        &self,
        address: Address,
        slot: U256,
        block: BlockTag,
    ) -> Result<B256, ProviderError>;

    async fn get_transaction(&self, hash: B256) -> Result<Option<RawTransaction>, ProviderError>;

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, ProviderError>;

    /// Network id used to look up deployed addresses in artifacts.
    async fn chain_id(&self) -> Result<u64, ProviderError>;
}
