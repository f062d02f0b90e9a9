//! `WireDecoder`: project-scope decoding of transactions and logs.
//!
//! # How it works
//! - all supplied artifacts are resolved into one type table up front
//! - a call's target is identified by fetching its code once and matching
//!   it against the known runtime bytecode; unidentified targets are tried
//!   against every contract
//! - a log is tried against every contract's events and yields one decoding
//!   per match, in the order the contracts were supplied
//! - storage layouts are computed at construction; a contract whose AST is
//!   present but whose layout cannot be computed is decoded in ABI mode from
//!   the start

use crate::config::{DecoderConfig, EventOptions};
use crate::contract::ContractDecoder;
use chainlens_core::{
    AllocationError, BlockTag, CallDecoding, ContractArtifact, DecodedLog, DecodedTransaction, DecoderError,
    EventDecoding, LogFilter, Provider, RawLog, RawTransaction, TransactionKind,
};
use chainlens_evm::{
    allocate, call_decoder, event_decoder, resolve, ContractTypeInfo, ResolvedProject,
    StorageAllocation,
};
use alloy_primitives::{Address, B256};
use futures::stream::{self, BoxStream, StreamExt};
use indexmap::IndexMap;
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Address → identified contract, holding at most `capacity` addresses.
#[derive(Debug)]
pub(crate) struct CodeCache {
    entries: IndexMap<Address, Option<usize>>,
    capacity: usize,
}

impl CodeCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            capacity,
        }
    }

    pub(crate) fn get(&self, address: &Address) -> Option<Option<usize>> {
        self.entries.get(address).copied()
    }

    pub(crate) fn insert(&mut self, address: Address, found: Option<usize>) {
        if self.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(&address) && self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0);
        }
        self.entries.insert(address, found);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

pub(crate) struct WireInner {
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) project: ResolvedProject,
    pub(crate) config: DecoderConfig,
    code_cache: Mutex<CodeCache>,
    /// per contract, in supplied order
    allocations: Vec<Result<Arc<StorageAllocation>, AllocationError>>,
    /// contracts with an AST but no layout, held to ABI mode
    degraded: HashSet<usize>,
}

/// Decodes transactions and logs against every contract of a project.
///
/// Cheap to clone; clones share the resolved project and caches.
#[derive(Clone)]
pub struct WireDecoder {
    pub(crate) inner: Arc<WireInner>,
}

impl std::fmt::Debug for WireDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireDecoder")
            .field("contracts", &self.contracts().iter().map(|c| &c.name).collect::<Vec<_>>())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl WireDecoder {
    /// Resolve `artifacts` into one project.
    pub fn new(
        provider: Arc<dyn Provider>,
        artifacts: &[ContractArtifact],
        config: DecoderConfig,
    ) -> Result<Self, DecoderError> {
        let project = resolve(artifacts)?;
        let allocations: Vec<_> = (0..project.contracts.len())
            .map(|i| allocate(&project, i).map(Arc::new))
            .collect();
        let mut degraded = HashSet::new();
        for (contract, allocation) in project.contracts.iter().zip(&allocations) {
            if let (true, Err(e)) = (contract.has_ast(), allocation) {
                warn!(contract = %contract.name, error = %e, "no storage layout; using ABI mode");
                degraded.insert(contract.index);
            }
        }
        debug!(
            contracts = project.contracts.len(),
            types = project.table.len(),
            degraded = degraded.len(),
            "resolved project"
        );
        let code_cache = Mutex::new(CodeCache::new(config.code_cache_size));
        Ok(Self {
            inner: Arc::new(WireInner {
                provider,
                project,
                config,
                code_cache,
                allocations,
                degraded,
            }),
        })
    }

    pub fn project(&self) -> &ResolvedProject {
        &self.inner.project
    }

    pub fn contracts(&self) -> &[ContractTypeInfo] {
        &self.inner.project.contracts
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.inner.config
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.inner.provider
    }

    /// Contract decoder for the contract named `name`, initialised.
    pub async fn for_contract(&self, name: &str) -> Result<ContractDecoder, DecoderError> {
        let index = self
            .contracts()
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| DecoderError::UnknownContract { name: name.into() })?;
        let decoder = ContractDecoder::new(self.clone(), index);
        decoder.init().await?;
        Ok(decoder)
    }

    // ── mode bookkeeping ─────────────────────────────────────────────────────

    /// Whether `contract` is decoded in full mode.
    pub(crate) fn allow_full(&self, contract: &ContractTypeInfo) -> bool {
        contract.has_ast() && !self.inner.degraded.contains(&contract.index)
    }

    /// Storage layout of contract `index`, as computed at construction.
    pub(crate) fn allocation(
        &self,
        index: usize,
    ) -> Result<Arc<StorageAllocation>, AllocationError> {
        match self.inner.allocations.get(index) {
            Some(allocation) => allocation.clone(),
            None => Err(AllocationError::NoAst {
                contract: format!("#{index}"),
            }),
        }
    }

    /// Number of addresses whose code identification is cached.
    pub fn cached_addresses(&self) -> usize {
        self.inner
            .code_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    // ── transactions ─────────────────────────────────────────────────────────

    /// Index of the contract whose runtime bytecode is deployed at `address`.
    pub async fn identify(&self, address: Address) -> Result<Option<usize>, DecoderError> {
        let cached = self
            .inner
            .code_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&address);
        if let Some(hit) = cached {
            return Ok(hit);
        }
        let code = self.inner.provider.get_code(address, BlockTag::Latest).await?;
        let found = if code.is_empty() {
            None
        } else {
            self.contracts().iter().position(|c| {
                c.runtime_code
                    .as_ref()
                    .is_some_and(|pattern| pattern.matches(&code))
            })
        };
        debug!(%address, contract = ?found.map(|i| &self.contracts()[i].name), "identified code");
        self.inner
            .code_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(address, found);
        Ok(found)
    }

    /// Decode `tx` against the contract it targets, or against every
    /// contract when the target cannot be identified.
    pub async fn decode_transaction(
        &self,
        tx: &RawTransaction,
    ) -> Result<DecodedTransaction, DecoderError> {
        let table = &self.inner.project.table;
        let Some(to) = tx.to else {
            let decodings: Vec<CallDecoding> = self
                .contracts()
                .iter()
                .filter_map(|c| call_decoder::decode_creation(table, c, &tx.input, self.allow_full(c)))
                .collect();
            return Ok(DecodedTransaction {
                transaction: tx.clone(),
                identified: decodings.first().map(|d| d.contract.clone()),
                decodings,
            });
        };

        if let Some(index) = self.identify(to).await? {
            let contract = &self.contracts()[index];
            return Ok(DecodedTransaction {
                transaction: tx.clone(),
                identified: Some(contract.name.clone()),
                decodings: call_decoder::decode_input(
                    table,
                    contract,
                    &tx.input,
                    self.allow_full(contract),
                )
                .into_iter()
                .collect(),
            });
        }

        let all: Vec<CallDecoding> = self
            .contracts()
            .iter()
            .filter_map(|c| call_decoder::decode_input(table, c, &tx.input, self.allow_full(c)))
            .collect();
        // a selector match says more than a contract merely accepting the call
        let decodings = if all.iter().any(|d| d.kind == TransactionKind::Function) {
            all.into_iter()
                .filter(|d| d.kind == TransactionKind::Function)
                .collect()
        } else {
            all
        };
        Ok(DecodedTransaction {
            transaction: tx.clone(),
            identified: None,
            decodings,
        })
    }

    /// Fetch and decode the transaction with hash `hash`.
    pub async fn decode_transaction_by_hash(
        &self,
        hash: B256,
    ) -> Result<Option<DecodedTransaction>, DecoderError> {
        match self.inner.provider.get_transaction(hash).await? {
            Some(tx) => Ok(Some(self.decode_transaction(&tx).await?)),
            None => Ok(None),
        }
    }

    // ── logs ─────────────────────────────────────────────────────────────────

    /// Every interpretation of `log`, in the order contracts were supplied.
    pub fn decode_log_matches(&self, log: &RawLog) -> Vec<EventDecoding> {
        event_decoder::decode_log(
            &self.inner.project.table,
            self.contracts(),
            log,
            |c| self.allow_full(c),
        )
    }

    /// Decode `log`. An unrecognised log yields nothing.
    pub fn decode_log(&self, log: &RawLog) -> Vec<DecodedLog> {
        self.decode_log_with(log, false)
    }

    /// Decode `log`; with `extra`, an unrecognised log yields one undecoded entry.
    pub fn decode_log_with(&self, log: &RawLog, extra: bool) -> Vec<DecodedLog> {
        let matches = self.decode_log_matches(log);
        if matches.is_empty() {
            return if extra {
                vec![DecodedLog {
                    log: log.clone(),
                    event: None,
                }]
            } else {
                Vec::new()
            };
        }
        matches
            .into_iter()
            .map(|event| DecodedLog {
                log: log.clone(),
                event: Some(event),
            })
            .collect()
    }

    /// Decode a batch of logs in parallel, keeping input order.
    pub fn decode_logs(&self, logs: &[RawLog], extra: bool) -> Vec<DecodedLog> {
        logs.par_iter()
            .map(|log| self.decode_log_with(log, extra))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect()
    }

    fn log_filter(&self, opts: &EventOptions) -> LogFilter {
        let mut filter = LogFilter {
            address: opts.address,
            from_block: opts.from_block,
            to_block: opts.to_block,
            ..Default::default()
        };
        if let (Some(name), false) = (&opts.name, opts.extra) {
            let events: Vec<_> = self
                .contracts()
                .iter()
                .flat_map(|c| &c.events)
                .filter(|e| &e.name == name)
                .collect();
            // anonymous events carry no topic0 to filter on
            if !events.iter().any(|e| e.anonymous) {
                filter.topic0s = events.iter().map(|e| e.topic).collect();
                filter.topic0s.sort_unstable();
                filter.topic0s.dedup();
            }
        }
        filter
    }

    fn select(&self, logs: Vec<RawLog>, opts: &EventOptions) -> Vec<DecodedLog> {
        self.decode_logs(&logs, opts.extra)
            .into_iter()
            .filter(|d| match (&opts.name, &d.event) {
                (Some(name), Some(event)) => &event.name == name,
                _ => true,
            })
            .collect()
    }

    /// Logs matching `opts`, decoded.
    ///
    /// The provider is queried when the stream is first polled; calling
    /// `events` again issues a fresh query.
    pub fn events(&self, opts: EventOptions) -> BoxStream<'static, Result<DecodedLog, DecoderError>> {
        let this = self.clone();
        stream::once(async move {
            if let (Some(name), false) = (&opts.name, opts.extra) {
                let declared = this
                    .contracts()
                    .iter()
                    .flat_map(|c| &c.events)
                    .any(|e| &e.name == name);
                if !declared {
                    warn!(%name, "no supplied contract declares this event");
                    return Ok(Vec::new());
                }
            }
            let filter = this.log_filter(&opts);
            let logs = this.inner.provider.get_logs(&filter).await?;
            debug!(fetched = logs.len(), "queried logs");
            Ok::<_, DecoderError>(this.select(logs, &opts))
        })
        .flat_map(|batch| match batch {
            Ok(logs) => stream::iter(logs.into_iter().map(Ok)).left_stream(),
            Err(e) => stream::once(async move { Err(e) }).right_stream(),
        })
        .boxed()
    }
}
