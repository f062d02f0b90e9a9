//! `ContractInstanceDecoder`: one contract at one address.
//!
//! # How it works
//! - state variables are read slot by slot through the provider, following
//!   the contract's storage layout; each call reads a slot at most once
//! - mapping entries are only read for keys registered with
//!   [`ContractInstanceDecoder::watch_mapping_key`]
//! - variables are keyed by name; a name declared by more than one contract
//!   in the inheritance chain is qualified as `Contract.name`

use crate::config::EventOptions;
use crate::contract::ContractDecoder;
use crate::watch::WatchSet;
use alloy_primitives::Address;
use chainlens_core::{
    BlockTag, DecodeResult, DecodedLog, DecodedTransaction, DecoderError, MappingKey, ProviderError,
    RawLog, RawTransaction, TypeDefinition,
};
use chainlens_evm::{
    normalize_key, storage::read_all, KeyPath, StateVariable, StorageAllocation, StorageReader,
};
use futures::stream::BoxStream;
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::debug;

/// Decoder bound to a contract type and a deployed address.
#[derive(Debug)]
pub struct ContractInstanceDecoder {
    contract: ContractDecoder,
    address: Address,
    watches: WatchSet,
}

fn watch_key(variable: &StateVariable) -> String {
    format!("{}.{}", variable.contract, variable.name)
}

fn provider_error(e: ProviderError) -> DecoderError {
    DecoderError::Provider(e)
}

impl ContractInstanceDecoder {
    pub(crate) fn new(contract: ContractDecoder, address: Address) -> Self {
        Self {
            contract,
            address,
            watches: WatchSet::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn contract_decoder(&self) -> &ContractDecoder {
        &self.contract
    }

    /// Find a variable by plain or `Contract.name` form. A plain name
    /// resolves to the most derived declaration.
    fn find<'a>(
        &self,
        allocation: &'a StorageAllocation,
        name: &str,
    ) -> Result<&'a StateVariable, DecoderError> {
        allocation
            .variables
            .iter()
            .rev()
            .find(|v| v.name == name)
            .or_else(|| allocation.variables.iter().find(|v| watch_key(v) == name))
            .ok_or_else(|| DecoderError::UnknownVariable {
                contract: allocation.contract.clone(),
                name: name.into(),
            })
    }

    fn reader<'a>(
        &'a self,
        allocation: &'a StorageAllocation,
        block: BlockTag,
    ) -> StorageReader<'a> {
        let wire = self.contract.wire();
        StorageReader::new(
            wire.provider().as_ref(),
            self.address,
            block,
            &wire.project().table,
            allocation,
            wire.config().max_array_length,
        )
    }

    // ── state variables ──────────────────────────────────────────────────────

    /// Every state variable at the latest block.
    pub async fn variables(&self) -> Result<IndexMap<String, DecodeResult>, DecoderError> {
        self.variables_at(BlockTag::Latest).await
    }

    /// Every state variable at `block`, in layout order.
    pub async fn variables_at(
        &self,
        block: BlockTag,
    ) -> Result<IndexMap<String, DecodeResult>, DecoderError> {
        let allocation = self.contract.allocation()?;
        let reader = self.reader(&allocation, block);
        let values = read_all(&reader, &allocation, |v| self.watches.paths(&watch_key(v)))
            .await
            .map_err(provider_error)?;
        debug!(
            contract = %allocation.contract,
            address = %self.address,
            slots = reader.slots_read(),
            "read state variables"
        );

        let mut seen: HashMap<&str, usize> = HashMap::new();
        for v in &allocation.variables {
            *seen.entry(v.name.as_str()).or_default() += 1;
        }
        Ok(values
            .into_iter()
            .map(|(v, result)| {
                let name = if seen.get(v.name.as_str()).copied().unwrap_or(0) > 1 {
                    watch_key(&v)
                } else {
                    v.name
                };
                (name, result)
            })
            .collect())
    }

    pub async fn variable(&self, name: &str) -> Result<DecodeResult, DecoderError> {
        self.variable_at(name, BlockTag::Latest).await
    }

    pub async fn variable_at(
        &self,
        name: &str,
        block: BlockTag,
    ) -> Result<DecodeResult, DecoderError> {
        let allocation = self.contract.allocation()?;
        let variable = self.find(&allocation, name)?;
        let paths = self.watches.paths(&watch_key(variable));
        self.reader(&allocation, block)
            .read_variable(variable, &paths)
            .await
            .map_err(provider_error)
    }

    // ── mapping keys ─────────────────────────────────────────────────────────

    /// Convert `keys` into a path through the (possibly nested) mapping
    /// `name`, deriving the slot of each entry.
    fn key_path(
        &self,
        allocation: &StorageAllocation,
        name: &str,
        keys: &[MappingKey],
    ) -> Result<(String, KeyPath), DecoderError> {
        let table = &self.contract.wire().project().table;
        let variable = self.find(allocation, name)?;
        let mut ty = variable.ty;
        let mut path = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(TypeDefinition::Mapping { key: key_ty, value }) = table.get(ty) else {
                return Err(DecoderError::NotAMapping {
                    name: name.into(),
                    ty: table.display(ty),
                });
            };
            let normalized = normalize_key(table, *key_ty, key).map_err(|reason| {
                DecoderError::InvalidMappingKey {
                    name: name.into(),
                    key: key.to_string(),
                    reason,
                }
            })?;
            path.push(normalized);
            ty = *value;
        }
        if path.is_empty() {
            return match table.get(ty) {
                Some(TypeDefinition::Mapping { .. }) => Err(DecoderError::InvalidMappingKey {
                    name: name.into(),
                    key: String::new(),
                    reason: "no key given".into(),
                }),
                _ => Err(DecoderError::NotAMapping {
                    name: name.into(),
                    ty: table.display(ty),
                }),
            };
        }
        Ok((
            watch_key(variable),
            KeyPath::new(variable.location.slot, path),
        ))
    }

    /// Include the entry at `keys` (one key per mapping level) in later
    /// reads of `name`. Registering the same keys again has no effect.
    pub fn watch_mapping_key(
        &self,
        name: &str,
        keys: impl IntoIterator<Item = MappingKey>,
    ) -> Result<(), DecoderError> {
        let allocation = self.contract.allocation()?;
        let keys: Vec<MappingKey> = keys.into_iter().collect();
        let (variable, path) = self.key_path(&allocation, name, &keys)?;
        let slot = path.entry_slot();
        if self.watches.insert(&variable, path) {
            debug!(variable = %variable, slot = ?slot, "watching mapping entry");
        } else {
            debug!(variable = %variable, "mapping key already watched");
        }
        Ok(())
    }

    /// Stop reading the entry at `keys`, and any entries nested under it.
    /// Returns whether anything was being watched.
    pub fn unwatch_mapping_key(
        &self,
        name: &str,
        keys: impl IntoIterator<Item = MappingKey>,
    ) -> Result<bool, DecoderError> {
        let allocation = self.contract.allocation()?;
        let keys: Vec<MappingKey> = keys.into_iter().collect();
        let (variable, path) = self.key_path(&allocation, name, &keys)?;
        Ok(self.watches.remove(&variable, path.keys()) > 0)
    }

    /// Read one mapping entry without registering its keys.
    pub async fn mapping_entry(
        &self,
        name: &str,
        keys: impl IntoIterator<Item = MappingKey>,
    ) -> Result<DecodeResult, DecoderError> {
        let allocation = self.contract.allocation()?;
        let keys: Vec<MappingKey> = keys.into_iter().collect();
        let (_, path) = self.key_path(&allocation, name, &keys)?;
        let variable = self.find(&allocation, name)?;
        let whole = self
            .reader(&allocation, BlockTag::Latest)
            .read_variable(variable, std::slice::from_ref(&path))
            .await
            .map_err(provider_error)?;
        path.keys()
            .iter()
            .try_fold(&whole, |at, key| at.entry(&key.value))
            .cloned()
            .ok_or_else(|| DecoderError::InvalidMappingKey {
                name: name.into(),
                key: keys.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
                reason: "entry could not be read".into(),
            })
    }

    // ── code ─────────────────────────────────────────────────────────────────

    /// Whether the code at this address belongs to the bound contract.
    ///
    /// Falls back to looking for the code inside the creation bytecode when
    /// the artifact carries no runtime bytecode.
    pub async fn code_match(&self) -> Result<bool, DecoderError> {
        let code = self
            .contract
            .wire()
            .provider()
            .get_code(self.address, BlockTag::Latest)
            .await?;
        if code.is_empty() {
            return Ok(false);
        }
        let contract = self.contract.contract();
        Ok(match (&contract.runtime_code, &contract.creation_code) {
            (Some(runtime), _) => runtime.matches(&code),
            (None, Some(creation)) => creation.contains_runtime(&code),
            (None, None) => false,
        })
    }

    // ── delegated ────────────────────────────────────────────────────────────

    pub async fn decode_transaction(
        &self,
        tx: &RawTransaction,
    ) -> Result<DecodedTransaction, DecoderError> {
        self.contract.decode_transaction(tx).await
    }

    pub fn decode_log(&self, log: &RawLog) -> Vec<DecodedLog> {
        self.contract.decode_log(log)
    }

    /// Events emitted by this instance unless `opts` names another address.
    pub fn events(&self, mut opts: EventOptions) -> BoxStream<'static, Result<DecodedLog, DecoderError>> {
        opts.address.get_or_insert(self.address);
        self.contract.events(opts)
    }
}
