//! `ContractDecoder`: one contract type, with its storage layout.
//!
//! A contract decoder starts `Uninitialized`; [`ContractDecoder::init`]
//! settles the network id and takes up the layout the wire decoder computed,
//! ending in `Ready`. When there is no layout the decoder ends in `Degraded`
//! instead: it keeps decoding calls and logs, in ABI mode, but refuses state
//! reads.

use crate::config::EventOptions;
use crate::instance::ContractInstanceDecoder;
use crate::wire::WireDecoder;
use alloy_primitives::Address;
use chainlens_core::{
    AllocationError, DecodedLog, DecodedTransaction, DecoderError, RawLog, RawTransaction,
    ReturnDecoding,
};
use chainlens_evm::{call_decoder, ContractTypeInfo, StorageAllocation};
use futures::stream::BoxStream;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::debug;

/// Lifecycle of a [`ContractDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderState {
    Uninitialized,
    Initializing,
    Ready,
    /// The layout could not be computed; full mode is unavailable.
    Degraded(AllocationError),
}

#[derive(Debug)]
struct Initialized {
    network_id: u64,
    allocation: Option<Arc<StorageAllocation>>,
}

struct ContractInner {
    index: usize,
    state: Mutex<DecoderState>,
    init: OnceCell<Initialized>,
}

/// Decoder bound to one contract type of a project.
#[derive(Clone)]
pub struct ContractDecoder {
    wire: WireDecoder,
    inner: Arc<ContractInner>,
}

impl std::fmt::Debug for ContractDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractDecoder")
            .field("contract", &self.contract().name)
            .field("state", &self.state())
            .finish()
    }
}

impl ContractDecoder {
    /// Decoder for contract `index` of `wire`. Call [`init`](Self::init)
    /// before using it.
    pub fn new(wire: WireDecoder, index: usize) -> Self {
        Self {
            wire,
            inner: Arc::new(ContractInner {
                index,
                state: Mutex::new(DecoderState::Uninitialized),
                init: OnceCell::new(),
            }),
        }
    }

    pub fn wire(&self) -> &WireDecoder {
        &self.wire
    }

    pub fn contract(&self) -> &ContractTypeInfo {
        &self.wire.contracts()[self.inner.index]
    }

    pub fn state(&self) -> DecoderState {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_state(&self, state: DecoderState) {
        *self.inner.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Settle the network id and take up the storage layout.
    ///
    /// Idempotent; concurrent callers wait for the first to finish. A missing
    /// layout is not an error here: it leaves the decoder `Degraded`.
    pub async fn init(&self) -> Result<(), DecoderError> {
        self.inner
            .init
            .get_or_try_init(|| async {
                self.set_state(DecoderState::Initializing);
                let network_id = match self.wire.config().network_id {
                    Some(id) => id,
                    None => match self.wire.provider().chain_id().await {
                        Ok(id) => id,
                        Err(e) => {
                            self.set_state(DecoderState::Uninitialized);
                            return Err(DecoderError::Provider(e));
                        }
                    },
                };
                let contract = &self.contract().name;
                let allocation = match self.wire.allocation(self.inner.index) {
                    Ok(allocation) => {
                        debug!(
                            contract = %contract,
                            variables = allocation.variables.len(),
                            "storage layout ready"
                        );
                        self.set_state(DecoderState::Ready);
                        Some(allocation)
                    }
                    Err(e) => {
                        debug!(contract = %contract, error = %e, "decoder degraded to ABI mode");
                        self.set_state(DecoderState::Degraded(e));
                        None
                    }
                };
                Ok(Initialized {
                    network_id,
                    allocation,
                })
            })
            .await?;
        Ok(())
    }

    fn initialized(&self) -> Result<&Initialized, DecoderError> {
        self.inner
            .init
            .get()
            .ok_or_else(|| DecoderError::NotInitialized {
                contract: self.contract().name.clone(),
            })
    }

    /// Network id used for deployed-address lookups.
    pub fn network_id(&self) -> Result<u64, DecoderError> {
        Ok(self.initialized()?.network_id)
    }

    /// The contract's storage layout.
    pub fn allocation(&self) -> Result<Arc<StorageAllocation>, DecoderError> {
        self.initialized()?
            .allocation
            .clone()
            .ok_or_else(|| DecoderError::NoNode {
                contract: self.contract().name.clone(),
            })
    }

    /// Whether calls and logs of this contract decode in full mode.
    pub fn full_mode(&self) -> bool {
        self.wire.allow_full(self.contract())
    }

    /// Instance decoder at `address`, or at the contract's deployed address
    /// on the current network when `address` is `None`.
    pub async fn for_instance(
        &self,
        address: Option<Address>,
    ) -> Result<ContractInstanceDecoder, DecoderError> {
        self.init().await?;
        let address = match address {
            Some(a) => a,
            None => {
                let network = self.network_id()?;
                self.contract()
                    .deployed_address(network)
                    .ok_or_else(|| DecoderError::NoAddress {
                        contract: self.contract().name.clone(),
                        network: network.to_string(),
                    })?
            }
        };
        Ok(ContractInstanceDecoder::new(self.clone(), address))
    }

    // ── decoding ─────────────────────────────────────────────────────────────

    /// Decode what a call to `function` (a name or full signature) returned
    /// or reverted with.
    pub fn decode_return_value(
        &self,
        function: &str,
        data: &[u8],
    ) -> Result<ReturnDecoding, DecoderError> {
        let contract = self.contract();
        let f = contract
            .function(function)
            .ok_or_else(|| DecoderError::UnknownFunction {
                contract: contract.name.clone(),
                name: function.into(),
            })?;
        Ok(call_decoder::decode_return(
            self.wire.project(),
            contract,
            Some(f),
            data,
            self.full_mode(),
        ))
    }

    /// Decode revert data without knowing which function produced it.
    pub fn decode_revert(&self, data: &[u8]) -> ReturnDecoding {
        call_decoder::decode_return(
            self.wire.project(),
            self.contract(),
            None,
            data,
            self.full_mode(),
        )
    }

    pub async fn decode_transaction(
        &self,
        tx: &RawTransaction,
    ) -> Result<DecodedTransaction, DecoderError> {
        self.wire.decode_transaction(tx).await
    }

    pub fn decode_log(&self, log: &RawLog) -> Vec<DecodedLog> {
        self.wire.decode_log(log)
    }

    pub fn events(&self, opts: EventOptions) -> BoxStream<'static, Result<DecodedLog, DecoderError>> {
        self.wire.events(opts)
    }
}
