//! # chainlens-core
//!
//! Core types shared across all ChainLens crates: the type arena, the
//! mode-tagged result model, the error taxonomy and the interfaces to the
//! chain-data provider and artifact store. Decoding logic lives in
//! `chainlens-evm`; the public façades in `chainlens-decoder`.

pub mod artifact;
pub mod call;
pub mod error;
pub mod event;
pub mod memory;
pub mod provider;
pub mod result;
pub mod types;
pub mod value;

pub use artifact::{ContractArtifact, NetworkDeployment};
pub use call::{
    panic_reason, Argument, CallDecoding, DecodedTransaction, ReturnDecoding, ReturnKind,
    TransactionKind,
};
pub use error::{
    AllocationError, DecoderError, DecodingErrorKind, ProviderError, TypeResolutionError,
};
pub use event::{DecodedLog, EventDecoding};
pub use memory::MemoryProvider;
pub use provider::{BlockTag, LogFilter, Provider, RawLog, RawTransaction};
pub use result::{Child, ChildKey, ContainerKind, DecodeResult};
pub use types::{
    ArrayLength, ContractKind, ElementaryKind, StructMember, TypeDefinition, TypeId, TypeTable,
    TypeTableBuilder,
};
pub use value::{MappingKey, Mode, Value};
