//! # chainlens-evm
//!
//! The decoding engine behind ChainLens.
//!
//! ## Implementation notes
//! - [`resolver`] merges ABI and solc AST metadata into one type table
//! - [`allocator`] computes storage layouts along the C3 linearisation
//! - [`abi_decoder`] decodes calldata, return data and log data in full or
//!   ABI mode, with a whole-value retry in ABI mode when full mode fails
//! - [`storage`] reads state variables through a [`chainlens_core::Provider`]
//! - [`formatter`] projects full-mode results to their ABI-mode view
//! - `alloy-json-abi` supplies signatures and selectors; Keccak comes from
//!   `tiny-keccak`

pub mod abi_decoder;
pub mod allocator;
pub mod ast;
pub mod bytecode;
pub mod call_decoder;
pub mod codec;
pub mod contract;
pub mod event_decoder;
pub mod fingerprint;
pub mod formatter;
pub mod mapping;
pub mod resolver;
pub mod storage;

pub use abi_decoder::{decode_with_fallback, LinearDecoder, ModeDecoding};
pub use allocator::{allocate, SlotDescriptor, StateVariable, StorageAllocation};
pub use bytecode::BytecodePattern;
pub use contract::{ContractTypeInfo, EventInfo, FunctionInfo, ParamInfo};
pub use formatter::to_abi_mode;
pub use mapping::{normalize_key, KeyPath, NormalizedKey};
pub use resolver::{resolve, ResolvedProject};
pub use storage::StorageReader;
