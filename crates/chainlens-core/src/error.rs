//! Error types for the ChainLens decode pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the chain-data provider. They are passed through
/// untouched so callers can downcast and apply their own retry policy.
pub type ProviderError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Reasons a single value failed to decode.
///
/// These never abort a whole operation: they are recorded as an error result
/// in place of the value, next to its successfully decoded siblings.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodingErrorKind {
    #[error("buffer truncated: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("malformed length prefix {length}")]
    MalformedLength { length: String },

    #[error("malformed offset {offset}")]
    MalformedOffset { offset: String },

    #[error("calldata has no valid selector")]
    InvalidSelector,

    #[error("invalid topic: {reason}")]
    InvalidTopic { reason: String },

    #[error("invalid boolean encoding 0x{raw}")]
    InvalidBool { raw: String },

    #[error("enum index {index} out of range ({variants} variants)")]
    InvalidEnum { index: String, variants: usize },

    #[error("non-zero padding around {ty} value")]
    DirtyPadding { ty: String },

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("array length {length} exceeds the configured maximum of {max}")]
    OverlongArray { length: String, max: u64 },

    #[error("type {ty} cannot be decoded here: {reason}")]
    UnresolvedType { ty: String, reason: String },
}

/// Type declarations could not be merged into one table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeResolutionError {
    #[error("conflicting declarations of {name}: `{first}` vs `{second}`")]
    Conflict {
        name: String,
        first: String,
        second: String,
    },

    #[error("invalid ABI type `{ty}` in {contract}: {reason}")]
    InvalidAbiType {
        contract: String,
        ty: String,
        reason: String,
    },
}

/// The storage layout of a contract could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("contract {contract} has no usable AST")]
    NoAst { contract: String },

    #[error("inheritance cycle detected at {contract}")]
    InheritanceCycle { contract: String },

    #[error("{contract} references unknown base contract node {id}")]
    UnresolvedBase { contract: String, id: i64 },

    #[error("inheritance of {contract} cannot be linearized")]
    Linearization { contract: String },

    #[error("state variable {contract}.{variable} has unresolvable type: {reason}")]
    UnresolvedType {
        contract: String,
        variable: String,
        reason: String,
    },
}

/// Errors returned by the decoder façades.
#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("type resolution failed: {0}")]
    TypeResolution(#[from] TypeResolutionError),

    #[error("storage allocation failed: {0}")]
    AllocationFailed(#[from] AllocationError),

    /// State-variable decoding requires a usable AST; switch to ABI-only operations.
    #[error("contract {contract} being decoded has no AST node; state variables are unavailable")]
    NoNode { contract: String },

    #[error("decoding failed: {0}")]
    Decoding(#[from] DecodingErrorKind),

    #[error("unknown state variable {name} in {contract}")]
    UnknownVariable { contract: String, name: String },

    #[error("state variable {name} is not a mapping (type {ty})")]
    NotAMapping { name: String, ty: String },

    #[error("invalid key {key} for {name}: {reason}")]
    InvalidMappingKey {
        name: String,
        key: String,
        reason: String,
    },

    #[error("contract decoder for {contract} used before init()")]
    NotInitialized { contract: String },

    #[error("unknown contract {name}")]
    UnknownContract { name: String },

    #[error("no function {name} in {contract}")]
    UnknownFunction { contract: String, name: String },

    #[error("no address for {contract}: not deployed on network {network}")]
    NoAddress { contract: String, network: String },

    #[error("invalid artifact {name}: {reason}")]
    Artifact { name: String, reason: String },

    #[error(transparent)]
    Provider(ProviderError),
}

impl DecoderError {
    /// Returns `true` if the error came straight from the provider.
    pub fn is_provider_error(&self) -> bool {
        matches!(self, Self::Provider(_))
    }

    /// Recover the provider's original error, if this is one.
    pub fn into_provider_error(self) -> Option<ProviderError> {
        match self {
            Self::Provider(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProviderError> for DecoderError {
    fn from(e: ProviderError) -> Self {
        Self::Provider(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("node went away")]
    struct Gone;

    #[test]
    fn provider_errors_pass_through_unchanged() {
        let err: DecoderError = DecoderError::from(Box::new(Gone) as ProviderError);
        assert!(err.is_provider_error());
        assert_eq!(err.to_string(), "node went away");
        let inner = err.into_provider_error().unwrap();
        assert!(inner.downcast_ref::<Gone>().is_some());
    }

    #[test]
    fn decoding_kind_messages() {
        let e = DecodingErrorKind::Truncated {
            offset: 32,
            needed: 32,
            available: 40,
        };
        assert!(e.to_string().contains("offset 32"));
    }
}
