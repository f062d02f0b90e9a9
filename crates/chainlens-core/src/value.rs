//! Interpreted values.
//!
//! A [`Value`] is the meaning of a run of bytes under one type. It never stands
//! alone: a [`crate::result::DecodeResult`] always carries the raw bytes next to
//! it, so nothing is lost by interpretation.

use alloy_primitives::{Address, Bytes, B256, I256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which decoding mode produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// AST-resolved types and computed storage layout.
    Full,
    /// ABI-level shapes only: positional tuples, no enums or contract types.
    Abi,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Full => write!(f, "full"),
            Mode::Abi => write!(f, "abi"),
        }
    }
}

/// A decoded elementary value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Uint(U256),
    Int(I256),
    Bool(bool),
    Address(Address),
    /// bytes1 .. bytes32
    FixedBytes(Bytes),
    Bytes(Bytes),
    String(String),
    /// Full mode only: an enum member.
    Enum { variant: String, index: u8 },
    /// Full mode only: an address typed as a known contract.
    Contract { address: Address, contract: String },
    /// External function pointer.
    Function { address: Address, selector: [u8; 4] },
    /// keccak256 of an indexed reference-type event argument; the preimage is
    /// not recoverable from the log.
    IndexedHash(B256),
}

impl Value {
    pub fn as_uint(&self) -> Option<U256> {
        match self {
            Value::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<I256> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The address behind an `Address` or `Contract` value.
    pub fn as_address(&self) -> Option<Address> {
        match self {
            Value::Address(a) => Some(*a),
            Value::Contract { address, .. } => Some(*address),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) | Value::FixedBytes(b) => Some(b.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Uint(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Address(a) => write!(f, "{a}"),
            Value::FixedBytes(b) | Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Enum { variant, .. } => write!(f, "{variant}"),
            Value::Contract { address, contract } => write!(f, "{contract}({address})"),
            Value::Function { address, selector } => {
                write!(f, "{address}.0x{}", hex::encode(selector))
            }
            Value::IndexedHash(h) => write!(f, "hash({h})"),
        }
    }
}

/// A caller-supplied mapping key, converted to the mapping's key type when a
/// watch is registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MappingKey {
    Uint(U256),
    Int(I256),
    Bool(bool),
    Address(Address),
    FixedBytes(Bytes),
    Bytes(Bytes),
    String(String),
}

impl From<U256> for MappingKey {
    fn from(v: U256) -> Self {
        MappingKey::Uint(v)
    }
}

impl From<u64> for MappingKey {
    fn from(v: u64) -> Self {
        MappingKey::Uint(U256::from(v))
    }
}

impl From<I256> for MappingKey {
    fn from(v: I256) -> Self {
        MappingKey::Int(v)
    }
}

impl From<bool> for MappingKey {
    fn from(v: bool) -> Self {
        MappingKey::Bool(v)
    }
}

impl From<Address> for MappingKey {
    fn from(v: Address) -> Self {
        MappingKey::Address(v)
    }
}

impl From<B256> for MappingKey {
    fn from(v: B256) -> Self {
        MappingKey::FixedBytes(Bytes::from(v.to_vec()))
    }
}

impl From<&str> for MappingKey {
    fn from(v: &str) -> Self {
        MappingKey::String(v.to_string())
    }
}

impl From<String> for MappingKey {
    fn from(v: String) -> Self {
        MappingKey::String(v)
    }
}

impl fmt::Display for MappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingKey::Uint(v) => write!(f, "{v}"),
            MappingKey::Int(v) => write!(f, "{v}"),
            MappingKey::Bool(v) => write!(f, "{v}"),
            MappingKey::Address(a) => write!(f, "{a}"),
            MappingKey::FixedBytes(b) | MappingKey::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            MappingKey::String(s) => write!(f, "{s:?}"),
        }
    }
}
