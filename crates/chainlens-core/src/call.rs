//! Decoded transactions, calls and return data.

use crate::provider::RawTransaction;
use crate::result::DecodeResult;
use crate::value::Mode;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// One decoded parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    /// Parameter name; `None` when the ABI leaves it blank.
    pub name: Option<String>,
    pub result: DecodeResult,
}

/// Look up an argument by name in a decoded parameter list.
pub fn find_argument<'a>(args: &'a [Argument], name: &str) -> Option<&'a DecodeResult> {
    args.iter()
        .find(|a| a.name.as_deref() == Some(name))
        .map(|a| &a.result)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Function,
    Constructor,
    /// Empty calldata sent to a contract with a `receive` function.
    Receive,
    /// Unrecognised selector on a contract with a `fallback` function.
    Fallback,
    Unknown,
}

/// One candidate interpretation of a transaction's input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallDecoding {
    /// Contract type whose ABI produced this interpretation.
    pub contract: String,
    pub kind: TransactionKind,
    /// Function name; `None` for constructor, receive and fallback.
    pub name: Option<String>,
    /// Canonical signature, e.g. `transfer(address,uint256)`.
    pub signature: Option<String>,
    pub selector: Option<[u8; 4]>,
    pub arguments: Vec<Argument>,
    pub mode: Mode,
}

impl CallDecoding {
    pub fn argument(&self, name: &str) -> Option<&DecodeResult> {
        find_argument(&self.arguments, name)
    }

    pub fn selector_hex(&self) -> Option<String> {
        self.selector.map(|s| format!("0x{}", hex::encode(s)))
    }
}

/// Result of decoding a transaction.
///
/// `decodings` holds every matching interpretation in the order contracts were
/// supplied; it is empty when nothing matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedTransaction {
    pub transaction: RawTransaction,
    /// Contract identified at `to` by its on-chain code, if any.
    pub identified: Option<String>,
    pub decodings: Vec<CallDecoding>,
}

impl DecodedTransaction {
    /// Kind of the first decoding, or `Unknown`.
    pub fn kind(&self) -> TransactionKind {
        self.decodings
            .first()
            .map(|d| d.kind)
            .unwrap_or(TransactionKind::Unknown)
    }

    pub fn to(&self) -> Option<Address> {
        self.transaction.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnKind {
    /// Normal return data of the function.
    Return,
    /// `Error(string)` revert.
    Revert,
    /// `Panic(uint256)` compiler-inserted check failure.
    Panic,
    /// Custom error declared in the ABI.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnDecoding {
    pub kind: ReturnKind,
    /// Custom error name, or the builtin `Error` / `Panic`.
    pub name: Option<String>,
    pub arguments: Vec<Argument>,
    pub mode: Mode,
}

impl ReturnDecoding {
    pub fn argument(&self, name: &str) -> Option<&DecodeResult> {
        find_argument(&self.arguments, name)
    }
}

/// Description of a Solidity panic code.
pub fn panic_reason(code: U256) -> Option<&'static str> {
    let code: u64 = code.try_into().ok()?;
    Some(match code {
        0x00 => "generic compiler panic",
        0x01 => "assertion failed",
        0x11 => "arithmetic overflow or underflow",
        0x12 => "division or modulo by zero",
        0x21 => "invalid enum conversion",
        0x22 => "incorrectly encoded storage byte array",
        0x31 => "pop on empty array",
        0x32 => "array index out of bounds",
        0x41 => "out of memory",
        0x51 => "call to zero-initialized function",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_codes() {
        assert_eq!(panic_reason(U256::from(0x11)), Some("arithmetic overflow or underflow"));
        assert_eq!(panic_reason(U256::from(0x99)), None);
        assert_eq!(panic_reason(U256::MAX), None);
    }

    #[test]
    fn empty_transaction_is_unknown() {
        let tx = DecodedTransaction {
            transaction: RawTransaction::call(Address::ZERO, vec![1, 2, 3]),
            identified: None,
            decodings: vec![],
        };
        assert_eq!(tx.kind(), TransactionKind::Unknown);
    }
}
