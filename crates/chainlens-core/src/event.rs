//! Decoded event logs.

use crate::call::{find_argument, Argument};
use crate::provider::RawLog;
use crate::result::DecodeResult;
use crate::value::Mode;
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// A log matched against one event declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDecoding {
    /// Contract type whose ABI declared the event.
    pub contract: String,
    pub name: String,
    /// Canonical signature, e.g. `Transfer(address,address,uint256)`.
    pub signature: String,
    /// keccak256 of the signature. Absent for anonymous events.
    pub topic: Option<B256>,
    pub anonymous: bool,
    /// Arguments in declaration order, indexed and non-indexed interleaved.
    pub arguments: Vec<Argument>,
    pub mode: Mode,
}

impl EventDecoding {
    pub fn argument(&self, name: &str) -> Option<&DecodeResult> {
        find_argument(&self.arguments, name)
    }
}

/// One entry produced for a log.
///
/// A log matching several declarations yields one `DecodedLog` per match.
/// `event` is `None` only for unrecognised logs returned because the caller
/// asked for extras.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedLog {
    pub log: RawLog,
    pub event: Option<EventDecoding>,
}

impl DecodedLog {
    pub fn is_decoded(&self) -> bool {
        self.event.is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.event.as_ref().map(|e| e.name.as_str())
    }

    pub fn mode(&self) -> Option<Mode> {
        self.event.as_ref().map(|e| e.mode)
    }
}
