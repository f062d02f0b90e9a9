//! Keccak-256 fingerprints: function selectors, event topics and storage
//! slot derivation.
//!
//! A function selector is the first four bytes of
//!   keccak256("transfer(address,uint256)") → 0xa9059cbb
//! and an event's topic0 is the full hash of its canonical signature.

use alloy_primitives::{B256, U256};
use tiny_keccak::{Hasher, Keccak};

/// keccak256 of the concatenation of `parts`.
pub fn keccak256_concat(parts: &[&[u8]]) -> B256 {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize(&mut output);
    B256::from(output)
}

pub fn keccak256(data: &[u8]) -> B256 {
    keccak256_concat(&[data])
}

/// Four-byte selector of a function or error signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// topic0 of a non-anonymous event.
pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// Slot where the data of a dynamic array or long byte string rooted at
/// `slot` begins: keccak256(slot).
pub fn data_slot(slot: U256) -> U256 {
    U256::from_be_bytes(keccak256(&slot.to_be_bytes::<32>()).0)
}

/// Slot of the mapping entry for `key_preimage` in the mapping rooted at
/// `slot`: keccak256(preimage ‖ slot).
pub fn mapping_slot(key_preimage: &[u8], slot: U256) -> U256 {
    U256::from_be_bytes(keccak256_concat(&[key_preimage, &slot.to_be_bytes::<32>()]).0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erc20_transfer_selector() {
        assert_eq!(selector("transfer(address,uint256)"), [0xa9, 0x05, 0x9c, 0xbb]);
    }

    #[test]
    fn erc20_transfer_topic() {
        assert_eq!(
            format!("{}", event_topic("Transfer(address,address,uint256)")),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn builtin_revert_selectors() {
        assert_eq!(selector("Error(string)"), [0x08, 0xc3, 0x79, 0xa0]);
        assert_eq!(selector("Panic(uint256)"), [0x4e, 0x48, 0x7b, 0x71]);
    }

    #[test]
    fn array_data_slot_zero() {
        // keccak256(uint256(0)), the well-known start of a dynamic array at slot 0
        assert_eq!(
            B256::from(data_slot(U256::ZERO).to_be_bytes::<32>()).to_string(),
            "0x290decd9548b62a8d60345a988386fc84ba6bc95484008f6362f93160ef3e563"
        );
    }
}
