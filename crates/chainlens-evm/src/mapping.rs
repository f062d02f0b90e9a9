//! Mapping keys: conversion of caller-supplied keys to the mapping's key type
//! and derivation of the entry slot.
//!
//! Value-type keys are hashed as their padded 32-byte word, `string` and
//! `bytes` keys as their raw bytes.

use crate::codec::sign_extend;
use crate::fingerprint;
use alloy_primitives::{Address, Bytes, I256, U256};
use chainlens_core::{
    types::{ElementaryKind, TypeDefinition, TypeId, TypeTable},
    value::{MappingKey, Value},
};

/// A key converted to a mapping's key type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedKey {
    /// The key as it will be reported in results.
    pub value: Value,
    /// Bytes hashed together with the mapping's slot.
    pub preimage: Vec<u8>,
}

impl NormalizedKey {
    /// Slot of this key's entry in the mapping rooted at `slot`.
    pub fn entry_slot(&self, slot: U256) -> U256 {
        fingerprint::mapping_slot(&self.preimage, slot)
    }
}

/// Keys through one or more nested mappings, with the slot of every entry
/// along the way derived once, when the path is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    root: U256,
    keys: Vec<NormalizedKey>,
    /// `slots[i]` is the entry reached by `keys[..=i]`.
    slots: Vec<U256>,
}

impl KeyPath {
    /// Path from the mapping rooted at `root`.
    pub fn new(root: U256, keys: Vec<NormalizedKey>) -> Self {
        let mut slots = Vec::with_capacity(keys.len());
        let mut at = root;
        for key in &keys {
            at = key.entry_slot(at);
            slots.push(at);
        }
        Self { root, keys, slots }
    }

    pub fn root(&self) -> U256 {
        self.root
    }

    pub fn keys(&self) -> &[NormalizedKey] {
        &self.keys
    }

    pub fn slots(&self) -> &[U256] {
        &self.slots
    }

    /// The slot of the innermost entry.
    pub fn entry_slot(&self) -> Option<U256> {
        self.slots.last().copied()
    }

    /// Whether both paths hash the same keys.
    pub fn same_keys(&self, keys: &[NormalizedKey]) -> bool {
        self.keys.len() == keys.len()
            && self.keys.iter().zip(keys).all(|(a, b)| a.preimage == b.preimage)
    }

    /// Whether this path starts with `prefix`.
    pub fn starts_with(&self, prefix: &[NormalizedKey]) -> bool {
        self.keys.len() >= prefix.len()
            && self.keys[..prefix.len()]
                .iter()
                .zip(prefix)
                .all(|(a, b)| a.preimage == b.preimage)
    }
}

fn address_word(a: &Address) -> Vec<u8> {
    let mut word = vec![0u8; 32];
    word[12..].copy_from_slice(a.as_slice());
    word
}

fn uint_in_range(v: U256, bits: u16) -> bool {
    bits >= 256 || v < (U256::from(1) << bits as usize)
}

fn mismatch(key: &MappingKey, ty: &str) -> String {
    format!("{key} cannot be used as a {ty} key")
}

/// Convert `key` to the key type `key_ty`.
pub fn normalize_key(
    table: &TypeTable,
    key_ty: TypeId,
    key: &MappingKey,
) -> Result<NormalizedKey, String> {
    let def = table
        .get(key_ty)
        .ok_or_else(|| format!("unknown key type {key_ty}"))?;
    let (value, preimage) = match (def, key) {
        (TypeDefinition::Elementary(kind), _) => elementary_key(kind, key)?,
        (TypeDefinition::Enum { name, variants }, MappingKey::Uint(v)) => {
            let index = u8::try_from(*v)
                .ok()
                .filter(|i| (*i as usize) < variants.len())
                .ok_or_else(|| format!("{v} is not a member of enum {name}"))?;
            (
                Value::Enum {
                    variant: variants[index as usize].clone(),
                    index,
                },
                v.to_be_bytes::<32>().to_vec(),
            )
        }
        (TypeDefinition::Contract { name, .. }, MappingKey::Address(a)) => (
            Value::Contract {
                address: *a,
                contract: name.clone(),
            },
            address_word(a),
        ),
        _ => return Err(mismatch(key, &table.display(key_ty))),
    };
    Ok(NormalizedKey { value, preimage })
}

fn elementary_key(kind: &ElementaryKind, key: &MappingKey) -> Result<(Value, Vec<u8>), String> {
    let ty = kind.to_string();
    Ok(match (kind, key) {
        (ElementaryKind::Uint(bits), MappingKey::Uint(v)) => {
            if !uint_in_range(*v, *bits) {
                return Err(format!("{v} does not fit in {ty}"));
            }
            (Value::Uint(*v), v.to_be_bytes::<32>().to_vec())
        }
        (ElementaryKind::Int(bits), MappingKey::Int(v)) => {
            let raw = v.into_raw();
            if sign_extend(raw, *bits as usize) != *v {
                return Err(format!("{v} does not fit in {ty}"));
            }
            (Value::Int(*v), raw.to_be_bytes::<32>().to_vec())
        }
        (ElementaryKind::Int(bits), MappingKey::Uint(v)) => {
            // non-negative literal for a signed key
            if *bits == 0 || !uint_in_range(*v, *bits - 1) {
                return Err(format!("{v} does not fit in {ty}"));
            }
            (
                Value::Int(I256::from_raw(*v)),
                v.to_be_bytes::<32>().to_vec(),
            )
        }
        (ElementaryKind::Bool, MappingKey::Bool(b)) => {
            let mut word = vec![0u8; 32];
            word[31] = *b as u8;
            (Value::Bool(*b), word)
        }
        (ElementaryKind::Address, MappingKey::Address(a)) => (Value::Address(*a), address_word(a)),
        (ElementaryKind::FixedBytes(n), MappingKey::FixedBytes(b)) => {
            if b.len() > *n as usize {
                return Err(format!("{} bytes do not fit in {ty}", b.len()));
            }
            let mut padded = b.to_vec();
            padded.resize(*n as usize, 0);
            let mut word = padded.clone();
            word.resize(32, 0);
            (Value::FixedBytes(Bytes::from(padded)), word)
        }
        (ElementaryKind::String, MappingKey::String(s)) => {
            (Value::String(s.clone()), s.as_bytes().to_vec())
        }
        (ElementaryKind::Bytes, MappingKey::Bytes(b)) => (Value::Bytes(b.clone()), b.to_vec()),
        (ElementaryKind::Bytes, MappingKey::String(s)) => (
            Value::Bytes(Bytes::from(s.as_bytes().to_vec())),
            s.as_bytes().to_vec(),
        ),
        _ => return Err(mismatch(key, &ty)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainlens_core::types::TypeTableBuilder;

    fn table_with(kind: ElementaryKind) -> (TypeTable, TypeId) {
        let mut b = TypeTableBuilder::new();
        let ty = b.elementary(kind);
        (b.finish(), ty)
    }

    #[test]
    fn address_key_slot_matches_solidity() {
        let (table, ty) = table_with(ElementaryKind::Address);
        let holder = Address::repeat_byte(0x11);
        let key = normalize_key(&table, ty, &MappingKey::Address(holder)).unwrap();
        let mut expected = [0u8; 64];
        expected[12..32].copy_from_slice(holder.as_slice());
        expected[63] = 3;
        assert_eq!(
            key.entry_slot(U256::from(3)),
            U256::from_be_bytes(fingerprint::keccak256(&expected).0)
        );
    }

    #[test]
    fn string_keys_hash_raw_bytes() {
        let (table, ty) = table_with(ElementaryKind::String);
        let key = normalize_key(&table, ty, &"abc".into()).unwrap();
        assert_eq!(key.preimage, b"abc".to_vec());
    }

    #[test]
    fn out_of_range_keys_are_rejected() {
        let (table, ty) = table_with(ElementaryKind::Uint(8));
        assert!(normalize_key(&table, ty, &MappingKey::from(256u64)).is_err());
        assert!(normalize_key(&table, ty, &MappingKey::from(true)).is_err());

        let (table, ty) = table_with(ElementaryKind::Int(8));
        let minus_129 = I256::try_from(-129i64).unwrap();
        assert!(normalize_key(&table, ty, &MappingKey::Int(minus_129)).is_err());
        let minus_one = I256::try_from(-1i64).unwrap();
        let key = normalize_key(&table, ty, &MappingKey::Int(minus_one)).unwrap();
        assert_eq!(key.preimage, vec![0xff; 32]);
    }

    #[test]
    fn enum_keys_take_member_index() {
        let mut b = TypeTableBuilder::new();
        let ty = b.intern(TypeDefinition::Enum {
            name: "Vault.Status".into(),
            variants: vec!["Open".into(), "Closed".into()],
        });
        let table = b.finish();
        let key = normalize_key(&table, ty, &MappingKey::from(1u64)).unwrap();
        assert_eq!(
            key.value,
            Value::Enum {
                variant: "Closed".into(),
                index: 1
            }
        );
        assert!(normalize_key(&table, ty, &MappingKey::from(2u64)).is_err());
    }

    #[test]
    fn key_path_derives_each_level_once() {
        let (table, ty) = table_with(ElementaryKind::Address);
        let owner = normalize_key(&table, ty, &Address::repeat_byte(0x11).into()).unwrap();
        let spender = normalize_key(&table, ty, &Address::repeat_byte(0x22).into()).unwrap();
        let root = U256::from(5);

        let path = KeyPath::new(root, vec![owner.clone(), spender.clone()]);
        let outer = owner.entry_slot(root);
        assert_eq!(path.slots(), &[outer, spender.entry_slot(outer)]);
        assert_eq!(path.entry_slot(), Some(spender.entry_slot(outer)));
        assert!(path.starts_with(std::slice::from_ref(&owner)));
        assert!(!path.starts_with(std::slice::from_ref(&spender)));
        assert!(path.same_keys(&[owner, spender]));
    }
}
