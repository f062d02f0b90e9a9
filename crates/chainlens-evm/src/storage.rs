//! State-variable decoding from contract storage.
//!
//! Storage is only readable in full mode: the slot of every variable comes
//! from the computed [`StorageAllocation`]. Each [`StorageReader`] caches the
//! words it fetches, so one decode call reads any slot at most once.
//!
//! # Encodings
//! - value types sit in place at their byte offset (low-order end first)
//! - `bytes`/`string` of at most 31 bytes share the slot with `length * 2`
//!   in the lowest byte; longer ones store `length * 2 + 1` and their data
//!   from `keccak256(slot)` on
//! - dynamic arrays store their length; elements start at `keccak256(slot)`
//! - mapping entries live at `keccak256(key ‖ slot)`, and only entries whose
//!   keys are watched are read; their slots come precomputed in a [`KeyPath`]

use crate::allocator::{element_position, packed_kind, StateVariable, StorageAllocation};
use crate::codec;
use crate::fingerprint::data_slot;
use crate::mapping::{KeyPath, NormalizedKey};
use alloy_primitives::{Address, Bytes, B256, U256};
use chainlens_core::{
    error::{DecodingErrorKind, ProviderError},
    provider::{BlockTag, Provider},
    result::{Child, ChildKey, ContainerKind, DecodeResult},
    types::{ArrayLength, ElementaryKind, TypeDefinition, TypeId, TypeTable},
    value::{Mode, Value},
};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::trace;

const MAX_DEPTH: usize = 64;

type ReadResult = Result<DecodeResult, ProviderError>;

/// The part of a [`KeyPath`] below the mapping being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tail<'s> {
    keys: &'s [NormalizedKey],
    slots: &'s [U256],
}

impl<'s> Tail<'s> {
    fn of(path: &'s KeyPath) -> Self {
        Self {
            keys: path.keys(),
            slots: path.slots(),
        }
    }

    fn split_first(self) -> Option<(&'s NormalizedKey, U256, Tail<'s>)> {
        let (key, keys) = self.keys.split_first()?;
        let (slot, slots) = self.slots.split_first()?;
        Some((key, *slot, Tail { keys, slots }))
    }
}

/// Reads and decodes state variables of one contract instance at one block.
pub struct StorageReader<'a> {
    provider: &'a dyn Provider,
    address: Address,
    block: BlockTag,
    table: &'a TypeTable,
    allocation: &'a StorageAllocation,
    max_array_length: usize,
    cache: Mutex<HashMap<U256, B256>>,
}

impl<'a> StorageReader<'a> {
    pub fn new(
        provider: &'a dyn Provider,
        address: Address,
        block: BlockTag,
        table: &'a TypeTable,
        allocation: &'a StorageAllocation,
        max_array_length: usize,
    ) -> Self {
        Self {
            provider,
            address,
            block,
            table,
            allocation,
            max_array_length,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct slots fetched so far.
    pub fn slots_read(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Decode `variable`, including the mapping entries reached by `watched`
    /// key paths. Paths rooted elsewhere than the variable's slot are
    /// re-derived.
    pub async fn read_variable(&self, variable: &StateVariable, watched: &[KeyPath]) -> ReadResult {
        let root = variable.location.slot;
        let rebased: Vec<KeyPath> = watched
            .iter()
            .filter(|p| p.root() != root)
            .map(|p| KeyPath::new(root, p.keys().to_vec()))
            .collect();
        let paths = watched
            .iter()
            .filter(|p| p.root() == root)
            .chain(&rebased)
            .map(Tail::of)
            .collect();
        self.read(
            variable.ty,
            variable.location.slot,
            variable.location.offset,
            paths,
            0,
        )
        .await
    }

    async fn word(&self, slot: U256) -> Result<B256, ProviderError> {
        let cached = {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            cache.get(&slot).copied()
        };
        if let Some(word) = cached {
            return Ok(word);
        }
        trace!(address = %self.address, slot = %slot, block = %self.block, "reading storage slot");
        let word = self
            .provider
            .get_storage_at(self.address, slot, self.block)
            .await?;
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(slot, word);
        Ok(word)
    }

    fn value(&self, value: Value, raw: impl Into<Bytes>, ty: TypeId) -> DecodeResult {
        DecodeResult::value(value, raw, ty, Mode::Full)
    }

    fn error(&self, kind: DecodingErrorKind, raw: impl Into<Bytes>, ty: TypeId) -> DecodeResult {
        DecodeResult::error(kind, raw, ty, Mode::Full)
    }

    fn container(&self, kind: ContainerKind, children: Vec<Child>, ty: TypeId) -> DecodeResult {
        DecodeResult::Container {
            kind,
            children,
            ty,
            mode: Mode::Full,
        }
    }

    fn overlong(&self, length: U256, ty: TypeId) -> DecodeResult {
        self.error(
            DecodingErrorKind::OverlongArray {
                length: length.to_string(),
                max: self.max_array_length as u64,
            },
            Vec::new(),
            ty,
        )
    }

    /// Decode the value of type `ty` stored at `slot`, `offset` bytes from
    /// the low-order end.
    fn read<'s>(
        &'s self,
        ty: TypeId,
        slot: U256,
        offset: usize,
        paths: Vec<Tail<'s>>,
        depth: usize,
    ) -> BoxFuture<'s, ReadResult> {
        async move {
            if depth > MAX_DEPTH {
                return Ok(self.error(
                    DecodingErrorKind::UnresolvedType {
                        ty: self.table.display(ty),
                        reason: "nesting too deep".into(),
                    },
                    Vec::new(),
                    ty,
                ));
            }
            if let Some(kind) = packed_kind(self.table, ty) {
                return self.read_packed(ty, &kind, slot, offset).await;
            }
            match self.table.get(ty) {
                Some(TypeDefinition::Elementary(kind)) => {
                    let word = self.word(slot).await?;
                    Ok(match self.read_byte_string(slot, word, ty).await? {
                        Ok(data) => match codec::decode_byte_string(kind, &data, Mode::Full) {
                            Ok(v) => self.value(v, data, ty),
                            Err(e) => self.error(e, data, ty),
                        },
                        Err(err) => err,
                    })
                }
                Some(TypeDefinition::Array { element, length }) => {
                    let (count, base) = match length {
                        ArrayLength::Fixed(n) => (U256::from(*n), slot),
                        ArrayLength::Dynamic => {
                            let word = self.word(slot).await?;
                            (U256::from_be_bytes(word.0), data_slot(slot))
                        }
                    };
                    let count = match usize::try_from(count) {
                        Ok(n) if n <= self.max_array_length => n,
                        _ => return Ok(self.overlong(count, ty)),
                    };
                    let size = match self.allocation.size_of(self.table, *element) {
                        Ok(size) => size,
                        Err(reason) => {
                            return Ok(self.error(
                                DecodingErrorKind::UnresolvedType {
                                    ty: self.table.display(*element),
                                    reason,
                                },
                                Vec::new(),
                                ty,
                            ))
                        }
                    };
                    let mut children = Vec::with_capacity(count);
                    for i in 0..count {
                        let (slot_offset, byte_offset) = element_position(size, i as u64);
                        let at = base.wrapping_add(slot_offset);
                        let result = self
                            .read(*element, at, byte_offset, Vec::new(), depth + 1)
                            .await?;
                        children.push(Child {
                            key: ChildKey::Index(i),
                            result,
                        });
                    }
                    Ok(self.container(ContainerKind::Array, children, ty))
                }
                Some(TypeDefinition::Struct { name, .. }) => {
                    let Some(layout) = self.allocation.struct_layout(ty) else {
                        return Ok(self.error(
                            DecodingErrorKind::UnresolvedType {
                                ty: name.clone(),
                                reason: "struct has no storage layout".into(),
                            },
                            Vec::new(),
                            ty,
                        ));
                    };
                    let mut children = Vec::with_capacity(layout.members.len());
                    for (member, member_ty, at) in &layout.members {
                        let at = at.shifted(slot);
                        let result = self
                            .read(*member_ty, at.slot, at.offset, Vec::new(), depth + 1)
                            .await?;
                        children.push(Child {
                            key: ChildKey::Name(member.clone()),
                            result,
                        });
                    }
                    Ok(self.container(ContainerKind::Struct, children, ty))
                }
                Some(TypeDefinition::Mapping { value, .. }) => {
                    let mut children = Vec::new();
                    for (key, entry, tails) in group_paths(&paths) {
                        let result = self.read(*value, entry, 0, tails, depth + 1).await?;
                        children.push(Child {
                            key: ChildKey::Key(key.value.clone()),
                            result,
                        });
                    }
                    Ok(self.container(ContainerKind::Mapping, children, ty))
                }
                _ => Ok(self.error(
                    DecodingErrorKind::UnresolvedType {
                        ty: self.table.display(ty),
                        reason: "type cannot be stored".into(),
                    },
                    Vec::new(),
                    ty,
                )),
            }
        }
        .boxed()
    }

    async fn read_packed(
        &self,
        ty: TypeId,
        kind: &ElementaryKind,
        slot: U256,
        offset: usize,
    ) -> ReadResult {
        let word = self.word(slot).await?;
        let width = kind.width().unwrap_or(32);
        let Some(end) = 32usize.checked_sub(offset) else {
            return Ok(self.error(
                DecodingErrorKind::Truncated {
                    offset,
                    needed: width,
                    available: 0,
                },
                word.to_vec(),
                ty,
            ));
        };
        let start = end.saturating_sub(width);
        let segment = &word[start..end];
        let value = match codec::decode_packed(kind, segment) {
            Ok(v) => v,
            Err(e) => return Ok(self.error(e, segment.to_vec(), ty)),
        };
        Ok(match (self.table.get(ty), value) {
            (Some(TypeDefinition::Enum { variants, .. }), Value::Uint(raw)) => {
                match u8::try_from(raw).ok().filter(|i| (*i as usize) < variants.len()) {
                    Some(index) => self.value(
                        Value::Enum {
                            variant: variants[index as usize].clone(),
                            index,
                        },
                        segment.to_vec(),
                        ty,
                    ),
                    None => self.error(
                        DecodingErrorKind::InvalidEnum {
                            index: raw.to_string(),
                            variants: variants.len(),
                        },
                        segment.to_vec(),
                        ty,
                    ),
                }
            }
            (Some(TypeDefinition::Contract { name, .. }), Value::Address(address)) => self.value(
                Value::Contract {
                    address,
                    contract: name.clone(),
                },
                segment.to_vec(),
                ty,
            ),
            (_, value) => self.value(value, segment.to_vec(), ty),
        })
    }

    /// Content of a `bytes`/`string` rooted at `slot` whose first word is
    /// `word`. The inner `Err` is an error result for malformed encodings.
    async fn read_byte_string(
        &self,
        slot: U256,
        word: B256,
        ty: TypeId,
    ) -> Result<Result<Vec<u8>, DecodeResult>, ProviderError> {
        let last = word[31];
        if last & 1 == 0 {
            let len = (last / 2) as usize;
            if len > 31 {
                return Ok(Err(self.error(
                    DecodingErrorKind::MalformedLength {
                        length: len.to_string(),
                    },
                    word.to_vec(),
                    ty,
                )));
            }
            return Ok(Ok(word[..len].to_vec()));
        }

        let length = (U256::from_be_bytes(word.0) - U256::from(1)) / U256::from(2);
        let max_bytes = self.max_array_length.saturating_mul(32);
        let len = match usize::try_from(length) {
            Ok(n) if n <= max_bytes => n,
            _ => return Ok(Err(self.overlong(length, ty))),
        };
        let start = data_slot(slot);
        let mut data = Vec::with_capacity(len.next_multiple_of(32));
        for i in 0..len.div_ceil(32) {
            let chunk = self.word(start.wrapping_add(U256::from(i))).await?;
            data.extend_from_slice(chunk.as_slice());
        }
        data.truncate(len);
        Ok(Ok(data))
    }
}

/// Split key paths by their first key, keeping first-seen order and
/// dropping duplicates. Each group carries its entry's slot.
fn group_paths<'s>(paths: &[Tail<'s>]) -> Vec<(&'s NormalizedKey, U256, Vec<Tail<'s>>)> {
    let mut groups: Vec<(&'s NormalizedKey, U256, Vec<Tail<'s>>)> = Vec::new();
    for path in paths.iter().copied() {
        let Some((head, entry, tail)) = path.split_first() else {
            continue;
        };
        let nested = !tail.keys.is_empty();
        match groups.iter_mut().find(|(k, _, _)| k.preimage == head.preimage) {
            Some((_, _, tails)) => {
                if nested && !tails.iter().any(|t| t.keys == tail.keys) {
                    tails.push(tail);
                }
            }
            None => {
                let tails = if nested { vec![tail] } else { Vec::new() };
                groups.push((head, entry, tails));
            }
        }
    }
    groups
}

/// Decode every variable of `allocation`, in layout order.
///
/// `watched` returns the key paths registered for a variable.
pub async fn read_all<'a, F>(
    reader: &StorageReader<'a>,
    allocation: &StorageAllocation,
    watched: F,
) -> Result<Vec<(StateVariable, DecodeResult)>, ProviderError>
where
    F: Fn(&StateVariable) -> Vec<KeyPath>,
{
    let mut out = Vec::with_capacity(allocation.variables.len());
    for variable in &allocation.variables {
        let paths = watched(variable);
        let result = reader.read_variable(variable, &paths).await?;
        out.push((variable.clone(), result));
    }
    Ok(out)
}
