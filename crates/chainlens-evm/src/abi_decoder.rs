//! Linear (calldata, return data, log data) decoding.
//!
//! Implements the ABI head/tail layout over the resolved type table in either
//! mode. A member that fails to decode becomes an error result in place and
//! its siblings are still decoded; callers inspect
//! [`DecodeResult::has_errors`] to decide whether to retry in ABI mode.

use crate::codec;
use alloy_primitives::{Bytes, U256};
use chainlens_core::{
    error::DecodingErrorKind,
    result::{Child, ChildKey, ContainerKind, DecodeResult},
    types::{ArrayLength, ElementaryKind, TypeDefinition, TypeId, TypeTable},
    value::{Mode, Value},
};
use tracing::debug;

const MAX_DEPTH: usize = 64;

/// Decoder for one mode over one type table.
#[derive(Clone, Copy)]
pub struct LinearDecoder<'a> {
    table: &'a TypeTable,
    mode: Mode,
}

impl<'a> LinearDecoder<'a> {
    pub fn new(table: &'a TypeTable, mode: Mode) -> Self {
        Self { table, mode }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Decode `data` as the tuple `(types...)`; one result per type.
    pub fn decode_params(&self, data: &[u8], types: &[TypeId]) -> Vec<DecodeResult> {
        let mut pos = 0;
        types
            .iter()
            .map(|ty| {
                let r = self.decode_at(data, pos, *ty, 0);
                pos += self.table.abi_head_size(*ty);
                r
            })
            .collect()
    }

    /// Decode a single static value from a 32-byte topic.
    pub fn decode_topic(&self, topic: &[u8; 32], ty: TypeId) -> DecodeResult {
        self.decode_at(topic, 0, ty, 0)
    }

    fn error(&self, kind: DecodingErrorKind, raw: &[u8], ty: TypeId) -> DecodeResult {
        DecodeResult::error(kind, Bytes::from(raw.to_vec()), ty, self.mode)
    }

    fn word<'b>(&self, region: &'b [u8], pos: usize) -> Result<&'b [u8; 32], DecodingErrorKind> {
        region
            .get(pos..pos + 32)
            .and_then(|w| w.try_into().ok())
            .ok_or(DecodingErrorKind::Truncated {
                offset: pos,
                needed: 32,
                available: region.len().saturating_sub(pos),
            })
    }

    /// Read a word as an offset/length that must fit in `limit`.
    fn small(&self, word: &[u8; 32], limit: usize) -> Option<usize> {
        let v = U256::from_be_bytes(*word);
        usize::try_from(v).ok().filter(|n| *n <= limit)
    }

    /// Decode the value whose head sits at `pos` of `region`.
    fn decode_at(&self, region: &[u8], pos: usize, ty: TypeId, depth: usize) -> DecodeResult {
        if !self.table.is_abi_dynamic(ty) {
            return self.decode_static(region, pos, ty, depth);
        }
        let word = match self.word(region, pos) {
            Ok(w) => w,
            Err(e) => return self.error(e, region.get(pos..).unwrap_or(&[]), ty),
        };
        match self.small(word, region.len()) {
            Some(offset) => self.decode_tail(&region[offset..], ty, depth),
            None => self.error(
                DecodingErrorKind::MalformedOffset {
                    offset: U256::from_be_bytes(*word).to_string(),
                },
                word,
                ty,
            ),
        }
    }

    fn decode_static(&self, region: &[u8], pos: usize, ty: TypeId, depth: usize) -> DecodeResult {
        if depth > MAX_DEPTH {
            return self.too_deep(ty);
        }
        match self.table.get(ty) {
            Some(TypeDefinition::Elementary(kind)) => match self.word(region, pos) {
                Ok(word) => match codec::decode_word(kind, word, self.mode) {
                    Ok(value) => DecodeResult::value(value, word.to_vec(), ty, self.mode),
                    Err(e) => self.error(e, word, ty),
                },
                Err(e) => self.error(e, region.get(pos..).unwrap_or(&[]), ty),
            },
            Some(TypeDefinition::Enum { variants, .. }) => {
                let word = match self.word(region, pos) {
                    Ok(w) => w,
                    Err(e) => return self.error(e, region.get(pos..).unwrap_or(&[]), ty),
                };
                let raw = U256::from_be_bytes(*word);
                match u8::try_from(raw).ok().filter(|i| (*i as usize) < variants.len()) {
                    Some(i) => DecodeResult::value(
                        Value::Enum {
                            variant: variants[i as usize].clone(),
                            index: i,
                        },
                        word.to_vec(),
                        ty,
                        self.mode,
                    ),
                    _ => self.error(
                        DecodingErrorKind::InvalidEnum {
                            index: raw.to_string(),
                            variants: variants.len(),
                        },
                        word,
                        ty,
                    ),
                }
            }
            Some(TypeDefinition::Contract { name, .. }) => {
                let word = match self.word(region, pos) {
                    Ok(w) => w,
                    Err(e) => return self.error(e, region.get(pos..).unwrap_or(&[]), ty),
                };
                match codec::decode_word(&ElementaryKind::Address, word, self.mode) {
                    Ok(Value::Address(address)) => DecodeResult::value(
                        Value::Contract {
                            address,
                            contract: name.clone(),
                        },
                        word.to_vec(),
                        ty,
                        self.mode,
                    ),
                    Ok(other) => DecodeResult::value(other, word.to_vec(), ty, self.mode),
                    Err(e) => self.error(e, word, ty),
                }
            }
            Some(TypeDefinition::Array {
                element,
                length: ArrayLength::Fixed(n),
            }) => {
                let stride = self.table.abi_head_size(*element);
                let needed = self.table.abi_head_size(ty);
                let available = region.len().saturating_sub(pos);
                if needed > available {
                    return self.error(
                        DecodingErrorKind::Truncated {
                            offset: pos,
                            needed,
                            available,
                        },
                        region.get(pos..).unwrap_or(&[]),
                        ty,
                    );
                }
                let children = (0..*n as usize)
                    .map(|i| Child {
                        key: ChildKey::Index(i),
                        result: self.decode_static(region, pos + i * stride, *element, depth + 1),
                    })
                    .collect();
                self.container(ContainerKind::Array, children, ty)
            }
            Some(TypeDefinition::Struct { members, .. }) => {
                let mut at = pos;
                let children = members
                    .iter()
                    .map(|m| {
                        let r = self.decode_static(region, at, m.ty, depth + 1);
                        at += self.table.abi_head_size(m.ty);
                        Child {
                            key: ChildKey::Name(m.name.clone()),
                            result: r,
                        }
                    })
                    .collect();
                self.container(ContainerKind::Struct, children, ty)
            }
            Some(TypeDefinition::Tuple(items)) => {
                let mut at = pos;
                let children = items
                    .iter()
                    .enumerate()
                    .map(|(i, t)| {
                        let r = self.decode_static(region, at, *t, depth + 1);
                        at += self.table.abi_head_size(*t);
                        Child {
                            key: ChildKey::Index(i),
                            result: r,
                        }
                    })
                    .collect();
                self.container(ContainerKind::Tuple, children, ty)
            }
            _ => self.unsupported(ty),
        }
    }

    /// Decode a dynamic value whose encoding starts at `region[0]`.
    fn decode_tail(&self, region: &[u8], ty: TypeId, depth: usize) -> DecodeResult {
        if depth > MAX_DEPTH {
            return self.too_deep(ty);
        }
        match self.table.get(ty) {
            Some(TypeDefinition::Elementary(kind)) if kind.is_dynamic() => {
                let word = match self.word(region, 0) {
                    Ok(w) => w,
                    Err(e) => return self.error(e, region, ty),
                };
                let Some(len) = self.small(word, region.len().saturating_sub(32)) else {
                    return self.error(
                        DecodingErrorKind::MalformedLength {
                            length: U256::from_be_bytes(*word).to_string(),
                        },
                        word,
                        ty,
                    );
                };
                let data = &region[32..32 + len];
                let padded_end = (32 + len.div_ceil(32) * 32).min(region.len());
                if self.mode == Mode::Full && region[32 + len..padded_end].iter().any(|b| *b != 0) {
                    return self.error(
                        DecodingErrorKind::DirtyPadding {
                            ty: kind.to_string(),
                        },
                        data,
                        ty,
                    );
                }
                match codec::decode_byte_string(kind, data, self.mode) {
                    Ok(value) => DecodeResult::value(value, data.to_vec(), ty, self.mode),
                    Err(e) => self.error(e, data, ty),
                }
            }
            Some(TypeDefinition::Array {
                element,
                length: ArrayLength::Dynamic,
            }) => {
                let word = match self.word(region, 0) {
                    Ok(w) => w,
                    Err(e) => return self.error(e, region, ty),
                };
                let stride = self.table.abi_head_size(*element).max(1);
                let body = &region[32..];
                let Some(len) = self.small(word, body.len() / stride) else {
                    return self.error(
                        DecodingErrorKind::MalformedLength {
                            length: U256::from_be_bytes(*word).to_string(),
                        },
                        word,
                        ty,
                    );
                };
                let children = self.sequence(body, std::iter::repeat(*element).take(len), depth);
                self.container(ContainerKind::Array, children, ty)
            }
            Some(TypeDefinition::Array {
                element,
                length: ArrayLength::Fixed(n),
            }) => {
                // every element has a head word, so the heads must fit first
                let stride = self.table.abi_head_size(*element);
                let fits = usize::try_from(*n)
                    .ok()
                    .filter(|n| n.saturating_mul(stride) <= region.len());
                let Some(n) = fits else {
                    return self.error(
                        DecodingErrorKind::Truncated {
                            offset: 0,
                            needed: usize::try_from(*n).unwrap_or(usize::MAX).saturating_mul(stride),
                            available: region.len(),
                        },
                        region,
                        ty,
                    );
                };
                let children = self.sequence(region, std::iter::repeat(*element).take(n), depth);
                self.container(ContainerKind::Array, children, ty)
            }
            Some(TypeDefinition::Struct { members, .. }) => {
                let children = self
                    .sequence(region, members.iter().map(|m| m.ty), depth)
                    .into_iter()
                    .zip(members)
                    .map(|(c, m)| Child {
                        key: ChildKey::Name(m.name.clone()),
                        result: c.result,
                    })
                    .collect();
                self.container(ContainerKind::Struct, children, ty)
            }
            Some(TypeDefinition::Tuple(items)) => {
                let children = self.sequence(region, items.iter().copied(), depth);
                self.container(ContainerKind::Tuple, children, ty)
            }
            _ => self.unsupported(ty),
        }
    }

    /// Head/tail-decode consecutive values from `region`.
    fn sequence(
        &self,
        region: &[u8],
        types: impl Iterator<Item = TypeId>,
        depth: usize,
    ) -> Vec<Child> {
        let mut pos = 0;
        types
            .enumerate()
            .map(|(i, t)| {
                let r = self.decode_at(region, pos, t, depth + 1);
                pos += self.table.abi_head_size(t);
                Child {
                    key: ChildKey::Index(i),
                    result: r,
                }
            })
            .collect()
    }

    fn container(&self, kind: ContainerKind, children: Vec<Child>, ty: TypeId) -> DecodeResult {
        DecodeResult::Container {
            kind,
            children,
            ty,
            mode: self.mode,
        }
    }

    fn unsupported(&self, ty: TypeId) -> DecodeResult {
        self.error(
            DecodingErrorKind::UnresolvedType {
                ty: self.table.display(ty),
                reason: "type has no ABI encoding".into(),
            },
            &[],
            ty,
        )
    }

    fn too_deep(&self, ty: TypeId) -> DecodeResult {
        self.error(
            DecodingErrorKind::MalformedOffset {
                offset: "nesting too deep".into(),
            },
            &[],
            ty,
        )
    }
}

/// Outcome of a decode attempted in full mode first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeDecoding {
    pub results: Vec<DecodeResult>,
    pub mode: Mode,
}

impl ModeDecoding {
    /// Whether every result decoded without an error anywhere inside it.
    pub fn is_clean(&self) -> bool {
        !self.results.iter().any(DecodeResult::has_errors)
    }
}

/// Run `decode` in full mode when `full_types` is available, retrying the
/// whole value list in ABI mode with `abi_types` if any result has errors.
/// Modes are never mixed within one decoding.
pub fn decode_with_fallback<F>(
    table: &TypeTable,
    full_types: Option<&[TypeId]>,
    abi_types: &[TypeId],
    decode: F,
) -> ModeDecoding
where
    F: Fn(&LinearDecoder<'_>, &[TypeId]) -> Vec<DecodeResult>,
{
    if let Some(types) = full_types {
        let full = ModeDecoding {
            results: decode(&LinearDecoder::new(table, Mode::Full), types),
            mode: Mode::Full,
        };
        if full.is_clean() {
            return full;
        }
        if let Some(err) = full.results.iter().find_map(DecodeResult::first_error) {
            debug!(error = %err, "full-mode decoding failed, retrying in ABI mode");
        }
    }
    ModeDecoding {
        results: decode(&LinearDecoder::new(table, Mode::Abi), abi_types),
        mode: Mode::Abi,
    }
}
