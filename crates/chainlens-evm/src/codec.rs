//! Elementary value codec for 32-byte ABI words and packed storage segments.
//!
//! # ABI words
//! - integers, `bool`, `address`, enums and contract types are right-aligned
//! - `bytesN` and external function pointers are left-aligned
//!
//! In full mode the unused bytes must be clean (zero, or the sign extension
//! for signed integers) and booleans must be exactly 0 or 1. ABI mode takes
//! the meaningful bytes as they are: any non-zero boolean reads as `true`.

use alloy_primitives::{Address, Bytes, I256, U256};
use chainlens_core::{
    error::DecodingErrorKind,
    types::ElementaryKind,
    value::{Mode, Value},
};

fn dirty(kind: &ElementaryKind) -> DecodingErrorKind {
    DecodingErrorKind::DirtyPadding {
        ty: kind.to_string(),
    }
}

/// Sign-extend the low `bits` of `raw`.
pub fn sign_extend(raw: U256, bits: usize) -> I256 {
    if bits >= 256 {
        return I256::from_raw(raw);
    }
    let mask = (U256::from(1) << bits) - U256::from(1);
    let low = raw & mask;
    let negative = low.bit(bits - 1);
    I256::from_raw(if negative { low | !mask } else { low })
}

/// Decode a right- or left-aligned elementary value from an ABI word.
pub fn decode_word(
    kind: &ElementaryKind,
    word: &[u8; 32],
    mode: Mode,
) -> Result<Value, DecodingErrorKind> {
    let strict = mode == Mode::Full;
    let full = U256::from_be_bytes(*word);
    match kind {
        ElementaryKind::Uint(bits) => {
            let bits = *bits as usize;
            let value = if bits >= 256 {
                full
            } else {
                full & ((U256::from(1) << bits) - U256::from(1))
            };
            if strict && value != full {
                return Err(dirty(kind));
            }
            Ok(Value::Uint(value))
        }
        ElementaryKind::Int(bits) => {
            let value = sign_extend(full, *bits as usize);
            if strict && value.into_raw() != full {
                return Err(dirty(kind));
            }
            Ok(Value::Int(value))
        }
        ElementaryKind::Bool => {
            if strict && full > U256::from(1) {
                return Err(DecodingErrorKind::InvalidBool {
                    raw: hex::encode(word),
                });
            }
            Ok(Value::Bool(!full.is_zero()))
        }
        ElementaryKind::Address => {
            if strict && word[..12].iter().any(|b| *b != 0) {
                return Err(dirty(kind));
            }
            Ok(Value::Address(Address::from_slice(&word[12..])))
        }
        ElementaryKind::FixedBytes(n) => {
            let n = *n as usize;
            if strict && word[n..].iter().any(|b| *b != 0) {
                return Err(dirty(kind));
            }
            Ok(Value::FixedBytes(Bytes::from(word[..n].to_vec())))
        }
        ElementaryKind::Function => {
            if strict && word[24..].iter().any(|b| *b != 0) {
                return Err(dirty(kind));
            }
            Ok(function_value(&word[..24]))
        }
        ElementaryKind::Bytes | ElementaryKind::String => Err(DecodingErrorKind::UnresolvedType {
            ty: kind.to_string(),
            reason: "dynamic type has no single-word encoding".into(),
        }),
    }
}

fn function_value(bytes24: &[u8]) -> Value {
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&bytes24[20..24]);
    Value::Function {
        address: Address::from_slice(&bytes24[..20]),
        selector,
    }
}

/// Decode a packed storage segment of exactly the kind's width.
///
/// Storage is always decoded in full mode, so booleans other than 0/1 are
/// rejected.
pub fn decode_packed(kind: &ElementaryKind, segment: &[u8]) -> Result<Value, DecodingErrorKind> {
    if Some(segment.len()) != kind.width() {
        return Err(DecodingErrorKind::Truncated {
            offset: 0,
            needed: kind.width().unwrap_or(0),
            available: segment.len(),
        });
    }
    let as_uint = || U256::from_be_slice(segment);
    Ok(match kind {
        ElementaryKind::Uint(_) => Value::Uint(as_uint()),
        ElementaryKind::Int(bits) => Value::Int(sign_extend(as_uint(), *bits as usize)),
        ElementaryKind::Bool => match segment[0] {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            _ => {
                return Err(DecodingErrorKind::InvalidBool {
                    raw: hex::encode(segment),
                })
            }
        },
        ElementaryKind::Address => Value::Address(Address::from_slice(segment)),
        ElementaryKind::FixedBytes(_) => Value::FixedBytes(Bytes::from(segment.to_vec())),
        ElementaryKind::Function => function_value(segment),
        ElementaryKind::Bytes | ElementaryKind::String => unreachable_dynamic(kind)?,
    })
}

fn unreachable_dynamic(kind: &ElementaryKind) -> Result<Value, DecodingErrorKind> {
    Err(DecodingErrorKind::UnresolvedType {
        ty: kind.to_string(),
        reason: "dynamic type is not stored in place".into(),
    })
}

/// Interpret byte-string content as `bytes` or `string`.
pub fn decode_byte_string(
    kind: &ElementaryKind,
    data: &[u8],
    mode: Mode,
) -> Result<Value, DecodingErrorKind> {
    match kind {
        ElementaryKind::String => match std::str::from_utf8(data) {
            Ok(s) => Ok(Value::String(s.to_string())),
            Err(_) if mode == Mode::Abi => Ok(Value::String(String::from_utf8_lossy(data).into_owned())),
            Err(_) => Err(DecodingErrorKind::InvalidUtf8),
        },
        _ => Ok(Value::Bytes(Bytes::from(data.to_vec()))),
    }
}
