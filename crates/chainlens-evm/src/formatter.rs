//! Projection of full-mode results onto their ABI-mode equivalent.
//!
//! Member names become positions, enums their `uint8` index and contract
//! types plain addresses. Raw bytes are kept as they are, so the projected
//! result is a reinterpretation of the same source bytes. The projection is
//! total and idempotent; ABI-mode results come back unchanged apart from
//! their type ids being normalised.
//!
//! Errors that only full mode raises (booleans other than 0/1, enum indices
//! out of range, dirty padding, invalid UTF-8) are decoded again from their
//! raw bytes, since ABI mode accepts them. Structural errors such as
//! truncation or a bad offset stay errors.

use crate::codec;
use alloy_primitives::{Bytes, U256};
use chainlens_core::{
    call::{Argument, CallDecoding, ReturnDecoding},
    error::DecodingErrorKind,
    event::EventDecoding,
    result::{Child, ChildKey, ContainerKind, DecodeResult},
    types::{ElementaryKind, TypeDefinition, TypeId, TypeTable},
    value::{Mode, Value},
};

fn value_to_abi(value: &Value) -> Value {
    match value {
        Value::Enum { index, .. } => Value::Uint(U256::from(*index)),
        Value::Contract { address, .. } => Value::Address(*address),
        other => other.clone(),
    }
}

/// Decode `raw` in ABI mode as `ty`, for errors ABI mode does not raise.
fn reinterpret(
    error: &DecodingErrorKind,
    raw: &Bytes,
    ty: TypeId,
    table: &TypeTable,
) -> Option<Value> {
    use DecodingErrorKind::*;
    if !matches!(
        error,
        InvalidBool { .. } | InvalidEnum { .. } | DirtyPadding { .. } | InvalidUtf8
    ) {
        return None;
    }
    let Some(TypeDefinition::Elementary(kind)) = table.get(ty) else {
        return None;
    };
    if kind.is_dynamic() {
        return codec::decode_byte_string(kind, raw, Mode::Abi).ok();
    }
    if let Ok(word) = <&[u8; 32]>::try_from(&raw[..]) {
        return codec::decode_word(kind, word, Mode::Abi).ok();
    }
    // packed storage segment
    if Some(raw.len()) != kind.width() {
        return None;
    }
    match kind {
        ElementaryKind::Bool => {
            Some(Value::Bool(raw.iter().any(|b| *b != 0)))
        }
        _ => codec::decode_packed(kind, raw).ok(),
    }
}

/// The ABI-mode view of `result`.
pub fn to_abi_mode(result: &DecodeResult, table: &TypeTable) -> DecodeResult {
    match result {
        DecodeResult::Value { value, raw, ty, .. } => DecodeResult::Value {
            value: value_to_abi(value),
            raw: raw.clone(),
            ty: table.abi_equivalent(*ty),
            mode: Mode::Abi,
        },
        DecodeResult::Container {
            kind,
            children,
            ty,
            ..
        } => DecodeResult::Container {
            kind: match kind {
                ContainerKind::Struct => ContainerKind::Tuple,
                other => *other,
            },
            children: children
                .iter()
                .enumerate()
                .map(|(i, child)| Child {
                    key: match &child.key {
                        ChildKey::Name(_) => ChildKey::Index(i),
                        ChildKey::Key(k) => ChildKey::Key(value_to_abi(k)),
                        index => index.clone(),
                    },
                    result: to_abi_mode(&child.result, table),
                })
                .collect(),
            ty: table.abi_equivalent(*ty),
            mode: Mode::Abi,
        },
        DecodeResult::Error { error, raw, ty, .. } => {
            let ty = table.abi_equivalent(*ty);
            match reinterpret(error, raw, ty, table) {
                Some(value) => DecodeResult::value(value, raw.clone(), ty, Mode::Abi),
                None => DecodeResult::error(error.clone(), raw.clone(), ty, Mode::Abi),
            }
        }
    }
}

fn arguments_to_abi(arguments: &[Argument], table: &TypeTable) -> Vec<Argument> {
    arguments
        .iter()
        .map(|a| Argument {
            name: a.name.clone(),
            result: to_abi_mode(&a.result, table),
        })
        .collect()
}

pub fn call_to_abi_mode(call: &CallDecoding, table: &TypeTable) -> CallDecoding {
    CallDecoding {
        arguments: arguments_to_abi(&call.arguments, table),
        mode: Mode::Abi,
        ..call.clone()
    }
}

pub fn event_to_abi_mode(event: &EventDecoding, table: &TypeTable) -> EventDecoding {
    EventDecoding {
        arguments: arguments_to_abi(&event.arguments, table),
        mode: Mode::Abi,
        ..event.clone()
    }
}

pub fn return_to_abi_mode(ret: &ReturnDecoding, table: &TypeTable) -> ReturnDecoding {
    ReturnDecoding {
        arguments: arguments_to_abi(&ret.arguments, table),
        mode: Mode::Abi,
        ..ret.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes};
    use chainlens_core::types::{ContractKind, StructMember, TypeTableBuilder};

    #[test]
    fn struct_with_enum_and_contract_projects_to_tuple() {
        let mut b = TypeTableBuilder::new();
        let status = b.intern(TypeDefinition::Enum {
            name: "Vault.Status".into(),
            variants: vec!["Open".into(), "Closed".into()],
        });
        let token = b.intern(TypeDefinition::Contract {
            name: "Token".into(),
            kind: ContractKind::Contract,
        });
        let position = b.intern(TypeDefinition::Struct {
            name: "Vault.Position".into(),
            members: vec![
                StructMember { name: "status".into(), ty: status },
                StructMember { name: "token".into(), ty: token },
            ],
        });
        let uint8 = b.elementary(ElementaryKind::Uint(8));
        let address = b.elementary(ElementaryKind::Address);
        let table = b.finish();

        let token_addr = Address::repeat_byte(0x22);
        let full = DecodeResult::Container {
            kind: ContainerKind::Struct,
            children: vec![
                Child {
                    key: ChildKey::Name("status".into()),
                    result: DecodeResult::value(
                        Value::Enum { variant: "Closed".into(), index: 1 },
                        Bytes::from(vec![1]),
                        status,
                        Mode::Full,
                    ),
                },
                Child {
                    key: ChildKey::Name("token".into()),
                    result: DecodeResult::value(
                        Value::Contract { address: token_addr, contract: "Token".into() },
                        Bytes::from(token_addr.to_vec()),
                        token,
                        Mode::Full,
                    ),
                },
            ],
            ty: position,
            mode: Mode::Full,
        };

        let abi = to_abi_mode(&full, &table);
        assert_eq!(abi.mode(), Mode::Abi);
        assert!(matches!(abi, DecodeResult::Container { kind: ContainerKind::Tuple, .. }));
        let first = abi.at(0).unwrap();
        assert_eq!(first.as_value(), Some(&Value::Uint(U256::from(1))));
        assert_eq!(first.ty(), uint8);
        assert_eq!(first.raw(), Some(&Bytes::from(vec![1])));
        let second = abi.at(1).unwrap();
        assert_eq!(second.as_value(), Some(&Value::Address(token_addr)));
        assert_eq!(second.ty(), address);
        assert!(abi.member("status").is_none());

        assert_eq!(to_abi_mode(&abi, &table), abi);
    }

    #[test]
    fn validation_errors_project_to_abi_values() {
        let mut b = TypeTableBuilder::new();
        let boolean = b.elementary(ElementaryKind::Bool);
        let status = b.intern(TypeDefinition::Enum {
            name: "Vault.Status".into(),
            variants: vec!["Open".into(), "Closed".into()],
        });
        let string = b.elementary(ElementaryKind::String);
        let uint8 = b.elementary(ElementaryKind::Uint(8));
        let table = b.finish();

        let two = U256::from(2).to_be_bytes::<32>();
        let bad_bool = DecodeResult::error(
            DecodingErrorKind::InvalidBool { raw: hex::encode(two) },
            two.to_vec(),
            boolean,
            Mode::Full,
        );
        let projected = to_abi_mode(&bad_bool, &table);
        assert_eq!(projected.as_value(), Some(&Value::Bool(true)));
        assert_eq!(projected.mode(), Mode::Abi);
        assert_eq!(projected.raw(), Some(&Bytes::from(two.to_vec())));

        let bad_enum = DecodeResult::error(
            DecodingErrorKind::InvalidEnum { index: "2".into(), variants: 2 },
            two.to_vec(),
            status,
            Mode::Full,
        );
        let projected = to_abi_mode(&bad_enum, &table);
        assert_eq!(projected.as_value(), Some(&Value::Uint(U256::from(2))));
        assert_eq!(projected.ty(), uint8);

        let bad_utf8 = DecodeResult::error(
            DecodingErrorKind::InvalidUtf8,
            vec![0x66, 0xff],
            string,
            Mode::Full,
        );
        assert!(matches!(
            to_abi_mode(&bad_utf8, &table).as_value(),
            Some(Value::String(s)) if s.starts_with('f')
        ));

        // a packed storage boolean
        let packed = DecodeResult::error(
            DecodingErrorKind::InvalidBool { raw: "02".into() },
            vec![2u8],
            boolean,
            Mode::Full,
        );
        assert_eq!(to_abi_mode(&packed, &table).as_value(), Some(&Value::Bool(true)));
    }

    #[test]
    fn structural_errors_stay_errors() {
        let mut b = TypeTableBuilder::new();
        let boolean = b.elementary(ElementaryKind::Bool);
        let table = b.finish();
        let truncated = DecodeResult::error(
            DecodingErrorKind::Truncated { offset: 4, needed: 32, available: 3 },
            vec![0u8, 0, 1],
            boolean,
            Mode::Full,
        );
        let projected = to_abi_mode(&truncated, &table);
        assert!(matches!(
            projected,
            DecodeResult::Error { error: DecodingErrorKind::Truncated { .. }, mode: Mode::Abi, .. }
        ));
        assert_eq!(to_abi_mode(&projected, &table), projected);
    }
}
