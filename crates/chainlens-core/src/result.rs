//! The lossless, mode-tagged result model.
//!
//! Every decoded value keeps the bytes it was read from, the [`TypeId`] it was
//! interpreted as and the [`Mode`] that produced it. Containers hold their
//! children in declaration/index order.

use crate::error::DecodingErrorKind;
use crate::types::TypeId;
use crate::value::{Mode, Value};
use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};

/// Shape of a container result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Struct,
    Tuple,
    Array,
    Mapping,
}

/// How a child is addressed inside its container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", content = "key", rename_all = "lowercase")]
pub enum ChildKey {
    /// Struct member or named parameter (full mode).
    Name(String),
    /// Positional element.
    Index(usize),
    /// Mapping entry, keyed by the decoded key value.
    Key(Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    pub key: ChildKey,
    pub result: DecodeResult,
}

/// An immutable decoding result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum DecodeResult {
    Value {
        value: Value,
        raw: Bytes,
        ty: TypeId,
        mode: Mode,
    },
    Container {
        kind: ContainerKind,
        children: Vec<Child>,
        ty: TypeId,
        mode: Mode,
    },
    Error {
        error: DecodingErrorKind,
        /// Whatever bytes were available where the value was expected.
        raw: Bytes,
        ty: TypeId,
        mode: Mode,
    },
}

impl DecodeResult {
    pub fn value(value: Value, raw: impl Into<Bytes>, ty: TypeId, mode: Mode) -> Self {
        DecodeResult::Value {
            value,
            raw: raw.into(),
            ty,
            mode,
        }
    }

    pub fn error(error: DecodingErrorKind, raw: impl Into<Bytes>, ty: TypeId, mode: Mode) -> Self {
        DecodeResult::Error {
            error,
            raw: raw.into(),
            ty,
            mode,
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            DecodeResult::Value { mode, .. }
            | DecodeResult::Container { mode, .. }
            | DecodeResult::Error { mode, .. } => *mode,
        }
    }

    pub fn ty(&self) -> TypeId {
        match self {
            DecodeResult::Value { ty, .. }
            | DecodeResult::Container { ty, .. }
            | DecodeResult::Error { ty, .. } => *ty,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, DecodeResult::Error { .. })
    }

    /// Whether this result or any descendant is an error.
    pub fn has_errors(&self) -> bool {
        match self {
            DecodeResult::Error { .. } => true,
            DecodeResult::Value { .. } => false,
            DecodeResult::Container { children, .. } => {
                children.iter().any(|c| c.result.has_errors())
            }
        }
    }

    /// First error found in a depth-first walk.
    pub fn first_error(&self) -> Option<&DecodingErrorKind> {
        match self {
            DecodeResult::Error { error, .. } => Some(error),
            DecodeResult::Value { .. } => None,
            DecodeResult::Container { children, .. } => {
                children.iter().find_map(|c| c.result.first_error())
            }
        }
    }

    /// The interpreted value of a leaf result.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            DecodeResult::Value { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn raw(&self) -> Option<&Bytes> {
        match self {
            DecodeResult::Value { raw, .. } | DecodeResult::Error { raw, .. } => Some(raw),
            DecodeResult::Container { .. } => None,
        }
    }

    pub fn children(&self) -> &[Child] {
        match self {
            DecodeResult::Container { children, .. } => children,
            _ => &[],
        }
    }

    /// Named child (struct member), if any.
    pub fn member(&self, name: &str) -> Option<&DecodeResult> {
        self.children().iter().find_map(|c| match &c.key {
            ChildKey::Name(n) if n == name => Some(&c.result),
            _ => None,
        })
    }

    /// Positional child. Works for named children too, by declaration order.
    pub fn at(&self, index: usize) -> Option<&DecodeResult> {
        self.children().get(index).map(|c| &c.result)
    }

    /// Mapping entry by decoded key.
    pub fn entry(&self, key: &Value) -> Option<&DecodeResult> {
        self.children().iter().find_map(|c| match &c.key {
            ChildKey::Key(k) if k == key => Some(&c.result),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    fn leaf(n: u64) -> DecodeResult {
        DecodeResult::value(
            Value::Uint(U256::from(n)),
            U256::from(n).to_be_bytes::<32>().to_vec(),
            TypeId(0),
            Mode::Full,
        )
    }

    #[test]
    fn container_lookup() {
        let r = DecodeResult::Container {
            kind: ContainerKind::Struct,
            children: vec![
                Child {
                    key: ChildKey::Name("a".into()),
                    result: leaf(1),
                },
                Child {
                    key: ChildKey::Name("b".into()),
                    result: DecodeResult::error(
                        DecodingErrorKind::InvalidUtf8,
                        vec![0xff],
                        TypeId(1),
                        Mode::Full,
                    ),
                },
            ],
            ty: TypeId(2),
            mode: Mode::Full,
        };
        assert_eq!(r.member("a"), Some(&leaf(1)));
        assert!(r.at(1).unwrap().is_error());
        assert!(r.has_errors());
        assert_eq!(r.first_error(), Some(&DecodingErrorKind::InvalidUtf8));
        assert_eq!(r.mode(), Mode::Full);
    }

    #[test]
    fn serializes_with_mode_tag() {
        let json = serde_json::to_value(leaf(7)).unwrap();
        assert_eq!(json["result"], "value");
        assert_eq!(json["mode"], "full");
    }
}
