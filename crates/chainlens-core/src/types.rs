//! The type arena shared by every decoder built from one project.
//!
//! Types are stored in a flat arena and addressed by [`TypeId`]. References
//! between types (struct members, array elements, mapping keys/values) are
//! ids, never pointers, so recursive structs need no special ownership and a
//! finished [`TypeTable`] can be shared read-only across threads.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Stable identifier of a type within one resolved session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Elementary (value and byte-string) Solidity types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementaryKind {
    /// Unsigned integer. Width in bits.
    Uint(u16),
    /// Signed integer. Width in bits.
    Int(u16),
    Bool,
    Address,
    /// bytes1 .. bytes32. Length in bytes.
    FixedBytes(u8),
    /// External function pointer: 20-byte address followed by a 4-byte selector.
    Function,
    Bytes,
    String,
}

impl ElementaryKind {
    /// Width in bytes of the value when packed (storage) or unpadded (ABI word).
    /// `None` for the dynamically sized `bytes` and `string`.
    pub fn width(&self) -> Option<usize> {
        match self {
            ElementaryKind::Uint(bits) | ElementaryKind::Int(bits) => Some(*bits as usize / 8),
            ElementaryKind::Bool => Some(1),
            ElementaryKind::Address => Some(20),
            ElementaryKind::FixedBytes(n) => Some(*n as usize),
            ElementaryKind::Function => Some(24),
            ElementaryKind::Bytes | ElementaryKind::String => None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, ElementaryKind::Bytes | ElementaryKind::String)
    }
}

impl fmt::Display for ElementaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementaryKind::Uint(bits) => write!(f, "uint{bits}"),
            ElementaryKind::Int(bits) => write!(f, "int{bits}"),
            ElementaryKind::Bool => write!(f, "bool"),
            ElementaryKind::Address => write!(f, "address"),
            ElementaryKind::FixedBytes(n) => write!(f, "bytes{n}"),
            ElementaryKind::Function => write!(f, "function"),
            ElementaryKind::Bytes => write!(f, "bytes"),
            ElementaryKind::String => write!(f, "string"),
        }
    }
}

/// Length of an array type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayLength {
    Fixed(u64),
    Dynamic,
}

/// Kind of a contract-typed declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractKind {
    #[default]
    Contract,
    Interface,
    Library,
}

/// A named struct member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructMember {
    pub name: String,
    pub ty: TypeId,
}

/// A resolved type. Immutable once placed in a finished [`TypeTable`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "def", rename_all = "lowercase")]
pub enum TypeDefinition {
    Elementary(ElementaryKind),
    /// Named struct, only produced from compiler AST declarations.
    Struct {
        name: String,
        members: Vec<StructMember>,
    },
    /// Named enum, only produced from compiler AST declarations.
    Enum { name: String, variants: Vec<String> },
    /// A contract/interface/library used as a type; encoded as an address.
    Contract { name: String, kind: ContractKind },
    Array { element: TypeId, length: ArrayLength },
    Mapping { key: TypeId, value: TypeId },
    /// Positional tuple: the only composite shape ABI metadata can express.
    Tuple(Vec<TypeId>),
}

impl TypeDefinition {
    /// Whether this definition only exists with AST information.
    pub fn is_full_only(&self) -> bool {
        matches!(
            self,
            TypeDefinition::Struct { .. }
                | TypeDefinition::Enum { .. }
                | TypeDefinition::Contract { .. }
        )
    }
}

/// Read-only mapping from [`TypeId`] to [`TypeDefinition`].
///
/// Every full-mode type has a precomputed ABI-mode equivalent (structs become
/// tuples, enums `uint8`, contracts `address`), used when projecting results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeTable {
    defs: Vec<TypeDefinition>,
    abi_equivalents: Vec<TypeId>,
}

impl TypeTable {
    pub fn get(&self, id: TypeId) -> Option<&TypeDefinition> {
        self.defs.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeDefinition)> {
        self.defs
            .iter()
            .enumerate()
            .map(|(i, d)| (TypeId(i as u32), d))
    }

    /// The ABI-mode type equivalent to `id`. Identity for ABI-mode types.
    pub fn abi_equivalent(&self, id: TypeId) -> TypeId {
        self.abi_equivalents.get(id.index()).copied().unwrap_or(id)
    }

    /// Canonical ABI type string, e.g. `(uint256,address)[]`.
    /// `None` for mappings and recursive structs, which have no ABI encoding.
    pub fn abi_type_string(&self, id: TypeId) -> Option<String> {
        abi_type_string(&self.defs, id, 0)
    }

    /// Whether the ABI encoding of `id` is dynamic (tail-encoded).
    pub fn is_abi_dynamic(&self, id: TypeId) -> bool {
        is_abi_dynamic(&self.defs, id, 0)
    }

    /// Size in bytes of the ABI head of `id`: 32 for dynamic types,
    /// the full in-place size for static ones.
    pub fn abi_head_size(&self, id: TypeId) -> usize {
        if self.is_abi_dynamic(id) {
            return 32;
        }
        match self.get(id) {
            Some(TypeDefinition::Array {
                element,
                length: ArrayLength::Fixed(n),
            }) => (*n as usize).saturating_mul(self.abi_head_size(*element)),
            Some(TypeDefinition::Struct { members, .. }) => {
                members.iter().map(|m| self.abi_head_size(m.ty)).sum()
            }
            Some(TypeDefinition::Tuple(items)) => items.iter().map(|t| self.abi_head_size(*t)).sum(),
            _ => 32,
        }
    }

    /// Human-readable type name, e.g. `mapping(address => struct Vault.Position)`.
    pub fn display(&self, id: TypeId) -> String {
        self.display_depth(id, 0)
    }

    fn display_depth(&self, id: TypeId, depth: usize) -> String {
        if depth > MAX_TYPE_DEPTH {
            return "...".into();
        }
        match self.get(id) {
            None => format!("<unknown {id}>"),
            Some(TypeDefinition::Elementary(kind)) => kind.to_string(),
            Some(TypeDefinition::Struct { name, .. }) => format!("struct {name}"),
            Some(TypeDefinition::Enum { name, .. }) => format!("enum {name}"),
            Some(TypeDefinition::Contract { name, kind }) => match kind {
                ContractKind::Library => format!("library {name}"),
                _ => format!("contract {name}"),
            },
            Some(TypeDefinition::Array { element, length }) => {
                let inner = self.display_depth(*element, depth + 1);
                match length {
                    ArrayLength::Fixed(n) => format!("{inner}[{n}]"),
                    ArrayLength::Dynamic => format!("{inner}[]"),
                }
            }
            Some(TypeDefinition::Mapping { key, value }) => format!(
                "mapping({} => {})",
                self.display_depth(*key, depth + 1),
                self.display_depth(*value, depth + 1)
            ),
            Some(TypeDefinition::Tuple(items)) => {
                let parts: Vec<_> = items
                    .iter()
                    .map(|t| self.display_depth(*t, depth + 1))
                    .collect();
                format!("({})", parts.join(","))
            }
        }
    }
}

const MAX_TYPE_DEPTH: usize = 64;

fn abi_type_string(defs: &[TypeDefinition], id: TypeId, depth: usize) -> Option<String> {
    if depth > MAX_TYPE_DEPTH {
        return None;
    }
    match defs.get(id.index())? {
        TypeDefinition::Elementary(kind) => Some(kind.to_string()),
        TypeDefinition::Enum { .. } => Some("uint8".into()),
        TypeDefinition::Contract { .. } => Some("address".into()),
        TypeDefinition::Array { element, length } => {
            let inner = abi_type_string(defs, *element, depth + 1)?;
            Some(match length {
                ArrayLength::Fixed(n) => format!("{inner}[{n}]"),
                ArrayLength::Dynamic => format!("{inner}[]"),
            })
        }
        TypeDefinition::Struct { members, .. } => {
            let parts = members
                .iter()
                .map(|m| abi_type_string(defs, m.ty, depth + 1))
                .collect::<Option<Vec<_>>>()?;
            Some(format!("({})", parts.join(",")))
        }
        TypeDefinition::Tuple(items) => {
            let parts = items
                .iter()
                .map(|t| abi_type_string(defs, *t, depth + 1))
                .collect::<Option<Vec<_>>>()?;
            Some(format!("({})", parts.join(",")))
        }
        TypeDefinition::Mapping { .. } => None,
    }
}

fn is_abi_dynamic(defs: &[TypeDefinition], id: TypeId, depth: usize) -> bool {
    if depth > MAX_TYPE_DEPTH {
        return true;
    }
    match defs.get(id.index()) {
        Some(TypeDefinition::Elementary(kind)) => kind.is_dynamic(),
        Some(TypeDefinition::Array {
            length: ArrayLength::Dynamic,
            ..
        }) => true,
        Some(TypeDefinition::Array { element, .. }) => is_abi_dynamic(defs, *element, depth + 1),
        Some(TypeDefinition::Struct { members, .. }) => members
            .iter()
            .any(|m| is_abi_dynamic(defs, m.ty, depth + 1)),
        Some(TypeDefinition::Tuple(items)) => {
            items.iter().any(|t| is_abi_dynamic(defs, *t, depth + 1))
        }
        Some(TypeDefinition::Mapping { .. }) => true,
        _ => false,
    }
}

/// Incremental builder for a [`TypeTable`].
///
/// Structural types are hash-consed so identical shapes share one id.
/// Named declarations (structs, enums) reserve their id first so that
/// self-referencing members can point back at them.
#[derive(Debug, Default)]
pub struct TypeTableBuilder {
    defs: Vec<TypeDefinition>,
    interned: HashMap<TypeDefinition, TypeId>,
}

impl TypeTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of a structurally identical definition, inserting if new.
    pub fn intern(&mut self, def: TypeDefinition) -> TypeId {
        if let Some(id) = self.interned.get(&def) {
            return *id;
        }
        let id = TypeId(self.defs.len() as u32);
        self.defs.push(def.clone());
        self.interned.insert(def, id);
        id
    }

    pub fn elementary(&mut self, kind: ElementaryKind) -> TypeId {
        self.intern(TypeDefinition::Elementary(kind))
    }

    /// Reserve an id whose definition is supplied later via [`Self::define`].
    pub fn reserve(&mut self) -> TypeId {
        let id = TypeId(self.defs.len() as u32);
        self.defs.push(TypeDefinition::Tuple(Vec::new()));
        id
    }

    /// Fill in a reserved id. Reserved definitions are not hash-consed.
    pub fn define(&mut self, id: TypeId, def: TypeDefinition) {
        if let Some(slot) = self.defs.get_mut(id.index()) {
            *slot = def;
        }
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeDefinition> {
        self.defs.get(id.index())
    }

    pub fn abi_type_string(&self, id: TypeId) -> Option<String> {
        abi_type_string(&self.defs, id, 0)
    }

    /// Freeze the table, computing ABI-mode equivalents for every type.
    pub fn finish(mut self) -> TypeTable {
        let mut memo: HashMap<TypeId, TypeId> = HashMap::new();
        let mut in_progress: HashMap<TypeId, Option<TypeId>> = HashMap::new();
        let original = self.defs.len();
        for i in 0..original {
            self.abi_equivalent_of(TypeId(i as u32), &mut memo, &mut in_progress);
        }
        let abi_equivalents = (0..self.defs.len())
            .map(|i| {
                let id = TypeId(i as u32);
                memo.get(&id).copied().unwrap_or(id)
            })
            .collect();
        TypeTable {
            defs: self.defs,
            abi_equivalents,
        }
    }

    fn abi_equivalent_of(
        &mut self,
        id: TypeId,
        memo: &mut HashMap<TypeId, TypeId>,
        in_progress: &mut HashMap<TypeId, Option<TypeId>>,
    ) -> TypeId {
        if let Some(done) = memo.get(&id) {
            return *done;
        }
        if let Some(pending) = in_progress.get_mut(&id) {
            // recursive struct: hand out a placeholder, filled when the outer call completes
            return *pending.get_or_insert_with(|| {
                let reserved = TypeId(self.defs.len() as u32);
                self.defs.push(TypeDefinition::Tuple(Vec::new()));
                reserved
            });
        }
        let Some(def) = self.defs.get(id.index()).cloned() else {
            return id;
        };
        in_progress.insert(id, None);
        let equivalent = match def {
            TypeDefinition::Elementary(_) => id,
            TypeDefinition::Enum { .. } => self.elementary(ElementaryKind::Uint(8)),
            TypeDefinition::Contract { .. } => self.elementary(ElementaryKind::Address),
            TypeDefinition::Array { element, length } => {
                let element = self.abi_equivalent_of(element, memo, in_progress);
                self.intern(TypeDefinition::Array { element, length })
            }
            TypeDefinition::Mapping { key, value } => {
                let key = self.abi_equivalent_of(key, memo, in_progress);
                let value = self.abi_equivalent_of(value, memo, in_progress);
                self.intern(TypeDefinition::Mapping { key, value })
            }
            TypeDefinition::Struct { members, .. } => {
                let items = members
                    .iter()
                    .map(|m| self.abi_equivalent_of(m.ty, memo, in_progress))
                    .collect();
                self.tuple_for(id, items, in_progress)
            }
            TypeDefinition::Tuple(items) => {
                let mapped: Vec<TypeId> = items
                    .iter()
                    .map(|t| self.abi_equivalent_of(*t, memo, in_progress))
                    .collect();
                if mapped == items {
                    id
                } else {
                    self.tuple_for(id, mapped, in_progress)
                }
            }
        };
        in_progress.remove(&id);
        memo.insert(id, equivalent);
        memo.insert(equivalent, equivalent);
        equivalent
    }

    fn tuple_for(
        &mut self,
        id: TypeId,
        items: Vec<TypeId>,
        in_progress: &HashMap<TypeId, Option<TypeId>>,
    ) -> TypeId {
        match in_progress.get(&id).copied().flatten() {
            Some(reserved) => {
                self.define(reserved, TypeDefinition::Tuple(items));
                reserved
            }
            None => self.intern(TypeDefinition::Tuple(items)),
        }
    }
}
