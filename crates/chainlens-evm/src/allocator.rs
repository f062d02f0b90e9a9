//! Storage layout computation.
//!
//! Follows solc's rules:
//! - contracts are laid out base-to-derived along the C3 linearisation, the
//!   slot cursor carrying over between them
//! - value types pack left to right (low-order first) into the current
//!   32-byte slot, moving to a fresh slot when they do not fit
//! - structs and static arrays start on a fresh slot and occupy whole slots;
//!   the item after them starts on a fresh slot too
//! - `bytes`, `string`, dynamic arrays and mappings take one slot that seeds
//!   the location of their contents

use crate::ast::NodeId;
use crate::resolver::{ContractDecls, ResolvedProject};
use alloy_primitives::U256;
use chainlens_core::{
    error::AllocationError,
    types::{ArrayLength, ElementaryKind, TypeDefinition, TypeId, TypeTable},
};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// How a variable's content is reached from its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indirection {
    /// The content is stored in place.
    Direct,
    /// The slot seeds a derived location (keccak of slot, or of key ‖ slot).
    Dynamic,
}

/// Position of a value in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotDescriptor {
    pub slot: U256,
    /// Byte offset from the low-order end of the slot.
    pub offset: usize,
    /// Bytes occupied; whole slots × 32 for multi-slot values.
    pub length: usize,
    pub indirection: Indirection,
}

impl SlotDescriptor {
    /// This position relative to `base`.
    pub fn shifted(&self, base: U256) -> Self {
        Self {
            slot: base.wrapping_add(self.slot),
            ..*self
        }
    }
}

/// Space a type occupies in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageSize {
    /// A value type that packs: this many bytes.
    Bytes(usize),
    /// Whole slots, starting fresh.
    Slots(U256),
}

/// Size of `ty` in storage, given the layouts of structs computed so far.
pub fn storage_size(
    table: &TypeTable,
    structs: &HashMap<TypeId, StructLayout>,
    ty: TypeId,
) -> Result<StorageSize, String> {
    Ok(match table.get(ty) {
        Some(TypeDefinition::Elementary(kind)) => match kind.width() {
            Some(w) => StorageSize::Bytes(w),
            None => StorageSize::Slots(U256::from(1)),
        },
        Some(TypeDefinition::Enum { .. }) => StorageSize::Bytes(1),
        Some(TypeDefinition::Contract { .. }) => StorageSize::Bytes(20),
        Some(TypeDefinition::Mapping { .. })
        | Some(TypeDefinition::Array {
            length: ArrayLength::Dynamic,
            ..
        }) => StorageSize::Slots(U256::from(1)),
        Some(TypeDefinition::Array {
            element,
            length: ArrayLength::Fixed(n),
        }) => {
            let n = U256::from(*n);
            match storage_size(table, structs, *element)? {
                StorageSize::Bytes(w) => {
                    let per_slot = U256::from(32 / w.max(1));
                    StorageSize::Slots((n + per_slot - U256::from(1)) / per_slot)
                }
                StorageSize::Slots(k) => StorageSize::Slots(n.saturating_mul(k)),
            }
        }
        Some(TypeDefinition::Struct { name, .. }) => match structs.get(&ty) {
            Some(layout) => StorageSize::Slots(layout.slots),
            None => return Err(format!("struct {name} used before its layout is known")),
        },
        Some(TypeDefinition::Tuple(_)) => return Err("tuples have no storage layout".into()),
        None => return Err(format!("unknown type {ty}")),
    })
}

/// Where elements of a static or dynamic array live relative to its data slot.
pub fn element_position(size: StorageSize, index: u64) -> (U256, usize) {
    match size {
        StorageSize::Bytes(w) => {
            let per_slot = (32 / w.max(1)) as u64;
            (
                U256::from(index / per_slot),
                (index % per_slot) as usize * w,
            )
        }
        StorageSize::Slots(k) => (U256::from(index).saturating_mul(k), 0),
    }
}

/// Slot/offset cursor shared by contract and struct layout.
#[derive(Debug, Default)]
struct Cursor {
    slot: U256,
    offset: usize,
}

impl Cursor {
    fn place(&mut self, size: StorageSize, indirection: Indirection) -> SlotDescriptor {
        match size {
            StorageSize::Bytes(w) => {
                if self.offset + w > 32 {
                    self.slot += U256::from(1);
                    self.offset = 0;
                }
                let at = SlotDescriptor {
                    slot: self.slot,
                    offset: self.offset,
                    length: w,
                    indirection,
                };
                self.offset += w;
                at
            }
            StorageSize::Slots(k) => {
                if self.offset > 0 {
                    self.slot += U256::from(1);
                    self.offset = 0;
                }
                let at = SlotDescriptor {
                    slot: self.slot,
                    offset: 0,
                    length: usize::try_from(k.saturating_mul(U256::from(32))).unwrap_or(usize::MAX),
                    indirection,
                };
                self.slot = self.slot.saturating_add(k);
                at
            }
        }
    }

    /// Slots used so far, counting a partly filled one.
    fn slots_used(&self) -> U256 {
        if self.offset > 0 {
            self.slot + U256::from(1)
        } else {
            self.slot
        }
    }
}

fn indirection_of(table: &TypeTable, ty: TypeId) -> Indirection {
    match table.get(ty) {
        Some(TypeDefinition::Elementary(k)) if k.is_dynamic() => Indirection::Dynamic,
        Some(TypeDefinition::Mapping { .. })
        | Some(TypeDefinition::Array {
            length: ArrayLength::Dynamic,
            ..
        }) => Indirection::Dynamic,
        _ => Indirection::Direct,
    }
}

/// Member positions of a struct, relative to the struct's first slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub members: Vec<(String, TypeId, SlotDescriptor)>,
    pub slots: U256,
}

/// One allocated state variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateVariable {
    pub name: String,
    /// Contract that declares the variable.
    pub contract: String,
    pub ty: TypeId,
    pub location: SlotDescriptor,
}

/// A contract's computed storage layout. Immutable once built.
#[derive(Debug, Clone)]
pub struct StorageAllocation {
    pub contract: String,
    pub variables: Vec<StateVariable>,
    structs: HashMap<TypeId, StructLayout>,
}

impl StorageAllocation {
    pub fn variable(&self, name: &str) -> Option<&StateVariable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn struct_layout(&self, ty: TypeId) -> Option<&StructLayout> {
        self.structs.get(&ty)
    }

    pub fn size_of(&self, table: &TypeTable, ty: TypeId) -> Result<StorageSize, String> {
        storage_size(table, &self.structs, ty)
    }
}

/// Lay out every struct reachable from `ty`, innermost first.
fn layout_structs(
    table: &TypeTable,
    ty: TypeId,
    structs: &mut HashMap<TypeId, StructLayout>,
    visiting: &mut HashSet<TypeId>,
) -> Result<(), String> {
    if structs.contains_key(&ty) || !visiting.insert(ty) {
        return Ok(());
    }
    let result = match table.get(ty) {
        Some(TypeDefinition::Struct { name, members }) => {
            // members behind a mapping or dynamic array do not affect the size
            for m in members {
                if indirection_of(table, m.ty) == Indirection::Direct {
                    layout_structs(table, m.ty, structs, visiting)?;
                }
            }
            let mut cursor = Cursor::default();
            let mut placed = Vec::with_capacity(members.len());
            for m in members {
                let size = storage_size(table, structs, m.ty)
                    .map_err(|e| format!("{name}.{}: {e}", m.name))?;
                placed.push((m.name.clone(), m.ty, cursor.place(size, indirection_of(table, m.ty))));
            }
            structs.insert(
                ty,
                StructLayout {
                    members: placed,
                    slots: cursor.slots_used(),
                },
            );
            // structs reached through indirection are laid out afterwards
            for m in members {
                layout_structs(table, m.ty, structs, visiting)?;
            }
            Ok(())
        }
        Some(TypeDefinition::Array { element, .. }) => {
            layout_structs(table, *element, structs, visiting)
        }
        Some(TypeDefinition::Mapping { value, .. }) => {
            layout_structs(table, *value, structs, visiting)
        }
        _ => Ok(()),
    };
    visiting.remove(&ty);
    result
}

/// C3 linearisation of `id`, most-derived first, as solc computes it.
pub fn linearize(
    decls: &HashMap<NodeId, ContractDecls>,
    id: NodeId,
) -> Result<Vec<NodeId>, AllocationError> {
    fn go(
        decls: &HashMap<NodeId, ContractDecls>,
        id: NodeId,
        visiting: &mut Vec<NodeId>,
        from: &str,
    ) -> Result<Vec<NodeId>, AllocationError> {
        let Some(c) = decls.get(&id) else {
            return Err(AllocationError::UnresolvedBase {
                contract: from.to_string(),
                id,
            });
        };
        if visiting.contains(&id) {
            return Err(AllocationError::InheritanceCycle {
                contract: c.name.clone(),
            });
        }
        visiting.push(id);
        // solc: bases are listed most-base first, so merge in reverse
        let mut sequences = Vec::with_capacity(c.bases.len() + 1);
        for base in c.bases.iter().rev() {
            sequences.push(go(decls, *base, visiting, &c.name)?);
        }
        sequences.push(c.bases.iter().rev().copied().collect());
        visiting.pop();

        let mut out = vec![id];
        loop {
            sequences.retain(|s| !s.is_empty());
            if sequences.is_empty() {
                return Ok(out);
            }
            let head = sequences.iter().map(|s| s[0]).find(|candidate| {
                sequences.iter().all(|s| !s[1..].contains(candidate))
            });
            let Some(head) = head else {
                return Err(AllocationError::Linearization {
                    contract: c.name.clone(),
                });
            };
            out.push(head);
            for s in sequences.iter_mut() {
                if s[0] == head {
                    s.remove(0);
                }
            }
        }
    }
    let name = decls.get(&id).map(|c| c.name.clone()).unwrap_or_default();
    go(decls, id, &mut Vec::new(), &name)
}

/// Compute the storage layout of contract `index` of `project`.
pub fn allocate(
    project: &ResolvedProject,
    index: usize,
) -> Result<StorageAllocation, AllocationError> {
    let info = project
        .contracts
        .get(index)
        .ok_or_else(|| AllocationError::NoAst {
            contract: format!("#{index}"),
        })?;
    let Some(ast_id) = info.ast_id else {
        return Err(AllocationError::NoAst {
            contract: info.name.clone(),
        });
    };
    let (Some(compilation), Some(decls)) = (
        project.declarations.get(ast_id.compilation),
        project.decls(ast_id),
    ) else {
        return Err(AllocationError::NoAst {
            contract: info.name.clone(),
        });
    };

    let order = match &decls.linearized {
        Some(lin) => lin.clone(),
        None => linearize(compilation, ast_id.node)?,
    };

    let table = &project.table;
    let mut structs = HashMap::new();
    let mut cursor = Cursor::default();
    let mut variables = Vec::new();
    for cid in order.iter().rev() {
        let Some(contract) = compilation.get(cid) else {
            return Err(AllocationError::UnresolvedBase {
                contract: info.name.clone(),
                id: *cid,
            });
        };
        for var in &contract.variables {
            let unresolved = |reason: String| AllocationError::UnresolvedType {
                contract: contract.name.clone(),
                variable: var.name.clone(),
                reason,
            };
            let ty = var.ty.clone().map_err(unresolved)?;
            layout_structs(table, ty, &mut structs, &mut HashSet::new()).map_err(unresolved)?;
            let size = storage_size(table, &structs, ty).map_err(unresolved)?;
            let location = cursor.place(size, indirection_of(table, ty));
            debug!(
                contract = %info.name,
                variable = %var.name,
                slot = %location.slot,
                offset = location.offset,
                "allocated state variable"
            );
            variables.push(StateVariable {
                name: var.name.clone(),
                contract: contract.name.clone(),
                ty,
                location,
            });
        }
    }

    Ok(StorageAllocation {
        contract: info.name.clone(),
        variables,
        structs,
    })
}

/// The elementary kind stored at `ty`, if it is a packed value type.
pub fn packed_kind(table: &TypeTable, ty: TypeId) -> Option<ElementaryKind> {
    match table.get(ty)? {
        TypeDefinition::Elementary(k) if !k.is_dynamic() => Some(k.clone()),
        TypeDefinition::Enum { .. } => Some(ElementaryKind::Uint(8)),
        TypeDefinition::Contract { .. } => Some(ElementaryKind::Address),
        _ => None,
    }
}
