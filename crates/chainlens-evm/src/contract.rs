//! Resolved contract identities.

use crate::ast::{DeclRef, NodeId};
use crate::bytecode::BytecodePattern;
use alloy_json_abi::JsonAbi;
use alloy_primitives::{Address, B256};
use chainlens_core::types::{ContractKind, TypeId};
use std::collections::BTreeMap;

/// One parameter of a function, event or error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamInfo {
    pub name: String,
    /// Type as the ABI states it.
    pub abi_ty: TypeId,
    /// AST-resolved type, when the declaration could be correlated.
    pub full_ty: Option<TypeId>,
    pub indexed: bool,
}

impl ParamInfo {
    pub fn display_name(&self) -> Option<String> {
        (!self.name.is_empty()).then(|| self.name.clone())
    }
}

/// Whether every parameter has a full-mode type.
pub fn full_types(params: &[ParamInfo]) -> Option<Vec<TypeId>> {
    params.iter().map(|p| p.full_ty).collect()
}

pub fn abi_types(params: &[ParamInfo]) -> Vec<TypeId> {
    params.iter().map(|p| p.abi_ty).collect()
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub signature: String,
    pub selector: [u8; 4],
    pub inputs: Vec<ParamInfo>,
    pub outputs: Vec<ParamInfo>,
}

#[derive(Debug, Clone)]
pub struct ConstructorInfo {
    pub inputs: Vec<ParamInfo>,
}

#[derive(Debug, Clone)]
pub struct EventInfo {
    pub name: String,
    pub signature: String,
    pub topic: B256,
    pub anonymous: bool,
    pub inputs: Vec<ParamInfo>,
}

impl EventInfo {
    /// Number of topics a log of this event carries.
    pub fn topic_count(&self) -> usize {
        let indexed = self.inputs.iter().filter(|p| p.indexed).count();
        if self.anonymous {
            indexed
        } else {
            indexed + 1
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorInfo {
    pub name: String,
    pub signature: String,
    pub selector: [u8; 4],
    pub inputs: Vec<ParamInfo>,
}

/// A contract's resolved identity: ABI entries with their types, the AST
/// node it was correlated with and the patterns used to recognise its code.
#[derive(Debug, Clone)]
pub struct ContractTypeInfo {
    pub name: String,
    /// Position in the supplied contract list.
    pub index: usize,
    pub kind: ContractKind,
    pub abi: JsonAbi,
    /// AST node of the contract definition; `None` means ABI mode only.
    pub ast_id: Option<DeclRef>,
    /// Inheritance chain, most-derived first, as node ids of `ast_id`'s
    /// compilation. Empty without an AST.
    pub linearization: Vec<NodeId>,
    pub functions: Vec<FunctionInfo>,
    pub events: Vec<EventInfo>,
    pub errors: Vec<ErrorInfo>,
    pub constructor: Option<ConstructorInfo>,
    pub has_fallback: bool,
    pub has_receive: bool,
    pub creation_code: Option<BytecodePattern>,
    pub runtime_code: Option<BytecodePattern>,
    /// Network id → deployed address.
    pub deployments: BTreeMap<String, Address>,
}

impl ContractTypeInfo {
    pub fn has_ast(&self) -> bool {
        self.ast_id.is_some()
    }

    pub fn function_by_selector(&self, selector: &[u8]) -> Option<&FunctionInfo> {
        self.functions.iter().find(|f| f.selector[..] == *selector)
    }

    /// Look up by name or by full signature (`balanceOf(address)`); the
    /// signature form disambiguates overloads.
    pub fn function(&self, name_or_signature: &str) -> Option<&FunctionInfo> {
        self.functions
            .iter()
            .find(|f| f.signature == name_or_signature)
            .or_else(|| self.functions.iter().find(|f| f.name == name_or_signature))
    }

    pub fn error_by_selector(&self, selector: &[u8]) -> Option<&ErrorInfo> {
        self.errors.iter().find(|e| e.selector[..] == *selector)
    }

    pub fn deployed_address(&self, network_id: u64) -> Option<Address> {
        self.deployments.get(&network_id.to_string()).copied()
    }
}
