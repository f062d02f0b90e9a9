//! Typed subset of the solc compact-JSON AST.
//!
//! Only the declarations the decoder needs are modelled; every other node kind
//! deserializes to `Other` and is skipped. Node ids are unique within one
//! compilation, which is what lets declarations be cross-referenced between
//! contracts and files.

use serde::Deserialize;
use std::collections::{HashMap, HashSet};

pub type NodeId = i64;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "nodeType")]
pub enum Node {
    SourceUnit(SourceUnit),
    ContractDefinition(ContractDefinition),
    VariableDeclaration(VariableDeclaration),
    StructDefinition(StructDefinition),
    EnumDefinition(EnumDefinition),
    UserDefinedValueTypeDefinition(UserDefinedValueTypeDefinition),
    FunctionDefinition(FunctionDefinition),
    EventDefinition(EventDefinition),
    ErrorDefinition(ErrorDefinition),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUnit {
    pub id: NodeId,
    #[serde(default)]
    pub absolute_path: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InheritanceSpecifier {
    pub base_name: BaseName,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseName {
    pub referenced_declaration: NodeId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDefinition {
    pub id: NodeId,
    pub name: String,
    #[serde(default = "default_contract_kind")]
    pub contract_kind: String,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default)]
    pub base_contracts: Vec<InheritanceSpecifier>,
    /// Most-derived first, as emitted by solc. Absent in hand-built or
    /// truncated ASTs.
    #[serde(default)]
    pub linearized_base_contracts: Option<Vec<NodeId>>,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

fn default_contract_kind() -> String {
    "contract".into()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptions {
    #[serde(default)]
    pub type_string: Option<String>,
    #[serde(default)]
    pub type_identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDeclaration {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub constant: bool,
    /// "mutable" | "immutable" | "constant" (solc ≥ 0.6.5)
    #[serde(default)]
    pub mutability: Option<String>,
    #[serde(default)]
    pub state_variable: bool,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub type_name: Option<TypeName>,
    #[serde(default)]
    pub type_descriptions: TypeDescriptions,
}

impl VariableDeclaration {
    /// Whether the variable occupies storage.
    pub fn is_stored(&self) -> bool {
        self.state_variable
            && !self.constant
            && !matches!(self.mutability.as_deref(), Some("immutable") | Some("constant"))
    }

    pub fn type_string(&self) -> &str {
        self.type_descriptions.type_string.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructDefinition {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub canonical_name: Option<String>,
    #[serde(default)]
    pub members: Vec<VariableDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EnumValue {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumDefinition {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub canonical_name: Option<String>,
    #[serde(default)]
    pub members: Vec<EnumValue>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDefinedValueTypeDefinition {
    pub id: NodeId,
    pub name: String,
    pub underlying_type: TypeName,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ParameterList {
    #[serde(default)]
    pub parameters: Vec<VariableDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDefinition {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    /// "function" | "constructor" | "fallback" | "receive"
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub parameters: ParameterList,
    #[serde(default)]
    pub return_parameters: ParameterList,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDefinition {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default)]
    pub parameters: ParameterList,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDefinition {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub parameters: ParameterList,
}

/// A type as written in source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "nodeType")]
pub enum TypeName {
    ElementaryTypeName(ElementaryTypeName),
    UserDefinedTypeName(UserDefinedTypeName),
    ArrayTypeName(ArrayTypeName),
    Mapping(MappingTypeName),
    FunctionTypeName(FunctionTypeName),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementaryTypeName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDefinedTypeName {
    pub referenced_declaration: NodeId,
    #[serde(default)]
    pub type_descriptions: TypeDescriptions,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayTypeName {
    pub base_type: Box<TypeName>,
    /// Length expression; absent for dynamic arrays.
    #[serde(default)]
    pub length: Option<serde_json::Value>,
    #[serde(default)]
    pub type_descriptions: TypeDescriptions,
}

impl ArrayTypeName {
    /// Static length, from the literal or, failing that, the type string.
    pub fn static_length(&self) -> Option<u64> {
        let literal = self
            .length
            .as_ref()?
            .get("value")
            .and_then(|v| v.as_str())
            .and_then(|v| v.replace('_', "").parse().ok());
        literal.or_else(|| length_from_type_string(self.type_descriptions.type_string.as_deref()?))
    }
}

/// `uint256[3] storage ref` → 3
fn length_from_type_string(ts: &str) -> Option<u64> {
    let head = ts.split_whitespace().next()?;
    let open = head.rfind('[')?;
    head[open + 1..].strip_suffix(']')?.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingTypeName {
    pub key_type: Box<TypeName>,
    pub value_type: Box<TypeName>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionTypeName {
    #[serde(default)]
    pub visibility: Option<String>,
}

/// Where a named declaration lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    File,
    Contract(NodeId),
}

/// Position of a compilation among the ASTs of a project.
pub type CompilationId = usize;

/// A declaration's node id, qualified by the compilation that assigned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclRef {
    pub compilation: CompilationId,
    pub node: NodeId,
}

impl DeclRef {
    pub fn new(compilation: CompilationId, node: NodeId) -> Self {
        Self { compilation, node }
    }

    /// Another node of the same compilation.
    pub fn at(self, node: NodeId) -> Self {
        Self { node, ..self }
    }
}

impl std::fmt::Display for DeclRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.compilation, self.node)
    }
}

/// Source units that share one node-id space.
#[derive(Debug, Default)]
struct Compilation {
    units: HashMap<NodeId, SourceUnit>,
    declared: HashSet<NodeId>,
}

impl Compilation {
    /// Whether `unit` can belong here: either it is already present
    /// unchanged, or none of its ids are taken.
    fn admits(&self, unit: &SourceUnit, ids: &[NodeId]) -> bool {
        match self.units.get(&unit.id) {
            Some(existing) => existing == unit,
            None => ids.iter().all(|id| !self.declared.contains(id)),
        }
    }
}

/// Declaration lookup across every source unit of a project.
///
/// solc numbers nodes per compilation, so artifacts built separately can
/// reuse ids. Each added unit joins the first compilation whose ids it does
/// not collide with; every declaration is keyed by [`DeclRef`].
#[derive(Debug, Default)]
pub struct AstIndex {
    pub contracts: HashMap<DeclRef, ContractDefinition>,
    pub structs: HashMap<DeclRef, (Scope, StructDefinition)>,
    pub enums: HashMap<DeclRef, (Scope, EnumDefinition)>,
    pub value_types: HashMap<DeclRef, UserDefinedValueTypeDefinition>,
    /// File-level events (solc ≥ 0.8.22), searched after contract events.
    pub file_events: Vec<(CompilationId, EventDefinition)>,
    pub file_errors: Vec<(CompilationId, ErrorDefinition)>,
    compilations: Vec<Compilation>,
}

impl AstIndex {
    /// Index a source unit and return the compilation it was placed in.
    /// Adding the same unit twice is a no-op.
    pub fn add_source_unit(&mut self, unit: &SourceUnit) -> CompilationId {
        let ids = unit.declared_ids();
        if let Some(at) = self.compilations.iter().position(|c| c.admits(unit, &ids)) {
            if self.compilations[at].units.contains_key(&unit.id) {
                return at;
            }
            self.insert_unit(at, unit, ids);
            return at;
        }
        self.compilations.push(Compilation::default());
        let at = self.compilations.len() - 1;
        self.insert_unit(at, unit, ids);
        at
    }

    fn insert_unit(&mut self, at: CompilationId, unit: &SourceUnit, ids: Vec<NodeId>) {
        let compilation = &mut self.compilations[at];
        compilation.declared.extend(ids);
        compilation.units.insert(unit.id, unit.clone());

        for node in &unit.nodes {
            match node {
                Node::ContractDefinition(c) => self.add_contract(at, c),
                Node::StructDefinition(s) => {
                    self.structs
                        .insert(DeclRef::new(at, s.id), (Scope::File, s.clone()));
                }
                Node::EnumDefinition(e) => {
                    self.enums
                        .insert(DeclRef::new(at, e.id), (Scope::File, e.clone()));
                }
                Node::UserDefinedValueTypeDefinition(u) => {
                    self.value_types.insert(DeclRef::new(at, u.id), u.clone());
                }
                Node::EventDefinition(e) => self.file_events.push((at, e.clone())),
                Node::ErrorDefinition(e) => self.file_errors.push((at, e.clone())),
                _ => {}
            }
        }
    }

    fn add_contract(&mut self, at: CompilationId, c: &ContractDefinition) {
        let scope = Scope::Contract(c.id);
        for node in &c.nodes {
            match node {
                Node::StructDefinition(s) => {
                    self.structs.insert(DeclRef::new(at, s.id), (scope, s.clone()));
                }
                Node::EnumDefinition(e) => {
                    self.enums.insert(DeclRef::new(at, e.id), (scope, e.clone()));
                }
                Node::UserDefinedValueTypeDefinition(u) => {
                    self.value_types.insert(DeclRef::new(at, u.id), u.clone());
                }
                _ => {}
            }
        }
        self.contracts.insert(DeclRef::new(at, c.id), c.clone());
    }

    /// The contract named `name` declared directly in `unit`.
    pub fn find_in_unit(unit: &SourceUnit, name: &str) -> Option<NodeId> {
        unit.nodes.iter().find_map(|n| match n {
            Node::ContractDefinition(c) if c.name == name => Some(c.id),
            _ => None,
        })
    }

    pub fn contract(&self, at: DeclRef) -> Option<&ContractDefinition> {
        self.contracts.get(&at)
    }

    pub fn compilation_count(&self) -> usize {
        self.compilations.len()
    }
}

impl Node {
    fn id(&self) -> Option<NodeId> {
        Some(match self {
            Node::SourceUnit(n) => n.id,
            Node::ContractDefinition(n) => n.id,
            Node::VariableDeclaration(n) => n.id,
            Node::StructDefinition(n) => n.id,
            Node::EnumDefinition(n) => n.id,
            Node::UserDefinedValueTypeDefinition(n) => n.id,
            Node::FunctionDefinition(n) => n.id,
            Node::EventDefinition(n) => n.id,
            Node::ErrorDefinition(n) => n.id,
            Node::Other => return None,
        })
    }
}

impl SourceUnit {
    /// The unit's own id and those of every declaration in it.
    fn declared_ids(&self) -> Vec<NodeId> {
        let mut ids = vec![self.id];
        for node in &self.nodes {
            ids.extend(node.id());
            if let Node::ContractDefinition(c) = node {
                ids.extend(c.nodes.iter().filter_map(Node::id));
            }
        }
        ids
    }
}

impl ContractDefinition {
    pub fn state_variables(&self) -> impl Iterator<Item = &VariableDeclaration> {
        self.nodes.iter().filter_map(|n| match n {
            Node::VariableDeclaration(v) if v.state_variable => Some(v),
            _ => None,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDefinition> {
        self.nodes.iter().filter_map(|n| match n {
            Node::FunctionDefinition(f) => Some(f),
            _ => None,
        })
    }

    pub fn events(&self) -> impl Iterator<Item = &EventDefinition> {
        self.nodes.iter().filter_map(|n| match n {
            Node::EventDefinition(e) => Some(e),
            _ => None,
        })
    }

    pub fn errors(&self) -> impl Iterator<Item = &ErrorDefinition> {
        self.nodes.iter().filter_map(|n| match n {
            Node::ErrorDefinition(e) => Some(e),
            _ => None,
        })
    }

    /// Direct bases in declaration order.
    pub fn base_ids(&self) -> Vec<NodeId> {
        self.base_contracts
            .iter()
            .map(|b| b.base_name.referenced_declaration)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_contract_with_unknown_nodes() {
        let unit: SourceUnit = serde_json::from_value(json!({
            "id": 10,
            "nodeType": "SourceUnit",
            "absolutePath": "Vault.sol",
            "nodes": [
                {"nodeType": "PragmaDirective", "id": 1, "literals": ["solidity"]},
                {
                    "nodeType": "ContractDefinition", "id": 9, "name": "Vault",
                    "contractKind": "contract", "linearizedBaseContracts": [9],
                    "nodes": [
                        {"nodeType": "UsingForDirective", "id": 2},
                        {
                            "nodeType": "VariableDeclaration", "id": 3, "name": "balances",
                            "stateVariable": true, "constant": false, "mutability": "mutable",
                            "typeDescriptions": {"typeString": "mapping(address => uint256)"},
                            "typeName": {
                                "nodeType": "Mapping",
                                "keyType": {"nodeType": "ElementaryTypeName", "name": "address"},
                                "valueType": {"nodeType": "ElementaryTypeName", "name": "uint256"}
                            }
                        },
                        {
                            "nodeType": "VariableDeclaration", "id": 4, "name": "CAP",
                            "stateVariable": true, "constant": true,
                            "typeName": {"nodeType": "ElementaryTypeName", "name": "uint256"}
                        }
                    ]
                }
            ]
        }))
        .unwrap();

        let mut index = AstIndex::default();
        let at = index.add_source_unit(&unit);
        let id = AstIndex::find_in_unit(&unit, "Vault").unwrap();
        let vault = index.contract(DeclRef::new(at, id)).unwrap();
        let vars: Vec<_> = vault.state_variables().collect();
        assert_eq!(vars.len(), 2);
        assert!(vars[0].is_stored());
        assert!(!vars[1].is_stored());
        assert!(matches!(vars[0].type_name, Some(TypeName::Mapping(_))));
    }

    #[test]
    fn array_length_from_literal_or_type_string() {
        let literal: ArrayTypeName = serde_json::from_value(json!({
            "baseType": {"nodeType": "ElementaryTypeName", "name": "uint8"},
            "length": {"nodeType": "Literal", "value": "4"}
        }))
        .unwrap();
        assert_eq!(literal.static_length(), Some(4));

        let constant: ArrayTypeName = serde_json::from_value(json!({
            "baseType": {"nodeType": "ElementaryTypeName", "name": "uint8"},
            "length": {"nodeType": "Identifier", "name": "SIZE"},
            "typeDescriptions": {"typeString": "uint8[8] storage ref"}
        }))
        .unwrap();
        assert_eq!(constant.static_length(), Some(8));

        let dynamic: ArrayTypeName = serde_json::from_value(json!({
            "baseType": {"nodeType": "ElementaryTypeName", "name": "uint8"},
            "length": null
        }))
        .unwrap();
        assert_eq!(dynamic.static_length(), None);
    }

    fn unit(id: NodeId, contract_id: NodeId, name: &str) -> SourceUnit {
        serde_json::from_value(json!({
            "nodeType": "SourceUnit", "id": id,
            "nodes": [{"nodeType": "ContractDefinition", "id": contract_id, "name": name}]
        }))
        .unwrap()
    }

    #[test]
    fn colliding_ids_open_a_new_compilation() {
        let mut index = AstIndex::default();
        let a = index.add_source_unit(&unit(1, 2, "A"));
        let b = index.add_source_unit(&unit(1, 2, "B"));
        assert_ne!(a, b);
        assert_eq!(index.contract(DeclRef::new(a, 2)).unwrap().name, "A");
        assert_eq!(index.contract(DeclRef::new(b, 2)).unwrap().name, "B");

        // same unit again, and a disjoint file of the first compilation
        assert_eq!(index.add_source_unit(&unit(1, 2, "A")), a);
        assert_eq!(index.add_source_unit(&unit(3, 4, "C")), a);
        assert_eq!(index.compilation_count(), 2);
    }
}
