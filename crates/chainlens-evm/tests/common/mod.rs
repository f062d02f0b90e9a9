//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use chainlens_core::ContractArtifact;
use serde_json::{json, Value};

/// The fixtures live two levels above the crate root.
pub fn fixture_path(name: &str) -> std::path::PathBuf {
    let mut p = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    p.pop();
    p.pop();
    p.push("fixtures");
    p.push(name);
    p
}

pub fn load_artifact(name: &str) -> ContractArtifact {
    let path = fixture_path(name);
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    ContractArtifact::from_json(&text).unwrap()
}

pub fn elementary(name: &str) -> Value {
    json!({ "nodeType": "ElementaryTypeName", "name": name })
}

/// A stored state variable declaration.
pub fn state_var(id: i64, name: &str, type_string: &str, type_name: Value) -> Value {
    json!({
        "nodeType": "VariableDeclaration",
        "id": id,
        "name": name,
        "stateVariable": true,
        "constant": false,
        "mutability": "mutable",
        "visibility": "internal",
        "typeDescriptions": { "typeString": type_string },
        "typeName": type_name
    })
}

/// A contract definition; `linearized` is omitted when `None`.
pub fn contract(
    id: i64,
    name: &str,
    bases: &[i64],
    linearized: Option<&[i64]>,
    nodes: Vec<Value>,
) -> Value {
    let mut c = json!({
        "nodeType": "ContractDefinition",
        "id": id,
        "name": name,
        "contractKind": "contract",
        "baseContracts": bases
            .iter()
            .map(|b| json!({ "baseName": { "referencedDeclaration": b } }))
            .collect::<Vec<_>>(),
        "nodes": nodes
    });
    if let Some(lin) = linearized {
        c["linearizedBaseContracts"] = json!(lin);
    }
    c
}

pub fn source_unit(id: i64, contracts: Vec<Value>) -> Value {
    json!({ "nodeType": "SourceUnit", "id": id, "nodes": contracts })
}

/// An artifact with an empty ABI and the given AST.
pub fn ast_only(name: &str, ast: Value) -> ContractArtifact {
    ContractArtifact::new(name, Default::default()).with_ast(ast)
}
