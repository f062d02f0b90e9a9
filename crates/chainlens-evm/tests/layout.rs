//! Storage layout integration tests.

mod common;

use alloy_primitives::U256;
use chainlens_core::{AllocationError, TypeResolutionError};
use chainlens_evm::{allocate, allocator::Indirection, resolve};
use common::*;
use serde_json::{json, Value};

fn slot_of(alloc: &chainlens_evm::StorageAllocation, name: &str) -> (U256, usize) {
    let v = alloc
        .variable(name)
        .unwrap_or_else(|| panic!("no variable {name}"));
    (v.location.slot, v.location.offset)
}

#[test]
fn value_types_pack_into_one_slot() {
    let ast = source_unit(
        1,
        vec![contract(
            2,
            "Packed",
            &[],
            Some(&[2]),
            vec![
                state_var(3, "a", "uint8", elementary("uint8")),
                state_var(4, "b", "uint8", elementary("uint8")),
                state_var(5, "c", "uint256", elementary("uint256")),
            ],
        )],
    );
    let project = resolve(&[ast_only("Packed", ast)]).unwrap();
    let alloc = allocate(&project, 0).unwrap();

    assert_eq!(slot_of(&alloc, "a"), (U256::ZERO, 0));
    assert_eq!(slot_of(&alloc, "b"), (U256::ZERO, 1));
    assert_eq!(slot_of(&alloc, "c"), (U256::from(1), 0));
}

#[test]
fn base_variables_come_first() {
    let ast = source_unit(
        1,
        vec![
            contract(
                2,
                "Base",
                &[],
                Some(&[2]),
                vec![state_var(3, "x", "uint256", elementary("uint256"))],
            ),
            contract(
                4,
                "Derived",
                &[2],
                Some(&[4, 2]),
                vec![state_var(5, "y", "uint256", elementary("uint256"))],
            ),
        ],
    );
    let project = resolve(&[ast_only("Derived", ast)]).unwrap();
    let alloc = allocate(&project, 0).unwrap();

    assert_eq!(slot_of(&alloc, "x"), (U256::ZERO, 0));
    assert_eq!(slot_of(&alloc, "y"), (U256::from(1), 0));
    assert_eq!(alloc.variable("x").unwrap().contract, "Base");
}

#[test]
fn c3_is_computed_when_solc_linearisation_is_missing() {
    // A { a }  B is A { b }  C is A { c }  D is B, C { d }
    let ast = source_unit(
        1,
        vec![
            contract(10, "A", &[], None, vec![state_var(11, "a", "uint256", elementary("uint256"))]),
            contract(20, "B", &[10], None, vec![state_var(21, "b", "uint256", elementary("uint256"))]),
            contract(30, "C", &[10], None, vec![state_var(31, "c", "uint256", elementary("uint256"))]),
            contract(40, "D", &[20, 30], None, vec![state_var(41, "d", "uint256", elementary("uint256"))]),
        ],
    );
    let project = resolve(&[ast_only("D", ast)]).unwrap();
    let alloc = allocate(&project, 0).unwrap();
    let order: Vec<_> = alloc.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(order, ["a", "b", "c", "d"]);
}

#[test]
fn inheritance_cycle_fails_allocation() {
    let ast = source_unit(
        1,
        vec![
            contract(10, "A", &[20], None, vec![]),
            contract(20, "B", &[10], None, vec![]),
        ],
    );
    let project = resolve(&[ast_only("A", ast)]).unwrap();
    assert!(matches!(
        allocate(&project, 0),
        Err(AllocationError::InheritanceCycle { .. })
    ));
}

#[test]
fn missing_ast_fails_allocation() {
    let artifact = load_artifact("Vault.json").without_ast();
    let project = resolve(&[artifact]).unwrap();
    assert!(matches!(
        allocate(&project, 0),
        Err(AllocationError::NoAst { .. })
    ));
}

#[test]
fn vault_fixture_layout() {
    let project = resolve(&[load_artifact("Vault.json")]).unwrap();
    let alloc = allocate(&project, 0).unwrap();

    let expected = [
        ("x", 0, 0),
        ("a", 1, 0),
        ("b", 1, 1),
        ("c", 2, 0),
        ("name", 3, 0),
        ("balances", 4, 0),
        ("approvals", 5, 0),
        ("position", 6, 0),
        ("history", 8, 0),
        ("status", 9, 0),
    ];
    for (name, slot, offset) in expected {
        assert_eq!(slot_of(&alloc, name), (U256::from(slot), offset), "{name}");
    }
    // constants take no storage
    assert!(alloc.variable("FEE").is_none());
    assert_eq!(
        alloc.variable("balances").unwrap().location.indirection,
        Indirection::Dynamic
    );

    let position = alloc.variable("position").unwrap();
    let layout = alloc.struct_layout(position.ty).unwrap();
    assert_eq!(layout.slots, U256::from(2));
    let owner = &layout.members[2].2;
    assert_eq!((owner.slot, owner.offset), (U256::from(1), 1));
}

/// A unit declaring file-level struct `S { <member_type> a }` and contract
/// `name` holding one `S`, with fixed node ids.
fn struct_unit(name: &str, member_type: &str) -> Value {
    json!({
        "nodeType": "SourceUnit",
        "id": 100,
        "nodes": [
            {
                "nodeType": "StructDefinition", "id": 101, "name": "S", "canonicalName": "S",
                "members": [state_member(102, "a", member_type)]
            },
            contract(
                103,
                name,
                &[],
                Some(&[103]),
                vec![state_var(
                    104,
                    "s",
                    "struct S",
                    json!({
                        "nodeType": "UserDefinedTypeName",
                        "referencedDeclaration": 101,
                        "typeDescriptions": {"typeString": "struct S"}
                    }),
                )],
            )
        ]
    })
}

fn state_member(id: i64, name: &str, ty: &str) -> Value {
    json!({
        "nodeType": "VariableDeclaration", "id": id, "name": name,
        "typeDescriptions": {"typeString": ty},
        "typeName": elementary(ty)
    })
}

#[test]
fn separate_compilations_keep_their_own_layouts() {
    let only = |id: i64, var: &str| {
        source_unit(
            1,
            vec![contract(
                2,
                if var == "onlyInA" { "A" } else { "B" },
                &[],
                Some(&[2]),
                vec![state_var(id, var, "uint256", elementary("uint256"))],
            )],
        )
    };
    let project = resolve(&[
        ast_only("A", only(3, "onlyInA")),
        ast_only("B", only(3, "onlyInB")),
    ])
    .unwrap();

    let a = allocate(&project, 0).unwrap();
    let b = allocate(&project, 1).unwrap();
    let names = |alloc: &chainlens_evm::StorageAllocation| {
        alloc
            .variables
            .iter()
            .map(|v| (v.contract.clone(), v.name.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(names(&a), [("A".to_string(), "onlyInA".to_string())]);
    assert_eq!(names(&b), [("B".to_string(), "onlyInB".to_string())]);
    assert_ne!(project.contracts[0].ast_id, project.contracts[1].ast_id);
}

#[test]
fn same_struct_name_with_other_members_conflicts() {
    // node ids overlap; only the compilation tells the two structs apart
    let err = resolve(&[
        ast_only("A", struct_unit("A", "uint256")),
        ast_only("B", struct_unit("B", "address")),
    ])
    .unwrap_err();
    match err {
        TypeResolutionError::Conflict { name, first, second } => {
            assert_eq!(name, "S");
            assert_eq!(first, "uint256 a");
            assert_eq!(second, "address a");
        }
        other => panic!("expected a conflict, got {other:?}"),
    }
}

#[test]
fn identical_structs_across_compilations_merge() {
    let project = resolve(&[
        ast_only("A", struct_unit("A", "uint256")),
        ast_only("B", struct_unit("B", "uint256")),
    ])
    .unwrap();
    let a = allocate(&project, 0).unwrap();
    let b = allocate(&project, 1).unwrap();
    assert_eq!(a.variable("s").unwrap().ty, b.variable("s").unwrap().ty);
}
