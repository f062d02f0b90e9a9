//! Calldata, log and storage decoding against the Vault fixture.

mod common;

use alloy_core::dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256, I256, U256};
use chainlens_core::{
    ContractArtifact, DecodingErrorKind, MappingKey, MemoryProvider, Mode, RawLog, ReturnKind,
    TransactionKind, Value, BlockTag,
};
use chainlens_evm::{
    allocate, call_decoder, event_decoder, fingerprint, normalize_key, resolve,
    to_abi_mode, KeyPath, StorageReader,
};
use common::{contract, elementary, load_artifact, source_unit};
use serde_json::json;

fn vault_calldata(amount: u64, status: u8, owner: Address) -> Vec<u8> {
    let mut data = fingerprint::selector("open((uint256,uint8,address))").to_vec();
    data.extend(
        DynSolValue::Tuple(vec![DynSolValue::Tuple(vec![
            DynSolValue::Uint(U256::from(amount), 256),
            DynSolValue::Uint(U256::from(status), 8),
            DynSolValue::Address(owner),
        ])])
        .abi_encode_params(),
    );
    data
}

#[test]
fn struct_argument_decodes_in_full_mode() {
    let project = resolve(&[load_artifact("Vault.json")]).unwrap();
    let vault = &project.contracts[0];
    let owner = Address::repeat_byte(0x42);

    let call =
        call_decoder::decode_input(&project.table, vault, &vault_calldata(7, 1, owner), true)
            .unwrap();
    assert_eq!(call.kind, TransactionKind::Function);
    assert_eq!(call.name.as_deref(), Some("open"));
    assert_eq!(call.mode, Mode::Full);
    let p = call.argument("p").unwrap();
    assert_eq!(
        p.member("status").and_then(|r| r.as_value()),
        Some(&Value::Enum {
            variant: "Closed".into(),
            index: 1
        })
    );
    assert_eq!(p.member("owner").and_then(|r| r.as_value()), Some(&Value::Address(owner)));
}

#[test]
fn invalid_enum_falls_back_to_abi_for_the_whole_value() {
    let project = resolve(&[load_artifact("Vault.json")]).unwrap();
    let vault = &project.contracts[0];

    let call = call_decoder::decode_input(
        &project.table,
        vault,
        &vault_calldata(7, 9, Address::ZERO),
        true,
    )
    .unwrap();
    assert_eq!(call.mode, Mode::Abi);
    let p = call.argument("p").unwrap();
    assert_eq!(p.mode(), Mode::Abi);
    assert!(p.member("status").is_none());
    assert_eq!(p.at(1).and_then(|r| r.as_value()), Some(&Value::Uint(U256::from(9))));
    assert!(!p.has_errors());
}

const SETTER_SIGNATURE: &str = "set(uint8,int16,bool,address,bytes4,bytes,string)";
const SETTER_PARAMS: [(&str, &str); 7] = [
    ("a", "uint8"),
    ("b", "int16"),
    ("c", "bool"),
    ("d", "address"),
    ("e", "bytes4"),
    ("f", "bytes"),
    ("g", "string"),
];

fn setter_artifact() -> ContractArtifact {
    let inputs: Vec<_> = SETTER_PARAMS
        .iter()
        .map(|(name, ty)| json!({"name": name, "type": ty}))
        .collect();
    let abi = json!([{
        "type": "function",
        "name": "set",
        "stateMutability": "nonpayable",
        "inputs": inputs,
        "outputs": []
    }]);
    ContractArtifact::new("Setter", serde_json::from_value(abi).unwrap())
}

/// The same contract with its source declaration attached.
fn setter_artifact_with_ast() -> ContractArtifact {
    let parameters: Vec<_> = SETTER_PARAMS
        .iter()
        .enumerate()
        .map(|(i, (name, ty))| {
            json!({
                "nodeType": "VariableDeclaration", "id": 10 + i as i64, "name": name,
                "typeDescriptions": {"typeString": ty},
                "typeName": elementary(ty)
            })
        })
        .collect();
    let set = json!({
        "nodeType": "FunctionDefinition", "id": 5, "name": "set", "kind": "function",
        "parameters": {"parameters": parameters},
        "returnParameters": {"parameters": []}
    });
    let ast = source_unit(1, vec![contract(2, "Setter", &[], Some(&[2]), vec![set])]);
    setter_artifact().with_ast(ast)
}

fn setter_input(minus_300: I256, who: Address) -> Vec<u8> {
    let mut input = fingerprint::selector(SETTER_SIGNATURE).to_vec();
    input.extend(
        DynSolValue::Tuple(vec![
            DynSolValue::Uint(U256::from(200), 8),
            DynSolValue::Int(minus_300, 16),
            DynSolValue::Bool(true),
            DynSolValue::Address(who),
            DynSolValue::FixedBytes(B256::ZERO, 4),
            DynSolValue::Bytes(vec![1, 2, 3]),
            DynSolValue::String("vault".into()),
        ])
        .abi_encode_params(),
    );
    input
}

fn assert_setter_values(call: &chainlens_core::CallDecoding, minus_300: I256, who: Address) {
    let values: Vec<_> = call
        .arguments
        .iter()
        .map(|a| a.result.as_value().cloned().unwrap())
        .collect();
    assert_eq!(values[0], Value::Uint(U256::from(200)));
    assert_eq!(values[1], Value::Int(minus_300));
    assert_eq!(values[2], Value::Bool(true));
    assert_eq!(values[3], Value::Address(who));
    assert_eq!(values[4], Value::FixedBytes(vec![0u8; 4].into()));
    assert_eq!(values[5], Value::Bytes(vec![1, 2, 3].into()));
    assert_eq!(values[6], Value::String("vault".into()));
}

#[test]
fn abi_only_artifact_round_trips_elementary_values() {
    let project = resolve(&[setter_artifact()]).unwrap();
    let minus_300 = I256::try_from(-300i64).unwrap();
    let who = Address::repeat_byte(0x07);
    let input = setter_input(minus_300, who);

    for full in [true, false] {
        let call =
            call_decoder::decode_input(&project.table, &project.contracts[0], &input, full).unwrap();
        assert_eq!(call.mode, Mode::Abi);
        assert_setter_values(&call, minus_300, who);
    }
}

#[test]
fn full_mode_round_trips_elementary_values() {
    let project = resolve(&[setter_artifact_with_ast()]).unwrap();
    let setter = &project.contracts[0];
    assert!(setter.functions[0].inputs.iter().all(|p| p.full_ty.is_some()));
    let minus_300 = I256::try_from(-300i64).unwrap();
    let who = Address::repeat_byte(0x07);

    let call = call_decoder::decode_input(
        &project.table,
        setter,
        &setter_input(minus_300, who),
        true,
    )
    .unwrap();
    assert_eq!(call.mode, Mode::Full);
    assert_eq!(call.argument("c").and_then(|r| r.as_value()), Some(&Value::Bool(true)));
    assert_setter_values(&call, minus_300, who);

    // a bool word of 2 is rejected in full mode; the call is redone in ABI mode
    let mut dirty = setter_input(minus_300, who);
    dirty[4 + 2 * 32 + 31] = 2;
    let call = call_decoder::decode_input(&project.table, setter, &dirty, true).unwrap();
    assert_eq!(call.mode, Mode::Abi);
    assert_eq!(call.arguments[2].result.as_value(), Some(&Value::Bool(true)));
}

#[test]
fn receive_and_constructor_are_recognised() {
    let artifact = load_artifact("Vault.json");
    let creation = hex::decode(artifact.bytecode.as_deref().unwrap().trim_start_matches("0x")).unwrap();
    let project = resolve(&[artifact]).unwrap();
    let vault = &project.contracts[0];

    let receive = call_decoder::decode_input(&project.table, vault, &[], true).unwrap();
    assert_eq!(receive.kind, TransactionKind::Receive);

    let mut deploy = creation;
    deploy.extend(DynSolValue::Tuple(vec![DynSolValue::String("Main".into())]).abi_encode_params());
    let ctor = call_decoder::decode_creation(&project.table, vault, &deploy, true).unwrap();
    assert_eq!(ctor.kind, TransactionKind::Constructor);
    assert_eq!(ctor.mode, Mode::Full);
    assert_eq!(
        ctor.argument("_name").and_then(|r| r.as_value()),
        Some(&Value::String("Main".into()))
    );
}

#[test]
fn reverts_and_custom_errors() {
    let project = resolve(&[load_artifact("Vault.json")]).unwrap();
    let vault = &project.contracts[0];

    let mut revert = call_decoder::ERROR_SELECTOR.to_vec();
    revert.extend(DynSolValue::Tuple(vec![DynSolValue::String("too low".into())]).abi_encode_params());
    let r = call_decoder::decode_return(&project, vault, None, &revert, true);
    assert_eq!(r.kind, ReturnKind::Revert);
    assert_eq!(
        r.argument("message").and_then(|v| v.as_value()),
        Some(&Value::String("too low".into()))
    );

    let mut custom = fingerprint::selector("Insufficient(uint256)").to_vec();
    custom.extend(U256::from(5).to_be_bytes::<32>());
    let r = call_decoder::decode_return(&project, vault, None, &custom, true);
    assert_eq!(r.kind, ReturnKind::Error);
    assert_eq!(r.name.as_deref(), Some("Insufficient"));

    let deposit = vault.function("deposit");
    let ok = U256::from(1).to_be_bytes::<32>();
    let r = call_decoder::decode_return(&project, vault, deposit, &ok, true);
    assert_eq!(r.kind, ReturnKind::Return);
    assert_eq!(r.arguments[0].result.as_value(), Some(&Value::Bool(true)));
}

fn deposited_log(status: u8) -> RawLog {
    let owner = Address::repeat_byte(0x42);
    RawLog::new(
        Address::repeat_byte(0xaa),
        vec![
            fingerprint::event_topic("Deposited(address,uint256,uint8)"),
            B256::left_padding_from(owner.as_slice()),
        ],
        DynSolValue::Tuple(vec![
            DynSolValue::Uint(U256::from(10), 256),
            DynSolValue::Uint(U256::from(status), 8),
        ])
        .abi_encode_params(),
    )
}

#[test]
fn log_decodes_with_indexed_and_enum_arguments() {
    let project = resolve(&[load_artifact("Vault.json")]).unwrap();
    let matches =
        event_decoder::decode_log(&project.table, &project.contracts, &deposited_log(1), |_| true);
    assert_eq!(matches.len(), 1);
    let event = &matches[0];
    assert_eq!(event.name, "Deposited");
    assert_eq!(event.mode, Mode::Full);
    assert_eq!(
        event.argument("owner").and_then(|r| r.as_value()),
        Some(&Value::Address(Address::repeat_byte(0x42)))
    );
    assert!(matches!(
        event.argument("status").and_then(|r| r.as_value()),
        Some(Value::Enum { index: 1, .. })
    ));

    // the projection of a full-mode decoding equals decoding in ABI mode
    let abi =
        event_decoder::decode_log(&project.table, &project.contracts, &deposited_log(1), |_| false);
    assert_eq!(abi[0].mode, Mode::Abi);
    for (full, abi) in event.arguments.iter().zip(&abi[0].arguments) {
        let projected = to_abi_mode(&full.result, &project.table);
        assert_eq!(projected, abi.result);
        assert_eq!(to_abi_mode(&projected, &project.table), projected);
    }
}

#[test]
fn unknown_topic_yields_nothing() {
    let project = resolve(&[load_artifact("Vault.json")]).unwrap();
    let mut log = deposited_log(0);
    log.topics[0] = fingerprint::event_topic("Other(address,uint256,uint8)");
    assert!(event_decoder::decode_log(&project.table, &project.contracts, &log, |_| true).is_empty());
}

#[test]
fn anonymous_event_sharing_a_signature_is_still_a_candidate() {
    let abi = json!([
        {"type": "event", "name": "Ping", "anonymous": false,
         "inputs": [{"name": "v", "type": "uint256", "indexed": false}]},
        {"type": "event", "name": "Ping", "anonymous": true,
         "inputs": [{"name": "v", "type": "uint256", "indexed": true}]}
    ]);
    let artifact = ContractArtifact::new("Pinger", serde_json::from_value(abi).unwrap());
    let project = resolve(&[artifact]).unwrap();

    let topic = fingerprint::event_topic("Ping(uint256)");
    let log = RawLog::new(
        Address::repeat_byte(0xbb),
        vec![topic],
        U256::from(5).to_be_bytes::<32>().to_vec(),
    );
    let matches = event_decoder::decode_log(&project.table, &project.contracts, &log, |_| true);
    assert_eq!(matches.len(), 2);
    let values: Vec<_> = matches
        .iter()
        .map(|m| (m.anonymous, m.argument("v").and_then(|r| r.as_value()).cloned()))
        .collect();
    assert!(values.contains(&(false, Some(Value::Uint(U256::from(5))))));
    assert!(values.contains(&(true, Some(Value::Uint(U256::from_be_bytes(topic.0))))));
}

#[tokio::test]
async fn storage_variables_and_watched_mapping_entries() {
    let project = resolve(&[load_artifact("Vault.json")]).unwrap();
    let alloc = allocate(&project, 0).unwrap();
    let provider = MemoryProvider::new(1);
    let at = Address::repeat_byte(0xaa);
    let holder = Address::repeat_byte(0x11);

    let word = |v: U256| B256::from(v.to_be_bytes::<32>());
    // a = 3, b = 4 packed in slot 1
    provider.set_storage(at, U256::from(1), word(U256::from(0x0403)));
    // short string "vault"
    let mut name = [0u8; 32];
    name[..5].copy_from_slice(b"vault");
    name[31] = 10;
    provider.set_storage(at, U256::from(3), B256::from(name));
    // balances[holder] = 99
    let balances = alloc.variable("balances").unwrap();
    let mapping_ty = project.table.get(balances.ty).cloned();
    let key_ty = match mapping_ty {
        Some(chainlens_core::TypeDefinition::Mapping { key, .. }) => key,
        other => panic!("not a mapping: {other:?}"),
    };
    let key = normalize_key(&project.table, key_ty, &MappingKey::Address(holder)).unwrap();
    provider.set_storage(at, key.entry_slot(U256::from(4)), word(U256::from(99)));
    // history = [5, 6]
    provider.set_storage(at, U256::from(8), word(U256::from(2)));
    provider.set_storage(
        at,
        fingerprint::data_slot(U256::from(8)),
        word(U256::from(0x0006_0005u64)),
    );
    // status = Closed
    provider.set_storage(at, U256::from(9), word(U256::from(1)));

    let reader = StorageReader::new(&provider, at, BlockTag::Latest, &project.table, &alloc, 1024);
    let read = |name: &str| alloc.variable(name).unwrap();

    let a = reader.read_variable(read("a"), &[]).await.unwrap();
    assert_eq!(a.as_value(), Some(&Value::Uint(U256::from(3))));
    let b = reader.read_variable(read("b"), &[]).await.unwrap();
    assert_eq!(b.as_value(), Some(&Value::Uint(U256::from(4))));
    let name = reader.read_variable(read("name"), &[]).await.unwrap();
    assert_eq!(name.as_value(), Some(&Value::String("vault".into())));
    let history = reader.read_variable(read("history"), &[]).await.unwrap();
    assert_eq!(history.children().len(), 2);
    assert_eq!(history.at(1).and_then(|r| r.as_value()), Some(&Value::Uint(U256::from(6))));
    let status = reader.read_variable(read("status"), &[]).await.unwrap();
    assert!(matches!(status.as_value(), Some(Value::Enum { index: 1, .. })));

    let unwatched = reader.read_variable(read("balances"), &[]).await.unwrap();
    assert!(unwatched.children().is_empty());
    let watched = reader
        .read_variable(
            read("balances"),
            &[
                KeyPath::new(balances.location.slot, vec![key.clone()]),
                // rooted elsewhere; re-derived against the variable's slot
                KeyPath::new(U256::from(77), vec![key.clone()]),
            ],
        )
        .await
        .unwrap();
    assert_eq!(watched.children().len(), 1);
    assert_eq!(
        watched.entry(&Value::Address(holder)).and_then(|r| r.as_value()),
        Some(&Value::Uint(U256::from(99)))
    );

    // slot 1 was read once for both a and b
    let reads = provider.storage_reads();
    reader.read_variable(read("a"), &[]).await.unwrap();
    assert_eq!(provider.storage_reads(), reads);
}

#[tokio::test]
async fn overlong_dynamic_array_is_an_error_result() {
    let project = resolve(&[load_artifact("Vault.json")]).unwrap();
    let alloc = allocate(&project, 0).unwrap();
    let provider = MemoryProvider::new(1);
    let at = Address::repeat_byte(0xaa);
    provider.set_storage(at, U256::from(8), B256::from(U256::MAX.to_be_bytes::<32>()));

    let reader = StorageReader::new(&provider, at, BlockTag::Latest, &project.table, &alloc, 16);
    let history = reader
        .read_variable(alloc.variable("history").unwrap(), &[])
        .await
        .unwrap();
    assert!(matches!(
        history.first_error(),
        Some(DecodingErrorKind::OverlongArray { max: 16, .. })
    ));
}
