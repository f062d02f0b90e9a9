//! EVM function-call, constructor and return-data decoder.
//!
//! # How it works
//! - First 4 bytes of calldata = keccak256(function_signature)[:4] (the selector)
//! - Remaining bytes = ABI-encoded inputs tuple
//! - Constructor: creation bytecode followed by the ABI-encoded constructor args
//! - Empty calldata goes to `receive`; an unknown selector to `fallback`
//! - Return data is either the outputs tuple, a builtin `Error(string)` /
//!   `Panic(uint256)` revert, or a custom error selected like a function

use crate::abi_decoder::{decode_with_fallback, ModeDecoding};
use crate::contract::{abi_types, full_types, ContractTypeInfo, FunctionInfo, ParamInfo};
use crate::resolver::ResolvedProject;
use chainlens_core::{
    call::{Argument, CallDecoding, ReturnDecoding, ReturnKind, TransactionKind},
    types::{TypeId, TypeTable},
    value::Mode,
};
use tracing::debug;

/// Selector of the builtin `Error(string)` revert.
pub const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// Selector of the builtin `Panic(uint256)` revert.
pub const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Decode `data` as the tuple of `params`, full mode first.
pub fn decode_arguments(
    table: &TypeTable,
    params: &[ParamInfo],
    data: &[u8],
    allow_full: bool,
) -> (Vec<Argument>, Mode) {
    let full = if allow_full { full_types(params) } else { None };
    let ModeDecoding { results, mode } =
        decode_with_fallback(table, full.as_deref(), &abi_types(params), |dec, types| {
            dec.decode_params(data, types)
        });
    let arguments = params
        .iter()
        .zip(results)
        .map(|(p, result)| Argument {
            name: p.display_name(),
            result,
        })
        .collect();
    (arguments, mode)
}

fn bare_mode(contract: &ContractTypeInfo, allow_full: bool) -> Mode {
    if allow_full && contract.has_ast() {
        Mode::Full
    } else {
        Mode::Abi
    }
}

fn bare(contract: &ContractTypeInfo, kind: TransactionKind, allow_full: bool) -> CallDecoding {
    CallDecoding {
        contract: contract.name.clone(),
        kind,
        name: None,
        signature: None,
        selector: None,
        arguments: Vec::new(),
        mode: bare_mode(contract, allow_full),
    }
}

/// Interpret `input` as a message call to `contract`.
pub fn decode_input(
    table: &TypeTable,
    contract: &ContractTypeInfo,
    input: &[u8],
    allow_full: bool,
) -> Option<CallDecoding> {
    if input.is_empty() {
        return if contract.has_receive {
            Some(bare(contract, TransactionKind::Receive, allow_full))
        } else if contract.has_fallback {
            Some(bare(contract, TransactionKind::Fallback, allow_full))
        } else {
            None
        };
    }

    let function = input
        .get(..4)
        .and_then(|selector| contract.function_by_selector(selector));
    match function {
        Some(f) => {
            let full = allow_full && contract.has_ast();
            let (arguments, mode) = decode_arguments(table, &f.inputs, &input[4..], full);
            Some(CallDecoding {
                contract: contract.name.clone(),
                kind: TransactionKind::Function,
                name: Some(f.name.clone()),
                signature: Some(f.signature.clone()),
                selector: Some(f.selector),
                arguments,
                mode,
            })
        }
        None if contract.has_fallback => Some(bare(contract, TransactionKind::Fallback, allow_full)),
        None => None,
    }
}

/// Interpret `input` as a deployment of `contract`: its creation bytecode
/// followed by constructor arguments.
pub fn decode_creation(
    table: &TypeTable,
    contract: &ContractTypeInfo,
    input: &[u8],
    allow_full: bool,
) -> Option<CallDecoding> {
    let start = contract.creation_code.as_ref()?.strip_prefix_of(input)?;
    let full = allow_full && contract.has_ast();
    let (arguments, mode) = match &contract.constructor {
        Some(ctor) => decode_arguments(table, &ctor.inputs, &input[start..], full),
        None => (Vec::new(), bare_mode(contract, full)),
    };
    Some(CallDecoding {
        contract: contract.name.clone(),
        kind: TransactionKind::Constructor,
        name: None,
        signature: None,
        selector: None,
        arguments,
        mode,
    })
}

fn builtin(ty: TypeId, name: &str) -> ParamInfo {
    ParamInfo {
        name: name.into(),
        abi_ty: ty,
        full_ty: Some(ty),
        indexed: false,
    }
}

/// Decode the data a call to `function` returned or reverted with.
///
/// With no `function`, only reverts can be recognised; anything else is
/// decoded as an empty return.
pub fn decode_return(
    project: &ResolvedProject,
    contract: &ContractTypeInfo,
    function: Option<&FunctionInfo>,
    data: &[u8],
    allow_full: bool,
) -> ReturnDecoding {
    let table = &project.table;
    let full = allow_full && contract.has_ast();
    let selector = data.get(..4);
    let body = data.get(4..).unwrap_or(&[]);

    let revert = match selector {
        Some(s) if s == ERROR_SELECTOR => Some((
            ReturnKind::Revert,
            "Error".to_string(),
            vec![builtin(project.string_ty, "message")],
        )),
        Some(s) if s == PANIC_SELECTOR => Some((
            ReturnKind::Panic,
            "Panic".to_string(),
            vec![builtin(project.uint256_ty, "code")],
        )),
        Some(s) => contract
            .error_by_selector(s)
            .map(|e| (ReturnKind::Error, e.name.clone(), e.inputs.clone())),
        None => None,
    };
    let Some((kind, name, params)) = revert else {
        let outputs = function.map(|f| f.outputs.as_slice()).unwrap_or_default();
        let (arguments, mode) = decode_arguments(table, outputs, data, full);
        return ReturnDecoding {
            kind: ReturnKind::Return,
            name: None,
            arguments,
            mode,
        };
    };
    debug!(contract = %contract.name, kind = ?kind, "decoding revert data");
    let (arguments, mode) = decode_arguments(table, &params, body, full);
    ReturnDecoding {
        kind,
        name: Some(name),
        arguments,
        mode,
    }
}
