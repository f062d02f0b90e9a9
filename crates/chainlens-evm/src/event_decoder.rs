//! EVM event log decoder.
//!
//! # How it works
//! - topics[0] = keccak256(event_signature), unless the event is anonymous
//! - the remaining topics hold indexed parameters; value types are stored
//!   in place, everything else as the keccak256 of its encoding
//! - `data` holds the non-indexed parameters, ABI-encoded as a tuple
//!
//! Anonymous events have no topic0 and are matched by topic count alone;
//! a candidate of that kind that fails to decode in both modes is dropped.

use crate::abi_decoder::{decode_with_fallback, LinearDecoder};
use crate::contract::{full_types, ContractTypeInfo, EventInfo, ParamInfo};
use alloy_primitives::B256;
use chainlens_core::{
    call::Argument,
    error::DecodingErrorKind,
    event::EventDecoding,
    provider::RawLog,
    result::DecodeResult,
    types::{TypeDefinition, TypeId, TypeTable},
    value::Value,
};
use std::collections::HashSet;
use tracing::trace;

/// Whether an indexed parameter of type `ty` is stored in its topic as
/// a value rather than as a hash.
fn topic_holds_value(table: &TypeTable, ty: TypeId) -> bool {
    match table.get(ty) {
        Some(TypeDefinition::Elementary(kind)) => !kind.is_dynamic(),
        Some(TypeDefinition::Enum { .. }) | Some(TypeDefinition::Contract { .. }) => true,
        _ => false,
    }
}

/// Decode topics and data against `params` typed as `types`.
fn decode_parts(
    dec: &LinearDecoder<'_>,
    table: &TypeTable,
    params: &[ParamInfo],
    types: &[TypeId],
    topics: &[B256],
    data: &[u8],
) -> Vec<DecodeResult> {
    let unindexed: Vec<TypeId> = params
        .iter()
        .zip(types)
        .filter(|(p, _)| !p.indexed)
        .map(|(_, t)| *t)
        .collect();
    let mut body = dec.decode_params(data, &unindexed).into_iter();
    let mut topics = topics.iter();

    params
        .iter()
        .zip(types)
        .map(|(p, ty)| {
            if !p.indexed {
                return body.next().unwrap_or_else(|| {
                    DecodeResult::error(
                        DecodingErrorKind::Truncated {
                            offset: data.len(),
                            needed: 32,
                            available: 0,
                        },
                        Vec::new(),
                        *ty,
                        dec.mode(),
                    )
                });
            }
            let Some(topic) = topics.next() else {
                return DecodeResult::error(
                    DecodingErrorKind::InvalidTopic {
                        reason: "missing topic for indexed parameter".into(),
                    },
                    Vec::new(),
                    *ty,
                    dec.mode(),
                );
            };
            if topic_holds_value(table, *ty) {
                dec.decode_topic(&topic.0, *ty)
            } else {
                DecodeResult::value(Value::IndexedHash(*topic), topic.to_vec(), *ty, dec.mode())
            }
        })
        .collect()
}

/// Decode `log` as `event` of `contract`.
///
/// Returns `None` when the log cannot be an instance of the event, or when
/// an anonymous candidate fails in both modes.
pub fn decode_event(
    table: &TypeTable,
    contract: &ContractTypeInfo,
    event: &EventInfo,
    log: &RawLog,
    allow_full: bool,
) -> Option<EventDecoding> {
    if log.topics.len() != event.topic_count() {
        return None;
    }
    let indexed_topics = if event.anonymous {
        &log.topics[..]
    } else {
        if log.topics.first() != Some(&event.topic) {
            return None;
        }
        &log.topics[1..]
    };

    let full = if allow_full {
        full_types(&event.inputs)
    } else {
        None
    };
    let abi: Vec<TypeId> = event.inputs.iter().map(|p| p.abi_ty).collect();
    let decoded = decode_with_fallback(table, full.as_deref(), &abi, |dec, types| {
        decode_parts(dec, table, &event.inputs, types, indexed_topics, &log.data)
    });
    if event.anonymous && !decoded.is_clean() {
        trace!(event = %event.signature, "anonymous candidate rejected");
        return None;
    }

    Some(EventDecoding {
        contract: contract.name.clone(),
        name: event.name.clone(),
        signature: event.signature.clone(),
        topic: (!event.anonymous).then_some(event.topic),
        anonymous: event.anonymous,
        arguments: event
            .inputs
            .iter()
            .zip(decoded.results)
            .map(|(p, result)| Argument {
                name: p.display_name(),
                result,
            })
            .collect(),
        mode: decoded.mode,
    })
}

/// Every interpretation of `log` across `contracts`, in contract order.
///
/// Each contract contributes at most one decoding per event signature and
/// anonymity.
/// `allow_full` tells whether a contract may currently decode in full mode.
pub fn decode_log<'a, I, F>(
    table: &TypeTable,
    contracts: I,
    log: &RawLog,
    allow_full: F,
) -> Vec<EventDecoding>
where
    I: IntoIterator<Item = &'a ContractTypeInfo>,
    F: Fn(&ContractTypeInfo) -> bool,
{
    let mut out = Vec::new();
    for contract in contracts {
        let full = allow_full(contract) && contract.has_ast();
        let mut seen = HashSet::new();
        for event in &contract.events {
            if !seen.insert((event.signature.as_str(), event.anonymous)) {
                continue;
            }
            if let Some(d) = decode_event(table, contract, event, log, full) {
                out.push(d);
            }
        }
    }
    trace!(address = %log.address, matches = out.len(), "decoded log");
    out
}
