//! # decode_wire
//!
//! Decodes a transaction, a log and an event query against the `Vault`
//! project, then repeats with the AST withheld to show the ABI-mode view.
//!
//! Run with:
//! ```sh
//! cargo run --bin decode_wire
//! ```

use alloy_core::dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use chainlens_core::{ContractArtifact, MemoryProvider, RawLog, RawTransaction};
use chainlens_decoder::EventOptions;
use chainlens_evm::fingerprint;
use chainlens_observability::{init_tracing, LogConfig};
use futures::StreamExt;
use std::sync::Arc;

const VAULT_JSON: &str = include_str!("../../../fixtures/Vault.json");

fn deposited(at: Address, block: u64) -> RawLog {
    let mut log = RawLog::new(
        at,
        vec![
            fingerprint::event_topic("Deposited(address,uint256,uint8)"),
            B256::left_padding_from(Address::repeat_byte(0x42).as_slice()),
        ],
        DynSolValue::Tuple(vec![
            DynSolValue::Uint(U256::from(250), 256),
            DynSolValue::Uint(U256::from(1), 8),
        ])
        .abi_encode_params(),
    );
    log.block_number = Some(block);
    log
}

async fn run(label: &str, vault: ContractArtifact, chain: MemoryProvider, at: Address) -> Result<()> {
    println!("\n─── {label} ───────────────────────────────────────");
    let wire = chainlens_decoder::for_project(Arc::new(chain), &[vault])?;

    let mut input = fingerprint::selector("open((uint256,uint8,address))").to_vec();
    input.extend(
        DynSolValue::Tuple(vec![DynSolValue::Tuple(vec![
            DynSolValue::Uint(U256::from(10), 256),
            DynSolValue::Uint(U256::from(1), 8),
            DynSolValue::Address(Address::repeat_byte(0x42)),
        ])])
        .abi_encode_params(),
    );
    let tx = wire.decode_transaction(&RawTransaction::call(at, input)).await?;
    println!("tx:   {}", serde_json::to_string_pretty(&tx.decodings)?);

    let mut events = wire.events(EventOptions::new().name("Deposited").extra(true));
    while let Some(log) = events.next().await {
        let log = log?;
        println!(
            "log:  block {:?} {} ({:?})",
            log.log.block_number,
            log.name().unwrap_or("<unknown>"),
            log.mode()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(&LogConfig::default());

    let vault = ContractArtifact::from_json(VAULT_JSON)?;
    let at = Address::repeat_byte(0xaa);
    let chain = MemoryProvider::new(1);
    chain.add_log(deposited(at, 1));
    chain.add_log(deposited(at, 2));

    run("full mode", vault.clone(), chain.clone(), at).await?;
    run("AST withheld", vault.without_ast(), chain, at).await?;
    Ok(())
}
