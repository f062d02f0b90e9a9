//! # inspect_storage
//!
//! Reads the state variables of a deployed `Vault` from an in-memory chain,
//! including one watched mapping entry.
//!
//! Run with:
//! ```sh
//! cargo run --bin inspect_storage
//!
//! # Follow slot reads:
//! RUST_LOG=info,chainlens_evm=trace cargo run --bin inspect_storage
//! ```

use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use chainlens_core::{ContractArtifact, MappingKey, MemoryProvider};
use chainlens_evm::fingerprint;
use chainlens_observability::{init_tracing, LogConfig};
use std::sync::Arc;
use tracing::info;

const VAULT_JSON: &str = include_str!("../../../fixtures/Vault.json");

fn word(v: U256) -> B256 {
    B256::from(v.to_be_bytes::<32>())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(&LogConfig::default().with_component("chainlens-decoder", "debug"));

    let vault = ContractArtifact::from_json(VAULT_JSON)?;
    let at = vault
        .deployed_address(1)
        .ok_or_else(|| anyhow::anyhow!("Vault has no mainnet deployment"))?;
    let holder = Address::repeat_byte(0x42);

    // ── chain state ──────────────────────────────────────────────────────────
    let chain = MemoryProvider::new(1);
    chain.set_storage(at, U256::from(1), word(U256::from(0x0907)));
    chain.set_storage(at, U256::from(2), word(U256::from(1_000_000)));
    let mut name = [0u8; 32];
    name[..4].copy_from_slice(b"main");
    name[31] = 8;
    chain.set_storage(at, U256::from(3), B256::from(name));
    let holder_word = B256::left_padding_from(holder.as_slice());
    chain.set_storage(
        at,
        fingerprint::mapping_slot(holder_word.as_slice(), U256::from(4)),
        word(U256::from(250)),
    );
    chain.set_storage(at, U256::from(9), word(U256::from(1)));

    // ── decode ───────────────────────────────────────────────────────────────
    let instance = chainlens_decoder::for_deployed_artifact(Arc::new(chain), vault, &[]).await?;
    instance.watch_mapping_key("balances", [MappingKey::Address(holder)])?;

    println!("Vault @ {}", instance.address());
    println!("═══════════════════════════════════════════════════════");
    for (name, value) in instance.variables().await? {
        println!("{name:<12} {}", serde_json::to_string(&value)?);
    }

    let entry = instance
        .mapping_entry("balances", [MappingKey::Address(holder)])
        .await?;
    info!(?entry, "balances[holder]");
    Ok(())
}
