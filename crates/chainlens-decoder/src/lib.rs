//! # chainlens-decoder
//!
//! Three decoders of increasing reach over the same project:
//!
//! - [`WireDecoder`] decodes transactions and logs against every supplied
//!   contract
//! - [`ContractDecoder`] adds one contract's storage layout, return values
//!   and reverts
//! - [`ContractInstanceDecoder`] adds an address: state variables, watched
//!   mapping entries and code matching
//!
//! Each tier holds the one below and forwards its operations, so anything a
//! wire decoder can decode an instance decoder can too.
//!
//! ```no_run
//! # async fn demo(provider: std::sync::Arc<dyn chainlens_core::Provider>,
//! #               vault: chainlens_core::ContractArtifact) -> Result<(), chainlens_core::DecoderError> {
//! let instance = chainlens_decoder::for_deployed_artifact(provider, vault, &[]).await?;
//! for (name, value) in instance.variables().await? {
//!     println!("{name}: {value:?}");
//! }
//! # Ok(()) }
//! ```

pub mod config;
pub mod contract;
pub mod instance;
pub mod watch;
pub mod wire;

pub use config::{DecoderConfig, EventOptions};
pub use contract::{ContractDecoder, DecoderState};
pub use instance::ContractInstanceDecoder;
pub use watch::WatchSet;
pub use wire::WireDecoder;

use alloy_primitives::Address;
use chainlens_core::{ContractArtifact, DecoderError, Provider};
use std::sync::Arc;

/// Project-scope decoder over `artifacts`.
pub fn for_project(
    provider: Arc<dyn Provider>,
    artifacts: &[ContractArtifact],
) -> Result<WireDecoder, DecoderError> {
    WireDecoder::new(provider, artifacts, DecoderConfig::default())
}

/// Like [`for_project`], with explicit settings.
pub fn for_project_with_config(
    provider: Arc<dyn Provider>,
    artifacts: &[ContractArtifact],
    config: DecoderConfig,
) -> Result<WireDecoder, DecoderError> {
    WireDecoder::new(provider, artifacts, config)
}

/// `artifact` first, then every related artifact not already named.
fn with_related(artifact: ContractArtifact, related: &[ContractArtifact]) -> Vec<ContractArtifact> {
    let mut all = vec![artifact];
    for r in related {
        if all.iter().all(|a| a.contract_name != r.contract_name) {
            all.push(r.clone());
        }
    }
    all
}

/// Contract decoder for `artifact`; `related` supplies the other contracts
/// its types and calls may refer to.
pub async fn for_artifact(
    provider: Arc<dyn Provider>,
    artifact: ContractArtifact,
    related: &[ContractArtifact],
) -> Result<ContractDecoder, DecoderError> {
    let name = artifact.contract_name.clone();
    for_project(provider, &with_related(artifact, related))?
        .for_contract(&name)
        .await
}

/// Contract decoder for the artifact named `name` among `artifacts`.
pub async fn for_contract(
    provider: Arc<dyn Provider>,
    name: &str,
    artifacts: &[ContractArtifact],
) -> Result<ContractDecoder, DecoderError> {
    if artifacts.iter().all(|a| a.contract_name != name) {
        return Err(DecoderError::UnknownContract { name: name.into() });
    }
    for_project(provider, artifacts)?.for_contract(name).await
}

/// Instance decoder for `artifact` at its deployed address on the
/// provider's network.
pub async fn for_deployed_artifact(
    provider: Arc<dyn Provider>,
    artifact: ContractArtifact,
    related: &[ContractArtifact],
) -> Result<ContractInstanceDecoder, DecoderError> {
    for_artifact(provider, artifact, related)
        .await?
        .for_instance(None)
        .await
}

pub async fn for_deployed_contract(
    provider: Arc<dyn Provider>,
    name: &str,
    artifacts: &[ContractArtifact],
) -> Result<ContractInstanceDecoder, DecoderError> {
    for_contract(provider, name, artifacts)
        .await?
        .for_instance(None)
        .await
}

/// Instance decoder for `artifact` at `address`.
pub async fn for_artifact_at(
    provider: Arc<dyn Provider>,
    artifact: ContractArtifact,
    address: Address,
    related: &[ContractArtifact],
) -> Result<ContractInstanceDecoder, DecoderError> {
    for_artifact(provider, artifact, related)
        .await?
        .for_instance(Some(address))
        .await
}

pub async fn for_contract_at(
    provider: Arc<dyn Provider>,
    name: &str,
    address: Address,
    artifacts: &[ContractArtifact],
) -> Result<ContractInstanceDecoder, DecoderError> {
    for_contract(provider, name, artifacts)
        .await?
        .for_instance(Some(address))
        .await
}
