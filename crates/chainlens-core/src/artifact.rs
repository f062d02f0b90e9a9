//! Compiled contract artifacts.
//!
//! The shape follows the Truffle/Hardhat artifact JSON: ABI is required,
//! everything else is optional. AST presence independently toggles full-mode
//! decoding for that contract.

use crate::error::DecoderError;
use alloy_json_abi::JsonAbi;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A deployment record inside an artifact's `networks` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDeployment {
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    pub contract_name: String,
    pub abi: JsonAbi,
    /// Creation bytecode, hex. May contain `__Lib__` link placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytecode: Option<String>,
    /// Runtime bytecode, hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_bytecode: Option<String>,
    /// solc compact AST of the source unit that declares the contract.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ast: Option<serde_json::Value>,
    /// Network id (decimal string) → deployment.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkDeployment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
}

impl ContractArtifact {
    pub fn new(contract_name: impl Into<String>, abi: JsonAbi) -> Self {
        Self {
            contract_name: contract_name.into(),
            abi,
            bytecode: None,
            deployed_bytecode: None,
            ast: None,
            networks: BTreeMap::new(),
            source_path: None,
        }
    }

    /// Parse an artifact from its JSON text.
    pub fn from_json(json: &str) -> Result<Self, DecoderError> {
        serde_json::from_str(json).map_err(|e| DecoderError::Artifact {
            name: "<json>".into(),
            reason: e.to_string(),
        })
    }

    pub fn with_ast(mut self, ast: serde_json::Value) -> Self {
        self.ast = Some(ast);
        self
    }

    pub fn with_bytecode(mut self, creation: impl Into<String>) -> Self {
        self.bytecode = Some(creation.into());
        self
    }

    pub fn with_deployed_bytecode(mut self, runtime: impl Into<String>) -> Self {
        self.deployed_bytecode = Some(runtime.into());
        self
    }

    pub fn with_deployment(mut self, network_id: u64, address: Address) -> Self {
        self.networks.insert(
            network_id.to_string(),
            NetworkDeployment {
                address,
                transaction_hash: None,
            },
        );
        self
    }

    /// Drop the AST, leaving an ABI-only artifact.
    pub fn without_ast(mut self) -> Self {
        self.ast = None;
        self
    }

    pub fn deployed_address(&self, network_id: u64) -> Option<Address> {
        self.networks
            .get(&network_id.to_string())
            .map(|d| d.address)
    }
}
