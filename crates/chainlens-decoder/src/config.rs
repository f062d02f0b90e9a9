//! Decoder and event-query configuration.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Settings shared by every decoder built from one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Upper bound on storage array elements (and bytes/string words)
    /// materialised per value. Longer values decode to an error result.
    #[serde(default = "default_max_array_length")]
    pub max_array_length: usize,
    /// Network id for deployed-address lookups; the provider's chain id
    /// when unset.
    #[serde(default)]
    pub network_id: Option<u64>,
    /// Addresses whose code identification is remembered; the oldest entry
    /// is evicted first.
    #[serde(default = "default_code_cache_size")]
    pub code_cache_size: usize,
}

fn default_max_array_length() -> usize { 1_024 }

fn default_code_cache_size() -> usize { 4_096 }

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_array_length: default_max_array_length(),
            network_id: None,
            code_cache_size: default_code_cache_size(),
        }
    }
}

/// Filters for an event query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOptions {
    /// Only events with this name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub from_block: Option<u64>,
    #[serde(default)]
    pub to_block: Option<u64>,
    /// Only logs emitted by this address.
    #[serde(default)]
    pub address: Option<Address>,
    /// Also yield logs no supplied contract recognises, undecoded.
    #[serde(default)]
    pub extra: bool,
}

impl EventOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = Some(block);
        self
    }

    pub fn to_block(mut self, block: u64) -> Self {
        self.to_block = Some(block);
        self
    }

    pub fn address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn extra(mut self, extra: bool) -> Self {
        self.extra = extra;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_fields_default_when_missing() {
        let config: DecoderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, DecoderConfig::default());
        assert_eq!(config.max_array_length, 1_024);
        assert_eq!(config.code_cache_size, 4_096);

        let config: DecoderConfig = serde_json::from_str(r#"{"network_id": 5}"#).unwrap();
        assert_eq!(config.network_id, Some(5));
    }

    #[test]
    fn event_options_parse_camel_case() {
        let opts: EventOptions =
            serde_json::from_str(r#"{"name": "Deposited", "fromBlock": 3, "extra": true}"#).unwrap();
        assert_eq!(opts, EventOptions::new().name("Deposited").from_block(3).extra(true));
    }
}
