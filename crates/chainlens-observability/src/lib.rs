//! # chainlens-observability
//!
//! Structured logging for ChainLens.
//!
//! The library crates only emit `tracing` events; binaries call
//! [`init_tracing`] once at startup to route them to stdout as human-readable
//! text or JSON (ELK, Loki, CloudWatch). Levels are configurable per component,
//! e.g. `chainlens_evm=debug` to follow type resolution and storage layout.

pub mod tracing_setup;

pub use tracing_setup::{init_tracing, LogConfig};
