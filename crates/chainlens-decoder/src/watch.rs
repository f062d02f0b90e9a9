//! Registered mapping keys of one contract instance.
//!
//! Mapping key spaces cannot be enumerated from storage, so an instance only
//! reads the entries a caller asked for. Each registered [`KeyPath`] carries
//! the entry slots derived when it was registered. Paths are compared by
//! their hashed key bytes; registering the same path twice keeps a single
//! copy.

use chainlens_evm::{KeyPath, NormalizedKey};
use indexmap::IndexMap;
use std::sync::RwLock;

/// Key paths per variable. Mutations are exclusive, reads see a snapshot.
#[derive(Debug, Default)]
pub struct WatchSet {
    paths: RwLock<IndexMap<String, Vec<KeyPath>>>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` under `variable`. Returns `false` if it was already there.
    pub fn insert(&self, variable: &str, path: KeyPath) -> bool {
        let mut guard = self.paths.write().unwrap_or_else(|e| e.into_inner());
        let entry = guard.entry(variable.to_string()).or_default();
        if entry.iter().any(|p| p.same_keys(path.keys())) {
            return false;
        }
        entry.push(path);
        true
    }

    /// Drop `prefix` and every path extending it. Returns the number removed.
    pub fn remove(&self, variable: &str, prefix: &[NormalizedKey]) -> usize {
        let mut guard = self.paths.write().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = guard.get_mut(variable) else {
            return 0;
        };
        let before = entry.len();
        entry.retain(|p| !p.starts_with(prefix));
        let removed = before - entry.len();
        if entry.is_empty() {
            guard.shift_remove(variable);
        }
        removed
    }

    /// Snapshot of the paths registered under `variable`.
    pub fn paths(&self, variable: &str) -> Vec<KeyPath> {
        self.paths
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(variable)
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.paths
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
