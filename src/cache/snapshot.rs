//! Hydration snapshot format
//!
//! `{ "<canonical key>": [data, error, committedAtMs] }`, JSON-serializable and versionless.
//! Callers are responsible for only hydrating compatible data shapes.

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// `[data, error, committed_at]`. Serialized entries always carry a `null` error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry(pub Value, pub Option<Value>, pub u64);

impl SnapshotEntry {
    pub fn data(&self) -> &Value {
        &self.0
    }

    pub fn error(&self) -> Option<&Value> {
        self.1.as_ref()
    }

    pub fn committed_at(&self) -> u64 {
        self.2
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HydrationSnapshot {
    entries: BTreeMap<String, SnapshotEntry>,
}

impl HydrationSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, canonical_key: impl Into<String>, data: Value, committed_at: u64) {
        self.entries
            .insert(canonical_key.into(), SnapshotEntry(data, None, committed_at));
    }

    pub fn get(&self, canonical_key: &str) -> Option<&SnapshotEntry> {
        self.entries.get(canonical_key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SnapshotEntry)> {
        self.entries.iter()
    }

    pub fn to_json(&self) -> Result<String, CacheError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CacheError> {
        Ok(serde_json::from_str(json)?)
    }
}
