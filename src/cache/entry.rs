//! Cache entries and staleness.

use crate::error::FetchError;
use serde_json::Value;

/// Result of the last fetches for one key.
///
/// `committed_at == 0` means the key was never fetched successfully (or was invalidated).
#[derive(Debug, Clone, Default)]
pub struct CacheEntry {
    pub data: Option<Value>,
    pub error: Option<FetchError>,
    pub committed_at: u64,
}

impl CacheEntry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_committed(&self) -> bool {
        self.committed_at != 0
    }

    pub fn is_stale(&self, now: u64, stale_ms: u64) -> bool {
        self.committed_at == 0 || now.saturating_sub(self.committed_at) > stale_ms
    }

    /// Fresh and not in an error state: a navigation can reuse it without fetching.
    pub fn is_reusable(&self, now: u64, stale_ms: u64) -> bool {
        self.error.is_none() && !self.is_stale(now, stale_ms)
    }
}
