//! Identifier types shared by the cache, loaders and navigations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Loader identifier, unique per loader definition within a data layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoaderId(String);

impl LoaderId {
    pub fn new(id: impl Into<String>) -> Self {
        LoaderId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LoaderId {
    fn from(id: &str) -> Self {
        LoaderId::new(id)
    }
}

impl From<String> for LoaderId {
    fn from(id: String) -> Self {
        LoaderId(id)
    }
}

/// Navigation ID for tracking one navigation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NavigationId(u64);

impl NavigationId {
    /// Reserved id for fetches that run outside of any navigation (reloads, refetches).
    pub const DETACHED: NavigationId = NavigationId(0);

    /// Generate the next navigation ID
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        NavigationId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn is_detached(self) -> bool {
        self == Self::DETACHED
    }
}

impl fmt::Display for NavigationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nav-{}", self.0)
    }
}
