//! Navigation guards, consulted after loaders settle and before commit.

use crate::navigation::NavigationRecord;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Reject(String),
}

#[async_trait]
pub trait NavigationGuard: Send + Sync {
    /// Decide whether a resolved navigation may commit. Loader results are available on
    /// the record, so a guard can treat loader failures as fatal if it wants to.
    async fn before_resolve(&self, record: &NavigationRecord) -> GuardDecision;
}

/// Guard from a plain closure.
pub struct GuardFn<F>(F);

pub fn guard_fn<F>(f: F) -> GuardFn<F>
where
    F: Fn(&NavigationRecord) -> GuardDecision + Send + Sync,
{
    GuardFn(f)
}

#[async_trait]
impl<F> NavigationGuard for GuardFn<F>
where
    F: Fn(&NavigationRecord) -> GuardDecision + Send + Sync,
{
    async fn before_resolve(&self, record: &NavigationRecord) -> GuardDecision {
        (self.0)(record)
    }
}
