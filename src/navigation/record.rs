//! Navigation records: the report produced for each navigation attempt.

use crate::loader::LoadOutcome;
use crate::navigation::NavigationTarget;
use crate::types::{LoaderId, NavigationId};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackReason {
    /// A guard refused the navigation.
    Rejected(String),
    /// Cancelled explicitly through the coordinator.
    Cancelled,
    /// A newer navigation started before this one resolved.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationState {
    Pending,
    Resolving,
    Committed,
    RolledBack(RollbackReason),
}

#[derive(Debug, Clone)]
pub struct NavigationRecord {
    pub id: NavigationId,
    pub target: Arc<NavigationTarget>,
    pub state: NavigationState,
    pub cancelled: bool,
    pub initial: bool,
    pub loader_results: BTreeMap<LoaderId, LoadOutcome>,
}

impl NavigationRecord {
    pub fn new(id: NavigationId, target: Arc<NavigationTarget>, initial: bool) -> Self {
        Self {
            id,
            target,
            state: NavigationState::Pending,
            cancelled: false,
            initial,
            loader_results: BTreeMap::new(),
        }
    }

    pub fn is_committed(&self) -> bool {
        self.state == NavigationState::Committed
    }

    pub fn is_rolled_back(&self) -> bool {
        matches!(self.state, NavigationState::RolledBack(_))
    }

    pub fn outcome(&self, loader: &LoaderId) -> Option<&LoadOutcome> {
        self.loader_results.get(loader)
    }

    /// Loaders that failed during this navigation.
    pub fn failures(&self) -> impl Iterator<Item = (&LoaderId, &LoadOutcome)> {
        self.loader_results
            .iter()
            .filter(|(_, outcome)| outcome.is_failure())
    }
}
