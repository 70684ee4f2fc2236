//! Navigation Coordinator
//!
//! Drives one navigation at a time through its loaders: invoke every non-lazy loader of the
//! matched routes concurrently, wait for all of them, consult the guards, then commit or roll
//! back every loader that took part. A navigation that starts while another is resolving
//! supersedes it; the older one ends rolled back. Once a navigation commits, loaders the
//! previously committed one used and this one does not are deactivated.

use crate::layer::DataLayer;
use crate::loader::{LoadOutcome, RouteLoader};
use crate::navigation::{
    GuardDecision, NavigationGuard, NavigationRecord, NavigationScope, NavigationState,
    NavigationTarget, RollbackReason,
};
use crate::types::NavigationId;
use futures::future::join_all;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct NavigationCoordinator {
    layer: DataLayer,
    guards: Mutex<Vec<Arc<dyn NavigationGuard>>>,
    active: Mutex<Option<Arc<NavigationScope>>>,
    committed: Mutex<Option<Arc<NavigationScope>>>,
    started: AtomicBool,
}

impl NavigationCoordinator {
    pub fn new(layer: DataLayer) -> Self {
        Self {
            layer,
            guards: Mutex::new(Vec::new()),
            active: Mutex::new(None),
            committed: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    pub fn layer(&self) -> &DataLayer {
        &self.layer
    }

    /// Guards run after every loader has resolved, in registration order.
    pub fn add_guard<G: NavigationGuard + 'static>(&self, guard: G) {
        self.guards.lock().push(Arc::new(guard));
    }

    /// Navigation currently resolving, if any.
    pub fn active(&self) -> Option<NavigationId> {
        self.active.lock().as_ref().map(|scope| scope.id())
    }

    /// Cancel the resolving navigation. It rolls back once its loaders settle.
    pub fn cancel_active(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(scope) => {
                scope.cancel();
                true
            }
            None => false,
        }
    }

    /// Navigate to `target` and report how every loader resolved.
    pub async fn navigate(&self, target: NavigationTarget) -> NavigationRecord {
        let target = Arc::new(target);
        let initial = !self.started.swap(true, Ordering::SeqCst);
        let scope = NavigationScope::new(NavigationId::next(), target.clone(), initial);

        if let Some(previous) = self.active.lock().replace(scope.clone()) {
            debug!(navigation = %previous.id(), by = %scope.id(), "Navigation superseded");
            previous.cancel();
        }

        let mut record = NavigationRecord::new(scope.id(), target.clone(), initial);
        record.state = NavigationState::Resolving;
        info!(navigation = %scope.id(), path = %target.path, initial, "Navigation started");

        let loaders = target.loaders();
        for loader in &loaders {
            scope.activate(loader.clone());
        }
        let (lazy, eager): (Vec<_>, Vec<_>) =
            loaders.into_iter().partition(|loader| loader.is_lazy());

        for loader in lazy {
            record
                .loader_results
                .insert(loader.id().clone(), LoadOutcome::Deferred);
            self.spawn_lazy(loader, scope.untracked());
        }

        let outcomes = join_all(eager.iter().map(|loader| loader.invoke(scope.clone()))).await;
        for (loader, outcome) in eager.iter().zip(outcomes) {
            if let LoadOutcome::Failed(err) = &outcome {
                warn!(
                    navigation = %scope.id(),
                    loader = %loader.id(),
                    error = %err,
                    "Loader failed"
                );
            }
            record.loader_results.insert(loader.id().clone(), outcome);
        }

        record.state = self.settle(&scope, &record).await;
        record.cancelled = scope.is_cancelled();

        {
            let mut active = self.active.lock();
            if active.as_ref().map(|a| a.id()) == Some(scope.id()) {
                *active = None;
            }
        }

        let participants = scope.participants();
        match &record.state {
            NavigationState::Committed => {
                for loader in &participants {
                    loader.commit(scope.id());
                }
                self.deactivate_left_behind(&scope);
                info!(
                    navigation = %scope.id(),
                    loaders = participants.len(),
                    failures = record.failures().count(),
                    "Navigation committed"
                );
            }
            NavigationState::RolledBack(reason) => {
                for loader in &participants {
                    loader.rollback(scope.id());
                }
                info!(navigation = %scope.id(), reason = ?reason, "Navigation rolled back");
            }
            NavigationState::Pending | NavigationState::Resolving => {}
        }
        record
    }

    /// Decide between commit and rollback once every loader has resolved.
    async fn settle(&self, scope: &NavigationScope, record: &NavigationRecord) -> NavigationState {
        if scope.is_cancelled() {
            let superseded = self.active.lock().as_ref().map(|a| a.id()) != Some(scope.id());
            let reason = if superseded {
                RollbackReason::Superseded
            } else {
                RollbackReason::Cancelled
            };
            return NavigationState::RolledBack(reason);
        }

        let guards = self.guards.lock().clone();
        if guards.is_empty() {
            return NavigationState::Committed;
        }
        for guard in guards {
            if let GuardDecision::Reject(reason) = guard.before_resolve(record).await {
                debug!(navigation = %scope.id(), reason = %reason, "Navigation rejected by guard");
                return NavigationState::RolledBack(RollbackReason::Rejected(reason));
            }
        }
        if scope.is_cancelled() {
            return NavigationState::RolledBack(RollbackReason::Cancelled);
        }
        NavigationState::Committed
    }

    /// Deactivate what the previously committed navigation used and `scope` does not.
    fn deactivate_left_behind(&self, scope: &Arc<NavigationScope>) {
        let previous = self.committed.lock().replace(scope.clone());
        let Some(previous) = previous else {
            return;
        };
        for loader in previous.activated() {
            if !scope.is_activated(loader.id()) {
                loader.deactivate();
            }
        }
    }

    fn spawn_lazy(&self, loader: Arc<dyn RouteLoader>, scope: Arc<NavigationScope>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let id = loader.id().clone();
                    if let LoadOutcome::Failed(err) = loader.invoke(scope).await {
                        warn!(loader = %id, error = %err, "Lazy loader failed");
                    }
                });
            }
            Err(_) => warn!(
                loader = %loader.id(),
                "No async runtime available; lazy loader skipped"
            ),
        }
    }
}

impl fmt::Debug for NavigationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationCoordinator")
            .field("active", &self.active())
            .field("guards", &self.guards.lock().len())
            .finish()
    }
}
