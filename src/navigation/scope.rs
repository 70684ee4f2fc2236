//! Shared per-navigation state visible to every loader invoked for it.

use crate::loader::RouteLoader;
use crate::navigation::NavigationTarget;
use crate::types::{LoaderId, NavigationId};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle on one navigation attempt, carried by every context frame of that navigation.
///
/// Loaders invoked for the navigation (directly or nested inside other loaders) enlist here
/// so the coordinator can commit or roll all of them back. Work the navigation does not wait
/// for (lazy loaders and everything they call) runs under an untracked child scope: it still
/// counts as activated by the navigation but never takes part in commit or rollback.
pub struct NavigationScope {
    id: NavigationId,
    target: Arc<NavigationTarget>,
    initial: bool,
    tracked: bool,
    cancelled: AtomicBool,
    participants: Mutex<Vec<Arc<dyn RouteLoader>>>,
    activated: Arc<Mutex<Vec<Arc<dyn RouteLoader>>>>,
}

impl NavigationScope {
    pub(crate) fn new(id: NavigationId, target: Arc<NavigationTarget>, initial: bool) -> Arc<Self> {
        Arc::new(Self {
            id,
            target,
            initial,
            tracked: true,
            cancelled: AtomicBool::new(false),
            participants: Mutex::new(Vec::new()),
            activated: Arc::default(),
        })
    }

    /// Same navigation, but loaders invoked under the returned scope are not enlisted.
    pub(crate) fn untracked(&self) -> Arc<Self> {
        Arc::new(Self {
            id: self.id,
            target: self.target.clone(),
            initial: self.initial,
            tracked: false,
            cancelled: AtomicBool::new(self.is_cancelled()),
            participants: Mutex::new(Vec::new()),
            activated: self.activated.clone(),
        })
    }

    /// Scope for work outside of any navigation: manual reloads and invalidation refetches.
    pub fn detached(target: Arc<NavigationTarget>) -> Arc<Self> {
        Self::new(NavigationId::DETACHED, target, false)
    }

    pub fn id(&self) -> NavigationId {
        self.id
    }

    pub fn target(&self) -> &Arc<NavigationTarget> {
        &self.target
    }

    /// First navigation handled by its coordinator.
    pub fn is_initial(&self) -> bool {
        self.initial
    }

    pub fn is_detached(&self) -> bool {
        self.id.is_detached()
    }

    /// True when loaders invoked under this scope are committed or rolled back with it.
    pub fn is_tracked(&self) -> bool {
        self.tracked && !self.is_detached()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Register a loader for commit/rollback. Untracked and detached scopes ignore it.
    pub(crate) fn enlist(&self, loader: Arc<dyn RouteLoader>) {
        if !self.is_tracked() {
            return;
        }
        push_unique(&mut self.participants.lock(), loader);
    }

    pub(crate) fn participants(&self) -> Vec<Arc<dyn RouteLoader>> {
        self.participants.lock().clone()
    }

    /// Record that the navigation put `loader` to use, tracked or not.
    pub(crate) fn activate(&self, loader: Arc<dyn RouteLoader>) {
        if self.is_detached() {
            return;
        }
        push_unique(&mut self.activated.lock(), loader);
    }

    pub(crate) fn is_activated(&self, loader: &LoaderId) -> bool {
        self.activated.lock().iter().any(|l| l.id() == loader)
    }

    pub(crate) fn activated(&self) -> Vec<Arc<dyn RouteLoader>> {
        self.activated.lock().clone()
    }
}

fn push_unique(loaders: &mut Vec<Arc<dyn RouteLoader>>, loader: Arc<dyn RouteLoader>) {
    if !loaders.iter().any(|l| l.id() == loader.id()) {
        loaders.push(loader);
    }
}

impl fmt::Debug for NavigationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationScope")
            .field("id", &self.id)
            .field("path", &self.target.path)
            .field("initial", &self.initial)
            .field("tracked", &self.tracked)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
