//! Loader Runtime
//!
//! A data loader couples a key function and a query body with reactive view state. Loaders
//! are attached to route records and invoked by the navigation coordinator, or called from
//! inside another loader's body with [`DataLoader::load`]. Fetch results live in the shared
//! query cache; a loader only keeps the view of the key it is currently bound to.

use crate::error::LoaderError;
use crate::navigation::NavigationScope;
use crate::types::{LoaderId, NavigationId};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

pub mod definition;
mod runtime;
mod view;

pub use definition::{KeyFn, LoaderDefinition, LoaderRegistration, QueryFn};
pub use runtime::DataLoader;

/// Data a loader can produce. Stored in the cache as JSON and decoded on read.
pub trait LoaderData: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> LoaderData for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// How one loader resolved for one navigation.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// This invocation started the fetch.
    Fetched,
    /// Joined a fetch already in flight for the same key.
    Attached,
    /// Fresh (or freshly hydrated) cache entry reused without fetching.
    Cached,
    /// Lazy loader: started, not awaited by the navigation.
    Deferred,
    Failed(LoaderError),
}

impl LoadOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, LoadOutcome::Failed(_))
    }

    pub fn error(&self) -> Option<&LoaderError> {
        match self {
            LoadOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// True when a fetch ran (or was joined) for this invocation.
    pub fn hit_network(&self) -> bool {
        matches!(self, LoadOutcome::Fetched | LoadOutcome::Attached)
    }
}

/// Object-safe face of a loader, as seen by route records and the coordinator.
#[async_trait]
pub trait RouteLoader: Send + Sync {
    fn id(&self) -> &LoaderId;

    /// Lazy loaders are not awaited by navigations and are never rolled back.
    fn is_lazy(&self) -> bool;

    /// Resolve the loader for `navigation`. Failures are reported in the outcome and in the
    /// loader's error cell, never raised.
    async fn invoke(&self, navigation: Arc<NavigationScope>) -> LoadOutcome;

    /// Make the view produced for `navigation` the committed one.
    fn commit(&self, navigation: NavigationId);

    /// Restore the view that was committed before `navigation` began.
    fn rollback(&self, navigation: NavigationId);

    /// The committed navigation no longer uses this loader: stop following its key.
    fn deactivate(&self);
}
