//! Data layer: the cache, context stack and settings shared by a set of loaders.

use crate::cache::QueryCache;
use crate::clock::{Clock, SystemClock};
use crate::config::LoaderSettings;
use crate::context::ContextStack;
use crate::dependencies::DependencyGraph;
use crate::loader::{DataLoader, LoaderData, LoaderDefinition};
use crate::navigation::NavigationCoordinator;
use std::sync::Arc;
use tracing::debug;

/// Shared services for loaders. Cheap to clone; clones refer to the same cache and stack.
#[derive(Debug, Clone)]
pub struct DataLayer {
    cache: Arc<QueryCache>,
    context: Arc<ContextStack>,
    dependencies: Arc<DependencyGraph>,
    settings: Arc<LoaderSettings>,
}

impl DataLayer {
    pub fn new(settings: LoaderSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: LoaderSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: QueryCache::shared(clock),
            context: ContextStack::shared(),
            dependencies: Arc::new(DependencyGraph::new()),
            settings: Arc::new(settings),
        }
    }

    /// Resolve `definition` against the layer settings and create its loader.
    pub fn define<T: LoaderData>(&self, definition: LoaderDefinition<T>) -> DataLoader<T> {
        let registration = definition.register(&self.settings);
        debug!(
            loader = %registration.id,
            lazy = registration.lazy,
            stale_ms = registration.stale_ms,
            "Defined loader"
        );
        DataLoader::new(registration, self.clone())
    }

    /// Coordinator driving navigations against this layer.
    pub fn coordinator(&self) -> NavigationCoordinator {
        NavigationCoordinator::new(self.clone())
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn context(&self) -> &Arc<ContextStack> {
        &self.context
    }

    pub fn dependencies(&self) -> &Arc<DependencyGraph> {
        &self.dependencies
    }

    pub fn settings(&self) -> &LoaderSettings {
        &self.settings
    }
}

impl Default for DataLayer {
    fn default() -> Self {
        Self::new(LoaderSettings::default())
    }
}
