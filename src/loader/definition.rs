//! Loader definitions and their registration against a data layer.

use crate::config::LoaderSettings;
use crate::key::CacheKey;
use crate::loader::LoaderData;
use crate::navigation::NavigationTarget;
use crate::types::LoaderId;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Maps a navigation target to the cache key of the data it needs.
pub type KeyFn = Arc<dyn Fn(&NavigationTarget) -> CacheKey + Send + Sync>;

/// Fetches the data for a navigation target.
pub type QueryFn<T> =
    Arc<dyn Fn(Arc<NavigationTarget>) -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// User-facing description of a loader. Options left unset fall back to
/// [`LoaderSettings`] when the loader is defined on a data layer.
pub struct LoaderDefinition<T> {
    id: LoaderId,
    key: KeyFn,
    query: QueryFn<T>,
    lazy: Option<bool>,
    stale_ms: Option<u64>,
}

impl<T: LoaderData> LoaderDefinition<T> {
    pub fn new<K, Q, Fut>(id: impl Into<LoaderId>, key: K, query: Q) -> Self
    where
        K: Fn(&NavigationTarget) -> CacheKey + Send + Sync + 'static,
        Q: Fn(Arc<NavigationTarget>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            id: id.into(),
            key: Arc::new(key),
            query: Arc::new(move |target: Arc<NavigationTarget>| query(target).boxed()),
            lazy: None,
            stale_ms: None,
        }
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = Some(lazy);
        self
    }

    /// Freshness window in milliseconds. `0` refetches on every navigation.
    pub fn stale_ms(mut self, stale_ms: u64) -> Self {
        self.stale_ms = Some(stale_ms);
        self
    }

    pub fn id(&self) -> &LoaderId {
        &self.id
    }

    pub(crate) fn register(self, settings: &LoaderSettings) -> LoaderRegistration<T> {
        LoaderRegistration {
            id: self.id,
            key_fn: self.key,
            query_fn: self.query,
            lazy: self.lazy.unwrap_or(settings.lazy_by_default),
            stale_ms: self.stale_ms.unwrap_or(settings.default_stale_ms),
        }
    }
}

/// A definition with every option resolved.
pub struct LoaderRegistration<T> {
    pub id: LoaderId,
    pub key_fn: KeyFn,
    pub query_fn: QueryFn<T>,
    pub lazy: bool,
    pub stale_ms: u64,
}

impl<T> LoaderRegistration<T> {
    pub fn key_for(&self, target: &NavigationTarget) -> CacheKey {
        (self.key_fn)(target)
    }
}

impl<T> fmt::Debug for LoaderRegistration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderRegistration")
            .field("id", &self.id)
            .field("lazy", &self.lazy)
            .field("stale_ms", &self.stale_ms)
            .finish()
    }
}
