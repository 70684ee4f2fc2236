//! Loader invocation: cache lookup, fetch deduplication, nested calls and view updates.

use crate::cache::{CacheEntry, FlightHandle, QueryCache, Subscription};
use crate::context::ContextFrame;
use crate::error::{FetchError, LoaderError};
use crate::key::CacheKey;
use crate::layer::DataLayer;
use crate::loader::view::LoaderView;
use crate::loader::{LoadOutcome, LoaderData, LoaderRegistration, RouteLoader};
use crate::navigation::{NavigationScope, NavigationTarget};
use crate::reactive::Cell;
use crate::types::{LoaderId, NavigationId};
use async_trait::async_trait;
use futures::future::FutureExt;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle on a defined loader. Clones share view state.
pub struct DataLoader<T> {
    inner: Arc<LoaderInner<T>>,
}

impl<T> Clone for DataLoader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct LoaderInner<T> {
    registration: LoaderRegistration<T>,
    layer: DataLayer,
    view: LoaderView<T>,
}

/// Result of one run: the key it resolved and how.
struct Invocation {
    key: CacheKey,
    outcome: LoadOutcome,
}

impl<T: LoaderData> DataLoader<T> {
    pub(crate) fn new(registration: LoaderRegistration<T>, layer: DataLayer) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                registration,
                layer,
                view: LoaderView::new(),
            }),
        }
    }

    pub fn id(&self) -> &LoaderId {
        &self.inner.registration.id
    }

    pub fn registration(&self) -> &LoaderRegistration<T> {
        &self.inner.registration
    }

    /// Data for the bound key, or the previous data while a new key loads.
    pub fn data(&self) -> &Cell<Option<T>> {
        &self.inner.view.data
    }

    pub fn error(&self) -> &Cell<Option<LoaderError>> {
        &self.inner.view.error
    }

    pub fn is_loading(&self) -> &Cell<bool> {
        &self.inner.view.is_loading
    }

    /// Cache key the loader currently shows.
    pub fn bound_key(&self) -> Option<CacheKey> {
        self.inner.view.bound_key()
    }

    /// True while the loader listens to its bound key (and so is refetched on invalidation).
    pub fn is_subscribed(&self) -> bool {
        self.inner.view.is_subscribed()
    }

    /// Stop listening to the bound key. The cells keep their last values.
    pub fn unbind(&self) {
        self.inner.view.unbind();
    }

    /// Shareable trait object for attaching this loader to route records.
    pub fn as_route_loader(&self) -> Arc<dyn RouteLoader> {
        Arc::new(self.clone())
    }

    /// Resolve this loader from inside another loader's body, for the navigation that body
    /// runs for, and return its data.
    ///
    /// Fails with [`ContextError::NoActiveLoader`](crate::error::ContextError) when called
    /// outside of any loader.
    pub async fn load(&self) -> Result<T, LoaderError> {
        let parent = self.inner.layer.context().top()?;
        let invocation = self.inner.run(parent.navigation.clone()).await?;
        if let LoadOutcome::Failed(err) = invocation.outcome {
            return Err(err);
        }
        self.inner.read(&invocation.key)
    }

    /// Refetch the bound key now, ignoring freshness and any fetch already in flight.
    pub async fn reload(&self) -> Result<(), LoaderError> {
        let inner = &self.inner;
        let (key, target) = inner
            .view
            .bound()
            .ok_or_else(|| LoaderError::NotBound(self.id().clone()))?;
        info!(loader = %self.id(), key = %key, "Reloading");
        let navigation = NavigationScope::detached(target);
        let handle = inner.start_fetch(&navigation, &key, true);
        inner.await_flight(&navigation, handle).await
    }
}

impl<T: LoaderData> LoaderInner<T> {
    fn cache(&self) -> &Arc<QueryCache> {
        self.layer.cache()
    }

    async fn run(
        self: &Arc<Self>,
        navigation: Arc<NavigationScope>,
    ) -> Result<Invocation, LoaderError> {
        let id = &self.registration.id;
        let stack = self.layer.context();
        if stack.contains_loader(id) {
            let err = LoaderError::Cycle {
                loader: id.clone(),
                chain: stack.loader_chain(),
            };
            warn!(loader = %id, error = %err, "Loader dependency cycle");
            self.view.fail(err.clone());
            return Err(err);
        }

        // Nothing waits for a lazy loader, so neither it nor what it calls is tracked.
        let navigation = if self.registration.lazy && navigation.is_tracked() {
            navigation.untracked()
        } else {
            navigation
        };

        let key = self.registration.key_for(navigation.target());
        let parent = stack.top().ok();
        if let Some(parent) = &parent {
            self.layer.dependencies().record(&parent.loader_id, id);
        }

        let track = navigation.is_tracked();
        let this: Arc<dyn RouteLoader> = Arc::new(DataLoader {
            inner: self.clone(),
        });
        navigation.activate(this.clone());
        if track {
            navigation.enlist(this);
        }

        let cache = self.cache();
        let entry = cache.ensure(&key);
        self.bind(&navigation, &key, track, &entry);

        let in_flight = cache.attach(&key);
        if in_flight.is_none() && (cache.take_hydrated(&key) || self.is_reusable(&entry)) {
            debug!(
                loader = %id,
                key = %key,
                navigation = %navigation.id(),
                "Using cached data"
            );
            self.view.set_loading(navigation.id(), false);
            return Ok(Invocation {
                key,
                outcome: LoadOutcome::Cached,
            });
        }

        // The parent body blocks on this flight until it settles.
        let _wait = match &parent {
            Some(parent) => Some(
                self.layer
                    .dependencies()
                    .begin_wait(&parent.loader_id, id)
                    .map_err(|chain| {
                        let err = LoaderError::Cycle {
                            loader: id.clone(),
                            chain,
                        };
                        warn!(loader = %id, error = %err, "Loaders wait on each other");
                        err
                    })?,
            ),
            None => None,
        };

        let handle = match in_flight {
            Some(handle) => handle,
            None => self.start_fetch(&navigation, &key, false),
        };

        let attached = handle.is_attached();
        let outcome = match self.await_flight(&navigation, handle).await {
            Ok(()) if attached => LoadOutcome::Attached,
            Ok(()) => LoadOutcome::Fetched,
            Err(err) => LoadOutcome::Failed(err),
        };
        Ok(Invocation { key, outcome })
    }

    fn is_reusable(&self, entry: &CacheEntry) -> bool {
        entry.is_reusable(self.cache().now_millis(), self.registration.stale_ms)
    }

    fn bind(
        self: &Arc<Self>,
        navigation: &NavigationScope,
        key: &CacheKey,
        track: bool,
        entry: &CacheEntry,
    ) {
        self.view
            .begin(navigation, key, track, entry, || self.subscribe(key));
        self.register_refetch(key, navigation.target().clone());
    }

    fn subscribe(self: &Arc<Self>, key: &CacheKey) -> Subscription {
        let weak = Arc::downgrade(self);
        let bound = key.clone();
        self.cache().subscribe(key, move |entry| {
            if let Some(inner) = weak.upgrade() {
                inner.view.apply(&bound, entry);
            }
        })
    }

    fn register_refetch(self: &Arc<Self>, key: &CacheKey, target: Arc<NavigationTarget>) {
        let weak = Arc::downgrade(self);
        let refetch_key = key.clone();
        self.cache().register_refetch(
            key,
            Arc::new(move || {
                let weak = weak.clone();
                let key = refetch_key.clone();
                let target = target.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.refresh(key, target).await;
                    }
                }
                .boxed()
            }),
        );
    }

    /// Refetch after invalidation, if the loader still shows `key` and nobody refreshed it.
    async fn refresh(self: Arc<Self>, key: CacheKey, target: Arc<NavigationTarget>) {
        if self.view.bound_key().as_ref() != Some(&key) {
            return;
        }
        let navigation = NavigationScope::detached(target);
        let handle = match self.cache().attach(&key) {
            Some(handle) => handle,
            None => {
                if self.is_reusable(&self.cache().ensure(&key)) {
                    return;
                }
                self.start_fetch(&navigation, &key, false)
            }
        };
        debug!(loader = %self.registration.id, key = %key, "Refetching invalidated key");
        let _ = self.await_flight(&navigation, handle).await;
    }

    /// Run the query body under a context frame for this loader and hand it to the cache.
    fn start_fetch(
        &self,
        navigation: &Arc<NavigationScope>,
        key: &CacheKey,
        exclusive: bool,
    ) -> FlightHandle {
        let stack = self.layer.context();
        let frame = ContextFrame::new(
            navigation.clone(),
            self.registration.id.clone(),
            stack.current(),
        );
        let query = self.registration.query_fn.clone();
        let target = navigation.target().clone();
        let body = stack.scope(frame, async move {
            let data = query(target).await.map_err(FetchError::new)?;
            serde_json::to_value(&data).map_err(|err| FetchError::new(err.into()))
        });
        debug!(
            loader = %self.registration.id,
            key = %key,
            navigation = %navigation.id(),
            exclusive,
            "Fetching"
        );
        if exclusive {
            self.cache().fetch_exclusive(key, body)
        } else {
            self.cache().fetch(key, body)
        }
    }

    async fn await_flight(
        &self,
        navigation: &NavigationScope,
        handle: FlightHandle,
    ) -> Result<(), LoaderError> {
        self.view.set_loading(navigation.id(), true);
        let result = handle.wait().await;
        self.view.set_loading(navigation.id(), false);
        result.map(|_| ()).map_err(LoaderError::Fetch)
    }

    fn read(&self, key: &CacheKey) -> Result<T, LoaderError> {
        let entry = self
            .cache()
            .get(key)
            .ok_or_else(|| LoaderError::Empty(key.canonical()))?;
        if let Some(err) = entry.error {
            return Err(LoaderError::Fetch(err));
        }
        let data = entry
            .data
            .ok_or_else(|| LoaderError::Empty(key.canonical()))?;
        serde_json::from_value(data).map_err(|err| LoaderError::Decode {
            key: key.canonical(),
            message: err.to_string(),
        })
    }
}

#[async_trait]
impl<T: LoaderData> RouteLoader for DataLoader<T> {
    fn id(&self) -> &LoaderId {
        &self.inner.registration.id
    }

    fn is_lazy(&self) -> bool {
        self.inner.registration.lazy
    }

    async fn invoke(&self, navigation: Arc<NavigationScope>) -> LoadOutcome {
        match self.inner.run(navigation).await {
            Ok(invocation) => invocation.outcome,
            Err(err) => LoadOutcome::Failed(err),
        }
    }

    fn commit(&self, navigation: NavigationId) {
        if self.inner.view.commit(navigation) {
            debug!(loader = %self.id(), navigation = %navigation, "Committed loader view");
        }
    }

    fn rollback(&self, navigation: NavigationId) {
        let inner = &self.inner;
        if inner.view.rollback(navigation, |key| inner.subscribe(key)) {
            debug!(loader = %self.id(), navigation = %navigation, "Rolled back loader view");
        }
    }

    fn deactivate(&self) {
        if self.is_subscribed() {
            debug!(loader = %self.id(), "Loader left the active route");
            self.unbind();
        }
    }
}

impl<T> fmt::Debug for DataLoader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoader")
            .field("registration", &self.inner.registration)
            .finish()
    }
}
