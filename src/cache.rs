//! Query Cache
//!
//! Key-addressed store of fetch results shared by every loader of a data layer. The cache
//! owns entries, in-flight markers, change listeners and invalidation. Entries are never
//! evicted; they live until the cache is dropped or explicitly cleared.
//!
//! Listeners are invoked synchronously after the internal lock is released, so a write is
//! visible to all readers before any listener runs.

use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, FetchError};
use crate::key::{CacheKey, CanonicalKey, KeyFilter};
use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

pub mod entry;
pub mod flight;
pub mod snapshot;

pub use entry::CacheEntry;
pub use flight::{FlightHandle, FlightOutcome};
pub use snapshot::{HydrationSnapshot, SnapshotEntry};

use flight::Flight;

type Listener = Arc<dyn Fn(&CacheEntry) + Send + Sync>;

/// Re-runs the fetch for a key; registered by the loader currently bound to it.
pub type Refetcher = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct Slot {
    key: CacheKey,
    entry: CacheEntry,
    listeners: Vec<(u64, Listener)>,
    refetch: Option<Refetcher>,
    /// Entry came from a snapshot and has not been fetched or used since.
    hydrated: bool,
}

impl Slot {
    fn new(key: CacheKey) -> Self {
        Self {
            key,
            entry: CacheEntry::empty(),
            listeners: Vec::new(),
            refetch: None,
            hydrated: false,
        }
    }
}

#[derive(Default)]
struct CacheState {
    slots: HashMap<CanonicalKey, Slot>,
    flights: HashMap<CanonicalKey, Flight>,
}

impl CacheState {
    fn slot_mut(&mut self, key: &CacheKey) -> &mut Slot {
        self.slots
            .entry(key.canonical())
            .or_insert_with(|| Slot::new(key.clone()))
    }
}

/// Pending listener calls collected under the lock, run after it is released.
struct Notification {
    entry: CacheEntry,
    listeners: Vec<Listener>,
}

impl Notification {
    fn collect(slot: &Slot) -> Option<Self> {
        if slot.listeners.is_empty() {
            return None;
        }
        Some(Self {
            entry: slot.entry.clone(),
            listeners: slot.listeners.iter().map(|(_, l)| l.clone()).collect(),
        })
    }

    fn deliver(self) {
        for listener in self.listeners {
            listener(&self.entry);
        }
    }
}

pub struct QueryCache {
    state: Mutex<CacheState>,
    clock: Arc<dyn Clock>,
    next_flight: AtomicU64,
    next_listener: AtomicU64,
}

impl QueryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            clock,
            next_flight: AtomicU64::new(1),
            next_listener: AtomicU64::new(1),
        }
    }

    pub fn shared(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self::new(clock))
    }

    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Read an entry. Never creates one.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.state
            .lock()
            .slots
            .get(&key.canonical())
            .map(|slot| slot.entry.clone())
    }

    /// Return the entry for `key`, creating an empty one if needed.
    pub fn ensure(&self, key: &CacheKey) -> CacheEntry {
        self.state.lock().slot_mut(key).entry.clone()
    }

    /// Store fetched data: clears the error and stamps `committed_at`.
    pub fn set(&self, key: &CacheKey, data: Value) {
        let now = self.clock.now_millis();
        let notification = {
            let mut state = self.state.lock();
            let slot = state.slot_mut(key);
            slot.entry.data = Some(data);
            slot.entry.error = None;
            slot.entry.committed_at = now;
            slot.hydrated = false;
            Notification::collect(slot)
        };
        debug!(key = %key, committed_at = now, "Cache entry set");
        if let Some(notification) = notification {
            notification.deliver();
        }
    }

    /// Serialize and store typed data.
    pub fn set_data<T: Serialize>(&self, key: &CacheKey, data: &T) -> Result<(), CacheError> {
        let value = serde_json::to_value(data)?;
        self.set(key, value);
        Ok(())
    }

    /// Record a failed fetch. Prior data stays visible and `committed_at` is untouched.
    pub fn set_error(&self, key: &CacheKey, error: FetchError) {
        let notification = {
            let mut state = self.state.lock();
            let slot = state.slot_mut(key);
            slot.entry.error = Some(error);
            slot.hydrated = false;
            Notification::collect(slot)
        };
        debug!(key = %key, "Cache entry error recorded");
        if let Some(notification) = notification {
            notification.deliver();
        }
    }

    pub fn is_stale(&self, key: &CacheKey, stale_ms: u64) -> bool {
        let now = self.clock.now_millis();
        self.state
            .lock()
            .slots
            .get(&key.canonical())
            .map_or(true, |slot| slot.entry.is_stale(now, stale_ms))
    }

    /// Consume the hydration marker of `key`. Returns true once for an entry loaded from a
    /// snapshot that has not been fetched, failed or invalidated since.
    pub fn take_hydrated(&self, key: &CacheKey) -> bool {
        let mut state = self.state.lock();
        match state.slots.get_mut(&key.canonical()) {
            Some(slot) if slot.hydrated && slot.entry.has_data() => {
                slot.hydrated = false;
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().slots.contains_key(&key.canonical())
    }

    pub fn len(&self) -> usize {
        self.state.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().slots.is_empty()
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        self.state
            .lock()
            .slots
            .values()
            .map(|slot| slot.key.clone())
            .collect()
    }

    /// Drop every entry, flight and listener. Intended for test isolation.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.state.lock());
        // dropped outside the lock: a flight may own the last handle on a loader
        drop(removed);
    }

    /// Listen for writes to `key`. The listener is removed when the subscription drops.
    pub fn subscribe<F>(self: &Arc<Self>, key: &CacheKey, listener: F) -> Subscription
    where
        F: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.state
            .lock()
            .slot_mut(key)
            .listeners
            .push((id, Arc::new(listener)));
        Subscription {
            cache: Arc::downgrade(self),
            key: key.canonical(),
            id,
        }
    }

    /// Number of active listeners on `key`.
    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.state
            .lock()
            .slots
            .get(&key.canonical())
            .map_or(0, |slot| slot.listeners.len())
    }

    fn unsubscribe(&self, key: &CanonicalKey, id: u64) {
        if let Some(slot) = self.state.lock().slots.get_mut(key) {
            slot.listeners.retain(|(listener_id, _)| *listener_id != id);
        }
    }

    /// Register how invalidation should refetch `key`. Replaces any previous refetcher.
    pub fn register_refetch(&self, key: &CacheKey, refetch: Refetcher) {
        self.state.lock().slot_mut(key).refetch = Some(refetch);
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.state.lock().flights.contains_key(&key.canonical())
    }

    /// Join the outstanding fetch for `key`, if any.
    pub fn attach(&self, key: &CacheKey) -> Option<FlightHandle> {
        self.state
            .lock()
            .flights
            .get(&key.canonical())
            .map(|flight| FlightHandle::new(flight.future.clone(), flight.id, true))
    }

    /// Start a fetch for `key`, or join the one already in flight.
    ///
    /// The fetch writes its outcome with [`set`](Self::set) or
    /// [`set_error`](Self::set_error) and then clears its in-flight marker.
    pub fn fetch<F>(self: &Arc<Self>, key: &CacheKey, fetch: F) -> FlightHandle
    where
        F: Future<Output = FlightOutcome> + Send + 'static,
    {
        let mut state = self.state.lock();
        if let Some(flight) = state.flights.get(&key.canonical()) {
            debug!(key = %key, flight_id = flight.id, "Attached to in-flight fetch");
            return FlightHandle::new(flight.future.clone(), flight.id, true);
        }
        let (handle, _) = self.start_flight(&mut state, key, fetch.boxed());
        handle
    }

    /// Start a fetch for `key` even if one is already in flight. The new flight replaces
    /// the marker; the older one settles without clearing it.
    pub fn fetch_exclusive<F>(self: &Arc<Self>, key: &CacheKey, fetch: F) -> FlightHandle
    where
        F: Future<Output = FlightOutcome> + Send + 'static,
    {
        let (handle, replaced) = {
            let mut state = self.state.lock();
            self.start_flight(&mut state, key, fetch.boxed())
        };
        if let Some(replaced) = replaced {
            debug!(key = %key, flight_id = replaced.id, "Superseded in-flight fetch");
        }
        handle
    }

    fn start_flight(
        self: &Arc<Self>,
        state: &mut CacheState,
        key: &CacheKey,
        fetch: BoxFuture<'static, FlightOutcome>,
    ) -> (FlightHandle, Option<Flight>) {
        let flight_id = self.next_flight.fetch_add(1, Ordering::Relaxed);
        let cache = Arc::downgrade(self);
        let flight_key = key.clone();
        let future = async move {
            let outcome = fetch.await;
            if let Some(cache) = cache.upgrade() {
                match &outcome {
                    Ok(data) => cache.set(&flight_key, data.clone()),
                    Err(error) => {
                        warn!(key = %flight_key, error = %error, "Fetch failed");
                        cache.set_error(&flight_key, error.clone());
                    }
                }
                cache.finish_flight(&flight_key.canonical(), flight_id);
            }
            outcome
        }
        .boxed()
        .shared();

        state.slot_mut(key);
        let replaced = state.flights.insert(
            key.canonical(),
            Flight {
                id: flight_id,
                future: future.clone(),
            },
        );
        debug!(key = %key, flight_id, "Started fetch");
        (FlightHandle::new(future, flight_id, false), replaced)
    }

    fn finish_flight(&self, key: &CanonicalKey, flight_id: u64) {
        let finished = {
            let mut state = self.state.lock();
            if state.flights.get(key).map(|f| f.id) == Some(flight_id) {
                state.flights.remove(key)
            } else {
                None
            }
        };
        drop(finished);
    }

    /// Mark every matching entry stale (data is kept) and spawn refetches for the ones that
    /// currently have subscribers. Dependent keys are not invalidated transitively.
    pub fn invalidate<P>(&self, predicate: P) -> BTreeSet<CanonicalKey>
    where
        P: Fn(&CacheKey) -> bool,
    {
        let (keys, refetches) = self.mark_stale(predicate);
        if !refetches.is_empty() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    for refetch in refetches {
                        handle.spawn(refetch());
                    }
                }
                Err(_) => warn!(
                    count = refetches.len(),
                    "No async runtime available; invalidated keys will refetch on next access"
                ),
            }
        }
        keys
    }

    /// Like [`invalidate`](Self::invalidate) but waits for the triggered refetches.
    pub async fn invalidate_and_refetch<P>(&self, predicate: P) -> BTreeSet<CanonicalKey>
    where
        P: Fn(&CacheKey) -> bool,
    {
        let (keys, refetches) = self.mark_stale(predicate);
        join_all(refetches.iter().map(|refetch| refetch())).await;
        keys
    }

    /// Invalidate by [`KeyFilter`], e.g. every key under `["items"]`.
    pub fn invalidate_matching(&self, filter: &KeyFilter) -> BTreeSet<CanonicalKey> {
        self.invalidate(|key| filter.matches(key))
    }

    pub async fn invalidate_matching_and_refetch(
        &self,
        filter: &KeyFilter,
    ) -> BTreeSet<CanonicalKey> {
        self.invalidate_and_refetch(|key| filter.matches(key)).await
    }

    fn mark_stale<P>(&self, predicate: P) -> (BTreeSet<CanonicalKey>, Vec<Refetcher>)
    where
        P: Fn(&CacheKey) -> bool,
    {
        let mut keys = BTreeSet::new();
        let mut refetches = Vec::new();
        let mut state = self.state.lock();
        for (canonical, slot) in state.slots.iter_mut() {
            if !predicate(&slot.key) {
                continue;
            }
            slot.entry.committed_at = 0;
            slot.hydrated = false;
            keys.insert(canonical.clone());
            if !slot.listeners.is_empty() {
                if let Some(refetch) = &slot.refetch {
                    refetches.push(refetch.clone());
                }
            }
        }
        debug!(
            invalidated = keys.len(),
            refetching = refetches.len(),
            "Invalidated cache entries"
        );
        (keys, refetches)
    }

    /// Snapshot every successful entry for hydration elsewhere.
    pub fn serialize(&self) -> HydrationSnapshot {
        let state = self.state.lock();
        let mut snapshot = HydrationSnapshot::new();
        for (canonical, slot) in &state.slots {
            if slot.entry.error.is_some() {
                continue;
            }
            if let Some(data) = &slot.entry.data {
                snapshot.insert(canonical.as_str(), data.clone(), slot.entry.committed_at);
            }
        }
        snapshot
    }

    /// Load a snapshot. Keys already present are left untouched and entries carrying an
    /// error are skipped. Returns the number of entries created.
    pub fn hydrate(&self, snapshot: &HydrationSnapshot) -> Result<usize, CacheError> {
        let mut parsed = Vec::with_capacity(snapshot.len());
        for (canonical, entry) in snapshot.iter() {
            if entry.error().is_some() {
                continue;
            }
            parsed.push((CacheKey::parse(canonical)?, entry));
        }

        let mut notifications = Vec::new();
        let mut created = 0;
        {
            let mut state = self.state.lock();
            for (key, entry) in parsed {
                let canonical = key.canonical();
                if state
                    .slots
                    .get(&canonical)
                    .map_or(false, |slot| slot.entry.has_data() || slot.entry.is_committed())
                {
                    continue;
                }
                let slot = state.slot_mut(&key);
                slot.entry = CacheEntry {
                    data: Some(entry.data().clone()),
                    error: None,
                    committed_at: entry.committed_at(),
                };
                slot.hydrated = true;
                created += 1;
                notifications.extend(Notification::collect(slot));
            }
        }
        debug!(entries = created, "Hydrated query cache");
        for notification in notifications {
            notification.deliver();
        }
        Ok(created)
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("QueryCache")
            .field("entries", &state.slots.len())
            .field("in_flight", &state.flights.len())
            .finish()
    }
}

/// Active cache listener; unsubscribes on drop.
pub struct Subscription {
    cache: Weak<QueryCache>,
    key: CanonicalKey,
    id: u64,
}

impl Subscription {
    pub fn key(&self) -> &CanonicalKey {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.unsubscribe(&self.key, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
