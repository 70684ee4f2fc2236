//! Shared test utilities for integration tests
//!
//! Builds data layers on a manual clock, counting query bodies and route records so each
//! test can navigate without repeating the setup.

use navloader::loader::LoaderData;
use navloader::{
    DataLayer, DataLoader, LoaderDefinition, LoaderSettings, ManualClock, NavigationCoordinator,
    NavigationTarget, RouteLoader, RouteRecord,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Global mutex to serialize environment variable access across tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

pub struct Harness {
    pub layer: DataLayer,
    pub clock: Arc<ManualClock>,
    pub coordinator: NavigationCoordinator,
}

pub fn harness() -> Harness {
    harness_with(LoaderSettings::default())
}

pub fn harness_with(settings: LoaderSettings) -> Harness {
    let clock = Arc::new(ManualClock::default());
    let layer = DataLayer::with_clock(settings, clock.clone());
    let coordinator = layer.coordinator();
    Harness {
        layer,
        clock,
        coordinator,
    }
}

/// Counts query body executions.
#[derive(Debug, Clone, Default)]
pub struct FetchCounter(Arc<AtomicUsize>);

impl FetchCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Loader keyed on the `q` query value that returns `"<prefix><q>"`.
pub fn query_loader(
    layer: &DataLayer,
    id: &str,
    prefix: &'static str,
    counter: &FetchCounter,
) -> DataLoader<String> {
    let counter = counter.clone();
    layer.define(LoaderDefinition::new(
        id,
        |to: &NavigationTarget| navloader::cache_key![to.query_value("q")],
        move |to: Arc<NavigationTarget>| {
            let counter = counter.clone();
            async move {
                counter.hit();
                tokio::task::yield_now().await;
                anyhow::Ok(format!("{}{}", prefix, to.query_value("q").unwrap_or("")))
            }
        },
    ))
}

pub fn route<T: LoaderData>(name: &str, path: &str, loaders: &[&DataLoader<T>]) -> Arc<RouteRecord> {
    let record = loaders
        .iter()
        .fold(RouteRecord::new(name, path), |record, loader| {
            record.with_shared_loader(loader.as_route_loader())
        });
    Arc::new(record)
}

pub fn route_with(name: &str, path: &str, loaders: Vec<Arc<dyn RouteLoader>>) -> Arc<RouteRecord> {
    let record = loaders
        .into_iter()
        .fold(RouteRecord::new(name, path), RouteRecord::with_shared_loader);
    Arc::new(record)
}

/// Target for `location` matching `routes`, root first.
pub fn to(location: &str, routes: &[Arc<RouteRecord>]) -> NavigationTarget {
    routes
        .iter()
        .cloned()
        .fold(NavigationTarget::from_location(location), NavigationTarget::with_match)
}

/// Yield to the runtime until `done` holds or the attempts run out.
pub async fn settle_until(mut done: impl FnMut() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
}

/// Run `f` with environment variables set, restoring them afterwards.
pub fn with_env<F, R>(vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let previous: Vec<(String, Option<String>)> = vars
        .iter()
        .map(|(name, _)| (name.to_string(), std::env::var(name).ok()))
        .collect();
    for (name, value) in vars {
        std::env::set_var(name, value);
    }

    let result = f();

    for (name, value) in previous {
        match value {
            Some(value) => std::env::set_var(&name, value),
            None => std::env::remove_var(&name),
        }
    }
    result
}
