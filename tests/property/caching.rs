//! Property-based tests for fetch deduplication and invalidation

use navloader::{
    cache_key, CacheKey, DataLayer, KeyFilter, LoaderDefinition, LoaderSettings, ManualClock,
    NavigationTarget, QueryCache, RouteRecord,
};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// With the clock frozen, every distinct key is fetched exactly once no matter how the
/// navigations revisit it.
#[test]
fn test_fresh_keys_are_fetched_once_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &proptest::collection::vec(0u8..6, 1..20),
            |queries| {
                let rt = runtime();
                let fetches = rt.block_on(async {
                    let clock = Arc::new(ManualClock::default());
                    let layer = DataLayer::with_clock(LoaderSettings::default(), clock);
                    let coordinator = layer.coordinator();
                    let count = Arc::new(AtomicUsize::new(0));
                    let counter = count.clone();
                    let loader = layer.define(LoaderDefinition::new(
                        "search",
                        |to: &NavigationTarget| cache_key![to.query_value("q")],
                        move |to: Arc<NavigationTarget>| {
                            counter.fetch_add(1, Ordering::SeqCst);
                            async move { anyhow::Ok(to.query_value("q").unwrap_or("").to_string()) }
                        },
                    ));
                    let route = Arc::new(
                        RouteRecord::new("search", "/search")
                            .with_shared_loader(loader.as_route_loader()),
                    );

                    for q in &queries {
                        let target = NavigationTarget::from_location(&format!("/search?q={}", q))
                            .with_match(route.clone());
                        let record = coordinator.navigate(target).await;
                        assert!(record.is_committed());
                        assert_eq!(loader.data().get(), Some(q.to_string()));
                    }
                    count.load(Ordering::SeqCst)
                });

                let distinct: BTreeSet<_> = queries.iter().collect();
                prop_assert_eq!(fetches, distinct.len());
                Ok(())
            },
        )
        .unwrap();
}

/// Prefix invalidation marks exactly the keys under the prefix and keeps their data.
#[test]
fn test_prefix_invalidation_is_exact_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &proptest::collection::vec((any::<bool>(), 0i64..50), 0..30),
            |entries| {
                let cache = QueryCache::shared(Arc::new(ManualClock::default()));
                let keys: Vec<CacheKey> = entries
                    .iter()
                    .map(|(items, n)| cache_key![if *items { "items" } else { "users" }, *n])
                    .collect();
                for key in &keys {
                    cache.set(key, serde_json::json!(key.len()));
                }

                let invalidated =
                    cache.invalidate_matching(&KeyFilter::Prefix(cache_key!["items"]));

                for key in &keys {
                    let under_prefix = key.starts_with(&cache_key!["items"]);
                    prop_assert_eq!(invalidated.contains(&key.canonical()), under_prefix);
                    prop_assert_eq!(cache.is_stale(key, u64::MAX / 2), under_prefix);
                    prop_assert!(cache.get(key).and_then(|entry| entry.data).is_some());
                }
                Ok(())
            },
        )
        .unwrap();
}
