//! Integration tests for cache reuse across navigations

use crate::integration::test_utils::{harness, query_loader, route, to, FetchCounter};
use navloader::{cache_key, LoadOutcome, LoaderSettings, NavigationState};

#[tokio::test]
async fn test_fresh_entries_are_reused_across_navigations() {
    let h = harness();
    let counter = FetchCounter::new();
    let search = query_loader(&h.layer, "search", "results:", &counter);
    let routes = [route("search", "/search", &[&search])];

    let record = h.coordinator.navigate(to("/search?q=1", &routes)).await;
    assert_eq!(record.state, NavigationState::Committed);
    assert!(matches!(
        record.outcome(search.id()),
        Some(LoadOutcome::Fetched)
    ));
    assert_eq!(search.data().get().as_deref(), Some("results:1"));

    let record = h.coordinator.navigate(to("/search?q=1", &routes)).await;
    assert!(matches!(
        record.outcome(search.id()),
        Some(LoadOutcome::Cached)
    ));

    h.coordinator.navigate(to("/search?q=2", &routes)).await;
    assert_eq!(search.data().get().as_deref(), Some("results:2"));

    h.coordinator.navigate(to("/search?q=1", &routes)).await;
    assert_eq!(search.data().get().as_deref(), Some("results:1"));

    assert_eq!(counter.count(), 2);
    assert!(!search.is_loading().get());
}

#[tokio::test]
async fn test_unrelated_query_params_do_not_refetch() {
    let h = harness();
    let counter = FetchCounter::new();
    let search = query_loader(&h.layer, "search", "", &counter);
    let routes = [route("search", "/search", &[&search])];

    h.coordinator.navigate(to("/search?q=1&v=1", &routes)).await;
    assert_eq!(counter.count(), 1);

    let record = h.coordinator.navigate(to("/search?q=1&v=2", &routes)).await;
    assert!(matches!(
        record.outcome(search.id()),
        Some(LoadOutcome::Cached)
    ));
    assert_eq!(counter.count(), 1);

    h.coordinator.navigate(to("/search?q=2&v=2", &routes)).await;
    assert_eq!(counter.count(), 2);

    h.coordinator.navigate(to("/search?q=1&v=3", &routes)).await;
    assert_eq!(counter.count(), 2);
    assert_eq!(search.data().get().as_deref(), Some("1"));
}

#[tokio::test]
async fn test_stale_entries_are_refetched() {
    let h = harness();
    let counter = FetchCounter::new();
    let search = query_loader(&h.layer, "search", "", &counter);
    let routes = [route("search", "/search", &[&search])];

    h.coordinator.navigate(to("/search?q=1", &routes)).await;
    h.clock.advance(LoaderSettings::default().default_stale_ms);
    h.coordinator.navigate(to("/search?q=1", &routes)).await;
    assert_eq!(counter.count(), 1);

    h.clock.advance(1);
    h.coordinator.navigate(to("/search?q=1", &routes)).await;
    assert_eq!(counter.count(), 2);
}

#[tokio::test]
async fn test_loaders_sharing_a_key_fetch_once() {
    let h = harness();
    let counter = FetchCounter::new();
    let first = query_loader(&h.layer, "first", "", &counter);
    let second = query_loader(&h.layer, "second", "", &counter);
    let routes = [route("page", "/page", &[&first, &second])];

    let record = h.coordinator.navigate(to("/page?q=shared", &routes)).await;
    assert!(record.is_committed());
    assert_eq!(counter.count(), 1);
    assert_eq!(first.data().get(), second.data().get());

    let outcomes: Vec<_> = [first.id(), second.id()]
        .into_iter()
        .map(|id| record.outcome(id).unwrap().hit_network())
        .collect();
    assert_eq!(outcomes, vec![true, true]);
}

#[tokio::test]
async fn test_zero_stale_window_refetches_every_time() {
    let h = harness();
    let counter = FetchCounter::new();
    let search = query_loader(&h.layer, "search", "", &counter);
    let routes = [route("search", "/search", &[&search])];

    let settings = LoaderSettings {
        default_stale_ms: 0,
        ..LoaderSettings::default()
    };
    let eager = crate::integration::test_utils::harness_with(settings);
    let eager_counter = FetchCounter::new();
    let eager_search = query_loader(&eager.layer, "search", "", &eager_counter);
    let eager_routes = [route("search", "/search", &[&eager_search])];

    for _ in 0..3 {
        h.coordinator.navigate(to("/search?q=1", &routes)).await;
        eager.clock.advance(1);
        eager
            .coordinator
            .navigate(to("/search?q=1", &eager_routes))
            .await;
    }
    assert_eq!(counter.count(), 1);
    assert_eq!(eager_counter.count(), 3);
    assert!(h.layer.cache().contains(&cache_key!["1"]));
}
