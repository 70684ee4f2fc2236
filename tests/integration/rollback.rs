//! Integration tests for rolling loader views back when a navigation does not commit

use crate::integration::test_utils::{harness, query_loader, route, to, FetchCounter};
use navloader::{
    cache_key, guard_fn, GuardDecision, LoaderDefinition, NavigationState, NavigationTarget,
    RollbackReason,
};
use std::sync::Arc;

#[tokio::test]
async fn test_rejected_navigation_restores_previous_data() {
    let h = harness();
    let counter = FetchCounter::new();
    let loader = query_loader(&h.layer, "search", "", &counter);
    let routes = [route("search", "/fetch", &[&loader])];
    h.coordinator.add_guard(guard_fn(|record| {
        if record.target.query_value("q") == Some("2") {
            GuardDecision::Reject("blocked".to_string())
        } else {
            GuardDecision::Proceed
        }
    }));

    h.coordinator.navigate(to("/fetch?q=1", &routes)).await;
    assert_eq!(loader.data().get().as_deref(), Some("1"));

    let record = h.coordinator.navigate(to("/fetch?q=2", &routes)).await;
    assert_eq!(
        record.state,
        NavigationState::RolledBack(RollbackReason::Rejected("blocked".to_string()))
    );
    assert_eq!(counter.count(), 2);
    assert_eq!(loader.data().get().as_deref(), Some("1"));
    assert_eq!(loader.bound_key(), Some(cache_key!["1"]));

    // the fetched entry stays cached even though the view was rolled back
    let entry = h.layer.cache().get(&cache_key!["2"]).unwrap();
    assert_eq!(entry.data, Some(serde_json::json!("2")));
}

#[tokio::test]
async fn test_rollback_on_same_key_restores_data_after_refetch() {
    let h = harness();
    let version = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let source = version.clone();
    let loader = h.layer.define(LoaderDefinition::new(
        "versioned",
        |_: &NavigationTarget| cache_key!["id"],
        move |_| {
            let v = source.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            async move { anyhow::Ok(v) }
        },
    ));
    let routes = [route("page", "/fetch", &[&loader])];
    h.coordinator.add_guard(guard_fn(|record| {
        if record.target.query_value("v") == Some("2") {
            GuardDecision::Reject("no".into())
        } else {
            GuardDecision::Proceed
        }
    }));

    h.coordinator.navigate(to("/fetch?v=1", &routes)).await;
    assert_eq!(loader.data().get(), Some(1));

    h.clock.advance(h.layer.settings().default_stale_ms + 1);
    let record = h.coordinator.navigate(to("/fetch?v=2", &routes)).await;
    assert!(record.is_rolled_back());
    assert_eq!(version.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(loader.data().get(), Some(1));
    assert!(loader.error().get().is_none());
    assert!(!loader.is_loading().get());
}

#[tokio::test]
async fn test_failed_loader_rolls_back_when_guard_rejects_failures() {
    let h = harness();
    let loader = h.layer.define(LoaderDefinition::new(
        "item",
        |to: &NavigationTarget| cache_key!["item", to.query_value("id")],
        |to: Arc<NavigationTarget>| async move {
            match to.query_value("id") {
                Some("missing") => anyhow::bail!("Not Found"),
                id => anyhow::Ok(id.unwrap_or_default().to_string()),
            }
        },
    ));
    let routes = [route("item", "/item", &[&loader])];
    h.coordinator.add_guard(guard_fn(|record| match record.failures().next() {
        Some((loader, _)) => GuardDecision::Reject(format!("{} failed", loader)),
        None => GuardDecision::Proceed,
    }));

    h.coordinator.navigate(to("/item?id=a", &routes)).await;
    let record = h.coordinator.navigate(to("/item?id=missing", &routes)).await;

    assert_eq!(
        record.state,
        NavigationState::RolledBack(RollbackReason::Rejected("item failed".to_string()))
    );
    assert_eq!(loader.data().get().as_deref(), Some("a"));
    assert!(loader.error().get().is_none());
    assert_eq!(loader.bound_key(), Some(cache_key!["item", "a"]));
}

#[tokio::test]
async fn test_failure_without_guard_commits_with_error() {
    let h = harness();
    let loader = h.layer.define(LoaderDefinition::new(
        "item",
        |_: &NavigationTarget| cache_key!["item"],
        |_| async { Err::<String, _>(anyhow::anyhow!("Not Found")) },
    ));
    let routes = [route("item", "/item", &[&loader])];

    let record = h.coordinator.navigate(to("/item", &routes)).await;
    assert!(record.is_committed());
    assert_eq!(record.failures().count(), 1);
    assert_eq!(loader.data().get(), None);
    assert_eq!(
        loader.error().get().unwrap().to_string(),
        "Fetch failed: Not Found"
    );
}
