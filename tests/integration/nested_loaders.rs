//! Integration tests for loaders that call other loaders from inside their bodies

use crate::integration::test_utils::{harness, route, to, FetchCounter, Harness};
use navloader::{cache_key, DataLoader, KeyFilter, LoaderDefinition, LoaderId, NavigationTarget};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    id: String,
    name: String,
}

struct Fixture {
    h: Harness,
    list: DataLoader<Vec<Item>>,
    detail: DataLoader<Item>,
    list_calls: FetchCounter,
    detail_calls: FetchCounter,
}

fn fixture() -> Fixture {
    let h = harness();
    let list_calls = FetchCounter::new();
    let detail_calls = FetchCounter::new();

    let counter = list_calls.clone();
    let list = h.layer.define(LoaderDefinition::new(
        "items",
        |_: &NavigationTarget| cache_key!["items"],
        move |_| {
            let counter = counter.clone();
            async move {
                counter.hit();
                tokio::task::yield_now().await;
                anyhow::Ok(vec![
                    Item {
                        id: "0".into(),
                        name: "zero".into(),
                    },
                    Item {
                        id: "1".into(),
                        name: "one".into(),
                    },
                ])
            }
        },
    ));

    let counter = detail_calls.clone();
    let items = list.clone();
    let detail = h.layer.define(LoaderDefinition::new(
        "item",
        |to: &NavigationTarget| cache_key!["items", to.param("id")],
        move |to: Arc<NavigationTarget>| {
            let counter = counter.clone();
            let items = items.clone();
            async move {
                counter.hit();
                let id = to.param("id").unwrap_or_default().to_string();
                let list = items.load().await?;
                list.into_iter()
                    .find(|item| item.id == id)
                    .ok_or_else(|| anyhow::anyhow!("Item {} not found", id))
            }
        },
    ));

    Fixture {
        h,
        list,
        detail,
        list_calls,
        detail_calls,
    }
}

fn item_target(id: &str, f: &Fixture) -> NavigationTarget {
    to(&format!("/items/{}", id), &[route("item", "/items/:id", &[&f.detail])]).with_param("id", id)
}

#[tokio::test]
async fn test_nested_loader_resolves_for_the_same_navigation() {
    let f = fixture();
    let record = f.h.coordinator.navigate(item_target("0", &f)).await;

    assert!(record.is_committed());
    assert_eq!(f.list_calls.count(), 1);
    assert_eq!(f.detail_calls.count(), 1);
    assert_eq!(f.detail.data().get().unwrap().name, "zero");
    assert_eq!(f.list.data().get().unwrap().len(), 2);
    assert_eq!(
        f.h.layer.dependencies().dependencies_of(&LoaderId::new("item")),
        vec![LoaderId::new("items")]
    );
}

#[tokio::test]
async fn test_sibling_details_share_the_cached_list() {
    let f = fixture();
    f.h.coordinator.navigate(item_target("0", &f)).await;
    f.h.coordinator.navigate(item_target("1", &f)).await;

    assert_eq!(f.list_calls.count(), 1);
    assert_eq!(f.detail_calls.count(), 2);
    assert_eq!(f.detail.data().get().unwrap().name, "one");
}

#[tokio::test]
async fn test_prefix_invalidation_refetches_list_once() {
    let f = fixture();
    f.h.coordinator.navigate(item_target("0", &f)).await;

    let invalidated = f
        .h
        .layer
        .cache()
        .invalidate_matching_and_refetch(&KeyFilter::Prefix(cache_key!["items"]))
        .await;

    assert_eq!(invalidated.len(), 2);
    assert_eq!(f.list_calls.count(), 2);
    assert_eq!(f.detail_calls.count(), 2);
    assert!(!f.h.layer.cache().is_stale(&cache_key!["items"], 1_000));
}

#[tokio::test]
async fn test_nested_failure_fails_the_parent() {
    let f = fixture();
    let record = f.h.coordinator.navigate(item_target("9", &f)).await;

    let err = record.outcome(f.detail.id()).unwrap().error().unwrap();
    assert!(err.to_string().contains("Item 9 not found"), "{err}");
    assert!(f.detail.error().get().is_some());
    assert!(f.list.error().get().is_none());
}

#[tokio::test]
async fn test_rejected_navigation_rolls_back_nested_loaders() {
    let f = fixture();
    f.h.coordinator.navigate(item_target("0", &f)).await;
    f.h.coordinator
        .add_guard(navloader::guard_fn(|_| navloader::GuardDecision::Reject("stop".into())));

    f.h.clock.advance(f.h.layer.settings().default_stale_ms + 1);
    let record = f.h.coordinator.navigate(item_target("1", &f)).await;

    assert!(record.is_rolled_back());
    assert_eq!(f.list_calls.count(), 2);
    assert_eq!(f.detail.data().get().unwrap().name, "zero");
    assert_eq!(f.detail.bound_key(), Some(cache_key!["items", "0"]));
    assert_eq!(f.list.data().get().unwrap().len(), 2);
}

#[tokio::test]
async fn test_exact_list_invalidation_costs_one_list_fetch() {
    let f = fixture();
    f.h.coordinator.navigate(item_target("0", &f)).await;
    assert_eq!(f.list_calls.count(), 1);

    let invalidated = f
        .h
        .layer
        .cache()
        .invalidate_matching_and_refetch(&KeyFilter::Exact(cache_key!["items"]))
        .await;
    assert_eq!(invalidated.len(), 1);

    let record = f.h.coordinator.navigate(item_target("0", &f)).await;
    assert!(record.is_committed());
    assert_eq!(f.list_calls.count(), 2);
    assert_eq!(f.detail_calls.count(), 1);
    assert_eq!(f.detail.data().get().unwrap().name, "zero");
    assert!(!f.h.layer.cache().is_stale(&cache_key!["items"], 1_000));
}

#[tokio::test]
async fn test_loaders_waiting_on_each_other_fail_instead_of_hanging() {
    let h = harness();
    let slot_a: Arc<parking_lot::Mutex<Option<DataLoader<u32>>>> = Arc::default();
    let slot_b: Arc<parking_lot::Mutex<Option<DataLoader<u32>>>> = Arc::default();

    let other = slot_b.clone();
    let a = h.layer.define(LoaderDefinition::new(
        "a",
        |_: &NavigationTarget| cache_key!["a"],
        move |_| {
            let other = other.lock().clone();
            async move {
                tokio::task::yield_now().await;
                match other {
                    Some(b) => anyhow::Ok(b.load().await? + 1),
                    None => anyhow::Ok(0),
                }
            }
        },
    ));
    let other = slot_a.clone();
    let b = h.layer.define(LoaderDefinition::new(
        "b",
        |_: &NavigationTarget| cache_key!["b"],
        move |_| {
            let other = other.lock().clone();
            async move {
                tokio::task::yield_now().await;
                match other {
                    Some(a) => anyhow::Ok(a.load().await? + 1),
                    None => anyhow::Ok(0),
                }
            }
        },
    ));
    *slot_a.lock() = Some(a.clone());
    *slot_b.lock() = Some(b.clone());

    let routes = [route("pair", "/pair", &[&a, &b])];
    let record = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        h.coordinator.navigate(to("/pair", &routes)),
    )
    .await
    .expect("navigation settles");

    assert_eq!(record.failures().count(), 2);
    for id in [a.id(), b.id()] {
        let err = record.outcome(id).unwrap().error().unwrap();
        assert!(err.to_string().contains("cycle"), "{err}");
    }
    assert_eq!(h.layer.dependencies().active_waits(), 0);

    slot_a.lock().take();
    slot_b.lock().take();
}
