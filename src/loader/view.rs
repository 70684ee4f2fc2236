//! Per-loader view state: reactive cells plus the binding to a cache key.
//!
//! The committed view is what consumers see between navigations. While a navigation is
//! pending the cells already show its data; the view committed before it is kept aside so a
//! rollback can put it back.

use crate::cache::{CacheEntry, Subscription};
use crate::error::LoaderError;
use crate::key::CacheKey;
use crate::loader::LoaderData;
use crate::navigation::{NavigationScope, NavigationTarget};
use crate::reactive::Cell;
use crate::types::NavigationId;
use parking_lot::Mutex;
use std::sync::Arc;

/// View committed before a navigation touched the loader.
struct SavedView<T> {
    key: Option<CacheKey>,
    target: Option<Arc<NavigationTarget>>,
    subscribed: bool,
    data: Option<T>,
    error: Option<LoaderError>,
}

struct Binding<T> {
    key: Option<CacheKey>,
    target: Option<Arc<NavigationTarget>>,
    subscription: Option<Subscription>,
    /// Navigation whose results the cells currently show, until committed.
    pending: Option<NavigationId>,
    saved: Option<(NavigationId, SavedView<T>)>,
}

impl<T> Default for Binding<T> {
    fn default() -> Self {
        Self {
            key: None,
            target: None,
            subscription: None,
            pending: None,
            saved: None,
        }
    }
}

pub(crate) struct LoaderView<T> {
    pub(crate) data: Cell<Option<T>>,
    pub(crate) error: Cell<Option<LoaderError>>,
    pub(crate) is_loading: Cell<bool>,
    binding: Mutex<Binding<T>>,
}

impl<T: LoaderData> LoaderView<T> {
    pub(crate) fn new() -> Self {
        Self {
            data: Cell::new(None),
            error: Cell::new(None),
            is_loading: Cell::new(false),
            binding: Mutex::new(Binding::default()),
        }
    }

    pub(crate) fn bound_key(&self) -> Option<CacheKey> {
        self.binding.lock().key.clone()
    }

    /// Key and target of the current binding.
    pub(crate) fn bound(&self) -> Option<(CacheKey, Arc<NavigationTarget>)> {
        let binding = self.binding.lock();
        match (&binding.key, &binding.target) {
            (Some(key), Some(target)) => Some((key.clone(), target.clone())),
            _ => None,
        }
    }

    pub(crate) fn is_subscribed(&self) -> bool {
        self.binding.lock().subscription.is_some()
    }

    /// Bind to `key` for `navigation` and show what the cache already holds for it.
    ///
    /// With `track` set, the committed view is put aside for rollback. A navigation that
    /// begins while an older one is still pending takes over the older one's saved view.
    pub(crate) fn begin<S>(
        &self,
        navigation: &NavigationScope,
        key: &CacheKey,
        track: bool,
        entry: &CacheEntry,
        subscribe: S,
    ) where
        S: FnOnce() -> Subscription,
    {
        {
            let mut binding = self.binding.lock();
            if track {
                let saved = match binding.saved.take() {
                    Some((_, saved)) => saved,
                    None => SavedView {
                        key: binding.key.clone(),
                        target: binding.target.clone(),
                        subscribed: binding.subscription.is_some(),
                        data: self.data.get(),
                        error: self.error.get(),
                    },
                };
                binding.saved = Some((navigation.id(), saved));
                binding.pending = Some(navigation.id());
            }
            if binding.key.as_ref() != Some(key) || binding.subscription.is_none() {
                binding.subscription = None;
                binding.subscription = Some(subscribe());
                binding.key = Some(key.clone());
            }
            binding.target = Some(navigation.target().clone());
        }
        self.show(key, entry);
    }

    /// Apply a cache write for `key` if the view is still bound to it.
    pub(crate) fn apply(&self, key: &CacheKey, entry: &CacheEntry) {
        if self.binding.lock().key.as_ref() == Some(key) {
            self.show(key, entry);
        }
    }

    /// Without data for the key, the previous data stays visible until the fetch lands.
    fn show(&self, key: &CacheKey, entry: &CacheEntry) {
        if let Some(data) = &entry.data {
            match serde_json::from_value::<T>(data.clone()) {
                Ok(data) => self.data.set(Some(data)),
                Err(err) => {
                    self.error.set(Some(LoaderError::Decode {
                        key: key.canonical(),
                        message: err.to_string(),
                    }));
                    return;
                }
            }
        }
        self.error.set(entry.error.clone().map(LoaderError::Fetch));
    }

    pub(crate) fn fail(&self, error: LoaderError) {
        self.error.set(Some(error));
    }

    /// Loading state is owned by the pending navigation; detached work may only touch it
    /// while nothing is pending.
    pub(crate) fn set_loading(&self, navigation: NavigationId, loading: bool) {
        let owner = self.binding.lock().pending;
        let allowed = match owner {
            Some(pending) => pending == navigation,
            None => true,
        };
        if allowed {
            self.is_loading.set_if_changed(loading);
        }
    }

    pub(crate) fn commit(&self, navigation: NavigationId) -> bool {
        let mut binding = self.binding.lock();
        if binding.pending != Some(navigation) {
            return false;
        }
        binding.pending = None;
        binding.saved = None;
        true
    }

    /// Restore the saved view if it still belongs to `navigation`. A superseded navigation
    /// has handed its saved view to the newer one and leaves the cells alone.
    pub(crate) fn rollback<S>(&self, navigation: NavigationId, resubscribe: S) -> bool
    where
        S: FnOnce(&CacheKey) -> Subscription,
    {
        let (saved, replaced) = {
            let mut binding = self.binding.lock();
            let saved = match binding.saved.take() {
                Some((owner, saved)) if owner == navigation => saved,
                other => {
                    binding.saved = other;
                    return false;
                }
            };
            binding.pending = None;
            let mut replaced = None;
            if binding.key != saved.key || binding.subscription.is_some() != saved.subscribed {
                replaced = binding.subscription.take();
                binding.subscription = match &saved.key {
                    Some(key) if saved.subscribed => Some(resubscribe(key)),
                    _ => None,
                };
                binding.key = saved.key.clone();
            }
            binding.target = saved.target.clone();
            (saved, replaced)
        };
        drop(replaced);
        self.data.set(saved.data);
        self.error.set(saved.error);
        self.is_loading.set_if_changed(false);
        true
    }

    pub(crate) fn unbind(&self) {
        let subscription = self.binding.lock().subscription.take();
        drop(subscription);
    }
}
