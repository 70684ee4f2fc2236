//! Loader dependency graph
//!
//! Records which loaders called which other loaders from inside their bodies. The recorded
//! edges are diagnostic: invalidation never follows them.
//!
//! Separately, the graph tracks live waits: a body blocked on another loader's fetch. A wait
//! that would close a loop is refused, since none of the fetches on the loop could settle.

use crate::types::LoaderId;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: RwLock<BTreeMap<LoaderId, BTreeSet<LoaderId>>>,
    waits: Mutex<BTreeMap<LoaderId, BTreeMap<LoaderId, usize>>>,
}

/// Live wait of one loader body on another loader's fetch. Released on drop.
#[derive(Debug)]
pub struct WaitGuard {
    graph: Arc<DependencyGraph>,
    waiter: LoaderId,
    on: LoaderId,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        let mut waits = self.graph.waits.lock();
        if let Some(targets) = waits.get_mut(&self.waiter) {
            if let Some(count) = targets.get_mut(&self.on) {
                *count -= 1;
                if *count == 0 {
                    targets.remove(&self.on);
                }
            }
            if targets.is_empty() {
                waits.remove(&self.waiter);
            }
        }
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `parent` loaded `child` while running.
    pub fn record(&self, parent: &LoaderId, child: &LoaderId) {
        let mut edges = self.edges.write();
        if edges
            .entry(parent.clone())
            .or_default()
            .insert(child.clone())
        {
            tracing::trace!(parent = %parent, child = %child, "Recorded loader dependency");
        }
    }

    /// Loaders `loader` has called.
    pub fn dependencies_of(&self, loader: &LoaderId) -> Vec<LoaderId> {
        self.edges
            .read()
            .get(loader)
            .map(|children| children.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Loaders that have called `loader`.
    pub fn dependents_of(&self, loader: &LoaderId) -> Vec<LoaderId> {
        self.edges
            .read()
            .iter()
            .filter(|(_, children)| children.contains(loader))
            .map(|(parent, _)| parent.clone())
            .collect()
    }

    /// Every loader reachable from `loader`, in breadth-first order.
    pub fn transitive_dependencies(&self, loader: &LoaderId) -> Vec<LoaderId> {
        let edges = self.edges.read();
        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([loader.clone()]);
        while let Some(current) = queue.pop_front() {
            for child in edges.get(&current).into_iter().flatten() {
                if child != loader && seen.insert(child.clone()) {
                    order.push(child.clone());
                    queue.push_back(child.clone());
                }
            }
        }
        order
    }

    /// Register that `waiter`'s body is blocked on `on`'s fetch.
    ///
    /// Fails with the loop, starting at `on` and ending at `waiter`, when `on` is already
    /// waiting (directly or through other loaders) on `waiter`.
    pub fn begin_wait(
        self: &Arc<Self>,
        waiter: &LoaderId,
        on: &LoaderId,
    ) -> Result<WaitGuard, Vec<LoaderId>> {
        let mut waits = self.waits.lock();
        if let Some(path) = wait_path(&waits, on, waiter) {
            return Err(path);
        }
        *waits
            .entry(waiter.clone())
            .or_default()
            .entry(on.clone())
            .or_insert(0) += 1;
        Ok(WaitGuard {
            graph: self.clone(),
            waiter: waiter.clone(),
            on: on.clone(),
        })
    }

    /// Number of live waits, for diagnostics.
    pub fn active_waits(&self) -> usize {
        self.waits
            .lock()
            .values()
            .flat_map(|targets| targets.values())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.read().is_empty()
    }

    pub fn clear(&self) {
        self.edges.write().clear();
    }
}

/// Path of live waits from `from` to `to`, both included.
fn wait_path(
    waits: &BTreeMap<LoaderId, BTreeMap<LoaderId, usize>>,
    from: &LoaderId,
    to: &LoaderId,
) -> Option<Vec<LoaderId>> {
    if from == to {
        return Some(vec![from.clone()]);
    }
    let mut came_from: BTreeMap<LoaderId, LoaderId> = BTreeMap::new();
    let mut queue = VecDeque::from([from.clone()]);
    while let Some(current) = queue.pop_front() {
        for next in waits.get(&current).into_iter().flat_map(|targets| targets.keys()) {
            if next == from || came_from.contains_key(next) {
                continue;
            }
            came_from.insert(next.clone(), current.clone());
            if next == to {
                let mut path = vec![to.clone()];
                let mut step = to;
                while let Some(prev) = came_from.get(step) {
                    path.push(prev.clone());
                    step = prev;
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(next.clone());
        }
    }
    None
}
