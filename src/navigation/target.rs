//! Navigation targets and matched route records.
//!
//! Both are produced by the routing collaborator; this crate only reads params, query,
//! path and the loaders attached to each matched record.

use crate::loader::RouteLoader;
use crate::types::LoaderId;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// A matched route record and the loaders declared on it.
pub struct RouteRecord {
    pub name: String,
    pub path: String,
    loaders: Vec<Arc<dyn RouteLoader>>,
}

impl RouteRecord {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            loaders: Vec::new(),
        }
    }

    pub fn with_loader<L: RouteLoader + 'static>(mut self, loader: L) -> Self {
        self.loaders.push(Arc::new(loader));
        self
    }

    pub fn with_shared_loader(mut self, loader: Arc<dyn RouteLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    pub fn loaders(&self) -> &[Arc<dyn RouteLoader>] {
        &self.loaders
    }
}

impl fmt::Debug for RouteRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteRecord")
            .field("name", &self.name)
            .field("path", &self.path)
            .field(
                "loaders",
                &self.loaders.iter().map(|l| l.id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Resolved location a navigation is heading to.
#[derive(Debug, Clone, Default)]
pub struct NavigationTarget {
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    /// Matched route chain, root first.
    pub matched: Vec<Arc<RouteRecord>>,
}

impl NavigationTarget {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Build a target from `path?key=value&...`. No percent-decoding is applied.
    pub fn from_location(location: &str) -> Self {
        let (path, query) = match location.split_once('?') {
            Some((path, query)) => (path, query),
            None => (location, ""),
        };
        let mut target = Self::new(path);
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            target.query.insert(key.to_string(), value.to_string());
        }
        target
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_match(mut self, route: Arc<RouteRecord>) -> Self {
        self.matched.push(route);
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Loaders of the matched chain, ancestors first, each id once.
    pub fn loaders(&self) -> Vec<Arc<dyn RouteLoader>> {
        let mut seen: HashSet<LoaderId> = HashSet::new();
        self.matched
            .iter()
            .flat_map(|route| route.loaders().iter())
            .filter(|loader| seen.insert(loader.id().clone()))
            .cloned()
            .collect()
    }
}
