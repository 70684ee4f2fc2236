//! Error types for the navigation data loader runtime.

use crate::key::CanonicalKey;
use crate::types::LoaderId;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure produced by a loader's query body.
///
/// Shared by every caller attached to the same in-flight fetch, so it is reference counted.
#[derive(Debug, Clone)]
pub struct FetchError(Arc<anyhow::Error>);

impl FetchError {
    pub fn new(err: anyhow::Error) -> Self {
        FetchError(Arc::new(err))
    }

    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        FetchError::new(anyhow::Error::msg(message))
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// True when both errors come from the same failed fetch.
    pub fn same_failure(&self, other: &FetchError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<anyhow::Error> for FetchError {
    fn from(err: anyhow::Error) -> Self {
        FetchError::new(err)
    }
}

/// Query cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Invalid cache key {key:?}: {source}")]
    InvalidKey {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode cache data: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Ambient context errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("No active loader context: a loader was called outside of a loader body or navigation")]
    NoActiveLoader,
}

/// Loader invocation errors, surfaced through a loader's `error` cell.
#[derive(Debug, Clone, Error)]
pub enum LoaderError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("Loader dependency cycle: {loader} is already running in {chain:?}")]
    Cycle {
        loader: LoaderId,
        chain: Vec<LoaderId>,
    },

    #[error("Failed to decode data for key {key}: {message}")]
    Decode { key: CanonicalKey, message: String },

    #[error("No data cached for key {0}")]
    Empty(CanonicalKey),

    #[error("Loader {0} has not been bound to a key yet")]
    NotBound(LoaderId),
}

/// Setup errors (configuration and logging)
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging error: {0}")]
    Logging(String),
}

impl From<config::ConfigError> for SetupError {
    fn from(err: config::ConfigError) -> Self {
        SetupError::Config(err.to_string())
    }
}
