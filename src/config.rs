//! Configuration System
//!
//! Settings shared by every loader of a data layer. Values are layered from built-in
//! defaults, an optional TOML file and `NAVLOADER__`-prefixed environment variables, in that
//! order. Per-loader options given on a definition take precedence over these defaults.

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Default freshness window for cache entries.
pub const DEFAULT_STALE_MS: u64 = 5_000;

/// Longest accepted freshness window (one day).
pub const MAX_STALE_MS: u64 = 24 * 60 * 60 * 1_000;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderSettings {
    /// Freshness window applied when a loader does not set its own.
    #[serde(default = "default_stale_ms")]
    pub default_stale_ms: u64,

    /// Whether loaders are lazy unless they say otherwise.
    #[serde(default)]
    pub lazy_by_default: bool,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_stale_ms() -> u64 {
    DEFAULT_STALE_MS
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            default_stale_ms: DEFAULT_STALE_MS,
            lazy_by_default: false,
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Cache(String),
    Logging(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Cache(msg) => write!(f, "Cache: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl LoaderSettings {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.default_stale_ms > MAX_STALE_MS {
            errors.push(ValidationError::Cache(format!(
                "default_stale_ms {} exceeds the maximum of {}",
                self.default_stale_ms, MAX_STALE_MS
            )));
        }

        let logging = &self.logging;
        if !matches!(
            logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error" | "off"
        ) {
            errors.push(ValidationError::Logging(format!(
                "Invalid level '{}'",
                logging.level
            )));
        }
        if logging.format != "json" && logging.format != "text" {
            errors.push(ValidationError::Logging(format!(
                "Invalid format '{}' (must be 'json' or 'text')",
                logging.format
            )));
        }
        if logging.output != "stdout" && logging.output != "stderr" {
            errors.push(ValidationError::Logging(format!(
                "Invalid output '{}' (must be 'stdout' or 'stderr')",
                logging.output
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
