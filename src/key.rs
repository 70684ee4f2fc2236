//! Cache Keys
//!
//! A cache key is an ordered sequence of primitive values produced by a loader's key
//! function. Its canonical form is the compact JSON array text (`["items","0"]`), which is
//! also the key format used by hydration snapshots.

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One primitive component of a cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl KeyPart {
    fn to_value(&self) -> Value {
        match self {
            KeyPart::Null => Value::Null,
            KeyPart::Bool(b) => Value::Bool(*b),
            KeyPart::Int(n) => Value::from(*n),
            KeyPart::Str(s) => Value::String(s.clone()),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Str(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Str(s)
    }
}

impl From<&String> for KeyPart {
    fn from(s: &String) -> Self {
        KeyPart::Str(s.clone())
    }
}

impl From<i64> for KeyPart {
    fn from(n: i64) -> Self {
        KeyPart::Int(n)
    }
}

impl From<i32> for KeyPart {
    fn from(n: i32) -> Self {
        KeyPart::Int(n as i64)
    }
}

impl From<u32> for KeyPart {
    fn from(n: u32) -> Self {
        KeyPart::Int(n as i64)
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        KeyPart::Bool(b)
    }
}

impl<T: Into<KeyPart>> From<Option<T>> for KeyPart {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(KeyPart::Null)
    }
}

/// Ordered key produced by a loader key function
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(Vec<KeyPart>);

impl CacheKey {
    pub fn new() -> Self {
        CacheKey(Vec::new())
    }

    pub fn from_parts(parts: Vec<KeyPart>) -> Self {
        CacheKey(parts)
    }

    /// Append a part (builder style).
    pub fn push(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `prefix` matches the leading parts of this key (a key is its own prefix).
    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn canonical(&self) -> CanonicalKey {
        let parts = self.0.iter().map(KeyPart::to_value).collect();
        CanonicalKey(Value::Array(parts).to_string())
    }

    /// Parse a canonical key string (as found in hydration snapshots).
    pub fn parse(canonical: &str) -> Result<Self, CacheError> {
        serde_json::from_str(canonical).map_err(|source| CacheError::InvalidKey {
            key: canonical.to_string(),
            source,
        })
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical().as_str())
    }
}

/// Canonical string form of a [`CacheKey`]; the lookup key of the query cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Key selection used by invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyFilter {
    All,
    Exact(CacheKey),
    Prefix(CacheKey),
}

impl KeyFilter {
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            KeyFilter::All => true,
            KeyFilter::Exact(exact) => key == exact,
            KeyFilter::Prefix(prefix) => key.starts_with(prefix),
        }
    }
}

/// Build a [`CacheKey`] from a list of primitive values.
///
/// ```
/// use navloader::cache_key;
/// let key = cache_key!["items", 3];
/// assert_eq!(key.canonical().as_str(), r#"["items",3]"#);
/// ```
#[macro_export]
macro_rules! cache_key {
    () => {
        $crate::key::CacheKey::new()
    };
    ($($part:expr),+ $(,)?) => {
        $crate::key::CacheKey::from_parts(vec![$($crate::key::KeyPart::from($part)),+])
    };
}
