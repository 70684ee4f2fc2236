//! Property-based tests for caching and invalidation guarantees

mod caching;
