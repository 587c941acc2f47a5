//! Key/value cache with per-entry TTL
//!
//! Every component that does expensive work reads through the cache first and
//! writes through it afterwards. Failures never escape: a read error is a miss
//! and a write error is a no-op, so callers only ever see `Option` / `bool`.

pub mod memory;

pub use memory::{DisabledCache, MemoryCache};

use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Cache backend errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("Cache serialization failed: {0}")]
    Serialization(String),
    #[error("TTL of {0:?} cannot be represented")]
    InvalidTtl(Duration),
}

/// Health snapshot reported by a cache backend
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CacheHealth {
    pub status: CacheStatus,
    pub entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CacheStatus {
    Healthy,
    Disconnected,
}

/// Storage backend for serialized cache values
///
/// Implementations must make each individual `get`/`set` atomic at the entry
/// level; no cross-entry guarantees are required.
#[cfg_attr(test, mockall::automock)]
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    fn health(&self) -> CacheHealth;
}

/// Read and decode a JSON value, treating any failure as a miss
pub fn get_json<T: DeserializeOwned>(store: &dyn CacheStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key, error = %e, "cache get failed, treating as miss");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "cached value could not be decoded, treating as miss");
            None
        }
    }
}

/// Encode and store a JSON value; returns whether the write landed
pub fn set_json<T: Serialize>(store: &dyn CacheStore, key: &str, value: &T, ttl: Duration) -> bool {
    let raw = match serde_json::to_string(value) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(key, error = %CacheError::Serialization(e.to_string()), "cache set skipped");
            return false;
        }
    };

    match store.set(key, raw, ttl) {
        Ok(()) => {
            debug!(key, ttl_secs = ttl.as_secs(), "cache set");
            true
        }
        Err(e) => {
            warn!(key, error = %e, "cache set failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        stage: u8,
    }

    #[test]
    fn test_get_json_treats_backend_error_as_miss() {
        let mut store = MockCacheStore::new();
        store
            .expect_get()
            .returning(|_| Err(CacheError::Unavailable("connection refused".to_string())));

        let value: Option<Sample> = get_json(&store, "prediction:abc");
        assert!(value.is_none());
    }

    #[test]
    fn test_get_json_treats_garbage_as_miss() {
        let mut store = MockCacheStore::new();
        store
            .expect_get()
            .returning(|_| Ok(Some("not json".to_string())));

        let value: Option<Sample> = get_json(&store, "prediction:abc");
        assert!(value.is_none());
    }

    #[test]
    fn test_set_json_reports_failed_write() {
        let mut store = MockCacheStore::new();
        store
            .expect_set()
            .returning(|_, _, _| Err(CacheError::Unavailable("read-only".to_string())));

        assert!(!set_json(&store, "k", &Sample { stage: 2 }, Duration::from_secs(5)));
    }

    #[test]
    fn test_set_json_with_oversized_ttl_is_a_no_op() {
        let store = MemoryCache::new();
        assert!(!set_json(&store, "k", &Sample { stage: 1 }, Duration::MAX));
        assert_eq!(get_json::<Sample>(&store, "k"), None);
    }

    #[test]
    fn test_json_round_trip_through_memory_cache() {
        let store = MemoryCache::new();
        assert!(set_json(&store, "k", &Sample { stage: 4 }, Duration::from_secs(60)));
        assert_eq!(get_json::<Sample>(&store, "k"), Some(Sample { stage: 4 }));
    }

    #[test]
    fn test_cache_status_display() {
        assert_eq!(CacheStatus::Healthy.to_string(), "healthy");
        assert_eq!(CacheStatus::Disconnected.to_string(), "disconnected");
    }
}
