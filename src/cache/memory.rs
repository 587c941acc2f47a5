use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::{CacheError, CacheHealth, CacheStatus, CacheStore};

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process cache backed by a locked hash map
///
/// Expired entries are dropped lazily on read and in bulk by
/// [`MemoryCache::purge_expired`], which the service runs on an interval.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(e) if !e.is_expired(now) => return Ok(Some(e.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: re-check under the write lock, another writer may have refreshed it.
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|e| e.value.clone()))
    }

    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or(CacheError::InvalidTtl(ttl))?;
        self.entries
            .write()
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    fn health(&self) -> CacheHealth {
        CacheHealth {
            status: CacheStatus::Healthy,
            entries: self.len(),
            error: None,
        }
    }
}

/// Cache used when caching is switched off in configuration
///
/// Every read misses and every write is rejected, which callers already
/// treat as a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCache;

impl CacheStore for DisabledCache {
    fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("cache disabled".to_string()))
    }

    fn health(&self) -> CacheHealth {
        CacheHealth {
            status: CacheStatus::Disconnected,
            entries: 0,
            error: Some("cache disabled".to_string()),
        }
    }
}
