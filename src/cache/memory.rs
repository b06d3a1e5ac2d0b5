//! In-memory LRU store with per-entry TTL
//!
//! - Capacity-bounded: the least recently used entry is evicted on overflow
//! - Expired entries are removed on read or by `sweep_expired`

use super::{CacheStats, TtlStore};
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Cache entry with creation time for TTL checking
#[derive(Clone)]
struct CacheEntry {
    value: Value,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.created_at + self.ttl
    }
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    expired: u64,
}

/// Process-lifetime TTL store
pub struct MemoryStore {
    cache: Mutex<LruCache<String, CacheEntry>>,
    counters: Mutex<Counters>,
}

impl MemoryStore {
    /// Create a new store holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(cap)),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Get the current number of entries, expired ones included
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    /// Remaining lifetime of a live entry
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let cache = self.cache.lock();
        let entry = cache.peek(key)?;
        (entry.created_at + entry.ttl).checked_duration_since(Instant::now())
    }
}

impl TtlStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        let mut cache = self.cache.lock();
        let now = Instant::now();

        if let Some(entry) = cache.get(key) {
            if entry.is_live(now) {
                tracing::trace!(key = key, "Cache hit");
                let value = entry.value.clone();
                drop(cache);
                self.counters.lock().hits += 1;
                return Some(value);
            }

            tracing::trace!(key = key, "Cache entry expired");
            cache.pop(key);
            drop(cache);
            let mut counters = self.counters.lock();
            counters.expired += 1;
            counters.misses += 1;
            return None;
        }

        drop(cache);
        self.counters.lock().misses += 1;
        None
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            created_at: Instant::now(),
            ttl,
        };
        self.cache.lock().put(key.to_string(), entry);
        tracing::trace!(key = key, ttl_secs = ttl.as_secs(), "Cache insert");
    }

    fn remove(&self, key: &str) {
        self.cache.lock().pop(key);
        tracing::trace!(key = key, "Cache invalidate");
    }

    fn remove_prefix(&self, prefix: &str) {
        let mut cache = self.cache.lock();
        let doomed: Vec<String> = cache
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            cache.pop(key);
        }
        tracing::trace!(prefix = prefix, removed = doomed.len(), "Cache prefix invalidate");
    }

    fn clear(&self) {
        self.cache.lock().clear();
        tracing::debug!("Cache cleared");
    }

    fn sweep_expired(&self) -> usize {
        let mut cache = self.cache.lock();
        let now = Instant::now();
        let doomed: Vec<String> = cache
            .iter()
            .filter(|(_, entry)| !entry.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            cache.pop(key);
        }
        drop(cache);
        self.counters.lock().expired += doomed.len() as u64;
        doomed.len()
    }

    fn stats(&self) -> CacheStats {
        let cache = self.cache.lock();
        let counters = self.counters.lock();
        CacheStats {
            entries: cache.len(),
            capacity: cache.cap().get(),
            hits: counters.hits,
            misses: counters.misses,
            expired: counters.expired,
        }
    }
}
