//! Path-keyed cache of resolved native handles.

use crate::config::CacheConfig;
use crate::element::NativeHandle;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct CacheEntry {
    handle: NativeHandle,
    inserted: Instant,
}

/// A latency optimization only: a miss just means the caller resolves again.
pub struct HandleCache {
    ttl: Duration,
    max_entries: usize,
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

impl HandleCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.max_entries)
    }

    /// Returns the handle only while it is younger than the TTL and still answers a role
    /// read; anything else is evicted.
    pub fn get(&mut self, key: &str) -> Option<NativeHandle> {
        let fresh = match self.entries.get(key) {
            None => {
                self.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.inserted.elapsed() < self.ttl && entry.handle.is_alive(),
        };

        if fresh {
            self.stats.hits += 1;
            return self.entries.get(key).map(|e| e.handle.clone());
        }

        debug!("Evicting stale cache entry for {}", key);
        self.entries.remove(key);
        self.stats.evictions += 1;
        self.stats.misses += 1;
        None
    }

    pub fn put(&mut self, key: impl Into<String>, handle: NativeHandle) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                handle,
                inserted: Instant::now(),
            },
        );
        if self.entries.len() > self.max_entries {
            self.evict_oldest_half();
        }
    }

    pub fn invalidate(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.stats.evictions += 1;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.stats.evictions += self.entries.len() as u64;
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn evict_oldest_half(&mut self) {
        let mut by_age: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.inserted))
            .collect();
        by_age.sort_by_key(|(_, inserted)| *inserted);

        let to_remove = self.entries.len() / 2;
        for (key, _) in by_age.into_iter().take(to_remove) {
            self.entries.remove(&key);
        }
        self.stats.evictions += to_remove as u64;
        debug!("Handle cache over capacity, evicted {} entries", to_remove);
    }
}
