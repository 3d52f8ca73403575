//! TTL-capable associative cache backing the in-process store.
//!
//! Entries optionally expire after a fixed TTL. Expired entries are dropped
//! lazily on access and, when a cleanup interval is configured, by a
//! background sweeper task. Evictions are reported through a callback
//! registered at construction; the cache itself decides what to drop.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// The entry outlived its TTL.
    Expired,
    /// The entry was removed explicitly.
    Removed,
}

/// Callback invoked with the key and reason whenever an entry is evicted.
pub type EvictionListener = Box<dyn Fn(&str, EvictionReason) + Send + Sync>;

struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

/// An associative cache with per-entry TTL and eviction reporting.
pub struct TtlCache<V> {
    entries: Arc<Mutex<HashMap<String, CacheEntry<V>>>>,
    on_evict: Option<Arc<EvictionListener>>,
    default_ttl: Option<Duration>,
}

impl<V: Clone + Send + 'static> TtlCache<V> {
    /// Create a cache.
    ///
    /// `default_ttl` of `None` means entries never expire. When
    /// `cleanup_interval` is set, a sweeper task is spawned on the current
    /// tokio runtime; it stops on its own once the cache is dropped.
    pub fn new(
        default_ttl: Option<Duration>,
        cleanup_interval: Option<Duration>,
        on_evict: Option<EvictionListener>,
    ) -> Self {
        let cache = Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            on_evict: on_evict.map(Arc::new),
            default_ttl,
        };

        if let Some(interval) = cleanup_interval.filter(|d| !d.is_zero()) {
            Self::spawn_sweeper(
                Arc::downgrade(&cache.entries),
                cache.on_evict.clone(),
                interval,
            );
        }

        cache
    }

    /// Get a clone of the value under `key`, dropping it instead when its
    /// TTL has lapsed.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            None => None,
            Some(entry) if !entry.expired(Instant::now()) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                drop(entries);
                self.notify(key, EvictionReason::Expired);
                None
            }
        }
    }

    /// Insert or replace the value under `key`, stamped with the default TTL.
    pub fn set(&self, key: &str, value: V) {
        let expires_at = self.default_ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .insert(key.to_string(), CacheEntry { value, expires_at });
    }

    /// Remove an entry, reporting the eviction. No-op when absent.
    pub fn remove(&self, key: &str) {
        let removed = self.entries.lock().remove(key).is_some();
        if removed {
            self.notify(key, EvictionReason::Removed);
        }
    }

    /// Number of entries, counting those not yet swept.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn notify(&self, key: &str, reason: EvictionReason) {
        if let Some(listener) = &self.on_evict {
            listener(key, reason);
        }
    }

    fn spawn_sweeper(
        entries: Weak<Mutex<HashMap<String, CacheEntry<V>>>>,
        on_evict: Option<Arc<EvictionListener>>,
        interval: Duration,
    ) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(entries) = entries.upgrade() else {
                    break;
                };

                let now = Instant::now();
                let expired: Vec<String> = {
                    let mut map = entries.lock();
                    let keys: Vec<String> = map
                        .iter()
                        .filter(|(_, entry)| entry.expired(now))
                        .map(|(key, _)| key.clone())
                        .collect();
                    for key in &keys {
                        map.remove(key);
                    }
                    keys
                };

                if let Some(listener) = &on_evict {
                    for key in &expired {
                        listener(key, EvictionReason::Expired);
                    }
                }
            }
        });
    }
}
