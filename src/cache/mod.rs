//! Response caching.
//!
//! # Responsibilities
//! - Map request fingerprints to previously obtained responses
//! - Bound the store by entry count (LRU eviction) and age (per-entry TTL)
//! - Track hit, miss, set and eviction counters
//!
//! # Design Decisions
//! - Backed by `moka::sync::Cache` with the LRU policy; housekeeping runs after
//!   every write so the size bound holds when `set` returns
//! - TTL is anchored to insertion unless sliding expiration is enabled
//! - TTLs too large to represent mean "never expires"
//! - A disabled cache is a cheap no-op, never an error

pub mod fingerprint;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use moka::Expiry;
use serde::Serialize;
use serde_json::Value;

use crate::config::CacheConfig;
use crate::observability::metrics;

pub use fingerprint::{canonical_json, fingerprint};

/// TTLs at or above this are stored without an expiry.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Snapshot of cache counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub size: usize,
    /// `hits / (hits + misses)`, 0.0 before any lookup.
    pub hit_rate: f64,
}

impl CacheStats {
    fn disabled() -> Self {
        Self {
            enabled: false,
            hits: 0,
            misses: 0,
            sets: 0,
            evictions: 0,
            size: 0,
            hit_rate: 0.0,
        }
    }
}

#[derive(Clone)]
struct Entry<V> {
    value: V,
    /// `None` never expires.
    ttl: Option<Duration>,
}

/// Per-entry expiry; reads re-anchor only when sliding.
struct EntryExpiry {
    sliding: bool,
}

impl<V> Expiry<String, Entry<V>> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, entry: &Entry<V>, _created_at: Instant) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry<V>,
        _updated_at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_read(
        &self,
        _key: &String,
        entry: &Entry<V>,
        _read_at: Instant,
        remaining: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        if self.sliding {
            entry.ttl
        } else {
            remaining
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    /// Shared with the eviction listener.
    evictions: Arc<AtomicU64>,
}

impl Counters {
    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }
}

struct Store<V> {
    entries: Cache<String, Entry<V>>,
    counters: Counters,
}

/// Size- and time-bounded response cache.
pub struct ResponseCache<V = Value> {
    inner: Option<Store<V>>,
    default_ttl: Duration,
    sliding: bool,
}

impl<V> ResponseCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Build a cache from configuration. `enabled = false` yields a no-op cache.
    pub fn new(config: &CacheConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let counters = Counters::default();
        let evictions = Arc::clone(&counters.evictions);
        let entries = Cache::builder()
            .max_capacity(config.max_entries.max(1) as u64)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(EntryExpiry {
                sliding: config.sliding_expiration,
            })
            .eviction_listener(move |key: Arc<String>, _entry: Entry<V>, cause: RemovalCause| {
                if cause == RemovalCause::Size {
                    evictions.fetch_add(1, Ordering::Relaxed);
                    metrics::record_cache_event("eviction");
                    tracing::debug!(key = %key, "Evicted least recently used entry");
                }
            })
            .build();

        Self {
            inner: Some(Store { entries, counters }),
            default_ttl: config.ttl(),
            sliding: config.sliding_expiration,
        }
    }

    pub fn disabled() -> Self {
        Self {
            inner: None,
            default_ttl: Duration::ZERO,
            sliding: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Look up `key`, refreshing its recency. Expired entries are removed and
    /// reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let store = self.inner.as_ref()?;

        match store.entries.get(key) {
            Some(entry) => {
                store.counters.hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_event("hit");
                tracing::debug!(key = %key, "Cache hit");
                Some(entry.value)
            }
            None => {
                // Drops an expired entry still occupying a slot.
                store.entries.invalidate(key);
                store.counters.misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_event("miss");
                tracing::debug!(key = %key, "Cache miss");
                None
            }
        }
    }

    /// Store `value` under `key`, with `ttl` overriding the configured default.
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let Some(store) = &self.inner else {
            return;
        };
        let ttl = ttl.unwrap_or(self.default_ttl);
        store.entries.insert(
            key.to_string(),
            Entry {
                value,
                ttl: (ttl < MAX_TTL).then_some(ttl),
            },
        );
        store.entries.run_pending_tasks();

        store.counters.sets.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_event("set");
        metrics::record_cache_size(store.entries.entry_count() as usize);
    }

    /// Whether an unexpired entry exists. Does not refresh recency.
    pub fn has(&self, key: &str) -> bool {
        let Some(store) = &self.inner else {
            return false;
        };
        if store.entries.contains_key(key) {
            return true;
        }
        store.entries.invalidate(key);
        false
    }

    /// Remove `key`. Returns `true` only if an unexpired entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        let Some(store) = &self.inner else {
            return false;
        };
        let live = store.entries.contains_key(key);
        store.entries.invalidate(key);
        store.entries.run_pending_tasks();
        metrics::record_cache_size(store.entries.entry_count() as usize);
        live
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        let Some(store) = &self.inner else {
            return;
        };
        store.entries.invalidate_all();
        store.entries.run_pending_tasks();
        store.counters.reset();
        metrics::record_cache_size(0);
    }

    /// Physically remove expired entries. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let Some(store) = &self.inner else {
            return 0;
        };
        let before = store.entries.entry_count();
        store.entries.run_pending_tasks();
        let after = store.entries.entry_count();

        let purged = before.saturating_sub(after) as usize;
        if purged > 0 {
            tracing::debug!(purged, "Purged expired cache entries");
            metrics::record_cache_size(after as usize);
        }
        purged
    }

    pub fn stats(&self) -> CacheStats {
        let Some(store) = &self.inner else {
            return CacheStats::disabled();
        };
        store.entries.run_pending_tasks();

        let hits = store.counters.hits.load(Ordering::Relaxed);
        let misses = store.counters.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            enabled: true,
            hits,
            misses,
            sets: store.counters.sets.load(Ordering::Relaxed),
            evictions: store.counters.evictions.load(Ordering::Relaxed),
            size: store.entries.entry_count() as usize,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }
}

impl<V> std::fmt::Debug for ResponseCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("enabled", &self.inner.is_some())
            .field("default_ttl", &self.default_ttl)
            .field("sliding", &self.sliding)
            .finish()
    }
}
