//! In-memory result cache with TTL expiry and LRU eviction.
//!
//! Values are stored serialized as JSON so one cache can hold results of
//! different types. All state sits behind a single mutex; the cache is
//! meant to be shared through an `Arc` between concurrent analyses.

mod analysis;

pub use analysis::{AnalysisCache, AnalysisTask};

use crate::config::CacheSettings;
use crate::error::{Result, TolkError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct CacheEntry {
    value: String,
    created_at: Instant,
    ttl: Duration,
    access_count: u64,
    last_access: Instant,
    /// Insertion/access sequence number, breaks `last_access` ties.
    seq: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) > self.ttl
    }
}

/// Cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub evictions: u64,
    /// Entries currently held, including not yet swept expired ones.
    pub size: usize,
    /// `hits / (hits + misses)`, 0 before the first lookup.
    pub hit_rate: f64,
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
    last_cleanup: Instant,
    seq: u64,
}

impl CacheState {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// TTL + LRU key/value cache.
pub struct ResultCache {
    max_size: usize,
    default_ttl: Duration,
    cleanup_interval: Duration,
    state: Mutex<CacheState>,
}

impl ResultCache {
    pub fn new(max_size: usize, default_ttl: Duration, cleanup_interval: Duration) -> Self {
        Self {
            max_size: max_size.max(1),
            default_ttl,
            cleanup_interval,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                stats: CacheStats::default(),
                last_cleanup: Instant::now(),
                seq: 0,
            }),
        }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(
            settings.max_size,
            Duration::from_secs(settings.default_ttl_secs),
            Duration::from_secs(settings.cleanup_interval_secs),
        )
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState>> {
        self.state
            .lock()
            .map_err(|e| TolkError::Lock(format!("Failed to acquire cache lock: {}", e)))
    }

    /// Look up `key`.
    ///
    /// Expired entries are removed and count as a miss. A value that no
    /// longer deserializes as `T` is treated as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw = self.get_raw(key)?;
        Ok(raw.and_then(|value| match serde_json::from_str(&value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "Cached value could not be deserialized, ignoring it");
                None
            }
        }))
    }

    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.lock()?;
        let now = Instant::now();

        if now.duration_since(state.last_cleanup) >= self.cleanup_interval {
            sweep(&mut state, now);
        }

        match state.entries.get(key).map(|e| e.is_expired(now)) {
            None => {
                state.stats.misses += 1;
                return Ok(None);
            }
            Some(true) => {
                state.entries.remove(key);
                state.stats.misses += 1;
                debug!(key, "Cache entry expired");
                return Ok(None);
            }
            Some(false) => {}
        }

        let seq = state.next_seq();
        state.stats.hits += 1;
        let value = state.entries.get_mut(key).map(|entry| {
            entry.access_count += 1;
            entry.last_access = now;
            entry.seq = seq;
            entry.value.clone()
        });
        Ok(value)
    }

    /// Store `value` under `key` with `ttl`, or the default TTL.
    ///
    /// Inserting a new key into a full cache first evicts the least
    /// recently accessed entry.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let value = serde_json::to_string(value)
            .map_err(|e| TolkError::CacheSerialization(e.to_string()))?;

        let mut state = self.lock()?;
        let now = Instant::now();

        if !state.entries.contains_key(key) && state.entries.len() >= self.max_size {
            let lru = state
                .entries
                .iter()
                .min_by_key(|(_, e)| (e.last_access, e.seq))
                .map(|(k, _)| k.clone());
            if let Some(lru) = lru {
                state.entries.remove(&lru);
                state.stats.evictions += 1;
                debug!(key = %lru, "Evicted least recently used cache entry");
            }
        }

        let seq = state.next_seq();
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: now,
                ttl: ttl.unwrap_or(self.default_ttl),
                access_count: 0,
                last_access: now,
                seq,
            },
        );
        state.stats.sets += 1;
        Ok(())
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let mut state = self.lock()?;
        let removed = state.entries.remove(key).is_some();
        if removed {
            state.stats.deletes += 1;
        }
        Ok(removed)
    }

    /// Whether `key` holds an unexpired value. Does not touch access stats.
    pub fn exists(&self, key: &str) -> Result<bool> {
        let state = self.lock()?;
        let now = Instant::now();
        Ok(state
            .entries
            .get(key)
            .map(|e| !e.is_expired(now))
            .unwrap_or(false))
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<usize> {
        self.remove_where(|_| true)
    }

    /// Remove entries whose key starts with `prefix`.
    pub fn clear_prefix(&self, prefix: &str) -> Result<usize> {
        self.remove_where(|k| k.starts_with(prefix))
    }

    fn remove_where(&self, pred: impl Fn(&str) -> bool) -> Result<usize> {
        let mut state = self.lock()?;
        let before = state.entries.len();
        state.entries.retain(|k, _| !pred(k));
        let removed = before - state.entries.len();
        state.stats.deletes += removed as u64;
        Ok(removed)
    }

    /// Remove all expired entries now. Returns how many were removed.
    pub fn cleanup_expired(&self) -> Result<usize> {
        let mut state = self.lock()?;
        Ok(sweep(&mut state, Instant::now()))
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let state = self.lock()?;
        let mut stats = state.stats.clone();
        let lookups = stats.hits + stats.misses;
        stats.size = state.entries.len();
        stats.hit_rate = if lookups > 0 {
            stats.hits as f64 / lookups as f64
        } else {
            0.0
        };
        Ok(stats)
    }

    /// Keys currently held, in no particular order.
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.entries.keys().cloned().collect())
    }

    /// Access count of `key`, if present.
    pub fn access_count(&self, key: &str) -> Result<Option<u64>> {
        Ok(self.lock()?.entries.get(key).map(|e| e.access_count))
    }
}

fn sweep(state: &mut CacheState, now: Instant) -> usize {
    let before = state.entries.len();
    state.entries.retain(|_, e| !e.is_expired(now));
    state.last_cleanup = now;
    let removed = before - state.entries.len();
    if removed > 0 {
        debug!("Swept {} expired cache entries", removed);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cache(max_size: usize) -> ResultCache {
        ResultCache::new(max_size, Duration::from_secs(60), Duration::from_secs(300))
    }

    #[test]
    fn test_set_then_get() {
        let cache = cache(10);
        cache.set("k", &vec!["a".to_string(), "b".to_string()], None).unwrap();

        let value: Option<Vec<String>> = cache.get("k").unwrap();
        assert_eq!(value, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(cache.access_count("k").unwrap(), Some(1));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = cache(10);
        cache.set("k", &1u32, Some(Duration::from_millis(20))).unwrap();
        assert!(cache.exists("k").unwrap());

        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.get::<u32>("k").unwrap(), None);
        assert!(!cache.exists("k").unwrap());
        let stats = cache.stats().unwrap();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn test_cleanup_expired_sweeps_untouched_entries() {
        let cache = cache(10);
        cache.set("short", &1u32, Some(Duration::from_millis(10))).unwrap();
        cache.set("long", &2u32, None).unwrap();

        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.cleanup_expired().unwrap(), 1);
        assert_eq!(cache.stats().unwrap().size, 1);
        assert_eq!(cache.get::<u32>("long").unwrap(), Some(2));
    }

    #[test]
    fn test_lru_eviction_spares_recently_read_key() {
        let cache = cache(2);
        cache.set("a", &1u32, None).unwrap();
        cache.set("b", &2u32, None).unwrap();
        assert_eq!(cache.get::<u32>("a").unwrap(), Some(1));
        cache.set("c", &3u32, None).unwrap();

        assert!(cache.exists("a").unwrap());
        assert!(!cache.exists("b").unwrap());
        assert!(cache.exists("c").unwrap());
        assert_eq!(cache.stats().unwrap().evictions, 1);
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = cache(2);
        cache.set("a", &1u32, None).unwrap();
        cache.set("b", &2u32, None).unwrap();
        cache.set("a", &10u32, None).unwrap();

        assert_eq!(cache.get::<u32>("a").unwrap(), Some(10));
        assert_eq!(cache.get::<u32>("b").unwrap(), Some(2));
        assert_eq!(cache.stats().unwrap().evictions, 0);
    }

    #[test]
    fn test_max_size_plus_one_evicts_oldest() {
        let cache = cache(3);
        for key in ["k1", "k2", "k3", "k4"] {
            cache.set(key, &key, None).unwrap();
        }
        let mut keys = cache.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["k2", "k3", "k4"]);
    }

    #[test]
    fn test_stats_and_hit_rate() {
        let cache = cache(10);
        cache.set("a", &1u32, None).unwrap();
        let _ = cache.get::<u32>("a").unwrap();
        let _ = cache.get::<u32>("a").unwrap();
        let _ = cache.get::<u32>("missing").unwrap();
        assert!(cache.delete("a").unwrap());
        assert!(!cache.delete("a").unwrap());

        let stats = cache.stats().unwrap();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.deletes, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_type_mismatch_reads_as_absent() {
        let cache = cache(10);
        cache.set("k", &"text", None).unwrap();
        assert_eq!(cache.get::<u32>("k").unwrap(), None);
    }

    #[test]
    fn test_periodic_sweep_on_get() {
        let cache = ResultCache::new(10, Duration::from_secs(60), Duration::ZERO);
        cache.set("short", &1u32, Some(Duration::from_millis(10))).unwrap();
        cache.set("long", &2u32, None).unwrap();
        std::thread::sleep(Duration::from_millis(30));

        let _ = cache.get::<u32>("long").unwrap();
        assert_eq!(cache.keys().unwrap(), vec!["long"]);
    }

    #[test]
    fn test_clear_prefix() {
        let cache = cache(10);
        cache.set("summary:1", &1u32, None).unwrap();
        cache.set("summary:2", &2u32, None).unwrap();
        cache.set("tags:1", &3u32, None).unwrap();

        assert_eq!(cache.clear_prefix("summary:").unwrap(), 2);
        assert_eq!(cache.keys().unwrap(), vec!["tags:1"]);
        assert_eq!(cache.clear().unwrap(), 1);
        assert_eq!(cache.stats().unwrap().deletes, 3);
    }

    #[test]
    fn test_concurrent_sets_keep_counters_consistent() {
        let cache = cache(10_000);
        std::thread::scope(|s| {
            for t in 0..8 {
                let cache = &cache;
                s.spawn(move || {
                    for i in 0..100 {
                        cache.set(&format!("{t}:{i}"), &i, None).unwrap();
                    }
                });
            }
        });
        let stats = cache.stats().unwrap();
        assert_eq!(stats.sets, 800);
        assert_eq!(stats.size, 800);
    }
}
