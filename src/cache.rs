//! Expiring key/value cache with tag-based invalidation.
//!
//! # Design Decisions
//! - `get_or_compute` does not coalesce concurrent misses; two callers may
//!   both compute and the last write wins
//! - Expired entries are removed lazily on read and by `purge_expired`
//! - Tag index entries may outlive the keys they name; lookups tolerate that

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::observability::metrics;

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
    tags: Vec<String>,
}

#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    tags: DashMap<String, HashSet<String>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            tags: DashMap::new(),
        }
    }

    /// Live value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(key)
            .and_then(|entry| (entry.expires_at > now).then(|| entry.value.clone()));

        if hit.is_none() {
            self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        metrics::record_cache_lookup(hit.is_some());
        hit
    }

    pub fn insert(&self, key: impl Into<String>, value: V, ttl: Duration, tags: &[&str]) {
        let key = key.into();
        for tag in tags {
            self.tags.entry((*tag).to_string()).or_default().insert(key.clone());
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
                tags: tags.iter().map(|t| (*t).to_string()).collect(),
            },
        );
        metrics::record_cache_size(self.entries.len());
    }

    /// Return the cached value or compute, store and return a fresh one.
    ///
    /// Errors from `compute` are returned and nothing is cached.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        tags: &[&str],
        compute: F,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute().await?;
        self.insert(key, value.clone(), ttl, tags);
        Ok(value)
    }

    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.remove(key);
        if let Some((_, entry)) = &removed {
            for tag in &entry.tags {
                if let Some(mut keys) = self.tags.get_mut(tag) {
                    keys.remove(key);
                }
                self.tags.remove_if(tag, |_, keys| keys.is_empty());
            }
        }
        metrics::record_cache_size(self.entries.len());
        removed.is_some()
    }

    /// Drop every entry carrying `tag`. Returns how many were removed.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let Some((_, keys)) = self.tags.remove(tag) else {
            return 0;
        };
        let removed = keys
            .iter()
            .filter(|key| {
                self.entries
                    .remove_if(key.as_str(), |_, entry| entry.tags.iter().any(|t| t == tag))
                    .is_some()
            })
            .count();
        tracing::debug!(tag, removed, "Cache tag invalidated");
        metrics::record_cache_size(self.entries.len());
        removed
    }

    /// Remove expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        metrics::record_cache_size(self.entries.len());
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = TtlCache::new();
        cache.insert("a", 1, Duration::from_secs(10), &[]);
        assert_eq!(cache.get("a"), Some(1));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_or_compute_caches_until_expiry() {
        let cache = TtlCache::new();
        let calls = AtomicUsize::new(0);
        let compute = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::convert::Infallible>("fresh".to_string())
        };

        let ttl = Duration::from_secs(5);
        assert_eq!(cache.get_or_compute("k", ttl, &[], compute).await.unwrap(), "fresh");
        assert_eq!(cache.get_or_compute("k", ttl, &[], compute).await.unwrap(), "fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        cache.get_or_compute("k", ttl, &[], compute).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_compute_error_is_not_cached() {
        let cache: TtlCache<u32> = TtlCache::new();
        let result = cache
            .get_or_compute("k", Duration::from_secs(5), &[], || async { Err::<u32, _>("down") })
            .await;
        assert_eq!(result, Err("down"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_tag_invalidation() {
        let cache = TtlCache::new();
        let ttl = Duration::from_secs(60);
        cache.insert("team:1:roster", 1, ttl, &["team:1"]);
        cache.insert("team:1:schedule", 2, ttl, &["team:1", "schedules"]);
        cache.insert("team:2:roster", 3, ttl, &["team:2"]);

        assert_eq!(cache.invalidate_tag("team:1"), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("team:2:roster"), Some(3));
        assert_eq!(cache.invalidate_tag("team:1"), 0);
    }

    #[test]
    fn test_invalidate_key() {
        let cache = TtlCache::new();
        cache.insert("k", 1, Duration::from_secs(60), &["t"]);
        assert!(cache.invalidate("k"));
        assert!(!cache.invalidate("k"));
        assert_eq!(cache.invalidate_tag("t"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = TtlCache::new();
        cache.insert("short", 1, Duration::from_secs(1), &[]);
        cache.insert("long", 2, Duration::from_secs(100), &[]);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
