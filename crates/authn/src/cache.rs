//! TTL cache for application configuration.
//!
//! A read-through cache in front of the [`ConfigStore`]: the key manager
//! consults it on every verification, so registered apps cost one storage
//! read per TTL rather than one per request.
//!
//! # Staleness contract
//!
//! An entry is never served past its TTL. There is no stale-on-error
//! fallback tier: when the store is down and the entry has expired, the
//! lookup fails, because serving a revoked key is worse than failing a
//! request. Mutations refresh the cache with the value they just wrote, so
//! a writer immediately reads its own writes.
//!
//! [`ConfigStore`]: signet_storage::ConfigStore

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;

use signet_storage::AppConfig;

/// Point-in-time cache statistics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CacheStats {
    /// Entries currently resident.
    pub entries: u64,
    /// Lookups answered from the cache since construction.
    pub hits: u64,
    /// Lookups that had to go to the store since construction.
    pub misses: u64,
    /// `hits / (hits + misses)`, or 0.0 before any lookup.
    pub hit_rate: f64,
}

/// TTL-bounded cache of [`AppConfig`] records keyed by app ID.
///
/// Entries are stored as `Arc<AppConfig>` so a hit clones a pointer, not a
/// record full of PEM strings.
pub struct ConfigCache {
    entries: Cache<String, Arc<AppConfig>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ConfigCache {
    /// Creates a cache holding entries for `ttl`, evicting beyond
    /// `max_capacity`.
    #[must_use]
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder().time_to_live(ttl).max_capacity(max_capacity).build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Looks up an app, counting the hit or miss.
    pub async fn get(&self, app_id: &str) -> Option<Arc<AppConfig>> {
        match self.entries.get(app_id).await {
            Some(config) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(config)
            },
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            },
        }
    }

    /// Inserts or refreshes an entry, restarting its TTL.
    pub async fn insert(&self, config: Arc<AppConfig>) {
        self.entries.insert(config.app_id.clone(), config).await;
    }

    /// Drops one app's entry.
    ///
    /// Emitted as an audit event: invalidation is how revocation takes
    /// effect before TTL expiry, so operators need a trail.
    pub async fn invalidate(&self, app_id: &str) {
        self.entries.invalidate(app_id).await;
        tracing::info!(
            audit.action = "cache_invalidate",
            audit.resource = %app_id,
            audit.result = "success",
            "app config cache entry invalidated",
        );
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.invalidate_all();
        tracing::info!(
            audit.action = "cache_clear",
            audit.resource = "*",
            audit.result = "success",
            "app config cache cleared",
        );
    }

    /// Current statistics snapshot.
    ///
    /// `entries` is moka's estimate and may lag behind recent inserts until
    /// pending maintenance runs; hit and miss counts are exact.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            entries: self.entries.entry_count(),
            hits,
            misses,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }

    /// Forces moka's pending maintenance so `entry_count` is exact.
    #[cfg(test)]
    pub(crate) async fn sync(&self) {
        self.entries.run_pending_tasks().await;
    }
}

impl std::fmt::Debug for ConfigCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigCache").field("stats", &self.stats()).finish()
    }
}
