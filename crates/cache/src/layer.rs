//! The response cache consulted by the execution pipeline

use crate::backend::CacheBackend;
use crate::config::ResponseCacheConfig;
use crate::entry::{self, CacheEntry};
use crate::errors::Result;
use crate::fingerprint::Fingerprint;
use gazette_core::Clock;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit { payload: Value, age: u64 },
    Miss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    Excluded,
    HasErrors,
    TooLarge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored { bytes: usize, compressed: bool },
    Skipped(SkipReason),
    /// The backend refused the write; already logged
    Failed,
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub skipped: u64,
    pub errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
    config: ResponseCacheConfig,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl ResponseCache {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        config: ResponseCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            config,
            clock,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &ResponseCacheConfig {
        &self.config
    }

    /// Whether responses to this operation may be looked up or stored at all
    pub fn is_cacheable(&self, operation_name: Option<&str>) -> bool {
        self.config.enabled && !self.config.is_excluded(operation_name)
    }

    /// Find a fresh entry. Backend and decoding failures count as a miss.
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> CacheLookup {
        let key = fingerprint.key(&self.config.key_prefix);

        let bytes = match self.backend.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                bump(&self.counters.misses);
                return CacheLookup::Miss;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "cache lookup failed");
                bump(&self.counters.errors);
                bump(&self.counters.misses);
                return CacheLookup::Miss;
            }
        };

        let entry = match entry::decode(&key, &bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "discarding unreadable cache entry");
                bump(&self.counters.errors);
                bump(&self.counters.misses);
                return CacheLookup::Miss;
            }
        };

        let now = self.clock.now();
        if !entry.is_fresh(now) {
            debug!(key = %key, "cache entry expired");
            bump(&self.counters.misses);
            return CacheLookup::Miss;
        }

        bump(&self.counters.hits);
        CacheLookup::Hit {
            age: entry.age_secs(now),
            payload: entry.payload,
        }
    }

    /// Store a live result. Never fails the caller.
    pub async fn store(
        &self,
        fingerprint: &Fingerprint,
        payload: &Value,
        has_errors: bool,
    ) -> StoreOutcome {
        let reason = if !self.config.enabled {
            Some(SkipReason::Disabled)
        } else if self.config.is_excluded(fingerprint.operation_name()) {
            Some(SkipReason::Excluded)
        } else if has_errors {
            Some(SkipReason::HasErrors)
        } else {
            None
        };
        if let Some(reason) = reason {
            return self.skip(reason);
        }

        let key = fingerprint.key(&self.config.key_prefix);
        let entry = CacheEntry::new(payload.clone(), self.clock.now(), self.config.ttl_secs);
        let encoded = match entry::encode(&key, &entry, self.config.compress_threshold_bytes) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to encode cache entry");
                bump(&self.counters.errors);
                return StoreOutcome::Failed;
            }
        };

        if encoded.bytes.len() > self.config.max_payload_bytes {
            debug!(key = %key, bytes = encoded.bytes.len(), "response too large to cache");
            return self.skip(SkipReason::TooLarge);
        }

        let bytes = encoded.bytes.len();
        let ttl = Duration::from_secs(self.config.ttl_secs);
        match self.backend.set(&key, encoded.bytes, ttl).await {
            Ok(()) => {
                bump(&self.counters.stores);
                debug!(key = %key, bytes, compressed = encoded.compressed, "response cached");
                StoreOutcome::Stored {
                    bytes,
                    compressed: encoded.compressed,
                }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "cache write failed");
                bump(&self.counters.errors);
                StoreOutcome::Failed
            }
        }
    }

    fn skip(&self, reason: SkipReason) -> StoreOutcome {
        bump(&self.counters.skipped);
        StoreOutcome::Skipped(reason)
    }

    /// Drop every cached response of a named operation
    pub async fn invalidate_operation(&self, operation_name: &str) -> Result<u64> {
        self.invalidate_pattern(&format!("{operation_name}:*")).await
    }

    /// Drop cached responses whose key, after the prefix, matches `pattern`
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<u64> {
        let full = format!("{}:{pattern}", self.config.key_prefix);
        let keys = self.backend.keys(&full).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = self.backend.del(&keys).await?;
        debug!(pattern = %full, removed, "cache entries invalidated");
        Ok(removed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::testing::FailingBackend;
    use gazette_core::ManualClock;
    use serde_json::json;

    struct Fixture {
        cache: ResponseCache,
        clock: Arc<ManualClock>,
    }

    fn fixture(config: ResponseCacheConfig) -> Fixture {
        let clock = Arc::new(ManualClock::default());
        let backend = Arc::new(MemoryBackend::new(clock.clone()));
        Fixture {
            cache: ResponseCache::new(backend, config, clock.clone()),
            clock,
        }
    }

    fn posts() -> Fingerprint {
        Fingerprint::compute("query Posts { posts { id } }", &json!({}), Some("Posts"))
    }

    #[tokio::test]
    async fn test_store_then_hit() {
        let fx = fixture(ResponseCacheConfig::default());
        let payload = json!({"posts": [{"id": "p1"}]});

        assert_eq!(fx.cache.lookup(&posts()).await, CacheLookup::Miss);
        assert!(matches!(
            fx.cache.store(&posts(), &payload, false).await,
            StoreOutcome::Stored { compressed: false, .. }
        ));

        fx.clock.advance(chrono::Duration::seconds(3));
        assert_eq!(
            fx.cache.lookup(&posts()).await,
            CacheLookup::Hit { payload, age: 3 }
        );
        let stats = fx.cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.stores), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let fx = fixture(ResponseCacheConfig {
            ttl_secs: 10,
            ..ResponseCacheConfig::default()
        });
        fx.cache.store(&posts(), &json!({"posts": []}), false).await;

        fx.clock.advance(chrono::Duration::seconds(9));
        assert!(matches!(fx.cache.lookup(&posts()).await, CacheLookup::Hit { .. }));

        fx.clock.advance(chrono::Duration::seconds(1));
        assert_eq!(fx.cache.lookup(&posts()).await, CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_skip_reasons() {
        let fx = fixture(ResponseCacheConfig::default());
        assert_eq!(
            fx.cache.store(&posts(), &json!({}), true).await,
            StoreOutcome::Skipped(SkipReason::HasErrors)
        );

        let me = Fingerprint::compute("query Me { me { id } }", &json!({}), Some("Me"));
        assert!(!fx.cache.is_cacheable(Some("Me")));
        assert_eq!(
            fx.cache.store(&me, &json!({}), false).await,
            StoreOutcome::Skipped(SkipReason::Excluded)
        );

        let disabled = fixture(ResponseCacheConfig {
            enabled: false,
            ..ResponseCacheConfig::default()
        });
        assert!(!disabled.cache.is_cacheable(Some("Posts")));
        assert_eq!(
            disabled.cache.store(&posts(), &json!({}), false).await,
            StoreOutcome::Skipped(SkipReason::Disabled)
        );
        assert_eq!(fx.cache.stats().skipped, 2);
    }

    #[tokio::test]
    async fn test_compression_and_size_ceiling() {
        let fx = fixture(ResponseCacheConfig {
            compress_threshold_bytes: 256,
            max_payload_bytes: 4096,
            ..ResponseCacheConfig::default()
        });
        let repetitive = json!({"body": "x".repeat(20_000)});
        assert!(matches!(
            fx.cache.store(&posts(), &repetitive, false).await,
            StoreOutcome::Stored { compressed: true, .. }
        ));
        assert!(matches!(fx.cache.lookup(&posts()).await, CacheLookup::Hit { .. }));

        let noisy: Vec<String> = (0..2000).map(|i| format!("{i:x}-{}", i * 7919)).collect();
        let other = Fingerprint::compute("query Big { posts { id } }", &json!({}), Some("Big"));
        assert_eq!(
            fx.cache.store(&other, &json!({"ids": noisy}), false).await,
            StoreOutcome::Skipped(SkipReason::TooLarge)
        );
    }

    #[tokio::test]
    async fn test_backend_failure_degrades() {
        let backend = Arc::new(FailingBackend::new());
        let cache = ResponseCache::new(
            backend.clone(),
            ResponseCacheConfig::default(),
            Arc::new(ManualClock::default()),
        );
        assert_eq!(cache.lookup(&posts()).await, CacheLookup::Miss);
        assert_eq!(
            cache.store(&posts(), &json!({}), false).await,
            StoreOutcome::Failed
        );
        assert_eq!(backend.calls(), 2);
        assert_eq!(cache.stats().errors, 2);
        assert!(cache.invalidate_operation("Posts").await.is_err());
    }

    #[tokio::test]
    async fn test_invalidation() {
        let fx = fixture(ResponseCacheConfig::default());
        let feed = Fingerprint::compute("query Feed { posts { id } }", &json!({}), Some("Feed"));
        let anon = Fingerprint::compute("{ posts { id } }", &json!({}), None);
        for fp in [&posts(), &feed, &anon] {
            fx.cache.store(fp, &json!({}), false).await;
        }

        assert_eq!(fx.cache.invalidate_operation("Posts").await.unwrap(), 1);
        assert_eq!(fx.cache.lookup(&posts()).await, CacheLookup::Miss);
        assert!(matches!(fx.cache.lookup(&feed).await, CacheLookup::Hit { .. }));

        assert_eq!(fx.cache.invalidate_pattern("*").await.unwrap(), 2);
        assert_eq!(fx.cache.invalidate_pattern("*").await.unwrap(), 0);
    }
}
