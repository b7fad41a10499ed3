//! In-process cache backend

use crate::backend::CacheBackend;
use crate::errors::{CacheError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use gazette_core::{Clock, SystemClock};
use globset::Glob;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// Concurrent map with lazy expiry: stale slots are dropped when touched
#[derive(Debug)]
pub struct MemoryBackend {
    slots: DashMap<String, Slot>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: DashMap::new(),
            clock,
        }
    }

    /// Number of slots held, expired ones included
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every expired slot
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.expires_at > now);
        before - self.slots.len()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = self.clock.now();
        let value = match self.slots.get(key) {
            Some(slot) if slot.expires_at > now => return Ok(Some(slot.value.clone())),
            Some(_) => None,
            None => return Ok(None),
        };
        self.slots.remove_if(key, |_, slot| slot.expires_at <= now);
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.slots.insert(key.to_string(), Slot { value, expires_at });
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = Glob::new(pattern)
            .map_err(|source| CacheError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?
            .compile_matcher();
        let now = self.clock.now();
        let mut keys: Vec<String> = self
            .slots
            .iter()
            .filter(|entry| entry.value().expires_at > now && matcher.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        Ok(keys
            .iter()
            .filter(|key| self.slots.remove(key.as_str()).is_some())
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazette_core::ManualClock;

    fn backend() -> (MemoryBackend, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (MemoryBackend::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_set_get_expire() {
        let (backend, clock) = backend();
        backend
            .set("k", b"v".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));

        clock.advance(chrono::Duration::seconds(10));
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_huge_ttl_is_kept_until_the_end_of_time() {
        let (backend, clock) = backend();
        backend
            .set("k", b"v".to_vec(), Duration::from_secs(u64::MAX))
            .await
            .unwrap();
        backend
            .set("j", b"w".to_vec(), Duration::from_secs(1 << 40))
            .await
            .unwrap();

        clock.advance(chrono::Duration::days(365 * 1000));
        assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(backend.get("j").await.unwrap(), Some(b"w".to_vec()));
    }

    #[tokio::test]
    async fn test_keys_glob_and_delete() {
        let (backend, _) = backend();
        for key in ["gz:Posts:a", "gz:Posts:b", "gz:Post:c"] {
            backend
                .set(key, Vec::new(), Duration::from_secs(60))
                .await
                .unwrap();
        }

        let keys = backend.keys("gz:Posts:*").await.unwrap();
        assert_eq!(keys, vec!["gz:Posts:a".to_string(), "gz:Posts:b".to_string()]);
        assert_eq!(backend.del(&keys).await.unwrap(), 2);
        assert_eq!(backend.del(&keys).await.unwrap(), 0);
        assert_eq!(backend.keys("gz:*").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_pattern() {
        let (backend, _) = backend();
        assert!(matches!(
            backend.keys("[").await,
            Err(CacheError::InvalidPattern { .. })
        ));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (backend, clock) = backend();
        backend.set("short", Vec::new(), Duration::from_secs(1)).await.unwrap();
        backend.set("long", Vec::new(), Duration::from_secs(100)).await.unwrap();
        clock.advance(chrono::Duration::seconds(5));
        assert_eq!(backend.purge_expired(), 1);
        assert_eq!(backend.len(), 1);
    }
}
