//! Key-value backend interface

use crate::errors::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Byte store with per-key expiry and glob key listing
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Live keys matching a glob pattern
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Delete `keys`, returning how many existed
    async fn del(&self, keys: &[String]) -> Result<u64>;
}
