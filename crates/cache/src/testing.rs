//! Backend doubles for tests

use crate::backend::CacheBackend;
use crate::errors::{CacheError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Fails every call, counting how often it was asked
#[derive(Debug, Default)]
pub struct FailingBackend {
    calls: AtomicU64,
}

impl FailingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self, operation: &'static str) -> Result<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::backend(operation, "backend unavailable"))
    }
}

#[async_trait]
impl CacheBackend for FailingBackend {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        self.fail("get")
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<()> {
        self.fail("set")
    }

    async fn keys(&self, _pattern: &str) -> Result<Vec<String>> {
        self.fail("keys")
    }

    async fn del(&self, _keys: &[String]) -> Result<u64> {
        self.fail("del")
    }
}
