//! Response cache settings

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseCacheConfig {
    pub enabled: bool,
    /// Lifetime of a cached response; also the staleness bound after a write
    pub ttl_secs: u64,
    /// First segment of every backend key
    pub key_prefix: String,
    /// Payloads larger than this are deflate-compressed
    pub compress_threshold_bytes: usize,
    /// Encoded entries larger than this are not stored
    pub max_payload_bytes: usize,
    /// Operation names that are never cached
    pub excluded_operations: Vec<String>,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 60,
            key_prefix: "gazette".to_string(),
            compress_threshold_bytes: 8 * 1024,
            max_payload_bytes: 1024 * 1024,
            excluded_operations: vec!["Me".into(), "me".into(), "CacheStats".into()],
        }
    }
}

impl ResponseCacheConfig {
    pub fn is_excluded(&self, operation_name: Option<&str>) -> bool {
        operation_name.is_some_and(|name| self.excluded_operations.iter().any(|e| e == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ResponseCacheConfig =
            serde_json::from_str(r#"{"ttl_secs": 5, "excluded_operations": ["Feed"]}"#).unwrap();
        assert_eq!(config.ttl_secs, 5);
        assert!(config.enabled);
        assert!(config.is_excluded(Some("Feed")));
        assert!(!config.is_excluded(Some("Me")));
        assert!(!config.is_excluded(None));
    }
}
