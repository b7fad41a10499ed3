//! Errors raised by cache backends and entry encoding

use gazette_core::ApiError;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The backend could not serve the call
    #[error("cache backend {operation} failed: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    /// An entry could not be serialized or deserialized
    #[error("cache entry {key} could not be (de)serialized: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Deflate compression or decompression failed
    #[error("cache entry {key} could not be (de)compressed: {source}")]
    Compression {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Stored bytes do not follow the entry format
    #[error("cache entry {key} is corrupt: {reason}")]
    Corruption { key: String, reason: String },

    /// A key pattern is not a valid glob
    #[error("invalid key pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

impl CacheError {
    #[must_use]
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        CacheError::Backend {
            operation,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn corruption(key: impl Into<String>, reason: impl Into<String>) -> Self {
        CacheError::Corruption {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn serialization(key: impl Into<String>, source: serde_json::Error) -> Self {
        CacheError::Serialization {
            key: key.into(),
            source,
        }
    }

    pub fn compression(key: impl Into<String>, source: std::io::Error) -> Self {
        CacheError::Compression {
            key: key.into(),
            source,
        }
    }
}

/// Only administrative calls surface cache errors; callers see a generic
/// internal error, the detail stays in the log
impl From<CacheError> for ApiError {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::InvalidPattern { pattern, .. } => {
                ApiError::validation("pattern", format!("Invalid key pattern '{pattern}'"))
            }
            other => ApiError::internal(other.to_string()),
        }
    }
}
