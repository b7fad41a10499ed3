//! Core error type definitions

use crate::response::Location;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type alias for gazette operations
pub type Result<T> = std::result::Result<T, ApiError>;

/// Classification surfaced to callers as `extensions.code`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidCredential,
    Unauthenticated,
    Forbidden,
    NotFound,
    ValidationError,
    QueryComplexityLimitExceeded,
    QueryDepthLimitExceeded,
    MalformedOperation,
    RateLimited,
    StoreError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredential => "InvalidCredential",
            Self::Unauthenticated => "Unauthenticated",
            Self::Forbidden => "Forbidden",
            Self::NotFound => "NotFound",
            Self::ValidationError => "ValidationError",
            Self::QueryComplexityLimitExceeded => "QueryComplexityLimitExceeded",
            Self::QueryDepthLimitExceeded => "QueryDepthLimitExceeded",
            Self::MalformedOperation => "MalformedOperation",
            Self::RateLimited => "RateLimited",
            Self::StoreError => "StoreError",
            Self::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a document store
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("store {operation} on '{collection}' failed: {message}")]
pub struct StoreError {
    pub collection: String,
    pub operation: &'static str,
    pub message: String,
}

/// Every user-visible failure of the request pipeline
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// Any credential verification failure; the reason is never disclosed
    #[error("Invalid or expired credential")]
    InvalidCredential,

    /// The operation requires an authenticated identity
    #[error("Authentication required")]
    Unauthenticated,

    /// Identity present but lacking ownership or role
    #[error("{reason}")]
    Forbidden { reason: String },

    /// Entity absent, or hidden from this identity
    #[error("{entity} not found")]
    NotFound { entity: String },

    /// Malformed input, optionally attributed to one input field
    #[error("{message}")]
    Validation {
        field: Option<String>,
        message: String,
    },

    /// Static cost estimate above the configured ceiling
    #[error("Query complexity of {measured} exceeds the maximum of {limit}")]
    ComplexityLimit { measured: u64, limit: u64 },

    /// Selection nesting above the configured ceiling
    #[error("Query depth of {measured} exceeds the maximum of {limit}")]
    DepthLimit { measured: u64, limit: u64 },

    /// The operation document or request body could not be understood
    #[error("{message}")]
    MalformedOperation {
        message: String,
        location: Option<Location>,
    },

    /// Rejected by the admission gate before the pipeline ran
    #[error("Too many requests, retry in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// Backing store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Any other unexpected failure
    #[error("{message}")]
    Internal { message: String },
}
