//! Builder methods and classification helpers for [`ApiError`]

use super::types::{ApiError, ErrorCode};
use crate::response::Location;
use serde_json::{Map, Value};

const GENERIC_INTERNAL_MESSAGE: &str = "An internal error occurred";

impl ApiError {
    /// Create a forbidden error with a reason
    #[must_use]
    pub fn forbidden(reason: impl Into<String>) -> Self {
        ApiError::Forbidden {
            reason: reason.into(),
        }
    }

    /// Create a not-found error for an entity kind
    #[must_use]
    pub fn not_found(entity: impl Into<String>) -> Self {
        ApiError::NotFound {
            entity: entity.into(),
        }
    }

    /// Create a validation error attributed to an input field
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Validation {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Create a validation error not tied to a single field
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        ApiError::Validation {
            field: None,
            message: message.into(),
        }
    }

    /// Create a malformed-operation error
    #[must_use]
    pub fn malformed(message: impl Into<String>, location: Option<Location>) -> Self {
        ApiError::MalformedOperation {
            message: message.into(),
            location,
        }
    }

    /// Create an internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal {
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidCredential => ErrorCode::InvalidCredential,
            Self::Unauthenticated => ErrorCode::Unauthenticated,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Validation { .. } => ErrorCode::ValidationError,
            Self::ComplexityLimit { .. } => ErrorCode::QueryComplexityLimitExceeded,
            Self::DepthLimit { .. } => ErrorCode::QueryDepthLimitExceeded,
            Self::MalformedOperation { .. } => ErrorCode::MalformedOperation,
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::Store(_) => ErrorCode::StoreError,
            Self::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// Whether the detail of this error must stay server-side
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Internal { .. })
    }

    /// Message safe to show the caller
    pub fn public_message(&self) -> String {
        if self.is_internal() {
            GENERIC_INTERNAL_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }

    /// Location in the operation document, for structural errors
    pub fn location(&self) -> Option<Location> {
        match self {
            Self::MalformedOperation { location, .. } => *location,
            _ => None,
        }
    }

    /// The `extensions` object: the code plus any machine-readable detail
    pub fn extensions(&self) -> Map<String, Value> {
        let mut extensions = Map::new();
        extensions.insert("code".into(), Value::from(self.code().as_str()));
        match self {
            Self::ComplexityLimit { measured, limit } | Self::DepthLimit { measured, limit } => {
                extensions.insert("measured".into(), Value::from(*measured));
                extensions.insert("limit".into(), Value::from(*limit));
            }
            Self::Validation {
                field: Some(field), ..
            } => {
                extensions.insert("field".into(), Value::from(field.as_str()));
            }
            Self::RateLimited { retry_after_secs } => {
                extensions.insert("retryAfter".into(), Value::from(*retry_after_secs));
            }
            _ => {}
        }
        extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;

    #[test]
    fn test_internal_errors_hide_detail() {
        let err = ApiError::from(StoreError {
            collection: "users".into(),
            operation: "find",
            message: "connection reset by peer 10.0.0.7".into(),
        });
        assert_eq!(err.code(), ErrorCode::StoreError);
        assert!(!err.public_message().contains("10.0.0.7"));

        let err = ApiError::internal("token encoding failed: key too short");
        assert_eq!(err.public_message(), GENERIC_INTERNAL_MESSAGE);
    }

    #[test]
    fn test_cost_extensions_carry_measured_and_limit() {
        let err = ApiError::DepthLimit {
            measured: 12,
            limit: 10,
        };
        let ext = err.extensions();
        assert_eq!(ext["code"], "QueryDepthLimitExceeded");
        assert_eq!(ext["measured"], 12);
        assert_eq!(ext["limit"], 10);
    }

    #[test]
    fn test_validation_extensions_name_the_field() {
        let err = ApiError::validation("email", "Email is already registered");
        let ext = err.extensions();
        assert_eq!(ext["code"], "ValidationError");
        assert_eq!(ext["field"], "email");
        assert_eq!(err.public_message(), "Email is already registered");
    }

    #[test]
    fn test_credential_failures_are_undifferentiated() {
        assert_eq!(
            ApiError::InvalidCredential.public_message(),
            "Invalid or expired credential"
        );
    }
}
