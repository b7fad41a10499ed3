//! Error taxonomy for gazette operations

mod builders;
mod types;

pub use types::{ApiError, ErrorCode, Result, StoreError};
