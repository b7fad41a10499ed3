//! The response envelope
//!
//! Every operation, whether answered from cache or executed live, is shaped
//! into `{"data": ..., "errors": [...]}`. `errors` is omitted when empty.

use crate::errors::ApiError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One step of a response path: an object key or a list index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Field(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{i}"),
            PathSegment::Field(name) => f.write_str(name),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        PathSegment::Field(name.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// 1-based position in the operation document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

/// An entry of the `errors` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphError {
    pub message: String,
    pub path: Vec<PathSegment>,
    pub locations: Vec<Location>,
    pub extensions: Map<String, Value>,
}

impl GraphError {
    /// Shape an [`ApiError`] raised at `path`
    pub fn from_api(error: &ApiError, path: Vec<PathSegment>, locations: Vec<Location>) -> Self {
        let mut locations = locations;
        if locations.is_empty() {
            locations.extend(error.location());
        }
        Self {
            message: error.public_message(),
            path,
            locations,
            extensions: error.extensions(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.extensions.get("code").and_then(Value::as_str)
    }
}

impl From<&ApiError> for GraphError {
    fn from(error: &ApiError) -> Self {
        GraphError::from_api(error, Vec::new(), Vec::new())
    }
}

/// The `{data, errors}` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphError>,
}

impl Response {
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Partial result: data with null holes plus the errors that made them
    pub fn partial(data: Value, errors: Vec<GraphError>) -> Self {
        Self {
            data: Some(data),
            errors,
        }
    }

    /// Top-level failure: `data` is null
    pub fn failure(errors: Vec<GraphError>) -> Self {
        Self { data: None, errors }
    }

    pub fn from_error(error: &ApiError) -> Self {
        Self::failure(vec![GraphError::from(error)])
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
