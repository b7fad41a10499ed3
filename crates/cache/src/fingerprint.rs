//! Operation fingerprints
//!
//! SHA-256 over the length-prefixed operation text, canonical variables JSON
//! (object keys sorted at every level) and operation name. The length prefix
//! keeps `("ab", "c")` and `("a", "bc")` apart.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Segment used in backend keys for operations without a name
pub const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    operation_name: Option<String>,
    digest: String,
}

impl Fingerprint {
    pub fn compute(query: &str, variables: &Value, operation_name: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        let canonical = canonical_json(variables);

        for part in [
            query.as_bytes(),
            canonical.as_bytes(),
            operation_name.unwrap_or("").as_bytes(),
        ] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }

        Self {
            operation_name: operation_name.map(str::to_string),
            digest: hex::encode(hasher.finalize()),
        }
    }

    /// Lowercase hex digest
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_deref()
    }

    /// Backend key: `<prefix>:<operation name or "anonymous">:<digest>`
    pub fn key(&self, prefix: &str) -> String {
        format!(
            "{prefix}:{}:{}",
            self.operation_name.as_deref().unwrap_or(ANONYMOUS),
            self.digest
        )
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest)
    }
}

/// Serialize with object keys sorted, independent of insertion order
pub fn canonical_json(value: &Value) -> String {
    fn write(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|(a, _), (b, _)| a.cmp(b));
                out.push('{');
                for (i, (key, item)) in entries.into_iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&Value::String(key.clone()).to_string());
                    out.push(':');
                    write(item, out);
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write(item, out);
                }
                out.push(']');
            }
            scalar => out.push_str(&scalar.to_string()),
        }
    }

    let mut out = String::new();
    write(value, &mut out);
    out
}
