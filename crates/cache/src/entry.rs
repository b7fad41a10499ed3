//! Stored entry format
//!
//! One format byte followed by the JSON-serialized [`CacheEntry`]:
//! `0` plain, `1` deflate-compressed.

use crate::errors::{CacheError, Result};
use chrono::{DateTime, Utc};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Read, Write};

pub const FORMAT_JSON: u8 = 0;
pub const FORMAT_DEFLATE: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn new(payload: Value, created_at: DateTime<Utc>, ttl_secs: u64) -> Self {
        Self {
            payload,
            created_at,
            ttl_secs,
        }
    }

    /// Whole seconds since the entry was created
    pub fn age_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.created_at).num_seconds()).unwrap_or(0)
    }

    /// A hit requires `now - created_at < ttl`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let elapsed_ms = i128::from((now - self.created_at).num_milliseconds());
        elapsed_ms < i128::from(self.ttl_secs) * 1000
    }
}

/// An encoded entry ready for the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub compressed: bool,
}

/// Encode `entry`, compressing when its JSON exceeds `compress_threshold`
pub fn encode(key: &str, entry: &CacheEntry, compress_threshold: usize) -> Result<Encoded> {
    let json = serde_json::to_vec(entry).map_err(|e| CacheError::serialization(key, e))?;

    if json.len() <= compress_threshold {
        let mut bytes = Vec::with_capacity(json.len() + 1);
        bytes.push(FORMAT_JSON);
        bytes.extend_from_slice(&json);
        return Ok(Encoded {
            bytes,
            compressed: false,
        });
    }

    let mut encoder = DeflateEncoder::new(vec![FORMAT_DEFLATE], Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| CacheError::compression(key, e))?;
    let bytes = encoder
        .finish()
        .map_err(|e| CacheError::compression(key, e))?;
    Ok(Encoded {
        bytes,
        compressed: true,
    })
}

pub fn decode(key: &str, bytes: &[u8]) -> Result<CacheEntry> {
    let Some((&format, body)) = bytes.split_first() else {
        return Err(CacheError::corruption(key, "empty entry"));
    };

    match format {
        FORMAT_JSON => serde_json::from_slice(body).map_err(|e| CacheError::serialization(key, e)),
        FORMAT_DEFLATE => {
            let mut json = Vec::new();
            DeflateDecoder::new(body)
                .read_to_end(&mut json)
                .map_err(|e| CacheError::compression(key, e))?;
            serde_json::from_slice(&json).map_err(|e| CacheError::serialization(key, e))
        }
        other => Err(CacheError::corruption(
            key,
            format!("unknown format byte {other}"),
        )),
    }
}
