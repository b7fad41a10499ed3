//! Response caching for gazette
//!
//! Responses to read-only operations are stored under a fingerprint of the
//! operation text, its variables and its name. Cached entries expire by TTL;
//! mutations never invalidate them, so a cached answer may trail a write by
//! at most `ttl_secs`. Administrative invalidation by operation name or key
//! pattern is available.
//!
//! The cache is an optimisation only. Backend failures degrade to a miss and
//! are logged; they never fail a request.

pub mod backend;
pub mod config;
pub mod entry;
pub mod errors;
pub mod fingerprint;
pub mod layer;
pub mod memory;
pub mod testing;

pub use backend::CacheBackend;
pub use config::ResponseCacheConfig;
pub use entry::CacheEntry;
pub use errors::{CacheError, Result};
pub use fingerprint::Fingerprint;
pub use layer::{CacheLookup, CacheStats, ResponseCache, SkipReason, StoreOutcome};
pub use memory::MemoryBackend;
