//! In-memory request cache.
//!
//! - Entries expire after a TTL; hits past `stale_after` are served while a
//!   background refresh runs
//! - One in-flight producer per key, shared by every concurrent caller
//! - Request keys are SHA-256 hashes of endpoint and sorted query

mod cached_client;
mod key;
mod layer;
mod traits;

pub use cached_client::CachedClient;
pub use key::RequestKey;
pub use layer::{CacheEntry, CacheLayer};
pub use traits::{CacheOptions, CacheResult, CacheSource, QueryKey};
