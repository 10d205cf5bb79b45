//! Resource caching system.
//!
//! This module provides the cache engine: a per-name state machine with
//! single-flight construction, least-recently-used eviction of loaded
//! resources, and TTL expiry of idle ones.

#[allow(clippy::module_inception)]
pub mod cache;
pub mod config;
pub mod error;
pub mod types;

pub use cache::ResourceCache;
pub use config::{CacheConfig, CacheConfigError};
pub use error::{CacheError, SharedCause};
pub use types::{CacheStats, Constructor, EntryInfo, EntryStatus};
