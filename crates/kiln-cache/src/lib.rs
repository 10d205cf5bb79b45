//! Asynchronous resource cache for Kiln.
//!
//! Manages the lifecycle of expensive, lazily constructed resources such as
//! model weights: each resource is registered under a name with an async
//! constructor, built at most once at a time, reused while loaded, and
//! unloaded under capacity (LRU) or idle-time (TTL) pressure.
//!
//! # Quick Start
//!
//! ```no_run
//! use kiln_cache::{CacheConfig, ResourceCache};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache: ResourceCache<Vec<f32>> = ResourceCache::new(CacheConfig::default())?;
//!
//! cache.register("embeddings", || async {
//!     // Fetch and decode the weights here.
//!     Ok::<_, std::io::Error>(Arc::new(vec![0.0_f32; 1024]))
//! });
//!
//! let weights = cache.load("embeddings").await?;
//! assert_eq!(weights.len(), 1024);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`cache`]: the engine, its configuration, errors and statistics
//! - [`adapter`]: descriptors, loader registration and disposal helpers
//! - [`sweeper`]: optional background TTL sweep
//! - [`global`]: process-wide default instance

pub mod adapter;
pub mod cache;
pub mod global;
pub mod sweeper;

pub use adapter::{ResourceDescriptor, constructor_fn, release};
pub use cache::{
    CacheConfig, CacheConfigError, CacheError, CacheStats, Constructor, EntryInfo, EntryStatus,
    ResourceCache, SharedCause,
};
pub use kiln_abstraction::{BoxError, Disposable, ResourceError, ResourceLoader};
pub use sweeper::{SweeperHandle, spawn_sweeper};
