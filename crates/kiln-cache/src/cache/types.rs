//! Core data types for resource caching.

use futures::future::{BoxFuture, Shared};
use kiln_abstraction::BoxError;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::error::CacheError;

/// Asynchronous zero-argument factory stored with each entry.
///
/// Called once per load attempt from `Idle` or `Error`.
pub type Constructor<R> =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Arc<R>, BoxError>> + Send + Sync>;

/// The construction shared by every caller that requested the entry while it was loading.
pub(crate) type Flight<R> = Shared<BoxFuture<'static, Result<Arc<R>, CacheError>>>;

/// Lifecycle state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Registered but not materialized. Also reported for unknown names.
    Idle,
    /// A construction is in flight.
    Loading,
    /// The resource is materialized and held by the cache.
    Loaded,
    /// The last construction attempt failed.
    Error,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// State payload of an entry. Each variant carries exactly the data valid in that state.
pub(crate) enum Slot<R: ?Sized> {
    Idle,
    Loading { flight: Flight<R>, flight_id: u64 },
    Loaded(Arc<R>),
    Error(CacheError),
}

/// One registered resource.
pub(crate) struct CacheEntry<R: ?Sized> {
    pub(crate) constructor: Constructor<R>,
    pub(crate) slot: Slot<R>,
    pub(crate) last_accessed: Instant,
    pub(crate) load_count: u64,
}

impl<R: ?Sized> CacheEntry<R> {
    pub(crate) fn new(constructor: Constructor<R>) -> Self {
        Self { constructor, slot: Slot::Idle, last_accessed: Instant::now(), load_count: 0 }
    }

    pub(crate) fn status(&self) -> EntryStatus {
        match self.slot {
            Slot::Idle => EntryStatus::Idle,
            Slot::Loading { .. } => EntryStatus::Loading,
            Slot::Loaded(_) => EntryStatus::Loaded,
            Slot::Error(_) => EntryStatus::Error,
        }
    }

    pub(crate) fn resource(&self) -> Option<&Arc<R>> {
        match &self.slot {
            Slot::Loaded(resource) => Some(resource),
            _ => None,
        }
    }

    pub(crate) fn is_loaded(&self) -> bool {
        matches!(self.slot, Slot::Loaded(_))
    }

    /// Update the last accessed timestamp.
    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_accessed = now;
    }

    /// Drops the materialized resource, returning it so the caller can release it outside the lock.
    pub(crate) fn take_resource(&mut self) -> Option<Arc<R>> {
        if !self.is_loaded() {
            return None;
        }
        match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Loaded(resource) => Some(resource),
            _ => None,
        }
    }

    pub(crate) fn info(&self, name: &str, now: Instant) -> EntryInfo {
        let last_error = match &self.slot {
            Slot::Error(err) => Some(err.to_string()),
            _ => None,
        };
        EntryInfo {
            name: name.to_string(),
            status: self.status(),
            idle_for: now.saturating_duration_since(self.last_accessed),
            load_count: self.load_count,
            last_error,
        }
    }
}

impl<R: ?Sized> fmt::Debug for CacheEntry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("status", &self.status())
            .field("last_accessed", &self.last_accessed)
            .field("load_count", &self.load_count)
            .finish_non_exhaustive()
    }
}

/// Point-in-time snapshot of one entry, for observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    /// The registered name.
    pub name: String,
    /// Current lifecycle state.
    pub status: EntryStatus,
    /// Time since the entry was last requested.
    pub idle_for: Duration,
    /// Number of successful constructions so far.
    pub load_count: u64,
    /// Message of the failure that put the entry in `Error`.
    pub last_error: Option<String>,
}

/// Cache statistics for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Loads served from an already loaded entry.
    pub hits: u64,
    /// Loads (and preloads) that started a construction.
    pub misses: u64,
    /// Resources unloaded to stay within `max_cache_size`.
    pub evictions: u64,
    /// Resources unloaded by the TTL sweep.
    pub expirations: u64,
    /// Constructions that ended in failure.
    pub load_failures: u64,
    /// Current number of registered entries.
    pub registered: usize,
    /// Current number of loaded entries.
    pub loaded: usize,
}
