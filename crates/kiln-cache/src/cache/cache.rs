//! ResourceCache implementation with single-flight loading, LRU eviction and TTL expiry.

use futures::FutureExt;
use kiln_abstraction::{BoxError, ResourceLoader};
use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::{CacheConfig, CacheConfigError};
use super::error::CacheError;
use super::types::{CacheEntry, CacheStats, Constructor, EntryInfo, EntryStatus, Flight, Slot};
use crate::adapter::{ResourceDescriptor, constructor_fn};

/// Cache for expensive, lazily constructed resources.
///
/// Each registered name owns one entry that moves through
/// `Idle → Loading → Loaded | Error`. Concurrent loads of the same name share
/// a single construction, loaded entries are reused until they are unloaded,
/// evicted (least recently used first, once more than `max_cache_size` are
/// loaded) or expired by [`ResourceCache::cleanup_expired`].
///
/// The handle is cheap to clone; clones share the same entry table.
/// Constructions run on Tokio tasks, so `load` and `preload` must be called
/// from within a Tokio runtime.
pub struct ResourceCache<R: ?Sized> {
    inner: Arc<Inner<R>>,
}

struct Inner<R: ?Sized> {
    /// Entry table and counters, guarded together so every transition is atomic.
    state: Mutex<State<R>>,
    /// Cache configuration.
    config: CacheConfig,
    /// Identifies constructions so stale results can be discarded.
    next_flight_id: AtomicU64,
}

struct State<R: ?Sized> {
    entries: HashMap<String, CacheEntry<R>>,
    stats: CacheStats,
}

/// Result of the synchronous part of a load.
enum Acquired<R: ?Sized> {
    Ready(Arc<R>),
    Pending(Flight<R>),
}

impl<R> ResourceCache<R>
where
    R: ?Sized + Send + Sync + 'static,
{
    /// Create a new resource cache with the given configuration.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if the configuration is invalid.
    pub fn new(config: CacheConfig) -> Result<Self, CacheConfigError> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    fn from_validated(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State { entries: HashMap::new(), stats: CacheStats::default() }),
                config,
                next_flight_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a resource under `name` without constructing it.
    ///
    /// Registering a name twice keeps the first constructor and logs a warning.
    ///
    /// # Returns
    /// `true` if a new entry was created.
    pub fn register<F, Fut, E>(&self, name: impl Into<String>, constructor: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<R>, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        self.register_constructor(name, constructor_fn(constructor))
    }

    /// Register an already boxed constructor.
    pub fn register_constructor(&self, name: impl Into<String>, constructor: Constructor<R>) -> bool {
        let mut state = self.inner.lock();
        insert_entry(&mut state.entries, name.into(), constructor)
    }

    /// Register a name/constructor pair.
    pub fn register_descriptor(&self, descriptor: ResourceDescriptor<R>) -> bool {
        let (name, constructor) = descriptor.into_parts();
        self.register_constructor(name, constructor)
    }

    /// Register a [`ResourceLoader`] under its own name.
    pub fn register_loader<L>(&self, loader: Arc<L>) -> bool
    where
        L: ResourceLoader<Resource = R> + 'static,
    {
        self.register_descriptor(ResourceDescriptor::from_loader(loader))
    }

    /// Current status of `name`. Unknown names report `Idle`.
    pub fn status(&self, name: &str) -> EntryStatus {
        self.inner.lock().entries.get(name).map_or(EntryStatus::Idle, CacheEntry::status)
    }

    /// Get the resource registered under `name`, constructing it if needed.
    ///
    /// A loaded entry is returned immediately. While a construction is in
    /// flight every caller awaits that same construction, so the constructor
    /// runs once no matter how many callers arrive. Dropping the returned
    /// future does not cancel the construction.
    ///
    /// # Errors
    /// `NotRegistered` for unknown names, `ConstructionFailed` (shared by all
    /// joined callers) when the constructor fails.
    pub async fn load(&self, name: &str) -> Result<Arc<R>, CacheError> {
        match self.begin_load(name, None)? {
            Acquired::Ready(resource) => Ok(resource),
            Acquired::Pending(flight) => flight.await,
        }
    }

    /// Like [`ResourceCache::load`], registering `constructor` first if `name` is unknown.
    ///
    /// The constructor is ignored when the name is already registered.
    pub async fn load_with<F, Fut, E>(&self, name: &str, constructor: F) -> Result<Arc<R>, CacheError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<R>, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        match self.begin_load(name, Some(constructor_fn(constructor)))? {
            Acquired::Ready(resource) => Ok(resource),
            Acquired::Pending(flight) => flight.await,
        }
    }

    /// Start constructing `name` in the background if it is `Idle`.
    ///
    /// Entries that are loading, loaded or failed are left alone. Failures are
    /// logged and never reported to the caller.
    ///
    /// # Returns
    /// `true` if a construction was started.
    pub fn preload(&self, name: &str) -> bool {
        let mut state = self.inner.lock();
        let State { entries, stats } = &mut *state;

        let Some(entry) = entries.get_mut(name) else {
            warn!(name, "Preload requested for unregistered resource");
            return false;
        };

        let status = entry.status();
        if status != EntryStatus::Idle {
            debug!(name, %status, "Skipping preload");
            return false;
        }

        entry.touch(Instant::now());
        // Detached: the construction task settles the entry whether or not anyone awaits it.
        let _flight = self.start_flight(name, entry, stats);
        true
    }

    /// Drop the cache's reference to a loaded resource and return the entry to `Idle`.
    ///
    /// No-op unless the entry is `Loaded`. Any resource-specific teardown is up
    /// to the caller.
    ///
    /// # Returns
    /// `true` if a resource was unloaded.
    pub fn unload(&self, name: &str) -> bool {
        self.take(name).is_some()
    }

    /// Unload `name` and hand the resource back to the caller, e.g. to dispose of it.
    pub fn take(&self, name: &str) -> Option<Arc<R>> {
        let resource = self.inner.lock().entries.get_mut(name).and_then(CacheEntry::take_resource);
        if resource.is_some() {
            info!(name, "Unloaded resource");
        }
        resource
    }

    /// Unload every loaded resource idle for longer than the configured TTL.
    ///
    /// Intended to be called periodically, see [`crate::sweeper::spawn_sweeper`].
    ///
    /// # Returns
    /// The number of resources unloaded.
    pub fn cleanup_expired(&self) -> usize {
        let ttl = self.inner.config.ttl();
        let now = Instant::now();

        let expired: Vec<Arc<R>> = {
            let mut state = self.inner.lock();
            let State { entries, stats } = &mut *state;
            let mut expired = Vec::new();

            for (name, entry) in entries.iter_mut() {
                if !entry.is_loaded() || now.saturating_duration_since(entry.last_accessed) <= ttl {
                    continue;
                }
                if let Some(resource) = entry.take_resource() {
                    stats.expirations += 1;
                    info!(name = %name, ttl_ms = self.inner.config.cache_ttl_millis, "Expired idle resource");
                    expired.push(resource);
                }
            }

            expired
        };

        expired.len()
    }

    /// Remove every entry, registrations included, and reset statistics.
    ///
    /// Constructions still in flight complete but their results are discarded.
    pub fn dispose(&self) {
        let entries = {
            let mut state = self.inner.lock();
            state.stats = CacheStats::default();
            std::mem::take(&mut state.entries)
        };

        let loaded = entries.values().filter(|entry| entry.is_loaded()).count();
        info!(cleared_count = entries.len(), loaded, "Disposed resource cache");
    }

    /// The loaded resource for `name`, without refreshing its access time.
    pub fn peek(&self, name: &str) -> Option<Arc<R>> {
        self.inner.lock().entries.get(name).and_then(CacheEntry::resource).cloned()
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().entries.contains_key(name)
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether no entries are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries currently loaded.
    pub fn loaded_count(&self) -> usize {
        self.inner.lock().entries.values().filter(|entry| entry.is_loaded()).count()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of a single entry.
    pub fn entry_info(&self, name: &str) -> Option<EntryInfo> {
        let now = Instant::now();
        self.inner.lock().entries.get(name).map(|entry| entry.info(name, now))
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let state = self.inner.lock();
        let mut result = state.stats.clone();
        result.registered = state.entries.len();
        result.loaded = state.entries.values().filter(|entry| entry.is_loaded()).count();
        result
    }

    /// Get the cache configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// The synchronous half of a load: registration, access time, and the
    /// `Idle | Error → Loading` transition happen under one lock acquisition.
    fn begin_load(
        &self,
        name: &str,
        constructor: Option<Constructor<R>>,
    ) -> Result<Acquired<R>, CacheError> {
        let mut state = self.inner.lock();
        let State { entries, stats } = &mut *state;

        if let Some(constructor) = constructor
            && !entries.contains_key(name)
        {
            insert_entry(entries, name.to_string(), constructor);
        }

        let entry = entries.get_mut(name).ok_or_else(|| CacheError::not_registered(name))?;
        entry.touch(Instant::now());

        match &entry.slot {
            Slot::Loaded(resource) => {
                stats.hits += 1;
                debug!(name, "Cache hit");
                return Ok(Acquired::Ready(Arc::clone(resource)));
            }
            Slot::Loading { flight, flight_id } => {
                debug!(name, flight_id, "Joining in-flight construction");
                return Ok(Acquired::Pending(flight.clone()));
            }
            Slot::Idle | Slot::Error(_) => {}
        }

        Ok(Acquired::Pending(self.start_flight(name, entry, stats)))
    }

    /// Move `entry` to `Loading` and spawn its construction.
    ///
    /// Must be called with the state lock held; the constructor itself runs on
    /// the spawned task, never under the lock.
    fn start_flight(&self, name: &str, entry: &mut CacheEntry<R>, stats: &mut CacheStats) -> Flight<R> {
        let flight_id = self.inner.next_flight_id.fetch_add(1, Ordering::Relaxed);
        let constructor = Arc::clone(&entry.constructor);
        stats.misses += 1;
        info!(name, flight_id, "Constructing resource");

        let owner = Arc::downgrade(&self.inner);
        let task_name = name.to_string();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let construction = AssertUnwindSafe(async move { constructor().await }).catch_unwind();
            let outcome = match construction.await {
                Ok(Ok(resource)) => Ok(resource),
                Ok(Err(cause)) => Err(CacheError::construction(&task_name, cause)),
                Err(payload) => Err(CacheError::construction(&task_name, panic_cause(payload))),
            };
            settle(&owner, &task_name, flight_id, &outcome, started.elapsed());
            outcome
        });

        let owner = Arc::downgrade(&self.inner);
        let waiter_name = name.to_string();
        let flight = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    // The task was cancelled before it could settle the entry (runtime shutdown).
                    let outcome = Err(CacheError::construction(&waiter_name, Box::new(join_error)));
                    settle(&owner, &waiter_name, flight_id, &outcome, Duration::ZERO);
                    outcome
                }
            }
        }
        .boxed()
        .shared();

        entry.slot = Slot::Loading { flight: flight.clone(), flight_id };
        flight
    }
}

impl ResourceCache<dyn Any + Send + Sync> {
    /// Load `name` and downcast it to `T`.
    ///
    /// # Errors
    /// Everything `load` returns, plus `TypeMismatch` if the resource is not a `T`.
    pub async fn load_as<T>(&self, name: &str) -> Result<Arc<T>, CacheError>
    where
        T: Any + Send + Sync,
    {
        let resource = self.load(name).await?;
        resource.downcast::<T>().map_err(|_| CacheError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
        })
    }
}

impl<R: ?Sized> Inner<R> {
    /// Lock the entry table. A poisoned lock is recovered: every transition
    /// leaves the table consistent before anything that could panic runs.
    fn lock(&self) -> MutexGuard<'_, State<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R: ?Sized> Clone for ResourceCache<R> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<R> Default for ResourceCache<R>
where
    R: ?Sized + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::from_validated(CacheConfig::default())
    }
}

impl<R: ?Sized> fmt::Debug for ResourceCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("ResourceCache")
            .field("config", &self.inner.config)
            .field("entries", &state.entries)
            .finish()
    }
}

fn insert_entry<R: ?Sized>(
    entries: &mut HashMap<String, CacheEntry<R>>,
    name: String,
    constructor: Constructor<R>,
) -> bool {
    match entries.entry(name) {
        Entry::Occupied(occupied) => {
            warn!(name = %occupied.key(), "Resource already registered, keeping existing constructor");
            false
        }
        Entry::Vacant(vacant) => {
            debug!(name = %vacant.key(), "Registered resource");
            vacant.insert(CacheEntry::new(constructor));
            true
        }
    }
}

/// Record the outcome of construction `flight_id` on its entry.
///
/// Ignored if the cache is gone, or the entry was removed or restarted in the meantime.
fn settle<R>(
    owner: &Weak<Inner<R>>,
    name: &str,
    flight_id: u64,
    outcome: &Result<Arc<R>, CacheError>,
    elapsed: Duration,
) where
    R: ?Sized + Send + Sync + 'static,
{
    let Some(inner) = owner.upgrade() else {
        return;
    };

    let evicted = {
        let mut state = inner.lock();
        let State { entries, stats } = &mut *state;

        let current = entries.get_mut(name).filter(
            |entry| matches!(entry.slot, Slot::Loading { flight_id: id, .. } if id == flight_id),
        );
        let Some(entry) = current else {
            debug!(name, flight_id, "Discarding construction result for a removed entry");
            return;
        };

        match outcome {
            Ok(resource) => {
                entry.slot = Slot::Loaded(Arc::clone(resource));
                entry.load_count += 1;
                info!(name, elapsed_ms = elapsed.as_millis() as u64, "Resource loaded");
                evict_least_recently_used(entries, stats, inner.config.max_cache_size, name)
            }
            Err(err) => {
                entry.slot = Slot::Error(err.clone());
                stats.load_failures += 1;
                warn!(name, error = %err, "Resource construction failed");
                Vec::new()
            }
        }
    };

    // Released outside the lock so resource destructors cannot re-enter the cache.
    drop(evicted);
}

/// Unload the least recently accessed loaded entries until at most `capacity` remain loaded.
///
/// Only `Loaded` entries are candidates; `admitted` (the entry that just
/// finished loading) is never evicted. Ties on access time are broken by name.
fn evict_least_recently_used<R: ?Sized>(
    entries: &mut HashMap<String, CacheEntry<R>>,
    stats: &mut CacheStats,
    capacity: usize,
    admitted: &str,
) -> Vec<Arc<R>> {
    let loaded = entries.values().filter(|entry| entry.is_loaded()).count();
    if loaded <= capacity {
        return Vec::new();
    }

    let mut candidates: Vec<(Instant, String)> = entries
        .iter()
        .filter(|(name, entry)| entry.is_loaded() && name.as_str() != admitted)
        .map(|(name, entry)| (entry.last_accessed, name.clone()))
        .collect();
    candidates.sort();

    let mut evicted = Vec::new();
    for (_, name) in candidates.into_iter().take(loaded - capacity) {
        if let Some(resource) = entries.get_mut(&name).and_then(CacheEntry::take_resource) {
            stats.evictions += 1;
            info!(name = %name, capacity, "Evicted least-recently-used resource");
            evicted.push(resource);
        }
    }
    evicted
}

fn panic_cause(payload: Box<dyn Any + Send>) -> BoxError {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    };
    format!("constructor panicked: {message}").into()
}
