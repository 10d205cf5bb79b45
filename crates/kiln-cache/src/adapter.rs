//! Glue between resource adapters and the cache.
//!
//! Adapters describe *how* to build a resource; these helpers turn those
//! descriptions into the constructors the cache stores, and implement the
//! caller-side teardown for resources that hold external handles.

use futures::{FutureExt, TryFutureExt};
use kiln_abstraction::{BoxError, Disposable, ResourceLoader};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{Constructor, ResourceCache};

/// Box an async closure into a [`Constructor`].
pub fn constructor_fn<R, F, Fut, E>(constructor: F) -> Constructor<R>
where
    R: ?Sized + Send + Sync + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Arc<R>, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    Arc::new(move || constructor().map_err(|err: E| -> BoxError { err.into() }).boxed())
}

/// A resource name bundled with the constructor that builds it.
pub struct ResourceDescriptor<R: ?Sized> {
    name: String,
    constructor: Constructor<R>,
}

impl<R> ResourceDescriptor<R>
where
    R: ?Sized + Send + Sync + 'static,
{
    /// Creates a descriptor from a name and an async closure.
    pub fn new<F, Fut, E>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<R>, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self { name: name.into(), constructor: constructor_fn(constructor) }
    }

    /// Creates a descriptor that builds the resource through a [`ResourceLoader`].
    pub fn from_loader<L>(loader: Arc<L>) -> Self
    where
        L: ResourceLoader<Resource = R> + 'static,
    {
        let name = loader.name().to_string();
        Self::new(name, move || {
            let loader = Arc::clone(&loader);
            async move { loader.construct().await }
        })
    }

    /// The name the resource will be registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Splits the descriptor into its name and constructor.
    pub fn into_parts(self) -> (String, Constructor<R>) {
        (self.name, self.constructor)
    }
}

impl<R: ?Sized> Clone for ResourceDescriptor<R> {
    fn clone(&self) -> Self {
        Self { name: self.name.clone(), constructor: Arc::clone(&self.constructor) }
    }
}

impl<R: ?Sized> fmt::Debug for ResourceDescriptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDescriptor").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Unload `name` and dispose of the resource it held.
///
/// The cache drops its own reference first; other holders of the `Arc` keep
/// a value whose external handles have been released.
///
/// # Returns
/// `true` if a loaded resource was found and disposed.
pub fn release<R>(cache: &ResourceCache<R>, name: &str) -> bool
where
    R: ?Sized + Disposable + Send + Sync + 'static,
{
    let Some(resource) = cache.take(name) else {
        return false;
    };

    resource.dispose();
    debug!(name, "Disposed released resource");
    true
}
