//! Resource abstraction layer for Kiln.
//!
//! This crate defines the capability traits shared between the cache engine
//! and the adapters that know how to build concrete resources (model weights,
//! tokenizers, GPU programs). The cache only ever sees these seams; it never
//! inspects a resource's internals.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by resource constructors.
///
/// Any `std::error::Error + Send + Sync` converts into it with `?` or `.into()`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Represents an error that can occur while an adapter constructs a resource.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceError {
    /// The resource payload could not be fetched (network, filesystem).
    #[error("Fetch Error: {0}")]
    FetchError(String),

    /// The payload was fetched but could not be decoded into a resource.
    #[error("Decode Error: {0}")]
    DecodeError(String),

    /// The execution backend rejected the resource (e.g. out of device memory).
    #[error("Backend Error: {0}")]
    BackendError(String),

    /// Other unexpected errors.
    #[error("Other Resource Error: {0}")]
    Other(String),
}

/// Teardown capability for resources that hold external handles.
///
/// The cache never calls this itself. Callers that want buffers released
/// when a resource leaves the cache invoke it on the reference they hold,
/// typically through `kiln_cache::adapter::release`.
pub trait Disposable: Send + Sync {
    /// Releases any external handles held by the resource.
    fn dispose(&self);
}

/// A named, asynchronously constructed resource.
///
/// Implementations are the adapter side of the cache: they know where the
/// bytes live and how to turn them into a usable object. `construct` is
/// called once per load attempt and may be called again after the entry is
/// unloaded or a previous attempt failed.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    /// The resource type produced by this loader.
    type Resource: ?Sized + Send + Sync + 'static;

    /// Returns the unique name the resource is registered under.
    fn name(&self) -> &str;

    /// Builds a fresh instance of the resource.
    ///
    /// # Errors
    /// Returns any error raised while fetching or decoding the resource.
    async fn construct(&self) -> Result<Arc<Self::Resource>, BoxError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Weights {
        released: AtomicBool,
    }

    impl Disposable for Weights {
        fn dispose(&self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    struct WeightsLoader;

    #[async_trait]
    impl ResourceLoader for WeightsLoader {
        type Resource = Weights;

        fn name(&self) -> &str {
            "weights"
        }

        async fn construct(&self) -> Result<Arc<Weights>, BoxError> {
            Ok(Arc::new(Weights { released: AtomicBool::new(false) }))
        }
    }

    struct BrokenLoader;

    #[async_trait]
    impl ResourceLoader for BrokenLoader {
        type Resource = Weights;

        fn name(&self) -> &str {
            "broken"
        }

        async fn construct(&self) -> Result<Arc<Weights>, BoxError> {
            Err(ResourceError::DecodeError("truncated shard".to_string()).into())
        }
    }

    #[tokio::test]
    async fn test_loader_constructs_resource() {
        let loader = WeightsLoader;
        assert_eq!(loader.name(), "weights");

        let weights = loader.construct().await.unwrap();
        assert!(!weights.released.load(Ordering::SeqCst));

        weights.dispose();
        assert!(weights.released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_loader_error_keeps_message() {
        let err = match BrokenLoader.construct().await {
            Ok(_) => panic!("broken loader should fail"),
            Err(err) => err,
        };
        assert_eq!(err.to_string(), "Decode Error: truncated shard");

        let typed = err.downcast_ref::<ResourceError>().unwrap();
        assert_eq!(typed, &ResourceError::DecodeError("truncated shard".to_string()));
    }

    #[test]
    fn test_resource_error_serde() {
        let err = ResourceError::BackendError("webgl context lost".to_string());
        let json = serde_json::to_string(&err).unwrap();
        let back: ResourceError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
