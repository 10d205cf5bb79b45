//! Process-wide default cache.
//!
//! Convenience for applications that want one cache without threading a
//! handle through every layer. Nothing inside this crate depends on it;
//! libraries and tests should construct their own [`ResourceCache`].

use std::any::Any;
use std::sync::{Arc, OnceLock};

use crate::cache::{CacheError, ResourceCache};

/// Type-erased resource stored in the shared cache.
pub type AnyResource = dyn Any + Send + Sync;

/// Shared default instance (default configuration, created on first access).
static SHARED_CACHE: OnceLock<ResourceCache<AnyResource>> = OnceLock::new();

/// Get the process-wide cache.
pub fn shared() -> &'static ResourceCache<AnyResource> {
    SHARED_CACHE.get_or_init(ResourceCache::default)
}

/// Load `name` from the process-wide cache as a `T`.
///
/// # Errors
/// See [`ResourceCache::load_as`].
pub async fn load_as<T>(name: &str) -> Result<Arc<T>, CacheError>
where
    T: Any + Send + Sync,
{
    shared().load_as::<T>(name).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EntryStatus;

    #[derive(Debug, PartialEq)]
    struct Vocabulary(Vec<&'static str>);

    #[tokio::test]
    async fn test_shared_instance_is_stable() {
        assert!(std::ptr::eq(shared(), shared()));

        shared().register("global-test-vocab", || async {
            Ok::<_, std::io::Error>(Arc::new(Vocabulary(vec!["<s>", "</s>"])) as Arc<AnyResource>)
        });

        let vocab = load_as::<Vocabulary>("global-test-vocab").await.unwrap();
        assert_eq!(vocab.0, vec!["<s>", "</s>"]);
        assert_eq!(shared().status("global-test-vocab"), EntryStatus::Loaded);

        let err = load_as::<String>("global-test-vocab").await.unwrap_err();
        assert!(matches!(err, CacheError::TypeMismatch { .. }));

        assert!(shared().unload("global-test-vocab"));
    }
}
