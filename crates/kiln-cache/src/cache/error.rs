//! Errors returned by cache operations.

use kiln_abstraction::BoxError;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Shared, cloneable handle to the failure raised by a constructor.
pub type SharedCause = Arc<dyn Error + Send + Sync + 'static>;

/// Represents an error returned by `ResourceCache::load`.
///
/// The type is `Clone` because one failure is delivered to every caller that
/// joined the same construction; clones share the same underlying cause.
#[derive(Debug, Clone)]
pub enum CacheError {
    /// No entry exists for the name and no inline constructor was supplied.
    NotRegistered {
        /// The requested name.
        name: String,
    },

    /// The registered constructor failed (or panicked).
    ConstructionFailed {
        /// The resource being constructed.
        name: String,
        /// The error raised by the constructor, unchanged.
        source: SharedCause,
    },

    /// The resource is loaded but is not of the requested concrete type.
    TypeMismatch {
        /// The requested name.
        name: String,
        /// The type the caller asked for.
        expected: &'static str,
    },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRegistered { name } => write!(f, "Resource '{name}' is not registered"),
            Self::ConstructionFailed { name, source } => {
                write!(f, "Construction of resource '{name}' failed: {source}")
            }
            Self::TypeMismatch { name, expected } => {
                write!(f, "Resource '{name}' is not a {expected}")
            }
        }
    }
}

// `source()` yields the constructor's error itself, not the `Arc` holding it.
impl Error for CacheError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ConstructionFailed { source, .. } => Some(&**source as &(dyn Error + 'static)),
            Self::NotRegistered { .. } | Self::TypeMismatch { .. } => None,
        }
    }
}

impl CacheError {
    pub(crate) fn not_registered(name: &str) -> Self {
        Self::NotRegistered { name: name.to_string() }
    }

    pub(crate) fn construction(name: &str, cause: BoxError) -> Self {
        Self::ConstructionFailed { name: name.to_string(), source: Arc::from(cause) }
    }

    /// Returns the name of the resource the error refers to.
    pub fn name(&self) -> &str {
        match self {
            Self::NotRegistered { name }
            | Self::ConstructionFailed { name, .. }
            | Self::TypeMismatch { name, .. } => name,
        }
    }

    /// Returns the constructor's failure for `ConstructionFailed`.
    pub fn cause(&self) -> Option<&SharedCause> {
        match self {
            Self::ConstructionFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether the error reports an unknown name.
    pub fn is_not_registered(&self) -> bool {
        matches!(self, Self::NotRegistered { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_abstraction::ResourceError;

    #[test]
    fn test_construction_error_keeps_cause() {
        let err = CacheError::construction(
            "encoder",
            Box::new(ResourceError::FetchError("404".to_string())),
        );

        assert_eq!(err.name(), "encoder");
        assert_eq!(err.to_string(), "Construction of resource 'encoder' failed: Fetch Error: 404");

        let source = err.source().unwrap();
        assert_eq!(
            source.downcast_ref::<ResourceError>(),
            Some(&ResourceError::FetchError("404".to_string()))
        );
    }

    #[test]
    fn test_clones_share_cause() {
        let err = CacheError::construction("encoder", "boom".into());
        let clone = err.clone();

        assert!(Arc::ptr_eq(err.cause().unwrap(), clone.cause().unwrap()));
    }

    #[test]
    fn test_not_registered() {
        let err = CacheError::not_registered("ghost");

        assert!(err.is_not_registered());
        assert!(err.cause().is_none());
        assert!(err.source().is_none());
        assert_eq!(err.to_string(), "Resource 'ghost' is not registered");
    }
}
