//! Error types for resource resolution.
//!
//! Errors are cached exactly like values, so every variant is `Clone`.
//! [`ErrorKind`] groups them the way callers need to react: a `NotReady`
//! error means "ask again later", everything else is final for the
//! lifetime of the cache entry.

use crate::value::ValueType;
use thiserror::Error;

/// Categories of resolution errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Requested entity does not exist
    NotFound,
    /// Value deferred to a batched gather that has not completed
    NotReady,
    /// Provider lacks a required capability
    Unsupported,
    /// Constructor or field input violates a type/shape contract
    InvalidArgument,
    /// Failure reported by the target system
    Upstream,
}

impl ErrorKind {
    /// Whether this error is expected to go away on its own.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NotReady)
    }

    /// Whether this error describes the target system and is cached like a
    /// value until the field is invalidated.
    ///
    /// Argument errors are raised to the caller at construction time, and
    /// NotReady entries are only stored through a deferred gather.
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::NotFound | Self::Unsupported | Self::Upstream)
    }

    /// Short label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::NotReady => "not ready",
            Self::Unsupported => "unsupported",
            Self::InvalidArgument => "invalid argument",
            Self::Upstream => "upstream error",
        }
    }
}

/// Errors produced while creating resources or resolving their fields.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    /// Requested entity (file, registry key, named resource) does not exist
    #[error("{0}")]
    NotFound(String),

    /// Field value is being computed by an in-flight gather
    #[error("{resource}.{field} is not ready yet")]
    NotReady {
        /// Instance uid the pending field belongs to
        uid: u64,
        /// Display name of the instance
        resource: String,
        /// Pending field
        field: String,
    },

    /// The active provider lacks a capability the resource needs
    #[error("{0}")]
    Unsupported(String),

    /// Bad constructor arguments or field input
    #[error("{0}")]
    InvalidArgument(String),

    /// Argument or resolver output does not match the declared type
    #[error("wrong type for {resource}.{field}: expected {expected}, got {actual}")]
    WrongType {
        /// Resource type name
        resource: String,
        /// Field or argument name
        field: String,
        /// Declared type
        expected: ValueType,
        /// Type of the offending value
        actual: ValueType,
    },

    /// No resource type with this name is registered
    #[error("resource '{0}' not found")]
    UnknownResource(String),

    /// The resource type has no such field
    #[error("resource '{resource}' has no field '{field}'")]
    UnknownField {
        /// Resource type name
        resource: String,
        /// Requested field
        field: String,
    },

    /// Failure reported by the provider or target system
    #[error("{0}")]
    Upstream(String),
}

impl ResourceError {
    /// Categorize this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotReady { .. } => ErrorKind::NotReady,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::InvalidArgument(_)
            | Self::WrongType { .. }
            | Self::UnknownResource(_)
            | Self::UnknownField { .. } => ErrorKind::InvalidArgument,
            Self::Upstream(_) => ErrorKind::Upstream,
        }
    }

    /// Whether this is the pending marker.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }

    /// Whether this means the entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<provider::Error> for ResourceError {
    fn from(err: provider::Error) -> Self {
        if err.is_not_found() {
            Self::NotFound(err.to_string())
        } else if err.is_unsupported() {
            Self::Unsupported(err.to_string())
        } else {
            Self::Upstream(err.to_string())
        }
    }
}

/// Result type alias for resource operations.
pub type Result<T> = std::result::Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use provider::Capability;

    #[test]
    fn test_provider_errors_map_to_kinds() {
        let not_found: ResourceError = provider::Error::not_found("/etc/shadow").into();
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert_eq!(not_found.to_string(), "not found: /etc/shadow");

        let unsupported: ResourceError = provider::Error::Unsupported {
            capability: Capability::RunCommand,
            provider: "mock".to_string(),
        }
        .into();
        assert_eq!(unsupported.kind(), ErrorKind::Unsupported);

        let upstream: ResourceError = provider::Error::Other("boom".to_string()).into();
        assert_eq!(upstream.kind(), ErrorKind::Upstream);
    }

    #[test]
    fn test_kind_flags() {
        assert!(ErrorKind::NotReady.is_transient());
        assert!(!ErrorKind::NotReady.is_cached());
        assert!(ErrorKind::Upstream.is_cached());
        assert!(!ErrorKind::InvalidArgument.is_cached());
    }

    #[test]
    fn test_not_ready_display() {
        let err = ResourceError::NotReady {
            uid: 7,
            resource: "process pid=1".to_string(),
            field: "state".to_string(),
        };
        assert!(err.is_not_ready());
        assert_eq!(err.to_string(), "process pid=1.state is not ready yet");
    }
}
