//! Error types for provider operations.
//!
//! Providers sit at the edge of the system. Their errors are mapped by the
//! resource runtime into its own taxonomy, so each variant here says which
//! bucket it belongs to: missing entity, missing capability, or an upstream
//! failure.

use crate::types::Capability;
use thiserror::Error;

/// Errors that can occur while talking to a target system.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested path or entity does not exist on the target
    #[error("not found: {path}")]
    NotFound {
        /// Path (or name) that could not be found
        path: String,
    },

    /// The provider cannot perform this kind of operation
    #[error("provider '{provider}' does not support {capability}")]
    Unsupported {
        /// Capability that was requested
        capability: Capability,
        /// Name of the provider that lacks it
        provider: String,
    },

    /// A command could not be started
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description of what failed
        message: String,
        /// Standard error output, if any was captured
        stderr: String,
    },

    /// A mock fixture could not be parsed
    #[error("invalid mock fixture: {0}")]
    InvalidMock(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a `NotFound` error for a path.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Whether this error means the entity does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Whether this error means the provider lacks a capability.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    /// Map an IO error on `path` to `NotFound` when appropriate.
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::not_found(path)
        } else {
            Self::Io(err)
        }
    }
}

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let err = Error::from_io(
            "/missing",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, Error::NotFound { ref path } if path == "/missing"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_io_other_stays_io() {
        let err = Error::from_io(
            "/secret",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_unsupported_display() {
        let err = Error::Unsupported {
            capability: Capability::RunCommand,
            provider: "mock".to_string(),
        };
        assert!(err.is_unsupported());
        assert_eq!(
            err.to_string(),
            "provider 'mock' does not support running commands"
        );
    }
}
