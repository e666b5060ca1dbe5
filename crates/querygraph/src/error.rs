//! Error types for compiled queries and their evaluation.

use resgraph::ResourceError;
use std::path::PathBuf;
use thiserror::Error;

/// A compiled query that cannot be loaded or is malformed
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid query: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("checksum {0} is defined more than once")]
    DuplicateChecksum(String),

    #[error("{from} references unknown checksum {to}")]
    DanglingReference { from: String, to: String },

    #[error("{kind} {checksum} is not part of the query")]
    UnknownTarget { kind: &'static str, checksum: String },

    #[error("operator '{op}' at {checksum} takes {expected} operands, got {actual}")]
    Arity {
        checksum: String,
        op: String,
        expected: String,
        actual: usize,
    },

    #[error("checksum {0} depends on itself")]
    Cycle(String),
}

/// Failure of one checksum during evaluation.
///
/// These are values in the result map, not aborts: every checksum carries
/// its own outcome.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("unknown checksum {0}")]
    UnknownChecksum(String),

    #[error("checksum {0} depends on itself")]
    Cycle(String),

    #[error("{0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("{pending} still not ready after {passes} passes")]
    NotReady { pending: String, passes: usize },

    #[error("property '{0}' is not set")]
    UnknownProperty(String),

    #[error("'{0}' is not bound by an enclosing block")]
    Unbound(String),

    #[error("invalid regex '{pattern}': {message}")]
    Regex { pattern: String, message: String },
}
