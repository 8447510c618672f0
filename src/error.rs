use std::time::Duration;

use thiserror::Error;

use crate::coordinates::CoordinateError;

/// Failures of a single network or filesystem call.
#[derive(Debug, Error)]
pub enum TransportError {
    /// an expected outcome: the next repository gets asked
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{location} is unavailable: {reason}")]
    Unavailable { location: String, reason: String },
    #[error("{location} did not respond within {after:?}")]
    TimedOut { location: String, after: Duration },
}

impl TransportError {
    pub fn unavailable(location: &str, reason: impl ToString) -> TransportError {
        TransportError::Unavailable {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound(_))
    }
}

/// Malformed snapshot or descriptor metadata. This is never fatal: callers log it and fall back.
#[derive(Debug, Error)]
#[error("failed to parse metadata at {location}: {reason}")]
pub struct MetadataParseError {
    pub location: String,
    pub reason: String,
}

/// Everything that aborts a resolution run.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    InvalidCoordinate(#[from] CoordinateError),

    #[error("invalid repository '{name}': {reason}")]
    InvalidRepository { name: String, reason: String },

    #[error("repository '{repository}' is unavailable while resolving {coordinate}: {source}")]
    RepositoryUnavailable {
        repository: String,
        coordinate: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to compute the hash of {coordinate} from {location}: {reason}")]
    HashComputationFailed {
        coordinate: String,
        location: String,
        reason: String,
    },

    #[error("conflicting hashes for {coordinate}: {expected} vs. {actual}")]
    HashMismatch {
        coordinate: String,
        expected: String,
        actual: String,
    },

    #[error("{} coordinate(s) could not be resolved in any repository:\n  {}", .0.len(), .0.join("\n  "))]
    Unresolvable(Vec<String>),
}
