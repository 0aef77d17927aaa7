//! Error types for the replicator.

use revdb_storage::{ErrorCode, ErrorDomain, StorageError};
use thiserror::Error;

/// Result type for replicator operations.
pub type ReplResult<T> = Result<T, ReplError>;

/// Errors reported by the database worker and its components.
///
/// Errors are values: they travel back to callers inside [`ReplResult`]
/// through the same reply channel as successes. They are `Clone` so one
/// failure can answer several waiting callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplError {
    /// Checkpoint, document or revision is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Storage I/O failure or corruption.
    #[error("storage failure ({code}): {message}")]
    Storage {
        /// Domain + code reported by the store.
        code: ErrorCode,
        /// Error message.
        message: String,
    },

    /// Malformed cookie header, proposed change or address.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Operation attempted after the connection was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Write did not build on the current revision.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Persisted data could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

impl ReplError {
    /// Replicator-domain code for [`ReplError::ConnectionClosed`].
    pub const CONNECTION_CLOSED: i32 = 1;
    /// Replicator-domain code for [`ReplError::Codec`].
    pub const CODEC: i32 = 2;

    /// Returns the domain + code pair for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ReplError::NotFound(_) => ErrorCode::new(ErrorDomain::RevDb, ErrorCode::NOT_FOUND),
            ReplError::Storage { code, .. } => *code,
            ReplError::InvalidInput(_) => {
                ErrorCode::new(ErrorDomain::RevDb, ErrorCode::INVALID_PARAMETER)
            }
            ReplError::ConnectionClosed => {
                ErrorCode::new(ErrorDomain::Replicator, Self::CONNECTION_CLOSED)
            }
            ReplError::Conflict(_) => ErrorCode::new(ErrorDomain::RevDb, ErrorCode::CONFLICT),
            ReplError::Codec(_) => ErrorCode::new(ErrorDomain::Replicator, Self::CODEC),
        }
    }

    /// Returns true if this error only signals absence ("fresh" state).
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReplError::NotFound(_))
    }
}

impl From<StorageError> for ReplError {
    fn from(err: StorageError) -> Self {
        if err.is_not_found() {
            return ReplError::NotFound(err.to_string());
        }
        match err {
            StorageError::Conflict(msg) => ReplError::Conflict(msg),
            StorageError::InvalidParameter(msg) => ReplError::InvalidInput(msg),
            other => ReplError::Storage {
                code: other.code(),
                message: other.to_string(),
            },
        }
    }
}
