//! Error types for storage operations.
//!
//! Errors never cross a collaborator boundary as panics. Every error can be
//! flattened to an [`ErrorCode`], a domain plus a numeric code, which is what
//! the replicator reports back to the protocol layer.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// The namespace an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorDomain {
    /// Errors raised by the revision or blob store.
    RevDb,
    /// Operating system errors (`errno` values).
    Posix,
    /// Errors raised by the replicator itself.
    Replicator,
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorDomain::RevDb => "RevDb",
            ErrorDomain::Posix => "POSIX",
            ErrorDomain::Replicator => "Replicator",
        };
        f.write_str(name)
    }
}

/// A domain + code pair identifying an error across component boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Error domain.
    pub domain: ErrorDomain,
    /// Domain-specific code.
    pub code: i32,
}

impl ErrorCode {
    /// Store was used after being closed or deleted.
    pub const NOT_OPEN: i32 = 6;
    /// Document, revision, blob or raw record does not exist.
    pub const NOT_FOUND: i32 = 7;
    /// Write rejected because it does not build on the current revision.
    pub const CONFLICT: i32 = 8;
    /// Caller supplied a malformed argument.
    pub const INVALID_PARAMETER: i32 = 9;
    /// Stored data could not be interpreted.
    pub const CORRUPT_DATA: i32 = 16;

    /// Creates a new error code.
    pub const fn new(domain: ErrorDomain, code: i32) -> Self {
        Self { domain, code }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.code)
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested item does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write did not match the current stored state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An argument was malformed (e.g. an unparseable revision ID).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The stored data is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The store is closed.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Returns the domain + code pair for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            StorageError::Io(err) => {
                ErrorCode::new(ErrorDomain::Posix, err.raw_os_error().unwrap_or(5))
            }
            StorageError::NotFound(_) => ErrorCode::new(ErrorDomain::RevDb, ErrorCode::NOT_FOUND),
            StorageError::Conflict(_) => ErrorCode::new(ErrorDomain::RevDb, ErrorCode::CONFLICT),
            StorageError::InvalidParameter(_) => {
                ErrorCode::new(ErrorDomain::RevDb, ErrorCode::INVALID_PARAMETER)
            }
            StorageError::Corrupted(_) => {
                ErrorCode::new(ErrorDomain::RevDb, ErrorCode::CORRUPT_DATA)
            }
            StorageError::Closed => ErrorCode::new(ErrorDomain::RevDb, ErrorCode::NOT_OPEN),
        }
    }

    /// Returns true if this error only signals absence.
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::NotFound(_) => true,
            StorageError::Io(err) => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
