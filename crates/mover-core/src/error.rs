//! Error types for mover operations.

use std::fmt;
use std::io;

/// All possible mover errors.
#[derive(Debug)]
pub enum MoverError {
    /// A revision number beyond HEAD (or otherwise unknown) was requested.
    NoSuchRevision(String),
    /// A branching-model violation: element not found, invalid operation
    /// on a branch root, merge conflicts, and similar.
    Branching(String),
    /// Persisted branching data could not be decoded into element ids.
    FsNotId(String),
    /// An operation was called with invalid parameters.
    IncorrectParams(String),
    /// The command line (or an interactive action line) could not be parsed.
    ArgParse(String),
    /// Authentication with the repository failed.
    AuthnFailed,
    /// The user cancelled an interactive prompt.
    Cancelled,
    /// Could not acquire the repository lock within the timeout.
    LockTimeout,
    /// An I/O error occurred.
    Io(io::Error),
    /// JSON serialization/deserialization failed.
    Json(serde_json::Error),
}

impl MoverError {
    /// The stable taxonomy name, printed when the client exits non-zero.
    pub fn taxonomy(&self) -> &'static str {
        match self {
            MoverError::NoSuchRevision(_) => "NO_SUCH_REVISION",
            MoverError::Branching(_) => "BRANCHING",
            MoverError::FsNotId(_) => "FS_NOT_ID",
            MoverError::IncorrectParams(_) => "INCORRECT_PARAMS",
            MoverError::ArgParse(_) => "CL_ARG_PARSING_ERROR",
            MoverError::AuthnFailed => "AUTHN_FAILED",
            MoverError::Cancelled => "CANCELLED",
            MoverError::LockTimeout => "LOCK_TIMEOUT",
            MoverError::Io(_) => "IO",
            MoverError::Json(_) => "JSON",
        }
    }
}

impl fmt::Display for MoverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoverError::NoSuchRevision(msg) => write!(f, "{}: {msg}", self.taxonomy()),
            MoverError::Branching(msg) => write!(f, "{}: {msg}", self.taxonomy()),
            MoverError::FsNotId(msg) => write!(f, "{}: {msg}", self.taxonomy()),
            MoverError::IncorrectParams(msg) => write!(f, "{}: {msg}", self.taxonomy()),
            MoverError::ArgParse(msg) => write!(f, "{}: {msg}", self.taxonomy()),
            MoverError::AuthnFailed => write!(f, "{}: authentication failed", self.taxonomy()),
            MoverError::Cancelled => write!(f, "{}: operation cancelled", self.taxonomy()),
            MoverError::LockTimeout => {
                write!(f, "{}: could not acquire repository lock", self.taxonomy())
            }
            MoverError::Io(e) => write!(f, "{}: {e}", self.taxonomy()),
            MoverError::Json(e) => write!(f, "{}: {e}", self.taxonomy()),
        }
    }
}

impl std::error::Error for MoverError {}

impl From<io::Error> for MoverError {
    fn from(e: io::Error) -> Self {
        MoverError::Io(e)
    }
}

impl From<serde_json::Error> for MoverError {
    fn from(e: serde_json::Error) -> Self {
        MoverError::Json(e)
    }
}

/// Convenience alias for Results in mover.
pub type MoverResult<T> = Result<T, MoverError>;
