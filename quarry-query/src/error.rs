//! Error types for query building and statement execution.
//!
//! Two layers of error exist here:
//!
//! - [`ErrorInfo`] is the raw diagnostic reported by a database backend:
//!   a five character SQLSTATE, an optional driver specific code, and a
//!   message. Backends produce these; the executor classifies them.
//! - [`Error`] is the crate level error returned from every fallible
//!   operation. Backend failures are wrapped in [`Error::Backend`] after
//!   the retry policy has given up on them.
//!
//! Classification of an [`ErrorInfo`] into an [`ErrorState`] is driven by
//! the first two characters of the SQLSTATE, see [`crate::sqlstate`].
//!
//! ```rust
//! use quarry_query::{Error, ErrorInfo};
//!
//! let info = ErrorInfo::new("23000", Some(1062), "duplicate key");
//! let err = Error::Backend(info);
//! assert!(err.to_string().contains("duplicate key"));
//! ```

use std::fmt;

use thiserror::Error;

/// Result type for query operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Raw diagnostic produced by a database backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Five character SQLSTATE, e.g. `"23000"`.
    pub sqlstate: String,
    /// Backend specific error code, when the backend reports one.
    pub code: Option<i64>,
    /// Human readable message from the backend.
    pub message: String,
}

impl ErrorInfo {
    /// Create a new diagnostic.
    pub fn new(sqlstate: impl Into<String>, code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            sqlstate: sqlstate.into(),
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{} ({})] {}", self.sqlstate, code, self.message),
            None => write!(f, "[{}] {}", self.sqlstate, self.message),
        }
    }
}

/// Error returned from all fallible operations in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or incomplete connection options.
    #[error("configuration error: {0}")]
    Config(String),

    /// A statement or argument could not be compiled into SQL.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend rejected a statement and the retry policy gave up.
    #[error("backend error: {0}")]
    Backend(ErrorInfo),

    /// A transaction outlived its configured lifetime and was rolled back.
    #[error("transaction expired and has been rolled back")]
    TransactionExpired,

    /// Transaction begun twice, or committed/rolled back without one open.
    #[error("transaction state error: {0}")]
    TransactionState(String),

    /// Operation attempted on a connection that was never activated.
    #[error("connection is not activated")]
    NotActivated,
}

impl Error {
    /// Shorthand for a [`Error::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Shorthand for an [`Error::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// The backend diagnostic, when this error carries one.
    pub fn backend_info(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Backend(info) => Some(info),
            _ => None,
        }
    }
}

// Lets infallible conversions satisfy `TryInto<_, Error: Into<Error>>`
// bounds on the fluent builder.
impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}
