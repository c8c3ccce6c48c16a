//! Crate error types
//!
//! Every failure in the core maps onto one HTTP status; nothing here is fatal
//! to the process.

use http::StatusCode;
use thiserror::Error;

use crate::media::ParseError;
use crate::registry::AdmissionError;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("container parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("admission rejected: {0}")]
    Admission(#[from] AdmissionError),

    #[error("target disabled")]
    Disabled,

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("range not satisfiable: {0}")]
    Range(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("formatting error")]
    Fmt(#[from] std::fmt::Error),
}

impl Error {
    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    /// HTTP status this error is surfaced as.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) | Error::Parse(_) => StatusCode::NOT_FOUND,
            Error::Admission(AdmissionError::Disabled) | Error::Disabled => StatusCode::NO_CONTENT,
            Error::Admission(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Range(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
