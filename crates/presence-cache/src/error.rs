//! Error types for `presence-cache`.
//!
//! Only conditions a caller can act on are reported through [`Error`].
//! Broken internal invariants (a missing index bucket, a drifted element
//! count) are programming errors and abort through assertions instead.

use thiserror::Error;

/// Result type alias for `presence-cache` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in `presence-cache` operations.
///
/// Error codes follow the pattern `PCACHE-XXX`.
#[derive(Error, Debug)]
pub enum Error {
    /// Storage backend error (PCACHE-001).
    #[error("[PCACHE-001] Storage error: {0}")]
    Storage(String),

    /// Configuration error (PCACHE-002).
    #[error("[PCACHE-002] Configuration error: {0}")]
    Config(String),

    /// The deferred work queue could not be started (PCACHE-003).
    #[error("[PCACHE-003] Work queue error: {0}")]
    WorkQueue(String),
}

impl Error {
    /// Returns the error code (e.g., "PCACHE-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Storage(_) => "PCACHE-001",
            Self::Config(_) => "PCACHE-002",
            Self::WorkQueue(_) => "PCACHE-003",
        }
    }
}

impl From<crate::config::ConfigError> for Error {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
