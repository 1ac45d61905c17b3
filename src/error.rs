//! Error types for dnsgate
//!
//! The error surface of the filter is intentionally small. Per-packet
//! failures (malformed wire data, upstream timeouts) are not errors at all:
//! the parsers and the relay return `Option` and the packet is dropped,
//! because a lost UDP DNS query is a normal, self-healing condition for the
//! client's own retry logic. What remains here are the failures that are
//! visible outside a single packet: configuration problems and session
//! lifecycle failures.
//!
//! # Example
//!
//! ```
//! use dnsgate::error::SessionError;
//!
//! let err = SessionError::EstablishFailed {
//!     reason: "permission revoked".to_string(),
//! };
//! assert!(!err.is_recoverable());
//! ```

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate
pub type FilterResult<T> = Result<T, FilterError>;

/// Top-level error type for the DNS filter
#[derive(Debug, Error)]
pub enum FilterError {
    /// Configuration errors (file parsing, validation)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Session lifecycle errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FilterError {
    /// Check if this error is recoverable (operation can be retried)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(e) => e.is_recoverable(),
            Self::Session(e) => e.is_recoverable(),
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::WouldBlock
            ),
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found or inaccessible
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Validation error (invalid values, missing required fields)
    #[error("Configuration validation failed: {reason}")]
    Validation {
        /// Description of the invalid value
        reason: String,
        /// The configuration field that is invalid, if applicable
        field: Option<String>,
    },

    /// I/O error while reading config
    #[error("I/O error reading configuration: {0}")]
    Io(#[from] io::Error),
}

impl ConfigError {
    /// Create a validation error for a specific field
    pub fn field(reason: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
            field: Some(field.into()),
        }
    }

    /// Config errors require user intervention
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        false
    }
}

/// Session lifecycle errors
///
/// These cover the "fail closed per-session" half of the error policy:
/// a failure to establish the virtual interface is fatal to the session
/// and must be reported to the caller rather than retried internally.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The virtual interface could not be established
    ///
    /// The filter transitions back to `Stopped` and does not retry;
    /// establishment is driven by the caller (user action, permission
    /// grant), not by a retry loop.
    #[error("Failed to establish virtual interface: {reason}")]
    EstablishFailed { reason: String },

    /// `start()` was called while a session is already active
    #[error("Filter session already running")]
    AlreadyRunning,
}

impl SessionError {
    /// Session errors end the current session; a new `start()` may succeed
    /// later but the failed operation itself is not retried.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::AlreadyRunning)
    }
}
