//! Error types for the O365 sync system
//!
//! This module defines all error types used throughout the crate.
//!
//! Every variant maps to a stable numeric tag (see [`Error::code`]) so that
//! operators can match log lines and recorded run descriptions across
//! releases.

use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Tag for a missing or unreadable configuration document
pub const CODE_DOCUMENT: u16 = 1001;
/// Tag for state store I/O failures
pub const CODE_STATE_STORE: u16 = 2001;
/// Tag for upstream fetch failures (after retries)
pub const CODE_FETCH: u16 = 3001;
/// Tag for undecodable upstream responses
pub const CODE_MALFORMED_RESPONSE: u16 = 3002;
/// Tag for rejected policy store operations
pub const CODE_RECONCILE: u16 = 4001;
/// Tag for runs started before the configured start window
pub const CODE_SCHEDULE_GATE: u16 = 5001;

/// Core error type for the O365 sync system
#[derive(Error, Debug)]
pub enum Error {
    /// The persisted configuration document is missing or corrupt
    #[error("Configuration error: {0}")]
    Config(String),

    /// A configuration value failed validation
    #[error("{message} [{code}]")]
    Validation {
        /// Stable validation tag (1002..=1030)
        code: u16,
        /// Human readable description
        message: String,
    },

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// The current time precedes the configured start window
    #[error("Start window not reached: {0}")]
    ScheduleGate(String),

    /// Upstream request failed (transport, TLS, or non-2xx status)
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Upstream answered successfully but the body could not be used
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The policy store rejected an operation
    #[error("Reconcile error ({operation}): {message}")]
    Reconcile {
        /// Operation that was rejected
        operation: String,
        /// Store output or failure reason
        message: String,
    },

    /// Local I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration document error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a validation error with its stable tag
    pub fn validation(code: u16, msg: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: msg.into(),
        }
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a schedule gate error
    pub fn schedule_gate(msg: impl Into<String>) -> Self {
        Self::ScheduleGate(msg.into())
    }

    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a malformed response error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Create a reconcile error
    pub fn reconcile(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Reconcile {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Stable numeric tag reported to operators
    pub fn code(&self) -> u16 {
        match self {
            Self::Config(_) => CODE_DOCUMENT,
            Self::Validation { code, .. } => *code,
            Self::StateStore(_) | Self::Io(_) => CODE_STATE_STORE,
            Self::ScheduleGate(_) => CODE_SCHEDULE_GATE,
            Self::Fetch(_) => CODE_FETCH,
            Self::MalformedResponse(_) | Self::Json(_) => CODE_MALFORMED_RESPONSE,
            Self::Reconcile { .. } => CODE_RECONCILE,
        }
    }

    /// Whether the error comes from configuration loading or validation
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Validation { .. })
    }
}
