//! Error types for pipefleet core

use std::fmt;

use thiserror::Error;

use crate::control::ControlError;
use crate::lifecycle::Operation;

/// Result type alias for pipefleet core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to handle and sequencer callers
///
/// Every variant that concerns a resource names it, so a failed run can
/// report which pipeline broke and how.
#[derive(Debug, Error)]
pub enum Error {
    /// A resource with this name is already registered
    #[error("Pipeline '{name}' already exists")]
    DuplicateName {
        /// Resource name
        name: String,
    },

    /// The engine does not know this resource
    #[error("Pipeline '{name}' not found")]
    NotFound {
        /// Resource name
        name: String,
    },

    /// Operation attempted outside the allowed lifecycle state
    #[error("Cannot {operation} pipeline '{name}': {detail}")]
    InvalidState {
        /// Resource name
        name: String,
        /// Operation that was refused
        operation: Operation,
        /// Why it was refused
        detail: String,
    },

    /// Bad description or parameter
    #[error("Malformed request for pipeline '{name}': {detail}")]
    MalformedRequest {
        /// Resource name
        name: String,
        /// Engine description of the problem
        detail: String,
    },

    /// Communication with the engine failed
    #[error("Transport error on pipeline '{name}': {detail}")]
    Transport {
        /// Resource name
        name: String,
        /// Underlying failure
        detail: String,
    },

    /// A command or readiness wait exceeded its bound
    #[error("Timed out after {timeout_ms}ms waiting for {operation} on pipeline '{name}'")]
    Timeout {
        /// Resource name
        name: String,
        /// Operation that timed out
        operation: Operation,
        /// Bound that elapsed, in milliseconds
        timeout_ms: u64,
    },

    /// Invalid configuration or topology
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Classification of an [`Error`], used in run reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::DuplicateName`]
    DuplicateName,
    /// See [`Error::NotFound`]
    NotFound,
    /// See [`Error::InvalidState`]
    InvalidState,
    /// See [`Error::MalformedRequest`]
    MalformedRequest,
    /// See [`Error::Transport`]
    Transport,
    /// See [`Error::Timeout`]
    Timeout,
    /// Invalid configuration or topology
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::DuplicateName => "DuplicateName",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::InvalidState => "InvalidState",
            ErrorKind::MalformedRequest => "MalformedRequest",
            ErrorKind::Transport => "TransportError",
            ErrorKind::Timeout => "TimeoutError",
            ErrorKind::Config => "ConfigError",
        };
        f.write_str(s)
    }
}

impl Error {
    /// Classify an engine failure for the resource `name`
    ///
    /// Bad parameters and malformed requests collapse into
    /// [`Error::MalformedRequest`].
    pub fn from_control(name: &str, operation: Operation, err: ControlError) -> Self {
        let name = name.to_string();
        match err {
            ControlError::DuplicateName(_) => Error::DuplicateName { name },
            ControlError::NotFound(_) => Error::NotFound { name },
            ControlError::InvalidState(detail) => Error::InvalidState {
                name,
                operation,
                detail,
            },
            ControlError::Malformed(detail) | ControlError::InvalidParameter(detail) => {
                Error::MalformedRequest { name, detail }
            }
            ControlError::Transport(detail) => Error::Transport { name, detail },
            ControlError::Timeout { timeout_ms, .. } => Error::Timeout {
                name,
                operation,
                timeout_ms,
            },
        }
    }

    /// The error's classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DuplicateName { .. } => ErrorKind::DuplicateName,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::InvalidState { .. } => ErrorKind::InvalidState,
            Error::MalformedRequest { .. } => ErrorKind::MalformedRequest,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Name of the resource the error concerns, if any
    pub fn resource(&self) -> Option<&str> {
        match self {
            Error::DuplicateName { name }
            | Error::NotFound { name }
            | Error::InvalidState { name, .. }
            | Error::MalformedRequest { name, .. }
            | Error::Transport { name, .. }
            | Error::Timeout { name, .. } => Some(name),
            Error::Config(_) => None,
        }
    }

    /// Whether the run cannot meaningfully continue after this error
    ///
    /// Lost transport and unanswered commands leave the engine in an unknown
    /// state, so the sequencer goes straight to teardown.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::Timeout { .. })
    }
}
