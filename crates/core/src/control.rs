//! Control-plane boundary to the pipeline execution engine
//!
//! The orchestrator never looks inside a pipeline. Everything it needs from
//! the engine goes through [`ControlPlane`]: five mutating primitives plus a
//! state query used for readiness checks.
//!
//! # Architecture
//!
//! ```text
//! Sequencer ──> PipelineHandle ──> dyn ControlPlane ──> engine
//!                                   ├─ GstdClient (TCP, pipefleet-gstd)
//!                                   └─ InMemoryEngine (dry runs, tests)
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Failure reported by the engine (or the transport reaching it)
///
/// Each variant carries the engine's own description of the problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    /// A resource with that name is already registered
    #[error("duplicate name: {0}")]
    DuplicateName(String),

    /// No resource with that name
    #[error("not found: {0}")]
    NotFound(String),

    /// The engine refused the request in the resource's current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed description or command
    #[error("malformed request: {0}")]
    Malformed(String),

    /// Unknown element/parameter or a value the parameter does not accept
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Communication with the engine failed
    #[error("transport error: {0}")]
    Transport(String),

    /// The engine did not answer within the transport's bound
    #[error("no answer within {timeout_ms}ms: {detail}")]
    Timeout {
        /// What went unanswered
        detail: String,
        /// Bound that elapsed, in milliseconds
        timeout_ms: u64,
    },
}

/// Target of a `set_state` request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetState {
    /// Start data flow
    Playing,
    /// Stop data flow
    Stopped,
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetState::Playing => write!(f, "playing"),
            TargetState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Events that can be injected into a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Logical end of input
    EndOfStream,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::EndOfStream => write!(f, "eos"),
        }
    }
}

/// State of a resource as the engine itself reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EngineState {
    /// Not allocated
    Null,
    /// Allocated, not prerolled
    Ready,
    /// Prerolled, clock stopped
    Paused,
    /// Running
    Playing,
}

impl EngineState {
    /// Whether this engine state satisfies a requested target
    pub fn satisfies(self, target: TargetState) -> bool {
        match target {
            TargetState::Playing => self == EngineState::Playing,
            TargetState::Stopped => matches!(self, EngineState::Null | EngineState::Ready),
        }
    }
}

impl FromStr for EngineState {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NULL" | "VOID_PENDING" => Ok(EngineState::Null),
            "READY" => Ok(EngineState::Ready),
            "PAUSED" => Ok(EngineState::Paused),
            "PLAYING" => Ok(EngineState::Playing),
            other => Err(ControlError::Malformed(format!("unknown engine state '{}'", other))),
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Null => write!(f, "NULL"),
            EngineState::Ready => write!(f, "READY"),
            EngineState::Paused => write!(f, "PAUSED"),
            EngineState::Playing => write!(f, "PLAYING"),
        }
    }
}

/// Client-side interface to the pipeline execution engine
///
/// Every call is a complete round trip: it returns only once the engine has
/// accepted or refused the request. Implementations must be `Send + Sync`
/// so a single client can be shared by all handles of a run.
///
/// Element and parameter names are opaque engine identifiers and are passed
/// through unmodified.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Register a new resource under `name` with an opaque description
    ///
    /// # Errors
    ///
    /// * `ControlError::DuplicateName` - name already registered
    /// * `ControlError::Malformed` - the engine could not build the description
    async fn create_resource(&self, name: &str, description: &str) -> Result<(), ControlError>;

    /// Request a state transition
    async fn set_state(&self, name: &str, target: TargetState) -> Result<(), ControlError>;

    /// Inject an event into the resource
    async fn send_event(&self, name: &str, event: EventKind) -> Result<(), ControlError>;

    /// Set a named parameter on a named element inside the resource
    async fn set_parameter(
        &self,
        name: &str,
        element: &str,
        param: &str,
        value: &str,
    ) -> Result<(), ControlError>;

    /// Deregister the resource
    async fn delete_resource(&self, name: &str) -> Result<(), ControlError>;

    /// Read the engine-side state of the resource
    async fn query_state(&self, name: &str) -> Result<EngineState, ControlError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_state_parse() {
        assert_eq!("PLAYING".parse::<EngineState>().unwrap(), EngineState::Playing);
        assert_eq!("paused".parse::<EngineState>().unwrap(), EngineState::Paused);
        assert_eq!(" NULL ".parse::<EngineState>().unwrap(), EngineState::Null);
        assert!(matches!(
            "SPINNING".parse::<EngineState>(),
            Err(ControlError::Malformed(_))
        ));
    }

    #[test]
    fn test_engine_state_satisfies() {
        assert!(EngineState::Playing.satisfies(TargetState::Playing));
        assert!(!EngineState::Paused.satisfies(TargetState::Playing));
        assert!(EngineState::Null.satisfies(TargetState::Stopped));
        assert!(EngineState::Ready.satisfies(TargetState::Stopped));
        assert!(!EngineState::Paused.satisfies(TargetState::Stopped));
    }
}
