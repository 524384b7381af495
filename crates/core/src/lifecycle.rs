//! Resource lifecycle states and the operations that move between them
//!
//! A resource goes `Unregistered → Created → Playing ⇄ Stopped → Deleted`.
//! [`LifecycleState::permits`] is the single table every handle consults
//! before it talks to the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one named pipeline resource as tracked by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Not yet registered with the engine
    Unregistered,
    /// Registered, playback not started
    Created,
    /// Data is flowing
    Playing,
    /// Playback stopped, resource still registered
    Stopped,
    /// Deregistered; terminal
    Deleted,
}

/// An action a handle can issue against its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Register with the engine
    Create,
    /// Start playback
    Play,
    /// Stop playback
    Stop,
    /// Signal end of input so sinks can flush
    SendEndOfStream,
    /// Deregister
    Delete,
    /// Change the output sink location
    SetOutputLocation,
    /// Change the producer the input listens to
    RebindSource,
    /// Poll the engine-side state
    QueryState,
}

impl LifecycleState {
    /// Whether `op` may be issued while the resource is in this state
    pub fn permits(self, op: Operation) -> bool {
        use LifecycleState::*;
        use Operation::*;

        match (self, op) {
            (Unregistered, Create) => true,
            (Created | Stopped, Play) => true,
            (Created | Playing, Stop) => true,
            (Playing, SendEndOfStream) => true,
            (Stopped, Delete) => true,
            (Created | Playing | Stopped, SetOutputLocation | RebindSource | QueryState) => true,
            _ => false,
        }
    }

    /// State reached after `op` succeeds from this state
    pub fn after(self, op: Operation) -> LifecycleState {
        match op {
            Operation::Create => LifecycleState::Created,
            Operation::Play => LifecycleState::Playing,
            Operation::Stop => LifecycleState::Stopped,
            Operation::Delete => LifecycleState::Deleted,
            Operation::SendEndOfStream
            | Operation::SetOutputLocation
            | Operation::RebindSource
            | Operation::QueryState => self,
        }
    }

    /// True once the engine knows about the resource and it has not been deleted
    pub fn is_registered(self) -> bool {
        matches!(
            self,
            LifecycleState::Created | LifecycleState::Playing | LifecycleState::Stopped
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Unregistered => write!(f, "unregistered"),
            LifecycleState::Created => write!(f, "created"),
            LifecycleState::Playing => write!(f, "playing"),
            LifecycleState::Stopped => write!(f, "stopped"),
            LifecycleState::Deleted => write!(f, "deleted"),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Play => "play",
            Operation::Stop => "stop",
            Operation::SendEndOfStream => "eos",
            Operation::Delete => "delete",
            Operation::SetOutputLocation => "set_output_location",
            Operation::RebindSource => "rebind_source",
            Operation::QueryState => "query_state",
        };
        f.write_str(name)
    }
}
