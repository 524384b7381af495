//! GStreamer Daemon command protocol
//!
//! Requests are single whitespace-separated command lines. Every reply is a
//! JSON document terminated by a NUL byte:
//!
//! ```text
//! {"code": 0, "description": "Success", "response": {...}}\0
//! ```

use std::fmt;

use pipefleet_core::{ControlError, EngineState, EventKind, TargetState};
use serde::Deserialize;
use serde_json::Value;

/// Reply terminator
pub const TERMINATOR: u8 = 0;

/// One daemon command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GstdCommand {
    /// `pipeline_create <name> <description>`
    Create { name: String, description: String },
    /// `pipeline_play <name>` / `pipeline_stop <name>`
    SetState { name: String, target: TargetState },
    /// `event_eos <name>`
    Event { name: String, event: EventKind },
    /// `element_set <name> <element> <param> <value>`
    ElementSet {
        name: String,
        element: String,
        param: String,
        value: String,
    },
    /// `pipeline_delete <name>`
    Delete { name: String },
    /// `read /pipelines/<name>/state`
    ReadState { name: String },
    /// `read /`
    Ping,
}

impl GstdCommand {
    /// Resource the command targets, `None` for daemon-wide commands
    pub fn resource(&self) -> Option<&str> {
        match self {
            GstdCommand::Create { name, .. }
            | GstdCommand::SetState { name, .. }
            | GstdCommand::Event { name, .. }
            | GstdCommand::ElementSet { name, .. }
            | GstdCommand::Delete { name }
            | GstdCommand::ReadState { name } => Some(name),
            GstdCommand::Ping => None,
        }
    }

    /// Check that the command survives the whitespace-delimited wire format
    ///
    /// Names, elements and parameters are single tokens. Descriptions and
    /// values are trailing arguments and may contain spaces, but nothing may
    /// contain the reply terminator.
    pub fn validate(&self) -> Result<(), ControlError> {
        let tokens: Vec<(&str, &str)> = match self {
            GstdCommand::Create { name, .. }
            | GstdCommand::SetState { name, .. }
            | GstdCommand::Event { name, .. }
            | GstdCommand::Delete { name }
            | GstdCommand::ReadState { name } => vec![("name", name.as_str())],
            GstdCommand::ElementSet {
                name,
                element,
                param,
                ..
            } => vec![
                ("name", name.as_str()),
                ("element", element.as_str()),
                ("parameter", param.as_str()),
            ],
            GstdCommand::Ping => vec![],
        };

        for (what, token) in tokens {
            if token.is_empty() || token.chars().any(char::is_whitespace) {
                return Err(ControlError::Malformed(format!(
                    "{} '{}' must be a single non-empty token",
                    what, token
                )));
            }
        }

        if self.to_string().as_bytes().contains(&TERMINATOR) {
            return Err(ControlError::Malformed(
                "command contains a NUL byte".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Display for GstdCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GstdCommand::Create { name, description } => {
                write!(f, "pipeline_create {} {}", name, description)
            }
            GstdCommand::SetState {
                name,
                target: TargetState::Playing,
            } => write!(f, "pipeline_play {}", name),
            GstdCommand::SetState {
                name,
                target: TargetState::Stopped,
            } => write!(f, "pipeline_stop {}", name),
            GstdCommand::Event {
                name,
                event: EventKind::EndOfStream,
            } => write!(f, "event_eos {}", name),
            GstdCommand::ElementSet {
                name,
                element,
                param,
                value,
            } => write!(f, "element_set {} {} {} {}", name, element, param, value),
            GstdCommand::Delete { name } => write!(f, "pipeline_delete {}", name),
            GstdCommand::ReadState { name } => write!(f, "read /pipelines/{}/state", name),
            GstdCommand::Ping => write!(f, "read /"),
        }
    }
}

/// Daemon return codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    Ok,
    NullArgument,
    InvalidArgument,
    OutOfMemory,
    ExistingResource,
    NoResource,
    NoCreate,
    ExistingName,
    BadDescription,
    BadCommand,
    NoRead,
    NoUpdate,
    NoDelete,
    BadValue,
    StateError,
    IpcError,
    EventError,
    MissingInitialization,
    NotFound,
    Unknown(i32),
}

impl From<i32> for ReturnCode {
    fn from(code: i32) -> Self {
        match code {
            0 => ReturnCode::Ok,
            1 => ReturnCode::NullArgument,
            2 => ReturnCode::InvalidArgument,
            3 => ReturnCode::OutOfMemory,
            4 => ReturnCode::ExistingResource,
            5 => ReturnCode::NoResource,
            6 => ReturnCode::NoCreate,
            7 => ReturnCode::ExistingName,
            8 => ReturnCode::BadDescription,
            9 => ReturnCode::BadCommand,
            10 => ReturnCode::NoRead,
            11 => ReturnCode::NoUpdate,
            12 => ReturnCode::NoDelete,
            13 => ReturnCode::BadValue,
            14 => ReturnCode::StateError,
            15 => ReturnCode::IpcError,
            16 => ReturnCode::EventError,
            17 => ReturnCode::MissingInitialization,
            18 => ReturnCode::NotFound,
            other => ReturnCode::Unknown(other),
        }
    }
}

impl ReturnCode {
    /// Classify a failure code with the daemon's description
    pub fn into_error(self, description: String) -> ControlError {
        match self {
            ReturnCode::ExistingResource | ReturnCode::ExistingName => {
                ControlError::DuplicateName(description)
            }
            ReturnCode::NoResource | ReturnCode::NotFound => ControlError::NotFound(description),
            ReturnCode::StateError | ReturnCode::EventError => {
                ControlError::InvalidState(description)
            }
            ReturnCode::BadValue => ControlError::InvalidParameter(description),
            ReturnCode::IpcError => ControlError::Transport(description),
            _ => ControlError::Malformed(description),
        }
    }
}

/// Parsed daemon reply
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Reply {
    /// Return code, 0 on success
    pub code: i32,

    /// Human readable outcome
    #[serde(default)]
    pub description: String,

    /// Command-specific payload
    #[serde(default)]
    pub response: Value,
}

impl Reply {
    /// Decode one reply frame, with or without its terminator
    pub fn parse(frame: &[u8]) -> Result<Self, ControlError> {
        let frame = match frame.split_last() {
            Some((&TERMINATOR, rest)) => rest,
            _ => frame,
        };
        serde_json::from_slice(frame)
            .map_err(|e| ControlError::Transport(format!("unreadable daemon reply: {}", e)))
    }

    /// Payload on success, classified error otherwise
    pub fn into_result(self) -> Result<Value, ControlError> {
        match ReturnCode::from(self.code) {
            ReturnCode::Ok => Ok(self.response),
            code => Err(code.into_error(self.description)),
        }
    }
}

/// Extract the pipeline state from a `read /pipelines/<name>/state` payload
///
/// The payload is a property object whose `value` holds the state name.
pub fn parse_state(response: &Value) -> Result<EngineState, ControlError> {
    let value = response
        .get("value")
        .and_then(Value::as_str)
        .or_else(|| response.as_str())
        .ok_or_else(|| {
            ControlError::Malformed(format!("state reply without a value: {}", response))
        })?;
    value.parse()
}
