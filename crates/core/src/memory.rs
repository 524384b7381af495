//! In-memory engine
//!
//! [`InMemoryEngine`] implements [`ControlPlane`] without any media work. It
//! keeps the engine-side bookkeeping (registered names, states, last value of
//! every parameter) and a log of every command it received, in order. The
//! media server uses it for `--dry-run`; tests use it as a recording fake
//! with failure injection.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::control::{ControlError, ControlPlane, EngineState, EventKind, TargetState};

/// A command as received by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `create_resource`
    Create {
        /// Resource name
        name: String,
    },
    /// `set_state`
    SetState {
        /// Resource name
        name: String,
        /// Requested state
        target: TargetState,
    },
    /// `send_event`
    SendEvent {
        /// Resource name
        name: String,
        /// Injected event
        event: EventKind,
    },
    /// `set_parameter`
    SetParameter {
        /// Resource name
        name: String,
        /// Element inside the resource
        element: String,
        /// Parameter on the element
        param: String,
        /// New value
        value: String,
    },
    /// `delete_resource`
    Delete {
        /// Resource name
        name: String,
    },
}

impl Command {
    /// Resource the command targets
    pub fn resource(&self) -> &str {
        match self {
            Command::Create { name }
            | Command::SetState { name, .. }
            | Command::SendEvent { name, .. }
            | Command::SetParameter { name, .. }
            | Command::Delete { name } => name,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Create { name } => write!(f, "create({})", name),
            Command::SetState { name, target } => write!(f, "setState({},{})", name, target),
            Command::SendEvent { name, event } => write!(f, "sendEvent({},{})", name, event),
            Command::SetParameter {
                name,
                element,
                param,
                value,
            } => write!(f, "setParameter({},{},{},{})", name, element, param, value),
            Command::Delete { name } => write!(f, "delete({})", name),
        }
    }
}

type FailureRule = Box<dyn Fn(&Command) -> Option<ControlError> + Send + Sync>;

#[derive(Default)]
struct Inner {
    resources: HashMap<String, EngineState>,
    log: Vec<Command>,
    queries: usize,
    held: HashMap<String, EngineState>,
    rules: Vec<FailureRule>,
    // keyed by (resource, element, param); survives deletion
    parameters: HashMap<(String, String, String), String>,
}

/// Engine double that tracks state in memory and records every command
///
/// # Example
///
/// ```
/// use pipefleet_core::{ControlPlane, InMemoryEngine, TargetState};
///
/// # tokio_test::block_on(async {
/// let engine = InMemoryEngine::new();
/// engine.create_resource("cam", "videotestsrc ! fakesink").await.unwrap();
/// engine.set_state("cam", TargetState::Playing).await.unwrap();
///
/// assert_eq!(engine.command_strings(), vec!["create(cam)", "setState(cam,playing)"]);
/// # });
/// ```
#[derive(Default)]
pub struct InMemoryEngine {
    inner: Mutex<Inner>,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryEngine {
    /// Create an empty engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `create_resource` for `name` with `error`
    pub fn reject_create(&self, name: &str, error: ControlError) {
        let name = name.to_string();
        self.fail_when(move |cmd| match cmd {
            Command::Create { name: n } if *n == name => Some(error.clone()),
            _ => None,
        });
    }

    /// Fail every command for which `rule` returns an error
    pub fn fail_when<F>(&self, rule: F)
    where
        F: Fn(&Command) -> Option<ControlError> + Send + Sync + 'static,
    {
        self.inner.lock().rules.push(Box::new(rule));
    }

    /// Make `query_state` report `state` for `name` regardless of transitions
    pub fn hold_state(&self, name: &str, state: EngineState) {
        self.inner.lock().held.insert(name.to_string(), state);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Every mutating command received so far, in arrival order
    pub fn commands(&self) -> Vec<Command> {
        self.inner.lock().log.clone()
    }

    /// Commands rendered as strings, e.g. `setState(cam,playing)`
    pub fn command_strings(&self) -> Vec<String> {
        self.inner.lock().log.iter().map(|c| c.to_string()).collect()
    }

    /// Number of `query_state` calls received
    pub fn query_count(&self) -> usize {
        self.inner.lock().queries
    }

    /// Last value written to `element.param` of `name`
    pub fn parameter(&self, name: &str, element: &str, param: &str) -> Option<String> {
        self.inner
            .lock()
            .parameters
            .get(&(name.to_string(), element.to_string(), param.to_string()))
            .cloned()
    }

    /// Names currently registered
    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.lock().resources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Engine-side state of `name`, if registered
    pub fn state_of(&self, name: &str) -> Option<EngineState> {
        self.inner.lock().resources.get(name).copied()
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Log `command`, run injected rules, then apply it
    fn dispatch(&self, command: Command) -> Result<(), ControlError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.log.push(command.clone());

        if let Some(err) = inner.rules.iter().find_map(|rule| rule(&command)) {
            return Err(err);
        }

        match command {
            Command::Create { name } => {
                if inner.resources.contains_key(&name) {
                    return Err(ControlError::DuplicateName(format!(
                        "pipeline '{}' already exists",
                        name
                    )));
                }
                inner.resources.insert(name, EngineState::Null);
            }
            Command::SetState { name, target } => {
                let state = lookup(&mut inner.resources, &name)?;
                *state = match target {
                    TargetState::Playing => EngineState::Playing,
                    TargetState::Stopped => EngineState::Null,
                };
            }
            Command::SendEvent { name, event } => {
                let state = *lookup(&mut inner.resources, &name)?;
                if state != EngineState::Playing {
                    return Err(ControlError::InvalidState(format!(
                        "cannot send {} to '{}' in state {}",
                        event, name, state
                    )));
                }
            }
            Command::SetParameter {
                name,
                element,
                param,
                value,
            } => {
                lookup(&mut inner.resources, &name)?;
                inner.parameters.insert((name, element, param), value);
            }
            Command::Delete { name } => {
                if *lookup(&mut inner.resources, &name)? == EngineState::Playing {
                    return Err(ControlError::InvalidState(format!(
                        "pipeline '{}' is still playing",
                        name
                    )));
                }
                inner.resources.remove(&name);
            }
        }

        Ok(())
    }
}

fn lookup<'a>(
    resources: &'a mut HashMap<String, EngineState>,
    name: &str,
) -> Result<&'a mut EngineState, ControlError> {
    resources
        .get_mut(name)
        .ok_or_else(|| ControlError::NotFound(format!("pipeline '{}' does not exist", name)))
}

#[async_trait]
impl ControlPlane for InMemoryEngine {
    async fn create_resource(&self, name: &str, _description: &str) -> Result<(), ControlError> {
        self.delay().await;
        self.dispatch(Command::Create {
            name: name.to_string(),
        })
    }

    async fn set_state(&self, name: &str, target: TargetState) -> Result<(), ControlError> {
        self.delay().await;
        self.dispatch(Command::SetState {
            name: name.to_string(),
            target,
        })
    }

    async fn send_event(&self, name: &str, event: EventKind) -> Result<(), ControlError> {
        self.delay().await;
        self.dispatch(Command::SendEvent {
            name: name.to_string(),
            event,
        })
    }

    async fn set_parameter(
        &self,
        name: &str,
        element: &str,
        param: &str,
        value: &str,
    ) -> Result<(), ControlError> {
        self.delay().await;
        self.dispatch(Command::SetParameter {
            name: name.to_string(),
            element: element.to_string(),
            param: param.to_string(),
            value: value.to_string(),
        })
    }

    async fn delete_resource(&self, name: &str) -> Result<(), ControlError> {
        self.delay().await;
        self.dispatch(Command::Delete {
            name: name.to_string(),
        })
    }

    async fn query_state(&self, name: &str) -> Result<EngineState, ControlError> {
        self.delay().await;
        let mut inner = self.inner.lock();
        inner.queries += 1;
        if let Some(state) = inner.held.get(name) {
            return Ok(*state);
        }
        lookup(&mut inner.resources, name).map(|state| *state)
    }
}
