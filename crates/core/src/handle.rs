//! Pipeline handle: one named resource and the commands that act on it
//!
//! A [`PipelineHandle`] is the single point of truth for a resource's
//! lifecycle. Each method checks the local lifecycle table, issues exactly
//! one engine round trip (bounded by the command timeout) and only then
//! updates the tracked state.
//!
//! # Example
//!
//! ```ignore
//! use pipefleet_core::{HandleOptions, PipelineHandle};
//!
//! let mut cam = PipelineHandle::create(client.clone(), "cam", "v4l2src ! interpipesink name=cam", HandleOptions::default()).await?;
//! let mut rec = PipelineHandle::create(client.clone(), "rec", "interpipesrc name=rec_src listen-to=cam ! filesink name=filesink_rec", HandleOptions::default()).await?;
//!
//! cam.play().await?;
//! rec.set_output_location("/tmp/rec_0.mkv").await?;
//! rec.play().await?;
//!
//! rec.send_end_of_stream().await?;
//! rec.stop().await?;
//! cam.stop().await?;
//! rec.delete().await?;
//! cam.delete().await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::control::{ControlError, ControlPlane, EngineState, EventKind, TargetState};
use crate::error::{Error, Result};
use crate::lifecycle::{LifecycleState, Operation};

/// What a handle does with a parameter change requested while playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveMutation {
    /// Send immediately; the engine supports changing it live
    Apply,
    /// Hold it and send it right before the next `play()`
    Defer,
    /// Refuse with `InvalidState`
    Reject,
}

/// Engine element/parameter names a handle uses for its two mutations
///
/// These are engine-defined identifiers; the defaults follow the interpipe
/// convention of naming the file sink `filesink_<pipeline>` and the input
/// source `<pipeline>_src`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementNaming {
    /// Prefix prepended to the pipeline name to get the sink element
    #[serde(default = "default_sink_prefix")]
    pub sink_prefix: String,

    /// Parameter on the sink element holding the output path
    #[serde(default = "default_location_param")]
    pub location_param: String,

    /// Suffix appended to the pipeline name to get the source element
    #[serde(default = "default_source_suffix")]
    pub source_suffix: String,

    /// Parameter on the source element naming the producer
    #[serde(default = "default_source_param")]
    pub source_param: String,
}

fn default_sink_prefix() -> String {
    "filesink_".to_string()
}

fn default_location_param() -> String {
    "location".to_string()
}

fn default_source_suffix() -> String {
    "_src".to_string()
}

fn default_source_param() -> String {
    "listen-to".to_string()
}

impl Default for ElementNaming {
    fn default() -> Self {
        Self {
            sink_prefix: default_sink_prefix(),
            location_param: default_location_param(),
            source_suffix: default_source_suffix(),
            source_param: default_source_param(),
        }
    }
}

/// Per-handle behaviour shared by every handle of a run
#[derive(Debug, Clone)]
pub struct HandleOptions {
    /// Bound on each engine round trip
    pub command_timeout: Duration,

    /// Output relocation while playing
    pub relocate_while_playing: LiveMutation,

    /// Source rebinding while playing
    pub rebind_while_playing: LiveMutation,

    /// Element/parameter naming
    pub naming: ElementNaming,
}

impl Default for HandleOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(10),
            relocate_while_playing: LiveMutation::Defer,
            rebind_while_playing: LiveMutation::Apply,
            naming: ElementNaming::default(),
        }
    }
}

/// A parameter write held back until the next `play()`
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingMutation {
    operation: Operation,
    element: String,
    param: String,
    value: String,
}

/// Handle to one named pipeline resource registered with the engine
pub struct PipelineHandle {
    client: Arc<dyn ControlPlane>,
    name: String,
    description: String,
    state: LifecycleState,
    options: HandleOptions,
    output_location: Option<String>,
    source: Option<String>,
    pending: Vec<PendingMutation>,
}

impl std::fmt::Debug for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineHandle")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("output_location", &self.output_location)
            .field("source", &self.source)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Run one engine call under `timeout`, classifying failures for `name`
async fn round_trip<T, F>(name: &str, operation: Operation, timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, ControlError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!(pipeline = %name, %operation, error = %e, "Engine rejected command");
            Err(Error::from_control(name, operation, e))
        }
        Err(_) => {
            warn!(pipeline = %name, %operation, timeout_ms = timeout.as_millis() as u64, "Engine command timed out");
            Err(Error::Timeout {
                name: name.to_string(),
                operation,
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

impl PipelineHandle {
    /// Register `name` with the engine and return a handle in `Created` state
    ///
    /// # Errors
    ///
    /// * `Error::DuplicateName` - the name is already registered
    /// * `Error::MalformedRequest` - the engine rejected the description
    /// * `Error::Transport` / `Error::Timeout` - the engine could not be reached
    pub async fn create(
        client: Arc<dyn ControlPlane>,
        name: impl Into<String>,
        description: impl Into<String>,
        options: HandleOptions,
    ) -> Result<Self> {
        let name = name.into();
        let description = description.into();

        info!(pipeline = %name, "Creating pipeline");
        round_trip(
            &name,
            Operation::Create,
            options.command_timeout,
            client.create_resource(&name, &description),
        )
        .await?;

        Ok(Self {
            client,
            name,
            description,
            state: LifecycleState::Created,
            options,
            output_location: None,
            source: None,
            pending: Vec::new(),
        })
    }

    /// Resource name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description the resource was created with
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Tracked lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Last output location requested through this handle
    pub fn output_location(&self) -> Option<&str> {
        self.output_location.as_deref()
    }

    /// Last producer this handle was rebound to
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Number of parameter writes waiting for the next `play()`
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn check(&self, operation: Operation) -> Result<()> {
        if self.state.permits(operation) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                name: self.name.clone(),
                operation,
                detail: format!("resource is {}", self.state),
            })
        }
    }

    fn sink_element(&self) -> String {
        format!("{}{}", self.options.naming.sink_prefix, self.name)
    }

    fn source_element(&self) -> String {
        format!("{}{}", self.name, self.options.naming.source_suffix)
    }

    async fn set_state(&self, operation: Operation, target: TargetState) -> Result<()> {
        round_trip(
            &self.name,
            operation,
            self.options.command_timeout,
            self.client.set_state(&self.name, target),
        )
        .await
    }

    async fn write_parameter(
        &self,
        operation: Operation,
        element: &str,
        param: &str,
        value: &str,
    ) -> Result<()> {
        debug!(pipeline = %self.name, element, param, value, "Setting parameter");
        round_trip(
            &self.name,
            operation,
            self.options.command_timeout,
            self.client.set_parameter(&self.name, element, param, value),
        )
        .await
    }

    /// Start playback; valid from `Created` or `Stopped`
    ///
    /// Deferred parameter writes are flushed first, in the order they were
    /// requested. If one of them fails the pipeline is not started and the
    /// remaining writes stay queued.
    pub async fn play(&mut self) -> Result<()> {
        self.check(Operation::Play)?;

        while let Some(mutation) = self.pending.first().cloned() {
            debug!(pipeline = %self.name, element = %mutation.element, "Applying deferred parameter");
            self.write_parameter(
                mutation.operation,
                &mutation.element,
                &mutation.param,
                &mutation.value,
            )
            .await?;
            self.pending.remove(0);
        }

        info!(pipeline = %self.name, "Playing pipeline");
        self.set_state(Operation::Play, TargetState::Playing).await?;
        self.state = self.state.after(Operation::Play);
        Ok(())
    }

    /// Stop playback; valid from `Playing` or `Created`
    ///
    /// Stopping an already stopped resource is a caller error.
    pub async fn stop(&mut self) -> Result<()> {
        self.check(Operation::Stop)?;

        info!(pipeline = %self.name, "Stopping pipeline");
        self.set_state(Operation::Stop, TargetState::Stopped).await?;
        self.state = self.state.after(Operation::Stop);
        Ok(())
    }

    /// Signal end of input so file sinks flush; valid only while `Playing`
    pub async fn send_end_of_stream(&mut self) -> Result<()> {
        self.check(Operation::SendEndOfStream)?;

        info!(pipeline = %self.name, "Sending EOS to pipeline");
        round_trip(
            &self.name,
            Operation::SendEndOfStream,
            self.options.command_timeout,
            self.client.send_event(&self.name, EventKind::EndOfStream),
        )
        .await
    }

    /// Deregister the resource; valid only from `Stopped`
    ///
    /// The handle is terminal afterwards: every further call fails with
    /// `InvalidState`.
    pub async fn delete(&mut self) -> Result<()> {
        self.check(Operation::Delete)?;

        info!(pipeline = %self.name, "Deleting pipeline");
        round_trip(
            &self.name,
            Operation::Delete,
            self.options.command_timeout,
            self.client.delete_resource(&self.name),
        )
        .await?;
        self.state = self.state.after(Operation::Delete);
        self.pending.clear();
        Ok(())
    }

    /// Point the resource's file sink at `location`
    ///
    /// Outside `Playing` the value is written immediately and used from the
    /// next `play()`. While playing, the configured [`LiveMutation`] decides.
    pub async fn set_output_location(&mut self, location: &str) -> Result<()> {
        let element = self.sink_element();
        let param = self.options.naming.location_param.clone();
        let policy = self.options.relocate_while_playing;

        info!(pipeline = %self.name, location, "Setting pipeline output location");
        self.mutate(Operation::SetOutputLocation, policy, element, param, location)
            .await?;
        self.output_location = Some(location.to_string());
        Ok(())
    }

    /// Make the resource's input listen to `producer`
    ///
    /// Outside `Playing` this is always safe. While playing, the configured
    /// [`LiveMutation`] decides whether the engine performs a live handoff.
    pub async fn rebind_source(&mut self, producer: &str) -> Result<()> {
        let element = self.source_element();
        let param = self.options.naming.source_param.clone();
        let policy = self.options.rebind_while_playing;

        info!(pipeline = %self.name, producer, "Rebinding pipeline source");
        self.mutate(Operation::RebindSource, policy, element, param, producer)
            .await?;
        self.source = Some(producer.to_string());
        Ok(())
    }

    async fn mutate(
        &mut self,
        operation: Operation,
        policy: LiveMutation,
        element: String,
        param: String,
        value: &str,
    ) -> Result<()> {
        self.check(operation)?;

        if self.state == LifecycleState::Playing {
            match policy {
                LiveMutation::Apply => {}
                LiveMutation::Defer => {
                    debug!(pipeline = %self.name, %element, "Deferring parameter until next play");
                    self.pending
                        .retain(|m| !(m.element == element && m.param == param));
                    self.pending.push(PendingMutation {
                        operation,
                        element,
                        param,
                        value: value.to_string(),
                    });
                    return Ok(());
                }
                LiveMutation::Reject => {
                    return Err(Error::InvalidState {
                        name: self.name.clone(),
                        operation,
                        detail: "live change not supported while playing".to_string(),
                    });
                }
            }
        }

        // A newer direct write supersedes anything queued for the same parameter
        self.pending
            .retain(|m| !(m.element == element && m.param == param));
        self.write_parameter(operation, &element, &param, value).await
    }

    /// Ask the engine for the resource's actual state
    pub async fn query_state(&self) -> Result<EngineState> {
        self.check(Operation::QueryState)?;

        round_trip(
            &self.name,
            Operation::QueryState,
            self.options.command_timeout,
            self.client.query_state(&self.name),
        )
        .await
    }
}
