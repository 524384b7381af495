//! Pipefleet Core - dependency-ordered orchestration of media pipelines
//!
//! This crate drives a set of named pipelines registered with an external
//! media engine through a scripted lifecycle: create, start, rewire, stop and
//! delete, always respecting the producer/consumer edges between them.
//!
//! # Architecture
//!
//! - [`ControlPlane`] is the seam to the engine. Implementations live in
//!   transport crates (the GStreamer Daemon client) or in [`memory`] for
//!   tests and dry runs.
//! - [`PipelineHandle`] wraps one engine resource, enforces the lifecycle
//!   locally and bounds every round trip with a timeout.
//! - [`Sequencer`] owns the [`PipelineGroup`]s of a run and executes the
//!   phase script, producing a [`RunReport`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pipefleet_core::{Config, InMemoryEngine, Sequencer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("pipelines/media-server.toml"))?;
//!     let engine = Arc::new(InMemoryEngine::new());
//!
//!     let mut sequencer = Sequencer::new(
//!         engine,
//!         config.topology.clone(),
//!         config.sequencer_options(),
//!     )?;
//!     let report = sequencer.run().await?;
//!     println!("{}", serde_json::to_string_pretty(&report.summary())?);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod control;
pub mod error;
pub mod group;
pub mod handle;
pub mod lifecycle;
pub mod memory;
pub mod naming;
pub mod readiness;
pub mod sequencer;
pub mod topology;

pub use config::{Config, ConfigError};
pub use control::{ControlError, ControlPlane, EngineState, EventKind, TargetState};
pub use error::{Error, ErrorKind, Result};
pub use group::{GroupRole, PipelineGroup};
pub use handle::{ElementNaming, HandleOptions, LiveMutation, PipelineHandle};
pub use lifecycle::{LifecycleState, Operation};
pub use memory::{Command, InMemoryEngine};
pub use naming::{LocationScheme, SessionCounter};
pub use readiness::{settle, wait_for_state, ReadinessOptions};
pub use sequencer::{
    Phase, PhaseDelays, PhaseFailure, RunReport, RunSummary, Sequencer, SequencerOptions,
};
pub use topology::{PipelineSpec, RewireSpec, SnapshotSpec, Topology};
