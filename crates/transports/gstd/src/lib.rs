//! GStreamer Daemon transport for Pipefleet
//!
//! Implements [`pipefleet_core::ControlPlane`] on top of the gstd TCP
//! command protocol, so a sequencer can drive pipelines hosted by a running
//! `gstd` instance.
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use pipefleet_gstd::GstdClient;
//! use pipefleet_core::{Config, Sequencer};
//!
//! let config = Config::load(Some("pipelines/media-server.toml"))?;
//! let client = GstdClient::from_config(&config.engine);
//! client.ping().await?;
//!
//! let mut sequencer = Sequencer::new(
//!     Arc::new(client),
//!     config.topology.clone(),
//!     config.sequencer_options(),
//! )?;
//! let report = sequencer.run().await?;
//! ```

pub mod client;
pub mod protocol;
pub mod retry;

pub use client::{GstdClient, GstdError, DEFAULT_ADDRESS};
pub use protocol::{GstdCommand, Reply, ReturnCode};
pub use retry::{RetryConfig, RetryExecutor};
