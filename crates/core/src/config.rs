//! Configuration for an orchestration run
//!
//! Configuration can be loaded from a TOML file and/or environment variables.
//! The same file carries the topology, so one file describes a deployment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::handle::{ElementNaming, HandleOptions, LiveMutation};
use crate::naming::LocationScheme;
use crate::readiness::ReadinessOptions;
use crate::sequencer::{PhaseDelays, SequencerOptions};
use crate::topology::Topology;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Engine connection
    #[serde(default)]
    pub engine: EngineConfig,

    /// Readiness and settle timings
    #[serde(default)]
    pub timing: TimingConfig,

    /// Live parameter changes while playing
    #[serde(default)]
    pub mutation: MutationConfig,

    /// Engine element naming convention
    #[serde(default)]
    pub naming: ElementNaming,

    /// Output file naming
    #[serde(default)]
    pub locations: LocationScheme,

    /// Pipelines and run-time wiring
    #[serde(default)]
    pub topology: Topology,
}

/// Engine connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Daemon host
    #[serde(default = "default_host")]
    pub host: String,

    /// Daemon TCP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bound on each command round trip in milliseconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Connection attempts after the first one fails
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Initial connect backoff in milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_command_timeout() -> u64 {
    10_000
}

fn default_connect_retries() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    200
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            command_timeout_ms: default_command_timeout(),
            connect_retries: default_connect_retries(),
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

impl EngineConfig {
    /// `host:port` of the daemon
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Settle after the base group is up
    #[serde(default = "default_base_settle")]
    pub base_settle_ms: u64,

    /// Settle after recordings and encodings are up
    #[serde(default = "default_recording_settle")]
    pub recording_settle_ms: u64,

    /// Settle after the first snapshot
    #[serde(default = "default_snapshot_settle")]
    pub snapshot_settle_ms: u64,

    /// Settle after re-recording starts
    #[serde(default = "default_rewire_settle")]
    pub rewire_settle_ms: u64,

    /// Bound on waiting for a pipeline to report PLAYING
    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_ms: u64,

    /// Interval between state queries
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Confirm PLAYING with the engine after each start
    #[serde(default = "default_wait_for_playing")]
    pub wait_for_playing: bool,
}

fn default_base_settle() -> u64 {
    10_000
}

fn default_recording_settle() -> u64 {
    20_000
}

fn default_snapshot_settle() -> u64 {
    5_000
}

fn default_rewire_settle() -> u64 {
    10_000
}

fn default_readiness_timeout() -> u64 {
    10_000
}

fn default_poll_interval() -> u64 {
    100
}

fn default_wait_for_playing() -> bool {
    true
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            base_settle_ms: default_base_settle(),
            recording_settle_ms: default_recording_settle(),
            snapshot_settle_ms: default_snapshot_settle(),
            rewire_settle_ms: default_rewire_settle(),
            readiness_timeout_ms: default_readiness_timeout(),
            poll_interval_ms: default_poll_interval(),
            wait_for_playing: default_wait_for_playing(),
        }
    }
}

/// Live mutation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationConfig {
    /// Output relocation while playing
    #[serde(default = "default_relocate")]
    pub relocate_while_playing: LiveMutation,

    /// Source rebinding while playing
    #[serde(default = "default_rebind")]
    pub rebind_while_playing: LiveMutation,
}

fn default_relocate() -> LiveMutation {
    LiveMutation::Defer
}

fn default_rebind() -> LiveMutation {
    LiveMutation::Apply
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            relocate_while_playing: default_relocate(),
            rebind_while_playing: default_rebind(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Override fields from environment variables
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("PIPEFLEET_GSTD_HOST") {
            self.engine.host = host;
        }
        if let Ok(port) = std::env::var("PIPEFLEET_GSTD_PORT") {
            if let Ok(p) = port.parse() {
                self.engine.port = p;
            }
        }
        if let Ok(timeout) = std::env::var("PIPEFLEET_COMMAND_TIMEOUT_MS") {
            if let Ok(t) = timeout.parse() {
                self.engine.command_timeout_ms = t;
            }
        }
        if let Ok(dir) = std::env::var("PIPEFLEET_OUTPUT_DIR") {
            self.locations.directory = Some(PathBuf::from(dir));
        }
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Load configuration from file if given, then apply the environment
    ///
    /// Unlike a missing default location, an explicitly named file that
    /// does not exist is an error.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Zero every settle delay; readiness polling alone gates the phases
    pub fn disable_settle(&mut self) {
        self.timing.base_settle_ms = 0;
        self.timing.recording_settle_ms = 0;
        self.timing.snapshot_settle_ms = 0;
        self.timing.rewire_settle_ms = 0;
    }

    /// Options handed to every pipeline handle
    pub fn handle_options(&self) -> HandleOptions {
        HandleOptions {
            command_timeout: Duration::from_millis(self.engine.command_timeout_ms),
            relocate_while_playing: self.mutation.relocate_while_playing,
            rebind_while_playing: self.mutation.rebind_while_playing,
            naming: self.naming.clone(),
        }
    }

    /// Options for the sequencer
    pub fn sequencer_options(&self) -> SequencerOptions {
        let timing = &self.timing;
        let readiness = timing.wait_for_playing.then(|| ReadinessOptions {
            timeout: Duration::from_millis(timing.readiness_timeout_ms),
            poll_interval: Duration::from_millis(timing.poll_interval_ms),
        });

        SequencerOptions {
            handle: self.handle_options(),
            readiness,
            delays: PhaseDelays {
                base: Duration::from_millis(timing.base_settle_ms),
                recording: Duration::from_millis(timing.recording_settle_ms),
                snapshot: Duration::from_millis(timing.snapshot_settle_ms),
                rewire: Duration::from_millis(timing.rewire_settle_ms),
            },
            locations: self.locations.clone(),
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("IO error: {0}")]
    Io(String),

    /// File is not valid configuration TOML
    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::GroupRole;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.address(), "localhost:5000");
        assert_eq!(config.timing.base_settle_ms, 10_000);
        assert_eq!(config.timing.recording_settle_ms, 20_000);
        assert_eq!(config.timing.snapshot_settle_ms, 5_000);
        assert_eq!(config.timing.rewire_settle_ms, 10_000);
        assert_eq!(config.mutation.relocate_while_playing, LiveMutation::Defer);
        assert_eq!(config.mutation.rebind_while_playing, LiveMutation::Apply);
        assert!(config.topology.pipelines.is_empty());
    }

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
[engine]
host = "jetson.local"
port = 5001

[timing]
recording_settle_ms = 500
wait_for_playing = false

[mutation]
rebind_while_playing = "reject"

[locations]
directory = "/data/out"

[[topology.pipelines]]
name = "cam"
group = "base"
description = "videotestsrc ! interpipesink name=cam"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.engine.address(), "jetson.local:5001");
        assert_eq!(config.engine.command_timeout_ms, 10_000);
        assert_eq!(config.timing.recording_settle_ms, 500);
        assert_eq!(config.mutation.rebind_while_playing, LiveMutation::Reject);
        assert_eq!(config.topology.pipelines[0].group, GroupRole::Base);

        let options = config.sequencer_options();
        assert!(options.readiness.is_none());
        assert_eq!(options.delays.recording, Duration::from_millis(500));
        assert_eq!(
            options.locations.location(GroupRole::Recording, "rec", 0),
            "/data/out/test_rec_0.mkv"
        );
    }

    #[test]
    fn test_disable_settle() {
        let mut config = Config::default();
        config.disable_settle();

        let options = config.sequencer_options();
        assert_eq!(options.delays, PhaseDelays::none());
        assert!(options.readiness.is_some());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[engine]\nport = 6000").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.engine.port, 6000);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = Config::load(Some("/nonexistent/pipefleet.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
