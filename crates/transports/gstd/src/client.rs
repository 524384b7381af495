//! TCP client for the GStreamer Daemon
//!
//! Each command opens its own connection, writes the command line, reads
//! one NUL-terminated reply and closes. Connection setup is retried; the
//! exchange itself is bounded by the request timeout and never replayed.

use std::time::Duration;

use async_trait::async_trait;
use pipefleet_core::config::EngineConfig;
use pipefleet_core::{ControlError, ControlPlane, EngineState, EventKind, TargetState};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::protocol::{parse_state, GstdCommand, Reply, TERMINATOR};
use crate::retry::{RetryConfig, RetryExecutor};

/// Default timeout for a single exchange (10 seconds)
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default daemon address
pub const DEFAULT_ADDRESS: &str = "localhost:5000";

/// Errors raised before the daemon produced a reply
#[derive(Debug, thiserror::Error)]
pub enum GstdError {
    /// Could not open a connection
    #[error("cannot connect to gstd at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Connection broke mid-exchange
    #[error("gstd connection error: {0}")]
    Io(#[from] std::io::Error),

    /// No reply within the request timeout
    #[error("gstd did not answer '{command}' within {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    /// Connection closed before a reply arrived
    #[error("gstd closed the connection without replying to '{0}'")]
    NoReply(String),
}

impl From<GstdError> for ControlError {
    fn from(err: GstdError) -> Self {
        let detail = err.to_string();
        match err {
            GstdError::Timeout { timeout_ms, .. } => ControlError::Timeout { detail, timeout_ms },
            _ => ControlError::Transport(detail),
        }
    }
}

/// Control-plane client speaking the gstd TCP protocol
#[derive(Debug, Clone)]
pub struct GstdClient {
    address: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl Default for GstdClient {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }
}

impl GstdClient {
    /// Client for the daemon at `address` (`host:port`)
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryConfig::default(),
        }
    }

    /// Client configured from the `[engine]` section
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.address())
            .with_timeout(Duration::from_millis(config.command_timeout_ms))
            .with_retry(RetryConfig {
                max_retries: config.connect_retries,
                backoff_ms: config.retry_backoff_ms,
            })
    }

    /// Set the per-exchange timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connection retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Daemon address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Check that the daemon is reachable and answering
    pub async fn ping(&self) -> Result<(), ControlError> {
        self.request(&GstdCommand::Ping).await.map(|_| ())
    }

    async fn connect(&self) -> Result<TcpStream, GstdError> {
        let executor = RetryExecutor::new(self.retry);
        executor
            .execute(|| async {
                match timeout(self.timeout, TcpStream::connect(&self.address)).await {
                    Ok(Ok(stream)) => Ok(stream),
                    Ok(Err(source)) => Err(GstdError::Connect {
                        address: self.address.clone(),
                        source,
                    }),
                    Err(_) => Err(GstdError::Connect {
                        address: self.address.clone(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            "connect timed out",
                        ),
                    }),
                }
            })
            .await
    }

    /// Write `line` and read back one reply frame
    async fn exchange(&self, mut stream: TcpStream, line: &str) -> Result<Vec<u8>, GstdError> {
        stream.write_all(line.as_bytes()).await?;
        stream.flush().await?;

        let mut reader = BufReader::new(stream);
        let mut frame = Vec::new();
        let read = reader.read_until(TERMINATOR, &mut frame).await?;
        if read == 0 {
            return Err(GstdError::NoReply(line.to_string()));
        }
        Ok(frame)
    }

    /// Send one command and return the reply payload
    pub async fn request(&self, command: &GstdCommand) -> Result<Value, ControlError> {
        command.validate()?;
        let line = command.to_string();

        let stream = self.connect().await?;
        debug!(command = %line, "Sending gstd command");

        let frame = match timeout(self.timeout, self.exchange(stream, &line)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(GstdError::Timeout {
                    command: line,
                    timeout_ms: self.timeout.as_millis() as u64,
                }
                .into())
            }
        };
        trace!(reply = %String::from_utf8_lossy(&frame), "gstd reply");

        let reply = Reply::parse(&frame)?;
        if reply.code != 0 {
            debug!(
                pipeline = command.resource().unwrap_or("-"),
                code = reply.code,
                description = %reply.description,
                "gstd refused command"
            );
        }
        reply.into_result()
    }
}

#[async_trait]
impl ControlPlane for GstdClient {
    async fn create_resource(&self, name: &str, description: &str) -> Result<(), ControlError> {
        self.request(&GstdCommand::Create {
            name: name.to_string(),
            description: description.to_string(),
        })
        .await
        .map(|_| ())
    }

    async fn set_state(&self, name: &str, target: TargetState) -> Result<(), ControlError> {
        self.request(&GstdCommand::SetState {
            name: name.to_string(),
            target,
        })
        .await
        .map(|_| ())
    }

    async fn send_event(&self, name: &str, event: EventKind) -> Result<(), ControlError> {
        self.request(&GstdCommand::Event {
            name: name.to_string(),
            event,
        })
        .await
        .map(|_| ())
    }

    async fn set_parameter(
        &self,
        name: &str,
        element: &str,
        param: &str,
        value: &str,
    ) -> Result<(), ControlError> {
        self.request(&GstdCommand::ElementSet {
            name: name.to_string(),
            element: element.to_string(),
            param: param.to_string(),
            value: value.to_string(),
        })
        .await
        .map(|_| ())
    }

    async fn delete_resource(&self, name: &str) -> Result<(), ControlError> {
        self.request(&GstdCommand::Delete {
            name: name.to_string(),
        })
        .await
        .map(|_| ())
    }

    async fn query_state(&self, name: &str) -> Result<EngineState, ControlError> {
        let response = self
            .request(&GstdCommand::ReadState {
                name: name.to_string(),
            })
            .await?;
        parse_state(&response)
    }
}
