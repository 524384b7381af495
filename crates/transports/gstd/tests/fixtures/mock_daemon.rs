//! Throwaway gstd stand-in for client tests
//!
//! Listens on a random loopback port, answers each connection's single
//! command the way the daemon does (NUL-terminated JSON) and keeps enough
//! state to answer state reads.
//!
//! # Usage
//!
//! ```ignore
//! let daemon = MockDaemon::start().await?;
//! let client = GstdClient::new(daemon.address());
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Default)]
struct DaemonState {
    pipelines: HashMap<String, String>,
    properties: HashMap<(String, String, String), String>,
    received: Vec<String>,
    silent: bool,
}

impl DaemonState {
    fn transition(&mut self, name: &str, state: &str) -> (i32, &'static str, Value) {
        match self.pipelines.get_mut(name) {
            Some(current) => {
                *current = state.to_string();
                (0, "Success", Value::Null)
            }
            None => (5, "Resource not found", Value::Null),
        }
    }

    fn handle(&mut self, line: &str) -> (i32, &'static str, Value) {
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));

        match command {
            "pipeline_create" => {
                let (name, description) = rest.split_once(' ').unwrap_or((rest, ""));
                if description.trim().is_empty() {
                    return (8, "Bad pipeline description", Value::Null);
                }
                if self.pipelines.contains_key(name) {
                    return (7, "Existing name", Value::Null);
                }
                self.pipelines.insert(name.to_string(), "NULL".to_string());
                (0, "Success", Value::Null)
            }
            "pipeline_play" => self.transition(rest, "PLAYING"),
            "pipeline_stop" => self.transition(rest, "NULL"),
            "event_eos" => match self.pipelines.get(rest).map(String::as_str) {
                None => (5, "Resource not found", Value::Null),
                Some("PLAYING") => (0, "Success", Value::Null),
                Some(_) => (16, "Event error", Value::Null),
            },
            "element_set" => {
                let fields: Vec<&str> = rest.splitn(4, ' ').collect();
                if fields.len() != 4 {
                    return (2, "Invalid argument", Value::Null);
                }
                if !self.pipelines.contains_key(fields[0]) {
                    return (5, "Resource not found", Value::Null);
                }
                self.properties.insert(
                    (
                        fields[0].to_string(),
                        fields[1].to_string(),
                        fields[2].to_string(),
                    ),
                    fields[3].to_string(),
                );
                (0, "Success", Value::Null)
            }
            "pipeline_delete" => match self.pipelines.remove(rest) {
                Some(_) => (0, "Success", Value::Null),
                None => (5, "Resource not found", Value::Null),
            },
            "read" if rest == "/" => (0, "Success", json!({"name": "/", "nodes": []})),
            "read" => {
                let name = rest
                    .strip_prefix("/pipelines/")
                    .and_then(|r| r.strip_suffix("/state"));
                match name.and_then(|n| self.pipelines.get(n)) {
                    Some(state) => (
                        0,
                        "Success",
                        json!({"name": "state", "value": state, "param": {"access": "read"}}),
                    ),
                    None => (5, "Resource not found", Value::Null),
                }
            }
            _ => (9, "Bad command", Value::Null),
        }
    }
}

/// Mock daemon bound to a random port
pub struct MockDaemon {
    address: String,
    state: Arc<Mutex<DaemonState>>,
    task: JoinHandle<()>,
}

impl MockDaemon {
    /// Daemon that answers every command
    pub async fn start() -> anyhow::Result<Self> {
        Self::spawn(false).await
    }

    /// Daemon that accepts commands but never replies
    pub async fn start_silent() -> anyhow::Result<Self> {
        Self::spawn(true).await
    }

    async fn spawn(silent: bool) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?.to_string();
        let state = Arc::new(Mutex::new(DaemonState {
            silent,
            ..DaemonState::default()
        }));

        let shared = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, Arc::clone(&shared)));
            }
        });

        Ok(Self {
            address,
            state,
            task,
        })
    }

    /// `host:port` to connect to
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Command lines received so far
    pub fn received(&self) -> Vec<String> {
        self.state.lock().received.clone()
    }

    /// Daemon-side state of `name`
    pub fn state_of(&self, name: &str) -> Option<String> {
        self.state.lock().pipelines.get(name).cloned()
    }

    /// Last value set on `element.param` of `name`
    pub fn property(&self, name: &str, element: &str, param: &str) -> Option<String> {
        self.state
            .lock()
            .properties
            .get(&(name.to_string(), element.to_string(), param.to_string()))
            .cloned()
    }
}

impl Drop for MockDaemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut socket: TcpStream, state: Arc<Mutex<DaemonState>>) {
    let mut buf = vec![0u8; 8192];
    let n = match socket.read(&mut buf).await {
        Ok(n) if n > 0 => n,
        _ => return,
    };
    let line = String::from_utf8_lossy(&buf[..n]).to_string();

    let reply = {
        let mut state = state.lock();
        state.received.push(line.clone());
        if state.silent {
            None
        } else {
            Some(state.handle(&line))
        }
    };

    match reply {
        Some((code, description, response)) => {
            let mut frame = serde_json::to_vec(&json!({
                "code": code,
                "description": description,
                "response": response,
            }))
            .unwrap();
            frame.push(0);
            let _ = socket.write_all(&frame).await;
        }
        None => tokio::time::sleep(Duration::from_secs(3600)).await,
    }
}
