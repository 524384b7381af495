//! Waiting for the engine to actually reach a state
//!
//! A successful `play()` only means the engine accepted the request; live
//! sources may take a while to preroll. Dependent pipelines should not be
//! started until their producers report `PLAYING`, so the sequencer polls
//! through [`wait_for_state`] with a bounded timeout instead of sleeping
//! blindly.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::control::{EngineState, TargetState};
use crate::error::{Error, Result};
use crate::handle::PipelineHandle;
use crate::lifecycle::Operation;

/// Bounds for a readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessOptions {
    /// Give up after this long
    pub timeout: Duration,
    /// Delay between polls
    pub poll_interval: Duration,
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Poll `handle` until the engine reports `target`
///
/// Engine errors end the wait immediately; an elapsed bound surfaces as
/// [`Error::Timeout`] for the operation that was supposed to reach `target`.
pub async fn wait_for_state(
    handle: &PipelineHandle,
    target: TargetState,
    options: &ReadinessOptions,
) -> Result<EngineState> {
    // A bound too large to represent never expires
    let deadline = Instant::now().checked_add(options.timeout);
    let operation = match target {
        TargetState::Playing => Operation::Play,
        TargetState::Stopped => Operation::Stop,
    };

    loop {
        let state = handle.query_state().await?;
        if state.satisfies(target) {
            debug!(pipeline = %handle.name(), %state, "Pipeline reached target state");
            return Ok(state);
        }

        if deadline.map_or(false, |deadline| Instant::now() >= deadline) {
            return Err(Error::Timeout {
                name: handle.name().to_string(),
                operation,
                timeout_ms: options.timeout.as_millis() as u64,
            });
        }

        debug!(pipeline = %handle.name(), %state, %target, "Waiting for pipeline state");
        sleep(options.poll_interval).await;
    }
}

/// Extra fixed margin after a phase, skipped when zero
pub async fn settle(label: &str, duration: Duration) {
    if duration.is_zero() {
        return;
    }
    info!(phase = label, wait_ms = duration.as_millis() as u64, "Letting pipelines settle");
    sleep(duration).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::HandleOptions;
    use crate::memory::InMemoryEngine;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_wait_returns_once_playing() {
        let engine = Arc::new(InMemoryEngine::new());
        let mut cam = PipelineHandle::create(engine.clone(), "cam", "d", HandleOptions::default())
            .await
            .unwrap();
        cam.play().await.unwrap();

        let state = wait_for_state(&cam, TargetState::Playing, &ReadinessOptions::default())
            .await
            .unwrap();
        assert_eq!(state, EngineState::Playing);
        assert_eq!(engine.query_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_timeout_waits_without_bound() {
        let engine = Arc::new(InMemoryEngine::new());
        let mut cam = PipelineHandle::create(engine.clone(), "cam", "d", HandleOptions::default())
            .await
            .unwrap();
        cam.play().await.unwrap();

        let options = ReadinessOptions {
            timeout: Duration::from_millis(u64::MAX),
            poll_interval: Duration::from_millis(100),
        };
        let state = wait_for_state(&cam, TargetState::Playing, &options)
            .await
            .unwrap();
        assert_eq!(state, EngineState::Playing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_when_stuck() {
        let engine = Arc::new(InMemoryEngine::new());
        let mut cam = PipelineHandle::create(engine.clone(), "cam", "d", HandleOptions::default())
            .await
            .unwrap();
        cam.play().await.unwrap();
        engine.hold_state("cam", EngineState::Paused);

        let options = ReadinessOptions {
            timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
        };
        let err = wait_for_state(&cam, TargetState::Playing, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { timeout_ms: 500, operation: Operation::Play, .. }));
        assert!(engine.query_count() >= 5);
    }
}
