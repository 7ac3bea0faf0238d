//! Wait handlers for asynchronous STACKIT operations
//!
//! Instances and clusters are created in the background. A wait handler polls
//! the object until it reaches a final state, gives up after the configured
//! timeout and stops early when Terraform cancels the request.

use super::error::ApiError;
use std::future::Future;
use std::time::Duration;
use tfplug::Context;
use thiserror::Error;
use tokio::time::Instant;

/// Outcome of a single poll
#[derive(Debug, Clone, PartialEq)]
pub enum WaitState<T> {
    /// Final, successful state
    Done(T),
    /// Still in progress, carries the observed state
    Pending(String),
    /// Final, failed state
    Failed(String),
}

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("timed out after {after:?} waiting for {what} (last state: {last_state})")]
    Timeout {
        what: String,
        after: Duration,
        last_state: String,
    },

    #[error("cancelled while waiting for {0}")]
    Cancelled(String),

    #[error("{what} reached state {state}")]
    Failed { what: String, state: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub timeout: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl WaitConfig {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            initial_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(30),
        }
    }

    pub fn with_interval(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_interval = initial;
        self.max_interval = max;
        self
    }
}

/// Polls until `poll` reports a final state
pub async fn wait_for<T, F, Fut>(
    ctx: &Context,
    config: &WaitConfig,
    what: &str,
    mut poll: F,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<WaitState<T>, ApiError>>,
{
    let deadline = Instant::now() + config.timeout;
    let mut interval = config.initial_interval;
    let mut last_state = String::new();

    loop {
        if ctx.is_cancelled() {
            return Err(WaitError::Cancelled(what.to_string()));
        }

        match poll().await? {
            WaitState::Done(value) => return Ok(value),
            WaitState::Failed(state) => {
                return Err(WaitError::Failed {
                    what: what.to_string(),
                    state,
                })
            }
            WaitState::Pending(state) => {
                tracing::debug!("waiting for {}: state {}", what, state);
                last_state = state;
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WaitError::Timeout {
                what: what.to_string(),
                after: config.timeout,
                last_state,
            });
        }

        tokio::select! {
            _ = tokio::time::sleep(interval.min(deadline - now)) => {}
            _ = ctx.cancelled() => return Err(WaitError::Cancelled(what.to_string())),
        }

        interval = interval.mul_f64(1.5).min(config.max_interval);
    }
}

/// Maps a read used while waiting for deletion: not found means done
pub fn deleted<T>(
    result: Result<T, ApiError>,
    state: impl FnOnce(&T) -> WaitState<()>,
) -> Result<WaitState<()>, ApiError> {
    match result {
        Ok(object) => Ok(state(&object)),
        Err(e) if e.is_not_found() => Ok(WaitState::Done(())),
        Err(e) => Err(e),
    }
}
