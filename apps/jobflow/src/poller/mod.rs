//! Drives a submitted backend trace to a terminal state.
//!
//! One state machine serves both backends: it is parameterized by a
//! `StatusSource`, an interval and an attempt budget. Checks are strictly
//! sequential; the next check is scheduled only after the previous one has
//! resolved and the interval has elapsed. A `CancellationToken` is observed
//! before every scheduled continuation.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::job::{JobState, JobStatus};
use crate::service_client::ServiceError;

const DEFAULT_INTERVAL: Duration = Duration::from_millis(3000);
const DEFAULT_MAX_ATTEMPTS: u32 = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Delay before the very first check.
    pub initial_delay: Duration,
    pub max_attempts: u32,
}

impl PollSettings {
    /// The first check fires after half an interval.
    pub fn from_interval(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            initial_delay: interval / 2,
            max_attempts,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_interval(DEFAULT_INTERVAL, DEFAULT_MAX_ATTEMPTS)
    }
}

/// Anything that can report the status of a trace.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn check_status(&self, trace_id: &str) -> Result<JobStatus, ServiceError>;
}

/// Receives the latest per-item progress after every check, terminal or not.
pub trait ProgressObserver: Send + Sync {
    /// Called by the submitting side once a trace id is known, before polling starts.
    fn on_submitted(&self, _trace_id: &str) {}

    fn on_progress(&self, trace_id: &str, progress: &BTreeMap<String, String>);
}

/// Observer that discards progress.
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _trace_id: &str, _progress: &BTreeMap<String, String>) {}
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("Job processing failed: {message}. Trace ID: {trace_id}")]
    Failed { trace_id: String, message: String },

    #[error("Job status check timed out after {attempts} attempts. Trace ID: {trace_id}")]
    TimedOut { trace_id: String, attempts: u32 },

    #[error("Error checking job status: {source}. Polling stopped.")]
    Transport {
        trace_id: String,
        #[source]
        source: ServiceError,
    },

    #[error("Polling cancelled. Trace ID: {trace_id}")]
    Cancelled { trace_id: String },
}

/// Outcome of a single status check that did not end in an error.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    /// Job finished; carries the `results` payload (`Null` if the backend sent none).
    Completed(Value),
    /// Job still in flight; carries the attempt count after this check.
    Pending(u32),
}

/// Mutable poller state, owned by the poller instance.
#[derive(Debug, Clone, Default)]
pub struct PollState {
    pub attempts: u32,
    pub last_status: Option<JobState>,
    pub last_progress: BTreeMap<String, String>,
}

pub struct JobPoller {
    settings: PollSettings,
    state: PollState,
}

impl JobPoller {
    pub fn new(settings: PollSettings) -> Self {
        Self {
            settings,
            state: PollState::default(),
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Polls `trace_id` until it completes, fails, times out, errors or is cancelled.
    pub async fn run(
        &mut self,
        trace_id: &str,
        source: &dyn StatusSource,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<Value, PollError> {
        info!(
            "Polling trace {trace_id} every {}ms (max {} attempts)",
            self.settings.interval.as_millis(),
            self.settings.max_attempts
        );
        wait(self.settings.initial_delay, trace_id, cancel).await?;

        loop {
            match self.step(trace_id, source, observer).await? {
                PollStep::Completed(results) => return Ok(results),
                PollStep::Pending(attempts) => {
                    debug!(
                        "Trace {trace_id} still in flight ({attempts}/{})",
                        self.settings.max_attempts
                    );
                    wait(self.settings.interval, trace_id, cancel).await?
                }
            }
        }
    }

    /// Performs exactly one status check and applies it to the poller state.
    pub async fn step(
        &mut self,
        trace_id: &str,
        source: &dyn StatusSource,
        observer: &dyn ProgressObserver,
    ) -> Result<PollStep, PollError> {
        debug!(
            "Polling status for trace {trace_id}, attempt {}",
            self.state.attempts + 1
        );

        // Transport failures leave the attempt counter untouched; the chain simply ends.
        let status = source.check_status(trace_id).await.map_err(|source| {
            warn!("Error polling status for trace {trace_id}: {source}");
            PollError::Transport {
                trace_id: trace_id.to_string(),
                source,
            }
        })?;

        observer.on_progress(trace_id, &status.progress);
        self.state.last_progress = status.progress;
        self.state.last_status = Some(status.status.clone());

        match status.status {
            JobState::Completed => {
                info!("Trace {trace_id} completed");
                self.state.attempts = 0;
                Ok(PollStep::Completed(status.results.unwrap_or(Value::Null)))
            }
            JobState::Failed => {
                let message = status
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "Unknown error".to_string());
                warn!("Trace {trace_id} failed: {message}");
                self.state.attempts = 0;
                Err(PollError::Failed {
                    trace_id: trace_id.to_string(),
                    message,
                })
            }
            JobState::Pending | JobState::Running => self.advance(trace_id),
            JobState::Other(raw) => {
                warn!("Received unexpected status '{raw}' for trace {trace_id}; continuing");
                self.advance(trace_id)
            }
        }
    }

    fn advance(&mut self, trace_id: &str) -> Result<PollStep, PollError> {
        self.state.attempts += 1;
        if self.state.attempts >= self.settings.max_attempts {
            warn!(
                "Max polling attempts ({}) reached for trace {trace_id} (last status {:?}, progress {:?})",
                self.settings.max_attempts,
                self.state.last_status,
                self.state.last_progress
            );
            self.state.attempts = 0;
            return Err(PollError::TimedOut {
                trace_id: trace_id.to_string(),
                attempts: self.settings.max_attempts,
            });
        }
        Ok(PollStep::Pending(self.state.attempts))
    }
}

async fn wait(delay: Duration, trace_id: &str, cancel: &CancellationToken) -> Result<(), PollError> {
    let cancelled = || PollError::Cancelled {
        trace_id: trace_id.to_string(),
    };
    if cancel.is_cancelled() {
        return Err(cancelled());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("Polling for trace {trace_id} cancelled");
            Err(cancelled())
        }
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
