//! Run driver: submit a user message and poll the resulting run.
//!
//! ```text
//! NotStarted ──create──▶ Queued ──▶ InProgress ──▶ Completed
//!                           │            │
//!                           └────────────┴───────▶ Failed
//! ```
//!
//! Transitions come only from the status the service reports. Polling is
//! bounded by [`PollPolicy`]; a run that neither completes nor fails inside the
//! budget ends the turn with [`ChatError::RunTimedOut`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::binding::{ResyncPolicy, resync_assistant};
use super::thread::ensure_thread;
use crate::assistant::{AssistantApi, CreateRun, Run, RunStatus};
use crate::config::PollingConfig;
use crate::error::{ChatError, Result};
use crate::session::Session;

/// Local view of a run's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    NotStarted,
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl From<RunStatus> for RunPhase {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Queued => Self::Queued,
            RunStatus::Completed => Self::Completed,
            s if s.is_failure() => Self::Failed,
            // in_progress, cancelling and anything unrecognised keep polling
            _ => Self::InProgress,
        }
    }
}

/// Bounds on the status polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait between two status checks.
    pub interval: Duration,
    /// Maximum number of status checks after the run is created.
    pub max_attempts: u32,
    /// Maximum wall time spent polling.
    pub max_elapsed: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 200,
            max_elapsed: Duration::from_secs(600),
        }
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(cfg: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_millis(cfg.interval_ms),
            max_attempts: cfg.max_attempts,
            max_elapsed: Duration::from_secs(cfg.max_elapsed_secs),
        }
    }
}

/// Receives progress notifications from the driver.
pub trait RunObserver: Send {
    /// The run was created on the service.
    fn run_created(&mut self, _run: &Run) {}

    /// First observation of a pending run. Called at most once per run.
    fn thinking(&mut self, _run: &Run) {}

    /// A status check returned.
    fn polled(&mut self, _run: &Run, _attempt: u32) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Drives one user turn on the remote service up to a finished run.
#[derive(Clone)]
pub struct RunDriver {
    api: Arc<dyn AssistantApi>,
    policy: PollPolicy,
    resync: ResyncPolicy,
}

impl std::fmt::Debug for RunDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunDriver")
            .field("policy", &self.policy)
            .field("resync", &self.resync)
            .finish()
    }
}

impl RunDriver {
    #[must_use]
    pub fn new(api: Arc<dyn AssistantApi>, policy: PollPolicy, resync: ResyncPolicy) -> Self {
        Self {
            api,
            policy,
            resync,
        }
    }

    /// Post `text` to the session's thread, start a run and wait for it.
    ///
    /// Returns the completed run. Remote errors abort the turn as they occur.
    #[tracing::instrument(
        skip(self, session, text, observer),
        fields(session_id = %session.id(), run_id = tracing::field::Empty)
    )]
    pub async fn submit(
        &self,
        session: &Session,
        text: &str,
        observer: &mut dyn RunObserver,
    ) -> Result<Run> {
        let thread_id = ensure_thread(self.api.as_ref(), session).await?;

        let message = self.api.create_message(&thread_id, text).await?;
        tracing::debug!(thread_id = %thread_id, message_id = %message.id, "User message appended");

        if self.resync == ResyncPolicy::BeforeEveryRun {
            resync_assistant(self.api.as_ref(), session).await?;
        }

        let request = CreateRun::for_profile(&session.profile());
        let run = self.api.create_run(&thread_id, &request).await?;
        tracing::Span::current().record("run_id", run.id.as_str());
        tracing::info!(
            name: "run.created",
            thread_id = %thread_id,
            status = %run.status,
            "Run created"
        );
        session.set_run(run.clone());
        observer.run_created(&run);

        self.poll(session, &thread_id, run, observer).await
    }

    /// Poll `run` until it reaches a terminal status or the budget runs out.
    pub async fn poll(
        &self,
        session: &Session,
        thread_id: &str,
        mut run: Run,
        observer: &mut dyn RunObserver,
    ) -> Result<Run> {
        let started = Instant::now();
        let mut attempts = 0u32;
        let mut announced = false;

        loop {
            match RunPhase::from(run.status) {
                RunPhase::Completed => {
                    tracing::info!(
                        name: "run.completed",
                        run_id = %run.id,
                        attempts,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Run completed"
                    );
                    return Ok(run);
                }
                RunPhase::Failed => {
                    let reason = run.failure_reason();
                    tracing::error!(
                        name: "run.failed",
                        run_id = %run.id,
                        status = %run.status,
                        reason = %reason,
                        "Run failed"
                    );
                    return Err(ChatError::RunFailed {
                        run_id: run.id,
                        status: run.status,
                        reason,
                    });
                }
                RunPhase::Queued | RunPhase::InProgress | RunPhase::NotStarted => {
                    if !announced {
                        observer.thinking(&run);
                        announced = true;
                    }
                }
            }

            let elapsed = started.elapsed();
            if attempts >= self.policy.max_attempts || elapsed >= self.policy.max_elapsed {
                tracing::error!(
                    name: "run.timed_out",
                    run_id = %run.id,
                    status = %run.status,
                    attempts,
                    "Run did not finish within the poll budget"
                );
                return Err(ChatError::RunTimedOut {
                    run_id: run.id,
                    status: run.status,
                    attempts,
                    elapsed_secs: elapsed.as_secs(),
                });
            }

            tokio::time::sleep(self.policy.interval).await;
            run = self.api.retrieve_run(thread_id, &run.id).await?;
            attempts += 1;
            tracing::trace!(run_id = %run.id, status = %run.status, attempt = attempts, "Run polled");
            session.set_run(run.clone());
            observer.polled(&run, attempts);
        }
    }
}
