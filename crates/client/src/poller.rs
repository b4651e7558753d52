//! Status polling for asynchronous jobs.
//!
//! A [`ProgressPoller`] owns one [`JobHandle`] and queries
//! `GET /api/progress/{task_id}` until the job reaches a terminal state,
//! the attempt budget runs out, or its [`CancellationToken`] fires.
//!
//! Polls are strictly sequential. The only suspension point is the fixed
//! interval between the end of one poll and the start of the next, raced
//! against cancellation the same way the reconnect loop races its backoff
//! sleep.

use std::sync::Arc;
use std::time::Duration;

use clipforge_core::config::ClientConfig;
use clipforge_core::error::CoreError;
use clipforge_core::job::{JobHandle, JobState};
use clipforge_core::types::PollAttempt;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::events::{FailureReason, JobEvent, ProgressUpdate};
use crate::http::{ApiRequest, ClientError, HttpTransport, Outcome};
use crate::messages::{decode, ProgressResponse};

/// Tunable parameters for one tracking run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Fixed delay between the end of one poll and the start of the next.
    pub interval: Duration,
    /// Hard ceiling on the number of polls.
    pub max_attempts: u32,
    /// Network timeout for a single poll; must be below `interval`.
    pub request_timeout: Duration,
}

impl PollPolicy {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_attempts: config.max_poll_attempts,
            request_timeout: config.request_timeout(),
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.interval.is_zero() {
            return Err(CoreError::Config("poll interval must be positive".into()));
        }
        if self.max_attempts == 0 {
            return Err(CoreError::Config("max attempts must be at least 1".into()));
        }
        if self.request_timeout.is_zero() || self.request_timeout >= self.interval {
            return Err(CoreError::Config(
                "poll request timeout must be positive and below the interval".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

/// Lifecycle of a poller. Every state except `Idle` and `Polling` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl PollerState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Idle | Self::Polling)
    }
}

/// Tracks a single job handle to a terminal event.
///
/// Not reusable: once a terminal event has been produced,
/// [`next_event`](Self::next_event) returns `None` forever. Track a new
/// handle with a new poller.
pub struct ProgressPoller {
    transport: Arc<dyn HttpTransport>,
    handle: JobHandle,
    policy: PollPolicy,
    cancel: CancellationToken,
    state: PollerState,
    attempts: PollAttempt,
    last_percent: Option<u8>,
}

impl ProgressPoller {
    /// Create a poller for `handle`. Fails if `policy` does not validate.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        handle: JobHandle,
        policy: PollPolicy,
        cancel: CancellationToken,
    ) -> Result<Self, CoreError> {
        policy.validate()?;
        Ok(Self {
            transport,
            handle,
            policy,
            cancel,
            state: PollerState::Idle,
            attempts: 0,
            last_percent: None,
        })
    }

    /// Start tracking `handle` and return the lazy event stream.
    pub fn track(
        transport: Arc<dyn HttpTransport>,
        handle: JobHandle,
        policy: PollPolicy,
        cancel: CancellationToken,
    ) -> Result<impl Stream<Item = JobEvent> + Send + 'static, CoreError> {
        Ok(Self::new(transport, handle, policy, cancel)?.into_stream())
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Number of polls issued so far.
    pub fn attempts(&self) -> PollAttempt {
        self.attempts
    }

    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    /// Convert into a stream that ends right after the terminal event.
    pub fn into_stream(self) -> impl Stream<Item = JobEvent> + Send + 'static {
        futures::stream::unfold(self, |mut poller| async move {
            poller.next_event().await.map(|event| (event, poller))
        })
    }

    /// Drive polling until the next event worth reporting.
    ///
    /// Transient transport failures are absorbed here (they count against
    /// the attempt budget but emit nothing). Returns `None` once a terminal
    /// event has been produced.
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        if self.state.is_terminal() {
            return None;
        }

        loop {
            if self.state == PollerState::Polling {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Some(self.cancelled()),
                    _ = tokio::time::sleep(self.policy.interval) => {}
                }
            }
            if self.cancel.is_cancelled() {
                return Some(self.cancelled());
            }

            self.state = PollerState::Polling;
            self.attempts += 1;
            let attempt = self.attempts;

            let outcome = self.poll_once().await;

            // An in-flight poll is never aborted, but its result is dropped
            // once cancellation has been requested.
            if self.cancel.is_cancelled() {
                return Some(self.cancelled());
            }

            match outcome {
                Ok(response) => return Some(self.on_response(attempt, &response)),
                Err(ClientError::Transport(e)) => {
                    tracing::warn!(
                        task_id = %self.handle,
                        attempt,
                        error = %e,
                        "Progress poll failed, will retry",
                    );
                    if self.budget_exhausted() {
                        return Some(self.timed_out());
                    }
                }
                Err(ClientError::App { code, message }) => {
                    return Some(self.failed(FailureReason::Rejected { code, message }));
                }
                Err(ClientError::Validation(e)) => {
                    return Some(self.failed(FailureReason::Invalid {
                        message: e.to_string(),
                    }));
                }
            }
        }
    }

    // ---- private helpers ----

    async fn poll_once(&self) -> Outcome<ProgressResponse> {
        let path = format!("/api/progress/{}", self.handle);
        let request = ApiRequest::get(path, self.policy.request_timeout)?;
        let payload = self.transport.call(request).await?;
        Ok(decode(payload)?)
    }

    /// Interpret a successful poll. A non-terminal status on the last
    /// allowed attempt becomes `TimedOut` instead of a progress report.
    fn on_response(&mut self, attempt: PollAttempt, response: &ProgressResponse) -> JobEvent {
        let status = response.status();

        match status.state {
            JobState::Completed => match response.output() {
                Some(output) => {
                    self.state = PollerState::Completed;
                    tracing::info!(task_id = %self.handle, attempt, "Job completed");
                    JobEvent::Completed(output)
                }
                None => self.failed(FailureReason::MissingOutput),
            },
            JobState::Failed => self.failed(FailureReason::Job {
                message: response.failure_message(),
            }),
            JobState::Pending | JobState::Running => {
                if let Some(percent) = status.progress {
                    self.last_percent = Some(percent);
                }
                if self.budget_exhausted() {
                    return self.timed_out();
                }

                tracing::debug!(
                    task_id = %self.handle,
                    attempt,
                    percent = ?self.last_percent,
                    "Job in progress",
                );
                JobEvent::Progress(ProgressUpdate {
                    attempt,
                    percent: self.last_percent,
                    message: status.message,
                    current_step: status.current_step,
                    total_parts: status.total_parts,
                    completed_parts: status.completed_parts,
                    observed_at: chrono::Utc::now(),
                })
            }
        }
    }

    fn budget_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }

    fn failed(&mut self, reason: FailureReason) -> JobEvent {
        self.state = PollerState::Failed;
        tracing::info!(
            task_id = %self.handle,
            attempt = self.attempts,
            reason = %reason.message(),
            "Job failed",
        );
        JobEvent::Failed(reason)
    }

    fn timed_out(&mut self) -> JobEvent {
        self.state = PollerState::TimedOut;
        tracing::info!(
            task_id = %self.handle,
            attempts = self.attempts,
            "Poll budget exhausted, job outcome unknown",
        );
        JobEvent::TimedOut {
            handle: self.handle.clone(),
            attempts: self.attempts,
        }
    }

    fn cancelled(&mut self) -> JobEvent {
        self.state = PollerState::Cancelled;
        tracing::info!(task_id = %self.handle, attempts = self.attempts, "Tracking cancelled");
        JobEvent::Cancelled
    }
}
