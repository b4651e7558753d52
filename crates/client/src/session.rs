//! One cancellable unit of work: submit a job, then track it.
//!
//! [`JobSession::start`] returns a lazily-driven event stream. Nothing runs
//! until the caller polls it, and nothing is spawned: the submit call and
//! every status poll happen on the consumer's task, strictly one after the
//! other.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use clipforge_core::config::ClientConfig;
use clipforge_core::error::CoreError;
use clipforge_core::job::{JobRequest, JobResult};
use futures::stream::{BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::events::{FailureReason, JobEvent};
use crate::http::{ClientError, HttpTransport};
use crate::poller::{PollPolicy, ProgressPoller};
use crate::submit::{JobSubmitter, SubmitOutcome};

const PHASE_IDLE: u8 = 0;
const PHASE_RUNNING: u8 = 1;
const PHASE_FINISHED: u8 = 2;

/// Coarse session lifecycle, for callers that gate resubmission on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Created, not yet started.
    Idle,
    /// Started; no terminal event produced yet.
    Running,
    /// A terminal event has been produced.
    Finished,
}

/// Errors from session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// `start` was already called on this session.
    #[error("session {0} has already been started")]
    AlreadyStarted(Uuid),
}

/// Submits one job and relays its events until a terminal one.
///
/// Each session owns its cancellation token and phase flag; independent
/// sessions share nothing but the (immutable) transport.
pub struct JobSession {
    id: Uuid,
    transport: Arc<dyn HttpTransport>,
    submitter: JobSubmitter,
    policy: PollPolicy,
    cancel: CancellationToken,
    phase: Arc<AtomicU8>,
}

impl JobSession {
    /// Create a session for `config`.
    ///
    /// The config is validated here, so a value deserialized from a file
    /// gets the same checks as one loaded with `from_env`.
    pub fn new(transport: Arc<dyn HttpTransport>, config: &ClientConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let policy = PollPolicy::from_config(config);
        policy.validate()?;

        Ok(Self {
            id: Uuid::new_v4(),
            submitter: JobSubmitter::new(Arc::clone(&transport), config),
            transport,
            policy,
            cancel: CancellationToken::new(),
            phase: Arc::new(AtomicU8::new(PHASE_IDLE)),
        })
    }

    /// Replace the submitter, e.g. to post to a different `generate-<kind>`
    /// endpoint.
    pub fn with_submitter(mut self, submitter: JobSubmitter) -> Self {
        self.submitter = submitter;
        self
    }

    /// Use `token` for cancellation, e.g. a child of an application-wide
    /// shutdown token.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Correlation id used in log fields.
    pub fn session_id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        match self.phase.load(Ordering::Acquire) {
            PHASE_IDLE => SessionPhase::Idle,
            PHASE_RUNNING => SessionPhase::Running,
            _ => SessionPhase::Finished,
        }
    }

    /// Start the session and return its event stream.
    ///
    /// The stream yields zero or more `Progress` events and ends after
    /// exactly one terminal event. A session can be started only once.
    pub fn start(&self, request: JobRequest) -> Result<BoxStream<'static, JobEvent>, SessionError> {
        self.phase
            .compare_exchange(PHASE_IDLE, PHASE_RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::AlreadyStarted(self.id))?;

        tracing::info!(
            session_id = %self.id,
            product = %request.product_name,
            kind = %request.kind,
            "Starting job session",
        );

        let driver = SessionDriver {
            id: self.id,
            stage: Stage::Submit(request),
            transport: Arc::clone(&self.transport),
            submitter: self.submitter.clone(),
            policy: self.policy,
            cancel: self.cancel.clone(),
            phase: Arc::clone(&self.phase),
        };

        Ok(futures::stream::unfold(driver, |mut driver| async move {
            driver.next_event().await.map(|event| (event, driver))
        })
        .boxed())
    }

    /// Request cancellation.
    ///
    /// Takes effect before the next network call; an in-flight call's
    /// result is discarded. No-op once the session has finished.
    pub fn cancel(&self) {
        if self.phase() == SessionPhase::Finished {
            tracing::debug!(session_id = %self.id, "Cancel ignored, session already finished");
            return;
        }
        tracing::info!(session_id = %self.id, "Cancelling job session");
        self.cancel.cancel();
    }
}

/// Where the driver is in the submit -> track sequence.
enum Stage {
    Submit(JobRequest),
    Track(Box<ProgressPoller>),
    Done,
}

/// State carried by the session's event stream.
struct SessionDriver {
    id: Uuid,
    stage: Stage,
    transport: Arc<dyn HttpTransport>,
    submitter: JobSubmitter,
    policy: PollPolicy,
    cancel: CancellationToken,
    phase: Arc<AtomicU8>,
}

impl SessionDriver {
    async fn next_event(&mut self) -> Option<JobEvent> {
        loop {
            match std::mem::replace(&mut self.stage, Stage::Done) {
                Stage::Done => return None,
                Stage::Submit(request) => {
                    if let Some(event) = self.submit(request).await {
                        return Some(self.finish(event));
                    }
                }
                Stage::Track(mut poller) => {
                    let event = poller.next_event().await?;
                    if event.is_terminal() {
                        return Some(self.finish(event));
                    }
                    self.stage = Stage::Track(poller);
                    return Some(event);
                }
            }
        }
    }

    /// Submit the job. Returns a terminal event, or `None` after moving
    /// on to tracking.
    async fn submit(&mut self, request: JobRequest) -> Option<JobEvent> {
        if self.cancel.is_cancelled() {
            return Some(JobEvent::Cancelled);
        }

        let outcome = self.submitter.submit(&request).await;

        if self.cancel.is_cancelled() {
            if let Ok(SubmitOutcome::Accepted(handle)) = &outcome {
                tracing::info!(
                    session_id = %self.id,
                    task_id = %handle,
                    "Job accepted after cancellation, not tracking it",
                );
            }
            return Some(JobEvent::Cancelled);
        }

        match outcome {
            Ok(SubmitOutcome::Immediate(JobResult::Completed(output))) => {
                Some(JobEvent::Completed(output))
            }
            Ok(SubmitOutcome::Immediate(JobResult::Failed { message })) => {
                Some(JobEvent::Failed(FailureReason::Job { message }))
            }
            Ok(SubmitOutcome::Accepted(handle)) => {
                tracing::info!(session_id = %self.id, task_id = %handle, "Tracking job");
                match ProgressPoller::new(
                    Arc::clone(&self.transport),
                    handle,
                    self.policy,
                    self.cancel.clone(),
                ) {
                    Ok(poller) => {
                        self.stage = Stage::Track(Box::new(poller));
                        None
                    }
                    Err(e) => Some(JobEvent::Failed(FailureReason::Invalid {
                        message: e.to_string(),
                    })),
                }
            }
            Err(ClientError::App { code, message }) => {
                Some(JobEvent::Failed(FailureReason::Rejected { code, message }))
            }
            Err(ClientError::Transport(e)) => {
                tracing::warn!(session_id = %self.id, error = %e, "Job submission failed");
                Some(JobEvent::Failed(FailureReason::Unreachable {
                    cause: e.to_string(),
                }))
            }
            Err(ClientError::Validation(e)) => Some(JobEvent::Failed(FailureReason::Invalid {
                message: e.to_string(),
            })),
        }
    }

    fn finish(&mut self, event: JobEvent) -> JobEvent {
        self.stage = Stage::Done;
        self.phase.store(PHASE_FINISHED, Ordering::Release);
        tracing::info!(session_id = %self.id, outcome = event_name(&event), "Job session finished");
        event
    }
}

fn event_name(event: &JobEvent) -> &'static str {
    match event {
        JobEvent::Progress(_) => "progress",
        JobEvent::Completed(_) => "completed",
        JobEvent::Failed(_) => "failed",
        JobEvent::TimedOut { .. } => "timed_out",
        JobEvent::Cancelled => "cancelled",
    }
}
