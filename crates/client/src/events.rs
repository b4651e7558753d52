//! Events emitted while a job session runs.
//!
//! A session yields any number of [`JobEvent::Progress`] updates followed by
//! exactly one terminal event. Events serialize to tagged JSON so a UI
//! bridge can forward them unchanged.

use clipforge_core::job::{JobHandle, JobOutput};
use clipforge_core::types::{PollAttempt, Timestamp};
use serde::Serialize;

/// Non-terminal progress observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    /// Poll attempt that produced this update.
    pub attempt: PollAttempt,
    /// Latest known percentage; carried over when a poll omits it.
    pub percent: Option<u8>,
    pub message: Option<String>,
    pub current_step: Option<String>,
    pub total_parts: Option<u32>,
    pub completed_parts: Option<u32>,
    pub observed_at: Timestamp,
}

/// Why a job ended without output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// The job itself reached the `failed` state.
    Job { message: String },
    /// The backend refused the submission or status query.
    Rejected { code: u16, message: String },
    /// The one-shot submission could not reach the backend.
    Unreachable { cause: String },
    /// The request was refused locally before reaching the backend.
    Invalid { message: String },
    /// The job reported `completed` without any output reference.
    MissingOutput,
}

impl FailureReason {
    pub fn message(&self) -> String {
        match self {
            Self::Job { message } | Self::Rejected { message, .. } | Self::Invalid { message } => {
                message.clone()
            }
            Self::Unreachable { cause } => format!("backend unreachable: {cause}"),
            Self::MissingOutput => "job completed without output".to_string(),
        }
    }
}

/// One item of a session's event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Progress(ProgressUpdate),
    Completed(JobOutput),
    Failed(FailureReason),
    /// Attempt budget exhausted; the job may still finish server-side.
    TimedOut {
        handle: JobHandle,
        attempts: PollAttempt,
    },
    Cancelled,
}

/// User-facing summary of a terminal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success,
    Failure(String),
    /// "Check back later": the outcome is unknown, not failed.
    TryLater,
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }

    /// Map a terminal event to the notification it warrants.
    ///
    /// Progress and cancellation produce no notification.
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Self::Completed(_) => Some(Notice::Success),
            Self::Failed(reason) => Some(Notice::Failure(reason.message())),
            Self::TimedOut { .. } => Some(Notice::TryLater),
            Self::Progress(_) | Self::Cancelled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use clipforge_core::job::MediaOutputs;

    use super::*;

    fn completed() -> JobEvent {
        JobEvent::Completed(JobOutput::Media(
            MediaOutputs::new(vec!["https://x/v.mp4".into()], None).unwrap(),
        ))
    }

    #[test]
    fn terminal_notices_are_distinct() {
        let timed_out = JobEvent::TimedOut {
            handle: JobHandle::new("t-1").unwrap(),
            attempts: 3,
        };
        let failed = JobEvent::Failed(FailureReason::Job {
            message: "render crashed".into(),
        });

        assert_eq!(completed().notice(), Some(Notice::Success));
        assert_eq!(failed.notice(), Some(Notice::Failure("render crashed".into())));
        assert_eq!(timed_out.notice(), Some(Notice::TryLater));
        assert_eq!(JobEvent::Cancelled.notice(), None);
    }

    #[test]
    fn only_progress_is_non_terminal() {
        let progress = JobEvent::Progress(ProgressUpdate {
            attempt: 1,
            percent: Some(10),
            message: None,
            current_step: None,
            total_parts: None,
            completed_parts: None,
            observed_at: chrono::Utc::now(),
        });
        assert!(!progress.is_terminal());
        assert!(completed().is_terminal());
        assert!(JobEvent::Cancelled.is_terminal());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(completed()).unwrap();
        assert_eq!(json["type"], "completed");
        assert_eq!(json["kind"], "media");

        let json = serde_json::to_value(JobEvent::Failed(FailureReason::MissingOutput)).unwrap();
        assert_eq!(json["type"], "failed");
        assert_eq!(json["reason"], "missing_output");
    }

    #[test]
    fn unreachable_cause_does_not_collide_with_reason_tag() {
        let event = JobEvent::Failed(FailureReason::Unreachable {
            cause: "connection failed: refused".into(),
        });
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "failed");
        assert_eq!(json["reason"], "unreachable");
        assert_eq!(json["cause"], "connection failed: refused");
        assert_eq!(json.as_object().unwrap().len(), 3);
    }
}
