//! Job creation.
//!
//! The backend decides whether a job finishes inline (short text-only
//! artifacts) or is queued for asynchronous processing; [`JobSubmitter`]
//! reports whichever shape came back.

use std::sync::Arc;
use std::time::Duration;

use clipforge_core::config::ClientConfig;
use clipforge_core::error::CoreError;
use clipforge_core::job::{GenerationKind, JobHandle, JobRequest, JobResult};

use crate::http::{ApiRequest, HttpTransport, Outcome, TransportError};
use crate::messages::{decode, SubmitResponse};

/// What the backend did with a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Finished synchronously.
    Immediate(JobResult),
    /// Queued; track it with the returned handle.
    Accepted(JobHandle),
}

/// Sends job creation requests.
///
/// Makes exactly one request per [`submit`](Self::submit) call and adds no
/// idempotency key; preventing duplicate submissions is up to the caller.
#[derive(Clone)]
pub struct JobSubmitter {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    timeout: Duration,
}

impl JobSubmitter {
    /// Create a submitter posting to `/api/generate-video`.
    pub fn new(transport: Arc<dyn HttpTransport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            endpoint: generate_path(GenerationKind::Video.as_str()),
            timeout: config.submit_timeout(),
        }
    }

    /// Post to `/api/generate-<kind>` instead.
    pub fn with_kind(mut self, kind: &str) -> Self {
        self.endpoint = generate_path(kind);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Submit one job.
    pub async fn submit(&self, request: &JobRequest) -> Outcome<SubmitOutcome> {
        let body = serde_json::to_value(request)
            .map_err(|e| CoreError::Validation(format!("unserializable job request: {e}")))?;
        let api_request = ApiRequest::post_json(self.endpoint.clone(), body, self.timeout)?;

        let payload = self.transport.call(api_request).await?;
        let response: SubmitResponse = decode(payload)?;
        let outcome = interpret_submit(response)?;

        match &outcome {
            SubmitOutcome::Accepted(handle) => {
                tracing::info!(task_id = %handle, endpoint = %self.endpoint, "Job accepted");
            }
            SubmitOutcome::Immediate(_) => {
                tracing::info!(endpoint = %self.endpoint, "Job finished synchronously");
            }
        }
        Ok(outcome)
    }
}

fn generate_path(kind: &str) -> String {
    format!("/api/generate-{kind}")
}

/// Decide between an inline result and an asynchronous handle.
fn interpret_submit(response: SubmitResponse) -> Result<SubmitOutcome, TransportError> {
    if response.is_async() {
        let task_id = response.task_id.unwrap_or_default();
        let handle = JobHandle::new(task_id)
            .map_err(|e| TransportError::MalformedBody(e.to_string()))?;
        return Ok(SubmitOutcome::Accepted(handle));
    }

    let result = match response.output() {
        Some(output) => JobResult::Completed(output),
        None => JobResult::Failed {
            message: response
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "backend returned no result".to_string()),
        },
    };
    Ok(SubmitOutcome::Immediate(result))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clipforge_core::job::JobOutput;
    use serde_json::json;

    use super::*;

    fn interpret(value: serde_json::Value) -> Result<SubmitOutcome, TransportError> {
        interpret_submit(decode(value).unwrap())
    }

    #[test]
    fn task_id_means_accepted() {
        let outcome = interpret(json!({"success": true, "type": "video", "task_id": "abc"})).unwrap();
        assert_eq!(outcome, SubmitOutcome::Accepted(JobHandle::new("abc").unwrap()));
    }

    #[test]
    fn script_content_is_immediate() {
        let outcome =
            interpret(json!({"success": true, "type": "script", "script_content": "镜头1"}))
                .unwrap();
        assert_matches!(
            outcome,
            SubmitOutcome::Immediate(JobResult::Completed(JobOutput::Script { content })) if content == "镜头1"
        );
    }

    #[test]
    fn synchronous_video_is_immediate_media() {
        let outcome = interpret(json!({"success": true, "video_url": "https://x/v.mp4"})).unwrap();
        assert_matches!(
            outcome,
            SubmitOutcome::Immediate(JobResult::Completed(JobOutput::Media(m))) if m.primary() == "https://x/v.mp4"
        );
    }

    #[test]
    fn no_payload_is_immediate_failure_with_server_message() {
        let outcome = interpret(json!({"success": true, "message": "生成失败"})).unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Immediate(JobResult::Failed {
                message: "生成失败".into()
            })
        );
    }

    #[test]
    fn blank_task_id_is_malformed() {
        assert_matches!(
            interpret(json!({"success": true, "type": "video", "task_id": ""})),
            Err(TransportError::MalformedBody(_))
        );
    }

    #[test]
    fn endpoint_follows_kind() {
        let transport: Arc<dyn HttpTransport> =
            Arc::new(crate::http::ReqwestTransport::new(&ClientConfig::default()));
        let submitter = JobSubmitter::new(transport, &ClientConfig::default());
        assert_eq!(submitter.endpoint(), "/api/generate-video");
        assert_eq!(submitter.with_kind("script").endpoint(), "/api/generate-script");
    }
}
