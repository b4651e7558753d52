//! Backend response shapes and their mapping onto the job model.
//!
//! Only field presence matters; every field is optional on the wire and
//! unknown fields are ignored.

use clipforge_core::job::{clamp_progress, JobOutput, JobState, JobStatus, MediaOutputs};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::http::TransportError;

/// Body of `POST /api/generate-<kind>`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitResponse {
    pub message: Option<String>,
    /// `"video"` or `"script"`: how the backend chose to handle the job.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub task_id: Option<String>,
    pub script_content: Option<String>,
    pub video_url: Option<String>,
    pub video_urls: Option<Vec<String>>,
    pub merged_video_url: Option<String>,
}

/// Body of `GET /api/progress/{task_id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressResponse {
    pub status: Option<String>,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub current_step: Option<String>,
    pub total_parts: Option<u32>,
    pub completed_parts: Option<u32>,
    pub video_url: Option<String>,
    pub video_urls: Option<Vec<String>>,
    pub merged_video_url: Option<String>,
    pub script_content: Option<String>,
    pub error_message: Option<String>,
}

/// Body of `POST /api/upload-image`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadResponse {
    pub image_url: Option<String>,
    pub message: Option<String>,
}

/// Deserialize an already-accepted payload into its typed shape.
pub fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, TransportError> {
    serde_json::from_value(payload).map_err(|e| TransportError::MalformedBody(e.to_string()))
}

impl ProgressResponse {
    /// Status snapshot carried by this response.
    ///
    /// A missing status reads as `Pending`; an unrecognised one reads as
    /// `Running` so that polling continues.
    pub fn status(&self) -> JobStatus {
        let state = match self.status.as_deref() {
            None => JobState::Pending,
            Some(raw) => JobState::from_wire(raw).unwrap_or_else(|| {
                tracing::warn!(status = %raw, "Unknown job status, treating as running");
                JobState::Running
            }),
        };

        JobStatus {
            state,
            progress: self.progress.map(|p| clamp_progress(p.round() as i64)),
            message: self.message.clone(),
            current_step: self.current_step.clone(),
            total_parts: self.total_parts,
            completed_parts: self.completed_parts,
        }
    }

    /// Output of a completed job, if the response carries any.
    pub fn output(&self) -> Option<JobOutput> {
        collect_output(
            self.video_urls.clone(),
            self.video_url.clone(),
            self.merged_video_url.clone(),
            self.script_content.clone(),
        )
    }

    /// Best available explanation for a failed job.
    pub fn failure_message(&self) -> String {
        first_non_empty(&[&self.error_message, &self.message])
            .unwrap_or_else(|| "generation failed".to_string())
    }
}

impl SubmitResponse {
    /// Whether the backend queued the job for asynchronous processing.
    pub fn is_async(&self) -> bool {
        self.task_id.is_some() && self.kind.as_deref() != Some("script")
    }

    /// Output of a job finished synchronously, if any.
    pub fn output(&self) -> Option<JobOutput> {
        collect_output(
            self.video_urls.clone(),
            self.video_url.clone(),
            self.merged_video_url.clone(),
            self.script_content.clone(),
        )
    }
}

/// Assemble a [`JobOutput`] from the optional output fields.
///
/// Media references take precedence over script text. The single
/// `video_url` field is only used when the list is absent or empty.
fn collect_output(
    urls: Option<Vec<String>>,
    single: Option<String>,
    merged: Option<String>,
    script: Option<String>,
) -> Option<JobOutput> {
    let mut urls = urls.unwrap_or_default();
    if urls.is_empty() {
        urls.extend(single);
    }

    if let Ok(media) = MediaOutputs::new(urls, merged) {
        return Some(JobOutput::Media(media));
    }

    script
        .filter(|s| !s.trim().is_empty())
        .map(|content| JobOutput::Script { content })
}

fn first_non_empty(candidates: &[&Option<String>]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .find(|s| !s.trim().is_empty())
        .map(str::to_string)
}
