//! Generation job data model.
//!
//! Requests are built and validated by the caller, then passed through to
//! the backend untouched. Handles, statuses and results come back from the
//! backend and are decoded by `clipforge-client`.

use std::fmt;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Request defaults
// ---------------------------------------------------------------------------

/// Theme the backend applies when the caller does not choose one.
pub const DEFAULT_THEME: &str = "品质保证";

/// Default target video duration in seconds.
pub const DEFAULT_DURATION_SECS: u32 = 20;

/// Upper bound accepted for `duration`, in seconds.
pub const MAX_DURATION_SECS: u32 = 60;

// ---------------------------------------------------------------------------
// GenerationKind
// ---------------------------------------------------------------------------

/// What the backend is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    /// Multi-stage video render; always handled asynchronously by the backend.
    #[default]
    Video,
    /// Text-only script; usually answered synchronously.
    Script,
}

impl GenerationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Script => "script",
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobRequest
// ---------------------------------------------------------------------------

/// Parameters for a single generation job.
///
/// The client never interprets these fields; they are serialized as the
/// JSON body of the job creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
pub struct JobRequest {
    #[validate(length(min = 1, max = 100))]
    pub product_name: String,

    #[validate(length(min = 1, max = 50))]
    pub theme: String,

    /// Target duration in seconds.
    #[validate(range(min = 1, max = MAX_DURATION_SECS))]
    pub duration: u32,

    #[serde(rename = "type")]
    pub kind: GenerationKind,

    /// Free-form usage scenario description.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500))]
    pub scenario: Option<String>,

    /// URL of a previously uploaded reference image.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(url)]
    pub product_image_url: Option<String>,

    /// Backend conversation thread, if the caller keeps one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl JobRequest {
    /// Create a request with the backend's default theme and duration.
    pub fn new(product_name: impl Into<String>, kind: GenerationKind) -> Self {
        Self {
            product_name: product_name.into(),
            theme: DEFAULT_THEME.to_string(),
            duration: DEFAULT_DURATION_SECS,
            kind,
            scenario: None,
            product_image_url: None,
            session_id: None,
        }
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = theme.into();
        self
    }

    pub fn with_duration(mut self, duration: u32) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.product_image_url = Some(url.into());
        self
    }

    /// Run the field validators, flattening failures into a [`CoreError`].
    pub fn ensure_valid(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// JobHandle
// ---------------------------------------------------------------------------

/// Server-issued identifier for an asynchronous job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    /// Wrap a task id returned by the backend. Blank ids are rejected.
    pub fn new(task_id: impl Into<String>) -> Result<Self, CoreError> {
        let task_id = task_id.into();
        if task_id.trim().is_empty() {
            return Err(CoreError::Validation("task id must not be empty".into()));
        }
        Ok(Self(task_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// JobState / JobStatus
// ---------------------------------------------------------------------------

/// Coarse lifecycle state of a backend job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobState {
    /// Map a backend status string onto a state.
    ///
    /// The backend reports its internal stages (`generating`, `merging`,
    /// `uploading`) which all collapse to [`JobState::Running`]. Returns
    /// `None` for strings it does not recognise.
    pub fn from_wire(status: &str) -> Option<Self> {
        match status.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => Some(Self::Pending),
            "running" | "generating" | "merging" | "uploading" | "processing" => {
                Some(Self::Running)
            }
            "completed" | "succeeded" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// `Completed` and `Failed` never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One observation of a job's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    /// Completion percentage, clamped to 0-100.
    pub progress: Option<u8>,
    pub message: Option<String>,
    /// Backend stage description (e.g. "merging segments").
    pub current_step: Option<String>,
    pub total_parts: Option<u32>,
    pub completed_parts: Option<u32>,
}

impl JobStatus {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            progress: None,
            message: None,
            current_step: None,
            total_parts: None,
            completed_parts: None,
        }
    }
}

/// Clamp a raw backend percentage into `0..=100`.
pub fn clamp_progress(raw: i64) -> u8 {
    raw.clamp(0, 100) as u8
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Output asset references of a finished media job.
///
/// Holds at least one reference. When the backend stitches segments
/// together it reports the stitched asset separately as `merged_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaOutputs {
    urls: Vec<String>,
    merged_url: Option<String>,
}

impl MediaOutputs {
    /// Build from the per-segment list and an optional merged asset.
    ///
    /// Blank entries are dropped. Fails when no reference remains.
    pub fn new(urls: Vec<String>, merged_url: Option<String>) -> Result<Self, CoreError> {
        let urls: Vec<String> = urls.into_iter().filter(|u| !u.trim().is_empty()).collect();
        let merged_url = merged_url.filter(|u| !u.trim().is_empty());

        if urls.is_empty() && merged_url.is_none() {
            return Err(CoreError::Validation(
                "completed job carries no output reference".into(),
            ));
        }
        Ok(Self { urls, merged_url })
    }

    /// The asset to present first: the merged output when the backend
    /// named one, otherwise the first segment.
    pub fn primary(&self) -> &str {
        match &self.merged_url {
            Some(merged) => merged,
            None => &self.urls[0],
        }
    }

    /// Per-segment outputs in backend order.
    pub fn segments(&self) -> &[String] {
        &self.urls
    }

    pub fn merged(&self) -> Option<&str> {
        self.merged_url.as_deref()
    }
}

/// Payload of a completed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOutput {
    /// Text-only artifact.
    Script { content: String },
    /// Rendered media assets.
    Media(MediaOutputs),
}

impl JobOutput {
    /// Short reference suitable for a one-line notification.
    pub fn primary(&self) -> &str {
        match self {
            Self::Script { content } => content,
            Self::Media(media) => media.primary(),
        }
    }
}

/// Final result of a job: exactly one of output or error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JobResult {
    Completed(JobOutput),
    Failed { message: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn urls(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn request_serializes_kind_as_type_and_skips_absent_options() {
        let req = JobRequest::new("M8 hex bolt", GenerationKind::Video).with_duration(15);
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["product_name"], "M8 hex bolt");
        assert_eq!(json["type"], "video");
        assert_eq!(json["duration"], 15);
        assert_eq!(json["theme"], DEFAULT_THEME);
        assert!(json.get("scenario").is_none());
        assert!(json.get("product_image_url").is_none());
    }

    #[test]
    fn request_validation_rejects_empty_product_name() {
        let req = JobRequest::new("", GenerationKind::Script);
        assert_matches!(req.ensure_valid(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn request_validation_rejects_out_of_range_duration() {
        let req = JobRequest::new("washer", GenerationKind::Video).with_duration(0);
        assert!(req.ensure_valid().is_err());

        let req = req.with_duration(MAX_DURATION_SECS + 1);
        assert!(req.ensure_valid().is_err());
    }

    #[test]
    fn request_validation_rejects_non_url_image() {
        let req = JobRequest::new("washer", GenerationKind::Video).with_image_url("not a url");
        assert!(req.ensure_valid().is_err());
    }

    #[test]
    fn request_validation_accepts_complete_request() {
        let req = JobRequest::new("washer", GenerationKind::Video)
            .with_theme("技术创新")
            .with_scenario("construction site")
            .with_image_url("https://cdn.example.com/a.png");
        assert!(req.ensure_valid().is_ok());
    }

    #[test]
    fn handle_rejects_blank_task_id() {
        assert!(JobHandle::new("   ").is_err());
        assert_eq!(JobHandle::new("abc-1").unwrap().to_string(), "abc-1");
    }

    #[test]
    fn backend_stages_collapse_to_running() {
        for stage in ["running", "generating", "merging", "uploading", "PROCESSING"] {
            assert_eq!(JobState::from_wire(stage), Some(JobState::Running), "{stage}");
        }
        assert_eq!(JobState::from_wire("queued"), Some(JobState::Pending));
        assert_eq!(JobState::from_wire("succeeded"), Some(JobState::Completed));
        assert_eq!(JobState::from_wire("failed"), Some(JobState::Failed));
        assert_eq!(JobState::from_wire("exploded"), None);
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }

    #[test]
    fn progress_is_clamped() {
        assert_eq!(clamp_progress(-5), 0);
        assert_eq!(clamp_progress(42), 42);
        assert_eq!(clamp_progress(250), 100);
    }

    #[test]
    fn merged_output_wins_over_first_segment() {
        let out = MediaOutputs::new(
            urls(&["https://x/part1.mp4", "https://x/part2.mp4"]),
            Some("https://x/merged.mp4".into()),
        )
        .unwrap();
        assert_eq!(out.primary(), "https://x/merged.mp4");
        assert_eq!(out.segments().len(), 2);
    }

    #[test]
    fn first_segment_is_primary_without_merged() {
        let out = MediaOutputs::new(urls(&["https://x/a.mp4", "https://x/b.mp4"]), None).unwrap();
        assert_eq!(out.primary(), "https://x/a.mp4");
        assert!(out.merged().is_none());
    }

    #[test]
    fn merged_only_output_is_accepted() {
        let out = MediaOutputs::new(vec![], Some("https://x/m.mp4".into())).unwrap();
        assert_eq!(out.primary(), "https://x/m.mp4");
        assert!(out.segments().is_empty());
    }

    #[test]
    fn empty_outputs_are_rejected() {
        assert!(MediaOutputs::new(urls(&["", "  "]), Some(String::new())).is_err());
    }
}
