use serde::Serialize;

/// Job state as derived from the artifact tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    NotFound,
    Processing,
    AudioProcessing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::NotFound => "not_found",
            JobState::Processing => "processing",
            JobState::AudioProcessing => "audio_processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

/// Client-facing status; `AudioProcessing` is reported as `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    NotFound,
    Processing,
    Failed,
    Completed,
}

impl From<JobState> for JobStatus {
    fn from(state: JobState) -> Self {
        match state {
            JobState::NotFound => JobStatus::NotFound,
            JobState::Processing | JobState::AudioProcessing => JobStatus::Processing,
            JobState::Completed => JobStatus::Completed,
            JobState::Failed => JobStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub video_id: String,
    pub status: JobStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub has_audio: bool,
}

impl StatusReport {
    pub(crate) fn new(video_id: &str, status: JobStatus, message: impl Into<String>) -> Self {
        Self {
            video_id: video_id.to_string(),
            status,
            message: message.into(),
            video_url: None,
            has_audio: false,
        }
    }

    pub(crate) fn with_url(mut self) -> Self {
        self.video_url = Some(video_url(&self.video_id));
        self
    }

    pub(crate) fn narrated(mut self) -> Self {
        self.has_audio = true;
        self
    }
}

pub fn video_url(video_id: &str) -> String {
    format!("/api/video/{}", video_id)
}
