use crate::{JobId, JobRecord, JobStatus, RateLimitSnapshot, Transport, UiState};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppViewModel {
    pub input: String,
    pub ui: UiState,
    pub rate_limit: RateLimitSnapshot,
    pub current_job: Option<JobId>,
    pub transport: Option<Transport>,
    pub pending_jobs: Vec<JobRowView>,
    pub completed_jobs: Vec<JobRowView>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRowView {
    pub job_id: JobId,
    pub video_url: String,
    pub status: JobStatus,
    pub progress: Option<f64>,
    pub stage: Option<String>,
    pub error: Option<String>,
}

impl From<&JobRecord> for JobRowView {
    fn from(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.clone(),
            video_url: record.video_url.clone(),
            status: record.status,
            progress: record.progress,
            stage: record.stage.clone(),
            error: record.error.clone(),
        }
    }
}
