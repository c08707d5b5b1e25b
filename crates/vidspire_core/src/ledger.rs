//! Client-side record of submitted analysis jobs and lookup history.
//!
//! Every collection is kept newest-first. Inserts truncate to the cap, so the
//! oldest entries fall off the end. A job id lives in at most one of the
//! active and completed collections.

use serde::{Deserialize, Serialize};

use crate::{AnalysisResult, JobId, Millis};

pub const MAX_ACTIVE_JOBS: usize = 10;
pub const MAX_COMPLETED_JOBS: usize = 10;
pub const MAX_HISTORY_ENTRIES: usize = 50;
pub const JOB_EXPIRY_MS: Millis = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: JobId,
    pub video_id: String,
    pub video_url: String,
    pub status: JobStatus,
    pub submitted_at: Millis,
    pub last_updated: Millis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
}

impl JobRecord {
    pub fn new_active(
        job_id: impl Into<JobId>,
        video_id: impl Into<String>,
        video_url: impl Into<String>,
        now: Millis,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            video_id: video_id.into(),
            video_url: video_url.into(),
            status: JobStatus::Active,
            submitted_at: now,
            last_updated: now,
            progress: Some(0.0),
            stage: None,
            error: None,
            result: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub video_url: String,
    pub video_id: String,
    pub job_id: JobId,
    pub created_at: Millis,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ledger {
    active: Vec<JobRecord>,
    completed: Vec<JobRecord>,
    history: Vec<HistoryEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from persisted collections.
    ///
    /// Persisted data may have been written by another process, so duplicates
    /// are dropped (first occurrence wins), completed beats active for the
    /// same id, and every collection is cut back to its cap.
    pub fn from_parts(
        active: Vec<JobRecord>,
        completed: Vec<JobRecord>,
        history: Vec<HistoryEntry>,
    ) -> Self {
        let mut completed = dedupe_by_job_id(completed);
        completed.truncate(MAX_COMPLETED_JOBS);

        let mut active: Vec<JobRecord> = dedupe_by_job_id(active)
            .into_iter()
            .filter(|job| !completed.iter().any(|done| done.job_id == job.job_id))
            .collect();
        active.truncate(MAX_ACTIVE_JOBS);

        let mut history = history;
        history.truncate(MAX_HISTORY_ENTRIES);

        Self {
            active,
            completed,
            history,
        }
    }

    pub fn active(&self) -> &[JobRecord] {
        &self.active
    }

    pub fn completed(&self) -> &[JobRecord] {
        &self.completed
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn find(&self, job_id: &str) -> Option<&JobRecord> {
        self.active
            .iter()
            .chain(self.completed.iter())
            .find(|job| job.job_id == job_id)
    }

    pub fn find_history(&self, job_id: &str) -> Option<&HistoryEntry> {
        self.history.iter().find(|entry| entry.job_id == job_id)
    }

    /// Inserts a record at the head of the active collection, replacing any
    /// existing record for the same job id in either collection.
    pub fn add_active(&mut self, record: JobRecord) {
        self.remove_job(&record.job_id);
        self.active.insert(0, record);
        self.active.truncate(MAX_ACTIVE_JOBS);
    }

    pub fn add_history(
        &mut self,
        video_url: impl Into<String>,
        video_id: impl Into<String>,
        job_id: impl Into<JobId>,
        now: Millis,
    ) {
        self.history.insert(
            0,
            HistoryEntry {
                video_url: video_url.into(),
                video_id: video_id.into(),
                job_id: job_id.into(),
                created_at: now,
            },
        );
        self.history.truncate(MAX_HISTORY_ENTRIES);
    }

    /// Records progress for an active job. A `None` stage keeps the previous one.
    pub fn update_progress(
        &mut self,
        job_id: &str,
        progress: Option<f64>,
        stage: Option<String>,
        now: Millis,
    ) -> bool {
        let Some(job) = self.active.iter_mut().find(|job| job.job_id == job_id) else {
            return false;
        };
        if progress.is_some() {
            job.progress = progress;
        }
        if stage.is_some() {
            job.stage = stage;
        }
        job.last_updated = now;
        true
    }

    /// Moves an active job to the head of the completed collection.
    ///
    /// Jobs that are not tracked as active are left alone.
    pub fn move_to_completed(
        &mut self,
        job_id: &str,
        result: Option<AnalysisResult>,
        now: Millis,
    ) -> bool {
        let Some(index) = self.active.iter().position(|job| job.job_id == job_id) else {
            return false;
        };
        let mut job = self.active.remove(index);
        job.status = JobStatus::Completed;
        job.result = result;
        job.last_updated = now;

        self.completed.retain(|done| done.job_id != job_id);
        self.completed.insert(0, job);
        self.completed.truncate(MAX_COMPLETED_JOBS);
        true
    }

    /// Marks an active job as failed in place.
    pub fn mark_failed(&mut self, job_id: &str, error: impl Into<String>, now: Millis) -> bool {
        let Some(job) = self.active.iter_mut().find(|job| job.job_id == job_id) else {
            return false;
        };
        job.status = JobStatus::Failed;
        job.error = Some(error.into());
        job.last_updated = now;
        true
    }

    pub fn remove_job(&mut self, job_id: &str) -> bool {
        let before = self.active.len() + self.completed.len();
        self.active.retain(|job| job.job_id != job_id);
        self.completed.retain(|job| job.job_id != job_id);
        before != self.active.len() + self.completed.len()
    }

    /// Drops every record submitted, and every history entry created, more
    /// than 24 hours before `now`. Returns how many entries were removed.
    pub fn cleanup(&mut self, now: Millis) -> usize {
        let expiry = now - JOB_EXPIRY_MS;
        let before = self.len();
        self.active.retain(|job| job.submitted_at > expiry);
        self.completed.retain(|job| job.submitted_at > expiry);
        self.history.retain(|entry| entry.created_at > expiry);
        before - self.len()
    }

    pub fn len(&self) -> usize {
        self.active.len() + self.completed.len() + self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_parts(self) -> (Vec<JobRecord>, Vec<JobRecord>, Vec<HistoryEntry>) {
        (self.active, self.completed, self.history)
    }
}

fn dedupe_by_job_id(jobs: Vec<JobRecord>) -> Vec<JobRecord> {
    let mut seen: Vec<JobId> = Vec::with_capacity(jobs.len());
    jobs.into_iter()
        .filter(|job| {
            if seen.contains(&job.job_id) {
                false
            } else {
                seen.push(job.job_id.clone());
                true
            }
        })
        .collect()
}

