//! Classification of job representations returned by `GET /video/:jobId`
//! and `GET /video/status/:jobId`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use url::Url;

use crate::{AnalysisResult, JobId};

/// Remote job state as reported by the status endpoint. Queue states other
/// than the three the client acts on collapse into `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteJobState {
    Active,
    Completed,
    Failed,
    #[serde(other)]
    Pending,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusPayload {
    pub state: RemoteJobState,
    #[serde(default, deserialize_with = "lenient_number")]
    pub progress: Option<f64>,
    #[serde(default)]
    pub returnvalue: Option<Value>,
    #[serde(default)]
    pub failed_reason: Option<String>,
    #[serde(default)]
    pub video_id: Option<String>,
}

/// Job-status shape, after validation.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteJob {
    Completed { result: AnalysisResult },
    Failed { reason: Option<String> },
    Active {
        progress: Option<f64>,
        video_id: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobRepresentation {
    /// The analysis result itself, returned once the job has finished.
    CompletedResult(AnalysisResult),
    /// A queue job record.
    JobStatus(RemoteJob),
    /// The backend reported that the job cannot be served.
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResumeError {
    #[error("Unknown job state: {0}")]
    UnrecognizedShape(String),
    #[error("Invalid analysis result: {0}")]
    InvalidResult(String),
}

impl JobRepresentation {
    /// Classifies a full response body (`{success, data, message?}`).
    pub fn classify(body: &Value) -> Result<Self, ResumeError> {
        let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);
        if !success {
            let message = str_field(body, "message")
                .or_else(|| str_field(body, "error"))
                .unwrap_or("Failed to fetch job data");
            return Ok(JobRepresentation::Error {
                message: message.to_string(),
            });
        }

        let data = body
            .get("data")
            .filter(|data| data.is_object())
            .ok_or_else(|| ResumeError::UnrecognizedShape("missing job data".to_string()))?;

        let status = str_field(data, "status");
        if status == Some("completed") && data.get("summary").is_some_and(|s| !s.is_null()) {
            let result = AnalysisResult::from_value(data.clone())
                .map_err(|err| ResumeError::InvalidResult(err.to_string()))?;
            return Ok(JobRepresentation::CompletedResult(result));
        }

        if let Some(state) = str_field(data, "state") {
            return classify_status(state, data).map(JobRepresentation::JobStatus);
        }

        if status == Some("failed") {
            let message = str_field(data, "error").unwrap_or("Analysis failed");
            return Ok(JobRepresentation::Error {
                message: message.to_string(),
            });
        }

        Err(ResumeError::UnrecognizedShape(
            status.unwrap_or("no state").to_string(),
        ))
    }
}

fn classify_status(state: &str, data: &Value) -> Result<RemoteJob, ResumeError> {
    let payload: JobStatusPayload = serde_json::from_value(data.clone())
        .map_err(|err| ResumeError::UnrecognizedShape(err.to_string()))?;
    match payload.state {
        RemoteJobState::Completed => {
            let value = payload
                .returnvalue
                .filter(|value| !value.is_null())
                .ok_or_else(|| {
                    ResumeError::UnrecognizedShape("completed without result".to_string())
                })?;
            let result = AnalysisResult::from_value(value)
                .map_err(|err| ResumeError::InvalidResult(err.to_string()))?;
            Ok(RemoteJob::Completed { result })
        }
        RemoteJobState::Failed => Ok(RemoteJob::Failed {
            reason: payload.failed_reason,
        }),
        RemoteJobState::Active => Ok(RemoteJob::Active {
            progress: payload.progress,
            video_id: payload.video_id,
        }),
        RemoteJobState::Pending => Err(ResumeError::UnrecognizedShape(state.to_string())),
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Queue libraries report progress as a number or as an arbitrary object;
/// only numbers are kept.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| value.as_f64()))
}

/// Extracts a job id from a shared link (`...?jobId=J`) or accepts a bare id.
pub fn job_id_from_link(input: &str) -> Option<JobId> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let parsed = Url::parse(input).ok().or_else(|| {
        if input.contains('?') {
            Url::parse("http://link.invalid/").ok()?.join(input).ok()
        } else {
            None
        }
    });

    match parsed {
        Some(url) => url
            .query_pairs()
            .find(|(key, _)| key == "jobId")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty()),
        None => Some(input.to_string()),
    }
}
