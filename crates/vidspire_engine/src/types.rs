use std::fmt;

use vidspire_core::{
    ChannelEnvelope, Epoch, Feature, JobId, JobRepresentation, RateLimitHeaders,
    RateLimitSnapshot, StreamMessage, VideoResult,
};

/// A successful backend response together with the rate-limit headers it
/// carried.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub data: T,
    pub rate_limit: RateLimitHeaders,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub job_id: JobId,
    pub video_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Submitted {
        epoch: Epoch,
        result: Result<ApiResponse<Submission>, ApiError>,
    },
    Channel(ChannelEnvelope),
    JobLoaded {
        epoch: Epoch,
        job_id: JobId,
        result: Result<JobRepresentation, ApiError>,
    },
    UsageRefreshed {
        feature: Feature,
        result: Result<RateLimitSnapshot, ApiError>,
    },
    Idea(StreamMessage),
    IdeaFinished {
        result: Result<RateLimitHeaders, ApiError>,
    },
    SearchCompleted {
        result: Result<ApiResponse<Vec<VideoResult>>, ApiError>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub kind: FailureKind,
    pub message: String,
    /// Headers seen on the failing response, if it got that far.
    pub rate_limit: RateLimitHeaders,
}

impl ApiError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            rate_limit: RateLimitHeaders::default(),
        }
    }

    pub(crate) fn with_rate_limit(mut self, rate_limit: RateLimitHeaders) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Rate-limit refusals cannot be retried until the window resets.
    pub fn is_retryable(&self) -> bool {
        self.kind != FailureKind::RateLimited
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    RateLimited,
    /// The backend answered but reported `success: false`.
    Rejected,
    InvalidResponse,
    Timeout,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::RateLimited => write!(f, "rate limited"),
            FailureKind::Rejected => write!(f, "rejected"),
            FailureKind::InvalidResponse => write!(f, "invalid response"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}
