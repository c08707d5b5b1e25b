use std::str::FromStr;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use url::Url;
use vidspire_core::{
    Feature, IdeaRequest, JobRepresentation, JobStatusPayload, Millis, RateLimitHeaders,
    RateLimitSnapshot, SearchQuery, StreamMessage, VideoResult,
};

use crate::stream::LineBuffer;
use crate::{ApiError, ApiResponse, EngineEvent, FailureKind, Submission};

const RATE_LIMITED_MESSAGE: &str = "Daily limit reached. Try again tomorrow!";
const REQUEST_FAILED_MESSAGE: &str = "Request failed";

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub api_url: Url,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// Upper bound for the idea-validation stream, which outlives a normal request.
    pub stream_timeout: Duration,
}

impl BackendSettings {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            stream_timeout: Duration::from_secs(300),
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

pub struct ChannelProgressSink {
    tx: std::sync::mpsc::Sender<EngineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: std::sync::mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}

/// The Vidspire HTTP API.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// `POST /video/analyze`.
    async fn analyze(&self, video_url: &str) -> Result<ApiResponse<Submission>, ApiError>;

    /// `GET /video/status/:jobId`.
    async fn job_status(&self, job_id: &str) -> Result<JobStatusPayload, ApiError>;

    /// `GET /video/:jobId`, classified.
    async fn job(&self, job_id: &str) -> Result<JobRepresentation, ApiError>;

    /// `GET /usage/:feature`.
    async fn usage(&self, feature: Feature) -> Result<RateLimitSnapshot, ApiError>;

    /// `POST /validate-idea`. Each decoded stream message is emitted as
    /// [`EngineEvent::Idea`]; the call returns once the body ends.
    async fn validate_idea(
        &self,
        request: &IdeaRequest,
        sink: &dyn ProgressSink,
    ) -> Result<RateLimitHeaders, ApiError>;

    /// `GET /api/topics/search-advanced`.
    async fn search(&self, query: &SearchQuery)
        -> Result<ApiResponse<Vec<VideoResult>>, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    settings: BackendSettings,
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ApiError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.settings.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::new(FailureKind::InvalidUrl, "api url cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn post_json(&self, url: Url, body: &Value) -> Result<reqwest::RequestBuilder, ApiError> {
        let body = serde_json::to_vec(body)
            .map_err(|err| ApiError::new(FailureKind::InvalidResponse, err.to_string()))?;
        Ok(self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<RawResponse, ApiError> {
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();
        let rate_limit = rate_limit_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|err| map_reqwest_error(err).with_rate_limit(rate_limit.clone()))?;
        Ok(RawResponse {
            status,
            rate_limit,
            body: body.to_vec(),
        })
    }
}

#[async_trait::async_trait]
impl Backend for ReqwestBackend {
    async fn analyze(&self, video_url: &str) -> Result<ApiResponse<Submission>, ApiError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Accepted {
            job_id: String,
            #[serde(default)]
            video_id: String,
        }

        let url = self.endpoint(&["video", "analyze"])?;
        let request = self.post_json(url, &serde_json::json!({ "videoUrl": video_url }))?;
        let raw = self.send(request).await?;
        let response: ApiResponse<Accepted> = raw.decode()?;
        engine_logging::engine_debug!("Analysis accepted as job {}", response.data.job_id);
        Ok(ApiResponse {
            data: Submission {
                job_id: response.data.job_id,
                video_id: response.data.video_id,
            },
            rate_limit: response.rate_limit,
        })
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusPayload, ApiError> {
        let url = self.endpoint(&["video", "status", job_id])?;
        let raw = self.send(self.client.get(url)).await?;
        match raw.decode::<JobStatusPayload>() {
            Ok(response) => Ok(response.data),
            Err(err)
                if matches!(err.kind, FailureKind::Rejected | FailureKind::HttpStatus(404)) =>
            {
                Err(ApiError::new(FailureKind::Rejected, "Job not found"))
            }
            Err(err) => Err(err),
        }
    }

    async fn job(&self, job_id: &str) -> Result<JobRepresentation, ApiError> {
        let url = self.endpoint(&["video", job_id])?;
        let raw = self.send(self.client.get(url)).await?;
        let body: Value = match serde_json::from_slice(&raw.body) {
            Ok(body) => body,
            Err(err) if raw.status.is_success() => {
                return Err(ApiError::new(FailureKind::InvalidResponse, err.to_string()));
            }
            Err(_) => return Err(raw.status_error(REQUEST_FAILED_MESSAGE)),
        };
        JobRepresentation::classify(&body)
            .map_err(|err| ApiError::new(FailureKind::InvalidResponse, err.to_string()))
    }

    async fn usage(&self, feature: Feature) -> Result<RateLimitSnapshot, ApiError> {
        #[derive(Deserialize)]
        struct Usage {
            #[serde(default)]
            success: bool,
            feature: Option<UsageWindow>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct UsageWindow {
            remaining: u32,
            limit: u32,
            #[serde(default)]
            reset_in: Option<u64>,
            #[serde(default)]
            is_exhausted: bool,
        }

        let url = self.endpoint(&["usage", feature.slug()])?;
        let raw = self.send(self.client.get(url)).await?;
        let usage: Usage = serde_json::from_slice(&raw.body).map_err(|err| {
            if raw.status.is_success() {
                ApiError::new(FailureKind::InvalidResponse, err.to_string())
            } else {
                raw.status_error(REQUEST_FAILED_MESSAGE)
            }
        })?;
        // A 429 still describes the window, so it is accepted when present.
        match usage.feature {
            Some(window) if usage.success || raw.status == StatusCode::TOO_MANY_REQUESTS => {
                Ok(RateLimitSnapshot {
                    remaining: window.remaining,
                    limit: window.limit,
                    reset_in: window.reset_in,
                    is_exhausted: window.is_exhausted,
                    observed_at: now_millis(),
                })
            }
            _ => Err(ApiError::new(
                FailureKind::Rejected,
                format!("usage for {feature} unavailable"),
            )),
        }
    }

    async fn validate_idea(
        &self,
        request: &IdeaRequest,
        sink: &dyn ProgressSink,
    ) -> Result<RateLimitHeaders, ApiError> {
        let url = self.endpoint(&["validate-idea"])?;
        let body = serde_json::to_value(request)
            .map_err(|err| ApiError::new(FailureKind::InvalidResponse, err.to_string()))?;
        let response = self
            .post_json(url, &body)?
            .timeout(self.settings.stream_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let rate_limit = rate_limit_headers(response.headers());
        if !status.is_success() {
            let body = response.bytes().await.map_err(map_reqwest_error)?;
            let raw = RawResponse {
                status,
                rate_limit,
                body: body.to_vec(),
            };
            let message = raw.message();
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                raw.rate_limited(message)
            } else {
                raw.status_error(message.as_deref().unwrap_or(REQUEST_FAILED_MESSAGE))
            });
        }

        let mut lines = LineBuffer::default();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|err| map_reqwest_error(err).with_rate_limit(rate_limit.clone()))?;
            for line in lines.push(&chunk) {
                emit_stream_line(&line, sink);
            }
        }
        if let Some(line) = lines.finish() {
            emit_stream_line(&line, sink);
        }
        Ok(rate_limit)
    }

    async fn search(
        &self,
        query: &SearchQuery,
    ) -> Result<ApiResponse<Vec<VideoResult>>, ApiError> {
        let mut url = self.endpoint(&["api", "topics", "search-advanced"])?;
        url.query_pairs_mut().extend_pairs(query.query_pairs());
        let raw = self.send(self.client.get(url)).await?;
        raw.decode()
    }
}

fn emit_stream_line(line: &str, sink: &dyn ProgressSink) {
    match StreamMessage::parse_line(line) {
        Ok(message) => sink.emit(EngineEvent::Idea(message)),
        Err(err) => engine_logging::engine_warn!("Skipping malformed stream line: {err}"),
    }
}

struct RawResponse {
    status: StatusCode,
    rate_limit: RateLimitHeaders,
    body: Vec<u8>,
}

/// `{success, data?, error?, message?}` wrapper used by most endpoints.
#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl RawResponse {
    fn decode<T: DeserializeOwned>(self) -> Result<ApiResponse<T>, ApiError> {
        if self.status == StatusCode::TOO_MANY_REQUESTS {
            let message = self.message();
            return Err(self.rate_limited(message));
        }

        let envelope: Envelope = match serde_json::from_slice(&self.body) {
            Ok(envelope) => envelope,
            Err(err) if self.status.is_success() => {
                return Err(ApiError::new(FailureKind::InvalidResponse, err.to_string())
                    .with_rate_limit(self.rate_limit));
            }
            Err(_) => return Err(self.status_error(REQUEST_FAILED_MESSAGE)),
        };

        if !self.status.is_success() || !envelope.success {
            let kind = if self.status.is_success() {
                FailureKind::Rejected
            } else {
                FailureKind::HttpStatus(self.status.as_u16())
            };
            let message = envelope
                .message
                .or(envelope.error)
                .unwrap_or_else(|| REQUEST_FAILED_MESSAGE.to_string());
            return Err(ApiError::new(kind, message).with_rate_limit(self.rate_limit));
        }

        let data = envelope.data.ok_or_else(|| {
            ApiError::new(FailureKind::InvalidResponse, "response carried no data")
                .with_rate_limit(self.rate_limit.clone())
        })?;
        let data = serde_json::from_value(data).map_err(|err| {
            ApiError::new(FailureKind::InvalidResponse, err.to_string())
                .with_rate_limit(self.rate_limit.clone())
        })?;
        Ok(ApiResponse {
            data,
            rate_limit: self.rate_limit,
        })
    }

    /// Server-provided `message` (or `error`) from a JSON body, if any.
    fn message(&self) -> Option<String> {
        let envelope: Envelope = serde_json::from_slice(&self.body).ok()?;
        envelope.message.or(envelope.error)
    }

    fn rate_limited(&self, message: Option<String>) -> ApiError {
        ApiError::new(
            FailureKind::RateLimited,
            message.unwrap_or_else(|| RATE_LIMITED_MESSAGE.to_string()),
        )
        .with_rate_limit(self.rate_limit.clone())
    }

    fn status_error(&self, message: &str) -> ApiError {
        ApiError::new(FailureKind::HttpStatus(self.status.as_u16()), message)
            .with_rate_limit(self.rate_limit.clone())
    }
}

fn rate_limit_headers(headers: &HeaderMap) -> RateLimitHeaders {
    RateLimitHeaders {
        remaining: header_number(headers, "x-ratelimit-remaining"),
        limit: header_number(headers, "x-ratelimit-limit"),
        reset: header_number(headers, "x-ratelimit-reset"),
        retry_after: header_number(headers, "retry-after"),
    }
}

fn header_number<T: FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_builder() {
        return ApiError::new(FailureKind::InvalidUrl, err.to_string());
    }
    ApiError::new(FailureKind::Network, err.to_string())
}

/// Wall clock shared by the engine and its callers.
pub fn now_millis() -> Millis {
    chrono::Utc::now().timestamp_millis()
}
