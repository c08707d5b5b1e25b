//! Vidspire core: pure job-tracking state machine, ledger and view-model helpers.
mod analysis;
mod channel;
mod effect;
mod idea;
mod ledger;
mod msg;
mod rate_limit;
mod resume;
mod search;
mod state;
mod update;
mod view_model;

/// Opaque backend-assigned job identifier.
pub type JobId = String;
/// Wall-clock time in milliseconds since the Unix epoch.
pub type Millis = i64;

pub use analysis::{AnalysisResult, SentimentBucket, SentimentSummary};
pub use channel::{ChannelEnvelope, ChannelEvent, Epoch, Transport, TIMEOUT_MESSAGE};
pub use effect::Effect;
pub use idea::{
    AgentBoard, AgentPhase, AgentSignal, ContentStrategy, FinalPayload, IdeaRequest, IdeaState,
    LogLevel, LogLine, StrategyRecommendations, StreamMessage, ValidationResult,
    MISSING_FIELDS_MESSAGE, STREAM_ENDED_MESSAGE,
};
pub use ledger::{
    HistoryEntry, JobRecord, JobStatus, Ledger, JOB_EXPIRY_MS, MAX_ACTIVE_JOBS,
    MAX_COMPLETED_JOBS, MAX_HISTORY_ENTRIES,
};
pub use msg::Msg;
pub use rate_limit::{
    format_reset_time, Feature, RateLimitHeaders, RateLimitSnapshot, UnknownFeature,
    DEFAULT_DAILY_LIMIT,
};
pub use resume::{
    job_id_from_link, JobRepresentation, JobStatusPayload, RemoteJob, RemoteJobState,
    ResumeError,
};
pub use search::{
    ContentType, SearchQuery, SortOrder, UnknownOption, VideoResult, DEFAULT_MAX_RESULTS,
};
pub use state::{AppState, UiState, ANALYZER_FEATURE};
pub use update::{update, EMPTY_INPUT_MESSAGE};
pub use view_model::{AppViewModel, JobRowView};
