use crate::{
    ChannelEnvelope, Epoch, JobId, JobRepresentation, Ledger, Millis, RateLimitHeaders,
    RateLimitSnapshot,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Analyzer session started; runs the ledger cleanup pass.
    Mounted { now: Millis },
    /// Analyzer session is going away; every live resource must be released.
    Unmounted,
    /// Restore the persisted ledger.
    LedgerRestored(Ledger),
    /// Restore the persisted usage snapshot for the analyzer.
    RateLimitRestored(RateLimitSnapshot),
    /// User edited the video URL input.
    InputChanged(String),
    /// User submitted the current input for analysis.
    Submitted { now: Millis },
    /// Backend accepted the submission.
    SubmitAccepted {
        epoch: Epoch,
        job_id: JobId,
        video_id: String,
        rate_limit: RateLimitHeaders,
        now: Millis,
    },
    /// Backend or transport refused the submission.
    SubmitRejected {
        epoch: Epoch,
        error: String,
        retryable: bool,
        rate_limit: RateLimitHeaders,
        now: Millis,
    },
    /// Event from the live channel of an attached job.
    Channel { envelope: ChannelEnvelope, now: Millis },
    /// Open an existing job, e.g. from a shared link.
    ResumeRequested { job_id: JobId },
    /// Current representation of the job being resumed.
    ResumeLoaded {
        epoch: Epoch,
        job_id: JobId,
        representation: JobRepresentation,
        now: Millis,
    },
    /// Resumption could not fetch or classify the job.
    ResumeFailed { epoch: Epoch, error: String },
    /// Periodic `/usage` refresh result.
    UsageRefreshed(RateLimitSnapshot),
    /// User clicked Reset.
    ResetClicked,
    /// Idle wake-up while waiting on the engine.
    Tick,
}
