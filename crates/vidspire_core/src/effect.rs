use crate::{Epoch, Feature, JobId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SubmitJob { epoch: Epoch, video_url: String },
    AttachChannel {
        epoch: Epoch,
        job_id: JobId,
        video_id: String,
    },
    /// Close the socket and cancel any scheduled poll.
    DetachChannel,
    FetchJob { epoch: Epoch, job_id: JobId },
    PersistLedger,
    PersistRateLimit { feature: Feature },
    WatchUsage { feature: Feature },
    StopUsageWatch,
}
