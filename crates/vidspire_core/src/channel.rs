use crate::{AnalysisResult, JobId};

/// Identifies one attachment of a live channel. A new submission, resumption
/// or reset always moves to a fresh epoch.
pub type Epoch = u64;

pub const TIMEOUT_MESSAGE: &str = "Timeout - please try again";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Push,
    Poll,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The transport became the one delivering events for this attachment.
    Armed,
    Progress {
        percentage: f64,
        message: String,
        stage: Option<String>,
    },
    Completed {
        result: AnalysisResult,
    },
    Failed {
        error: String,
    },
    /// Polling ran out of attempts.
    TimedOut,
}

impl ChannelEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChannelEvent::Completed { .. } | ChannelEvent::Failed { .. } | ChannelEvent::TimedOut
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEnvelope {
    pub job_id: JobId,
    pub epoch: Epoch,
    pub transport: Transport,
    pub event: ChannelEvent,
}
