use crate::view_model::{AppViewModel, JobRowView};
use crate::{
    AnalysisResult, ChannelEnvelope, ChannelEvent, Effect, Epoch, Feature, JobId, Ledger, Millis,
    RateLimitSnapshot, Transport, TIMEOUT_MESSAGE,
};

/// The feature whose usage window gates submissions.
pub const ANALYZER_FEATURE: Feature = Feature::CommentAnalyzer;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum UiState {
    #[default]
    Idle,
    Processing {
        progress: f64,
        message: String,
    },
    Completed {
        result: AnalysisResult,
    },
    Failed {
        error: String,
        retryable: bool,
    },
}

impl UiState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UiState::Completed { .. } | UiState::Failed { .. })
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, UiState::Processing { .. })
    }
}

/// The live channel currently bound to a job.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Attachment {
    pub(crate) job_id: JobId,
    pub(crate) epoch: Epoch,
    pub(crate) armed: Option<Transport>,
}

/// A request whose response has not arrived yet.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Pending {
    Submission { epoch: Epoch, video_url: String },
    Resume { epoch: Epoch, job_id: JobId },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    input: String,
    ui: UiState,
    ledger: Ledger,
    rate_limit: RateLimitSnapshot,
    attachment: Option<Attachment>,
    pending: Option<Pending>,
    last_epoch: Epoch,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            input: self.input.clone(),
            ui: self.ui.clone(),
            rate_limit: self.rate_limit.clone(),
            current_job: self.attachment.as_ref().map(|a| a.job_id.clone()),
            transport: self.attachment.as_ref().and_then(|a| a.armed),
            pending_jobs: self.ledger.active().iter().map(JobRowView::from).collect(),
            completed_jobs: self.ledger.completed().iter().map(JobRowView::from).collect(),
            dirty: self.dirty,
        }
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn rate_limit(&self) -> &RateLimitSnapshot {
        &self.rate_limit
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Returns and clears the render flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn next_epoch(&mut self) -> Epoch {
        self.last_epoch += 1;
        self.last_epoch
    }

    pub(crate) fn set_input(&mut self, input: String) {
        if self.input != input {
            self.input = input;
            self.mark_dirty();
        }
    }

    pub(crate) fn set_ui(&mut self, ui: UiState) {
        self.ui = ui;
        self.mark_dirty();
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.ledger
    }

    pub(crate) fn restore_ledger(&mut self, ledger: Ledger) {
        self.ledger = ledger;
        self.mark_dirty();
    }

    pub(crate) fn rate_limit_mut(&mut self) -> &mut RateLimitSnapshot {
        &mut self.rate_limit
    }

    pub(crate) fn pending(&self) -> Option<&Pending> {
        self.pending.as_ref()
    }

    pub(crate) fn set_pending(&mut self, pending: Option<Pending>) {
        self.pending = pending;
    }

    pub(crate) fn attach(&mut self, job_id: JobId, epoch: Epoch) {
        self.attachment = Some(Attachment {
            job_id,
            epoch,
            armed: None,
        });
    }

    /// Drops the attachment and any pending request. Returns whether a
    /// channel teardown is needed.
    pub(crate) fn release(&mut self) -> bool {
        let had_channel = self.attachment.take().is_some();
        let had_pending = self.pending.take().is_some();
        had_channel || had_pending
    }

    /// Applies one channel event. Events for another epoch, another job or a
    /// transport that is not armed are ignored, as is anything arriving once
    /// the job has left `Processing`.
    pub(crate) fn apply_channel(&mut self, envelope: ChannelEnvelope, now: Millis) -> Vec<Effect> {
        if !self.ui.is_processing() {
            return Vec::new();
        }
        let Some(attachment) = self.attachment.as_mut() else {
            return Vec::new();
        };
        if attachment.epoch != envelope.epoch || attachment.job_id != envelope.job_id {
            return Vec::new();
        }

        if envelope.event == ChannelEvent::Armed {
            attachment.armed = Some(envelope.transport);
            self.mark_dirty();
            return Vec::new();
        }
        if attachment.armed != Some(envelope.transport) {
            return Vec::new();
        }

        let job_id = envelope.job_id;
        match envelope.event {
            ChannelEvent::Armed => Vec::new(),
            ChannelEvent::Progress {
                percentage,
                message,
                stage,
            } => {
                self.set_ui(UiState::Processing {
                    progress: percentage,
                    message,
                });
                if self
                    .ledger
                    .update_progress(&job_id, Some(percentage), stage, now)
                {
                    vec![Effect::PersistLedger]
                } else {
                    Vec::new()
                }
            }
            ChannelEvent::Completed { result } => {
                self.attachment = None;
                self.ledger
                    .move_to_completed(&job_id, Some(result.clone()), now);
                self.set_ui(UiState::Completed { result });
                vec![Effect::DetachChannel, Effect::PersistLedger]
            }
            ChannelEvent::Failed { error } => self.fail_attached(&job_id, error, now),
            ChannelEvent::TimedOut => self.fail_attached(&job_id, TIMEOUT_MESSAGE.to_string(), now),
        }
    }

    fn fail_attached(&mut self, job_id: &str, error: String, now: Millis) -> Vec<Effect> {
        self.attachment = None;
        self.ledger.mark_failed(job_id, error.clone(), now);
        self.set_ui(UiState::Failed {
            error,
            retryable: true,
        });
        vec![Effect::DetachChannel, Effect::PersistLedger]
    }
}
