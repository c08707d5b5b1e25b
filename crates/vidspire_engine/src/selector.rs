//! Live channel selection for one attached job.
//!
//! The push channel gets a short window to open. Once open it owns the job;
//! otherwise, or if it drops before a terminal event, polling takes over for
//! the rest of the attachment. Push is never retried.

use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use vidspire_core::{
    AnalysisResult, ChannelEnvelope, ChannelEvent, Epoch, JobId, RemoteJobState, Transport,
};

use crate::{Backend, EngineEvent, ProgressSink, PushConnector, PushEvent};

#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// How long the push channel may take to open before polling starts.
    pub watchdog: Duration,
    /// Delay after the n-th poll; the last entry repeats.
    pub poll_intervals: Vec<Duration>,
    pub max_poll_attempts: u32,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            watchdog: Duration::from_secs(3),
            poll_intervals: [1, 2, 3, 5]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
            max_poll_attempts: 120,
        }
    }
}

impl ChannelSettings {
    /// Delay before the poll that follows `completed` polls.
    pub fn poll_delay(&self, completed: u32) -> Duration {
        let index = completed.saturating_sub(1) as usize;
        self.poll_intervals
            .get(index)
            .or_else(|| self.poll_intervals.last())
            .copied()
            .unwrap_or(Duration::from_secs(5))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    pub epoch: Epoch,
    pub job_id: JobId,
    pub video_id: String,
}

/// Drives the channel for one attachment until a terminal event, poll
/// exhaustion or cancellation. Nothing is emitted once `cancel` fires.
pub async fn run_channel(
    backend: &dyn Backend,
    connector: &dyn PushConnector,
    settings: &ChannelSettings,
    request: ChannelRequest,
    sink: &dyn ProgressSink,
    cancel: CancellationToken,
) {
    let emitter = Emitter {
        sink,
        cancel: &cancel,
        request: &request,
    };

    tokio::select! {
        _ = cancel.cancelled() => {
            engine_debug!("Channel for job {} detached", request.job_id);
        }
        _ = drive(backend, connector, settings, &emitter) => {}
    }
}

async fn drive(
    backend: &dyn Backend,
    connector: &dyn PushConnector,
    settings: &ChannelSettings,
    emitter: &Emitter<'_>,
) {
    match push(connector, settings, emitter).await {
        PushOutcome::Finished => {}
        PushOutcome::FallBack => poll(backend, settings, emitter).await,
    }
}

enum PushOutcome {
    Finished,
    FallBack,
}

async fn push(
    connector: &dyn PushConnector,
    settings: &ChannelSettings,
    emitter: &Emitter<'_>,
) -> PushOutcome {
    let job_id = emitter.request.job_id.as_str();
    let mut events =
        match tokio::time::timeout(settings.watchdog, connector.connect(job_id)).await {
            Ok(Ok(events)) => events,
            Ok(Err(err)) => {
                engine_warn!("Push channel for job {job_id} failed to open: {err}");
                return PushOutcome::FallBack;
            }
            Err(_) => {
                engine_info!(
                    "Push channel for job {job_id} not open after {:?}, polling instead",
                    settings.watchdog
                );
                return PushOutcome::FallBack;
            }
        };
    emitter.emit(Transport::Push, ChannelEvent::Armed);

    while let Some(frame) = events.next().await {
        let event = match frame {
            Ok(event) => event,
            Err(err) => {
                engine_warn!("Push channel for job {job_id} dropped: {err}");
                return PushOutcome::FallBack;
            }
        };
        if event.job_id().is_some_and(|id| id != job_id) {
            continue;
        }
        let terminal = event.is_terminal();
        emitter.emit(Transport::Push, push_event(event));
        if terminal {
            return PushOutcome::Finished;
        }
    }

    engine_info!("Push channel for job {job_id} closed early, polling instead");
    PushOutcome::FallBack
}

fn push_event(event: PushEvent) -> ChannelEvent {
    match event {
        PushEvent::Progress {
            percentage,
            message,
            stage,
            ..
        } => ChannelEvent::Progress {
            percentage,
            message,
            stage,
        },
        PushEvent::Error { error, .. } => ChannelEvent::Failed { error },
        PushEvent::Completed { result, .. } => ChannelEvent::Completed { result },
    }
}

async fn poll(backend: &dyn Backend, settings: &ChannelSettings, emitter: &Emitter<'_>) {
    let job_id = emitter.request.job_id.as_str();
    emitter.emit(Transport::Poll, ChannelEvent::Armed);

    let mut attempts = 0;
    loop {
        let status = match backend.job_status(job_id).await {
            Ok(status) => status,
            Err(err) => {
                emitter.emit(Transport::Poll, ChannelEvent::Failed { error: err.message });
                return;
            }
        };
        attempts += 1;

        match status.state {
            RemoteJobState::Completed => {
                if let Some(value) = status.returnvalue.filter(|value| !value.is_null()) {
                    let event = match AnalysisResult::from_value(value) {
                        Ok(result) => ChannelEvent::Completed { result },
                        Err(err) => ChannelEvent::Failed {
                            error: format!("Invalid analysis result: {err}"),
                        },
                    };
                    emitter.emit(Transport::Poll, event);
                    return;
                }
            }
            RemoteJobState::Failed => {
                let error = status
                    .failed_reason
                    .unwrap_or_else(|| "Job failed".to_string());
                emitter.emit(Transport::Poll, ChannelEvent::Failed { error });
                return;
            }
            RemoteJobState::Active => {
                let percentage = status.progress.unwrap_or(0.0);
                emitter.emit(
                    Transport::Poll,
                    ChannelEvent::Progress {
                        percentage,
                        message: format!("Processing... {percentage}%"),
                        stage: None,
                    },
                );
            }
            RemoteJobState::Pending => {}
        }

        if attempts >= settings.max_poll_attempts {
            engine_warn!("Gave up polling job {job_id} after {attempts} attempts");
            emitter.emit(Transport::Poll, ChannelEvent::TimedOut);
            return;
        }
        tokio::time::sleep(settings.poll_delay(attempts)).await;
    }
}

struct Emitter<'a> {
    sink: &'a dyn ProgressSink,
    cancel: &'a CancellationToken,
    request: &'a ChannelRequest,
}

impl Emitter<'_> {
    fn emit(&self, transport: Transport, event: ChannelEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.sink.emit(EngineEvent::Channel(ChannelEnvelope {
            job_id: self.request.job_id.clone(),
            epoch: self.request.epoch,
            transport,
            event,
        }));
    }
}
