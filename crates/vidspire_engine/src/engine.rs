use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use engine_logging::{engine_debug, engine_error, engine_warn};
use tokio_util::sync::CancellationToken;
use vidspire_core::{Epoch, Feature, IdeaRequest, JobId, SearchQuery};

use crate::backend::{BackendSettings, ChannelProgressSink, ProgressSink, ReqwestBackend};
use crate::push::WsConnector;
use crate::selector::{run_channel, ChannelRequest, ChannelSettings};
use crate::{ApiError, Backend, EngineEvent, PushConnector};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub backend: BackendSettings,
    pub socket_url: url::Url,
    pub channel: ChannelSettings,
    pub usage_refresh: Duration,
}

impl EngineConfig {
    pub fn new(api_url: url::Url, socket_url: url::Url) -> Self {
        Self {
            backend: BackendSettings::new(api_url),
            socket_url,
            channel: ChannelSettings::default(),
            usage_refresh: Duration::from_secs(30),
        }
    }
}

/// Floor for the usage watch; `tokio::time::interval` rejects a zero period.
const MIN_USAGE_REFRESH: Duration = Duration::from_millis(10);

/// The runtime thread has stopped and every queued event has been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("engine runtime stopped")]
pub struct EngineDisconnected;

enum EngineCommand {
    Submit {
        epoch: Epoch,
        video_url: String,
    },
    Attach {
        request: ChannelRequest,
        cancel: CancellationToken,
    },
    FetchJob {
        epoch: Epoch,
        job_id: JobId,
    },
    WatchUsage {
        feature: Feature,
        cancel: CancellationToken,
    },
    RefreshUsage {
        feature: Feature,
    },
    ValidateIdea {
        request: IdeaRequest,
    },
    Search {
        query: SearchQuery,
    },
    Shutdown,
}

struct Services {
    backend: Arc<dyn Backend>,
    connector: Arc<dyn PushConnector>,
    channel: ChannelSettings,
    usage_refresh: Duration,
}

/// Owns the IO runtime. Commands go in through the handle; results come back
/// as [`EngineEvent`]s read with [`EngineHandle::try_recv`] or
/// [`EngineHandle::recv_timeout`].
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
    channel: Mutex<Option<CancellationToken>>,
    usage_watch: Mutex<Option<CancellationToken>>,
}

impl EngineHandle {
    pub fn new(config: EngineConfig) -> Result<Self, ApiError> {
        let backend = ReqwestBackend::new(config.backend)?;
        let connector = WsConnector::new(config.socket_url)
            .map_err(|err| ApiError::new(crate::FailureKind::InvalidUrl, err.to_string()))?;
        Ok(Self::with_parts(
            Arc::new(backend),
            Arc::new(connector),
            config.channel,
            config.usage_refresh,
        ))
    }

    pub fn with_parts(
        backend: Arc<dyn Backend>,
        connector: Arc<dyn PushConnector>,
        channel: ChannelSettings,
        usage_refresh: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let services = Arc::new(Services {
            backend,
            connector,
            channel,
            usage_refresh,
        });

        thread::spawn(move || {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(err) => {
                    engine_error!("Failed to start engine runtime: {err}");
                    return;
                }
            };
            while let Ok(command) = cmd_rx.recv() {
                if matches!(command, EngineCommand::Shutdown) {
                    engine_debug!("Engine runtime shutting down");
                    break;
                }
                let services = services.clone();
                let event_tx = event_tx.clone();
                runtime.spawn(async move {
                    handle_command(&services, command, event_tx).await;
                });
            }
        });

        Self {
            cmd_tx,
            event_rx,
            channel: Mutex::new(None),
            usage_watch: Mutex::new(None),
        }
    }

    pub fn submit(&self, epoch: Epoch, video_url: impl Into<String>) {
        self.send(EngineCommand::Submit {
            epoch,
            video_url: video_url.into(),
        });
    }

    /// Attaches the live channel for a job, detaching any previous one first.
    pub fn attach(&self, epoch: Epoch, job_id: JobId, video_id: String) {
        let cancel = CancellationToken::new();
        replace_token(&self.channel, Some(cancel.clone()));
        self.send(EngineCommand::Attach {
            request: ChannelRequest {
                epoch,
                job_id,
                video_id,
            },
            cancel,
        });
    }

    /// Cancels the socket and any pending poll timer.
    pub fn detach(&self) {
        replace_token(&self.channel, None);
    }

    pub fn fetch_job(&self, epoch: Epoch, job_id: JobId) {
        self.send(EngineCommand::FetchJob { epoch, job_id });
    }

    /// Refreshes usage for `feature` now and then on every refresh interval.
    pub fn watch_usage(&self, feature: Feature) {
        let cancel = CancellationToken::new();
        replace_token(&self.usage_watch, Some(cancel.clone()));
        self.send(EngineCommand::WatchUsage { feature, cancel });
    }

    pub fn stop_usage_watch(&self) {
        replace_token(&self.usage_watch, None);
    }

    pub fn refresh_usage(&self, feature: Feature) {
        self.send(EngineCommand::RefreshUsage { feature });
    }

    pub fn validate_idea(&self, request: IdeaRequest) {
        self.send(EngineCommand::ValidateIdea { request });
    }

    pub fn search(&self, query: SearchQuery) {
        self.send(EngineCommand::Search { query });
    }

    /// Stops the runtime thread. In-flight work is dropped; events already
    /// queued can still be read before the handle reports disconnection.
    pub fn shutdown(&self) {
        self.detach();
        self.stop_usage_watch();
        self.send(EngineCommand::Shutdown);
    }

    pub fn try_recv(&self) -> Result<Option<EngineEvent>, EngineDisconnected> {
        match self.event_rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::TryRecvError::Empty) => Ok(None),
            Err(mpsc::TryRecvError::Disconnected) => Err(EngineDisconnected),
        }
    }

    /// Blocks for up to `timeout` waiting for the next event. `Ok(None)` means
    /// the wait timed out.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<EngineEvent>, EngineDisconnected> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(EngineDisconnected),
        }
    }

    fn send(&self, command: EngineCommand) {
        if self.cmd_tx.send(command).is_err() {
            engine_warn!("Engine runtime is gone; command dropped");
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.detach();
        self.stop_usage_watch();
    }
}

fn replace_token(slot: &Mutex<Option<CancellationToken>>, next: Option<CancellationToken>) {
    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(previous) = slot.take() {
        previous.cancel();
    }
    *slot = next;
}

async fn handle_command(
    services: &Services,
    command: EngineCommand,
    event_tx: mpsc::Sender<EngineEvent>,
) {
    let sink = ChannelProgressSink::new(event_tx);
    let backend = services.backend.as_ref();
    match command {
        EngineCommand::Submit { epoch, video_url } => {
            let result = backend.analyze(&video_url).await;
            if let Err(err) = &result {
                engine_warn!("Submission of {video_url} failed: {err}");
            }
            sink.emit(EngineEvent::Submitted { epoch, result });
        }
        EngineCommand::Attach { request, cancel } => {
            engine_debug!("Attaching channel for job {} (epoch {})", request.job_id, request.epoch);
            run_channel(
                backend,
                services.connector.as_ref(),
                &services.channel,
                request,
                &sink,
                cancel,
            )
            .await;
        }
        EngineCommand::FetchJob { epoch, job_id } => {
            let result = backend.job(&job_id).await;
            sink.emit(EngineEvent::JobLoaded {
                epoch,
                job_id,
                result,
            });
        }
        EngineCommand::WatchUsage { feature, cancel } => {
            watch_usage(backend, feature, services.usage_refresh, &sink, cancel).await;
        }
        EngineCommand::RefreshUsage { feature } => {
            let result = backend.usage(feature).await;
            sink.emit(EngineEvent::UsageRefreshed { feature, result });
        }
        EngineCommand::ValidateIdea { request } => {
            let result = backend.validate_idea(&request, &sink).await;
            sink.emit(EngineEvent::IdeaFinished { result });
        }
        EngineCommand::Search { query } => {
            let result = backend.search(&query).await;
            sink.emit(EngineEvent::SearchCompleted { result });
        }
        EngineCommand::Shutdown => {}
    }
}

async fn watch_usage(
    backend: &dyn Backend,
    feature: Feature,
    every: Duration,
    sink: &dyn ProgressSink,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(every.max(MIN_USAGE_REFRESH));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = backend.usage(feature) => result,
        };
        if let Err(err) = &result {
            engine_warn!("Usage refresh for {feature} failed: {err}");
        }
        if !cancel.is_cancelled() {
            sink.emit(EngineEvent::UsageRefreshed { feature, result });
        }
    }
}
