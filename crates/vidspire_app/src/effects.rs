use engine_logging::{engine_debug, engine_info};
use vidspire_core::{AppState, Effect, Millis, Msg};
use vidspire_engine::{EngineEvent, EngineHandle};

use crate::persistence::Store;

/// Carries out the effects `update` asks for: IO goes to the engine, state
/// writes go to the store.
pub struct EffectRunner {
    engine: EngineHandle,
    store: Store,
}

impl EffectRunner {
    pub fn new(engine: EngineHandle, store: Store) -> Self {
        Self { engine, store }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn run(&self, effects: Vec<Effect>, state: &AppState) {
        for effect in effects {
            match effect {
                Effect::SubmitJob { epoch, video_url } => {
                    engine_info!("Submitting {} (epoch {})", video_url, epoch);
                    self.engine.submit(epoch, video_url);
                }
                Effect::AttachChannel {
                    epoch,
                    job_id,
                    video_id,
                } => {
                    engine_debug!("Attach job {} video {:?} (epoch {})", job_id, video_id, epoch);
                    self.engine.attach(epoch, job_id, video_id);
                }
                Effect::DetachChannel => self.engine.detach(),
                Effect::FetchJob { epoch, job_id } => self.engine.fetch_job(epoch, job_id),
                Effect::PersistLedger => self.store.save_ledger(state.ledger()),
                Effect::PersistRateLimit { feature } => {
                    self.store.save_rate_limit(feature, state.rate_limit());
                }
                Effect::WatchUsage { feature } => self.engine.watch_usage(feature),
                Effect::StopUsageWatch => self.engine.stop_usage_watch(),
            }
        }
    }
}

/// Maps an engine event of the analyzer session to its message. Events that
/// belong to the other tools map to `None`.
pub fn analyzer_msg(event: EngineEvent, now: Millis) -> Option<Msg> {
    match event {
        EngineEvent::Submitted {
            epoch,
            result: Ok(response),
        } => Some(Msg::SubmitAccepted {
            epoch,
            job_id: response.data.job_id,
            video_id: response.data.video_id,
            rate_limit: response.rate_limit,
            now,
        }),
        EngineEvent::Submitted {
            epoch,
            result: Err(err),
        } => Some(Msg::SubmitRejected {
            epoch,
            retryable: err.is_retryable(),
            error: err.message,
            rate_limit: err.rate_limit,
            now,
        }),
        EngineEvent::Channel(envelope) => Some(Msg::Channel { envelope, now }),
        EngineEvent::JobLoaded {
            epoch,
            job_id,
            result: Ok(representation),
        } => Some(Msg::ResumeLoaded {
            epoch,
            job_id,
            representation,
            now,
        }),
        EngineEvent::JobLoaded {
            epoch,
            result: Err(err),
            ..
        } => Some(Msg::ResumeFailed {
            epoch,
            error: err.message,
        }),
        EngineEvent::UsageRefreshed {
            result: Ok(snapshot),
            ..
        } => Some(Msg::UsageRefreshed(snapshot)),
        EngineEvent::UsageRefreshed { result: Err(_), .. }
        | EngineEvent::Idea(_)
        | EngineEvent::IdeaFinished { .. }
        | EngineEvent::SearchCompleted { .. } => None,
    }
}
