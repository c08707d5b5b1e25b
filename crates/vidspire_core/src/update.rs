use crate::state::{Pending, ANALYZER_FEATURE};
use crate::{
    AppState, Effect, JobRecord, JobRepresentation, Msg, RemoteJob, UiState,
};

pub const EMPTY_INPUT_MESSAGE: &str = "Please enter a YouTube URL";

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::Mounted { now } => {
            state.ledger_mut().cleanup(now);
            state.mark_dirty();
            vec![
                Effect::PersistLedger,
                Effect::WatchUsage {
                    feature: ANALYZER_FEATURE,
                },
            ]
        }
        Msg::Unmounted => {
            state.release();
            vec![Effect::DetachChannel, Effect::StopUsageWatch]
        }
        Msg::LedgerRestored(ledger) => {
            state.restore_ledger(ledger);
            Vec::new()
        }
        Msg::RateLimitRestored(snapshot) => {
            *state.rate_limit_mut() = snapshot;
            state.mark_dirty();
            Vec::new()
        }
        Msg::InputChanged(text) => {
            state.set_input(text);
            Vec::new()
        }
        Msg::Submitted { now } => submit(&mut state, now),
        Msg::SubmitAccepted {
            epoch,
            job_id,
            video_id,
            rate_limit,
            now,
        } => {
            let mut effects = Vec::new();
            if state.rate_limit_mut().apply_headers(&rate_limit, now) {
                state.mark_dirty();
                effects.push(Effect::PersistRateLimit {
                    feature: ANALYZER_FEATURE,
                });
            }
            let video_url = match state.pending() {
                Some(Pending::Submission {
                    epoch: pending,
                    video_url,
                }) if *pending == epoch => Some(video_url.clone()),
                _ => None,
            };
            let Some(video_url) = video_url else {
                return (state, effects);
            };
            state.set_pending(None);

            let ledger = state.ledger_mut();
            ledger.add_history(video_url.clone(), video_id.clone(), job_id.clone(), now);
            ledger.add_active(JobRecord::new_active(
                job_id.clone(),
                video_id.clone(),
                video_url,
                now,
            ));
            state.attach(job_id.clone(), epoch);
            state.mark_dirty();

            effects.push(Effect::PersistLedger);
            effects.push(Effect::AttachChannel {
                epoch,
                job_id,
                video_id,
            });
            effects
        }
        Msg::SubmitRejected {
            epoch,
            error,
            retryable,
            rate_limit,
            now,
        } => {
            let mut effects = Vec::new();
            if state.rate_limit_mut().apply_headers(&rate_limit, now) {
                state.mark_dirty();
                effects.push(Effect::PersistRateLimit {
                    feature: ANALYZER_FEATURE,
                });
            }
            if matches!(state.pending(), Some(Pending::Submission { epoch: pending, .. }) if *pending == epoch)
            {
                state.set_pending(None);
                state.set_ui(UiState::Failed { error, retryable });
            }
            effects
        }
        Msg::Channel { envelope, now } => state.apply_channel(envelope, now),
        Msg::ResumeRequested { job_id } => {
            let mut effects = Vec::new();
            if state.release() {
                effects.push(Effect::DetachChannel);
            }
            if job_id.trim().is_empty() {
                state.set_ui(UiState::Failed {
                    error: "Missing job id".to_string(),
                    retryable: false,
                });
                return (state, effects);
            }
            let epoch = state.next_epoch();
            state.set_pending(Some(Pending::Resume {
                epoch,
                job_id: job_id.clone(),
            }));
            state.set_ui(UiState::Processing {
                progress: 50.0,
                message: "Loading analysis...".to_string(),
            });
            effects.push(Effect::FetchJob { epoch, job_id });
            effects
        }
        Msg::ResumeLoaded {
            epoch,
            job_id,
            representation,
            now,
        } => {
            if !is_pending_resume(&state, epoch, &job_id) {
                return (state, Vec::new());
            }
            state.set_pending(None);
            resume(&mut state, epoch, job_id, representation, now)
        }
        Msg::ResumeFailed { epoch, error } => {
            let pending = matches!(state.pending(), Some(Pending::Resume { epoch: pending, .. }) if *pending == epoch);
            if pending {
                state.set_pending(None);
                state.set_ui(UiState::Failed {
                    error,
                    retryable: false,
                });
            }
            Vec::new()
        }
        Msg::UsageRefreshed(snapshot) => {
            if *state.rate_limit() == snapshot {
                Vec::new()
            } else {
                *state.rate_limit_mut() = snapshot;
                state.mark_dirty();
                vec![Effect::PersistRateLimit {
                    feature: ANALYZER_FEATURE,
                }]
            }
        }
        Msg::ResetClicked => {
            let effects = if state.release() {
                vec![Effect::DetachChannel]
            } else {
                Vec::new()
            };
            state.set_input(String::new());
            state.set_ui(UiState::Idle);
            effects
        }
        Msg::Tick => Vec::new(),
    };

    (state, effects)
}

fn submit(state: &mut AppState, now: crate::Millis) -> Vec<Effect> {
    // A finished analysis stays on screen until the user resets.
    if matches!(state.ui(), UiState::Completed { .. }) {
        return Vec::new();
    }

    let video_url = state.input().trim().to_string();
    if video_url.is_empty() {
        state.set_ui(UiState::Failed {
            error: EMPTY_INPUT_MESSAGE.to_string(),
            retryable: false,
        });
        return Vec::new();
    }
    if state.rate_limit().is_limited_at(now) {
        let error = state.rate_limit().limit_message(now);
        state.set_ui(UiState::Failed {
            error,
            retryable: false,
        });
        return Vec::new();
    }

    let mut effects = Vec::with_capacity(2);
    if state.release() {
        effects.push(Effect::DetachChannel);
    }
    let epoch = state.next_epoch();
    state.set_pending(Some(Pending::Submission {
        epoch,
        video_url: video_url.clone(),
    }));
    state.set_ui(UiState::Processing {
        progress: 0.0,
        message: "Initializing Analysis...".to_string(),
    });
    effects.push(Effect::SubmitJob { epoch, video_url });
    effects
}

fn is_pending_resume(state: &AppState, epoch: crate::Epoch, job_id: &str) -> bool {
    matches!(
        state.pending(),
        Some(Pending::Resume { epoch: pending, job_id: pending_job })
            if *pending == epoch && pending_job == job_id
    )
}

fn resume(
    state: &mut AppState,
    epoch: crate::Epoch,
    job_id: crate::JobId,
    representation: JobRepresentation,
    now: crate::Millis,
) -> Vec<Effect> {
    match representation {
        JobRepresentation::CompletedResult(result)
        | JobRepresentation::JobStatus(RemoteJob::Completed { result }) => {
            let moved = state
                .ledger_mut()
                .move_to_completed(&job_id, Some(result.clone()), now);
            state.set_ui(UiState::Completed { result });
            if moved {
                vec![Effect::PersistLedger]
            } else {
                Vec::new()
            }
        }
        JobRepresentation::JobStatus(RemoteJob::Failed { reason }) => {
            state.set_ui(UiState::Failed {
                error: reason.unwrap_or_else(|| "Analysis failed".to_string()),
                retryable: false,
            });
            Vec::new()
        }
        JobRepresentation::JobStatus(RemoteJob::Active { progress, video_id }) => {
            let history = state.ledger().find_history(&job_id).cloned();
            let video_id = history
                .as_ref()
                .map(|entry| entry.video_id.clone())
                .or(video_id)
                .unwrap_or_default();
            if let Some(entry) = history {
                state.set_input(entry.video_url);
            }
            state.attach(job_id.clone(), epoch);
            state.set_ui(UiState::Processing {
                progress: progress.unwrap_or(0.0),
                message: "Resuming analysis...".to_string(),
            });
            vec![Effect::AttachChannel {
                epoch,
                job_id,
                video_id,
            }]
        }
        JobRepresentation::Error { message } => {
            state.set_ui(UiState::Failed {
                error: message,
                retryable: false,
            });
            Vec::new()
        }
    }
}
