use std::sync::Once;

use pretty_assertions::assert_eq;
use serde_json::json;
use vidspire_core::{
    job_id_from_link, update, AppState, Effect, JobRecord, JobRepresentation, JobStatus, Ledger,
    Msg, RemoteJob, ResumeError, UiState,
};

const NOW: i64 = 1_700_000_000_000;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

fn request(state: AppState, job_id: &str) -> (AppState, Vec<Effect>) {
    update(
        state,
        Msg::ResumeRequested {
            job_id: job_id.to_string(),
        },
    )
}

fn loaded(state: AppState, epoch: u64, job_id: &str, body: serde_json::Value) -> (AppState, Vec<Effect>) {
    let representation = JobRepresentation::classify(&body).expect("classified");
    update(
        state,
        Msg::ResumeLoaded {
            epoch,
            job_id: job_id.to_string(),
            representation,
            now: NOW,
        },
    )
}

#[test]
fn resume_request_fetches_job_with_loading_state() {
    init_logging();
    let (state, effects) = request(AppState::new(), "J9");

    assert_eq!(
        effects,
        vec![Effect::FetchJob {
            epoch: 1,
            job_id: "J9".to_string(),
        }]
    );
    assert_eq!(
        state.ui(),
        &UiState::Processing {
            progress: 50.0,
            message: "Loading analysis...".to_string(),
        }
    );
}

#[test]
fn error_representation_is_terminal_and_not_retryable() {
    init_logging();
    let (state, _) = request(AppState::new(), "J9");
    let (state, effects) = loaded(
        state,
        1,
        "J9",
        json!({"success": true, "data": {"status": "failed", "error": "quota exceeded"}}),
    );

    assert!(effects.is_empty());
    assert_eq!(
        state.ui(),
        &UiState::Failed {
            error: "quota exceeded".to_string(),
            retryable: false,
        }
    );
    assert!(state.ledger().is_empty());
}

#[test]
fn completed_result_is_shown_directly() {
    init_logging();
    let (state, _) = request(AppState::new(), "J9");
    let (state, effects) = loaded(
        state,
        1,
        "J9",
        json!({"success": true, "data": {
            "status": "completed",
            "videoId": "X",
            "summary": {
                "positive": {"count": 1, "percentage": 100.0},
                "negative": {"count": 0, "percentage": 0.0},
                "neutral": {"count": 0, "percentage": 0.0}
            }
        }}),
    );

    assert!(effects.is_empty());
    match state.ui() {
        UiState::Completed { result } => {
            assert_eq!(result.video_id.as_deref(), Some("X"));
        }
        other => panic!("expected completed, got {other:?}"),
    }
}

#[test]
fn completed_status_moves_tracked_job() {
    init_logging();
    let ledger = Ledger::from_parts(
        vec![JobRecord::new_active("J9", "X", "https://youtu.be/X", NOW)],
        Vec::new(),
        Vec::new(),
    );
    let (state, _) = update(AppState::new(), Msg::LedgerRestored(ledger));
    let (state, _) = request(state, "J9");
    let (state, effects) = loaded(
        state,
        1,
        "J9",
        json!({"success": true, "data": {
            "state": "completed",
            "returnvalue": {"videoId": "X", "totalProcessed": 4}
        }}),
    );

    assert_eq!(effects, vec![Effect::PersistLedger]);
    assert!(matches!(state.ui(), UiState::Completed { .. }));
    assert_eq!(state.ledger().completed()[0].status, JobStatus::Completed);
    assert!(state.ledger().active().is_empty());
}

#[test]
fn failed_status_uses_reason() {
    init_logging();
    let (state, _) = request(AppState::new(), "J9");
    let (state, _) = loaded(
        state,
        1,
        "J9",
        json!({"success": true, "data": {"state": "failed", "failedReason": "Video unavailable"}}),
    );

    assert_eq!(
        state.ui(),
        &UiState::Failed {
            error: "Video unavailable".to_string(),
            retryable: false,
        }
    );
}

#[test]
fn active_status_reattaches_with_history_video() {
    init_logging();
    let mut ledger = Ledger::new();
    ledger.add_history("https://youtube.com/watch?v=H", "H", "J9", NOW);
    let (state, _) = update(AppState::new(), Msg::LedgerRestored(ledger));
    let (state, _) = request(state, "J9");
    let (state, effects) = loaded(
        state,
        1,
        "J9",
        json!({"success": true, "data": {"state": "active", "progress": 30, "videoId": "other"}}),
    );

    assert_eq!(
        effects,
        vec![Effect::AttachChannel {
            epoch: 1,
            job_id: "J9".to_string(),
            video_id: "H".to_string(),
        }]
    );
    assert_eq!(state.input(), "https://youtube.com/watch?v=H");
    assert_eq!(
        state.ui(),
        &UiState::Processing {
            progress: 30.0,
            message: "Resuming analysis...".to_string(),
        }
    );
    assert_eq!(state.view().current_job.as_deref(), Some("J9"));
}

#[test]
fn active_status_without_history_uses_payload_video() {
    init_logging();
    let (state, _) = request(AppState::new(), "J9");
    let (_state, effects) = loaded(
        state,
        1,
        "J9",
        json!({"success": true, "data": {"state": "active", "progress": {"step": 2}, "videoId": "P"}}),
    );

    assert_eq!(
        effects,
        vec![Effect::AttachChannel {
            epoch: 1,
            job_id: "J9".to_string(),
            video_id: "P".to_string(),
        }]
    );
}

#[test]
fn load_for_superseded_request_is_ignored() {
    init_logging();
    let (state, _) = request(AppState::new(), "J1");
    let (state, effects) = request(state, "J2");
    assert_eq!(
        effects,
        vec![
            Effect::DetachChannel,
            Effect::FetchJob {
                epoch: 2,
                job_id: "J2".to_string(),
            },
        ]
    );

    let (state, effects) = loaded(
        state,
        1,
        "J1",
        json!({"success": true, "data": {"state": "failed"}}),
    );
    assert!(effects.is_empty());
    assert!(state.ui().is_processing());
}

#[test]
fn fetch_failure_is_terminal() {
    init_logging();
    let (state, _) = request(AppState::new(), "J9");
    let (state, _) = update(
        state,
        Msg::ResumeFailed {
            epoch: 1,
            error: "Unknown job state: waiting".to_string(),
        },
    );

    assert_eq!(
        state.ui(),
        &UiState::Failed {
            error: "Unknown job state: waiting".to_string(),
            retryable: false,
        }
    );
}

#[test]
fn blank_job_id_fails_immediately() {
    init_logging();
    let (state, effects) = request(AppState::new(), "  ");

    assert!(effects.is_empty());
    assert!(matches!(state.ui(), UiState::Failed { retryable: false, .. }));
}

#[test]
fn classify_rejects_unknown_shapes() {
    let waiting = json!({"success": true, "data": {"state": "waiting"}});
    assert_eq!(
        JobRepresentation::classify(&waiting),
        Err(ResumeError::UnrecognizedShape("waiting".to_string()))
    );

    let bare = json!({"success": true, "data": {"videoId": "X"}});
    assert!(matches!(
        JobRepresentation::classify(&bare),
        Err(ResumeError::UnrecognizedShape(_))
    ));

    let missing = json!({"success": true});
    assert!(JobRepresentation::classify(&missing).is_err());

    let completed_without_result = json!({"success": true, "data": {"state": "completed"}});
    assert!(JobRepresentation::classify(&completed_without_result).is_err());
}

#[test]
fn classify_maps_unsuccessful_body_to_error() {
    let body = json!({"success": false, "message": "Job not found"});
    assert_eq!(
        JobRepresentation::classify(&body),
        Ok(JobRepresentation::Error {
            message: "Job not found".to_string(),
        })
    );

    let silent = json!({"success": false});
    assert_eq!(
        JobRepresentation::classify(&silent),
        Ok(JobRepresentation::Error {
            message: "Failed to fetch job data".to_string(),
        })
    );
}

#[test]
fn classify_ignores_non_numeric_progress() {
    let body = json!({"success": true, "data": {"state": "active", "progress": {"step": 1}}});
    assert_eq!(
        JobRepresentation::classify(&body),
        Ok(JobRepresentation::JobStatus(RemoteJob::Active {
            progress: None,
            video_id: None,
        }))
    );
}

#[test]
fn job_id_is_read_from_shared_links() {
    assert_eq!(
        job_id_from_link("https://vidspire.app/comment-analyzer?jobId=abc123").as_deref(),
        Some("abc123")
    );
    assert_eq!(
        job_id_from_link("/comment-analyzer?tab=1&jobId=J-7").as_deref(),
        Some("J-7")
    );
    assert_eq!(job_id_from_link("  42  ").as_deref(), Some("42"));
    assert_eq!(job_id_from_link("https://vidspire.app/comment-analyzer"), None);
    assert_eq!(job_id_from_link(""), None);
}
