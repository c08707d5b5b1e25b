use std::fs;

use pretty_assertions::assert_eq;
use vidspire_app::persistence::{
    rate_limit_filename, Store, ACTIVE_JOBS_FILENAME, COMPLETED_JOBS_FILENAME, HISTORY_FILENAME,
};
use vidspire_core::{Feature, JobRecord, Ledger, RateLimitSnapshot};

const NOW: i64 = 1_700_000_000_000;

#[test]
fn empty_dir_loads_empty_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path().to_path_buf());

    assert!(store.load_ledger().is_empty());
    assert_eq!(store.load_rate_limit(Feature::CommentAnalyzer), None);
}

#[test]
fn ledger_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path().to_path_buf());

    let mut ledger = Ledger::new();
    ledger.add_active(JobRecord::new_active("J1", "X", "https://youtu.be/X", NOW));
    ledger.add_active(JobRecord::new_active("J2", "Y", "https://youtu.be/Y", NOW + 1));
    ledger.add_history("https://youtu.be/X", "X", "J1", NOW);
    ledger.mark_failed("J2", "boom", NOW + 2);
    store.save_ledger(&ledger);

    for name in [ACTIVE_JOBS_FILENAME, COMPLETED_JOBS_FILENAME, HISTORY_FILENAME] {
        assert!(dir.path().join(name).exists(), "{name} missing");
    }

    let reopened = Store::new(dir.path().to_path_buf());
    assert_eq!(reopened.load_ledger(), ledger);
}

#[test]
fn corrupt_file_is_ignored_and_others_still_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path().to_path_buf());

    let mut ledger = Ledger::new();
    ledger.add_history("https://youtu.be/X", "X", "J1", NOW);
    store.save_ledger(&ledger);
    fs::write(dir.path().join(ACTIVE_JOBS_FILENAME), "{ not json").unwrap();

    let loaded = store.load_ledger();
    assert!(loaded.active().is_empty());
    assert_eq!(loaded.history().len(), 1);
}

#[test]
fn rate_limit_snapshots_are_kept_per_feature() {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::new(dir.path().to_path_buf());
    let exhausted = RateLimitSnapshot {
        remaining: 0,
        limit: 2,
        reset_in: Some(3600),
        is_exhausted: true,
        observed_at: NOW,
    };

    store.save_rate_limit(Feature::IdeaValidator, &exhausted);

    assert_eq!(
        rate_limit_filename(Feature::IdeaValidator),
        "rate_limit_idea_validator.json"
    );
    assert_eq!(store.load_rate_limit(Feature::IdeaValidator), Some(exhausted));
    assert_eq!(store.load_rate_limit(Feature::ViralSearch), None);
}
