//! On-disk client state: the job ledger and one usage snapshot per feature,
//! each as a JSON file in the state directory.
//!
//! Loading is forgiving. A missing file is an empty collection; an unreadable
//! or corrupt one is logged and treated the same way.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use engine_logging::{engine_debug, engine_error, engine_warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use vidspire_core::{Feature, HistoryEntry, JobRecord, Ledger, RateLimitSnapshot};
use vidspire_engine::AtomicFileWriter;

pub const ACTIVE_JOBS_FILENAME: &str = "active_jobs.json";
pub const COMPLETED_JOBS_FILENAME: &str = "completed_jobs.json";
pub const HISTORY_FILENAME: &str = "history.json";

pub fn rate_limit_filename(feature: Feature) -> String {
    format!("rate_limit_{}.json", feature.slug().replace('-', "_"))
}

#[derive(Debug, Clone)]
pub struct Store {
    writer: AtomicFileWriter,
}

impl Store {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            writer: AtomicFileWriter::new(dir),
        }
    }

    pub fn dir(&self) -> &Path {
        self.writer.dir()
    }

    pub fn load_ledger(&self) -> Ledger {
        let active: Vec<JobRecord> = self.read_json(ACTIVE_JOBS_FILENAME).unwrap_or_default();
        let completed: Vec<JobRecord> =
            self.read_json(COMPLETED_JOBS_FILENAME).unwrap_or_default();
        let history: Vec<HistoryEntry> = self.read_json(HISTORY_FILENAME).unwrap_or_default();
        engine_debug!(
            "Loaded ledger: {} active, {} completed, {} history",
            active.len(),
            completed.len(),
            history.len()
        );
        Ledger::from_parts(active, completed, history)
    }

    pub fn save_ledger(&self, ledger: &Ledger) {
        self.write_json(ACTIVE_JOBS_FILENAME, ledger.active());
        self.write_json(COMPLETED_JOBS_FILENAME, ledger.completed());
        self.write_json(HISTORY_FILENAME, ledger.history());
    }

    pub fn load_rate_limit(&self, feature: Feature) -> Option<RateLimitSnapshot> {
        self.read_json(&rate_limit_filename(feature))
    }

    pub fn save_rate_limit(&self, feature: Feature, snapshot: &RateLimitSnapshot) {
        self.write_json(&rate_limit_filename(feature), snapshot);
    }

    fn read_json<T: DeserializeOwned>(&self, filename: &str) -> Option<T> {
        let path = self.dir().join(filename);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                engine_warn!("Failed to read {:?}: {}", path, err);
                return None;
            }
        };
        match serde_json::from_slice(&content) {
            Ok(value) => Some(value),
            Err(err) => {
                engine_warn!("Ignoring corrupt state file {:?}: {}", path, err);
                None
            }
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, filename: &str, value: &T) {
        let content = match serde_json::to_vec_pretty(value) {
            Ok(content) => content,
            Err(err) => {
                engine_error!("Failed to serialize {}: {}", filename, err);
                return;
            }
        };
        if let Err(err) = self.writer.write(filename, &content) {
            engine_error!("Failed to write {} to {:?}: {}", filename, self.dir(), err);
        }
    }
}
