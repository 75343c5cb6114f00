//! Persisted preferences and the recovery record
//!
//! The state machine never touches durable storage directly; it goes through
//! the `PreferenceStore` gateway so tests run against an in-memory impl.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::recovery::RecoveryInfo;
use crate::state::{QuestionSpec, QuestionState};

/// How a session paces itself.
///
/// Persisted independently of any single session; changing it mid-session
/// only affects the next `start_exam`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExamMode {
    /// Learner controls pacing; timeouts still apply but nothing auto-advances
    Normal,
    /// Strict auto-flow: submit or time-out advances to the next question
    Exam,
}

impl Default for ExamMode {
    fn default() -> Self {
        ExamMode::Normal
    }
}

impl ExamMode {
    pub fn is_auto_flow(self) -> bool {
        matches!(self, ExamMode::Exam)
    }
}

/// Everything the store persists for an active session.
///
/// `info` carries the durable facts recovery is computed from; the rest is
/// best-effort replay material that degrades gracefully when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub info: RecoveryInfo,
    pub auto_flow: bool,
    pub questions: Vec<QuestionSpec>,
    #[serde(default)]
    pub question_states: HashMap<u32, QuestionState>,
    #[serde(default)]
    pub current_question_index: usize,
    #[serde(default)]
    pub current_part_index: usize,
}

/// Gateway to whatever durable medium the host provides
pub trait PreferenceStore: Send + Sync {
    fn load_mode(&self) -> ExamMode;
    fn save_mode(&self, mode: ExamMode);
    fn load_recovery(&self) -> Option<RecoveryRecord>;
    fn save_recovery(&self, record: &RecoveryRecord);
    fn clear_recovery(&self);
}

/// JSON files under the configured data directory
#[derive(Debug, Clone)]
pub struct FilePreferenceStore {
    dir: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn mode_path(&self) -> PathBuf {
        self.dir.join("mode.json")
    }

    fn recovery_path(&self) -> PathBuf {
        self.dir.join("recovery.json")
    }

    fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
        let raw = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), "discarding unreadable preference file: {}", e);
                None
            }
        }
    }

    fn write_json<T: Serialize>(path: &Path, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(raw) => {
                if let Err(e) = fs::write(path, raw) {
                    warn!(path = %path.display(), "failed to persist preference file: {}", e);
                }
            }
            Err(e) => warn!("failed to serialize preference data: {}", e),
        }
    }
}

impl PreferenceStore for FilePreferenceStore {
    fn load_mode(&self) -> ExamMode {
        Self::read_json(&self.mode_path()).unwrap_or_default()
    }

    fn save_mode(&self, mode: ExamMode) {
        Self::write_json(&self.mode_path(), &mode);
    }

    fn load_recovery(&self) -> Option<RecoveryRecord> {
        Self::read_json(&self.recovery_path())
    }

    fn save_recovery(&self, record: &RecoveryRecord) {
        Self::write_json(&self.recovery_path(), record);
    }

    fn clear_recovery(&self) {
        let path = self.recovery_path();
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), "failed to clear recovery record: {}", e);
            }
        }
    }
}

/// In-memory store for tests and embedded use
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    mode: Mutex<ExamMode>,
    recovery: Mutex<Option<RecoveryRecord>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load_mode(&self) -> ExamMode {
        self.mode.lock().map(|m| *m).unwrap_or_default()
    }

    fn save_mode(&self, mode: ExamMode) {
        if let Ok(mut slot) = self.mode.lock() {
            *slot = mode;
        }
    }

    fn load_recovery(&self) -> Option<RecoveryRecord> {
        self.recovery.lock().ok().and_then(|r| r.clone())
    }

    fn save_recovery(&self, record: &RecoveryRecord) {
        if let Ok(mut slot) = self.recovery.lock() {
            *slot = Some(record.clone());
        }
    }

    fn clear_recovery(&self) {
        if let Ok(mut slot) = self.recovery.lock() {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn record() -> RecoveryRecord {
        RecoveryRecord {
            info: RecoveryInfo {
                test_id: "t1".to_string(),
                started_at: Utc::now(),
                test_end_time: None,
                total_duration: 10,
            },
            auto_flow: true,
            questions: vec![QuestionSpec {
                id: 1,
                preparation_time: 30,
                recording_time: 45,
            }],
            question_states: HashMap::new(),
            current_question_index: 0,
            current_part_index: 0,
        }
    }

    #[test]
    fn mode_round_trips_through_files() {
        let dir = tempdir().unwrap();
        let store = FilePreferenceStore::new(dir.path()).unwrap();
        assert_eq!(store.load_mode(), ExamMode::Normal);
        store.save_mode(ExamMode::Exam);
        assert_eq!(store.load_mode(), ExamMode::Exam);

        // a second store over the same directory sees the saved mode
        let reopened = FilePreferenceStore::new(dir.path()).unwrap();
        assert_eq!(reopened.load_mode(), ExamMode::Exam);
    }

    #[test]
    fn recovery_record_round_trips_and_clears() {
        let dir = tempdir().unwrap();
        let store = FilePreferenceStore::new(dir.path()).unwrap();
        assert!(store.load_recovery().is_none());

        store.save_recovery(&record());
        let loaded = store.load_recovery().unwrap();
        assert_eq!(loaded.info.test_id, "t1");
        assert_eq!(loaded.questions.len(), 1);
        assert!(loaded.auto_flow);

        store.clear_recovery();
        assert!(store.load_recovery().is_none());
    }

    #[test]
    fn corrupt_recovery_file_degrades_to_none() {
        let dir = tempdir().unwrap();
        let store = FilePreferenceStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("recovery.json"), "{not json").unwrap();
        assert!(store.load_recovery().is_none());
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryPreferenceStore::new();
        assert_eq!(store.load_mode(), ExamMode::Normal);
        store.save_mode(ExamMode::Exam);
        assert_eq!(store.load_mode(), ExamMode::Exam);
        store.save_recovery(&record());
        assert!(store.load_recovery().is_some());
        store.clear_recovery();
        assert!(store.load_recovery().is_none());
    }
}
