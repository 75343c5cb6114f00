//! Viva Session - A state-managed HTTP server for timed spoken-exam sessions
//!
//! This library implements the exam session state machine: per-question
//! preparation/recording phases, per-question and global countdown timers,
//! self-paced and strict auto-advancing modes, and mid-session recovery from
//! a persisted start time or a server-issued deadline.

pub mod api;
pub mod config;
pub mod prefs;
pub mod recovery;
pub mod state;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use api::create_router;
pub use config::Config;
pub use prefs::{ExamMode, FilePreferenceStore, MemoryPreferenceStore, PreferenceStore};
pub use recovery::RecoveryInfo;
pub use state::{AppState, QuestionPhase, QuestionSpec, SessionState};
pub use utils::signals::shutdown_signal;
