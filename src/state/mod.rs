//! State management module
//!
//! This module contains all session state structures and their management
//! logic, from the per-phase countdown up to the shared application state.

pub mod app_state;
pub mod question;
pub mod session;
pub mod timer;

// Re-export main types
pub use app_state::{AppState, SessionEvent};
pub use question::{QuestionPhase, QuestionState};
pub use session::{QuestionSpec, SessionState};
pub use timer::{ClockState, Countdown};

use thiserror::Error;

/// Anomalies the state machine absorbs as warnings.
///
/// None of these corrupt state: the operation that produced one is a no-op
/// and the caller decides whether to surface the message. Only `LockPoisoned`
/// indicates a real fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("question {id}: illegal {action} while {phase}")]
    IllegalTransition {
        id: u32,
        phase: QuestionPhase,
        action: &'static str,
    },
    #[error("unknown question id {0}")]
    UnknownQuestion(u32),
    #[error("question index {0} out of range")]
    IndexOutOfRange(usize),
    #[error("manual navigation is not available in exam mode")]
    ManualNavigationBlocked,
    #[error("no active exam session")]
    NotActive,
    #[error("invalid start: {0}")]
    InvalidStart(#[from] StartExamError),
    #[error("state lock poisoned")]
    LockPoisoned,
}

/// Rejections raised by `start_exam` before any state is touched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartExamError {
    #[error("question list is empty")]
    EmptyQuestionList,
    #[error("total duration must be positive")]
    NonPositiveDuration,
}
