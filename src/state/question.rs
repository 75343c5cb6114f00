//! Per-question phase machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{timer::Countdown, SessionError};

/// Lifecycle phase of a single question within a session.
///
/// `Idle` is initial, `Completed` is terminal; a question cannot be reopened
/// in the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionPhase {
    Idle,
    Preparation,
    Recording,
    Submitted,
    Completed,
}

impl std::fmt::Display for QuestionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            QuestionPhase::Idle => "idle",
            QuestionPhase::Preparation => "preparation",
            QuestionPhase::Recording => "recording",
            QuestionPhase::Submitted => "submitted",
            QuestionPhase::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Which phase countdown expired on a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTimeout {
    Preparation,
    Recording,
}

/// State of one question in the active test.
///
/// Phase budgets are fixed at construction and only tick down while the
/// matching phase is active. `submitted_at` is stamped exactly once, on the
/// transition into `Submitted`, and duplicate submissions never overwrite it
/// or the recorded `has_audio` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionState {
    pub id: u32,
    pub phase: QuestionPhase,
    preparation: Countdown,
    recording: Countdown,
    pub has_audio: bool,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl QuestionState {
    /// Create an idle question with full phase budgets in seconds
    pub fn new(id: u32, preparation_seconds: u64, recording_seconds: u64) -> Self {
        Self {
            id,
            phase: QuestionPhase::Idle,
            preparation: Countdown::new(preparation_seconds),
            recording: Countdown::new(recording_seconds),
            has_audio: false,
            submitted_at: None,
        }
    }

    pub fn preparation_time_left(&self) -> u64 {
        self.preparation.remaining()
    }

    pub fn recording_time_left(&self) -> u64 {
        self.recording.remaining()
    }

    /// Whether this question has been committed past editing
    pub fn is_settled(&self) -> bool {
        matches!(
            self.phase,
            QuestionPhase::Submitted | QuestionPhase::Completed
        )
    }

    /// `idle -> preparation`: the orchestrator selected this question
    pub fn activate(&mut self) -> Result<(), SessionError> {
        match self.phase {
            QuestionPhase::Idle => {
                self.phase = QuestionPhase::Preparation;
                Ok(())
            }
            phase => Err(SessionError::IllegalTransition {
                id: self.id,
                phase,
                action: "activate",
            }),
        }
    }

    /// `preparation -> recording`: preparation expired or the user skipped it
    pub fn start_recording(&mut self) -> Result<(), SessionError> {
        match self.phase {
            QuestionPhase::Preparation => {
                self.phase = QuestionPhase::Recording;
                Ok(())
            }
            phase => Err(SessionError::IllegalTransition {
                id: self.id,
                phase,
                action: "start_recording",
            }),
        }
    }

    /// Mark that audio capture produced output for this question.
    ///
    /// Only meaningful while recording; a timeout submission then carries the
    /// right `has_audio` without waiting on the capture collaborator.
    pub fn note_audio(&mut self) -> Result<(), SessionError> {
        match self.phase {
            QuestionPhase::Recording => {
                self.has_audio = true;
                Ok(())
            }
            phase => Err(SessionError::IllegalTransition {
                id: self.id,
                phase,
                action: "note_audio",
            }),
        }
    }

    /// `recording -> submitted`: recording expired, the user stopped, or the
    /// session clock forced the submission.
    ///
    /// Returns `true` when the transition happened on this call. A repeat
    /// call on an already-settled question is an idempotent no-op returning
    /// `false`; the first call's `has_audio` and timestamp win.
    pub fn submit(&mut self, has_audio: bool, now: DateTime<Utc>) -> Result<bool, SessionError> {
        match self.phase {
            QuestionPhase::Recording => {
                self.phase = QuestionPhase::Submitted;
                self.has_audio = self.has_audio || has_audio;
                self.submitted_at = Some(now);
                Ok(true)
            }
            QuestionPhase::Submitted | QuestionPhase::Completed => Ok(false),
            phase => Err(SessionError::IllegalTransition {
                id: self.id,
                phase,
                action: "submit",
            }),
        }
    }

    /// `submitted -> completed`: the orchestrator moved past this question
    pub fn complete(&mut self) -> Result<(), SessionError> {
        match self.phase {
            QuestionPhase::Submitted => {
                self.phase = QuestionPhase::Completed;
                Ok(())
            }
            QuestionPhase::Completed => Ok(()),
            phase => Err(SessionError::IllegalTransition {
                id: self.id,
                phase,
                action: "complete",
            }),
        }
    }

    /// Apply one elapsed second to whichever phase countdown is live.
    ///
    /// Returns the timeout that fired, if any; the session layer consumes it
    /// to drive the phase transition. Ticks outside `Preparation`/`Recording`
    /// are no-ops.
    pub fn tick(&mut self) -> Option<PhaseTimeout> {
        match self.phase {
            QuestionPhase::Preparation => self
                .preparation
                .tick()
                .then_some(PhaseTimeout::Preparation),
            QuestionPhase::Recording => {
                self.recording.tick().then_some(PhaseTimeout::Recording)
            }
            _ => None,
        }
    }

    /// Validate the submitted-iff-stamped invariant, used when replaying
    /// persisted question states during recovery.
    pub fn is_consistent(&self) -> bool {
        self.submitted_at.is_some() == self.is_settled()
    }
}
