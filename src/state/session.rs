//! Session aggregate and orchestrator operations

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    question::{PhaseTimeout, QuestionState},
    QuestionPhase, SessionError, StartExamError,
};

/// Per-question budgets supplied by the test-content provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSpec {
    pub id: u32,
    /// Preparation budget in seconds
    pub preparation_time: u64,
    /// Recording budget in seconds
    pub recording_time: u64,
}

/// What a global clock tick did beyond decrementing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockTick {
    /// Session still live
    Running,
    /// Budget exhausted; the named question was mid-recording and has been
    /// force-submitted with whatever audio was noted so far.
    Expired { force_submitted: Option<u32> },
}

/// What an active-question tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionTick {
    Quiet,
    /// Preparation expired; the question moved into `Recording`
    RecordingStarted { question_id: u32 },
    /// Recording expired; the question moved into `Submitted`
    RecordingExpired { question_id: u32, has_audio: bool },
}

/// Aggregate state for one timed exam attempt.
///
/// All mutation goes through the operations below; the HTTP layer and the
/// clock task share it behind `AppState`'s lock and never reach into fields
/// mid-transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub test_id: Option<String>,
    pub is_exam_active: bool,
    pub current_question_index: usize,
    pub current_part_index: usize,
    /// Question ids in presentation order
    pub question_order: Vec<u32>,
    pub question_states: HashMap<u32, QuestionState>,
    /// Authoritative session budget in seconds, independent of phase timers
    pub global_time_left: u64,
    /// Captured from the persisted mode at `start_exam`; never changes
    /// mid-session even if the preference does.
    pub is_auto_flow: bool,
    pub exam_completed: bool,
    pub started_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Empty, inactive session
    pub fn new() -> Self {
        Self {
            test_id: None,
            is_exam_active: false,
            current_question_index: 0,
            current_part_index: 0,
            question_order: Vec::new(),
            question_states: HashMap::new(),
            global_time_left: 0,
            is_auto_flow: false,
            exam_completed: false,
            started_at: None,
        }
    }

    /// Build a fresh session.
    ///
    /// Validates before constructing anything, so a rejected call leaves any
    /// prior session untouched at the caller. In auto-flow the first question
    /// is activated immediately; in normal mode everything stays idle until
    /// the learner clicks.
    pub fn start_exam(
        test_id: &str,
        total_duration_minutes: u64,
        questions: &[QuestionSpec],
        auto_flow: bool,
        now: DateTime<Utc>,
    ) -> Result<Self, StartExamError> {
        if questions.is_empty() {
            return Err(StartExamError::EmptyQuestionList);
        }
        if total_duration_minutes == 0 {
            return Err(StartExamError::NonPositiveDuration);
        }

        let question_order: Vec<u32> = questions.iter().map(|q| q.id).collect();
        let question_states = questions
            .iter()
            .map(|q| {
                (
                    q.id,
                    QuestionState::new(q.id, q.preparation_time, q.recording_time),
                )
            })
            .collect();

        let mut session = Self {
            test_id: Some(test_id.to_string()),
            is_exam_active: true,
            current_question_index: 0,
            current_part_index: 0,
            question_order,
            question_states,
            global_time_left: total_duration_minutes * 60,
            is_auto_flow: auto_flow,
            exam_completed: false,
            started_at: Some(now),
        };

        if auto_flow {
            // Learner input does not gate the first question in exam mode.
            // A fresh session always has an idle question 0 to activate.
            let _ = session.activate_current();
        }
        Ok(session)
    }

    /// Id of the question the session currently points at
    pub fn current_question_id(&self) -> Option<u32> {
        self.question_order.get(self.current_question_index).copied()
    }

    fn question_mut(&mut self, id: u32) -> Result<&mut QuestionState, SessionError> {
        self.question_states
            .get_mut(&id)
            .ok_or(SessionError::UnknownQuestion(id))
    }

    /// Move the current question from `Idle` into `Preparation`
    pub fn activate_current(&mut self) -> Result<u32, SessionError> {
        let id = self.current_question_id().ok_or(SessionError::NotActive)?;
        self.question_mut(id)?.activate()?;
        Ok(id)
    }

    /// Explicit skip out of preparation into recording
    pub fn skip_preparation(&mut self, question_id: u32) -> Result<(), SessionError> {
        if !self.is_exam_active {
            return Err(SessionError::NotActive);
        }
        self.question_mut(question_id)?.start_recording()
    }

    /// Capture collaborator reports that audio exists for a question
    pub fn note_audio_captured(&mut self, question_id: u32) -> Result<(), SessionError> {
        if !self.is_exam_active {
            return Err(SessionError::NotActive);
        }
        self.question_mut(question_id)?.note_audio()
    }

    /// Submit a question's answer. Idempotent: returns `true` only when the
    /// submission happened on this call.
    pub fn mark_question_submitted(
        &mut self,
        question_id: u32,
        has_audio: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        if !self.is_exam_active {
            return Err(SessionError::NotActive);
        }
        self.question_mut(question_id)?.submit(has_audio, now)
    }

    /// Manual navigation, `normal` mode only.
    ///
    /// A submitted question left behind is committed to `Completed`; an
    /// activated question being revisited is left as-is (phases never roll
    /// back). Returns the question id when this move activated it out of
    /// `Idle`, so the caller can raise the preparation cue.
    pub fn go_to_question(
        &mut self,
        index: usize,
        part_index: Option<usize>,
    ) -> Result<Option<u32>, SessionError> {
        if !self.is_exam_active {
            return Err(SessionError::NotActive);
        }
        if self.is_auto_flow {
            return Err(SessionError::ManualNavigationBlocked);
        }
        if index >= self.question_order.len() {
            return Err(SessionError::IndexOutOfRange(index));
        }

        if index != self.current_question_index {
            if let Some(prev_id) = self.current_question_id() {
                let prev = self.question_mut(prev_id)?;
                if prev.phase == QuestionPhase::Submitted {
                    prev.complete()?;
                }
            }
        }

        self.current_question_index = index;
        if let Some(part) = part_index {
            self.current_part_index = part;
        }

        let id = self.question_order[index];
        let question = self.question_mut(id)?;
        if question.phase == QuestionPhase::Idle {
            question.activate()?;
            return Ok(Some(id));
        }
        Ok(None)
    }

    /// Internal forward advance used by auto-flow after a submission.
    ///
    /// Commits the current question, steps the index, and activates the next
    /// question. Returns the newly active question id, or `None` when the
    /// last question was consumed (the session ends).
    pub fn advance_question(&mut self, now: DateTime<Utc>) -> Result<Option<u32>, SessionError> {
        if !self.is_exam_active {
            return Err(SessionError::NotActive);
        }
        if let Some(id) = self.current_question_id() {
            let question = self.question_mut(id)?;
            if question.phase == QuestionPhase::Recording {
                question.submit(false, now)?;
            }
            if question.phase == QuestionPhase::Submitted {
                question.complete()?;
            }
        }

        if self.current_question_index + 1 >= self.question_order.len() {
            self.finish();
            return Ok(None);
        }
        self.current_question_index += 1;
        let id = self.activate_current()?;
        Ok(Some(id))
    }

    /// Apply one elapsed second to the global session budget.
    ///
    /// Independent of per-question timers. Reaching zero terminates the
    /// session regardless of any question's phase, force-submitting an
    /// in-progress recording with whatever audio was noted. Late ticks after
    /// termination are no-ops.
    pub fn tick_global(&mut self, now: DateTime<Utc>) -> ClockTick {
        if !self.is_exam_active {
            return ClockTick::Running;
        }
        self.global_time_left = self.global_time_left.saturating_sub(1);
        if self.global_time_left > 0 {
            return ClockTick::Running;
        }

        let force_submitted = self.force_submit_current(now);
        self.finish();
        debug!(force_submitted = ?force_submitted, "global clock expired");
        ClockTick::Expired { force_submitted }
    }

    /// Submit the current question immediately if it is mid-recording,
    /// keeping whatever audio the capture collaborator has noted so far.
    pub fn force_submit_current(&mut self, now: DateTime<Utc>) -> Option<u32> {
        let id = self.current_question_id()?;
        let question = self.question_states.get_mut(&id)?;
        if question.phase == QuestionPhase::Recording {
            // note_audio already tracked capture output; submit adds nothing
            if question.submit(false, now).is_ok() {
                return Some(id);
            }
        }
        None
    }

    /// Apply one elapsed second to the current question's live phase timer
    pub fn tick_active_question(&mut self, now: DateTime<Utc>) -> QuestionTick {
        if !self.is_exam_active {
            return QuestionTick::Quiet;
        }
        let Some(id) = self.current_question_id() else {
            return QuestionTick::Quiet;
        };
        let Some(question) = self.question_states.get_mut(&id) else {
            return QuestionTick::Quiet;
        };

        match question.tick() {
            None => QuestionTick::Quiet,
            Some(PhaseTimeout::Preparation) => {
                // one-shot: the countdown will not re-fire
                if question.start_recording().is_ok() {
                    QuestionTick::RecordingStarted { question_id: id }
                } else {
                    QuestionTick::Quiet
                }
            }
            Some(PhaseTimeout::Recording) => match question.submit(false, now) {
                Ok(_) => QuestionTick::RecordingExpired {
                    question_id: id,
                    has_audio: question.has_audio,
                },
                Err(_) => QuestionTick::Quiet,
            },
        }
    }

    /// Explicit termination; idempotent
    pub fn end_exam(&mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        self.is_exam_active = false;
        self.exam_completed = true;
    }

    /// Clear the session back to defaults. The persisted exam mode lives in
    /// the preference store and is untouched by this.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn specs() -> Vec<QuestionSpec> {
        vec![QuestionSpec {
            id: 1,
            preparation_time: 30,
            recording_time: 45,
        }]
    }

    fn two_question_specs() -> Vec<QuestionSpec> {
        vec![
            QuestionSpec {
                id: 1,
                preparation_time: 2,
                recording_time: 2,
            },
            QuestionSpec {
                id: 2,
                preparation_time: 3,
                recording_time: 3,
            },
        ]
    }

    #[test]
    fn start_exam_seeds_budgets() {
        // Scenario: 10 minute session with one 30s prep / 45s recording question
        let s = SessionState::start_exam("t1", 10, &specs(), false, Utc::now()).unwrap();
        assert_eq!(s.global_time_left, 600);
        assert!(s.is_exam_active);
        assert!(!s.exam_completed);
        let q = &s.question_states[&1];
        assert_eq!(q.phase, QuestionPhase::Idle);
        assert_eq!(q.preparation_time_left(), 30);
        assert_eq!(q.recording_time_left(), 45);
        assert!(!q.has_audio);
        assert!(q.submitted_at.is_none());
    }

    #[test]
    fn start_exam_rejects_bad_arguments() {
        assert_matches!(
            SessionState::start_exam("t1", 10, &[], false, Utc::now()),
            Err(StartExamError::EmptyQuestionList)
        );
        assert_matches!(
            SessionState::start_exam("t1", 0, &specs(), false, Utc::now()),
            Err(StartExamError::NonPositiveDuration)
        );
    }

    #[test]
    fn global_expiry_terminates_regardless_of_question_phase() {
        let mut s = SessionState::start_exam("t1", 10, &specs(), false, Utc::now()).unwrap();
        let now = Utc::now();
        let mut last = ClockTick::Running;
        for _ in 0..600 {
            last = s.tick_global(now);
        }
        assert_matches!(last, ClockTick::Expired { .. });
        assert!(!s.is_exam_active);
        assert!(s.exam_completed);
        assert_eq!(s.global_time_left, 0);
        // question 1 never left idle and that is fine
        assert_eq!(s.question_states[&1].phase, QuestionPhase::Idle);
    }

    #[test]
    fn late_ticks_after_termination_are_no_ops() {
        let mut s = SessionState::start_exam("t1", 10, &specs(), false, Utc::now()).unwrap();
        s.end_exam();
        let before = s.global_time_left;
        assert_eq!(s.tick_global(Utc::now()), ClockTick::Running);
        assert_eq!(s.global_time_left, before);
        assert_eq!(s.tick_active_question(Utc::now()), QuestionTick::Quiet);
    }

    #[test]
    fn duplicate_submit_keeps_first_audio_flag() {
        let mut s = SessionState::start_exam("t1", 10, &specs(), false, Utc::now()).unwrap();
        s.go_to_question(0, None).unwrap();
        s.skip_preparation(1).unwrap();
        assert!(s.mark_question_submitted(1, true, Utc::now()).unwrap());
        let stamped = s.question_states[&1].submitted_at;
        assert!(!s.mark_question_submitted(1, false, Utc::now()).unwrap());
        assert!(s.question_states[&1].has_audio);
        assert_eq!(s.question_states[&1].submitted_at, stamped);
    }

    #[test]
    fn submitting_an_idle_question_is_reported_not_applied() {
        let mut s = SessionState::start_exam("t1", 10, &specs(), false, Utc::now()).unwrap();
        assert_matches!(
            s.mark_question_submitted(1, true, Utc::now()),
            Err(SessionError::IllegalTransition { .. })
        );
        assert_eq!(s.question_states[&1].phase, QuestionPhase::Idle);
    }

    #[test]
    fn manual_navigation_blocked_in_auto_flow() {
        let mut s = SessionState::start_exam("t1", 10, &two_question_specs(), true, Utc::now())
            .unwrap();
        assert_matches!(
            s.go_to_question(1, None),
            Err(SessionError::ManualNavigationBlocked)
        );
        assert_eq!(s.current_question_index, 0);
    }

    #[test]
    fn manual_navigation_commits_submitted_questions() {
        let mut s = SessionState::start_exam("t1", 10, &two_question_specs(), false, Utc::now())
            .unwrap();
        s.go_to_question(0, None).unwrap();
        s.skip_preparation(1).unwrap();
        s.mark_question_submitted(1, true, Utc::now()).unwrap();
        s.go_to_question(1, Some(1)).unwrap();
        assert_eq!(s.question_states[&1].phase, QuestionPhase::Completed);
        assert_eq!(s.question_states[&2].phase, QuestionPhase::Preparation);
        assert_eq!(s.current_part_index, 1);
    }

    #[test]
    fn auto_flow_ticks_through_phases_and_advances() {
        let mut s = SessionState::start_exam("t1", 10, &two_question_specs(), true, Utc::now())
            .unwrap();
        // question 1 activated at start
        assert_eq!(s.question_states[&1].phase, QuestionPhase::Preparation);
        let now = Utc::now();

        s.tick_active_question(now);
        assert_matches!(
            s.tick_active_question(now),
            QuestionTick::RecordingStarted { question_id: 1 }
        );
        s.note_audio_captured(1).unwrap();
        s.tick_active_question(now);
        assert_matches!(
            s.tick_active_question(now),
            QuestionTick::RecordingExpired {
                question_id: 1,
                has_audio: true
            }
        );

        assert_eq!(s.advance_question(now).unwrap(), Some(2));
        assert_eq!(s.question_states[&1].phase, QuestionPhase::Completed);
        assert_eq!(s.question_states[&2].phase, QuestionPhase::Preparation);

        s.skip_preparation(2).unwrap();
        s.mark_question_submitted(2, false, now).unwrap();
        assert_eq!(s.advance_question(now).unwrap(), None);
        assert!(!s.is_exam_active);
        assert!(s.exam_completed);
    }

    #[test]
    fn clock_expiry_force_submits_a_live_recording() {
        let mut s = SessionState::start_exam("t1", 1, &specs(), false, Utc::now()).unwrap();
        s.go_to_question(0, None).unwrap();
        s.skip_preparation(1).unwrap();
        s.note_audio_captured(1).unwrap();
        let now = Utc::now();
        let mut last = ClockTick::Running;
        for _ in 0..60 {
            last = s.tick_global(now);
        }
        assert_eq!(
            last,
            ClockTick::Expired {
                force_submitted: Some(1)
            }
        );
        let q = &s.question_states[&1];
        assert_eq!(q.phase, QuestionPhase::Submitted);
        assert!(q.has_audio, "partial capture survives the forced submit");
        assert!(q.submitted_at.is_some());
    }

    #[test]
    fn time_left_values_never_increase_while_active() {
        let mut s = SessionState::start_exam("t1", 10, &specs(), true, Utc::now()).unwrap();
        let now = Utc::now();
        let mut global = s.global_time_left;
        let mut prep = s.question_states[&1].preparation_time_left();
        let mut rec = s.question_states[&1].recording_time_left();
        for _ in 0..100 {
            s.tick_global(now);
            s.tick_active_question(now);
            let q = &s.question_states[&1];
            assert!(s.global_time_left <= global);
            assert!(q.preparation_time_left() <= prep);
            assert!(q.recording_time_left() <= rec);
            global = s.global_time_left;
            prep = q.preparation_time_left();
            rec = q.recording_time_left();
        }
    }

    #[test]
    fn reset_returns_to_defaults() {
        let mut s = SessionState::start_exam("t1", 10, &specs(), true, Utc::now()).unwrap();
        s.reset();
        assert!(!s.is_exam_active);
        assert!(s.question_states.is_empty());
        assert_eq!(s.global_time_left, 0);
        assert!(s.test_id.is_none());
    }
}
