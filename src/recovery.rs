//! Mid-session recovery reconciliation
//!
//! Runs once at startup (the session's "remount"): given the persisted
//! recovery record and the current wall clock, rebuild a `SessionState` whose
//! remaining time agrees with the authoritative view. All the arithmetic
//! lives in pure functions so the time-based properties are testable without
//! real waits.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::state::{QuestionSpec, QuestionState, SessionState};

/// The durable facts a session can be rebuilt from.
///
/// `test_end_time`, when the exam backend supplied one, is authoritative and
/// always wins over the locally computed budget; it reflects the server's
/// view and protects against client clock drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryInfo {
    pub test_id: String,
    pub started_at: DateTime<Utc>,
    pub test_end_time: Option<DateTime<Utc>>,
    /// Session budget in minutes
    pub total_duration: u64,
}

/// Seconds elapsed since the session started, clamped so clock skew can
/// never produce negative elapsed time.
pub fn elapsed_seconds(started_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let elapsed = (now - started_at).num_seconds();
    elapsed.max(0) as u64
}

/// Remaining global budget in seconds for a recovered session
pub fn remaining_global_seconds(info: &RecoveryInfo, now: DateTime<Utc>) -> u64 {
    match info.test_end_time {
        Some(end) => (end - now).num_seconds().max(0) as u64,
        None => {
            let budget = info.total_duration * 60;
            budget.saturating_sub(elapsed_seconds(info.started_at, now))
        }
    }
}

/// Rebuild a full `SessionState` from a recovery record.
///
/// Question states replay from `saved_states` where the saved entry matches a
/// known question id and holds its invariants; anything missing or
/// inconsistent restarts at idle with full budgets. Recovery degrades, it
/// never fails: a record with an exhausted budget comes back as a completed,
/// inactive session rather than an error.
pub fn reconcile(
    info: &RecoveryInfo,
    questions: &[QuestionSpec],
    saved_states: Option<&HashMap<u32, QuestionState>>,
    current_question_index: usize,
    current_part_index: usize,
    auto_flow: bool,
    now: DateTime<Utc>,
) -> SessionState {
    let global_time_left = remaining_global_seconds(info, now);

    let question_order: Vec<u32> = questions.iter().map(|q| q.id).collect();
    let mut question_states: HashMap<u32, QuestionState> = questions
        .iter()
        .map(|q| {
            (
                q.id,
                QuestionState::new(q.id, q.preparation_time, q.recording_time),
            )
        })
        .collect();

    if let Some(saved) = saved_states {
        for (id, state) in saved {
            if !question_states.contains_key(id) {
                warn!(question_id = id, "dropping saved state for unknown question");
                continue;
            }
            if state.id != *id || !state.is_consistent() {
                warn!(question_id = id, "dropping inconsistent saved question state");
                continue;
            }
            question_states.insert(*id, state.clone());
        }
    }

    let still_running = global_time_left > 0;
    let current_question_index = current_question_index.min(question_order.len().saturating_sub(1));

    debug!(
        test_id = %info.test_id,
        global_time_left,
        still_running,
        "reconciled session from recovery record"
    );

    SessionState {
        test_id: Some(info.test_id.clone()),
        is_exam_active: still_running,
        current_question_index,
        current_part_index,
        question_order,
        question_states,
        global_time_left,
        is_auto_flow: auto_flow,
        exam_completed: !still_running,
        started_at: Some(info.started_at),
    }
}
