// Headless integration over the library internals: drives a full exam
// session and a recovery round-trip through the public API with explicit
// ticks, so no test ever waits on the wall clock.

use std::sync::Arc;

use viva_session::prefs::{ExamMode, FilePreferenceStore, PreferenceStore};
use viva_session::state::{AppState, QuestionPhase, QuestionSpec};

fn questions() -> Vec<QuestionSpec> {
    vec![
        QuestionSpec {
            id: 1,
            preparation_time: 3,
            recording_time: 4,
        },
        QuestionSpec {
            id: 2,
            preparation_time: 3,
            recording_time: 4,
        },
    ]
}

fn app_with_store(store: Arc<dyn PreferenceStore>) -> AppState {
    AppState::new(0, "127.0.0.1".to_string(), store)
}

#[test]
fn auto_flow_exam_runs_to_completion_on_ticks_alone() {
    let store: Arc<dyn PreferenceStore> =
        Arc::new(viva_session::prefs::MemoryPreferenceStore::new());
    store.save_mode(ExamMode::Exam);
    let app = app_with_store(store);

    let session = app.start_exam("speaking-1", 5, questions(), None).unwrap();
    assert!(session.is_auto_flow);
    assert_eq!(session.global_time_left, 300);
    assert_eq!(
        session.question_states[&1].phase,
        QuestionPhase::Preparation
    );

    // With no user action at all, ticks must carry each question through
    // preparation, recording, submission, and auto-advance. Each question
    // needs prep + recording ticks; bound the loop well above that.
    let mut ticks = 0;
    while app.tick().unwrap() {
        ticks += 1;
        assert!(ticks < 60, "session should finish on phase timeouts");
    }

    let done = app.snapshot().unwrap();
    assert!(done.exam_completed);
    assert!(!done.is_exam_active);
    for q in done.question_states.values() {
        assert!(q.is_settled(), "question {} not settled", q.id);
        assert!(q.submitted_at.is_some());
        assert!(!q.has_audio, "no capture was ever noted");
    }
}

#[test]
fn normal_mode_session_waits_for_the_learner() {
    let app = app_with_store(Arc::new(
        viva_session::prefs::MemoryPreferenceStore::new(),
    ));
    app.start_exam("speaking-1", 5, questions(), None).unwrap();

    // ticks drain the global clock but idle questions stay idle
    for _ in 0..10 {
        assert!(app.tick().unwrap());
    }
    let mid = app.snapshot().unwrap();
    assert_eq!(mid.global_time_left, 290);
    assert_eq!(mid.question_states[&1].phase, QuestionPhase::Idle);

    // learner drives the phases explicitly
    app.go_to_question(0, None).unwrap();
    app.skip_preparation(1).unwrap();
    app.note_audio_captured(1).unwrap();
    app.mark_question_submitted(1, false).unwrap();

    let after = app.snapshot().unwrap();
    assert_eq!(after.question_states[&1].phase, QuestionPhase::Submitted);
    assert!(after.question_states[&1].has_audio, "noted capture sticks");
    // normal mode: no auto-advance happened
    assert_eq!(after.current_question_index, 0);
    assert!(after.is_exam_active);
}

#[test]
fn restart_resumes_with_reconciled_time_and_replayed_progress() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn PreferenceStore> =
        Arc::new(FilePreferenceStore::new(dir.path()).unwrap());

    // first process: start, make progress, then "crash" (drop the state)
    {
        let app = app_with_store(Arc::clone(&store));
        app.start_exam("speaking-1", 5, questions(), None).unwrap();
        app.go_to_question(0, None).unwrap();
        app.skip_preparation(1).unwrap();
        app.mark_question_submitted(1, true).unwrap();
        for _ in 0..5 {
            app.tick().unwrap();
        }
    }

    // second process over the same data dir
    let app = app_with_store(store);
    let restored = app.restore_from_recovery().unwrap().expect("record exists");
    assert!(restored.is_exam_active);
    assert!(
        restored.global_time_left <= 300,
        "remaining time never exceeds the original budget"
    );
    assert!(restored.question_states[&1].is_settled());
    assert!(restored.question_states[&1].has_audio);
    assert_eq!(restored.question_states[&2].phase, QuestionPhase::Idle);
    assert_eq!(restored.question_states[&2].preparation_time_left(), 3);

    // and the resumed session keeps ticking normally
    assert!(app.tick().unwrap());
}

#[test]
fn global_expiry_force_submits_and_recovery_record_is_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn PreferenceStore> =
        Arc::new(FilePreferenceStore::new(dir.path()).unwrap());
    let app = app_with_store(Arc::clone(&store));

    app.start_exam("speaking-1", 1, questions(), None).unwrap();
    app.go_to_question(0, None).unwrap();
    app.skip_preparation(1).unwrap();
    app.note_audio_captured(1).unwrap();

    // drain the full minute; the recording question outlives its own timer
    // transition but the session ends regardless
    while app.tick().unwrap() {}

    let done = app.snapshot().unwrap();
    assert!(done.exam_completed);
    assert!(done.question_states[&1].is_settled());
    assert!(done.question_states[&1].has_audio);
    assert!(
        store.load_recovery().is_none(),
        "terminated sessions leave no recovery record"
    );
}
