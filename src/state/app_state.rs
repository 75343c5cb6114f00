//! Main application state management

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::prefs::{ExamMode, PreferenceStore, RecoveryRecord};
use crate::recovery::{reconcile, RecoveryInfo};

use super::{
    session::{ClockTick, QuestionTick},
    ClockState, QuestionSpec, SessionError, SessionState,
};

/// Phase-boundary notifications for collaborators (pip/audio cues, the
/// session clock task, any UI binding layer).
#[derive(Debug, Clone)]
pub enum SessionEvent {
    ExamStarted { test_id: String },
    PreparationStarted { question_id: u32 },
    RecordingStarted { question_id: u32 },
    QuestionSubmitted { question_id: u32, has_audio: bool },
    ForceSubmitted { question_id: u32 },
    AutoAdvanced { question_id: u32 },
    ExamEnded,
    ExamReset,
}

/// Shared application state: the session aggregate, the preference gateway,
/// and the notification channels.
pub struct AppState {
    /// The single active exam attempt
    pub session: Arc<Mutex<SessionState>>,
    /// Durable mode + recovery storage, injected so tests swap it out
    pub prefs: Arc<dyn PreferenceStore>,
    /// Recovery record for the active session, mirrored to the store
    active_record: Mutex<Option<RecoveryRecord>>,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Last action tracking
    pub last_action: Mutex<Option<String>>,
    pub last_action_time: Mutex<Option<DateTime<Utc>>>,
    /// Channel for session event notifications
    pub event_tx: broadcast::Sender<SessionEvent>,
    /// Channel for global clock updates
    pub clock_tx: watch::Sender<ClockState>,
    /// Keep the receiver alive to prevent channel closure
    pub _clock_rx: watch::Receiver<ClockState>,
}

impl AppState {
    /// Create a new AppState around an injected preference store
    pub fn new(port: u16, host: String, prefs: Arc<dyn PreferenceStore>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        let (clock_tx, clock_rx) = watch::channel(ClockState::new());

        Self {
            session: Arc::new(Mutex::new(SessionState::new())),
            prefs,
            active_record: Mutex::new(None),
            start_time: Instant::now(),
            port,
            host,
            last_action: Mutex::new(None),
            last_action_time: Mutex::new(None),
            event_tx,
            clock_tx,
            _clock_rx: clock_rx,
        }
    }

    /// Apply an update to the session under one lock and return the
    /// resulting snapshot. Every operation goes through here so no tick or
    /// user action ever observes a half-applied transition.
    fn with_session<T>(
        &self,
        action: &str,
        updater: impl FnOnce(&mut SessionState) -> Result<T, SessionError>,
    ) -> Result<(SessionState, T), SessionError> {
        let mut session = self.session.lock().map_err(|_| SessionError::LockPoisoned)?;
        let value = updater(&mut session)?;
        let snapshot = session.clone();
        drop(session);

        if let Ok(mut last_action) = self.last_action.lock() {
            *last_action = Some(action.to_string());
        }
        if let Ok(mut last_time) = self.last_action_time.lock() {
            *last_time = Some(Utc::now());
        }
        Ok((snapshot, value))
    }

    fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.event_tx.send(event) {
            warn!("Failed to send session event: {}", e);
        }
    }

    fn publish_clock(&self, session: &SessionState) {
        let clock = if session.is_exam_active {
            ClockState::active(session.global_time_left)
        } else {
            ClockState::inactive()
        };
        if let Err(e) = self.clock_tx.send(clock) {
            warn!("Failed to send clock update: {}", e);
        }
    }

    /// Mirror the current question progress into the recovery record and the
    /// durable store. Called at session start and at submission boundaries.
    fn persist_recovery(&self, session: &SessionState) {
        if let Ok(mut slot) = self.active_record.lock() {
            if let Some(record) = slot.as_mut() {
                record.question_states = session.question_states.clone();
                record.current_question_index = session.current_question_index;
                record.current_part_index = session.current_part_index;
                self.prefs.save_recovery(record);
            }
        }
    }

    /// Start a fresh exam attempt.
    ///
    /// Rejected arguments leave any prior session untouched. `is_auto_flow`
    /// is captured from the persisted mode here and stays fixed for the life
    /// of the session.
    pub fn start_exam(
        &self,
        test_id: &str,
        total_duration_minutes: u64,
        questions: Vec<QuestionSpec>,
        test_end_time: Option<DateTime<Utc>>,
    ) -> Result<SessionState, SessionError> {
        let auto_flow = self.prefs.load_mode().is_auto_flow();
        let now = Utc::now();
        let fresh =
            SessionState::start_exam(test_id, total_duration_minutes, &questions, auto_flow, now)?;

        let (snapshot, _) = self.with_session("start_exam", |session| {
            *session = fresh;
            Ok(())
        })?;

        let record = RecoveryRecord {
            info: RecoveryInfo {
                test_id: test_id.to_string(),
                started_at: now,
                test_end_time,
                total_duration: total_duration_minutes,
            },
            auto_flow,
            questions,
            question_states: snapshot.question_states.clone(),
            current_question_index: snapshot.current_question_index,
            current_part_index: snapshot.current_part_index,
        };
        self.prefs.save_recovery(&record);
        if let Ok(mut slot) = self.active_record.lock() {
            *slot = Some(record);
        }

        info!(
            "Exam started: test={}, duration={}min, auto_flow={}",
            test_id, total_duration_minutes, auto_flow
        );
        self.emit(SessionEvent::ExamStarted {
            test_id: test_id.to_string(),
        });
        if snapshot.is_auto_flow {
            if let Some(question_id) = snapshot.current_question_id() {
                self.emit(SessionEvent::PreparationStarted { question_id });
            }
        }
        self.publish_clock(&snapshot);
        Ok(snapshot)
    }

    /// Manual navigation (`normal` mode only)
    pub fn go_to_question(
        &self,
        index: usize,
        part_index: Option<usize>,
    ) -> Result<SessionState, SessionError> {
        let (snapshot, activated) =
            self.with_session("go_to_question", |s| s.go_to_question(index, part_index))?;
        if let Some(question_id) = activated {
            self.emit(SessionEvent::PreparationStarted { question_id });
        }
        Ok(snapshot)
    }

    /// Explicit skip out of preparation
    pub fn skip_preparation(&self, question_id: u32) -> Result<SessionState, SessionError> {
        let (snapshot, _) =
            self.with_session("skip_preparation", |s| s.skip_preparation(question_id))?;
        self.emit(SessionEvent::RecordingStarted { question_id });
        Ok(snapshot)
    }

    /// Capture collaborator reports audio output exists for a question
    pub fn note_audio_captured(&self, question_id: u32) -> Result<SessionState, SessionError> {
        let (snapshot, _) =
            self.with_session("note_audio", |s| s.note_audio_captured(question_id))?;
        Ok(snapshot)
    }

    /// Submit a question's answer; idempotent. In auto-flow a fresh
    /// submission advances straight to the next question.
    pub fn mark_question_submitted(
        &self,
        question_id: u32,
        has_audio: bool,
    ) -> Result<SessionState, SessionError> {
        let now = Utc::now();
        let (snapshot, outcome) = self.with_session("submit", |session| {
            let submitted = session.mark_question_submitted(question_id, has_audio, now)?;
            let advanced = if submitted && session.is_auto_flow {
                Some(session.advance_question(now)?)
            } else {
                None
            };
            Ok((submitted, advanced))
        })?;

        let (submitted, advanced) = outcome;
        if submitted {
            let has_audio = snapshot
                .question_states
                .get(&question_id)
                .map(|q| q.has_audio)
                .unwrap_or(has_audio);
            self.emit(SessionEvent::QuestionSubmitted {
                question_id,
                has_audio,
            });
            self.persist_recovery(&snapshot);
        }
        match advanced {
            Some(Some(next)) => {
                self.emit(SessionEvent::AutoAdvanced { question_id: next });
                self.emit(SessionEvent::PreparationStarted { question_id: next });
            }
            Some(None) => {
                self.emit(SessionEvent::ExamEnded);
                self.prefs.clear_recovery();
            }
            None => {}
        }
        self.publish_clock(&snapshot);
        Ok(snapshot)
    }

    /// Apply one elapsed second: global clock plus the active question's
    /// phase timer, atomically under one lock. Returns whether the session
    /// is still live so the clock task knows when to stop scheduling ticks.
    pub fn tick(&self) -> Result<bool, SessionError> {
        let now = Utc::now();
        let mut session = self.session.lock().map_err(|_| SessionError::LockPoisoned)?;
        if !session.is_exam_active {
            return Ok(false);
        }

        let mut events = Vec::new();
        match session.tick_global(now) {
            ClockTick::Expired { force_submitted } => {
                if let Some(question_id) = force_submitted {
                    events.push(SessionEvent::ForceSubmitted { question_id });
                }
                events.push(SessionEvent::ExamEnded);
            }
            ClockTick::Running => match session.tick_active_question(now) {
                QuestionTick::Quiet => {}
                QuestionTick::RecordingStarted { question_id } => {
                    events.push(SessionEvent::RecordingStarted { question_id });
                }
                QuestionTick::RecordingExpired {
                    question_id,
                    has_audio,
                } => {
                    events.push(SessionEvent::QuestionSubmitted {
                        question_id,
                        has_audio,
                    });
                    if session.is_auto_flow {
                        match session.advance_question(now) {
                            Ok(Some(next)) => {
                                events.push(SessionEvent::AutoAdvanced { question_id: next });
                                events.push(SessionEvent::PreparationStarted {
                                    question_id: next,
                                });
                            }
                            Ok(None) => events.push(SessionEvent::ExamEnded),
                            Err(e) => warn!("auto-advance after timeout failed: {}", e),
                        }
                    }
                }
            },
        }
        let snapshot = session.clone();
        drop(session);

        let submitted_this_tick = events.iter().any(|e| {
            matches!(
                e,
                SessionEvent::QuestionSubmitted { .. } | SessionEvent::ForceSubmitted { .. }
            )
        });
        let ended = events.iter().any(|e| matches!(e, SessionEvent::ExamEnded));

        if submitted_this_tick {
            self.persist_recovery(&snapshot);
        }
        if ended {
            self.prefs.clear_recovery();
        }
        for event in events {
            self.emit(event);
        }
        self.publish_clock(&snapshot);
        Ok(snapshot.is_exam_active)
    }

    /// Explicit termination; idempotent
    pub fn end_exam(&self) -> Result<SessionState, SessionError> {
        let (snapshot, _) = self.with_session("end_exam", |session| {
            session.end_exam();
            Ok(())
        })?;
        self.prefs.clear_recovery();
        if let Ok(mut slot) = self.active_record.lock() {
            *slot = None;
        }
        info!("Exam ended");
        self.emit(SessionEvent::ExamEnded);
        self.publish_clock(&snapshot);
        Ok(snapshot)
    }

    /// Clear the session to defaults; the persisted mode is untouched
    pub fn reset_exam(&self) -> Result<SessionState, SessionError> {
        let (snapshot, _) = self.with_session("reset_exam", |session| {
            session.reset();
            Ok(())
        })?;
        self.prefs.clear_recovery();
        if let Ok(mut slot) = self.active_record.lock() {
            *slot = None;
        }
        info!("Exam state reset");
        self.emit(SessionEvent::ExamReset);
        self.publish_clock(&snapshot);
        Ok(snapshot)
    }

    /// Startup recovery pass: rebuild the session from the persisted record
    /// if one exists.
    ///
    /// Returns the restored snapshot, or `None` when there was nothing
    /// usable to restore. A record whose budget is already exhausted installs
    /// as a completed, inactive session so the learner sees the attempt
    /// closed rather than vanished.
    pub fn restore_from_recovery(&self) -> Result<Option<SessionState>, SessionError> {
        let Some(record) = self.prefs.load_recovery() else {
            return Ok(None);
        };
        if record.questions.is_empty() {
            warn!("recovery record has no question list; discarding it");
            self.prefs.clear_recovery();
            return Ok(None);
        }

        let now = Utc::now();
        let restored = reconcile(
            &record.info,
            &record.questions,
            Some(&record.question_states),
            record.current_question_index,
            record.current_part_index,
            record.auto_flow,
            now,
        );
        let test_id = record.info.test_id.clone();
        let still_running = restored.is_exam_active;

        let (snapshot, _) = self.with_session("restore_from_recovery", |session| {
            *session = restored;
            Ok(())
        })?;

        if still_running {
            if let Ok(mut slot) = self.active_record.lock() {
                *slot = Some(record);
            }
            info!(
                "Session recovered: test={}, {}s remaining",
                test_id, snapshot.global_time_left
            );
            self.emit(SessionEvent::ExamStarted { test_id });
        } else {
            info!(
                "Recovered session for test {} already expired; clearing record",
                test_id
            );
            self.prefs.clear_recovery();
        }
        self.publish_clock(&snapshot);
        Ok(Some(snapshot))
    }

    /// Current session snapshot
    pub fn snapshot(&self) -> Result<SessionState, SessionError> {
        self.session
            .lock()
            .map(|session| session.clone())
            .map_err(|_| SessionError::LockPoisoned)
    }

    /// Persisted exam mode preference
    pub fn mode(&self) -> ExamMode {
        self.prefs.load_mode()
    }

    /// Persist a new mode preference. Takes effect at the next `start_exam`;
    /// a live session keeps the auto-flow it was started with.
    pub fn set_mode(&self, mode: ExamMode) {
        info!("Exam mode preference set to {:?}", mode);
        self.prefs.save_mode(mode);
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let duration = self.start_time.elapsed();
        let hours = duration.as_secs() / 3600;
        let minutes = (duration.as_secs() % 3600) / 60;
        let seconds = duration.as_secs() % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let last_action = self.last_action.lock().ok().and_then(|a| a.clone());
        let last_action_time = self.last_action_time.lock().ok().and_then(|t| *t);
        (last_action, last_action_time)
    }
}
