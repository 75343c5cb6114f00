//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use tracing::{error, info, warn};

use crate::state::{AppState, SessionError, SessionState};

use super::responses::{
    ApiResponse, GoToQuestionRequest, HealthResponse, ModeResponse, SetModeRequest, StatusResponse,
    StartExamRequest, SubmitRequest,
};

/// Fold a session operation result into a response: domain anomalies come
/// back as 200 with a warning and the unchanged session, only infrastructure
/// faults turn into 5xx.
fn respond(
    state: &Arc<AppState>,
    ok_message: &str,
    result: Result<SessionState, SessionError>,
) -> Result<Json<ApiResponse>, StatusCode> {
    match result {
        Ok(session) => Ok(Json(ApiResponse::ok(ok_message.to_string(), session))),
        Err(SessionError::LockPoisoned) => {
            error!("session state lock poisoned");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(e) => {
            warn!("{}", e);
            match state.snapshot() {
                Ok(session) => Ok(Json(ApiResponse::warning(e.to_string(), session))),
                Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
            }
        }
    }
}

/// Handle POST /exam/start - begin a fresh timed attempt
pub async fn start_exam_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartExamRequest>,
) -> Result<Json<ApiResponse>, StatusCode> {
    info!(
        "Start exam requested: test={}, {} questions",
        req.test_id,
        req.questions.len()
    );
    let result = state.start_exam(
        &req.test_id,
        req.total_duration,
        req.questions,
        req.test_end_time,
    );
    respond(&state, "Exam started", result)
}

/// Handle POST /exam/goto - manual navigation (normal mode only)
pub async fn go_to_question_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GoToQuestionRequest>,
) -> Result<Json<ApiResponse>, StatusCode> {
    let result = state.go_to_question(req.index, req.part_index);
    respond(&state, "Question selected", result)
}

/// Handle POST /exam/question/:id/skip-preparation
pub async fn skip_preparation_handler(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<u32>,
) -> Result<Json<ApiResponse>, StatusCode> {
    let result = state.skip_preparation(question_id);
    respond(&state, "Recording started", result)
}

/// Handle POST /exam/question/:id/audio - capture collaborator reports
/// that recorded output exists for the question
pub async fn note_audio_handler(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<u32>,
) -> Result<Json<ApiResponse>, StatusCode> {
    let result = state.note_audio_captured(question_id);
    respond(&state, "Audio noted", result)
}

/// Handle POST /exam/question/:id/submit
pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    Path(question_id): Path<u32>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<ApiResponse>, StatusCode> {
    let result = state.mark_question_submitted(question_id, req.has_audio);
    respond(&state, "Answer submitted", result)
}

/// Handle POST /exam/end - explicit termination
pub async fn end_exam_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse>, StatusCode> {
    respond(&state, "Exam ended", state.end_exam())
}

/// Handle POST /exam/reset - clear the session back to defaults
pub async fn reset_exam_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse>, StatusCode> {
    respond(&state, "Exam reset", state.reset_exam())
}

/// Handle GET /exam/status - current session, clock, and mode
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, StatusCode> {
    let session = match state.snapshot() {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to read session state: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let (last_action, last_action_time) = state.get_last_action();

    Ok(Json(StatusResponse {
        clock_active: session.is_exam_active,
        global_time_left: session.global_time_left,
        mode: state.mode(),
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
        session,
    }))
}

/// Handle GET /mode - persisted mode preference
pub async fn get_mode_handler(State(state): State<Arc<AppState>>) -> Json<ModeResponse> {
    Json(ModeResponse { mode: state.mode() })
}

/// Handle POST /mode - persist a new mode preference.
///
/// A live session keeps the auto-flow it started with; the change applies
/// from the next exam start.
pub async fn set_mode_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetModeRequest>,
) -> Json<ModeResponse> {
    state.set_mode(req.mode);
    Json(ModeResponse { mode: state.mode() })
}

/// Handle GET /health - health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
