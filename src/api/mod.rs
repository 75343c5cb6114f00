//! HTTP API module
//!
//! This module contains all HTTP endpoint handlers and response structures.

pub mod handlers;
pub mod responses;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use handlers::*;

/// Create the HTTP router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/exam/start", post(start_exam_handler))
        .route("/exam/goto", post(go_to_question_handler))
        .route(
            "/exam/question/:id/skip-preparation",
            post(skip_preparation_handler),
        )
        .route("/exam/question/:id/audio", post(note_audio_handler))
        .route("/exam/question/:id/submit", post(submit_handler))
        .route("/exam/end", post(end_exam_handler))
        .route("/exam/reset", post(reset_exam_handler))
        .route("/exam/status", get(status_handler))
        .route("/mode", get(get_mode_handler).post(set_mode_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
