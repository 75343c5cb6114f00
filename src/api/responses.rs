//! API request and response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::prefs::ExamMode;
use crate::state::{QuestionSpec, SessionState};

/// Request body for POST /exam/start
#[derive(Debug, Clone, Deserialize)]
pub struct StartExamRequest {
    pub test_id: String,
    /// Session budget in minutes
    pub total_duration: u64,
    pub questions: Vec<QuestionSpec>,
    /// Authoritative deadline from the exam backend, if it issued one
    pub test_end_time: Option<DateTime<Utc>>,
}

/// Request body for POST /exam/goto
#[derive(Debug, Clone, Deserialize)]
pub struct GoToQuestionRequest {
    pub index: usize,
    pub part_index: Option<usize>,
}

/// Request body for POST /exam/question/:id/submit
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub has_audio: bool,
}

/// Request body for POST /mode
#[derive(Debug, Clone, Deserialize)]
pub struct SetModeRequest {
    pub mode: ExamMode,
}

/// API response structure for session operations
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub session: SessionState,
}

impl ApiResponse {
    /// Create a new API response
    pub fn new(status: String, message: String, session: SessionState) -> Self {
        Self {
            status,
            message,
            timestamp: Utc::now(),
            session,
        }
    }

    /// Create an ok response
    pub fn ok(message: String, session: SessionState) -> Self {
        Self::new("ok".to_string(), message, session)
    }

    /// Create a warning response: the operation was absorbed as a no-op and
    /// the session comes back unchanged.
    pub fn warning(message: String, session: SessionState) -> Self {
        Self::new("warning".to_string(), message, session)
    }
}

/// Status response with clock and mode information
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub session: SessionState,
    pub mode: ExamMode,
    pub clock_active: bool,
    pub global_time_left: u64,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
}

/// Mode response
#[derive(Debug, Clone, Serialize)]
pub struct ModeResponse {
    pub mode: ExamMode,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    /// Create a new health response
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
