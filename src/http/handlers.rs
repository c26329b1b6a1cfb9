use super::state::AppState;
use crate::error::VoiceError;
use crate::session::{SessionState, SessionStats, TranscriptEntry};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub state: SessionState,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub state: SessionState,
    pub status: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Start a new voice session
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Starting voice session via HTTP");

    match state.controller.start().await {
        Ok(()) => {
            let view = state.controller.view();
            (
                StatusCode::OK,
                Json(StartSessionResponse {
                    state: view.state,
                    status: view.status,
                }),
            )
                .into_response()
        }
        Err(VoiceError::AlreadyActive) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: VoiceError::AlreadyActive.to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start session: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to start session: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// POST /session/stop
/// Stop the current session
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Stopping voice session via HTTP");

    match state.controller.stop().await {
        Ok(stats) => {
            let view = state.controller.view();
            (
                StatusCode::OK,
                Json(StopSessionResponse {
                    state: view.state,
                    status: view.status,
                    stats,
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to stop session: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to stop session: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// GET /session/status
pub async fn get_session_status(State(state): State<AppState>) -> impl IntoResponse {
    let stats: SessionStats = state.controller.stats().await;
    (StatusCode::OK, Json(stats))
}

/// GET /session/transcript
/// Transcript committed so far
pub async fn get_session_transcript(State(state): State<AppState>) -> impl IntoResponse {
    let transcript: Vec<TranscriptEntry> = state.controller.transcript().await;
    (StatusCode::OK, Json(transcript))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
