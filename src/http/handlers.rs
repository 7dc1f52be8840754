use super::state::AppState;
use crate::error::VoiceError;
use crate::session::{ConversationState, SessionStats, TranscriptionTurn};
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
pub struct StartVoiceResponse {
    pub session_id: String,
    pub state: ConversationState,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopVoiceResponse {
    pub state: ConversationState,
    pub message: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: ConversationState,
    pub volume: f32,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub turns: Vec<TranscriptionTurn>,
    pub pending: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

fn error_status(err: &VoiceError) -> StatusCode {
    match err {
        VoiceError::SessionActive => StatusCode::CONFLICT,
        VoiceError::Configuration(_) => StatusCode::BAD_REQUEST,
        VoiceError::Cancelled => StatusCode::CONFLICT,
        VoiceError::Connection(_) | VoiceError::Device(_) => StatusCode::SERVICE_UNAVAILABLE,
        VoiceError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /voice/start
/// Start a voice conversation
pub async fn start_voice(State(state): State<AppState>) -> impl IntoResponse {
    match state.voice.start().await {
        Ok(session_id) => {
            info!("Voice session started: {}", session_id);
            (
                StatusCode::OK,
                Json(StartVoiceResponse {
                    session_id: session_id.clone(),
                    state: state.voice.state(),
                    message: format!("Voice session {} started", session_id),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to start voice session: {}", e);
            (
                error_status(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                    kind: e.kind().to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /voice/stop
/// Stop the voice conversation; succeeds even when nothing is running
pub async fn stop_voice(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.voice.stop().await;

    (
        StatusCode::OK,
        Json(StopVoiceResponse {
            state: state.voice.state(),
            message: "Voice session stopped".to_string(),
            stats,
        }),
    )
}

/// GET /voice/status
pub async fn get_voice_status(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.voice.report();

    Json(StatusResponse {
        state: state.voice.state(),
        volume: state.voice.volume(),
        stats: report.stats,
    })
}

/// GET /voice/transcript
/// Transcript of the current session (accumulated so far)
pub async fn get_voice_transcript(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.voice.report();

    Json(TranscriptResponse {
        turns: report.turns,
        pending: report.pending,
    })
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
