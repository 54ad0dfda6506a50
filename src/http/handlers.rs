use super::state::AppState;
use crate::emotion::{EmotionLabel, EmotionSample};
use crate::history::HistoryEntry;
use crate::session::SessionState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// State the command moves the session towards
    pub state: SessionState,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// One sample with its chart colour
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleView {
    pub name: String,
    pub value: f64,
    pub color: &'static str,
}

impl From<&EmotionSample> for SampleView {
    fn from(sample: &EmotionSample) -> Self {
        Self {
            name: sample.name.clone(),
            value: sample.value,
            color: EmotionLabel::from_name(&sample.name).color(),
        }
    }
}

/// History entry as rendered in the recording history card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntryView {
    pub timestamp: String,
    pub primary: Option<SampleView>,
    pub emotions: Vec<SampleView>,
}

impl From<&HistoryEntry> for HistoryEntryView {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            timestamp: entry.timestamp.clone(),
            primary: entry.primary().map(SampleView::from),
            emotions: entry.emotions.iter().map(SampleView::from).collect(),
        }
    }
}

fn conflict(message: String) -> axum::response::Response {
    (
        StatusCode::CONFLICT,
        Json(ErrorResponse { error: message }),
    )
        .into_response()
}

fn loop_unavailable(e: anyhow::Error) -> axum::response::Response {
    error!("Session loop unavailable: {}", e);
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: format!("Session unavailable: {}", e),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Start recording; refused while a previous round is still in flight
pub async fn start_recording(State(state): State<AppState>) -> impl IntoResponse {
    let current = state.session.snapshot().state;
    if current.is_busy() {
        warn!("Start refused while {:?}", current);
        return conflict(format!("Session is busy ({:?})", current));
    }

    info!("Start requested");
    if let Err(e) = state.session.start().await {
        return loop_unavailable(e);
    }

    (
        StatusCode::ACCEPTED,
        Json(CommandResponse {
            state: SessionState::Recording,
            message: "Recording requested".to_string(),
        }),
    )
        .into_response()
}

/// POST /session/stop
/// Stop recording and send it for inference
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    let current = state.session.snapshot().state;
    if current != SessionState::Recording {
        return conflict(format!("Not recording ({:?})", current));
    }

    info!("Stop requested");
    if let Err(e) = state.session.stop().await {
        return loop_unavailable(e);
    }

    (
        StatusCode::ACCEPTED,
        Json(CommandResponse {
            state: SessionState::Encoding,
            message: "Recording stopping".to_string(),
        }),
    )
        .into_response()
}

/// GET /session/status
/// Current state, latest reply and distribution
pub async fn get_session_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.session.snapshot()))
}

/// GET /history
/// Persisted history, oldest first
pub async fn get_history(State(state): State<AppState>) -> impl IntoResponse {
    let log = state.history.load().await;
    let views: Vec<HistoryEntryView> = log.iter().map(HistoryEntryView::from).collect();
    (StatusCode::OK, Json(views))
}

/// DELETE /history
/// Remove every entry
pub async fn delete_history(State(state): State<AppState>) -> impl IntoResponse {
    match state.history.clear().await {
        None => StatusCode::NO_CONTENT.into_response(),
        Some(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
