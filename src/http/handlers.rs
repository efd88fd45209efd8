use super::state::AppState;
use crate::audio::enumerate_devices;
use crate::orchestrator::ToggleOutcome;
use crate::transcript::{ExportFormat, SearchOptions, SessionSummary, Transcript};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartRecordingResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub status: String,
    pub summary: Option<SessionSummary>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ToggleResponse {
    Started(StartRecordingResponse),
    Stopped(StopRecordingResponse),
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    /// How many of the latest transcripts to return (default 20)
    pub n: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub speaker: Option<String>,
    pub from_ms: Option<u64>,
    pub to_ms: Option<u64>,
    #[serde(default)]
    pub case_sensitive: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /recording/start
/// Start the dual-stream recording session. Idempotent: if already
/// recording, returns the existing session id.
pub async fn start_recording(State(state): State<AppState>) -> impl IntoResponse {
    match state.orchestrator.start_recording().await {
        Ok(session_id) => {
            info!("Recording started via HTTP: {}", session_id);
            (
                StatusCode::OK,
                Json(StartRecordingResponse {
                    session_id,
                    status: "recording".to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to start recording: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to start recording: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// POST /recording/stop
/// Stop the active recording session. Idempotent: stopping when not
/// recording returns a null summary.
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    let summary = state.orchestrator.stop_recording().await;
    (
        StatusCode::OK,
        Json(StopRecordingResponse {
            status: "stopped".to_string(),
            summary,
        }),
    )
}

/// POST /recording/toggle
pub async fn toggle_recording(State(state): State<AppState>) -> impl IntoResponse {
    match state.orchestrator.toggle_recording().await {
        Ok(ToggleOutcome::Started(session_id)) => (
            StatusCode::OK,
            Json(ToggleResponse::Started(StartRecordingResponse {
                session_id,
                status: "recording".to_string(),
            })),
        )
            .into_response(),
        Ok(ToggleOutcome::Stopped(summary)) => (
            StatusCode::OK,
            Json(ToggleResponse::Stopped(StopRecordingResponse {
                status: "stopped".to_string(),
                summary,
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to toggle recording: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to toggle recording: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// GET /recording/status
pub async fn recording_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.orchestrator.status().await;
    (StatusCode::OK, Json(status))
}

/// GET /transcripts/recent?n=20
pub async fn recent_transcripts(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> impl IntoResponse {
    let engine = state.engine.lock().await;
    let transcripts: Vec<Transcript> = engine.recent(query.n.unwrap_or(20));
    (StatusCode::OK, Json(transcripts))
}

/// GET /transcripts/search?q=...&speaker=You&from_ms=0&to_ms=60000
pub async fn search_transcripts(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    let range_ms = match (query.from_ms, query.to_ms) {
        (Some(from), Some(to)) => Some((from, to)),
        (Some(from), None) => Some((from, u64::MAX)),
        (None, Some(to)) => Some((0, to)),
        (None, None) => None,
    };
    let options = SearchOptions {
        speaker: query.speaker,
        range_ms,
        case_sensitive: query.case_sensitive,
        limit: query.limit,
    };

    let engine = state.engine.lock().await;
    let transcripts = engine.search(&query.q, &options);
    (StatusCode::OK, Json(transcripts))
}

/// GET /session/export/:format
/// Export the current transcript log as json, text, csv or srt.
pub async fn export_session(
    State(state): State<AppState>,
    Path(format): Path<String>,
) -> Response {
    let format: ExportFormat = match format.parse() {
        Ok(f) => f,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    let engine = state.engine.lock().await;
    match engine.export(format) {
        Ok(body) => {
            let content_type = match format {
                ExportFormat::Json => "application/json",
                _ => "text/plain; charset=utf-8",
            };
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type)],
                body,
            )
                .into_response()
        }
        Err(e) => {
            error!("Export failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Export failed: {}", e),
                }),
            )
                .into_response()
        }
    }
}

/// GET /devices
/// List audio devices visible to the host, for config discovery.
pub async fn list_devices() -> impl IntoResponse {
    let devices = enumerate_devices();
    (StatusCode::OK, Json(devices))
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
