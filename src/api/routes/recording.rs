//! Recording control endpoints.
//!
//! - GET /status: snapshot of the running job
//! - POST /stop: ask the app loop to stop the job

use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::recording::ServiceStateHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCommand {
    StopRecording,
}

impl ApiCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopRecording => "stop",
        }
    }
}

#[derive(Clone)]
pub struct RecordingState {
    pub tx: mpsc::Sender<ApiCommand>,
    pub status: ServiceStateHandle,
    pub job_id: Uuid,
    pub call_url: String,
}

pub fn router(state: RecordingState) -> Router {
    Router::new()
        .route("/status", get(recording_status))
        .route("/stop", post(stop_recording))
        .with_state(state)
}

/// Requests a stop. The response returns immediately; teardown (including
/// finalize) continues in the app loop.
async fn stop_recording(State(state): State<RecordingState>) -> ApiResult<Json<Value>> {
    info!(job_id = %state.job_id, "Stop command received via API");

    state
        .tx
        .send(ApiCommand::StopRecording)
        .await
        .map_err(|e| {
            error!("Failed to send stop command: {}", e);
            ApiError::from(e)
        })?;

    let status = state.status.get().await;
    Ok(Json(json!({
        "success": true,
        "job_id": state.job_id.to_string(),
        "phase": status.phase.as_str(),
        "message": "Stop requested"
    })))
}

async fn recording_status(State(state): State<RecordingState>) -> Json<Value> {
    let status = state.status.get().await;

    Json(json!({
        "job_id": state.job_id.to_string(),
        "call_url": state.call_url,
        "phase": status.phase.as_str(),
        "restarts": status.restarts,
        "output_path": status.output_path,
        "started_at": status.started_at,
        "duration_seconds": status.duration_seconds(),
        "status": status.status,
        "last_error": status.last_error,
    }))
}
