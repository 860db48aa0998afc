//! JSON error responses for the control API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tokio::sync::mpsc::error::SendError;

use super::routes::recording::ApiCommand;

/// Rendered as `{"error": true, "command", "message"}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    command: ApiCommand,
    message: String,
}

/// The app loop has dropped its receiver: the job is stopping or gone.
impl From<SendError<ApiCommand>> for ApiError {
    fn from(err: SendError<ApiCommand>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            command: err.0,
            message: "Recording job is no longer accepting commands".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": true,
            "command": self.command.as_str(),
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
