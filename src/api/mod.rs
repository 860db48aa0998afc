//! Local control API for a running recording job.
//!
//! Provides HTTP endpoints for:
//! - Service info
//! - Job status
//! - Stopping the job

pub mod error;
pub mod routes;

use anyhow::{Context, Result};
use axum::{response::Json, routing::get, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tracing::info;

pub use routes::recording::{ApiCommand, RecordingState};

pub struct ApiServer {
    port: u16,
    recording_state: RecordingState,
}

impl ApiServer {
    pub fn new(port: u16, recording_state: RecordingState) -> Self {
        Self {
            port,
            recording_state,
        }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/", get(service_info))
            .merge(routes::recording::router(self.recording_state))
            .layer(ServiceBuilder::new())
    }

    pub async fn start(self) -> Result<()> {
        let port = self.port;
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(&format!("127.0.0.1:{}", port))
            .await
            .with_context(|| format!("Failed to bind API server to port {}", port))?;

        info!("API server listening on http://127.0.0.1:{}", port);
        info!("Endpoints:");
        info!("  GET  /        - Service info");
        info!("  GET  /status  - Recording job status");
        info!("  POST /stop    - Stop the recording job");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

async fn service_info() -> Json<Value> {
    Json(json!({
        "service": "callrec",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}
