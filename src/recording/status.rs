//! Service status types, the publish-once guard and the shared state handle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Terminal outcome of a recording job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Finished,
    Error,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finished => "finished",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type StatusHandler = Arc<dyn Fn(ServiceStatus) + Send + Sync>;

/// Delivers at most one terminal status per job.
///
/// The monitor task, the call session and the stop path all hold clones and
/// may race; whoever sets the cell first wins and only the winner invokes the
/// handler.
#[derive(Clone)]
pub struct StatusPublisher {
    published: Arc<OnceLock<ServiceStatus>>,
    handler: StatusHandler,
}

impl StatusPublisher {
    pub fn new(handler: StatusHandler) -> Self {
        Self {
            published: Arc::new(OnceLock::new()),
            handler,
        }
    }

    /// A publisher whose handler does nothing.
    pub fn silent() -> Self {
        Self::new(Arc::new(|_| {}))
    }

    /// Returns `true` if this call published `status`.
    pub fn publish(&self, status: ServiceStatus) -> bool {
        if self.published.set(status).is_err() {
            debug!(
                "Ignoring status {} (already published {:?})",
                status,
                self.published.get()
            );
            return false;
        }

        info!("Publishing service status: {}", status);
        (self.handler)(status);
        true
    }

    pub fn published(&self) -> Option<ServiceStatus> {
        self.published.get().copied()
    }

    pub fn is_terminal(&self) -> bool {
        self.published.get().is_some()
    }
}

/// Lifecycle phase of a recording job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServicePhase {
    Idle,
    Joining,
    Capturing,
    Restarting,
    Stopping,
    Stopped,
}

impl ServicePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Joining => "joining",
            Self::Capturing => "capturing",
            Self::Restarting => "restarting",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

/// Snapshot of a job, readable by API handlers.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceState {
    pub phase: ServicePhase,
    pub restarts: u32,
    pub output_path: Option<PathBuf>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: Option<ServiceStatus>,
    pub last_error: Option<String>,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            phase: ServicePhase::Idle,
            restarts: 0,
            output_path: None,
            started_at: None,
            status: None,
            last_error: None,
        }
    }
}

impl ServiceState {
    pub fn duration_seconds(&self) -> Option<u64> {
        self.started_at.map(|started| {
            let elapsed = chrono::Utc::now() - started;
            elapsed.num_seconds().max(0) as u64
        })
    }
}

/// Thread-safe handle shared between the service, its monitor task and the API.
///
/// The terminal status is read through the job's publisher so that statuses
/// raised by the call session show up without going through the state lock.
#[derive(Clone)]
pub struct ServiceStateHandle {
    inner: Arc<Mutex<ServiceState>>,
    publisher: StatusPublisher,
}

impl Default for ServiceStateHandle {
    fn default() -> Self {
        Self::new(StatusPublisher::silent())
    }
}

impl ServiceStateHandle {
    pub fn new(publisher: StatusPublisher) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ServiceState::default())),
            publisher,
        }
    }

    pub async fn get(&self) -> ServiceState {
        let mut state = self.inner.lock().await.clone();
        state.status = self.publisher.published();
        state
    }

    pub async fn set_phase(&self, phase: ServicePhase) {
        let mut state = self.inner.lock().await;
        state.phase = phase;
    }

    pub async fn start_capturing(&self, output_path: PathBuf) {
        let mut state = self.inner.lock().await;
        state.phase = ServicePhase::Capturing;
        state.started_at = Some(chrono::Utc::now());
        state.output_path = Some(output_path);
        state.last_error = None;
    }

    pub async fn restarted(&self, restarts: u32, output_path: PathBuf) {
        let mut state = self.inner.lock().await;
        state.phase = ServicePhase::Capturing;
        state.restarts = restarts;
        state.output_path = Some(output_path);
    }

    pub async fn set_restarts(&self, restarts: u32) {
        let mut state = self.inner.lock().await;
        state.restarts = restarts;
    }

    pub async fn set_error(&self, error: String) {
        let mut state = self.inner.lock().await;
        state.last_error = Some(error);
    }
}
