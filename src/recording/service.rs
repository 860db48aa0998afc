//! Recording job lifecycle.
//!
//! start: join call → start capture on the first sink → arm monitor
//! stop:  disarm monitor → stop capture → roster → metadata → leave → finalize
//!
//! All collaborators are injected via constructor.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::RecordingError;
use super::finalize::Finalizer;
use super::metadata::RecordingMetadata;
use super::monitor::{MonitorHandle, MonitorSchedule, ProcessMonitor};
use super::restart::RestartPolicy;
use super::sink::{Sink, SinkHandle, SinkNamer};
use super::status::{
    ServicePhase, ServiceStateHandle, ServiceStatus, StatusHandler, StatusPublisher,
};
use crate::capture::{capturer_handle, Capturer, CapturerHandle};
use crate::session::{CallParams, CallSession};

/// Immutable inputs of one recording job.
#[derive(Debug, Clone)]
pub struct RecordingParams {
    pub call: CallParams,
    pub output_dir: PathBuf,
    pub extension: String,
    pub monitor: MonitorSchedule,
    pub max_restarts: u32,
}

pub struct RecordingService {
    job_id: Uuid,
    params: RecordingParams,
    session: Arc<dyn CallSession>,
    capturer: CapturerHandle,
    finalizer: Arc<dyn Finalizer>,
    publisher: StatusPublisher,
    state: ServiceStateHandle,
    sink: SinkHandle,
    monitor: Option<MonitorHandle<RestartPolicy>>,
    joined: bool,
    capturing: bool,
    stopped: bool,
}

impl RecordingService {
    pub fn new(
        params: RecordingParams,
        session: Arc<dyn CallSession>,
        capturer: Box<dyn Capturer>,
        finalizer: Arc<dyn Finalizer>,
        status_handler: StatusHandler,
    ) -> Self {
        let publisher = StatusPublisher::new(status_handler);
        Self {
            job_id: Uuid::new_v4(),
            params,
            session,
            capturer: capturer_handle(capturer),
            finalizer,
            state: ServiceStateHandle::new(publisher.clone()),
            publisher,
            sink: SinkHandle::default(),
            monitor: None,
            joined: false,
            capturing: false,
            stopped: false,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn params(&self) -> &RecordingParams {
        &self.params
    }

    /// Shared state handle, for status readers outside the service.
    pub fn state(&self) -> ServiceStateHandle {
        self.state.clone()
    }

    pub fn status(&self) -> Option<ServiceStatus> {
        self.publisher.published()
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .as_ref()
            .is_some_and(|monitor| !monitor.is_finished())
    }

    pub async fn current_sink(&self) -> Option<Sink> {
        self.sink.get().await
    }

    /// Join the call and begin capturing. On failure nothing is left running
    /// and the job stays idle.
    pub async fn start(&mut self) -> Result<(), RecordingError> {
        if self.stopped || self.state.get().await.phase != ServicePhase::Idle {
            return Err(RecordingError::AlreadyStarted);
        }

        let call = &self.params.call;
        info!(job_id = %self.job_id, "Joining call {} ({})", call.url, call.name);
        self.state.set_phase(ServicePhase::Joining).await;
        self.session.register_status_handler(self.publisher.clone());

        if let Err(e) = self.session.join(call).await {
            let reason = format!("{:#}", e);
            error!(job_id = %self.job_id, "Failed to join call: {}", reason);
            self.state.set_error(reason.clone()).await;
            self.state.set_phase(ServicePhase::Idle).await;
            return Err(RecordingError::JoinFailed(reason));
        }
        self.joined = true;

        let output_dir = self.params.output_dir.clone();
        if let Err(source) = tokio::fs::create_dir_all(&output_dir).await {
            self.abort_start(format!("Failed to create {:?}: {}", output_dir, source))
                .await;
            return Err(RecordingError::OutputDir {
                path: output_dir,
                source,
            });
        }

        let mut namer = SinkNamer::new(output_dir, &call.name, &self.params.extension);
        let sink = namer.next_sink();
        let started = {
            let mut capturer = self.capturer.lock().await;
            capturer.start(&sink).await
        };
        if let Err(e) = started {
            let reason = format!("{:#}", e);
            self.abort_start(format!("Failed to start capture: {}", reason))
                .await;
            return Err(RecordingError::CaptureStartFailed(reason));
        }
        self.capturing = true;

        let output_path = sink.path();
        self.sink.replace(sink).await;
        self.state.start_capturing(output_path.clone()).await;

        let policy = RestartPolicy::new(
            self.capturer.clone(),
            namer,
            self.sink.clone(),
            self.publisher.clone(),
            self.state.clone(),
            self.params.max_restarts,
        );
        self.monitor =
            Some(ProcessMonitor::new(self.capturer.clone(), policy, self.params.monitor).spawn());

        info!(
            job_id = %self.job_id,
            max_restarts = self.params.max_restarts,
            "Recording started: {:?}",
            output_path
        );
        Ok(())
    }

    /// Undo a partially completed start: the call was joined but capture
    /// never began.
    async fn abort_start(&mut self, reason: String) {
        error!(job_id = %self.job_id, "{}", reason);
        if let Err(e) = self.session.leave().await {
            warn!("Failed to leave call after aborted start: {:#}", e);
        }
        self.joined = false;
        self.state.set_error(reason).await;
        self.state.set_phase(ServicePhase::Idle).await;
    }

    /// Tear the job down. Every step runs even if an earlier one failed, and
    /// finalize runs last, exactly once, before this returns.
    pub async fn stop(&mut self) {
        if self.stopped {
            warn!(job_id = %self.job_id, "Recording job already stopped");
            return;
        }
        self.stopped = true;
        info!(job_id = %self.job_id, "Stopping recording job");

        // Lets an in-flight check (and any restart it is running) finish first.
        if let Some(monitor) = self.monitor.take() {
            if let Some(policy) = monitor.shutdown().await {
                info!(
                    job_id = %self.job_id,
                    "Capture monitor stopped after {} of {} restarts",
                    policy.restarts(),
                    policy.max_restarts()
                );
            }
        }
        self.state.set_phase(ServicePhase::Stopping).await;

        if self.capturing {
            let stopped = {
                let mut capturer = self.capturer.lock().await;
                capturer.stop().await
            };
            if let Err(e) = stopped {
                error!("Failed to stop capture: {:#}", e);
            }
            self.capturing = false;
        }

        let participants = if self.joined {
            match self.session.participants().await {
                Ok(participants) => participants,
                Err(e) => {
                    error!("Failed to fetch participants: {:#}", e);
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let metadata_path = match self.sink.get().await {
            Some(sink) => sink.metadata_path(),
            None => SinkNamer::new(
                self.params.output_dir.clone(),
                &self.params.call.name,
                &self.params.extension,
            )
            .fallback_metadata_path(),
        };
        let metadata = RecordingMetadata::new(self.params.call.url.clone(), participants);
        if let Err(e) = metadata.write(&metadata_path).await {
            error!("Failed to write recording metadata: {:#}", e);
        }

        if self.joined {
            if let Err(e) = self.session.leave().await {
                error!("Failed to leave call: {:#}", e);
            }
            self.joined = false;
        }

        // No-op if the monitor or the session already reported an error.
        self.publisher.publish(ServiceStatus::Finished);

        if let Err(e) = self.finalizer.finalize(&self.params.output_dir).await {
            error!(job_id = %self.job_id, "Finalize failed: {}", e);
        }

        self.state.set_phase(ServicePhase::Stopped).await;
        info!(
            job_id = %self.job_id,
            "Recording job stopped with status {:?}",
            self.publisher.published()
        );
    }
}
