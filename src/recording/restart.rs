//! Bounded automatic recovery of a failed capturer.

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::monitor::{MonitorControl, Unhealthy, UnhealthyHandler};
use super::sink::{SinkHandle, SinkNamer};
use super::status::{ServicePhase, ServiceStateHandle, ServiceStatus, StatusPublisher};
use crate::capture::CapturerHandle;

/// Restarts the capturer onto a fresh sink until the job's restart budget is
/// spent, then publishes `Error`.
///
/// The counter is cumulative for the life of the job and only touched from
/// the monitor task.
pub struct RestartPolicy {
    capturer: CapturerHandle,
    namer: SinkNamer,
    sink: SinkHandle,
    publisher: StatusPublisher,
    state: ServiceStateHandle,
    max_restarts: u32,
    restarts: u32,
}

impl RestartPolicy {
    pub fn new(
        capturer: CapturerHandle,
        namer: SinkNamer,
        sink: SinkHandle,
        publisher: StatusPublisher,
        state: ServiceStateHandle,
        max_restarts: u32,
    ) -> Self {
        Self {
            capturer,
            namer,
            sink,
            publisher,
            state,
            max_restarts,
            restarts: 0,
        }
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn max_restarts(&self) -> u32 {
        self.max_restarts
    }

    async fn give_up(&self, reason: String) -> MonitorControl {
        error!("{}", reason);
        self.state.set_error(reason).await;
        // Nothing is capturing any more; the job only waits for stop().
        self.state.set_phase(ServicePhase::Stopping).await;
        self.publisher.publish(ServiceStatus::Error);
        MonitorControl::Halt
    }
}

#[async_trait]
impl UnhealthyHandler for RestartPolicy {
    async fn on_unhealthy(&mut self, evidence: Unhealthy) -> MonitorControl {
        if let Some(status) = self.publisher.published() {
            info!(
                "Job already ended with status {}, not restarting capture",
                status
            );
            return MonitorControl::Halt;
        }

        if self.restarts >= self.max_restarts {
            return self
                .give_up(format!(
                    "Capture failed ({}) after {} restarts, giving up",
                    evidence, self.restarts
                ))
                .await;
        }

        self.restarts += 1;
        self.state.set_phase(ServicePhase::Restarting).await;

        let sink = self.namer.next_sink();
        warn!(
            restart = self.restarts,
            max_restarts = self.max_restarts,
            exit_code = ?evidence.exit_code(),
            "Restarting capture ({}) into {:?}",
            evidence,
            sink.path()
        );

        let started = {
            let mut capturer = self.capturer.lock().await;
            // The process may already be gone; stop still releases its resources.
            if let Err(e) = capturer.stop().await {
                warn!("Failed to stop unhealthy capture: {:#}", e);
            }
            capturer.start(&sink).await
        };

        if let Err(e) = started {
            self.state.set_restarts(self.restarts).await;
            return self
                .give_up(format!(
                    "Capture restart {} failed to start: {:#}",
                    self.restarts, e
                ))
                .await;
        }

        let output_path = sink.path();
        if let Some(previous) = self.sink.replace(sink).await {
            info!("Superseded capture segment kept at {:?}", previous.path());
        }
        self.state.restarted(self.restarts, output_path).await;

        MonitorControl::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{capturer_handle, CaptureHealth};
    use crate::recording::monitor::{MonitorSchedule, ProcessMonitor};
    use crate::recording::testing::ScriptedCapturer;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixture {
        policy: RestartPolicy,
        capturer: CapturerHandle,
        sink: SinkHandle,
        errors: Arc<AtomicUsize>,
        publisher: StatusPublisher,
        state: ServiceStateHandle,
        _dir: tempfile::TempDir,
    }

    async fn fixture(capturer: ScriptedCapturer, max_restarts: u32) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = errors.clone();
        let publisher = StatusPublisher::new(Arc::new(move |status| {
            if status == ServiceStatus::Error {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }));

        let mut namer = SinkNamer::new(dir.path().to_path_buf(), "standup", "mp4");
        let sink = SinkHandle::default();
        sink.replace(namer.next_sink()).await;

        let capturer = capturer_handle(Box::new(capturer));
        let state = ServiceStateHandle::new(publisher.clone());
        let policy = RestartPolicy::new(
            capturer.clone(),
            namer,
            sink.clone(),
            publisher.clone(),
            state.clone(),
            max_restarts,
        );

        Fixture {
            policy,
            capturer,
            sink,
            errors,
            publisher,
            state,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_restart_rotates_sink() {
        let (capturer, controls) = ScriptedCapturer::new(vec![]);
        let mut fx = fixture(capturer, 3).await;
        let initial = fx.sink.get().await.unwrap().path();

        let control = fx
            .policy
            .on_unhealthy(Unhealthy::Exited { code: Some(1) })
            .await;

        assert_eq!(control, MonitorControl::Continue);
        assert_eq!(fx.policy.restarts(), 1);
        assert_eq!(controls.stops(), 1);

        let started = controls.started_sinks();
        assert_eq!(started.len(), 1);
        assert_ne!(started[0], initial);
        assert_eq!(fx.sink.get().await.unwrap().path(), started[0]);
        assert!(fx.publisher.published().is_none());
    }

    #[tokio::test]
    async fn test_budget_exhausted_publishes_error_once() {
        let (capturer, controls) = ScriptedCapturer::new(vec![]);
        let mut fx = fixture(capturer, 2).await;

        let mut paths = HashSet::new();
        paths.insert(fx.sink.get().await.unwrap().path());
        for _ in 0..2 {
            assert_eq!(
                fx.policy.on_unhealthy(Unhealthy::Stalled).await,
                MonitorControl::Continue
            );
            paths.insert(fx.sink.get().await.unwrap().path());
        }
        assert_eq!(paths.len(), 3);
        assert_eq!(fx.errors.load(Ordering::SeqCst), 0);

        assert_eq!(
            fx.policy
                .on_unhealthy(Unhealthy::Exited { code: Some(9) })
                .await,
            MonitorControl::Halt
        );
        assert_eq!(fx.errors.load(Ordering::SeqCst), 1);
        assert_eq!(fx.publisher.published(), Some(ServiceStatus::Error));
        assert_eq!(fx.state.get().await.phase, ServicePhase::Stopping);
        assert_eq!(controls.started_sinks().len(), 2);

        // Further evidence changes nothing.
        fx.policy.on_unhealthy(Unhealthy::Stalled).await;
        assert_eq!(fx.errors.load(Ordering::SeqCst), 1);
        assert_eq!(controls.started_sinks().len(), 2);
        assert_eq!(fx.policy.restarts(), 2);
    }

    #[tokio::test]
    async fn test_zero_budget_fails_immediately() {
        let (capturer, controls) = ScriptedCapturer::new(vec![]);
        let mut fx = fixture(capturer, 0).await;

        assert_eq!(
            fx.policy.on_unhealthy(Unhealthy::Stalled).await,
            MonitorControl::Halt
        );
        assert_eq!(fx.errors.load(Ordering::SeqCst), 1);
        assert_eq!(controls.stops(), 0);
        assert!(controls.started_sinks().is_empty());
    }

    #[tokio::test]
    async fn test_failed_restart_is_terminal() {
        let (capturer, controls) = ScriptedCapturer::new(vec![]);
        controls.fail_start(1);
        let mut fx = fixture(capturer, 5).await;
        let initial = fx.sink.get().await.unwrap();

        assert_eq!(
            fx.policy
                .on_unhealthy(Unhealthy::Exited { code: Some(1) })
                .await,
            MonitorControl::Halt
        );
        assert_eq!(fx.policy.restarts(), 1);
        assert_eq!(fx.errors.load(Ordering::SeqCst), 1);
        let state = fx.state.get().await;
        assert_eq!(state.phase, ServicePhase::Stopping);
        assert_eq!(state.restarts, 1);
        // The sink that never started is not recorded as current.
        assert_eq!(fx.sink.get().await, Some(initial));
        assert_eq!(controls.start_attempts(), 1);
    }

    #[tokio::test]
    async fn test_no_restart_after_terminal_status() {
        let (capturer, controls) = ScriptedCapturer::new(vec![]);
        let mut fx = fixture(capturer, 3).await;
        fx.publisher.publish(ServiceStatus::Finished);

        assert_eq!(
            fx.policy.on_unhealthy(Unhealthy::Stalled).await,
            MonitorControl::Halt
        );
        assert_eq!(fx.policy.restarts(), 0);
        assert_eq!(controls.start_attempts(), 0);
        assert_eq!(fx.errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_health_sequence_with_monitor() {
        // healthy, exit(1), healthy, stalled, exit(9) with a budget of two.
        let (capturer, controls) = ScriptedCapturer::new(vec![
            CaptureHealth::Healthy,
            CaptureHealth::Exited { code: Some(1) },
            CaptureHealth::Healthy,
            CaptureHealth::Stalled,
            CaptureHealth::Exited { code: Some(9) },
        ]);
        let fx = fixture(capturer, 2).await;
        let mut monitor =
            ProcessMonitor::new(fx.capturer.clone(), fx.policy, MonitorSchedule::default());

        let ticks = [
            monitor.tick().await,
            monitor.tick().await,
            monitor.tick().await,
            monitor.tick().await,
        ];
        assert!(ticks.iter().all(|c| *c == MonitorControl::Continue));
        assert_eq!(fx.errors.load(Ordering::SeqCst), 0);

        assert_eq!(monitor.tick().await, MonitorControl::Halt);
        assert_eq!(fx.errors.load(Ordering::SeqCst), 1);

        let started: HashSet<PathBuf> = controls.started_sinks().into_iter().collect();
        assert_eq!(started.len(), 2);
    }
}
