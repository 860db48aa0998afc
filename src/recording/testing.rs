//! Scripted collaborators shared by the recording unit tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::FinalizeError;
use super::finalize::Finalizer;
use super::sink::Sink;
use super::status::{ServiceStatus, StatusPublisher};
use crate::capture::{CaptureHealth, Capturer};
use crate::session::{CallParams, CallSession, Participant};

/// Ordered record of collaborator calls across fakes.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Default)]
struct CapturerState {
    script: VecDeque<CaptureHealth>,
    health_checks: usize,
    start_attempts: usize,
    failing_starts: Vec<usize>,
    slow_starts: Vec<(usize, Duration)>,
    started: Vec<PathBuf>,
    stops: usize,
}

/// Capturer that replays a fixed sequence of health results, then stays healthy.
pub struct ScriptedCapturer {
    state: Arc<Mutex<CapturerState>>,
    log: EventLog,
}

#[derive(Clone)]
pub struct CapturerProbe {
    state: Arc<Mutex<CapturerState>>,
}

impl ScriptedCapturer {
    pub fn new(script: Vec<CaptureHealth>) -> (Self, CapturerProbe) {
        Self::with_log(script, EventLog::default())
    }

    pub fn with_log(script: Vec<CaptureHealth>, log: EventLog) -> (Self, CapturerProbe) {
        let state = Arc::new(Mutex::new(CapturerState {
            script: script.into(),
            ..CapturerState::default()
        }));
        (
            Self {
                state: state.clone(),
                log,
            },
            CapturerProbe { state },
        )
    }
}

impl CapturerProbe {
    /// Make the n-th start attempt (1-based) fail.
    pub fn fail_start(&self, attempt: usize) {
        self.state.lock().unwrap().failing_starts.push(attempt);
    }

    /// Make the n-th start attempt (1-based) take `delay` before it returns.
    pub fn delay_start(&self, attempt: usize, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .slow_starts
            .push((attempt, delay));
    }

    pub fn health_checks(&self) -> usize {
        self.state.lock().unwrap().health_checks
    }

    pub fn start_attempts(&self) -> usize {
        self.state.lock().unwrap().start_attempts
    }

    pub fn started_sinks(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn stops(&self) -> usize {
        self.state.lock().unwrap().stops
    }
}

#[async_trait]
impl Capturer for ScriptedCapturer {
    async fn start(&mut self, sink: &Sink) -> Result<()> {
        let (attempt, delay) = {
            let mut state = self.state.lock().unwrap();
            state.start_attempts += 1;
            let attempt = state.start_attempts;
            self.log.push("capturer.start");
            let delay = state
                .slow_starts
                .iter()
                .find(|(slow, _)| *slow == attempt)
                .map(|(_, delay)| *delay);
            (attempt, delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.failing_starts.contains(&attempt) {
            bail!("scripted start failure");
        }
        state.started.push(sink.path());
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.state.lock().unwrap().stops += 1;
        self.log.push("capturer.stop");
        Ok(())
    }

    async fn health(&mut self) -> CaptureHealth {
        let mut state = self.state.lock().unwrap();
        state.health_checks += 1;
        state.script.pop_front().unwrap_or(CaptureHealth::Healthy)
    }
}

/// Call session with a configurable roster and failure switches.
#[derive(Default)]
pub struct FakeSession {
    pub fail_join: bool,
    pub fail_participants: bool,
    pub fail_leave: bool,
    roster: Mutex<Vec<Participant>>,
    publisher: Mutex<Option<StatusPublisher>>,
    log: EventLog,
}

impl FakeSession {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn set_roster(&self, roster: Vec<Participant>) {
        *self.roster.lock().unwrap() = roster;
    }

    /// Simulate a session-health event.
    pub fn emit(&self, status: ServiceStatus) -> bool {
        let publisher = self.publisher.lock().unwrap().clone();
        publisher.map(|p| p.publish(status)).unwrap_or(false)
    }
}

#[async_trait]
impl CallSession for FakeSession {
    async fn join(&self, call: &CallParams) -> Result<()> {
        self.log.push(format!("session.join {}", call.url));
        if self.fail_join {
            bail!("scripted join failure");
        }
        Ok(())
    }

    async fn leave(&self) -> Result<()> {
        self.log.push("session.leave");
        if self.fail_leave {
            bail!("scripted leave failure");
        }
        Ok(())
    }

    async fn participants(&self) -> Result<Vec<Participant>> {
        self.log.push("session.participants");
        if self.fail_participants {
            bail!("scripted roster failure");
        }
        Ok(self.roster.lock().unwrap().clone())
    }

    fn register_status_handler(&self, publisher: StatusPublisher) {
        *self.publisher.lock().unwrap() = Some(publisher);
    }
}

/// Finalizer that records the directories it was handed.
#[derive(Default)]
pub struct RecordingFinalizer {
    pub fail: bool,
    calls: Mutex<Vec<PathBuf>>,
    log: EventLog,
}

impl RecordingFinalizer {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Finalizer for RecordingFinalizer {
    async fn finalize(&self, directory: &Path) -> Result<(), FinalizeError> {
        self.log.push("finalize");
        self.calls.lock().unwrap().push(directory.to_path_buf());
        if self.fail {
            return Err(FinalizeError::ExitStatus("exit status: 1".to_string()));
        }
        Ok(())
    }
}
