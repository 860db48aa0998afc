//! Periodic capture health check.
//!
//! The monitor only detects and reports. What to do about an unhealthy
//! capturer is decided by its `UnhealthyHandler` (the restart policy), which
//! runs inline within the tick, so ticks and recoveries never overlap.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureHealth, CapturerHandle};
use crate::config::MonitorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSchedule {
    /// Delay before the first check, covering capture startup latency.
    pub initial_delay: Duration,
    pub period: Duration,
}

impl Default for MonitorSchedule {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(30),
            period: Duration::from_secs(10),
        }
    }
}

impl From<&MonitorConfig> for MonitorSchedule {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            initial_delay: Duration::from_secs(config.initial_delay_seconds),
            period: Duration::from_secs(config.period_seconds),
        }
    }
}

/// Evidence passed to the handler when a check fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unhealthy {
    Exited { code: Option<i32> },
    Stalled,
}

impl Unhealthy {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exited { code } => *code,
            Self::Stalled => None,
        }
    }
}

impl fmt::Display for Unhealthy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited { code: Some(code) } => write!(f, "capture exited with code {}", code),
            Self::Exited { code: None } => f.write_str("capture terminated by signal"),
            Self::Stalled => f.write_str("capture running but not producing output"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorControl {
    Continue,
    /// Stop scheduling checks.
    Halt,
}

#[async_trait]
pub trait UnhealthyHandler: Send {
    async fn on_unhealthy(&mut self, evidence: Unhealthy) -> MonitorControl;
}

pub struct ProcessMonitor<H> {
    capturer: CapturerHandle,
    handler: H,
    schedule: MonitorSchedule,
}

impl<H: UnhealthyHandler + 'static> ProcessMonitor<H> {
    pub fn new(capturer: CapturerHandle, handler: H, schedule: MonitorSchedule) -> Self {
        Self {
            capturer,
            handler,
            schedule,
        }
    }

    /// Run one health check, invoking the handler if it fails.
    pub async fn tick(&mut self) -> MonitorControl {
        let health = {
            let mut capturer = self.capturer.lock().await;
            capturer.health().await
        };

        let evidence = match health {
            CaptureHealth::Healthy => {
                debug!("Capture health check passed");
                return MonitorControl::Continue;
            }
            CaptureHealth::Exited { code } => Unhealthy::Exited { code },
            CaptureHealth::Stalled => Unhealthy::Stalled,
        };

        warn!(exit_code = ?evidence.exit_code(), "Capture unhealthy: {}", evidence);
        self.handler.on_unhealthy(evidence).await
    }

    /// Run checks on a background task until cancelled or halted by the handler.
    pub fn spawn(mut self) -> MonitorHandle<H> {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            let period = self.schedule.period.max(Duration::from_millis(1));
            let mut interval =
                tokio::time::interval_at(Instant::now() + self.schedule.initial_delay, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            debug!(
                "Capture monitor armed: first check in {:?}, then every {:?}",
                self.schedule.initial_delay, period
            );

            loop {
                tokio::select! {
                    biased;

                    _ = cancelled.cancelled() => {
                        debug!("Capture monitor cancelled");
                        break;
                    }
                    _ = interval.tick() => {}
                }

                // A tick that overran the period leaves the next one due at
                // once; cancellation must still win.
                if cancelled.is_cancelled() {
                    debug!("Capture monitor cancelled");
                    break;
                }

                // A tick in progress is never interrupted by cancellation.
                if self.tick().await == MonitorControl::Halt {
                    info!("Capture monitor halted by handler");
                    break;
                }
            }

            self.handler
        });

        MonitorHandle { token, task }
    }
}

pub struct MonitorHandle<H> {
    token: CancellationToken,
    task: JoinHandle<H>,
}

impl<H> MonitorHandle<H> {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel future checks and wait for an in-flight one to finish.
    /// Returns the handler so callers can inspect its final state.
    pub async fn shutdown(self) -> Option<H> {
        self.token.cancel();
        match self.task.await {
            Ok(handler) => Some(handler),
            Err(e) => {
                error!("Capture monitor task failed: {}", e);
                None
            }
        }
    }
}
