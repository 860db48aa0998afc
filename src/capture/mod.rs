//! Capture back-end abstraction.
//!
//! A capturer reads the live call's media and writes it to a sink. One
//! instance lives for the whole job; restarts only change the sink.

pub mod process;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::recording::sink::Sink;

pub use process::ProcessCapturer;

/// Health of the capture process as observed by one monitor check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureHealth {
    Healthy,
    /// The process is gone. `code` is `None` when it was killed by a signal.
    Exited { code: Option<i32> },
    /// Still running but no longer producing output.
    Stalled,
}

#[async_trait]
pub trait Capturer: Send {
    /// Begin writing to `sink`.
    async fn start(&mut self, sink: &Sink) -> Result<()>;

    /// Stop capturing and release resources. Safe to call when not running.
    async fn stop(&mut self) -> Result<()>;

    async fn health(&mut self) -> CaptureHealth;
}

/// Shared so the monitor task and the stop path can both drive the capturer.
pub type CapturerHandle = Arc<Mutex<Box<dyn Capturer>>>;

pub fn capturer_handle(capturer: Box<dyn Capturer>) -> CapturerHandle {
    Arc::new(Mutex::new(capturer))
}
