//! Subprocess capture back end (ffmpeg or any encoder with a CLI).
//!
//! Health is judged from two signals: the child has exited (with its exit
//! code), or the child is alive but its output file has stopped growing.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{CaptureHealth, Capturer};
use crate::config::{CaptureConfig, OUTPUT_PLACEHOLDER};
use crate::recording::sink::Sink;

pub struct ProcessCapturer {
    command: String,
    args: Vec<String>,
    stall_detection: bool,
    stop_input: Option<String>,
    stop_timeout: Duration,
    child: Option<Child>,
    target: Option<PathBuf>,
    last_output_size: Option<u64>,
}

impl ProcessCapturer {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            stall_detection: config.stall_detection,
            stop_input: config.stop_input.clone(),
            stop_timeout: Duration::from_secs(config.stop_timeout_seconds),
            child: None,
            target: None,
            last_output_size: None,
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    fn render_args(&self, target: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(OUTPUT_PLACEHOLDER, target))
            .collect()
    }

    /// Compare the output size with the previous check. No output at all
    /// after the monitor's grace period counts as a stall too.
    async fn output_stalled(&mut self) -> bool {
        let Some(target) = &self.target else {
            return false;
        };

        let size = tokio::fs::metadata(target)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);
        let previous = self.last_output_size.replace(size);

        debug!(
            "Capture output {:?}: {} bytes (previous: {:?})",
            target, size, previous
        );

        size == 0 || previous.is_some_and(|prev| size <= prev)
    }
}

#[async_trait]
impl Capturer for ProcessCapturer {
    async fn start(&mut self, sink: &Sink) -> Result<()> {
        if self.child.is_some() {
            bail!("Capture process already running");
        }

        let program = which::which(&self.command)
            .with_context(|| format!("Capture command not found: {}", self.command))?;

        let target = sink.path();
        let args = self.render_args(&target.to_string_lossy());

        info!("Starting capture: {:?} {}", program, args.join(" "));

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn capture command {:?}", program))?;

        info!("Capture process started (pid {:?}) -> {:?}", child.id(), target);

        self.child = Some(child);
        self.target = Some(target);
        self.last_output_size = None;
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            debug!("Capture stop requested but no process is running");
            return Ok(());
        };

        if let Ok(Some(status)) = child.try_wait() {
            info!("Capture process had already exited with {}", status);
            return Ok(());
        }

        if let (Some(input), Some(mut stdin)) = (&self.stop_input, child.stdin.take()) {
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                debug!("Failed to send stop input to capture process: {}", e);
            }
            // Dropping stdin closes the pipe.
        }

        match tokio::time::timeout(self.stop_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                info!("Capture process exited with {}", status);
            }
            Ok(Err(e)) => {
                warn!("Failed waiting for capture process: {}", e);
            }
            Err(_) => {
                warn!(
                    "Capture process did not exit within {}s, killing it",
                    self.stop_timeout.as_secs()
                );
                child
                    .kill()
                    .await
                    .context("Failed to kill capture process")?;
            }
        }

        Ok(())
    }

    async fn health(&mut self) -> CaptureHealth {
        let Some(child) = self.child.as_mut() else {
            return CaptureHealth::Exited { code: None };
        };

        match child.try_wait() {
            Ok(Some(status)) => return CaptureHealth::Exited { code: status.code() },
            Ok(None) => {}
            Err(e) => {
                warn!("Failed to poll capture process: {}", e);
            }
        }

        if self.stall_detection && self.output_stalled().await {
            return CaptureHealth::Stalled;
        }

        CaptureHealth::Healthy
    }
}
