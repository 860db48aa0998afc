//! Finalize handoff run once at the end of `stop()`.
//!
//! The rest of the pipeline (upload, transcode, job bookkeeping) depends on
//! finalize having completed, so the stop path waits for it.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info};

use super::error::FinalizeError;

#[async_trait]
pub trait Finalizer: Send + Sync {
    async fn finalize(&self, directory: &Path) -> Result<(), FinalizeError>;
}

/// Used when no finalize command is configured.
pub struct NoopFinalizer;

#[async_trait]
impl Finalizer for NoopFinalizer {
    async fn finalize(&self, directory: &Path) -> Result<(), FinalizeError> {
        debug!("No finalize command configured for {:?}", directory);
        Ok(())
    }
}

/// Runs an executable with the recording directory as its only argument.
/// - Waits for completion, bounded by an optional timeout
/// - Kills the process on timeout
/// - Non-zero exit is reported as an error
pub struct ScriptFinalizer {
    command: PathBuf,
    timeout: Option<Duration>,
}

impl ScriptFinalizer {
    pub fn new(command: PathBuf, timeout: Option<Duration>) -> Self {
        Self { command, timeout }
    }
}

#[async_trait]
impl Finalizer for ScriptFinalizer {
    async fn finalize(&self, directory: &Path) -> Result<(), FinalizeError> {
        info!("Running finalize command {:?} {:?}", self.command, directory);

        let child = tokio::process::Command::new(&self.command)
            .arg(directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(FinalizeError::Spawn)?;

        // kill_on_drop handles cleanup on timeout
        let output = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| FinalizeError::TimedOut(timeout.as_secs()))?,
            None => child.wait_with_output().await,
        }
        .map_err(FinalizeError::Wait)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            info!("Finalize stdout: {}", stdout.trim());
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FinalizeError::ExitStatus(format!(
                "{}: {}",
                output.status,
                stderr.trim()
            )));
        }

        info!("Finalize completed successfully");
        Ok(())
    }
}
