//! Error types for the recording lifecycle.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why `RecordingService::start` refused or failed to begin a job.
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("recording job was already started")]
    AlreadyStarted,

    #[error("failed to join call: {0}")]
    JoinFailed(String),

    #[error("failed to prepare output directory {path:?}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start capture: {0}")]
    CaptureStartFailed(String),
}

/// Failure modes of the finalize handoff. All of them are logged by the
/// service and never change the published status.
#[derive(Error, Debug)]
pub enum FinalizeError {
    #[error("failed to launch finalize command: {0}")]
    Spawn(#[source] io::Error),

    #[error("failed waiting for finalize command: {0}")]
    Wait(#[source] io::Error),

    #[error("finalize command exited with {0}")]
    ExitStatus(String),

    #[error("finalize command timed out after {0}s")]
    TimedOut(u64),
}
