//! Recording metadata side-car, written once when the job stops.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::session::Participant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub meeting_url: String,
    /// Roster as observed at stop time, in session order.
    pub participants: Vec<Participant>,
}

impl RecordingMetadata {
    pub fn new(meeting_url: impl Into<String>, participants: Vec<Participant>) -> Self {
        Self {
            meeting_url: meeting_url.into(),
            participants,
        }
    }

    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create metadata directory")?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize recording metadata")?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write recording metadata to {:?}", path))?;

        info!(
            "Recording metadata saved: {:?} ({} participants)",
            path,
            self.participants.len()
        );
        Ok(())
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read recording metadata from {:?}", path))?;
        serde_json::from_str(&content).context("Failed to parse recording metadata")
    }
}
