use crate::global;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Placeholder in capture args that is replaced by the sink target.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub capture: CaptureConfig,
    pub monitor: MonitorConfig,
    pub finalize: FinalizeConfig,
    pub session: SessionConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory that receives media segments and the metadata side-car.
    /// Defaults to the data directory when unset.
    pub directory: Option<PathBuf>,
    pub extension: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: None,
            extension: "mp4".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn resolve_directory(&self) -> Result<PathBuf> {
        match &self.directory {
            Some(dir) => Ok(dir.clone()),
            None => global::recordings_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Encoder executable, resolved on PATH.
    pub command: String,
    /// Encoder arguments. `{output}` is replaced by the sink path.
    pub args: Vec<String>,
    /// Treat a running encoder whose output stopped growing as unhealthy.
    pub stall_detection: bool,
    /// Written to the encoder's stdin to ask for a clean shutdown
    /// (`q` makes ffmpeg finish the container).
    pub stop_input: Option<String>,
    /// How long to wait for a clean exit before killing the encoder.
    pub stop_timeout_seconds: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: "ffmpeg".to_string(),
            args: [
                "-y",
                "-loglevel",
                "error",
                "-f",
                "pulse",
                "-i",
                "default",
                "-f",
                "x11grab",
                "-framerate",
                "25",
                "-i",
                ":99",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-c:a",
                "aac",
                OUTPUT_PLACEHOLDER,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            stall_detection: true,
            stop_input: Some("q".to_string()),
            stop_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Grace period before the first health check (capture startup latency).
    pub initial_delay_seconds: u64,
    pub period_seconds: u64,
    /// Restarts allowed over the whole life of one recording job.
    pub max_restarts: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            initial_delay_seconds: 30,
            period_seconds: 10,
            max_restarts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FinalizeConfig {
    /// Executable invoked with the recording directory as its only argument.
    pub command: Option<PathBuf>,
    /// 0 waits without limit.
    pub timeout_seconds: u64,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_seconds: 3600,
        }
    }
}

impl FinalizeConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub join_command: Option<String>,
    pub leave_command: Option<String>,
    /// Must print a JSON array of participants on stdout.
    pub participants_command: Option<String>,
    /// Long-running command started after join. Its exit ends the job:
    /// status 0 means the call ended, anything else is a session failure.
    pub watch_command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3838,
        }
    }
}

impl Config {
    /// Load from the default location, creating it with defaults if missing.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        info!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = self.to_toml()?;

        std::fs::write(config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn validate(&self) -> Result<()> {
        if self.monitor.period_seconds == 0 {
            bail!("monitor.period_seconds must be greater than zero");
        }
        if self.capture.command.trim().is_empty() {
            bail!("capture.command must not be empty");
        }
        if !self
            .capture
            .args
            .iter()
            .any(|arg| arg.contains(OUTPUT_PLACEHOLDER))
        {
            bail!(
                "capture.args must contain the {} placeholder",
                OUTPUT_PLACEHOLDER
            );
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        global::config_file()
    }
}
