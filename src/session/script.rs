//! Call session driven by external shell commands.
//!
//! Each step runs a configured command with the call identity in the
//! environment:
//! - join / leave: exit code 0 means success
//! - participants: prints a JSON array of `{ "id"?, "name" }` on stdout
//! - watch: optional, runs for the duration of the call; when it exits the
//!   session publishes `Finished` (exit 0) or `Error` (anything else)
//!
//! A step without a command is a no-op.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{CallParams, CallSession, Participant};
use crate::config::SessionConfig;
use crate::recording::status::{ServiceStatus, StatusPublisher};

/// Environment variable names passed to session commands.
pub mod session_env {
    pub const CALL_URL: &str = "CALLREC_CALL_URL";
    pub const CALL_NAME: &str = "CALLREC_CALL_NAME";
    pub const CALL_USERNAME: &str = "CALLREC_CALL_USERNAME";
    pub const CALL_PASSWORD: &str = "CALLREC_CALL_PASSWORD";
}

pub struct ScriptCallSession {
    config: SessionConfig,
    call: Mutex<Option<CallParams>>,
    publisher: Mutex<Option<StatusPublisher>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ScriptCallSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            call: Mutex::new(None),
            publisher: Mutex::new(None),
            watcher: Mutex::new(None),
        }
    }

    fn current_call(&self) -> CallParams {
        self.call
            .lock()
            .map(|call| call.clone().unwrap_or_default())
            .unwrap_or_default()
    }

    fn command(command: &str, call: &CallParams) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .env(session_env::CALL_URL, &call.url)
            .env(session_env::CALL_NAME, &call.name)
            .env(
                session_env::CALL_USERNAME,
                call.username.as_deref().unwrap_or(""),
            )
            .env(
                session_env::CALL_PASSWORD,
                call.password.as_deref().unwrap_or(""),
            )
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, step: &str, command: &str, call: &CallParams) -> Result<Vec<u8>> {
        debug!("Running session {} command: {}", step, command);

        let output = Self::command(command, call)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run session {} command", step))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Session {} command exited with {}: {}",
                step,
                output.status,
                stderr.trim()
            );
        }

        Ok(output.stdout)
    }

    /// Spawn the watch command; its exit is reported as a session-health event.
    fn spawn_watcher(&self, command: &str, call: &CallParams) {
        let publisher = self.publisher.lock().ok().and_then(|slot| slot.clone());
        let Some(publisher) = publisher else {
            warn!("Watch command configured but no status handler registered");
            return;
        };

        let mut cmd = Self::command(command, call);
        cmd.stdout(Stdio::null()).stderr(Stdio::inherit());

        let handle = tokio::spawn(async move {
            let status = match cmd.status().await {
                Ok(status) if status.success() => {
                    info!("Session watch command reports the call has ended");
                    ServiceStatus::Finished
                }
                Ok(status) => {
                    error!("Session watch command exited with {}", status);
                    ServiceStatus::Error
                }
                Err(e) => {
                    error!("Failed to run session watch command: {}", e);
                    ServiceStatus::Error
                }
            };
            publisher.publish(status);
        });

        if let Ok(mut slot) = self.watcher.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
    }

    fn stop_watcher(&self) {
        if let Ok(mut slot) = self.watcher.lock() {
            if let Some(handle) = slot.take() {
                debug!("Stopping session watch command");
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl CallSession for ScriptCallSession {
    async fn join(&self, call: &CallParams) -> Result<()> {
        if let Ok(mut current) = self.call.lock() {
            *current = Some(call.clone());
        }

        match &self.config.join_command {
            Some(command) => {
                self.run("join", command, call).await?;
                info!("Joined call {}", call.url);
            }
            None => info!("No join command configured, assuming call {} is joined", call.url),
        }

        if let Some(command) = &self.config.watch_command {
            self.spawn_watcher(command, call);
        }
        Ok(())
    }

    async fn leave(&self) -> Result<()> {
        self.stop_watcher();

        let Some(command) = &self.config.leave_command else {
            debug!("No leave command configured");
            return Ok(());
        };

        let call = self.current_call();
        self.run("leave", command, &call).await?;
        info!("Left call {}", call.url);
        Ok(())
    }

    async fn participants(&self) -> Result<Vec<Participant>> {
        let Some(command) = &self.config.participants_command else {
            debug!("No participants command configured, roster is empty");
            return Ok(Vec::new());
        };

        let call = self.current_call();
        let stdout = self.run("participants", command, &call).await?;
        let participants: Vec<Participant> = serde_json::from_slice(&stdout)
            .context("Participants command did not print a JSON participant list")?;

        debug!("Roster has {} participants", participants.len());
        Ok(participants)
    }

    fn register_status_handler(&self, publisher: StatusPublisher) {
        match self.publisher.lock() {
            Ok(mut slot) => *slot = Some(publisher),
            Err(e) => warn!("Failed to register session status handler: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> CallParams {
        CallParams {
            url: "https://meet.example.com/abc-defg-hij".to_string(),
            name: "standup".to_string(),
            username: Some("bot".to_string()),
            password: None,
        }
    }

    #[test]
    fn test_session_env_constants() {
        assert_eq!(session_env::CALL_URL, "CALLREC_CALL_URL");
        assert_eq!(session_env::CALL_NAME, "CALLREC_CALL_NAME");
        assert_eq!(session_env::CALL_USERNAME, "CALLREC_CALL_USERNAME");
        assert_eq!(session_env::CALL_PASSWORD, "CALLREC_CALL_PASSWORD");
    }

    #[tokio::test]
    async fn test_unconfigured_session_is_noop() {
        let session = ScriptCallSession::new(SessionConfig::default());
        assert!(session.join(&call()).await.is_ok());
        assert!(session.participants().await.unwrap().is_empty());
        assert!(session.leave().await.is_ok());
    }

    #[tokio::test]
    async fn test_join_failure() {
        let session = ScriptCallSession::new(SessionConfig {
            join_command: Some("echo 'room full' >&2; exit 2".to_string()),
            ..SessionConfig::default()
        });

        let err = session.join(&call()).await.unwrap_err();
        assert!(err.to_string().contains("room full"));
    }

    #[tokio::test]
    async fn test_join_receives_call_env() {
        let session = ScriptCallSession::new(SessionConfig {
            join_command: Some(
                "test \"$CALLREC_CALL_URL\" = https://meet.example.com/abc-defg-hij \
                 && test \"$CALLREC_CALL_USERNAME\" = bot"
                    .to_string(),
            ),
            ..SessionConfig::default()
        });

        assert!(session.join(&call()).await.is_ok());
    }

    #[tokio::test]
    async fn test_participants_parsed_from_stdout() {
        let session = ScriptCallSession::new(SessionConfig {
            participants_command: Some(
                r#"echo '[{"id":"1","name":"Ada"},{"name":"Grace"}]'"#.to_string(),
            ),
            ..SessionConfig::default()
        });
        session.join(&call()).await.unwrap();

        let roster = session.participants().await.unwrap();
        assert_eq!(
            roster,
            vec![
                Participant {
                    id: Some("1".to_string()),
                    name: "Ada".to_string()
                },
                Participant::new("Grace"),
            ]
        );
    }

    #[tokio::test]
    async fn test_watch_command_publishes_session_status() {
        let session = ScriptCallSession::new(SessionConfig {
            watch_command: Some("exit 1".to_string()),
            ..SessionConfig::default()
        });
        let publisher = StatusPublisher::silent();
        session.register_status_handler(publisher.clone());

        session.join(&call()).await.unwrap();
        for _ in 0..50 {
            if publisher.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert_eq!(publisher.published(), Some(ServiceStatus::Error));
    }

    #[tokio::test]
    async fn test_leave_stops_watcher() {
        let session = ScriptCallSession::new(SessionConfig {
            watch_command: Some("sleep 5".to_string()),
            ..SessionConfig::default()
        });
        let publisher = StatusPublisher::silent();
        session.register_status_handler(publisher.clone());

        session.join(&call()).await.unwrap();
        session.leave().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(publisher.published().is_none());
    }

    #[tokio::test]
    async fn test_participants_invalid_json() {
        let session = ScriptCallSession::new(SessionConfig {
            participants_command: Some("echo not-json".to_string()),
            ..SessionConfig::default()
        });

        assert!(session.participants().await.is_err());
    }
}
