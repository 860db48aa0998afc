//! Call session abstraction.
//!
//! Joining and leaving the call and reading its roster happen outside this
//! crate (browser automation, a bot SDK, ...). The recording service only
//! depends on this trait.

pub mod script;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::recording::status::StatusPublisher;

pub use script::ScriptCallSession;

/// Identity and credentials of the call to record.
#[derive(Debug, Clone, Default)]
pub struct CallParams {
    pub url: String,
    pub name: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// One roster entry as reported by the call session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

impl Participant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

#[async_trait]
pub trait CallSession: Send + Sync {
    async fn join(&self, call: &CallParams) -> Result<()>;

    /// Leave the call and tear down whatever the join set up.
    async fn leave(&self) -> Result<()>;

    /// Current roster, in the order the session reports it.
    async fn participants(&self) -> Result<Vec<Participant>>;

    /// Session-health events (call ended, kicked, crashed) are reported by
    /// publishing a terminal status through `publisher`.
    fn register_status_handler(&self, publisher: StatusPublisher);
}
