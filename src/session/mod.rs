//! Sessions
//!
//! A session is one running program. The relay task owns its terminal and
//! workspace; everything else reaches it through a [`SessionControl`].
//! [`SessionManager`] keeps at most one current session per caller.

pub mod manager;

pub use manager::SessionManager;

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::Result;
use crate::pty::{SignalDelivery, TerminalControl};

/// Identity of a caller, usually one connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    /// A fresh random identity
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ClientId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Input and cancellation for one session
#[derive(Debug, Clone)]
pub struct SessionControl {
    session_id: String,
    terminal: TerminalControl,
    wake: Arc<Notify>,
}

impl SessionControl {
    pub fn new(session_id: String, terminal: TerminalControl, wake: Arc<Notify>) -> Self {
        Self {
            session_id,
            terminal,
            wake,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Pid of the program, which is also its process group id
    pub fn pid(&self) -> u32 {
        self.terminal.process_group().id() as u32
    }

    /// Type `text` followed by Enter
    ///
    /// A terminal that is already gone is logged and otherwise ignored.
    pub fn forward_input(&self, text: &str) {
        if let Err(e) = self.terminal.write_line(text) {
            warn!("Input for session {} dropped: {}", self.session_id, e);
        }
    }

    /// SIGTERM the process group and wake the relay at once
    pub fn cancel(&self) -> Result<SignalDelivery> {
        let delivery = self.terminal.terminate();
        self.wake.notify_one();
        match &delivery {
            Ok(SignalDelivery::Delivered) => {
                info!("Session {} cancelled", self.session_id)
            }
            Ok(SignalDelivery::AlreadyGone) => {
                debug!("Session {} already gone at cancel", self.session_id)
            }
            Err(e) => warn!("Cancelling session {} failed: {}", self.session_id, e),
        }
        delivery
    }

    /// SIGKILL the process group
    pub fn force_kill(&self) -> Result<SignalDelivery> {
        let delivery = self.terminal.kill();
        self.wake.notify_one();
        if let Ok(SignalDelivery::Delivered) = delivery {
            warn!(
                "Session {} ignored SIGTERM, sent SIGKILL",
                self.session_id
            );
        }
        delivery
    }
}

/// Snapshot of a caller's current session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: String,
    pub status: crate::models::SessionStatus,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}
