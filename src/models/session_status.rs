//! Session Status Model
//!
//! Lifecycle of one session. Only the launch path (to `BuildError` /
//! `SpawnError` / `Running`) and the output relay (to `Finished`) move it;
//! cancellation never does.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Represents the state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Workspace materialized, nothing launched yet
    #[default]
    Starting,
    /// Program attached to its terminal
    Running,
    /// Relay finalized the session
    Finished,
    /// Toolchain rejected the source
    BuildError,
    /// Terminal allocation or process launch failed
    SpawnError,
}

impl SessionStatus {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Starting, Running) | (Starting, BuildError) | (Starting, SpawnError) | (Running, Finished)
        )
    }

    /// No further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Finished | SessionStatus::BuildError | SessionStatus::SpawnError
        )
    }

    /// Status reported to the caller once this state is reached
    pub fn terminal_status(self) -> Option<TerminalStatus> {
        match self {
            SessionStatus::Finished => Some(TerminalStatus::Finished),
            SessionStatus::BuildError | SessionStatus::SpawnError => Some(TerminalStatus::Error),
            SessionStatus::Starting | SessionStatus::Running => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Starting => "starting",
            SessionStatus::Running => "running",
            SessionStatus::Finished => "finished",
            SessionStatus::BuildError => "build-error",
            SessionStatus::SpawnError => "spawn-error",
        };
        f.write_str(name)
    }
}

/// Publish `next` if it is a legal successor of the current value
///
/// Returns whether the transition was applied; rejected transitions are
/// logged and leave the status untouched.
pub fn advance(tx: &watch::Sender<SessionStatus>, next: SessionStatus) -> bool {
    let mut applied = false;
    tx.send_if_modified(|current| {
        if current.can_transition_to(next) {
            *current = next;
            applied = true;
        } else {
            warn!("Rejected session status transition {} -> {}", current, next);
        }
        applied
    });
    applied
}

/// The one status event every run ends with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalStatus {
    Error,
    Finished,
}
