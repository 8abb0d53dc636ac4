//! Wire protocol
//!
//! Events exchanged with a remote caller. Each message is a JSON object
//! `{"event": <name>, "data": <payload>}`, using the event names the browser
//! client already speaks.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::{Error, Result};
use crate::models::TerminalStatus;

/// Acknowledgement sent as soon as a stop request is handled
pub const STOP_ACK: &str = "\n[program stopped]\n";

/// Inbound events from a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Build (if needed) and run `code`
    #[serde(rename = "run_code_v2")]
    RunCode {
        code: String,
        /// Missing means C++
        #[serde(default)]
        lang: Option<String>,
    },
    /// One line of keyboard input; a newline is appended on delivery
    #[serde(rename = "send_input")]
    SendInput { input: String },
    /// Stop the running program
    #[serde(rename = "stop_code")]
    StopCode,
}

impl ClientEvent {
    /// Parse a text frame
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::RunCode { .. } => "run_code_v2",
            ClientEvent::SendInput { .. } => "send_input",
            ClientEvent::StopCode => "stop_code",
        }
    }
}

/// Outbound events to a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A piece of terminal output, in production order
    ProgramOutput { data: String },
    /// The last event of every run
    ProgramStatus { status: TerminalStatus },
}

impl ServerEvent {
    pub fn output(data: impl Into<String>) -> Self {
        ServerEvent::ProgramOutput { data: data.into() }
    }

    pub fn status(status: TerminalStatus) -> Self {
        ServerEvent::ProgramStatus { status }
    }

    /// Serialize to a text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whether this event ends a run
    pub fn is_status(&self) -> bool {
        matches!(self, ServerEvent::ProgramStatus { .. })
    }
}

/// Outbound half handed to sessions
///
/// Sends never fail from the sender's point of view: a caller that has gone
/// away simply stops receiving.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: UnboundedSender<ServerEvent>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<ServerEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiver a transport drains
    pub fn channel() -> (Self, UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Emit output text; empty text is dropped
    pub fn output(&self, data: impl Into<String>) {
        let data = data.into();
        if data.is_empty() {
            return;
        }
        self.send(ServerEvent::output(data));
    }

    pub fn status(&self, status: TerminalStatus) {
        self.send(ServerEvent::status(status));
    }

    /// Report a failure as an output/status pair
    pub fn fail(&self, err: &Error) {
        self.output(err.user_message());
        self.status(TerminalStatus::Error);
    }

    /// The receiving side has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, event: ServerEvent) {
        if self.tx.send(event).is_err() {
            debug!("Dropping outbound event: caller is gone");
        }
    }
}
