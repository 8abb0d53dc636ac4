//! Output Relay
//!
//! One task per session. It waits a bounded time for terminal output,
//! forwards what arrives, watches for the child exiting and, whatever ends
//! the loop, finalizes the session exactly once.
//!
//! Finalization order is fixed: close the terminal, remove the workspace,
//! flush the decoder, publish `Finished`, emit `status: finished`. The status
//! event is therefore always the last event of a run, and by the time a
//! caller sees it the scratch files are gone.

pub mod decoder;

pub use decoder::LossyDecoder;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;

use crate::models::{advance, SessionStatus, TerminalStatus};
use crate::protocol::EventSink;
use crate::pty::{ReadEvent, TerminalReader};
use crate::workspace::Workspace;

/// Why the relay loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The output stream closed before an exit was observed
    EndOfStream,
    /// The child exited with this code
    ProcessExited(u32),
    /// Polling the child failed
    ReadError,
}

/// Relay task state
pub struct OutputRelay {
    session_id: String,
    reader: TerminalReader,
    workspace: Workspace,
    sink: EventSink,
    status_tx: watch::Sender<SessionStatus>,
    wake: Arc<Notify>,
    poll_interval: Duration,
    decoder: LossyDecoder,
}

impl OutputRelay {
    pub fn new(
        session_id: String,
        reader: TerminalReader,
        workspace: Workspace,
        sink: EventSink,
        status_tx: watch::Sender<SessionStatus>,
        wake: Arc<Notify>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            session_id,
            reader,
            workspace,
            sink,
            status_tx,
            wake,
            poll_interval,
            decoder: LossyDecoder::new(),
        }
    }

    /// Relay until the session ends, then finalize
    pub async fn run(mut self) -> RelayEnd {
        debug!(
            "Relay for session {} started (pid {})",
            self.session_id,
            self.reader.pid()
        );
        let end = self.pump().await;
        info!("Session {} ended: {:?}", self.session_id, end);
        self.finalize();
        end
    }

    async fn pump(&mut self) -> RelayEnd {
        let wake = Arc::clone(&self.wake);
        loop {
            let event = tokio::select! {
                event = self.reader.read_with_timeout(self.poll_interval) => event,
                _ = wake.notified() => {
                    debug!("Relay for session {} woken by cancel", self.session_id);
                    ReadEvent::Idle
                }
            };

            match event {
                ReadEvent::Data(bytes) => self.forward(&bytes),
                ReadEvent::Closed => return RelayEnd::EndOfStream,
                ReadEvent::Idle => {}
            }

            match self.reader.try_wait() {
                Ok(Some(status)) => {
                    self.drain().await;
                    return RelayEnd::ProcessExited(status.exit_code());
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Polling session {} child failed: {}", self.session_id, e);
                    return RelayEnd::ReadError;
                }
            }
        }
    }

    /// Forward output still in flight after exit, bounded by one poll interval
    async fn drain(&mut self) {
        let deadline = Instant::now() + self.poll_interval;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                // Anything already queued still goes out
                while let ReadEvent::Data(bytes) = self.reader.try_read_now() {
                    self.forward(&bytes);
                }
                return;
            }
            match self.reader.read_with_timeout(remaining).await {
                ReadEvent::Data(bytes) => self.forward(&bytes),
                ReadEvent::Closed | ReadEvent::Idle => return,
            }
        }
    }

    fn forward(&mut self, bytes: &[u8]) {
        let text = self.decoder.decode(bytes);
        self.sink.output(text);
    }

    fn finalize(self) {
        let Self {
            session_id,
            reader,
            mut workspace,
            sink,
            status_tx,
            mut decoder,
            ..
        } = self;

        if let Some(status) = reader.release() {
            debug!("Session {} child exit status: {:?}", session_id, status);
        }

        let report = workspace.cleanup();
        for (path, e) in report.failures() {
            warn!(
                "Session {} left {} behind: {}",
                session_id,
                path.display(),
                e
            );
        }

        sink.output(decoder.finish());
        advance(&status_tx, SessionStatus::Finished);
        sink.status(TerminalStatus::Finished);
    }
}

impl std::fmt::Debug for OutputRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputRelay")
            .field("session_id", &self.session_id)
            .field("reader", &self.reader)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
