//! Terminal Streams
//!
//! The two halves of a launched terminal session. The reader half owns the
//! child, the controlling side and the output channel and belongs to the
//! relay task; the control half is cheap to clone and is what input and
//! cancellation go through.

use portable_pty::{Child, ExitStatus, MasterPty};
use std::sync::mpsc::Sender as StdSender;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

use super::signals::{ProcessGroup, SignalDelivery};
use crate::error::{Error, Result};

/// Result of one bounded wait for output
#[derive(Debug, PartialEq, Eq)]
pub enum ReadEvent {
    /// A chunk of raw terminal output
    Data(Vec<u8>),
    /// Nothing arrived within the wait
    Idle,
    /// The reader thread is gone: end of stream or read error
    Closed,
}

/// Messages for the writer thread
#[derive(Debug)]
pub(crate) enum WriterMessage {
    Data(Vec<u8>),
    /// Drop the writer's handle on the controlling side and exit
    Close,
}

/// Read half, owned by the relay
pub struct TerminalReader {
    pid: u32,
    group: ProcessGroup,
    child: Box<dyn Child + Send + Sync>,
    master: Option<Box<dyn MasterPty + Send>>,
    output_rx: UnboundedReceiver<Vec<u8>>,
    writer_tx: StdSender<WriterMessage>,
}

impl TerminalReader {
    pub(crate) fn new(
        pid: u32,
        group: ProcessGroup,
        child: Box<dyn Child + Send + Sync>,
        master: Box<dyn MasterPty + Send>,
        output_rx: UnboundedReceiver<Vec<u8>>,
        writer_tx: StdSender<WriterMessage>,
    ) -> Self {
        Self {
            pid,
            group,
            child,
            master: Some(master),
            output_rx,
            writer_tx,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Wait up to `wait` for the next chunk
    pub async fn read_with_timeout(&mut self, wait: Duration) -> ReadEvent {
        match timeout(wait, self.output_rx.recv()).await {
            Ok(Some(bytes)) => ReadEvent::Data(bytes),
            Ok(None) => ReadEvent::Closed,
            Err(_) => ReadEvent::Idle,
        }
    }

    /// Take a chunk that is already queued, without waiting
    pub fn try_read_now(&mut self) -> ReadEvent {
        match self.output_rx.try_recv() {
            Ok(bytes) => ReadEvent::Data(bytes),
            Err(TryRecvError::Empty) => ReadEvent::Idle,
            Err(TryRecvError::Disconnected) => ReadEvent::Closed,
        }
    }

    /// Non-blocking exit check
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().map_err(Error::Io)
    }

    /// Close the controlling side, including the writer thread's handle
    ///
    /// Idempotent. The child sees a hangup if it is still attached; input
    /// sent afterwards fails with `PtyInputSendFailed`.
    pub fn close(&mut self) {
        if self.master.take().is_some() {
            // Err only if the writer thread already exited
            let _ = self.writer_tx.send(WriterMessage::Close);
            debug!("Closed controlling terminal for pid {}", self.pid);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.master.is_none()
    }

    /// Close the controlling side and give up the child
    ///
    /// A child that has not exited yet is waited for on a background thread
    /// so it never lingers as a zombie; closing the terminal has already sent
    /// it a hangup. Descendants that outlive an exited child are killed, as
    /// they would otherwise hold the terminal and its reader thread open.
    pub fn release(mut self) -> Option<ExitStatus> {
        self.close();
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.kill_stragglers();
                return Some(status);
            }
            Ok(None) => {}
            Err(e) => debug!("try_wait on pid {} failed during release: {}", self.pid, e),
        }

        let pid = self.pid;
        let mut child = self.child;
        std::thread::spawn(move || match child.wait() {
            Ok(status) => debug!("Reaped pid {} after release: {:?}", pid, status),
            Err(e) => debug!("wait on pid {} failed: {}", pid, e),
        });
        None
    }

    fn kill_stragglers(&self) {
        if !self.group.is_alive() {
            return;
        }
        match self.group.kill() {
            Ok(SignalDelivery::Delivered) => warn!(
                "Killed processes left in group {} after pid {} exited",
                self.group.id(),
                self.pid
            ),
            Ok(SignalDelivery::AlreadyGone) => {}
            Err(e) => warn!("Killing leftovers of group {} failed: {}", self.group.id(), e),
        }
    }
}

impl std::fmt::Debug for TerminalReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalReader")
            .field("pid", &self.pid)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Control half: input and signals
#[derive(Debug, Clone)]
pub struct TerminalControl {
    input_tx: StdSender<WriterMessage>,
    group: ProcessGroup,
}

impl TerminalControl {
    pub(crate) fn new(input_tx: StdSender<WriterMessage>, group: ProcessGroup) -> Self {
        Self { input_tx, group }
    }

    /// Queue raw bytes for the writer thread
    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.input_tx
            .send(WriterMessage::Data(data.to_vec()))
            .map_err(|e| Error::PtyInputSendFailed {
                reason: e.to_string(),
            })
    }

    /// Send one line, as if typed and followed by Enter
    pub fn write_line(&self, text: &str) -> Result<()> {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(b'\n');
        self.write(&bytes)
    }

    pub fn process_group(&self) -> ProcessGroup {
        self.group
    }

    /// SIGTERM to the whole group
    pub fn terminate(&self) -> Result<SignalDelivery> {
        self.group.terminate()
    }

    /// SIGKILL to the whole group
    pub fn kill(&self) -> Result<SignalDelivery> {
        self.group.kill()
    }
}
