//! Terminal Session Launch
//!
//! Opens a pseudo-terminal, switches off echo on its line discipline, spawns
//! the run command on the subordinate side and bridges the controlling side
//! to async code through two threads and a pair of channels.

use portable_pty::{
    native_pty_system, Child, CommandBuilder, MasterPty, PtyPair, PtySize,
};
use std::io::{Read, Write};
use std::os::fd::BorrowedFd;
use std::sync::mpsc::{channel, Sender};
use std::thread;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, OutputFlags, SetArg};

use super::signals::ProcessGroup;
use super::streams::{TerminalControl, TerminalReader, WriterMessage};
use crate::config::{PtyConfig, ToolchainConfig};
use crate::error::{Error, Result};
use crate::models::Language;
use crate::workspace::Workspace;

/// Program and arguments to run on the terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl RunCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The built artifact for compiled runs, the interpreter for scripts
    pub fn for_workspace(workspace: &Workspace, toolchain: &ToolchainConfig) -> Result<Self> {
        match workspace.language() {
            Language::CompiledNative => {
                let artifact = workspace.artifact_path().ok_or_else(|| {
                    Error::Other(format!(
                        "workspace {} has no artifact path",
                        workspace.token()
                    ))
                })?;
                Ok(Self::new(artifact.to_string_lossy(), Vec::new()))
            }
            Language::InterpretedScripting => {
                let mut args = toolchain.interpreter_args.clone();
                args.push(workspace.source_path().to_string_lossy().into_owned());
                Ok(Self::new(toolchain.interpreter.clone(), args))
            }
        }
    }

    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// A program running on its own pseudo-terminal
pub struct TerminalSession {
    pid: u32,
    command: String,
    child: Box<dyn Child + Send + Sync>,
    master: Box<dyn MasterPty + Send>,
    output_rx: UnboundedReceiver<Vec<u8>>,
    input_tx: Sender<WriterMessage>,
    group: ProcessGroup,
}

impl TerminalSession {
    /// Spawn `command` attached to a fresh terminal
    ///
    /// The child becomes a session leader (and so leads a new process group)
    /// with the scratch root as working directory. The subordinate handle is
    /// closed on return; on any failure the controlling handle is closed too.
    pub fn launch(
        workspace: &Workspace,
        command: &RunCommand,
        pty: &PtyConfig,
        chunk_size: usize,
    ) -> Result<Self> {
        let command_line = command.display();

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: pty.rows,
                cols: pty.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::PtyCreationFailed {
                command: command_line.clone(),
                reason: e.to_string(),
            })?;

        // Returning early drops `pair`, which closes both sides
        configure_line_discipline(pair.master.as_ref(), pty.translate_newlines)?;

        let mut cmd_builder = CommandBuilder::new(&command.program);
        cmd_builder.args(&command.args);
        cmd_builder.cwd(workspace.root());
        for (key, value) in &pty.environment {
            cmd_builder.env(key, value);
        }

        let PtyPair { master, slave } = pair;
        let spawned = slave.spawn_command(cmd_builder);
        drop(slave);
        let mut child = spawned.map_err(|e| Error::CommandSpawnFailed {
            command: command_line.clone(),
            reason: e.to_string(),
        })?;

        let Some(pid) = child.process_id() else {
            if let Err(e) = child.kill() {
                debug!("Killing pid-less child failed: {}", e);
            }
            return Err(Error::NoPidAvailable { command: command_line });
        };
        let group = ProcessGroup::of_leader(pid);

        let (output_rx, input_tx) = match create_terminal_streams(master.as_ref(), chunk_size) {
            Ok(streams) => streams,
            Err(e) => {
                if let Err(kill_err) = group.kill() {
                    debug!("Killing pid {} after stream setup failure: {}", pid, kill_err);
                }
                return Err(e);
            }
        };

        info!("Launched '{}' (pid {}, pgid {})", command_line, pid, group.id());

        Ok(Self {
            pid,
            command: command_line,
            child,
            master,
            output_rx,
            input_tx,
            group,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn process_group(&self) -> ProcessGroup {
        self.group
    }

    /// Split into the relay-owned reader and the shareable control half
    pub fn split(self) -> (TerminalReader, TerminalControl) {
        let reader = TerminalReader::new(
            self.pid,
            self.group,
            self.child,
            self.master,
            self.output_rx,
            self.input_tx.clone(),
        );
        let control = TerminalControl::new(self.input_tx, self.group);
        (reader, control)
    }
}

impl std::fmt::Debug for TerminalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalSession")
            .field("pid", &self.pid)
            .field("command", &self.command)
            .field("group", &self.group)
            .finish()
    }
}

/// Turn off `ECHO`, and `ONLCR` unless newline translation is wanted
fn configure_line_discipline(master: &dyn MasterPty, translate_newlines: bool) -> Result<()> {
    let fd = master.as_raw_fd().ok_or_else(|| Error::EchoDisableFailed {
        reason: "controlling side has no file descriptor".to_string(),
    })?;
    // SAFETY: `master` owns `fd` and outlives this borrow
    let fd = unsafe { BorrowedFd::borrow_raw(fd) };

    let mut attrs = tcgetattr(fd).map_err(|e| Error::EchoDisableFailed {
        reason: e.to_string(),
    })?;
    attrs.local_flags.remove(LocalFlags::ECHO);
    if !translate_newlines {
        attrs.output_flags.remove(OutputFlags::ONLCR);
    }
    tcsetattr(fd, SetArg::TCSANOW, &attrs).map_err(|e| Error::EchoDisableFailed {
        reason: e.to_string(),
    })
}

/// Bridge blocking terminal I/O to async code via channels and threads
fn create_terminal_streams(
    master: &dyn MasterPty,
    chunk_size: usize,
) -> Result<(UnboundedReceiver<Vec<u8>>, Sender<WriterMessage>)> {
    let mut master_reader = master
        .try_clone_reader()
        .map_err(|e| Error::PtyReaderCloneFailed {
            reason: e.to_string(),
        })?;
    let mut master_writer = master.take_writer().map_err(|e| Error::PtyWriterTakeFailed {
        reason: e.to_string(),
    })?;

    // Channel: terminal output -> relay
    let (tx_out, rx_out) = unbounded_channel::<Vec<u8>>();
    // Channel: caller input -> writer thread
    let (tx_in, rx_in) = channel::<WriterMessage>();

    // Reader thread: one chunk per read, in order. Exiting closes `tx_out`,
    // which the relay sees as end of stream.
    thread::spawn(move || {
        let mut buf = vec![0u8; chunk_size];
        loop {
            match master_reader.read(&mut buf) {
                Ok(0) => {
                    debug!("Terminal read EOF");
                    break;
                }
                Ok(n) => {
                    if tx_out.send(buf[..n].to_vec()).is_err() {
                        debug!("Terminal read: relay gone, stopping reader thread");
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // EIO once the subordinate side has no more holders
                    debug!("Terminal read ended ({}): {}", e.kind(), e);
                    break;
                }
            }
        }
        debug!("Terminal reader thread exiting");
    });

    // Writer thread: runs until told to close or every sender is dropped
    thread::spawn(move || {
        while let Ok(message) = rx_in.recv() {
            let data = match message {
                WriterMessage::Data(data) => data,
                WriterMessage::Close => break,
            };
            let written = master_writer
                .write_all(&data)
                .and_then(|()| master_writer.flush());
            if let Err(e) = written {
                warn!("Terminal write failed ({}): {}", e.kind(), e);
                if e.kind() != std::io::ErrorKind::Interrupted {
                    break;
                }
            }
        }
        debug!("Terminal writer thread exiting");
    });

    Ok((rx_out, tx_in))
}
