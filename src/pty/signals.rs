//! Process Group Signaling
//!
//! A launched program leads its own session, so its process group id equals
//! its pid. Signals go to the whole group so children the program spawned
//! are reached too.

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal as NixSignal};
use nix::unistd::{getpgid, Pid};

use crate::error::{Error, Result};

/// Signal types that can be sent to a process group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Interrupt signal (Ctrl+C)
    Interrupt,
    /// Termination signal (graceful shutdown)
    Terminate,
    /// Kill signal (forceful termination)
    Kill,
    /// Hangup signal
    Hangup,
}

impl Signal {
    fn to_nix(self) -> NixSignal {
        match self {
            Signal::Interrupt => NixSignal::SIGINT,
            Signal::Terminate => NixSignal::SIGTERM,
            Signal::Kill => NixSignal::SIGKILL,
            Signal::Hangup => NixSignal::SIGHUP,
        }
    }
}

/// What happened to a signal that did not fail outright
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDelivery {
    Delivered,
    /// No process is left in the group
    AlreadyGone,
}

/// Handle on the process group of a launched program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGroup {
    pgid: i32,
}

impl ProcessGroup {
    /// Group led by `pid`
    ///
    /// Asks the kernel for the group id and falls back to `pid` itself when
    /// the process is already gone.
    pub fn of_leader(pid: u32) -> Self {
        let pid = Pid::from_raw(pid as i32);
        let pgid = match getpgid(Some(pid)) {
            Ok(pgid) => pgid.as_raw(),
            Err(e) => {
                debug!("getpgid({}) failed: {}, assuming session leader", pid, e);
                pid.as_raw()
            }
        };
        Self { pgid }
    }

    pub fn id(&self) -> i32 {
        self.pgid
    }

    /// Send `signal` to every process in the group
    pub fn signal(&self, signal: Signal) -> Result<SignalDelivery> {
        match killpg(Pid::from_raw(self.pgid), signal.to_nix()) {
            Ok(()) => {
                debug!("Sent {:?} to process group {}", signal, self.pgid);
                Ok(SignalDelivery::Delivered)
            }
            Err(Errno::ESRCH) => Ok(SignalDelivery::AlreadyGone),
            Err(e) => Err(Error::SignalSendFailed {
                signal: format!("{:?}", signal),
                reason: e.to_string(),
            }),
        }
    }

    /// Send termination signal (graceful shutdown)
    pub fn terminate(&self) -> Result<SignalDelivery> {
        self.signal(Signal::Terminate)
    }

    /// Send kill signal (forceful termination)
    pub fn kill(&self) -> Result<SignalDelivery> {
        self.signal(Signal::Kill)
    }

    /// At least one process of the group still exists
    pub fn is_alive(&self) -> bool {
        killpg(Pid::from_raw(self.pgid), None::<NixSignal>).is_ok()
    }
}
