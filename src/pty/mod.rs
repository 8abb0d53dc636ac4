//! Pseudoterminal (PTY) Sessions
//!
//! Launching a program on its own terminal, the split reader/control halves
//! used by the relay and the session layer, and process-group signaling.

pub mod process;
pub mod signals;
pub mod streams;

// Re-exports for convenience
pub use process::{RunCommand, TerminalSession};
pub use signals::{ProcessGroup, Signal, SignalDelivery};
pub use streams::{ReadEvent, TerminalControl, TerminalReader};
