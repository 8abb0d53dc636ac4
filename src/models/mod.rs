//! Core data models for runterm
//!
//! This module contains the domain entities shared by the workspace,
//! builder, terminal and session layers: the language selector, the
//! immutable run request, and the session status state machine.

pub mod language;
pub mod run_request;
pub mod session_status;

// Re-exports for convenience
pub use language::Language;
pub use run_request::RunRequest;
pub use session_status::{advance, SessionStatus, TerminalStatus};
