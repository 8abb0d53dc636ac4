//! runterm - interactive program sessions over a pseudo-terminal
//!
//! A caller submits source code, runterm builds it when the language needs
//! a build step, runs the program on a pseudo-terminal, and relays the
//! terminal's output back as events while forwarding the caller's input to
//! the program. Runs can be stopped at any time, and every run's scratch
//! files are removed when it ends.
//!
//! ## Module Organization
//!
//! - [`config`] - Configuration loading, defaults and validation
//! - [`models`] - Languages, run requests, the session status machine
//! - [`workspace`] - Scratch files for one run
//! - [`builder`] - Compiling native sources with a time limit
//! - [`pty`] - Pseudo-terminal launch, streams and process-group signals
//! - [`relay`] - Output relay and finalization of a session
//! - [`session`] - Per-caller session registry
//! - [`protocol`] - Inbound and outbound events
//! - [`server`] - HTTP / WebSocket transport
//! - [`mod@error`] - Error types and Result aliases
//!
//! ## Quick Start
//!
//! ```no_run
//! use runterm::{create_app, run_server, Config, SessionManager};
//!
//! # async fn start() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let addr = config.server.bind_addr();
//! let app = create_app(SessionManager::new(config));
//! run_server(app, addr).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Tokio runtime:** transport, session registry, builds and relays
//! - **PTY reader threads:** blocking reads from the terminal master
//! - **PTY writer threads:** blocking writes of caller input
//!
//! Reader threads hand output to the relay over `tokio::mpsc`; status
//! changes are published on a `tokio::sync::watch` channel per session.
//!
//! ## Platform Support
//!
//! Unix only: cancellation signals the program's process group.

#![allow(unexpected_cfgs)]

#[macro_use]
extern crate tracing;

pub mod builder;
pub mod config;
pub mod error;
pub mod models;
pub mod protocol;
pub mod pty;
pub mod relay;
pub mod server;
pub mod session;
pub mod workspace;

// Re-exports for core functionality
pub use config::{Config, RunPolicy};
pub use error::{Error, Result};
pub use models::{Language, RunRequest, SessionStatus, TerminalStatus};
pub use protocol::{ClientEvent, EventSink, ServerEvent};
pub use session::{ClientId, SessionManager};

// Convenience re-exports for common types
pub use config::loader::ConfigLoader;
pub use server::{create_app, run_server, run_server_with_shutdown, ServerError};

/// The current version of runterm from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The package name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// The package description from Cargo.toml
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
