//! Configuration management for runterm
//!
//! Server, workspace, toolchain, relay, terminal and session settings, with
//! `Default` values for a single local deployment and validation of the
//! options the relay recognizes.

pub mod loader;

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Poll intervals (milliseconds) the relay accepts
pub const RECOGNIZED_POLL_INTERVALS_MS: &[u64] = &[10, 25, 50, 100, 250, 500];

/// Read chunk sizes (bytes) the relay accepts
pub const RECOGNIZED_CHUNK_SIZES: &[usize] = &[256, 512, 1024, 2048, 4096, 8192];

/// Main configuration structure for runterm
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP/WebSocket listener
    pub server: ServerConfig,

    /// Scratch files for each run
    pub workspace: WorkspaceConfig,

    /// External compiler and interpreter
    pub toolchain: ToolchainConfig,

    /// Output relay loop
    pub relay: RelayConfig,

    /// Pseudo-terminal settings
    pub pty: PtyConfig,

    /// Session registry policy
    pub sessions: SessionConfig,
}

impl Config {
    /// Check every section, returning the first offending field
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.workspace.validate()?;
        self.toolchain.validate()?;
        self.relay.validate()?;
        self.pty.validate()?;
        self.sessions.validate()?;
        Ok(())
    }

    /// Apply `PORT` and `RUNTERM_SCRATCH_ROOT` from the environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port.trim().parse().map_err(|_| Error::ConfigValidationFailed {
                field: "PORT".to_string(),
                reason: format!("'{}' is not a valid port", port),
            })?;
        }
        if let Ok(root) = std::env::var("RUNTERM_SCRATCH_ROOT") {
            if !root.trim().is_empty() {
                self.workspace.scratch_root = PathBuf::from(root);
            }
        }
        Ok(())
    }
}

/// HTTP/WebSocket listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: IpAddr,

    /// Port to bind
    pub port: u16,

    /// Page served at `/` when present
    pub index_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5000,
            index_path: PathBuf::from("index.html"),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::ConfigValidationFailed {
                field: "server.port".to_string(),
                reason: "Port must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Scratch file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory holding source files and build artifacts
    pub scratch_root: PathBuf,

    /// File name prefix, followed by `_<token>`
    pub file_prefix: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            scratch_root: std::env::temp_dir(),
            file_prefix: "runterm".to_string(),
        }
    }
}

impl WorkspaceConfig {
    fn validate(&self) -> Result<()> {
        if self.scratch_root.as_os_str().is_empty() {
            return Err(Error::ConfigValidationFailed {
                field: "workspace.scratch_root".to_string(),
                reason: "Scratch root cannot be empty".to_string(),
            });
        }
        let prefix_ok = !self.file_prefix.is_empty()
            && self
                .file_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !prefix_ok {
            return Err(Error::ConfigValidationFailed {
                field: "workspace.file_prefix".to_string(),
                reason: "Prefix must be non-empty and use only [A-Za-z0-9_-]".to_string(),
            });
        }
        Ok(())
    }
}

/// External toolchain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Compiler for compiled-native runs
    pub compiler: String,

    /// Flags placed before `<source> -o <artifact>`
    pub compiler_args: Vec<String>,

    /// Source file extension for compiled-native runs
    pub compiled_extension: String,

    /// Artifact file extension
    pub artifact_extension: String,

    /// Interpreter for interpreted-scripting runs
    pub interpreter: String,

    /// Flags placed before `<source>`
    pub interpreter_args: Vec<String>,

    /// Source file extension for interpreted-scripting runs
    pub script_extension: String,

    /// Upper bound on a single compiler invocation
    pub build_timeout_ms: u64,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: "g++".to_string(),
            compiler_args: vec!["-Werror=div-by-zero".to_string()],
            compiled_extension: "cpp".to_string(),
            artifact_extension: "out".to_string(),
            interpreter: "python3".to_string(),
            // Unbuffered, so prompts reach the terminal before a read blocks
            interpreter_args: vec!["-u".to_string()],
            script_extension: "py".to_string(),
            build_timeout_ms: 30_000,
        }
    }
}

impl ToolchainConfig {
    pub fn build_timeout(&self) -> Duration {
        Duration::from_millis(self.build_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("toolchain.compiler", &self.compiler),
            ("toolchain.interpreter", &self.interpreter),
            ("toolchain.compiled_extension", &self.compiled_extension),
            ("toolchain.artifact_extension", &self.artifact_extension),
            ("toolchain.script_extension", &self.script_extension),
        ] {
            if value.trim().is_empty() {
                return Err(Error::ConfigValidationFailed {
                    field: field.to_string(),
                    reason: "Value cannot be empty".to_string(),
                });
            }
        }
        if self.compiled_extension == self.artifact_extension {
            return Err(Error::ConfigValidationFailed {
                field: "toolchain.artifact_extension".to_string(),
                reason: "Artifact extension must differ from the source extension".to_string(),
            });
        }
        if self.build_timeout_ms == 0 {
            return Err(Error::ConfigValidationFailed {
                field: "toolchain.build_timeout_ms".to_string(),
                reason: "Build timeout must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Output relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Bounded wait for output before checking the child again
    pub poll_interval_ms: u64,

    /// Maximum bytes per read from the controlling side
    pub chunk_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            chunk_size: 1024,
        }
    }
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if !RECOGNIZED_POLL_INTERVALS_MS.contains(&self.poll_interval_ms) {
            return Err(Error::ConfigValidationFailed {
                field: "relay.poll_interval_ms".to_string(),
                reason: format!(
                    "{} is not one of {:?}",
                    self.poll_interval_ms, RECOGNIZED_POLL_INTERVALS_MS
                ),
            });
        }
        if !RECOGNIZED_CHUNK_SIZES.contains(&self.chunk_size) {
            return Err(Error::ConfigValidationFailed {
                field: "relay.chunk_size".to_string(),
                reason: format!(
                    "{} is not one of {:?}",
                    self.chunk_size, RECOGNIZED_CHUNK_SIZES
                ),
            });
        }
        Ok(())
    }
}

/// PTY-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PtyConfig {
    /// Terminal rows
    pub rows: u16,

    /// Terminal columns
    pub cols: u16,

    /// Keep the line discipline's `\n` → `\r\n` output translation
    pub translate_newlines: bool,

    /// Environment variables added to the child's environment
    pub environment: std::collections::HashMap<String, String>,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            rows: 24,
            cols: 80,
            translate_newlines: false,
            environment: std::collections::HashMap::new(),
        }
    }
}

impl PtyConfig {
    fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(Error::ConfigValidationFailed {
                field: "pty.rows/pty.cols".to_string(),
                reason: "Terminal dimensions must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// What a caller's new run does while its previous session is still live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunPolicy {
    /// Cancel the live session, wait for its finalization, then launch
    #[default]
    Replace,
    /// Answer the new run with an error
    Reject,
}

/// Session registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions running at once across all callers
    pub max_active: usize,

    /// Policy for a run arriving while the caller's session is live
    pub run_policy: RunPolicy,

    /// Time between the cancel signal and the forced kill
    pub kill_grace_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_active: 16,
            run_policy: RunPolicy::Replace,
            kill_grace_ms: 2000,
        }
    }
}

impl SessionConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.max_active == 0 {
            return Err(Error::ConfigValidationFailed {
                field: "sessions.max_active".to_string(),
                reason: "At least one session must be allowed".to_string(),
            });
        }
        if self.kill_grace_ms > 60_000 {
            return Err(Error::ConfigValidationFailed {
                field: "sessions.kill_grace_ms".to_string(),
                reason: "Kill grace period cannot exceed 60 seconds".to_string(),
            });
        }
        Ok(())
    }
}
