//! Error types and Result aliases for runterm

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for runterm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for runterm
#[derive(Debug)]
pub enum Error {
    // === Workspace errors ===
    /// Failed to write the run's source file
    WorkspaceWriteFailed {
        path: PathBuf,
        reason: String,
    },

    /// Scratch root could not be created or is not a directory
    ScratchRootUnavailable {
        path: PathBuf,
        reason: String,
    },

    // === Build errors ===
    /// The toolchain process could not be started
    ToolchainLaunchFailed {
        command: String,
        reason: String,
    },

    /// The toolchain did not finish in time
    BuildTimedOut {
        command: String,
        duration: Duration,
    },

    // === PTY-related errors ===
    /// Failed to create PTY
    PtyCreationFailed {
        command: String,
        reason: String,
    },

    /// Failed to adjust terminal attributes before spawning
    EchoDisableFailed {
        reason: String,
    },

    /// Failed to spawn command in PTY
    CommandSpawnFailed {
        command: String,
        reason: String,
    },

    /// Failed to clone PTY reader
    PtyReaderCloneFailed {
        reason: String,
    },

    /// Failed to take PTY writer
    PtyWriterTakeFailed {
        reason: String,
    },

    /// Failed to send input to PTY
    PtyInputSendFailed {
        reason: String,
    },

    /// No PID available for the spawned child
    NoPidAvailable {
        command: String,
    },

    /// Failed to send signal to a process group
    SignalSendFailed {
        signal: String,
        reason: String,
    },

    // === Session errors ===
    /// Language selector is not one of the recognized values
    UnsupportedLanguage {
        lang: String,
    },

    /// All session permits are in use
    SessionLimitReached {
        limit: usize,
    },

    /// The caller already has a live session and the policy rejects new runs
    SessionBusy {
        session_id: String,
    },

    // === Configuration errors ===
    /// Failed to load configuration file
    ConfigLoadFailed {
        path: PathBuf,
        reason: String,
    },

    /// Configuration file not found
    ConfigNotFound,

    /// Configuration validation failed
    ConfigValidationFailed {
        field: String,
        reason: String,
    },

    /// Failed to parse configuration
    ConfigParseFailed {
        format: String,
        reason: String,
    },

    // === I/O and serialization errors ===
    /// I/O errors
    Io(std::io::Error),

    /// Serialization errors
    Serde(serde_json::Error),

    /// TOML parsing errors
    Toml(toml::de::Error),

    // === Generic fallback (use sparingly) ===
    /// Generic errors (for cases not yet categorized)
    Other(String),
}

impl Error {
    /// Text shown to the remote caller in a `program_output` event.
    ///
    /// Build and launch failures keep the leading markers the browser UI
    /// already highlights.
    pub fn user_message(&self) -> String {
        match self {
            Error::WorkspaceWriteFailed { reason, .. } => {
                format!("❌ Write failed (server): {}\n", reason)
            }
            Error::ScratchRootUnavailable { reason, .. } => {
                format!("❌ Write failed (server): {}\n", reason)
            }
            Error::ToolchainLaunchFailed { command, reason } => {
                format!("❌ Compilation error:\ncould not start '{}': {}\n", command, reason)
            }
            Error::BuildTimedOut { duration, .. } => {
                format!("❌ Compilation error:\ncompiler timed out after {:?}\n", duration)
            }
            Error::UnsupportedLanguage { lang } => {
                format!("❌ Unsupported language: '{}'\n", lang)
            }
            Error::SessionLimitReached { .. } => {
                "❌ Server is busy, try again shortly\n".to_string()
            }
            Error::SessionBusy { .. } => {
                "❌ A program is still running; stop it first\n".to_string()
            }
            Error::PtyCreationFailed { .. }
            | Error::EchoDisableFailed { .. }
            | Error::CommandSpawnFailed { .. }
            | Error::PtyReaderCloneFailed { .. }
            | Error::PtyWriterTakeFailed { .. }
            | Error::NoPidAvailable { .. } => format!("Launch failed: {}\n", self),
            other => format!("❌ {}\n", other),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Workspace errors
            Error::WorkspaceWriteFailed { path, reason } => {
                write!(f, "Failed to write source to '{}': {}", path.display(), reason)
            }
            Error::ScratchRootUnavailable { path, reason } => {
                write!(f, "Scratch root '{}' unavailable: {}", path.display(), reason)
            }

            // Build errors
            Error::ToolchainLaunchFailed { command, reason } => {
                write!(f, "Failed to start toolchain '{}': {}", command, reason)
            }
            Error::BuildTimedOut { command, duration } => {
                write!(f, "Toolchain '{}' timed out after {:?}", command, duration)
            }

            // PTY errors
            Error::PtyCreationFailed { command, reason } => {
                write!(f, "Failed to create PTY for command '{}': {}", command, reason)
            }
            Error::EchoDisableFailed { reason } => {
                write!(f, "Failed to disable terminal echo: {}", reason)
            }
            Error::CommandSpawnFailed { command, reason } => {
                write!(f, "Failed to spawn command '{}': {}", command, reason)
            }
            Error::PtyReaderCloneFailed { reason } => {
                write!(f, "Failed to clone PTY reader: {}", reason)
            }
            Error::PtyWriterTakeFailed { reason } => {
                write!(f, "Failed to take PTY writer: {}", reason)
            }
            Error::PtyInputSendFailed { reason } => {
                write!(f, "Failed to send input to PTY: {}", reason)
            }
            Error::NoPidAvailable { command } => {
                write!(f, "No PID available for '{}'", command)
            }
            Error::SignalSendFailed { signal, reason } => {
                write!(f, "Failed to send signal '{}': {}", signal, reason)
            }

            // Session errors
            Error::UnsupportedLanguage { lang } => {
                write!(f, "Unsupported language '{}'", lang)
            }
            Error::SessionLimitReached { limit } => {
                write!(f, "Session limit reached ({} active)", limit)
            }
            Error::SessionBusy { session_id } => {
                write!(f, "Session '{}' is still running", session_id)
            }

            // Configuration errors
            Error::ConfigLoadFailed { path, reason } => {
                write!(f, "Failed to load config from '{}': {}", path.display(), reason)
            }
            Error::ConfigNotFound => {
                write!(f, "Configuration file not found")
            }
            Error::ConfigValidationFailed { field, reason } => {
                write!(f, "Configuration validation failed for '{}': {}", field, reason)
            }
            Error::ConfigParseFailed { format, reason } => {
                write!(f, "Failed to parse {} config: {}", format, reason)
            }

            // I/O and serialization errors
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Serde(err) => write!(f, "Serialization error: {}", err),
            Error::Toml(err) => write!(f, "TOML parsing error: {}", err),

            // Generic fallback
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Serde(err) => Some(err),
            Error::Toml(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Toml(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::Other(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::Other(err.to_string())
    }
}
