//! Builder
//!
//! Runs the external compiler against a workspace's source. Only compiled
//! runs go through here; diagnostics are captured for the caller and never
//! stored.

use std::process::Stdio;

use tokio::process::Command;
use tokio::time::timeout;

use crate::config::ToolchainConfig;
use crate::error::{Error, Result};
use crate::workspace::Workspace;

/// Header placed in front of compiler diagnostics
pub const BUILD_FAILURE_HEADER: &str = "❌ Compilation error:\n";

/// Outcome of one compiler invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    /// Compiler stderr followed by stdout
    pub diagnostics: String,
    /// Exit code zero and the artifact exists
    pub success: bool,
    /// `None` when the compiler was killed by a signal
    pub exit_code: Option<i32>,
}

impl BuildResult {
    /// Text sent to the caller when the build failed
    pub fn user_message(&self) -> String {
        let mut message = String::from(BUILD_FAILURE_HEADER);
        message.push_str(&self.diagnostics);
        if !message.ends_with('\n') {
            message.push('\n');
        }
        message
    }
}

/// Compiler front end
#[derive(Debug, Clone)]
pub struct Builder {
    config: ToolchainConfig,
}

impl Builder {
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }

    /// Arguments for `<compiler>`: configured flags, source, `-o`, artifact
    pub fn arguments(&self, workspace: &Workspace) -> Vec<String> {
        let mut args = self.config.compiler_args.clone();
        args.push(workspace.source_path().to_string_lossy().into_owned());
        if let Some(artifact) = workspace.artifact_path() {
            args.push("-o".to_string());
            args.push(artifact.to_string_lossy().into_owned());
        }
        args
    }

    /// Compile the workspace source into its artifact path
    ///
    /// Returns `Err` only when the compiler could not be run at all or did
    /// not finish within the build timeout. A compiler that ran and rejected
    /// the source is an `Ok` result with `success == false`.
    pub async fn build(&self, workspace: &Workspace) -> Result<BuildResult> {
        let Some(artifact) = workspace.artifact_path() else {
            return Ok(BuildResult {
                diagnostics: String::new(),
                success: true,
                exit_code: None,
            });
        };

        let args = self.arguments(workspace);
        let command_line = format!("{} {}", self.config.compiler, args.join(" "));
        info!("Compiling: {}", command_line);

        let mut command = Command::new(&self.config.compiler);
        command
            .args(&args)
            .current_dir(workspace.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.config.build_timeout(), command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::ToolchainLaunchFailed {
                    command: self.config.compiler.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    "Compiler exceeded {:?}, killed: {}",
                    self.config.build_timeout(),
                    command_line
                );
                return Err(Error::BuildTimedOut {
                    command: command_line,
                    duration: self.config.build_timeout(),
                });
            }
        };

        let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
        diagnostics.push_str(&String::from_utf8_lossy(&output.stdout));

        let exit_code = output.status.code();
        let artifact_exists = artifact.is_file();
        if output.status.success() && !artifact_exists {
            diagnostics.push_str("compiler exited successfully but produced no executable\n");
        }

        let result = BuildResult {
            diagnostics,
            success: output.status.success() && artifact_exists,
            exit_code,
        };
        debug!(
            "Build of workspace {} finished: success={} exit={:?}",
            workspace.token(),
            result.success,
            result.exit_code
        );
        Ok(result)
    }
}
