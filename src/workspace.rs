//! Ephemeral Workspace
//!
//! Scratch files for one run: the source file and, for compiled runs, the
//! path the builder writes its artifact to. Every path is removed when the
//! run finalizes, or on drop if finalization never happened.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::config::{ToolchainConfig, WorkspaceConfig};
use crate::error::{Error, Result};
use crate::models::Language;

/// Length of the per-run token in file names
pub const TOKEN_LEN: usize = 8;

/// Result of removing one workspace path
#[derive(Debug)]
pub enum CleanupOutcome {
    /// The file existed and was unlinked
    Removed,
    /// Nothing to remove
    AlreadyAbsent,
    /// Removal failed for another reason
    Failed(io::Error),
}

impl CleanupOutcome {
    fn from_removal(result: io::Result<()>) -> Self {
        match result {
            Ok(()) => CleanupOutcome::Removed,
            Err(e) if e.kind() == io::ErrorKind::NotFound => CleanupOutcome::AlreadyAbsent,
            Err(e) => CleanupOutcome::Failed(e),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CleanupOutcome::Failed(_))
    }
}

/// Per-path outcomes of one cleanup call
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub entries: Vec<(PathBuf, CleanupOutcome)>,
}

impl CleanupReport {
    /// No path failed to be removed
    pub fn is_clean(&self) -> bool {
        !self.entries.iter().any(|(_, outcome)| outcome.is_failure())
    }

    pub fn removed(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, outcome)| matches!(outcome, CleanupOutcome::Removed))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &io::Error)> {
        self.entries.iter().filter_map(|(path, outcome)| match outcome {
            CleanupOutcome::Failed(e) => Some((path.as_path(), e)),
            _ => None,
        })
    }
}

/// Scratch files owned by one run
#[derive(Debug)]
pub struct Workspace {
    token: String,
    root: PathBuf,
    language: Language,
    source_path: PathBuf,
    artifact_path: Option<PathBuf>,
    finalized: bool,
}

impl Workspace {
    /// Write `source` to a fresh file under the scratch root
    ///
    /// For compiled runs the artifact path is reserved but not created.
    pub fn materialize(
        source: &str,
        language: Language,
        workspace: &WorkspaceConfig,
        toolchain: &ToolchainConfig,
    ) -> Result<Self> {
        let root = workspace.scratch_root.clone();
        prepare_root(&root)?;

        let token = new_token();
        let stem = format!("{}_{}", workspace.file_prefix, token);
        let (source_ext, artifact_path) = match language {
            Language::CompiledNative => (
                toolchain.compiled_extension.as_str(),
                Some(root.join(format!("{}.{}", stem, toolchain.artifact_extension))),
            ),
            Language::InterpretedScripting => (toolchain.script_extension.as_str(), None),
        };
        let source_path = root.join(format!("{}.{}", stem, source_ext));

        write_new_file(&source_path, source).map_err(|e| Error::WorkspaceWriteFailed {
            path: source_path.clone(),
            reason: e.to_string(),
        })?;

        debug!(
            "Materialized {} workspace {} at {}",
            language,
            token,
            source_path.display()
        );

        Ok(Self {
            token,
            root,
            language,
            source_path,
            artifact_path,
            finalized: false,
        })
    }

    /// Remove every path owned by this workspace
    ///
    /// Safe to call repeatedly; later calls report `AlreadyAbsent`.
    pub fn cleanup(&mut self) -> CleanupReport {
        self.finalized = true;

        let mut report = CleanupReport::default();
        for path in self.paths() {
            let outcome = CleanupOutcome::from_removal(fs::remove_file(path));
            if let CleanupOutcome::Failed(e) = &outcome {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
            report.entries.push((path.to_path_buf(), outcome));
        }

        debug!(
            "Workspace {} cleanup: {} removed, clean={}",
            self.token,
            report.removed(),
            report.is_clean()
        );
        report
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Directory the program runs in
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact_path.as_deref()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn paths(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.source_path.as_path()).chain(self.artifact_path.as_deref())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.finalized {
            debug!("Workspace {} dropped before finalization", self.token);
            self.cleanup();
        }
    }
}

fn new_token() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(TOKEN_LEN);
    token
}

fn prepare_root(root: &Path) -> Result<()> {
    fs::create_dir_all(root).map_err(|e| Error::ScratchRootUnavailable {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !root.is_dir() {
        return Err(Error::ScratchRootUnavailable {
            path: root.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    Ok(())
}

fn write_new_file(path: &Path, contents: &str) -> io::Result<()> {
    // create_new: a token collision must never overwrite another run's file
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(contents.as_bytes())?;
    file.flush()
}
