//! Run request model

use serde::{Deserialize, Serialize};

use super::Language;

/// Immutable input for one run: source text plus language family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Source text exactly as the caller sent it
    pub source: String,
    /// How the source is turned into a running program
    pub language: Language,
}

impl RunRequest {
    pub fn new(source: impl Into<String>, language: Language) -> Self {
        Self {
            source: source.into(),
            language,
        }
    }

    /// Shorthand for a Python run
    pub fn python(source: impl Into<String>) -> Self {
        Self::new(source, Language::InterpretedScripting)
    }

    /// Shorthand for a C++ run
    pub fn cpp(source: impl Into<String>) -> Self {
        Self::new(source, Language::CompiledNative)
    }
}
