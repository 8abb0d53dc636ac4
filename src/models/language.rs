//! Language selector
//!
//! The two families of programs runterm knows how to run. Compiled-native
//! sources go through the builder before launch; interpreted-scripting
//! sources are handed straight to the interpreter.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Language family of a run request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Language {
    /// C++ built with the configured compiler, then executed directly
    #[default]
    #[serde(rename = "cpp", alias = "c++", alias = "cxx")]
    CompiledNative,
    /// Python run through the configured interpreter
    #[serde(rename = "python", alias = "python3")]
    InterpretedScripting,
}

impl Language {
    /// Name used on the wire
    pub fn wire_name(&self) -> &'static str {
        match self {
            Language::CompiledNative => "cpp",
            Language::InterpretedScripting => "python",
        }
    }

    /// Whether a build step precedes launch
    pub fn needs_build(&self) -> bool {
        matches!(self, Language::CompiledNative)
    }

    /// Resolve an optional selector; a missing one means compiled-native
    pub fn from_selector(selector: Option<&str>) -> Result<Self, Error> {
        match selector {
            None => Ok(Language::default()),
            Some(value) => value.parse(),
        }
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpp" | "c++" | "cxx" => Ok(Language::CompiledNative),
            "python" | "python3" => Ok(Language::InterpretedScripting),
            _ => Err(Error::UnsupportedLanguage {
                lang: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}
