//! Configuration File Loading
//!
//! Finds a configuration file in the usual locations, parses it as TOML or
//! JSON by extension, applies environment overrides and validates the result.

use super::Config;
use crate::error::{Error, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration file loader
pub struct ConfigLoader {
    /// Search paths for configuration files, most specific first
    search_paths: Vec<PathBuf>,
    /// Path of the file that was loaded, if any
    current_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Pick the format from a file extension, defaulting to TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Fall back to `Config::default()` when no file is found
    pub create_default: bool,
    /// Apply `PORT` / `RUNTERM_SCRATCH_ROOT`
    pub apply_env: bool,
    /// Whether to validate configuration after loading
    pub validate: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            create_default: true,
            apply_env: true,
            validate: true,
        }
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            search_paths: Self::get_search_paths(),
            current_path: None,
        }
    }

    /// Loader that only looks at one file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            search_paths: vec![path.into()],
            current_path: None,
        }
    }

    /// Load configuration with default options
    pub fn load() -> Result<Config> {
        Self::new().load_with_options(LoadOptions::default())
    }

    /// Load from an explicit file; a missing file is an error here
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(Error::ConfigLoadFailed {
                path: path.to_path_buf(),
                reason: "file does not exist".to_string(),
            });
        }
        Self::with_path(path).load_with_options(LoadOptions::default())
    }

    /// Load configuration with custom options
    pub fn load_with_options(&mut self, options: LoadOptions) -> Result<Config> {
        let mut config = match self.find_and_load_config()? {
            Some((path, config)) => {
                info!("Configuration loaded from {}", path.display());
                self.current_path = Some(path);
                config
            }
            None if options.create_default => {
                debug!("No configuration file found, using defaults");
                Config::default()
            }
            None => return Err(Error::ConfigNotFound),
        };

        if options.apply_env {
            config.apply_env_overrides()?;
        }

        if options.validate {
            config.validate()?;
        }

        Ok(config)
    }

    /// Save configuration to a specific path, format chosen by extension
    pub fn save_to_path(&self, config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = match ConfigFormat::from_path(path) {
            ConfigFormat::Json => serde_json::to_string_pretty(config)?,
            ConfigFormat::Toml => toml::to_string_pretty(config).map_err(|e| {
                Error::ConfigParseFailed {
                    format: "TOML".to_string(),
                    reason: e.to_string(),
                }
            })?,
        };

        fs::write(path, content)?;
        Ok(())
    }

    /// Find and load configuration from search paths
    fn find_and_load_config(&self) -> Result<Option<(PathBuf, Config)>> {
        for path in &self.search_paths {
            if !path.is_file() {
                continue;
            }
            match Self::load_config_file(path) {
                Ok(config) => return Ok(Some((path.clone(), config))),
                Err(e) => {
                    // A broken file further down the list should not hide a good one
                    warn!("Failed to load config from {}: {}", path.display(), e);
                    if self.search_paths.len() == 1 {
                        return Err(e);
                    }
                }
            }
        }

        Ok(None)
    }

    /// Load a specific configuration file
    fn load_config_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| Error::ConfigLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        match ConfigFormat::from_path(path) {
            ConfigFormat::Toml => toml::from_str(&content).map_err(|e| Error::ConfigParseFailed {
                format: "TOML".to_string(),
                reason: e.to_string(),
            }),
            ConfigFormat::Json => {
                serde_json::from_str(&content).map_err(|e| Error::ConfigParseFailed {
                    format: "JSON".to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Get default search paths for configuration files
    fn get_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(explicit) = env::var("RUNTERM_CONFIG") {
            paths.push(PathBuf::from(explicit));
        }

        if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg_config).join("runterm").join("config.toml"));
        }

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("runterm").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".runterm").join("config.toml"));
        }

        if let Ok(cwd) = env::current_dir() {
            paths.push(cwd.join("runterm.toml"));
        }

        paths
    }

    /// Get the current configuration file path
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// List all search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
