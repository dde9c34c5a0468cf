//! Orchestrator configuration
//!
//! Loaded from TOML; every field has a default so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration load failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// File could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Not valid configuration TOML
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Where file snapshots go; in-memory snapshots when unset
    pub snapshot_dir: Option<PathBuf>,
    /// Default for releasing intermediate storage on termination
    pub clean_workdir: bool,
    /// Pseudopotential library file; the built-in library when unset
    pub pseudo_library: Option<PathBuf>,
}

impl OrchestratorConfig {
    /// Built-in defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// Returns [`ConfigLoadError::Toml`] on malformed input.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigLoadError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigLoadError`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// With snapshot directory
    #[inline]
    #[must_use]
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    /// With cleanup default
    #[inline]
    #[must_use]
    pub fn with_clean_workdir(mut self, clean_workdir: bool) -> Self {
        self.clean_workdir = clean_workdir;
        self
    }

    /// With pseudopotential library file
    #[inline]
    #[must_use]
    pub fn with_pseudo_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.pseudo_library = Some(path.into());
        self
    }
}
