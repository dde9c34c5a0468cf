//! Branch-attributable exit codes
//!
//! Every branch gets its own code so callers can tell which one failed
//! without looking inside the sub-process.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit status reported when the relaxation branch fails
pub const RELAX_FAILED_STATUS: u32 = 401;

/// Exit status of the first registered plugin; later plugins count up
pub const PLUGIN_FAILED_BASE_STATUS: u32 = 405;

/// Labelled exit code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExitCode {
    /// Numeric status
    pub status: u32,
    /// Symbolic label, e.g. `ERROR_SUB_PROCESS_FAILED_bands`
    pub label: String,
    /// Human-readable message
    pub message: String,
}

impl ExitCode {
    /// Code for a failed relaxation
    #[must_use]
    pub fn relax_failed() -> Self {
        Self {
            status: RELAX_FAILED_STATUS,
            label: "ERROR_SUB_PROCESS_FAILED_RELAX".to_string(),
            message: "The relaxation sub process failed".to_string(),
        }
    }

    /// Code for a failed plugin at a registration index
    #[must_use]
    pub fn plugin_failed(name: &str, index: usize) -> Self {
        let offset = u32::try_from(index).unwrap_or(u32::MAX - PLUGIN_FAILED_BASE_STATUS);
        Self {
            status: PLUGIN_FAILED_BASE_STATUS.saturating_add(offset),
            label: format!("ERROR_SUB_PROCESS_FAILED_{name}"),
            message: format!("The plugin {name} sub process failed"),
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.status, self.label, self.message)
    }
}

/// Exit codes of every branch a workflow may run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitCodeTable {
    relax: ExitCode,
    plugins: IndexMap<String, ExitCode>,
}

impl ExitCodeTable {
    /// Build a table for plugins in registration order
    pub fn new<'a>(plugin_names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            relax: ExitCode::relax_failed(),
            plugins: plugin_names
                .into_iter()
                .enumerate()
                .map(|(index, name)| (name.to_string(), ExitCode::plugin_failed(name, index)))
                .collect(),
        }
    }

    /// Relaxation code
    #[inline]
    #[must_use]
    pub fn relax(&self) -> &ExitCode {
        &self.relax
    }

    /// Code for a plugin branch
    #[inline]
    #[must_use]
    pub fn plugin(&self, name: &str) -> Option<&ExitCode> {
        self.plugins.get(name)
    }

    /// Every code, relax first
    pub fn iter(&self) -> impl Iterator<Item = &ExitCode> {
        std::iter::once(&self.relax).chain(self.plugins.values())
    }
}
