//! Execution substrate
//!
//! The orchestrator never runs a calculation itself. It hands namespaced
//! input trees to a [`Substrate`], which owns submission, status tracking,
//! output storage and the compute tasks a sub-process spawns.

mod simulated;

pub use simulated::{SimulatedState, SimulatedSubstrate, Submission, SIMULATED_NUMBER_OF_BANDS};

use matflow_types::NamespaceTree;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Reference to a submitted sub-process
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubProcessHandle {
    /// Substrate-assigned primary key
    pub pk: u64,
    /// Branch label the process was submitted under
    pub label: String,
    /// Sub-process type identifier
    pub sub_process_type: String,
}

impl fmt::Display for SubProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}>", self.sub_process_type, self.pk)
    }
}

/// Lifecycle state of a sub-process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Accepted, not started
    Created,
    /// Running or waiting on its own children
    Running,
    /// Ran to completion with an exit status; zero means success
    Finished {
        /// Exit status reported by the sub-process
        exit_status: u32,
    },
    /// Stopped by an unhandled exception
    Excepted,
    /// Killed from outside
    Killed,
}

impl ProcessStatus {
    /// Whether the process will never change state again
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Excepted | Self::Killed)
    }

    /// Finished with exit status zero
    #[inline]
    #[must_use]
    pub fn is_finished_ok(&self) -> bool {
        matches!(self, Self::Finished { exit_status: 0 })
    }

    /// Exit status, if finished
    #[inline]
    #[must_use]
    pub fn exit_status(&self) -> Option<u32> {
        match self {
            Self::Finished { exit_status } => Some(*exit_status),
            _ => None,
        }
    }
}

/// Identifier of a leaf compute task owning remote storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComputeTaskId(pub u64);

impl fmt::Display for ComputeTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Output ports a sub-process type declares
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSchema {
    ports: BTreeSet<String>,
}

impl OutputSchema {
    /// Schema from port names
    pub fn new<I, S>(ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ports: ports.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a port is declared
    #[inline]
    #[must_use]
    pub fn declares(&self, port: &str) -> bool {
        self.ports.contains(port)
    }

    /// Declared ports, sorted
    pub fn ports(&self) -> impl Iterator<Item = &str> {
        self.ports.iter().map(String::as_str)
    }

    /// Whether nothing is declared
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

/// Substrate failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubstrateError {
    /// Handle does not name a known process
    #[error("unknown process pk={0}")]
    UnknownHandle(u64),

    /// Submission refused
    #[error("submission of {sub_process_type} rejected: {reason}")]
    SubmissionRejected {
        /// Sub-process type submitted
        sub_process_type: String,
        /// Why
        reason: String,
    },

    /// Storage of a compute task could not be released
    #[error("failed to release storage of task {task}: {reason}")]
    Storage {
        /// Task whose storage was being released
        task: ComputeTaskId,
        /// Why
        reason: String,
    },

    /// Substrate unreachable
    #[error("substrate unavailable: {0}")]
    Unavailable(String),
}

/// Execution substrate seam
#[async_trait::async_trait]
pub trait Substrate: Send + Sync {
    /// Submit a sub-process
    async fn submit(
        &self,
        sub_process_type: &str,
        inputs: NamespaceTree,
        label: &str,
    ) -> Result<SubProcessHandle, SubstrateError>;

    /// Current status
    async fn status(&self, handle: &SubProcessHandle) -> Result<ProcessStatus, SubstrateError>;

    /// Finished with exit status zero
    async fn is_finished_ok(&self, handle: &SubProcessHandle) -> Result<bool, SubstrateError> {
        Ok(self.status(handle).await?.is_finished_ok())
    }

    /// Exit status, if finished
    async fn exit_status(&self, handle: &SubProcessHandle) -> Result<Option<u32>, SubstrateError> {
        Ok(self.status(handle).await?.exit_status())
    }

    /// Every output the process produced
    async fn outputs(&self, handle: &SubProcessHandle) -> Result<NamespaceTree, SubstrateError>;

    /// Ports a sub-process type declares
    fn declared_outputs(&self, sub_process_type: &str) -> OutputSchema;

    /// Wait for the given processes to reach a terminal state
    ///
    /// Returning does not guarantee every process is terminal; callers
    /// re-check status.
    async fn wait_terminal(&self, handles: &[SubProcessHandle]) -> Result<(), SubstrateError>;

    /// Leaf compute tasks spawned anywhere below a process
    async fn descendant_tasks(
        &self,
        handle: &SubProcessHandle,
    ) -> Result<Vec<ComputeTaskId>, SubstrateError>;

    /// Release the remote storage of a compute task
    async fn release_storage(&self, task: ComputeTaskId) -> Result<(), SubstrateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_status_predicates() {
        assert!(!ProcessStatus::Running.is_terminal());
        assert!(ProcessStatus::Killed.is_terminal());
        assert!(ProcessStatus::Finished { exit_status: 0 }.is_finished_ok());
        assert!(!ProcessStatus::Finished { exit_status: 300 }.is_finished_ok());
        assert_eq!(ProcessStatus::Excepted.exit_status(), None);
        assert_eq!(
            ProcessStatus::Finished { exit_status: 410 }.exit_status(),
            Some(410)
        );
    }

    #[test]
    fn output_schema_declares() {
        let schema = OutputSchema::new(["band_structure", "scf_parameters"]);
        assert!(schema.declares("band_structure"));
        assert!(!schema.declares("remote_folder"));
        assert_eq!(schema.ports().collect::<Vec<_>>(), vec!["band_structure", "scf_parameters"]);
    }

    #[test]
    fn handle_display() {
        let handle = SubProcessHandle {
            pk: 7,
            label: "bands".into(),
            sub_process_type: "quantumespresso.pw.bands".into(),
        };
        assert_eq!(handle.to_string(), "quantumespresso.pw.bands<7>");
    }
}
