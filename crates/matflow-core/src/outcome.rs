//! Workflow outcome

use crate::aggregate::OutputTree;
use matflow_registry::ExitCode;
use serde::{Deserialize, Serialize};

/// How a workflow ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Every branch finished OK
    Success {
        /// Outputs of every branch, by namespace
        outputs: OutputTree,
    },
    /// A branch failed; later branches were not inspected
    Failure {
        /// Code attributing the failure
        code: ExitCode,
        /// Failing branch namespace
        branch: String,
        /// Outputs of branches inspected before the failure
        partial_outputs: OutputTree,
    },
}

impl Outcome {
    /// Whether the workflow succeeded
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Failure code, if failed
    #[must_use]
    pub fn exit_code(&self) -> Option<&ExitCode> {
        match self {
            Self::Failure { code, .. } => Some(code),
            Self::Success { .. } => None,
        }
    }

    /// Failing branch, if failed
    #[must_use]
    pub fn branch(&self) -> Option<&str> {
        match self {
            Self::Failure { branch, .. } => Some(branch),
            Self::Success { .. } => None,
        }
    }

    /// Outputs, complete or partial
    #[must_use]
    pub fn outputs(&self) -> &OutputTree {
        match self {
            Self::Success { outputs } => outputs,
            Self::Failure {
                partial_outputs, ..
            } => partial_outputs,
        }
    }
}
