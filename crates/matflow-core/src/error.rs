//! Error types for the orchestrator
//!
//! Branch failures are not errors: they end in an
//! [`Outcome::Failure`](crate::Outcome). Everything here is a contract
//! violation or an infrastructure fault.

use crate::aggregate::AggregateError;
use crate::snapshot::SnapshotError;
use crate::state_machine::Phase;
use crate::substrate::SubstrateError;

/// Orchestrator error
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Transition not in the allowed table
    #[error("illegal state transition: {from} -> {to}")]
    IllegalTransition {
        /// Current phase
        from: Phase,
        /// Requested phase
        to: Phase,
    },

    /// Substrate call failed
    #[error("substrate error: {0}")]
    Substrate(#[from] SubstrateError),

    /// Output aggregation contract violated
    #[error("aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    /// Snapshot could not be stored or loaded
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// A branch was inspected before it was submitted
    #[error("no submitted process for branch `{0}`")]
    MissingHandle(String),

    /// Outcome requested before the workflow terminated
    #[error("workflow has not terminated (phase: {0})")]
    NotTerminated(Phase),
}

impl OrchestratorError {
    /// Whether the fault lies with the substrate or storage rather than
    /// the orchestrator's own bookkeeping
    #[inline]
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Substrate(_) | Self::Snapshot(_))
    }

    /// Whether retrying the same step can succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Substrate(SubstrateError::Unavailable(_)) | Self::Snapshot(SnapshotError::Io { .. })
        )
    }
}
