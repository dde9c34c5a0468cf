//! Best-effort storage cleanup
//!
//! Once a workflow terminates, the remote storage of every compute task
//! below every submitted process can be released. Failures are collected,
//! never propagated.

use crate::substrate::{ComputeTaskId, SubProcessHandle, Substrate};
use serde::{Deserialize, Serialize};

/// Storage release that did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupFailure {
    /// Task whose storage is still held
    pub task: ComputeTaskId,
    /// Why the release failed
    pub reason: String,
}

/// What a cleanup pass achieved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Released tasks
    pub cleaned: Vec<ComputeTaskId>,
    /// Tasks that could not be released
    pub failed: Vec<CleanupFailure>,
}

impl CleanupReport {
    /// Whether every release succeeded
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Release the storage of every descendant task of `handles`
pub async fn release_descendants(
    substrate: &dyn Substrate,
    handles: &[SubProcessHandle],
) -> CleanupReport {
    let mut tasks = Vec::new();
    for handle in handles {
        match substrate.descendant_tasks(handle).await {
            Ok(found) => tasks.extend(found),
            Err(err) => {
                tracing::warn!(pk = handle.pk, error = %err, "could not list descendant tasks");
            }
        }
    }

    let mut report = CleanupReport::default();
    for task in tasks {
        match substrate.release_storage(task).await {
            Ok(()) => report.cleaned.push(task),
            Err(err) => {
                tracing::warn!(%task, error = %err, "storage release failed");
                report.failed.push(CleanupFailure {
                    task,
                    reason: err.to_string(),
                });
            }
        }
    }
    report
}
