//! Orchestrator context

use crate::substrate::SubProcessHandle;
use indexmap::IndexMap;
use matflow_types::Structure;
use serde::{Deserialize, Serialize};

/// Working state carried between steps and persisted in snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorContext {
    /// Structure plugins will run on; replaced by a relaxed one if any
    pub current_structure: Structure,
    /// Band count reported by the relaxation
    pub current_band_count: Option<u64>,
    /// Relaxation process, once submitted
    pub relax_handle: Option<SubProcessHandle>,
    /// Plugin processes by branch name
    pub branch_handles: IndexMap<String, SubProcessHandle>,
}

impl OrchestratorContext {
    /// Fresh context for an input structure
    #[must_use]
    pub fn new(structure: Structure) -> Self {
        Self {
            current_structure: structure,
            current_band_count: None,
            relax_handle: None,
            branch_handles: IndexMap::new(),
        }
    }

    /// Every submitted process, relaxation first
    pub fn handles(&self) -> impl Iterator<Item = &SubProcessHandle> {
        self.relax_handle.iter().chain(self.branch_handles.values())
    }
}
