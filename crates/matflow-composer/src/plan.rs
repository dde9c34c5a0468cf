//! Composed workflow plan
//!
//! [`ComposedWorkflow`] is everything the orchestrator needs to run: the
//! branches to submit, their input trees and the exit codes that attribute
//! failures. It is plain data and round-trips through serde.

use crate::label::process_label;
use indexmap::IndexMap;
use matflow_registry::ExitCodeTable;
use matflow_types::{
    NamespaceTree, ParameterDocument, Protocol, RelaxType, Structure, TreeNode, RELAX_NAMESPACE,
};
use serde::{Deserialize, Serialize};

/// Branch role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchKind {
    /// Preparatory relaxation, runs before everything else
    Relax,
    /// Plugin branch, fanned out after relaxation
    Plugin,
}

/// One branch of the plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchPlan {
    /// Namespace, equal to the plugin name or `relax`
    pub namespace: String,
    /// Role
    pub kind: BranchKind,
    /// Sub-process type identifier
    pub sub_process_type: String,
    /// Composed inputs, before run-time bindings
    pub inputs: NamespaceTree,
    /// Where the relaxed band count is bound, if anywhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band_count_input: Option<String>,
}

/// Output of the builder composer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedWorkflow {
    pub(crate) structure: Structure,
    pub(crate) clean_workdir: bool,
    pub(crate) protocol: Protocol,
    pub(crate) relax_type: RelaxType,
    pub(crate) properties: IndexMap<String, bool>,
    pub(crate) branches: Vec<BranchPlan>,
    pub(crate) exit_codes: ExitCodeTable,
    pub(crate) document: ParameterDocument,
}

impl ComposedWorkflow {
    /// Request release of intermediate storage once the workflow terminates
    #[inline]
    #[must_use]
    pub fn with_clean_workdir(mut self, clean_workdir: bool) -> Self {
        self.clean_workdir = clean_workdir;
        self
    }

    /// Input structure
    #[inline]
    #[must_use]
    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    /// Whether storage is released on termination
    #[inline]
    #[must_use]
    pub fn clean_workdir(&self) -> bool {
        self.clean_workdir
    }

    /// Protocol the defaults were taken from
    #[inline]
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Resolved properties, including `relax`
    #[inline]
    #[must_use]
    pub fn properties(&self) -> &IndexMap<String, bool> {
        &self.properties
    }

    /// Every branch, relax first then plugins in registration order
    #[inline]
    #[must_use]
    pub fn branches(&self) -> &[BranchPlan] {
        &self.branches
    }

    /// Branch by namespace
    #[must_use]
    pub fn branch(&self, namespace: &str) -> Option<&BranchPlan> {
        self.branches.iter().find(|branch| branch.namespace == namespace)
    }

    /// Relaxation branch, if planned
    #[must_use]
    pub fn relax_branch(&self) -> Option<&BranchPlan> {
        self.branches
            .iter()
            .find(|branch| branch.kind == BranchKind::Relax)
    }

    /// Plugin branches in registration order
    pub fn plugin_branches(&self) -> impl Iterator<Item = &BranchPlan> {
        self.branches
            .iter()
            .filter(|branch| branch.kind == BranchKind::Plugin)
    }

    /// Exit codes for every registered branch
    #[inline]
    #[must_use]
    pub fn exit_codes(&self) -> &ExitCodeTable {
        &self.exit_codes
    }

    /// Namespace to inputs projection
    #[must_use]
    pub fn input_tree(&self) -> NamespaceTree {
        self.branches
            .iter()
            .map(|branch| (branch.namespace.clone(), TreeNode::from(branch.inputs.clone())))
            .collect()
    }

    /// Re-extract a document that composes to the same plan
    ///
    /// The protocol is written back explicitly and `workflow.properties`
    /// carries the resolved `relax` flag.
    #[must_use]
    pub fn parameters(&self) -> ParameterDocument {
        let mut document = self.document.clone();
        document.basic.protocol = Some(self.protocol.as_str().to_string());
        document.workflow.relax_type = self.relax_type.as_str().to_string();
        document.workflow.properties = self.properties.clone();
        document
    }

    /// Human-readable process label
    #[must_use]
    pub fn label(&self) -> String {
        let plugins: Vec<&str> = self
            .plugin_branches()
            .map(|branch| branch.namespace.as_str())
            .collect();
        process_label(&self.structure, self.relax_type, self.protocol, &plugins)
    }

    /// Whether the plan runs a relaxation first
    #[inline]
    #[must_use]
    pub fn runs_relax(&self) -> bool {
        self.properties
            .get(RELAX_NAMESPACE)
            .copied()
            .unwrap_or(false)
    }
}
