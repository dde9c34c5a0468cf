//! Result aggregation
//!
//! Branch outputs are folded into one [`OutputTree`], each under its own
//! namespace. Attaching is append-only: a namespace is written once.

use crate::substrate::OutputSchema;
use matflow_types::{NamespaceTree, TreeNode};
use serde::{Deserialize, Serialize};

/// Aggregation contract violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    /// Namespace already attached
    #[error("namespace already attached: {0}")]
    DuplicateNamespace(String),
}

/// Final outputs, keyed by branch namespace
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputTree {
    tree: NamespaceTree,
}

impl OutputTree {
    /// Empty tree
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a branch's outputs under `namespace`
    ///
    /// # Errors
    /// Returns [`AggregateError::DuplicateNamespace`] if the namespace is
    /// already present. The tree is left unchanged.
    pub fn attach(
        &mut self,
        namespace: impl Into<String>,
        outputs: NamespaceTree,
    ) -> Result<(), AggregateError> {
        let namespace = namespace.into();
        if self.tree.contains(&namespace) {
            return Err(AggregateError::DuplicateNamespace(namespace));
        }
        tracing::debug!(branch = %namespace, ports = outputs.len(), "outputs attached");
        self.tree.insert(namespace, TreeNode::Namespace(outputs));
        Ok(())
    }

    /// Outputs of one branch
    #[must_use]
    pub fn get(&self, namespace: &str) -> Option<&NamespaceTree> {
        self.tree.get(namespace).and_then(TreeNode::as_namespace)
    }

    /// Attached namespaces in attach order
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.tree.keys()
    }

    /// Number of attached namespaces
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether nothing is attached
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Borrow the underlying tree
    #[inline]
    #[must_use]
    pub fn as_tree(&self) -> &NamespaceTree {
        &self.tree
    }

    /// Take the underlying tree
    #[inline]
    #[must_use]
    pub fn into_tree(self) -> NamespaceTree {
        self.tree
    }
}

/// Keep only the ports a sub-process type declares
#[must_use]
pub fn exposed_outputs(outputs: &NamespaceTree, schema: &OutputSchema) -> NamespaceTree {
    outputs
        .iter()
        .filter(|(port, _)| schema.declares(port))
        .map(|(port, node)| (port.to_string(), node.clone()))
        .collect()
}
