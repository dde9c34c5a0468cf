//! Document normalization
//!
//! Turns the wire-shaped [`ParameterDocument`] into typed
//! [`WorkflowParameters`] and splits `advanced` into shared and per-branch
//! overrides.

use indexmap::IndexMap;
use matflow_types::{
    ConfigError, ElectronicType, NamespaceTree, ParameterDocument, Protocol, RelaxType, SpinType,
    WorkflowParameters,
};
use serde_json::{Map, Value};

/// Overrides addressed to a single branch namespace
pub type BranchOverrides = IndexMap<String, NamespaceTree>;

/// Normalize a document
///
/// `branch_names` are the namespaces a workflow may contain; top-level
/// `advanced` keys equal to one of them are routed to that branch only.
///
/// # Errors
/// - [`ConfigError::InvalidEnumeration`] for an unknown wire string
/// - [`ConfigError::MalformedInputs`] if an override is not well formed
pub fn normalize(
    document: &ParameterDocument,
    branch_names: &[&str],
) -> Result<(WorkflowParameters, BranchOverrides), ConfigError> {
    let protocol = document
        .basic
        .protocol
        .as_deref()
        .map(str::parse::<Protocol>)
        .transpose()?
        .unwrap_or_default();
    let relax_type: RelaxType = document.workflow.relax_type.parse()?;
    let electronic_type: ElectronicType = document.basic.electronic_type.parse()?;
    let spin_type: SpinType = document.basic.spin_type.parse()?;

    let mut shared = Map::new();
    let mut per_branch = BranchOverrides::new();
    for (key, value) in &document.advanced {
        if branch_names.contains(&key.as_str()) {
            let tree = NamespaceTree::from_value(key, value.clone())?;
            tree.validate(key)?;
            per_branch.insert(key.clone(), tree);
        } else {
            shared.insert(key.clone(), value.clone());
        }
    }
    let shared_overrides = NamespaceTree::from_value("advanced", Value::Object(shared))?;
    shared_overrides.validate("advanced")?;

    tracing::trace!(
        %protocol,
        %relax_type,
        shared = shared_overrides.len(),
        per_branch = per_branch.len(),
        "normalized parameter document"
    );

    let parameters = WorkflowParameters {
        protocol,
        relax_type,
        electronic_type,
        spin_type,
        basic_extra: document.basic.extra.clone(),
        properties: document.workflow.properties.clone(),
        shared_overrides,
        sections: document.sections.clone(),
    };
    Ok((parameters, per_branch))
}
