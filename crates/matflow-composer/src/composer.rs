//! Builder composer
//!
//! Pure function from a registry and a parameter document to a
//! [`ComposedWorkflow`]. Nothing here touches the execution substrate and
//! every failure is a [`ConfigError`].

use crate::normalize::normalize;
use crate::plan::{BranchKind, BranchPlan, ComposedWorkflow};
use crate::plugins::relax;
use crate::protocols::ProtocolCatalog;
use matflow_registry::PluginRegistry;
use matflow_types::{
    Codes, ConfigError, NamespaceTree, ParameterDocument, Structure, RELAX_NAMESPACE,
};
use std::iter;

/// Compose a workflow with codes taken from the document itself
///
/// # Errors
/// See [`compose`].
pub fn build(
    registry: &PluginRegistry,
    structure: &Structure,
    document: &ParameterDocument,
) -> Result<ComposedWorkflow, ConfigError> {
    compose(registry, &document.codes, structure, document)
}

/// Compose a workflow
///
/// Unknown plugins are rejected before any builder factory runs. Excluded
/// fields are stripped from every branch regardless of what the factory
/// returned.
///
/// # Errors
/// Returns the first [`ConfigError`] raised by normalization, plugin
/// resolution or a builder factory.
pub fn compose(
    registry: &PluginRegistry,
    codes: &Codes,
    structure: &Structure,
    document: &ParameterDocument,
) -> Result<ComposedWorkflow, ConfigError> {
    let branch_names: Vec<&str> = iter::once(RELAX_NAMESPACE)
        .chain(registry.names())
        .collect();
    let (mut parameters, mut overrides) = normalize(document, &branch_names)?;

    for name in parameters
        .properties
        .iter()
        .filter(|(name, enabled)| **enabled && name.as_str() != RELAX_NAMESPACE)
        .map(|(name, _)| name)
    {
        registry.resolve(name).map_err(|err| {
            tracing::warn!(plugin = %name, "enabled property has no registered plugin");
            ConfigError::from(err)
        })?;
    }

    let preset = ProtocolCatalog::builtin().preset(parameters.protocol)?;
    let mut branches = Vec::new();

    let runs_relax = parameters.relax_type.is_enabled();
    parameters
        .properties
        .insert(RELAX_NAMESPACE.to_string(), runs_relax);
    if runs_relax {
        let inputs = relax::build(codes, structure, &parameters, preset)?;
        let inputs = finish_branch(
            RELAX_NAMESPACE,
            inputs,
            overrides.shift_remove(RELAX_NAMESPACE),
            relax::EXCLUDED_FIELDS,
        )?;
        branches.push(BranchPlan {
            namespace: RELAX_NAMESPACE.to_string(),
            kind: BranchKind::Relax,
            sub_process_type: relax::SUB_PROCESS_TYPE.to_string(),
            inputs,
            band_count_input: None,
        });
    }

    for descriptor in registry.iter() {
        let name = descriptor.name();
        if !parameters.is_enabled(name) {
            continue;
        }
        let inputs = descriptor.build(codes, structure, &parameters)?;
        let inputs = finish_branch(
            name,
            inputs,
            overrides.shift_remove(name),
            descriptor.excluded_fields().iter().map(String::as_str),
        )?;
        branches.push(BranchPlan {
            namespace: name.to_string(),
            kind: BranchKind::Plugin,
            sub_process_type: descriptor.sub_process_type().to_string(),
            inputs,
            band_count_input: descriptor.band_count_input().map(str::to_string),
        });
    }

    let workflow = ComposedWorkflow {
        structure: structure.clone(),
        clean_workdir: false,
        protocol: parameters.protocol,
        relax_type: parameters.relax_type,
        properties: parameters.properties,
        branches,
        exit_codes: registry.exit_codes(),
        document: document.clone(),
    };
    tracing::debug!(
        label = %workflow.label(),
        branches = workflow.branches().len(),
        "workflow composed"
    );
    Ok(workflow)
}

fn finish_branch<'a>(
    namespace: &str,
    mut inputs: NamespaceTree,
    branch_override: Option<NamespaceTree>,
    excluded: impl IntoIterator<Item = &'a str>,
) -> Result<NamespaceTree, ConfigError> {
    inputs.validate(namespace)?;
    if let Some(branch_override) = branch_override {
        inputs.merge(&branch_override);
    }
    for field in excluded {
        if inputs.remove_path(field).is_some() {
            tracing::trace!(branch = namespace, field, "excluded field stripped");
        }
    }
    Ok(inputs)
}
