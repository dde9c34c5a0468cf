//! Projected density of states plugin

use super::structure_reference;
use crate::protocols::{pw_step, Calculation, ProtocolCatalog};
use matflow_registry::PluginDescriptor;
use matflow_types::{Codes, ConfigError, NamespaceTree, Structure, WorkflowParameters};
use serde_json::json;

/// Plugin name
pub const NAME: &str = "pdos";

/// Sub-process type
pub const SUB_PROCESS_TYPE: &str = "quantumespresso.pdos";

/// Registry entry
#[must_use]
pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new(NAME, SUB_PROCESS_TYPE, build)
        .with_excluded(["clean_workdir", "structure"])
}

/// Derive the scf, nscf, dos and projwfc inputs
///
/// # Errors
/// Returns [`ConfigError::MissingCodeBinding`] for any of `pw_code`,
/// `dos_code` or `projwfc_code`.
pub fn build(
    codes: &Codes,
    structure: &Structure,
    parameters: &WorkflowParameters,
) -> Result<NamespaceTree, ConfigError> {
    let pw_code = codes.require("pw_code")?;
    let dos_code = codes.require("dos_code")?;
    let projwfc_code = codes.require("projwfc_code")?;
    let preset = ProtocolCatalog::builtin().preset(parameters.protocol)?;

    let mut nscf = pw_step(preset, structure, parameters, pw_code, Calculation::Nscf);
    nscf.insert_path("pw.parameters.SYSTEM.occupations", json!("tetrahedra"));
    nscf.insert_path("pw.parameters.SYSTEM.nosym", json!(true));
    nscf.remove_path("pw.parameters.SYSTEM.smearing");
    nscf.remove_path("pw.parameters.SYSTEM.degauss");

    let mut inputs = NamespaceTree::new();
    inputs.insert(
        "scf",
        pw_step(preset, structure, parameters, pw_code, Calculation::Scf),
    );
    inputs.insert("nscf", nscf);
    inputs.insert(
        "dos",
        json!({
            "code": dos_code.label,
            "parameters": { "DOS": { "DeltaE": preset.dos_delta_e } },
        }),
    );
    inputs.insert(
        "projwfc",
        json!({
            "code": projwfc_code.label,
            "parameters": { "PROJWFC": { "DeltaE": preset.dos_delta_e } },
        }),
    );
    inputs.insert("clean_workdir", json!(false));
    inputs.insert("structure", structure_reference(structure));
    Ok(inputs)
}
