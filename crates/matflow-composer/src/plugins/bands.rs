//! Band structure plugin

use super::structure_reference;
use crate::protocols::{pw_step, Calculation, ProtocolCatalog};
use matflow_registry::PluginDescriptor;
use matflow_types::{Codes, ConfigError, NamespaceTree, Structure, WorkflowParameters};
use serde_json::json;

/// Plugin name
pub const NAME: &str = "bands";

/// Sub-process type
pub const SUB_PROCESS_TYPE: &str = "quantumespresso.pw.bands";

/// Where the relaxed band count goes
pub const BAND_COUNT_INPUT: &str = "bands.pw.parameters.SYSTEM.nbnd";

/// Registry entry
#[must_use]
pub fn descriptor() -> PluginDescriptor {
    PluginDescriptor::new(NAME, SUB_PROCESS_TYPE, build)
        .with_excluded(["clean_workdir", "structure", "relax"])
        .with_band_count_input(BAND_COUNT_INPUT)
}

/// Derive the band structure inputs
///
/// # Errors
/// Returns [`ConfigError::MissingCodeBinding`] if `pw_code` is unbound.
pub fn build(
    codes: &Codes,
    structure: &Structure,
    parameters: &WorkflowParameters,
) -> Result<NamespaceTree, ConfigError> {
    let code = codes.require("pw_code")?;
    let preset = ProtocolCatalog::builtin().preset(parameters.protocol)?;

    let mut inputs = NamespaceTree::new();
    inputs.insert(
        "relax",
        pw_step(preset, structure, parameters, code, Calculation::Relax),
    );
    inputs.insert(
        "scf",
        pw_step(preset, structure, parameters, code, Calculation::Scf),
    );
    let mut bands = pw_step(preset, structure, parameters, code, Calculation::Bands);
    bands.remove("kpoints_distance");
    inputs.insert("bands", bands);
    inputs.insert("bands_kpoints_distance", json!(preset.bands_kpoints_distance));
    inputs.insert("nbands_factor", json!(preset.nbands_factor));
    inputs.insert("clean_workdir", json!(false));
    inputs.insert("structure", structure_reference(structure));
    Ok(inputs)
}
