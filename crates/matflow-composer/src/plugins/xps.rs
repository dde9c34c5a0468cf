//! X-ray photoelectron spectroscopy plugin
//!
//! Every requested core level (`C_1s`, `Si_2p`, ...) needs a core-hole
//! pseudopotential and the ground-state one of the same element, both
//! taken from a named group of the [`PseudoLibrary`]. Binding energies are
//! shifted by a per-level correction energy.

use super::pseudo::{element_of, PseudoLibrary, Pseudopotential};
use super::structure_reference;
use crate::protocols::{pw_step, Calculation, ProtocolCatalog};
use matflow_registry::PluginDescriptor;
use matflow_types::{Codes, ConfigError, NamespaceTree, Structure, WorkflowParameters};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Plugin name
pub const NAME: &str = "xps";

/// Sub-process type
pub const SUB_PROCESS_TYPE: &str = "quantumespresso.xps";

/// Core-hole treatment when the section names none
pub const DEFAULT_CORE_HOLE_TREATMENT: &str = "xch_smear";

/// Supercell padding for periodic inputs
pub const CRYSTAL_SUPERCELL_MIN_PARAMETER: f64 = 3.0;

/// Supercell padding for isolated molecules
pub const MOLECULE_SUPERCELL_MIN_PARAMETER: f64 = 8.0;

#[derive(Debug, Deserialize)]
struct XpsSection {
    pseudo_group: String,
    elements_list: Vec<String>,
    #[serde(default)]
    correction_energies: Map<String, Value>,
    #[serde(default = "default_core_hole_treatment")]
    core_hole_treatment: String,
    #[serde(default)]
    structure_type: Option<String>,
}

fn default_core_hole_treatment() -> String {
    DEFAULT_CORE_HOLE_TREATMENT.to_string()
}

/// Registry entry, resolving pseudopotentials in `library`
#[must_use]
pub fn descriptor(library: Arc<PseudoLibrary>) -> PluginDescriptor {
    PluginDescriptor::new(NAME, SUB_PROCESS_TYPE, move |codes, structure, parameters| {
        build(&library, codes, structure, parameters)
    })
    .with_excluded(["clean_workdir", "structure", "relax"])
}

/// Derive the core-hole scf inputs
///
/// # Errors
/// - [`ConfigError::MissingSection`] without an `xps` section
/// - [`ConfigError::MalformedInputs`] if the section has the wrong shape
/// - [`ConfigError::UnknownPseudoGroup`] / [`ConfigError::MissingPseudopotential`]
/// - [`ConfigError::MissingCorrectionEnergy`] for a level with no correction
/// - [`ConfigError::MissingCodeBinding`] if `pw_code` is unbound
pub fn build(
    library: &PseudoLibrary,
    codes: &Codes,
    structure: &Structure,
    parameters: &WorkflowParameters,
) -> Result<NamespaceTree, ConfigError> {
    let section: XpsSection = serde_json::from_value(parameters.section(NAME)?.clone())
        .map_err(|err| ConfigError::malformed(NAME, err.to_string()))?;
    let code = codes.require("pw_code")?;
    let preset = ProtocolCatalog::builtin().preset(parameters.protocol)?;

    let mut pseudos = Map::new();
    let mut elements = Vec::with_capacity(section.elements_list.len());
    let mut treatments = Map::new();
    let mut corrections = Map::new();
    for core_level in &section.elements_list {
        let element = element_of(core_level);
        let (core_hole, gipaw) = library.core_hole_pair(&section.pseudo_group, core_level)?;
        pseudos.insert(
            element.to_string(),
            json!({
                "core_hole": pseudo_reference(core_hole),
                "gipaw": pseudo_reference(gipaw),
            }),
        );
        let correction = section
            .correction_energies
            .get(core_level)
            .and_then(|entry| entry.get("core"))
            .and_then(Value::as_f64)
            .ok_or_else(|| ConfigError::MissingCorrectionEnergy(core_level.clone()))?;
        corrections.insert(element.to_string(), json!(correction));
        treatments.insert(core_level.clone(), json!(section.core_hole_treatment));
        elements.push(element.to_string());
    }

    let is_molecule = section.structure_type.as_deref() == Some("molecule");
    let supercell_min_parameter = if is_molecule {
        MOLECULE_SUPERCELL_MIN_PARAMETER
    } else {
        CRYSTAL_SUPERCELL_MIN_PARAMETER
    };

    let mut inputs = NamespaceTree::new();
    inputs.insert(
        "ch_scf",
        pw_step(preset, structure, parameters, code, Calculation::Scf),
    );
    inputs.insert("pseudos", Value::Object(pseudos));
    inputs.insert("elements_list", json!(elements));
    inputs.insert("core_hole_treatments", Value::Object(treatments));
    inputs.insert("correction_energies", Value::Object(corrections));
    inputs.insert("calc_binding_energy", json!(true));
    inputs.insert(
        "structure_preparation_settings",
        json!({
            "supercell_min_parameter": supercell_min_parameter,
            "is_molecule_input": is_molecule,
        }),
    );
    inputs.insert(
        "relax",
        pw_step(preset, structure, parameters, code, Calculation::Relax),
    );
    inputs.insert("clean_workdir", json!(false));
    inputs.insert("structure", structure_reference(structure));
    Ok(inputs)
}

fn pseudo_reference(pseudo: &Pseudopotential) -> Value {
    json!({ "label": pseudo.label, "filename": pseudo.filename })
}
