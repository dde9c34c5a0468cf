//! Relaxation branch builder
//!
//! Relaxation is not a registry plugin: it is driven by `relax_type` and
//! always runs before the plugin fan-out.

use super::structure_reference;
use crate::protocols::{pw_step, Calculation, ProtocolPreset};
use matflow_types::{Codes, ConfigError, NamespaceTree, RelaxType, Structure, WorkflowParameters};
use serde_json::json;

/// Sub-process type of the relaxation branch
pub const SUB_PROCESS_TYPE: &str = "quantumespresso.pw.relax";

/// Fields never exposed in the relaxation namespace
pub const EXCLUDED_FIELDS: [&str; 3] = ["clean_workdir", "structure", "base_final_scf"];

/// Build the relaxation inputs
///
/// # Errors
/// Returns [`ConfigError::MissingCodeBinding`] if `pw_code` is unbound.
pub fn build(
    codes: &Codes,
    structure: &Structure,
    parameters: &WorkflowParameters,
    preset: &ProtocolPreset,
) -> Result<NamespaceTree, ConfigError> {
    let code = codes.require("pw_code")?;
    let (calculation, cell_dofree) = degrees_of_freedom(parameters.relax_type);

    let mut base = pw_step(preset, structure, parameters, code, calculation);
    if let Some(cell_dofree) = cell_dofree {
        base.insert_path("pw.parameters.CELL.cell_dofree", json!(cell_dofree));
    }
    if !moves_atoms(parameters.relax_type) {
        base.insert_path("pw.parameters.IONS.ion_dynamics", json!("bfgs"));
        base.insert_path("pw.settings.FIXED_COORDS", json!(true));
    }
    let base_final_scf = pw_step(preset, structure, parameters, code, Calculation::Scf);

    let mut inputs = NamespaceTree::new();
    inputs.insert("base", base);
    inputs.insert("base_final_scf", base_final_scf);
    inputs.insert("relax_type", json!(parameters.relax_type.as_str()));
    inputs.insert("meta_convergence", json!(preset.meta_convergence));
    inputs.insert(
        "max_meta_convergence_iterations",
        json!(preset.max_meta_convergence_iterations),
    );
    inputs.insert("clean_workdir", json!(false));
    inputs.insert("structure", structure_reference(structure));
    Ok(inputs)
}

fn degrees_of_freedom(relax_type: RelaxType) -> (Calculation, Option<&'static str>) {
    match relax_type {
        RelaxType::None | RelaxType::Positions => (Calculation::Relax, None),
        RelaxType::Volume | RelaxType::PositionsVolume => (Calculation::VcRelax, Some("volume")),
        RelaxType::Shape | RelaxType::PositionsShape => (Calculation::VcRelax, Some("shape")),
        RelaxType::Cell | RelaxType::PositionsCell => (Calculation::VcRelax, Some("all")),
    }
}

fn moves_atoms(relax_type: RelaxType) -> bool {
    !matches!(
        relax_type,
        RelaxType::Volume | RelaxType::Shape | RelaxType::Cell
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::ProtocolCatalog;
    use indexmap::IndexMap;
    use matflow_types::{ElectronicType, Protocol, Site, SpinType};

    fn parameters(relax_type: RelaxType) -> WorkflowParameters {
        WorkflowParameters {
            protocol: Protocol::Fast,
            relax_type,
            electronic_type: ElectronicType::Insulator,
            spin_type: SpinType::None,
            basic_extra: IndexMap::new(),
            properties: IndexMap::new(),
            shared_overrides: NamespaceTree::new(),
            sections: IndexMap::new(),
        }
    }

    fn build_for(relax_type: RelaxType) -> NamespaceTree {
        let structure = Structure::new(
            [[5.43, 0.0, 0.0], [0.0, 5.43, 0.0], [0.0, 0.0, 5.43]],
            vec![Site::new("Si", [0.0, 0.0, 0.0])],
        );
        let codes = Codes::new().with("pw_code", "pw@localhost");
        let preset = ProtocolCatalog::builtin().preset(Protocol::Fast).unwrap();
        build(&codes, &structure, &parameters(relax_type), preset).unwrap()
    }

    #[test]
    fn positions_relax_keeps_cell() {
        let inputs = build_for(RelaxType::Positions);
        assert_eq!(
            inputs
                .get_path("base.pw.parameters.CONTROL.calculation")
                .and_then(|n| n.as_str()),
            Some("relax")
        );
        assert!(!inputs.contains_path("base.pw.parameters.CELL"));
        assert_eq!(inputs.get("relax_type").and_then(|n| n.as_str()), Some("positions"));
    }

    #[test]
    fn positions_cell_frees_every_cell_dof() {
        let inputs = build_for(RelaxType::PositionsCell);
        assert_eq!(
            inputs
                .get_path("base.pw.parameters.CELL.cell_dofree")
                .and_then(|n| n.as_str()),
            Some("all")
        );
        assert!(!inputs.contains_path("base.pw.settings.FIXED_COORDS"));
    }

    #[test]
    fn volume_only_fixes_atoms() {
        let inputs = build_for(RelaxType::Volume);
        assert_eq!(
            inputs
                .get_path("base.pw.parameters.CONTROL.calculation")
                .and_then(|n| n.as_str()),
            Some("vc-relax")
        );
        assert!(inputs.contains_path("base.pw.settings.FIXED_COORDS"));
    }

    #[test]
    fn missing_pw_code() {
        let structure = Structure::new([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]], vec![]);
        let preset = ProtocolCatalog::builtin().preset(Protocol::Fast).unwrap();
        let err = build(&Codes::new(), &structure, &parameters(RelaxType::Positions), preset)
            .unwrap_err();
        assert_eq!(err, ConfigError::missing_code("pw_code"));
    }
}
