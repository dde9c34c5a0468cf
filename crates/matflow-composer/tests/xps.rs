//! XPS branch derivation

use matflow_composer::{build, builtin_registry, PseudoLibrary, Pseudopotential};
use matflow_test_utils::{carbon_monoxide, registry, xps_document, xps_section};
use matflow_types::{ConfigError, TreeNode};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

#[test]
fn core_hole_pairs_and_corrections_are_resolved() {
    let workflow = build(&registry(), &carbon_monoxide(), &xps_document("crystal")).unwrap();
    let xps = &workflow.branch("xps").unwrap().inputs;

    assert_eq!(
        xps.get("pseudos").unwrap().to_value(),
        json!({
            "C": {
                "core_hole": {"label": "C_1s", "filename": "C.star1s-pbe-rrkjus_psl.1.0.0.UPF"},
                "gipaw": {"label": "C_gs", "filename": "C.pbe-n-kjgipaw_psl.1.0.0.UPF"},
            },
            "O": {
                "core_hole": {"label": "O_1s", "filename": "O.star1s-pbe-rrkjus_psl.1.0.0.UPF"},
                "gipaw": {"label": "O_gs", "filename": "O.pbe-n-kjgipaw_psl.1.0.0.UPF"},
            },
        })
    );
    assert_eq!(xps.get("elements_list").unwrap().to_value(), json!(["C", "O"]));
    assert_eq!(
        xps.get("correction_energies").unwrap().to_value(),
        json!({"C": 339.79, "O": 675.48})
    );
    assert_eq!(
        xps.get_path("core_hole_treatments.C_1s").and_then(TreeNode::as_str),
        Some("xch_smear")
    );
    assert_eq!(
        xps.get_path("calc_binding_energy").and_then(TreeNode::as_bool),
        Some(true)
    );
    assert!(xps.contains_path("ch_scf.pw.code"));
    assert!(!xps.contains("relax"));
    assert!(!xps.contains("structure"));
}

#[test]
fn supercell_padding_depends_on_structure_type() {
    let padding = |structure_type: &str| {
        let workflow =
            build(&registry(), &carbon_monoxide(), &xps_document(structure_type)).unwrap();
        let xps = &workflow.branch("xps").unwrap().inputs;
        (
            xps.get_path("structure_preparation_settings.supercell_min_parameter")
                .and_then(TreeNode::as_f64),
            xps.get_path("structure_preparation_settings.is_molecule_input")
                .and_then(TreeNode::as_bool),
        )
    };
    assert_eq!(padding("crystal"), (Some(3.0), Some(false)));
    assert_eq!(padding("molecule"), (Some(8.0), Some(true)));
}

#[test]
fn explicit_core_hole_treatment_is_used() {
    let mut doc = xps_document("crystal");
    let mut section = xps_section("crystal");
    section["core_hole_treatment"] = json!("full");
    doc.sections.insert("xps".into(), section);
    let workflow = build(&registry(), &carbon_monoxide(), &doc).unwrap();
    assert_eq!(
        workflow
            .branch("xps")
            .unwrap()
            .inputs
            .get_path("core_hole_treatments.O_1s")
            .and_then(TreeNode::as_str),
        Some("full")
    );
}

#[test]
fn element_without_pair_is_rejected() {
    let mut doc = xps_document("crystal");
    let mut section = xps_section("crystal");
    section["elements_list"] = json!(["C_1s", "Fe_2p"]);
    section["correction_energies"]["Fe_2p"] = json!({"core": 1.0});
    doc.sections.insert("xps".into(), section);
    let err = build(&registry(), &carbon_monoxide(), &doc).unwrap_err();
    assert_eq!(
        err,
        ConfigError::MissingPseudopotential {
            element: "Fe".into()
        }
    );
}

#[test]
fn missing_correction_energy_is_rejected() {
    let mut doc = xps_document("crystal");
    let mut section = xps_section("crystal");
    section["elements_list"] = json!(["N_1s"]);
    doc.sections.insert("xps".into(), section);
    let err = build(&registry(), &carbon_monoxide(), &doc).unwrap_err();
    assert_eq!(err, ConfigError::MissingCorrectionEnergy("N_1s".into()));
}

#[test]
fn unknown_group_is_rejected() {
    let mut doc = xps_document("crystal");
    let mut section = xps_section("crystal");
    section["pseudo_group"] = json!("core_hole_pseudos_lda");
    doc.sections.insert("xps".into(), section);
    let err = build(&registry(), &carbon_monoxide(), &doc).unwrap_err();
    assert_eq!(err, ConfigError::UnknownPseudoGroup("core_hole_pseudos_lda".into()));
}

#[test]
fn missing_section_is_rejected() {
    let mut doc = xps_document("crystal");
    doc.sections.shift_remove("xps");
    let err = build(&registry(), &carbon_monoxide(), &doc).unwrap_err();
    assert_eq!(err, ConfigError::MissingSection("xps".into()));
}

#[test]
fn custom_library_groups_are_used() {
    let library = PseudoLibrary::new()
        .with(
            "custom",
            Pseudopotential {
                label: "C_1s".into(),
                element: "C".into(),
                filename: "C.custom-ch.UPF".into(),
            },
        )
        .with(
            "custom",
            Pseudopotential {
                label: "C_gs".into(),
                element: "C".into(),
                filename: "C.custom-gs.UPF".into(),
            },
        );
    let registry = builtin_registry(Arc::new(library)).unwrap();

    let mut doc = xps_document("molecule");
    let mut section = xps_section("molecule");
    section["pseudo_group"] = json!("custom");
    section["elements_list"] = json!(["C_1s"]);
    doc.sections.insert("xps".into(), section);

    let workflow = build(&registry, &carbon_monoxide(), &doc).unwrap();
    assert_eq!(
        workflow
            .branch("xps")
            .unwrap()
            .inputs
            .get_path("pseudos.C.core_hole.filename")
            .and_then(TreeNode::as_str),
        Some("C.custom-ch.UPF")
    );
}
