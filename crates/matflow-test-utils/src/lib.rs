//! Testing utilities for the matflow workspace
//!
//! Shared fixtures: structures, parameter documents, registries and
//! composed workflows.

#![allow(missing_docs)]

use matflow_composer::{builtin_registry, build, ComposedWorkflow, PseudoLibrary};
use matflow_core::{MemorySnapshotStore, Orchestrator, RunStatus, SimulatedSubstrate};
use matflow_registry::{PluginDescriptor, PluginRegistry};
use matflow_types::{NamespaceTree, ParameterDocument, Site, Structure};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn silicon() -> Structure {
    Structure::new(
        [[0.0, 2.715, 2.715], [2.715, 0.0, 2.715], [2.715, 2.715, 0.0]],
        vec![
            Site::new("Si", [0.0, 0.0, 0.0]),
            Site::new("Si", [1.3575, 1.3575, 1.3575]),
        ],
    )
}

pub fn relaxed_silicon() -> Structure {
    Structure::new(
        [[0.0, 2.734, 2.734], [2.734, 0.0, 2.734], [2.734, 2.734, 0.0]],
        vec![
            Site::new("Si", [0.0, 0.0, 0.0]),
            Site::new("Si", [1.367, 1.367, 1.367]),
        ],
    )
    .with_label("relaxed Si2")
}

pub fn carbon_monoxide() -> Structure {
    Structure::new(
        [[10.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]],
        vec![
            Site::new("C", [5.0, 5.0, 4.436]),
            Site::new("O", [5.0, 5.0, 5.564]),
        ],
    )
    .with_pbc([false, false, false])
}

pub fn codes_json() -> Value {
    json!({
        "pw_code": "pw-7.2@localhost",
        "dos_code": "dos-7.2@localhost",
        "projwfc_code": "projwfc-7.2@localhost",
    })
}

/// Document enabling `properties` on top of a relaxation of `relax_type`
pub fn document(relax_type: &str, properties: &[&str]) -> ParameterDocument {
    document_from(json!({
        "basic": {
            "protocol": "moderate",
            "electronic_type": "insulator",
            "spin_type": "none",
        },
        "workflow": {
            "relax_type": relax_type,
            "properties": properties
                .iter()
                .map(|name| (name.to_string(), json!(true)))
                .collect::<serde_json::Map<_, _>>(),
        },
        "codes": codes_json(),
    }))
}

pub fn document_from(value: Value) -> ParameterDocument {
    serde_json::from_value(value).unwrap()
}

pub fn xps_section(structure_type: &str) -> Value {
    json!({
        "pseudo_group": "core_hole_pseudos_pbe",
        "elements_list": ["C_1s", "O_1s"],
        "structure_type": structure_type,
        "correction_energies": {
            "C_1s": {"core": 339.79, "exp": 297.41},
            "O_1s": {"core": 675.48, "exp": 532.69},
        },
    })
}

pub fn xps_document(structure_type: &str) -> ParameterDocument {
    let mut doc = document("none", &["xps"]);
    doc.sections.insert("xps".into(), xps_section(structure_type));
    doc
}

pub fn registry() -> PluginRegistry {
    builtin_registry(Arc::new(PseudoLibrary::builtin().unwrap())).unwrap()
}

/// Descriptor whose factory returns a fixed payload plus the fields it
/// must not expose
pub fn stub_plugin(name: &str) -> PluginDescriptor {
    let payload = name.to_string();
    PluginDescriptor::new(name, format!("test.{name}"), move |codes, _, _| {
        let mut inputs = NamespaceTree::new();
        inputs.insert("code", json!(codes.require("pw_code")?.label));
        inputs.insert("payload", json!(payload));
        inputs.insert("clean_workdir", json!(false));
        inputs.insert("structure", json!(null));
        Ok(inputs)
    })
    .with_excluded(["clean_workdir", "structure"])
}

/// Registry of stub plugins in the given order
pub fn stub_registry(names: &[&str]) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    for name in names {
        registry.register(stub_plugin(name)).unwrap();
    }
    registry
}

pub fn compose(registry: &PluginRegistry, document: &ParameterDocument) -> ComposedWorkflow {
    build(registry, &silicon(), document).unwrap()
}

/// Drive a fresh orchestrator against `substrate` with an in-memory store
pub async fn run(
    workflow: ComposedWorkflow,
    substrate: &SimulatedSubstrate,
) -> (Orchestrator, RunStatus, MemorySnapshotStore) {
    let store = MemorySnapshotStore::new();
    let mut orchestrator = Orchestrator::new(workflow);
    let status = orchestrator.drive(substrate, &store).await.unwrap();
    (orchestrator, status, store)
}
