//! End-to-end orchestration against the simulated substrate

use matflow_core::{
    ComputeTaskId, Orchestrator, OrchestratorError, OrchestratorState, Outcome, Phase,
    ProcessStatus, RunStatus, SimulatedSubstrate, StepResult, Substrate, SIMULATED_NUMBER_OF_BANDS,
};
use matflow_test_utils::{
    codes_json, compose, document, document_from, registry, relaxed_silicon, run, stub_registry,
};
use matflow_types::{NamespaceTree, Structure, TreeNode};
use pretty_assertions::assert_eq;
use serde_json::json;

fn finished(status: RunStatus) -> Outcome {
    match status {
        RunStatus::Finished(outcome) => outcome,
        RunStatus::Suspended { awaiting } => panic!("still waiting on {awaiting:?}"),
    }
}

#[tokio::test]
async fn relax_then_bands_succeeds() {
    let workflow = compose(&registry(), &document("positions", &["bands"]));
    let substrate = SimulatedSubstrate::new();
    let (orchestrator, status, store) = run(workflow, &substrate).await;

    let outcome = finished(status);
    assert!(outcome.is_success());
    assert_eq!(orchestrator.phase(), Phase::Done);
    assert_eq!(
        outcome.outputs().namespaces().collect::<Vec<_>>(),
        vec!["relax", "bands"]
    );

    let bands = outcome.outputs().get("bands").unwrap();
    assert_eq!(
        bands.keys().collect::<Vec<_>>(),
        vec!["scf_parameters", "band_parameters", "band_structure"]
    );
    let relax = outcome.outputs().get("relax").unwrap();
    assert!(relax.contains("output_structure"));
    assert!(!relax.contains("remote_folder"));

    assert_eq!(
        orchestrator.report().messages(),
        vec![
            "Running workflow: Si2 [relax: atoms (fixed cell), moderate protocol] → bands"
                .to_string(),
            "Launching quantumespresso.pw.relax<1> for relax".to_string(),
            "Continuing with relaxed structure Si2".to_string(),
            "Launching quantumespresso.pw.bands<2> for bands".to_string(),
            "Workflow succeeded: relax, bands".to_string(),
            "Remote folders will not be cleaned".to_string(),
        ]
    );

    let phases: Vec<Phase> = store
        .history()
        .iter()
        .map(|snapshot| snapshot.state.phase())
        .collect();
    assert_eq!(phases, vec![Phase::RelaxRunning, Phase::PluginsRunning, Phase::Done]);
    assert!(orchestrator.cleanup_report().is_none());
    assert!(substrate.released_tasks().is_empty());
}

#[tokio::test]
async fn relax_failure_stops_before_plugins() {
    let workflow = compose(&registry(), &document("positions_cell", &["bands", "pdos"]));
    let substrate = SimulatedSubstrate::new().fail("relax", 300);
    let (orchestrator, status, _) = run(workflow, &substrate).await;

    let outcome = finished(status);
    assert!(!outcome.is_success());
    assert_eq!(outcome.branch(), Some("relax"));
    assert_eq!(outcome.exit_code().unwrap().status, 401);
    assert!(outcome.outputs().is_empty());
    assert_eq!(substrate.submissions().len(), 1);
    assert!(substrate.submissions_of("bands").is_empty());
    assert!(orchestrator
        .report()
        .messages()
        .contains(&"Relaxation quantumespresso.pw.relax<1> failed with exit status 300".to_string()));
}

#[tokio::test]
async fn first_failed_plugin_in_plan_order_is_reported() {
    let workflow = compose(&registry(), &document("positions", &["bands", "pdos"]));
    let substrate = SimulatedSubstrate::new().fail("bands", 310).fail("pdos", 320);
    let (orchestrator, status, _) = run(workflow, &substrate).await;

    let outcome = finished(status);
    assert_eq!(outcome.branch(), Some("bands"));
    assert_eq!(outcome.exit_code().unwrap().status, 405);
    assert_eq!(outcome.outputs().namespaces().collect::<Vec<_>>(), vec!["relax"]);
    assert!(matches!(
        orchestrator.state(),
        OrchestratorState::Failed { branch, .. } if branch == "bands"
    ));
}

#[tokio::test]
async fn later_plugin_failure_keeps_earlier_outputs() {
    let workflow = compose(&registry(), &document("positions", &["bands", "pdos"]));
    let substrate = SimulatedSubstrate::new().fail("pdos", 320);
    let (_, status, _) = run(workflow, &substrate).await;

    match finished(status) {
        Outcome::Failure {
            code,
            branch,
            partial_outputs,
        } => {
            assert_eq!(branch, "pdos");
            assert_eq!(code.status, 406);
            assert_eq!(code.label, "ERROR_SUB_PROCESS_FAILED_pdos");
            assert_eq!(
                partial_outputs.namespaces().collect::<Vec<_>>(),
                vec!["relax", "bands"]
            );
        }
        other @ Outcome::Success { .. } => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn excepted_plugin_counts_as_failure() {
    let workflow = compose(&registry(), &document("none", &["bands"]));
    let substrate = SimulatedSubstrate::new().with_outcome("bands", ProcessStatus::Excepted);
    let (orchestrator, status, _) = run(workflow, &substrate).await;

    assert_eq!(finished(status).branch(), Some("bands"));
    assert!(orchestrator
        .report()
        .messages()
        .contains(&"Plugin bands quantumespresso.pw.bands<1> failed with exit status none".to_string()));
}

#[tokio::test]
async fn plugins_are_submitted_together_after_relax() {
    let workflow = compose(&registry(), &document("positions", &["bands", "pdos"]));
    let substrate = SimulatedSubstrate::new();
    let _ = run(workflow, &substrate).await;

    let relax = substrate.submissions_of("relax");
    let bands = substrate.submissions_of("bands");
    let pdos = substrate.submissions_of("pdos");
    assert_eq!((relax.len(), bands.len(), pdos.len()), (1, 1, 1));
    assert_eq!(bands[0].generation, pdos[0].generation);
    assert!(bands[0].generation > relax[0].generation);
}

#[tokio::test]
async fn no_relax_goes_straight_to_plugins() {
    let workflow = compose(&registry(), &document("none", &["bands", "pdos"]));
    let substrate = SimulatedSubstrate::new();
    let (orchestrator, status, _) = run(workflow, &substrate).await;

    assert!(finished(status).is_success());
    assert!(substrate.submissions_of("relax").is_empty());
    assert!(orchestrator.context().relax_handle.is_none());
    assert!(orchestrator
        .report()
        .messages()
        .contains(&"Skipping relaxation".to_string()));

    let bands = &substrate.submissions_of("bands")[0].inputs;
    assert!(!bands.contains_path("bands.pw.parameters.SYSTEM.nbnd"));
}

#[tokio::test]
async fn relaxed_band_count_is_bound_into_bands() {
    let workflow = compose(&registry(), &document("positions", &["bands", "pdos"]));
    let substrate = SimulatedSubstrate::new();
    let (orchestrator, _, _) = run(workflow, &substrate).await;

    let bands = &substrate.submissions_of("bands")[0].inputs;
    assert_eq!(
        bands
            .get_path("bands.pw.parameters.SYSTEM.nbnd")
            .and_then(TreeNode::as_u64),
        Some(SIMULATED_NUMBER_OF_BANDS)
    );
    let pdos = &substrate.submissions_of("pdos")[0].inputs;
    assert!(!pdos.contains_path("bands"));
    assert_eq!(
        orchestrator.context().current_band_count,
        Some(SIMULATED_NUMBER_OF_BANDS)
    );
}

#[tokio::test]
async fn relaxed_structure_feeds_every_plugin() {
    let relaxed = relaxed_silicon();
    let mut relax_outputs = NamespaceTree::new();
    relax_outputs.insert("output_structure", serde_json::to_value(&relaxed).unwrap());
    relax_outputs.insert("output_parameters", json!({"number_of_bands": 12}));

    let workflow = compose(&registry(), &document("positions_cell", &["bands", "pdos"]));
    let substrate = SimulatedSubstrate::new().with_outputs("relax", relax_outputs);
    let (orchestrator, status, _) = run(workflow, &substrate).await;

    assert!(finished(status).is_success());
    assert_eq!(orchestrator.context().current_structure, relaxed);
    for label in ["bands", "pdos"] {
        let inputs = &substrate.submissions_of(label)[0].inputs;
        let structure: Structure =
            serde_json::from_value(inputs.get("structure").unwrap().to_value()).unwrap();
        assert_eq!(structure, relaxed, "{label}");
    }
    assert_eq!(
        substrate.submissions_of("bands")[0]
            .inputs
            .get_path("bands.pw.parameters.SYSTEM.nbnd")
            .and_then(TreeNode::as_u64),
        Some(12)
    );
}

#[tokio::test]
async fn unreadable_relaxed_structure_keeps_input() {
    let mut relax_outputs = NamespaceTree::new();
    relax_outputs.insert("output_structure", json!({"not": "a structure"}));

    let workflow = compose(&registry(), &document("positions", &["bands"]));
    let input = workflow.structure().clone();
    let substrate = SimulatedSubstrate::new().with_outputs("relax", relax_outputs);
    let (orchestrator, status, _) = run(workflow, &substrate).await;

    assert!(finished(status).is_success());
    assert_eq!(orchestrator.context().current_structure, input);
    assert_eq!(orchestrator.context().current_band_count, None);
}

fn bands_plugin_document() -> matflow_types::ParameterDocument {
    document_from(json!({
        "basic": {
            "protocol": "fast",
            "electronic_type": "insulator",
            "spin_type": "none",
        },
        "workflow": {
            "relax_type": "positions",
            "properties": {"bandsPlugin": true, "pdosPlugin": false},
        },
        "codes": codes_json(),
    }))
}

#[tokio::test]
async fn externally_registered_plugin_runs_after_relax() {
    let registry = stub_registry(&["bandsPlugin", "pdosPlugin"]);
    let workflow = compose(&registry, &bands_plugin_document());
    assert_eq!(
        workflow.input_tree().keys().collect::<Vec<_>>(),
        vec!["relax", "bandsPlugin"]
    );

    let (_, status, _) = run(workflow, &SimulatedSubstrate::new()).await;
    let outcome = finished(status);
    assert!(outcome.is_success());
    assert_eq!(
        outcome.outputs().namespaces().collect::<Vec<_>>(),
        vec!["relax", "bandsPlugin"]
    );
    assert!(outcome
        .outputs()
        .get("bandsPlugin")
        .unwrap()
        .contains("output_parameters"));
}

#[tokio::test]
async fn externally_registered_plugin_failure_is_attributed() {
    let registry = stub_registry(&["bandsPlugin", "pdosPlugin"]);
    let workflow = compose(&registry, &bands_plugin_document());
    let substrate = SimulatedSubstrate::new().fail("bandsPlugin", 410);
    let (_, status, _) = run(workflow, &substrate).await;

    let outcome = finished(status);
    assert!(!outcome.is_success());
    assert_eq!(outcome.branch(), Some("bandsPlugin"));
    assert_eq!(
        outcome.exit_code().unwrap().label,
        "ERROR_SUB_PROCESS_FAILED_bandsPlugin"
    );
    assert_eq!(outcome.exit_code().unwrap().status, 405);
    assert!(outcome.outputs().get("relax").is_some());
    assert!(outcome.outputs().get("bandsPlugin").is_none());
    assert!(substrate.submissions_of("pdosPlugin").is_empty());
}

#[tokio::test]
async fn cleanup_is_best_effort() {
    let workflow = compose(&registry(), &document("positions", &["bands"])).with_clean_workdir(true);
    let substrate = SimulatedSubstrate::new()
        .with_tasks_per_process(2)
        .with_failing_release("relax");
    let (orchestrator, status, _) = run(workflow, &substrate).await;

    assert!(finished(status).is_success());
    let cleanup = orchestrator.cleanup_report().unwrap();
    assert!(!cleanup.is_clean());
    assert_eq!(cleanup.cleaned, vec![ComputeTaskId(3), ComputeTaskId(4)]);
    assert_eq!(
        cleanup.failed.iter().map(|failure| failure.task).collect::<Vec<_>>(),
        vec![ComputeTaskId(1), ComputeTaskId(2)]
    );
    assert_eq!(substrate.released_tasks(), vec![ComputeTaskId(3), ComputeTaskId(4)]);
    assert!(orchestrator
        .report()
        .messages()
        .contains(&"Cleaned remote folders of calculations: 3 4".to_string()));
}

#[tokio::test]
async fn cleanup_runs_on_failure_too() {
    let workflow = compose(&registry(), &document("positions", &["bands"])).with_clean_workdir(true);
    let substrate = SimulatedSubstrate::new().fail("relax", 300);
    let (orchestrator, status, _) = run(workflow, &substrate).await;

    assert_eq!(finished(status).branch(), Some("relax"));
    let cleanup = orchestrator.cleanup_report().unwrap();
    assert!(cleanup.is_clean());
    assert_eq!(cleanup.cleaned, vec![ComputeTaskId(1)]);
}

#[tokio::test]
async fn step_reports_each_transition() {
    let workflow = compose(&registry(), &document("none", &["bands"]));
    let substrate = SimulatedSubstrate::new();
    let mut orchestrator = Orchestrator::new(workflow);

    assert_eq!(
        orchestrator.step(&substrate).await.unwrap(),
        StepResult::Advanced(Phase::Setup)
    );
    assert_eq!(
        orchestrator.step(&substrate).await.unwrap(),
        StepResult::Advanced(Phase::PluginsRunning)
    );
    let StepResult::Suspended { awaiting } = orchestrator.step(&substrate).await.unwrap() else {
        panic!("bands should still be running");
    };
    assert_eq!(awaiting.len(), 1);

    substrate.wait_terminal(&awaiting).await.unwrap();
    for expected in [Phase::PluginsInspected, Phase::Results, Phase::Done] {
        assert_eq!(
            orchestrator.step(&substrate).await.unwrap(),
            StepResult::Advanced(expected)
        );
    }
    assert_eq!(
        orchestrator.step(&substrate).await.unwrap(),
        StepResult::Terminated(Phase::Done)
    );
    assert!(orchestrator.outcome().unwrap().is_success());
}

#[cfg(not(feature = "strict-debug"))]
#[tokio::test]
async fn out_of_order_calls_are_rejected() {
    let workflow = compose(&registry(), &document("none", &["bands"]));
    let substrate = SimulatedSubstrate::new();
    let mut orchestrator = Orchestrator::new(workflow);

    let err = orchestrator.results().unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::IllegalTransition {
            from: Phase::Init,
            to: Phase::Results
        }
    ));
    let err = orchestrator.inspect_plugins(&substrate).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::IllegalTransition { .. }));
    assert_eq!(orchestrator.phase(), Phase::Init);
    assert!(substrate.submissions().is_empty());
}

mod ordered_stop {
    use super::*;
    use proptest::prelude::*;

    const PLUGINS: [&str; 4] = ["p0", "p1", "p2", "p3"];

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn first_failing_branch_in_plan_order_wins(failing in prop::collection::vec(any::<bool>(), 4)) {
            let registry = stub_registry(&PLUGINS);
            let workflow = compose(&registry, &document("none", &PLUGINS));
            let mut substrate = SimulatedSubstrate::new();
            for (index, name) in PLUGINS.iter().enumerate() {
                if failing[index] {
                    substrate = substrate.fail(*name, 300 + u32::try_from(index).unwrap());
                }
            }

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (_, status, _) = runtime.block_on(run(workflow, &substrate));
            let outcome = finished(status);

            match failing.iter().position(|failed| *failed) {
                None => {
                    prop_assert!(outcome.is_success());
                    prop_assert_eq!(outcome.outputs().len(), PLUGINS.len());
                }
                Some(first) => {
                    prop_assert_eq!(outcome.branch(), Some(PLUGINS[first]));
                    prop_assert_eq!(
                        outcome.exit_code().unwrap().status,
                        405 + u32::try_from(first).unwrap()
                    );
                    prop_assert_eq!(
                        outcome.outputs().namespaces().collect::<Vec<_>>(),
                        PLUGINS[..first].to_vec()
                    );
                }
            }
        }
    }
}
