//! Submission faults and substrates that rewrite handle labels

use matflow_core::{
    ComputeTaskId, MemorySnapshotStore, Orchestrator, OrchestratorError, OutputSchema, Phase,
    ProcessStatus, RunStatus, SimulatedSubstrate, SubProcessHandle, Substrate, SubstrateError,
};
use matflow_test_utils::{compose, document, registry};
use matflow_types::NamespaceTree;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

/// Wraps the simulated substrate, rejecting one label once and optionally
/// upper-casing the labels it hands back.
struct FlakySubstrate {
    inner: SimulatedSubstrate,
    reject_once: Mutex<Option<String>>,
    upper_case_labels: bool,
}

impl FlakySubstrate {
    fn new(inner: SimulatedSubstrate) -> Self {
        Self {
            inner,
            reject_once: Mutex::new(None),
            upper_case_labels: false,
        }
    }

    fn reject_once(self, label: &str) -> Self {
        *self.reject_once.lock() = Some(label.to_string());
        self
    }

    fn upper_case_labels(mut self) -> Self {
        self.upper_case_labels = true;
        self
    }
}

#[async_trait::async_trait]
impl Substrate for FlakySubstrate {
    async fn submit(
        &self,
        sub_process_type: &str,
        inputs: NamespaceTree,
        label: &str,
    ) -> Result<SubProcessHandle, SubstrateError> {
        {
            let mut reject = self.reject_once.lock();
            if reject.as_deref() == Some(label) {
                *reject = None;
                return Err(SubstrateError::Unavailable("transient".into()));
            }
        }
        let mut handle = self.inner.submit(sub_process_type, inputs, label).await?;
        if self.upper_case_labels {
            handle.label = handle.label.to_uppercase();
        }
        Ok(handle)
    }

    async fn status(&self, handle: &SubProcessHandle) -> Result<ProcessStatus, SubstrateError> {
        self.inner.status(handle).await
    }

    async fn outputs(&self, handle: &SubProcessHandle) -> Result<NamespaceTree, SubstrateError> {
        self.inner.outputs(handle).await
    }

    fn declared_outputs(&self, sub_process_type: &str) -> OutputSchema {
        self.inner.declared_outputs(sub_process_type)
    }

    async fn wait_terminal(&self, handles: &[SubProcessHandle]) -> Result<(), SubstrateError> {
        self.inner.wait_terminal(handles).await
    }

    async fn descendant_tasks(
        &self,
        handle: &SubProcessHandle,
    ) -> Result<Vec<ComputeTaskId>, SubstrateError> {
        self.inner.descendant_tasks(handle).await
    }

    async fn release_storage(&self, task: ComputeTaskId) -> Result<(), SubstrateError> {
        self.inner.release_storage(task).await
    }
}

#[tokio::test]
async fn rejected_submission_keeps_accepted_handles() {
    let workflow = compose(&registry(), &document("none", &["bands", "pdos"]));
    let substrate = FlakySubstrate::new(SimulatedSubstrate::new()).reject_once("pdos");
    let store = MemorySnapshotStore::new();
    let mut orchestrator = Orchestrator::new(workflow);

    let err = orchestrator.drive(&substrate, &store).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::Substrate(SubstrateError::Unavailable(_))
    ));
    assert_eq!(orchestrator.phase(), Phase::Setup);
    assert_eq!(
        orchestrator.context().branch_handles.keys().collect::<Vec<_>>(),
        vec!["bands"]
    );

    let saved = store.history().pop().unwrap();
    assert!(saved.context.branch_handles.contains_key("bands"));

    let status = orchestrator.drive(&substrate, &store).await.unwrap();
    let RunStatus::Finished(outcome) = status else {
        panic!("expected the retried run to finish");
    };
    assert!(outcome.is_success());
    assert_eq!(
        outcome.outputs().namespaces().collect::<Vec<_>>(),
        vec!["bands", "pdos"]
    );
    assert_eq!(substrate.inner.submissions_of("bands").len(), 1);
    assert_eq!(substrate.inner.submissions_of("pdos").len(), 1);
}

#[tokio::test]
async fn rejected_relax_submission_is_retried() {
    let workflow = compose(&registry(), &document("positions", &["bands"]));
    let substrate = FlakySubstrate::new(SimulatedSubstrate::new()).reject_once("relax");
    let store = MemorySnapshotStore::new();
    let mut orchestrator = Orchestrator::new(workflow);

    assert!(orchestrator.drive(&substrate, &store).await.is_err());
    assert!(orchestrator.context().relax_handle.is_none());

    let status = orchestrator.drive(&substrate, &store).await.unwrap();
    assert!(matches!(status, RunStatus::Finished(outcome) if outcome.is_success()));
    assert_eq!(substrate.inner.submissions_of("relax").len(), 1);
}

#[tokio::test]
async fn handles_are_keyed_by_plan_namespace() {
    let workflow = compose(&registry(), &document("none", &["bands", "pdos"]));
    let substrate = FlakySubstrate::new(SimulatedSubstrate::new()).upper_case_labels();
    let store = MemorySnapshotStore::new();
    let mut orchestrator = Orchestrator::new(workflow);

    let status = orchestrator.drive(&substrate, &store).await.unwrap();
    let RunStatus::Finished(outcome) = status else {
        panic!("expected the run to finish");
    };
    assert!(outcome.is_success());
    assert_eq!(
        orchestrator.context().branch_handles.keys().collect::<Vec<_>>(),
        vec!["bands", "pdos"]
    );
    assert_eq!(
        orchestrator.context().branch_handles["bands"].label,
        "BANDS"
    );
}
