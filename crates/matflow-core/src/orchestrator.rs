//! Resumable orchestrator
//!
//! Drives a [`ComposedWorkflow`] through the state machine in
//! [`crate::state_machine`]. Each call to [`Orchestrator::step`] performs
//! at most one transition; the only places it can suspend are after the
//! relaxation and after the plugin fan-out have been submitted.
//!
//! The orchestrator never looks at plugin names: everything it needs comes
//! from the plan.

use crate::aggregate::{exposed_outputs, OutputTree};
use crate::cleanup::{release_descendants, CleanupReport};
use crate::context::OrchestratorContext;
use crate::error::OrchestratorError;
use crate::outcome::Outcome;
use crate::report::ReportLog;
use crate::snapshot::{Snapshot, SnapshotError, SnapshotStore};
use crate::state_machine::{validate_transition, OrchestratorState, Phase};
use crate::substrate::{SubProcessHandle, Substrate};
use chrono::Utc;
use futures::future::join_all;
use matflow_composer::{BranchPlan, ComposedWorkflow};
use matflow_registry::ExitCode;
use matflow_types::{NamespaceTree, Structure, RELAX_NAMESPACE};
use serde_json::json;
use ulid::Ulid;

/// Result of a single step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Moved to a new phase
    Advanced(Phase),
    /// Waiting on processes that are not terminal yet
    Suspended {
        /// Processes still running
        awaiting: Vec<SubProcessHandle>,
    },
    /// Already in a terminal phase
    Terminated(Phase),
}

/// Result of [`Orchestrator::drive`]
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Some processes are still running; resume later
    Suspended {
        /// Processes still running
        awaiting: Vec<SubProcessHandle>,
    },
    /// Workflow terminated
    Finished(Outcome),
}

/// Orchestrator for one composed workflow
#[derive(Debug)]
pub struct Orchestrator {
    id: Ulid,
    workflow: ComposedWorkflow,
    state: OrchestratorState,
    context: OrchestratorContext,
    outputs: OutputTree,
    report: ReportLog,
    cleanup: Option<CleanupReport>,
}

impl Orchestrator {
    /// New orchestrator in `Init`
    #[must_use]
    pub fn new(workflow: ComposedWorkflow) -> Self {
        let context = OrchestratorContext::new(workflow.structure().clone());
        Self {
            id: Ulid::new(),
            workflow,
            state: OrchestratorState::Init,
            context,
            outputs: OutputTree::new(),
            report: ReportLog::new(),
            cleanup: None,
        }
    }

    /// Restore from a snapshot; no registry is needed
    #[must_use]
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        tracing::info!(
            id = %snapshot.id,
            state = %snapshot.state.phase(),
            "orchestrator restored"
        );
        Self {
            id: snapshot.id,
            workflow: snapshot.workflow,
            state: snapshot.state,
            context: snapshot.context,
            outputs: snapshot.outputs,
            report: snapshot.report,
            cleanup: snapshot.cleanup,
        }
    }

    /// Capture the current state
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            id: self.id,
            saved_at: Utc::now(),
            state: self.state.clone(),
            context: self.context.clone(),
            workflow: self.workflow.clone(),
            outputs: self.outputs.clone(),
            report: self.report.clone(),
            cleanup: self.cleanup.clone(),
        }
    }

    /// Orchestrator id, also the snapshot key
    #[inline]
    #[must_use]
    pub fn id(&self) -> Ulid {
        self.id
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    /// Current phase
    #[inline]
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Plan being executed
    #[inline]
    #[must_use]
    pub fn workflow(&self) -> &ComposedWorkflow {
        &self.workflow
    }

    /// Working context
    #[inline]
    #[must_use]
    pub fn context(&self) -> &OrchestratorContext {
        &self.context
    }

    /// Outputs attached so far
    #[inline]
    #[must_use]
    pub fn outputs(&self) -> &OutputTree {
        &self.outputs
    }

    /// Report log
    #[inline]
    #[must_use]
    pub fn report(&self) -> &ReportLog {
        &self.report
    }

    /// Cleanup result, if cleanup ran
    #[inline]
    #[must_use]
    pub fn cleanup_report(&self) -> Option<&CleanupReport> {
        self.cleanup.as_ref()
    }

    /// Outcome, once terminated
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        match &self.state {
            OrchestratorState::Done => Some(Outcome::Success {
                outputs: self.outputs.clone(),
            }),
            OrchestratorState::Failed { code, branch } => Some(Outcome::Failure {
                code: code.clone(),
                branch: branch.clone(),
                partial_outputs: self.outputs.clone(),
            }),
            _ => None,
        }
    }

    /// Advance by one step
    ///
    /// # Errors
    /// Returns [`OrchestratorError`] on substrate faults or contract
    /// violations. Branch failures are not errors.
    pub async fn step(&mut self, substrate: &dyn Substrate) -> Result<StepResult, OrchestratorError> {
        match self.phase() {
            Phase::Init => self.setup()?,
            Phase::Setup => {
                if self.should_run_relax() {
                    self.run_relax(substrate).await?;
                } else {
                    self.report.report("Skipping relaxation");
                    self.run_plugins(substrate).await?;
                }
            }
            Phase::RelaxRunning => {
                let awaiting = pending(substrate, self.context.relax_handle.iter()).await?;
                if !awaiting.is_empty() {
                    return Ok(StepResult::Suspended { awaiting });
                }
                self.inspect_relax(substrate).await?;
            }
            Phase::RelaxInspected => self.run_plugins(substrate).await?,
            Phase::PluginsRunning => {
                let awaiting = pending(substrate, self.context.branch_handles.values()).await?;
                if !awaiting.is_empty() {
                    return Ok(StepResult::Suspended { awaiting });
                }
                self.inspect_plugins(substrate).await?;
            }
            Phase::PluginsInspected => self.results()?,
            Phase::Results => self.terminate(substrate, OrchestratorState::Done).await?,
            phase @ (Phase::Done | Phase::Failed) => return Ok(StepResult::Terminated(phase)),
        }
        Ok(StepResult::Advanced(self.phase()))
    }

    /// Step until suspended or terminated
    ///
    /// A snapshot is saved after every submission, whenever the run
    /// suspends, on termination, and before a step error is returned. The substrate is asked to wait once
    /// per suspension; if processes are still running after that, the run
    /// returns [`RunStatus::Suspended`] and can be resumed from the
    /// snapshot.
    ///
    /// # Errors
    /// Returns [`OrchestratorError`] on substrate or snapshot faults.
    pub async fn drive(
        &mut self,
        substrate: &dyn Substrate,
        store: &dyn SnapshotStore,
    ) -> Result<RunStatus, OrchestratorError> {
        let mut waited_in: Option<Phase> = None;
        loop {
            let step = match self.step(substrate).await {
                Ok(step) => step,
                Err(err) => {
                    if let Err(save_err) = store.save(&self.snapshot()).await {
                        tracing::warn!(id = %self.id, error = %save_err, "snapshot after error failed");
                    }
                    return Err(err);
                }
            };
            match step {
                StepResult::Advanced(phase) => {
                    if matches!(phase, Phase::RelaxRunning | Phase::PluginsRunning) {
                        store.save(&self.snapshot()).await?;
                    }
                }
                StepResult::Suspended { awaiting } => {
                    let phase = self.phase();
                    if waited_in == Some(phase) {
                        store.save(&self.snapshot()).await?;
                        tracing::info!(
                            id = %self.id,
                            state = %phase,
                            awaiting = awaiting.len(),
                            "suspended"
                        );
                        return Ok(RunStatus::Suspended { awaiting });
                    }
                    waited_in = Some(phase);
                    tracing::debug!(state = %phase, awaiting = awaiting.len(), "waiting on processes");
                    substrate.wait_terminal(&awaiting).await?;
                }
                StepResult::Terminated(phase) => {
                    store.save(&self.snapshot()).await?;
                    let outcome = self
                        .outcome()
                        .ok_or(OrchestratorError::NotTerminated(phase))?;
                    return Ok(RunStatus::Finished(outcome));
                }
            }
        }
    }

    /// Build the context from the input structure
    ///
    /// # Errors
    /// Returns [`OrchestratorError::IllegalTransition`] outside `Init`.
    pub fn setup(&mut self) -> Result<(), OrchestratorError> {
        self.enter(OrchestratorState::Setup)?;
        self.context = OrchestratorContext::new(self.workflow.structure().clone());
        self.report
            .report(format!("Running workflow: {}", self.workflow.label()));
        Ok(())
    }

    /// Whether the plan contains a relaxation
    #[inline]
    #[must_use]
    pub fn should_run_relax(&self) -> bool {
        self.workflow.relax_branch().is_some()
    }

    /// Submit the relaxation on the current structure
    ///
    /// # Errors
    /// Returns [`OrchestratorError`] if the transition is illegal, no
    /// relaxation is planned or the submission fails.
    pub async fn run_relax(&mut self, substrate: &dyn Substrate) -> Result<(), OrchestratorError> {
        validate_transition(self.phase(), Phase::RelaxRunning)?;
        let branch = self
            .workflow
            .relax_branch()
            .ok_or_else(|| OrchestratorError::MissingHandle(RELAX_NAMESPACE.to_string()))?;

        let mut inputs = branch.inputs.clone();
        inputs.insert("structure", structure_value(&self.context.current_structure)?);
        let handle = substrate
            .submit(&branch.sub_process_type, inputs, RELAX_NAMESPACE)
            .await?;
        self.report
            .report(format!("Launching {handle} for {RELAX_NAMESPACE}"));
        tracing::info!(branch = RELAX_NAMESPACE, pk = handle.pk, "branch submitted");
        self.context.relax_handle = Some(handle);
        self.enter(OrchestratorState::RelaxRunning)
    }

    /// Check the relaxation and pick up its structure and band count
    ///
    /// # Errors
    /// Returns [`OrchestratorError`] on substrate faults, a missing handle
    /// or an illegal transition.
    pub async fn inspect_relax(&mut self, substrate: &dyn Substrate) -> Result<(), OrchestratorError> {
        validate_transition(self.phase(), Phase::RelaxInspected)?;
        let handle = self
            .context
            .relax_handle
            .clone()
            .ok_or_else(|| OrchestratorError::MissingHandle(RELAX_NAMESPACE.to_string()))?;

        if !substrate.is_finished_ok(&handle).await? {
            let exit_status = substrate.exit_status(&handle).await?;
            self.report.report(format!(
                "Relaxation {handle} failed with exit status {}",
                describe_exit(exit_status)
            ));
            self.enter(OrchestratorState::RelaxInspected)?;
            let code = self.workflow.exit_codes().relax().clone();
            return self
                .terminate(
                    substrate,
                    OrchestratorState::Failed {
                        code,
                        branch: RELAX_NAMESPACE.to_string(),
                    },
                )
                .await;
        }

        let outputs = substrate.outputs(&handle).await?;
        if let Some(node) = outputs.get("output_structure") {
            match serde_json::from_value::<Structure>(node.to_value()) {
                Ok(structure) => {
                    self.report.report(format!(
                        "Continuing with relaxed structure {}",
                        structure.formula()
                    ));
                    self.context.current_structure = structure;
                }
                Err(err) => {
                    tracing::warn!(pk = handle.pk, error = %err, "relaxed structure unreadable, keeping input");
                }
            }
        }
        if let Some(bands) = outputs
            .get_path("output_parameters.number_of_bands")
            .and_then(matflow_types::TreeNode::as_u64)
        {
            self.context.current_band_count = Some(bands);
        }

        let exposed = exposed_outputs(&outputs, &substrate.declared_outputs(&handle.sub_process_type));
        if self.outputs.get(RELAX_NAMESPACE).is_none() {
            self.outputs.attach(RELAX_NAMESPACE, exposed)?;
        }
        self.enter(OrchestratorState::RelaxInspected)
    }

    /// Submit every plugin branch in one concurrent join
    ///
    /// Runtime bindings (structure, band count) are applied to every branch
    /// before anything is submitted.
    ///
    /// # Errors
    /// Returns [`OrchestratorError`] if the transition is illegal or any
    /// submission fails.
    pub async fn run_plugins(&mut self, substrate: &dyn Substrate) -> Result<(), OrchestratorError> {
        validate_transition(self.phase(), Phase::PluginsRunning)?;
        let structure = structure_value(&self.context.current_structure)?;
        let band_count = self.context.current_band_count;

        let prepared: Vec<(&BranchPlan, NamespaceTree)> = self
            .workflow
            .plugin_branches()
            .filter(|branch| !self.context.branch_handles.contains_key(&branch.namespace))
            .map(|branch| {
                let mut inputs = branch.inputs.clone();
                inputs.insert("structure", structure.clone());
                if let (Some(path), Some(count)) = (&branch.band_count_input, band_count) {
                    inputs.insert_path(path, json!(count));
                }
                (branch, inputs)
            })
            .collect();
        let namespaces: Vec<String> = prepared
            .iter()
            .map(|(branch, _)| branch.namespace.clone())
            .collect();

        let submitted = join_all(prepared.into_iter().map(|(branch, inputs)| {
            substrate.submit(&branch.sub_process_type, inputs, &branch.namespace)
        }))
        .await;

        // Every accepted submission is kept, so a retry only resubmits the rejected ones.
        let mut first_error = None;
        for (namespace, result) in namespaces.into_iter().zip(submitted) {
            match result {
                Ok(handle) => {
                    self.report
                        .report(format!("Launching {handle} for {namespace}"));
                    tracing::info!(branch = %namespace, pk = handle.pk, "branch submitted");
                    self.context.branch_handles.insert(namespace, handle);
                }
                Err(err) => {
                    tracing::warn!(branch = %namespace, error = %err, "branch submission rejected");
                    first_error.get_or_insert(err);
                }
            }
        }
        if let Some(err) = first_error {
            return Err(err.into());
        }
        self.enter(OrchestratorState::PluginsRunning)
    }

    /// Inspect plugin branches in plan order, stopping at the first failure
    ///
    /// # Errors
    /// Returns [`OrchestratorError`] on substrate faults, a missing handle
    /// or an illegal transition.
    pub async fn inspect_plugins(&mut self, substrate: &dyn Substrate) -> Result<(), OrchestratorError> {
        validate_transition(self.phase(), Phase::PluginsInspected)?;
        let names: Vec<String> = self
            .workflow
            .plugin_branches()
            .map(|branch| branch.namespace.clone())
            .collect();

        for (index, name) in names.iter().enumerate() {
            let handle = self
                .context
                .branch_handles
                .get(name)
                .cloned()
                .ok_or_else(|| OrchestratorError::MissingHandle(name.clone()))?;

            if !substrate.is_finished_ok(&handle).await? {
                let exit_status = substrate.exit_status(&handle).await?;
                self.report.report(format!(
                    "Plugin {name} {handle} failed with exit status {}",
                    describe_exit(exit_status)
                ));
                let code = self
                    .workflow
                    .exit_codes()
                    .plugin(name)
                    .cloned()
                    .unwrap_or_else(|| ExitCode::plugin_failed(name, index));
                self.enter(OrchestratorState::PluginsInspected)?;
                return self
                    .terminate(
                        substrate,
                        OrchestratorState::Failed {
                            code,
                            branch: name.clone(),
                        },
                    )
                    .await;
            }

            if self.outputs.get(name).is_none() {
                let outputs = substrate.outputs(&handle).await?;
                let exposed =
                    exposed_outputs(&outputs, &substrate.declared_outputs(&handle.sub_process_type));
                self.outputs.attach(name.clone(), exposed)?;
            }
        }
        self.enter(OrchestratorState::PluginsInspected)
    }

    /// Finalize outputs
    ///
    /// # Errors
    /// Returns [`OrchestratorError::IllegalTransition`] outside
    /// `PluginsInspected`.
    pub fn results(&mut self) -> Result<(), OrchestratorError> {
        self.enter(OrchestratorState::Results)?;
        let namespaces: Vec<&str> = self.outputs.namespaces().collect();
        self.report
            .report(format!("Workflow succeeded: {}", namespaces.join(", ")));
        Ok(())
    }

    /// Release intermediate storage if requested
    ///
    /// Runs on entering `Done` or `Failed`. Never fails; release errors are
    /// recorded in the cleanup report.
    pub async fn on_terminate(&mut self, substrate: &dyn Substrate) {
        if !self.workflow.clean_workdir() {
            self.report.report("Remote folders will not be cleaned");
            return;
        }

        let handles: Vec<SubProcessHandle> = self.context.handles().cloned().collect();
        let cleanup = release_descendants(substrate, &handles).await;
        if !cleanup.cleaned.is_empty() {
            let cleaned: Vec<String> = cleanup.cleaned.iter().map(ToString::to_string).collect();
            self.report.report(format!(
                "Cleaned remote folders of calculations: {}",
                cleaned.join(" ")
            ));
        }
        if !cleanup.is_clean() {
            tracing::warn!(
                id = %self.id,
                failed = cleanup.failed.len(),
                "some remote folders could not be cleaned"
            );
        }
        self.cleanup = Some(cleanup);
    }

    async fn terminate(
        &mut self,
        substrate: &dyn Substrate,
        state: OrchestratorState,
    ) -> Result<(), OrchestratorError> {
        self.enter(state)?;
        self.on_terminate(substrate).await;
        Ok(())
    }

    fn enter(&mut self, to: OrchestratorState) -> Result<(), OrchestratorError> {
        let from = self.phase();
        validate_transition(from, to.phase())?;
        tracing::debug!(id = %self.id, from = %from, to = %to.phase(), "state transition");
        self.state = to;
        Ok(())
    }
}

async fn pending<'a>(
    substrate: &dyn Substrate,
    handles: impl Iterator<Item = &'a SubProcessHandle>,
) -> Result<Vec<SubProcessHandle>, OrchestratorError> {
    let mut awaiting = Vec::new();
    for handle in handles {
        if !substrate.status(handle).await?.is_terminal() {
            awaiting.push(handle.clone());
        }
    }
    Ok(awaiting)
}

fn structure_value(structure: &Structure) -> Result<serde_json::Value, OrchestratorError> {
    serde_json::to_value(structure)
        .map_err(|err| OrchestratorError::Snapshot(SnapshotError::Encoding(err)))
}

fn describe_exit(exit_status: Option<u32>) -> String {
    exit_status.map_or_else(|| "none".to_string(), |status| status.to_string())
}
