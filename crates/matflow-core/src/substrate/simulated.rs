//! Deterministic in-process substrate
//!
//! Processes finish when [`Substrate::wait_terminal`] is called, with an
//! outcome scripted per branch label. Held labels stay running until
//! released. Every submission is logged with the wait generation it
//! happened in, so callers can tell which submissions were issued
//! together.

use super::{
    ComputeTaskId, OutputSchema, ProcessStatus, SubProcessHandle, Substrate, SubstrateError,
};
use dashmap::DashMap;
use indexmap::IndexMap;
use matflow_types::NamespaceTree;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Band count reported by simulated relaxations
pub const SIMULATED_NUMBER_OF_BANDS: u64 = 8;

/// Ports declared by sub-process types that have no explicit schema
const FALLBACK_PORTS: &[&str] = &["output_parameters"];

fn builtin_ports(sub_process_type: &str) -> &'static [&'static str] {
    match sub_process_type {
        "quantumespresso.pw.relax" => &["output_structure", "output_parameters", "output_trajectory"],
        "quantumespresso.pw.bands" => &["scf_parameters", "band_parameters", "band_structure"],
        "quantumespresso.pdos" => &["nscf", "dos", "projwfc"],
        "quantumespresso.xps" => &[
            "binding_energies",
            "chemical_shifts",
            "final_spectra",
            "output_parameters_ch",
        ],
        _ => FALLBACK_PORTS,
    }
}

/// One logged submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    /// Handle returned to the caller
    pub handle: SubProcessHandle,
    /// Inputs exactly as submitted
    pub inputs: NamespaceTree,
    /// Number of waits that happened before this submission
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SimulatedProcess {
    handle: SubProcessHandle,
    inputs: NamespaceTree,
    status: ProcessStatus,
    tasks: Vec<ComputeTaskId>,
}

/// Serializable state of a [`SimulatedSubstrate`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulatedState {
    next_pk: u64,
    next_task: u64,
    generation: u64,
    tasks_per_process: usize,
    processes: Vec<SimulatedProcess>,
    outcomes: IndexMap<String, ProcessStatus>,
    held: BTreeSet<String>,
    output_fixtures: IndexMap<String, NamespaceTree>,
    declared: IndexMap<String, OutputSchema>,
    failing_releases: BTreeSet<String>,
    released: Vec<ComputeTaskId>,
    submissions: Vec<Submission>,
}

/// Scripted substrate for tests and dry runs
#[derive(Debug)]
pub struct SimulatedSubstrate {
    next_pk: AtomicU64,
    next_task: AtomicU64,
    generation: AtomicU64,
    tasks_per_process: usize,
    processes: DashMap<u64, SimulatedProcess>,
    outcomes: DashMap<String, ProcessStatus>,
    held: RwLock<BTreeSet<String>>,
    output_fixtures: DashMap<String, NamespaceTree>,
    declared: DashMap<String, OutputSchema>,
    failing_releases: RwLock<BTreeSet<String>>,
    task_owners: DashMap<ComputeTaskId, String>,
    released: Mutex<Vec<ComputeTaskId>>,
    submissions: Mutex<Vec<Submission>>,
}

impl Default for SimulatedSubstrate {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSubstrate {
    /// Substrate where everything succeeds and each process spawns one task
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_pk: AtomicU64::new(0),
            next_task: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            tasks_per_process: 1,
            processes: DashMap::new(),
            outcomes: DashMap::new(),
            held: RwLock::new(BTreeSet::new()),
            output_fixtures: DashMap::new(),
            declared: DashMap::new(),
            failing_releases: RwLock::new(BTreeSet::new()),
            task_owners: DashMap::new(),
            released: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
        }
    }

    /// Script the terminal status of a branch
    #[must_use]
    pub fn with_outcome(self, label: impl Into<String>, status: ProcessStatus) -> Self {
        self.outcomes.insert(label.into(), status);
        self
    }

    /// Make a branch finish with a non-zero exit status
    #[must_use]
    pub fn fail(self, label: impl Into<String>, exit_status: u32) -> Self {
        self.with_outcome(label, ProcessStatus::Finished { exit_status })
    }

    /// Replace the outputs a branch produces
    #[must_use]
    pub fn with_outputs(self, label: impl Into<String>, outputs: NamespaceTree) -> Self {
        self.output_fixtures.insert(label.into(), outputs);
        self
    }

    /// Declare the output ports of a sub-process type
    #[must_use]
    pub fn with_declared(self, sub_process_type: impl Into<String>, schema: OutputSchema) -> Self {
        self.declared.insert(sub_process_type.into(), schema);
        self
    }

    /// Number of compute tasks each process spawns
    #[must_use]
    pub fn with_tasks_per_process(mut self, tasks: usize) -> Self {
        self.tasks_per_process = tasks;
        self
    }

    /// Make storage release fail for every task of a branch
    #[must_use]
    pub fn with_failing_release(self, label: impl Into<String>) -> Self {
        self.failing_releases.write().insert(label.into());
        self
    }

    /// Keep a branch running until [`Self::release`] is called
    #[must_use]
    pub fn hold(self, label: impl Into<String>) -> Self {
        self.held.write().insert(label.into());
        self
    }

    /// Let a held branch finish at the next wait
    pub fn release(&self, label: &str) {
        self.held.write().remove(label);
    }

    /// Let every held branch finish at the next wait
    pub fn release_all(&self) {
        self.held.write().clear();
    }

    /// Every submission so far, in order
    #[must_use]
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    /// Submissions of one branch label
    #[must_use]
    pub fn submissions_of(&self, label: &str) -> Vec<Submission> {
        self.submissions
            .lock()
            .iter()
            .filter(|submission| submission.handle.label == label)
            .cloned()
            .collect()
    }

    /// Tasks whose storage was released
    #[must_use]
    pub fn released_tasks(&self) -> Vec<ComputeTaskId> {
        self.released.lock().clone()
    }

    /// Number of waits so far
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Capture everything needed to rebuild this substrate
    #[must_use]
    pub fn state(&self) -> SimulatedState {
        let mut processes: Vec<SimulatedProcess> = self
            .processes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        processes.sort_by_key(|process| process.handle.pk);
        SimulatedState {
            next_pk: self.next_pk.load(Ordering::SeqCst),
            next_task: self.next_task.load(Ordering::SeqCst),
            generation: self.generation(),
            tasks_per_process: self.tasks_per_process,
            processes,
            outcomes: self
                .outcomes
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
            held: self.held.read().clone(),
            output_fixtures: self
                .output_fixtures
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
            declared: self
                .declared
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
            failing_releases: self.failing_releases.read().clone(),
            released: self.released_tasks(),
            submissions: self.submissions(),
        }
    }

    /// Rebuild a substrate from captured state
    #[must_use]
    pub fn from_state(state: SimulatedState) -> Self {
        let substrate = Self {
            next_pk: AtomicU64::new(state.next_pk),
            next_task: AtomicU64::new(state.next_task),
            generation: AtomicU64::new(state.generation),
            tasks_per_process: state.tasks_per_process,
            processes: DashMap::new(),
            outcomes: state.outcomes.into_iter().collect(),
            held: RwLock::new(state.held),
            output_fixtures: state.output_fixtures.into_iter().collect(),
            declared: state.declared.into_iter().collect(),
            failing_releases: RwLock::new(state.failing_releases),
            task_owners: DashMap::new(),
            released: Mutex::new(state.released),
            submissions: Mutex::new(state.submissions),
        };
        for process in state.processes {
            for task in &process.tasks {
                substrate
                    .task_owners
                    .insert(*task, process.handle.label.clone());
            }
            substrate.processes.insert(process.handle.pk, process);
        }
        substrate
    }

    fn schema_for(&self, sub_process_type: &str) -> OutputSchema {
        self.declared
            .get(sub_process_type)
            .map_or_else(
                || OutputSchema::new(builtin_ports(sub_process_type).iter().copied()),
                |schema| schema.value().clone(),
            )
    }

    fn produced_outputs(&self, process: &SimulatedProcess) -> NamespaceTree {
        if let Some(fixture) = self.output_fixtures.get(&process.handle.label) {
            return fixture.value().clone();
        }
        let pk = process.handle.pk;
        let mut outputs = NamespaceTree::new();
        for port in self.schema_for(&process.handle.sub_process_type).ports() {
            match port {
                "output_structure" => {
                    let structure = process
                        .inputs
                        .get("structure")
                        .map_or_else(|| json!({}), matflow_types::TreeNode::to_value);
                    outputs.insert(port, structure);
                }
                "output_parameters" => {
                    outputs.insert(
                        port,
                        json!({ "number_of_bands": SIMULATED_NUMBER_OF_BANDS, "pk": pk }),
                    );
                }
                other => {
                    outputs.insert(other, json!({ "pk": pk }));
                }
            }
        }
        outputs.insert("remote_folder", json!({ "pk": pk }));
        outputs
    }

    fn process(&self, handle: &SubProcessHandle) -> Result<SimulatedProcess, SubstrateError> {
        self.processes
            .get(&handle.pk)
            .map(|process| process.value().clone())
            .ok_or(SubstrateError::UnknownHandle(handle.pk))
    }
}

#[async_trait::async_trait]
impl Substrate for SimulatedSubstrate {
    async fn submit(
        &self,
        sub_process_type: &str,
        inputs: NamespaceTree,
        label: &str,
    ) -> Result<SubProcessHandle, SubstrateError> {
        let pk = self.next_pk.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = SubProcessHandle {
            pk,
            label: label.to_string(),
            sub_process_type: sub_process_type.to_string(),
        };
        let tasks: Vec<ComputeTaskId> = (0..self.tasks_per_process)
            .map(|_| ComputeTaskId(self.next_task.fetch_add(1, Ordering::SeqCst) + 1))
            .collect();
        for task in &tasks {
            self.task_owners.insert(*task, label.to_string());
        }

        self.submissions.lock().push(Submission {
            handle: handle.clone(),
            inputs: inputs.clone(),
            generation: self.generation(),
        });
        self.processes.insert(
            pk,
            SimulatedProcess {
                handle: handle.clone(),
                inputs,
                status: ProcessStatus::Running,
                tasks,
            },
        );
        tracing::debug!(pk, label, sub_process_type, "simulated submission");
        Ok(handle)
    }

    async fn status(&self, handle: &SubProcessHandle) -> Result<ProcessStatus, SubstrateError> {
        Ok(self.process(handle)?.status)
    }

    async fn outputs(&self, handle: &SubProcessHandle) -> Result<NamespaceTree, SubstrateError> {
        let process = self.process(handle)?;
        if process.status.is_terminal() {
            Ok(self.produced_outputs(&process))
        } else {
            Ok(NamespaceTree::new())
        }
    }

    fn declared_outputs(&self, sub_process_type: &str) -> OutputSchema {
        self.schema_for(sub_process_type)
    }

    async fn wait_terminal(&self, handles: &[SubProcessHandle]) -> Result<(), SubstrateError> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let held = self.held.read().clone();
        for handle in handles {
            if held.contains(&handle.label) {
                tracing::debug!(pk = handle.pk, label = %handle.label, "held, still running");
                continue;
            }
            let outcome = self
                .outcomes
                .get(&handle.label)
                .map_or(ProcessStatus::Finished { exit_status: 0 }, |status| *status);
            let mut process = self
                .processes
                .get_mut(&handle.pk)
                .ok_or(SubstrateError::UnknownHandle(handle.pk))?;
            if !process.status.is_terminal() {
                process.status = outcome;
            }
        }
        Ok(())
    }

    async fn descendant_tasks(
        &self,
        handle: &SubProcessHandle,
    ) -> Result<Vec<ComputeTaskId>, SubstrateError> {
        Ok(self.process(handle)?.tasks)
    }

    async fn release_storage(&self, task: ComputeTaskId) -> Result<(), SubstrateError> {
        let owner = self
            .task_owners
            .get(&task)
            .map(|owner| owner.value().clone())
            .ok_or_else(|| SubstrateError::Storage {
                task,
                reason: "unknown task".to_string(),
            })?;
        if self.failing_releases.read().contains(&owner) {
            return Err(SubstrateError::Storage {
                task,
                reason: "remote folder not accessible".to_string(),
            });
        }
        self.released.lock().push(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submissions_finish_on_wait() {
        let substrate = SimulatedSubstrate::new();
        let handle = substrate
            .submit("quantumespresso.pw.bands", NamespaceTree::new(), "bands")
            .await
            .unwrap();
        assert_eq!(substrate.status(&handle).await.unwrap(), ProcessStatus::Running);
        assert!(substrate.outputs(&handle).await.unwrap().is_empty());

        substrate.wait_terminal(&[handle.clone()]).await.unwrap();
        assert!(substrate.is_finished_ok(&handle).await.unwrap());
        let outputs = substrate.outputs(&handle).await.unwrap();
        assert!(outputs.contains("band_structure"));
        assert!(outputs.contains("remote_folder"));
    }

    #[tokio::test]
    async fn scripted_failure_and_hold() {
        let substrate = SimulatedSubstrate::new().fail("pdos", 300).hold("xps");
        let pdos = substrate
            .submit("quantumespresso.pdos", NamespaceTree::new(), "pdos")
            .await
            .unwrap();
        let xps = substrate
            .submit("quantumespresso.xps", NamespaceTree::new(), "xps")
            .await
            .unwrap();
        substrate
            .wait_terminal(&[pdos.clone(), xps.clone()])
            .await
            .unwrap();
        assert_eq!(substrate.exit_status(&pdos).await.unwrap(), Some(300));
        assert_eq!(substrate.status(&xps).await.unwrap(), ProcessStatus::Running);

        substrate.release("xps");
        substrate.wait_terminal(&[xps.clone()]).await.unwrap();
        assert!(substrate.is_finished_ok(&xps).await.unwrap());
        assert_eq!(substrate.generation(), 2);
    }

    #[tokio::test]
    async fn failing_release_only_affects_its_branch() {
        let substrate = SimulatedSubstrate::new()
            .with_tasks_per_process(2)
            .with_failing_release("relax");
        let relax = substrate
            .submit("quantumespresso.pw.relax", NamespaceTree::new(), "relax")
            .await
            .unwrap();
        let bands = substrate
            .submit("quantumespresso.pw.bands", NamespaceTree::new(), "bands")
            .await
            .unwrap();
        let relax_tasks = substrate.descendant_tasks(&relax).await.unwrap();
        let bands_tasks = substrate.descendant_tasks(&bands).await.unwrap();
        assert_eq!(relax_tasks.len(), 2);

        assert!(substrate.release_storage(relax_tasks[0]).await.is_err());
        substrate.release_storage(bands_tasks[1]).await.unwrap();
        assert_eq!(substrate.released_tasks(), vec![bands_tasks[1]]);
    }

    #[tokio::test]
    async fn state_round_trip_keeps_processes() {
        let substrate = SimulatedSubstrate::new().hold("bands");
        let handle = substrate
            .submit("quantumespresso.pw.bands", NamespaceTree::new(), "bands")
            .await
            .unwrap();
        substrate.wait_terminal(&[handle.clone()]).await.unwrap();

        let json = serde_json::to_string(&substrate.state()).unwrap();
        let restored = SimulatedSubstrate::from_state(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.status(&handle).await.unwrap(), ProcessStatus::Running);
        restored.release_all();
        restored.wait_terminal(&[handle.clone()]).await.unwrap();
        assert!(restored.is_finished_ok(&handle).await.unwrap());
        assert_eq!(restored.submissions().len(), 1);
    }
}
