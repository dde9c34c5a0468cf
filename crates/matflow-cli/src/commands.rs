//! Subcommand implementations

use crate::cli::FailSpec;
use anyhow::{bail, Context, Result};
use matflow_composer::{build, builtin_registry, ComposedWorkflow, PseudoLibrary};
use matflow_core::{
    FileSnapshotStore, MemorySnapshotStore, Orchestrator, OrchestratorConfig, Outcome, RunStatus,
    SimulatedState, SimulatedSubstrate, SnapshotStore,
};
use matflow_registry::PluginRegistry;
use matflow_types::{ParameterDocument, Structure};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ulid::Ulid;

/// Exit code of a run whose workflow suspended
pub(crate) const EXIT_SUSPENDED: i32 = 2;

/// Process exit code of the relaxation failure
///
/// Workflow codes start at 401 and do not fit a Unix exit status, so they
/// are shifted down by [`WORKFLOW_CODE_OFFSET`]. The full code is always in
/// the JSON result.
pub(crate) const EXIT_RELAX_FAILED: i32 = 10;

/// Highest process exit code handed to the shell; 126 and up are reserved
pub(crate) const EXIT_MAX: i32 = 125;

const WORKFLOW_CODE_OFFSET: u32 = matflow_registry::RELAX_FAILED_STATUS - EXIT_RELAX_FAILED.unsigned_abs();

pub(crate) fn load_config(path: Option<&Path>) -> Result<OrchestratorConfig> {
    match path {
        Some(path) => OrchestratorConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(OrchestratorConfig::new()),
    }
}

pub(crate) fn registry(config: &OrchestratorConfig) -> Result<PluginRegistry> {
    let library = match &config.pseudo_library {
        Some(path) => PseudoLibrary::load(path)
            .with_context(|| format!("loading pseudopotential library {}", path.display()))?,
        None => PseudoLibrary::builtin().context("loading built-in pseudopotential library")?,
    };
    Ok(builtin_registry(Arc::new(library))?)
}

fn load_structure(path: &Path) -> Result<Structure> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading structure {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing structure {}", path.display()))
}

fn compose_from_files(
    registry: &PluginRegistry,
    structure: &Path,
    parameters: &Path,
) -> Result<ComposedWorkflow> {
    let structure = load_structure(structure)?;
    let document = ParameterDocument::load(parameters)
        .with_context(|| format!("loading parameters {}", parameters.display()))?;
    Ok(build(registry, &structure, &document)?)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn plugins(registry: &PluginRegistry) -> Result<()> {
    let codes = registry.exit_codes();
    let relax = codes.relax();
    println!("{:<16} {:<28} {:>6}  EXCLUDED", "NAME", "SUB-PROCESS", "EXIT");
    println!("{:<16} {:<28} {:>6}  -", "relax", "quantumespresso.pw.relax", relax.status);
    for descriptor in registry.iter() {
        let status = codes
            .plugin(descriptor.name())
            .map_or_else(String::new, |code| code.status.to_string());
        let excluded: Vec<&str> = descriptor.excluded_fields().iter().map(String::as_str).collect();
        println!(
            "{:<16} {:<28} {:>6}  {}",
            descriptor.name(),
            descriptor.sub_process_type(),
            status,
            excluded.join(", ")
        );
    }
    Ok(())
}

pub(crate) fn compose(registry: &PluginRegistry, structure: &Path, parameters: &Path) -> Result<()> {
    let workflow = compose_from_files(registry, structure, parameters)?;
    print_json(&json!({
        "label": workflow.label(),
        "properties": workflow.properties(),
        "inputs": workflow.input_tree().to_value(),
    }))
}

/// Options of `matflow run`
#[derive(Debug)]
pub(crate) struct RunOptions {
    pub(crate) structure: PathBuf,
    pub(crate) parameters: PathBuf,
    pub(crate) snapshot_dir: Option<PathBuf>,
    pub(crate) fail: Vec<FailSpec>,
    pub(crate) hold: Vec<String>,
    pub(crate) clean_workdir: bool,
}

pub(crate) async fn run(
    registry: &PluginRegistry,
    config: &OrchestratorConfig,
    options: RunOptions,
) -> Result<i32> {
    let workflow = compose_from_files(registry, &options.structure, &options.parameters)?
        .with_clean_workdir(options.clean_workdir || config.clean_workdir);

    let mut substrate = SimulatedSubstrate::new();
    for spec in options.fail {
        substrate = substrate.fail(spec.branch, spec.exit_status);
    }
    for branch in options.hold {
        substrate = substrate.hold(branch);
    }

    let mut orchestrator = Orchestrator::new(workflow);
    tracing::info!(id = %orchestrator.id(), label = %orchestrator.workflow().label(), "starting run");

    match options.snapshot_dir.or_else(|| config.snapshot_dir.clone()) {
        Some(dir) => {
            let store = FileSnapshotStore::new(dir);
            let status = orchestrator.drive(&substrate, &store).await?;
            save_substrate(&store, orchestrator.id(), &substrate).await?;
            report(&orchestrator, status)
        }
        None => {
            let store = MemorySnapshotStore::new();
            let status = orchestrator.drive(&substrate, &store).await?;
            if matches!(status, RunStatus::Suspended { .. }) {
                tracing::warn!("suspended without a snapshot directory; the run cannot be resumed");
            }
            report(&orchestrator, status)
        }
    }
}

pub(crate) async fn resume(
    config: &OrchestratorConfig,
    snapshot_dir: Option<PathBuf>,
    id: &str,
    keep_held: bool,
) -> Result<i32> {
    let id = Ulid::from_string(id).with_context(|| format!("invalid orchestrator id `{id}`"))?;
    let Some(dir) = snapshot_dir.or_else(|| config.snapshot_dir.clone()) else {
        bail!("resume needs --snapshot-dir or snapshot_dir in the config file");
    };
    let store = FileSnapshotStore::new(dir);
    let snapshot = store.load(id).await?;
    let substrate = load_substrate(&store, id).await?;
    if !keep_held {
        substrate.release_all();
    }

    let mut orchestrator = Orchestrator::from_snapshot(snapshot);
    let status = orchestrator.drive(&substrate, &store).await?;
    save_substrate(&store, id, &substrate).await?;
    report(&orchestrator, status)
}

pub(crate) async fn snapshots(config: &OrchestratorConfig, snapshot_dir: Option<PathBuf>) -> Result<()> {
    let Some(dir) = snapshot_dir.or_else(|| config.snapshot_dir.clone()) else {
        bail!("snapshots needs --snapshot-dir or snapshot_dir in the config file");
    };
    let store = FileSnapshotStore::new(dir);
    for id in store.list().await? {
        let snapshot = store.load(id).await?;
        println!(
            "{id}  {:<18} {}  {}",
            snapshot.state.phase().to_string(),
            snapshot.saved_at.to_rfc3339(),
            snapshot.workflow.label()
        );
    }
    Ok(())
}

fn substrate_path(store: &FileSnapshotStore, id: Ulid) -> PathBuf {
    store.dir().join(format!("{id}.substrate"))
}

async fn save_substrate(
    store: &FileSnapshotStore,
    id: Ulid,
    substrate: &SimulatedSubstrate,
) -> Result<()> {
    let path = substrate_path(store, id);
    let bytes = serde_json::to_vec_pretty(&substrate.state())?;
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("writing substrate state {}", path.display()))
}

async fn load_substrate(store: &FileSnapshotStore, id: Ulid) -> Result<SimulatedSubstrate> {
    let path = substrate_path(store, id);
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("reading substrate state {}", path.display()))?;
    let state: SimulatedState = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing substrate state {}", path.display()))?;
    Ok(SimulatedSubstrate::from_state(state))
}

fn report(orchestrator: &Orchestrator, status: RunStatus) -> Result<i32> {
    for message in orchestrator.report().messages() {
        eprintln!("  {message}");
    }
    match status {
        RunStatus::Suspended { awaiting } => {
            let awaiting: Vec<String> = awaiting.iter().map(ToString::to_string).collect();
            print_json(&json!({
                "id": orchestrator.id().to_string(),
                "status": "suspended",
                "state": orchestrator.phase().as_str(),
                "awaiting": awaiting,
            }))?;
            Ok(EXIT_SUSPENDED)
        }
        RunStatus::Finished(outcome) => {
            print_json(&json!({
                "id": orchestrator.id().to_string(),
                "status": "finished",
                "result": serde_json::to_value(&outcome)?,
                "cleanup": orchestrator.cleanup_report(),
            }))?;
            Ok(exit_code(&outcome))
        }
    }
}

fn exit_code(outcome: &Outcome) -> i32 {
    outcome
        .exit_code()
        .map_or(0, |code| process_exit_code(code.status))
}

pub(crate) fn process_exit_code(status: u32) -> i32 {
    let shifted = status.saturating_sub(WORKFLOW_CODE_OFFSET);
    i32::try_from(shifted).map_or(EXIT_MAX, |code| code.clamp(EXIT_RELAX_FAILED, EXIT_MAX))
}
