//! matflow Core
//!
//! The resumable orchestrator and everything around it:
//! - [`Orchestrator`]: state machine over a composed workflow
//! - [`Substrate`]: seam to whatever actually runs sub-processes, with a
//!   deterministic [`SimulatedSubstrate`]
//! - [`OutputTree`]: append-only aggregation of branch outputs
//! - [`SnapshotStore`]: persistence of suspended orchestrators
//!
//! # Example
//!
//! ```rust,ignore
//! use matflow_core::{MemorySnapshotStore, Orchestrator, RunStatus, SimulatedSubstrate};
//!
//! let substrate = SimulatedSubstrate::new();
//! let store = MemorySnapshotStore::new();
//! let mut orchestrator = Orchestrator::new(workflow);
//! match orchestrator.drive(&substrate, &store).await? {
//!     RunStatus::Finished(outcome) => println!("{outcome:?}"),
//!     RunStatus::Suspended { awaiting } => println!("{} still running", awaiting.len()),
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod aggregate;
pub mod cleanup;
pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod report;
pub mod snapshot;
pub mod state_machine;
pub mod substrate;

pub use aggregate::{exposed_outputs, AggregateError, OutputTree};
pub use cleanup::{release_descendants, CleanupFailure, CleanupReport};
pub use config::{ConfigLoadError, OrchestratorConfig};
pub use context::OrchestratorContext;
pub use error::OrchestratorError;
pub use orchestrator::{Orchestrator, RunStatus, StepResult};
pub use outcome::Outcome;
pub use report::{ReportEntry, ReportLog};
pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, Snapshot, SnapshotError, SnapshotStore};
pub use state_machine::{allowed_transitions, validate_transition, OrchestratorState, Phase};
pub use substrate::{
    ComputeTaskId, OutputSchema, ProcessStatus, SimulatedState, SimulatedSubstrate,
    SubProcessHandle, Submission, Substrate, SubstrateError, SIMULATED_NUMBER_OF_BANDS,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
