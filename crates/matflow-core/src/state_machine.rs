//! Orchestrator state machine
//!
//! `Init → Setup → RelaxRunning → RelaxInspected → PluginsRunning →
//! PluginsInspected → Results → Done`, with `Setup → PluginsRunning` when
//! no relaxation is planned and an absorbing `Failed` reachable from either
//! inspection.

use crate::error::OrchestratorError;
use matflow_registry::ExitCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Data-free discriminant of [`OrchestratorState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not started
    Init,
    /// Context built
    Setup,
    /// Relaxation submitted
    RelaxRunning,
    /// Relaxation succeeded and its outputs are attached
    RelaxInspected,
    /// Plugin branches submitted
    PluginsRunning,
    /// Every plugin branch succeeded
    PluginsInspected,
    /// Outputs final
    Results,
    /// Finished successfully
    Done,
    /// A branch failed
    Failed,
}

impl Phase {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Setup => "setup",
            Self::RelaxRunning => "relax_running",
            Self::RelaxInspected => "relax_inspected",
            Self::PluginsRunning => "plugins_running",
            Self::PluginsInspected => "plugins_inspected",
            Self::Results => "results",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum OrchestratorState {
    /// Not started
    Init,
    /// Context built
    Setup,
    /// Relaxation submitted
    RelaxRunning,
    /// Relaxation inspected
    RelaxInspected,
    /// Plugin branches submitted
    PluginsRunning,
    /// Plugin branches inspected
    PluginsInspected,
    /// Outputs final
    Results,
    /// Finished successfully
    Done,
    /// A branch failed
    Failed {
        /// Code attributing the failure
        code: ExitCode,
        /// Failing branch namespace
        branch: String,
    },
}

impl OrchestratorState {
    /// Discriminant
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            Self::Init => Phase::Init,
            Self::Setup => Phase::Setup,
            Self::RelaxRunning => Phase::RelaxRunning,
            Self::RelaxInspected => Phase::RelaxInspected,
            Self::PluginsRunning => Phase::PluginsRunning,
            Self::PluginsInspected => Phase::PluginsInspected,
            Self::Results => Phase::Results,
            Self::Done => Phase::Done,
            Self::Failed { .. } => Phase::Failed,
        }
    }

    /// Whether no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }
}

/// Validate a transition
///
/// With the `strict-debug` feature an illegal transition panics instead of
/// returning an error.
///
/// # Errors
/// Returns [`OrchestratorError::IllegalTransition`] if `to` is not reachable
/// from `from` in one step.
pub fn validate_transition(from: Phase, to: Phase) -> Result<(), OrchestratorError> {
    if allowed(from, to) {
        Ok(())
    } else {
        #[cfg(feature = "strict-debug")]
        panic!("Illegal state transition attempted: {from} -> {to}");

        #[cfg(not(feature = "strict-debug"))]
        Err(OrchestratorError::IllegalTransition { from, to })
    }
}

/// Phases reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: Phase) -> Vec<Phase> {
    use Phase::{
        Done, Failed, Init, PluginsInspected, PluginsRunning, RelaxInspected, RelaxRunning,
        Results, Setup,
    };
    match from {
        Init => vec![Setup],
        Setup => vec![RelaxRunning, PluginsRunning],
        RelaxRunning => vec![RelaxInspected],
        RelaxInspected => vec![PluginsRunning, Failed],
        PluginsRunning => vec![PluginsInspected],
        PluginsInspected => vec![Results, Failed],
        Results => vec![Done],
        Done | Failed => vec![],
    }
}

fn allowed(from: Phase, to: Phase) -> bool {
    allowed_transitions(from).into_iter().any(|phase| phase == to)
}
