//! matflow Builder Composer
//!
//! Turns a material structure and a parameter document into a
//! [`ComposedWorkflow`]: one correctly scoped input tree per branch, the
//! order they run in, and the exit codes that attribute their failures.
//!
//! # Example
//!
//! ```rust,ignore
//! use matflow_composer::{build, plugins::builtin_registry, PseudoLibrary};
//! use std::sync::Arc;
//!
//! let registry = builtin_registry(Arc::new(PseudoLibrary::builtin()?))?;
//! let workflow = build(&registry, &structure, &document)?;
//! println!("{}", workflow.label());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod composer;
mod label;
mod normalize;
mod plan;
pub mod plugins;
pub mod protocols;

pub use composer::{build, compose};
pub use label::process_label;
pub use normalize::{normalize, BranchOverrides};
pub use plan::{BranchKind, BranchPlan, ComposedWorkflow};
pub use plugins::builtin_registry;
pub use plugins::pseudo::{PseudoLibrary, PseudoLibraryError, Pseudopotential};
pub use protocols::{ProtocolCatalog, ProtocolPreset};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
