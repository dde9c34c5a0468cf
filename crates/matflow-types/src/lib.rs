//! matflow Types
//!
//! Data model shared by the registry, the builder composer and the
//! orchestrator:
//! - [`Structure`]: immutable material snapshot
//! - [`ParameterDocument`]: wire configuration, and its typed view
//!   [`WorkflowParameters`]
//! - [`NamespaceTree`]: ordered namespaced input/output trees
//! - [`ConfigError`]: everything that can go wrong before submission

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod enums;
mod error;
mod parameters;
mod structure;
mod tree;

pub use enums::{ElectronicType, Protocol, RelaxType, SpinType};
pub use error::ConfigError;
pub use parameters::{
    BasicSection, CodeBinding, Codes, DocumentError, ParameterDocument, WorkflowParameters,
    WorkflowSection,
};
pub use structure::{Site, Structure};
pub use tree::{NamespaceTree, TreeNode, PATH_SEPARATOR};

/// Namespace reserved for the relaxation branch
pub const RELAX_NAMESPACE: &str = "relax";

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
