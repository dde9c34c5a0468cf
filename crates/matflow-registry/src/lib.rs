//! matflow Plugin Registry
//!
//! Independently contributed analysis branches for the orchestrator.
//!
//! # Core Concepts
//!
//! - [`PluginDescriptor`]: sub-process type, excluded input fields and
//!   builder factory of one plugin
//! - [`PluginRegistry`]: immutable-after-load name to descriptor mapping
//! - [`ExitCodeTable`]: one distinct failure code per branch
//!
//! # Example
//!
//! ```rust,ignore
//! use matflow_registry::{PluginDescriptor, PluginRegistry};
//!
//! let mut registry = PluginRegistry::new();
//! registry.register(
//!     PluginDescriptor::new("bands", "quantumespresso.pw.bands", build_bands)
//!         .with_excluded(["clean_workdir", "structure", "relax"]),
//! )?;
//! let descriptor = registry.resolve("bands")?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod descriptor;
mod exit_code;
mod registry;

pub use descriptor::{BuilderFactory, PluginDescriptor};
pub use exit_code::{ExitCode, ExitCodeTable, PLUGIN_FAILED_BASE_STATUS, RELAX_FAILED_STATUS};
pub use registry::{PluginRegistry, RegistryError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
