//! Built-in branch builders
//!
//! [`builtin_registry`] registers the shipped plugins in their inspection
//! order: `bands`, `pdos`, `xps`. Relaxation lives in [`relax`] and is
//! composed directly, never through the registry.

pub mod bands;
pub mod pdos;
pub mod pseudo;
pub mod relax;
pub mod xps;

use matflow_registry::{PluginRegistry, RegistryError};
use matflow_types::Structure;
use pseudo::PseudoLibrary;
use serde_json::{json, Value};
use std::sync::Arc;

/// Registry holding every built-in plugin
///
/// # Errors
/// Only fails if two built-ins share a name.
pub fn builtin_registry(library: Arc<PseudoLibrary>) -> Result<PluginRegistry, RegistryError> {
    let mut registry = PluginRegistry::new();
    registry.register(bands::descriptor())?;
    registry.register(pdos::descriptor())?;
    registry.register(xps::descriptor(library))?;
    tracing::debug!(plugins = ?registry.names(), "built-in plugins registered");
    Ok(registry)
}

/// Placeholder for the structure port, replaced at run time
pub(crate) fn structure_reference(structure: &Structure) -> Value {
    json!({
        "uuid": structure.uuid().to_string(),
        "formula": structure.formula(),
    })
}
