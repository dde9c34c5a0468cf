//! Plugin registry
//!
//! Provides [`PluginRegistry`], the read-only mapping from plugin name to
//! [`PluginDescriptor`]. It is built once at process start and passed
//! explicitly to whoever needs it.

use crate::descriptor::PluginDescriptor;
use crate::exit_code::ExitCodeTable;
use indexmap::IndexMap;
use matflow_types::{ConfigError, RELAX_NAMESPACE};

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Name already registered
    #[error("plugin already registered: {0}")]
    DuplicateName(String),

    /// Name not registered
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    /// Name collides with a built-in namespace
    #[error("reserved plugin name: {0}")]
    ReservedName(String),
}

impl From<RegistryError> for ConfigError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownPlugin(name) => ConfigError::UnknownPlugin(name),
            RegistryError::DuplicateName(name) | RegistryError::ReservedName(name) => {
                ConfigError::malformed(name, "plugin registration conflict")
            }
        }
    }
}

/// Registry of plugins, in registration order
///
/// Registration order matters: it is the order branches are inspected in.
#[derive(Debug, Default, Clone)]
pub struct PluginRegistry {
    plugins: IndexMap<String, PluginDescriptor>,
}

impl PluginRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: IndexMap::new(),
        }
    }

    /// Register a plugin
    ///
    /// # Errors
    /// - `RegistryError::DuplicateName` if the name is taken
    /// - `RegistryError::ReservedName` for the relaxation namespace
    pub fn register(&mut self, descriptor: PluginDescriptor) -> Result<(), RegistryError> {
        let name = descriptor.name();
        if name == RELAX_NAMESPACE {
            return Err(RegistryError::ReservedName(name.to_string()));
        }
        if self.plugins.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        self.plugins.insert(name.to_string(), descriptor);
        Ok(())
    }

    /// Resolve a plugin by name
    ///
    /// # Errors
    /// Returns `RegistryError::UnknownPlugin` if absent.
    pub fn resolve(&self, name: &str) -> Result<&PluginDescriptor, RegistryError> {
        self.plugins
            .get(name)
            .ok_or_else(|| RegistryError::UnknownPlugin(name.to_string()))
    }

    /// Check if plugin exists
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// List all plugin names in registration order
    #[inline]
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    /// Get number of registered plugins
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Iterate over descriptors in registration order
    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.plugins.values()
    }

    /// One distinct exit code per plugin, plus the relaxation code
    #[must_use]
    pub fn exit_codes(&self) -> ExitCodeTable {
        ExitCodeTable::new(self.plugins.keys().map(String::as_str))
    }
}
