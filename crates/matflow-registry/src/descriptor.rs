//! Plugin descriptors
//!
//! A [`PluginDescriptor`] is what an independently contributed plugin hands
//! to the registry: the sub-process type it drives, the input fields that
//! must never surface in its namespace, and the factory that derives its
//! inputs from a parameter document.

use matflow_types::{Codes, ConfigError, NamespaceTree, Structure, WorkflowParameters};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Derives a branch's input tree from codes, structure and parameters
pub type BuilderFactory = Arc<
    dyn Fn(&Codes, &Structure, &WorkflowParameters) -> Result<NamespaceTree, ConfigError>
        + Send
        + Sync,
>;

/// Immutable description of one plugin branch
#[derive(Clone)]
pub struct PluginDescriptor {
    name: String,
    sub_process_type: String,
    excluded_fields: BTreeSet<String>,
    builder_factory: BuilderFactory,
    band_count_input: Option<String>,
}

impl PluginDescriptor {
    /// Create a descriptor with no excluded fields
    pub fn new<F>(name: impl Into<String>, sub_process_type: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Codes, &Structure, &WorkflowParameters) -> Result<NamespaceTree, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            sub_process_type: sub_process_type.into(),
            excluded_fields: BTreeSet::new(),
            builder_factory: Arc::new(factory),
            band_count_input: None,
        }
    }

    /// Declare fields that must not appear in the exposed input surface
    #[must_use]
    pub fn with_excluded<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Dotted input path where the relaxed band count is bound at run time
    #[must_use]
    pub fn with_band_count_input(mut self, path: impl Into<String>) -> Self {
        self.band_count_input = Some(path.into());
        self
    }

    /// Plugin name, also its namespace
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sub-process type identifier
    #[inline]
    #[must_use]
    pub fn sub_process_type(&self) -> &str {
        &self.sub_process_type
    }

    /// Fields stripped from this branch's inputs
    #[inline]
    #[must_use]
    pub fn excluded_fields(&self) -> &BTreeSet<String> {
        &self.excluded_fields
    }

    /// Band-count binding path, if the branch wants one
    #[inline]
    #[must_use]
    pub fn band_count_input(&self) -> Option<&str> {
        self.band_count_input.as_deref()
    }

    /// Run the builder factory
    ///
    /// # Errors
    /// Propagates whatever [`ConfigError`] the factory raises.
    pub fn build(
        &self,
        codes: &Codes,
        structure: &Structure,
        parameters: &WorkflowParameters,
    ) -> Result<NamespaceTree, ConfigError> {
        (self.builder_factory)(codes, structure, parameters)
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("sub_process_type", &self.sub_process_type)
            .field("excluded_fields", &self.excluded_fields)
            .field("band_count_input", &self.band_count_input)
            .finish_non_exhaustive()
    }
}
