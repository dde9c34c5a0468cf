//! Parameter documents and their normalized form
//!
//! [`ParameterDocument`] is the wire shape produced by the configuration
//! front-end: enumerations are still strings and `advanced` is free-form.
//! [`WorkflowParameters`] is the typed view handed to builder factories.

use crate::enums::{ElectronicType, Protocol, RelaxType, SpinType};
use crate::error::ConfigError;
use crate::tree::NamespaceTree;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// `basic` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicSection {
    /// Protocol selector; defaults apply when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Electronic type wire string
    pub electronic_type: String,
    /// Spin type wire string
    pub spin_type: String,
    /// Anything else the front-end put here
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// `workflow` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSection {
    /// Relax type wire string
    pub relax_type: String,
    /// Plugin name to enabled flag
    #[serde(default)]
    pub properties: IndexMap<String, bool>,
}

/// Executable bound to a logical code role
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeBinding {
    /// Full code label, e.g. `pw-7.2@localhost`
    pub label: String,
}

impl CodeBinding {
    /// Create a binding
    #[inline]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

/// Mapping of logical code role to executable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Codes(IndexMap<String, CodeBinding>);

impl Codes {
    /// Create an empty mapping
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a role
    #[must_use]
    pub fn with(mut self, role: impl Into<String>, label: impl Into<String>) -> Self {
        self.0.insert(role.into(), CodeBinding::new(label));
        self
    }

    /// Look up a role
    #[inline]
    #[must_use]
    pub fn get(&self, role: &str) -> Option<&CodeBinding> {
        self.0.get(role)
    }

    /// Look up a role that a branch cannot run without
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingCodeBinding`] if the role is unbound.
    pub fn require(&self, role: &str) -> Result<&CodeBinding, ConfigError> {
        self.0.get(role).ok_or_else(|| ConfigError::missing_code(role))
    }

    /// Bound roles
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Nested configuration document as received from the front-end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDocument {
    /// Protocol and physics selectors
    pub basic: BasicSection,
    /// Relax type and enabled properties
    pub workflow: WorkflowSection,
    /// Overrides; keys naming a branch apply to that branch only
    #[serde(default)]
    pub advanced: Map<String, Value>,
    /// Code role bindings
    #[serde(default)]
    pub codes: Codes,
    /// Plugin-specific sections, e.g. `xps`
    #[serde(flatten)]
    pub sections: IndexMap<String, Value>,
}

/// Failure to read a parameter document
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path being read
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON syntax or shape error
    #[error("invalid JSON document: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML syntax or shape error
    #[error("invalid YAML document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML syntax or shape error
    #[error("invalid TOML document: {0}")]
    Toml(#[from] toml::de::Error),

    /// Extension not recognized
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
}

impl ParameterDocument {
    /// Parse a JSON document
    ///
    /// # Errors
    /// Returns [`DocumentError::Json`] on malformed input.
    pub fn from_json_str(text: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a YAML document
    ///
    /// # Errors
    /// Returns [`DocumentError::Yaml`] on malformed input.
    pub fn from_yaml_str(text: &str) -> Result<Self, DocumentError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Parse a TOML document
    ///
    /// # Errors
    /// Returns [`DocumentError::Toml`] on malformed input.
    pub fn from_toml_str(text: &str) -> Result<Self, DocumentError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a document, choosing the format from the file extension
    ///
    /// # Errors
    /// Returns [`DocumentError`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.display().to_string(),
            source,
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            Some("toml") => Self::from_toml_str(&text),
            other => Err(DocumentError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    /// Names of enabled properties, in document order
    pub fn enabled_properties(&self) -> impl Iterator<Item = &str> {
        self.workflow
            .properties
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(name, _)| name.as_str())
    }
}

/// Typed view of a [`ParameterDocument`] handed to builder factories
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowParameters {
    /// Protocol selecting default inputs
    pub protocol: Protocol,
    /// Relaxation degrees of freedom
    pub relax_type: RelaxType,
    /// Electronic character
    pub electronic_type: ElectronicType,
    /// Spin treatment
    pub spin_type: SpinType,
    /// Remaining `basic` keys, e.g. `initial_magnetic_moments`
    pub basic_extra: IndexMap<String, Value>,
    /// Resolved enabled flags
    pub properties: IndexMap<String, bool>,
    /// Overrides applied to every engine step of every branch
    pub shared_overrides: NamespaceTree,
    /// Plugin-specific sections
    pub sections: IndexMap<String, Value>,
}

impl WorkflowParameters {
    /// Whether a property is enabled
    #[inline]
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.properties.get(name).copied().unwrap_or(false)
    }

    /// A plugin-specific section
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingSection`] if the section is absent.
    pub fn section(&self, name: &str) -> Result<&Value, ConfigError> {
        self.sections
            .get(name)
            .ok_or_else(|| ConfigError::MissingSection(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const YAML: &str = r#"
basic:
  protocol: fast
  electronic_type: metal
  spin_type: none
workflow:
  relax_type: positions
  properties:
    bands: true
    pdos: false
advanced:
  pw:
    parameters:
      SYSTEM:
        tot_charge: 0.0
codes:
  pw_code: pw-7.2@localhost
xps:
  structure_type: crystal
"#;

    #[test]
    fn parse_yaml_document() {
        let doc = ParameterDocument::from_yaml_str(YAML).unwrap();
        assert_eq!(doc.basic.protocol.as_deref(), Some("fast"));
        assert_eq!(doc.workflow.relax_type, "positions");
        assert_eq!(doc.enabled_properties().collect::<Vec<_>>(), vec!["bands"]);
        assert_eq!(doc.codes.get("pw_code").unwrap().label, "pw-7.2@localhost");
        assert_eq!(doc.sections.get("xps").unwrap()["structure_type"], json!("crystal"));
    }

    #[test]
    fn json_and_yaml_agree() {
        let yaml = ParameterDocument::from_yaml_str(YAML).unwrap();
        let json = serde_json::to_string(&yaml).unwrap();
        let back = ParameterDocument::from_json_str(&json).unwrap();
        assert_eq!(yaml, back);
    }

    #[test]
    fn basic_extra_keys_are_preserved() {
        let doc = ParameterDocument::from_json_str(
            r#"{"basic": {"electronic_type": "metal", "spin_type": "collinear",
                "initial_magnetic_moments": 0.1},
               "workflow": {"relax_type": "none"}}"#,
        )
        .unwrap();
        assert!(doc.basic.protocol.is_none());
        assert_eq!(doc.basic.extra["initial_magnetic_moments"], json!(0.1));
        assert!(doc.workflow.properties.is_empty());
    }

    #[test]
    fn codes_require_reports_role() {
        let codes = Codes::new().with("pw_code", "pw@localhost");
        assert!(codes.require("pw_code").is_ok());
        assert_eq!(
            codes.require("dos_code").unwrap_err(),
            ConfigError::missing_code("dos_code")
        );
    }

    #[test]
    fn load_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.ini");
        std::fs::write(&path, "x").unwrap();
        let err = ParameterDocument::load(&path).unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedFormat(ext) if ext == "ini"));
    }
}
