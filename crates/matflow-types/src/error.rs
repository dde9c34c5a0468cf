//! Configuration errors
//!
//! Everything in here is raised while composing a workflow, before any
//! sub-process is submitted.

/// Configuration error surfaced synchronously by the builder composer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An enabled property has no registered plugin
    #[error("unknown plugin: {0}")]
    UnknownPlugin(String),

    /// A wire string does not name a member of a closed enumeration
    #[error("invalid value `{value}` for {field}")]
    InvalidEnumeration {
        /// Field being normalized
        field: &'static str,
        /// Offending wire value
        value: String,
    },

    /// A branch requires a code role that is not bound
    #[error("no code bound for role `{role}`")]
    MissingCodeBinding {
        /// Logical code role, e.g. `pw_code`
        role: String,
    },

    /// No pseudopotential pair exists for an enabled element
    #[error("no core-hole/ground-state pseudopotential pair for element {element}")]
    MissingPseudopotential {
        /// Element symbol
        element: String,
    },

    /// Named pseudopotential group is not in the library
    #[error("unknown pseudopotential group: {0}")]
    UnknownPseudoGroup(String),

    /// Correction-energy table has no entry for a core level
    #[error("missing correction energy for {0}")]
    MissingCorrectionEnergy(String),

    /// A required document section is absent
    #[error("missing section: {0}")]
    MissingSection(String),

    /// A factory produced a tree that is not well formed
    #[error("malformed inputs for `{namespace}`: {reason}")]
    MalformedInputs {
        /// Branch namespace
        namespace: String,
        /// What is wrong with it
        reason: String,
    },
}

impl ConfigError {
    /// Create a malformed-inputs error
    #[inline]
    pub fn malformed(namespace: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedInputs {
            namespace: namespace.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing-code error
    #[inline]
    pub fn missing_code(role: impl Into<String>) -> Self {
        Self::MissingCodeBinding { role: role.into() }
    }

    /// Whether the error comes from plugin resolution rather than document content
    #[inline]
    #[must_use]
    pub fn is_registry_error(&self) -> bool {
        matches!(self, Self::UnknownPlugin(_))
    }

    /// Whether editing the parameter document alone can fix the error
    #[inline]
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        !self.is_registry_error()
    }

    /// Branch or section the error is attributable to, when known
    #[must_use]
    pub fn branch(&self) -> Option<&str> {
        match self {
            Self::UnknownPlugin(name) | Self::MissingSection(name) => Some(name),
            Self::MalformedInputs { namespace, .. } => Some(namespace),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidEnumeration {
            field: "spin_type",
            value: "sideways".to_string(),
        };
        assert_eq!(err.to_string(), "invalid value `sideways` for spin_type");
    }

    #[test]
    fn config_error_is_registry_error() {
        assert!(ConfigError::UnknownPlugin("foo".into()).is_registry_error());
        assert!(!ConfigError::missing_code("pw_code").is_registry_error());
        assert!(ConfigError::missing_code("pw_code").is_configuration());
    }

    #[test]
    fn config_error_branch() {
        assert_eq!(ConfigError::malformed("bands", "bad key").branch(), Some("bands"));
        assert_eq!(ConfigError::MissingSection("xps".into()).branch(), Some("xps"));
        assert_eq!(ConfigError::missing_code("dos_code").branch(), None);
    }
}
