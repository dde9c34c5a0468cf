//! Core-hole pseudopotential library
//!
//! Groups of pseudopotentials keyed by family name. Each entry carries a
//! label such as `C_1s` (core-hole) or `C_gs` (ground state).

use indexmap::IndexMap;
use matflow_types::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

const BUILTIN_PSEUDOS: &str = include_str!("../../data/pseudos.toml");

/// Label suffix of ground-state pseudopotentials
pub const GROUND_STATE_SUFFIX: &str = "gs";

/// One pseudopotential file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pseudopotential {
    /// Label, e.g. `C_1s`
    pub label: String,
    /// Element symbol
    pub element: String,
    /// File name inside the family
    pub filename: String,
}

/// Failure to load a pseudo library
#[derive(Debug, thiserror::Error)]
pub enum PseudoLibraryError {
    /// File could not be read
    #[error("failed to read pseudo library {path}: {source}")]
    Io {
        /// Path being read
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Not a valid library
    #[error("invalid pseudo library: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Pseudopotential groups by family name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PseudoLibrary {
    groups: IndexMap<String, Vec<Pseudopotential>>,
}

impl PseudoLibrary {
    /// Empty library
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Library shipped with the crate
    ///
    /// # Errors
    /// Returns [`PseudoLibraryError::Parse`] if the embedded data is corrupt.
    pub fn builtin() -> Result<Self, PseudoLibraryError> {
        Self::from_toml_str(BUILTIN_PSEUDOS)
    }

    /// Parse a library from TOML
    ///
    /// # Errors
    /// Returns [`PseudoLibraryError::Parse`] on malformed input.
    pub fn from_toml_str(text: &str) -> Result<Self, PseudoLibraryError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a library file
    ///
    /// # Errors
    /// Returns [`PseudoLibraryError`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PseudoLibraryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PseudoLibraryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Add a pseudopotential to a group
    #[must_use]
    pub fn with(mut self, group: impl Into<String>, pseudo: Pseudopotential) -> Self {
        self.groups.entry(group.into()).or_default().push(pseudo);
        self
    }

    /// Group names
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Entries of a group
    ///
    /// # Errors
    /// Returns [`ConfigError::UnknownPseudoGroup`] if the group is absent.
    pub fn group(&self, name: &str) -> Result<&[Pseudopotential], ConfigError> {
        self.groups
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ConfigError::UnknownPseudoGroup(name.to_string()))
    }

    /// Core-hole and ground-state pair for a core-level label such as `C_1s`
    ///
    /// # Errors
    /// - [`ConfigError::UnknownPseudoGroup`] if the group is absent
    /// - [`ConfigError::MissingPseudopotential`] if either half is absent
    pub fn core_hole_pair(
        &self,
        group: &str,
        core_level: &str,
    ) -> Result<(&Pseudopotential, &Pseudopotential), ConfigError> {
        let entries = self.group(group)?;
        let element = element_of(core_level);
        let ground_state = format!("{element}_{GROUND_STATE_SUFFIX}");
        let find = |label: &str| entries.iter().find(|pseudo| pseudo.label == label);
        match (find(core_level), find(&ground_state)) {
            (Some(core_hole), Some(gipaw)) => Ok((core_hole, gipaw)),
            _ => Err(ConfigError::MissingPseudopotential {
                element: element.to_string(),
            }),
        }
    }
}

/// Element part of a core-level label (`C_1s` → `C`)
#[must_use]
pub fn element_of(core_level: &str) -> &str {
    core_level
        .split_once('_')
        .map_or(core_level, |(element, _)| element)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_library_parses() {
        let library = PseudoLibrary::builtin().unwrap();
        assert_eq!(library.groups().collect::<Vec<_>>(), vec!["core_hole_pseudos_pbe"]);
        assert_eq!(library.group("core_hole_pseudos_pbe").unwrap().len(), 8);
    }

    #[test]
    fn core_hole_pair_resolves_both_halves() {
        let library = PseudoLibrary::builtin().unwrap();
        let (core_hole, gipaw) = library.core_hole_pair("core_hole_pseudos_pbe", "C_1s").unwrap();
        assert_eq!(core_hole.label, "C_1s");
        assert_eq!(gipaw.label, "C_gs");
        assert_eq!(gipaw.element, "C");
    }

    #[test]
    fn missing_ground_state_is_reported_by_element() {
        let library = PseudoLibrary::new().with(
            "custom",
            Pseudopotential {
                label: "Fe_2p".into(),
                element: "Fe".into(),
                filename: "Fe.star2p.UPF".into(),
            },
        );
        let err = library.core_hole_pair("custom", "Fe_2p").unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingPseudopotential {
                element: "Fe".into()
            }
        );
    }

    #[test]
    fn unknown_group() {
        let library = PseudoLibrary::builtin().unwrap();
        let err = library.core_hole_pair("nope", "C_1s").unwrap_err();
        assert_eq!(err, ConfigError::UnknownPseudoGroup("nope".into()));
    }

    #[test]
    fn element_of_label() {
        assert_eq!(element_of("Si_2p"), "Si");
        assert_eq!(element_of("O"), "O");
    }
}
