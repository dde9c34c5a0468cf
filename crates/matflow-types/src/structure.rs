//! Immutable material structures

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One atomic site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Element symbol, e.g. `Si`
    pub symbol: String,
    /// Cartesian position in Angstrom
    pub position: [f64; 3],
}

impl Site {
    /// Create a new site
    #[inline]
    pub fn new(symbol: impl Into<String>, position: [f64; 3]) -> Self {
        Self {
            symbol: symbol.into(),
            position,
        }
    }
}

/// Snapshot of a physical input: composition, cell and site positions
///
/// Values are never mutated once built. The orchestrator replaces its
/// working reference with a relaxed structure instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    #[serde(default = "Uuid::new_v4")]
    uuid: Uuid,
    #[serde(default)]
    label: String,
    cell: [[f64; 3]; 3],
    #[serde(default = "default_pbc")]
    pbc: [bool; 3],
    sites: Vec<Site>,
}

fn default_pbc() -> [bool; 3] {
    [true; 3]
}

impl Structure {
    /// Create a fully periodic structure with a fresh identifier
    #[must_use]
    pub fn new(cell: [[f64; 3]; 3], sites: Vec<Site>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            label: String::new(),
            cell,
            pbc: default_pbc(),
            sites,
        }
    }

    /// Set the label
    #[inline]
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set periodic boundary conditions
    #[inline]
    #[must_use]
    pub fn with_pbc(mut self, pbc: [bool; 3]) -> Self {
        self.pbc = pbc;
        self
    }

    /// Opaque identifier
    #[inline]
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// User label, possibly empty
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Cell vectors
    #[inline]
    #[must_use]
    pub fn cell(&self) -> &[[f64; 3]; 3] {
        &self.cell
    }

    /// Periodic boundary conditions
    #[inline]
    #[must_use]
    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    /// Atomic sites
    #[inline]
    #[must_use]
    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    /// Distinct element symbols, sorted
    #[must_use]
    pub fn elements(&self) -> Vec<String> {
        self.composition().into_keys().collect()
    }

    /// Hill-ordered chemical formula, e.g. `Si2` or `CH4`
    #[must_use]
    pub fn formula(&self) -> String {
        let mut counts = self.composition();
        let mut formula = String::new();
        let mut push = |symbol: &str, count: usize| {
            formula.push_str(symbol);
            if count > 1 {
                formula.push_str(&count.to_string());
            }
        };

        if let Some(carbon) = counts.remove("C") {
            push("C", carbon);
            if let Some(hydrogen) = counts.remove("H") {
                push("H", hydrogen);
            }
        }
        for (symbol, count) in &counts {
            push(symbol, *count);
        }
        formula
    }

    /// Label if set, formula otherwise
    #[must_use]
    pub fn display_label(&self) -> String {
        if self.label.trim().is_empty() {
            self.formula()
        } else {
            self.label.clone()
        }
    }

    fn composition(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for site in &self.sites {
            *counts.entry(site.symbol.clone()).or_insert(0) += 1;
        }
        counts
    }
}
