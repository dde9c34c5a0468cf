//! Protocol presets and the shared pw step builder
//!
//! Every pw-based sub-process type starts from the same preset for the
//! chosen [`Protocol`]. The presets ship embedded in the crate and are
//! parsed once.

use indexmap::IndexMap;
use matflow_types::{
    CodeBinding, ConfigError, ElectronicType, NamespaceTree, Protocol, SpinType, Structure,
    WorkflowParameters,
};
use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::{json, Value};

const BUILTIN_PROTOCOLS: &str = include_str!("../data/protocols.toml");

static BUILTIN: Lazy<ProtocolCatalog> = Lazy::new(|| {
    ProtocolCatalog::from_toml_str(BUILTIN_PROTOCOLS)
        .expect("embedded protocol catalog is valid TOML")
});

/// Default numerical parameters for one protocol
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProtocolPreset {
    /// Reciprocal-space sampling density for scf steps
    pub kpoints_distance: f64,
    /// Wavefunction cutoff (Ry)
    pub ecutwfc: f64,
    /// Charge-density cutoff (Ry)
    pub ecutrho: f64,
    /// SCF convergence threshold per atom
    pub conv_thr_per_atom: f64,
    /// Smearing kind for metals
    pub smearing: String,
    /// Smearing width for metals
    pub degauss: f64,
    /// Total-energy convergence per atom for relaxations
    pub etot_conv_thr_per_atom: f64,
    /// Force convergence for relaxations
    pub forc_conv_thr: f64,
    /// Whether relaxations restart until the cell volume converges
    pub meta_convergence: bool,
    /// Cap on relaxation restarts
    pub max_meta_convergence_iterations: u32,
    /// Sampling density along the band path
    pub bands_kpoints_distance: f64,
    /// Bands to compute relative to occupied ones
    pub nbands_factor: f64,
    /// Sampling density for non-self-consistent steps
    pub nscf_kpoints_distance: f64,
    /// Energy grid step for densities of states
    pub dos_delta_e: f64,
    /// Starting magnetization when none is given
    pub starting_magnetization: f64,
}

/// Protocol presets keyed by protocol
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ProtocolCatalog {
    presets: IndexMap<String, ProtocolPreset>,
}

impl ProtocolCatalog {
    /// Presets shipped with the crate
    #[must_use]
    pub fn builtin() -> &'static Self {
        &BUILTIN
    }

    /// Parse a catalog
    ///
    /// # Errors
    /// Returns the TOML error if the text does not describe a catalog.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Preset for a protocol
    ///
    /// # Errors
    /// Returns [`ConfigError::MissingSection`] if the catalog lacks it.
    pub fn preset(&self, protocol: Protocol) -> Result<&ProtocolPreset, ConfigError> {
        self.presets
            .get(protocol.as_str())
            .ok_or_else(|| ConfigError::MissingSection(format!("protocols.{protocol}")))
    }
}

/// Kind of pw calculation a step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Calculation {
    /// Self-consistent field
    Scf,
    /// Non-self-consistent field
    Nscf,
    /// Band structure along a path
    Bands,
    /// Fixed-cell relaxation
    Relax,
    /// Variable-cell relaxation
    VcRelax,
}

impl Calculation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Scf => "scf",
            Self::Nscf => "nscf",
            Self::Bands => "bands",
            Self::Relax => "relax",
            Self::VcRelax => "vc-relax",
        }
    }
}

/// Build one pw step: code, `CONTROL`/`SYSTEM`/`ELECTRONS` and sampling
///
/// The shared `advanced` overrides are merged last so users always win.
#[must_use]
pub fn pw_step(
    preset: &ProtocolPreset,
    structure: &Structure,
    parameters: &WorkflowParameters,
    code: &CodeBinding,
    calculation: Calculation,
) -> NamespaceTree {
    #[allow(clippy::cast_precision_loss)]
    let natoms = structure.sites().len().max(1) as f64;

    let mut system = json!({
        "ecutwfc": preset.ecutwfc,
        "ecutrho": preset.ecutrho,
    });
    match parameters.electronic_type {
        ElectronicType::Insulator => {
            system["occupations"] = json!("fixed");
        }
        ElectronicType::Metal | ElectronicType::Automatic => {
            system["occupations"] = json!("smearing");
            system["smearing"] = json!(preset.smearing);
            system["degauss"] = json!(preset.degauss);
        }
    }
    match parameters.spin_type {
        SpinType::None => {}
        SpinType::Collinear => {
            let moment = parameters
                .basic_extra
                .get("initial_magnetic_moments")
                .and_then(Value::as_f64)
                .unwrap_or(preset.starting_magnetization);
            system["nspin"] = json!(2);
            system["starting_magnetization"] = structure
                .elements()
                .into_iter()
                .map(|element| (element, json!(moment)))
                .collect::<serde_json::Map<_, _>>()
                .into();
        }
        SpinType::NonCollinear => {
            system["noncolin"] = json!(true);
        }
        SpinType::SpinOrbit => {
            system["noncolin"] = json!(true);
            system["lspinorb"] = json!(true);
        }
    }

    let mut control = json!({ "calculation": calculation.as_str() });
    if matches!(calculation, Calculation::Relax | Calculation::VcRelax) {
        control["etot_conv_thr"] = json!(preset.etot_conv_thr_per_atom * natoms);
        control["forc_conv_thr"] = json!(preset.forc_conv_thr);
    }

    let kpoints_distance = match calculation {
        Calculation::Nscf => preset.nscf_kpoints_distance,
        _ => preset.kpoints_distance,
    };

    let mut tree = NamespaceTree::new();
    tree.insert(
        "pw",
        json!({
            "code": code.label,
            "parameters": {
                "CONTROL": control,
                "SYSTEM": system,
                "ELECTRONS": { "conv_thr": preset.conv_thr_per_atom * natoms },
            },
        }),
    );
    tree.insert("kpoints_distance", json!(kpoints_distance));
    tree.merge(&parameters.shared_overrides);
    tree
}
