//! Closed enumerations normalized from their wire strings

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $field:literal {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every member, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire form of this value
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(ConfigError::InvalidEnumeration {
                        field: $field,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// Named preset bundle of default numerical parameters
    Protocol, "protocol" {
        /// Cheapest, for quick checks
        Fast => "fast",
        /// Balanced accuracy and cost
        Moderate => "moderate",
        /// Tight convergence
        Precise => "precise",
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self::Moderate
    }
}

wire_enum! {
    /// Degrees of freedom optimized by the relaxation branch
    RelaxType, "relax_type" {
        /// No relaxation branch
        None => "none",
        /// Atomic positions only
        Positions => "positions",
        /// Cell volume only
        Volume => "volume",
        /// Cell shape only
        Shape => "shape",
        /// Full cell
        Cell => "cell",
        /// Positions and full cell
        PositionsCell => "positions_cell",
        /// Positions and volume
        PositionsVolume => "positions_volume",
        /// Positions and shape
        PositionsShape => "positions_shape",
    }
}

impl RelaxType {
    /// Whether this relax type schedules a relaxation branch at all
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Short human description used in process labels
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Self::None => "structure as is",
            Self::Positions => "atoms (fixed cell)",
            Self::PositionsCell => "atoms+cell",
            other => other.as_str(),
        }
    }
}

wire_enum! {
    /// Electronic character of the system
    ElectronicType, "electronic_type" {
        /// Partial occupations with smearing
        Metal => "metal",
        /// Fixed occupations
        Insulator => "insulator",
        /// Let the engine decide
        Automatic => "automatic",
    }
}

wire_enum! {
    /// Spin treatment
    SpinType, "spin_type" {
        /// Spin-unpolarized
        None => "none",
        /// Collinear magnetism
        Collinear => "collinear",
        /// Non-collinear magnetism
        NonCollinear => "non_collinear",
        /// Non-collinear with spin-orbit coupling
        SpinOrbit => "spin_orbit",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_values() {
        assert_eq!("positions_cell".parse::<RelaxType>().unwrap(), RelaxType::PositionsCell);
        assert_eq!("insulator".parse::<ElectronicType>().unwrap(), ElectronicType::Insulator);
        assert_eq!("collinear".parse::<SpinType>().unwrap(), SpinType::Collinear);
        assert_eq!("fast".parse::<Protocol>().unwrap(), Protocol::Fast);
    }

    #[test]
    fn parse_unknown_value_names_the_field() {
        let err = "diagonal".parse::<SpinType>().unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnumeration {
                field: "spin_type",
                value: "diagonal".to_string()
            }
        );
    }

    #[test]
    fn wire_form_round_trips() {
        for relax in RelaxType::ALL {
            assert_eq!(relax.as_str().parse::<RelaxType>().unwrap(), *relax);
        }
        let json = serde_json::to_string(&SpinType::NonCollinear).unwrap();
        assert_eq!(json, "\"non_collinear\"");
    }

    #[test]
    fn relax_type_descriptions() {
        assert!(!RelaxType::None.is_enabled());
        assert_eq!(RelaxType::None.describe(), "structure as is");
        assert_eq!(RelaxType::PositionsCell.describe(), "atoms+cell");
        assert_eq!(RelaxType::Volume.describe(), "volume");
    }

    #[test]
    fn protocol_defaults_to_moderate() {
        assert_eq!(Protocol::default(), Protocol::Moderate);
    }
}
