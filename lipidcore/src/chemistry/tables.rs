use std::collections::BTreeMap;

use context_error::*;
use serde::{Deserialize, Serialize};

use crate::error::{LipidError, LipidErrorKind};

/// The mass difference between carbon-13 and carbon-12 in Dalton
pub const CARBON_ISOTOPE_SHIFT: f64 = 1.003_354_835_34;

/// The natural abundance of carbon-13 (IUPAC representative isotopic composition)
pub const CARBON13_ABUNDANCE: f64 = 0.0107;

/// The monoisotopic mass of every element that is used for the mass of a formula. Element symbol to mass in Dalton.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AtomicMassTable {
    masses: BTreeMap<String, f64>,
}

impl AtomicMassTable {
    /// Create a table from (symbol, mass) pairs.
    /// # Errors
    /// If any mass is not a finite positive number.
    pub fn new(masses: impl IntoIterator<Item = (impl Into<String>, f64)>) -> Result<Self, LipidError> {
        let masses: BTreeMap<String, f64> = masses.into_iter().map(|(s, m)| (s.into(), m)).collect();
        if let Some((symbol, mass)) = masses.iter().find(|(_, m)| !m.is_finite() || **m <= 0.0) {
            return Err(BoxedError::new(
                LipidErrorKind::Config,
                "Invalid atomic mass table",
                format!("The mass for '{symbol}' ({mass}) has to be a finite positive number"),
                Context::none(),
            ));
        }
        Ok(Self { masses })
    }

    /// Parse a table from a JSON object like `{"C": 12.0, "H": 1.00782503223}`.
    /// # Errors
    /// If the JSON is not a valid table.
    pub fn from_json(text: &str) -> Result<Self, LipidError> {
        let table: Self = serde_json::from_str(text).map_err(|err| {
            BoxedError::new(
                LipidErrorKind::Config,
                "Invalid atomic mass table",
                err.to_string(),
                Context::none(),
            )
        })?;
        Self::new(table.masses)
    }

    /// The most common monoisotopic masses found in lipids and their adducts
    pub fn monoisotopic() -> Self {
        Self {
            masses: [
                ("C", 12.0),
                ("H", 1.007_825_032_23),
                ("N", 14.003_074_004_43),
                ("O", 15.994_914_619_57),
                ("P", 30.973_761_998_42),
                ("S", 31.972_071_174_4),
                ("Na", 22.989_769_282_0),
                ("K", 38.963_706_485_6),
                ("Li", 7.016_003_436_6),
                ("Cl", 34.968_852_682),
                ("F", 18.998_403_162_73),
            ]
            .into_iter()
            .map(|(s, m)| (s.to_string(), m))
            .collect(),
        }
    }

    /// The mass of the given element, if present
    pub fn mass(&self, symbol: &str) -> Option<f64> {
        self.masses.get(symbol).copied()
    }

    /// All elements in this table
    pub fn elements(&self) -> impl Iterator<Item = &str> {
        self.masses.keys().map(String::as_str)
    }
}

/// A single heavier isotope of an element
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct IsotopeAbundance {
    /// The nominal mass shift relative to the lightest isotope
    pub mass_shift: f64,
    /// The natural abundance, as a probability in `[0, 1]`
    pub abundance: f64,
}

/// The natural abundance of the heavier isotopes per element, only the carbon entry is used for correction
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NaturalAbundanceTable {
    isotopes: BTreeMap<String, Vec<IsotopeAbundance>>,
}

impl NaturalAbundanceTable {
    /// Create a table from the isotopes of each element.
    /// # Errors
    /// If any abundance is outside of `[0, 1]` or the abundances for an element sum to more than one.
    pub fn new(
        isotopes: impl IntoIterator<Item = (impl Into<String>, Vec<IsotopeAbundance>)>,
    ) -> Result<Self, LipidError> {
        let isotopes: BTreeMap<String, Vec<IsotopeAbundance>> =
            isotopes.into_iter().map(|(s, i)| (s.into(), i)).collect();
        for (symbol, list) in &isotopes {
            if list.iter().any(|i| !(0.0..=1.0).contains(&i.abundance))
                || list.iter().map(|i| i.abundance).sum::<f64>() > 1.0
            {
                return Err(BoxedError::new(
                    LipidErrorKind::Config,
                    "Invalid natural abundance table",
                    format!("The abundances for '{symbol}' have to be probabilities that sum to at most one"),
                    Context::none(),
                ));
            }
        }
        Ok(Self { isotopes })
    }

    /// Parse a table from JSON like `{"C": [{"mass_shift": 1.00335, "abundance": 0.0107}]}`.
    /// # Errors
    /// If the JSON is not a valid table.
    pub fn from_json(text: &str) -> Result<Self, LipidError> {
        let table: Self = serde_json::from_str(text).map_err(|err| {
            BoxedError::new(
                LipidErrorKind::Config,
                "Invalid natural abundance table",
                err.to_string(),
                Context::none(),
            )
        })?;
        Self::new(table.isotopes)
    }

    /// The natural abundances of the heavier isotopes of carbon, hydrogen, nitrogen and oxygen
    pub fn natural() -> Self {
        let entry = |mass_shift, abundance| IsotopeAbundance {
            mass_shift,
            abundance,
        };
        Self {
            isotopes: [
                ("C", vec![entry(CARBON_ISOTOPE_SHIFT, CARBON13_ABUNDANCE)]),
                ("H", vec![entry(1.006_276_746_7, 0.000_115)]),
                ("N", vec![entry(0.997_034_893_4, 0.003_64)]),
                (
                    "O",
                    vec![entry(1.004_216_9, 0.000_38), entry(2.004_245_7, 0.002_05)],
                ),
            ]
            .into_iter()
            .map(|(s, i)| (s.to_string(), i))
            .collect(),
        }
    }

    /// The heavier isotopes for the given element
    pub fn isotopes(&self, symbol: &str) -> &[IsotopeAbundance] {
        self.isotopes.get(symbol).map_or(&[], Vec::as_slice)
    }

    /// The carbon-13 entry, the isotope with a shift closest to one Dalton
    pub fn carbon13(&self) -> Option<IsotopeAbundance> {
        self.isotopes("C")
            .iter()
            .min_by(|a, b| (a.mass_shift - 1.0).abs().total_cmp(&(b.mass_shift - 1.0).abs()))
            .copied()
    }
}
