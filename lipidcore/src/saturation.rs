//! Classify lipids as saturated or unsaturated.

use serde::{Deserialize, Serialize};

use crate::{
    dataset::Dataset,
    lipid::{Identification, LipidName},
};

/// The saturation classification of a lipid
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Saturation {
    /// No double bonds in any chain
    Saturated,
    /// At least one double bond
    Unsaturated,
    /// The lipid is not identified
    Unknown,
}

impl Saturation {
    /// `Some(true)` if saturated, `None` if unknown
    pub const fn as_bool(self) -> Option<bool> {
        match self {
            Self::Saturated => Some(true),
            Self::Unsaturated => Some(false),
            Self::Unknown => None,
        }
    }
}

/// Classifies lipid compositions, pure and without failure modes
#[derive(Clone, Copy, Debug, Default)]
pub struct SaturationChecker;

impl SaturationChecker {
    /// A lipid is saturated iff it has no double bonds in total
    pub const fn is_saturated(name: &LipidName) -> bool {
        name.total_double_bonds() == 0
    }

    /// Classify an identification, the unknown sentinel is classified as unknown
    pub fn classify(identification: &Identification) -> Saturation {
        match identification {
            Identification::Named(name) if Self::is_saturated(name) => Saturation::Saturated,
            Identification::Named(_) => Saturation::Unsaturated,
            Identification::Unknown => Saturation::Unknown,
        }
    }

    /// The saturation per chain in canonical chain order, `None` if the chains are unresolved
    pub fn chain_saturation(name: &LipidName) -> Option<Vec<bool>> {
        (!name.chains().is_empty()).then(|| name.chains().iter().map(|c| c.is_saturated()).collect())
    }

    /// Add the saturation column to a dataset
    pub fn check(dataset: &Dataset) -> Dataset {
        dataset.map(|row| {
            let mut row = row.clone();
            row.saturation = Some(Self::classify(&row.identification));
            row
        })
    }
}
