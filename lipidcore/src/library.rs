//! The reference library of known mass pairs and the tolerances used to match against it.

use context_error::*;
use serde::{Deserialize, Serialize};

use crate::{
    error::{LipidError, LipidErrorKind},
    lipid::LipidName,
};

/// A tolerance for matching masses, either absolute in Dalton or relative in ppm
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, PartialOrd, Serialize)]
pub enum Tolerance {
    /// An absolute tolerance in Dalton
    Absolute(f64),
    /// A relative tolerance in parts per million
    Relative(f64),
}

impl Tolerance {
    /// Create a new ppm (relative) tolerance
    pub const fn new_ppm(ppm: f64) -> Self {
        Self::Relative(ppm)
    }

    /// Create a new absolute tolerance in Dalton
    pub const fn new_absolute(da: f64) -> Self {
        Self::Absolute(da)
    }

    /// Check if the observed mass lies within this tolerance of the reference mass.
    /// A relative tolerance is measured relative to the reference: `|observed - reference| / reference * 1e6 <= ppm`.
    pub fn within(self, observed: f64, reference: f64) -> bool {
        match self {
            Self::Absolute(da) => (observed - reference).abs() <= da,
            Self::Relative(ppm) => (observed - reference).abs() / reference * 1e6 <= ppm,
        }
    }

    /// The inclusive range of reference masses that could be within this tolerance of the observed mass
    pub fn reference_bounds(self, observed: f64) -> (f64, f64) {
        match self {
            Self::Absolute(da) => (observed - da, observed + da),
            Self::Relative(ppm) => {
                let fraction = ppm * 1e-6;
                (
                    observed / (1.0 + fraction),
                    if fraction < 1.0 {
                        observed / (1.0 - fraction)
                    } else {
                        f64::INFINITY
                    },
                )
            }
        }
    }

    /// Check that this tolerance is finite and not negative
    pub fn is_valid(self) -> bool {
        let (Self::Absolute(value) | Self::Relative(value)) = self;
        value.is_finite() && value >= 0.0
    }
}

impl std::fmt::Display for Tolerance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absolute(da) => write!(f, "{da} Da"),
            Self::Relative(ppm) => write!(f, "{ppm} ppm"),
        }
    }
}

/// A known precursor/fragment mass pair with its identity
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LibraryEntry {
    /// The precursor mass in Dalton
    pub precursor_mass: f64,
    /// The fragment mass in Dalton, if this entry is defined by a fragment as well
    #[serde(default)]
    pub fragment_mass: Option<f64>,
    /// A tolerance specific for this entry, overrides the configured tolerance
    #[serde(default)]
    pub tolerance: Option<Tolerance>,
    /// The formula of the lipid as given in the library
    pub formula: String,
    /// The identity of the lipid
    pub lipid_name: LipidName,
    /// If this lipid is an internal standard
    #[serde(default)]
    pub is_internal_standard: bool,
}

impl LibraryEntry {
    /// Create a new entry without a fragment mass
    pub fn new(precursor_mass: f64, formula: impl Into<String>, lipid_name: LipidName) -> Self {
        Self {
            precursor_mass,
            fragment_mass: None,
            tolerance: None,
            formula: formula.into(),
            lipid_name,
            is_internal_standard: false,
        }
    }

    /// Set the fragment mass
    #[must_use]
    pub fn fragment(self, fragment_mass: f64) -> Self {
        Self {
            fragment_mass: Some(fragment_mass),
            ..self
        }
    }

    /// Set an entry specific tolerance
    #[must_use]
    pub fn tolerance(self, tolerance: Tolerance) -> Self {
        Self {
            tolerance: Some(tolerance),
            ..self
        }
    }

    /// Mark this entry as an internal standard
    #[must_use]
    pub fn internal_standard(self) -> Self {
        Self {
            is_internal_standard: true,
            ..self
        }
    }
}

/// The full reference library, kept sorted on precursor mass for fast candidate lookup
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MassLibrary {
    /// The entries with their index in the original input order
    entries: Vec<(usize, LibraryEntry)>,
    /// The widest entry specific tolerances (absolute, relative)
    widest: (f64, f64),
}

impl MassLibrary {
    /// Create a new library.
    /// # Errors
    /// If any entry has a mass that is not finite and positive, or an invalid tolerance.
    pub fn new(entries: impl IntoIterator<Item = LibraryEntry>) -> Result<Self, LipidError> {
        let mut entries: Vec<(usize, LibraryEntry)> = entries.into_iter().enumerate().collect();
        for (index, entry) in &entries {
            let valid_mass = |m: f64| m.is_finite() && m > 0.0;
            if !valid_mass(entry.precursor_mass)
                || entry.fragment_mass.is_some_and(|m| !valid_mass(m))
                || entry.tolerance.is_some_and(|t| !t.is_valid())
            {
                return Err(BoxedError::new(
                    LipidErrorKind::Config,
                    "Invalid library entry",
                    format!(
                        "Library entry {index} ({}) needs finite positive masses and a valid tolerance",
                        entry.lipid_name
                    ),
                    Context::none(),
                ));
            }
        }
        entries.sort_by(|a, b| a.1.precursor_mass.total_cmp(&b.1.precursor_mass));
        let widest = entries
            .iter()
            .filter_map(|(_, e)| e.tolerance)
            .fold((0.0_f64, 0.0_f64), |(da, ppm), t| match t {
                Tolerance::Absolute(v) => (da.max(v), ppm),
                Tolerance::Relative(v) => (da, ppm.max(v)),
            });
        Ok(Self { entries, widest })
    }

    /// Parse a library from a JSON list of entries.
    /// # Errors
    /// If the JSON is not a valid list of entries, or if any entry is invalid.
    pub fn from_json(text: &str) -> Result<Self, LipidError> {
        let entries: Vec<LibraryEntry> = serde_json::from_str(text).map_err(|err| {
            BoxedError::new(
                LipidErrorKind::Config,
                "Invalid library",
                err.to_string(),
                Context::none(),
            )
        })?;
        Self::new(entries)
    }

    /// The number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the library is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, sorted on precursor mass, with their original index
    pub fn entries(&self) -> impl Iterator<Item = (usize, &LibraryEntry)> {
        self.entries.iter().map(|(i, e)| (*i, e))
    }

    /// All entries whose precursor mass could be within the given tolerance, or within their own tolerance, of the
    /// observed precursor mass. Returned with their original index. This is a superset of the matching entries.
    pub(crate) fn precursor_window(
        &self,
        observed: f64,
        tolerance: Tolerance,
    ) -> impl Iterator<Item = (usize, &LibraryEntry)> {
        let (mut low, mut high) = tolerance.reference_bounds(observed);
        for own in [
            Tolerance::Absolute(self.widest.0),
            Tolerance::Relative(self.widest.1),
        ] {
            let (l, h) = own.reference_bounds(observed);
            low = low.min(l);
            high = high.max(h);
        }
        let start = self
            .entries
            .partition_point(|(_, e)| e.precursor_mass < low);
        let end = self
            .entries
            .partition_point(|(_, e)| e.precursor_mass <= high);
        self.entries[start..end.max(start)]
            .iter()
            .map(|(i, e)| (*i, e))
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;

    #[test]
    fn ppm_tolerance() {
        let tolerance = Tolerance::new_ppm(10.0);
        assert!(tolerance.within(520.345, 520.34));
        assert!(!tolerance.within(520.35, 520.34));
        let (low, high) = tolerance.reference_bounds(520.34);
        assert!(tolerance.within(520.34, low + 1e-9));
        assert!(tolerance.within(520.34, high - 1e-9));
        assert!(!Tolerance::new_ppm(-1.0).is_valid());
        assert!(!Tolerance::new_absolute(f64::NAN).is_valid());
    }

    #[test]
    fn absolute_tolerance() {
        let tolerance = Tolerance::new_absolute(0.3);
        assert!(tolerance.within(520.6, 520.34));
        assert!(!tolerance.within(520.7, 520.34));
    }

    #[test]
    fn window() {
        let name: LipidName = "CE|12:0|(12:0)".parse().unwrap();
        let library = MassLibrary::new([
            LibraryEntry::new(600.0, "", name.clone()),
            LibraryEntry::new(520.34, "C39H68O2", name.clone()),
            LibraryEntry::new(520.0, "", name.clone()).tolerance(Tolerance::new_absolute(0.5)),
        ])
        .unwrap();
        let found: Vec<usize> = library
            .precursor_window(520.34, Tolerance::new_ppm(10.0))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(found, vec![2, 1]);
        assert!(MassLibrary::new([LibraryEntry::new(-1.0, "", name)]).is_err());
    }
}
