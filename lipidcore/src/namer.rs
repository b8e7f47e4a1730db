//! Identify lipids by matching observed mass pairs against the reference library.

use std::{cmp::Ordering, collections::HashMap};

use context_error::*;

use crate::{
    chemistry::{AtomicMassTable, ChemistryRuleTable, MolecularFormula},
    dataset::{Dataset, Warning},
    error::{LipidError, LipidErrorKind},
    helper_functions::pair_key,
    library::{LibraryEntry, MassLibrary, Tolerance},
    lipid::{Identification, LipidName},
};

/// The best library match for an observed mass pair
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LibraryMatch<'a> {
    /// The index of the entry in the library input order
    pub index: usize,
    /// The matched entry
    pub entry: &'a LibraryEntry,
    /// The absolute precursor mass error in Dalton
    pub precursor_error: f64,
    /// The absolute fragment mass error in Dalton, zero if either side has no fragment
    pub fragment_error: f64,
    /// Set if other entries were indistinguishable from this one but disagree on their formula or internal standard flag
    pub ambiguous: bool,
}

impl LibraryMatch<'_> {
    fn cmp_rank(&self, other: &Self) -> Ordering {
        self.precursor_error
            .total_cmp(&other.precursor_error)
            .then(self.fragment_error.total_cmp(&other.fragment_error))
            .then_with(|| {
                self.entry
                    .lipid_name
                    .canonical()
                    .cmp(&other.entry.lipid_name.canonical())
            })
    }
}

/// Names mass pairs with the help of the reference library, builds formulas and calculates masses
#[derive(Clone, Debug)]
pub struct LipidNamer<'a> {
    library: &'a MassLibrary,
    masses: &'a AtomicMassTable,
    rules: &'a ChemistryRuleTable,
    tolerance: Tolerance,
    fragment_tolerance: Tolerance,
}

impl<'a> LipidNamer<'a> {
    /// Create a new namer, the fragment tolerance is the same as the precursor tolerance
    pub const fn new(
        library: &'a MassLibrary,
        masses: &'a AtomicMassTable,
        rules: &'a ChemistryRuleTable,
        tolerance: Tolerance,
    ) -> Self {
        Self {
            library,
            masses,
            rules,
            tolerance,
            fragment_tolerance: tolerance,
        }
    }

    /// Use a different tolerance for matching fragment masses
    #[must_use]
    pub fn fragment_tolerance(self, fragment_tolerance: Tolerance) -> Self {
        Self {
            fragment_tolerance,
            ..self
        }
    }

    /// Find the best library entry for this mass pair. An entry is a candidate if the precursor mass is within
    /// tolerance and, if both the entry and the observation have a fragment mass, the fragment mass is within
    /// tolerance as well. An entry specific tolerance takes precedence over the tolerances of this namer.
    ///
    /// The best candidate has the smallest precursor error, then the smallest fragment error, then the first
    /// canonical name in lexicographic order, then the first entry in library order.
    pub fn match_mass_pair(&self, precursor: f64, fragment: Option<f64>) -> Option<LibraryMatch<'a>> {
        let mut best: Option<LibraryMatch<'a>> = None;
        for (index, entry) in self.library.precursor_window(precursor, self.tolerance) {
            if !entry
                .tolerance
                .unwrap_or(self.tolerance)
                .within(precursor, entry.precursor_mass)
            {
                continue;
            }
            let fragment_error = match (fragment, entry.fragment_mass) {
                (Some(observed), Some(reference)) => {
                    if !entry
                        .tolerance
                        .unwrap_or(self.fragment_tolerance)
                        .within(observed, reference)
                    {
                        continue;
                    }
                    (observed - reference).abs()
                }
                _ => 0.0,
            };
            let candidate = LibraryMatch {
                index,
                entry,
                precursor_error: (precursor - entry.precursor_mass).abs(),
                fragment_error,
                ambiguous: false,
            };
            best = Some(match best {
                None => candidate,
                Some(current) => match candidate.cmp_rank(&current) {
                    Ordering::Less => candidate,
                    Ordering::Greater => current,
                    Ordering::Equal => {
                        let conflict = candidate.entry.formula != current.entry.formula
                            || candidate.entry.is_internal_standard
                                != current.entry.is_internal_standard;
                        let first = if candidate.index < current.index {
                            candidate
                        } else {
                            current
                        };
                        LibraryMatch {
                            ambiguous: current.ambiguous || conflict,
                            ..first
                        }
                    }
                },
            });
        }
        best
    }

    /// Identify a mass pair, [`Identification::Unknown`] if no library entry matches
    pub fn identify(&self, precursor: f64, fragment: Option<f64>) -> Identification {
        self.match_mass_pair(precursor, fragment)
            .map_or(Identification::Unknown, |m| {
                Identification::Named(m.entry.lipid_name.clone())
            })
    }

    /// Build the formula of a lipid with the chemistry rule for its group.
    /// # Errors
    /// If the group has no rule ([`LipidErrorKind::UnsupportedGroup`]), or if the composition does not fit the rule
    /// ([`LipidErrorKind::InvalidComposition`]).
    pub fn build_formula(&self, name: &LipidName) -> Result<MolecularFormula, LipidError> {
        self.rules
            .rule(name.group())
            .ok_or_else(|| {
                BoxedError::new(
                    LipidErrorKind::UnsupportedGroup,
                    "Unsupported lipid group",
                    format!(
                        "There is no chemistry rule for the group '{}'",
                        name.group()
                    ),
                    Context::show(name.to_string()),
                )
                .suggestions(self.rules.groups().map(ToString::to_string))
            })?
            .formula(name)
    }

    /// The monoisotopic mass of a formula string.
    /// # Errors
    /// If the formula cannot be parsed ([`LipidErrorKind::MalformedFormula`]), or if it contains an element that is
    /// not in the atomic mass table ([`LipidErrorKind::UnknownElement`]).
    pub fn mass_of(&self, formula: &str) -> Result<f64, LipidError> {
        MolecularFormula::from_formula_string(formula)?.monoisotopic_mass(self.masses)
    }

    /// The monoisotopic mass of a lipid, by building its formula.
    /// # Errors
    /// See [`Self::build_formula`] and [`Self::mass_of`].
    pub fn mass_of_name(&self, name: &LipidName) -> Result<f64, LipidError> {
        self.build_formula(name)?.monoisotopic_mass(self.masses)
    }

    /// The formula for a matched entry, the library formula if given, otherwise built from the lipid name
    fn entry_formula(&self, entry: &LibraryEntry) -> Result<(MolecularFormula, f64), LipidError> {
        let formula = if entry.formula.trim().is_empty() {
            self.build_formula(&entry.lipid_name)?
        } else {
            MolecularFormula::from_formula_string(&entry.formula)?
        };
        let mass = formula.monoisotopic_mass(self.masses)?;
        Ok((formula, mass))
    }

    /// Name all rows in the dataset, setting the identification, formula, monoisotopic mass and internal standard
    /// flag. Rows that match but whose formula or mass cannot be determined are left unknown and get a warning. An
    /// ambiguous library match is reported once as a run level warning.
    pub fn name(&self, dataset: &Dataset) -> (Dataset, Vec<Warning>) {
        let mut warnings = Vec::new();
        let mut matches = HashMap::new();
        let mut formulas: HashMap<usize, Result<(MolecularFormula, f64), LipidError>> =
            HashMap::new();

        let named = dataset.map(|row| {
            let mut row = row.clone();
            let key = pair_key(row.record.precursor_mass, row.record.fragment_mass);
            let found = *matches.entry(key).or_insert_with(|| {
                let found = self.match_mass_pair(row.record.precursor_mass, row.record.fragment_mass);
                if let Some(m) = found.filter(|m| m.ambiguous) {
                    warnings.push(Warning::new(
                        None,
                        LipidErrorKind::AmbiguousMatch,
                        format!(
                            "Multiple library entries for {} match mass pair ({}, {}) equally well but disagree on their formula or internal standard flag, entry {} is used",
                            m.entry.lipid_name,
                            row.record.precursor_mass,
                            row.record
                                .fragment_mass
                                .map_or_else(|| "-".to_string(), |f| f.to_string()),
                            m.index,
                        ),
                    ));
                }
                found
            });
            let Some(found) = found else {
                return row;
            };
            match formulas
                .entry(found.index)
                .or_insert_with(|| self.entry_formula(found.entry))
            {
                Ok((formula, mass)) => {
                    row.identification = Identification::Named(found.entry.lipid_name.clone());
                    row.formula = Some(formula.clone());
                    row.monoisotopic_mass = Some(*mass);
                    row.is_internal_standard = found.entry.is_internal_standard;
                }
                Err(error) => warnings.push(Warning::from_error(Some(row.index), error)),
            }
            row
        });

        log::debug!(
            "Named {} of {} rows",
            named
                .rows()
                .iter()
                .filter(|r| !r.identification.is_unknown())
                .count(),
            named.len()
        );
        (named, warnings)
    }
}
