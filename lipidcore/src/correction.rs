//! Correct intensities for the carbon-13 isotopologues of lighter compositions.
//!
//! Within a sample the identified compositions are linked when the monoisotopic mass of the heavier one lies at an
//! isotopologue of the lighter one. Every connected set of compositions (a neighbourhood) is resolved from light to
//! heavy: the lightest composition receives no isotopic signal, so its observed total is its true total, and every
//! heavier composition has the expected isotopologue signal of all lighter (already corrected) compositions
//! subtracted. Contributions only flow from light to heavy, so this single pass is exact.

use std::collections::BTreeMap;

use context_error::*;
use itertools::Itertools;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::{
    chemistry::CARBON_ISOTOPE_SHIFT,
    dataset::{Dataset, Row, Warning},
    error::{LipidError, LipidErrorKind},
    isotopes::IsotopeDistribution,
    lipid::LipidName,
};

/// Deconvolves the overlap of isotopologue signal between compositions
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IsotopicCorrector {
    overlap_tolerance: f64,
}

impl Default for IsotopicCorrector {
    fn default() -> Self {
        Self {
            overlap_tolerance: 0.05,
        }
    }
}

/// All rows of one composition in one sample
#[derive(Debug)]
struct Composition<'a> {
    name: &'a LipidName,
    mass: f64,
    observed: f64,
    distribution: &'a IsotopeDistribution,
    /// Positions in the dataset
    rows: Vec<usize>,
}

/// A connected set of overlapping compositions, sorted on ascending mass
#[derive(Debug)]
struct Neighbourhood<'a> {
    compositions: Vec<Composition<'a>>,
    /// For every composition the lighter compositions that contribute to it, with the isotopologue index
    contributors: Vec<Vec<(usize, usize)>>,
}

/// The result of resolving a single neighbourhood
#[derive(Debug, Default)]
struct Resolved {
    /// The correction fraction per position
    fractions: Vec<(usize, f64)>,
    clamped: Vec<(usize, String)>,
}

impl IsotopicCorrector {
    /// Create a new corrector, a heavier composition receives isotopic signal from a lighter one if the mass
    /// difference is within `overlap_tolerance` Dalton of a whole number of carbon-13 shifts.
    /// # Errors
    /// If the tolerance is not a finite positive number.
    pub fn new(overlap_tolerance: f64) -> Result<Self, LipidError> {
        if !(overlap_tolerance.is_finite() && overlap_tolerance > 0.0) {
            return Err(BoxedError::new(
                LipidErrorKind::Config,
                "Invalid isotope overlap tolerance",
                format!(
                    "The overlap tolerance ({overlap_tolerance}) has to be a finite positive number of Dalton"
                ),
                Context::none(),
            ));
        }
        Ok(Self { overlap_tolerance })
    }

    /// The isotopologue index of `lighter` that lands on `heavier`, if any
    fn overlap(&self, lighter: &Composition, heavier: &Composition) -> Option<usize> {
        let difference = heavier.mass - lighter.mass;
        let k = (difference / CARBON_ISOTOPE_SHIFT).round();
        (k >= 1.0
            && (k as usize) < lighter.distribution.len()
            && (k.mul_add(-CARBON_ISOTOPE_SHIFT, difference)).abs() <= self.overlap_tolerance)
            .then_some(k as usize)
    }

    /// Correct all rows in the dataset. Rows that are not identified, or have no monoisotopic mass or no
    /// distribution, are passed through with `corrected_intensity = intensity`. A composition whose true total
    /// would be negative is set to zero and all its rows get a [`LipidErrorKind::NegativeIntensityClamped`] warning.
    pub fn correct(
        &self,
        dataset: &Dataset,
        distributions: &BTreeMap<LipidName, IsotopeDistribution>,
    ) -> (Dataset, Vec<Warning>) {
        let neighbourhoods: Vec<Neighbourhood> = dataset
            .positions_per_sample()
            .into_iter()
            .flat_map(|(_, positions)| self.neighbourhoods(dataset.rows(), &positions, distributions))
            .collect();
        log::debug!(
            "Resolving {} isotope neighbourhoods for {} rows",
            neighbourhoods.len(),
            dataset.len()
        );

        #[cfg(feature = "rayon")]
        let resolved: Vec<Resolved> = neighbourhoods.par_iter().map(resolve).collect();
        #[cfg(not(feature = "rayon"))]
        let resolved: Vec<Resolved> = neighbourhoods.iter().map(resolve).collect();

        let mut corrected: Vec<Option<f64>> = vec![None; dataset.len()];
        let mut warnings = Vec::new();
        for result in resolved {
            for (position, fraction) in result.fractions {
                corrected[position] = Some(dataset.rows()[position].record.intensity * fraction);
            }
            for (position, message) in result.clamped {
                warnings.push(Warning::new(
                    Some(dataset.rows()[position].index),
                    LipidErrorKind::NegativeIntensityClamped,
                    message,
                ));
            }
        }

        let output = Dataset::from_rows(
            dataset
                .rows()
                .iter()
                .zip(corrected)
                .map(|(row, corrected)| Row {
                    corrected_intensity: Some(corrected.unwrap_or(row.record.intensity)),
                    ..row.clone()
                })
                .collect(),
        );
        (output, warnings)
    }

    /// Split the rows of one sample into neighbourhoods
    fn neighbourhoods<'a>(
        &self,
        rows: &'a [Row],
        positions: &[usize],
        distributions: &'a BTreeMap<LipidName, IsotopeDistribution>,
    ) -> Vec<Neighbourhood<'a>> {
        let mut compositions: BTreeMap<&LipidName, Composition> = BTreeMap::new();
        for &position in positions {
            let row = &rows[position];
            let (Some(name), Some(mass)) = (row.lipid_name(), row.monoisotopic_mass) else {
                continue;
            };
            let Some(distribution) = distributions.get(name) else {
                continue;
            };
            let composition = compositions.entry(name).or_insert_with(|| Composition {
                name,
                mass,
                observed: 0.0,
                distribution,
                rows: Vec::new(),
            });
            composition.observed += row.record.intensity;
            composition.rows.push(position);
        }
        let compositions: Vec<Composition> = compositions
            .into_values()
            .sorted_by(|a, b| a.mass.total_cmp(&b.mass).then_with(|| a.name.cmp(b.name)))
            .collect();

        // Link every composition to the heavier compositions at one of its isotopologues
        let mut links = Vec::new();
        for (lighter, composition) in compositions.iter().enumerate() {
            let reach = (composition.distribution.len().saturating_sub(1)) as f64
                * CARBON_ISOTOPE_SHIFT
                + self.overlap_tolerance;
            for (heavier, other) in compositions
                .iter()
                .enumerate()
                .skip(lighter + 1)
                .take_while(|(_, other)| other.mass - composition.mass <= reach)
            {
                if let Some(k) = self.overlap(composition, other) {
                    links.push((lighter, heavier, k));
                }
            }
        }

        let mut sets = DisjointSet::new(compositions.len());
        for (lighter, heavier, _) in &links {
            sets.union(*lighter, *heavier);
        }
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for index in 0..compositions.len() {
            groups.entry(sets.find(index)).or_default().push(index);
        }

        // Members stay in ascending mass order, so the local index order is the processing order
        let mut local = vec![(0, 0); compositions.len()];
        for (group, members) in groups.values().enumerate() {
            for (offset, member) in members.iter().enumerate() {
                local[*member] = (group, offset);
            }
        }
        let mut neighbourhoods: Vec<Neighbourhood> = groups
            .values()
            .map(|members| Neighbourhood {
                compositions: Vec::with_capacity(members.len()),
                contributors: vec![Vec::new(); members.len()],
            })
            .collect();
        for (lighter, heavier, k) in links {
            let (group, to) = local[heavier];
            neighbourhoods[group].contributors[to].push((local[lighter].1, k));
        }
        for (index, composition) in compositions.into_iter().enumerate() {
            neighbourhoods[local[index].0]
                .compositions
                .push(composition);
        }
        neighbourhoods
    }
}

/// Resolve the true totals of one neighbourhood and rescale its rows
fn resolve(neighbourhood: &Neighbourhood) -> Resolved {
    let mut result = Resolved::default();
    let mut true_totals: Vec<f64> = Vec::with_capacity(neighbourhood.compositions.len());
    for (composition, contributors) in neighbourhood
        .compositions
        .iter()
        .zip(&neighbourhood.contributors)
    {
        let satellites: f64 = contributors
            .iter()
            .map(|(lighter, k)| {
                true_totals[*lighter] * neighbourhood.compositions[*lighter].distribution.probability(*k)
            })
            .sum();
        let mut total = composition.observed - satellites;
        if total < 0.0 {
            for position in &composition.rows {
                result.clamped.push((
                    *position,
                    format!(
                        "The corrected total of {} ({total}) was negative and is set to zero",
                        composition.name
                    ),
                ));
            }
            total = 0.0;
        }
        true_totals.push(total);
        let fraction = if composition.observed == 0.0 {
            1.0
        } else {
            total / composition.observed
        };
        result.fractions.extend(
            composition
                .rows
                .iter()
                .map(|position| (*position, fraction)),
        );
    }
    result
}

/// Union find over indices
struct DisjointSet {
    parents: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parents: (0..size).collect(),
        }
    }

    fn find(&mut self, mut index: usize) -> usize {
        while self.parents[index] != index {
            self.parents[index] = self.parents[self.parents[index]];
            index = self.parents[index];
        }
        index
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            self.parents[a.max(b)] = a.min(b);
        }
    }
}
