//! Carbon-13 isotopologue distributions.

use std::collections::BTreeMap;

use context_error::*;
use ndarray::{Array1, s};
use serde::{Deserialize, Serialize};

use crate::{
    chemistry::{CARBON13_ABUNDANCE, NaturalAbundanceTable},
    dataset::Dataset,
    error::{LipidError, LipidErrorKind},
    lipid::LipidName,
};

/// The probability per isotopologue, index `k` is the species with `k` carbon-13 atoms. Always sums to 1 (within
/// floating point error).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct IsotopeDistribution {
    probabilities: Array1<f64>,
}

impl IsotopeDistribution {
    /// The probability of the isotopologue with `k` carbon-13 atoms, zero if outside the distribution
    pub fn probability(&self, k: usize) -> f64 {
        self.probabilities.get(k).copied().unwrap_or_default()
    }

    /// The number of isotopologues, so the highest index is `len() - 1`
    pub fn len(&self) -> usize {
        self.probabilities.len()
    }

    /// A distribution always contains at least the monoisotopic species
    pub fn is_empty(&self) -> bool {
        self.probabilities.is_empty()
    }

    /// The total probability
    pub fn sum(&self) -> f64 {
        self.probabilities.sum()
    }

    /// Iterate over all probabilities in order of isotopologue index
    pub fn iter(&self) -> impl ExactSizeIterator<Item = f64> + '_ {
        self.probabilities.iter().copied()
    }

    /// The underlying array
    pub const fn as_array(&self) -> &Array1<f64> {
        &self.probabilities
    }
}

/// Calculates binomial carbon-13 distributions
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IsotopeDistributionCalculator {
    carbon13: f64,
    tail_epsilon: f64,
}

impl Default for IsotopeDistributionCalculator {
    fn default() -> Self {
        Self {
            carbon13: CARBON13_ABUNDANCE,
            tail_epsilon: 1e-6,
        }
    }
}

impl IsotopeDistributionCalculator {
    /// Create a calculator with the given carbon-13 probability and the tail probability that may be folded into
    /// the last retained isotopologue.
    /// # Errors
    /// If the probability is not in `[0, 1]` or the epsilon is not in `(0, 1)`.
    pub fn new(carbon13: f64, tail_epsilon: f64) -> Result<Self, LipidError> {
        if !(0.0..=1.0).contains(&carbon13) {
            return Err(BoxedError::new(
                LipidErrorKind::Config,
                "Invalid carbon-13 abundance",
                format!("The abundance ({carbon13}) has to be a probability within [0, 1]"),
                Context::none(),
            ));
        }
        if !(tail_epsilon > 0.0 && tail_epsilon < 1.0) {
            return Err(BoxedError::new(
                LipidErrorKind::Config,
                "Invalid isotope tail epsilon",
                format!("The tail epsilon ({tail_epsilon}) has to be within (0, 1)"),
                Context::none(),
            ));
        }
        Ok(Self {
            carbon13,
            tail_epsilon,
        })
    }

    /// Take the carbon-13 abundance from the table, or the natural abundance if the table has no carbon entry.
    /// # Errors
    /// See [`Self::new`].
    pub fn from_abundances(
        table: &NaturalAbundanceTable,
        tail_epsilon: f64,
    ) -> Result<Self, LipidError> {
        Self::new(
            table
                .carbon13()
                .map_or(CARBON13_ABUNDANCE, |isotope| isotope.abundance),
            tail_epsilon,
        )
    }

    /// The carbon-13 probability
    pub const fn carbon13(&self) -> f64 {
        self.carbon13
    }

    /// The tail epsilon
    pub const fn tail_epsilon(&self) -> f64 {
        self.tail_epsilon
    }

    /// The full distribution for `n` carbons, with all `n + 1` isotopologues: `P(k) = C(n, k) p^k (1 - p)^(n - k)`.
    ///
    /// The probabilities are built in log space with the recurrence
    /// `ln P(k) = ln P(k - 1) + ln((n - k + 1) / k) + ln(p / (1 - p))` starting from `ln P(0) = n ln(1 - p)`, and
    /// scaled by the most likely isotopologue before leaving log space. So `(1 - p)^n` underflowing for large `n` does
    /// not empty the distribution, the isotopologues far from the mode just become zero.
    pub fn full_distribution(&self, n: usize) -> IsotopeDistribution {
        let p = self.carbon13;
        if n == 0 || p == 0.0 || p == 1.0 {
            let mut probabilities = Array1::zeros(n + 1);
            probabilities[if p == 0.0 { 0 } else { n }] = 1.0;
            return IsotopeDistribution { probabilities };
        }
        let ln_ratio = (p / (1.0 - p)).ln();
        let mut current = n as f64 * (-p).ln_1p();
        let ln_probabilities: Array1<f64> = std::iter::once(current)
            .chain((1..=n).map(|k| {
                current += ((n - k + 1) as f64 / k as f64).ln() + ln_ratio;
                current
            }))
            .collect();
        let mode = ln_probabilities.fold(f64::NEG_INFINITY, |max, v| max.max(*v));
        let mut probabilities = ln_probabilities.mapv(|v| (v - mode).exp());
        let total = probabilities.sum();
        probabilities /= total;
        IsotopeDistribution { probabilities }
    }

    /// The distribution for `n` carbons, truncated at the smallest `K` for which the cumulative probability reaches
    /// `1 - tail_epsilon`. The probability of the removed isotopologues is added to isotopologue `K`.
    pub fn distribution_for(&self, n: usize) -> IsotopeDistribution {
        let full = self.full_distribution(n);
        let mut cumulative = 0.0;
        let last = full
            .iter()
            .position(|probability| {
                cumulative += probability;
                cumulative >= 1.0 - self.tail_epsilon
            })
            .unwrap_or(n);
        let tail: f64 = full.probabilities.slice(s![last + 1..]).sum();
        let mut probabilities = full.probabilities.slice(s![..=last]).to_owned();
        probabilities[last] += tail;
        IsotopeDistribution { probabilities }
    }

    /// The distribution for every identified composition in the dataset. The number of carbons is the carbon count
    /// of the formula (head group included), or the total carbons of the lipid if no formula is known. If multiple
    /// rows share a composition the first row with a formula determines the carbon count.
    pub fn distributions(&self, dataset: &Dataset) -> BTreeMap<LipidName, IsotopeDistribution> {
        let mut carbons: BTreeMap<&LipidName, (usize, bool)> = BTreeMap::new();
        for row in dataset.rows() {
            let Some(name) = row.lipid_name() else {
                continue;
            };
            let from_formula = row
                .formula
                .as_ref()
                .and_then(|f| usize::try_from(f.count("C")).ok());
            let entry = carbons
                .entry(name)
                .or_insert((name.total_carbons() as usize, false));
            if let (Some(count), false) = (from_formula, entry.1) {
                *entry = (count, true);
            }
        }
        log::debug!("Calculating {} isotope distributions", carbons.len());
        carbons
            .into_iter()
            .map(|(name, (n, _))| (name.clone(), self.distribution_for(n)))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use context_error::StaticErrorContent;

    use super::*;
    use crate::{
        chemistry::{IsotopeAbundance, MolecularFormula},
        dataset::{MassRecord, Row},
        lipid::Identification,
    };

    #[test]
    fn twelve_carbons() {
        let calculator = IsotopeDistributionCalculator::default();
        let distribution = calculator.full_distribution(12);
        assert_eq!(distribution.len(), 13);
        assert!((distribution.probability(0) - 0.878_893_2).abs() < 1e-6);
        assert!((distribution.probability(1) - 0.114_070_4).abs() < 1e-6);
        assert!((distribution.probability(2) - 0.006_785_7).abs() < 1e-6);
        assert_eq!(distribution.probability(13), 0.0);
    }

    /// `C(n, k) p^k (1 - p)^(n - k)` with the binomial coefficient as a running product
    fn closed_form(n: usize, k: usize, p: f64) -> f64 {
        let coefficient = (1..=k).fold(1.0, |c, i| c * (n - k + i) as f64 / i as f64);
        coefficient * p.powi(k as i32) * (1.0 - p).powi((n - k) as i32)
    }

    #[test]
    fn matches_closed_form() {
        for p in [0.0107, 0.011, 0.113, 0.5] {
            for n in [1, 2, 11, 12, 13, 14, 15, 36, 37, 60] {
                let distribution = IsotopeDistributionCalculator::new(p, 1e-6)
                    .unwrap()
                    .full_distribution(n);
                assert!((distribution.sum() - 1.0).abs() < 1e-9, "{n} {p}");
                for k in 0..=n {
                    let expected = closed_form(n, k, p);
                    assert!(
                        (distribution.probability(k) - expected).abs() < 1e-12,
                        "{n} {k} {p}"
                    );
                }
            }
        }
    }

    #[test]
    fn large_carbon_counts() {
        let half = IsotopeDistributionCalculator::new(0.5, 1e-6).unwrap();
        let full = half.full_distribution(1200);
        assert!((full.sum() - 1.0).abs() < 1e-9);
        assert_eq!(full.probability(0), 0.0);
        let mode = full
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap()
            .0;
        assert_eq!(mode, 600);
        let truncated = half.distribution_for(1200);
        assert!(truncated.len() < 1201);
        assert!((truncated.sum() - 1.0).abs() < 1e-9);

        let natural = IsotopeDistributionCalculator::default().distribution_for(80_000);
        assert!((natural.sum() - 1.0).abs() < 1e-9);
        assert!(natural.len() < 80_001);
        assert!(natural.probability(856) > 0.01);
    }

    #[test]
    fn truncation() {
        let calculator = IsotopeDistributionCalculator::new(0.0107, 1e-3).unwrap();
        let full = calculator.full_distribution(50);
        let truncated = calculator.distribution_for(50);
        assert!(truncated.len() < full.len());
        assert!((truncated.sum() - 1.0).abs() < 1e-9);
        let kept = truncated.len() - 1;
        let before: f64 = full.iter().take(kept).sum();
        assert!(before < 1.0 - 1e-3);
        assert!(before + full.probability(kept) >= 1.0 - 1e-3);
        for k in 0..kept {
            assert_eq!(truncated.probability(k), full.probability(k));
        }
    }

    #[test]
    fn edge_cases() {
        let calculator = IsotopeDistributionCalculator::default();
        assert_eq!(calculator.distribution_for(0).iter().collect::<Vec<_>>(), vec![1.0]);
        let certain = IsotopeDistributionCalculator::new(1.0, 1e-6).unwrap();
        assert_eq!(certain.full_distribution(3).probability(3), 1.0);
        assert_eq!(certain.distribution_for(3).sum(), 1.0);
        let absent = IsotopeDistributionCalculator::new(0.0, 1e-6).unwrap();
        assert_eq!(absent.distribution_for(300).len(), 1);
        for (p, epsilon) in [(-0.1, 1e-6), (1.1, 1e-6), (0.01, 0.0), (0.01, 1.0)] {
            assert_eq!(
                IsotopeDistributionCalculator::new(p, epsilon)
                    .unwrap_err()
                    .get_kind(),
                LipidErrorKind::Config
            );
        }
    }

    #[test]
    fn from_table() {
        let table = NaturalAbundanceTable::new([(
            "C",
            vec![IsotopeAbundance {
                mass_shift: 1.0,
                abundance: 0.011,
            }],
        )])
        .unwrap();
        let calculator = IsotopeDistributionCalculator::from_abundances(&table, 1e-6).unwrap();
        assert_eq!(calculator.carbon13(), 0.011);
        let empty = NaturalAbundanceTable::default();
        let calculator = IsotopeDistributionCalculator::from_abundances(&empty, 1e-6).unwrap();
        assert_eq!(calculator.carbon13(), CARBON13_ABUNDANCE);
    }

    #[test]
    fn per_composition() {
        let ce: LipidName = "CE|12:0|(12:0)".parse().unwrap();
        let tag: LipidName = "TAG|48:0|".parse().unwrap();
        let mut named = Row::new(0, MassRecord::new("s", 520.34, None, 1.0));
        named.identification = Identification::Named(ce.clone());
        named.formula = Some("C39H68O2".parse::<MolecularFormula>().unwrap());
        let mut bare = Row::new(1, MassRecord::new("s", 806.7, None, 1.0));
        bare.identification = Identification::Named(tag.clone());
        let unknown = Row::new(2, MassRecord::new("s", 100.0, None, 1.0));
        let dataset = Dataset::from_rows(vec![named, bare, unknown]);

        let distributions = IsotopeDistributionCalculator::default().distributions(&dataset);
        assert_eq!(distributions.len(), 2);
        let full = IsotopeDistributionCalculator::default();
        assert_eq!(
            distributions[&ce].probability(0),
            full.full_distribution(39).probability(0)
        );
        assert_eq!(
            distributions[&tag].probability(0),
            full.full_distribution(48).probability(0)
        );
    }
}
