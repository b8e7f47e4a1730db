//! Remove background noise from a dataset.

use std::collections::HashMap;

use context_error::*;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::{
    dataset::{Dataset, Row},
    error::{LipidError, LipidErrorKind},
    helper_functions::{mass_key, pair_key},
};

/// Which rows are considered noise
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum FilterPolicy {
    /// Drop rows with an intensity below `min_intensity`
    #[default]
    Absolute,
    /// Drop rows with an intensity below `relative_fraction` times the most intense row of its precursor group
    Relative,
    /// A row has to pass both the absolute and the relative test
    Combined,
}

/// The settings for the noise filter
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct FilterConfig {
    /// The policy
    pub policy: FilterPolicy,
    /// The lowest allowed intensity for the absolute test
    pub min_intensity: f64,
    /// The lowest allowed fraction of the group maximum for the relative test, in `[0, 1]`
    pub relative_fraction: f64,
}

impl FilterConfig {
    /// Check the configuration.
    /// # Errors
    /// If `relative_fraction` is not in `[0, 1]` or if `min_intensity` is negative or not finite.
    pub fn validate(&self) -> Result<(), LipidError> {
        if !(0.0..=1.0).contains(&self.relative_fraction) {
            return Err(config_error(format!(
                "The relative fraction ({}) has to be within [0, 1]",
                self.relative_fraction
            )));
        }
        if !self.min_intensity.is_finite() || self.min_intensity < 0.0 {
            return Err(config_error(format!(
                "The minimal intensity ({}) has to be a finite number that is not negative",
                self.min_intensity
            )));
        }
        Ok(())
    }
}

fn config_error(reason: String) -> LipidError {
    BoxedError::new(
        LipidErrorKind::Config,
        "Invalid filter configuration",
        reason,
        Context::none(),
    )
}

/// Removes low intensity rows. All operations return a new dataset with the surviving rows in their original
/// relative order, a group that is entirely filtered just yields no rows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoiseFilter {
    config: FilterConfig,
}

impl NoiseFilter {
    /// Create a new filter.
    /// # Errors
    /// If the configuration is invalid, see [`FilterConfig::validate`].
    pub fn new(config: FilterConfig) -> Result<Self, LipidError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration of this filter
    pub const fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Remove all rows that do not pass the configured policy
    pub fn filter(&self, dataset: &Dataset) -> Dataset {
        let absolute = |row: &Row| row.record.intensity >= self.config.min_intensity;
        let result = match self.config.policy {
            FilterPolicy::Absolute => dataset.retain(absolute),
            FilterPolicy::Relative => {
                let maxima = group_maxima(dataset);
                dataset.retain(|row| self.passes_relative(row, &maxima))
            }
            FilterPolicy::Combined => {
                let maxima = group_maxima(dataset);
                dataset.retain(|row| absolute(row) && self.passes_relative(row, &maxima))
            }
        };
        log::debug!(
            "Noise filter ({:?}) kept {} of {} rows",
            self.config.policy,
            result.len(),
            dataset.len()
        );
        result
    }

    fn passes_relative(&self, row: &Row, maxima: &HashMap<(&str, OrderedFloat<f64>), f64>) -> bool {
        let max = maxima
            .get(&(
                row.record.sample_id.as_str(),
                mass_key(row.record.precursor_mass),
            ))
            .copied()
            .unwrap_or(0.0);
        row.record.intensity >= self.config.relative_fraction * max
    }

    /// Keep only rows with a neutral loss (precursor - fragment) of at least the threshold, rows without a fragment
    /// mass are removed
    pub fn neutral_loss(dataset: &Dataset, threshold: f64) -> Dataset {
        dataset.retain(|row| row.record.neutral_loss().is_some_and(|nl| nl >= threshold))
    }

    /// Remove all rows with a neutral loss inside any of the given inclusive windows (child peaks), rows without a
    /// fragment mass are kept
    pub fn exclude_neutral_loss_windows(dataset: &Dataset, windows: &[(f64, f64)]) -> Dataset {
        dataset.retain(|row| {
            row.record.neutral_loss().is_none_or(|nl| {
                !windows
                    .iter()
                    .any(|(a, b)| (a.min(*b)..=a.max(*b)).contains(&nl))
            })
        })
    }

    /// Replace every intensity below the threshold by the given value, or by the threshold itself if no value is given
    pub fn set_baseline(dataset: &Dataset, threshold: f64, value: Option<f64>) -> Dataset {
        let value = value.unwrap_or(threshold);
        dataset.map(|row| {
            let mut row = row.clone();
            if row.record.intensity < threshold {
                row.record.intensity = value;
            }
            row
        })
    }

    /// Keep the mass pairs whose mean intensity over all samples is at least the threshold
    pub fn low_average(dataset: &Dataset, threshold: f64) -> Dataset {
        let statistics = pair_statistics(dataset, |_| false);
        dataset.retain(|row| {
            statistics
                .get(&pair_key(row.record.precursor_mass, row.record.fragment_mass))
                .is_some_and(|s| s.mean() >= threshold)
        })
    }

    /// Keep the mass pairs that pass the average test or the maximum test (or both)
    pub fn average_or_max(dataset: &Dataset, average_threshold: f64, max_threshold: f64) -> Dataset {
        let statistics = pair_statistics(dataset, |_| false);
        dataset.retain(|row| {
            statistics
                .get(&pair_key(row.record.precursor_mass, row.record.fragment_mass))
                .is_some_and(|s| s.mean() >= average_threshold || s.max >= max_threshold)
        })
    }

    /// Keep the mass pairs where at least the `quantile` fraction of measurements is at or above the threshold.
    /// # Errors
    /// If the quantile is not in `[0, 1]`.
    pub fn quantile(dataset: &Dataset, quantile: f64, threshold: f64) -> Result<Dataset, LipidError> {
        if !(0.0..=1.0).contains(&quantile) {
            return Err(config_error(format!(
                "The quantile ({quantile}) has to be within [0, 1]"
            )));
        }
        let statistics = pair_statistics(dataset, |intensity| intensity >= threshold);
        Ok(dataset.retain(|row| {
            statistics
                .get(&pair_key(row.record.precursor_mass, row.record.fragment_mass))
                .is_some_and(|s| s.passing as f64 / s.count as f64 >= quantile)
        }))
    }
}

/// The maximal intensity per (sample, precursor) group
fn group_maxima(dataset: &Dataset) -> HashMap<(&str, OrderedFloat<f64>), f64> {
    let mut maxima = HashMap::new();
    for row in dataset.rows() {
        let max = maxima
            .entry((
                row.record.sample_id.as_str(),
                mass_key(row.record.precursor_mass),
            ))
            .or_insert(f64::NEG_INFINITY);
        *max = row.record.intensity.max(*max);
    }
    maxima
}

#[derive(Clone, Copy, Debug, Default)]
struct PairStatistics {
    count: usize,
    sum: f64,
    max: f64,
    passing: usize,
}

impl PairStatistics {
    fn mean(self) -> f64 {
        self.sum / self.count as f64
    }
}

type PairKey = (OrderedFloat<f64>, Option<OrderedFloat<f64>>);

/// Gather statistics for every mass pair over all samples
fn pair_statistics(
    dataset: &Dataset,
    passes: impl Fn(f64) -> bool,
) -> HashMap<PairKey, PairStatistics> {
    let mut statistics: HashMap<PairKey, PairStatistics> = HashMap::new();
    for row in dataset.rows() {
        let entry = statistics
            .entry(pair_key(row.record.precursor_mass, row.record.fragment_mass))
            .or_insert(PairStatistics {
                max: f64::NEG_INFINITY,
                ..PairStatistics::default()
            });
        entry.count += 1;
        entry.sum += row.record.intensity;
        entry.max = entry.max.max(row.record.intensity);
        if passes(row.record.intensity) {
            entry.passing += 1;
        }
    }
    statistics
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use context_error::StaticErrorContent;

    use super::*;
    use crate::dataset::MassRecord;

    fn dataset() -> Dataset {
        Dataset::from_records([
            MassRecord::new("s1", 500.0, Some(300.0), 100.0),
            MassRecord::new("s1", 500.0, Some(250.0), 5.0),
            MassRecord::new("s1", 600.0, Some(300.0), 8.0),
            MassRecord::new("s2", 500.0, Some(300.0), 40.0),
            MassRecord::new("s2", 500.0, Some(250.0), 30.0),
        ])
    }

    fn indices(dataset: &Dataset) -> Vec<usize> {
        dataset.rows().iter().map(|r| r.index).collect()
    }

    fn filter(policy: FilterPolicy, min_intensity: f64, relative_fraction: f64) -> NoiseFilter {
        NoiseFilter::new(FilterConfig {
            policy,
            min_intensity,
            relative_fraction,
        })
        .unwrap()
    }

    #[test]
    fn absolute() {
        let result = filter(FilterPolicy::Absolute, 10.0, 0.0).filter(&dataset());
        assert_eq!(indices(&result), vec![0, 3, 4]);
    }

    #[test]
    fn relative() {
        let result = filter(FilterPolicy::Relative, 0.0, 0.5).filter(&dataset());
        // The lone 600 Da row is the maximum of its own group
        assert_eq!(indices(&result), vec![0, 2, 3, 4]);
    }

    #[test]
    fn combined() {
        let result = filter(FilterPolicy::Combined, 10.0, 0.5).filter(&dataset());
        assert_eq!(indices(&result), vec![0, 3, 4]);
        let result = filter(FilterPolicy::Combined, 1000.0, 0.5).filter(&dataset());
        assert!(result.is_empty());
    }

    #[test]
    fn idempotent() {
        let noise = filter(FilterPolicy::Combined, 6.0, 0.3);
        let once = noise.filter(&dataset());
        assert_eq!(noise.filter(&once), once);
    }

    #[test]
    fn invalid_config() {
        for (min, fraction) in [(-1.0, 0.5), (0.0, 1.5), (0.0, -0.1), (f64::NAN, 0.5)] {
            let error = NoiseFilter::new(FilterConfig {
                policy: FilterPolicy::Relative,
                min_intensity: min,
                relative_fraction: fraction,
            })
            .unwrap_err();
            assert_eq!(error.get_kind(), LipidErrorKind::Config);
        }
    }

    #[test]
    fn neutral_loss_filters() {
        assert_eq!(
            indices(&NoiseFilter::neutral_loss(&dataset(), 250.0)),
            vec![1, 2, 4]
        );
        assert_eq!(
            indices(&NoiseFilter::exclude_neutral_loss_windows(
                &dataset(),
                &[(190.0, 210.0), (310.0, 290.0)]
            )),
            vec![1, 4]
        );
    }

    #[test]
    fn baseline() {
        let result = NoiseFilter::set_baseline(&dataset(), 10.0, None);
        assert_eq!(result.rows()[1].record.intensity, 10.0);
        assert_eq!(result.rows()[0].record.intensity, 100.0);
        let result = NoiseFilter::set_baseline(&dataset(), 10.0, Some(0.0));
        assert_eq!(result.rows()[2].record.intensity, 0.0);
    }

    #[test]
    fn pair_filters() {
        // (500, 300): mean 70, max 100; (500, 250): mean 17.5, max 30; (600, 300): 8
        assert_eq!(
            indices(&NoiseFilter::low_average(&dataset(), 20.0)),
            vec![0, 3]
        );
        assert_eq!(
            indices(&NoiseFilter::average_or_max(&dataset(), 50.0, 25.0)),
            vec![0, 1, 3, 4]
        );
        assert_eq!(
            indices(&NoiseFilter::quantile(&dataset(), 0.5, 30.0).unwrap()),
            vec![0, 1, 3, 4]
        );
        assert_eq!(
            indices(&NoiseFilter::quantile(&dataset(), 1.0, 30.0).unwrap()),
            vec![0, 3]
        );
        assert!(NoiseFilter::quantile(&dataset(), 1.2, 30.0).is_err());
    }
}
