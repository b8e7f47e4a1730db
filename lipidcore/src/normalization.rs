//! Scale intensities to the internal standard of each sample.

use context_error::*;

use crate::{
    dataset::{Dataset, Row, Warning},
    error::{LipidError, LipidErrorKind},
    lipid::LipidName,
};

/// Normalises intensities against a known concentration of an internal standard
#[derive(Clone, Debug, PartialEq)]
pub struct Normalizer {
    internal_standard: Option<LipidName>,
    concentration: f64,
}

impl Normalizer {
    /// Create a new normaliser. If a standard name is given the rows identified as that lipid are the standard,
    /// otherwise the rows that matched a library entry marked as internal standard.
    /// # Errors
    /// If the concentration is not a finite positive number.
    pub fn new(internal_standard: Option<LipidName>, concentration: f64) -> Result<Self, LipidError> {
        if !(concentration.is_finite() && concentration > 0.0) {
            return Err(BoxedError::new(
                LipidErrorKind::Config,
                "Invalid internal standard concentration",
                format!("The concentration ({concentration}) has to be a finite positive number"),
                Context::none(),
            ));
        }
        Ok(Self {
            internal_standard,
            concentration,
        })
    }

    fn is_standard(&self, row: &Row) -> bool {
        self.internal_standard.as_ref().map_or(row.is_internal_standard, |standard| {
            row.lipid_name() == Some(standard)
        })
    }

    /// Add the normalised intensity: `corrected_intensity / IS_observed * concentration`, where `IS_observed` is the
    /// summed corrected intensity of the standard rows in the same sample. Samples without a standard (or with a
    /// standard with zero intensity) keep no normalised intensity and every row gets a
    /// [`LipidErrorKind::MissingStandard`] warning.
    pub fn normalize(&self, dataset: &Dataset) -> (Dataset, Vec<Warning>) {
        let mut standards: Vec<Option<f64>> = vec![None; dataset.len()];
        let mut warnings = Vec::new();
        for (sample, positions) in dataset.positions_per_sample() {
            let standard: f64 = positions
                .iter()
                .map(|p| &dataset.rows()[*p])
                .filter(|row| self.is_standard(row))
                .map(Row::effective_intensity)
                .sum();
            if standard > 0.0 {
                for position in positions {
                    standards[position] = Some(standard);
                }
            } else {
                let message = format!("Sample '{sample}' has no internal standard signal");
                warnings.extend(positions.iter().map(|p| {
                    Warning::new(
                        Some(dataset.rows()[*p].index),
                        LipidErrorKind::MissingStandard,
                        message.clone(),
                    )
                }));
            }
        }
        log::debug!(
            "Normalised {} of {} rows",
            standards.iter().filter(|s| s.is_some()).count(),
            dataset.len()
        );
        let output = Dataset::from_rows(
            dataset
                .rows()
                .iter()
                .zip(standards)
                .map(|(row, standard)| Row {
                    normalized_intensity: standard
                        .map(|s| row.effective_intensity() / s * self.concentration),
                    ..row.clone()
                })
                .collect(),
        );
        (output, warnings)
    }
}
