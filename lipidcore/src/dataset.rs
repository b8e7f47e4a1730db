//! The datasets that flow through the pipeline, and the warnings generated along the way.

use std::collections::BTreeMap;

use context_error::*;
use serde::{Deserialize, Serialize};

use crate::{
    chemistry::MolecularFormula,
    error::{LipidError, LipidErrorKind},
    lipid::{Identification, LipidName},
    saturation::Saturation,
};

/// A single measurement as delivered by the instrument
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MassRecord {
    /// The sample this measurement belongs to
    pub sample_id: String,
    /// The precursor mass in Dalton
    pub precursor_mass: f64,
    /// The fragment mass in Dalton, if fragmented
    #[serde(default)]
    pub fragment_mass: Option<f64>,
    /// The measured intensity (not negative)
    pub intensity: f64,
}

impl MassRecord {
    /// Create a new record
    pub fn new(
        sample_id: impl Into<String>,
        precursor_mass: f64,
        fragment_mass: Option<f64>,
        intensity: f64,
    ) -> Self {
        Self {
            sample_id: sample_id.into(),
            precursor_mass,
            fragment_mass,
            intensity,
        }
    }

    /// The neutral loss (precursor - fragment), if a fragment is known
    pub fn neutral_loss(&self) -> Option<f64> {
        self.fragment_mass.map(|f| self.precursor_mass - f)
    }
}

/// A record extended with all columns derived by the stages of the pipeline
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Row {
    /// The index of this row in the raw dataset, kept stable over all stages
    pub index: usize,
    /// The measurement
    pub record: MassRecord,
    /// The lipid identity, set by naming
    pub identification: Identification,
    /// The formula of the identified lipid, set by naming
    pub formula: Option<MolecularFormula>,
    /// The monoisotopic mass of the formula, set by naming
    pub monoisotopic_mass: Option<f64>,
    /// If the matched library entry is an internal standard, set by naming
    pub is_internal_standard: bool,
    /// The isotope corrected intensity, set by isotopic correction
    pub corrected_intensity: Option<f64>,
    /// The intensity relative to the internal standard, set by normalisation
    pub normalized_intensity: Option<f64>,
    /// The saturation classification, set by the saturation check
    pub saturation: Option<Saturation>,
}

impl Row {
    /// Create a row with no derived columns
    pub const fn new(index: usize, record: MassRecord) -> Self {
        Self {
            index,
            record,
            identification: Identification::Unknown,
            formula: None,
            monoisotopic_mass: None,
            is_internal_standard: false,
            corrected_intensity: None,
            normalized_intensity: None,
            saturation: None,
        }
    }

    /// The lipid name, if identified
    pub const fn lipid_name(&self) -> Option<&LipidName> {
        self.identification.name()
    }

    /// The corrected intensity, or the raw intensity if no correction took place
    pub fn effective_intensity(&self) -> f64 {
        self.corrected_intensity.unwrap_or(self.record.intensity)
    }
}

/// An ordered set of rows, the value that is passed from stage to stage. A stage never changes its input dataset, it
/// always returns a new one, with the rows in the same relative order.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Dataset {
    rows: Vec<Row>,
}

impl Dataset {
    /// Create a raw dataset, the rows are indexed in the given order
    pub fn from_records(records: impl IntoIterator<Item = MassRecord>) -> Self {
        Self {
            rows: records
                .into_iter()
                .enumerate()
                .map(|(index, record)| Row::new(index, record))
                .collect(),
        }
    }

    /// Create a dataset from already processed rows
    pub const fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// All rows
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Take the rows out
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// The number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if this dataset has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Create a new dataset with only the rows that satisfy the predicate
    #[must_use]
    pub fn retain(&self, mut predicate: impl FnMut(&Row) -> bool) -> Self {
        Self {
            rows: self.rows.iter().filter(|r| predicate(r)).cloned().collect(),
        }
    }

    /// Create a new dataset with every row transformed
    #[must_use]
    pub fn map(&self, f: impl FnMut(&Row) -> Row) -> Self {
        Self {
            rows: self.rows.iter().map(f).collect(),
        }
    }

    /// The positions (in this dataset) of the rows of every sample, samples in order of first occurrence
    pub(crate) fn positions_per_sample(&self) -> Vec<(&str, Vec<usize>)> {
        let mut order: Vec<(&str, Vec<usize>)> = Vec::new();
        let mut lookup: BTreeMap<&str, usize> = BTreeMap::new();
        for (position, row) in self.rows.iter().enumerate() {
            let sample = row.record.sample_id.as_str();
            let slot = *lookup.entry(sample).or_insert_with(|| {
                order.push((sample, Vec::new()));
                order.len() - 1
            });
            order[slot].1.push(position);
        }
        order
    }
}

impl FromIterator<MassRecord> for Dataset {
    fn from_iter<T: IntoIterator<Item = MassRecord>>(iter: T) -> Self {
        Self::from_records(iter)
    }
}

/// A recovered problem, attached to a row (by its raw index) or to the run as a whole
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct Warning {
    /// The raw index of the affected row, `None` for run level warnings
    pub row: Option<usize>,
    /// The kind of problem
    pub kind: LipidErrorKind,
    /// A human readable explanation
    pub message: String,
}

impl Warning {
    /// Create a new warning, every warning is logged as well
    pub fn new(row: Option<usize>, kind: LipidErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match row {
            Some(row) => log::warn!("{kind} on row {row}: {message}"),
            None => log::warn!("{kind}: {message}"),
        }
        Self { row, kind, message }
    }

    /// Create a warning from a recovered error
    pub fn from_error(row: Option<usize>, error: &LipidError) -> Self {
        Self::new(
            row,
            error.get_kind(),
            format!(
                "{}: {}",
                error.get_short_description(),
                error.get_long_description()
            ),
        )
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.row {
            Some(row) => write!(f, "{} (row {row}): {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;

    #[test]
    fn sample_positions() {
        let dataset = Dataset::from_records([
            MassRecord::new("b", 500.0, None, 1.0),
            MassRecord::new("a", 500.0, None, 1.0),
            MassRecord::new("b", 501.0, None, 1.0),
        ]);
        assert_eq!(
            dataset.positions_per_sample(),
            vec![("b", vec![0, 2]), ("a", vec![1])]
        );
        let filtered = dataset.retain(|r| r.record.sample_id == "b");
        assert_eq!(
            filtered.rows().iter().map(|r| r.index).collect::<Vec<_>>(),
            vec![0, 2]
        );
        assert_eq!(dataset.len(), 3);
    }

    #[test]
    fn warning_from_error() {
        let error = "PC|30".parse::<LipidName>().unwrap_err();
        let warning = Warning::from_error(Some(4), &error);
        assert_eq!(warning.kind, LipidErrorKind::MalformedName);
        assert_eq!(warning.row, Some(4));
        assert!(warning.message.starts_with("Invalid lipid name"));
    }
}
