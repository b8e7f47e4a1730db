//! Run all stages in order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    chemistry::{AtomicMassTable, ChemistryRuleTable, NaturalAbundanceTable},
    config::PipelineConfig,
    correction::IsotopicCorrector,
    dataset::{Dataset, Warning},
    error::LipidError,
    filter::NoiseFilter,
    isotopes::{IsotopeDistribution, IsotopeDistributionCalculator},
    library::MassLibrary,
    lipid::LipidName,
    namer::LipidNamer,
    normalization::Normalizer,
    saturation::SaturationChecker,
};

/// The reference data for a run, only read by the stages
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReferenceTables {
    /// The library of known mass pairs
    pub library: MassLibrary,
    /// The monoisotopic element masses
    pub masses: AtomicMassTable,
    /// The natural isotope abundances, only carbon is used
    pub abundances: NaturalAbundanceTable,
    /// The formula construction rules per lipid group
    pub rules: ChemistryRuleTable,
}

impl ReferenceTables {
    /// Use the given library with the built in mass, abundance, and chemistry tables
    pub fn new(library: MassLibrary) -> Self {
        Self {
            library,
            masses: AtomicMassTable::monoisotopic(),
            abundances: NaturalAbundanceTable::natural(),
            rules: ChemistryRuleTable::common_lipids(),
        }
    }
}

/// The result of a run: the best effort dataset and all recovered problems
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PipelineOutput {
    /// The processed rows, in the same relative order as the input
    pub dataset: Dataset,
    /// The warnings of all stages, in stage order
    pub warnings: Vec<Warning>,
}

/// The full processing chain: noise filter, naming, isotope distributions, isotopic correction, normalisation, and
/// saturation. Every stage returns a new dataset, so every intermediate dataset is a valid input for the next stage.
#[derive(Clone, Debug)]
pub struct Pipeline {
    tables: ReferenceTables,
    config: PipelineConfig,
    filter: NoiseFilter,
    calculator: IsotopeDistributionCalculator,
    corrector: IsotopicCorrector,
    normalizer: Normalizer,
}

impl Pipeline {
    /// Set up a pipeline, all configuration is checked here so a run cannot fail.
    /// # Errors
    /// A [`crate::error::LipidErrorKind::Config`] error if the configuration is invalid.
    pub fn new(tables: ReferenceTables, config: PipelineConfig) -> Result<Self, LipidError> {
        config.validate()?;
        let filter = NoiseFilter::new(config.filter_config())?;
        let calculator = match config.carbon13_abundance {
            Some(abundance) => IsotopeDistributionCalculator::new(abundance, config.isotope_tail_epsilon),
            None => IsotopeDistributionCalculator::from_abundances(
                &tables.abundances,
                config.isotope_tail_epsilon,
            ),
        }?;
        let corrector = IsotopicCorrector::new(config.isotope_overlap_tolerance)?;
        let normalizer = Normalizer::new(
            config.internal_standard()?,
            config.internal_standard_concentration,
        )?;
        Ok(Self {
            tables,
            config,
            filter,
            calculator,
            corrector,
            normalizer,
        })
    }

    /// The configuration
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The reference tables
    pub const fn tables(&self) -> &ReferenceTables {
        &self.tables
    }

    /// The noise filter stage
    pub const fn noise_filter(&self) -> &NoiseFilter {
        &self.filter
    }

    /// The naming stage
    pub fn namer(&self) -> LipidNamer<'_> {
        LipidNamer::new(
            &self.tables.library,
            &self.tables.masses,
            &self.tables.rules,
            self.config.match_tolerance,
        )
        .fragment_tolerance(self.config.effective_fragment_tolerance())
    }

    /// The isotope distribution stage
    pub const fn isotope_calculator(&self) -> &IsotopeDistributionCalculator {
        &self.calculator
    }

    /// The isotopic correction stage
    pub const fn corrector(&self) -> &IsotopicCorrector {
        &self.corrector
    }

    /// The normalisation stage
    pub const fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Run all stages on a raw dataset. The input is not changed.
    pub fn run(&self, dataset: &Dataset) -> PipelineOutput {
        log::info!("Processing {} rows", dataset.len());
        let mut warnings = Vec::new();

        let filtered = self.filter.filter(dataset);
        let (named, naming_warnings) = self.namer().name(&filtered);
        warnings.extend(naming_warnings);
        let distributions: BTreeMap<LipidName, IsotopeDistribution> =
            self.calculator.distributions(&named);
        let (corrected, correction_warnings) = self.corrector.correct(&named, &distributions);
        warnings.extend(correction_warnings);
        let (normalized, normalization_warnings) = self.normalizer.normalize(&corrected);
        warnings.extend(normalization_warnings);
        let output = SaturationChecker::check(&normalized);

        log::info!(
            "Processed {} rows, {} passed the noise filter, {} warnings",
            dataset.len(),
            output.len(),
            warnings.len()
        );
        PipelineOutput {
            dataset: output,
            warnings,
        }
    }
}
