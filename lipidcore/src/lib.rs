#![doc = include_str!("../README.md")]

mod helper_functions;

/// Contains all things related to the underlying chemistry: formulas, element masses, isotope abundances and the
/// formula construction rules per lipid group.
pub mod chemistry;
pub mod config;
pub mod correction;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod isotopes;
/// Contains the reference library and the tolerances used to match against it.
pub mod library;
pub mod lipid;
pub mod namer;
pub mod normalization;
pub mod pipeline;
pub mod saturation;

/// A subset of the types and traits that are envisioned to be used the most, importing this is a good starting point for working with the crate
pub mod prelude {
    pub use crate::chemistry::{
        AtomicMassTable, ChemistryRule, ChemistryRuleTable, MolecularFormula,
        NaturalAbundanceTable,
    };
    pub use crate::config::PipelineConfig;
    pub use crate::correction::IsotopicCorrector;
    pub use crate::dataset::{Dataset, MassRecord, Row, Warning};
    pub use crate::error::{LipidError, LipidErrorKind};
    pub use crate::filter::{FilterConfig, FilterPolicy, NoiseFilter};
    pub use crate::isotopes::{IsotopeDistribution, IsotopeDistributionCalculator};
    pub use crate::library::{LibraryEntry, MassLibrary, Tolerance};
    pub use crate::lipid::{Chain, Identification, LipidName};
    pub use crate::molecular_formula;
    pub use crate::namer::LipidNamer;
    pub use crate::normalization::Normalizer;
    pub use crate::pipeline::{Pipeline, PipelineOutput, ReferenceTables};
    pub use crate::saturation::{Saturation, SaturationChecker};
}
