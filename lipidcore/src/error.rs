//! The [`LipidErrorKind`] which makes it easy for downstream users of the error type to match on the exact error.

use context_error::{BoxedError, ErrorKind};
use serde::{Deserialize, Serialize};

/// The error type used throughout this crate
pub type LipidError = BoxedError<'static, LipidErrorKind>;

/// All kinds of errors (and non-fatal warnings) that can be generated while processing a dataset
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum LipidErrorKind {
    /// The configuration or a reference table is invalid, aborts a run before any row is processed
    #[default]
    Config,
    /// No chemistry rule is registered for the lipid group
    UnsupportedGroup,
    /// A formula string could not be tokenised
    MalformedFormula,
    /// A formula contains an element that is missing from the atomic mass table
    UnknownElement,
    /// A lipid name string could not be parsed
    MalformedName,
    /// The chains of a lipid do not add up to its totals, or do not fit the group rule
    InvalidComposition,
    /// Multiple library entries are indistinguishable but disagree on their chemistry
    AmbiguousMatch,
    /// A sample has no usable internal standard
    MissingStandard,
    /// A corrected intensity became negative and was set to zero
    NegativeIntensityClamped,
}

impl LipidErrorKind {
    /// Check if this kind aborts a run, all other kinds are recovered locally and reported as warnings
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Config)
    }
}

impl ErrorKind for LipidErrorKind {
    type Settings = ();
    fn descriptor(&self) -> &'static str {
        if self.is_fatal() { "error" } else { "warning" }
    }
    fn ignored(&self, _settings: Self::Settings) -> bool {
        false
    }
    fn is_error(&self, _settings: Self::Settings) -> bool {
        self.is_fatal()
    }
}

impl std::fmt::Display for LipidErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Config => "ConfigError",
                Self::UnsupportedGroup => "UnsupportedGroupError",
                Self::MalformedFormula => "MalformedFormulaError",
                Self::UnknownElement => "UnknownElementError",
                Self::MalformedName => "MalformedNameError",
                Self::InvalidComposition => "InvalidCompositionError",
                Self::AmbiguousMatch => "AmbiguousMatchError",
                Self::MissingStandard => "MissingStandardError",
                Self::NegativeIntensityClamped => "NegativeIntensityClamped",
            }
        )
    }
}
