//! All plain configuration values for a run.

use context_error::*;
use serde::{Deserialize, Serialize};

use crate::{
    error::{LipidError, LipidErrorKind},
    filter::{FilterConfig, FilterPolicy},
    library::Tolerance,
    lipid::LipidName,
};

/// The configuration for a full pipeline run. Missing fields in JSON take their default value.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// The noise filter policy
    pub policy: FilterPolicy,
    /// The lowest intensity kept by the absolute noise filter
    pub min_intensity: f64,
    /// The lowest fraction of the precursor group maximum kept by the relative noise filter
    pub relative_fraction: f64,
    /// The tolerance for matching precursor masses
    pub match_tolerance: Tolerance,
    /// The tolerance for matching fragment masses, the precursor tolerance if not set
    pub fragment_tolerance: Option<Tolerance>,
    /// The isotopologue tail probability that is folded into the last retained isotopologue
    pub isotope_tail_epsilon: f64,
    /// The maximal deviation in Dalton from a whole number of carbon-13 shifts for two compositions to overlap
    pub isotope_overlap_tolerance: f64,
    /// The carbon-13 abundance, taken from the natural abundance table if not set
    pub carbon13_abundance: Option<f64>,
    /// The lipid name of the internal standard, if not set the library internal standard flag is used
    pub internal_standard_name: Option<String>,
    /// The known concentration of the internal standard
    pub internal_standard_concentration: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            policy: FilterPolicy::Absolute,
            min_intensity: 0.0,
            relative_fraction: 0.0,
            match_tolerance: Tolerance::new_ppm(10.0),
            fragment_tolerance: None,
            isotope_tail_epsilon: 1e-6,
            isotope_overlap_tolerance: 0.05,
            carbon13_abundance: None,
            internal_standard_name: None,
            internal_standard_concentration: 1.0,
        }
    }
}

fn invalid(field: &str, reason: impl std::fmt::Display) -> LipidError {
    BoxedError::new(
        LipidErrorKind::Config,
        "Invalid configuration",
        format!("The field '{field}' {reason}"),
        Context::none(),
    )
}

impl PipelineConfig {
    /// Parse a configuration from JSON.
    /// # Errors
    /// If the JSON is not a valid configuration, or if the configuration does not pass [`Self::validate`].
    pub fn from_json(text: &str) -> Result<Self, LipidError> {
        let config: Self = serde_json::from_str(text).map_err(|err| {
            BoxedError::new(
                LipidErrorKind::Config,
                "Invalid configuration",
                err.to_string(),
                Context::none(),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check all values.
    /// # Errors
    /// A [`LipidErrorKind::Config`] error for the first invalid value.
    pub fn validate(&self) -> Result<(), LipidError> {
        self.filter_config().validate()?;
        for (field, tolerance) in [
            ("match_tolerance", Some(self.match_tolerance)),
            ("fragment_tolerance", self.fragment_tolerance),
        ] {
            if let Some(tolerance) = tolerance {
                let (Tolerance::Absolute(value) | Tolerance::Relative(value)) = tolerance;
                if !(value.is_finite() && value > 0.0) {
                    return Err(invalid(field, format_args!("({tolerance}) has to be positive")));
                }
            }
        }
        if !(self.isotope_tail_epsilon > 0.0 && self.isotope_tail_epsilon < 1.0) {
            return Err(invalid(
                "isotope_tail_epsilon",
                format_args!("({}) has to be within (0, 1)", self.isotope_tail_epsilon),
            ));
        }
        if !(self.isotope_overlap_tolerance.is_finite() && self.isotope_overlap_tolerance > 0.0) {
            return Err(invalid(
                "isotope_overlap_tolerance",
                format_args!("({}) has to be positive", self.isotope_overlap_tolerance),
            ));
        }
        if let Some(abundance) = self.carbon13_abundance
            && !(0.0..=1.0).contains(&abundance)
        {
            return Err(invalid(
                "carbon13_abundance",
                format_args!("({abundance}) has to be within [0, 1]"),
            ));
        }
        if !(self.internal_standard_concentration.is_finite()
            && self.internal_standard_concentration > 0.0)
        {
            return Err(invalid(
                "internal_standard_concentration",
                format_args!("({}) has to be positive", self.internal_standard_concentration),
            ));
        }
        self.internal_standard()?;
        Ok(())
    }

    /// The settings for the noise filter
    pub const fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            policy: self.policy,
            min_intensity: self.min_intensity,
            relative_fraction: self.relative_fraction,
        }
    }

    /// The fragment tolerance, or the precursor tolerance if not set
    pub fn effective_fragment_tolerance(&self) -> Tolerance {
        self.fragment_tolerance.unwrap_or(self.match_tolerance)
    }

    /// The parsed internal standard name.
    /// # Errors
    /// If the name is not a valid lipid name.
    pub fn internal_standard(&self) -> Result<Option<LipidName>, LipidError> {
        self.internal_standard_name
            .as_deref()
            .map(|name| {
                name.parse::<LipidName>().map_err(|err| {
                    BoxedError::new(
                        LipidErrorKind::Config,
                        "Invalid internal standard name",
                        err.get_long_description().to_string(),
                        Context::show(name.to_string()),
                    )
                })
            })
            .transpose()
    }

    /// Set the noise filter
    #[must_use]
    pub fn filter(self, policy: FilterPolicy, min_intensity: f64, relative_fraction: f64) -> Self {
        Self {
            policy,
            min_intensity,
            relative_fraction,
            ..self
        }
    }

    /// Set the precursor tolerance
    #[must_use]
    pub fn match_tolerance(self, match_tolerance: Tolerance) -> Self {
        Self {
            match_tolerance,
            ..self
        }
    }

    /// Set a separate fragment tolerance
    #[must_use]
    pub fn fragment_tolerance(self, fragment_tolerance: Tolerance) -> Self {
        Self {
            fragment_tolerance: Some(fragment_tolerance),
            ..self
        }
    }

    /// Set the isotope settings
    #[must_use]
    pub fn isotopes(self, tail_epsilon: f64, overlap_tolerance: f64) -> Self {
        Self {
            isotope_tail_epsilon: tail_epsilon,
            isotope_overlap_tolerance: overlap_tolerance,
            ..self
        }
    }

    /// Override the carbon-13 abundance of the natural abundance table
    #[must_use]
    pub fn carbon13_abundance(self, abundance: f64) -> Self {
        Self {
            carbon13_abundance: Some(abundance),
            ..self
        }
    }

    /// Set the internal standard
    #[must_use]
    pub fn internal_standard_name(self, name: Option<String>, concentration: f64) -> Self {
        Self {
            internal_standard_name: name,
            internal_standard_concentration: concentration,
            ..self
        }
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use context_error::StaticErrorContent;

    use super::*;

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_fragment_tolerance(), Tolerance::Relative(10.0));
        let config = config.fragment_tolerance(Tolerance::new_absolute(0.01));
        assert_eq!(config.effective_fragment_tolerance(), Tolerance::Absolute(0.01));
    }

    #[test]
    fn json() {
        let config = PipelineConfig::from_json(
            r#"{"policy": "Combined", "min_intensity": 5.0, "relative_fraction": 0.1,
                "match_tolerance": {"Absolute": 0.02}, "internal_standard_name": "PC|28:0|(14:0~14:0)",
                "internal_standard_concentration": 10.0}"#,
        )
        .unwrap();
        assert_eq!(config.policy, FilterPolicy::Combined);
        assert_eq!(config.match_tolerance, Tolerance::Absolute(0.02));
        assert_eq!(config.isotope_tail_epsilon, 1e-6);
        assert_eq!(
            config.internal_standard().unwrap().map(|n| n.to_string()),
            Some("PC|28:0|(14:0~14:0)".to_string())
        );
        assert!(PipelineConfig::from_json(r#"{"relative_fraction": 2.0}"#).is_err());
        assert!(PipelineConfig::from_json(r#"{"policy": "Sometimes"}"#).is_err());
    }

    #[test]
    fn invalid_values() {
        let base = PipelineConfig::default();
        for config in [
            base.clone().filter(FilterPolicy::Relative, 0.0, -0.5),
            base.clone().filter(FilterPolicy::Absolute, -1.0, 0.0),
            base.clone().match_tolerance(Tolerance::new_ppm(0.0)),
            base.clone().fragment_tolerance(Tolerance::new_absolute(f64::INFINITY)),
            base.clone().isotopes(0.0, 0.05),
            base.clone().isotopes(1e-6, -0.05),
            base.clone().carbon13_abundance(1.5),
            base.clone().internal_standard_name(None, 0.0),
            base.clone().internal_standard_name(Some("PC 28:0".to_string()), 1.0),
        ] {
            let error = config.validate().unwrap_err();
            assert_eq!(error.get_kind(), LipidErrorKind::Config, "{config:?}");
        }
    }
}
