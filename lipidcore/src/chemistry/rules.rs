use std::collections::BTreeMap;

use context_error::*;
use serde::{Deserialize, Serialize};

use crate::{
    chemistry::MolecularFormula,
    error::{LipidError, LipidErrorKind},
    lipid::LipidName,
    molecular_formula,
};

/// How to construct the formula of a lipid of a certain group.
///
/// The formula is `base + Σ_chains (C_c H_(2c - 2d + chain_hydrogen) + chain_extra)`. Because this is linear in the
/// chain composition it can be evaluated on the totals, so lipids with unresolved chains get a formula as well.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ChemistryRule {
    /// The head group and backbone
    pub base: MolecularFormula,
    /// The number of chains a lipid of this group has
    pub chain_count: u32,
    /// The hydrogen offset per chain, -1 for an acyl chain bound by an ester
    pub chain_hydrogen: i32,
    /// Any additional atoms per chain, oxygen for an acyl chain
    #[serde(default)]
    pub chain_extra: MolecularFormula,
}

impl ChemistryRule {
    /// A rule for a lipid with the given number of ester bound acyl chains (`C_c H_(2c-2d-1) O` per chain)
    pub fn acyl_ester(base: MolecularFormula, chain_count: u32) -> Self {
        Self {
            base,
            chain_count,
            chain_hydrogen: -1,
            chain_extra: molecular_formula!(O 1),
        }
    }

    /// Build the formula for the given lipid.
    /// # Errors
    /// If the chains are resolved but their number does not match `chain_count`.
    /// Or if the composition results in a negative number of atoms, or in more atoms than fit in the formula.
    pub fn formula(&self, name: &LipidName) -> Result<MolecularFormula, LipidError> {
        if !name.chains().is_empty() && name.chains().len() != self.chain_count as usize {
            return Err(BoxedError::new(
                LipidErrorKind::InvalidComposition,
                "Invalid lipid composition",
                format!(
                    "A {} lipid has {} chains but {} chains are given",
                    name.group(),
                    self.chain_count,
                    name.chains().len()
                ),
                Context::show(name.to_string()),
            ));
        }
        let (carbons, double_bonds) = (
            i64::from(name.total_carbons()),
            i64::from(name.total_double_bonds()),
        );
        let formula = i64::from(self.chain_hydrogen)
            .checked_mul(i64::from(self.chain_count))
            .and_then(|hydrogen| hydrogen.checked_add(2 * (carbons - double_bonds)))
            .and_then(|hydrogen| {
                let chains = self
                    .chain_extra
                    .checked_mul(i32::try_from(self.chain_count).ok()?)?;
                let mut formula = self.base.checked_add(&chains)?;
                formula.add_element("C", i32::try_from(carbons).ok()?)?;
                formula.add_element("H", i32::try_from(hydrogen).ok()?)?;
                Some(formula)
            })
            .ok_or_else(|| too_large(name))?;
        if formula.contains_negative_amount() {
            return Err(BoxedError::new(
                LipidErrorKind::InvalidComposition,
                "Invalid lipid composition",
                format!(
                    "The composition results in an impossible formula ({formula}), there are too many double bonds for the number of carbons"
                ),
                Context::show(name.to_string()),
            ));
        }
        Ok(formula)
    }
}

fn too_large(name: &LipidName) -> LipidError {
    BoxedError::new(
        LipidErrorKind::InvalidComposition,
        "Invalid lipid composition",
        "The composition is too big to build a formula",
        Context::show(name.to_string()),
    )
}

/// The formula construction rule for every known lipid group
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChemistryRuleTable {
    rules: BTreeMap<String, ChemistryRule>,
}

impl ChemistryRuleTable {
    /// Create a table from (group, rule) pairs
    pub fn new(rules: impl IntoIterator<Item = (impl Into<String>, ChemistryRule)>) -> Self {
        Self {
            rules: rules.into_iter().map(|(g, r)| (g.into(), r)).collect(),
        }
    }

    /// Parse a table from JSON like `{"TAG": {"base": "C3H5O3", "chain_count": 3, "chain_hydrogen": -1, "chain_extra": "O"}}`.
    /// # Errors
    /// If the JSON is not a valid table.
    pub fn from_json(text: &str) -> Result<Self, LipidError> {
        serde_json::from_str(text).map_err(|err| {
            BoxedError::new(
                LipidErrorKind::Config,
                "Invalid chemistry rule table",
                err.to_string(),
                Context::none(),
            )
        })
    }

    /// The neutral forms of the common glycerolipids, glycerophospholipids, free fatty acids and cholesteryl esters
    pub fn common_lipids() -> Self {
        Self::new([
            ("FFA", ChemistryRule::acyl_ester(molecular_formula!(H 1 O 1), 1)),
            ("CE", ChemistryRule::acyl_ester(molecular_formula!(C 27 H 45 O 1), 1)),
            ("MAG", ChemistryRule::acyl_ester(molecular_formula!(C 3 H 7 O 3), 1)),
            ("DAG", ChemistryRule::acyl_ester(molecular_formula!(C 3 H 6 O 3), 2)),
            ("TAG", ChemistryRule::acyl_ester(molecular_formula!(C 3 H 5 O 3), 3)),
            ("LPC", ChemistryRule::acyl_ester(molecular_formula!(C 8 H 19 N 1 O 6 P 1), 1)),
            ("LPE", ChemistryRule::acyl_ester(molecular_formula!(C 5 H 13 N 1 O 6 P 1), 1)),
            ("PC", ChemistryRule::acyl_ester(molecular_formula!(C 8 H 18 N 1 O 6 P 1), 2)),
            ("PE", ChemistryRule::acyl_ester(molecular_formula!(C 5 H 12 N 1 O 6 P 1), 2)),
            ("PG", ChemistryRule::acyl_ester(molecular_formula!(C 6 H 13 O 8 P 1), 2)),
            ("PI", ChemistryRule::acyl_ester(molecular_formula!(C 9 H 17 O 11 P 1), 2)),
            ("PS", ChemistryRule::acyl_ester(molecular_formula!(C 6 H 12 N 1 O 8 P 1), 2)),
        ])
    }

    /// Get the rule for a group
    pub fn rule(&self, group: &str) -> Option<&ChemistryRule> {
        self.rules.get(group)
    }

    /// All groups with a rule
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use context_error::StaticErrorContent;

    use super::*;
    use crate::lipid::Chain;

    #[test]
    fn known_formulas() {
        let rules = ChemistryRuleTable::common_lipids();
        for (name, formula) in [
            ("PC|32:0|(16:0~16:0)", "C40H80NO8P"),
            ("PE|32:0|(16:0~16:0)", "C37H74NO8P"),
            ("TAG|48:0|", "C51H98O6"),
            ("DAG|32:0|(16:0~16:0)", "C35H68O5"),
            ("FFA|16:0|(16:0)", "C16H32O2"),
            ("LPC|16:0|(16:0)", "C24H50NO7P"),
            ("CE|12:0|(12:0)", "C39H68O2"),
            ("PI|38:4|(18:0~20:4)", "C47H83O13P"),
            ("PS|36:1|(18:0~18:1)", "C42H80NO10P"),
        ] {
            let name: LipidName = name.parse().unwrap();
            let built = rules.rule(name.group()).unwrap().formula(&name).unwrap();
            assert_eq!(built.hill_notation(), formula, "{name}");
        }
    }

    #[test]
    fn chain_count_checked() {
        let rules = ChemistryRuleTable::common_lipids();
        let name = LipidName::from_chains("PC", [Chain::new(16, 0)]);
        let error = rules.rule("PC").unwrap().formula(&name).unwrap_err();
        assert_eq!(error.get_kind(), LipidErrorKind::InvalidComposition);
        let name = LipidName::new("FFA", 2, 3);
        let error = rules.rule("FFA").unwrap().formula(&name).unwrap_err();
        assert_eq!(error.get_kind(), LipidErrorKind::InvalidComposition);
    }

    #[test]
    fn oversized_composition() {
        let rules = ChemistryRuleTable::common_lipids();
        let error = rules
            .rule("TAG")
            .unwrap()
            .formula(&LipidName::new("TAG", u32::MAX, 0))
            .unwrap_err();
        assert_eq!(error.get_kind(), LipidErrorKind::InvalidComposition);

        let huge = ChemistryRuleTable::from_json(
            r#"{"XL": {"base": "C3H5O3", "chain_count": 2000000000, "chain_hydrogen": -2147483648, "chain_extra": "O2"}}"#,
        )
        .unwrap();
        let error = huge
            .rule("XL")
            .unwrap()
            .formula(&LipidName::new("XL", 10, 0))
            .unwrap_err();
        assert_eq!(error.get_kind(), LipidErrorKind::InvalidComposition);
    }

    #[test]
    fn json_rules() {
        let rules = ChemistryRuleTable::from_json(
            r#"{"TAG": {"base": "C3H5O3", "chain_count": 3, "chain_hydrogen": -1, "chain_extra": "O"}}"#,
        )
        .unwrap();
        assert_eq!(
            rules.rule("TAG"),
            ChemistryRuleTable::common_lipids().rule("TAG")
        );
        assert!(ChemistryRuleTable::from_json(r#"{"TAG": {"base": "C3(H5"}}"#).is_err());
    }
}
