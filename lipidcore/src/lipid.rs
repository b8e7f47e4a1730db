//! Lipid names: a group tag with the total composition and optionally the resolved chains.

use std::{
    cmp::Reverse,
    fmt::{Display, Write},
    str::FromStr,
    sync::LazyLock,
};

use context_error::*;
use itertools::Itertools;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    error::{LipidError, LipidErrorKind},
    helper_functions::explain_number_error,
};

/// A fatty acyl chain, defined by its number of carbons and double bonds
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Chain {
    /// The number of carbon atoms
    pub carbons: u32,
    /// The number of double bonds
    pub double_bonds: u32,
}

impl Chain {
    /// Create a new chain
    pub const fn new(carbons: u32, double_bonds: u32) -> Self {
        Self {
            carbons,
            double_bonds,
        }
    }

    /// A chain is saturated if it has no double bonds
    pub const fn is_saturated(self) -> bool {
        self.double_bonds == 0
    }
}

impl Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.carbons, self.double_bonds)
    }
}

/// The composition of a lipid species. The canonical string form is `GROUP|total_cbs:total_dbs|(c1:d1~c2:d2~…)`,
/// or `GROUP|total_cbs:total_dbs|` if the chains are unresolved.
///
/// The chains are always stored in canonical order: descending carbons, then descending double bonds, so the same
/// composition always has the same representation. If chains are present they always sum to the totals.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct LipidName {
    group: String,
    total_carbons: u32,
    total_double_bonds: u32,
    chains: Vec<Chain>,
}

impl LipidName {
    /// Create a lipid name with only the totals known
    pub fn new(group: impl Into<String>, total_carbons: u32, total_double_bonds: u32) -> Self {
        Self {
            group: group.into(),
            total_carbons,
            total_double_bonds,
            chains: Vec::new(),
        }
    }

    /// Create a lipid name from its chains, the totals are the sums over the chains
    pub fn from_chains(group: impl Into<String>, chains: impl IntoIterator<Item = Chain>) -> Self {
        let chains = canonical_order(chains);
        Self {
            group: group.into(),
            total_carbons: chains.iter().map(|c| c.carbons).sum(),
            total_double_bonds: chains.iter().map(|c| c.double_bonds).sum(),
            chains,
        }
    }

    /// Create a lipid name with the given totals and chains.
    /// # Errors
    /// If the chains are not empty and do not sum to the totals.
    pub fn with_chains(
        group: impl Into<String>,
        total_carbons: u32,
        total_double_bonds: u32,
        chains: impl IntoIterator<Item = Chain>,
    ) -> Result<Self, LipidError> {
        let name = Self {
            group: group.into(),
            total_carbons,
            total_double_bonds,
            chains: canonical_order(chains),
        };
        if name.chains.is_empty() {
            return Ok(name);
        }
        let carbons: u32 = name.chains.iter().map(|c| c.carbons).sum();
        let double_bonds: u32 = name.chains.iter().map(|c| c.double_bonds).sum();
        if carbons == total_carbons && double_bonds == total_double_bonds {
            Ok(name)
        } else {
            Err(BoxedError::new(
                LipidErrorKind::InvalidComposition,
                "Invalid lipid composition",
                format!(
                    "The chains sum to {carbons}:{double_bonds} while the total is {total_carbons}:{total_double_bonds}"
                ),
                Context::show(name.to_string()),
            ))
        }
    }

    /// The lipid group, e.g. `TAG` or `PC`
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The total number of carbons over all chains
    pub const fn total_carbons(&self) -> u32 {
        self.total_carbons
    }

    /// The total number of double bonds over all chains
    pub const fn total_double_bonds(&self) -> u32 {
        self.total_double_bonds
    }

    /// The resolved chains in canonical order, empty if unresolved
    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    /// The canonical string form
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

/// Stable sort on descending carbons then descending double bonds, ties keep their input order
fn canonical_order(chains: impl IntoIterator<Item = Chain>) -> Vec<Chain> {
    chains
        .into_iter()
        .sorted_by_key(|c| (Reverse(c.carbons), Reverse(c.double_bonds)))
        .collect()
}

impl Display for LipidName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}|{}:{}|",
            self.group, self.total_carbons, self.total_double_bonds
        )?;
        if !self.chains.is_empty() {
            f.write_char('(')?;
            write!(f, "{}", self.chains.iter().join("~"))?;
            f.write_char(')')?;
        }
        Ok(())
    }
}

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9_\-]+)\|(\d+):(\d+)\|(?:\(([^()]*)\))?(?:\[[^\[\]]*\])?\s*$")
        .unwrap()
});
static CHAIN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[A-Za-z0-9]+-)?(\d+):(\d+)\s*$").unwrap());

impl FromStr for LipidName {
    type Err = LipidError;

    /// Parse a lipid name like `TAG|48:0|`, `CE|12:0|(12:0)`, `PC|30:2|(14:1~16:1)` or `DAG|34:4|(NL-16:1,18:3)[NH4]`.
    /// Chains may be separated by `~` or `,`, chain prefixes (`NL-`, `MS2-`) and an adduct suffix are ignored.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let captures = NAME_PATTERN.captures(value).ok_or_else(|| {
            BoxedError::new(
                LipidErrorKind::MalformedName,
                "Invalid lipid name",
                "A lipid name has the form 'GROUP|carbons:double_bonds|(chain~chain)'",
                Context::line(None, value, 0, value.len()).to_owned(),
            )
        })?;
        let total_carbons = parse_number(value, captures.get(2), 0)?;
        let total_double_bonds = parse_number(value, captures.get(3), 0)?;
        let mut chains = Vec::new();
        if let Some(chain_text) = captures.get(4) {
            let mut offset = chain_text.start();
            for part in chain_text.as_str().split(['~', ',']) {
                let chain = CHAIN_PATTERN.captures(part).ok_or_else(|| {
                    BoxedError::new(
                        LipidErrorKind::MalformedName,
                        "Invalid lipid chain",
                        "A chain has the form 'carbons:double_bonds'",
                        Context::line(None, value, offset, part.len()).to_owned(),
                    )
                })?;
                chains.push(Chain::new(
                    parse_number(value, chain.get(1), offset)?,
                    parse_number(value, chain.get(2), offset)?,
                ));
                offset += part.len() + 1;
            }
        }
        Self::with_chains(
            &captures[1],
            total_carbons,
            total_double_bonds,
            chains,
        )
    }
}

/// Parse a captured number, `offset` is the start of the haystack of the capture within `value`
fn parse_number(value: &str, capture: Option<regex::Match<'_>>, offset: usize) -> Result<u32, LipidError> {
    let capture = capture.ok_or_else(|| {
        BoxedError::new(
            LipidErrorKind::MalformedName,
            "Invalid lipid name",
            "A number is missing",
            Context::line(None, value, 0, value.len()).to_owned(),
        )
    })?;
    capture.as_str().parse::<u32>().map_err(|err| {
        BoxedError::new(
            LipidErrorKind::MalformedName,
            "Invalid lipid name",
            format!("The number {}", explain_number_error(&err)),
            Context::line(None, value, offset + capture.start(), capture.len()).to_owned(),
        )
    })
}

impl TryFrom<String> for LipidName {
    type Error = LipidError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LipidName> for String {
    fn from(value: LipidName) -> Self {
        value.to_string()
    }
}

/// The result of identifying a mass pair: either a named lipid or the unknown sentinel
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Identification {
    /// The mass pair matched a library entry
    Named(LipidName),
    /// No library entry matched, or the row could not be named
    #[default]
    Unknown,
}

impl Identification {
    /// Get the name, if known
    pub const fn name(&self) -> Option<&LipidName> {
        match self {
            Self::Named(name) => Some(name),
            Self::Unknown => None,
        }
    }

    /// Check if this is the unknown sentinel
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl From<LipidName> for Identification {
    fn from(value: LipidName) -> Self {
        Self::Named(value)
    }
}

impl Display for Identification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}
