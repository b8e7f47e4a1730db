use std::fmt::Write;

use context_error::*;
use serde::{Deserialize, Serialize};

use crate::{
    chemistry::AtomicMassTable,
    error::{LipidError, LipidErrorKind},
    helper_functions::{end_of_enclosure, explain_number_error},
};

/// A molecular formula, a mapping of element symbols to atom counts.
///
/// The elements are kept sorted on their symbol and elements with a count of zero are removed, so two formulas with
/// the same composition always compare equal.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct MolecularFormula {
    elements: Vec<(Box<str>, i32)>,
}

impl MolecularFormula {
    /// Create a new formula from the given (element, count) pairs, pairs for the same element are merged.
    /// Returns None if overflow occurred, meaning that the count for one element does not fit in an `i32`.
    pub fn new<'a>(elements: impl IntoIterator<Item = (&'a str, i32)>) -> Option<Self> {
        let mut result = Self::default();
        for (element, amount) in elements {
            result.add_element(element, amount)?;
        }
        Some(result)
    }

    /// Add the given number of atoms of an element.
    /// Returns None if overflow occurred, the formula is then left unchanged.
    pub fn add_element(&mut self, element: &str, amount: i32) -> Option<()> {
        if amount == 0 {
            return Some(());
        }
        match self
            .elements
            .binary_search_by(|(symbol, _)| (**symbol).cmp(element))
        {
            Ok(index) => {
                let total = self.elements[index].1.checked_add(amount)?;
                if total == 0 {
                    self.elements.remove(index);
                } else {
                    self.elements[index].1 = total;
                }
            }
            Err(index) => self.elements.insert(index, (element.into(), amount)),
        }
        Some(())
    }

    /// The sum of both formulas, None if overflow occurred
    pub fn checked_add(&self, rhs: &Self) -> Option<Self> {
        let mut result = self.clone();
        for (element, amount) in &rhs.elements {
            result.add_element(element, *amount)?;
        }
        Some(result)
    }

    /// This formula with every count multiplied, None if overflow occurred
    pub fn checked_mul(&self, rhs: i32) -> Option<Self> {
        let mut elements = Vec::with_capacity(self.elements.len());
        for (element, amount) in &self.elements {
            let amount = amount.checked_mul(rhs)?;
            if amount != 0 {
                elements.push((element.clone(), amount));
            }
        }
        Some(Self { elements })
    }

    /// Get all elements and their counts, sorted on element symbol
    pub fn elements(&self) -> &[(Box<str>, i32)] {
        &self.elements
    }

    /// The number of atoms of the given element
    pub fn count(&self, element: &str) -> i32 {
        self.elements
            .binary_search_by(|(symbol, _)| (**symbol).cmp(element))
            .map_or(0, |index| self.elements[index].1)
    }

    /// Check if this formula does not contain any atoms
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Check if this formula contains a negative number of any element
    pub fn contains_negative_amount(&self) -> bool {
        self.elements.iter().any(|(_, n)| *n < 0)
    }

    /// The monoisotopic mass of this formula, using the masses in the given table.
    /// # Errors
    /// If an element of this formula is not present in the table.
    pub fn monoisotopic_mass(&self, masses: &AtomicMassTable) -> Result<f64, LipidError> {
        let mut mass = 0.0;
        for (element, amount) in &self.elements {
            let element_mass = masses.mass(element).ok_or_else(|| {
                BoxedError::new(
                    LipidErrorKind::UnknownElement,
                    "Unknown element",
                    format!("The element '{element}' is not present in the atomic mass table"),
                    Context::show(self.hill_notation()),
                )
            })?;
            mass = element_mass.mul_add(f64::from(*amount), mass);
        }
        Ok(mass)
    }

    /// Create a [Hill notation](https://en.wikipedia.org/wiki/Chemical_formula#Hill_system) from this formula.
    /// Carbon first, then hydrogen, then all other elements alphabetically. Without carbon all elements are
    /// sorted alphabetically.
    pub fn hill_notation(&self) -> String {
        let mut buffer = String::new();
        let write = |buffer: &mut String, element: &str, amount: i32| {
            if amount == 1 {
                write!(buffer, "{element}").unwrap();
            } else {
                write!(buffer, "{element}{amount}").unwrap();
            }
        };
        let carbon = self.count("C");
        if carbon == 0 {
            for (element, amount) in &self.elements {
                write(&mut buffer, element, *amount);
            }
        } else {
            write(&mut buffer, "C", carbon);
            let hydrogen = self.count("H");
            if hydrogen != 0 {
                write(&mut buffer, "H", hydrogen);
            }
            for (element, amount) in self
                .elements
                .iter()
                .filter(|(e, _)| &**e != "C" && &**e != "H")
            {
                write(&mut buffer, element, *amount);
            }
        }
        buffer
    }

    /// Parse a formula string like `C57H104O6`, `C12 H20 O2`, `HN-1O2` or `C3H5(C16H31O)3O3`.
    ///
    /// ## Rules
    /// * An element is an uppercase letter optionally followed by lowercase letters.
    /// * An element may be followed by an (optionally negative) count, a missing count means one.
    /// * Groups in round brackets may be followed by a multiplier and may be nested.
    /// * Whitespace between tokens is ignored.
    ///
    /// The element symbols are not checked here, an unknown element is only detected when the mass is calculated.
    /// # Errors
    /// If the formula is empty, contains unbalanced brackets, or contains any other character.
    pub fn from_formula_string(value: &str) -> Result<Self, LipidError> {
        if value.trim().is_empty() {
            return Err(BoxedError::new(
                LipidErrorKind::MalformedFormula,
                "Invalid molecular formula",
                "The formula is empty",
                Context::show(value.to_string()),
            ));
        }
        let (formula, end) = Self::parse_group(value, 0, false)?;
        debug_assert_eq!(end, value.len());
        Ok(formula)
    }

    /// Parse from the start index until the end of the string, or until the closing bracket if `nested`.
    /// Returns the parsed formula and the index directly after the last consumed byte.
    fn parse_group(value: &str, start: usize, nested: bool) -> Result<(Self, usize), LipidError> {
        let bytes = value.as_bytes();
        let mut index = start;
        let mut result = Self::default();
        while index < bytes.len() {
            match bytes[index] {
                b' ' | b'\t' => index += 1,
                b'(' => {
                    let close = end_of_enclosure(value, index + 1, b'(', b')').ok_or_else(|| {
                        malformed(value, index, 1, "No closing bracket found for this group")
                    })?;
                    let (inner, _) = Self::parse_group(&value[..close], index + 1, true)?;
                    if inner.is_empty() {
                        return Err(malformed(
                            value,
                            index,
                            close + 1 - index,
                            "A group cannot be empty",
                        ));
                    }
                    let (offset, amount) = parse_count(value, close + 1)?;
                    result = inner
                        .checked_mul(amount)
                        .and_then(|group| result.checked_add(&group))
                        .ok_or_else(|| {
                            malformed(
                                value,
                                index,
                                close + 1 + offset - index,
                                "The element counts of this group are too big to fit in the internal representation",
                            )
                        })?;
                    index = close + 1 + offset;
                }
                b')' => {
                    return Err(malformed(
                        value,
                        index,
                        1,
                        "This closing bracket does not close any group",
                    ));
                }
                b'A'..=b'Z' => {
                    let length = 1 + bytes[index + 1..]
                        .iter()
                        .take_while(|b| b.is_ascii_lowercase())
                        .count();
                    let element = &value[index..index + length];
                    let (offset, amount) = parse_count(value, index + length)?;
                    result.add_element(element, amount).ok_or_else(|| {
                        malformed(
                            value,
                            index,
                            length + offset,
                            "The total count for this element is too big to fit in the internal representation",
                        )
                    })?;
                    index += length + offset;
                }
                _ => {
                    return Err(malformed(
                        value,
                        index,
                        value[index..].chars().next().map_or(1, char::len_utf8),
                        "Not a valid character in a formula",
                    ));
                }
            }
        }
        debug_assert!(!nested || index == value.len());
        Ok((result, index))
    }
}

/// Parse the optional count starting at the given index, skipping leading whitespace.
/// Returns the number of bytes consumed and the count (1 if no count is given).
fn parse_count(value: &str, start: usize) -> Result<(usize, i32), LipidError> {
    let bytes = value.as_bytes();
    let whitespace = bytes[start..]
        .iter()
        .take_while(|b| **b == b' ' || **b == b'\t')
        .count();
    let number_start = start + whitespace;
    let length = bytes[number_start..]
        .iter()
        .enumerate()
        .take_while(|(i, b)| b.is_ascii_digit() || (*i == 0 && (**b == b'-' || **b == b'+')))
        .count();
    if length == 0 {
        return Ok((0, 1));
    }
    let amount = value[number_start..number_start + length]
        .parse::<i32>()
        .map_err(|err| {
            malformed(
                value,
                number_start,
                length,
                format!("The element count {}", explain_number_error(&err)),
            )
        })?;
    Ok((whitespace + length, amount))
}

fn malformed(
    value: &str,
    index: usize,
    length: usize,
    reason: impl Into<String>,
) -> LipidError {
    BoxedError::new(
        LipidErrorKind::MalformedFormula,
        "Invalid molecular formula",
        reason.into(),
        Context::line(None, value, index, length).to_owned(),
    )
}

impl std::fmt::Display for MolecularFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hill_notation())
    }
}

impl std::str::FromStr for MolecularFormula {
    type Err = LipidError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_formula_string(s)
    }
}

impl TryFrom<String> for MolecularFormula {
    type Error = LipidError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.trim().is_empty() {
            Ok(Self::default())
        } else {
            Self::from_formula_string(&value)
        }
    }
}

impl From<MolecularFormula> for String {
    fn from(value: MolecularFormula) -> Self {
        value.hill_notation()
    }
}

/// Easily define molecular formulas using the following syntax: `<element> <num>`
/// # Panics
/// If the counts for one element overflow.
/// ```
/// # use lipidcore::*;
/// assert_eq!(molecular_formula!(C 12 H 24 O 2).hill_notation(), "C12H24O2");
/// ```
#[macro_export]
macro_rules! molecular_formula {
    ($($element:ident $num:literal)*) => {
        $crate::chemistry::MolecularFormula::new([$((stringify!($element), $num)),*]).unwrap()
    };
}
