use std::num::{IntErrorKind, ParseIntError};

use ordered_float::OrderedFloat;

/// Find the enclosed text by the given symbols, assumes a single open is already read just before the start, guarantees to only pick full characters
pub(crate) fn end_of_enclosure(text: &str, start: usize, open: u8, close: u8) -> Option<usize> {
    let mut state = 1;
    for (i, ch) in text.as_bytes()[start..].iter().enumerate() {
        // Check if this byte is a full character (is_char_boundary also works on index==len)
        if text.is_char_boundary(start + i) && text.is_char_boundary(start + i + 1) {
            if *ch == open {
                state += 1;
            } else if *ch == close {
                state -= 1;
                if state == 0 {
                    return Some(start + i);
                }
            }
        }
    }
    None
}

/// Get a human readable description of a number parsing error
pub(crate) const fn explain_number_error(error: &ParseIntError) -> &'static str {
    match error.kind() {
        IntErrorKind::Empty => "is empty",
        IntErrorKind::InvalidDigit => "contains an invalid character",
        IntErrorKind::NegOverflow => "is too small to fit in the internal representation",
        IntErrorKind::PosOverflow => "is too big to fit in the internal representation",
        IntErrorKind::Zero => "is zero, which is not allowed here",
        _ => "is not a valid number",
    }
}

/// A hashable and totally ordered key for an observed mass, masses are only grouped when they are bitwise equal
pub(crate) const fn mass_key(mass: f64) -> OrderedFloat<f64> {
    OrderedFloat(mass)
}

/// The key of a mass pair (precursor, fragment) used to group rows across samples
pub(crate) fn pair_key(precursor: f64, fragment: Option<f64>) -> (OrderedFloat<f64>, Option<OrderedFloat<f64>>) {
    (mass_key(precursor), fragment.map(mass_key))
}

#[test]
#[allow(clippy::missing_panics_doc)]
fn enclosure() {
    assert_eq!(end_of_enclosure("(C2H4)2", 1, b'(', b')'), Some(5));
    assert_eq!(end_of_enclosure("(C(H2)2)2", 1, b'(', b')'), Some(7));
    assert_eq!(end_of_enclosure("(C2H4", 1, b'(', b')'), None);
}
