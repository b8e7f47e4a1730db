#[macro_use]
mod formula;
mod rules;
mod tables;

pub use formula::*;
pub use rules::*;
pub use tables::*;
