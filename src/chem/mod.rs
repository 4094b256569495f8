//! Chemistry parsing used by the materials tools.

pub mod cif;
pub mod elements;
pub mod formula;

pub use cif::{CifError, Structure, StructureSummary};
pub use formula::{Composition, FormulaError};
