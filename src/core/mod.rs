//! Calculation engine with dependency resolution

pub mod calculator;
pub mod formula;

pub use calculator::{CalculatedValues, Calculator};
