//! Valuation Forge - private equity valuation workbooks
//!
//! Builds a leveraged-buyout valuation model as an Excel workbook with live
//! formulas: an Assumptions sheet whose values are workbook defined names, a
//! five-year Valuation Model sheet, and a Dashboard of key metrics.
//!
//! Generation runs in two passes. The layout pass turns the template and the
//! assumptions into a [`model::WorkbookPlan`] where every coordinate is known;
//! the plan is then checked for unresolved references, calculated, and
//! written with `rust_xlsxwriter`.
//!
//! # Example
//!
//! ```no_run
//! use valuation_forge::{generate, Assumptions};
//!
//! let mut assumptions = Assumptions::default();
//! assumptions.set("revenue_growth", 0.07)?;
//!
//! let report = generate("Valuation_Model.xlsx", &assumptions)?;
//! println!("Formulas: {}", report.formulas);
//! # Ok::<(), valuation_forge::error::ValuationError>(())
//! ```

pub mod cli;
pub mod core;
pub mod error;
pub mod excel;
pub mod generator;
pub mod model;
pub mod parser;
pub mod types;

// Re-export commonly used types
pub use error::{ValuationError, ValuationResult};
pub use generator::{generate, GenerationReport, Generator};
pub use types::{Assumptions, Category, Parameter, ValueFormat};
