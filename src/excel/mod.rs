//! Excel export: workbook plan -> `.xlsx`

mod exporter;
pub mod styles;

pub use exporter::{validate_output_path, ValuationExporter};
pub use styles::StyleConfig;
