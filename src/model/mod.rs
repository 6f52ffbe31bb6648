//! Workbook model: template definition, layout pass and reference checks

pub mod builder;
pub mod layout;
pub mod plan;
pub mod references;
pub mod template;

pub use builder::{build_plan, PlanBuilder};
pub use layout::CellRef;
pub use plan::{SheetPlan, StyleRole, WorkbookPlan};
pub use references::check_references;
pub use template::{private_equity_template, ValuationTemplate};
