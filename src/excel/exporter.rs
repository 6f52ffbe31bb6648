//! Excel exporter for workbook plans

use super::styles::StyleConfig;
use crate::core::CalculatedValues;
use crate::error::{ValuationError, ValuationResult};
use crate::model::plan::{CellContent, SheetPlan, WorkbookPlan};
use rust_xlsxwriter::{Formula, Workbook, Worksheet};
use std::path::Path;
use tracing::{debug, info};

/// Reject destinations that are not `.xlsx` files
pub fn validate_output_path(path: &Path) -> ValuationResult<()> {
    if path.file_stem().map_or(true, |s| s.is_empty()) {
        return Err(ValuationError::InvalidPath(format!(
            "'{}' has no file name",
            path.display()
        )));
    }
    let is_xlsx = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xlsx"));
    if !is_xlsx {
        return Err(ValuationError::InvalidPath(format!(
            "'{}' must end with .xlsx",
            path.display()
        )));
    }
    Ok(())
}

/// Writes a [`WorkbookPlan`] to an `.xlsx` file
pub struct ValuationExporter<'a> {
    plan: &'a WorkbookPlan,
    values: Option<&'a CalculatedValues>,
    styles: StyleConfig,
}

impl<'a> ValuationExporter<'a> {
    pub fn new(plan: &'a WorkbookPlan) -> Self {
        Self {
            plan,
            values: None,
            styles: StyleConfig::default(),
        }
    }

    /// Store calculated results as cached formula values
    pub fn with_values(mut self, values: &'a CalculatedValues) -> Self {
        self.values = Some(values);
        self
    }

    pub fn with_styles(mut self, styles: StyleConfig) -> Self {
        self.styles = styles;
        self
    }

    /// Export the plan; an existing file is overwritten
    pub fn export(&self, output_path: &Path) -> ValuationResult<()> {
        validate_output_path(output_path)?;

        let mut workbook = self.to_workbook()?;
        workbook
            .save(output_path)
            .map_err(|e| ValuationError::Export(format!("Failed to save Excel file: {}", e)))?;

        info!(path = %output_path.display(), "workbook saved");
        Ok(())
    }

    /// Build the in-memory workbook without saving it
    pub fn to_workbook(&self) -> ValuationResult<Workbook> {
        let mut workbook = Workbook::new();

        for sheet in &self.plan.sheets {
            let worksheet = workbook.add_worksheet();
            worksheet
                .set_name(&sheet.name)
                .map_err(|e| ValuationError::Export(format!("Failed to set worksheet name: {}", e)))?;
            self.export_sheet(worksheet, sheet)?;
        }

        for name in &self.plan.defined_names {
            workbook
                .define_name(&name.name, &format!("={}", name.reference()))
                .map_err(|e| {
                    ValuationError::Export(format!("Failed to define name '{}': {}", name.name, e))
                })?;
        }

        debug!(
            sheets = self.plan.sheets.len(),
            names = self.plan.defined_names.len(),
            cached = self.values.is_some(),
            "workbook rendered"
        );
        Ok(workbook)
    }

    fn export_sheet(&self, worksheet: &mut Worksheet, sheet: &SheetPlan) -> ValuationResult<()> {
        for merge in &sheet.merges {
            worksheet
                .merge_range(
                    merge.first.row,
                    merge.first.col,
                    merge.last.row,
                    merge.last.col,
                    &merge.text,
                    &self.styles.format(merge.style),
                )
                .map_err(|e| ValuationError::Export(format!("Failed to merge cells: {}", e)))?;
        }

        for (cell, planned) in &sheet.cells {
            let format = self.styles.format(planned.style);
            match &planned.content {
                CellContent::Text(text) => {
                    worksheet
                        .write_string_with_format(cell.row, cell.col, text, &format)
                        .map_err(|e| ValuationError::Export(format!("Failed to write text: {}", e)))?;
                }
                CellContent::Number(value) => {
                    worksheet
                        .write_number_with_format(cell.row, cell.col, *value, &format)
                        .map_err(|e| {
                            ValuationError::Export(format!("Failed to write number: {}", e))
                        })?;
                }
                CellContent::Formula(text) => {
                    let mut formula = Formula::new(text);
                    if let Some(values) = self.values {
                        if let Some(value) = values.get(&sheet.name, *cell) {
                            formula = formula.set_result(value.to_string());
                        } else if let Some(error) = values.error(&sheet.name, *cell) {
                            formula = formula.set_result(error.as_str());
                        }
                    }
                    worksheet
                        .write_formula_with_format(cell.row, cell.col, formula, &format)
                        .map_err(|e| {
                            ValuationError::Export(format!("Failed to write formula: {}", e))
                        })?;
                }
            }
        }

        for (col, width) in &sheet.column_widths {
            worksheet
                .set_column_width(*col, *width)
                .map_err(|e| ValuationError::Export(format!("Failed to set column width: {}", e)))?;
        }

        let scale = self.styles.color_scale();
        for range in &sheet.color_scales {
            worksheet
                .add_conditional_format(
                    range.first.row,
                    range.first.col,
                    range.last.row,
                    range.last.col,
                    &scale,
                )
                .map_err(|e| {
                    ValuationError::Export(format!("Failed to add conditional format: {}", e))
                })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builder::build_plan;
    use crate::model::template::private_equity_template;
    use crate::types::Assumptions;
    use tempfile::TempDir;

    #[test]
    fn test_output_path_validation() {
        assert!(validate_output_path(Path::new("model.xlsx")).is_ok());
        assert!(validate_output_path(Path::new("out/Model.XLSX")).is_ok());
        assert!(matches!(
            validate_output_path(Path::new("model.xls")),
            Err(ValuationError::InvalidPath(_))
        ));
        assert!(matches!(
            validate_output_path(Path::new("model")),
            Err(ValuationError::InvalidPath(_))
        ));
        assert!(matches!(
            validate_output_path(Path::new(".xlsx")),
            Err(ValuationError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_export_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.xlsx");
        let plan = build_plan(&private_equity_template(), &Assumptions::default()).unwrap();

        ValuationExporter::new(&plan).export(&path).unwrap();

        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_bad_extension_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.csv");
        let plan = build_plan(&private_equity_template(), &Assumptions::default()).unwrap();

        let err = ValuationExporter::new(&plan).export(&path).unwrap_err();

        assert!(matches!(err, ValuationError::InvalidPath(_)));
        assert!(!path.exists());
    }
}
