//! Workbook generation pipeline
//!
//! validate path -> layout -> reference check -> calculate -> export

use crate::core::{CalculatedValues, Calculator};
use crate::error::ValuationResult;
use crate::excel::{validate_output_path, StyleConfig, ValuationExporter};
use crate::model::builder::{build_plan, cell_format};
use crate::model::layout::CellRef;
use crate::model::plan::{CellContent, WorkbookPlan};
use crate::model::references::check_references;
use crate::model::template::ValuationTemplate;
use crate::types::{Assumptions, ValueFormat};
use chrono::NaiveDate;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Summary of a generated workbook
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationReport {
    pub path: PathBuf,
    pub sheets: Vec<String>,
    pub defined_names: usize,
    pub formulas: usize,
    /// Formula cells whose cached result is an error value
    pub formula_errors: usize,
    pub valuation_date: Option<NaiveDate>,
}

/// Calculated content of a formula cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    /// Error value the cell shows, such as `#NUM!`
    Error(String),
}

impl CellValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Error(_) => None,
        }
    }
}

/// A dashboard metric with its calculated value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricValue {
    pub label: String,
    pub value: CellValue,
    pub format: ValueFormat,
}

/// A projected line item with its yearly values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionRow {
    pub key: String,
    pub label: String,
    pub values: Vec<CellValue>,
    pub format: ValueFormat,
}

/// A laid-out and calculated workbook, not yet written
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub plan: WorkbookPlan,
    pub values: CalculatedValues,
    summary_sheet: String,
}

impl Evaluation {
    fn cell_value(&self, sheet: &str, cell: CellRef) -> Option<CellValue> {
        if let Some(value) = self.values.get(sheet, cell) {
            return Some(CellValue::Number(value));
        }
        self.values
            .error(sheet, cell)
            .map(|error| CellValue::Error(error.as_str().to_string()))
    }

    /// Dashboard metrics in display order
    pub fn metrics(&self) -> Vec<MetricValue> {
        let Some(sheet) = self.plan.sheet(&self.summary_sheet) else {
            return Vec::new();
        };
        sheet
            .cells
            .iter()
            .filter(|(cell, planned)| cell.col == 1 && matches!(planned.content, CellContent::Formula(_)))
            .filter_map(|(cell, planned)| {
                let label = match sheet.get(CellRef::new(cell.row, 0)).map(|c| &c.content) {
                    Some(CellContent::Text(t)) => t.clone(),
                    _ => return None,
                };
                Some(MetricValue {
                    label,
                    value: self.cell_value(&sheet.name, *cell)?,
                    format: cell_format(planned).unwrap_or(ValueFormat::Number),
                })
            })
            .collect()
    }

    /// Line items with a value in every projection year, in row order
    pub fn projections(&self, years: u16) -> Vec<ProjectionRow> {
        let model_sheet = &self.plan.model_sheet;
        let mut rows: Vec<(u32, ProjectionRow)> = self
            .plan
            .items
            .iter()
            .filter(|(_, placement)| placement.columns.len() == usize::from(years))
            .filter_map(|(key, placement)| {
                let values = (1..=years)
                    .map(|year| {
                        let cell = self.plan.item_cell(key, year)?;
                        self.cell_value(model_sheet, cell)
                    })
                    .collect::<Option<Vec<CellValue>>>()?;
                let format = self
                    .plan
                    .sheet(model_sheet)?
                    .get(CellRef::new(placement.row, self.plan.first_year_col))
                    .and_then(cell_format)
                    .unwrap_or(ValueFormat::Number);
                Some((
                    placement.row,
                    ProjectionRow {
                        key: key.clone(),
                        label: placement.label.clone(),
                        values,
                        format,
                    },
                ))
            })
            .collect();
        rows.sort_by_key(|(row, _)| *row);
        rows.into_iter().map(|(_, row)| row).collect()
    }
}

/// Builds valuation workbooks from a template
#[derive(Debug, Clone, Default)]
pub struct Generator {
    template: ValuationTemplate,
    valuation_date: Option<NaiveDate>,
    styles: StyleConfig,
}

impl Generator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, template: ValuationTemplate) -> Self {
        self.template = template;
        self
    }

    /// Date used for TODAY() in cached results (default: local date)
    pub fn with_valuation_date(mut self, date: NaiveDate) -> Self {
        self.valuation_date = Some(date);
        self
    }

    pub fn with_styles(mut self, styles: StyleConfig) -> Self {
        self.styles = styles;
        self
    }

    pub fn template(&self) -> &ValuationTemplate {
        &self.template
    }

    /// Lay out, check and calculate without writing anything
    pub fn evaluate(&self, assumptions: &Assumptions) -> ValuationResult<Evaluation> {
        let plan = build_plan(&self.template, assumptions)?;
        check_references(&plan)?;

        let mut calculator = Calculator::new(&plan);
        if let Some(date) = self.valuation_date {
            calculator = calculator.with_valuation_date(date);
        }
        let values = calculator.calculate()?;

        Ok(Evaluation {
            plan,
            values,
            summary_sheet: self.template.summary_sheet.clone(),
        })
    }

    /// Write the workbook to `path`, overwriting any existing file
    pub fn generate(&self, path: &Path, assumptions: &Assumptions) -> ValuationResult<GenerationReport> {
        validate_output_path(path)?;
        let evaluation = self.evaluate(assumptions)?;

        ValuationExporter::new(&evaluation.plan)
            .with_values(&evaluation.values)
            .with_styles(self.styles.clone())
            .export(path)?;

        let report = GenerationReport {
            path: path.to_path_buf(),
            sheets: evaluation.plan.sheets.iter().map(|s| s.name.clone()).collect(),
            defined_names: evaluation.plan.defined_names.len(),
            formulas: evaluation.plan.sheets.iter().map(|s| s.formulas().count()).sum(),
            formula_errors: evaluation.values.error_count(),
            valuation_date: evaluation.values.valuation_date(),
        };
        if report.formula_errors > 0 {
            warn!(
                cells = report.formula_errors,
                "some formulas evaluate to error values"
            );
        }
        info!(
            path = %report.path.display(),
            formulas = report.formulas,
            "valuation model generated"
        );
        Ok(report)
    }
}

/// Generate the private equity valuation workbook with the default template
pub fn generate(path: impl AsRef<Path>, assumptions: &Assumptions) -> ValuationResult<GenerationReport> {
    Generator::new().generate(path.as_ref(), assumptions)
}
