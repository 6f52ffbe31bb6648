use crate::error::{ValuationError, ValuationResult};
use crate::generator::{CellValue, Generator, MetricValue, ProjectionRow};
use crate::parser;
use crate::types::ValueFormat;
use chrono::{Days, NaiveDate};
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Format a number for display, removing unnecessary decimal places
fn format_number(n: f64) -> String {
    let rounded = (n * 1e6).round() / 1e6;
    format!("{:.6}", rounded)
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Convert an Excel date serial back to a calendar date
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_days(Days::new(serial.floor() as u64))
}

/// Render a value the way its cell format shows it
fn format_value(value: f64, format: ValueFormat) -> String {
    match format {
        ValueFormat::Percent => format!("{:.1}%", value * 100.0),
        ValueFormat::Number => format!("{:.1}", value),
        ValueFormat::Date => serial_to_date(value)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| format_number(value)),
    }
}

/// Render a calculated cell; error values are shown as-is
fn format_cell(value: &CellValue, format: ValueFormat) -> String {
    match value {
        CellValue::Number(n) => format_value(*n, format),
        CellValue::Error(error) => error.clone(),
    }
}

fn generator(valuation_date: Option<NaiveDate>) -> Generator {
    match valuation_date {
        Some(date) => Generator::new().with_valuation_date(date),
        None => Generator::new(),
    }
}

/// Execute the generate command
pub fn generate(
    output: PathBuf,
    assumptions: Option<PathBuf>,
    scenario: Option<String>,
    valuation_date: Option<NaiveDate>,
    verbose: bool,
) -> ValuationResult<()> {
    println!("{}", "🔥 Valuation Forge - Generating workbook".bold().green());
    if let Some(ref file) = assumptions {
        println!("   Assumptions: {}", file.display());
    }
    if let Some(ref s) = scenario {
        println!("   Scenario: {}", s.bright_yellow().bold());
    }
    println!();

    let values = parser::load_assumptions(assumptions.as_deref(), scenario.as_deref())?;
    if verbose {
        println!(
            "{}",
            format!("📖 Loaded {} parameters", values.parameters().len()).cyan()
        );
    }

    let report = generator(valuation_date).generate(&output, &values)?;

    if verbose {
        println!("   Sheets: {}", report.sheets.join(", "));
        println!("   Defined names: {}", report.defined_names);
        println!("   Formulas: {}", report.formulas);
        if report.formula_errors > 0 {
            println!(
                "   {}",
                format!("Formulas with error values: {}", report.formula_errors).yellow()
            );
        }
        if let Some(date) = report.valuation_date {
            println!("   Valuation date: {}", date);
        }
        println!();
    }

    println!(
        "{}",
        format!("Valuation model generated: {}", report.path.display())
            .bold()
            .green()
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct PreviewReport {
    scenario: Option<String>,
    valuation_date: Option<NaiveDate>,
    metrics: Vec<MetricValue>,
    projections: Vec<ProjectionRow>,
}

/// Execute the preview command: calculate in-process and print results
pub fn preview(
    assumptions: Option<PathBuf>,
    scenario: Option<String>,
    valuation_date: Option<NaiveDate>,
    json: bool,
) -> ValuationResult<()> {
    let values = parser::load_assumptions(assumptions.as_deref(), scenario.as_deref())?;
    let generator = generator(valuation_date);
    let evaluation = generator.evaluate(&values)?;

    let report = PreviewReport {
        scenario,
        valuation_date: evaluation.values.valuation_date(),
        metrics: evaluation.metrics(),
        projections: evaluation.projections(generator.template().years),
    };

    if json {
        let text = serde_json::to_string_pretty(&report)
            .map_err(|e| ValuationError::Export(format!("Failed to serialize preview: {}", e)))?;
        println!("{}", text);
        return Ok(());
    }

    println!("{}", "🔥 Valuation Forge - Preview".bold().green());
    if let Some(ref s) = report.scenario {
        println!("   Scenario: {}", s.bright_yellow().bold());
    }
    println!();

    println!("{}", "📊 Key Metrics".bold().cyan());
    let width = report.metrics.iter().map(|m| m.label.len()).max().unwrap_or(0);
    for metric in &report.metrics {
        let text = format_cell(&metric.value, metric.format);
        let text = match metric.value {
            CellValue::Number(_) => text.bold(),
            CellValue::Error(_) => text.red().bold(),
        };
        println!("   {:<width$}  {}", metric.label, text, width = width);
    }
    println!();

    println!("{}", "📈 Projections".bold().cyan());
    let width = report
        .projections
        .iter()
        .map(|r| r.label.len())
        .max()
        .unwrap_or(0);
    let years = report.projections.first().map_or(0, |r| r.values.len());
    let header: Vec<String> = (1..=years).map(|y| format!("{:>10}", format!("Year {}", y))).collect();
    println!("   {:<width$}  {}", "", header.join(" ").dimmed(), width = width);
    for row in &report.projections {
        let cells: Vec<String> = row
            .values
            .iter()
            .map(|v| format!("{:>10}", format_cell(v, row.format)))
            .collect();
        println!("   {:<width$}  {}", row.label, cells.join(" "), width = width);
    }
    println!();

    Ok(())
}

/// Execute the assumptions command: print or write the overrides template
pub fn assumptions(output: Option<PathBuf>) -> ValuationResult<()> {
    let yaml = parser::assumptions_to_yaml(&crate::types::Assumptions::default())?;

    match output {
        Some(path) => {
            write_template(&path, &yaml)?;
            println!(
                "{}",
                format!("✅ Assumptions template written: {}", path.display())
                    .bold()
                    .green()
            );
        }
        None => print!("{}", yaml),
    }
    Ok(())
}

fn write_template(path: &Path, yaml: &str) -> ValuationResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            return Err(ValuationError::InvalidPath(format!(
                "directory '{}' does not exist",
                parent.display()
            )));
        }
    }
    fs::write(path, yaml)?;
    Ok(())
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
