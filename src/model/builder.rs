//! Layout pass: assumptions + template -> [`WorkbookPlan`]
//!
//! Every coordinate is derived from the row cursor while sections and items
//! are emitted; templates never carry absolute coordinates.

use super::layout::{CellRef, RowCursor, YearColumns};
use super::plan::{
    CellContent, ColorScaleRange, DefinedName, ItemPlacement, PlannedCell, SheetPlan, StyleRole,
    WorkbookPlan,
};
use super::template::{Section, ValuationTemplate};
use crate::error::{unknown_name_message, ValuationError, ValuationResult};
use crate::types::{Assumptions, Category, ValueFormat};
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

/// Column of the parameter values on the Assumptions sheet (C)
const PARAM_VALUE_COL: u16 = 2;
/// Year 1 column on the calculation sheet (D)
const FIRST_YEAR_COL: u16 = 3;
/// Last column spanned by the summary title (F)
const SUMMARY_TITLE_LAST_COL: u16 = 5;

/// Rows assigned to one section before rendering
struct SectionRows {
    banner: u32,
    items: Vec<u32>,
}

/// Column selector parsed from a placeholder suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnSelector {
    Same,
    Previous,
    First,
    Last,
    Year(u16),
}

pub struct PlanBuilder<'a> {
    template: &'a ValuationTemplate,
    assumptions: &'a Assumptions,
    years: YearColumns,
    placeholder: Regex,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(template: &'a ValuationTemplate, assumptions: &'a Assumptions) -> ValuationResult<Self> {
        let placeholder = Regex::new(r"\{([a-z_][a-z0-9_]*)(?:@(prev|first|last|[0-9]+))?\}")
            .map_err(|e| ValuationError::Layout(format!("Regex error: {}", e)))?;
        Ok(Self {
            template,
            assumptions,
            years: YearColumns::new(FIRST_YEAR_COL, template.years),
            placeholder,
        })
    }

    /// Run the layout pass
    pub fn build(&self) -> ValuationResult<WorkbookPlan> {
        if self.template.years == 0 {
            return Err(ValuationError::Layout(
                "template must project at least one year".to_string(),
            ));
        }

        let (section_rows, items) = self.place_items()?;

        let mut plan = WorkbookPlan {
            model_sheet: self.template.model_sheet.clone(),
            first_year_col: FIRST_YEAR_COL,
            items,
            ..Default::default()
        };

        let (assumptions_sheet, names) = self.build_assumptions_sheet();
        plan.defined_names = names;
        plan.sheets.push(assumptions_sheet);

        let model_sheet = self.build_model_sheet(&section_rows, &plan.items)?;
        plan.sheets.push(model_sheet);

        let summary_sheet = self.build_summary_sheet(&plan.items)?;
        plan.sheets.push(summary_sheet);

        debug!(
            sheets = plan.sheets.len(),
            names = plan.defined_names.len(),
            items = plan.items.len(),
            "layout pass complete"
        );
        Ok(plan)
    }

    //==========================================================================
    // Parameter sheet
    //==========================================================================

    fn build_assumptions_sheet(&self) -> (SheetPlan, Vec<DefinedName>) {
        let mut sheet = SheetPlan::new(&self.template.assumptions_sheet);
        let mut names = Vec::new();

        sheet.merge(
            CellRef::new(0, 0),
            CellRef::new(0, PARAM_VALUE_COL),
            &self.template.assumptions_title,
            StyleRole::Title,
        );

        let mut cursor = RowCursor::starting_at(1);
        let mut previous: Option<Category> = None;

        for param in self.assumptions.parameters() {
            if previous != Some(param.category) {
                if previous.is_some() {
                    cursor.skip(1);
                }
                let row = cursor.take();
                sheet.merge(
                    CellRef::new(row, 0),
                    CellRef::new(row, PARAM_VALUE_COL),
                    param.category.title(),
                    StyleRole::CategoryBanner,
                );
                previous = Some(param.category);
            }

            let row = cursor.take();
            let value_cell = CellRef::new(row, PARAM_VALUE_COL);
            sheet.set(CellRef::new(row, 0), PlannedCell::text(&param.label, StyleRole::Label));
            sheet.set(CellRef::new(row, 1), PlannedCell::text(&param.name, StyleRole::Text));
            sheet.set(
                value_cell,
                PlannedCell::number(param.value, StyleRole::Value(param.format())),
            );
            names.push(DefinedName {
                name: param.name.clone(),
                sheet: sheet.name.clone(),
                cell: value_cell,
            });
        }

        sheet.column_widths.insert(0, 30.0);
        sheet.column_widths.insert(1, 25.0);
        sheet.column_widths.insert(2, 15.0);

        (sheet, names)
    }

    //==========================================================================
    // Calculation sheet
    //==========================================================================

    /// First pass: give every section and item a row, record keyed placements
    fn place_items(&self) -> ValuationResult<(Vec<SectionRows>, BTreeMap<String, ItemPlacement>)> {
        let mut cursor = RowCursor::starting_at(1);
        let mut section_rows = Vec::with_capacity(self.template.sections.len());
        let mut items = BTreeMap::new();

        for section in &self.template.sections {
            let banner = cursor.take();
            let mut rows = Vec::with_capacity(section.items.len());

            for item in &section.items {
                let row = cursor.take();
                rows.push(row);

                if let Some(key) = &item.key {
                    let columns: Vec<u16> = self
                        .years
                        .iter()
                        .filter(|(year, _)| item.formula.template_for(*year).is_some())
                        .map(|(_, col)| col)
                        .collect();
                    let placement = ItemPlacement {
                        row,
                        label: item.label.clone(),
                        columns,
                    };
                    if items.insert(key.clone(), placement).is_some() {
                        return Err(ValuationError::Layout(format!(
                            "duplicate line item key '{}' in section '{}'",
                            key, section.title
                        )));
                    }
                }
            }

            cursor.skip(1);
            section_rows.push(SectionRows { banner, items: rows });
        }

        Ok((section_rows, items))
    }

    fn build_model_sheet(
        &self,
        section_rows: &[SectionRows],
        items: &BTreeMap<String, ItemPlacement>,
    ) -> ValuationResult<SheetPlan> {
        let mut sheet = SheetPlan::new(&self.template.model_sheet);

        sheet.set(CellRef::new(0, 0), PlannedCell::text("Concept", StyleRole::ColumnHeader));
        sheet.set(
            CellRef::new(0, 1),
            PlannedCell::text("Description", StyleRole::ColumnHeader),
        );
        for (year, col) in self.years.iter() {
            sheet.set(
                CellRef::new(0, col),
                PlannedCell::text(format!("Year {}", year), StyleRole::ColumnHeader),
            );
        }

        for (section, rows) in self.template.sections.iter().zip(section_rows) {
            self.render_section(&mut sheet, section, rows, items)?;
        }

        sheet.column_widths.insert(0, 25.0);
        sheet.column_widths.insert(1, 25.0);
        for (_, col) in self.years.iter() {
            sheet.column_widths.insert(col, 15.0);
        }

        Ok(sheet)
    }

    fn render_section(
        &self,
        sheet: &mut SheetPlan,
        section: &Section,
        rows: &SectionRows,
        items: &BTreeMap<String, ItemPlacement>,
    ) -> ValuationResult<()> {
        debug!(section = %section.title, banner_row = rows.banner + 1, "rendering section");

        sheet.merge(
            CellRef::new(rows.banner, 0),
            CellRef::new(rows.banner, 1),
            &section.title,
            StyleRole::SectionBanner,
        );

        for (item, &row) in section.items.iter().zip(&rows.items) {
            if !item.label.is_empty() {
                sheet.set(CellRef::new(row, 0), PlannedCell::text(&item.label, StyleRole::Label));
            }
            if let Some(description) = &item.description {
                sheet.set(CellRef::new(row, 1), PlannedCell::text(description, StyleRole::Text));
            }

            let role = StyleRole::Value(item.value_format());
            let mut filled: Vec<u16> = Vec::new();
            for (year, col) in self.years.iter() {
                if let Some(template) = item.formula.template_for(year) {
                    let formula = self.expand(template, Some(col), None, items).map_err(|e| {
                        ValuationError::Layout(format!(
                            "{} / {} (Year {}): {}",
                            section.title, item.label, year, e
                        ))
                    })?;
                    sheet.set(CellRef::new(row, col), PlannedCell::formula(formula, role));
                    filled.push(col);
                }
            }

            if item.highlight {
                if let (Some(&first), Some(&last)) = (filled.first(), filled.last()) {
                    sheet.color_scales.push(ColorScaleRange {
                        first: CellRef::new(row, first),
                        last: CellRef::new(row, last),
                    });
                }
            }
        }

        Ok(())
    }

    //==========================================================================
    // Summary sheet
    //==========================================================================

    fn build_summary_sheet(
        &self,
        items: &BTreeMap<String, ItemPlacement>,
    ) -> ValuationResult<SheetPlan> {
        let mut sheet = SheetPlan::new(&self.template.summary_sheet);

        sheet.merge(
            CellRef::new(0, 0),
            CellRef::new(0, SUMMARY_TITLE_LAST_COL),
            &self.template.summary_title,
            StyleRole::Title,
        );
        sheet.merge(
            CellRef::new(2, 0),
            CellRef::new(2, 1),
            &self.template.summary_heading,
            StyleRole::Heading,
        );

        let mut cursor = RowCursor::starting_at(3);
        for metric in &self.template.metrics {
            let row = cursor.take();
            let formula = self
                .expand(&metric.formula, None, Some(&self.template.model_sheet), items)
                .map_err(|e| ValuationError::Layout(format!("metric '{}': {}", metric.label, e)))?;
            sheet.set(CellRef::new(row, 0), PlannedCell::text(&metric.label, StyleRole::Label));
            sheet.set(
                CellRef::new(row, 1),
                PlannedCell::formula(formula, StyleRole::Metric(metric.value_format())),
            );
        }

        sheet.column_widths.insert(0, 25.0);
        sheet.column_widths.insert(1, 15.0);

        Ok(sheet)
    }

    //==========================================================================
    // Placeholder expansion
    //==========================================================================

    /// Replace `{key@selector}` placeholders with coordinates.
    ///
    /// `current` is the column being written (None on the summary sheet);
    /// `qualify` prefixes coordinates with the calculation sheet name.
    fn expand(
        &self,
        template: &str,
        current: Option<u16>,
        qualify: Option<&str>,
        items: &BTreeMap<String, ItemPlacement>,
    ) -> Result<String, String> {
        let mut out = String::with_capacity(template.len());
        let mut last_end = 0;

        for caps in self.placeholder.captures_iter(template) {
            let whole = caps.get(0).ok_or("empty placeholder match")?;
            let key = caps.get(1).map(|m| m.as_str()).ok_or("placeholder without key")?;
            let selector = parse_selector(caps.get(2).map(|m| m.as_str()))?;

            let placement = items.get(key).ok_or_else(|| {
                unknown_name_message("line item", key, items.keys().map(String::as_str))
            })?;
            let col = self.resolve_column(selector, current)?;
            if !placement.columns.contains(&col) {
                return Err(format!(
                    "'{}' has no value in column {}",
                    key,
                    super::layout::column_letter(col)
                ));
            }

            let cell = CellRef::new(placement.row, col);
            out.push_str(&template[last_end..whole.start()]);
            match qualify {
                Some(sheet) => out.push_str(&cell.qualified(sheet)),
                None => out.push_str(&cell.a1()),
            }
            last_end = whole.end();
        }
        out.push_str(&template[last_end..]);

        if out.contains('{') || out.contains('}') {
            return Err(format!("malformed placeholder in '{}'", template));
        }
        Ok(out)
    }

    fn resolve_column(&self, selector: ColumnSelector, current: Option<u16>) -> Result<u16, String> {
        match selector {
            ColumnSelector::Same => current.ok_or_else(|| {
                "placeholder needs an explicit column outside the calculation sheet".to_string()
            }),
            ColumnSelector::Previous => {
                let col = current.ok_or("'@prev' used outside the calculation sheet")?;
                match self.years.year_of(col) {
                    Some(year) if year > 1 => Ok(col - 1),
                    _ => Err("'@prev' used in year 1".to_string()),
                }
            }
            ColumnSelector::First => Ok(self.years.first),
            ColumnSelector::Last => Ok(self.years.last()),
            ColumnSelector::Year(year) => self
                .years
                .column(year)
                .ok_or_else(|| format!("year {} is outside the projection", year)),
        }
    }
}

fn parse_selector(raw: Option<&str>) -> Result<ColumnSelector, String> {
    match raw {
        None => Ok(ColumnSelector::Same),
        Some("prev") => Ok(ColumnSelector::Previous),
        Some("first") => Ok(ColumnSelector::First),
        Some("last") => Ok(ColumnSelector::Last),
        Some(n) => n
            .parse::<u16>()
            .map(ColumnSelector::Year)
            .map_err(|_| format!("invalid year selector '{}'", n)),
    }
}

/// Build the plan for the given assumptions and template
pub fn build_plan(template: &ValuationTemplate, assumptions: &Assumptions) -> ValuationResult<WorkbookPlan> {
    assumptions.validate()?;
    PlanBuilder::new(template, assumptions)?.build()
}

/// Format of a planned cell, if it holds a value
pub fn cell_format(cell: &PlannedCell) -> Option<ValueFormat> {
    match (&cell.content, cell.style) {
        (CellContent::Text(_), _) => None,
        (_, StyleRole::Value(f)) | (_, StyleRole::Metric(f)) => Some(f),
        _ => None,
    }
}
