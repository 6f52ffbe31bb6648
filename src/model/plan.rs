//! In-memory workbook produced by the layout pass
//!
//! The exporter renders a [`WorkbookPlan`] cell by cell; the calculator and
//! the reference checker read it without touching any spreadsheet library.

use super::layout::CellRef;
use crate::types::ValueFormat;
use std::collections::BTreeMap;

/// Visual role of a cell, mapped to a concrete format by the style config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleRole {
    /// Sheet title banner
    Title,
    /// Category banner on the parameter sheet
    CategoryBanner,
    /// Column header row of the calculation sheet
    ColumnHeader,
    /// Shaded section banner on the calculation sheet
    SectionBanner,
    /// Sub-heading on the summary sheet
    Heading,
    /// Bold row label
    Label,
    /// Plain text
    Text,
    /// Numeric value or formula
    Value(ValueFormat),
    /// Summary metric value
    Metric(ValueFormat),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    Text(String),
    Number(f64),
    /// Formula text including the leading `=`
    Formula(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCell {
    pub content: CellContent,
    pub style: StyleRole,
}

impl PlannedCell {
    pub fn text(text: impl Into<String>, style: StyleRole) -> Self {
        Self {
            content: CellContent::Text(text.into()),
            style,
        }
    }

    pub fn number(value: f64, style: StyleRole) -> Self {
        Self {
            content: CellContent::Number(value),
            style,
        }
    }

    pub fn formula(formula: impl Into<String>, style: StyleRole) -> Self {
        Self {
            content: CellContent::Formula(formula.into()),
            style,
        }
    }

    pub fn formula_text(&self) -> Option<&str> {
        match &self.content {
            CellContent::Formula(f) => Some(f),
            _ => None,
        }
    }
}

/// A merged block of cells; the value lives in the top-left cell
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRange {
    pub first: CellRef,
    pub last: CellRef,
    pub text: String,
    pub style: StyleRole,
}

/// Three-color scale applied to a row span
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScaleRange {
    pub first: CellRef,
    pub last: CellRef,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SheetPlan {
    pub name: String,
    pub cells: BTreeMap<CellRef, PlannedCell>,
    pub merges: Vec<MergedRange>,
    pub column_widths: BTreeMap<u16, f64>,
    pub color_scales: Vec<ColorScaleRange>,
}

impl SheetPlan {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn set(&mut self, cell: CellRef, planned: PlannedCell) {
        self.cells.insert(cell, planned);
    }

    pub fn get(&self, cell: CellRef) -> Option<&PlannedCell> {
        self.cells.get(&cell)
    }

    /// Merged ranges also populate their anchor cell
    pub fn merge(&mut self, first: CellRef, last: CellRef, text: &str, style: StyleRole) {
        self.merges.push(MergedRange {
            first,
            last,
            text: text.to_string(),
            style,
        });
    }

    pub fn is_populated(&self, cell: CellRef) -> bool {
        self.cells.contains_key(&cell) || self.merges.iter().any(|m| m.first == cell)
    }

    pub fn formulas(&self) -> impl Iterator<Item = (CellRef, &str)> {
        self.cells
            .iter()
            .filter_map(|(cell, planned)| planned.formula_text().map(|f| (*cell, f)))
    }
}

/// Workbook-scoped defined name bound to a single cell
#[derive(Debug, Clone, PartialEq)]
pub struct DefinedName {
    pub name: String,
    pub sheet: String,
    pub cell: CellRef,
}

impl DefinedName {
    /// Reference text as stored in the workbook (`Assumptions!$C$3`)
    pub fn reference(&self) -> String {
        format!(
            "{}!{}",
            super::layout::quote_sheet_name(&self.sheet),
            self.cell.absolute()
        )
    }
}

/// Rows of a keyed line item on the calculation sheet
#[derive(Debug, Clone, PartialEq)]
pub struct ItemPlacement {
    pub row: u32,
    pub label: String,
    /// Year columns that received a formula
    pub columns: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkbookPlan {
    pub sheets: Vec<SheetPlan>,
    pub defined_names: Vec<DefinedName>,
    /// Line item key -> placement on the calculation sheet
    pub items: BTreeMap<String, ItemPlacement>,
    /// Name of the calculation sheet that `items` refers to
    pub model_sheet: String,
    /// First year column
    pub first_year_col: u16,
}

impl WorkbookPlan {
    pub fn sheet(&self, name: &str) -> Option<&SheetPlan> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn defined_name(&self, name: &str) -> Option<&DefinedName> {
        self.defined_names.iter().find(|d| d.name == name)
    }

    /// Cell of a line item in a 1-based projection year
    pub fn item_cell(&self, key: &str, year: u16) -> Option<CellRef> {
        let placement = self.items.get(key)?;
        let col = self.first_year_col.checked_add(year.checked_sub(1)?)?;
        placement
            .columns
            .contains(&col)
            .then(|| CellRef::new(placement.row, col))
    }

    /// Formula text of a line item in a 1-based projection year
    pub fn item_formula(&self, key: &str, year: u16) -> Option<&str> {
        let cell = self.item_cell(key, year)?;
        self.sheet(&self.model_sheet)?.get(cell)?.formula_text()
    }
}
