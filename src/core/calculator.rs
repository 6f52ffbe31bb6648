use super::formula::{
    evaluate_number, excel_serial, parse_formula, ErrorValue, EvalContext, Expr, Reference,
};
use crate::error::{ValuationError, ValuationResult};
use crate::model::layout::CellRef;
use crate::model::plan::{CellContent, ItemPlacement, WorkbookPlan};
use chrono::{Local, NaiveDate};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

type CellKey = (String, CellRef);

/// Values of every numeric and formula cell in a plan
///
/// A formula that cannot be evaluated has no value; it holds the error value
/// a spreadsheet would show instead, and so does every formula reading it.
#[derive(Debug, Clone, Default)]
pub struct CalculatedValues {
    values: HashMap<CellKey, f64>,
    errors: HashMap<CellKey, ErrorValue>,
    items: BTreeMap<String, ItemPlacement>,
    model_sheet: String,
    first_year_col: u16,
    valuation_date: Option<NaiveDate>,
}

impl CalculatedValues {
    pub fn get(&self, sheet: &str, cell: CellRef) -> Option<f64> {
        self.values.get(&(sheet.to_string(), cell)).copied()
    }

    /// Error value of a formula cell that failed to evaluate
    pub fn error(&self, sheet: &str, cell: CellRef) -> Option<ErrorValue> {
        self.errors.get(&(sheet.to_string(), cell)).copied()
    }

    /// Value of a line item in a 1-based projection year
    pub fn item(&self, key: &str, year: u16) -> Option<f64> {
        self.get(&self.model_sheet, self.item_cell(key, year)?)
    }

    /// Error value of a line item in a 1-based projection year
    pub fn item_error(&self, key: &str, year: u16) -> Option<ErrorValue> {
        self.error(&self.model_sheet, self.item_cell(key, year)?)
    }

    fn item_cell(&self, key: &str, year: u16) -> Option<CellRef> {
        let placement = self.items.get(key)?;
        let col = self.first_year_col.checked_add(year.checked_sub(1)?)?;
        placement
            .columns
            .contains(&col)
            .then(|| CellRef::new(placement.row, col))
    }

    /// Formula cells holding an error value
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Date that TODAY() resolved to
    pub fn valuation_date(&self) -> Option<NaiveDate> {
        self.valuation_date
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Formula calculator with dependency resolution
///
/// Every formula cell becomes a graph node; an edge runs from each formula
/// cell it reads to the reader. Cells are evaluated in topological order.
pub struct Calculator<'a> {
    plan: &'a WorkbookPlan,
    valuation_date: NaiveDate,
}

impl<'a> Calculator<'a> {
    #[must_use]
    pub fn new(plan: &'a WorkbookPlan) -> Self {
        Self {
            plan,
            valuation_date: Local::now().date_naive(),
        }
    }

    /// Pin the date returned by TODAY()
    #[must_use]
    pub fn with_valuation_date(mut self, date: NaiveDate) -> Self {
        self.valuation_date = date;
        self
    }

    pub fn calculate(&self) -> ValuationResult<CalculatedValues> {
        let mut values: HashMap<CellKey, f64> = HashMap::new();
        let mut formulas: Vec<(CellKey, Expr)> = Vec::new();

        for sheet in &self.plan.sheets {
            for (cell, planned) in &sheet.cells {
                let key = (sheet.name.clone(), *cell);
                match &planned.content {
                    CellContent::Number(n) => {
                        values.insert(key, *n);
                    }
                    CellContent::Formula(f) => {
                        let expr = parse_formula(f).map_err(|e| {
                            ValuationError::Formula(format!(
                                "{}!{} '{}': {}",
                                sheet.name, cell, f, e
                            ))
                        })?;
                        formulas.push((key, expr));
                    }
                    CellContent::Text(_) => {}
                }
            }
        }

        let names: HashMap<String, CellKey> = self
            .plan
            .defined_names
            .iter()
            .map(|d| (d.name.clone(), (d.sheet.clone(), d.cell)))
            .collect();

        let order = calculation_order(&formulas, &names)?;

        let today = excel_serial(self.valuation_date);
        let mut errors: HashMap<CellKey, ErrorValue> = HashMap::new();
        for index in order {
            let ((sheet, cell), expr) = &formulas[index];
            let ctx = EvalContext {
                cells: &values,
                errors: &errors,
                names: &names,
                sheet,
                today,
            };
            match evaluate_number(expr, &ctx) {
                Ok(value) => {
                    values.insert((sheet.clone(), *cell), value);
                }
                Err(e) => {
                    warn!(cell = %format!("{}!{}", sheet, cell), "{}", e);
                    errors.insert((sheet.clone(), *cell), e.value);
                }
            }
        }

        debug!(
            cells = values.len(),
            formulas = formulas.len(),
            errors = errors.len(),
            date = %self.valuation_date,
            "calculation complete"
        );

        Ok(CalculatedValues {
            values,
            errors,
            items: self.plan.items.clone(),
            model_sheet: self.plan.model_sheet.clone(),
            first_year_col: self.plan.first_year_col,
            valuation_date: Some(self.valuation_date),
        })
    }
}

/// Cells a formula reads, with names resolved to their target cells
fn dependencies(sheet: &str, expr: &Expr, names: &HashMap<String, CellKey>) -> Vec<CellKey> {
    let mut deps = Vec::new();
    for reference in expr.references() {
        match reference {
            Reference::Name(name) => {
                if let Some(target) = names.get(name) {
                    deps.push(target.clone());
                }
            }
            other => {
                let target_sheet = other.sheet().unwrap_or(sheet);
                deps.extend(
                    other
                        .cells()
                        .into_iter()
                        .map(|cell| (target_sheet.to_string(), cell)),
                );
            }
        }
    }
    deps
}

/// Indices into `formulas` in evaluation order
fn calculation_order(
    formulas: &[(CellKey, Expr)],
    names: &HashMap<String, CellKey>,
) -> ValuationResult<Vec<usize>> {
    let mut graph: DiGraph<usize, ()> = DiGraph::new();
    let mut node_indices: HashMap<&CellKey, NodeIndex> = HashMap::new();

    for (index, (key, _)) in formulas.iter().enumerate() {
        let node = graph.add_node(index);
        node_indices.insert(key, node);
    }

    for (key, expr) in formulas {
        let Some(&reader) = node_indices.get(key) else {
            continue;
        };
        for dep in dependencies(&key.0, expr, names) {
            if let Some(&dep_idx) = node_indices.get(&dep) {
                graph.add_edge(dep_idx, reader, ());
            }
        }
    }

    let order = toposort(&graph, None).map_err(|cycle| {
        let cell = graph
            .node_weight(cycle.node_id())
            .map(|i| format!("{}!{}", formulas[*i].0 .0, formulas[*i].0 .1))
            .unwrap_or_default();
        ValuationError::CircularDependency(format!("cycle through {}", cell))
    })?;

    Ok(order
        .iter()
        .filter_map(|idx| graph.node_weight(*idx).copied())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builder::build_plan;
    use crate::model::plan::{PlannedCell, SheetPlan, StyleRole};
    use crate::model::template::private_equity_template;
    use crate::types::{Assumptions, ValueFormat};

    const EPS: f64 = 1e-9;

    fn valuation_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn default_values() -> CalculatedValues {
        let plan = build_plan(&private_equity_template(), &Assumptions::default()).unwrap();
        Calculator::new(&plan)
            .with_valuation_date(valuation_date())
            .calculate()
            .unwrap()
    }

    fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("value missing");
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_revenue_grows_from_initial_revenue() {
        let v = default_values();
        let expected = [100.0, 105.0, 110.25, 115.7625, 121.550625];
        for (i, e) in expected.iter().enumerate() {
            assert_close(v.item("revenue", i as u16 + 1), *e);
            assert_close(v.item("ebitda", i as u16 + 1), e * 0.2);
        }
    }

    #[test]
    fn test_sources_match_purchase_price() {
        let v = default_values();
        assert_close(v.item("debt_raised", 1), 60.0);
        assert_close(v.item("equity_raised", 1), 40.0);
        assert_close(v.item("total_sources", 1), 100.0);
        assert_close(v.item("total_uses", 1), 102.0);
    }

    #[test]
    fn test_debt_rolls_forward() {
        let v = default_values();
        assert_close(v.item("beginning_debt", 1), 60.0);
        assert_close(v.item("principal_payment", 1), 6.0);
        assert_close(v.item("interest_expense", 1), 3.0);
        for year in 2..=5 {
            let prev_end = v.item("ending_debt", year - 1).unwrap();
            assert_close(v.item("beginning_debt", year), prev_end);
        }
        assert_close(v.item("ending_debt", 5), 35.4294);
    }

    #[test]
    fn test_exit_and_returns() {
        let v = default_values();
        assert_close(v.item("exit_value", 1), 194.481);
        assert_close(v.item("debt_remaining", 1), 35.4294);
        assert_close(v.item("equity_value", 1), 159.0516);

        let irr = v.item("irr", 1).unwrap();
        let expected = (159.0516_f64 / 40.0).powf(0.2) - 1.0;
        assert!((irr - expected).abs() < 1e-6, "irr {}", irr);
        assert!((irr - 0.318).abs() < 0.001);
    }

    #[test]
    fn test_cash_flow_dates_follow_valuation_date() {
        let v = default_values();
        let entry = excel_serial(valuation_date());
        assert_close(v.item("cash_flow_date", 1), entry);
        assert_close(v.item("cash_flow_date", 2), entry + 365.0 * 5.0);
        assert_eq!(v.valuation_date(), Some(valuation_date()));
    }

    #[test]
    fn test_item_outside_its_columns_is_none() {
        let v = default_values();
        assert!(v.item("exit_value", 2).is_none());
        assert!(v.item("revenue", 0).is_none());
        assert!(v.item("revenue", 6).is_none());
        assert!(v.item("revenue", u16::MAX).is_none());
        assert!(v.item("no_such_item", 1).is_none());
        assert_eq!(v.error_count(), 0);
    }

    fn sheet_with(formulas: &[(CellRef, &str)]) -> WorkbookPlan {
        let mut sheet = SheetPlan::new("S");
        for (cell, f) in formulas {
            sheet.set(
                *cell,
                PlannedCell::formula(*f, StyleRole::Value(ValueFormat::Number)),
            );
        }
        WorkbookPlan {
            sheets: vec![sheet],
            model_sheet: "S".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_order_is_independent_of_layout() {
        // B1 reads A2 which sits later in row-major order
        let plan = sheet_with(&[
            (CellRef::new(0, 1), "=A2*2"),
            (CellRef::new(1, 0), "=21"),
        ]);
        let v = Calculator::new(&plan).calculate().unwrap();
        assert!((v.get("S", CellRef::new(0, 1)).unwrap() - 42.0).abs() < EPS);
    }

    #[test]
    fn test_circular_reference_is_reported() {
        let plan = sheet_with(&[(CellRef::new(0, 0), "=B1+1"), (CellRef::new(0, 1), "=A1+1")]);
        let err = Calculator::new(&plan).calculate().unwrap_err();
        assert!(matches!(err, ValuationError::CircularDependency(_)));
    }

    #[test]
    fn test_unparseable_formula_is_reported() {
        let plan = sheet_with(&[(CellRef::new(0, 0), "=1+*2")]);
        let err = Calculator::new(&plan).calculate().unwrap_err();
        assert!(matches!(err, ValuationError::Formula(_)));
    }

    #[test]
    fn test_failed_formula_holds_error_value() {
        let plan = sheet_with(&[
            (CellRef::new(0, 0), "=1/0"),
            (CellRef::new(0, 1), "=A1*2"),
            (CellRef::new(0, 2), "=5"),
        ]);
        let v = Calculator::new(&plan).calculate().unwrap();

        assert_eq!(v.get("S", CellRef::new(0, 0)), None);
        assert_eq!(v.error("S", CellRef::new(0, 0)), Some(ErrorValue::Div0));
        assert_eq!(v.error("S", CellRef::new(0, 1)), Some(ErrorValue::Div0));
        assert!((v.get("S", CellRef::new(0, 2)).unwrap() - 5.0).abs() < EPS);
        assert_eq!(v.error_count(), 2);
    }

    #[test]
    fn test_exit_below_debt_has_no_irr() {
        let mut assumptions = Assumptions::default();
        assumptions.set("exit_multiple", 1.0).unwrap();
        let plan = build_plan(&private_equity_template(), &assumptions).unwrap();
        let v = Calculator::new(&plan)
            .with_valuation_date(valuation_date())
            .calculate()
            .unwrap();

        assert!(v.item("equity_value", 1).unwrap() < 0.0);
        assert_eq!(v.item("irr", 1), None);
        assert_eq!(v.item_error("irr", 1), Some(ErrorValue::Num));
        assert_close(v.item("revenue", 5), 121.550625);
    }
}
