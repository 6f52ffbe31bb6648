//! Reference closure check
//!
//! Every name a formula reads must be a defined name, and every cell it reads
//! must be populated on an existing sheet. Runs after layout and before the
//! workbook is calculated or written.

use super::plan::{SheetPlan, WorkbookPlan};
use crate::core::formula::evaluator::FUNCTIONS;
use crate::core::formula::{parse_formula, Reference};
use crate::error::{unknown_name_message, ValuationError, ValuationResult};
use tracing::debug;

/// Verify that every formula in the plan resolves
pub fn check_references(plan: &WorkbookPlan) -> ValuationResult<()> {
    let mut checked = 0usize;

    for sheet in &plan.sheets {
        for (cell, formula) in sheet.formulas() {
            let location = format!("{}!{}", sheet.name, cell);
            let expr = parse_formula(formula).map_err(|e| {
                ValuationError::Formula(format!("{} '{}': {}", location, formula, e))
            })?;

            for function in expr.functions() {
                if !FUNCTIONS.contains(&function.as_str()) {
                    return Err(ValuationError::Formula(format!(
                        "{}: {}",
                        location,
                        unknown_name_message("function", &function, FUNCTIONS.iter().copied())
                    )));
                }
            }

            for reference in expr.references() {
                check_reference(plan, sheet, reference)
                    .map_err(|msg| ValuationError::UnresolvedReference(format!("{}: {}", location, msg)))?;
                checked += 1;
            }
        }
    }

    debug!(references = checked, "reference check passed");
    Ok(())
}

fn check_reference(plan: &WorkbookPlan, current: &SheetPlan, reference: &Reference) -> Result<(), String> {
    match reference {
        Reference::Name(name) => {
            if plan.defined_name(name).is_some() {
                Ok(())
            } else {
                Err(unknown_name_message(
                    "name",
                    name,
                    plan.defined_names.iter().map(|d| d.name.as_str()),
                ))
            }
        }
        other => {
            let target = match other.sheet() {
                Some(name) => plan.sheet(name).ok_or_else(|| {
                    unknown_name_message("sheet", name, plan.sheets.iter().map(|s| s.name.as_str()))
                })?,
                None => current,
            };
            match other.cells().into_iter().find(|c| !target.is_populated(*c)) {
                Some(empty) => Err(format!("{}!{} is empty", target.name, empty)),
                None => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builder::build_plan;
    use crate::model::layout::CellRef;
    use crate::model::plan::{DefinedName, PlannedCell, StyleRole};
    use crate::model::template::private_equity_template;
    use crate::types::{Assumptions, ValueFormat};

    fn plan_with(formula: &str) -> WorkbookPlan {
        let mut inputs = SheetPlan::new("Inputs");
        inputs.set(
            CellRef::new(0, 2),
            PlannedCell::number(0.25, StyleRole::Value(ValueFormat::Percent)),
        );
        let mut model = SheetPlan::new("Model");
        model.set(
            CellRef::new(0, 3),
            PlannedCell::number(100.0, StyleRole::Value(ValueFormat::Number)),
        );
        model.set(
            CellRef::new(1, 3),
            PlannedCell::formula(formula, StyleRole::Value(ValueFormat::Number)),
        );
        WorkbookPlan {
            sheets: vec![inputs, model],
            defined_names: vec![DefinedName {
                name: "tax_rate".to_string(),
                sheet: "Inputs".to_string(),
                cell: CellRef::new(0, 2),
            }],
            model_sheet: "Model".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_plan_is_closed() {
        let plan = build_plan(&private_equity_template(), &Assumptions::default()).unwrap();
        check_references(&plan).unwrap();
    }

    #[test]
    fn test_valid_references() {
        check_references(&plan_with("=D1*(1-tax_rate)+Inputs!C1")).unwrap();
    }

    #[test]
    fn test_unknown_name_suggests() {
        let err = check_references(&plan_with("=D1*tax")).unwrap_err();
        match err {
            ValuationError::UnresolvedReference(msg) => {
                assert!(msg.contains("Model!D2"), "{}", msg);
                assert!(msg.contains("did you mean 'tax_rate'"), "{}", msg);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_empty_cell_is_unresolved() {
        let err = check_references(&plan_with("=E1*2")).unwrap_err();
        assert!(matches!(err, ValuationError::UnresolvedReference(ref m) if m.contains("Model!E1 is empty")));
    }

    #[test]
    fn test_range_with_gap_is_unresolved() {
        let err = check_references(&plan_with("=SUM(D1:D3)")).unwrap_err();
        assert!(matches!(err, ValuationError::UnresolvedReference(_)));
    }

    #[test]
    fn test_unknown_sheet() {
        let err = check_references(&plan_with("=Input!C1")).unwrap_err();
        assert!(matches!(err, ValuationError::UnresolvedReference(ref m) if m.contains("Inputs")));
    }

    #[test]
    fn test_unknown_function() {
        let err = check_references(&plan_with("=NPV(0.1,D1)")).unwrap_err();
        assert!(matches!(err, ValuationError::Formula(_)));
    }
}
