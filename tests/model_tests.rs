//! Model properties: layout, column alignment, calculation
//!
//! Exercises the layout pass and calculator together through the public API.

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use valuation_forge::core::formula::{parse_formula, Reference};
use valuation_forge::core::{CalculatedValues, Calculator};
use valuation_forge::model::{build_plan, check_references, private_equity_template, WorkbookPlan};
use valuation_forge::Assumptions;

const PROJECTED: &[&str] = &[
    "revenue",
    "ebitda",
    "net_income",
    "capex",
    "working_capital",
    "beginning_debt",
    "interest_expense",
    "principal_payment",
    "ending_debt",
];

fn plan(assumptions: &Assumptions) -> WorkbookPlan {
    build_plan(&private_equity_template(), assumptions).unwrap()
}

fn calculate(plan: &WorkbookPlan) -> CalculatedValues {
    Calculator::new(plan)
        .with_valuation_date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
        .calculate()
        .unwrap()
}

fn assumptions_with(overrides: &[(&str, f64)]) -> Assumptions {
    let mut a = Assumptions::default();
    for (name, value) in overrides {
        a.set(name, *value).unwrap();
    }
    a
}

// ═══════════════════════════════════════════════════════════════════════════
// COLUMN ALIGNMENT
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_projected_formulas_only_read_current_or_previous_year() {
    let plan = plan(&Assumptions::default());
    let first = plan.first_year_col;

    for key in PROJECTED {
        for year in 2..=5u16 {
            let col = first + year - 1;
            let formula = plan.item_formula(key, year).unwrap();
            let expr = parse_formula(formula).unwrap();
            for reference in expr.references() {
                if let Reference::Name(_) = reference {
                    continue;
                }
                assert_eq!(reference.sheet(), None, "{} year {}: {}", key, year, formula);
                for cell in reference.cells() {
                    assert!(
                        cell.col == col || cell.col == col - 1 || cell.col == first,
                        "{} year {} reads column {} in '{}'",
                        key,
                        year,
                        cell.col,
                        formula
                    );
                }
            }
        }
    }
}

#[test]
fn test_same_year_dependencies_share_a_column() {
    let plan = plan(&Assumptions::default());
    for year in 1..=5u16 {
        let revenue = plan.item_cell("revenue", year).unwrap();
        let ebitda = plan.item_formula("ebitda", year).unwrap();
        assert_eq!(ebitda, format!("={}*ebitda_margin", revenue.a1()));
    }
}

#[test]
fn test_every_formula_reference_resolves() {
    check_references(&plan(&Assumptions::default())).unwrap();
    check_references(&plan(&assumptions_with(&[("exit_year", 3.0)]))).unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════
// DETERMINISM
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_layout_is_deterministic() {
    let a = plan(&Assumptions::default());
    let b = plan(&Assumptions::default());
    assert_eq!(a, b);

    let va = calculate(&a);
    let vb = calculate(&b);
    for key in PROJECTED {
        for year in 1..=5 {
            assert_eq!(va.item(key, year), vb.item(key, year));
        }
    }
}

#[test]
fn test_values_do_not_change_layout() {
    let base = plan(&Assumptions::default());
    let other = plan(&assumptions_with(&[("purchase_price", 300.0), ("tax_rate", 0.3)]));
    assert_eq!(base.items, other.items);
    assert_eq!(
        base.sheet("Valuation Model").unwrap().formulas().collect::<Vec<_>>(),
        other.sheet("Valuation Model").unwrap().formulas().collect::<Vec<_>>()
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// CALCULATED PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_debt_schedule_links_years() {
    let values = calculate(&plan(&assumptions_with(&[("principal_rate", 0.2)])));
    assert_eq!(values.item("beginning_debt", 1), values.item("debt_raised", 1));
    for year in 2..=5 {
        assert_eq!(
            values.item("beginning_debt", year),
            values.item("ending_debt", year - 1)
        );
    }
}

#[test]
fn test_ebitda_tracks_margin() {
    let values = calculate(&plan(&assumptions_with(&[("ebitda_margin", 0.35)])));
    for year in 1..=5 {
        let revenue = values.item("revenue", year).unwrap();
        let ebitda = values.item("ebitda", year).unwrap();
        assert!((ebitda - revenue * 0.35).abs() < 1e-9);
    }
}

#[test]
fn test_exit_year_selects_ebitda_column() {
    let values = calculate(&plan(&assumptions_with(&[("exit_year", 3.0)])));
    let ebitda_y3 = values.item("ebitda", 3).unwrap();
    let exit = values.item("exit_value", 1).unwrap();
    assert!((exit - 8.0 * ebitda_y3).abs() < 1e-9);
    assert_eq!(values.item("debt_remaining", 1), values.item("ending_debt", 3));

    let equity = values.item("equity_value", 1).unwrap();
    let irr = values.item("irr", 1).unwrap();
    let expected = (equity / 40.0).powf(1.0 / 3.0) - 1.0;
    assert!((irr - expected).abs() < 1e-6, "irr {} expected {}", irr, expected);
}

#[test]
fn test_default_returns() {
    let values = calculate(&plan(&Assumptions::default()));
    assert!((values.item("total_sources", 1).unwrap() - 100.0).abs() < 1e-9);
    assert!((values.item("revenue", 2).unwrap() - 105.0).abs() < 1e-9);
    assert!((values.item("revenue", 5).unwrap() - 121.55).abs() < 0.001);
    assert!((values.item("irr", 1).unwrap() - 0.318).abs() < 0.001);
}

#[test]
fn test_invalid_exit_year_is_rejected() {
    let mut a = Assumptions::default();
    a.set("exit_year", 2.5).unwrap();
    assert!(build_plan(&private_equity_template(), &a).is_err());
}
