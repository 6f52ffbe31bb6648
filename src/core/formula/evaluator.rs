//! Formula evaluator
//!
//! Evaluates an AST against the values already computed for the workbook.

use super::parser::{BinaryOp, Expr, Reference};
use crate::model::layout::CellRef;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Excel stores dates as days since 1899-12-30
pub fn excel_serial(date: NaiveDate) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or(NaiveDate::MIN);
    (date - epoch).num_days() as f64
}

/// Value type that can be returned from evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    /// Range contents, row-major
    Array(Vec<f64>),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Array(values) if values.len() == 1 => Some(values[0]),
            Value::Array(_) => None,
        }
    }

    /// Flatten numbers and arrays into one list
    fn numbers(&self) -> Vec<f64> {
        match self {
            Value::Number(n) => vec![*n],
            Value::Array(values) => values.clone(),
        }
    }
}

/// Error value a spreadsheet shows in a cell whose formula fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorValue {
    Div0,
    Num,
    Ref,
    Value,
    Name,
}

impl ErrorValue {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorValue::Div0 => "#DIV/0!",
            ErrorValue::Num => "#NUM!",
            ErrorValue::Ref => "#REF!",
            ErrorValue::Value => "#VALUE!",
            ErrorValue::Name => "#NAME?",
        }
    }
}

impl std::fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values visible to a formula while it is evaluated
#[derive(Debug, Clone)]
pub struct EvalContext<'a> {
    /// Computed cell values keyed by (sheet, cell)
    pub cells: &'a HashMap<(String, CellRef), f64>,
    /// Cells whose formula already failed
    pub errors: &'a HashMap<(String, CellRef), ErrorValue>,
    /// Defined name -> (sheet, cell)
    pub names: &'a HashMap<String, (String, CellRef)>,
    /// Sheet that unqualified references belong to
    pub sheet: &'a str,
    /// Serial returned by TODAY()
    pub today: f64,
}

impl<'a> EvalContext<'a> {
    fn cell_value(&self, sheet: Option<&str>, cell: CellRef) -> Result<f64, EvalError> {
        let sheet = sheet.unwrap_or(self.sheet);
        let key = (sheet.to_string(), cell);
        if let Some(error) = self.errors.get(&key) {
            return Err(EvalError::new(*error, format!("{}!{} is {}", sheet, cell, error)));
        }
        self.cells
            .get(&key)
            .copied()
            .ok_or_else(|| EvalError::new(ErrorValue::Ref, format!("No value in {}!{}", sheet, cell)))
    }

    fn name_value(&self, name: &str) -> Result<f64, EvalError> {
        let (sheet, cell) = self
            .names
            .get(name)
            .ok_or_else(|| EvalError::new(ErrorValue::Name, format!("Unknown name: {}", name)))?;
        self.cell_value(Some(sheet), *cell)
    }
}

/// Error during evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    /// What the cell shows
    pub value: ErrorValue,
    pub message: String,
}

impl EvalError {
    pub fn new(value: ErrorValue, message: impl Into<String>) -> Self {
        Self {
            value,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.value, self.message)
    }
}

impl std::error::Error for EvalError {}

/// Evaluate an expression in the given context
pub fn evaluate(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Reference(reference) => evaluate_reference(reference, ctx),
        Expr::FunctionCall { name, args } => evaluate_function(name, args, ctx),
        Expr::BinaryOp { op, left, right } => {
            let l = scalar(&evaluate(left, ctx)?)?;
            let r = scalar(&evaluate(right, ctx)?)?;
            evaluate_binary_op(*op, l, r).map(Value::Number)
        }
        Expr::Negate(inner) => {
            let v = scalar(&evaluate(inner, ctx)?)?;
            Ok(Value::Number(-v))
        }
    }
}

/// Evaluate and require a finite number
pub fn evaluate_number(expr: &Expr, ctx: &EvalContext<'_>) -> Result<f64, EvalError> {
    let value = scalar(&evaluate(expr, ctx)?)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::new(ErrorValue::Num, "result is not finite"))
    }
}

fn scalar(value: &Value) -> Result<f64, EvalError> {
    value.as_number().ok_or_else(|| {
        EvalError::new(ErrorValue::Value, format!("Expected a number, got {:?}", value))
    })
}

fn evaluate_reference(reference: &Reference, ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    match reference {
        Reference::Name(name) => ctx.name_value(name).map(Value::Number),
        Reference::Cell { sheet, cell } => ctx.cell_value(sheet.as_deref(), *cell).map(Value::Number),
        Reference::Range { sheet, .. } => reference
            .cells()
            .into_iter()
            .map(|cell| ctx.cell_value(sheet.as_deref(), cell))
            .collect::<Result<Vec<f64>, _>>()
            .map(Value::Array),
    }
}

fn evaluate_binary_op(op: BinaryOp, left: f64, right: f64) -> Result<f64, EvalError> {
    match op {
        BinaryOp::Add => Ok(left + right),
        BinaryOp::Sub => Ok(left - right),
        BinaryOp::Mul => Ok(left * right),
        BinaryOp::Div => {
            if right == 0.0 {
                Err(EvalError::new(ErrorValue::Div0, "Division by zero"))
            } else {
                Ok(left / right)
            }
        }
        BinaryOp::Pow => {
            let result = left.powf(right);
            if result.is_nan() {
                Err(EvalError::new(
                    ErrorValue::Num,
                    format!("{}^{} is undefined", left, right),
                ))
            } else {
                Ok(result)
            }
        }
    }
}

fn evaluate_function(name: &str, args: &[Expr], ctx: &EvalContext<'_>) -> Result<Value, EvalError> {
    let upper = name.to_uppercase();

    match upper.as_str() {
        "SUM" => {
            let mut total = 0.0;
            for arg in args {
                total += evaluate(arg, ctx)?.numbers().iter().sum::<f64>();
            }
            Ok(Value::Number(total))
        }
        "TODAY" => {
            require_args(&upper, args, 0, 0)?;
            Ok(Value::Number(ctx.today))
        }
        "INDEX" => {
            require_args(&upper, args, 2, 2)?;
            let array = evaluate(&args[0], ctx)?.numbers();
            let position = scalar(&evaluate(&args[1], ctx)?)?;
            if position.fract() != 0.0 || position < 1.0 || position as usize > array.len() {
                return Err(EvalError::new(
                    ErrorValue::Ref,
                    format!("INDEX position {} outside 1..={}", position, array.len()),
                ));
            }
            Ok(Value::Number(array[position as usize - 1]))
        }
        "XIRR" => {
            require_args(&upper, args, 2, 3)?;
            let flows = evaluate(&args[0], ctx)?.numbers();
            let dates = evaluate(&args[1], ctx)?.numbers();
            let guess = match args.get(2) {
                Some(expr) => scalar(&evaluate(expr, ctx)?)?,
                None => 0.1,
            };
            xirr(&flows, &dates, guess).map(Value::Number)
        }
        _ => Err(EvalError::new(
            ErrorValue::Name,
            format!("Unknown function: {}", name),
        )),
    }
}

fn require_args(name: &str, args: &[Expr], min: usize, max: usize) -> Result<(), EvalError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{}-{}", min, max)
        };
        return Err(EvalError::new(
            ErrorValue::Value,
            format!("{} expects {} argument(s), got {}", name, expected, args.len()),
        ));
    }
    Ok(())
}

/// Supported function names
pub const FUNCTIONS: &[&str] = &["SUM", "TODAY", "INDEX", "XIRR"];

/// Internal rate of return for irregular cash flows (Excel XIRR)
///
/// Solves sum(v_i / (1 + r)^((d_i - d_0) / 365)) = 0. Newton iteration from
/// `guess`, falling back to bisection when Newton leaves the domain.
pub fn xirr(flows: &[f64], dates: &[f64], guess: f64) -> Result<f64, EvalError> {
    if flows.len() != dates.len() || flows.len() < 2 {
        return Err(EvalError::new(
            ErrorValue::Num,
            "XIRR needs matching cash flows and dates (at least two)",
        ));
    }
    if !flows.iter().any(|v| *v > 0.0) || !flows.iter().any(|v| *v < 0.0) {
        return Err(EvalError::new(
            ErrorValue::Num,
            "XIRR needs at least one positive and one negative cash flow",
        ));
    }

    let d0 = dates[0];
    let years: Vec<f64> = dates.iter().map(|d| (d - d0) / 365.0).collect();

    let npv = |rate: f64| -> f64 {
        flows
            .iter()
            .zip(&years)
            .map(|(v, t)| v / (1.0 + rate).powf(*t))
            .sum()
    };
    let d_npv = |rate: f64| -> f64 {
        flows
            .iter()
            .zip(&years)
            .map(|(v, t)| -t * v / (1.0 + rate).powf(t + 1.0))
            .sum()
    };

    const TOLERANCE: f64 = 1e-10;
    const MAX_ITERATIONS: usize = 100;

    let mut rate = guess;
    for _ in 0..MAX_ITERATIONS {
        let f = npv(rate);
        let df = d_npv(rate);
        if !f.is_finite() || !df.is_finite() || df == 0.0 {
            break;
        }
        let next = rate - f / df;
        if next <= -1.0 || !next.is_finite() {
            break;
        }
        if (next - rate).abs() < TOLERANCE {
            return Ok(next);
        }
        rate = next;
    }

    // Bisection over a bracket with a sign change
    let (mut lo, mut hi) = (-0.999_999, 100.0);
    let (mut f_lo, f_hi) = (npv(lo), npv(hi));
    if f_lo.signum() == f_hi.signum() {
        return Err(EvalError::new(ErrorValue::Num, "XIRR did not converge"));
    }
    for _ in 0..500 {
        let mid = (lo + hi) / 2.0;
        let f_mid = npv(mid);
        if f_mid.abs() < TOLERANCE || (hi - lo) / 2.0 < TOLERANCE {
            return Ok(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }
    Ok((lo + hi) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::formula::parser::parse_formula;

    fn eval_with(
        formula: &str,
        cells: &HashMap<(String, CellRef), f64>,
        names: &HashMap<String, (String, CellRef)>,
    ) -> Result<f64, EvalError> {
        let errors = HashMap::new();
        let ctx = EvalContext {
            cells,
            errors: &errors,
            names,
            sheet: "Model",
            today: 45000.0,
        };
        let expr = parse_formula(formula).unwrap();
        evaluate_number(&expr, &ctx)
    }

    fn eval(formula: &str) -> Result<f64, EvalError> {
        eval_with(formula, &HashMap::new(), &HashMap::new())
    }

    fn sample() -> (
        HashMap<(String, CellRef), f64>,
        HashMap<String, (String, CellRef)>,
    ) {
        let mut cells = HashMap::new();
        cells.insert(("Inputs".to_string(), CellRef::new(0, 2)), 0.05);
        cells.insert(("Model".to_string(), CellRef::new(0, 3)), 100.0);
        cells.insert(("Model".to_string(), CellRef::new(0, 4)), 105.0);
        cells.insert(("Model".to_string(), CellRef::new(0, 5)), 110.25);
        let mut names = HashMap::new();
        names.insert(
            "growth".to_string(),
            ("Inputs".to_string(), CellRef::new(0, 2)),
        );
        (cells, names)
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert_eq!(eval("=1+2*3").unwrap(), 7.0);
        assert_eq!(eval("=(1+2)*3").unwrap(), 9.0);
        assert_eq!(eval("=2^3^2").unwrap(), 64.0);
        assert_eq!(eval("=-2^2").unwrap(), 4.0);
        assert_eq!(eval("=10-4-3").unwrap(), 3.0);
    }

    #[test]
    fn test_division_by_zero() {
        let err = eval("=1/0").unwrap_err();
        assert_eq!(err.value, ErrorValue::Div0);
        assert!(err.to_string().starts_with("#DIV/0!"));
    }

    #[test]
    fn test_failed_cell_propagates_its_error() {
        let (cells, names) = sample();
        let mut errors = HashMap::new();
        errors.insert(("Model".to_string(), CellRef::new(1, 3)), ErrorValue::Num);
        let ctx = EvalContext {
            cells: &cells,
            errors: &errors,
            names: &names,
            sheet: "Model",
            today: 45000.0,
        };

        let err = evaluate_number(&parse_formula("=D2*2+D1").unwrap(), &ctx).unwrap_err();
        assert_eq!(err.value, ErrorValue::Num);
        let err = evaluate_number(&parse_formula("=SUM(D1:D2)").unwrap(), &ctx).unwrap_err();
        assert_eq!(err.value, ErrorValue::Num);
        assert_eq!(evaluate_number(&parse_formula("=D1").unwrap(), &ctx).unwrap(), 100.0);
    }

    #[test]
    fn test_names_and_cells() {
        let (cells, names) = sample();
        let v = eval_with("=D1*(1+growth)", &cells, &names).unwrap();
        assert!((v - 105.0).abs() < 1e-9);
        let v = eval_with("=Inputs!$C$1", &cells, &names).unwrap();
        assert_eq!(v, 0.05);
    }

    #[test]
    fn test_sum_and_index_over_range() {
        let (cells, names) = sample();
        assert_eq!(eval_with("=SUM(D1:F1)", &cells, &names).unwrap(), 315.25);
        assert_eq!(eval_with("=INDEX(D1:F1,2)", &cells, &names).unwrap(), 105.0);
        let err = eval_with("=INDEX(D1:F1,4)", &cells, &names).unwrap_err();
        assert_eq!(err.value, ErrorValue::Ref);
    }

    #[test]
    fn test_missing_cell_and_name() {
        let (cells, names) = sample();
        assert_eq!(eval_with("=Z9", &cells, &names).unwrap_err().value, ErrorValue::Ref);
        assert_eq!(
            eval_with("=unknown_rate", &cells, &names).unwrap_err().value,
            ErrorValue::Name
        );
    }

    #[test]
    fn test_today_uses_context() {
        assert_eq!(eval("=TODAY()+365").unwrap(), 45365.0);
        assert_eq!(eval("=TODAY(1)").unwrap_err().value, ErrorValue::Value);
    }

    #[test]
    fn test_unknown_function() {
        for formula in ["=NPV(0.1,1)", "=MAX(1,2)"] {
            let err = eval(formula).unwrap_err();
            assert_eq!(err.value, ErrorValue::Name);
            assert!(err.message.contains("Unknown function"), "{}", err);
        }
    }

    #[test]
    fn test_excel_serial() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(excel_serial(date), 45658.0);
    }

    #[test]
    fn test_xirr_doubling_over_one_year() {
        let r = xirr(&[-100.0, 200.0], &[0.0, 365.0], 0.1).unwrap();
        assert!((r - 1.0).abs() < 1e-8);
    }

    #[test]
    fn test_xirr_five_year_hold() {
        let r = xirr(&[-40.0, 159.0516], &[45000.0, 46825.0], 0.1).unwrap();
        let expected = (159.0516_f64 / 40.0).powf(0.2) - 1.0;
        assert!((r - expected).abs() < 1e-8);
    }

    #[test]
    fn test_xirr_requires_sign_change() {
        let err = xirr(&[-100.0, -20.0], &[0.0, 365.0], 0.1).unwrap_err();
        assert_eq!(err.value, ErrorValue::Num);
        assert!(xirr(&[100.0, 200.0], &[0.0, 365.0], 0.1).is_err());
        assert!(xirr(&[-100.0], &[0.0], 0.1).is_err());
    }

    #[test]
    fn test_xirr_negative_return() {
        let r = xirr(&[-100.0, 50.0], &[0.0, 365.0], 0.1).unwrap();
        assert!((r + 0.5).abs() < 1e-8);
    }
}
