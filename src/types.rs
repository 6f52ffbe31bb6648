use crate::error::{unknown_name_message, ValuationError, ValuationResult};
use serde::{Deserialize, Serialize};

/// Number of projection years laid out on the calculation sheet
pub const PROJECTION_YEARS: u16 = 5;

/// Marker that switches a row to percentage formatting
pub const PERCENT_MARKER: char = '%';

//==============================================================================
// Parameters
//==============================================================================

/// Display grouping for a parameter. Has no computational effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Transaction,
    Financing,
    Operating,
    Exit,
}

impl Category {
    /// Banner title rendered on the parameter sheet
    pub fn title(&self) -> &'static str {
        match self {
            Category::Transaction => "Transaction Assumptions",
            Category::Financing => "Financing Assumptions",
            Category::Operating => "Operating Assumptions",
            Category::Exit => "Exit Assumptions",
        }
    }
}

/// Cell number format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    /// `0.0%`
    Percent,
    /// `#,##0.0`
    Number,
    /// `yyyy-mm-dd`
    Date,
}

impl ValueFormat {
    /// Percent when the label carries the percent marker, number otherwise
    pub fn from_label(label: &str) -> Self {
        if label.contains(PERCENT_MARKER) {
            ValueFormat::Percent
        } else {
            ValueFormat::Number
        }
    }

    pub fn num_format(&self) -> &'static str {
        match self {
            ValueFormat::Percent => "0.0%",
            ValueFormat::Number => "#,##0.0",
            ValueFormat::Date => "yyyy-mm-dd",
        }
    }
}

/// A named scalar input of the valuation model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Identifier used in formulas and as the defined name
    pub name: String,
    /// Human-readable label
    pub label: String,
    pub value: f64,
    pub category: Category,
}

impl Parameter {
    pub fn new(name: &str, label: &str, value: f64, category: Category) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            value,
            category,
        }
    }

    pub fn format(&self) -> ValueFormat {
        ValueFormat::from_label(&self.label)
    }
}

//==============================================================================
// Assumptions
//==============================================================================

/// Ordered set of parameters (display order is preserved)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assumptions {
    parameters: Vec<Parameter>,
}

impl Default for Assumptions {
    fn default() -> Self {
        use Category::*;
        let parameters = vec![
            Parameter::new("purchase_price", "Purchase Price ($M)", 100.0, Transaction),
            Parameter::new("ebitda_multiple", "EBITDA Multiple", 8.0, Transaction),
            Parameter::new("revenue_multiple", "Revenue Multiple", 2.0, Transaction),
            Parameter::new("debt_financing", "Debt Financing (%)", 0.6, Financing),
            Parameter::new("equity_financing", "Equity Financing (%)", 0.4, Financing),
            Parameter::new("synergies", "Synergies ($M)", 5.0, Financing),
            Parameter::new("interest_rate", "Interest Rate (%)", 0.05, Financing),
            Parameter::new("principal_rate", "Principal Repayment Rate (%)", 0.1, Financing),
            Parameter::new("transaction_fees", "Transaction Fees ($M)", 2.0, Financing),
            Parameter::new("refinanced_debt", "Debt to be Refinanced ($M)", 0.0, Financing),
            Parameter::new("ebitda_margin", "EBITDA Margin (%)", 0.2, Operating),
            Parameter::new("tax_rate", "Tax Rate (%)", 0.25, Operating),
            Parameter::new("capex_rate", "CapEx (% of Revenue)", 0.05, Operating),
            Parameter::new("wc_rate", "Working Capital (% of Revenue)", 0.1, Operating),
            Parameter::new("revenue_growth", "Annual Revenue Growth (%)", 0.05, Operating),
            Parameter::new("initial_revenue", "Initial Revenue ($M)", 100.0, Operating),
            Parameter::new("exit_year", "Exit Year", 5.0, Exit),
            Parameter::new("exit_multiple", "Exit EBITDA Multiple", 8.0, Exit),
        ];
        Self { parameters }
    }
}

impl Assumptions {
    /// Build from an explicit parameter list (display order as given)
    pub fn from_parameters(parameters: Vec<Parameter>) -> ValuationResult<Self> {
        let mut seen = std::collections::HashSet::new();
        for p in &parameters {
            if !is_valid_identifier(&p.name) {
                return Err(ValuationError::Validation(format!(
                    "'{}' is not a valid parameter identifier",
                    p.name
                )));
            }
            if !seen.insert(p.name.as_str()) {
                return Err(ValuationError::Validation(format!(
                    "duplicate parameter '{}'",
                    p.name
                )));
            }
        }
        Ok(Self { parameters })
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|p| p.value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    /// Override the value of an existing parameter
    pub fn set(&mut self, name: &str, value: f64) -> ValuationResult<()> {
        if !value.is_finite() {
            return Err(ValuationError::Validation(format!(
                "value for '{}' must be finite, got {}",
                name, value
            )));
        }
        let names: Vec<String> = self.names().map(str::to_string).collect();
        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(param) => {
                param.value = value;
                Ok(())
            }
            None => Err(ValuationError::Validation(unknown_name_message(
                "parameter",
                name,
                names.iter().map(String::as_str),
            ))),
        }
    }

    /// Check the cross-parameter constraints the template relies on
    pub fn validate(&self) -> ValuationResult<()> {
        for p in &self.parameters {
            if !p.value.is_finite() {
                return Err(ValuationError::Validation(format!(
                    "value for '{}' must be finite",
                    p.name
                )));
            }
        }

        if let Some(exit_year) = self.value("exit_year") {
            if exit_year.fract() != 0.0 || exit_year < 1.0 || exit_year > f64::from(PROJECTION_YEARS)
            {
                return Err(ValuationError::Validation(format!(
                    "exit_year must be a whole year between 1 and {}, got {}",
                    PROJECTION_YEARS, exit_year
                )));
            }
        }

        if let (Some(debt), Some(equity)) =
            (self.value("debt_financing"), self.value("equity_financing"))
        {
            if (debt + equity - 1.0).abs() > 1e-9 {
                return Err(ValuationError::Validation(format!(
                    "debt_financing + equity_financing must equal 100%, got {:.1}%",
                    (debt + equity) * 100.0
                )));
            }
        }

        Ok(())
    }
}

/// Identifiers must be usable as workbook defined names and never look like a cell
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    starts_ok
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && crate::model::layout::CellRef::parse(name).is_none()
}
