//! The private-equity valuation template expressed as data
//!
//! Formulas are written as templates. Line items are referenced by key inside
//! braces and resolved to coordinates by the layout pass:
//!
//! - `{revenue}`        same year column as the cell being written
//! - `{revenue@prev}`   previous year column
//! - `{revenue@first}`  year 1 column
//! - `{revenue@last}`   final year column
//! - `{revenue@3}`      year 3 column
//!
//! Bare identifiers (`tax_rate`) are parameter names and stay symbolic.

use crate::types::{ValueFormat, PROJECTION_YEARS};

/// How a line item fills the year columns
#[derive(Debug, Clone, PartialEq)]
pub enum RowFormula {
    /// Spacer row, label only
    None,
    /// Year 1 column only
    Base(String),
    /// Year 1 template, then one template for every later year
    Series { first: String, rest: String },
    /// The same template in every year column
    EveryYear(String),
    /// One template per column starting at year 1
    Columns(Vec<String>),
}

impl RowFormula {
    /// Template for a 1-based year, if the row fills that year
    pub fn template_for(&self, year: u16) -> Option<&str> {
        let index = usize::from(year).checked_sub(1)?;
        match self {
            RowFormula::None => None,
            RowFormula::Base(f) => (year == 1).then_some(f.as_str()),
            RowFormula::Series { first, rest } => {
                if year == 1 {
                    Some(first.as_str())
                } else {
                    Some(rest.as_str())
                }
            }
            RowFormula::EveryYear(f) => Some(f.as_str()),
            RowFormula::Columns(cols) => cols.get(index).map(String::as_str),
        }
    }

    pub fn is_projected(&self) -> bool {
        matches!(self, RowFormula::Series { .. } | RowFormula::EveryYear(_))
    }
}

/// One row of the calculation sheet
#[derive(Debug, Clone, PartialEq)]
pub struct LineItem {
    /// Key used by other templates; spacer rows have none
    pub key: Option<String>,
    pub label: String,
    pub description: Option<String>,
    pub formula: RowFormula,
    /// Pinned format; otherwise derived from the label
    pub format: Option<ValueFormat>,
    /// Part of the color-scale highlight
    pub highlight: bool,
}

impl LineItem {
    pub fn new(key: &str, label: &str, formula: RowFormula) -> Self {
        Self {
            key: Some(key.to_string()),
            label: label.to_string(),
            description: None,
            formula,
            format: None,
            highlight: false,
        }
    }

    pub fn spacer() -> Self {
        Self {
            key: None,
            label: String::new(),
            description: None,
            formula: RowFormula::None,
            format: None,
            highlight: false,
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_format(mut self, format: ValueFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn highlighted(mut self) -> Self {
        self.highlight = true;
        self
    }

    pub fn value_format(&self) -> ValueFormat {
        self.format
            .unwrap_or_else(|| ValueFormat::from_label(&self.label))
    }
}

/// A titled group of line items
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub items: Vec<LineItem>,
}

impl Section {
    pub fn new(title: &str, items: Vec<LineItem>) -> Self {
        Self {
            title: title.to_string(),
            items,
        }
    }
}

/// A named output on the summary sheet
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryMetric {
    pub label: String,
    /// Template; line-item placeholders become sheet-qualified coordinates
    pub formula: String,
}

impl SummaryMetric {
    pub fn new(label: &str, formula: &str) -> Self {
        Self {
            label: label.to_string(),
            formula: formula.to_string(),
        }
    }

    pub fn value_format(&self) -> ValueFormat {
        ValueFormat::from_label(&self.label)
    }
}

/// Full content of the workbook apart from the parameters themselves
#[derive(Debug, Clone, PartialEq)]
pub struct ValuationTemplate {
    pub assumptions_sheet: String,
    pub model_sheet: String,
    pub summary_sheet: String,
    pub assumptions_title: String,
    pub summary_title: String,
    pub summary_heading: String,
    pub years: u16,
    pub sections: Vec<Section>,
    pub metrics: Vec<SummaryMetric>,
}

impl ValuationTemplate {
    /// Iterate every keyed line item with its section title
    pub fn keyed_items(&self) -> impl Iterator<Item = (&str, &LineItem)> {
        self.sections.iter().flat_map(|s| {
            s.items
                .iter()
                .filter(|i| i.key.is_some())
                .map(move |i| (s.title.as_str(), i))
        })
    }
}

impl Default for ValuationTemplate {
    fn default() -> Self {
        private_equity_template()
    }
}

fn base(formula: &str) -> RowFormula {
    RowFormula::Base(formula.to_string())
}

fn series(first: &str, rest: &str) -> RowFormula {
    RowFormula::Series {
        first: first.to_string(),
        rest: rest.to_string(),
    }
}

fn every_year(formula: &str) -> RowFormula {
    RowFormula::EveryYear(formula.to_string())
}

/// The leveraged-buyout template: five sections and the dashboard metrics
pub fn private_equity_template() -> ValuationTemplate {
    let transaction = Section::new(
        "Transaction Assumptions",
        vec![
            LineItem::new("purchase_price", "Purchase Price ($M)", base("=purchase_price")),
            LineItem::new("ebitda_multiple", "EBITDA Multiple", base("=ebitda_multiple")),
            LineItem::new("revenue_multiple", "Revenue Multiple", base("=revenue_multiple")),
            LineItem::spacer(),
            LineItem::new("debt_financing", "Debt Financing (%)", base("=debt_financing")),
            LineItem::new("equity_financing", "Equity Financing (%)", base("=equity_financing")),
            LineItem::new("synergies", "Synergies ($M)", base("=synergies")),
        ],
    );

    let sources_uses = Section::new(
        "Sources & Uses",
        vec![
            LineItem::new(
                "debt_raised",
                "Debt Raised ($M)",
                base("=purchase_price*debt_financing"),
            ),
            LineItem::new(
                "equity_raised",
                "Equity Raised ($M)",
                base("=purchase_price*equity_financing"),
            ),
            LineItem::new(
                "total_sources",
                "Total Sources ($M)",
                base("={debt_raised}+{equity_raised}"),
            )
            .describe("Debt + equity"),
            LineItem::spacer(),
            LineItem::new("uses_purchase_price", "Purchase Price ($M)", base("=purchase_price")),
            LineItem::new("transaction_fees", "Transaction Fees ($M)", base("=transaction_fees")),
            LineItem::new("debt_refinanced", "Debt Refinanced ($M)", base("=refinanced_debt")),
            LineItem::new(
                "total_uses",
                "Total Uses ($M)",
                base("=SUM({uses_purchase_price}:{debt_refinanced})"),
            ),
        ],
    );

    let projections = Section::new(
        "Financial Projections",
        vec![
            LineItem::new(
                "revenue",
                "Revenue ($M)",
                series("=initial_revenue", "={revenue@prev}*(1+revenue_growth)"),
            )
            .describe("Prior year x (1 + growth)")
            .highlighted(),
            LineItem::new("ebitda", "EBITDA ($M)", every_year("={revenue}*ebitda_margin"))
                .describe("Revenue x EBITDA margin")
                .highlighted(),
            LineItem::new(
                "net_income",
                "Net Income ($M)",
                every_year("={ebitda}*(1-tax_rate)"),
            )
            .describe("EBITDA after tax")
            .highlighted(),
            LineItem::new("capex", "CapEx ($M)", every_year("={revenue}*capex_rate")),
            LineItem::new(
                "working_capital",
                "Working Capital ($M)",
                every_year("={revenue}*wc_rate"),
            ),
        ],
    );

    let debt_schedule = Section::new(
        "Debt Schedule",
        vec![
            LineItem::new(
                "beginning_debt",
                "Beginning Debt ($M)",
                series("={debt_raised@first}", "={ending_debt@prev}"),
            )
            .describe("Prior year ending debt"),
            LineItem::new(
                "interest_expense",
                "Interest Expense ($M)",
                every_year("={beginning_debt}*interest_rate"),
            ),
            LineItem::new(
                "principal_payment",
                "Principal Payment ($M)",
                every_year("={beginning_debt}*principal_rate"),
            ),
            LineItem::new(
                "ending_debt",
                "Ending Debt ($M)",
                every_year("={beginning_debt}-{principal_payment}"),
            ),
        ],
    );

    let exit = Section::new(
        "Exit Analysis",
        vec![
            LineItem::new("exit_year", "Exit Year", base("=exit_year")),
            LineItem::new("exit_multiple", "Exit EBITDA Multiple", base("=exit_multiple")),
            LineItem::new(
                "exit_value",
                "Exit Enterprise Value ($M)",
                base("={exit_multiple}*INDEX({ebitda@first}:{ebitda@last},{exit_year})"),
            )
            .describe("Exit multiple x exit-year EBITDA"),
            LineItem::new(
                "debt_remaining",
                "Debt Remaining ($M)",
                base("=INDEX({ending_debt@first}:{ending_debt@last},{exit_year})"),
            ),
            LineItem::new(
                "equity_value",
                "Equity Value ($M)",
                base("={exit_value}-{debt_remaining}"),
            ),
            LineItem::new(
                "cash_flow_date",
                "Cash Flow Date",
                RowFormula::Columns(vec![
                    "=TODAY()".to_string(),
                    "={cash_flow_date@first}+365*exit_year".to_string(),
                ]),
            )
            .describe("Entry / exit")
            .with_format(ValueFormat::Date),
            LineItem::new(
                "equity_cash_flow",
                "Equity Cash Flow ($M)",
                RowFormula::Columns(vec![
                    "=-{equity_raised@first}".to_string(),
                    "={equity_value@first}".to_string(),
                ]),
            )
            .describe("Entry / exit"),
            LineItem::new(
                "irr",
                "IRR (%)",
                base("=XIRR({equity_cash_flow@1}:{equity_cash_flow@2},{cash_flow_date@1}:{cash_flow_date@2})"),
            ),
        ],
    );

    let cagr = format!(
        "=({{revenue@last}}/{{revenue@first}})^(1/{})-1",
        PROJECTION_YEARS - 1
    );
    let metrics = vec![
        SummaryMetric::new("Purchase Price ($M)", "=purchase_price"),
        SummaryMetric::new("Debt / Equity Ratio", "=debt_financing/equity_financing"),
        SummaryMetric::new("EBITDA Margin (%)", "=ebitda_margin"),
        SummaryMetric::new(
            &format!("{}-Year Revenue CAGR (%)", PROJECTION_YEARS),
            &cagr,
        ),
        SummaryMetric::new("Exit Enterprise Value ($M)", "={exit_value@first}"),
        SummaryMetric::new("Equity Value at Exit ($M)", "={equity_value@first}"),
        SummaryMetric::new("IRR (%)", "={irr@first}"),
        SummaryMetric::new(
            "Money Multiple",
            "={equity_value@first}/{equity_raised@first}",
        ),
    ];

    ValuationTemplate {
        assumptions_sheet: "Assumptions".to_string(),
        model_sheet: "Valuation Model".to_string(),
        summary_sheet: "Dashboard".to_string(),
        assumptions_title: "Valuation Model Assumptions".to_string(),
        summary_title: "Valuation Model Dashboard".to_string(),
        summary_heading: "Key Metrics".to_string(),
        years: PROJECTION_YEARS,
        sections: vec![transaction, sources_uses, projections, debt_schedule, exit],
        metrics,
    }
}
