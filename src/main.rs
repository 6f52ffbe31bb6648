use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use valuation_forge::cli;
use valuation_forge::error::ValuationResult;

#[derive(Parser)]
#[command(name = "valuation-forge")]
#[command(about = "Generate private equity valuation workbooks (.xlsx)")]
#[command(long_about = "Valuation Forge - leveraged buyout valuation workbooks

Builds a three-sheet Excel workbook (Assumptions, Valuation Model, Dashboard)
with live formulas. Every parameter is a workbook defined name, so changing
an assumption in Excel recalculates the whole model.

COMMANDS:
  generate     - Write the valuation workbook
  preview      - Calculate in-process and print the key metrics
  assumptions  - Print the default assumptions as an overrides file

EXAMPLES:
  valuation-forge generate                              # Valuation_Model.xlsx
  valuation-forge generate deal.xlsx -a deal.yaml -s downside
  valuation-forge generate --valuation-date 2025-01-01
  valuation-forge preview -a deal.yaml --json
  valuation-forge assumptions -o deal.yaml")]
#[command(version)]
struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(long_about = "Generate the valuation workbook.

Starts from the default assumptions, applies the overrides file (if any) and
then the named scenario. The destination must end in .xlsx and is
overwritten if it exists.

OVERRIDES FILE:
  purchase_price: 120
  revenue_growth: 0.07
  scenarios:
    downside:
      revenue_growth: 0.01
      exit_multiple: 6.5")]
    /// Generate the valuation workbook
    Generate {
        /// Output Excel file path (.xlsx)
        #[arg(default_value = "Valuation_Model.xlsx")]
        output: PathBuf,

        /// YAML file with assumption overrides
        #[arg(short, long, env = "VALUATION_ASSUMPTIONS")]
        assumptions: Option<PathBuf>,

        /// Scenario name to apply (from the 'scenarios' section)
        #[arg(short, long)]
        scenario: Option<String>,

        /// Date used for TODAY() in cached results, YYYY-MM-DD (default: today)
        #[arg(long)]
        valuation_date: Option<NaiveDate>,
    },

    /// Calculate the model and print key metrics and projections
    Preview {
        /// YAML file with assumption overrides
        #[arg(short, long, env = "VALUATION_ASSUMPTIONS")]
        assumptions: Option<PathBuf>,

        /// Scenario name to apply (from the 'scenarios' section)
        #[arg(short, long)]
        scenario: Option<String>,

        /// Date used for TODAY(), YYYY-MM-DD (default: today)
        #[arg(long)]
        valuation_date: Option<NaiveDate>,

        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Print (or write) the default assumptions as an overrides file
    Assumptions {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("valuation_forge=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("valuation_forge=warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ValuationResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Generate {
            output,
            assumptions,
            scenario,
            valuation_date,
        } => cli::generate(output, assumptions, scenario, valuation_date, cli.verbose),

        Commands::Preview {
            assumptions,
            scenario,
            valuation_date,
            json,
        } => cli::preview(assumptions, scenario, valuation_date, json),

        Commands::Assumptions { output } => cli::assumptions(output),
    }
}
