//! Formula engine: tokenizer -> parser -> evaluator
//!
//! Covers the subset of spreadsheet syntax the valuation templates emit:
//! arithmetic, cell and range references (optionally sheet-qualified),
//! defined names and the functions SUM, INDEX, TODAY and XIRR.

pub mod evaluator;
pub mod parser;
pub mod tokenizer;

pub use evaluator::{
    evaluate, evaluate_number, excel_serial, xirr, ErrorValue, EvalContext, EvalError, Value,
};
pub use parser::{parse_formula, BinaryOp, Expr, ParseError, Reference};
pub use tokenizer::{tokenize, Token, TokenizeError};
