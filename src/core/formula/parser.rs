//! Formula parser
//!
//! Converts a sequence of tokens into an Abstract Syntax Tree (AST).
//! Uses recursive descent parsing with operator precedence.

use super::tokenizer::{tokenize, Token};
use crate::model::layout::CellRef;

/// Something a formula reads from the workbook
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// Workbook defined name (`tax_rate`)
    Name(String),
    /// Single cell, optionally on another sheet
    Cell { sheet: Option<String>, cell: CellRef },
    /// Rectangular range, optionally on another sheet
    Range {
        sheet: Option<String>,
        start: CellRef,
        end: CellRef,
    },
}

impl Reference {
    /// Every cell covered by a cell or range reference, row-major
    pub fn cells(&self) -> Vec<CellRef> {
        match self {
            Reference::Name(_) => Vec::new(),
            Reference::Cell { cell, .. } => vec![*cell],
            Reference::Range { start, end, .. } => {
                let (r0, r1) = (start.row.min(end.row), start.row.max(end.row));
                let (c0, c1) = (start.col.min(end.col), start.col.max(end.col));
                (r0..=r1)
                    .flat_map(|row| (c0..=c1).map(move |col| CellRef::new(row, col)))
                    .collect()
            }
        }
    }

    pub fn sheet(&self) -> Option<&str> {
        match self {
            Reference::Name(_) => None,
            Reference::Cell { sheet, .. } | Reference::Range { sheet, .. } => sheet.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(BinaryOp::Add),
            '-' => Some(BinaryOp::Sub),
            '*' => Some(BinaryOp::Mul),
            '/' => Some(BinaryOp::Div),
            '^' => Some(BinaryOp::Pow),
            _ => None,
        }
    }
}

/// Abstract Syntax Tree node for formula expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Reference(Reference),
    /// Function call: NAME(arg1, arg2, ...)
    FunctionCall { name: String, args: Vec<Expr> },
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Unary minus
    Negate(Box<Expr>),
}

impl Expr {
    /// Collect every reference in evaluation order
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'e>(&'e self, out: &mut Vec<&'e Reference>) {
        match self {
            Expr::Number(_) => {}
            Expr::Reference(r) => out.push(r),
            Expr::FunctionCall { args, .. } => {
                for arg in args {
                    arg.collect_references(out);
                }
            }
            Expr::BinaryOp { left, right, .. } => {
                left.collect_references(out);
                right.collect_references(out);
            }
            Expr::Negate(inner) => inner.collect_references(out),
        }
    }

    /// Names of every function called, upper-cased
    pub fn functions(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_functions(&mut out);
        out
    }

    fn collect_functions(&self, out: &mut Vec<String>) {
        match self {
            Expr::FunctionCall { name, args } => {
                out.push(name.to_uppercase());
                for arg in args {
                    arg.collect_functions(out);
                }
            }
            Expr::BinaryOp { left, right, .. } => {
                left.collect_functions(out);
                right.collect_functions(out);
            }
            Expr::Negate(inner) => inner.collect_functions(out),
            _ => {}
        }
    }
}

/// Error during parsing
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Parse error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Parser for formula tokens
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    /// Parse the tokens into an AST
    pub fn parse(mut self) -> Result<Expr, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::new("Empty expression", 0));
        }
        let expr = self.term()?;

        if !self.is_at_end() {
            return Err(ParseError::new(
                format!("Unexpected token after expression: {:?}", self.peek()),
                self.position,
            ));
        }

        Ok(expr)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn match_token(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn match_operator(&mut self, ops: &[char]) -> Option<BinaryOp> {
        if let Some(Token::Operator(c)) = self.peek() {
            if ops.contains(c) {
                let op = BinaryOp::from_char(*c);
                self.position += 1;
                return op;
            }
        }
        None
    }

    /// Term: factor (( "+" | "-" ) factor)*
    fn term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.factor()?;

        while let Some(op) = self.match_operator(&['+', '-']) {
            let right = self.factor()?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Factor: power (( "*" | "/" ) power)*
    fn factor(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.power()?;

        while let Some(op) = self.match_operator(&['*', '/']) {
            let right = self.power()?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Power: unary ( "^" unary )*   (left-associative)
    fn power(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;

        while let Some(op) = self.match_operator(&['^']) {
            let right = self.unary()?;
            left = Expr::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Unary: ( "-" | "+" ) unary | primary
    ///
    /// Negation binds tighter than '^' the way spreadsheets do (-2^2 = 4).
    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.match_operator(&['-']).is_some() {
            let operand = self.unary()?;
            return Ok(Expr::Negate(Box::new(operand)));
        }
        if self.match_operator(&['+']).is_some() {
            return self.unary();
        }
        self.primary()
    }

    /// Arguments: ( expr ( "," expr )* )?
    fn arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();

        if let Some(Token::CloseParen) = self.peek() {
            return Ok(args);
        }

        args.push(self.term()?);
        while self.match_token(&Token::Comma) {
            args.push(self.term()?);
        }

        Ok(args)
    }

    /// Primary: NUMBER | reference | NAME "(" args ")" | "(" expr ")"
    fn primary(&mut self) -> Result<Expr, ParseError> {
        let position = self.position;

        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Sheet(sheet)) => match self.advance() {
                Some(Token::Identifier(ident)) => self.cell_or_range(Some(sheet), &ident, position),
                _ => Err(ParseError::new(
                    format!("Expected a cell after sheet '{}'", sheet),
                    self.position,
                )),
            },
            Some(Token::Identifier(name)) => {
                if self.match_token(&Token::OpenParen) {
                    let args = self.arguments()?;
                    if !self.match_token(&Token::CloseParen) {
                        return Err(ParseError::new(
                            "Expected ')' after function arguments",
                            self.position,
                        ));
                    }
                    return Ok(Expr::FunctionCall { name, args });
                }
                if CellRef::parse(&name).is_some() {
                    return self.cell_or_range(None, &name, position);
                }
                Ok(Expr::Reference(Reference::Name(name)))
            }
            Some(Token::OpenParen) => {
                let expr = self.term()?;
                if !self.match_token(&Token::CloseParen) {
                    return Err(ParseError::new(
                        "Expected ')' after expression",
                        self.position,
                    ));
                }
                Ok(expr)
            }
            Some(token) => Err(ParseError::new(
                format!("Unexpected token: {:?}", token),
                position,
            )),
            None => Err(ParseError::new(
                "Unexpected end of expression",
                self.position,
            )),
        }
    }

    fn cell_or_range(
        &mut self,
        sheet: Option<String>,
        ident: &str,
        position: usize,
    ) -> Result<Expr, ParseError> {
        let start = CellRef::parse(ident)
            .ok_or_else(|| ParseError::new(format!("Invalid cell reference '{}'", ident), position))?;

        if !self.match_token(&Token::Colon) {
            return Ok(Expr::Reference(Reference::Cell { sheet, cell: start }));
        }

        // The end of a range may repeat the sheet prefix
        if let Some(Token::Sheet(_)) = self.peek() {
            self.position += 1;
        }
        match self.advance() {
            Some(Token::Identifier(end_ident)) => {
                let end = CellRef::parse(&end_ident).ok_or_else(|| {
                    ParseError::new(format!("Invalid range end '{}'", end_ident), self.position)
                })?;
                Ok(Expr::Reference(Reference::Range { sheet, start, end }))
            }
            _ => Err(ParseError::new("Expected cell after ':'", self.position)),
        }
    }
}

/// Convenience function to parse tokens into an AST
pub fn parse(tokens: Vec<Token>) -> Result<Expr, ParseError> {
    Parser::new(tokens).parse()
}

/// Tokenize and parse a formula string
pub fn parse_formula(formula: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(formula).map_err(|e| ParseError::new(e.message, e.position))?;
    parse(tokens)
}
