//! Formula tokenizer
//!
//! Converts formula strings like "='Valuation Model'!D39/D13" into a sequence of
//! tokens that can be parsed into an AST.

use std::iter::Peekable;
use std::str::Chars;

/// A token in a formula expression
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A numeric literal (e.g., 365, 0.05, 1.5e10)
    Number(f64),
    /// Function name, defined name or cell coordinate (`D12`, `$C$3`)
    Identifier(String),
    /// Sheet prefix, without the trailing `!` (`Valuation Model`)
    Sheet(String),
    /// Binary operators: + - * / ^
    Operator(char),
    OpenParen,
    CloseParen,
    Comma,
    /// Colon for ranges (D22:H22)
    Colon,
}

/// Error during tokenization
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizeError {
    pub message: String,
    pub position: usize,
}

impl TokenizeError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl std::fmt::Display for TokenizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tokenize error at position {}: {}",
            self.position, self.message
        )
    }
}

impl std::error::Error for TokenizeError {}

/// Tokenizer for formula expressions
pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Tokenizer<'a> {
    /// Create a new tokenizer; a leading '=' is ignored
    pub fn new(formula: &'a str) -> Self {
        let formula = formula.strip_prefix('=').unwrap_or(formula);
        Self {
            chars: formula.chars().peekable(),
            position: 0,
        }
    }

    /// Tokenize the entire formula into a vector of tokens
    pub fn tokenize(mut self) -> Result<Vec<Token>, TokenizeError> {
        let mut tokens = Vec::new();

        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Option<Token>, TokenizeError> {
        self.skip_whitespace();

        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let token = match c {
            '\'' => self.read_quoted_sheet()?,
            '(' => {
                self.advance();
                Token::OpenParen
            }
            ')' => {
                self.advance();
                Token::CloseParen
            }
            ',' => {
                self.advance();
                Token::Comma
            }
            ':' => {
                self.advance();
                Token::Colon
            }
            '+' | '-' | '*' | '/' | '^' => {
                self.advance();
                Token::Operator(c)
            }
            c if c.is_ascii_digit() || c == '.' => self.read_number()?,
            c if c.is_alphabetic() || c == '_' || c == '$' => self.read_identifier(),
            c => {
                return Err(TokenizeError::new(
                    format!("Unexpected character: '{}'", c),
                    self.position,
                ));
            }
        };

        Ok(Some(token))
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    /// Read `'Sheet Name'!`; `''` escapes a quote inside the name
    fn read_quoted_sheet(&mut self) -> Result<Token, TokenizeError> {
        let start_pos = self.position;
        self.advance();
        let mut name = String::new();

        loop {
            match self.advance() {
                None => return Err(TokenizeError::new("Unterminated sheet name", start_pos)),
                Some('\'') if self.peek() == Some('\'') => {
                    name.push('\'');
                    self.advance();
                }
                Some('\'') => break,
                Some(c) => name.push(c),
            }
        }

        if self.advance() != Some('!') {
            return Err(TokenizeError::new(
                format!("Expected '!' after sheet name '{}'", name),
                self.position,
            ));
        }

        Ok(Token::Sheet(name))
    }

    fn read_number(&mut self) -> Result<Token, TokenizeError> {
        let start_pos = self.position;
        let mut num_str = String::new();

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '.' {
                num_str.push(c);
                self.advance();
            } else {
                break;
            }
        }

        // Exponent part (1.5e10, 2E-5)
        if matches!(self.peek(), Some('e' | 'E')) {
            num_str.push('e');
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                num_str.push(sign);
                self.advance();
            }
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    num_str.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        }

        num_str
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| TokenizeError::new(format!("Invalid number: {}", num_str), start_pos))
    }

    /// Identifier, or an unquoted sheet prefix when followed by '!'
    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' || c == '$' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if self.peek() == Some('!') {
            self.advance();
            Token::Sheet(ident)
        } else {
            Token::Identifier(ident)
        }
    }
}

/// Convenience function to tokenize a formula string
pub fn tokenize(formula: &str) -> Result<Vec<Token>, TokenizeError> {
    Tokenizer::new(formula).tokenize()
}
