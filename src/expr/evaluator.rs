//! Recursive-descent evaluator for formula arithmetic.
//!
//! Grammar:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := '-' factor | '(' expr ')' | 'floor(' expr ')' | 'ceil(' expr ')' | number
//! ```
//!
//! Input is checked against a closed character set before parsing; nothing
//! here ever hands the text to another interpreter.

use thiserror::Error;

const FUNCTIONS: &[&str] = &["floor(", "ceil("];

/// Deepest nesting of factors the parser will follow.
const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("expression is empty")]
    Empty,

    #[error("invalid character '{ch}' at position {position}")]
    InvalidCharacter { ch: char, position: usize },

    #[error("unmatched closing parenthesis at position {position}")]
    UnmatchedClose { position: usize },

    #[error("{count} unclosed parenthesis(es)")]
    Unclosed { count: usize },

    #[error("expected {expected} at position {position}")]
    Expected {
        expected: &'static str,
        position: usize,
    },

    #[error("unexpected input at position {position}")]
    TrailingInput { position: usize },

    #[error("expression nested too deeply")]
    TooDeep,
}

/// Check `text` against the allowed character set and parenthesis balance.
///
/// Returns every problem found; an empty list means the text may be evaluated.
pub fn validate(text: &str) -> Vec<ExprError> {
    let mut errors = Vec::new();

    if text.trim().is_empty() {
        errors.push(ExprError::Empty);
        return errors;
    }

    let mut depth: usize = 0;
    let mut i = 0;
    while i < text.len() {
        let rest = &text[i..];

        if let Some(func) = FUNCTIONS.iter().find(|f| rest.starts_with(**f)) {
            depth += 1;
            i += func.len();
            continue;
        }

        let ch = rest.chars().next().unwrap_or_default();
        match ch {
            '0'..='9' | '.' | 'e' | 'E' | '+' | '-' | '*' | '/' => {}
            c if c.is_ascii_whitespace() => {}
            '(' => depth += 1,
            ')' => {
                if depth == 0 {
                    errors.push(ExprError::UnmatchedClose { position: i });
                } else {
                    depth -= 1;
                }
            }
            other => errors.push(ExprError::InvalidCharacter {
                ch: other,
                position: i,
            }),
        }
        i += ch.len_utf8();
    }

    if depth > 0 {
        errors.push(ExprError::Unclosed { count: depth });
    }

    errors
}

/// Evaluate `text`, or `None` when it fails validation, fails to parse or
/// leaves trailing input.
///
/// Division by zero evaluates to `0.0`.
pub fn evaluate(text: &str) -> Option<f64> {
    if !validate(text).is_empty() {
        return None;
    }
    parse(text).ok().filter(|v| v.is_finite())
}

/// Parse and evaluate already-validated text, reporting where parsing stopped.
pub fn parse(text: &str) -> Result<f64, ExprError> {
    let mut parser = Parser {
        src: text.as_bytes(),
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.pos < parser.src.len() {
        return Err(ExprError::TrailingInput {
            position: parser.pos,
        });
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while self
            .src
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        self.skip_ws();
        if self.src[self.pos..].starts_with(keyword.as_bytes()) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn expect_close(&mut self) -> Result<(), ExprError> {
        if self.eat(b')') {
            Ok(())
        } else {
            Err(ExprError::Expected {
                expected: "')'",
                position: self.pos,
            })
        }
    }

    fn expr(&mut self) -> Result<f64, ExprError> {
        let mut value = self.term()?;
        loop {
            if self.eat(b'+') {
                value += self.term()?;
            } else if self.eat(b'-') {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> Result<f64, ExprError> {
        let mut value = self.factor()?;
        loop {
            if self.eat(b'*') {
                value *= self.factor()?;
            } else if self.eat(b'/') {
                let divisor = self.factor()?;
                value = if divisor == 0.0 { 0.0 } else { value / divisor };
            } else {
                return Ok(value);
            }
        }
    }

    fn factor(&mut self) -> Result<f64, ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        let value = self.factor_inner();
        self.depth -= 1;
        value
    }

    fn factor_inner(&mut self) -> Result<f64, ExprError> {
        if self.eat(b'-') {
            return Ok(-self.factor()?);
        }
        if self.eat(b'(') {
            let value = self.expr()?;
            self.expect_close()?;
            return Ok(value);
        }
        if self.eat_keyword("floor(") {
            let value = self.expr()?;
            self.expect_close()?;
            return Ok(value.floor());
        }
        if self.eat_keyword("ceil(") {
            let value = self.expr()?;
            self.expect_close()?;
            return Ok(value.ceil());
        }
        self.number()
    }

    fn number(&mut self) -> Result<f64, ExprError> {
        self.skip_ws();
        let start = self.pos;

        let mut mantissa_digits = self.digits();
        if self.src.get(self.pos) == Some(&b'.') {
            self.pos += 1;
            mantissa_digits += self.digits();
        }
        if mantissa_digits == 0 {
            self.pos = start;
            return Err(ExprError::Expected {
                expected: "a number",
                position: start,
            });
        }

        if matches!(self.src.get(self.pos), Some(b'e' | b'E')) {
            let exponent_start = self.pos;
            self.pos += 1;
            if matches!(self.src.get(self.pos), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.digits() == 0 {
                return Err(ExprError::Expected {
                    expected: "exponent digits",
                    position: exponent_start,
                });
            }
        }

        std::str::from_utf8(&self.src[start..self.pos])
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or(ExprError::Expected {
                expected: "a number",
                position: start,
            })
    }

    fn digits(&mut self) -> usize {
        let start = self.pos;
        while self.src.get(self.pos).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        self.pos - start
    }
}
