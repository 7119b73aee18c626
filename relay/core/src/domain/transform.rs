// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Value Transform Expressions
//!
//! Transforms and inverses are small arithmetic expressions over the mirrored
//! value, which is bound to `x`:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/' | '%') unary)*
//! unary  := '-' unary | atom
//! atom   := NUMBER | 'x' | '(' expr ')'
//! ```
//!
//! e.g. a Celsius → Fahrenheit alias uses `x * 9 / 5 + 32` with the inverse
//! `(x - 32) * 5 / 9`.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Parse and evaluate alias transforms

use serde_json::{Number, Value};
use std::fmt;
use thiserror::Error;

/// Deepest allowed nesting of parentheses and unary minus
const MAX_NESTING: usize = 64;

/// Longest accepted expression; also bounds the depth of operator chains
const MAX_TOKENS: usize = 512;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("Syntax error at offset {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Unknown identifier '{0}' (only 'x' is bound)")]
    UnknownIdentifier(String),

    #[error("Expected a numeric value, got {0}")]
    NotNumeric(&'static str),

    #[error("Arithmetic error: {0}")]
    Arithmetic(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Input,
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, x: f64) -> Result<f64, TransformError> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Input => Ok(x),
            Expr::Neg(inner) => Ok(-inner.eval(x)?),
            Expr::Binary(op, lhs, rhs) => {
                let l = lhs.eval(x)?;
                let r = rhs.eval(x)?;
                match op {
                    BinOp::Add => Ok(l + r),
                    BinOp::Sub => Ok(l - r),
                    BinOp::Mul => Ok(l * r),
                    BinOp::Div if r == 0.0 => {
                        Err(TransformError::Arithmetic("division by zero".to_string()))
                    }
                    BinOp::Div => Ok(l / r),
                    BinOp::Rem if r == 0.0 => {
                        Err(TransformError::Arithmetic("remainder by zero".to_string()))
                    }
                    BinOp::Rem => Ok(l % r),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, TransformError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut end = pos;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &source[pos..end];
                let value = literal.parse::<f64>().map_err(|_| TransformError::Syntax {
                    position: pos,
                    message: format!("invalid number '{}'", literal),
                })?;
                tokens.push((pos, Token::Number(value)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = pos;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((pos, Token::Ident(source[pos..end].to_string())));
            }
            '+' | '-' | '*' | '/' | '%' => {
                tokens.push((pos, Token::Op(c)));
                chars.next();
            }
            '(' => {
                tokens.push((pos, Token::LParen));
                chars.next();
            }
            ')' => {
                tokens.push((pos, Token::RParen));
                chars.next();
            }
            other => {
                return Err(TransformError::Syntax {
                    position: pos,
                    message: format!("unexpected character '{}'", other),
                })
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    cursor: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .map(|(pos, _)| *pos)
            .unwrap_or(self.end)
    }

    fn syntax(&self, message: impl Into<String>) -> TransformError {
        TransformError::Syntax {
            position: self.position(),
            message: message.into(),
        }
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, TransformError>) -> Result<T, TransformError> {
        if self.depth == MAX_NESTING {
            return Err(self.syntax(format!("expression nested deeper than {} levels", MAX_NESTING)));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expr(&mut self) -> Result<Expr, TransformError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op('+')) => BinOp::Add,
                Some(Token::Op('-')) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.cursor += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, TransformError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op('*')) => BinOp::Mul,
                Some(Token::Op('/')) => BinOp::Div,
                Some(Token::Op('%')) => BinOp::Rem,
                _ => return Ok(lhs),
            };
            self.cursor += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, TransformError> {
        if let Some(Token::Op('-')) = self.peek() {
            self.cursor += 1;
            let inner = self.nested(Self::unary)?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Expr, TransformError> {
        let token = self.peek().cloned();
        match token {
            Some(Token::Number(n)) => {
                self.cursor += 1;
                Ok(Expr::Number(n))
            }
            Some(Token::Ident(name)) if name == "x" => {
                self.cursor += 1;
                Ok(Expr::Input)
            }
            Some(Token::Ident(name)) => Err(TransformError::UnknownIdentifier(name)),
            Some(Token::LParen) => {
                self.cursor += 1;
                let inner = self.nested(Self::expr)?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.cursor += 1;
                        Ok(inner)
                    }
                    _ => Err(self.syntax("expected ')'")),
                }
            }
            Some(_) => Err(self.syntax("expected a number, 'x' or '('")),
            None => Err(self.syntax("unexpected end of expression")),
        }
    }
}

/// A parsed transform expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTransform {
    source: String,
    expr: Expr,
}

impl ValueTransform {
    pub fn parse(source: &str) -> Result<Self, TransformError> {
        let tokens = tokenize(source)?;
        if let Some((position, _)) = tokens.get(MAX_TOKENS) {
            return Err(TransformError::Syntax {
                position: *position,
                message: format!("expression longer than {} tokens", MAX_TOKENS),
            });
        }
        let mut parser = Parser {
            tokens,
            cursor: 0,
            end: source.len(),
            depth: 0,
        };
        let expr = parser.expr()?;
        if parser.cursor != parser.tokens.len() {
            return Err(parser.syntax("unexpected trailing input"));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate the expression with `x` bound to `value`.
    pub fn apply(&self, value: &Value) -> Result<Value, TransformError> {
        let x = value
            .as_f64()
            .ok_or_else(|| TransformError::NotNumeric(json_type(value)))?;
        let result = self.expr.eval(x)?;

        if !result.is_finite() {
            return Err(TransformError::Arithmetic(format!(
                "'{}' produced a non-finite result for x = {}",
                self.source, x
            )));
        }

        // Integral results stay integers so `x * 2` over 21 mirrors as 42, not 42.0
        if result.fract() == 0.0 && result.abs() < 9_007_199_254_740_992.0 {
            return Ok(Value::from(result as i64));
        }

        Number::from_f64(result)
            .map(Value::Number)
            .ok_or_else(|| TransformError::Arithmetic("result is not representable".to_string()))
    }
}

impl fmt::Display for ValueTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(source: &str, x: Value) -> Result<Value, TransformError> {
        ValueTransform::parse(source)?.apply(&x)
    }

    #[test]
    fn test_identity_and_constants() {
        assert_eq!(eval("x", json!(7)).unwrap(), json!(7));
        assert_eq!(eval("3", json!(7)).unwrap(), json!(3));
        assert_eq!(eval("x", json!(1.5)).unwrap(), json!(1.5));
    }

    #[test]
    fn test_precedence_and_parentheses() {
        assert_eq!(eval("1 + x * 2", json!(3)).unwrap(), json!(7));
        assert_eq!(eval("(1 + x) * 2", json!(3)).unwrap(), json!(8));
        assert_eq!(eval("x - 2 - 1", json!(10)).unwrap(), json!(7));
        assert_eq!(eval("x % 4", json!(10)).unwrap(), json!(2));
    }

    #[test]
    fn test_unary_minus() {
        assert_eq!(eval("-x", json!(4)).unwrap(), json!(-4));
        assert_eq!(eval("--x", json!(4)).unwrap(), json!(4));
        assert_eq!(eval("2 * -x", json!(4)).unwrap(), json!(-8));
    }

    #[test]
    fn test_celsius_fahrenheit_pair() {
        let forward = ValueTransform::parse("x * 9 / 5 + 32").unwrap();
        let inverse = ValueTransform::parse("(x - 32) * 5 / 9").unwrap();

        let f = forward.apply(&json!(100)).unwrap();
        assert_eq!(f, json!(212));
        assert_eq!(inverse.apply(&f).unwrap(), json!(100));
        assert_eq!(forward.apply(&json!(36.6)).unwrap().as_f64().unwrap().round(), 98.0);
    }

    #[test]
    fn test_non_numeric_input() {
        let err = eval("x + 1", json!("hello")).unwrap_err();
        assert_eq!(err, TransformError::NotNumeric("a string"));
        assert!(matches!(eval("x", json!(null)), Err(TransformError::NotNumeric("null"))));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(eval("x / 0", json!(1)), Err(TransformError::Arithmetic(_))));
        assert!(matches!(eval("1 / x", json!(0)), Err(TransformError::Arithmetic(_))));
        assert!(matches!(eval("x % 0", json!(1)), Err(TransformError::Arithmetic(_))));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(ValueTransform::parse(""), Err(TransformError::Syntax { .. })));
        assert!(matches!(ValueTransform::parse("x +"), Err(TransformError::Syntax { .. })));
        assert!(matches!(ValueTransform::parse("(x"), Err(TransformError::Syntax { .. })));
        assert!(matches!(ValueTransform::parse("x x"), Err(TransformError::Syntax { .. })));
        assert!(matches!(ValueTransform::parse("x ^ 2"), Err(TransformError::Syntax { position: 2, .. })));
        assert!(matches!(ValueTransform::parse("1..2"), Err(TransformError::Syntax { .. })));
        assert_eq!(
            ValueTransform::parse("y * 2").unwrap_err(),
            TransformError::UnknownIdentifier("y".to_string())
        );
    }

    #[test]
    fn test_deep_nesting_is_a_syntax_error() {
        let nested = format!("{}x{}", "(".repeat(200_000), ")".repeat(200_000));
        assert!(matches!(ValueTransform::parse(&nested), Err(TransformError::Syntax { .. })));

        let negated = format!("{}x", "-".repeat(200_000));
        assert!(matches!(ValueTransform::parse(&negated), Err(TransformError::Syntax { .. })));

        let chain = format!("x{}", " + x".repeat(100_000));
        assert!(matches!(ValueTransform::parse(&chain), Err(TransformError::Syntax { .. })));

        let deep = format!("{}x{}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        match ValueTransform::parse(&deep) {
            Err(TransformError::Syntax { message, .. }) => assert!(message.contains("nested")),
            other => panic!("expected nesting error, got {:?}", other),
        }

        let shallow = format!("{}x{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert_eq!(eval(&shallow, json!(5)).unwrap(), json!(5));
    }

    #[test]
    fn test_display_keeps_source() {
        let transform = ValueTransform::parse("x*2").unwrap();
        assert_eq!(transform.to_string(), "x*2");
        assert_eq!(transform.source(), "x*2");
    }
}
