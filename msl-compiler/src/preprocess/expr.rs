// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Evaluation of `#if` conditions.

use super::lexer::{Token, TokenKind};

/// Evaluates a fully macro-expanded condition. Identifiers that are left evaluate to 0.
pub(super) fn evaluate(tokens: &[Token]) -> Result<i64, String> {
    if tokens.is_empty() {
        return Err("expected an expression".to_owned());
    }

    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.ternary()?;

    match parser.tokens.get(parser.pos) {
        None => Ok(value),
        Some(token) => Err(format!("unexpected '{}' in expression", token.text)),
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

/// Binary operators by increasing precedence.
const BINARY_OPERATORS: &[&[&str]] = &[
    &["||"],
    &["&&"],
    &["|"],
    &["^"],
    &["&"],
    &["==", "!="],
    &["<", ">", "<=", ">="],
    &["<<", ">>"],
    &["+", "-"],
    &["*", "/", "%"],
];

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn accept(&mut self, text: &str) -> bool {
        if self
            .peek()
            .is_some_and(|token| token.kind == TokenKind::Punctuation && token.text == text)
        {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, text: &str) -> Result<(), String> {
        if self.accept(text) {
            Ok(())
        } else {
            Err(match self.peek() {
                Some(token) => format!("expected '{}' but found '{}'", text, token.text),
                None => format!("expected '{}' at end of expression", text),
            })
        }
    }

    fn ternary(&mut self) -> Result<i64, String> {
        let condition = self.binary(0)?;

        if self.accept("?") {
            let if_true = self.ternary()?;
            self.expect(":")?;
            let if_false = self.ternary()?;

            Ok(if condition != 0 { if_true } else { if_false })
        } else {
            Ok(condition)
        }
    }

    fn binary(&mut self, level: usize) -> Result<i64, String> {
        if level == BINARY_OPERATORS.len() {
            return self.unary();
        }

        let mut lhs = self.binary(level + 1)?;

        loop {
            let Some(operator) = BINARY_OPERATORS[level]
                .iter()
                .copied()
                .find(|&operator| self.accept(operator))
            else {
                return Ok(lhs);
            };
            let rhs = self.binary(level + 1)?;

            lhs = match operator {
                "||" => ((lhs != 0) || (rhs != 0)) as i64,
                "&&" => ((lhs != 0) && (rhs != 0)) as i64,
                "|" => lhs | rhs,
                "^" => lhs ^ rhs,
                "&" => lhs & rhs,
                "==" => (lhs == rhs) as i64,
                "!=" => (lhs != rhs) as i64,
                "<" => (lhs < rhs) as i64,
                ">" => (lhs > rhs) as i64,
                "<=" => (lhs <= rhs) as i64,
                ">=" => (lhs >= rhs) as i64,
                "<<" => lhs.wrapping_shl(rhs as u32),
                ">>" => lhs.wrapping_shr(rhs as u32),
                "+" => lhs.wrapping_add(rhs),
                "-" => lhs.wrapping_sub(rhs),
                "*" => lhs.wrapping_mul(rhs),
                "/" => lhs
                    .checked_div(rhs)
                    .ok_or_else(|| "division by zero in expression".to_owned())?,
                "%" => lhs
                    .checked_rem(rhs)
                    .ok_or_else(|| "division by zero in expression".to_owned())?,
                _ => unreachable!(),
            };
        }
    }

    fn unary(&mut self) -> Result<i64, String> {
        if self.accept("+") {
            self.unary()
        } else if self.accept("-") {
            Ok(self.unary()?.wrapping_neg())
        } else if self.accept("!") {
            Ok((self.unary()? == 0) as i64)
        } else if self.accept("~") {
            Ok(!self.unary()?)
        } else if self.accept("(") {
            let value = self.ternary()?;
            self.expect(")")?;

            Ok(value)
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Result<i64, String> {
        let token = self
            .peek()
            .ok_or_else(|| "unexpected end of expression".to_owned())?;
        self.pos += 1;

        match token.kind {
            TokenKind::Number => parse_integer(&token.text)
                .ok_or_else(|| format!("invalid integer '{}' in expression", token.text)),
            TokenKind::Identifier => Ok(0),
            _ => Err(format!("unexpected '{}' in expression", token.text)),
        }
    }
}

/// Parses a C integer literal, with an optional `u`/`l` suffix.
pub(crate) fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim_end_matches(['u', 'U', 'l', 'L']);

    let (digits, radix) = if let Some(hex) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        (hex, 16)
    } else if text.len() > 1 && text.starts_with('0') {
        (&text[1..], 8)
    } else {
        (text, 10)
    };

    u64::from_str_radix(digits, radix).ok().map(|value| value as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{diagnostic::Output, preprocess::lexer::tokenize};
    use std::sync::Arc;

    fn eval(source: &str) -> Result<i64, String> {
        let mut output = Output::new();
        let (tokens, _) = tokenize(&mut output, source, &Arc::from("test"));

        evaluate(&tokens)
    }

    #[test]
    fn precedence() {
        assert_eq!(eval("1 + 2 * 3"), Ok(7));
        assert_eq!(eval("(1 + 2) * 3"), Ok(9));
        assert_eq!(eval("1 << 2 + 1"), Ok(8));
        assert_eq!(eval("1 || 0 && 0"), Ok(1));
        assert_eq!(eval("2 > 1 == 1"), Ok(1));
        assert_eq!(eval("6 & 3 | 8 ^ 1"), Ok(11));
    }

    #[test]
    fn unary_and_ternary() {
        assert_eq!(eval("-3 + ~0"), Ok(-4));
        assert_eq!(eval("!0 ? 10 : 20"), Ok(10));
        assert_eq!(eval("0 ? 10 : 1 ? 30 : 40"), Ok(30));
    }

    #[test]
    fn literals() {
        assert_eq!(eval("0x10 + 010 + 10u"), Ok(34));
        assert_eq!(eval("UNDEFINED_NAME"), Ok(0));
        assert_eq!(parse_integer("0"), Some(0));
        assert_eq!(parse_integer("1.5"), None);
    }

    #[test]
    fn errors() {
        assert!(eval("1 / 0").is_err());
        assert!(eval("(1").is_err());
        assert!(eval("1 2").is_err());
        assert!(eval("").is_err());
    }
}
