// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use crate::diagnostic::{Location, Output};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    Number,
    /// A quoted string, including the quotes.
    String,
    /// The `<file>` operand of an include directive, including the brackets.
    HeaderName,
    Punctuation,
    /// A whole `#version`, `#extension` or `#pragma` line that is passed through.
    Directive,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
    /// Whether this is the first token on its line.
    pub line_start: bool,
    /// Whether whitespace or a comment precedes the token.
    pub space_before: bool,
}

impl Token {
    #[inline]
    pub fn is(&self, text: &str) -> bool {
        self.text == text && matches!(self.kind, TokenKind::Punctuation | TokenKind::Identifier)
    }

    #[inline]
    pub fn is_identifier(&self) -> bool {
        self.kind == TokenKind::Identifier
    }

    #[inline]
    pub fn location(&self) -> Location {
        Location {
            file: self.file.clone(),
            line: self.line,
            column: self.column,
        }
    }
}

const PUNCTUATION: &[&str] = &[
    "<<=", ">>=", "...", "##", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "^^", "++", "--",
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "{", "}", "[", "]", "(", ")", ";", ",", ".",
    "+", "-", "*", "/", "%", "<", ">", "=", "!", "~", "&", "|", "^", "?", ":", "#",
];

/// Splits `source` into tokens.
///
/// Invalid characters and unterminated comments or strings are reported to `output`; scanning
/// continues after them. Returns the tokens and whether the whole source was valid.
pub fn tokenize(output: &mut Output, source: &str, file: &Arc<str>) -> (Vec<Token>, bool) {
    Lexer {
        bytes: source.as_bytes(),
        source,
        file,
        pos: 0,
        line: 1,
        line_begin: 0,
        tokens: Vec::new(),
        line_start: true,
        space_before: false,
        valid: true,
    }
    .run(output)
}

struct Lexer<'a> {
    bytes: &'a [u8],
    source: &'a str,
    file: &'a Arc<str>,
    pos: usize,
    line: u32,
    line_begin: usize,
    tokens: Vec<Token>,
    line_start: bool,
    space_before: bool,
    valid: bool,
}

impl Lexer<'_> {
    fn run(mut self, output: &mut Output) -> (Vec<Token>, bool) {
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];

            match b {
                b'\n' => {
                    self.newline();
                    self.line_start = true;
                    self.space_before = true;
                }
                b' ' | b'\t' | b'\r' | b'\x0b' | b'\x0c' => {
                    self.pos += 1;
                    self.space_before = true;
                }
                b'\\' if self.continuation_len() > 0 => {
                    self.pos += self.continuation_len() - 1;
                    self.newline();
                    self.space_before = true;
                }
                b'/' if self.peek(1) == Some(b'/') => {
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        if self.bytes[self.pos] == b'\\' && self.continuation_len() > 0 {
                            self.pos += self.continuation_len() - 1;
                            self.newline();
                        } else {
                            self.pos += 1;
                        }
                    }
                    self.space_before = true;
                }
                b'/' if self.peek(1) == Some(b'*') => self.block_comment(output),
                b'"' => self.string(output),
                b'<' if self.in_include_directive() => self.header_name(output),
                b'0'..=b'9' => self.number(),
                b'.' if self.peek(1).is_some_and(|c| c.is_ascii_digit()) => self.number(),
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.identifier(),
                _ => self.punctuation(output),
            }
        }

        (self.tokens, self.valid)
    }

    #[inline]
    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    /// Returns the length of a line continuation at the current position, or 0.
    fn continuation_len(&self) -> usize {
        match (self.peek(1), self.peek(2)) {
            (Some(b'\n'), _) => 2,
            (Some(b'\r'), Some(b'\n')) => 3,
            _ => 0,
        }
    }

    fn newline(&mut self) {
        self.pos += 1;
        self.line += 1;
        self.line_begin = self.pos;
    }

    fn column(&self, pos: usize) -> u32 {
        self.source[self.line_begin..pos].chars().count() as u32 + 1
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: u32, column: u32) {
        let text = self.source[start..self.pos]
            .replace("\\\r\n", "")
            .replace("\\\n", "");

        self.tokens.push(Token {
            kind,
            text,
            file: self.file.clone(),
            line,
            column,
            line_start: self.line_start,
            space_before: self.space_before,
        });
        self.line_start = false;
        self.space_before = false;
    }

    fn error(&mut self, output: &mut Output, line: u32, column: u32, text: &str) {
        output.error(&Location::new(self.file.clone(), line, column), text);
        self.valid = false;
    }

    fn block_comment(&mut self, output: &mut Output) {
        let (line, column) = (self.line, self.column(self.pos));
        self.pos += 2;

        loop {
            match self.peek(0) {
                None => {
                    self.error(output, line, column, "unterminated comment");
                    break;
                }
                Some(b'*') if self.peek(1) == Some(b'/') => {
                    self.pos += 2;
                    break;
                }
                Some(b'\n') => self.newline(),
                Some(_) => self.pos += 1,
            }
        }

        self.space_before = true;
    }

    fn string(&mut self, output: &mut Output) {
        let (start, line, column) = (self.pos, self.line, self.column(self.pos));
        self.pos += 1;

        loop {
            match self.peek(0) {
                None | Some(b'\n') => {
                    self.error(output, line, column, "unterminated string");
                    return;
                }
                Some(b'\\') if self.peek(1).is_some() && self.peek(1) != Some(b'\n') => {
                    self.pos += 2;
                }
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => self.pos += 1,
            }
        }

        self.push(TokenKind::String, start, line, column);
    }

    fn in_include_directive(&self) -> bool {
        match self.tokens.as_slice() {
            [.., hash, include] => {
                hash.line_start && hash.text == "#" && include.text == "include" && !self.line_start
            }
            _ => false,
        }
    }

    fn header_name(&mut self, output: &mut Output) {
        let (start, line, column) = (self.pos, self.line, self.column(self.pos));

        match self.source[self.pos..].find(['>', '\n']) {
            Some(end) if self.bytes[self.pos + end] == b'>' => {
                self.pos += end + 1;
                self.push(TokenKind::HeaderName, start, line, column);
            }
            _ => {
                self.error(output, line, column, "unterminated include file name");
                self.pos += 1;
            }
        }
    }

    fn number(&mut self) {
        let (start, line, column) = (self.pos, self.line, self.column(self.pos));
        self.pos += 1;

        while let Some(c) = self.peek(0) {
            let exponent = matches!(c, b'+' | b'-')
                && matches!(self.bytes[self.pos - 1], b'e' | b'E')
                && !self.source[start..self.pos].starts_with("0x")
                && !self.source[start..self.pos].starts_with("0X");

            if c.is_ascii_alphanumeric() || c == b'_' || c == b'.' || exponent {
                self.pos += 1;
            } else {
                break;
            }
        }

        self.push(TokenKind::Number, start, line, column);
    }

    fn identifier(&mut self) {
        let (start, line, column) = (self.pos, self.line, self.column(self.pos));

        while let Some(c) = self.peek(0) {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.pos += 1;
            } else if c == b'\\' && self.continuation_len() > 0 {
                self.pos += self.continuation_len() - 1;
                self.newline();
            } else {
                break;
            }
        }

        self.push(TokenKind::Identifier, start, line, column);
    }

    fn punctuation(&mut self, output: &mut Output) {
        let (start, line, column) = (self.pos, self.line, self.column(self.pos));
        let rest = &self.source[self.pos..];

        match PUNCTUATION.iter().find(|p| rest.starts_with(**p)) {
            Some(punctuation) => {
                self.pos += punctuation.len();
                self.push(TokenKind::Punctuation, start, line, column);
            }
            None => {
                let c = rest.chars().next().unwrap_or('?');
                self.error(
                    output,
                    line,
                    column,
                    &format!("invalid character '{}'", c.escape_default()),
                );
                self.pos += c.len_utf8();
                self.space_before = true;
            }
        }
    }
}

/// Lexes a single token from `text`, as needed when pasting tokens together. Returns `None` if the
/// text isn't exactly one token.
pub(super) fn single_token(text: &str, template: &Token) -> Option<Token> {
    let mut output = Output::new();
    let (mut tokens, valid) = tokenize(&mut output, text, &template.file);

    if !valid || tokens.len() != 1 {
        return None;
    }

    let mut token = tokens.pop()?;
    token.line = template.line;
    token.column = template.column;
    token.line_start = template.line_start;
    token.space_before = template.space_before;

    Some(token)
}
