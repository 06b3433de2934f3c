// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Messages produced while compiling.
//!
//! Every stage of the compiler reports problems by appending to an [`Output`]. A message that adds
//! context to the one before it (such as "see previous declaration") is marked as `continued`
//! and isn't counted on its own.

use std::{
    error::Error,
    fmt::{Display, Error as FmtError, Formatter},
    sync::Arc,
};

/// Severity of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Info => "note",
            Level::Warning => "warning",
            Level::Error => "error",
        }
    }
}

/// A position in a source file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Location {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
}

impl Location {
    #[inline]
    pub fn new(file: impl Into<Arc<str>>, line: u32, column: u32) -> Self {
        Location {
            file: file.into(),
            line,
            column,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub level: Level,
    /// Empty if the message isn't tied to a file.
    pub file: String,
    /// Zero if unknown.
    pub line: u32,
    /// Zero if unknown.
    pub column: u32,
    /// Whether this message continues the previous one.
    pub continued: bool,
    pub text: String,
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        if !self.file.is_empty() {
            write!(f, "{}:", self.file)?;

            if self.line > 0 {
                write!(f, "{}:", self.line)?;

                if self.column > 0 {
                    write!(f, "{}:", self.column)?;
                }
            }

            f.write_str(" ")?;
        }

        write!(f, "{}: {}", self.level.as_str(), self.text)
    }
}

/// The list of messages produced while compiling.
#[derive(Clone, Debug, Default)]
pub struct Output {
    messages: Vec<Message>,
}

impl Output {
    #[inline]
    pub fn new() -> Self {
        Output::default()
    }

    /// Appends a message and returns its index.
    pub fn add_message(
        &mut self,
        level: Level,
        file: impl Into<String>,
        line: u32,
        column: u32,
        continued: bool,
        text: impl Into<String>,
    ) -> usize {
        let message = Message {
            level,
            file: file.into(),
            line,
            column,
            continued,
            text: text.into(),
        };

        log::debug!("{}", message);
        self.messages.push(message);

        self.messages.len() - 1
    }

    /// Appends an error at `location` and returns the error for it.
    pub(crate) fn error(&mut self, location: &Location, text: impl Into<String>) -> CompileError {
        let message = self.add_message(
            Level::Error,
            &*location.file,
            location.line,
            location.column,
            false,
            text,
        );

        CompileError { message }
    }

    pub(crate) fn warning(&mut self, location: &Location, text: impl Into<String>) {
        self.add_message(
            Level::Warning,
            &*location.file,
            location.line,
            location.column,
            false,
            text,
        );
    }

    /// Appends a note that continues the previous message.
    pub(crate) fn note(&mut self, location: &Location, text: impl Into<String>) {
        self.add_message(
            Level::Info,
            &*location.file,
            location.line,
            location.column,
            true,
            text,
        );
    }

    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[inline]
    pub fn message(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    /// Returns the number of warnings, not counting continued messages.
    pub fn warning_count(&self) -> usize {
        self.count(Level::Warning)
    }

    /// Returns the number of errors, not counting continued messages.
    pub fn error_count(&self) -> usize {
        self.count(Level::Error)
    }

    fn count(&self, level: Level) -> usize {
        self.messages
            .iter()
            .filter(|message| message.level == level && !message.continued)
            .count()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

impl Display for Output {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        for message in &self.messages {
            writeln!(f, "{}", message)?;
        }

        Ok(())
    }
}

/// Error returned when compilation fails. The details are in the [`Output`] the compilation was
/// given.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompileError {
    /// Index of the first message describing the failure.
    pub message: usize,
}

impl Error for CompileError {}

impl Display for CompileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "compilation failed (see message {})", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continued_messages_are_not_counted() {
        let mut output = Output::new();
        let location = Location::new("test.msl", 3, 9);

        let error = output.error(&location, "pipeline Test already declared");
        output.note(&Location::new("test.msl", 1, 9), "see previous declaration");
        output.warning(&location, "unknown render state field");

        assert_eq!(error.message, 0);
        assert_eq!(output.error_count(), 1);
        assert_eq!(output.warning_count(), 1);
        assert_eq!(output.messages().len(), 3);
        assert!(output.messages()[1].continued);
    }

    #[test]
    fn display() {
        let mut output = Output::new();
        output.add_message(Level::Error, "test.msl", 3, 9, false, "bad");
        output.add_message(Level::Warning, "", 0, 0, false, "no location");

        assert_eq!(output.messages()[0].to_string(), "test.msl:3:9: error: bad");
        assert_eq!(output.messages()[1].to_string(), "warning: no location");
    }
}
