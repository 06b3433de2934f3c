// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! C-style preprocessing of shader sources.
//!
//! The preprocessor turns a source file into a flat list of tokens with their original locations.
//! Includes are resolved, macros are expanded and conditional blocks are evaluated. `#version`,
//! `#extension` and `#pragma` lines are kept as single [`TokenKind::Directive`] tokens so they can
//! be placed at the top of the generated shaders.

pub use self::lexer::{Token, TokenKind};
use crate::diagnostic::{CompileError, Location, Output};
use foldhash::{HashMap, HashMapExt, HashSet, HashSetExt};
use std::{
    collections::VecDeque,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

mod expr;
mod lexer;

pub(crate) use self::expr::parse_integer;

/// Maximum nesting of include files.
pub const MAX_INCLUDE_DEPTH: usize = 64;

/// Name of the pseudo-file holding the pre-header lines.
pub const PRE_HEADER_FILE: &str = "pre-header";

#[derive(Clone, Debug, Default)]
pub struct PreprocessOptions {
    /// Lines processed before the source, as if they were in a file named `pre-header`.
    pub pre_header_lines: Vec<String>,
    /// Macros defined before processing, as `(name, value)`.
    pub defines: Vec<(String, String)>,
    pub include_paths: Vec<PathBuf>,
    /// Whether the target supports uniform blocks. Controls the expansion of `INSTANCE(x)`.
    pub uniform_blocks_supported: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Macro {
    /// `None` for object-like macros.
    params: Option<Vec<String>>,
    variadic: bool,
    body: Vec<Token>,
}

/// The state of one `#if` block.
#[derive(Clone, Copy, Debug)]
struct Conditional {
    /// Whether the enclosing block is active.
    parent_active: bool,
    /// Whether the current branch is active.
    active: bool,
    /// Whether any branch so far was taken.
    taken: bool,
    else_seen: bool,
}

/// Tokens during macro expansion, with the names of the macros that may not expand them again.
type HideSet = Vec<String>;

pub struct Preprocessor<'a> {
    output: &'a mut Output,
    macros: HashMap<String, Macro>,
    include_paths: Vec<PathBuf>,
    once_files: HashSet<PathBuf>,
    tokens: Vec<Token>,
    depth: usize,
    valid: bool,
}

impl<'a> Preprocessor<'a> {
    pub fn new(output: &'a mut Output, options: &PreprocessOptions) -> Self {
        let mut preprocessor = Preprocessor {
            output,
            macros: HashMap::new(),
            include_paths: options.include_paths.clone(),
            once_files: HashSet::new(),
            tokens: Vec::new(),
            depth: 0,
            valid: true,
        };

        let instance = if options.uniform_blocks_supported {
            "x"
        } else {
            "uniforms"
        };
        preprocessor.define_builtin(&format!("INSTANCE(x) {}", instance));

        for (name, value) in &options.defines {
            preprocessor.define_builtin(&format!("{} {}", name, value));
        }

        preprocessor
    }

    fn define_builtin(&mut self, definition: &str) {
        let file: Arc<str> = Arc::from("<built-in>");
        let (tokens, _) = lexer::tokenize(self.output, definition, &file);

        if let Some((name, definition)) = self.parse_define(&tokens) {
            self.macros.insert(name, definition);
        }
    }

    /// Defines a macro. `value` may be empty.
    pub fn define(&mut self, name: &str, value: &str) {
        self.define_builtin(&format!("{} {}", name, value));
    }

    /// Returns whether a macro is currently defined.
    pub fn is_defined(&self, name: &str) -> bool {
        name == "__LINE__" || self.macros.contains_key(name)
    }

    /// Preprocesses `source`, first processing the pre-header lines of `options`.
    pub fn preprocess(
        mut self,
        source: &str,
        file_name: &str,
        options: &PreprocessOptions,
    ) -> Result<Vec<Token>, CompileError> {
        let first_message = self.output.messages().len();

        if !options.pre_header_lines.is_empty() {
            let mut pre_header = options.pre_header_lines.join("\n");
            pre_header.push('\n');
            self.process_file(&pre_header, Arc::from(PRE_HEADER_FILE), None)?;
        }

        let path = Path::new(file_name);
        let directory = path.parent().map(Path::to_path_buf);
        self.process_file(source, Arc::from(file_name), directory.as_deref())?;

        if self.valid {
            Ok(self.tokens)
        } else {
            Err(CompileError {
                message: self.first_error(first_message),
            })
        }
    }

    fn first_error(&self, from: usize) -> usize {
        self.output.messages()[from..]
            .iter()
            .position(|message| message.level == crate::diagnostic::Level::Error)
            .map_or(from, |index| from + index)
    }

    fn process_file(
        &mut self,
        source: &str,
        file: Arc<str>,
        directory: Option<&Path>,
    ) -> Result<(), CompileError> {
        let (tokens, valid) = lexer::tokenize(self.output, source, &file);
        self.valid &= valid;

        let mut state = FileState {
            file: file.clone(),
            directory: directory.map(Path::to_path_buf),
            path: directory.map(|_| PathBuf::from(&*file)),
            line_delta: 0,
            conditionals: Vec::new(),
        };

        let mut pending = Vec::new();
        let mut index = 0;

        while index < tokens.len() {
            let line_end = tokens[index + 1..]
                .iter()
                .position(|token| token.line_start)
                .map_or(tokens.len(), |offset| index + 1 + offset);

            if tokens[index].line_start && tokens[index].is("#") {
                let line = self.relocate(&tokens[index..line_end], &state);

                if !pending.is_empty() {
                    let expanded = self.expand(std::mem::take(&mut pending));
                    self.tokens.extend(expanded);
                }

                self.directive(&line, &mut state)?;
            } else if state.is_active() {
                pending.extend(self.relocate(&tokens[index..line_end], &state));
            }

            index = line_end;
        }

        if !pending.is_empty() {
            let expanded = self.expand(pending);
            self.tokens.extend(expanded);
        }

        if !state.conditionals.is_empty() {
            let location = Location::new(file, tokens.last().map_or(0, |token| token.line), 0);
            return Err(self.output.error(&location, "unterminated #if block"));
        }

        Ok(())
    }

    /// Applies `#line` adjustments to tokens of the current file.
    fn relocate(&self, tokens: &[Token], state: &FileState) -> Vec<Token> {
        tokens
            .iter()
            .map(|token| {
                let mut token = token.clone();
                token.file = state.file.clone();
                token.line = (i64::from(token.line) + state.line_delta).max(0) as u32;
                token
            })
            .collect()
    }

    fn directive(&mut self, line: &[Token], state: &mut FileState) -> Result<(), CompileError> {
        let Some(name) = line.get(1) else {
            return Ok(());
        };
        let args = &line[2..];
        let active = state.is_active();

        match name.text.as_str() {
            "if" | "ifdef" | "ifndef" => {
                let condition = if active {
                    self.condition(name, args)?
                } else {
                    false
                };

                state.conditionals.push(Conditional {
                    parent_active: active,
                    active: condition,
                    taken: condition,
                    else_seen: false,
                });
            }
            "elif" => {
                let conditional = self.current_conditional(name, state)?;

                if conditional.else_seen {
                    return Err(self.output.error(&name.location(), "#elif after #else"));
                }

                let condition = if conditional.parent_active && !conditional.taken {
                    self.condition(name, args)?
                } else {
                    false
                };

                if let Some(conditional) = state.conditionals.last_mut() {
                    conditional.active = condition;
                    conditional.taken |= condition;
                }
            }
            "else" => {
                let conditional = self.current_conditional(name, state)?;

                if conditional.else_seen {
                    return Err(self.output.error(&name.location(), "duplicate #else"));
                }

                if let Some(conditional) = state.conditionals.last_mut() {
                    conditional.active = conditional.parent_active && !conditional.taken;
                    conditional.taken = true;
                    conditional.else_seen = true;
                }
            }
            "endif" => {
                self.current_conditional(name, state)?;
                state.conditionals.pop();
            }
            _ if !active => (),
            "define" => match self.parse_define(args) {
                Some((macro_name, definition)) => {
                    if macro_name == "defined" || macro_name == "__LINE__" {
                        return Err(self.output.error(
                            &name.location(),
                            format!("cannot define '{}'", macro_name),
                        ));
                    }

                    self.macros.insert(macro_name, definition);
                }
                None => {
                    return Err(self.output.error(&name.location(), "invalid #define directive"));
                }
            },
            "undef" => match args {
                [macro_name] if macro_name.is_identifier() => {
                    self.macros.remove(&macro_name.text);
                }
                _ => {
                    return Err(self.output.error(&name.location(), "invalid #undef directive"));
                }
            },
            "include" => self.include(name, args, state)?,
            "error" => {
                return Err(self.output.error(
                    &name.location(),
                    format!("#error {}", join_tokens(args)),
                ));
            }
            "line" => self.line(name, args, state)?,
            "pragma" if args.len() == 1 && args[0].is("once") => {
                if let Some(path) = &state.path {
                    let path = fs::canonicalize(path).unwrap_or_else(|_| path.clone());
                    self.once_files.insert(path);
                }
            }
            "version" | "extension" | "pragma" => {
                self.tokens.push(Token {
                    kind: TokenKind::Directive,
                    text: format!("#{} {}", name.text, join_tokens(args)),
                    ..name.clone()
                });
            }
            _ => {
                return Err(self.output.error(
                    &name.location(),
                    format!("unknown preprocessor directive '#{}'", name.text),
                ));
            }
        }

        Ok(())
    }

    fn current_conditional(
        &mut self,
        name: &Token,
        state: &FileState,
    ) -> Result<Conditional, CompileError> {
        match state.conditionals.last() {
            Some(conditional) => Ok(*conditional),
            None => Err(self.output.error(
                &name.location(),
                format!("#{} without #if", name.text),
            )),
        }
    }

    fn condition(&mut self, name: &Token, args: &[Token]) -> Result<bool, CompileError> {
        match name.text.as_str() {
            "ifdef" | "ifndef" => match args {
                [macro_name] if macro_name.is_identifier() => {
                    Ok(self.is_defined(&macro_name.text) == (name.text == "ifdef"))
                }
                _ => Err(self.output.error(
                    &name.location(),
                    format!("invalid #{} directive", name.text),
                )),
            },
            _ => {
                let mut resolved = Vec::with_capacity(args.len());
                let mut index = 0;

                while index < args.len() {
                    if !args[index].is("defined") {
                        resolved.push(args[index].clone());
                        index += 1;
                        continue;
                    }

                    let (macro_name, next) = match &args[index + 1..] {
                        [open, macro_name, close, ..]
                            if open.is("(") && macro_name.is_identifier() && close.is(")") =>
                        {
                            (macro_name, index + 4)
                        }
                        [macro_name, ..] if macro_name.is_identifier() => (macro_name, index + 2),
                        _ => {
                            return Err(self
                                .output
                                .error(&args[index].location(), "invalid use of 'defined'"));
                        }
                    };

                    resolved.push(Token {
                        kind: TokenKind::Number,
                        text: if self.is_defined(&macro_name.text) { "1" } else { "0" }.to_owned(),
                        ..args[index].clone()
                    });
                    index = next;
                }

                let expanded = self.expand(resolved);

                expr::evaluate(&expanded)
                    .map(|value| value != 0)
                    .map_err(|text| self.output.error(&name.location(), text))
            }
        }
    }

    fn include(
        &mut self,
        name: &Token,
        args: &[Token],
        state: &FileState,
    ) -> Result<(), CompileError> {
        let args = if matches!(
            args.first().map(|token| token.kind),
            Some(TokenKind::String | TokenKind::HeaderName)
        ) {
            args.to_vec()
        } else {
            self.expand(args.to_vec())
        };

        let (file_name, quoted) = match args.as_slice() {
            [file] if file.kind == TokenKind::String => (unquote(&file.text), true),
            [file] if file.kind == TokenKind::HeaderName => {
                (file.text[1..file.text.len() - 1].to_owned(), false)
            }
            _ => {
                return Err(self.output.error(&name.location(), "invalid #include directive"));
            }
        };

        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(self.output.error(
                &name.location(),
                format!("#include nested too deeply ({} levels)", MAX_INCLUDE_DEPTH),
            ));
        }

        let current_directory = quoted.then_some(state.directory.as_deref()).flatten();
        let candidates = current_directory
            .into_iter()
            .chain(self.include_paths.iter().map(PathBuf::as_path))
            .map(|directory| directory.join(&file_name))
            .collect::<Vec<_>>();

        let Some(path) = candidates.into_iter().find(|path| path.is_file()) else {
            return Err(self.output.error(
                &name.location(),
                format!("cannot find include file '{}'", file_name),
            ));
        };

        let canonical = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if self.once_files.contains(&canonical) {
            return Ok(());
        }

        let source = fs::read_to_string(&path).map_err(|err| {
            self.output.error(
                &name.location(),
                format!("cannot read include file '{}': {}", path.display(), err),
            )
        })?;

        log::trace!("including {}", path.display());

        self.depth += 1;
        let file: Arc<str> = Arc::from(path.to_string_lossy().as_ref());
        let result = self.process_file(&source, file, path.parent());
        self.depth -= 1;

        result
    }

    fn line(
        &mut self,
        name: &Token,
        args: &[Token],
        state: &mut FileState,
    ) -> Result<(), CompileError> {
        let args = self.expand(args.to_vec());

        let (line, file) = match args.as_slice() {
            [line] => (line, None),
            [line, file] => (line, Some(file)),
            _ => return Err(self.output.error(&name.location(), "invalid #line directive")),
        };

        let Some(number) = parse_integer(&line.text).filter(|_| line.kind == TokenKind::Number)
        else {
            return Err(self.output.error(&line.location(), "invalid line number"));
        };

        // The line after the directive gets the given number.
        let raw_line = i64::from(name.line) - state.line_delta;
        state.line_delta = number - (raw_line + 1);

        match file {
            Some(file) if file.kind == TokenKind::String => {
                state.file = Arc::from(unquote(&file.text));
            }
            Some(file) if file.kind == TokenKind::Number => (),
            Some(file) => {
                return Err(self.output.error(&file.location(), "invalid file name in #line"));
            }
            None => (),
        }

        Ok(())
    }

    /// Parses the arguments of a `#define` directive.
    fn parse_define(&self, args: &[Token]) -> Option<(String, Macro)> {
        let (name, rest) = args.split_first()?;

        if !name.is_identifier() {
            return None;
        }

        match rest.first() {
            Some(open) if open.is("(") && !open.space_before => {
                let mut params = Vec::new();
                let mut variadic = false;
                let mut index = 1;

                loop {
                    let token = rest.get(index)?;
                    index += 1;

                    if token.is(")") && params.is_empty() && !variadic {
                        break;
                    } else if token.is("...") {
                        variadic = true;
                    } else if token.is_identifier() && !variadic {
                        params.push(token.text.clone());
                    } else {
                        return None;
                    }

                    let separator = rest.get(index)?;
                    index += 1;

                    if separator.is(")") {
                        break;
                    } else if !separator.is(",") || variadic {
                        return None;
                    }
                }

                Some((
                    name.text.clone(),
                    Macro {
                        params: Some(params),
                        variadic,
                        body: rest[index..].to_vec(),
                    },
                ))
            }
            _ => Some((
                name.text.clone(),
                Macro {
                    params: None,
                    variadic: false,
                    body: rest.to_vec(),
                },
            )),
        }
    }

    /// Fully expands the macros in `tokens`.
    fn expand(&mut self, tokens: Vec<Token>) -> Vec<Token> {
        let mut queue: VecDeque<(Token, HideSet)> =
            tokens.into_iter().map(|token| (token, Vec::new())).collect();
        let mut result = Vec::new();

        while let Some((token, hide_set)) = queue.pop_front() {
            if !token.is_identifier() || hide_set.contains(&token.text) {
                result.push(token);
                continue;
            }

            if token.text == "__LINE__" {
                result.push(Token {
                    kind: TokenKind::Number,
                    text: token.line.to_string(),
                    ..token
                });
                continue;
            }

            let Some(definition) = self.macros.get(&token.text).cloned() else {
                result.push(token);
                continue;
            };

            let mut hide_set = hide_set;
            hide_set.push(token.text.clone());

            let replacement = match &definition.params {
                None => self.substitute(&definition, &[], &token),
                Some(_) => {
                    if !queue.front().is_some_and(|(next, _)| next.is("(")) {
                        result.push(token);
                        continue;
                    }

                    let Some(args) = collect_arguments(&mut queue) else {
                        self.valid = false;
                        self.output
                            .error(&token.location(), format!("unterminated call to macro '{}'", token.text));
                        continue;
                    };

                    match self.bind_arguments(&definition, args, &token) {
                        Some(args) => self.substitute(&definition, &args, &token),
                        None => continue,
                    }
                }
            };

            for (index, mut replaced) in replacement.into_iter().enumerate().rev() {
                if index == 0 {
                    replaced.line_start = token.line_start;
                    replaced.space_before = token.space_before;
                }

                queue.push_front((replaced, hide_set.clone()));
            }
        }

        result
    }

    /// Matches call arguments to the parameters of a function-like macro.
    fn bind_arguments(
        &mut self,
        definition: &Macro,
        mut args: Vec<Vec<Token>>,
        token: &Token,
    ) -> Option<Vec<Vec<Token>>> {
        let params = definition.params.as_deref().unwrap_or(&[]);
        let expected = params.len() + usize::from(definition.variadic);

        // `F()` passes one empty argument.
        if expected == 0 && args.len() == 1 && args[0].is_empty() {
            args.clear();
        }

        if definition.variadic && args.len() > expected {
            let mut rest = args.split_off(expected - 1);
            let mut variadic = rest.remove(0);

            for arg in rest {
                variadic.push(Token {
                    kind: TokenKind::Punctuation,
                    text: ",".to_owned(),
                    space_before: false,
                    ..token.clone()
                });
                variadic.extend(arg);
            }

            args.push(variadic);
        } else if definition.variadic && args.len() + 1 == expected {
            args.push(Vec::new());
        }

        if args.len() != expected {
            self.valid = false;
            self.output.error(
                &token.location(),
                format!(
                    "macro '{}' expects {} arguments but {} were given",
                    token.text,
                    expected,
                    args.len(),
                ),
            );

            return None;
        }

        Some(args)
    }

    /// Produces the replacement list of a macro invocation.
    fn substitute(&mut self, definition: &Macro, args: &[Vec<Token>], call: &Token) -> Vec<Token> {
        let params = definition.params.as_deref().unwrap_or(&[]);
        let param_index = |token: &Token| -> Option<usize> {
            if !token.is_identifier() {
                return None;
            }

            if definition.variadic && token.text == "__VA_ARGS__" {
                return Some(params.len());
            }

            params.iter().position(|param| *param == token.text)
        };

        let body = &definition.body;
        let mut result: Vec<Token> = Vec::new();
        // Indices into `result` of tokens that must be pasted with the next one.
        let mut paste_after = Vec::new();
        let mut index = 0;

        while index < body.len() {
            let token = &body[index];

            if token.is("#") && definition.params.is_some() {
                if let Some(param) = body.get(index + 1).and_then(param_index) {
                    result.push(Token {
                        kind: TokenKind::String,
                        text: stringify(&args[param]),
                        ..relocated(token, call)
                    });
                    index += 2;
                    continue;
                }
            }

            if token.is("##") && !result.is_empty() && index + 1 < body.len() {
                paste_after.push(result.len() - 1);
                index += 1;
                continue;
            }

            match param_index(token) {
                Some(param) => {
                    let pasted = index > 0 && body[index - 1].is("##")
                        || body.get(index + 1).is_some_and(|next| next.is("##"));
                    let arg = if pasted {
                        args[param].clone()
                    } else {
                        self.expand(args[param].clone())
                    };

                    if arg.is_empty() && pasted {
                        // Placeholder so that pasting with an empty argument works.
                        result.push(Token {
                            kind: TokenKind::Identifier,
                            text: String::new(),
                            ..relocated(token, call)
                        });
                    }

                    for (arg_index, arg_token) in arg.into_iter().enumerate() {
                        let mut arg_token = relocated(&arg_token, call);
                        if arg_index == 0 {
                            arg_token.space_before = token.space_before;
                        }
                        result.push(arg_token);
                    }
                }
                None => result.push(relocated(token, call)),
            }

            index += 1;
        }

        for &position in paste_after.iter().rev() {
            if position + 1 >= result.len() {
                continue;
            }

            let right = result.remove(position + 1);
            let left = &result[position];
            let text = format!("{}{}", left.text, right.text);

            if text.is_empty() {
                result.remove(position);
                continue;
            }

            match lexer::single_token(&text, left) {
                Some(token) => result[position] = token,
                None => {
                    self.valid = false;
                    self.output.error(
                        &call.location(),
                        format!("pasting '{}' and '{}' doesn't form a valid token", left.text, right.text),
                    );
                }
            }
        }

        result.retain(|token| !token.text.is_empty());

        result
    }
}

struct FileState {
    /// The name reported for the file, which `#line` may change.
    file: Arc<str>,
    directory: Option<PathBuf>,
    /// Only set for files read from disk.
    path: Option<PathBuf>,
    line_delta: i64,
    conditionals: Vec<Conditional>,
}

impl FileState {
    fn is_active(&self) -> bool {
        self.conditionals
            .last()
            .is_none_or(|conditional| conditional.active && conditional.parent_active)
    }
}

/// Preprocesses `source`. See [`Preprocessor`].
pub fn preprocess(
    output: &mut Output,
    source: &str,
    file_name: &str,
    options: &PreprocessOptions,
) -> Result<Vec<Token>, CompileError> {
    Preprocessor::new(output, options).preprocess(source, file_name, options)
}

/// Takes the parenthesized arguments of a macro call from the front of `queue`.
fn collect_arguments(queue: &mut VecDeque<(Token, HideSet)>) -> Option<Vec<Vec<Token>>> {
    // Opening parenthesis.
    queue.pop_front()?;

    let mut args = vec![Vec::new()];
    let mut depth = 0;

    loop {
        let (token, _) = queue.pop_front()?;

        if token.is("(") {
            depth += 1;
        } else if token.is(")") {
            if depth == 0 {
                break;
            }

            depth -= 1;
        } else if token.is(",") && depth == 0 {
            args.push(Vec::new());
            continue;
        }

        args.last_mut()?.push(token);
    }

    Some(args)
}

/// Gives a token from a macro body the location of the macro call.
fn relocated(token: &Token, call: &Token) -> Token {
    Token {
        file: call.file.clone(),
        line: call.line,
        column: call.column,
        line_start: false,
        ..token.clone()
    }
}

fn stringify(tokens: &[Token]) -> String {
    let mut text = String::from("\"");

    for (index, token) in tokens.iter().enumerate() {
        if index > 0 && token.space_before {
            text.push(' ');
        }

        if token.kind == TokenKind::String {
            text.push_str(&token.text.replace('\\', "\\\\").replace('"', "\\\""));
        } else {
            text.push_str(&token.text);
        }
    }

    text.push('"');

    text
}

fn unquote(text: &str) -> String {
    text.strip_prefix('"')
        .and_then(|text| text.strip_suffix('"'))
        .unwrap_or(text)
        .replace("\\\"", "\"")
        .replace("\\\\", "\\")
}

/// Joins tokens back into text, keeping the spacing between them.
pub fn join_tokens(tokens: &[Token]) -> String {
    let mut text = String::new();

    for (index, token) in tokens.iter().enumerate() {
        if index > 0 && (token.space_before || needs_space(&tokens[index - 1], token)) {
            text.push(' ');
        }

        text.push_str(&token.text);
    }

    text
}

/// Returns whether two adjacent tokens would merge into one without a space between them.
pub(crate) fn needs_space(previous: &Token, next: &Token) -> bool {
    let word = |token: &Token| matches!(token.kind, TokenKind::Identifier | TokenKind::Number);

    (word(previous) && word(next))
        || (previous.kind == TokenKind::Punctuation
            && next.kind == TokenKind::Punctuation
            && lexer_merges(&previous.text, &next.text))
}

fn lexer_merges(left: &str, right: &str) -> bool {
    let combined = format!("{}{}", left, right);

    [
        "<<=", ">>=", "...", "##", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "^^", "++",
        "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "//", "/*",
    ]
    .iter()
    .any(|punctuation| combined.starts_with(punctuation) && punctuation.len() > left.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, process};

    fn run(source: &str, options: &PreprocessOptions) -> (Result<Vec<Token>, CompileError>, Output) {
        let mut output = Output::new();
        let result = preprocess(&mut output, source, "test.msl", options);

        (result, output)
    }

    fn text(source: &str) -> String {
        let (result, output) = run(source, &PreprocessOptions::default());
        assert_eq!(output.error_count(), 0, "{}", output);

        join_tokens(&result.unwrap())
    }

    #[test]
    fn object_macros() {
        assert_eq!(text("#define SIZE 4\nfloat a[SIZE];"), "float a[4];");
        assert_eq!(text("#define A B\n#define B A\nA B"), "A B");
    }

    #[test]
    fn function_macros() {
        assert_eq!(text("#define ADD(a, b) ((a) + (b))\nADD(1, f(2, 3))"), "((1) + (f(2, 3)))");
        assert_eq!(text("#define STR(x) #x\nSTR(a + b)"), "\"a + b\"");
        assert_eq!(text("#define CAT(a, b) a ## b\nCAT(tex, Coord)"), "texCoord");
        assert_eq!(text("#define V(...) f(__VA_ARGS__)\nV(1, 2, 3)"), "f(1, 2, 3)");
        assert_eq!(text("#define F(x) x\nF"), "F");
        assert_eq!(text("#define F() 1\nF()"), "1");
    }

    #[test]
    fn conditionals() {
        let source = "\
#define LEVEL 2
#if LEVEL > 1 && defined(LEVEL)
a
#elif LEVEL == 1
b
#else
c
#endif
#ifdef MISSING
d
#ifndef ALSO_MISSING
e
#endif
#else
f
#endif
#if !defined LEVEL
g
#endif";

        assert_eq!(text(source), "a f");
    }

    #[test]
    fn builtins() {
        let options = PreprocessOptions {
            uniform_blocks_supported: false,
            ..Default::default()
        };
        let (result, _) = run("INSTANCE(transform).matrix __LINE__", &options);
        assert_eq!(join_tokens(&result.unwrap()), "uniforms.matrix 1");

        let options = PreprocessOptions {
            uniform_blocks_supported: true,
            defines: vec![("HAS_INTEGERS".to_owned(), "1".to_owned())],
            ..Default::default()
        };
        let (result, _) = run("INSTANCE(transform) HAS_INTEGERS", &options);
        assert_eq!(join_tokens(&result.unwrap()), "transform 1");
    }

    #[test]
    fn pre_header() {
        let options = PreprocessOptions {
            pre_header_lines: vec!["#define FROM_HEADER 3".to_owned(), "int header;".to_owned()],
            ..Default::default()
        };
        let (result, _) = run("int a = FROM_HEADER;", &options);
        let tokens = result.unwrap();

        assert_eq!(&*tokens[0].file, PRE_HEADER_FILE);
        assert_eq!(tokens[0].line, 2);
        assert_eq!(&*tokens[3].file, "test.msl");
        assert_eq!(tokens[3].line, 1);
        assert_eq!(tokens[6].text, "3");
    }

    #[test]
    fn pass_through_directives() {
        let (result, _) = run(
            "#version 450\n#extension GL_EXT_foo : require\n#pragma optimize(off)\nint a;",
            &PreprocessOptions::default(),
        );
        let tokens = result.unwrap();

        assert_eq!(tokens[0].kind, TokenKind::Directive);
        assert_eq!(tokens[0].text, "#version 450");
        assert_eq!(tokens[1].text, "#extension GL_EXT_foo : require");
        assert_eq!(tokens[2].text, "#pragma optimize(off)");
        assert_eq!(tokens[3].line, 4);
    }

    #[test]
    fn line_directive() {
        let (result, _) = run("#line 20 \"other.msl\"\na\nb", &PreprocessOptions::default());
        let tokens = result.unwrap();

        assert_eq!((&*tokens[0].file, tokens[0].line), ("other.msl", 20));
        assert_eq!(tokens[1].line, 21);
    }

    #[test]
    fn errors() {
        let (result, output) = run("#error stop here\n", &PreprocessOptions::default());
        assert!(result.is_err());
        assert_eq!(output.messages()[0].text, "#error stop here");

        let (result, _) = run("#if 1\na", &PreprocessOptions::default());
        assert!(result.is_err());

        let (result, _) = run("#endif", &PreprocessOptions::default());
        assert!(result.is_err());

        let (result, _) = run("#include \"missing.mslh\"", &PreprocessOptions::default());
        assert!(result.is_err());

        let (result, output) = run("a $ b", &PreprocessOptions::default());
        assert_eq!(result.unwrap_err().message, 0);
        assert_eq!(output.error_count(), 1);

        let (result, _) = run("#bogus", &PreprocessOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn includes() {
        let directory = env::temp_dir().join(format!("msl-preprocess-{}", process::id()));
        let nested = directory.join("nested");
        fs::create_dir_all(&nested).unwrap();
        fs::write(
            directory.join("common.mslh"),
            "#pragma once\n#include \"nested/value.mslh\"\nint common;\n",
        )
        .unwrap();
        fs::write(nested.join("value.mslh"), "#define VALUE 7\n").unwrap();

        let options = PreprocessOptions {
            include_paths: vec![directory.clone()],
            ..Default::default()
        };
        let (result, output) = run(
            "#include <common.mslh>\n#include \"common.mslh\"\nint a = VALUE;",
            &options,
        );
        assert_eq!(output.error_count(), 0, "{}", output);

        let tokens = result.unwrap();
        assert_eq!(join_tokens(&tokens), "int common; int a = 7;");
        assert!(tokens[0].file.ends_with("common.mslh"));
        assert_eq!(tokens[0].line, 3);

        fs::remove_dir_all(&directory).unwrap();
    }

    #[test]
    fn recursive_include() {
        let directory = env::temp_dir().join(format!("msl-recursive-{}", process::id()));
        fs::create_dir_all(&directory).unwrap();
        fs::write(directory.join("self.mslh"), "#include \"self.mslh\"\n").unwrap();

        let options = PreprocessOptions {
            include_paths: vec![directory.clone()],
            ..Default::default()
        };
        let (result, output) = run("#include <self.mslh>", &options);
        assert!(result.is_err());
        assert!(output.messages()[0].text.contains("nested too deeply"));

        fs::remove_dir_all(&directory).unwrap();
    }
}
