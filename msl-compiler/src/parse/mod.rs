// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Splits preprocessed sources into pipelines, sampler states and GLSL declarations.
//!
//! A source file is GLSL with a few additional top-level constructs:
//!
//! ```glsl
//! sampler_state Linear { min_filter = linear; mag_filter = linear; };
//!
//! [[fragment]] fragment_inputs Framebuffer {
//!     layout(location = 0, fragment_group = 0) vec4 color;
//! } framebuffer;
//!
//! [[vertex]] void vertMain() { gl_Position = vec4(0.0); }
//!
//! pipeline Draw {
//!     vertex = vertMain;
//!     fragment = fragMain;
//!     cull_mode = back;
//!     state { depth_test_enable = true; }
//! }
//! ```
//!
//! Every other top-level declaration is plain GLSL. A `[[stage, ...]]` prefix limits a
//! declaration to the listed stages. The GLSL of one stage is assembled by
//! [`Parser::create_shader_string`].

use self::state::{set_render_state, set_sampler_state, StateError};
use crate::{
    diagnostic::{CompileError, Location, Output},
    preprocess::{needs_space, Token, TokenKind},
};
use foldhash::HashSet;
use indexmap::IndexMap;
use msl_module::{
    state::{RenderState, SamplerState},
    FragmentInput, FragmentInputGroup, Stage, STAGE_COUNT,
};
use std::{fmt::Write, sync::Arc};

mod state;

/// The name given to the generated shader text, before the first `#line` directive.
pub const GENERATED_FILE: &str = "<generated>";

/// Stage filters are bit masks indexed by [`Stage::index`].
const ALL_STAGES: u32 = (1 << STAGE_COUNT) - 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Flattens uniform blocks into free uniforms, for targets without uniform blocks.
    pub remove_uniform_blocks: bool,
    pub supports_fragment_inputs: bool,
}

/// The source position of a line of generated shader text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineMapping {
    pub file: Arc<str>,
    pub line: u32,
}

/// The function used for a stage of a pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryPoint {
    pub name: String,
    /// Where the stage was assigned in the pipeline block.
    pub location: Location,
}

/// A `pipeline` block.
#[derive(Clone, Debug, PartialEq)]
pub struct Pipeline {
    pub name: String,
    pub location: Location,
    pub entry_points: [Option<EntryPoint>; STAGE_COUNT],
    pub render_state: RenderState,
}

impl Pipeline {
    #[inline]
    pub fn entry_point(&self, stage: Stage) -> Option<&EntryPoint> {
        self.entry_points[stage.index()].as_ref()
    }

    /// Returns the stages with an entry point, in pipeline order.
    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        Stage::ALL
            .iter()
            .copied()
            .filter(|&stage| self.entry_point(stage).is_some())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct FragmentInputMember {
    ty: Vec<Token>,
    name: String,
    location: u32,
    fragment_group: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct FragmentInputBlock {
    type_name: String,
    variable_name: String,
    members: Vec<FragmentInputMember>,
    location: Location,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ElementKind {
    Declaration,
    /// A function definition, with the function's name.
    Function(String),
    /// Index into the fragment input blocks.
    FragmentInputs(usize),
}

/// A top-level declaration.
#[derive(Clone, Debug)]
struct Element {
    stages: u32,
    kind: ElementKind,
    tokens: Vec<Token>,
}

#[derive(Debug, Default)]
pub struct Parser {
    options: ParseOptions,
    elements: Vec<Element>,
    pipelines: IndexMap<String, Pipeline>,
    sampler_states: IndexMap<String, (SamplerState, Location)>,
    fragment_inputs: Vec<FragmentInputBlock>,
    /// `#extension` and `#pragma` lines, emitted at the top of every stage.
    directives: Vec<String>,
    /// Pipelines that were declared but can't be compiled.
    failed_pipelines: HashSet<String>,
    /// Errors limited to one pipeline.
    pipeline_errors: Vec<CompileError>,
    /// Whether everything outside of the pipeline blocks was parsed without errors.
    complete: bool,
}

impl Parser {
    #[inline]
    pub fn new() -> Self {
        Parser::default()
    }

    /// Parses preprocessed tokens.
    ///
    /// Parsing continues past errors in pipeline and sampler-state blocks so that all of them
    /// are reported. The returned error refers to the first one.
    ///
    /// An error inside a pipeline block, or a missing entry point, only affects that pipeline.
    /// If [`is_complete`](Self::is_complete) returns `true` after an error, the pipelines
    /// returned by [`valid_pipelines`](Self::valid_pipelines) can still be compiled.
    pub fn parse(
        &mut self,
        output: &mut Output,
        tokens: &[Token],
        options: &ParseOptions,
    ) -> Result<(), CompileError> {
        self.options = *options;
        self.complete = false;

        let mut cursor = Cursor::new(tokens);
        let mut first_error = None;

        while let Some(token) = cursor.peek() {
            if token.kind == TokenKind::Directive {
                self.directive(token);
                cursor.pos += 1;
                continue;
            }

            let stages = self.stage_filter(output, &mut cursor)?;

            let Some(token) = cursor.peek() else {
                return Err(output.error(&cursor.end_location(), "expected a declaration"));
            };

            let result = if token.is("pipeline") && cursor.is_block_start() {
                self.parse_pipeline(output, &mut cursor)
            } else if token.is("sampler_state") && cursor.is_block_start() {
                self.parse_sampler_state(output, &mut cursor)
            } else if token.is("fragment_inputs") && cursor.is_block_start() {
                self.parse_fragment_inputs(output, &mut cursor, stages)
            } else {
                let element = self.element(output, &mut cursor, stages)?;
                self.elements.push(element);

                Ok(())
            };

            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }

        self.check_entry_points(output);
        self.complete = first_error.is_none();

        let first_error = first_error
            .into_iter()
            .chain(self.pipeline_errors.iter().copied())
            .min_by_key(|err| err.message);

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Whether the last call to [`parse`](Self::parse) only failed, if at all, because of
    /// errors limited to individual pipelines.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// The parsed pipelines, in declaration order.
    #[inline]
    pub fn pipelines(&self) -> impl ExactSizeIterator<Item = &Pipeline> {
        self.pipelines.values()
    }

    /// The pipelines without errors, in declaration order.
    pub fn valid_pipelines(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines
            .values()
            .filter(|pipeline| !self.failed_pipelines.contains(&pipeline.name))
    }

    #[inline]
    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.get(name)
    }

    /// Looks up a `sampler_state` by name.
    #[inline]
    pub fn sampler_state(&self, name: &str) -> Option<&SamplerState> {
        self.sampler_states.get(name).map(|(state, _)| state)
    }

    /// Returns the fragment-input groups visible to the fragment stage of a pipeline.
    pub fn fragment_input_groups(&self, pipeline: &Pipeline) -> Vec<FragmentInputGroup> {
        if pipeline.entry_point(Stage::Fragment).is_none() {
            return Vec::new();
        }

        self.elements
            .iter()
            .filter(|element| element.stages & stage_bit(Stage::Fragment) != 0)
            .filter_map(|element| match element.kind {
                ElementKind::FragmentInputs(index) => self.fragment_inputs.get(index),
                _ => None,
            })
            .map(|block| FragmentInputGroup {
                type_name: block.type_name.clone(),
                variable_name: block.variable_name.clone(),
                inputs: block
                    .members
                    .iter()
                    .map(|member| FragmentInput {
                        name: member.name.clone(),
                        location: member.location,
                        fragment_group: member.fragment_group,
                    })
                    .collect(),
            })
            .collect()
    }

    fn directive(&mut self, token: &Token) {
        // The version is always emitted by `create_shader_string`.
        if token.text.starts_with("#version") {
            return;
        }

        if !self.directives.contains(&token.text) {
            self.directives.push(token.text.clone());
        }
    }

    /// Parses an optional `[[stage, ...]]` prefix.
    fn stage_filter(
        &self,
        output: &mut Output,
        cursor: &mut Cursor<'_>,
    ) -> Result<u32, CompileError> {
        if !(cursor.peek().is_some_and(|token| token.is("["))
            && cursor.peek_at(1).is_some_and(|token| token.is("[")))
        {
            return Ok(ALL_STAGES);
        }

        cursor.pos += 2;
        let mut stages = 0;

        loop {
            let token = cursor.expect_identifier(output)?;
            let Some(stage) = Stage::from_name(&token.text) else {
                return Err(output.error(
                    &token.location(),
                    format!("unknown stage '{}'", token.text),
                ));
            };
            stages |= stage_bit(stage);

            if !cursor.accept(",") {
                break;
            }
        }

        cursor.expect(output, "]")?;
        cursor.expect(output, "]")?;

        Ok(stages)
    }

    /// Collects one GLSL declaration or function definition.
    fn element(
        &mut self,
        output: &mut Output,
        cursor: &mut Cursor<'_>,
        stages: u32,
    ) -> Result<Element, CompileError> {
        let mut tokens = Vec::new();
        let mut depth = 0usize;
        let mut kind = ElementKind::Declaration;

        loop {
            let Some(token) = cursor.next() else {
                return Err(output.error(&cursor.end_location(), "unexpected end of file"));
            };

            if token.kind == TokenKind::Directive {
                self.directive(token);
                continue;
            }

            if token.is("{") && depth == 0 && tokens.last().is_some_and(|last: &Token| last.is(")")) {
                let Some(name) = function_name(&tokens) else {
                    return Err(output.error(&token.location(), "expected a function name"));
                };
                kind = ElementKind::Function(name);

                tokens.push(token.clone());
                let body_end = cursor.skip_block(output)?;
                tokens.extend_from_slice(body_end);

                break;
            }

            if token.is("{") || token.is("(") || token.is("[") {
                depth += 1;
            } else if token.is("}") || token.is(")") || token.is("]") {
                let Some(new_depth) = depth.checked_sub(1) else {
                    return Err(output.error(
                        &token.location(),
                        format!("unexpected '{}'", token.text),
                    ));
                };
                depth = new_depth;
            }

            tokens.push(token.clone());

            if token.is(";") && depth == 0 {
                break;
            }
        }

        Ok(Element {
            stages,
            kind,
            tokens,
        })
    }

    fn parse_pipeline(
        &mut self,
        output: &mut Output,
        cursor: &mut Cursor<'_>,
    ) -> Result<(), CompileError> {
        cursor.pos += 1;
        let name_token = cursor.expect_identifier(output)?;
        let body = cursor.block(output)?;
        cursor.accept(";");

        let mut pipeline = Pipeline {
            name: name_token.text.clone(),
            location: name_token.location(),
            entry_points: Default::default(),
            render_state: RenderState::default(),
        };

        let mut first_error = parse_pipeline_body(output, &mut pipeline, body).err();

        if let Err(err) = check_stage_combination(output, &pipeline) {
            first_error.get_or_insert(err);
        }

        if let Some(previous) = self.pipelines.get(&pipeline.name) {
            let err = output.error(
                &pipeline.location,
                format!("pipeline '{}' has already been declared", pipeline.name),
            );
            output.note(&previous.location, "see previous declaration");
            self.pipeline_errors.push(first_error.unwrap_or(err));

            return Ok(());
        }

        if let Some(err) = first_error {
            self.failed_pipelines.insert(pipeline.name.clone());
            self.pipeline_errors.push(err);
        }

        log::trace!("parsed pipeline '{}'", pipeline.name);
        self.pipelines.insert(pipeline.name.clone(), pipeline);

        Ok(())
    }

    fn parse_sampler_state(
        &mut self,
        output: &mut Output,
        cursor: &mut Cursor<'_>,
    ) -> Result<(), CompileError> {
        cursor.pos += 1;
        let name_token = cursor.expect_identifier(output)?;
        let body = cursor.block(output)?;
        cursor.accept(";");

        let mut state = SamplerState::default();
        let mut first_error = None;

        let mut body_cursor = Cursor::new(body);
        while body_cursor.peek().is_some() {
            let assignment = Assignment::parse(output, &mut body_cursor)?;

            if assignment.index.is_some() {
                first_error.get_or_insert(output.error(
                    &assignment.name.location(),
                    format!(
                        "sampler state '{}' doesn't take an index",
                        assignment.name.text,
                    ),
                ));
                continue;
            }

            match set_sampler_state(&mut state, &assignment.name.text, &assignment.value) {
                Ok(()) => {}
                Err(StateError::UnknownField) => {
                    first_error.get_or_insert(output.error(
                        &assignment.name.location(),
                        format!("unknown sampler state '{}'", assignment.name.text),
                    ));
                }
                Err(_) => {
                    first_error.get_or_insert(output.error(
                        &assignment.value_location,
                        format!(
                            "invalid value '{}' for sampler state '{}'",
                            assignment.value, assignment.name.text,
                        ),
                    ));
                }
            }
        }

        let location = name_token.location();

        if let Some((_, previous)) = self.sampler_states.get(&name_token.text) {
            let err = output.error(
                &location,
                format!("sampler state '{}' has already been declared", name_token.text),
            );
            output.note(previous, "see previous declaration");

            return Err(first_error.unwrap_or(err));
        }

        self.sampler_states
            .insert(name_token.text.clone(), (state, location));

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn parse_fragment_inputs(
        &mut self,
        output: &mut Output,
        cursor: &mut Cursor<'_>,
        stages: u32,
    ) -> Result<(), CompileError> {
        let keyword = cursor.next().map(Token::location).unwrap_or_default();
        let type_token = cursor.expect_identifier(output)?;
        let body = cursor.block(output)?;
        let variable_token = cursor.expect_identifier(output)?;
        cursor.expect(output, ";")?;

        if !self.options.supports_fragment_inputs {
            return Err(output.error(&keyword, "fragment inputs aren't supported by the target"));
        }

        let mut members = Vec::new();
        let mut body_cursor = Cursor::new(body);

        while body_cursor.peek().is_some() {
            members.push(fragment_input_member(output, &mut body_cursor)?);
        }

        if members.is_empty() {
            return Err(output.error(&type_token.location(), "fragment inputs block is empty"));
        }

        self.fragment_inputs.push(FragmentInputBlock {
            type_name: type_token.text.clone(),
            variable_name: variable_token.text.clone(),
            members,
            location: type_token.location(),
        });
        self.elements.push(Element {
            stages: stages & stage_bit(Stage::Fragment),
            kind: ElementKind::FragmentInputs(self.fragment_inputs.len() - 1),
            tokens: Vec::new(),
        });

        Ok(())
    }

    /// Fails the pipelines whose entry points aren't defined for their stage.
    fn check_entry_points(&mut self, output: &mut Output) {
        let mut failed = Vec::new();

        for pipeline in self.pipelines.values() {
            for stage in pipeline.stages() {
                let Some(entry_point) = pipeline.entry_point(stage) else {
                    continue;
                };

                let found = self.elements.iter().any(|element| {
                    element.stages & stage_bit(stage) != 0
                        && matches!(&element.kind, ElementKind::Function(name) if *name == entry_point.name)
                });

                if !found {
                    let err = output.error(
                        &entry_point.location,
                        format!(
                            "entry point '{}' for stage {} not found",
                            entry_point.name,
                            stage.name(),
                        ),
                    );
                    failed.push((pipeline.name.clone(), err));
                }
            }
        }

        for (name, err) in failed {
            self.failed_pipelines.insert(name);
            self.pipeline_errors.push(err);
        }
    }

    /// Assembles the GLSL for one stage of a pipeline.
    ///
    /// `line_mappings` receives the source position of every line of the returned text.
    pub fn create_shader_string(
        &self,
        line_mappings: &mut Vec<LineMapping>,
        pipeline: &Pipeline,
        stage: Stage,
        early_fragment_tests: bool,
    ) -> String {
        line_mappings.clear();

        let header = LineMapping {
            file: pipeline.location.file.clone(),
            line: pipeline.location.line,
        };
        let mut writer = ShaderWriter {
            text: String::new(),
            line_mappings,
            position: None,
        };

        writer.line("#version 450", &header);
        writer.line(
            "#extension GL_GOOGLE_cpp_style_line_directive : enable",
            &header,
        );

        for directive in &self.directives {
            writer.line(directive, &header);
        }

        if stage == Stage::Fragment && early_fragment_tests {
            writer.line("layout(early_fragment_tests) in;", &header);
        }

        for element in &self.elements {
            if element.stages & stage_bit(stage) == 0 {
                continue;
            }

            match element.kind {
                ElementKind::FragmentInputs(index) => {
                    if let Some(block) = self.fragment_inputs.get(index) {
                        write_fragment_inputs(&mut writer, block);
                    }
                }
                _ if self.options.remove_uniform_blocks => {
                    writer.tokens(&remove_uniform_blocks(&element.tokens));
                }
                _ => writer.tokens(&element.tokens),
            }
        }

        if let Some(entry_point) = pipeline.entry_point(stage) {
            let mapping = LineMapping {
                file: entry_point.location.file.clone(),
                line: entry_point.location.line,
            };

            writer.line_directive(&mapping);
            writer.line("void main()", &mapping);
            writer.line("{", &mapping);
            writer.line(&format!("\t{}();", entry_point.name), &mapping);
            writer.line("}", &mapping);
        }

        writer.text
    }
}

#[inline]
fn stage_bit(stage: Stage) -> u32 {
    1 << stage.index()
}

/// Returns the name of the function declared by the tokens before its body.
fn function_name(tokens: &[Token]) -> Option<String> {
    tokens
        .windows(2)
        .find(|pair| pair[0].is_identifier() && pair[1].is("("))
        .map(|pair| pair[0].text.clone())
}

/// `name = value;` or `name[index] = value;` in a pipeline or sampler-state block.
struct Assignment<'a> {
    name: &'a Token,
    index: Option<(u32, Location)>,
    value: String,
    value_location: Location,
}

impl<'a> Assignment<'a> {
    fn parse(output: &mut Output, cursor: &mut Cursor<'a>) -> Result<Self, CompileError> {
        let name = cursor.expect_identifier(output)?;

        let index = if cursor.accept("[") {
            let token = cursor.next_or_error(output)?;
            let index = crate::preprocess::parse_integer(&token.text)
                .filter(|_| token.kind == TokenKind::Number)
                .and_then(|index| u32::try_from(index).ok())
                .ok_or_else(|| {
                    output.error(
                        &token.location(),
                        format!("invalid index '{}'", token.text),
                    )
                })?;
            cursor.expect(output, "]")?;

            Some((index, token.location()))
        } else {
            None
        };

        cursor.expect(output, "=")?;

        let value_location = cursor
            .peek()
            .map_or_else(|| cursor.end_location(), Token::location);
        let mut value = String::new();

        loop {
            let token = cursor.next_or_error(output)?;

            if token.is(";") {
                break;
            }

            value.push_str(&token.text);
        }

        if value.is_empty() {
            return Err(output.error(
                &value_location,
                format!("missing value for '{}'", name.text),
            ));
        }

        Ok(Assignment {
            name,
            index,
            value,
            value_location,
        })
    }
}

/// Parses the assignments of a pipeline block. Errors in assignments are all reported, and
/// the first one is returned.
fn parse_pipeline_body(
    output: &mut Output,
    pipeline: &mut Pipeline,
    body: &[Token],
) -> Result<(), CompileError> {
    let mut first_error = None;

    let mut body_cursor = Cursor::new(body);
    while body_cursor.peek().is_some() {
        if body_cursor.peek().is_some_and(|token| token.is("state"))
            && body_cursor.peek_at(1).is_some_and(|token| token.is("{"))
        {
            body_cursor.pos += 1;
            let state_body = body_cursor.block(output)?;
            body_cursor.accept(";");

            let mut state_cursor = Cursor::new(state_body);
            while state_cursor.peek().is_some() {
                let assignment = Assignment::parse(output, &mut state_cursor)?;
                if let Err(err) = pipeline_render_state(output, pipeline, &assignment) {
                    first_error.get_or_insert(err);
                }
            }

            continue;
        }

        let assignment = Assignment::parse(output, &mut body_cursor)?;

        let result = match Stage::from_name(&assignment.name.text) {
            Some(stage) => pipeline_stage(output, pipeline, stage, &assignment),
            None => pipeline_render_state(output, pipeline, &assignment),
        };

        if let Err(err) = result {
            first_error.get_or_insert(err);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn pipeline_stage(
    output: &mut Output,
    pipeline: &mut Pipeline,
    stage: Stage,
    assignment: &Assignment<'_>,
) -> Result<(), CompileError> {
    let location = assignment.name.location();

    if assignment.index.is_some() {
        return Err(output.error(
            &location,
            format!("stage {} doesn't take an index", stage.name()),
        ));
    }

    let is_identifier = assignment
        .value
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && assignment
            .value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !is_identifier {
        return Err(output.error(
            &assignment.value_location,
            format!("invalid entry point '{}'", assignment.value),
        ));
    }

    if pipeline.entry_points[stage.index()].is_some() {
        return Err(output.error(
            &location,
            format!("stage {} is already set for pipeline '{}'", stage.name(), pipeline.name),
        ));
    }

    pipeline.entry_points[stage.index()] = Some(EntryPoint {
        name: assignment.value.clone(),
        location,
    });

    Ok(())
}

fn pipeline_render_state(
    output: &mut Output,
    pipeline: &mut Pipeline,
    assignment: &Assignment<'_>,
) -> Result<(), CompileError> {
    let name = &assignment.name.text;
    let index = assignment.index.as_ref().map(|(index, _)| *index);

    match set_render_state(&mut pipeline.render_state, name, index, &assignment.value) {
        Ok(()) => Ok(()),
        Err(StateError::UnknownField) => {
            output.warning(
                &assignment.name.location(),
                format!("unknown render state '{}'", name),
            );

            Ok(())
        }
        Err(StateError::InvalidValue) => Err(output.error(
            &assignment.value_location,
            format!("invalid value '{}' for render state '{}'", assignment.value, name),
        )),
        Err(StateError::InvalidIndex) => {
            let location = assignment
                .index
                .as_ref()
                .map_or_else(|| assignment.name.location(), |(_, location)| location.clone());

            Err(output.error(
                &location,
                format!("invalid attachment index for render state '{}'", name),
            ))
        }
    }
}

fn check_stage_combination(output: &mut Output, pipeline: &Pipeline) -> Result<(), CompileError> {
    let mut stages = pipeline.stages();

    match (stages.next(), stages.next()) {
        (None, _) => Err(output.error(
            &pipeline.location,
            format!("pipeline '{}' doesn't declare any stages", pipeline.name),
        )),
        (Some(_), Some(_)) if pipeline.entry_point(Stage::Compute).is_some() => Err(output.error(
            &pipeline.location,
            format!(
                "pipeline '{}' can't combine the compute stage with other stages",
                pipeline.name,
            ),
        )),
        _ => Ok(()),
    }
}

/// `layout(location = N, fragment_group = G) type name;`
fn fragment_input_member(
    output: &mut Output,
    cursor: &mut Cursor<'_>,
) -> Result<FragmentInputMember, CompileError> {
    let layout = cursor.expect_identifier(output)?;
    if layout.text != "layout" {
        return Err(output.error(
            &layout.location(),
            "fragment inputs require a layout with a location",
        ));
    }

    cursor.expect(output, "(")?;

    let mut location = None;
    let mut fragment_group = 0;

    loop {
        let qualifier = cursor.expect_identifier(output)?;
        cursor.expect(output, "=")?;
        let value_token = cursor.next_or_error(output)?;
        let value = crate::preprocess::parse_integer(&value_token.text)
            .filter(|_| value_token.kind == TokenKind::Number)
            .and_then(|value| u32::try_from(value).ok())
            .ok_or_else(|| {
                output.error(
                    &value_token.location(),
                    format!("invalid value '{}' for '{}'", value_token.text, qualifier.text),
                )
            })?;

        match qualifier.text.as_str() {
            "location" => location = Some(value),
            "fragment_group" => fragment_group = value,
            _ => {
                return Err(output.error(
                    &qualifier.location(),
                    format!("unknown fragment input qualifier '{}'", qualifier.text),
                ));
            }
        }

        if !cursor.accept(",") {
            break;
        }
    }

    cursor.expect(output, ")")?;

    let mut declaration = Vec::new();
    loop {
        let token = cursor.next_or_error(output)?;
        if token.is(";") {
            break;
        }

        declaration.push(token.clone());
    }

    let Some((name, ty)) = declaration
        .split_last()
        .filter(|(name, ty)| name.is_identifier() && !ty.is_empty())
    else {
        return Err(output.error(&layout.location(), "invalid fragment input declaration"));
    };

    let Some(location) = location else {
        return Err(output.error(
            &name.location(),
            format!("fragment input '{}' is missing a location", name.text),
        ));
    };

    Ok(FragmentInputMember {
        ty: ty.to_vec(),
        name: name.text.clone(),
        location,
        fragment_group,
    })
}

/// Writes a fragment-input block as a uniform block. The backend turns it into framebuffer reads.
fn write_fragment_inputs(writer: &mut ShaderWriter<'_>, block: &FragmentInputBlock) {
    let mapping = LineMapping {
        file: block.location.file.clone(),
        line: block.location.line,
    };

    writer.line_directive(&mapping);
    writer.line(&format!("uniform {}", block.type_name), &mapping);
    writer.line("{", &mapping);

    for member in &block.members {
        let ty = crate::preprocess::join_tokens(&member.ty);
        writer.line(&format!("\t{} {};", ty, member.name), &mapping);
    }

    writer.line(&format!("}} {};", block.variable_name), &mapping);
}

/// Turns `uniform Name { decls } instance;` into free `uniform decl;` declarations, and drops
/// `uniforms.` prefixes from member accesses.
fn remove_uniform_blocks(tokens: &[Token]) -> Vec<Token> {
    let uniform_index = tokens.iter().position(|token| token.is("uniform"));
    let block_start = uniform_index.filter(|&index| {
        tokens.get(index + 1).is_some_and(Token::is_identifier)
            && tokens.get(index + 2).is_some_and(|token| token.is("{"))
    });

    let mut result = Vec::with_capacity(tokens.len());

    if let Some(index) = block_start {
        let uniform = &tokens[index];
        let body_end = tokens
            .iter()
            .rposition(|token| token.is("}"))
            .unwrap_or(tokens.len());
        let body = tokens.get(index + 3..body_end).unwrap_or_default();

        let mut declaration_start = true;
        for token in body {
            if declaration_start {
                result.push(Token {
                    text: "uniform".to_owned(),
                    line_start: false,
                    space_before: true,
                    ..token.clone()
                });
                declaration_start = false;
            }

            let mut token = token.clone();
            token.space_before |= result.last().is_some_and(|last: &Token| last.text == "uniform");
            declaration_start = token.is(";");
            result.push(token);
        }

        if result.is_empty() {
            // An empty block declares nothing.
            return result;
        }

        result[0].space_before = uniform.space_before;

        return strip_instance_prefix(result);
    }

    strip_instance_prefix(tokens.to_vec())
}

fn strip_instance_prefix(tokens: Vec<Token>) -> Vec<Token> {
    let mut result: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();

    while let Some(token) = iter.next() {
        let previous_is_member_access = result.last().is_some_and(|last| last.is("."));

        if token.is("uniforms")
            && !previous_is_member_access
            && iter.peek().is_some_and(|next| next.is("."))
        {
            let space_before = token.space_before;
            iter.next();

            if let Some(mut member) = iter.next() {
                member.space_before = space_before;
                result.push(member);
            }

            continue;
        }

        result.push(token);
    }

    result
}

/// Accumulates shader text and the source position of each line.
struct ShaderWriter<'a> {
    text: String,
    line_mappings: &'a mut Vec<LineMapping>,
    /// The source position of the current line, as known to the GLSL compiler.
    position: Option<(Arc<str>, u32)>,
}

impl ShaderWriter<'_> {
    /// Writes a generated line.
    fn line(&mut self, text: &str, mapping: &LineMapping) {
        self.text.push_str(text);
        self.text.push('\n');
        self.line_mappings.push(mapping.clone());

        if let Some((_, line)) = &mut self.position {
            *line += 1;
        }
    }

    /// Makes the GLSL compiler report the following line as `mapping`.
    fn line_directive(&mut self, mapping: &LineMapping) {
        let _ = writeln!(self.text, "#line {} \"{}\"", mapping.line, mapping.file);
        self.line_mappings.push(mapping.clone());
        self.position = Some((mapping.file.clone(), mapping.line));
    }

    /// Writes source tokens, keeping their line structure.
    fn tokens(&mut self, tokens: &[Token]) {
        let mut previous: Option<&Token> = None;

        for token in tokens {
            let current_line = match &self.position {
                Some((file, line)) if **file == *token.file => Some(*line),
                _ => None,
            };

            match current_line {
                Some(line) if token.line == line => {}
                Some(line) if token.line > line && token.line - line <= 8 => {
                    for _ in line..token.line {
                        self.end_line();
                    }
                    previous = None;
                }
                _ => {
                    if previous.is_some() {
                        self.end_line();
                    }

                    self.line_directive(&LineMapping {
                        file: token.file.clone(),
                        line: token.line,
                    });
                    previous = None;
                }
            }

            match previous {
                Some(previous) => {
                    if token.space_before || needs_space(previous, token) {
                        self.text.push(' ');
                    }
                }
                None => {
                    let indent = token.column.saturating_sub(1).min(16) as usize;
                    self.text.extend(std::iter::repeat(' ').take(indent));
                }
            }

            self.text.push_str(&token.text);
            previous = Some(token);
        }

        if previous.is_some() {
            self.end_line();
        }
    }

    /// Terminates the current source line.
    fn end_line(&mut self) {
        self.text.push('\n');

        if let Some((file, line)) = &mut self.position {
            self.line_mappings.push(LineMapping {
                file: file.clone(),
                line: *line,
            });
            *line += 1;
        }
    }
}

/// Walks a token slice.
struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Cursor { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;

        Some(token)
    }

    fn end_location(&self) -> Location {
        self.tokens.last().map(Token::location).unwrap_or_default()
    }

    fn next_or_error(&mut self, output: &mut Output) -> Result<&'a Token, CompileError> {
        let location = self.end_location();
        self.next()
            .ok_or_else(|| output.error(&location, "unexpected end of file"))
    }

    fn accept(&mut self, text: &str) -> bool {
        if self.peek().is_some_and(|token| token.is(text)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, output: &mut Output, text: &str) -> Result<&'a Token, CompileError> {
        let token = self.next_or_error(output)?;

        if token.is(text) {
            Ok(token)
        } else {
            Err(output.error(
                &token.location(),
                format!("expected '{}' but found '{}'", text, token.text),
            ))
        }
    }

    fn expect_identifier(&mut self, output: &mut Output) -> Result<&'a Token, CompileError> {
        let token = self.next_or_error(output)?;

        if token.is_identifier() {
            Ok(token)
        } else {
            Err(output.error(
                &token.location(),
                format!("expected an identifier but found '{}'", token.text),
            ))
        }
    }

    /// Returns whether the tokens at the cursor are `keyword name {`.
    fn is_block_start(&self) -> bool {
        self.peek_at(1).is_some_and(Token::is_identifier)
            && self.peek_at(2).is_some_and(|token| token.is("{"))
    }

    /// Skips a `{ ... }` block whose opening brace was already consumed. Returns the tokens up
    /// to and including the closing brace.
    fn skip_block(&mut self, output: &mut Output) -> Result<&'a [Token], CompileError> {
        let start = self.pos;
        let mut depth = 1usize;

        while depth > 0 {
            let token = self.next_or_error(output)?;

            if token.is("{") {
                depth += 1;
            } else if token.is("}") {
                depth -= 1;
            }
        }

        Ok(&self.tokens[start..self.pos])
    }

    /// Parses `{ ... }` and returns the tokens between the braces.
    fn block(&mut self, output: &mut Output) -> Result<&'a [Token], CompileError> {
        self.expect(output, "{")?;
        let block = self.skip_block(output)?;

        Ok(&block[..block.len() - 1])
    }
}
