// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Compilation of generated stage text to SPIR-V with shaderc.

use crate::{
    diagnostic::{CompileError, Level, Location, Output},
    limits::ResourceLimits,
    parse::{LineMapping, GENERATED_FILE},
    spirv::{Spirv, DEBUG_OPCODES},
};
use msl_module::Stage;
use parking_lot::Mutex;
use shaderc::{EnvVersion, OptimizationLevel, ShaderKind, SpirvVersion, TargetEnv};
use std::{
    error::Error,
    fmt::{Display, Error as FmtError, Formatter},
};

/// The number of live compilers in the process.
static COMPILER_COUNT: Mutex<usize> = Mutex::new(0);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Optimization {
    #[default]
    None,
    /// Removes dead code, optimizing for size.
    DeadCodeElimination,
    /// Optimizes for performance.
    Full,
}

/// How a stage is compiled.
#[derive(Clone, Copy, Debug, Default)]
pub struct StageOptions<'a> {
    pub optimization: Optimization,
    pub debug_info: bool,
    /// Strips the instructions that only carry debug information.
    pub remap_variables: bool,
    /// Compiles for OpenGL instead of Vulkan, which allows uniforms outside of blocks.
    pub opengl: bool,
    /// `major * 100 + minor * 10`, such as 130 for SPIR-V 1.3.
    pub spirv_version: u32,
    pub limits: Option<&'a ResourceLimits>,
}

/// Error when the GLSL compiler can't be created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompilerInitError;

impl Error for CompilerInitError {}

impl Display for CompilerInitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str("failed to create the GLSL compiler")
    }
}

/// The GLSL to SPIR-V compiler.
pub struct Compiler {
    inner: shaderc::Compiler,
}

impl Compiler {
    pub fn new() -> Result<Compiler, CompilerInitError> {
        let inner = shaderc::Compiler::new().ok_or(CompilerInitError)?;

        let mut count = COMPILER_COUNT.lock();
        if *count == 0 {
            log::debug!("initializing the GLSL compiler");
        }
        *count += 1;

        Ok(Compiler { inner })
    }

    /// Compiles the text generated for a stage.
    ///
    /// `line_mappings` gives the source position of each line of `text`. Messages of the
    /// compiler are added to `output` at their source positions.
    pub fn compile_stage(
        &mut self,
        output: &mut Output,
        text: &str,
        line_mappings: &[LineMapping],
        stage: Stage,
        options: &StageOptions<'_>,
    ) -> Result<Spirv, CompileError> {
        let mut compile_options = shaderc::CompileOptions::new().ok_or_else(|| {
            output.error(&Location::default(), "failed to initialize the compile options")
        })?;

        if options.opengl {
            compile_options.set_target_env(TargetEnv::OpenGL, EnvVersion::OpenGL4_5 as u32);
        } else {
            compile_options.set_target_env(TargetEnv::Vulkan, EnvVersion::Vulkan1_0 as u32);
        }

        compile_options.set_target_spirv(spirv_version(options.spirv_version));
        compile_options.set_optimization_level(match options.optimization {
            Optimization::None => OptimizationLevel::Zero,
            Optimization::DeadCodeElimination => OptimizationLevel::Size,
            Optimization::Full => OptimizationLevel::Performance,
        });

        if options.debug_info {
            compile_options.set_generate_debug_info();
        }

        compile_options.set_auto_bind_uniforms(true);
        compile_options.set_auto_map_locations(true);

        if let Some(limits) = options.limits {
            limits.apply(&mut compile_options);
        }

        let artifact = match self.inner.compile_into_spirv(
            text,
            shader_kind(stage),
            GENERATED_FILE,
            "main",
            Some(&compile_options),
        ) {
            Ok(artifact) => artifact,
            Err(shaderc::Error::CompilationError(_, messages)) => {
                let first = add_compiler_messages(output, &messages, line_mappings);

                return Err(match first {
                    Some(message) => CompileError { message },
                    None => output.error(
                        &Location::new(GENERATED_FILE, 0, 0),
                        format!("failed to compile the {} stage", stage.name()),
                    ),
                });
            }
            Err(err) => return Err(output.error(&Location::default(), err.to_string())),
        };

        if artifact.get_num_warnings() > 0 {
            add_compiler_messages(output, &artifact.get_warning_messages(), line_mappings);
        }

        let mut spirv = Spirv::from_words(artifact.as_binary().to_vec()).map_err(|err| {
            output.error(
                &Location::default(),
                format!("the compiler produced invalid SPIR-V: {}", err),
            )
        })?;

        if options.remap_variables {
            spirv.strip(DEBUG_OPCODES);
        }

        Ok(spirv)
    }
}

impl Drop for Compiler {
    fn drop(&mut self) {
        let mut count = COMPILER_COUNT.lock();
        *count -= 1;
        if *count == 0 {
            log::debug!("shutting down the GLSL compiler");
        }
    }
}

fn shader_kind(stage: Stage) -> ShaderKind {
    match stage {
        Stage::Vertex => ShaderKind::Vertex,
        Stage::TessellationControl => ShaderKind::TessControl,
        Stage::TessellationEvaluation => ShaderKind::TessEvaluation,
        Stage::Geometry => ShaderKind::Geometry,
        Stage::Fragment => ShaderKind::Fragment,
        Stage::Compute => ShaderKind::Compute,
    }
}

fn spirv_version(version: u32) -> SpirvVersion {
    match version {
        0..=109 => SpirvVersion::V1_0,
        110..=119 => SpirvVersion::V1_1,
        120..=129 => SpirvVersion::V1_2,
        130..=139 => SpirvVersion::V1_3,
        140..=149 => SpirvVersion::V1_4,
        _ => SpirvVersion::V1_5,
    }
}

/// Adds the messages printed by the compiler, and returns the index of the first error.
///
/// Messages look like `file:line: error: text`. Lines of the generated text before the first
/// `#line` directive are mapped back through `line_mappings`. Lines that aren't messages are
/// attached to the message before them.
fn add_compiler_messages(
    output: &mut Output,
    messages: &str,
    line_mappings: &[LineMapping],
) -> Option<usize> {
    let mut first_error = None;
    let mut has_message = false;

    for line in messages.lines().map(str::trim_end) {
        let parsed = [(": error: ", Level::Error), (": warning: ", Level::Warning)]
            .into_iter()
            .find_map(|(separator, level)| {
                line.split_once(separator)
                    .map(|(position, text)| (position, level, text))
            });

        let Some((position, level, text)) = parsed else {
            if has_message && !line.is_empty() && !line.ends_with("generated.") {
                output.add_message(Level::Info, "", 0, 0, true, line.trim_start());
            }
            continue;
        };

        let (mut file, mut line_number) = match position.rsplit_once(':') {
            Some((file, number)) => match number.parse::<u32>() {
                Ok(number) => (file.to_owned(), number),
                Err(_) => (position.to_owned(), 0),
            },
            None => (position.to_owned(), 0),
        };

        if file == GENERATED_FILE {
            if let Some(mapping) = line_number
                .checked_sub(1)
                .and_then(|index| line_mappings.get(index as usize))
            {
                file = mapping.file.to_string();
                line_number = mapping.line;
            }
        }

        let index = output.add_message(level, file, line_number, 0, false, text);
        has_message = true;

        if level == Level::Error {
            first_error.get_or_insert(index);
        }
    }

    first_error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spirv::{op, Instruction};
    use std::sync::Arc;

    fn mappings(count: u32) -> Vec<LineMapping> {
        let file: Arc<str> = Arc::from("test.msl");

        (0..count)
            .map(|line| LineMapping {
                file: file.clone(),
                line: line + 10,
            })
            .collect()
    }

    #[test]
    fn compiler_messages() {
        let mut output = Output::new();
        let first = add_compiler_messages(
            &mut output,
            "<generated>:3: warning: version 450 is unknown\n\
             other.msl:12: error: 'x' : undeclared identifier\n\
             \x20 while parsing the body\n\
             <generated>:2: error: '' : syntax error\n\
             2 errors generated.\n",
            &mappings(5),
        );

        assert_eq!(first, Some(1));
        assert_eq!(output.error_count(), 2);
        assert_eq!(output.warning_count(), 1);

        let messages = output.messages();
        assert_eq!((messages[0].file.as_str(), messages[0].line), ("test.msl", 12));
        assert_eq!((messages[1].file.as_str(), messages[1].line), ("other.msl", 12));
        assert_eq!(messages[1].text, "'x' : undeclared identifier");
        assert!(messages[2].continued);
        assert_eq!(messages[2].text, "while parsing the body");
        assert_eq!((messages[3].file.as_str(), messages[3].line), ("test.msl", 11));
        assert_eq!(messages.len(), 4);
    }

    #[test]
    fn versions() {
        assert_eq!(spirv_version(100) as u32, SpirvVersion::V1_0 as u32);
        assert_eq!(spirv_version(130) as u32, SpirvVersion::V1_3 as u32);
        assert_eq!(spirv_version(200) as u32, SpirvVersion::V1_5 as u32);
    }

    const VERTEX: &str = "\
#version 450
layout(location = 0) in vec4 position;
layout(location = 0) out vec4 color;
void main()
{
    color = position;
    gl_Position = position;
}
";

    #[test]
    fn compile_vertex() {
        let mut compiler = Compiler::new().unwrap();
        let mut output = Output::new();
        let spirv = compiler
            .compile_stage(
                &mut output,
                VERTEX,
                &mappings(8),
                Stage::Vertex,
                &StageOptions {
                    remap_variables: true,
                    spirv_version: 100,
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(spirv.version(), (1, 0));
        assert!(spirv
            .decoded()
            .any(|i| matches!(i, Instruction::EntryPoint { execution_model: 0, .. })));
        assert!(!spirv
            .instructions()
            .any(|i| DEBUG_OPCODES.contains(&i.opcode)));
        assert!(spirv.instructions().any(|i| i.opcode == op::NAME));
    }

    #[test]
    fn compile_errors() {
        let mut compiler = Compiler::new().unwrap();
        let mut output = Output::new();
        let text = "#version 450\nvoid main()\n{\n    undeclared = 1.0;\n}\n";

        let err = compiler
            .compile_stage(
                &mut output,
                text,
                &mappings(5),
                Stage::Fragment,
                &StageOptions::default(),
            )
            .unwrap_err();

        let message = output.message(err.message).unwrap();
        assert_eq!(message.level, Level::Error);
        assert_eq!(message.file, "test.msl");
        assert_eq!(message.line, 13);
        assert!(message.text.contains("undeclared"));
    }
}
