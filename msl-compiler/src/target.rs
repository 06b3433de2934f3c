// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Compiling sources for a backend.

use crate::{
    backend::{Backend, CrossCompileRequest},
    compile::{Compiler, CompilerInitError, Optimization, StageOptions},
    diagnostic::{CompileError, Location, Output},
    exec::ExternalCommand,
    feature::{Feature, FeatureState, FeatureStates},
    limits::ResourceLimits,
    link::{link_pipeline, relink_stage, BindingPolicy, CompiledStage, LinkedPipeline},
    parse::{LineMapping, ParseOptions, Parser, Pipeline},
    preprocess::{preprocess, PreprocessOptions},
    result::CompiledResult,
    spirv::{Spirv, NAME_OPCODES},
};
use msl_module::{state::Bool, Stage};
use std::{fs, path::Path};

/// Options of a [`Target`], shared by every backend.
#[derive(Clone, Debug, Default)]
pub struct TargetOptions {
    pub optimization: Optimization,

    /// Strips the instructions that only carry debug information.
    pub remap_variables: bool,

    /// Also strips the names of variables and types, unless the backend needs them.
    pub strip_debug: bool,

    /// Generates debug information.
    pub debug: bool,

    pub include_paths: Vec<std::path::PathBuf>,

    /// Macros defined for every source, as `(name, value)`.
    pub defines: Vec<(String, String)>,

    /// Lines processed before every source.
    pub pre_header_lines: Vec<String>,

    pub resource_limits: Option<ResourceLimits>,

    /// A command run on the SPIR-V of every stage after linking. See [`ExternalCommand`].
    pub spirv_command: Option<String>,

    pub binding_policy: BindingPolicy,

    pub features: FeatureStates,
}

/// Compiles sources into a [`CompiledResult`] for one backend.
///
/// ```no_run
/// use msl_compiler::{backend::SpirvBackend, Output, Target, TargetOptions};
///
/// let mut target = Target::new(SpirvBackend::default(), TargetOptions::default()).unwrap();
/// let mut result = target.create_result();
/// let mut output = Output::new();
///
/// if target.compile_file(&mut output, &mut result, "shaders.msl").is_ok()
///     && target.finish(&mut output, &mut result).is_ok()
/// {
///     result.save("shaders.mslb").unwrap();
/// }
///
/// print!("{}", output);
/// ```
pub struct Target {
    backend: Box<dyn Backend>,
    options: TargetOptions,
    compiler: Compiler,
}

impl Target {
    pub fn new(
        backend: impl Backend + 'static,
        options: TargetOptions,
    ) -> Result<Target, CompilerInitError> {
        Ok(Target {
            backend: Box::new(backend),
            options,
            compiler: Compiler::new()?,
        })
    }

    #[inline]
    pub fn backend(&self) -> &dyn Backend {
        &*self.backend
    }

    #[inline]
    pub fn options(&self) -> &TargetOptions {
        &self.options
    }

    #[inline]
    pub fn options_mut(&mut self) -> &mut TargetOptions {
        &mut self.options
    }

    /// Returns whether `feature` is enabled, either by an override or by the backend.
    pub fn feature_enabled(&self, feature: Feature) -> bool {
        self.options
            .features
            .is_enabled(feature, self.backend.feature_supported(feature))
    }

    #[inline]
    pub fn set_feature(&mut self, feature: Feature, state: FeatureState) {
        self.options.features.set(feature, state);
    }

    /// Creates an empty result for this target.
    pub fn create_result(&self) -> CompiledResult {
        let adjustable_bindings = self.options.binding_policy == BindingPolicy::Adjustable
            && self.backend.supports_adjustable_bindings();

        CompiledResult::new(
            self.backend.id(),
            self.backend.version(),
            adjustable_bindings,
        )
    }

    /// Returns the `HAS_*` macros, the backend's macros and the user's macros.
    pub fn defines(&self) -> Vec<(String, String)> {
        let mut defines: Vec<(String, String)> = Feature::ALL
            .iter()
            .map(|&feature| {
                let value = if self.feature_enabled(feature) { "1" } else { "0" };
                (feature.define().to_owned(), value.to_owned())
            })
            .collect();

        defines.extend(self.backend.extra_defines());
        defines.extend(self.options.defines.iter().cloned());

        defines
    }

    /// Compiles every pipeline of `source` and adds them to `result`.
    ///
    /// Pipelines are compiled in name order. A pipeline that fails to parse or compile isn't
    /// added, and the others are still compiled. The returned error refers to the first failure.
    pub fn compile(
        &mut self,
        output: &mut Output,
        result: &mut CompiledResult,
        source: &str,
        file_name: &str,
    ) -> Result<(), CompileError> {
        let uniform_blocks = self.feature_enabled(Feature::UniformBlocks);
        let preprocess_options = PreprocessOptions {
            pre_header_lines: self.options.pre_header_lines.clone(),
            defines: self.defines(),
            include_paths: self.options.include_paths.clone(),
            uniform_blocks_supported: uniform_blocks,
        };

        let tokens = preprocess(output, source, file_name, &preprocess_options)?;

        let mut first_error = None;

        let mut parser = Parser::new();
        let parsed = parser.parse(
            output,
            &tokens,
            &ParseOptions {
                remove_uniform_blocks: !uniform_blocks,
                supports_fragment_inputs: self.feature_enabled(Feature::FragmentInputs),
            },
        );

        if let Err(err) = parsed {
            // The pipelines without errors can still be compiled.
            if !parser.is_complete() {
                return Err(err);
            }

            first_error = Some(err);
        }

        let mut policy = self.backend.will_compile(self.options.binding_policy);
        if policy == BindingPolicy::Adjustable && !self.backend.supports_adjustable_bindings() {
            policy = BindingPolicy::Dummy;
        }

        let mut pipelines: Vec<&Pipeline> = parser.valid_pipelines().collect();
        pipelines.sort_by(|a, b| a.name.cmp(&b.name));

        for pipeline in pipelines {
            log::debug!("compiling pipeline '{}'", pipeline.name);

            if let Err(err) = self.compile_pipeline(output, result, &parser, pipeline, policy) {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Reads and compiles a source file.
    pub fn compile_file(
        &mut self,
        output: &mut Output,
        result: &mut CompiledResult,
        path: impl AsRef<Path>,
    ) -> Result<(), CompileError> {
        let path = path.as_ref();
        let file_name = path.to_string_lossy();

        let source = fs::read_to_string(path).map_err(|err| {
            output.error(
                &Location::new(&*file_name, 0, 0),
                format!("couldn't read '{}': {}", file_name, err),
            )
        })?;

        self.compile(output, result, &source, &file_name)
    }

    /// Stores the backend's shared data in `result`, once every source was compiled.
    pub fn finish(
        &mut self,
        output: &mut Output,
        result: &mut CompiledResult,
    ) -> Result<(), CompileError> {
        let data = self.backend.shared_data(output)?;
        result.set_shared_data(data);

        Ok(())
    }

    fn compile_pipeline(
        &mut self,
        output: &mut Output,
        result: &mut CompiledResult,
        parser: &Parser,
        pipeline: &Pipeline,
        policy: BindingPolicy,
    ) -> Result<(), CompileError> {
        result.check_pipeline_name(output, &pipeline.location, &pipeline.name)?;

        for stage in pipeline.stages() {
            let feature = match stage {
                Stage::TessellationControl | Stage::TessellationEvaluation => {
                    Feature::TessellationStages
                }
                Stage::Geometry => Feature::GeometryStage,
                Stage::Compute => Feature::ComputeStage,
                Stage::Vertex | Stage::Fragment => continue,
            };

            if !self.feature_enabled(feature) {
                let location = pipeline
                    .entry_point(stage)
                    .map_or(&pipeline.location, |entry_point| &entry_point.location);

                return Err(output.error(
                    location,
                    format!("the {} stage isn't supported by the target", stage.name()),
                ));
            }
        }

        let early_fragment_tests = pipeline.render_state.early_fragment_tests == Bool::True
            && self.feature_enabled(Feature::EarlyFragmentTests);
        let stage_options = StageOptions {
            optimization: self.options.optimization,
            debug_info: self.options.debug,
            remap_variables: self.options.remap_variables,
            opengl: !self.feature_enabled(Feature::UniformBlocks),
            spirv_version: self.backend.ir_version(),
            limits: self.options.resource_limits.as_ref(),
        };

        let mut line_mappings: Vec<LineMapping> = Vec::new();
        let mut compiled = Vec::new();

        for stage in pipeline.stages() {
            let Some(entry_point) = pipeline.entry_point(stage) else {
                continue;
            };

            let text =
                parser.create_shader_string(&mut line_mappings, pipeline, stage, early_fragment_tests);
            let spirv = self.compiler.compile_stage(
                output,
                &text,
                &line_mappings,
                stage,
                &stage_options,
            )?;

            compiled.push(CompiledStage {
                stage,
                spirv,
                entry_point: entry_point.location.clone(),
            });
        }

        let mut linked = link_pipeline(output, parser, pipeline, compiled, policy)?;

        let strip_names = self.options.strip_debug && !self.backend.needs_reflection_names();

        for stage in &mut linked.stages {
            if strip_names {
                stage.spirv.strip(NAME_OPCODES);
            }

            if let Some(command) = &self.options.spirv_command {
                let processed = ExternalCommand::new(".spv", ".spv").execute(
                    output,
                    &stage.entry_point,
                    command,
                    &stage.spirv.to_bytes(),
                )?;

                stage.spirv = Spirv::from_bytes(&processed).map_err(|err| {
                    output.error(
                        &stage.entry_point,
                        format!("the output of `{}` isn't valid SPIR-V: {}", command, err),
                    )
                })?;

                // Ids may have been renumbered.
                relink_stage(output, &mut linked.data, stage)?;
            }
        }

        let added = self
            .cross_compile_stages(output, &linked)
            .and_then(|shaders| {
                result.add_pipeline(output, &pipeline.location, linked.data, shaders)
            });
        self.backend.finish_pipeline(added.is_ok());

        added
    }

    fn cross_compile_stages(
        &mut self,
        output: &mut Output,
        linked: &LinkedPipeline,
    ) -> Result<Vec<(Stage, Vec<u8>)>, CompileError> {
        let mut shaders = Vec::with_capacity(linked.stages.len());

        for stage in &linked.stages {
            let data = self.backend.cross_compile(
                output,
                &CrossCompileRequest {
                    pipeline: &linked.data,
                    stage: stage.stage,
                    spirv: &stage.spirv,
                    reflection: &stage.reflection,
                    entry_point: &stage.entry_point,
                },
            )?;

            shaders.push((stage.stage, data));
        }

        Ok(shaders)
    }
}
