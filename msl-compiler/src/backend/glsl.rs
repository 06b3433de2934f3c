// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::{
    contains_identifier, naga_module, naga_stage, replace_identifier, Backend,
    CrossCompileRequest,
};
use crate::{
    diagnostic::{CompileError, Output},
    exec::ExternalCommand,
    feature::Feature,
};
use foldhash::{HashMap, HashMapExt};
use msl_module::{Stage, STAGE_COUNT, TARGET_GLSL, TARGET_GLSL_ES};
use naga::back::glsl;

/// A default precision qualifier for OpenGL ES.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Precision {
    /// Keeps the precision chosen by the cross compiler.
    #[default]
    None,
    Low,
    Medium,
    High,
}

impl Precision {
    fn qualifier(self) -> Option<&'static str> {
        match self {
            Precision::None => None,
            Precision::Low => Some("lowp"),
            Precision::Medium => Some("mediump"),
            Precision::High => Some("highp"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlslOptions {
    /// The GLSL version, such as 450 or 300. The cross compiler needs at least 330, or 300 for
    /// OpenGL ES.
    pub version: u32,

    /// Targets OpenGL ES.
    pub es: bool,

    /// Maps the depth range of Vulkan, `[0, 1]`, to the one of OpenGL, `[-1, 1]`, in the vertex
    /// stage.
    pub remap_depth_range: bool,

    /// OpenGL ES only.
    pub default_float_precision: Precision,

    /// OpenGL ES only.
    pub default_int_precision: Precision,

    /// Lines inserted after the `#version` line, such as `#define` directives.
    pub header_lines: Vec<String>,

    /// Extensions enabled with `#extension NAME : require`.
    pub required_extensions: Vec<String>,

    /// Commands that process the text of each stage, indexed by [`Stage::index`]. See
    /// [`ExternalCommand`].
    pub stage_commands: [Option<String>; STAGE_COUNT],
}

impl Default for GlslOptions {
    fn default() -> Self {
        GlslOptions {
            version: 450,
            es: false,
            remap_depth_range: false,
            default_float_precision: Precision::None,
            default_int_precision: Precision::None,
            header_lines: Vec::new(),
            required_extensions: Vec::new(),
            stage_commands: Default::default(),
        }
    }
}

/// Translates stages to GLSL source. Payloads are UTF-8 with a trailing NUL.
#[derive(Clone, Debug)]
pub struct GlslBackend {
    options: GlslOptions,
}

impl GlslBackend {
    #[inline]
    pub fn new(options: GlslOptions) -> Self {
        GlslBackend { options }
    }

    #[inline]
    pub fn options(&self) -> &GlslOptions {
        &self.options
    }

    fn at_least(&self, desktop: u32, es: Option<u32>) -> bool {
        if self.options.es {
            es.is_some_and(|es| self.options.version >= es)
        } else {
            self.options.version >= desktop
        }
    }

    /// Applies the options to the generated text.
    fn process_text(&self, text: &str, stage: Stage) -> String {
        let mut lines = Vec::new();
        let mut version_line = None;

        for line in text.lines() {
            let trimmed = line.trim();

            if self.options.es && is_default_precision(trimmed) {
                if self.options.default_float_precision != Precision::None
                    || self.options.default_int_precision != Precision::None
                {
                    continue;
                }
            }

            lines.push(line.to_owned());

            if version_line.is_none() && trimmed.starts_with("#version") {
                version_line = Some(lines.len());
            }

            if stage == Stage::Vertex
                && self.options.remap_depth_range
                && trimmed.starts_with("gl_Position =")
                && trimmed.ends_with(';')
            {
                let indent = &line[..line.len() - line.trim_start().len()];
                lines.push(format!(
                    "{}gl_Position.z = 2.0 * gl_Position.z - gl_Position.w;",
                    indent,
                ));
            }
        }

        let mut header = Vec::new();

        for extension in &self.options.required_extensions {
            header.push(format!("#extension {} : require", extension));
        }

        if self.options.es {
            let precisions = [
                (self.options.default_float_precision, "float"),
                (self.options.default_int_precision, "int"),
            ];

            for (precision, ty) in precisions {
                if let Some(qualifier) = precision.qualifier() {
                    header.push(format!("precision {} {};", qualifier, ty));
                }
            }
        }

        header.extend(self.options.header_lines.iter().cloned());

        let insert_at = version_line.unwrap_or(0);
        lines.splice(insert_at..insert_at, header);

        let mut result = lines.join("\n");
        result.push('\n');

        result
    }
}

impl Default for GlslBackend {
    #[inline]
    fn default() -> Self {
        GlslBackend::new(GlslOptions::default())
    }
}

impl Backend for GlslBackend {
    fn id(&self) -> u32 {
        if self.options.es {
            TARGET_GLSL_ES
        } else {
            TARGET_GLSL
        }
    }

    fn version(&self) -> u32 {
        self.options.version
    }

    fn feature_supported(&self, feature: Feature) -> bool {
        match feature {
            Feature::Integers
            | Feature::NonSquareMatrices
            | Feature::Texture3D
            | Feature::TextureArray
            | Feature::ShadowSamplers
            | Feature::IntegerTextures
            | Feature::UniformBlocks
            | Feature::Std140
            | Feature::MultipleRenderTargets
            | Feature::Derivatives
            | Feature::TexelFetch
            | Feature::TextureSize => true,
            Feature::Doubles | Feature::QueryLod => self.at_least(400, None),
            Feature::MultisampledTextures => self.at_least(150, Some(310)),
            Feature::Images
            | Feature::BindingPoints
            | Feature::MemoryBarriers
            | Feature::EarlyFragmentTests => self.at_least(420, Some(310)),
            Feature::Buffers | Feature::Std430 | Feature::ComputeStage => {
                self.at_least(430, Some(310))
            }
            Feature::DualSourceBlending | Feature::ClipDistance => self.at_least(330, None),
            Feature::DepthHints => self.at_least(420, None),
            Feature::AdvancedDerivatives
            | Feature::TextureSamples
            | Feature::CullDistance => self.at_least(450, None),
            Feature::InterpolationFunctions => self.at_least(400, Some(320)),
            Feature::TextureGather | Feature::BitFunctions => self.at_least(400, Some(310)),
            Feature::QueryLevels => self.at_least(430, None),
            Feature::PackingFunctions => self.at_least(420, Some(300)),
            // Stages and inputs the cross compiler can't read.
            Feature::DescriptorSets
            | Feature::TessellationStages
            | Feature::GeometryStage
            | Feature::PrimitiveStreams
            | Feature::SubpassInputs
            | Feature::FragmentInputs => false,
        }
    }

    fn extra_defines(&self) -> Vec<(String, String)> {
        let name = if self.options.es {
            "GLSLES_VERSION"
        } else {
            "GLSL_VERSION"
        };

        vec![(name.to_owned(), self.options.version.to_string())]
    }

    fn ir_version(&self) -> u32 {
        100
    }

    fn cross_compile(
        &mut self,
        output: &mut Output,
        request: &CrossCompileRequest<'_>,
    ) -> Result<Vec<u8>, CompileError> {
        let Some(shader_stage) = naga_stage(request.stage) else {
            return Err(output.error(
                request.entry_point,
                format!(
                    "the {} stage isn't supported when targeting GLSL",
                    request.stage.name(),
                ),
            ));
        };

        let (module, info) = naga_module(output, request)?;

        let version = self.options.version as u16;
        let options = glsl::Options {
            version: if self.options.es {
                glsl::Version::Embedded {
                    version,
                    is_webgl: false,
                }
            } else {
                glsl::Version::Desktop(version)
            },
            writer_flags: glsl::WriterFlags::empty(),
            ..Default::default()
        };
        let pipeline_options = glsl::PipelineOptions {
            shader_stage,
            entry_point: module
                .entry_points
                .first()
                .map_or_else(|| "main".to_owned(), |entry_point| entry_point.name.clone()),
            multiview: None,
        };

        let mut text = String::new();
        let reflection = glsl::Writer::new(
            &mut text,
            &module,
            &info,
            &options,
            &pipeline_options,
            naga::proc::BoundsCheckPolicies::default(),
        )
        .and_then(|mut writer| writer.write())
        .map_err(|err| {
            output.error(
                request.entry_point,
                format!(
                    "couldn't write GLSL for the {} stage: {}",
                    request.stage.name(),
                    err,
                ),
            )
        })?;

        // Resources are looked up by the names in the module.
        let mut names = HashMap::new();
        for reflected in &request.reflection.uniforms {
            let uniform = &reflected.uniform;
            names.insert((uniform.descriptor_set, uniform.binding), uniform.name.as_str());
        }

        let global_name = |handle: naga::Handle<naga::GlobalVariable>| {
            module.global_variables[handle]
                .binding
                .as_ref()
                .and_then(|binding| names.get(&(binding.group, binding.binding)).copied())
        };

        let mut renames: Vec<(&str, &str)> = reflection
            .uniforms
            .iter()
            .filter_map(|(&handle, generated)| Some((generated.as_str(), global_name(handle)?)))
            .chain(reflection.texture_mapping.iter().filter_map(|(generated, mapping)| {
                Some((generated.as_str(), global_name(mapping.texture)?))
            }))
            .collect();
        renames.sort_unstable();

        for (generated, name) in renames {
            text = rename(&text, generated, name);
        }

        let mut text = self.process_text(&text, request.stage);

        if let Some(command) = &self.options.stage_commands[request.stage.index()] {
            let extension = format!(".{}", stage_extension(request.stage));
            let processed = ExternalCommand::new(&extension, &extension).execute(
                output,
                request.entry_point,
                command,
                text.as_bytes(),
            )?;

            text = String::from_utf8(processed).map_err(|_| {
                output.error(
                    request.entry_point,
                    format!("the output of `{}` isn't valid UTF-8", command),
                )
            })?;
        }

        let mut data = text.into_bytes();
        data.push(0);

        Ok(data)
    }
}

/// Renames `from` to `to`, moving an existing `to` out of the way.
fn rename(text: &str, from: &str, to: &str) -> String {
    if from == to {
        return text.to_owned();
    }

    if contains_identifier(text, to) {
        let moved = replace_identifier(text, to, &format!("{}_", to));
        replace_identifier(&moved, from, to)
    } else {
        replace_identifier(text, from, to)
    }
}

fn is_default_precision(line: &str) -> bool {
    let mut words = line.split_whitespace();

    words.next() == Some("precision")
        && matches!(words.next(), Some("lowp" | "mediump" | "highp"))
        && matches!(words.next(), Some("float;" | "int;"))
        && words.next().is_none()
}

fn stage_extension(stage: Stage) -> &'static str {
    match stage {
        Stage::Vertex => "vert",
        Stage::TessellationControl => "tesc",
        Stage::TessellationEvaluation => "tese",
        Stage::Geometry => "geom",
        Stage::Fragment => "frag",
        Stage::Compute => "comp",
    }
}
