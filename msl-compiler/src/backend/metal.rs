// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::{naga_module, naga_stage, Backend, CrossCompileRequest};
use crate::{
    diagnostic::{CompileError, Location, Output},
    exec::{quote, ExternalCommand},
    feature::Feature,
    link::BindingPolicy,
};
use msl_module::{
    FragmentInputGroup, Stage, Uniform, UniformType, TARGET_METAL_IOS, TARGET_METAL_MACOS,
};
use naga::back::msl;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MetalPlatform {
    #[default]
    MacOs,
    Ios,
}

impl MetalPlatform {
    fn sdk(self) -> &'static str {
        match self {
            MetalPlatform::MacOs => "macosx",
            MetalPlatform::Ios => "iphoneos",
        }
    }
}

/// The commands that build the Metal library.
///
/// `compile` turns a `.metal` source into an `.air` object. `archive` collects the objects, with
/// `$input` replaced by every object. `link` turns the archive into a `.metallib`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetalCommands {
    pub compile: String,
    pub archive: String,
    pub link: String,
}

impl MetalCommands {
    /// The Xcode toolchain for `platform`.
    pub fn xcrun(platform: MetalPlatform, version: u32) -> Self {
        let sdk = platform.sdk();
        let standard = match platform {
            MetalPlatform::MacOs => "macos-metal",
            MetalPlatform::Ios => "ios-metal",
        };
        let (major, minor) = language_version(version);

        MetalCommands {
            compile: format!(
                "xcrun -sdk {} metal -std={}{}.{} -c $input -o $output",
                sdk, standard, major, minor,
            ),
            archive: format!("xcrun -sdk {} metal-ar rc $output $input", sdk),
            link: format!("xcrun -sdk {} metallib $input -o $output", sdk),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetalOptions {
    pub platform: MetalPlatform,

    /// The Metal shading language version as `major * 100 + minor * 10`, such as 120 for 1.2.
    pub version: u32,

    /// Overrides the Xcode toolchain.
    pub commands: Option<MetalCommands>,
}

impl Default for MetalOptions {
    #[inline]
    fn default() -> Self {
        MetalOptions {
            platform: MetalPlatform::MacOs,
            version: 120,
            commands: None,
        }
    }
}

/// Translates stages to the Metal shading language and builds them into one library, stored as
/// the module's shared data.
///
/// The payload of each shader is only the name of its function in that library, with a trailing
/// NUL, such as `Opaque_vertex`. Loaders create the library from
/// [`Module::shared_data`](msl_module::Module::shared_data) and look the functions up by name.
#[derive(Debug)]
pub struct MetalBackend {
    options: MetalOptions,
    commands: MetalCommands,
    /// The compiled objects of added pipelines, kept on disk until the library is built.
    objects: Vec<(ExternalCommand, Location)>,
    /// The objects of the pipeline being compiled.
    pending: Vec<(ExternalCommand, Location)>,
}

impl MetalBackend {
    pub fn new(options: MetalOptions) -> Self {
        let commands = options
            .commands
            .clone()
            .unwrap_or_else(|| MetalCommands::xcrun(options.platform, options.version));

        MetalBackend {
            options,
            commands,
            objects: Vec::new(),
            pending: Vec::new(),
        }
    }

    #[inline]
    pub fn options(&self) -> &MetalOptions {
        &self.options
    }

    fn at_least(&self, version: u32) -> bool {
        self.options.version >= version
    }
}

impl Default for MetalBackend {
    #[inline]
    fn default() -> Self {
        MetalBackend::new(MetalOptions::default())
    }
}

impl Backend for MetalBackend {
    fn id(&self) -> u32 {
        match self.options.platform {
            MetalPlatform::MacOs => TARGET_METAL_MACOS,
            MetalPlatform::Ios => TARGET_METAL_IOS,
        }
    }

    fn version(&self) -> u32 {
        self.options.version
    }

    fn feature_supported(&self, feature: Feature) -> bool {
        match feature {
            Feature::Doubles
            | Feature::BindingPoints
            | Feature::DescriptorSets
            | Feature::TessellationStages
            | Feature::GeometryStage
            | Feature::AdvancedDerivatives
            | Feature::PrimitiveStreams
            | Feature::SubpassInputs
            | Feature::CullDistance => false,
            Feature::DualSourceBlending => self.at_least(120),
            Feature::QueryLod => self.at_least(200),
            Feature::InterpolationFunctions => self.at_least(210),
            Feature::FragmentInputs => {
                self.options.platform == MetalPlatform::Ios || self.at_least(230)
            }
            _ => true,
        }
    }

    fn extra_defines(&self) -> Vec<(String, String)> {
        let name = match self.options.platform {
            MetalPlatform::MacOs => "METAL_OSX_VERSION",
            MetalPlatform::Ios => "METAL_IOS_VERSION",
        };

        vec![(name.to_owned(), self.options.version.to_string())]
    }

    fn ir_version(&self) -> u32 {
        100
    }

    fn will_compile(&mut self, _policy: BindingPolicy) -> BindingPolicy {
        // Slots are derived from the uniform order.
        BindingPolicy::Dummy
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
                    "the {} stage isn't supported when targeting Metal",
                    request.stage.name(),
                ),
            ));
        };

        let (mut module, info) = naga_module(output, request)?;

        // Every stage ends up in the same library.
        let function_name = format!("{}_{}", request.pipeline.name, request.stage.name());
        let Some(entry_point) = module
            .entry_points
            .iter_mut()
            .find(|entry_point| entry_point.stage == shader_stage)
        else {
            return Err(output.error(
                request.entry_point,
                format!("the {} stage has no entry point", request.stage.name()),
            ));
        };
        entry_point.name.clone_from(&function_name);

        let slots = assign_slots(&request.pipeline.uniforms);
        let mut resources = msl::EntryPointResources {
            push_constant_buffer: slots.push_constants,
            ..Default::default()
        };

        for (uniform, slot) in request.pipeline.uniforms.iter().zip(&slots.uniforms) {
            let Some(slot) = slot else {
                continue;
            };

            let target = match *slot {
                Slot::Buffer(buffer) => msl::BindTarget {
                    buffer: Some(buffer),
                    mutable: uniform.uniform_type == UniformType::BlockBuffer,
                    ..Default::default()
                },
                Slot::Texture(texture) => msl::BindTarget {
                    texture: Some(texture),
                    mutable: uniform.uniform_type == UniformType::Image,
                    ..Default::default()
                },
                Slot::SampledTexture { texture, sampler } => msl::BindTarget {
                    texture: Some(texture),
                    sampler: Some(msl::BindSamplerTarget::Resource(sampler)),
                    ..Default::default()
                },
            };

            resources.resources.insert(
                naga::ResourceBinding {
                    group: uniform.descriptor_set,
                    binding: uniform.binding,
                },
                target,
            );
        }

        let mut options = msl::Options {
            lang_version: language_version(self.options.version),
            fake_missing_bindings: true,
            ..Default::default()
        };
        options
            .per_entry_point_map
            .insert(function_name.clone(), resources);

        let (mut text, translation) =
            msl::write_string(&module, &info, &options, &msl::PipelineOptions::default())
                .map_err(|err| {
                    output.error(
                        request.entry_point,
                        format!(
                            "couldn't write Metal for the {} stage: {}",
                            request.stage.name(),
                            err,
                        ),
                    )
                })?;

        let function_name = match translation.entry_point_names.into_iter().next() {
            Some(Ok(name)) => name,
            Some(Err(err)) => {
                return Err(output.error(
                    request.entry_point,
                    format!(
                        "couldn't write Metal for the {} stage: {}",
                        request.stage.name(),
                        err,
                    ),
                ));
            }
            None => function_name,
        };

        if request.stage == Stage::Fragment {
            for group in &request.pipeline.fragment_inputs {
                text = apply_fragment_inputs(&text, group);
            }
        }

        let mut object = ExternalCommand::new(".metal", ".air");
        object.execute(
            output,
            request.entry_point,
            &self.commands.compile,
            text.as_bytes(),
        )?;
        self.pending.push((object, request.entry_point.clone()));

        let mut data = function_name.into_bytes();
        data.push(0);

        Ok(data)
    }

    fn finish_pipeline(&mut self, added: bool) {
        if added {
            self.objects.append(&mut self.pending);
        } else {
            // Dropping the objects removes their files.
            self.pending.clear();
        }
    }

    fn shared_data(&mut self, output: &mut Output) -> Result<Vec<u8>, CompileError> {
        let objects = std::mem::take(&mut self.objects);
        let Some((_, location)) = objects.first() else {
            return Ok(Vec::new());
        };

        let inputs: Vec<String> = objects
            .iter()
            .map(|(object, _)| quote(object.output_path()))
            .collect();
        let archive_command = self.commands.archive.replace("$input", &inputs.join(" "));

        let archive =
            ExternalCommand::new("", ".metalar").execute(output, location, &archive_command, &[])?;
        let library = ExternalCommand::new(".metalar", ".metallib").execute(
            output,
            location,
            &self.commands.link,
            &archive,
        )?;

        log::debug!(
            "built a Metal library of {} bytes from {} objects",
            library.len(),
            objects.len(),
        );

        Ok(library)
    }
}

fn language_version(version: u32) -> (u8, u8) {
    ((version / 100) as u8, (version % 100 / 10) as u8)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Buffer(u8),
    Texture(u8),
    SampledTexture { texture: u8, sampler: u8 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Slots {
    push_constants: Option<u8>,
    /// Indexed like the uniforms. Free uniforms and push constants have no slot.
    uniforms: Vec<Option<Slot>>,
}

/// Buffer slot 0 is reserved for push constants when the pipeline has them.
fn assign_slots(uniforms: &[Uniform]) -> Slots {
    let push_constants = uniforms
        .iter()
        .any(|uniform| uniform.uniform_type == UniformType::PushConstant)
        .then_some(0);

    let mut next_buffer = push_constants.map_or(0, |slot| slot + 1);
    let mut next_texture = 0;
    let mut next_sampler = 0;

    let uniforms = uniforms
        .iter()
        .map(|uniform| match uniform.uniform_type {
            UniformType::PushConstant | UniformType::Uniform => None,
            UniformType::Block | UniformType::BlockBuffer => {
                next_buffer += 1;
                Some(Slot::Buffer(next_buffer - 1))
            }
            UniformType::Image | UniformType::SubpassInput => {
                next_texture += 1;
                Some(Slot::Texture(next_texture - 1))
            }
            UniformType::SampledImage => {
                next_texture += 1;
                next_sampler += 1;
                Some(Slot::SampledTexture {
                    texture: next_texture - 1,
                    sampler: next_sampler - 1,
                })
            }
        })
        .collect();

    Slots {
        push_constants,
        uniforms,
    }
}

/// Reads the members of a fragment-input block from the color attachments, and passes the block
/// to the entry point by value.
fn apply_fragment_inputs(text: &str, group: &FragmentInputGroup) -> String {
    let struct_start = format!("struct {} {{", group.type_name);
    let mut lines = Vec::new();
    let mut in_struct = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed == struct_start {
            in_struct = true;
        } else if in_struct && trimmed.starts_with('}') {
            in_struct = false;
        } else if in_struct {
            let member = trimmed
                .strip_suffix(';')
                .and_then(|declaration| declaration.rsplit(' ').next());

            if let Some(input) = member
                .and_then(|member| group.inputs.iter().find(|input| input.name == member))
            {
                lines.push(format!(
                    "{} [[color({}), raster_order_group({})]];",
                    line.trim_end().trim_end_matches(';'),
                    input.location,
                    input.fragment_group,
                ));
                continue;
            }
        }

        lines.push(line.to_owned());
    }

    let mut result = lines.join("\n");
    if text.ends_with('\n') {
        result.push('\n');
    }

    // The parameter was passed as `constant Type& name [[buffer(n)]]`.
    let parameter = format!("constant {}& ", group.type_name);
    if let Some(start) = result.find(&parameter) {
        let name_start = start + parameter.len();
        let name_end = result[name_start..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .map_or(result.len(), |end| name_start + end);
        let name = result[name_start..name_end].to_owned();

        let mut end = name_end;
        let rest = &result[name_end..];
        if rest.trim_start().starts_with("[[") {
            if let Some(attribute_end) = rest.find("]]") {
                end = name_end + attribute_end + 2;
            }
        }

        result.replace_range(start..end, &format!("{} {}", group.type_name, name));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use msl_module::FragmentInput;

    fn uniform(name: &str, uniform_type: UniformType) -> Uniform {
        Uniform {
            name: name.to_owned(),
            uniform_type,
            ..Default::default()
        }
    }

    #[test]
    fn slots() {
        let slots = assign_slots(&[
            uniform("Transform", UniformType::Block),
            uniform("tex", UniformType::SampledImage),
            uniform("Uniforms", UniformType::PushConstant),
            uniform("Output", UniformType::BlockBuffer),
            uniform("image", UniformType::Image),
            uniform("other", UniformType::SampledImage),
        ]);

        assert_eq!(slots.push_constants, Some(0));
        assert_eq!(
            slots.uniforms,
            [
                Some(Slot::Buffer(1)),
                Some(Slot::SampledTexture {
                    texture: 0,
                    sampler: 0,
                }),
                None,
                Some(Slot::Buffer(2)),
                Some(Slot::Texture(1)),
                Some(Slot::SampledTexture {
                    texture: 2,
                    sampler: 1,
                }),
            ],
        );

        let slots = assign_slots(&[uniform("Transform", UniformType::Block)]);
        assert_eq!(slots.push_constants, None);
        assert_eq!(slots.uniforms, [Some(Slot::Buffer(0))]);
    }

    #[test]
    fn fragment_inputs() {
        let text = "\
struct Framebuffer {
    metal::float4 color;
    metal::float4 normal;
};
fragment main_Output Test_fragment(
  main_Input varyings [[stage_in]]
, constant Framebuffer& framebuffer [[buffer(0)]]
) {
    return main_Output { framebuffer.color };
}
";
        let group = FragmentInputGroup {
            type_name: "Framebuffer".to_owned(),
            variable_name: "framebuffer".to_owned(),
            inputs: vec![
                FragmentInput {
                    name: "color".to_owned(),
                    location: 0,
                    fragment_group: 0,
                },
                FragmentInput {
                    name: "normal".to_owned(),
                    location: 1,
                    fragment_group: 1,
                },
            ],
        };

        assert_eq!(
            apply_fragment_inputs(text, &group),
            "\
struct Framebuffer {
    metal::float4 color [[color(0), raster_order_group(0)]];
    metal::float4 normal [[color(1), raster_order_group(1)]];
};
fragment main_Output Test_fragment(
  main_Input varyings [[stage_in]]
, Framebuffer framebuffer
) {
    return main_Output { framebuffer.color };
}
",
        );
    }

    #[test]
    fn capabilities() {
        let mut backend = MetalBackend::new(MetalOptions {
            platform: MetalPlatform::Ios,
            version: 200,
            commands: None,
        });

        assert_eq!(backend.id(), TARGET_METAL_IOS);
        assert_eq!(backend.will_compile(BindingPolicy::Default), BindingPolicy::Dummy);
        assert!(!backend.supports_adjustable_bindings());
        assert!(backend.feature_supported(Feature::FragmentInputs));
        assert!(backend.feature_supported(Feature::QueryLod));
        assert!(!backend.feature_supported(Feature::Doubles));
        assert_eq!(
            backend.extra_defines(),
            [("METAL_IOS_VERSION".to_owned(), "200".to_owned())],
        );
        assert_eq!(
            backend.commands.compile,
            "xcrun -sdk iphoneos metal -std=ios-metal2.0 -c $input -o $output",
        );

        let backend = MetalBackend::default();
        assert_eq!(backend.id(), TARGET_METAL_MACOS);
        assert!(!backend.feature_supported(Feature::FragmentInputs));
        assert_eq!(language_version(backend.version()), (1, 2));
    }

    #[test]
    fn objects_of_failed_pipelines_are_dropped() {
        let mut backend = MetalBackend::default();
        let location = Location::new("test.msl", 3, 5);

        backend
            .pending
            .push((ExternalCommand::new(".metal", ".air"), location.clone()));
        backend.finish_pipeline(true);
        assert_eq!(backend.objects.len(), 1);
        assert!(backend.pending.is_empty());

        backend
            .pending
            .push((ExternalCommand::new(".metal", ".air"), location.clone()));
        backend
            .pending
            .push((ExternalCommand::new(".metal", ".air"), location));
        backend.finish_pipeline(false);
        assert_eq!(backend.objects.len(), 1);
        assert!(backend.pending.is_empty());
    }

    #[test]
    fn empty_library() {
        let mut output = Output::new();
        let mut backend = MetalBackend::default();

        assert!(backend.shared_data(&mut output).unwrap().is_empty());
        assert!(output.messages().is_empty());
    }
}
