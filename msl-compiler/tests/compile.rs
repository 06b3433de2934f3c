// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use msl_compiler::{
    backend::{
        GlslBackend, GlslOptions, MetalBackend, MetalCommands, MetalOptions, SpirvBackend,
    },
    BindingPolicy, CompiledResult, Level, Output, Target, TargetOptions,
};
use msl_module::{
    state::{AddressMode, BlendFactor, Filter, MipFilter},
    Module, Stage, Type, UniformType, NO_SHADER, TARGET_GLSL, TARGET_METAL_MACOS, TARGET_SPIRV,
    UNKNOWN,
};

const COMPLETE_SHADER: &str = "\
sampler_state tex
{
    min_filter = linear;
    mag_filter = linear;
    mip_filter = anisotropic;
    address_mode_u = repeat;
    address_mode_v = clamp_to_edge;
};

uniform Transform
{
    mat4 transform;
} INSTANCE(transform);

layout(push_constant) uniform Uniforms
{
    vec2 texCoords[2];
} INSTANCE(uniforms);

uniform sampler2D tex;

[[vertex]] layout(location = 0) in vec3 position;
[[vertex]] layout(location = 1) in vec4 color;
[[vertex]] layout(location = 0) out vec4 vertexColor;
[[vertex]] out gl_PerVertex
{
    vec4 gl_Position;
    float gl_ClipDistance[3];
    float gl_CullDistance[4];
};

[[fragment]] layout(location = 0) in vec4 vertexColor;
[[fragment]] layout(location = 0) out vec4 color;

[[vertex]] void vertMain()
{
    gl_Position = INSTANCE(transform).transform * vec4(position, 1.0);
    vertexColor = color;
    for (int i = 0; i < 3; ++i)
        gl_ClipDistance[i] = 1.0;
    for (int i = 0; i < 4; ++i)
        gl_CullDistance[i] = 1.0;
}

[[fragment]] void fragMain()
{
    color = texture(tex, INSTANCE(uniforms).texCoords[0]) * vertexColor;
}

pipeline Test
{
    vertex = vertMain;
    fragment = fragMain;
    src_color_blend_factor[0] = src_alpha;
    dst_color_blend_factor[0] = one_minus_src_alpha;
    src_alpha_blend_factor[0] = src_alpha;
    dst_alpha_blend_factor[0] = zero;
}
";

const COMPUTE_SHADER: &str = "\
layout(std430) buffer Output
{
    uint data;
} INSTANCE(outputBuffer);

[[compute]] layout(local_size_x = 2, local_size_y = 3, local_size_z = 4) in;

[[compute]] void computeMain()
{
    INSTANCE(outputBuffer).data = gl_LocalInvocationIndex;
}

pipeline TestCompute
{
    compute = computeMain;
}
";

const SIMPLE_SHADER: &str = "\
uniform Transform
{
    mat4 transform;
} INSTANCE(transform);

[[vertex]] layout(location = 0) in vec3 position;
[[fragment]] layout(location = 0) out vec4 color;

[[vertex]] void vertMain()
{
    gl_Position = INSTANCE(transform).transform * vec4(position, 1.0);
}

[[fragment]] void fragMain()
{
    color = vec4(1.0);
}

pipeline Test
{
    vertex = vertMain;
    fragment = fragMain;
}
";

fn compile(target: &mut Target, source: &str) -> (CompiledResult, Output) {
    let mut result = target.create_result();
    let mut output = Output::new();

    let compiled = target
        .compile(&mut output, &mut result, source, "test.msl")
        .and_then(|()| target.finish(&mut output, &mut result));
    assert!(compiled.is_ok(), "{}", output);

    (result, output)
}

fn spirv_target(options: TargetOptions) -> Target {
    Target::new(SpirvBackend::default(), options).unwrap()
}

#[test]
fn complete_shader() {
    let mut target = spirv_target(TargetOptions::default());
    let (result, output) = compile(&mut target, COMPLETE_SHADER);
    assert_eq!(output.error_count(), 0);

    let module = Module::from_vec(result.to_bytes()).unwrap();
    assert_eq!(module.target_id(), TARGET_SPIRV);
    assert!(module.target_version() >= 100);
    assert_eq!(module.pipeline_count(), 1);

    let pipeline = module.find_pipeline("Test").unwrap();
    assert_eq!(pipeline.name(), "Test");

    // Structs.
    assert_eq!(pipeline.struct_count(), 2);
    let structs: Vec<_> = (0..2).map(|i| pipeline.structure(i).unwrap()).collect();
    let transform = structs.iter().find(|s| s.name == "Transform").unwrap();
    assert_eq!(transform.size, 64);
    let member = transform.member(0).unwrap();
    assert_eq!((member.name, member.ty, member.offset), ("transform", Type::Mat4, 0));

    let uniforms_struct = structs.iter().find(|s| s.name == "Uniforms").unwrap();
    let member = uniforms_struct.member(0).unwrap();
    assert_eq!((member.name, member.ty), ("texCoords", Type::Vec2));
    assert_eq!(member.array_elements.len(), 1);
    let array = member.array_elements.get(0).unwrap();
    assert_eq!((array.length, array.stride), (2, 8));

    // Uniforms.
    assert_eq!(pipeline.uniform_count(), 3);
    let transform = pipeline.uniform(pipeline.find_uniform("Transform").unwrap()).unwrap();
    assert_eq!(transform.uniform_type, UniformType::Block);
    assert_eq!(transform.ty, Type::Struct);

    let uniforms_index = pipeline.find_uniform("Uniforms").unwrap();
    let uniforms = pipeline.uniform(uniforms_index).unwrap();
    assert_eq!(uniforms.uniform_type, UniformType::PushConstant);
    assert_eq!(pipeline.push_constant_struct(), uniforms.struct_index);

    let tex_index = pipeline.find_uniform("tex").unwrap();
    let tex = pipeline.uniform(tex_index).unwrap();
    assert_eq!(tex.uniform_type, UniformType::SampledImage);
    assert_eq!(tex.ty, Type::Sampler2D);
    assert_eq!(tex.sampler_index, 0);
    assert_ne!(
        (transform.descriptor_set, transform.binding),
        (tex.descriptor_set, tex.binding),
    );

    // Sampler state.
    assert_eq!(pipeline.sampler_state_count(), 1);
    let sampler = pipeline.sampler_state(0).unwrap();
    assert_eq!(sampler.min_filter, Filter::Linear);
    assert_eq!(sampler.mag_filter, Filter::Linear);
    assert_eq!(sampler.mip_filter, MipFilter::Anisotropic);
    assert_eq!(sampler.address_mode_u, AddressMode::Repeat);
    assert_eq!(sampler.address_mode_v, AddressMode::ClampToEdge);
    assert_eq!(sampler.address_mode_w, AddressMode::Unset);

    // Interface.
    assert_eq!(pipeline.attribute_count(), 2);
    let position = pipeline.attribute(0).unwrap();
    assert_eq!((position.name, position.ty, position.location), ("position", Type::Vec3, 0));
    let color = pipeline.attribute(1).unwrap();
    assert_eq!((color.name, color.ty, color.location), ("color", Type::Vec4, 1));

    assert_eq!(pipeline.fragment_output_count(), 1);
    let output = pipeline.fragment_output(0).unwrap();
    assert_eq!((output.name, output.location), ("color", 0));

    // Render state.
    let render_state = pipeline.render_state();
    let blend = &render_state.blend_state.attachments[0];
    assert_eq!(blend.src_color_blend_factor, BlendFactor::SrcAlpha);
    assert_eq!(blend.dst_color_blend_factor, BlendFactor::OneMinusSrcAlpha);
    assert_eq!(blend.src_alpha_blend_factor, BlendFactor::SrcAlpha);
    assert_eq!(blend.dst_alpha_blend_factor, BlendFactor::Zero);
    assert_eq!(render_state.clip_distance_count, 3);
    assert_eq!(render_state.cull_distance_count, 4);

    // Shaders.
    assert!(!pipeline.shader_uses_push_constants(Stage::Vertex));
    assert!(pipeline.shader_uses_push_constants(Stage::Fragment));
    assert!(!module.shader_uses_push_constants(0, Stage::Vertex));
    assert!(module.shader_uses_push_constants(0, Stage::Fragment));
    assert_eq!(pipeline.shader_index(Stage::Compute), NO_SHADER);
    assert_ne!(pipeline.uniform_id(Stage::Fragment, tex_index), UNKNOWN);
    assert_eq!(pipeline.uniform_id(Stage::Vertex, tex_index), UNKNOWN);

    let vertex = pipeline.shader_data(Stage::Vertex).unwrap();
    assert_eq!(&vertex[..4], &0x0723_0203u32.to_ne_bytes());
}

#[test]
fn compute_shader() {
    let mut target = spirv_target(TargetOptions::default());
    let (result, _) = compile(&mut target, COMPUTE_SHADER);

    let module = Module::from_vec(result.to_bytes()).unwrap();
    let pipeline = module.find_pipeline("TestCompute").unwrap();

    assert_eq!(pipeline.compute_local_size(), [2, 3, 4]);
    assert_eq!(pipeline.shader_index(Stage::Vertex), NO_SHADER);
    assert_ne!(pipeline.shader_index(Stage::Compute), NO_SHADER);

    assert_eq!(pipeline.uniform_count(), 1);
    let uniform = pipeline.uniform(0).unwrap();
    assert_eq!(uniform.name, "Output");
    assert_eq!(uniform.uniform_type, UniformType::BlockBuffer);

    let structure = pipeline.structure(uniform.struct_index).unwrap();
    assert_eq!(structure.name, "Output");
    let member = structure.member(0).unwrap();
    assert_eq!((member.name, member.ty), ("data", Type::UInt));
}

const DUPLICATED: &str = "\
[[vertex]] void vertMain()
{
    gl_Position = vec4(0.0);
}

[[fragment]] layout(location = 0) out vec4 color;

[[fragment]] void fragMain()
{
    color = vec4(1.0);
}

pipeline First
{
    vertex = vertMain;
    fragment = fragMain;
}

pipeline Second
{
    vertex = vertMain;
    fragment = fragMain;
    cull_mode = back;
}
";

#[test]
fn shader_deduplication() {
    let mut target = spirv_target(TargetOptions {
        remap_variables: true,
        ..Default::default()
    });
    let (result, _) = compile(&mut target, DUPLICATED);
    assert_eq!(result.shaders().len(), 2);

    let first = result.pipeline("First").unwrap();
    let second = result.pipeline("Second").unwrap();
    assert_eq!(first.shader(Stage::Vertex).shader, second.shader(Stage::Vertex).shader);

    let mut target = spirv_target(TargetOptions {
        remap_variables: true,
        binding_policy: BindingPolicy::Adjustable,
        ..Default::default()
    });
    let (result, _) = compile(&mut target, DUPLICATED);
    assert!(result.adjustable_bindings());
    assert_eq!(result.shaders().len(), 4);

    let first = result.pipeline("First").unwrap();
    let second = result.pipeline("Second").unwrap();
    assert_ne!(first.shader(Stage::Vertex).shader, second.shader(Stage::Vertex).shader);
}

#[test]
fn adjustable_bindings() {
    let mut target = spirv_target(TargetOptions {
        binding_policy: BindingPolicy::Adjustable,
        strip_debug: true,
        ..Default::default()
    });
    let (result, _) = compile(&mut target, COMPLETE_SHADER);

    let mut module = Module::from_vec(result.to_bytes()).unwrap();
    assert!(module.adjustable_bindings());

    let pipeline = module.find_pipeline("Test").unwrap();
    let tex = pipeline.find_uniform("tex").unwrap();
    let index = pipeline.index();

    module.set_uniform_binding(index, tex, 2, 7, None).unwrap();

    let pipeline = module.pipeline(index).unwrap();
    let uniform = pipeline.uniform(tex).unwrap();
    assert_eq!((uniform.descriptor_set, uniform.binding), (2, 7));
}

#[test]
fn failed_pipeline_is_skipped() {
    let source = "\
[[fragment]] layout(location = 0) out vec4 color;

[[vertex]] void vertMain()
{
    gl_Position = vec4(0.0);
}

[[fragment]] void brokenMain()
{
    color = undeclared;
}

[[fragment]] void fragMain()
{
    color = vec4(1.0);
}

pipeline Broken
{
    vertex = vertMain;
    fragment = brokenMain;
}

pipeline Working
{
    vertex = vertMain;
    fragment = fragMain;
}
";

    let mut target = spirv_target(TargetOptions::default());
    let mut result = target.create_result();
    let mut output = Output::new();

    let err = target
        .compile(&mut output, &mut result, source, "test.msl")
        .unwrap_err();

    let message = output.message(err.message).unwrap();
    assert_eq!(message.level, Level::Error);
    assert_eq!(&*message.file, "test.msl");
    assert_eq!(message.line, 10);

    assert!(result.pipeline("Broken").is_none());
    assert!(result.pipeline("Working").is_some());
}

#[test]
fn pipeline_parse_error_is_local() {
    let source = "\
[[fragment]] layout(location = 0) out vec4 color;

[[vertex]] void vertMain()
{
    gl_Position = vec4(0.0);
}

[[fragment]] void fragMain()
{
    color = vec4(1.0);
}

pipeline Broken
{
    vertex = vertMain;
    fragment = fragMain;
    cull_mode = sideways;
}

pipeline Working
{
    vertex = vertMain;
    fragment = fragMain;
}
";

    let mut target = spirv_target(TargetOptions::default());
    let mut result = target.create_result();
    let mut output = Output::new();

    let err = target
        .compile(&mut output, &mut result, source, "test.msl")
        .unwrap_err();

    let message = output.message(err.message).unwrap();
    assert_eq!(message.level, Level::Error);
    assert_eq!(message.line, 17);
    assert_eq!(output.error_count(), 1);

    assert!(result.pipeline("Broken").is_none());
    assert!(result.pipeline("Working").is_some());
    assert_eq!(result.pipelines().len(), 1);
}

#[cfg(unix)]
#[test]
fn processed_spirv_keeps_uniform_ids() {
    let (plain, _) = compile(&mut spirv_target(TargetOptions::default()), SIMPLE_SHADER);
    let (processed, _) = compile(
        &mut spirv_target(TargetOptions {
            strip_debug: true,
            spirv_command: Some("cp $input $output".to_owned()),
            ..Default::default()
        }),
        SIMPLE_SHADER,
    );

    let expected = plain.pipeline("Test").unwrap();
    let pipeline = processed.pipeline("Test").unwrap();

    for stage in [Stage::Vertex, Stage::Fragment] {
        assert_eq!(
            pipeline.shader(stage).uniform_ids,
            expected.shader(stage).uniform_ids,
        );
    }

    assert_ne!(pipeline.shader(Stage::Vertex).uniform_ids[0], UNKNOWN);
    assert_eq!(pipeline.shader(Stage::Fragment).uniform_ids[0], UNKNOWN);
}

#[test]
fn duplicate_pipeline_across_files() {
    let mut target = spirv_target(TargetOptions::default());
    let mut result = target.create_result();
    let mut output = Output::new();

    target
        .compile(&mut output, &mut result, DUPLICATED, "first.msl")
        .unwrap();
    let err = target
        .compile(&mut output, &mut result, DUPLICATED, "second.msl")
        .unwrap_err();

    let message = output.message(err.message).unwrap();
    assert_eq!(message.text, "pipeline 'First' has already been declared");
    assert_eq!(&*message.file, "second.msl");

    let note = output.message(err.message + 1).unwrap();
    assert!(note.continued);
    assert_eq!(&*note.file, "first.msl");

    assert_eq!(result.pipelines().len(), 2);
}

#[test]
fn glsl() {
    let mut target = Target::new(
        GlslBackend::new(GlslOptions {
            version: 330,
            remap_depth_range: true,
            header_lines: vec!["#define DESKTOP 1".to_owned()],
            ..Default::default()
        }),
        TargetOptions::default(),
    )
    .unwrap();

    let (result, _) = compile(&mut target, SIMPLE_SHADER);
    assert_eq!(result.target_id(), TARGET_GLSL);
    assert_eq!(result.target_version(), 330);

    let pipeline = result.pipeline("Test").unwrap();
    assert!(pipeline.shader(Stage::Vertex).uniform_ids.is_empty());

    let vertex = &result.shaders()[pipeline.shader(Stage::Vertex).shader as usize];
    assert_eq!(vertex.last(), Some(&0));

    let text = std::str::from_utf8(&vertex[..vertex.len() - 1]).unwrap();
    assert!(text.starts_with("#version 330"));
    assert!(text.lines().any(|line| line == "#define DESKTOP 1"));
    assert!(text.contains("gl_Position.z = 2.0 * gl_Position.z - gl_Position.w;"));
    assert!(text.contains("uniform Transform"));
}

#[cfg(unix)]
#[test]
fn metal_library() {
    let mut target = Target::new(
        MetalBackend::new(MetalOptions {
            commands: Some(MetalCommands {
                compile: "cp $input $output".to_owned(),
                archive: "cat $input > $output".to_owned(),
                link: "cp $input $output".to_owned(),
            }),
            ..Default::default()
        }),
        TargetOptions::default(),
    )
    .unwrap();

    let (result, _) = compile(&mut target, SIMPLE_SHADER);
    assert_eq!(result.target_id(), TARGET_METAL_MACOS);
    assert!(!result.adjustable_bindings());

    let pipeline = result.pipeline("Test").unwrap();
    let transform = &pipeline.uniforms[0];
    assert_eq!((transform.descriptor_set, transform.binding), (0, 0));

    let vertex = &result.shaders()[pipeline.shader(Stage::Vertex).shader as usize];
    assert_eq!(vertex.as_slice(), b"Test_vertex\0");
    let fragment = &result.shaders()[pipeline.shader(Stage::Fragment).shader as usize];
    assert_eq!(fragment.as_slice(), b"Test_fragment\0");

    // The stand-in toolchain concatenates the sources.
    let library = std::str::from_utf8(result.shared_data()).unwrap();
    assert!(library.contains("Test_vertex"));
    assert!(library.contains("Test_fragment"));
}

#[cfg(unix)]
#[test]
fn metal_library_skips_duplicate_pipelines() {
    let mut target = Target::new(
        MetalBackend::new(MetalOptions {
            commands: Some(MetalCommands {
                compile: "cp $input $output".to_owned(),
                // Counts the objects passed to the archive step.
                archive: "echo $input | wc -w > $output".to_owned(),
                link: "cp $input $output".to_owned(),
            }),
            ..Default::default()
        }),
        TargetOptions::default(),
    )
    .unwrap();

    let mut result = target.create_result();
    let mut output = Output::new();

    target
        .compile(&mut output, &mut result, SIMPLE_SHADER, "first.msl")
        .unwrap();
    target
        .compile(&mut output, &mut result, SIMPLE_SHADER, "second.msl")
        .unwrap_err();
    target.finish(&mut output, &mut result).unwrap();

    assert_eq!(result.pipelines().len(), 1);

    let count = std::str::from_utf8(result.shared_data()).unwrap();
    assert_eq!(count.trim(), "2");
}
