// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use msl_module::{
    state::{AddressMode, BlendFactor, Filter, MipFilter, SamplerState},
    write, ArrayElements, ArrayInfo, Attribute, FragmentOutput, LoadError, Module, ModuleData,
    PipelineData, ShaderRef, Stage, Struct, StructMember, Type, Uniform, UniformType,
    BindingError, NO_SHADER, TARGET_SPIRV, UNKNOWN, UNKNOWN_FLOAT,
};
use smallvec::smallvec;
use std::io::Cursor;

const SPIRV_MAGIC: u32 = 0x0723_0203;

fn to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|word| word.to_ne_bytes()).collect()
}

fn to_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|word| u32::from_ne_bytes(word.try_into().unwrap()))
        .collect()
}

/// A SPIR-V module that only decorates `id` with a descriptor set and binding.
fn decorated_spirv(id: u32, descriptor_set: u32, binding: u32, extra: u32) -> Vec<u32> {
    vec![
        SPIRV_MAGIC,
        0x0001_0000,
        extra,
        32,
        0,
        4 << 16 | 71,
        id,
        34,
        descriptor_set,
        4 << 16 | 71,
        id,
        33,
        binding,
    ]
}

fn complete_shader(adjustable_bindings: bool) -> ModuleData {
    let mut pipeline = PipelineData::new("Test");
    pipeline.structs = vec![
        Struct {
            name: "Transform".to_owned(),
            size: 64,
            members: vec![StructMember {
                name: "transform".to_owned(),
                offset: 0,
                size: 64,
                ty: Type::Mat4,
                struct_index: UNKNOWN,
                array_elements: ArrayElements::new(),
                row_major: false,
            }],
        },
        Struct {
            name: "Uniforms".to_owned(),
            size: 16,
            members: vec![StructMember {
                name: "texCoords".to_owned(),
                offset: 0,
                size: 16,
                ty: Type::Vec2,
                struct_index: UNKNOWN,
                array_elements: smallvec![ArrayInfo {
                    length: 2,
                    stride: 8,
                }],
                row_major: false,
            }],
        },
    ];
    pipeline.sampler_states = vec![SamplerState {
        min_filter: Filter::Linear,
        mag_filter: Filter::Linear,
        mip_filter: MipFilter::Anisotropic,
        address_mode_u: AddressMode::Repeat,
        address_mode_v: AddressMode::ClampToEdge,
        ..Default::default()
    }];
    pipeline.uniforms = vec![
        Uniform {
            name: "Transform".to_owned(),
            uniform_type: UniformType::Block,
            ty: Type::Struct,
            struct_index: 0,
            descriptor_set: 0,
            binding: 0,
            ..Default::default()
        },
        Uniform {
            name: "Uniforms".to_owned(),
            uniform_type: UniformType::PushConstant,
            ty: Type::Struct,
            struct_index: 1,
            ..Default::default()
        },
        Uniform {
            name: "tex".to_owned(),
            uniform_type: UniformType::SampledImage,
            ty: Type::Sampler2D,
            descriptor_set: 0,
            binding: 1,
            sampler_index: 0,
            ..Default::default()
        },
    ];
    pipeline.attributes = vec![
        Attribute {
            name: "position".to_owned(),
            ty: Type::Vec3,
            array_elements: ArrayElements::new(),
            location: 0,
            component: 0,
        },
        Attribute {
            name: "color".to_owned(),
            ty: Type::Vec4,
            array_elements: ArrayElements::new(),
            location: 1,
            component: 0,
        },
    ];
    pipeline.fragment_outputs = vec![FragmentOutput {
        name: "color".to_owned(),
        location: 0,
    }];
    pipeline.push_constant_struct = 1;

    let blend = &mut pipeline.render_state.blend_state.attachments[0];
    blend.src_color_blend_factor = BlendFactor::SrcAlpha;
    blend.dst_color_blend_factor = BlendFactor::OneMinusSrcAlpha;
    blend.src_alpha_blend_factor = BlendFactor::SrcAlpha;
    blend.dst_alpha_blend_factor = BlendFactor::Zero;
    pipeline.render_state.clip_distance_count = 3;
    pipeline.render_state.cull_distance_count = 4;

    *pipeline.shader_mut(Stage::Vertex) = ShaderRef {
        shader: 0,
        uses_push_constants: false,
        uniform_ids: vec![20, UNKNOWN, UNKNOWN],
    };
    *pipeline.shader_mut(Stage::Fragment) = ShaderRef {
        shader: 1,
        uses_push_constants: true,
        uniform_ids: vec![UNKNOWN, 21, 22],
    };

    ModuleData {
        target_id: TARGET_SPIRV,
        target_version: 100,
        adjustable_bindings,
        pipelines: vec![pipeline],
        shaders: vec![
            to_bytes(&decorated_spirv(20, 0, 0, 0)),
            to_bytes(&decorated_spirv(22, 0, 1, 1)),
        ],
        shared_data: Vec::new(),
    }
}

fn compute_shader() -> ModuleData {
    let mut pipeline = PipelineData::new("TestCompute");
    pipeline.structs.push(Struct {
        name: "Output".to_owned(),
        size: 4,
        members: vec![StructMember {
            name: "data".to_owned(),
            offset: 0,
            size: 4,
            ty: Type::UInt,
            struct_index: UNKNOWN,
            array_elements: ArrayElements::new(),
            row_major: false,
        }],
    });
    pipeline.uniforms.push(Uniform {
        name: "Output".to_owned(),
        uniform_type: UniformType::BlockBuffer,
        ty: Type::Struct,
        struct_index: 0,
        descriptor_set: 0,
        binding: 0,
        ..Default::default()
    });
    pipeline.compute_local_size = [2, 3, 4];
    *pipeline.shader_mut(Stage::Compute) = ShaderRef {
        shader: 0,
        uses_push_constants: false,
        uniform_ids: vec![7],
    };

    let mut module = ModuleData::new(TARGET_SPIRV, 100);
    module.pipelines.push(pipeline);
    module.shaders.push(to_bytes(&decorated_spirv(7, 0, 0, 0)));

    module
}

#[test]
fn complete_shader_accessors() {
    let module = Module::from_data(&write(&complete_shader(false))).unwrap();

    assert_eq!(module.target_id(), TARGET_SPIRV);
    assert!(module.target_version() >= 100);
    assert_eq!(module.pipeline_count(), 1);

    let pipeline = module.pipeline(0).unwrap();
    assert_eq!(pipeline.name(), "Test");

    assert_eq!(pipeline.struct_count(), 2);
    let transform = pipeline.structure(0).unwrap();
    assert_eq!((transform.name, transform.size), ("Transform", 64));
    let member = transform.member(0).unwrap();
    assert_eq!((member.name, member.ty, member.size), ("transform", Type::Mat4, 64));
    assert!(member.array_elements.is_empty());

    let uniforms = pipeline.structure(1).unwrap();
    assert_eq!(uniforms.name, "Uniforms");
    let member = uniforms.member(0).unwrap();
    assert_eq!((member.name, member.ty), ("texCoords", Type::Vec2));
    assert_eq!(
        member.array_elements.get(0),
        Some(ArrayInfo {
            length: 2,
            stride: 8,
        }),
    );

    assert_eq!(pipeline.uniform_count(), 3);
    let expected = [
        ("Transform", UniformType::Block, Type::Struct, 0),
        ("Uniforms", UniformType::PushConstant, Type::Struct, 1),
        ("tex", UniformType::SampledImage, Type::Sampler2D, UNKNOWN),
    ];

    for (index, (name, uniform_type, ty, struct_index)) in expected.into_iter().enumerate() {
        let uniform = pipeline.uniform(index as u32).unwrap();
        assert_eq!(uniform.name, name);
        assert_eq!(uniform.uniform_type, uniform_type);
        assert_eq!(uniform.ty, ty);
        assert_eq!(uniform.struct_index, struct_index);
    }

    assert_eq!(pipeline.uniform(2).unwrap().sampler_index, 0);
    assert_eq!(pipeline.push_constant_struct(), 1);

    assert_eq!(pipeline.attribute_count(), 2);
    let position = pipeline.attribute(0).unwrap();
    assert_eq!((position.name, position.ty, position.location), ("position", Type::Vec3, 0));
    let color = pipeline.attribute(1).unwrap();
    assert_eq!((color.name, color.ty, color.location), ("color", Type::Vec4, 1));

    assert_eq!(pipeline.fragment_output_count(), 1);
    let output = pipeline.fragment_output(0).unwrap();
    assert_eq!((output.name, output.location), ("color", 0));

    assert_eq!(pipeline.sampler_state_count(), 1);
    let sampler = pipeline.sampler_state(0).unwrap();
    assert_eq!(sampler.min_filter, Filter::Linear);
    assert_eq!(sampler.mag_filter, Filter::Linear);
    assert_eq!(sampler.mip_filter, MipFilter::Anisotropic);
    assert_eq!(sampler.address_mode_u, AddressMode::Repeat);
    assert_eq!(sampler.address_mode_v, AddressMode::ClampToEdge);
    assert_eq!(sampler.address_mode_w, AddressMode::Unset);
    assert_eq!(sampler.max_anisotropy, UNKNOWN_FLOAT);

    let render_state = pipeline.render_state();
    let blend = render_state.blend_state.attachments[0];
    assert_eq!(blend.src_color_blend_factor, BlendFactor::SrcAlpha);
    assert_eq!(blend.dst_color_blend_factor, BlendFactor::OneMinusSrcAlpha);
    assert_eq!(blend.src_alpha_blend_factor, BlendFactor::SrcAlpha);
    assert_eq!(blend.dst_alpha_blend_factor, BlendFactor::Zero);
    assert_eq!(render_state.clip_distance_count, 3);
    assert_eq!(render_state.cull_distance_count, 4);

    assert_eq!(pipeline.shader_index(Stage::Vertex), 0);
    assert_eq!(pipeline.shader_index(Stage::Fragment), 1);
    assert_eq!(pipeline.shader_index(Stage::Compute), NO_SHADER);
    assert!(!module.shader_uses_push_constants(0, Stage::Vertex));
    assert!(module.shader_uses_push_constants(0, Stage::Fragment));
    assert_eq!(pipeline.uniform_id(Stage::Fragment, 2), 22);
    assert_eq!(pipeline.uniform_id(Stage::Vertex, 2), UNKNOWN);
    assert_eq!(pipeline.uniform_id(Stage::Compute, 0), UNKNOWN);
}

#[test]
fn round_trip() {
    let data = complete_shader(false);
    let module = Module::from_vec(write(&data)).unwrap();

    assert_eq!(module.to_data(), data);
    // Reading twice gives the same answer.
    assert_eq!(module.to_data(), module.to_data());
}

#[test]
fn compute_shader_accessors() {
    let module = Module::from_data(&write(&compute_shader())).unwrap();
    let pipeline = module.find_pipeline("TestCompute").unwrap();

    assert_eq!(pipeline.compute_local_size(), [2, 3, 4]);
    assert_eq!(pipeline.uniform_count(), 1);

    let uniform = pipeline.uniform(0).unwrap();
    assert_eq!(uniform.name, "Output");
    assert_eq!(uniform.uniform_type, UniformType::BlockBuffer);
    assert_eq!(uniform.ty, Type::Struct);

    let structure = pipeline.structure(uniform.struct_index).unwrap();
    assert_eq!(structure.name, "Output");
    assert_eq!(structure.member(0).unwrap().ty, Type::UInt);
    assert_eq!(pipeline.shader_index(Stage::Vertex), NO_SHADER);
    assert!(pipeline.shader_data(Stage::Vertex).is_none());
    assert!(pipeline.shader_data(Stage::Compute).is_some());
}

#[test]
fn truncated_file() {
    let bytes = write(&complete_shader(false));

    assert!(matches!(
        Module::from_data(&bytes[..bytes.len() - 18]),
        Err(LoadError::InvalidFormat),
    ));
}

#[test]
fn oversized_read() {
    let bytes = write(&complete_shader(false));
    let size = bytes.len() + 18;

    assert!(matches!(
        Module::from_reader(Cursor::new(bytes), size),
        Err(LoadError::Io(_)),
    ));
}

#[test]
fn insufficient_storage() {
    let bytes = write(&complete_shader(false));

    assert!(matches!(
        Module::from_data_in(&bytes, Vec::with_capacity(4)),
        Err(LoadError::InvalidArgument),
    ));

    let storage = Vec::with_capacity(Module::size_of(bytes.len()));
    let capacity = storage.capacity();
    let module = Module::from_data_in(&bytes, storage).unwrap();
    assert_eq!(module.pipeline(0).unwrap().name(), "Test");

    let storage = module.into_buffer();
    assert_eq!(storage.capacity(), capacity);
}

#[test]
fn newer_version_is_rejected() {
    let mut bytes = write(&compute_shader());
    bytes[4..8].copy_from_slice(&2u32.to_le_bytes());

    assert!(matches!(
        Module::from_vec(bytes),
        Err(LoadError::InvalidFormat),
    ));
}

#[test]
fn missing_file() {
    assert!(matches!(
        Module::from_file("this/file/does/not/exist.mslb"),
        Err(LoadError::NotFound),
    ));
}

#[test]
fn binding_rewrite_without_copies() {
    let data = complete_shader(false);
    let mut module = Module::from_vec(write(&data)).unwrap();

    assert_eq!(
        module.set_uniform_binding(0, 2, 3, 4, None),
        Err(BindingError::NotAdjustable),
    );
    assert_eq!(module.to_data(), data);
}

#[test]
fn binding_rewrite_with_copies() {
    let data = complete_shader(false);
    let mut module = Module::from_vec(write(&data)).unwrap();
    let pipeline = module.pipeline(0).unwrap();

    let mut copies: Vec<Vec<u8>> = Stage::ALL
        .iter()
        .map(|&stage| pipeline.shader_data(stage).map_or(Vec::new(), <[u8]>::to_vec))
        .collect();

    module.set_uniform_binding(0, 2, 3, 4, Some(&mut copies)).unwrap();

    let uniform = module.pipeline(0).unwrap().uniform(2).unwrap();
    assert_eq!((uniform.descriptor_set, uniform.binding), (3, 4));
    assert_eq!(to_words(&copies[Stage::Fragment.index()]), decorated_spirv(22, 3, 4, 1));
    // The vertex stage doesn't use the uniform.
    assert_eq!(to_words(&copies[Stage::Vertex.index()]), decorated_spirv(20, 0, 0, 0));
    // The module's own payloads are untouched.
    assert_eq!(module.shader_data(1).unwrap(), &data.shaders[1][..]);
}

#[test]
fn binding_rewrite_with_invalid_copies() {
    let data = complete_shader(false);
    let mut module = Module::from_vec(write(&data)).unwrap();

    let mut copies = vec![Vec::new(); 6];
    assert_eq!(
        module.set_uniform_binding(0, 2, 3, 4, Some(&mut copies)),
        Err(BindingError::InvalidShaderData { stage: Stage::Fragment }),
    );
    assert!(copies.iter().all(Vec::is_empty));

    let uniform = module.pipeline(0).unwrap().uniform(2).unwrap();
    assert_eq!((uniform.descriptor_set, uniform.binding), (0, 1));
    assert_eq!(module.to_data(), data);
}

#[test]
fn out_of_range_accessors() {
    let module = Module::from_vec(write(&complete_shader(false))).unwrap();
    let pipeline = module.pipeline(0).unwrap();

    assert!(module.pipeline(1).is_none());
    assert!(module.find_pipeline("Missing").is_none());
    assert!(module.shader_data(2).is_none());
    assert!(pipeline.structure(2).is_none());
    assert!(pipeline.structure(0).unwrap().member(1).is_none());
    assert!(pipeline.uniform(3).is_none());
    assert!(pipeline.uniform(u32::MAX).is_none());
    assert!(pipeline.attribute(2).is_none());
    assert!(pipeline.fragment_output(1).is_none());
    assert!(pipeline.fragment_input_group(0).is_none());
    assert!(pipeline.sampler_state(1).is_none());
    assert_eq!(pipeline.uniform_id(Stage::Vertex, 3), UNKNOWN);
    assert!(!module.shader_uses_push_constants(1, Stage::Fragment));
}

#[test]
fn shared_data_and_sorted_pipelines() {
    let mut data = compute_shader();
    let mut first = data.pipelines[0].clone();
    first.name = "Alpha".to_owned();
    data.pipelines.insert(0, first);
    data.shared_data = b"library".to_vec();

    let module = Module::from_vec(write(&data)).unwrap();
    assert_eq!(module.shared_data(), b"library");
    assert_eq!(module.find_pipeline("Alpha").unwrap().index(), 0);
    assert_eq!(module.find_pipeline("TestCompute").unwrap().index(), 1);
}

#[test]
fn garbage_is_rejected() {
    assert!(matches!(Module::from_data(&[]), Err(LoadError::InvalidFormat)));
    assert!(matches!(
        Module::from_data(&[0xAB; 256]),
        Err(LoadError::InvalidFormat),
    ));

    let mut bytes = write(&complete_shader(false));
    // Point the pipeline table past the end of the buffer.
    let len = bytes.len() as u32;
    bytes[20..24].copy_from_slice(&len.to_le_bytes());
    assert!(matches!(Module::from_vec(bytes), Err(LoadError::InvalidFormat)));
}
