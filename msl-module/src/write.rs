// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Serialization of a [`ModuleData`] into the module format.

use crate::{
    format::{Encoder, Endian, Put, VecRef, HEADER_SIZE, MAGIC},
    reflection::{
        ArrayInfo, Attribute, FragmentInput, FragmentInputGroup, FragmentOutput, ModuleData,
        PipelineData, ShaderRef, Struct, StructMember, Uniform,
    },
    MODULE_VERSION, TARGET_SPIRV,
};

/// Serializes a module.
///
/// For SPIR-V targets the shader payloads are taken to be 32-bit words in host byte order and
/// are stored as little-endian words.
pub fn write(module: &ModuleData) -> Vec<u8> {
    write_with_endian(module, Endian::NATIVE)
}

pub(crate) fn write_with_endian(module: &ModuleData, host: Endian) -> Vec<u8> {
    let mut encoder = Encoder::new();
    let swap_words = module.target_id == TARGET_SPIRV;

    let shared_data = encoder.bytes(&module.shared_data);
    let payloads: Vec<VecRef> = module
        .shaders
        .iter()
        .map(|payload| {
            if swap_words {
                encoder.words(payload, host)
            } else {
                encoder.bytes(payload)
            }
        })
        .collect();
    let shaders = encoder.table(&payloads, |_, payload, out| out.put_vec_ref(*payload));
    let pipelines = encoder.table(&module.pipelines, write_pipeline);

    let mut header = Vec::with_capacity(HEADER_SIZE);
    header.put_u32(MAGIC);
    header.put_u32(MODULE_VERSION);
    header.put_u32(module.target_id);
    header.put_u32(module.target_version);
    header.put_bool(module.adjustable_bindings);
    header.put_vec_ref(pipelines);
    header.put_vec_ref(shaders);
    header.put_vec_ref(shared_data);

    encoder.finish(&header)
}

fn write_array_elements(encoder: &mut Encoder, elements: &[ArrayInfo]) -> VecRef {
    encoder.table(elements, |_, element, out| {
        out.put_u32(element.length);
        out.put_u32(element.stride);
    })
}

fn write_pipeline(encoder: &mut Encoder, pipeline: &PipelineData, out: &mut Vec<u8>) {
    let name = encoder.string(&pipeline.name);
    let structs = encoder.table(&pipeline.structs, write_struct);
    let sampler_states =
        encoder.table(&pipeline.sampler_states, |_, state, out| out.put_sampler_state(state));
    let uniforms = encoder.table(&pipeline.uniforms, write_uniform);
    let attributes = encoder.table(&pipeline.attributes, write_attribute);
    let fragment_outputs = encoder.table(&pipeline.fragment_outputs, write_fragment_output);
    let fragment_inputs = encoder.table(&pipeline.fragment_inputs, write_fragment_input_group);
    let shaders = encoder.table(&pipeline.shaders, write_shader);

    out.put_vec_ref(name);
    out.put_vec_ref(structs);
    out.put_vec_ref(sampler_states);
    out.put_vec_ref(uniforms);
    out.put_vec_ref(attributes);
    out.put_vec_ref(fragment_outputs);
    out.put_vec_ref(fragment_inputs);
    out.put_u32(pipeline.push_constant_struct);

    for size in pipeline.compute_local_size {
        out.put_u32(size);
    }

    out.put_render_state(&pipeline.render_state);
    out.put_vec_ref(shaders);
}

fn write_struct(encoder: &mut Encoder, structure: &Struct, out: &mut Vec<u8>) {
    let name = encoder.string(&structure.name);
    let members = encoder.table(&structure.members, write_struct_member);

    out.put_vec_ref(name);
    out.put_u32(structure.size);
    out.put_vec_ref(members);
}

fn write_struct_member(encoder: &mut Encoder, member: &StructMember, out: &mut Vec<u8>) {
    let name = encoder.string(&member.name);
    let array_elements = write_array_elements(encoder, &member.array_elements);

    out.put_vec_ref(name);
    out.put_u32(member.offset);
    out.put_u32(member.size);
    out.put_u32(member.ty.as_raw());
    out.put_u32(member.struct_index);
    out.put_vec_ref(array_elements);
    out.put_bool(member.row_major);
}

fn write_uniform(encoder: &mut Encoder, uniform: &Uniform, out: &mut Vec<u8>) {
    let name = encoder.string(&uniform.name);
    let array_elements = write_array_elements(encoder, &uniform.array_elements);

    out.put_vec_ref(name);
    out.put_u32(uniform.uniform_type.as_raw());
    out.put_u32(uniform.ty.as_raw());
    out.put_u32(uniform.struct_index);
    out.put_vec_ref(array_elements);
    out.put_u32(uniform.descriptor_set);
    out.put_u32(uniform.binding);
    out.put_u32(uniform.input_attachment_index);
    out.put_u32(uniform.sampler_index);
}

fn write_attribute(encoder: &mut Encoder, attribute: &Attribute, out: &mut Vec<u8>) {
    let name = encoder.string(&attribute.name);
    let array_elements = write_array_elements(encoder, &attribute.array_elements);

    out.put_vec_ref(name);
    out.put_u32(attribute.ty.as_raw());
    out.put_vec_ref(array_elements);
    out.put_u32(attribute.location);
    out.put_u32(attribute.component);
}

fn write_fragment_output(encoder: &mut Encoder, output: &FragmentOutput, out: &mut Vec<u8>) {
    let name = encoder.string(&output.name);

    out.put_vec_ref(name);
    out.put_u32(output.location);
}

fn write_fragment_input_group(
    encoder: &mut Encoder,
    group: &FragmentInputGroup,
    out: &mut Vec<u8>,
) {
    let type_name = encoder.string(&group.type_name);
    let variable_name = encoder.string(&group.variable_name);
    let inputs = encoder.table(&group.inputs, |encoder, input: &FragmentInput, out| {
        let name = encoder.string(&input.name);

        out.put_vec_ref(name);
        out.put_u32(input.location);
        out.put_u32(input.fragment_group);
    });

    out.put_vec_ref(type_name);
    out.put_vec_ref(variable_name);
    out.put_vec_ref(inputs);
}

fn write_shader(encoder: &mut Encoder, shader: &ShaderRef, out: &mut Vec<u8>) {
    let uniform_ids = encoder.u32_table(&shader.uniform_ids);

    out.put_u32(shader.shader);
    out.put_bool(shader.uses_push_constants);
    out.put_vec_ref(uniform_ids);
}
