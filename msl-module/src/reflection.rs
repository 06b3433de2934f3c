// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Owned descriptions of everything a module stores.
//!
//! The compiler fills these in and [`write`](crate::write) serializes them. The loader hands out
//! borrowed views of the same data, which convert back into these types.

use crate::{
    state::{RenderState, SamplerState},
    types::{Stage, Type, UniformType, STAGE_COUNT},
    NO_SHADER, UNKNOWN,
};
use smallvec::SmallVec;

/// One dimension of an array. Arrays of arrays list the outermost dimension first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArrayInfo {
    /// The number of elements, or [`UNKNOWN`] for a runtime-sized array.
    pub length: u32,
    /// The distance in bytes between two elements, or [`UNKNOWN`] outside of blocks.
    pub stride: u32,
}

/// The dimensions of an array, empty if the value isn't an array.
pub type ArrayElements = SmallVec<[ArrayInfo; 2]>;

/// A member of a struct.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StructMember {
    pub name: String,
    pub offset: u32,
    pub size: u32,
    pub ty: Type,
    /// Index into the pipeline's struct table when `ty` is [`Type::Struct`], otherwise
    /// [`UNKNOWN`]. Always refers to an earlier struct.
    pub struct_index: u32,
    pub array_elements: ArrayElements,
    pub row_major: bool,
}

/// A struct used by a uniform block, buffer or push constant range.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Struct {
    pub name: String,
    pub size: u32,
    pub members: Vec<StructMember>,
}

/// A resource visible to the shaders of a pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Uniform {
    /// The block name for blocks, otherwise the variable name.
    pub name: String,
    pub uniform_type: UniformType,
    pub ty: Type,
    /// Index into the pipeline's struct table when `ty` is [`Type::Struct`].
    pub struct_index: u32,
    pub array_elements: ArrayElements,
    pub descriptor_set: u32,
    pub binding: u32,
    pub input_attachment_index: u32,
    /// Index into the pipeline's sampler states when a `sampler_state` of the same name was
    /// declared for a sampled image.
    pub sampler_index: u32,
}

impl Default for Uniform {
    #[inline]
    fn default() -> Self {
        Uniform {
            name: String::new(),
            uniform_type: UniformType::Block,
            ty: Type::Struct,
            struct_index: UNKNOWN,
            array_elements: ArrayElements::new(),
            descriptor_set: UNKNOWN,
            binding: UNKNOWN,
            input_attachment_index: UNKNOWN,
            sampler_index: UNKNOWN,
        }
    }
}

/// An input of the vertex stage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attribute {
    pub name: String,
    pub ty: Type,
    pub array_elements: ArrayElements,
    pub location: u32,
    pub component: u32,
}

/// An output of the fragment stage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FragmentOutput {
    pub name: String,
    pub location: u32,
}

/// A value of a fragment-input group, read back from the framebuffer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FragmentInput {
    pub name: String,
    pub location: u32,
    pub fragment_group: u32,
}

/// A `fragment_inputs` block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FragmentInputGroup {
    pub type_name: String,
    pub variable_name: String,
    pub inputs: Vec<FragmentInput>,
}

/// The shader used for one stage of a pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShaderRef {
    /// Index into the module's shader table, or [`NO_SHADER`] if the stage is unused.
    pub shader: u32,
    pub uses_push_constants: bool,
    /// The SPIR-V id of each uniform's variable, aligned with the pipeline's uniforms. Unused
    /// entries are [`UNKNOWN`]. Empty for unused stages and for targets other than SPIR-V.
    pub uniform_ids: Vec<u32>,
}

impl ShaderRef {
    #[inline]
    pub fn is_used(&self) -> bool {
        self.shader != NO_SHADER
    }
}

impl Default for ShaderRef {
    #[inline]
    fn default() -> Self {
        ShaderRef {
            shader: NO_SHADER,
            uses_push_constants: false,
            uniform_ids: Vec::new(),
        }
    }
}

/// Everything a module stores about one pipeline.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineData {
    pub name: String,
    pub structs: Vec<Struct>,
    pub sampler_states: Vec<SamplerState>,
    pub uniforms: Vec<Uniform>,
    pub attributes: Vec<Attribute>,
    pub fragment_outputs: Vec<FragmentOutput>,
    pub fragment_inputs: Vec<FragmentInputGroup>,
    /// Index of the push constant struct, or [`UNKNOWN`].
    pub push_constant_struct: u32,
    pub compute_local_size: [u32; 3],
    pub render_state: RenderState,
    pub shaders: [ShaderRef; STAGE_COUNT],
}

impl PipelineData {
    /// Creates an empty pipeline.
    pub fn new(name: impl Into<String>) -> Self {
        PipelineData {
            name: name.into(),
            structs: Vec::new(),
            sampler_states: Vec::new(),
            uniforms: Vec::new(),
            attributes: Vec::new(),
            fragment_outputs: Vec::new(),
            fragment_inputs: Vec::new(),
            push_constant_struct: UNKNOWN,
            compute_local_size: [1, 1, 1],
            render_state: RenderState::default(),
            shaders: Default::default(),
        }
    }

    #[inline]
    pub fn shader(&self, stage: Stage) -> &ShaderRef {
        &self.shaders[stage.index()]
    }

    #[inline]
    pub fn shader_mut(&mut self, stage: Stage) -> &mut ShaderRef {
        &mut self.shaders[stage.index()]
    }
}

/// Everything stored in a module.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModuleData {
    pub target_id: u32,
    pub target_version: u32,
    pub adjustable_bindings: bool,
    /// Pipelines, sorted by name.
    pub pipelines: Vec<PipelineData>,
    /// Shader payloads. SPIR-V payloads are words in host byte order.
    pub shaders: Vec<Vec<u8>>,
    pub shared_data: Vec<u8>,
}

impl ModuleData {
    /// Creates an empty module for a target.
    pub fn new(target_id: u32, target_version: u32) -> Self {
        ModuleData {
            target_id,
            target_version,
            adjustable_bindings: false,
            pipelines: Vec::new(),
            shaders: Vec::new(),
            shared_data: Vec::new(),
        }
    }
}
