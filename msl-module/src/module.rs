// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Loading modules and reading them in place.
//!
//! A [`Module`] owns one buffer holding the whole file. The buffer is verified once when loaded,
//! after which every accessor is a constant-time offset computation. Accessors given an index
//! that is out of range return `None`, or [`UNKNOWN`]/[`NO_SHADER`] where the value is an
//! index itself.
//!
//! ```no_run
//! use msl_module::{Module, Stage};
//!
//! let module = Module::from_file("shaders.mslb")?;
//! let pipeline = module.find_pipeline("Opaque").expect("missing pipeline");
//!
//! for index in 0..pipeline.uniform_count() {
//!     let uniform = pipeline.uniform(index).unwrap();
//!     println!("{}: set {} binding {}", uniform.name, uniform.descriptor_set, uniform.binding);
//! }
//!
//! let vertex_shader = pipeline.shader_data(Stage::Vertex);
//! # Ok::<(), msl_module::LoadError>(())
//! ```

use crate::{
    format::{
        Endian, Reader, VecRef, ARRAY_INFO_SIZE, ATTRIBUTE_SIZE, FRAGMENT_INPUT_GROUP_SIZE,
        FRAGMENT_INPUT_SIZE, FRAGMENT_OUTPUT_SIZE, HEADER_SIZE, MAGIC, PIPELINE_SIZE,
        SAMPLER_STATE_SIZE, SHADER_DATA_SIZE, SHADER_SIZE, STRUCT_MEMBER_SIZE, STRUCT_SIZE,
        UNIFORM_BINDING_OFFSET, UNIFORM_DESCRIPTOR_SET_OFFSET, UNIFORM_SIZE,
    },
    reflection::{
        ArrayElements, ArrayInfo, Attribute, FragmentInput, FragmentInputGroup, FragmentOutput,
        ModuleData, PipelineData, ShaderRef, Struct, StructMember, Uniform,
    },
    state::{RenderState, SamplerState},
    types::{Stage, Type, UniformType, STAGE_COUNT},
    MODULE_VERSION, NO_SHADER, TARGET_SPIRV, UNKNOWN,
};
use std::{
    error::Error,
    fmt::{Display, Error as FmtError, Formatter},
    fs::File,
    io::{self, Read},
    mem,
    path::Path,
};

/// A loaded module.
#[derive(Debug)]
pub struct Module {
    data: Vec<u8>,
    endian: Endian,
    header: Header,
}

#[derive(Clone, Copy, Debug)]
struct Header {
    version: u32,
    target_id: u32,
    target_version: u32,
    adjustable_bindings: bool,
    pipelines: Table,
    shaders: Table,
    shared_data: VecRef,
}

/// A verified table of fixed-size records.
#[derive(Clone, Copy, Debug, Default)]
struct Table {
    offset: usize,
    count: u32,
    element_size: usize,
}

impl Table {
    fn read(reader: &mut Reader<'_>, element_size: usize, len: usize) -> Option<Table> {
        let vec_ref = reader.vec_ref()?;
        let range = vec_ref.range(element_size, len)?;

        Some(Table {
            offset: range.start,
            count: vec_ref.count,
            element_size,
        })
    }

    #[inline]
    fn element(self, index: u32) -> Option<usize> {
        (index < self.count).then(|| self.offset + index as usize * self.element_size)
    }

    fn elements(self) -> impl Iterator<Item = usize> {
        (0..self.count).map(move |index| self.offset + index as usize * self.element_size)
    }
}

impl Module {
    /// Loads a module by reading exactly `size` bytes from `reader`.
    pub fn from_reader(reader: impl Read, size: usize) -> Result<Module, LoadError> {
        Self::from_reader_in(reader, size, Vec::new())
    }

    /// Loads a module from `reader` into caller-provided storage.
    ///
    /// `buffer` is cleared, and must have a capacity of at least [`Module::size_of`]`(size)`
    /// unless it is empty, in which case it is allocated. Use [`Module::into_buffer`] to get the
    /// storage back.
    pub fn from_reader_in(
        mut reader: impl Read,
        size: usize,
        buffer: Vec<u8>,
    ) -> Result<Module, LoadError> {
        let mut data = Self::prepare_buffer(buffer, size)?;
        data.resize(size, 0);
        reader.read_exact(&mut data)?;

        Self::from_vec_with_endian(data, Endian::NATIVE)
    }

    /// Loads a module by copying `data`.
    #[inline]
    pub fn from_data(data: &[u8]) -> Result<Module, LoadError> {
        Self::from_data_in(data, Vec::new())
    }

    /// Loads a module by copying `data` into caller-provided storage. See
    /// [`Module::from_reader_in`].
    pub fn from_data_in(data: &[u8], buffer: Vec<u8>) -> Result<Module, LoadError> {
        let mut buffer = Self::prepare_buffer(buffer, data.len())?;
        buffer.extend_from_slice(data);

        Self::from_vec_with_endian(buffer, Endian::NATIVE)
    }

    /// Loads a module, taking ownership of `data`.
    #[inline]
    pub fn from_vec(data: Vec<u8>) -> Result<Module, LoadError> {
        Self::from_vec_with_endian(data, Endian::NATIVE)
    }

    /// Loads a module from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Module, LoadError> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();
        let size = usize::try_from(size).map_err(|_| LoadError::InvalidFormat)?;

        Self::from_reader(&mut file, size)
    }

    /// Returns the number of bytes a module loaded from `data_size` bytes occupies, for callers
    /// that keep modules in preallocated storage.
    #[inline]
    pub const fn size_of(data_size: usize) -> usize {
        mem::size_of::<Module>() + data_size
    }

    /// Releases the module and returns its storage.
    #[inline]
    pub fn into_buffer(self) -> Vec<u8> {
        self.data
    }

    fn prepare_buffer(mut buffer: Vec<u8>, size: usize) -> Result<Vec<u8>, LoadError> {
        if buffer.capacity() == 0 {
            return Ok(Vec::with_capacity(size));
        }

        if buffer.capacity() < Self::size_of(size) {
            return Err(LoadError::InvalidArgument);
        }

        buffer.clear();

        Ok(buffer)
    }

    pub(crate) fn from_vec_with_endian(
        mut data: Vec<u8>,
        endian: Endian,
    ) -> Result<Module, LoadError> {
        let header = verify(&data).ok_or(LoadError::InvalidFormat)?;

        if header.target_id == TARGET_SPIRV && endian == Endian::Big {
            for offset in header.shaders.elements() {
                let range = Reader::new(&data, offset)
                    .vec_ref()
                    .and_then(|payload| payload.range(1, data.len()))
                    .ok_or(LoadError::InvalidFormat)?;

                for word in data[range].chunks_exact_mut(4) {
                    word.reverse();
                }
            }
        }

        Ok(Module {
            data,
            endian,
            header,
        })
    }

    /// Returns the version of the format the module was written with.
    #[inline]
    pub fn version(&self) -> u32 {
        self.header.version
    }

    /// Returns the four-character code of the target the module was compiled for.
    #[inline]
    pub fn target_id(&self) -> u32 {
        self.header.target_id
    }

    #[inline]
    pub fn target_version(&self) -> u32 {
        self.header.target_version
    }

    /// Returns whether every pipeline owns its shader payloads, so that they may be rebound in
    /// place.
    #[inline]
    pub fn adjustable_bindings(&self) -> bool {
        self.header.adjustable_bindings
    }

    #[inline]
    pub fn pipeline_count(&self) -> u32 {
        self.header.pipelines.count
    }

    /// Returns the pipeline at `index`. Pipelines are sorted by name.
    pub fn pipeline(&self, index: u32) -> Option<PipelineRef<'_>> {
        let offset = self.header.pipelines.element(index)?;

        PipelineRef::new(self, index, offset)
    }

    /// Looks a pipeline up by name.
    pub fn find_pipeline(&self, name: &str) -> Option<PipelineRef<'_>> {
        let (mut low, mut high) = (0, self.pipeline_count());

        while low < high {
            let middle = low + (high - low) / 2;
            let pipeline = self.pipeline(middle)?;

            match pipeline.name().cmp(name) {
                std::cmp::Ordering::Less => low = middle + 1,
                std::cmp::Ordering::Greater => high = middle,
                std::cmp::Ordering::Equal => return Some(pipeline),
            }
        }

        None
    }

    #[inline]
    pub fn shader_count(&self) -> u32 {
        self.header.shaders.count
    }

    /// Returns a shader payload. SPIR-V payloads are words in host byte order.
    pub fn shader_data(&self, index: u32) -> Option<&[u8]> {
        let range = self.shader_range(index)?;

        Some(&self.data[range])
    }

    fn shader_range(&self, index: u32) -> Option<std::ops::Range<usize>> {
        let offset = self.header.shaders.element(index)?;

        Reader::new(&self.data, offset)
            .vec_ref()?
            .range(1, self.data.len())
    }

    /// Returns the data the backend shares between all pipelines.
    pub fn shared_data(&self) -> &[u8] {
        self.header
            .shared_data
            .range(1, self.data.len())
            .map_or(&[][..], |range| &self.data[range])
    }

    /// Returns whether the shader of `stage` in pipeline `pipeline` uses push constants.
    pub fn shader_uses_push_constants(&self, pipeline: u32, stage: Stage) -> bool {
        self.pipeline(pipeline)
            .is_some_and(|pipeline| pipeline.shader_uses_push_constants(stage))
    }

    /// Changes the descriptor set and binding of a uniform.
    ///
    /// The reflection data is always updated. For SPIR-V modules the decorations of the
    /// uniform's variable are rewritten as well: in `shader_data` if given, which must hold one
    /// copy of the shader per stage (unused stages may be empty), and otherwise in the module's
    /// own payloads, which is only allowed if the module has adjustable bindings.
    ///
    /// On error the module and the copies are unchanged.
    pub fn set_uniform_binding(
        &mut self,
        pipeline: u32,
        uniform: u32,
        descriptor_set: u32,
        binding: u32,
        mut shader_data: Option<&mut [Vec<u8>]>,
    ) -> Result<(), BindingError> {
        let pipeline_ref = self.pipeline(pipeline).ok_or(BindingError::PipelineOutOfRange {
            index: pipeline,
            count: self.pipeline_count(),
        })?;
        let uniform_offset =
            pipeline_ref
                .uniforms
                .element(uniform)
                .ok_or(BindingError::UniformOutOfRange {
                    index: uniform,
                    count: pipeline_ref.uniform_count(),
                })?;

        let mut rewrites = Vec::new();

        for stage in Stage::ALL.iter().copied() {
            let id = pipeline_ref.uniform_id(stage, uniform);

            if id != UNKNOWN {
                rewrites.push((stage, pipeline_ref.shader_index(stage), id));
            }
        }

        let endian = self.endian;

        // Every shader is checked before anything is modified.
        let mut literals = Vec::with_capacity(rewrites.len());

        match &shader_data {
            Some(copies) if copies.len() != STAGE_COUNT => {
                return Err(BindingError::ShaderDataCount {
                    provided: copies.len(),
                });
            }
            Some(copies) => {
                for &(stage, _, id) in &rewrites {
                    let found = binding_literals(&copies[stage.index()], endian, id)
                        .ok_or(BindingError::InvalidShaderData { stage })?;
                    literals.push((stage, 0..0, found));
                }
            }
            None if !self.adjustable_bindings() => return Err(BindingError::NotAdjustable),
            None => {
                for &(stage, shader, id) in &rewrites {
                    let range = self
                        .shader_range(shader)
                        .ok_or(BindingError::InvalidShaderData { stage })?;
                    let found = binding_literals(&self.data[range.clone()], endian, id)
                        .ok_or(BindingError::InvalidShaderData { stage })?;
                    literals.push((stage, range, found));
                }
            }
        }

        let field = uniform_offset + UNIFORM_DESCRIPTOR_SET_OFFSET;
        self.data[field..field + 4].copy_from_slice(&descriptor_set.to_le_bytes());
        let field = uniform_offset + UNIFORM_BINDING_OFFSET;
        self.data[field..field + 4].copy_from_slice(&binding.to_le_bytes());

        for (stage, range, found) in literals {
            let spirv = match &mut shader_data {
                Some(copies) => &mut copies[stage.index()][..],
                None => &mut self.data[range],
            };

            write_binding_literals(spirv, endian, &found, descriptor_set, binding);
        }

        Ok(())
    }

    /// Copies the whole module back into an owned description.
    pub fn to_data(&self) -> ModuleData {
        ModuleData {
            target_id: self.target_id(),
            target_version: self.target_version(),
            adjustable_bindings: self.adjustable_bindings(),
            pipelines: (0..self.pipeline_count())
                .filter_map(|index| self.pipeline(index))
                .map(|pipeline| pipeline.to_data())
                .collect(),
            shaders: (0..self.shader_count())
                .filter_map(|index| self.shader_data(index))
                .map(<[u8]>::to_vec)
                .collect(),
            shared_data: self.shared_data().to_vec(),
        }
    }
}

const SPIRV_MAGIC: u32 = 0x0723_0203;
const OP_DECORATE: u32 = 71;
const DECORATION_BINDING: u32 = 33;
const DECORATION_DESCRIPTOR_SET: u32 = 34;

/// Finds the literals of the `DescriptorSet` and `Binding` decorations of `id` in a SPIR-V
/// module stored as words of the given byte order, as `(byte offset, decoration)` pairs.
/// Returns `None` if the data isn't a SPIR-V module.
fn binding_literals(spirv: &[u8], endian: Endian, id: u32) -> Option<Vec<(usize, u32)>> {
    let word_count = spirv.len() / 4;
    let read = |index: usize| {
        let bytes = &spirv[index * 4..index * 4 + 4];
        endian.read_u32([bytes[0], bytes[1], bytes[2], bytes[3]])
    };

    if spirv.len() % 4 != 0 || word_count < 5 || read(0) != SPIRV_MAGIC {
        return None;
    }

    let mut literals = Vec::new();
    let mut index = 5;

    while index < word_count {
        let word = read(index);
        let (length, opcode) = ((word >> 16) as usize, word & 0xFFFF);

        if length == 0 || index + length > word_count {
            break;
        }

        if opcode == OP_DECORATE && length >= 4 && read(index + 1) == id {
            let decoration = read(index + 2);

            if decoration == DECORATION_DESCRIPTOR_SET || decoration == DECORATION_BINDING {
                literals.push(((index + 3) * 4, decoration));
            }
        }

        index += length;
    }

    Some(literals)
}

fn write_binding_literals(
    spirv: &mut [u8],
    endian: Endian,
    literals: &[(usize, u32)],
    descriptor_set: u32,
    binding: u32,
) {
    for &(offset, decoration) in literals {
        let value = if decoration == DECORATION_DESCRIPTOR_SET {
            descriptor_set
        } else {
            binding
        };

        spirv[offset..offset + 4].copy_from_slice(&endian.write_u32(value));
    }
}

/// A pipeline of a loaded module.
#[derive(Clone, Copy, Debug)]
pub struct PipelineRef<'a> {
    module: &'a Module,
    index: u32,
    offset: usize,
    name: &'a str,
    structs: Table,
    sampler_states: Table,
    uniforms: Table,
    attributes: Table,
    fragment_outputs: Table,
    fragment_inputs: Table,
    shaders: Table,
}

impl<'a> PipelineRef<'a> {
    fn new(module: &'a Module, index: u32, offset: usize) -> Option<Self> {
        let data = &module.data[..];
        let mut reader = Reader::new(data, offset);
        let name = reader.str()?;
        let structs = Table::read(&mut reader, STRUCT_SIZE, data.len())?;
        let sampler_states = Table::read(&mut reader, SAMPLER_STATE_SIZE, data.len())?;
        let uniforms = Table::read(&mut reader, UNIFORM_SIZE, data.len())?;
        let attributes = Table::read(&mut reader, ATTRIBUTE_SIZE, data.len())?;
        let fragment_outputs = Table::read(&mut reader, FRAGMENT_OUTPUT_SIZE, data.len())?;
        let fragment_inputs = Table::read(&mut reader, FRAGMENT_INPUT_GROUP_SIZE, data.len())?;
        let mut reader = Reader::new(data, offset + PIPELINE_SIZE - 8);
        let shaders = Table::read(&mut reader, SHADER_SIZE, data.len())?;

        Some(PipelineRef {
            module,
            index,
            offset,
            name,
            structs,
            sampler_states,
            uniforms,
            attributes,
            fragment_outputs,
            fragment_inputs,
            shaders,
        })
    }

    #[inline]
    fn data(&self) -> &'a [u8] {
        &self.module.data
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn name(&self) -> &'a str {
        self.name
    }

    #[inline]
    pub fn struct_count(&self) -> u32 {
        self.structs.count
    }

    /// Returns a struct of the pipeline's struct table.
    pub fn structure(&self, index: u32) -> Option<StructRef<'a>> {
        StructRef::read(self.data(), self.structs.element(index)?)
    }

    #[inline]
    pub fn sampler_state_count(&self) -> u32 {
        self.sampler_states.count
    }

    pub fn sampler_state(&self, index: u32) -> Option<SamplerState> {
        Reader::new(self.data(), self.sampler_states.element(index)?).sampler_state()
    }

    #[inline]
    pub fn uniform_count(&self) -> u32 {
        self.uniforms.count
    }

    pub fn uniform(&self, index: u32) -> Option<UniformRef<'a>> {
        UniformRef::read(self.data(), self.uniforms.element(index)?)
    }

    /// Returns the index of the uniform called `name`.
    pub fn find_uniform(&self, name: &str) -> Option<u32> {
        (0..self.uniform_count())
            .find(|&index| self.uniform(index).is_some_and(|uniform| uniform.name == name))
    }

    #[inline]
    pub fn attribute_count(&self) -> u32 {
        self.attributes.count
    }

    pub fn attribute(&self, index: u32) -> Option<AttributeRef<'a>> {
        AttributeRef::read(self.data(), self.attributes.element(index)?)
    }

    #[inline]
    pub fn fragment_output_count(&self) -> u32 {
        self.fragment_outputs.count
    }

    pub fn fragment_output(&self, index: u32) -> Option<FragmentOutputRef<'a>> {
        let mut reader = Reader::new(self.data(), self.fragment_outputs.element(index)?);

        Some(FragmentOutputRef {
            name: reader.str()?,
            location: reader.u32()?,
        })
    }

    #[inline]
    pub fn fragment_input_group_count(&self) -> u32 {
        self.fragment_inputs.count
    }

    pub fn fragment_input_group(&self, index: u32) -> Option<FragmentInputGroupRef<'a>> {
        FragmentInputGroupRef::read(self.data(), self.fragment_inputs.element(index)?)
    }

    /// Returns the index of the push constant struct, or [`UNKNOWN`].
    pub fn push_constant_struct(&self) -> u32 {
        self.read_u32(8 + 6 * 8).unwrap_or(UNKNOWN)
    }

    /// Returns the local work group size of the compute stage.
    pub fn compute_local_size(&self) -> [u32; 3] {
        let size = |index: usize| self.read_u32(8 + 6 * 8 + 4 + index * 4).unwrap_or(1);

        [size(0), size(1), size(2)]
    }

    pub fn render_state(&self) -> RenderState {
        Reader::new(self.data(), self.offset + 8 + 6 * 8 + 4 + 12)
            .render_state()
            .unwrap_or_default()
    }

    fn read_u32(&self, field: usize) -> Option<u32> {
        Reader::new(self.data(), self.offset + field).u32()
    }

    fn shader(&self, stage: Stage) -> Option<(u32, bool, Table)> {
        let mut reader = Reader::new(self.data(), self.shaders.element(stage.as_raw())?);
        let shader = reader.u32()?;
        let uses_push_constants = reader.bool()?;
        let uniform_ids = Table::read(&mut reader, 4, self.data().len())?;

        Some((shader, uses_push_constants, uniform_ids))
    }

    /// Returns the index of the shader used for `stage`, or [`NO_SHADER`].
    pub fn shader_index(&self, stage: Stage) -> u32 {
        self.shader(stage).map_or(NO_SHADER, |(shader, _, _)| shader)
    }

    pub fn shader_uses_push_constants(&self, stage: Stage) -> bool {
        self.shader(stage)
            .is_some_and(|(_, uses_push_constants, _)| uses_push_constants)
    }

    /// Returns the SPIR-V id of the variable of `uniform` in the shader of `stage`, or
    /// [`UNKNOWN`] if the stage doesn't use the uniform.
    pub fn uniform_id(&self, stage: Stage, uniform: u32) -> u32 {
        self.shader(stage)
            .and_then(|(_, _, ids)| Reader::new(self.data(), ids.element(uniform)?).u32())
            .unwrap_or(UNKNOWN)
    }

    /// Returns the payload of the shader used for `stage`.
    pub fn shader_data(&self, stage: Stage) -> Option<&'a [u8]> {
        self.module.shader_data(self.shader_index(stage))
    }

    /// Copies the pipeline back into an owned description.
    pub fn to_data(&self) -> PipelineData {
        let mut pipeline = PipelineData::new(self.name);
        pipeline.structs = (0..self.struct_count())
            .filter_map(|index| self.structure(index))
            .map(Struct::from)
            .collect();
        pipeline.sampler_states = (0..self.sampler_state_count())
            .filter_map(|index| self.sampler_state(index))
            .collect();
        pipeline.uniforms = (0..self.uniform_count())
            .filter_map(|index| self.uniform(index))
            .map(Uniform::from)
            .collect();
        pipeline.attributes = (0..self.attribute_count())
            .filter_map(|index| self.attribute(index))
            .map(Attribute::from)
            .collect();
        pipeline.fragment_outputs = (0..self.fragment_output_count())
            .filter_map(|index| self.fragment_output(index))
            .map(FragmentOutput::from)
            .collect();
        pipeline.fragment_inputs = (0..self.fragment_input_group_count())
            .filter_map(|index| self.fragment_input_group(index))
            .map(FragmentInputGroup::from)
            .collect();
        pipeline.push_constant_struct = self.push_constant_struct();
        pipeline.compute_local_size = self.compute_local_size();
        pipeline.render_state = self.render_state();

        for stage in Stage::ALL.iter().copied() {
            if let Some((shader, uses_push_constants, ids)) = self.shader(stage) {
                *pipeline.shader_mut(stage) = ShaderRef {
                    shader,
                    uses_push_constants,
                    uniform_ids: ids
                        .elements()
                        .filter_map(|offset| Reader::new(self.data(), offset).u32())
                        .collect(),
                };
            }
        }

        pipeline
    }
}

/// The dimensions of an array inside a loaded module.
#[derive(Clone, Copy, Debug)]
pub struct ArrayElementsRef<'a> {
    data: &'a [u8],
    table: Table,
}

impl<'a> ArrayElementsRef<'a> {
    #[inline]
    pub fn len(&self) -> u32 {
        self.table.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.count == 0
    }

    pub fn get(&self, index: u32) -> Option<ArrayInfo> {
        let mut reader = Reader::new(self.data, self.table.element(index)?);

        Some(ArrayInfo {
            length: reader.u32()?,
            stride: reader.u32()?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = ArrayInfo> + 'a {
        let elements = *self;

        (0..self.len()).filter_map(move |index| elements.get(index))
    }

    pub fn to_vec(&self) -> ArrayElements {
        self.iter().collect()
    }

    fn read(reader: &mut Reader<'a>, data: &'a [u8]) -> Option<Self> {
        Some(ArrayElementsRef {
            data,
            table: Table::read(reader, ARRAY_INFO_SIZE, data.len())?,
        })
    }
}

/// A struct inside a loaded module.
#[derive(Clone, Copy, Debug)]
pub struct StructRef<'a> {
    pub name: &'a str,
    pub size: u32,
    data: &'a [u8],
    members: Table,
}

impl<'a> StructRef<'a> {
    fn read(data: &'a [u8], offset: usize) -> Option<Self> {
        let mut reader = Reader::new(data, offset);

        Some(StructRef {
            name: reader.str()?,
            size: reader.u32()?,
            data,
            members: Table::read(&mut reader, STRUCT_MEMBER_SIZE, data.len())?,
        })
    }

    #[inline]
    pub fn member_count(&self) -> u32 {
        self.members.count
    }

    pub fn member(&self, index: u32) -> Option<StructMemberRef<'a>> {
        let mut reader = Reader::new(self.data, self.members.element(index)?);

        Some(StructMemberRef {
            name: reader.str()?,
            offset: reader.u32()?,
            size: reader.u32()?,
            ty: Type::from_raw(reader.u32()?)?,
            struct_index: reader.u32()?,
            array_elements: ArrayElementsRef::read(&mut reader, self.data)?,
            row_major: reader.bool()?,
        })
    }
}

impl From<StructRef<'_>> for Struct {
    fn from(val: StructRef<'_>) -> Self {
        Struct {
            name: val.name.to_owned(),
            size: val.size,
            members: (0..val.member_count())
                .filter_map(|index| val.member(index))
                .map(StructMember::from)
                .collect(),
        }
    }
}

/// A struct member inside a loaded module.
#[derive(Clone, Copy, Debug)]
pub struct StructMemberRef<'a> {
    pub name: &'a str,
    pub offset: u32,
    pub size: u32,
    pub ty: Type,
    pub struct_index: u32,
    pub array_elements: ArrayElementsRef<'a>,
    pub row_major: bool,
}

impl From<StructMemberRef<'_>> for StructMember {
    fn from(val: StructMemberRef<'_>) -> Self {
        StructMember {
            name: val.name.to_owned(),
            offset: val.offset,
            size: val.size,
            ty: val.ty,
            struct_index: val.struct_index,
            array_elements: val.array_elements.to_vec(),
            row_major: val.row_major,
        }
    }
}

/// A uniform inside a loaded module.
#[derive(Clone, Copy, Debug)]
pub struct UniformRef<'a> {
    pub name: &'a str,
    pub uniform_type: UniformType,
    pub ty: Type,
    pub struct_index: u32,
    pub array_elements: ArrayElementsRef<'a>,
    pub descriptor_set: u32,
    pub binding: u32,
    pub input_attachment_index: u32,
    pub sampler_index: u32,
}

impl<'a> UniformRef<'a> {
    fn read(data: &'a [u8], offset: usize) -> Option<Self> {
        let mut reader = Reader::new(data, offset);

        Some(UniformRef {
            name: reader.str()?,
            uniform_type: UniformType::from_raw(reader.u32()?)?,
            ty: Type::from_raw(reader.u32()?)?,
            struct_index: reader.u32()?,
            array_elements: ArrayElementsRef::read(&mut reader, data)?,
            descriptor_set: reader.u32()?,
            binding: reader.u32()?,
            input_attachment_index: reader.u32()?,
            sampler_index: reader.u32()?,
        })
    }
}

impl From<UniformRef<'_>> for Uniform {
    fn from(val: UniformRef<'_>) -> Self {
        Uniform {
            name: val.name.to_owned(),
            uniform_type: val.uniform_type,
            ty: val.ty,
            struct_index: val.struct_index,
            array_elements: val.array_elements.to_vec(),
            descriptor_set: val.descriptor_set,
            binding: val.binding,
            input_attachment_index: val.input_attachment_index,
            sampler_index: val.sampler_index,
        }
    }
}

/// A vertex attribute inside a loaded module.
#[derive(Clone, Copy, Debug)]
pub struct AttributeRef<'a> {
    pub name: &'a str,
    pub ty: Type,
    pub array_elements: ArrayElementsRef<'a>,
    pub location: u32,
    pub component: u32,
}

impl<'a> AttributeRef<'a> {
    fn read(data: &'a [u8], offset: usize) -> Option<Self> {
        let mut reader = Reader::new(data, offset);

        Some(AttributeRef {
            name: reader.str()?,
            ty: Type::from_raw(reader.u32()?)?,
            array_elements: ArrayElementsRef::read(&mut reader, data)?,
            location: reader.u32()?,
            component: reader.u32()?,
        })
    }
}

impl From<AttributeRef<'_>> for Attribute {
    fn from(val: AttributeRef<'_>) -> Self {
        Attribute {
            name: val.name.to_owned(),
            ty: val.ty,
            array_elements: val.array_elements.to_vec(),
            location: val.location,
            component: val.component,
        }
    }
}

/// A fragment output inside a loaded module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FragmentOutputRef<'a> {
    pub name: &'a str,
    pub location: u32,
}

impl From<FragmentOutputRef<'_>> for FragmentOutput {
    fn from(val: FragmentOutputRef<'_>) -> Self {
        FragmentOutput {
            name: val.name.to_owned(),
            location: val.location,
        }
    }
}

/// A fragment-input group inside a loaded module.
#[derive(Clone, Copy, Debug)]
pub struct FragmentInputGroupRef<'a> {
    pub type_name: &'a str,
    pub variable_name: &'a str,
    data: &'a [u8],
    inputs: Table,
}

impl<'a> FragmentInputGroupRef<'a> {
    fn read(data: &'a [u8], offset: usize) -> Option<Self> {
        let mut reader = Reader::new(data, offset);

        Some(FragmentInputGroupRef {
            type_name: reader.str()?,
            variable_name: reader.str()?,
            data,
            inputs: Table::read(&mut reader, FRAGMENT_INPUT_SIZE, data.len())?,
        })
    }

    #[inline]
    pub fn input_count(&self) -> u32 {
        self.inputs.count
    }

    pub fn input(&self, index: u32) -> Option<FragmentInputRef<'a>> {
        let mut reader = Reader::new(self.data, self.inputs.element(index)?);

        Some(FragmentInputRef {
            name: reader.str()?,
            location: reader.u32()?,
            fragment_group: reader.u32()?,
        })
    }
}

impl From<FragmentInputGroupRef<'_>> for FragmentInputGroup {
    fn from(val: FragmentInputGroupRef<'_>) -> Self {
        FragmentInputGroup {
            type_name: val.type_name.to_owned(),
            variable_name: val.variable_name.to_owned(),
            inputs: (0..val.input_count())
                .filter_map(|index| val.input(index))
                .map(|input| FragmentInput {
                    name: input.name.to_owned(),
                    location: input.location,
                    fragment_group: input.fragment_group,
                })
                .collect(),
        }
    }
}

/// A value of a fragment-input group inside a loaded module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FragmentInputRef<'a> {
    pub name: &'a str,
    pub location: u32,
    pub fragment_group: u32,
}

/// Checks the whole buffer, so that accessors never fail afterwards.
fn verify(data: &[u8]) -> Option<Header> {
    if data.len() < HEADER_SIZE {
        return None;
    }

    let mut reader = Reader::new(data, 0);

    if reader.u32()? != MAGIC {
        return None;
    }

    let version = reader.u32()?;

    if version == 0 || version > MODULE_VERSION {
        return None;
    }

    let target_id = reader.u32()?;
    let target_version = reader.u32()?;
    let adjustable_bindings = reader.bool()?;
    let pipelines = Table::read(&mut reader, PIPELINE_SIZE, data.len())?;
    let shaders = Table::read(&mut reader, SHADER_DATA_SIZE, data.len())?;
    let shared_data = reader.vec_ref()?;
    shared_data.range(1, data.len())?;

    if reader.u32()? as usize != data.len() {
        return None;
    }

    for offset in shaders.elements() {
        let payload = Reader::new(data, offset).vec_ref()?;

        let range = payload.range(1, data.len())?;

        // SPIR-V payloads are swapped word by word on big-endian hosts.
        if target_id == TARGET_SPIRV && (range.start % 4 != 0 || range.len() % 4 != 0) {
            return None;
        }
    }

    let mut previous_name: Option<&str> = None;

    for offset in pipelines.elements() {
        let name = verify_pipeline(data, offset, shaders.count)?;

        if previous_name.is_some_and(|previous| previous >= name) {
            return None;
        }

        previous_name = Some(name);
    }

    Some(Header {
        version,
        target_id,
        target_version,
        adjustable_bindings,
        pipelines,
        shaders,
        shared_data,
    })
}

fn verify_array_elements(reader: &mut Reader<'_>, data: &[u8]) -> Option<()> {
    Table::read(reader, ARRAY_INFO_SIZE, data.len()).map(|_| ())
}

fn verify_pipeline(data: &[u8], offset: usize, shader_count: u32) -> Option<&str> {
    let mut reader = Reader::new(data, offset);
    let name = reader.str()?;
    let structs = Table::read(&mut reader, STRUCT_SIZE, data.len())?;
    let sampler_states = Table::read(&mut reader, SAMPLER_STATE_SIZE, data.len())?;
    let uniforms = Table::read(&mut reader, UNIFORM_SIZE, data.len())?;
    let attributes = Table::read(&mut reader, ATTRIBUTE_SIZE, data.len())?;
    let fragment_outputs = Table::read(&mut reader, FRAGMENT_OUTPUT_SIZE, data.len())?;
    let fragment_inputs = Table::read(&mut reader, FRAGMENT_INPUT_GROUP_SIZE, data.len())?;
    let push_constant_struct = reader.u32()?;

    for _ in 0..3 {
        reader.u32()?;
    }

    reader.render_state()?;
    let shaders = Table::read(&mut reader, SHADER_SIZE, data.len())?;

    for (struct_index, struct_offset) in structs.elements().enumerate() {
        let structure = StructRef::read(data, struct_offset)?;

        for member in 0..structure.member_count() {
            let member = structure.member(member)?;

            if member.ty == Type::Struct && member.struct_index >= struct_index as u32 {
                return None;
            }
        }
    }

    for offset in sampler_states.elements() {
        Reader::new(data, offset).sampler_state()?;
    }

    for offset in uniforms.elements() {
        let uniform = UniformRef::read(data, offset)?;

        if uniform.uniform_type.is_block() && uniform.ty != Type::Struct {
            return None;
        }

        if uniform.ty == Type::Struct && uniform.struct_index >= structs.count {
            return None;
        }

        if uniform.sampler_index != UNKNOWN && uniform.sampler_index >= sampler_states.count {
            return None;
        }
    }

    for offset in attributes.elements() {
        let mut reader = Reader::new(data, offset);
        reader.str()?;
        Type::from_raw(reader.u32()?)?;
        verify_array_elements(&mut reader, data)?;
    }

    for offset in fragment_outputs.elements() {
        Reader::new(data, offset).str()?;
    }

    for offset in fragment_inputs.elements() {
        let group = FragmentInputGroupRef::read(data, offset)?;

        for input in 0..group.input_count() {
            group.input(input)?;
        }
    }

    if push_constant_struct != UNKNOWN && push_constant_struct >= structs.count {
        return None;
    }

    if shaders.count as usize != STAGE_COUNT {
        return None;
    }

    for offset in shaders.elements() {
        let mut reader = Reader::new(data, offset);
        let shader = reader.u32()?;
        reader.bool()?;
        let uniform_ids = Table::read(&mut reader, 4, data.len())?;

        if shader != NO_SHADER && shader >= shader_count {
            return None;
        }

        if uniform_ids.count != 0 && uniform_ids.count != uniforms.count {
            return None;
        }
    }

    Some(name)
}

/// Error that can happen when loading a module.
#[derive(Debug)]
pub enum LoadError {
    /// The data isn't a valid module, is truncated, or was written by a newer version.
    InvalidFormat,

    /// The storage passed in is too small to hold the module.
    InvalidArgument,

    /// The file doesn't exist.
    NotFound,

    /// Access to the file was denied.
    PermissionDenied,

    /// Reading the data failed.
    Io(io::Error),
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        let value = match self {
            Self::InvalidFormat => "the data is not a valid shader module",
            Self::InvalidArgument => "the storage provided for the module is too small",
            Self::NotFound => "the module file does not exist",
            Self::PermissionDenied => "permission to read the module file was denied",
            Self::Io(_) => "an I/O error occurred while reading the module",
        };

        f.write_str(value)
    }
}

impl From<io::Error> for LoadError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err),
        }
    }
}

/// Error that can happen when changing the binding of a uniform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindingError {
    PipelineOutOfRange { index: u32, count: u32 },
    UniformOutOfRange { index: u32, count: u32 },

    /// No shader copies were given, and the module's own payloads may not be modified because
    /// they are shared between pipelines.
    NotAdjustable,

    /// The number of shader copies isn't one per stage.
    ShaderDataCount { provided: usize },

    /// The shader of a stage that uses the uniform isn't a SPIR-V module.
    InvalidShaderData { stage: Stage },
}

impl Error for BindingError {}

impl Display for BindingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::PipelineOutOfRange { index, count } => write!(
                f,
                "pipeline index {} is out of range for a module with {} pipelines",
                index, count,
            ),
            Self::UniformOutOfRange { index, count } => write!(
                f,
                "uniform index {} is out of range for a pipeline with {} uniforms",
                index, count,
            ),
            Self::NotAdjustable => f.write_str(
                "the module was not built with adjustable bindings and no shader copies were \
                provided",
            ),
            Self::ShaderDataCount { provided } => write!(
                f,
                "{} shader copies were provided, but one per stage ({}) is required",
                provided, STAGE_COUNT,
            ),
            Self::InvalidShaderData { stage } => write!(
                f,
                "the {} shader isn't a SPIR-V module whose bindings can be rewritten",
                stage.name(),
            ),
        }
    }
}
