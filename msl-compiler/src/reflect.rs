// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Extraction of the resources and interface of one compiled stage.

use crate::spirv::{
    built_in, decoration, dim, execution_mode, op, storage_class, Instruction, Spirv,
};
use foldhash::{HashMap, HashMapExt, HashSet, HashSetExt};
use msl_module::{
    ArrayElements, ArrayInfo, Stage, Struct, StructMember, Type, Uniform, UniformType, UNKNOWN,
};
use std::{
    error::Error,
    fmt::{Display, Error as FmtError, Formatter},
};

/// A uniform of a stage, with the id of its variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReflectedUniform {
    /// The struct index refers to [`StageReflection::structs`].
    pub uniform: Uniform,
    pub variable_id: u32,
}

/// An input or output variable of a stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceVariable {
    /// The variable name, or the block name for unnamed interface blocks.
    pub name: String,
    pub variable_id: u32,
    pub ty: Type,
    /// The struct name for interface blocks.
    pub struct_name: Option<String>,
    /// Excludes the per-vertex array of tessellation and geometry stages.
    pub array_elements: ArrayElements,
    pub location: u32,
    pub component: u32,
    pub patch: bool,
    /// The number of locations the variable occupies.
    pub location_count: u32,
}

/// Everything extracted from one stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageReflection {
    /// `(execution model, name)` of every entry point.
    pub entry_points: Vec<(u32, String)>,
    /// Structs of the stage. Members only refer to structs with a lower index.
    pub structs: Vec<Struct>,
    pub uniforms: Vec<ReflectedUniform>,
    pub inputs: Vec<InterfaceVariable>,
    pub outputs: Vec<InterfaceVariable>,
    /// Index of the push constant struct, or [`UNKNOWN`].
    pub push_constant_struct: u32,
    /// Whether a function reads the push constants.
    pub uses_push_constants: bool,
    pub local_size: [u32; 3],
    pub clip_distance_count: u32,
    pub cull_distance_count: u32,
    pub early_fragment_tests: bool,
}

/// Error that can happen when reflecting a stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReflectError {
    /// An id is used as a type but no type declares it.
    MissingType(u32),
    /// A type that can't be described in a module.
    UnsupportedType(String),
}

impl Error for ReflectError {}

impl Display for ReflectError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            ReflectError::MissingType(id) => write!(f, "SPIR-V id {} is not a type", id),
            ReflectError::UnsupportedType(name) => write!(f, "unsupported type for '{}'", name),
        }
    }
}

/// Extracts the resources and interface of a stage.
pub fn reflect_stage(spirv: &Spirv, stage: Stage) -> Result<StageReflection, ReflectError> {
    Reflector::new(spirv).reflect(stage)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Scalar {
    Float,
    Double,
    Int,
    UInt,
    Bool,
}

struct ResolvedType {
    ty: Type,
    struct_index: u32,
    array_elements: ArrayElements,
}

struct Reflector<'a> {
    names: HashMap<u32, String>,
    member_names: HashMap<(u32, u32), String>,
    /// First literal of each decoration, 0 for decorations without literals.
    decorations: HashMap<(u32, u32), u32>,
    member_decorations: HashMap<(u32, u32, u32), u32>,
    types: HashMap<u32, Instruction<'a>>,
    constants: HashMap<u32, u32>,
    variables: Vec<(u32, u32, u32)>,
    /// Every operand of the instructions in function bodies.
    referenced: HashSet<u32>,
    entry_points: Vec<(u32, String)>,
    execution_modes: Vec<(u32, &'a [u32])>,
    structs: Vec<Struct>,
    struct_indices: HashMap<u32, u32>,
}

impl<'a> Reflector<'a> {
    fn new(spirv: &'a Spirv) -> Self {
        let mut reflector = Reflector {
            names: HashMap::new(),
            member_names: HashMap::new(),
            decorations: HashMap::new(),
            member_decorations: HashMap::new(),
            types: HashMap::new(),
            constants: HashMap::new(),
            variables: Vec::new(),
            referenced: HashSet::new(),
            entry_points: Vec::new(),
            execution_modes: Vec::new(),
            structs: Vec::new(),
            struct_indices: HashMap::new(),
        };

        for instruction in spirv.decoded() {
            match instruction {
                Instruction::Name { target_id, name } => {
                    reflector.names.insert(target_id, name);
                }
                Instruction::MemberName {
                    target_id,
                    member,
                    name,
                } => {
                    reflector.member_names.insert((target_id, member), name);
                }
                Instruction::EntryPoint {
                    execution_model,
                    name,
                    ..
                } => reflector.entry_points.push((execution_model, name)),
                Instruction::ExecutionMode { mode, literals, .. } => {
                    reflector.execution_modes.push((mode, literals));
                }
                Instruction::Decorate {
                    target_id,
                    decoration,
                    params,
                } => {
                    let value = params.first().copied().unwrap_or(0);
                    reflector.decorations.insert((target_id, decoration), value);
                }
                Instruction::MemberDecorate {
                    target_id,
                    member,
                    decoration,
                    params,
                } => {
                    let value = params.first().copied().unwrap_or(0);
                    reflector
                        .member_decorations
                        .insert((target_id, member, decoration), value);
                }
                Instruction::Constant {
                    result_id, data, ..
                }
                | Instruction::SpecConstant {
                    result_id, data, ..
                } => {
                    if let Some(&value) = data.first() {
                        reflector.constants.insert(result_id, value);
                    }
                }
                Instruction::Variable {
                    result_type_id,
                    result_id,
                    storage_class,
                } => reflector
                    .variables
                    .push((result_type_id, result_id, storage_class)),
                Instruction::TypeVoid { result_id }
                | Instruction::TypeBool { result_id }
                | Instruction::TypeInt { result_id, .. }
                | Instruction::TypeFloat { result_id, .. }
                | Instruction::TypeVector { result_id, .. }
                | Instruction::TypeMatrix { result_id, .. }
                | Instruction::TypeImage { result_id, .. }
                | Instruction::TypeSampler { result_id }
                | Instruction::TypeSampledImage { result_id, .. }
                | Instruction::TypeArray { result_id, .. }
                | Instruction::TypeRuntimeArray { result_id, .. }
                | Instruction::TypeStruct { result_id, .. }
                | Instruction::TypePointer { result_id, .. } => {
                    reflector.types.insert(result_id, instruction);
                }
                Instruction::Unknown(_) => {}
            }
        }

        let mut in_function = false;

        for instruction in spirv.instructions() {
            in_function |= instruction.opcode == op::FUNCTION;

            if in_function {
                reflector.referenced.extend(instruction.operands);
            }
        }

        reflector
    }

    fn reflect(mut self, stage: Stage) -> Result<StageReflection, ReflectError> {
        let mut uniforms = Vec::new();
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut push_constant_struct = UNKNOWN;
        let mut uses_push_constants = false;
        let mut clip_distance_count = 0;
        let mut cull_distance_count = 0;

        for (pointer_id, variable_id, storage) in self.variables.clone() {
            let type_id = self.pointee(pointer_id)?;

            match storage {
                storage_class::UNIFORM_CONSTANT
                | storage_class::UNIFORM
                | storage_class::STORAGE_BUFFER
                | storage_class::PUSH_CONSTANT => {
                    if let Some(uniform) = self.uniform(variable_id, type_id, storage)? {
                        if uniform.uniform.uniform_type == UniformType::PushConstant {
                            push_constant_struct = uniform.uniform.struct_index;
                            uses_push_constants |= self.referenced.contains(&variable_id);
                        }

                        uniforms.push(uniform);
                    }
                }
                storage_class::INPUT | storage_class::OUTPUT => {
                    let is_output = storage == storage_class::OUTPUT;

                    if self.built_in(variable_id, type_id).is_some() {
                        if is_output {
                            let clip = built_in::CLIP_DISTANCE;
                            let cull = built_in::CULL_DISTANCE;

                            if let Some(count) = self.built_in_length(variable_id, type_id, clip) {
                                clip_distance_count = count;
                            }
                            if let Some(count) = self.built_in_length(variable_id, type_id, cull) {
                                cull_distance_count = count;
                            }
                        }

                        continue;
                    }

                    let per_vertex = match stage {
                        Stage::TessellationControl => true,
                        Stage::TessellationEvaluation | Stage::Geometry => !is_output,
                        _ => false,
                    };
                    let variable = self.interface_variable(variable_id, type_id, per_vertex)?;

                    if is_output {
                        outputs.push(variable);
                    } else {
                        inputs.push(variable);
                    }
                }
                _ => {}
            }
        }

        let mut local_size = [1, 1, 1];
        let mut early_fragment_tests = false;

        for &(mode, literals) in &self.execution_modes {
            match (mode, literals) {
                (execution_mode::LOCAL_SIZE, [x, y, z, ..]) => local_size = [*x, *y, *z],
                (execution_mode::EARLY_FRAGMENT_TESTS, _) => early_fragment_tests = true,
                _ => {}
            }
        }

        Ok(StageReflection {
            entry_points: self.entry_points,
            structs: self.structs,
            uses_push_constants,
            uniforms,
            inputs,
            outputs,
            push_constant_struct,
            local_size,
            clip_distance_count,
            cull_distance_count,
            early_fragment_tests,
        })
    }

    fn name(&self, id: u32) -> String {
        self.names.get(&id).cloned().unwrap_or_default()
    }

    fn decoration(&self, id: u32, decoration: u32) -> Option<u32> {
        self.decorations.get(&(id, decoration)).copied()
    }

    fn ty(&self, id: u32) -> Result<&Instruction<'a>, ReflectError> {
        self.types.get(&id).ok_or(ReflectError::MissingType(id))
    }

    fn pointee(&self, pointer_id: u32) -> Result<u32, ReflectError> {
        match self.ty(pointer_id)? {
            Instruction::TypePointer { type_id, .. } => Ok(*type_id),
            _ => Err(ReflectError::MissingType(pointer_id)),
        }
    }

    /// Returns the element type of an array type.
    fn array_element(&self, type_id: u32) -> Option<u32> {
        match self.types.get(&type_id)? {
            Instruction::TypeArray { type_id, .. } | Instruction::TypeRuntimeArray { type_id, .. } => {
                Some(*type_id)
            }
            _ => None,
        }
    }

    /// Returns the built-in of a variable, or of the members of its block.
    fn built_in(&self, variable_id: u32, type_id: u32) -> Option<u32> {
        if let Some(built_in) = self.decoration(variable_id, decoration::BUILT_IN) {
            return Some(built_in);
        }

        let mut type_id = type_id;
        while let Some(element) = self.array_element(type_id) {
            type_id = element;
        }

        match self.types.get(&type_id)? {
            Instruction::TypeStruct { .. } => self
                .member_decorations
                .get(&(type_id, 0, decoration::BUILT_IN))
                .copied(),
            _ => None,
        }
    }

    /// Returns the array length of a built-in array variable or block member.
    fn built_in_length(&self, variable_id: u32, type_id: u32, built_in: u32) -> Option<u32> {
        if self.decoration(variable_id, decoration::BUILT_IN) == Some(built_in) {
            return match self.types.get(&type_id) {
                Some(Instruction::TypeArray { length_id, .. }) => {
                    self.constants.get(length_id).copied()
                }
                _ => None,
            };
        }

        let mut type_id = type_id;

        // gl_PerVertex, possibly arrayed.
        while let Some(element) = self.array_element(type_id) {
            type_id = element;
        }

        let Some(Instruction::TypeStruct { member_types, .. }) = self.types.get(&type_id) else {
            return None;
        };

        member_types
            .iter()
            .enumerate()
            .find(|&(member, _)| {
                self.member_decorations
                    .get(&(type_id, member as u32, decoration::BUILT_IN))
                    == Some(&built_in)
            })
            .and_then(|(_, member_type)| match self.types.get(member_type) {
                Some(Instruction::TypeArray { length_id, .. }) => {
                    self.constants.get(length_id).copied()
                }
                _ => None,
            })
    }

    fn uniform(
        &mut self,
        variable_id: u32,
        type_id: u32,
        storage: u32,
    ) -> Result<Option<ReflectedUniform>, ReflectError> {
        let variable_name = self.name(variable_id);

        let mut base_id = type_id;
        while let Some(element) = self.array_element(base_id) {
            base_id = element;
        }

        if matches!(self.ty(base_id)?, Instruction::TypeSampler { .. }) {
            // Separate samplers are described by sampler states instead.
            return Ok(None);
        }

        let resolved = self.resolve(type_id, &variable_name)?;
        let is_struct = resolved.ty == Type::Struct;

        let uniform_type = match storage {
            storage_class::PUSH_CONSTANT => UniformType::PushConstant,
            storage_class::STORAGE_BUFFER => UniformType::BlockBuffer,
            storage_class::UNIFORM => {
                if self.decoration(base_id, decoration::BUFFER_BLOCK).is_some() {
                    UniformType::BlockBuffer
                } else {
                    UniformType::Block
                }
            }
            _ if resolved.ty.is_sampler() => UniformType::SampledImage,
            _ if resolved.ty.is_image() => UniformType::Image,
            _ if resolved.ty.is_subpass_input() => UniformType::SubpassInput,
            _ => UniformType::Uniform,
        };

        if uniform_type.is_block() && !is_struct {
            return Err(ReflectError::UnsupportedType(variable_name));
        }

        let name = if uniform_type.is_block() {
            self.name(base_id)
        } else {
            variable_name
        };

        let (descriptor_set, binding) = if uniform_type.has_descriptor() {
            (
                self.decoration(variable_id, decoration::DESCRIPTOR_SET)
                    .unwrap_or(0),
                self.decoration(variable_id, decoration::BINDING)
                    .unwrap_or(UNKNOWN),
            )
        } else {
            (UNKNOWN, UNKNOWN)
        };

        Ok(Some(ReflectedUniform {
            uniform: Uniform {
                name,
                uniform_type,
                ty: resolved.ty,
                struct_index: resolved.struct_index,
                array_elements: resolved.array_elements,
                descriptor_set,
                binding,
                input_attachment_index: self
                    .decoration(variable_id, decoration::INPUT_ATTACHMENT_INDEX)
                    .unwrap_or(UNKNOWN),
                sampler_index: UNKNOWN,
            },
            variable_id,
        }))
    }

    fn interface_variable(
        &mut self,
        variable_id: u32,
        type_id: u32,
        per_vertex: bool,
    ) -> Result<InterfaceVariable, ReflectError> {
        let patch = self.decoration(variable_id, decoration::PATCH).is_some();

        let type_id = match self.array_element(type_id) {
            Some(element) if per_vertex && !patch => element,
            _ => type_id,
        };

        let variable_name = self.name(variable_id);
        let resolved = self.resolve(type_id, &variable_name)?;

        let mut base_id = type_id;
        while let Some(element) = self.array_element(base_id) {
            base_id = element;
        }

        let struct_name = (resolved.ty == Type::Struct).then(|| self.name(base_id));
        let name = match (&struct_name, variable_name.is_empty()) {
            (Some(struct_name), true) => struct_name.clone(),
            _ => variable_name,
        };

        Ok(InterfaceVariable {
            name,
            variable_id,
            ty: resolved.ty,
            struct_name,
            array_elements: resolved.array_elements,
            location: self
                .decoration(variable_id, decoration::LOCATION)
                .unwrap_or(UNKNOWN),
            component: self
                .decoration(variable_id, decoration::COMPONENT)
                .unwrap_or(0),
            patch,
            location_count: self.location_count(type_id),
        })
    }

    fn location_count(&self, type_id: u32) -> u32 {
        match self.types.get(&type_id) {
            Some(Instruction::TypeArray {
                type_id, length_id, ..
            }) => {
                let length = self.constants.get(length_id).copied().unwrap_or(1);
                length.saturating_mul(self.location_count(*type_id))
            }
            Some(Instruction::TypeRuntimeArray { type_id, .. }) => self.location_count(*type_id),
            Some(Instruction::TypeVector {
                component_id,
                count,
                ..
            }) => {
                let wide = matches!(
                    self.types.get(component_id),
                    Some(Instruction::TypeFloat { width: 64, .. })
                );
                if wide && *count > 2 {
                    2
                } else {
                    1
                }
            }
            Some(Instruction::TypeMatrix {
                column_type_id,
                column_count,
                ..
            }) => column_count.saturating_mul(self.location_count(*column_type_id)),
            Some(Instruction::TypeStruct { member_types, .. }) => member_types
                .iter()
                .map(|member| self.location_count(*member))
                .sum(),
            _ => 1,
        }
    }

    fn resolve(&mut self, type_id: u32, name: &str) -> Result<ResolvedType, ReflectError> {
        let mut array_elements = ArrayElements::new();
        let mut type_id = type_id;

        loop {
            match self.ty(type_id)? {
                Instruction::TypeArray {
                    type_id: element,
                    length_id,
                    ..
                } => {
                    let element = *element;
                    array_elements.push(ArrayInfo {
                        length: self.constants.get(length_id).copied().unwrap_or(UNKNOWN),
                        stride: self.decoration(type_id, decoration::ARRAY_STRIDE).unwrap_or(UNKNOWN),
                    });
                    type_id = element;
                }
                Instruction::TypeRuntimeArray {
                    type_id: element, ..
                } => {
                    let element = *element;
                    array_elements.push(ArrayInfo {
                        length: UNKNOWN,
                        stride: self.decoration(type_id, decoration::ARRAY_STRIDE).unwrap_or(UNKNOWN),
                    });
                    type_id = element;
                }
                _ => break,
            }
        }

        let (ty, struct_index) = if matches!(self.ty(type_id)?, Instruction::TypeStruct { .. }) {
            (Type::Struct, self.intern_struct(type_id)?)
        } else {
            let ty = self
                .base_type(type_id)?
                .ok_or_else(|| ReflectError::UnsupportedType(name.to_owned()))?;

            (ty, UNKNOWN)
        };

        Ok(ResolvedType {
            ty,
            struct_index,
            array_elements,
        })
    }

    fn scalar(&self, type_id: u32) -> Result<Option<Scalar>, ReflectError> {
        Ok(match self.ty(type_id)? {
            Instruction::TypeBool { .. } => Some(Scalar::Bool),
            Instruction::TypeInt {
                width: 32,
                signedness: true,
                ..
            } => Some(Scalar::Int),
            Instruction::TypeInt {
                width: 32,
                signedness: false,
                ..
            } => Some(Scalar::UInt),
            Instruction::TypeFloat { width: 32, .. } => Some(Scalar::Float),
            Instruction::TypeFloat { width: 64, .. } => Some(Scalar::Double),
            _ => None,
        })
    }

    /// Maps a non-struct, non-array type. Returns `None` for types a module can't describe.
    fn base_type(&self, type_id: u32) -> Result<Option<Type>, ReflectError> {
        Ok(match self.ty(type_id)? {
            Instruction::TypeVector {
                component_id,
                count,
                ..
            } => self
                .scalar(*component_id)?
                .and_then(|scalar| vector_type(scalar, *count)),
            Instruction::TypeMatrix {
                column_type_id,
                column_count,
                ..
            } => match self.ty(*column_type_id)? {
                Instruction::TypeVector {
                    component_id,
                    count,
                    ..
                } => self
                    .scalar(*component_id)?
                    .and_then(|scalar| matrix_type(scalar, *column_count, *count)),
                _ => None,
            },
            Instruction::TypeImage { .. } => self.image_type(type_id, false)?,
            Instruction::TypeSampledImage { image_type_id, .. } => {
                self.image_type(*image_type_id, true)?
            }
            _ => self
                .scalar(type_id)?
                .and_then(|scalar| vector_type(scalar, 1)),
        })
    }

    fn image_type(&self, image_type_id: u32, combined: bool) -> Result<Option<Type>, ReflectError> {
        let &Instruction::TypeImage {
            sampled_type_id,
            dim,
            depth,
            arrayed,
            ms,
            sampled,
            ..
        } = self.ty(image_type_id)?
        else {
            return Ok(None);
        };

        let Some(scalar) = self.scalar(sampled_type_id)? else {
            return Ok(None);
        };

        let image = ImageShape {
            scalar,
            dim,
            shadow: depth == 1,
            arrayed,
            ms,
        };

        Ok(if dim == dim::SUBPASS_DATA {
            subpass_type(&image)
        } else if sampled == 2 && !combined {
            storage_image_type(&image)
        } else {
            sampler_type(&image)
        })
    }

    /// Adds a struct and the structs of its members to the stage's table.
    fn intern_struct(&mut self, struct_id: u32) -> Result<u32, ReflectError> {
        if let Some(&index) = self.struct_indices.get(&struct_id) {
            return Ok(index);
        }

        let member_types = match self.ty(struct_id)? {
            Instruction::TypeStruct { member_types, .. } => member_types.to_vec(),
            _ => return Err(ReflectError::MissingType(struct_id)),
        };

        let mut members = Vec::with_capacity(member_types.len());

        for (index, &member_type) in member_types.iter().enumerate() {
            let index = index as u32;
            let name = self
                .member_names
                .get(&(struct_id, index))
                .cloned()
                .unwrap_or_default();
            let resolved = self.resolve(member_type, &name)?;
            let row_major = self
                .member_decorations
                .contains_key(&(struct_id, index, decoration::ROW_MAJOR));
            let matrix_stride = self
                .member_decorations
                .get(&(struct_id, index, decoration::MATRIX_STRIDE))
                .copied();

            members.push(StructMember {
                offset: self
                    .member_decorations
                    .get(&(struct_id, index, decoration::OFFSET))
                    .copied()
                    .unwrap_or(UNKNOWN),
                size: self.size_of(member_type, matrix_stride, row_major),
                name,
                ty: resolved.ty,
                struct_index: resolved.struct_index,
                array_elements: resolved.array_elements,
                row_major,
            });
        }

        let size = match members.last() {
            Some(last) if last.offset != UNKNOWN => last.offset.saturating_add(last.size),
            _ => members.iter().map(|member| member.size).sum(),
        };

        let index = self.structs.len() as u32;
        self.structs.push(Struct {
            name: self.name(struct_id),
            size,
            members,
        });
        self.struct_indices.insert(struct_id, index);

        Ok(index)
    }

    /// Returns the size in bytes of a struct member. Runtime arrays have no size.
    fn size_of(&self, type_id: u32, matrix_stride: Option<u32>, row_major: bool) -> u32 {
        match self.types.get(&type_id) {
            Some(Instruction::TypeArray {
                type_id: element,
                length_id,
                ..
            }) => {
                let length = self.constants.get(length_id).copied().unwrap_or(0);
                let stride = match self.decoration(type_id, decoration::ARRAY_STRIDE) {
                    Some(stride) => stride,
                    None => self.size_of(*element, matrix_stride, row_major),
                };

                length.saturating_mul(stride)
            }
            Some(Instruction::TypeRuntimeArray { .. }) => 0,
            Some(Instruction::TypeBool { .. }) => 4,
            Some(Instruction::TypeInt { width, .. } | Instruction::TypeFloat { width, .. }) => {
                width / 8
            }
            Some(Instruction::TypeVector {
                component_id,
                count,
                ..
            }) => count.saturating_mul(self.size_of(*component_id, None, false)),
            Some(Instruction::TypeMatrix {
                column_type_id,
                column_count,
                ..
            }) => {
                let rows = match self.types.get(column_type_id) {
                    Some(Instruction::TypeVector { count, .. }) => *count,
                    _ => 1,
                };

                match matrix_stride {
                    Some(stride) if row_major => stride.saturating_mul(rows),
                    Some(stride) => stride.saturating_mul(*column_count),
                    None => column_count.saturating_mul(self.size_of(*column_type_id, None, false)),
                }
            }
            Some(Instruction::TypeStruct { .. }) => self
                .struct_indices
                .get(&type_id)
                .and_then(|&index| self.structs.get(index as usize))
                .map_or(0, |structure| structure.size),
            _ => 0,
        }
    }
}

fn vector_type(scalar: Scalar, count: u32) -> Option<Type> {
    const TYPES: [(Scalar, [Type; 4]); 5] = [
        (Scalar::Float, [Type::Float, Type::Vec2, Type::Vec3, Type::Vec4]),
        (Scalar::Double, [Type::Double, Type::DVec2, Type::DVec3, Type::DVec4]),
        (Scalar::Int, [Type::Int, Type::IVec2, Type::IVec3, Type::IVec4]),
        (Scalar::UInt, [Type::UInt, Type::UVec2, Type::UVec3, Type::UVec4]),
        (Scalar::Bool, [Type::Bool, Type::BVec2, Type::BVec3, Type::BVec4]),
    ];

    let (_, types) = TYPES.iter().find(|(s, _)| *s == scalar)?;
    types.get(count.checked_sub(1)? as usize).copied()
}

fn matrix_type(scalar: Scalar, columns: u32, rows: u32) -> Option<Type> {
    let double = match scalar {
        Scalar::Float => false,
        Scalar::Double => true,
        _ => return None,
    };

    Some(match (columns, rows, double) {
        (2, 2, false) => Type::Mat2,
        (3, 3, false) => Type::Mat3,
        (4, 4, false) => Type::Mat4,
        (2, 3, false) => Type::Mat2x3,
        (2, 4, false) => Type::Mat2x4,
        (3, 2, false) => Type::Mat3x2,
        (3, 4, false) => Type::Mat3x4,
        (4, 2, false) => Type::Mat4x2,
        (4, 3, false) => Type::Mat4x3,
        (2, 2, true) => Type::DMat2,
        (3, 3, true) => Type::DMat3,
        (4, 4, true) => Type::DMat4,
        (2, 3, true) => Type::DMat2x3,
        (2, 4, true) => Type::DMat2x4,
        (3, 2, true) => Type::DMat3x2,
        (3, 4, true) => Type::DMat3x4,
        (4, 2, true) => Type::DMat4x2,
        (4, 3, true) => Type::DMat4x3,
        _ => return None,
    })
}

struct ImageShape {
    scalar: Scalar,
    dim: u32,
    shadow: bool,
    arrayed: bool,
    ms: bool,
}

fn sampler_type(image: &ImageShape) -> Option<Type> {
    let ImageShape {
        scalar,
        dim,
        shadow,
        arrayed,
        ms,
    } = *image;

    Some(match scalar {
        Scalar::Float => match (dim, shadow, arrayed, ms) {
            (dim::DIM_1D, false, false, false) => Type::Sampler1D,
            (dim::DIM_1D, true, false, false) => Type::Sampler1DShadow,
            (dim::DIM_1D, false, true, false) => Type::Sampler1DArray,
            (dim::DIM_1D, true, true, false) => Type::Sampler1DArrayShadow,
            (dim::DIM_2D, false, false, false) => Type::Sampler2D,
            (dim::DIM_2D, true, false, false) => Type::Sampler2DShadow,
            (dim::DIM_2D, false, true, false) => Type::Sampler2DArray,
            (dim::DIM_2D, true, true, false) => Type::Sampler2DArrayShadow,
            (dim::DIM_2D, false, false, true) => Type::Sampler2DMS,
            (dim::DIM_2D, false, true, true) => Type::Sampler2DMSArray,
            (dim::DIM_3D, false, false, false) => Type::Sampler3D,
            (dim::CUBE, false, false, false) => Type::SamplerCube,
            (dim::CUBE, true, false, false) => Type::SamplerCubeShadow,
            (dim::RECT, false, false, false) => Type::Sampler2DRect,
            (dim::RECT, true, false, false) => Type::Sampler2DRectShadow,
            (dim::BUFFER, false, false, false) => Type::SamplerBuffer,
            _ => return None,
        },
        Scalar::Int => match (dim, shadow, arrayed, ms) {
            (dim::DIM_1D, false, false, false) => Type::ISampler1D,
            (dim::DIM_1D, false, true, false) => Type::ISampler1DArray,
            (dim::DIM_2D, false, false, false) => Type::ISampler2D,
            (dim::DIM_2D, false, true, false) => Type::ISampler2DArray,
            (dim::DIM_2D, false, false, true) => Type::ISampler2DMS,
            (dim::DIM_2D, false, true, true) => Type::ISampler2DMSArray,
            (dim::DIM_3D, false, false, false) => Type::ISampler3D,
            (dim::CUBE, false, false, false) => Type::ISamplerCube,
            (dim::RECT, false, false, false) => Type::ISampler2DRect,
            _ => return None,
        },
        Scalar::UInt => match (dim, shadow, arrayed, ms) {
            (dim::DIM_1D, false, false, false) => Type::USampler1D,
            (dim::DIM_1D, false, true, false) => Type::USampler1DArray,
            (dim::DIM_2D, false, false, false) => Type::USampler2D,
            (dim::DIM_2D, false, true, false) => Type::USampler2DArray,
            (dim::DIM_2D, false, false, true) => Type::USampler2DMS,
            (dim::DIM_2D, false, true, true) => Type::USampler2DMSArray,
            (dim::DIM_3D, false, false, false) => Type::USampler3D,
            (dim::CUBE, false, false, false) => Type::USamplerCube,
            (dim::RECT, false, false, false) => Type::USampler2DRect,
            _ => return None,
        },
        _ => return None,
    })
}

fn storage_image_type(image: &ImageShape) -> Option<Type> {
    const TYPES: [(Scalar, [Type; 10]); 3] = [
        (
            Scalar::Float,
            [
                Type::Image1D,
                Type::Image2D,
                Type::Image3D,
                Type::ImageCube,
                Type::ImageBuffer,
                Type::Image1DArray,
                Type::Image2DArray,
                Type::Image2DMS,
                Type::Image2DMSArray,
                Type::Image2DRect,
            ],
        ),
        (
            Scalar::Int,
            [
                Type::IImage1D,
                Type::IImage2D,
                Type::IImage3D,
                Type::IImageCube,
                Type::IImageBuffer,
                Type::IImage1DArray,
                Type::IImage2DArray,
                Type::IImage2DMS,
                Type::IImage2DMSArray,
                Type::IImage2DRect,
            ],
        ),
        (
            Scalar::UInt,
            [
                Type::UImage1D,
                Type::UImage2D,
                Type::UImage3D,
                Type::UImageCube,
                Type::UImageBuffer,
                Type::UImage1DArray,
                Type::UImage2DArray,
                Type::UImage2DMS,
                Type::UImage2DMSArray,
                Type::UImage2DRect,
            ],
        ),
    ];

    let (_, types) = TYPES.iter().find(|(s, _)| *s == image.scalar)?;

    let index = match (image.dim, image.arrayed, image.ms) {
        (dim::DIM_1D, false, false) => 0,
        (dim::DIM_2D, false, false) => 1,
        (dim::DIM_3D, false, false) => 2,
        (dim::CUBE, false, false) => 3,
        (dim::BUFFER, false, false) => 4,
        (dim::DIM_1D, true, false) => 5,
        (dim::DIM_2D, true, false) => 6,
        (dim::DIM_2D, false, true) => 7,
        (dim::DIM_2D, true, true) => 8,
        (dim::RECT, false, false) => 9,
        _ => return None,
    };

    Some(types[index])
}

fn subpass_type(image: &ImageShape) -> Option<Type> {
    Some(match (image.scalar, image.ms) {
        (Scalar::Float, false) => Type::SubpassInput,
        (Scalar::Float, true) => Type::SubpassInputMS,
        (Scalar::Int, false) => Type::ISubpassInput,
        (Scalar::Int, true) => Type::ISubpassInputMS,
        (Scalar::UInt, false) => Type::USubpassInput,
        (Scalar::UInt, true) => Type::USubpassInputMS,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spirv::{builder::Builder, op};

    // Ids used by the test modules.
    const FLOAT: u32 = 1;
    const VEC4: u32 = 2;
    const MAT4: u32 = 3;
    const UINT: u32 = 4;
    const CONST_4: u32 = 5;
    const ARRAY: u32 = 6;
    const BLOCK: u32 = 7;
    const BLOCK_PTR: u32 = 8;
    const BLOCK_VAR: u32 = 9;
    const IMAGE: u32 = 10;
    const SAMPLED: u32 = 11;
    const SAMPLED_PTR: u32 = 12;
    const SAMPLED_VAR: u32 = 13;
    const OUT_PTR: u32 = 14;
    const OUT_VAR: u32 = 15;
    const IN_VAR: u32 = 16;
    const IN_PTR: u32 = 17;
    const PUSH_PTR: u32 = 18;
    const PUSH_VAR: u32 = 19;
    const RUNTIME: u32 = 20;
    const BUFFER: u32 = 21;
    const BUFFER_PTR: u32 = 22;
    const BUFFER_VAR: u32 = 23;
    const VOID: u32 = 24;
    const FN_TYPE: u32 = 25;
    const MAT4_PTR: u32 = 26;
    const CONST_0: u32 = 27;

    fn vertex_module() -> Spirv {
        Builder::new()
            .entry_point(0, 100, &[OUT_VAR, IN_VAR])
            .name(BLOCK, "Transform")
            .member_name(BLOCK, 0, "matrix")
            .member_name(BLOCK, 1, "colors")
            .name(BLOCK_VAR, "transform")
            .name(SAMPLED_VAR, "diffuse")
            .name(OUT_VAR, "color")
            .name(IN_VAR, "position")
            .name(BUFFER, "Particles")
            .member_name(BUFFER, 0, "positions")
            .push(op::DECORATE, &[ARRAY, decoration::ARRAY_STRIDE, 16])
            .push(op::MEMBER_DECORATE, &[BLOCK, 0, decoration::OFFSET, 0])
            .push(op::MEMBER_DECORATE, &[BLOCK, 0, decoration::COL_MAJOR])
            .push(op::MEMBER_DECORATE, &[BLOCK, 0, decoration::MATRIX_STRIDE, 16])
            .push(op::MEMBER_DECORATE, &[BLOCK, 1, decoration::OFFSET, 64])
            .push(op::DECORATE, &[BLOCK, decoration::BLOCK])
            .push(op::DECORATE, &[BLOCK_VAR, decoration::DESCRIPTOR_SET, 0])
            .push(op::DECORATE, &[BLOCK_VAR, decoration::BINDING, 1])
            .push(op::DECORATE, &[SAMPLED_VAR, decoration::DESCRIPTOR_SET, 0])
            .push(op::DECORATE, &[SAMPLED_VAR, decoration::BINDING, 0])
            .push(op::DECORATE, &[OUT_VAR, decoration::LOCATION, 0])
            .push(op::DECORATE, &[IN_VAR, decoration::LOCATION, 3])
            .push(op::DECORATE, &[RUNTIME, decoration::ARRAY_STRIDE, 16])
            .push(op::MEMBER_DECORATE, &[BUFFER, 0, decoration::OFFSET, 0])
            .push(op::DECORATE, &[BUFFER, decoration::BLOCK])
            .push(op::TYPE_FLOAT, &[FLOAT, 32])
            .push(op::TYPE_VECTOR, &[VEC4, FLOAT, 4])
            .push(op::TYPE_MATRIX, &[MAT4, VEC4, 4])
            .push(op::TYPE_INT, &[UINT, 32, 0])
            .push(op::CONSTANT, &[UINT, CONST_4, 4])
            .push(op::TYPE_ARRAY, &[ARRAY, VEC4, CONST_4])
            .push(op::TYPE_STRUCT, &[BLOCK, MAT4, ARRAY])
            .push(op::TYPE_POINTER, &[BLOCK_PTR, storage_class::UNIFORM, BLOCK])
            .push(op::VARIABLE, &[BLOCK_PTR, BLOCK_VAR, storage_class::UNIFORM])
            .push(op::TYPE_POINTER, &[PUSH_PTR, storage_class::PUSH_CONSTANT, BLOCK])
            .push(op::VARIABLE, &[PUSH_PTR, PUSH_VAR, storage_class::PUSH_CONSTANT])
            .push(op::TYPE_IMAGE, &[IMAGE, FLOAT, dim::DIM_2D, 0, 0, 0, 1, 0])
            .push(op::TYPE_SAMPLED_IMAGE, &[SAMPLED, IMAGE])
            .push(op::TYPE_POINTER, &[SAMPLED_PTR, storage_class::UNIFORM_CONSTANT, SAMPLED])
            .push(op::VARIABLE, &[SAMPLED_PTR, SAMPLED_VAR, storage_class::UNIFORM_CONSTANT])
            .push(op::TYPE_POINTER, &[OUT_PTR, storage_class::OUTPUT, VEC4])
            .push(op::VARIABLE, &[OUT_PTR, OUT_VAR, storage_class::OUTPUT])
            .push(op::TYPE_POINTER, &[IN_PTR, storage_class::INPUT, VEC4])
            .push(op::VARIABLE, &[IN_PTR, IN_VAR, storage_class::INPUT])
            .push(op::TYPE_RUNTIME_ARRAY, &[RUNTIME, VEC4])
            .push(op::TYPE_STRUCT, &[BUFFER, RUNTIME])
            .push(op::TYPE_POINTER, &[BUFFER_PTR, storage_class::STORAGE_BUFFER, BUFFER])
            .push(op::VARIABLE, &[BUFFER_PTR, BUFFER_VAR, storage_class::STORAGE_BUFFER])
            .push(op::FUNCTION, &[VOID, 100, 0, FN_TYPE])
            .push(op::ACCESS_CHAIN, &[MAT4_PTR, 101, PUSH_VAR, CONST_0])
            .build()
    }

    #[test]
    fn uniforms_and_structs() {
        let reflection = reflect_stage(&vertex_module(), Stage::Vertex).unwrap();

        assert_eq!(reflection.entry_points, [(0, "main".to_owned())]);
        assert_eq!(reflection.structs.len(), 2);

        let transform = &reflection.structs[0];
        assert_eq!(transform.name, "Transform");
        assert_eq!(transform.size, 128);
        assert_eq!(transform.members[0].ty, Type::Mat4);
        assert_eq!(transform.members[0].size, 64);
        assert!(!transform.members[0].row_major);
        assert_eq!(transform.members[1].ty, Type::Vec4);
        assert_eq!(transform.members[1].offset, 64);
        assert_eq!(
            transform.members[1].array_elements.as_slice(),
            [ArrayInfo {
                length: 4,
                stride: 16,
            }],
        );

        let particles = &reflection.structs[1];
        assert_eq!(particles.size, 0);
        assert_eq!(particles.members[0].array_elements[0].length, UNKNOWN);

        let uniforms: Vec<_> = reflection
            .uniforms
            .iter()
            .map(|u| (u.uniform.name.as_str(), u.uniform.uniform_type, u.variable_id))
            .collect();
        assert_eq!(
            uniforms,
            [
                ("Transform", UniformType::Block, BLOCK_VAR),
                ("Transform", UniformType::PushConstant, PUSH_VAR),
                ("diffuse", UniformType::SampledImage, SAMPLED_VAR),
                ("Particles", UniformType::BlockBuffer, BUFFER_VAR),
            ],
        );

        let block = &reflection.uniforms[0].uniform;
        assert_eq!((block.descriptor_set, block.binding), (0, 1));
        assert_eq!(block.struct_index, 0);

        let push_constants = &reflection.uniforms[1].uniform;
        assert_eq!((push_constants.descriptor_set, push_constants.binding), (UNKNOWN, UNKNOWN));
        assert_eq!(reflection.push_constant_struct, 0);
        assert!(reflection.uses_push_constants);

        assert_eq!(reflection.uniforms[2].uniform.ty, Type::Sampler2D);
        assert_eq!(reflection.local_size, [1, 1, 1]);
    }

    #[test]
    fn interface() {
        let reflection = reflect_stage(&vertex_module(), Stage::Vertex).unwrap();

        assert_eq!(reflection.inputs.len(), 1);
        assert_eq!(reflection.inputs[0].name, "position");
        assert_eq!(reflection.inputs[0].location, 3);
        assert_eq!(reflection.inputs[0].ty, Type::Vec4);

        assert_eq!(reflection.outputs.len(), 1);
        assert_eq!(reflection.outputs[0].name, "color");
        assert_eq!(reflection.outputs[0].location_count, 1);
    }

    #[test]
    fn geometry_inputs_are_per_vertex() {
        let spirv = Builder::new()
            .entry_point(3, 100, &[IN_VAR])
            .name(IN_VAR, "color")
            .push(op::TYPE_FLOAT, &[FLOAT, 32])
            .push(op::TYPE_VECTOR, &[VEC4, FLOAT, 4])
            .push(op::TYPE_INT, &[UINT, 32, 0])
            .push(op::CONSTANT, &[UINT, CONST_4, 3])
            .push(op::TYPE_ARRAY, &[ARRAY, VEC4, CONST_4])
            .push(op::TYPE_POINTER, &[IN_PTR, storage_class::INPUT, ARRAY])
            .push(op::VARIABLE, &[IN_PTR, IN_VAR, storage_class::INPUT])
            .build();

        let reflection = reflect_stage(&spirv, Stage::Geometry).unwrap();
        assert_eq!(reflection.inputs[0].ty, Type::Vec4);
        assert!(reflection.inputs[0].array_elements.is_empty());

        // The same declaration in a vertex stage is a real array.
        let reflection = reflect_stage(&spirv, Stage::Vertex).unwrap();
        assert_eq!(reflection.inputs[0].array_elements[0].length, 3);
        assert_eq!(reflection.inputs[0].location_count, 3);
    }

    #[test]
    fn compute_local_size_and_built_ins() {
        let spirv = Builder::new()
            .entry_point(5, 100, &[])
            .push(op::EXECUTION_MODE, &[100, execution_mode::LOCAL_SIZE, 8, 4, 1])
            .push(op::DECORATE, &[OUT_VAR, decoration::BUILT_IN, built_in::POSITION])
            .push(op::TYPE_FLOAT, &[FLOAT, 32])
            .push(op::TYPE_VECTOR, &[VEC4, FLOAT, 4])
            .push(op::TYPE_POINTER, &[OUT_PTR, storage_class::OUTPUT, VEC4])
            .push(op::VARIABLE, &[OUT_PTR, OUT_VAR, storage_class::OUTPUT])
            .build();

        let reflection = reflect_stage(&spirv, Stage::Compute).unwrap();
        assert_eq!(reflection.local_size, [8, 4, 1]);
        assert!(reflection.outputs.is_empty());
        assert!(!reflection.uses_push_constants);
        assert_eq!(reflection.push_constant_struct, UNKNOWN);
    }

    #[test]
    fn type_tables() {
        assert_eq!(vector_type(Scalar::UInt, 3), Some(Type::UVec3));
        assert_eq!(vector_type(Scalar::Bool, 5), None);
        assert_eq!(matrix_type(Scalar::Float, 3, 2), Some(Type::Mat3x2));
        assert_eq!(matrix_type(Scalar::Double, 4, 4), Some(Type::DMat4));
        assert_eq!(matrix_type(Scalar::Int, 2, 2), None);

        let shape = ImageShape {
            scalar: Scalar::Int,
            dim: dim::DIM_2D,
            shadow: false,
            arrayed: true,
            ms: true,
        };
        assert_eq!(sampler_type(&shape), Some(Type::ISampler2DMSArray));
        assert_eq!(storage_image_type(&shape), Some(Type::IImage2DMSArray));
        assert_eq!(subpass_type(&shape), Some(Type::ISubpassInputMS));
    }
}
