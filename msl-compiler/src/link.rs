// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Linking of the stages of a pipeline.
//!
//! The stages are compiled independently, so the linker has to reconcile them: uniforms declared
//! by several stages are merged into one pipeline-wide list and given consistent bindings, the
//! outputs of each stage are given locations and the inputs of the next stage are matched to
//! them by name. Every change is written back into the SPIR-V of the stages.

use crate::{
    diagnostic::{CompileError, Location, Output},
    parse::{Parser, Pipeline},
    reflect::{reflect_stage, InterfaceVariable, StageReflection},
    result::{intern_sampler, intern_struct},
    spirv::{decoration, Spirv},
};
use foldhash::{HashSet, HashSetExt};
use indexmap::IndexMap;
use msl_module::{
    Attribute, FragmentOutput, PipelineData, Stage, Type, Uniform, UniformType, UNKNOWN,
};

/// How descriptor sets and bindings are assigned to uniforms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BindingPolicy {
    /// Keeps the bindings chosen when compiling, moving uniforms whose bindings collide with an
    /// earlier uniform of the pipeline.
    #[default]
    Default,
    /// Assigns set 0 and sequential bindings in uniform order.
    Dummy,
    /// Like `Dummy`, and the bindings may be changed after loading.
    Adjustable,
}

/// The SPIR-V of one stage, before linking.
#[derive(Clone, Debug)]
pub struct CompiledStage {
    pub stage: Stage,
    pub spirv: Spirv,
    /// Where the stage's entry point was assigned, for diagnostics.
    pub entry_point: Location,
}

/// A stage after linking.
#[derive(Clone, Debug)]
pub struct LinkedStage {
    pub stage: Stage,
    pub spirv: Spirv,
    /// Reflection of `spirv`, updated with the linked bindings and locations.
    pub reflection: StageReflection,
    pub entry_point: Location,
}

/// The result of linking a pipeline.
#[derive(Clone, Debug)]
pub struct LinkedPipeline {
    /// The pipeline description. Shader indices are left unset.
    pub data: PipelineData,
    pub stages: Vec<LinkedStage>,
}

/// Links the compiled stages of `pipeline`. The stages must be in pipeline order.
pub fn link_pipeline(
    output: &mut Output,
    parser: &Parser,
    pipeline: &Pipeline,
    stages: Vec<CompiledStage>,
    policy: BindingPolicy,
) -> Result<LinkedPipeline, CompileError> {
    let mut data = PipelineData::new(pipeline.name.clone());
    data.render_state = pipeline.render_state;
    data.fragment_inputs = parser.fragment_input_groups(pipeline);

    let mut linked = Vec::with_capacity(stages.len());

    for compiled in stages {
        let reflection = reflect_stage(&compiled.spirv, compiled.stage)
            .map_err(|err| output.error(&compiled.entry_point, err.to_string()))?;

        let model = compiled.stage.index() as u32;
        if !matches!(reflection.entry_points.as_slice(), [(execution_model, _)] if *execution_model == model)
        {
            return Err(output.error(
                &compiled.entry_point,
                format!(
                    "expected a single entry point for the {} stage, found {}",
                    compiled.stage.name(),
                    reflection.entry_points.len(),
                ),
            ));
        }

        linked.push(LinkedStage {
            stage: compiled.stage,
            spirv: compiled.spirv,
            reflection,
            entry_point: compiled.entry_point,
        });
    }

    let mut uniforms = merge_uniforms(output, &mut linked, &mut data)?;
    assign_bindings(&mut uniforms, policy);

    for uniform in uniforms.values_mut() {
        if uniform.uniform_type != UniformType::SampledImage {
            continue;
        }

        if let Some(state) = parser.sampler_state(&uniform.name) {
            uniform.sampler_index = intern_sampler(&mut data.sampler_states, state);
        }
    }

    for stage in &mut linked {
        let mut uniform_ids = vec![UNKNOWN; uniforms.len()];

        for reflected in &mut stage.reflection.uniforms {
            let Some((index, _, uniform)) = uniforms.get_full(&reflected.uniform.name) else {
                continue;
            };

            uniform_ids[index] = reflected.variable_id;

            if uniform.uniform_type.has_descriptor() {
                let id = reflected.variable_id;
                stage
                    .spirv
                    .set_decoration(id, decoration::DESCRIPTOR_SET, uniform.descriptor_set);
                stage
                    .spirv
                    .set_decoration(id, decoration::BINDING, uniform.binding);
                reflected.uniform.descriptor_set = uniform.descriptor_set;
                reflected.uniform.binding = uniform.binding;
            }
        }

        let shader = data.shader_mut(stage.stage);
        shader.uniform_ids = uniform_ids;
        shader.uses_push_constants = stage.reflection.uses_push_constants;
    }

    data.uniforms = uniforms.into_values().collect();

    link_interfaces(output, &mut linked, &mut data)?;

    for stage in &linked {
        match stage.stage {
            Stage::Fragment => {}
            Stage::Compute => data.compute_local_size = stage.reflection.local_size,
            // The last stage before rasterization wins.
            _ => {
                data.render_state.clip_distance_count = stage.reflection.clip_distance_count;
                data.render_state.cull_distance_count = stage.reflection.cull_distance_count;
            }
        }
    }

    Ok(LinkedPipeline {
        data,
        stages: linked,
    })
}

/// Reflects a linked stage again after its SPIR-V was replaced, such as by an optimizer, and
/// updates the ids of its uniforms and its use of push constants in `data`.
///
/// Uniforms with a descriptor are found by their set and binding, since the names may have been
/// stripped. Push constants are found by their storage, other uniforms by name.
pub fn relink_stage(
    output: &mut Output,
    data: &mut PipelineData,
    stage: &mut LinkedStage,
) -> Result<(), CompileError> {
    let mut reflection = reflect_stage(&stage.spirv, stage.stage)
        .map_err(|err| output.error(&stage.entry_point, err.to_string()))?;

    reflection.uniforms.retain(|reflected| {
        !data
            .fragment_inputs
            .iter()
            .any(|group| group.type_name == reflected.uniform.name)
    });

    let mut uniform_ids = vec![UNKNOWN; data.uniforms.len()];

    for reflected in &reflection.uniforms {
        let found = &reflected.uniform;
        let index = data.uniforms.iter().position(|uniform| {
            if uniform.uniform_type.has_descriptor() {
                found.uniform_type.has_descriptor()
                    && found.descriptor_set == uniform.descriptor_set
                    && found.binding == uniform.binding
            } else if uniform.uniform_type == UniformType::PushConstant {
                found.uniform_type == UniformType::PushConstant
            } else {
                found.uniform_type == uniform.uniform_type && found.name == uniform.name
            }
        });

        match index {
            Some(index) => uniform_ids[index] = reflected.variable_id,
            None => {
                return Err(output.error(
                    &stage.entry_point,
                    format!(
                        "the processed {} stage declares a uniform that isn't part of the \
                         pipeline",
                        stage.stage.name(),
                    ),
                ));
            }
        }
    }

    let shader = data.shader_mut(stage.stage);
    shader.uniform_ids = uniform_ids;
    shader.uses_push_constants = reflection.uses_push_constants;
    stage.reflection = reflection;

    Ok(())
}

/// Merges the uniforms of every stage by name, and fills in the pipeline's structs.
fn merge_uniforms(
    output: &mut Output,
    stages: &mut [LinkedStage],
    data: &mut PipelineData,
) -> Result<IndexMap<String, Uniform>, CompileError> {
    let mut structs = IndexMap::new();
    let mut uniforms: IndexMap<String, Uniform> = IndexMap::new();

    for stage in stages.iter_mut() {
        let reflection = &mut stage.reflection;

        // Fragment-input blocks are read from the framebuffer instead of being bound.
        reflection.uniforms.retain(|reflected| {
            !data
                .fragment_inputs
                .iter()
                .any(|group| group.type_name == reflected.uniform.name)
        });

        for reflected in &reflection.uniforms {
            let mut uniform = reflected.uniform.clone();

            if uniform.struct_index != UNKNOWN {
                let source = uniform.struct_index;
                uniform.struct_index = intern_struct(&mut structs, &reflection.structs, source)
                    .ok_or_else(|| {
                        let name = &reflection.structs[source as usize].name;
                        output.error(
                            &stage.entry_point,
                            format!(
                                "struct '{}' doesn't match its declaration in another stage",
                                name,
                            ),
                        )
                    })?;
            }

            if uniform.uniform_type == UniformType::PushConstant
                && data.push_constant_struct == UNKNOWN
            {
                data.push_constant_struct = uniform.struct_index;
            }

            match uniforms.get(&uniform.name) {
                Some(existing) => {
                    let compatible = existing.uniform_type == uniform.uniform_type
                        && existing.ty == uniform.ty
                        && existing.struct_index == uniform.struct_index
                        && existing.array_elements == uniform.array_elements;

                    if !compatible {
                        return Err(output.error(
                            &stage.entry_point,
                            format!(
                                "uniform '{}' doesn't match its declaration in another stage",
                                uniform.name,
                            ),
                        ));
                    }
                }
                None => {
                    uniforms.insert(uniform.name.clone(), uniform);
                }
            }
        }
    }

    data.structs = structs.into_values().collect();

    Ok(uniforms)
}

fn assign_bindings(uniforms: &mut IndexMap<String, Uniform>, policy: BindingPolicy) {
    let mut used = HashSet::new();
    let mut next_binding = 0;

    for uniform in uniforms.values_mut() {
        if !uniform.uniform_type.has_descriptor() {
            continue;
        }

        match policy {
            BindingPolicy::Default => {
                let set = match uniform.descriptor_set {
                    UNKNOWN => 0,
                    set => set,
                };
                let mut binding = match uniform.binding {
                    UNKNOWN => 0,
                    binding => binding,
                };

                while !used.insert((set, binding)) {
                    binding += 1;
                }

                uniform.descriptor_set = set;
                uniform.binding = binding;
            }
            BindingPolicy::Dummy | BindingPolicy::Adjustable => {
                uniform.descriptor_set = 0;
                uniform.binding = next_binding;
                next_binding += 1;
            }
        }
    }
}

/// Blocks are matched by block name, other variables by variable name.
fn interface_name(variable: &InterfaceVariable) -> &str {
    variable.struct_name.as_deref().unwrap_or(&variable.name)
}

fn link_interfaces(
    output: &mut Output,
    stages: &mut [LinkedStage],
    data: &mut PipelineData,
) -> Result<(), CompileError> {
    let mut previous: Option<Vec<InterfaceVariable>> = None;

    for stage in stages.iter_mut() {
        match stage.stage {
            Stage::Compute => continue,
            Stage::Vertex => {
                for input in &stage.reflection.inputs {
                    if input.ty == Type::Struct {
                        return Err(output.error(
                            &stage.entry_point,
                            format!("vertex input '{}' can't be an interface block", input.name),
                        ));
                    }

                    data.attributes.push(Attribute {
                        name: input.name.clone(),
                        ty: input.ty,
                        array_elements: input.array_elements.clone(),
                        location: input.location,
                        component: input.component,
                    });
                }
            }
            _ => {
                if let Some(outputs) = &previous {
                    for input in &mut stage.reflection.inputs {
                        let name = interface_name(input);
                        let Some(source) = outputs.iter().find(|o| interface_name(o) == name)
                        else {
                            return Err(output.error(
                                &stage.entry_point,
                                format!(
                                    "input '{}' of the {} stage doesn't match an output of the \
                                    previous stage",
                                    input.name,
                                    stage.stage.name(),
                                ),
                            ));
                        };

                        if source.ty != input.ty
                            || source.struct_name != input.struct_name
                            || source.array_elements != input.array_elements
                        {
                            return Err(output.error(
                                &stage.entry_point,
                                format!(
                                    "type of input '{}' of the {} stage doesn't match the output \
                                    of the previous stage",
                                    input.name,
                                    stage.stage.name(),
                                ),
                            ));
                        }

                        input.location = source.location;
                        stage.spirv.set_decoration(
                            input.variable_id,
                            decoration::LOCATION,
                            source.location,
                        );
                    }
                }
            }
        }

        if stage.stage == Stage::Fragment {
            for fragment_output in &stage.reflection.outputs {
                if fragment_output.ty == Type::Struct {
                    return Err(output.error(
                        &stage.entry_point,
                        format!(
                            "fragment output '{}' can't be an interface block",
                            fragment_output.name,
                        ),
                    ));
                }

                data.fragment_outputs.push(FragmentOutput {
                    name: fragment_output.name.clone(),
                    location: fragment_output.location,
                });
            }
        } else {
            let mut location = 0;

            for stage_output in &mut stage.reflection.outputs {
                stage_output.location = location;
                stage.spirv.set_decoration(
                    stage_output.variable_id,
                    decoration::LOCATION,
                    location,
                );
                location += stage_output.location_count;
            }

            previous = Some(stage.reflection.outputs.clone());
        }
    }

    Ok(())
}
