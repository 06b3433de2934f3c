// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Collects compiled pipelines and shaders into a module.

use crate::diagnostic::{CompileError, Location, Output};
use foldhash::{HashMap, HashMapExt};
use indexmap::IndexMap;
use msl_module::{
    state::SamplerState, ModuleData, PipelineData, Stage, Struct, TARGET_SPIRV, UNKNOWN,
};
use std::{collections::BTreeMap, fs, io, path::Path};

/// The pipelines and shaders compiled for one target.
#[derive(Clone, Debug)]
pub struct CompiledResult {
    target_id: u32,
    target_version: u32,
    adjustable_bindings: bool,
    pipelines: BTreeMap<String, (PipelineData, Location)>,
    shaders: Vec<Vec<u8>>,
    shader_indices: HashMap<Vec<u8>, u32>,
    shared_data: Vec<u8>,
}

impl CompiledResult {
    /// Creates an empty result. With `adjustable_bindings`, every shader gets its own entry so
    /// that its bindings can be changed independently when loaded.
    pub fn new(target_id: u32, target_version: u32, adjustable_bindings: bool) -> Self {
        CompiledResult {
            target_id,
            target_version,
            adjustable_bindings,
            pipelines: BTreeMap::new(),
            shaders: Vec::new(),
            shader_indices: HashMap::new(),
            shared_data: Vec::new(),
        }
    }

    #[inline]
    pub fn target_id(&self) -> u32 {
        self.target_id
    }

    #[inline]
    pub fn target_version(&self) -> u32 {
        self.target_version
    }

    #[inline]
    pub fn adjustable_bindings(&self) -> bool {
        self.adjustable_bindings
    }

    /// Returns the pipelines, sorted by name.
    pub fn pipelines(&self) -> impl ExactSizeIterator<Item = &PipelineData> {
        self.pipelines.values().map(|(pipeline, _)| pipeline)
    }

    pub fn pipeline(&self, name: &str) -> Option<&PipelineData> {
        self.pipelines.get(name).map(|(pipeline, _)| pipeline)
    }

    #[inline]
    pub fn shaders(&self) -> &[Vec<u8>] {
        &self.shaders
    }

    #[inline]
    pub fn shared_data(&self) -> &[u8] {
        &self.shared_data
    }

    /// Fails if a pipeline named `name` was already added.
    pub fn check_pipeline_name(
        &self,
        output: &mut Output,
        location: &Location,
        name: &str,
    ) -> Result<(), CompileError> {
        let Some((_, previous)) = self.pipelines.get(name) else {
            return Ok(());
        };

        let err = output.error(
            location,
            format!("pipeline '{}' has already been declared", name),
        );
        output.note(previous, "see previous declaration");

        Err(err)
    }

    /// Adds a pipeline along with the payload of each of its stages.
    ///
    /// Nothing is added if a pipeline of the same name already exists.
    pub fn add_pipeline(
        &mut self,
        output: &mut Output,
        location: &Location,
        mut pipeline: PipelineData,
        shaders: Vec<(Stage, Vec<u8>)>,
    ) -> Result<(), CompileError> {
        self.check_pipeline_name(output, location, &pipeline.name)?;

        for (stage, data) in shaders {
            pipeline.shader_mut(stage).shader = self.add_shader(data);
        }

        if self.target_id != TARGET_SPIRV {
            for shader in &mut pipeline.shaders {
                shader.uniform_ids.clear();
            }
        }

        log::debug!("adding pipeline '{}'", pipeline.name);
        self.pipelines
            .insert(pipeline.name.clone(), (pipeline, location.clone()));

        Ok(())
    }

    /// Adds a shader payload and returns its index. Identical payloads share an index unless
    /// bindings are adjustable.
    pub fn add_shader(&mut self, data: Vec<u8>) -> u32 {
        if !self.adjustable_bindings {
            if let Some(&index) = self.shader_indices.get(&data) {
                return index;
            }
        }

        let index = self.shaders.len() as u32;

        if !self.adjustable_bindings {
            self.shader_indices.insert(data.clone(), index);
        }

        self.shaders.push(data);

        index
    }

    /// Stores data shared by every shader, such as a Metal library.
    #[inline]
    pub fn set_shared_data(&mut self, data: Vec<u8>) {
        self.shared_data = data;
    }

    /// Returns the contents of the module.
    pub fn to_module_data(&self) -> ModuleData {
        ModuleData {
            target_id: self.target_id,
            target_version: self.target_version,
            adjustable_bindings: self.adjustable_bindings,
            pipelines: self.pipelines().cloned().collect(),
            shaders: self.shaders.clone(),
            shared_data: self.shared_data.clone(),
        }
    }

    /// Serializes the module.
    #[inline]
    pub fn to_bytes(&self) -> Vec<u8> {
        msl_module::write(&self.to_module_data())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> io::Result<()> {
        fs::write(path, self.to_bytes())
    }
}

/// Adds `source[index]` and the structs of its members to `table`. Structs are shared by name.
///
/// Returns `None` if a struct of the same name but with a different layout is already present.
pub(crate) fn intern_struct(
    table: &mut IndexMap<String, Struct>,
    source: &[Struct],
    index: u32,
) -> Option<u32> {
    let structure = source.get(index as usize)?;
    let mut interned = structure.clone();

    for member in &mut interned.members {
        if member.struct_index != UNKNOWN {
            member.struct_index = intern_struct(table, source, member.struct_index)?;
        }
    }

    if let Some((index, _, existing)) = table.get_full(&interned.name) {
        return (*existing == interned).then_some(index as u32);
    }

    let (index, _) = table.insert_full(interned.name.clone(), interned);

    Some(index as u32)
}

/// Adds a sampler state to `table` unless an equal one is present, and returns its index.
pub(crate) fn intern_sampler(table: &mut Vec<SamplerState>, state: &SamplerState) -> u32 {
    match table.iter().position(|existing| existing == state) {
        Some(index) => index as u32,
        None => {
            table.push(*state);
            table.len() as u32 - 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msl_module::{
        state::Filter, ArrayElements, Module, StructMember, Type, TARGET_GLSL, UNKNOWN,
    };

    fn member(name: &str, ty: Type, struct_index: u32) -> StructMember {
        StructMember {
            name: name.to_owned(),
            offset: 0,
            size: 16,
            ty,
            struct_index,
            array_elements: ArrayElements::new(),
            row_major: false,
        }
    }

    #[test]
    fn struct_interning() {
        let source = vec![
            Struct {
                name: "Light".to_owned(),
                size: 16,
                members: vec![member("color", Type::Vec4, UNKNOWN)],
            },
            Struct {
                name: "Lights".to_owned(),
                size: 16,
                members: vec![member("light", Type::Struct, 0)],
            },
        ];

        let mut table = IndexMap::new();
        table.insert(
            "Other".to_owned(),
            Struct {
                name: "Other".to_owned(),
                size: 0,
                members: Vec::new(),
            },
        );

        assert_eq!(intern_struct(&mut table, &source, 1), Some(2));
        assert_eq!(table[1].name, "Light");
        assert_eq!(table[2].members[0].struct_index, 1);

        // Same layout from another stage.
        assert_eq!(intern_struct(&mut table, &source, 1), Some(2));
        assert_eq!(table.len(), 3);

        let mut changed = source.clone();
        changed[0].members[0].ty = Type::Vec3;
        assert_eq!(intern_struct(&mut table, &changed, 1), None);
    }

    #[test]
    fn sampler_interning() {
        let mut table = Vec::new();
        let linear = SamplerState {
            min_filter: Filter::Linear,
            ..Default::default()
        };

        assert_eq!(intern_sampler(&mut table, &linear), 0);
        assert_eq!(intern_sampler(&mut table, &SamplerState::default()), 1);
        assert_eq!(intern_sampler(&mut table, &linear), 0);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn shader_deduplication() {
        let mut result = CompiledResult::new(TARGET_SPIRV, 100, false);
        assert_eq!(result.add_shader(vec![1, 2, 3, 4]), 0);
        assert_eq!(result.add_shader(vec![5, 6, 7, 8]), 1);
        assert_eq!(result.add_shader(vec![1, 2, 3, 4]), 0);

        let mut result = CompiledResult::new(TARGET_SPIRV, 100, true);
        assert_eq!(result.add_shader(vec![1, 2, 3, 4]), 0);
        assert_eq!(result.add_shader(vec![1, 2, 3, 4]), 1);
    }

    #[test]
    fn pipelines() {
        let mut output = Output::new();
        let mut result = CompiledResult::new(TARGET_GLSL, 450, false);
        let location = Location::new("test.msl", 3, 1);

        let mut pipeline = PipelineData::new("Test");
        pipeline.shader_mut(Stage::Vertex).uniform_ids = vec![7];
        let shaders = vec![
            (Stage::Vertex, b"vertex\0".to_vec()),
            (Stage::Fragment, b"fragment\0".to_vec()),
        ];

        result
            .add_pipeline(&mut output, &location, pipeline, shaders)
            .unwrap();
        result
            .add_pipeline(&mut output, &location, PipelineData::new("Another"), Vec::new())
            .unwrap();

        let err = result
            .add_pipeline(&mut output, &location, PipelineData::new("Test"), Vec::new())
            .unwrap_err();
        assert_eq!(
            output.message(err.message).unwrap().text,
            "pipeline 'Test' has already been declared",
        );
        assert!(output.messages()[err.message + 1].continued);

        let names: Vec<_> = result.pipelines().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Another", "Test"]);

        let test = result.pipeline("Test").unwrap();
        assert_eq!(test.shader(Stage::Vertex).shader, 0);
        assert_eq!(test.shader(Stage::Fragment).shader, 1);
        assert!(!test.shader(Stage::Compute).is_used());
        // Only SPIR-V keeps the variable ids.
        assert!(test.shader(Stage::Vertex).uniform_ids.is_empty());

        let module = Module::from_vec(result.to_bytes()).unwrap();
        assert_eq!(module.target_id(), TARGET_GLSL);
        assert_eq!(module.pipeline_count(), 2);
        assert_eq!(module.shader_data(1), Some(&b"fragment\0"[..]));
    }
}
