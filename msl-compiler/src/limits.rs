// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Resource limits handed to the GLSL compiler.
//!
//! The file format is the one used by glslang: one `Name Value` pair per line, with `#` starting
//! a comment.
//!
//! ```text
//! # Limits of the target GPU.
//! MaxDrawBuffers 8
//! MinProgramTexelOffset -8
//! generalUniformIndexing 1
//! ```

use crate::diagnostic::{CompileError, Location, Output};
use indexmap::IndexMap;
use shaderc::{CompileOptions, Limit};
use std::{fs, path::Path};

macro_rules! limits {
    ($($name:ident),+ $(,)?) => {
        /// The names of the numeric limits.
        pub const LIMIT_NAMES: &[&str] = &[$(stringify!($name)),+];

        fn shaderc_limit(name: &str) -> Option<Limit> {
            match name {
                $(stringify!($name) => Some(Limit::$name),)+
                _ => None,
            }
        }
    };
}

limits! {
    MaxLights,
    MaxClipPlanes,
    MaxTextureUnits,
    MaxTextureCoords,
    MaxVertexAttribs,
    MaxVertexUniformComponents,
    MaxVaryingFloats,
    MaxVertexTextureImageUnits,
    MaxCombinedTextureImageUnits,
    MaxTextureImageUnits,
    MaxFragmentUniformComponents,
    MaxDrawBuffers,
    MaxVertexUniformVectors,
    MaxVaryingVectors,
    MaxFragmentUniformVectors,
    MaxVertexOutputVectors,
    MaxFragmentInputVectors,
    MinProgramTexelOffset,
    MaxProgramTexelOffset,
    MaxClipDistances,
    MaxComputeWorkGroupCountX,
    MaxComputeWorkGroupCountY,
    MaxComputeWorkGroupCountZ,
    MaxComputeWorkGroupSizeX,
    MaxComputeWorkGroupSizeY,
    MaxComputeWorkGroupSizeZ,
    MaxComputeUniformComponents,
    MaxComputeTextureImageUnits,
    MaxComputeImageUniforms,
    MaxComputeAtomicCounters,
    MaxComputeAtomicCounterBuffers,
    MaxVaryingComponents,
    MaxVertexOutputComponents,
    MaxGeometryInputComponents,
    MaxGeometryOutputComponents,
    MaxFragmentInputComponents,
    MaxImageUnits,
    MaxCombinedImageUnitsAndFragmentOutputs,
    MaxCombinedShaderOutputResources,
    MaxImageSamples,
    MaxVertexImageUniforms,
    MaxTessControlImageUniforms,
    MaxTessEvaluationImageUniforms,
    MaxGeometryImageUniforms,
    MaxFragmentImageUniforms,
    MaxCombinedImageUniforms,
    MaxGeometryTextureImageUnits,
    MaxGeometryOutputVertices,
    MaxGeometryTotalOutputComponents,
    MaxGeometryUniformComponents,
    MaxGeometryVaryingComponents,
    MaxTessControlInputComponents,
    MaxTessControlOutputComponents,
    MaxTessControlTextureImageUnits,
    MaxTessControlUniformComponents,
    MaxTessControlTotalOutputComponents,
    MaxTessEvaluationInputComponents,
    MaxTessEvaluationOutputComponents,
    MaxTessEvaluationTextureImageUnits,
    MaxTessEvaluationUniformComponents,
    MaxTessPatchComponents,
    MaxPatchVertices,
    MaxTessGenLevel,
    MaxViewports,
    MaxVertexAtomicCounters,
    MaxTessControlAtomicCounters,
    MaxTessEvaluationAtomicCounters,
    MaxGeometryAtomicCounters,
    MaxFragmentAtomicCounters,
    MaxCombinedAtomicCounters,
    MaxAtomicCounterBindings,
    MaxVertexAtomicCounterBuffers,
    MaxTessControlAtomicCounterBuffers,
    MaxTessEvaluationAtomicCounterBuffers,
    MaxGeometryAtomicCounterBuffers,
    MaxFragmentAtomicCounterBuffers,
    MaxCombinedAtomicCounterBuffers,
    MaxAtomicCounterBufferSize,
    MaxTransformFeedbackBuffers,
    MaxTransformFeedbackInterleavedComponents,
    MaxCullDistances,
    MaxCombinedClipAndCullDistances,
    MaxSamples,
}

/// The boolean limits, which restrict loops and indexing.
pub const FLAG_NAMES: &[&str] = &[
    "nonInductiveForLoops",
    "whileLoops",
    "doWhileLoops",
    "generalUniformIndexing",
    "generalAttributeMatrixVectorIndexing",
    "generalVaryingIndexing",
    "generalSamplerIndexing",
    "generalVariableIndexing",
    "generalConstantMatrixVectorIndexing",
];

/// Limits read from a resource-limits file. Limits that aren't listed keep the compiler's
/// defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    values: IndexMap<&'static str, i32>,
    flags: IndexMap<&'static str, bool>,
}

impl ResourceLimits {
    #[inline]
    pub fn new() -> Self {
        ResourceLimits::default()
    }

    /// Parses the contents of a resource-limits file.
    ///
    /// Unknown names are reported as warnings. Parsing continues past malformed lines, and the
    /// returned error refers to the first one.
    pub fn parse(
        output: &mut Output,
        file_name: &str,
        text: &str,
    ) -> Result<ResourceLimits, CompileError> {
        let mut limits = ResourceLimits::new();
        let mut first_error = None;

        for (index, line) in text.lines().enumerate() {
            let location = Location::new(file_name, index as u32 + 1, 1);
            let line = line.split('#').next().unwrap_or_default();

            let mut words = line.split_whitespace();
            let (name, value) = match (words.next(), words.next(), words.next()) {
                (None, _, _) => continue,
                (Some(name), Some(value), None) => (name, value),
                _ => {
                    let err = output.error(&location, "expected a resource limit and a value");
                    first_error.get_or_insert(err);
                    continue;
                }
            };

            if let Err(err) = limits.set_parsed(output, &location, name, value) {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(limits),
        }
    }

    /// Reads and parses a resource-limits file.
    pub fn from_file(
        output: &mut Output,
        path: impl AsRef<Path>,
    ) -> Result<ResourceLimits, CompileError> {
        let path = path.as_ref();
        let file_name = path.to_string_lossy();

        let text = fs::read_to_string(path).map_err(|err| {
            output.error(
                &Location::new(&*file_name, 0, 0),
                format!("couldn't read the resource limits: {}", err),
            )
        })?;

        ResourceLimits::parse(output, &file_name, &text)
    }

    fn set_parsed(
        &mut self,
        output: &mut Output,
        location: &Location,
        name: &str,
        value: &str,
    ) -> Result<(), CompileError> {
        if let Some(&name) = LIMIT_NAMES.iter().find(|&&known| known == name) {
            let value = value.parse().map_err(|_| {
                output.error(
                    location,
                    format!("invalid value '{}' for resource limit '{}'", value, name),
                )
            })?;
            self.values.insert(name, value);
        } else if let Some(&name) = FLAG_NAMES.iter().find(|&&known| known == name) {
            let value = match value {
                "0" | "false" => false,
                "1" | "true" => true,
                _ => {
                    return Err(output.error(
                        location,
                        format!("invalid value '{}' for resource limit '{}'", value, name),
                    ));
                }
            };
            self.flags.insert(name, value);
        } else {
            output.warning(location, format!("unknown resource limit '{}'", name));
        }

        Ok(())
    }

    /// Returns the value of a numeric limit, if it was set.
    #[inline]
    pub fn get(&self, name: &str) -> Option<i32> {
        self.values.get(name).copied()
    }

    /// Sets a numeric limit. Returns `false` if the name isn't a known limit.
    pub fn set(&mut self, name: &str, value: i32) -> bool {
        match LIMIT_NAMES.iter().find(|&&known| known == name) {
            Some(&name) => {
                self.values.insert(name, value);
                true
            }
            None => false,
        }
    }

    /// Returns the value of a boolean limit, if it was set.
    #[inline]
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.flags.get(name).copied()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.flags.is_empty()
    }

    /// Applies the numeric limits. The boolean limits can't be passed to the compiler and only
    /// serve as documentation of the target.
    pub(crate) fn apply(&self, options: &mut CompileOptions<'_>) {
        for (&name, &value) in &self.values {
            if let Some(limit) = shaderc_limit(name) {
                options.set_limit(limit, value);
            }
        }
    }
}
