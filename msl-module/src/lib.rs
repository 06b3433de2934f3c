// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Compiled shader pipeline modules.
//!
//! A module (`.mslb` file) packages everything a renderer needs to create the pipelines declared
//! in a shader source file: the compiled shader for every stage, reflection data describing the
//! uniforms, structs, vertex attributes and fragment outputs, sampler states, and the
//! fixed-function render state.
//!
//! The file is a single little-endian buffer that is verified once when loaded and then read in
//! place. See [`Module`] for loading, and [`write`] for producing modules from a
//! [`ModuleData`].
//!
//! # Targets
//!
//! Every module is compiled for one target, identified by a four-character code:
//!
//! | Code | Target | Payload |
//! |---|---|---|
//! | `SPRV` | SPIR-V | 32-bit words |
//! | `GLSL` | Desktop GLSL | UTF-8 text with a trailing NUL |
//! | `GLES` | OpenGL ES GLSL | UTF-8 text with a trailing NUL |
//! | `MTLX` | Metal on macOS | Metal library |
//! | `MTLI` | Metal on iOS | Metal library |

pub use crate::{
    module::{
        ArrayElementsRef, AttributeRef, BindingError, FragmentInputGroupRef, FragmentInputRef,
        FragmentOutputRef, LoadError, Module, PipelineRef, StructMemberRef, StructRef,
        UniformRef,
    },
    reflection::{
        ArrayElements, ArrayInfo, Attribute, FragmentInput, FragmentInputGroup, FragmentOutput,
        ModuleData, PipelineData, ShaderRef, Struct, StructMember, Uniform,
    },
    types::{Stage, Type, UniformType, STAGE_COUNT},
    write::write,
};

mod format;
mod macros;
mod module;
mod reflection;
pub mod state;
mod types;
mod write;

/// The version of the module format written by this crate. Modules with a higher version are
/// rejected.
pub const MODULE_VERSION: u32 = 1;

/// Sentinel for an unknown or unset integer value.
pub const UNKNOWN: u32 = u32::MAX;

/// Sentinel for an unset float value.
pub const UNKNOWN_FLOAT: f32 = f32::MAX;

/// Shader index of a stage that isn't used by a pipeline.
pub const NO_SHADER: u32 = u32::MAX;

/// Builds a four-character code. The first character is the least significant byte.
#[inline]
pub const fn fourcc(code: [u8; 4]) -> u32 {
    u32::from_le_bytes(code)
}

pub const TARGET_SPIRV: u32 = fourcc(*b"SPRV");
pub const TARGET_GLSL: u32 = fourcc(*b"GLSL");
pub const TARGET_GLSL_ES: u32 = fourcc(*b"GLES");
pub const TARGET_METAL_MACOS: u32 = fourcc(*b"MTLX");
pub const TARGET_METAL_IOS: u32 = fourcc(*b"MTLI");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_is_little_endian() {
        assert_eq!(
            TARGET_SPIRV,
            b'S' as u32 | (b'P' as u32) << 8 | (b'R' as u32) << 16 | (b'V' as u32) << 24
        );
        assert_ne!(TARGET_GLSL, TARGET_GLSL_ES);
    }
}
