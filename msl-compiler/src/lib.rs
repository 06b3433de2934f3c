// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Compiles modular shader sources into pipeline modules.
//!
//! A source is GLSL extended with declarations of the pipelines built from it:
//!
//! ```glsl
//! sampler_state tex
//! {
//!     min_filter = linear;
//!     mag_filter = linear;
//! };
//!
//! uniform Transform
//! {
//!     mat4 transform;
//! } INSTANCE(transform);
//!
//! uniform sampler2D tex;
//!
//! [[vertex]] layout(location = 0) in vec3 position;
//! [[vertex]] layout(location = 0) out vec2 texCoord;
//! [[fragment]] layout(location = 0) in vec2 texCoord;
//! [[fragment]] layout(location = 0) out vec4 color;
//!
//! [[vertex]] void vertMain()
//! {
//!     gl_Position = INSTANCE(transform).transform * vec4(position, 1.0);
//!     texCoord = position.xy;
//! }
//!
//! [[fragment]] void fragMain()
//! {
//!     color = texture(tex, texCoord);
//! }
//!
//! pipeline Textured
//! {
//!     vertex = vertMain;
//!     fragment = fragMain;
//!     blend_enable = true;
//!     src_blend_factor = src_alpha;
//!     dst_blend_factor = one_minus_src_alpha;
//! }
//! ```
//!
//! A [`Target`] compiles sources for one [`Backend`](backend::Backend):
//!
//! 1. The source is [preprocessed](preprocess), with `HAS_*` macros describing the
//!    [features](feature) the target supports.
//! 2. The pipeline declarations are [parsed](parse) and the GLSL of each stage is assembled.
//! 3. Each stage is [compiled](compile) to SPIR-V with shaderc.
//! 4. The stages are [reflected](reflect) and [linked](link): uniforms are merged and given
//!    bindings, and the outputs of each stage are matched to the inputs of the next.
//! 5. The backend translates each stage, and the results are gathered in a
//!    [`CompiledResult`], which is saved as a module readable with [`msl_module::Module`].
//!
//! Problems are reported as messages in an [`Output`]. Operations that fail return a
//! [`CompileError`] pointing at the first message describing the failure.

pub use crate::{
    compile::{CompilerInitError, Optimization},
    diagnostic::{CompileError, Level, Location, Message, Output},
    feature::{Feature, FeatureState, FeatureStates},
    limits::ResourceLimits,
    link::BindingPolicy,
    result::CompiledResult,
    target::{Target, TargetOptions},
};

pub mod backend;
pub mod compile;
pub mod diagnostic;
pub mod exec;
pub mod feature;
pub mod limits;
pub mod link;
pub mod parse;
pub mod preprocess;
pub mod reflect;
pub mod result;
pub mod spirv;
mod target;
