// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The languages that compiled pipelines are translated to.
//!
//! Every stage is compiled to SPIR-V first. A [`Backend`] then turns the linked SPIR-V of each
//! stage into the payload stored in the module, and declares which [`Feature`]s the target
//! supports.

use crate::{
    diagnostic::{CompileError, Location, Output},
    feature::Feature,
    link::BindingPolicy,
    reflect::StageReflection,
    spirv::Spirv,
};
use msl_module::{PipelineData, Stage};

pub use self::{
    glsl::{GlslBackend, GlslOptions, Precision},
    metal::{MetalBackend, MetalCommands, MetalOptions, MetalPlatform},
    spirv::SpirvBackend,
};

mod glsl;
mod metal;
mod spirv;

/// One stage to translate.
#[derive(Clone, Copy, Debug)]
pub struct CrossCompileRequest<'a> {
    /// The linked pipeline. Shader indices aren't assigned yet.
    pub pipeline: &'a PipelineData,
    pub stage: Stage,
    pub spirv: &'a Spirv,
    pub reflection: &'a StageReflection,
    /// Where the stage's entry point was assigned, for diagnostics.
    pub entry_point: &'a Location,
}

/// A target language.
pub trait Backend {
    /// The four-character code stored in modules.
    fn id(&self) -> u32;

    fn version(&self) -> u32;

    /// Whether the target supports `feature`, unless it's overridden.
    fn feature_supported(&self, feature: Feature) -> bool;

    /// Macros defined for every source, as `(name, value)`.
    fn extra_defines(&self) -> Vec<(String, String)>;

    /// Whether `cross_compile` relies on the names of variables and types in the SPIR-V.
    fn needs_reflection_names(&self) -> bool {
        true
    }

    /// The SPIR-V version to compile to, as `major * 100 + minor * 10`.
    fn ir_version(&self) -> u32;

    /// Called before a source is compiled, with the binding policy requested by the user.
    /// Returns the policy to use.
    fn will_compile(&mut self, policy: BindingPolicy) -> BindingPolicy {
        policy
    }

    /// Whether bindings may be changed after loading a module.
    fn supports_adjustable_bindings(&self) -> bool {
        false
    }

    /// Translates one stage.
    fn cross_compile(
        &mut self,
        output: &mut Output,
        request: &CrossCompileRequest<'_>,
    ) -> Result<Vec<u8>, CompileError>;

    /// Called after the stages of a pipeline were translated, with whether the pipeline was
    /// added to the result. Anything kept for the stages of a pipeline that wasn't added must be
    /// dropped.
    fn finish_pipeline(&mut self, added: bool) {
        let _ = added;
    }

    /// Returns the data shared by every shader of the module, once everything was compiled.
    fn shared_data(&mut self, output: &mut Output) -> Result<Vec<u8>, CompileError> {
        let _ = output;

        Ok(Vec::new())
    }
}

impl<B> Backend for Box<B>
where
    B: Backend + ?Sized,
{
    fn id(&self) -> u32 {
        (**self).id()
    }

    fn version(&self) -> u32 {
        (**self).version()
    }

    fn feature_supported(&self, feature: Feature) -> bool {
        (**self).feature_supported(feature)
    }

    fn extra_defines(&self) -> Vec<(String, String)> {
        (**self).extra_defines()
    }

    fn needs_reflection_names(&self) -> bool {
        (**self).needs_reflection_names()
    }

    fn ir_version(&self) -> u32 {
        (**self).ir_version()
    }

    fn will_compile(&mut self, policy: BindingPolicy) -> BindingPolicy {
        (**self).will_compile(policy)
    }

    fn supports_adjustable_bindings(&self) -> bool {
        (**self).supports_adjustable_bindings()
    }

    fn cross_compile(
        &mut self,
        output: &mut Output,
        request: &CrossCompileRequest<'_>,
    ) -> Result<Vec<u8>, CompileError> {
        (**self).cross_compile(output, request)
    }

    fn finish_pipeline(&mut self, added: bool) {
        (**self).finish_pipeline(added)
    }

    fn shared_data(&mut self, output: &mut Output) -> Result<Vec<u8>, CompileError> {
        (**self).shared_data(output)
    }
}

/// Parses SPIR-V into the cross compiler's representation and validates it.
fn naga_module(
    output: &mut Output,
    request: &CrossCompileRequest<'_>,
) -> Result<(naga::Module, naga::valid::ModuleInfo), CompileError> {
    let options = naga::front::spv::Options {
        adjust_coordinate_space: false,
        strict_capabilities: false,
        block_ctx_dump_prefix: None,
    };

    let module = naga::front::spv::parse_u8_slice(&request.spirv.to_bytes(), &options)
        .map_err(|err| {
            output.error(
                request.entry_point,
                format!(
                    "couldn't read the SPIR-V of the {} stage: {}",
                    request.stage.name(),
                    err,
                ),
            )
        })?;

    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|err| {
        output.error(
            request.entry_point,
            format!(
                "the {} stage can't be translated: {}",
                request.stage.name(),
                err.as_inner(),
            ),
        )
    })?;

    Ok((module, info))
}

/// The stages the cross compiler reads.
fn naga_stage(stage: Stage) -> Option<naga::ShaderStage> {
    match stage {
        Stage::Vertex => Some(naga::ShaderStage::Vertex),
        Stage::Fragment => Some(naga::ShaderStage::Fragment),
        Stage::Compute => Some(naga::ShaderStage::Compute),
        _ => None,
    }
}

/// Replaces whole identifiers in generated source.
fn replace_identifier(text: &str, from: &str, to: &str) -> String {
    if from.is_empty() {
        return text.to_owned();
    }

    let is_identifier = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(index) = rest.find(from) {
        let before = rest[..index].chars().next_back();
        let after = rest[index + from.len()..].chars().next();

        result.push_str(&rest[..index]);

        if before.is_some_and(is_identifier) || after.is_some_and(is_identifier) {
            result.push_str(from);
        } else {
            result.push_str(to);
        }

        rest = &rest[index + from.len()..];
    }

    result.push_str(rest);

    result
}

/// Returns whether `name` appears as a whole identifier in `text`.
fn contains_identifier(text: &str, name: &str) -> bool {
    replace_identifier(text, name, "") != text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert_eq!(
            replace_identifier("a_b + a_bc * xa_b.a_b;", "a_b", "value"),
            "value + a_bc * xa_b.value;",
        );
        assert!(contains_identifier("uniform Transform x;", "Transform"));
        assert!(!contains_identifier("uniform Transforms x;", "Transform"));
    }
}
