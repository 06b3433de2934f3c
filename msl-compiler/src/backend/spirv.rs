// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::{Backend, CrossCompileRequest};
use crate::{
    diagnostic::{CompileError, Output},
    feature::Feature,
};
use msl_module::TARGET_SPIRV;

/// Stores the SPIR-V of each stage as is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpirvBackend {
    version: u32,
}

impl SpirvBackend {
    /// `version` is the SPIR-V version as `major * 100 + minor * 10`, such as 100 for 1.0.
    #[inline]
    pub fn new(version: u32) -> Self {
        SpirvBackend { version }
    }
}

impl Default for SpirvBackend {
    #[inline]
    fn default() -> Self {
        SpirvBackend::new(100)
    }
}

impl Backend for SpirvBackend {
    fn id(&self) -> u32 {
        TARGET_SPIRV
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn feature_supported(&self, feature: Feature) -> bool {
        // Vulkan reads attachments through subpass inputs instead.
        !matches!(feature, Feature::FragmentInputs)
    }

    fn extra_defines(&self) -> Vec<(String, String)> {
        vec![("SPIRV_VERSION".to_owned(), self.version.to_string())]
    }

    fn needs_reflection_names(&self) -> bool {
        false
    }

    fn ir_version(&self) -> u32 {
        self.version
    }

    fn supports_adjustable_bindings(&self) -> bool {
        true
    }

    fn cross_compile(
        &mut self,
        _output: &mut Output,
        request: &CrossCompileRequest<'_>,
    ) -> Result<Vec<u8>, CompileError> {
        Ok(request.spirv.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities() {
        let backend = SpirvBackend::new(130);

        assert_eq!(backend.version(), 130);
        assert_eq!(backend.ir_version(), 130);
        assert!(!backend.needs_reflection_names());
        assert!(backend.supports_adjustable_bindings());
        assert!(backend.feature_supported(Feature::TessellationStages));
        assert!(backend.feature_supported(Feature::SubpassInputs));
        assert!(!backend.feature_supported(Feature::FragmentInputs));
        assert_eq!(
            backend.extra_defines(),
            [("SPIRV_VERSION".to_owned(), "130".to_owned())],
        );
    }
}
