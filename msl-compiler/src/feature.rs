// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Capabilities a target may or may not support.
//!
//! Each feature is exposed to shader sources as a `HAS_*` macro defined to `1` or `0`. Whether a
//! feature is enabled is decided by the backend, unless it was explicitly overridden.

use std::{
    error::Error,
    fmt::{Display, Error as FmtError, Formatter},
    str::FromStr,
};

macro_rules! features {
    {
        $(
            $(#[doc = $doc:literal])*
            $variant:ident = $name:literal, $define:literal, $help:literal;
        )+
    } => {
        /// A capability of a target.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Feature {
            $(
                $(#[doc = $doc])*
                $variant,
            )+
        }

        impl Feature {
            /// Every feature, in declaration order.
            pub const ALL: &'static [Feature] = &[$(Feature::$variant),+];

            pub const COUNT: usize = Feature::ALL.len();

            /// Returns the name used to override the feature in configurations.
            #[inline]
            pub const fn name(self) -> &'static str {
                match self {
                    $(Feature::$variant => $name,)+
                }
            }

            /// Returns the macro defined in shader sources.
            #[inline]
            pub const fn define(self) -> &'static str {
                match self {
                    $(Feature::$variant => $define,)+
                }
            }

            #[inline]
            pub const fn help(self) -> &'static str {
                match self {
                    $(Feature::$variant => $help,)+
                }
            }
        }
    };
}

features! {
    Integers = "integers", "HAS_INTEGERS", "Integer types.";
    Doubles = "doubles", "HAS_DOUBLES", "Double-precision floating point types.";
    NonSquareMatrices = "nonSquareMatrices", "HAS_NON_SQUARE_MATRICES", "Matrices with a different number of rows and columns.";
    Texture3D = "texture3D", "HAS_TEXTURE3D", "3D textures.";
    TextureArray = "textureArray", "HAS_TEXTURE_ARRAY", "Texture arrays.";
    ShadowSamplers = "shadowSamplers", "HAS_SHADOW_SAMPLERS", "Samplers that perform depth comparison.";
    MultisampledTextures = "multisampledTextures", "HAS_MULTISAMPLED_TEXTURES", "Multisampled textures.";
    IntegerTextures = "integerTextures", "HAS_INTEGER_TEXTURES", "Textures with integer and unsigned integer components.";
    Images = "images", "HAS_IMAGES", "Storage images that can be read and written.";
    UniformBlocks = "uniformBlocks", "HAS_UNIFORM_BLOCKS", "Uniform blocks. Without them uniform blocks are flattened into free uniforms.";
    Buffers = "buffers", "HAS_BUFFERS", "Shader storage buffers.";
    Std140 = "std140", "HAS_STD140", "The std140 block layout.";
    Std430 = "std430", "HAS_STD430", "The std430 block layout.";
    BindingPoints = "bindingPoints", "HAS_BINDING_POINTS", "Explicit binding points for uniforms.";
    DescriptorSets = "descriptorSets", "HAS_DESCRIPTOR_SETS", "Descriptor sets for uniforms.";
    TessellationStages = "tessellationStages", "HAS_TESSELLATION_STAGES", "Tessellation control and evaluation stages.";
    GeometryStage = "geometryStage", "HAS_GEOMETRY_STAGE", "The geometry stage.";
    ComputeStage = "computeStage", "HAS_COMPUTE_STAGE", "The compute stage.";
    MultipleRenderTargets = "multipleRenderTargets", "HAS_MULTIPLE_RENDER_TARGETS", "Writing to more than one render target.";
    DualSourceBlending = "dualSourceBlending", "HAS_DUAL_SOURCE_BLENDING", "Blending with two fragment outputs.";
    DepthHints = "depthHints", "HAS_DEPTH_HINTS", "Declaring how a fragment shader modifies the depth.";
    Derivatives = "derivatives", "HAS_DERIVATIVES", "Screen-space derivative functions.";
    AdvancedDerivatives = "advancedDerivatives", "HAS_ADVANCED_DERIVATIVES", "Coarse and fine derivative functions.";
    MemoryBarriers = "memoryBarriers", "HAS_MEMORY_BARRIERS", "Memory barrier functions.";
    PrimitiveStreams = "primitiveStreams", "HAS_PRIMITIVE_STREAMS", "Multiple output streams from the geometry stage.";
    InterpolationFunctions = "interpolationFunctions", "HAS_INTERPOLATION_FUNCTIONS", "Functions that interpolate fragment inputs at custom positions.";
    TextureGather = "textureGather", "HAS_TEXTURE_GATHER", "The textureGather() functions.";
    TexelFetch = "texelFetch", "HAS_TEXEL_FETCH", "The texelFetch() functions.";
    TextureSize = "textureSize", "HAS_TEXTURE_SIZE", "The textureSize() functions.";
    QueryLod = "queryLod", "HAS_QUERY_LOD", "The textureQueryLod() function.";
    QueryLevels = "queryLevels", "HAS_QUERY_LEVELS", "The textureQueryLevels() function.";
    TextureSamples = "textureSamples", "HAS_TEXTURE_SAMPLES", "The textureSamples() function.";
    BitFunctions = "bitFunctions", "HAS_BIT_FUNCTIONS", "Bit manipulation functions.";
    PackingFunctions = "packingFunctions", "HAS_PACKING_FUNCTIONS", "Functions that pack and unpack values.";
    SubpassInputs = "subpassInputs", "HAS_SUBPASS_INPUTS", "Reading render pass attachments with subpass inputs.";
    ClipDistance = "clipDistance", "HAS_CLIP_DISTANCE", "Writing gl_ClipDistance.";
    CullDistance = "cullDistance", "HAS_CULL_DISTANCE", "Writing gl_CullDistance.";
    EarlyFragmentTests = "earlyFragmentTests", "HAS_EARLY_FRAGMENT_TESTS", "Forcing depth and stencil tests to run before the fragment shader.";
    FragmentInputs = "fragmentInputs", "HAS_FRAGMENT_INPUTS", "Reading the current framebuffer values through fragment_inputs blocks.";
}

impl Feature {
    #[inline]
    pub fn from_name(name: &str) -> Option<Feature> {
        Feature::ALL.iter().copied().find(|feature| feature.name() == name)
    }
}

impl FromStr for Feature {
    type Err = UnknownFeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::from_name(s).ok_or(UnknownFeatureError)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownFeatureError;

impl Error for UnknownFeatureError {}

impl Display for UnknownFeatureError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str("unknown feature name")
    }
}

/// Whether a feature is enabled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FeatureState {
    /// Enabled if the backend supports it.
    #[default]
    Default,
    Enabled,
    Disabled,
}

/// Per-feature overrides.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureStates {
    states: [FeatureState; Feature::COUNT],
}

impl Default for FeatureStates {
    #[inline]
    fn default() -> Self {
        FeatureStates {
            states: [FeatureState::Default; Feature::COUNT],
        }
    }
}

impl FeatureStates {
    #[inline]
    pub fn new() -> Self {
        FeatureStates::default()
    }

    #[inline]
    pub fn get(&self, feature: Feature) -> FeatureState {
        self.states[feature as usize]
    }

    #[inline]
    pub fn set(&mut self, feature: Feature, state: FeatureState) {
        self.states[feature as usize] = state;
    }

    /// Returns whether `feature` is enabled, falling back to `supported` if it isn't overridden.
    #[inline]
    pub fn is_enabled(&self, feature: Feature, supported: bool) -> bool {
        match self.get(feature) {
            FeatureState::Default => supported,
            FeatureState::Enabled => true,
            FeatureState::Disabled => false,
        }
    }
}
