// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Sampler and fixed-function render states declared alongside pipelines.
//!
//! Every field starts out unset. An unset enumeration is `Unset`, an unset float is
//! [`UNKNOWN_FLOAT`] and an unset integer is [`UNKNOWN`]. This lets the runtime tell a state that
//! was never written apart from one that was explicitly set to its default value.
//!
//! The enumerations use the Vulkan values, so they can be passed straight to Vulkan once checked
//! for `Unset`.

use crate::{macros::state_enum, UNKNOWN, UNKNOWN_FLOAT};

/// The maximum number of color attachments a blend state describes.
pub const MAX_ATTACHMENTS: usize = 16;

state_enum! {
    /// A boolean that may be left unset.
    Bool;

    False = 0, "false",
    True = 1, "true",
}

impl Bool {
    /// Returns the value as a `bool`, or `None` if unset.
    #[inline]
    pub fn get(self) -> Option<bool> {
        match self {
            Bool::Unset => None,
            Bool::False => Some(false),
            Bool::True => Some(true),
        }
    }
}

impl From<bool> for Bool {
    #[inline]
    fn from(val: bool) -> Self {
        if val {
            Bool::True
        } else {
            Bool::False
        }
    }
}

state_enum! {
    /// How polygons are rasterized.
    PolygonMode;

    Fill = 0, "fill",
    Line = 1, "line",
    Point = 2, "point",
}

state_enum! {
    /// Which faces are culled.
    CullMode;

    None = 0, "none",
    Front = 1, "front",
    Back = 2, "back",
    FrontAndBack = 3, "front_and_back",
}

state_enum! {
    /// The winding order of front-facing polygons.
    FrontFace;

    CounterClockwise = 0, "counter_clockwise",
    Clockwise = 1, "clockwise",
}

state_enum! {
    /// What happens to a stencil value.
    StencilOp;

    Keep = 0, "keep",
    Zero = 1, "zero",
    Replace = 2, "replace",
    IncrementAndClamp = 3, "increment_and_clamp",
    DecrementAndClamp = 4, "decrement_and_clamp",
    Invert = 5, "invert",
    IncrementAndWrap = 6, "increment_and_wrap",
    DecrementAndWrap = 7, "decrement_and_wrap",
}

state_enum! {
    /// A comparison between a reference value and a stored value.
    CompareOp;

    Never = 0, "never",
    Less = 1, "less",
    Equal = 2, "equal",
    LessOrEqual = 3, "less_or_equal",
    Greater = 4, "greater",
    NotEqual = 5, "not_equal",
    GreaterOrEqual = 6, "greater_or_equal",
    Always = 7, "always",
}

state_enum! {
    /// A multiplier applied to a blend operand.
    BlendFactor;

    Zero = 0, "zero",
    One = 1, "one",
    SrcColor = 2, "src_color",
    OneMinusSrcColor = 3, "one_minus_src_color",
    DstColor = 4, "dst_color",
    OneMinusDstColor = 5, "one_minus_dst_color",
    SrcAlpha = 6, "src_alpha",
    OneMinusSrcAlpha = 7, "one_minus_src_alpha",
    DstAlpha = 8, "dst_alpha",
    OneMinusDstAlpha = 9, "one_minus_dst_alpha",
    ConstColor = 10, "const_color",
    OneMinusConstColor = 11, "one_minus_const_color",
    ConstAlpha = 12, "const_alpha",
    OneMinusConstAlpha = 13, "one_minus_const_alpha",
    SrcAlphaSaturate = 14, "src_alpha_saturate",
    Src1Color = 15, "src1_color",
    OneMinusSrc1Color = 16, "one_minus_src1_color",
    Src1Alpha = 17, "src1_alpha",
    OneMinusSrc1Alpha = 18, "one_minus_src1_alpha",
}

state_enum! {
    /// How the source and destination of a blend are combined.
    BlendOp;

    Add = 0, "add",
    Subtract = 1, "subtract",
    ReverseSubtract = 2, "reverse_subtract",
    Min = 3, "min",
    Max = 4, "max",
}

state_enum! {
    /// A bitwise operation applied to color attachments instead of blending.
    LogicOp;

    Clear = 0, "clear",
    And = 1, "and",
    AndReverse = 2, "and_reverse",
    Copy = 3, "copy",
    AndInverted = 4, "and_inverted",
    NoOp = 5, "no_op",
    Xor = 6, "xor",
    Or = 7, "or",
    Nor = 8, "nor",
    Equivalent = 9, "equivalent",
    Invert = 10, "invert",
    OrReverse = 11, "or_reverse",
    CopyInverted = 12, "copy_inverted",
    OrInverted = 13, "or_inverted",
    Nand = 14, "nand",
    Set = 15, "set",
}

state_enum! {
    /// Texel filtering.
    Filter;

    Nearest = 0, "nearest",
    Linear = 1, "linear",
}

state_enum! {
    /// Filtering between mip levels.
    MipFilter;

    None = 0, "none",
    Nearest = 1, "nearest",
    Linear = 2, "linear",
    Anisotropic = 3, "anisotropic",
}

state_enum! {
    /// What happens to texture coordinates outside of `[0, 1]`.
    AddressMode;

    Repeat = 0, "repeat",
    MirroredRepeat = 1, "mirrored_repeat",
    ClampToEdge = 2, "clamp_to_edge",
    ClampToBorder = 3, "clamp_to_border",
    MirrorOnce = 4, "mirror_once",
}

state_enum! {
    /// The color returned for texels outside of the image with `ClampToBorder`.
    BorderColor;

    TransparentBlack = 0, "transparent_black",
    TransparentIntZero = 1, "transparent_int_zero",
    OpaqueBlack = 2, "opaque_black",
    OpaqueIntZero = 3, "opaque_int_zero",
    OpaqueWhite = 4, "opaque_white",
    OpaqueIntOne = 5, "opaque_int_one",
}

/// Which color components are written to an attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorMask(pub i32);

impl ColorMask {
    pub const UNSET: Self = Self(-1);
    pub const NONE: Self = Self(0);
    pub const R: Self = Self(0x1);
    pub const G: Self = Self(0x2);
    pub const B: Self = Self(0x4);
    pub const A: Self = Self(0x8);
    pub const ALL: Self = Self(0xF);

    #[inline]
    pub const fn is_set(self) -> bool {
        self.0 >= 0
    }

    /// Parses a mask written as a combination of `r`, `g`, `b` and `a`, or `none`.
    pub fn from_name(name: &str) -> Option<Self> {
        if name == "none" || name == "0" {
            return Some(Self::NONE);
        }

        let mut mask = 0;

        for c in name.chars() {
            let bit = match c {
                'r' | 'R' => Self::R.0,
                'g' | 'G' => Self::G.0,
                'b' | 'B' => Self::B.0,
                'a' | 'A' => Self::A.0,
                _ => return None,
            };

            if mask & bit != 0 {
                return None;
            }

            mask |= bit;
        }

        (mask != 0).then_some(Self(mask))
    }
}

impl Default for ColorMask {
    #[inline]
    fn default() -> Self {
        Self::UNSET
    }
}

/// How a sampled image is read.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SamplerState {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mip_filter: MipFilter,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: f32,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: BorderColor,
    /// Makes this a comparison sampler for shadow lookups.
    pub compare_op: CompareOp,
}

impl Default for SamplerState {
    #[inline]
    fn default() -> Self {
        Self {
            min_filter: Filter::Unset,
            mag_filter: Filter::Unset,
            mip_filter: MipFilter::Unset,
            address_mode_u: AddressMode::Unset,
            address_mode_v: AddressMode::Unset,
            address_mode_w: AddressMode::Unset,
            mip_lod_bias: UNKNOWN_FLOAT,
            max_anisotropy: UNKNOWN_FLOAT,
            min_lod: UNKNOWN_FLOAT,
            max_lod: UNKNOWN_FLOAT,
            border_color: BorderColor::Unset,
            compare_op: CompareOp::Unset,
        }
    }
}

/// The rasterization part of a render state.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RasterizationState {
    pub depth_clamp_enable: Bool,
    pub rasterizer_discard_enable: Bool,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_bias_enable: Bool,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_factor: f32,
    pub line_width: f32,
}

impl Default for RasterizationState {
    #[inline]
    fn default() -> Self {
        Self {
            depth_clamp_enable: Bool::Unset,
            rasterizer_discard_enable: Bool::Unset,
            polygon_mode: PolygonMode::Unset,
            cull_mode: CullMode::Unset,
            front_face: FrontFace::Unset,
            depth_bias_enable: Bool::Unset,
            depth_bias_constant_factor: UNKNOWN_FLOAT,
            depth_bias_clamp: UNKNOWN_FLOAT,
            depth_bias_slope_factor: UNKNOWN_FLOAT,
            line_width: UNKNOWN_FLOAT,
        }
    }
}

/// The multisampling part of a render state.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MultisampleState {
    pub sample_shading_enable: Bool,
    pub min_sample_shading: f32,
    pub sample_mask: u32,
    pub alpha_to_coverage_enable: Bool,
    pub alpha_to_one_enable: Bool,
}

impl Default for MultisampleState {
    #[inline]
    fn default() -> Self {
        Self {
            sample_shading_enable: Bool::Unset,
            min_sample_shading: UNKNOWN_FLOAT,
            sample_mask: UNKNOWN,
            alpha_to_coverage_enable: Bool::Unset,
            alpha_to_one_enable: Bool::Unset,
        }
    }
}

/// Stencil operations for one face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StencilOpState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl Default for StencilOpState {
    #[inline]
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Unset,
            pass_op: StencilOp::Unset,
            depth_fail_op: StencilOp::Unset,
            compare_op: CompareOp::Unset,
            compare_mask: UNKNOWN,
            write_mask: UNKNOWN,
            reference: UNKNOWN,
        }
    }
}

/// The depth and stencil part of a render state.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DepthStencilState {
    pub depth_test_enable: Bool,
    pub depth_write_enable: Bool,
    pub depth_compare_op: CompareOp,
    pub depth_bounds_test_enable: Bool,
    pub stencil_test_enable: Bool,
    pub front_stencil: StencilOpState,
    pub back_stencil: StencilOpState,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,
}

impl Default for DepthStencilState {
    #[inline]
    fn default() -> Self {
        Self {
            depth_test_enable: Bool::Unset,
            depth_write_enable: Bool::Unset,
            depth_compare_op: CompareOp::Unset,
            depth_bounds_test_enable: Bool::Unset,
            stencil_test_enable: Bool::Unset,
            front_stencil: StencilOpState::default(),
            back_stencil: StencilOpState::default(),
            min_depth_bounds: UNKNOWN_FLOAT,
            max_depth_bounds: UNKNOWN_FLOAT,
        }
    }
}

/// How the output of the fragment stage is blended into one color attachment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlendAttachmentState {
    pub blend_enable: Bool,
    pub src_color_blend_factor: BlendFactor,
    pub dst_color_blend_factor: BlendFactor,
    pub color_blend_op: BlendOp,
    pub src_alpha_blend_factor: BlendFactor,
    pub dst_alpha_blend_factor: BlendFactor,
    pub alpha_blend_op: BlendOp,
    pub color_write_mask: ColorMask,
}

/// The blending part of a render state.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlendState {
    pub logic_op_enable: Bool,
    pub logic_op: LogicOp,
    /// Whether attachments after the first use their own blend state. Otherwise every attachment
    /// uses the state of attachment 0.
    pub separate_attachment_blending_enable: Bool,
    pub attachments: [BlendAttachmentState; MAX_ATTACHMENTS],
    pub blend_constants: [f32; 4],
}

impl Default for BlendState {
    #[inline]
    fn default() -> Self {
        Self {
            logic_op_enable: Bool::Unset,
            logic_op: LogicOp::Unset,
            separate_attachment_blending_enable: Bool::Unset,
            attachments: [BlendAttachmentState::default(); MAX_ATTACHMENTS],
            blend_constants: [UNKNOWN_FLOAT; 4],
        }
    }
}

/// The fixed-function state of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RenderState {
    pub rasterization_state: RasterizationState,
    pub multisample_state: MultisampleState,
    pub depth_stencil_state: DepthStencilState,
    pub blend_state: BlendState,
    pub patch_control_points: u32,
    /// The number of clip distances written by the last vertex processing stage.
    pub clip_distance_count: u32,
    /// The number of cull distances written by the last vertex processing stage.
    pub cull_distance_count: u32,
    pub early_fragment_tests: Bool,
}

impl Default for RenderState {
    #[inline]
    fn default() -> Self {
        Self {
            rasterization_state: RasterizationState::default(),
            multisample_state: MultisampleState::default(),
            depth_stencil_state: DepthStencilState::default(),
            blend_state: BlendState::default(),
            patch_control_points: UNKNOWN,
            clip_distance_count: UNKNOWN,
            cull_distance_count: UNKNOWN,
            early_fragment_tests: Bool::Unset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_is_minus_one() {
        assert_eq!(Bool::Unset.as_raw(), -1);
        assert_eq!(PolygonMode::Unset.as_raw(), -1);
        assert_eq!(CullMode::Unset.as_raw(), -1);
        assert_eq!(FrontFace::Unset.as_raw(), -1);
        assert_eq!(StencilOp::Unset.as_raw(), -1);
        assert_eq!(CompareOp::Unset.as_raw(), -1);
        assert_eq!(BlendFactor::Unset.as_raw(), -1);
        assert_eq!(BlendOp::Unset.as_raw(), -1);
        assert_eq!(LogicOp::Unset.as_raw(), -1);
        assert_eq!(Filter::Unset.as_raw(), -1);
        assert_eq!(MipFilter::Unset.as_raw(), -1);
        assert_eq!(AddressMode::Unset.as_raw(), -1);
        assert_eq!(BorderColor::Unset.as_raw(), -1);
        assert_eq!(ColorMask::default().0, -1);
    }

    #[test]
    fn vulkan_values() {
        assert_eq!(CompareOp::Always.as_raw(), 7);
        assert_eq!(StencilOp::DecrementAndWrap.as_raw(), 7);
        assert_eq!(BlendFactor::SrcAlpha.as_raw(), 6);
        assert_eq!(BlendFactor::OneMinusSrc1Alpha.as_raw(), 18);
        assert_eq!(BlendOp::Max.as_raw(), 4);
        assert_eq!(LogicOp::Set.as_raw(), 15);
        assert_eq!(CullMode::FrontAndBack.as_raw(), 3);
        assert_eq!(FrontFace::Clockwise.as_raw(), 1);
        assert_eq!(MipFilter::Anisotropic.as_raw(), 3);
        assert_eq!(AddressMode::MirrorOnce.as_raw(), 4);
        assert_eq!(BorderColor::OpaqueIntOne.as_raw(), 5);
    }

    #[test]
    fn names() {
        assert_eq!(BlendFactor::from_name("one_minus_src_alpha"), Some(BlendFactor::OneMinusSrcAlpha));
        assert_eq!(BlendFactor::OneMinusSrcAlpha.name(), Some("one_minus_src_alpha"));
        assert_eq!(CompareOp::from_name("lequal"), None);
        assert_eq!(Bool::from_name("true"), Some(Bool::True));
        assert_eq!(CompareOp::Unset.name(), None);

        for &op in LogicOp::ALL {
            assert_eq!(LogicOp::from_name(op.name().unwrap()), Some(op));
            assert_eq!(LogicOp::from_raw(op.as_raw()), Some(op));
        }

        assert_eq!(LogicOp::from_raw(16), None);
    }

    #[test]
    fn color_mask_names() {
        assert_eq!(ColorMask::from_name("rgba"), Some(ColorMask::ALL));
        assert_eq!(ColorMask::from_name("ra"), Some(ColorMask(0x9)));
        assert_eq!(ColorMask::from_name("none"), Some(ColorMask::NONE));
        assert_eq!(ColorMask::from_name("rr"), None);
        assert_eq!(ColorMask::from_name("x"), None);
    }

    #[test]
    fn defaults_are_unset() {
        let state = RenderState::default();
        assert_eq!(state.blend_state.attachments[15].src_color_blend_factor, BlendFactor::Unset);
        assert_eq!(state.rasterization_state.line_width, UNKNOWN_FLOAT);
        assert_eq!(state.patch_control_points, UNKNOWN);
        assert_eq!(SamplerState::default().max_lod, UNKNOWN_FLOAT);
        assert_eq!(SamplerState::default(), SamplerState::default());
    }
}
