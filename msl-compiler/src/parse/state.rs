// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The render-state and sampler-state vocabulary.

use crate::preprocess::parse_integer;
use msl_module::state::{
    AddressMode, BlendAttachmentState, BlendFactor, BlendOp, Bool, BorderColor, ColorMask,
    CompareOp, CullMode, Filter, FrontFace, LogicOp, MipFilter, PolygonMode, RenderState,
    SamplerState, StencilOp, StencilOpState, MAX_ATTACHMENTS,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StateError {
    UnknownField,
    InvalidValue,
    /// An attachment index on a field that isn't per attachment, or out of range.
    InvalidIndex,
}

fn parse_bool(value: &str) -> Result<Bool, StateError> {
    match value {
        "true" | "1" => Ok(Bool::True),
        "false" | "0" => Ok(Bool::False),
        _ => Err(StateError::InvalidValue),
    }
}

fn parse_float(value: &str) -> Result<f32, StateError> {
    let value = value
        .strip_suffix('f')
        .or_else(|| value.strip_suffix('F'))
        .unwrap_or(value);

    value
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or(StateError::InvalidValue)
}

fn parse_uint(value: &str) -> Result<u32, StateError> {
    parse_integer(value)
        .and_then(|value| u32::try_from(value).ok())
        .ok_or(StateError::InvalidValue)
}

fn parse_enum<T>(value: &str, from_name: fn(&str) -> Option<T>) -> Result<T, StateError> {
    from_name(value).ok_or(StateError::InvalidValue)
}

/// Sets a render-state field by name.
///
/// `index` is the attachment index written as `field[index]`. Blend attachment fields without an
/// index apply to every attachment.
pub(crate) fn set_render_state(
    state: &mut RenderState,
    name: &str,
    index: Option<u32>,
    value: &str,
) -> Result<(), StateError> {
    if let Some(result) = set_blend_attachment(&mut state.blend_state.attachments, name, index, value)
    {
        return result;
    }

    if index.is_some() {
        return if is_render_state_field(name) {
            Err(StateError::InvalidIndex)
        } else {
            Err(StateError::UnknownField)
        };
    }

    let rasterization = &mut state.rasterization_state;
    let multisample = &mut state.multisample_state;
    let depth_stencil = &mut state.depth_stencil_state;
    let blend = &mut state.blend_state;

    match name {
        "depth_clamp_enable" => rasterization.depth_clamp_enable = parse_bool(value)?,
        "rasterizer_discard_enable" => rasterization.rasterizer_discard_enable = parse_bool(value)?,
        "polygon_mode" => rasterization.polygon_mode = parse_enum(value, PolygonMode::from_name)?,
        "cull_mode" => rasterization.cull_mode = parse_enum(value, CullMode::from_name)?,
        "front_face" => rasterization.front_face = parse_enum(value, FrontFace::from_name)?,
        "depth_bias_enable" => rasterization.depth_bias_enable = parse_bool(value)?,
        "depth_bias_constant_factor" => {
            rasterization.depth_bias_constant_factor = parse_float(value)?;
        }
        "depth_bias_clamp" => rasterization.depth_bias_clamp = parse_float(value)?,
        "depth_bias_slope_factor" => rasterization.depth_bias_slope_factor = parse_float(value)?,
        "line_width" => rasterization.line_width = parse_float(value)?,

        "sample_shading_enable" => multisample.sample_shading_enable = parse_bool(value)?,
        "min_sample_shading" => multisample.min_sample_shading = parse_float(value)?,
        "sample_mask" => multisample.sample_mask = parse_uint(value)?,
        "alpha_to_coverage_enable" => multisample.alpha_to_coverage_enable = parse_bool(value)?,
        "alpha_to_one_enable" => multisample.alpha_to_one_enable = parse_bool(value)?,

        "depth_test_enable" => depth_stencil.depth_test_enable = parse_bool(value)?,
        "depth_write_enable" => depth_stencil.depth_write_enable = parse_bool(value)?,
        "depth_compare_op" => {
            depth_stencil.depth_compare_op = parse_enum(value, CompareOp::from_name)?;
        }
        "depth_bounds_test_enable" => depth_stencil.depth_bounds_test_enable = parse_bool(value)?,
        "stencil_test_enable" => depth_stencil.stencil_test_enable = parse_bool(value)?,
        "min_depth_bounds" => depth_stencil.min_depth_bounds = parse_float(value)?,
        "max_depth_bounds" => depth_stencil.max_depth_bounds = parse_float(value)?,

        "logic_op_enable" => blend.logic_op_enable = parse_bool(value)?,
        "logic_op" => blend.logic_op = parse_enum(value, LogicOp::from_name)?,
        "separate_attachment_blending_enable" => {
            blend.separate_attachment_blending_enable = parse_bool(value)?;
        }
        "blend_constants" => {
            let constants = value
                .split(',')
                .map(|constant| parse_float(constant.trim()))
                .collect::<Result<Vec<_>, _>>()?;

            match constants.as_slice() {
                [constant] => blend.blend_constants = [*constant; 4],
                [r, g, b, a] => blend.blend_constants = [*r, *g, *b, *a],
                _ => return Err(StateError::InvalidValue),
            }
        }

        "patch_control_points" => state.patch_control_points = parse_uint(value)?,
        "early_fragment_tests" => state.early_fragment_tests = parse_bool(value)?,

        _ => {
            if let Some(stencil_name) = name.strip_prefix("stencil_") {
                let value = parse_stencil(stencil_name, value)?;
                apply_stencil(&mut depth_stencil.front_stencil, value);
                apply_stencil(&mut depth_stencil.back_stencil, value);
            } else if let Some(stencil_name) = name.strip_prefix("front_stencil_") {
                let value = parse_stencil(stencil_name, value)?;
                apply_stencil(&mut depth_stencil.front_stencil, value);
            } else if let Some(stencil_name) = name.strip_prefix("back_stencil_") {
                let value = parse_stencil(stencil_name, value)?;
                apply_stencil(&mut depth_stencil.back_stencil, value);
            } else {
                return Err(StateError::UnknownField);
            }
        }
    }

    Ok(())
}

fn is_render_state_field(name: &str) -> bool {
    let mut state = RenderState::default();

    // Any valid value works for probing, so try the vocabulary of each field type.
    ["true", "1", "none", "keep", "always", "fill", "clockwise", "clear"]
        .iter()
        .any(|value| {
            !matches!(
                set_render_state(&mut state, name, None, value),
                Err(StateError::UnknownField)
            )
        })
}

#[derive(Clone, Copy, Debug)]
enum StencilValue {
    FailOp(StencilOp),
    PassOp(StencilOp),
    DepthFailOp(StencilOp),
    CompareOp(CompareOp),
    CompareMask(u32),
    WriteMask(u32),
    Reference(u32),
}

fn parse_stencil(name: &str, value: &str) -> Result<StencilValue, StateError> {
    Ok(match name {
        "fail_op" => StencilValue::FailOp(parse_enum(value, StencilOp::from_name)?),
        "pass_op" => StencilValue::PassOp(parse_enum(value, StencilOp::from_name)?),
        "depth_fail_op" => StencilValue::DepthFailOp(parse_enum(value, StencilOp::from_name)?),
        "compare_op" => StencilValue::CompareOp(parse_enum(value, CompareOp::from_name)?),
        "compare_mask" => StencilValue::CompareMask(parse_uint(value)?),
        "write_mask" => StencilValue::WriteMask(parse_uint(value)?),
        "reference" => StencilValue::Reference(parse_uint(value)?),
        _ => return Err(StateError::UnknownField),
    })
}

fn apply_stencil(state: &mut StencilOpState, value: StencilValue) {
    match value {
        StencilValue::FailOp(op) => state.fail_op = op,
        StencilValue::PassOp(op) => state.pass_op = op,
        StencilValue::DepthFailOp(op) => state.depth_fail_op = op,
        StencilValue::CompareOp(op) => state.compare_op = op,
        StencilValue::CompareMask(mask) => state.compare_mask = mask,
        StencilValue::WriteMask(mask) => state.write_mask = mask,
        StencilValue::Reference(reference) => state.reference = reference,
    }
}

/// Sets a blend attachment field. Returns `None` if `name` isn't a blend attachment field.
fn set_blend_attachment(
    attachments: &mut [BlendAttachmentState; MAX_ATTACHMENTS],
    name: &str,
    index: Option<u32>,
    value: &str,
) -> Option<Result<(), StateError>> {
    let setter: fn(&mut BlendAttachmentState, &str) -> Result<(), StateError> = match name {
        "blend_enable" => |state, value| {
            state.blend_enable = parse_bool(value)?;
            Ok(())
        },
        "src_color_blend_factor" => |state, value| {
            state.src_color_blend_factor = parse_enum(value, BlendFactor::from_name)?;
            Ok(())
        },
        "dst_color_blend_factor" => |state, value| {
            state.dst_color_blend_factor = parse_enum(value, BlendFactor::from_name)?;
            Ok(())
        },
        "color_blend_op" => |state, value| {
            state.color_blend_op = parse_enum(value, BlendOp::from_name)?;
            Ok(())
        },
        "src_alpha_blend_factor" => |state, value| {
            state.src_alpha_blend_factor = parse_enum(value, BlendFactor::from_name)?;
            Ok(())
        },
        "dst_alpha_blend_factor" => |state, value| {
            state.dst_alpha_blend_factor = parse_enum(value, BlendFactor::from_name)?;
            Ok(())
        },
        "alpha_blend_op" => |state, value| {
            state.alpha_blend_op = parse_enum(value, BlendOp::from_name)?;
            Ok(())
        },
        "src_blend_factor" => |state, value| {
            let factor = parse_enum(value, BlendFactor::from_name)?;
            state.src_color_blend_factor = factor;
            state.src_alpha_blend_factor = factor;
            Ok(())
        },
        "dst_blend_factor" => |state, value| {
            let factor = parse_enum(value, BlendFactor::from_name)?;
            state.dst_color_blend_factor = factor;
            state.dst_alpha_blend_factor = factor;
            Ok(())
        },
        "blend_op" => |state, value| {
            let op = parse_enum(value, BlendOp::from_name)?;
            state.color_blend_op = op;
            state.alpha_blend_op = op;
            Ok(())
        },
        "color_write_mask" => |state, value| {
            state.color_write_mask = ColorMask::from_name(value).ok_or(StateError::InvalidValue)?;
            Ok(())
        },
        _ => return None,
    };

    Some(match index {
        Some(index) => match attachments.get_mut(index as usize) {
            Some(attachment) => setter(attachment, value),
            None => Err(StateError::InvalidIndex),
        },
        None => attachments
            .iter_mut()
            .try_for_each(|attachment| setter(attachment, value)),
    })
}

/// Sets a sampler-state field by name.
pub(crate) fn set_sampler_state(
    state: &mut SamplerState,
    name: &str,
    value: &str,
) -> Result<(), StateError> {
    match name {
        "min_filter" => state.min_filter = parse_enum(value, Filter::from_name)?,
        "mag_filter" => state.mag_filter = parse_enum(value, Filter::from_name)?,
        "mip_filter" => state.mip_filter = parse_enum(value, MipFilter::from_name)?,
        "address_mode_u" => state.address_mode_u = parse_enum(value, AddressMode::from_name)?,
        "address_mode_v" => state.address_mode_v = parse_enum(value, AddressMode::from_name)?,
        "address_mode_w" => state.address_mode_w = parse_enum(value, AddressMode::from_name)?,
        "mip_lod_bias" => state.mip_lod_bias = parse_float(value)?,
        "max_anisotropy" => state.max_anisotropy = parse_float(value)?,
        "min_lod" => state.min_lod = parse_float(value)?,
        "max_lod" => state.max_lod = parse_float(value)?,
        "border_color" => state.border_color = parse_enum(value, BorderColor::from_name)?,
        "compare_op" => state.compare_op = parse_enum(value, CompareOp::from_name)?,
        _ => return Err(StateError::UnknownField),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use msl_module::UNKNOWN_FLOAT;

    #[test]
    fn render_state_fields() {
        let mut state = RenderState::default();

        set_render_state(&mut state, "cull_mode", None, "back").unwrap();
        set_render_state(&mut state, "depth_compare_op", None, "less_or_equal").unwrap();
        set_render_state(&mut state, "line_width", None, "2.5f").unwrap();
        set_render_state(&mut state, "sample_mask", None, "0xFF").unwrap();
        set_render_state(&mut state, "stencil_fail_op", None, "replace").unwrap();
        set_render_state(&mut state, "back_stencil_reference", None, "3").unwrap();
        set_render_state(&mut state, "blend_constants", None, "0.5, 1.0, 0, 1").unwrap();
        set_render_state(&mut state, "early_fragment_tests", None, "true").unwrap();

        assert_eq!(state.rasterization_state.cull_mode, CullMode::Back);
        assert_eq!(state.depth_stencil_state.depth_compare_op, CompareOp::LessOrEqual);
        assert_eq!(state.rasterization_state.line_width, 2.5);
        assert_eq!(state.multisample_state.sample_mask, 0xFF);
        assert_eq!(state.depth_stencil_state.front_stencil.fail_op, StencilOp::Replace);
        assert_eq!(state.depth_stencil_state.back_stencil.fail_op, StencilOp::Replace);
        assert_eq!(state.depth_stencil_state.back_stencil.reference, 3);
        assert_eq!(state.depth_stencil_state.front_stencil.reference, u32::MAX);
        assert_eq!(state.blend_state.blend_constants, [0.5, 1.0, 0.0, 1.0]);
        assert_eq!(state.early_fragment_tests, Bool::True);
        assert_eq!(state.rasterization_state.depth_bias_clamp, UNKNOWN_FLOAT);
    }

    #[test]
    fn blend_attachments() {
        let mut state = RenderState::default();

        set_render_state(&mut state, "src_blend_factor", None, "src_alpha").unwrap();
        set_render_state(&mut state, "dst_color_blend_factor", Some(1), "one").unwrap();
        set_render_state(&mut state, "color_write_mask", Some(2), "rgb").unwrap();

        let attachments = &state.blend_state.attachments;
        assert_eq!(attachments[0].src_color_blend_factor, BlendFactor::SrcAlpha);
        assert_eq!(attachments[15].src_alpha_blend_factor, BlendFactor::SrcAlpha);
        assert_eq!(attachments[1].dst_color_blend_factor, BlendFactor::One);
        assert_eq!(attachments[0].dst_color_blend_factor, BlendFactor::Unset);
        assert_eq!(attachments[2].color_write_mask, ColorMask(0x7));
        assert_eq!(attachments[3].color_write_mask, ColorMask::UNSET);
    }

    #[test]
    fn render_state_errors() {
        let mut state = RenderState::default();

        assert_eq!(
            set_render_state(&mut state, "cull_mode", None, "sideways"),
            Err(StateError::InvalidValue),
        );
        assert_eq!(
            set_render_state(&mut state, "no_such_field", None, "1"),
            Err(StateError::UnknownField),
        );
        assert_eq!(
            set_render_state(&mut state, "blend_enable", Some(16), "true"),
            Err(StateError::InvalidIndex),
        );
        assert_eq!(
            set_render_state(&mut state, "cull_mode", Some(0), "back"),
            Err(StateError::InvalidIndex),
        );
        assert_eq!(
            set_render_state(&mut state, "line_width", None, "wide"),
            Err(StateError::InvalidValue),
        );
        assert_eq!(
            set_render_state(&mut state, "blend_constants", None, "1, 2"),
            Err(StateError::InvalidValue),
        );
        assert_eq!(state, RenderState::default());
    }

    #[test]
    fn sampler_fields() {
        let mut state = SamplerState::default();

        set_sampler_state(&mut state, "min_filter", "linear").unwrap();
        set_sampler_state(&mut state, "mip_filter", "anisotropic").unwrap();
        set_sampler_state(&mut state, "address_mode_v", "clamp_to_edge").unwrap();
        set_sampler_state(&mut state, "max_anisotropy", "16").unwrap();

        assert_eq!(state.min_filter, Filter::Linear);
        assert_eq!(state.mip_filter, MipFilter::Anisotropic);
        assert_eq!(state.address_mode_v, AddressMode::ClampToEdge);
        assert_eq!(state.max_anisotropy, 16.0);
        assert_eq!(state.mag_filter, Filter::Unset);

        assert_eq!(
            set_sampler_state(&mut state, "anisotropy", "16"),
            Err(StateError::UnknownField),
        );
        assert_eq!(
            set_sampler_state(&mut state, "min_filter", "cubic"),
            Err(StateError::InvalidValue),
        );
    }
}
