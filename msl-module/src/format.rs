// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Low-level layout of the module format.
//!
//! A module is one little-endian buffer. Every record has a fixed size and every field is 4 bytes
//! wide and 4-byte aligned. Records refer to variable-length data (strings, tables, payloads)
//! through `(offset, count)` pairs relative to the start of the buffer, so the buffer can be used
//! in place after a single read.

use crate::{
    fourcc,
    state::{
        AddressMode, BlendAttachmentState, BlendFactor, BlendOp, BlendState, Bool, BorderColor,
        ColorMask, CompareOp, CullMode, DepthStencilState, Filter, FrontFace, LogicOp, MipFilter,
        MultisampleState, PolygonMode, RasterizationState, RenderState, SamplerState, StencilOp,
        StencilOpState, MAX_ATTACHMENTS,
    },
};
use std::ops::Range;

pub(crate) const MAGIC: u32 = fourcc(*b"MSLB");

pub(crate) const HEADER_SIZE: usize = 48;
pub(crate) const VEC_REF_SIZE: usize = 8;
pub(crate) const SHADER_DATA_SIZE: usize = VEC_REF_SIZE;
pub(crate) const SHADER_SIZE: usize = 16;
pub(crate) const STRUCT_SIZE: usize = 20;
pub(crate) const STRUCT_MEMBER_SIZE: usize = 36;
pub(crate) const ARRAY_INFO_SIZE: usize = 8;
pub(crate) const SAMPLER_STATE_SIZE: usize = 48;
pub(crate) const UNIFORM_SIZE: usize = 44;
pub(crate) const ATTRIBUTE_SIZE: usize = 28;
pub(crate) const FRAGMENT_OUTPUT_SIZE: usize = 12;
pub(crate) const FRAGMENT_INPUT_GROUP_SIZE: usize = 24;
pub(crate) const FRAGMENT_INPUT_SIZE: usize = 16;
pub(crate) const RENDER_STATE_SIZE: usize = 700;
pub(crate) const PIPELINE_SIZE: usize = 8 + 6 * VEC_REF_SIZE + 4 + 12 + RENDER_STATE_SIZE + 8;

/// Offsets of the descriptor set and binding inside a uniform record.
pub(crate) const UNIFORM_DESCRIPTOR_SET_OFFSET: usize = 28;
pub(crate) const UNIFORM_BINDING_OFFSET: usize = 32;

/// Byte order of the host, as far as shader payloads are concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Endian {
    Little,
    Big,
}

impl Endian {
    pub(crate) const NATIVE: Endian = if cfg!(target_endian = "big") {
        Endian::Big
    } else {
        Endian::Little
    };

    #[inline]
    pub(crate) fn read_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        }
    }

    #[inline]
    pub(crate) fn write_u32(self, value: u32) -> [u8; 4] {
        match self {
            Endian::Little => value.to_le_bytes(),
            Endian::Big => value.to_be_bytes(),
        }
    }
}

/// A reference to `count` elements starting at `offset`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct VecRef {
    pub(crate) offset: u32,
    pub(crate) count: u32,
}

impl VecRef {
    /// Returns the byte range covered by the elements, if it fits in a buffer of `len` bytes
    /// and is aligned for the element size.
    pub(crate) fn range(self, element_size: usize, len: usize) -> Option<Range<usize>> {
        let start = self.offset as usize;

        if element_size % 4 == 0 && start % 4 != 0 {
            return None;
        }

        let end = (self.count as usize)
            .checked_mul(element_size)?
            .checked_add(start)?;

        (end <= len).then_some(start..end)
    }
}

/// Sequential little-endian reader over a buffer.
#[derive(Clone)]
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    #[inline]
    pub(crate) fn new(data: &'a [u8], pos: usize) -> Self {
        Reader { data, pos }
    }

    pub(crate) fn u32(&mut self) -> Option<u32> {
        let end = self.pos.checked_add(4)?;
        let bytes = self.data.get(self.pos..end)?;
        self.pos = end;

        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }

    #[inline]
    pub(crate) fn i32(&mut self) -> Option<i32> {
        self.u32().map(|value| value as i32)
    }

    #[inline]
    pub(crate) fn f32(&mut self) -> Option<f32> {
        self.u32().map(f32::from_bits)
    }

    pub(crate) fn bool(&mut self) -> Option<bool> {
        match self.u32()? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }
    }

    pub(crate) fn vec_ref(&mut self) -> Option<VecRef> {
        Some(VecRef {
            offset: self.u32()?,
            count: self.u32()?,
        })
    }

    /// Reads a string reference and resolves it.
    pub(crate) fn str(&mut self) -> Option<&'a str> {
        let data = self.data;
        let range = self.vec_ref()?.range(1, data.len())?;

        std::str::from_utf8(&data[range]).ok()
    }

    #[inline]
    fn state<T>(&mut self, from_raw: fn(i32) -> Option<T>) -> Option<T> {
        from_raw(self.i32()?)
    }

    pub(crate) fn sampler_state(&mut self) -> Option<SamplerState> {
        Some(SamplerState {
            min_filter: self.state(Filter::from_raw)?,
            mag_filter: self.state(Filter::from_raw)?,
            mip_filter: self.state(MipFilter::from_raw)?,
            address_mode_u: self.state(AddressMode::from_raw)?,
            address_mode_v: self.state(AddressMode::from_raw)?,
            address_mode_w: self.state(AddressMode::from_raw)?,
            mip_lod_bias: self.f32()?,
            max_anisotropy: self.f32()?,
            min_lod: self.f32()?,
            max_lod: self.f32()?,
            border_color: self.state(BorderColor::from_raw)?,
            compare_op: self.state(CompareOp::from_raw)?,
        })
    }

    fn stencil_op_state(&mut self) -> Option<StencilOpState> {
        Some(StencilOpState {
            fail_op: self.state(StencilOp::from_raw)?,
            pass_op: self.state(StencilOp::from_raw)?,
            depth_fail_op: self.state(StencilOp::from_raw)?,
            compare_op: self.state(CompareOp::from_raw)?,
            compare_mask: self.u32()?,
            write_mask: self.u32()?,
            reference: self.u32()?,
        })
    }

    fn blend_attachment_state(&mut self) -> Option<BlendAttachmentState> {
        Some(BlendAttachmentState {
            blend_enable: self.state(Bool::from_raw)?,
            src_color_blend_factor: self.state(BlendFactor::from_raw)?,
            dst_color_blend_factor: self.state(BlendFactor::from_raw)?,
            color_blend_op: self.state(BlendOp::from_raw)?,
            src_alpha_blend_factor: self.state(BlendFactor::from_raw)?,
            dst_alpha_blend_factor: self.state(BlendFactor::from_raw)?,
            alpha_blend_op: self.state(BlendOp::from_raw)?,
            color_write_mask: match self.i32()? {
                mask @ (-1..=0xF) => ColorMask(mask),
                _ => return None,
            },
        })
    }

    pub(crate) fn render_state(&mut self) -> Option<RenderState> {
        let rasterization_state = RasterizationState {
            depth_clamp_enable: self.state(Bool::from_raw)?,
            rasterizer_discard_enable: self.state(Bool::from_raw)?,
            polygon_mode: self.state(PolygonMode::from_raw)?,
            cull_mode: self.state(CullMode::from_raw)?,
            front_face: self.state(FrontFace::from_raw)?,
            depth_bias_enable: self.state(Bool::from_raw)?,
            depth_bias_constant_factor: self.f32()?,
            depth_bias_clamp: self.f32()?,
            depth_bias_slope_factor: self.f32()?,
            line_width: self.f32()?,
        };

        let multisample_state = MultisampleState {
            sample_shading_enable: self.state(Bool::from_raw)?,
            min_sample_shading: self.f32()?,
            sample_mask: self.u32()?,
            alpha_to_coverage_enable: self.state(Bool::from_raw)?,
            alpha_to_one_enable: self.state(Bool::from_raw)?,
        };

        let depth_stencil_state = DepthStencilState {
            depth_test_enable: self.state(Bool::from_raw)?,
            depth_write_enable: self.state(Bool::from_raw)?,
            depth_compare_op: self.state(CompareOp::from_raw)?,
            depth_bounds_test_enable: self.state(Bool::from_raw)?,
            stencil_test_enable: self.state(Bool::from_raw)?,
            front_stencil: self.stencil_op_state()?,
            back_stencil: self.stencil_op_state()?,
            min_depth_bounds: self.f32()?,
            max_depth_bounds: self.f32()?,
        };

        let logic_op_enable = self.state(Bool::from_raw)?;
        let logic_op = self.state(LogicOp::from_raw)?;
        let separate_attachment_blending_enable = self.state(Bool::from_raw)?;
        let mut attachments = [BlendAttachmentState::default(); MAX_ATTACHMENTS];

        for attachment in &mut attachments {
            *attachment = self.blend_attachment_state()?;
        }

        let blend_state = BlendState {
            logic_op_enable,
            logic_op,
            separate_attachment_blending_enable,
            attachments,
            blend_constants: [self.f32()?, self.f32()?, self.f32()?, self.f32()?],
        };

        Some(RenderState {
            rasterization_state,
            multisample_state,
            depth_stencil_state,
            blend_state,
            patch_control_points: self.u32()?,
            clip_distance_count: self.u32()?,
            cull_distance_count: self.u32()?,
            early_fragment_tests: self.state(Bool::from_raw)?,
        })
    }
}

/// Little-endian field writer for one record.
pub(crate) trait Put {
    fn put_u32(&mut self, value: u32);

    #[inline]
    fn put_i32(&mut self, value: i32) {
        self.put_u32(value as u32);
    }

    #[inline]
    fn put_f32(&mut self, value: f32) {
        self.put_u32(value.to_bits());
    }

    #[inline]
    fn put_bool(&mut self, value: bool) {
        self.put_u32(value as u32);
    }

    #[inline]
    fn put_vec_ref(&mut self, value: VecRef) {
        self.put_u32(value.offset);
        self.put_u32(value.count);
    }

    fn put_sampler_state(&mut self, state: &SamplerState) {
        self.put_i32(state.min_filter.as_raw());
        self.put_i32(state.mag_filter.as_raw());
        self.put_i32(state.mip_filter.as_raw());
        self.put_i32(state.address_mode_u.as_raw());
        self.put_i32(state.address_mode_v.as_raw());
        self.put_i32(state.address_mode_w.as_raw());
        self.put_f32(state.mip_lod_bias);
        self.put_f32(state.max_anisotropy);
        self.put_f32(state.min_lod);
        self.put_f32(state.max_lod);
        self.put_i32(state.border_color.as_raw());
        self.put_i32(state.compare_op.as_raw());
    }

    fn put_stencil_op_state(&mut self, state: &StencilOpState) {
        self.put_i32(state.fail_op.as_raw());
        self.put_i32(state.pass_op.as_raw());
        self.put_i32(state.depth_fail_op.as_raw());
        self.put_i32(state.compare_op.as_raw());
        self.put_u32(state.compare_mask);
        self.put_u32(state.write_mask);
        self.put_u32(state.reference);
    }

    fn put_render_state(&mut self, state: &RenderState) {
        let rasterization = &state.rasterization_state;
        self.put_i32(rasterization.depth_clamp_enable.as_raw());
        self.put_i32(rasterization.rasterizer_discard_enable.as_raw());
        self.put_i32(rasterization.polygon_mode.as_raw());
        self.put_i32(rasterization.cull_mode.as_raw());
        self.put_i32(rasterization.front_face.as_raw());
        self.put_i32(rasterization.depth_bias_enable.as_raw());
        self.put_f32(rasterization.depth_bias_constant_factor);
        self.put_f32(rasterization.depth_bias_clamp);
        self.put_f32(rasterization.depth_bias_slope_factor);
        self.put_f32(rasterization.line_width);

        let multisample = &state.multisample_state;
        self.put_i32(multisample.sample_shading_enable.as_raw());
        self.put_f32(multisample.min_sample_shading);
        self.put_u32(multisample.sample_mask);
        self.put_i32(multisample.alpha_to_coverage_enable.as_raw());
        self.put_i32(multisample.alpha_to_one_enable.as_raw());

        let depth_stencil = &state.depth_stencil_state;
        self.put_i32(depth_stencil.depth_test_enable.as_raw());
        self.put_i32(depth_stencil.depth_write_enable.as_raw());
        self.put_i32(depth_stencil.depth_compare_op.as_raw());
        self.put_i32(depth_stencil.depth_bounds_test_enable.as_raw());
        self.put_i32(depth_stencil.stencil_test_enable.as_raw());
        self.put_stencil_op_state(&depth_stencil.front_stencil);
        self.put_stencil_op_state(&depth_stencil.back_stencil);
        self.put_f32(depth_stencil.min_depth_bounds);
        self.put_f32(depth_stencil.max_depth_bounds);

        let blend = &state.blend_state;
        self.put_i32(blend.logic_op_enable.as_raw());
        self.put_i32(blend.logic_op.as_raw());
        self.put_i32(blend.separate_attachment_blending_enable.as_raw());

        for attachment in &blend.attachments {
            self.put_i32(attachment.blend_enable.as_raw());
            self.put_i32(attachment.src_color_blend_factor.as_raw());
            self.put_i32(attachment.dst_color_blend_factor.as_raw());
            self.put_i32(attachment.color_blend_op.as_raw());
            self.put_i32(attachment.src_alpha_blend_factor.as_raw());
            self.put_i32(attachment.dst_alpha_blend_factor.as_raw());
            self.put_i32(attachment.alpha_blend_op.as_raw());
            self.put_i32(attachment.color_write_mask.0);
        }

        for constant in blend.blend_constants {
            self.put_f32(constant);
        }

        self.put_u32(state.patch_control_points);
        self.put_u32(state.clip_distance_count);
        self.put_u32(state.cull_distance_count);
        self.put_i32(state.early_fragment_tests.as_raw());
    }
}

impl Put for Vec<u8> {
    #[inline]
    fn put_u32(&mut self, value: u32) {
        self.extend_from_slice(&value.to_le_bytes());
    }
}

/// Appends variable-length data to a module buffer.
pub(crate) struct Encoder {
    data: Vec<u8>,
}

impl Encoder {
    /// Creates an encoder with room reserved for the header.
    pub(crate) fn new() -> Self {
        Encoder {
            data: vec![0; HEADER_SIZE],
        }
    }

    fn align(&mut self) {
        let padding = (4 - self.data.len() % 4) % 4;
        self.data.resize(self.data.len() + padding, 0);
    }

    fn position(&self) -> u32 {
        self.data.len() as u32
    }

    /// Appends raw bytes.
    pub(crate) fn bytes(&mut self, bytes: &[u8]) -> VecRef {
        self.align();
        let offset = self.position();
        self.data.extend_from_slice(bytes);

        VecRef {
            offset,
            count: bytes.len() as u32,
        }
    }

    /// Appends 32-bit words given in `host` order as little-endian words.
    pub(crate) fn words(&mut self, bytes: &[u8], host: Endian) -> VecRef {
        self.align();
        let offset = self.position();
        let mut chunks = bytes.chunks_exact(4);

        for chunk in &mut chunks {
            let word = host.read_u32([chunk[0], chunk[1], chunk[2], chunk[3]]);
            self.data.put_u32(word);
        }

        self.data.extend_from_slice(chunks.remainder());

        VecRef {
            offset,
            count: bytes.len() as u32,
        }
    }

    #[inline]
    pub(crate) fn string(&mut self, value: &str) -> VecRef {
        self.bytes(value.as_bytes())
    }

    pub(crate) fn u32_table(&mut self, values: &[u32]) -> VecRef {
        self.align();
        let offset = self.position();

        for &value in values {
            self.data.put_u32(value);
        }

        VecRef {
            offset,
            count: values.len() as u32,
        }
    }

    /// Writes a table of fixed-size records. `write` may append the variable-length data of an
    /// item to the encoder before putting the item's record into the given buffer.
    pub(crate) fn table<T>(
        &mut self,
        items: &[T],
        mut write: impl FnMut(&mut Encoder, &T, &mut Vec<u8>),
    ) -> VecRef {
        let mut records = Vec::new();

        for item in items {
            write(self, item, &mut records);
        }

        let mut table = self.bytes(&records);
        table.count = items.len() as u32;

        table
    }

    /// Patches the header and returns the finished buffer.
    pub(crate) fn finish(mut self, header: &[u8]) -> Vec<u8> {
        debug_assert_eq!(header.len(), HEADER_SIZE - 4);
        self.align();
        let total_size = self.position();
        self.data[..HEADER_SIZE - 4].copy_from_slice(header);
        self.data[HEADER_SIZE - 4..HEADER_SIZE].copy_from_slice(&total_size.to_le_bytes());

        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes() {
        let mut out = Vec::new();
        out.put_render_state(&RenderState::default());
        assert_eq!(out.len(), RENDER_STATE_SIZE);

        let mut out = Vec::new();
        out.put_sampler_state(&SamplerState::default());
        assert_eq!(out.len(), SAMPLER_STATE_SIZE);

        assert_eq!(PIPELINE_SIZE, 780);
    }

    #[test]
    fn render_state_decode() {
        let mut state = RenderState::default();
        state.blend_state.attachments[3].dst_alpha_blend_factor = BlendFactor::One;
        state.blend_state.attachments[3].color_write_mask = ColorMask::ALL;
        state.depth_stencil_state.back_stencil.reference = 7;
        state.rasterization_state.line_width = 2.5;
        state.early_fragment_tests = Bool::True;

        let mut out = Vec::new();
        out.put_render_state(&state);
        assert_eq!(Reader::new(&out, 0).render_state(), Some(state));

        // Out-of-range enumeration.
        out[0..4].copy_from_slice(&5i32.to_le_bytes());
        assert_eq!(Reader::new(&out, 0).render_state(), None);
    }

    #[test]
    fn vec_ref_range() {
        let vec_ref = VecRef {
            offset: 8,
            count: 2,
        };
        assert_eq!(vec_ref.range(4, 16), Some(8..16));
        assert_eq!(vec_ref.range(4, 15), None);

        let unaligned = VecRef {
            offset: 6,
            count: 1,
        };
        assert_eq!(unaligned.range(4, 16), None);
        assert_eq!(unaligned.range(1, 16), Some(6..7));

        let huge = VecRef {
            offset: 4,
            count: u32::MAX,
        };
        assert_eq!(huge.range(usize::MAX / 2, usize::MAX), None);
    }

    #[test]
    fn words_are_little_endian() {
        let mut encoder = Encoder::new();
        let words = encoder.words(&0x0723_0203u32.to_be_bytes(), Endian::Big);
        let data = encoder.finish(&[0; HEADER_SIZE - 4]);
        let start = words.offset as usize;

        assert_eq!(&data[start..start + 4], &0x0723_0203u32.to_le_bytes());
    }
}
