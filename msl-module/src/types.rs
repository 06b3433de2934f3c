// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Stages, value types and uniform classifications.
//!
//! The numeric value of every variant is part of the module format and must never change. New
//! variants may only be appended.

use crate::macros::index_enum;

index_enum! {
    /// A shader stage of a pipeline.
    Stage;

    Vertex = 0,
    TessellationControl = 1,
    TessellationEvaluation = 2,
    Geometry = 3,
    Fragment = 4,
    Compute = 5,
}

/// The number of shader stages.
pub const STAGE_COUNT: usize = 6;

impl Stage {
    /// Returns the stage's position in per-stage tables.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Returns the stage for a position in a per-stage table.
    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Returns the name used for the stage inside a `pipeline` block.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::TessellationControl => "tessellation_control",
            Self::TessellationEvaluation => "tessellation_evaluation",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
        }
    }

    /// Looks a stage up by the name used for it inside a `pipeline` block.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|stage| stage.name() == name)
    }
}

index_enum! {
    /// The type of a uniform, struct member or shader input/output.
    Type;

    Float = 0,
    Vec2 = 1,
    Vec3 = 2,
    Vec4 = 3,
    Double = 4,
    DVec2 = 5,
    DVec3 = 6,
    DVec4 = 7,
    Int = 8,
    IVec2 = 9,
    IVec3 = 10,
    IVec4 = 11,
    UInt = 12,
    UVec2 = 13,
    UVec3 = 14,
    UVec4 = 15,
    Bool = 16,
    BVec2 = 17,
    BVec3 = 18,
    BVec4 = 19,

    Mat2 = 20,
    Mat3 = 21,
    Mat4 = 22,
    Mat2x3 = 23,
    Mat2x4 = 24,
    Mat3x2 = 25,
    Mat3x4 = 26,
    Mat4x2 = 27,
    Mat4x3 = 28,
    DMat2 = 29,
    DMat3 = 30,
    DMat4 = 31,
    DMat2x3 = 32,
    DMat2x4 = 33,
    DMat3x2 = 34,
    DMat3x4 = 35,
    DMat4x2 = 36,
    DMat4x3 = 37,

    Sampler1D = 38,
    Sampler2D = 39,
    Sampler3D = 40,
    SamplerCube = 41,
    Sampler1DShadow = 42,
    Sampler2DShadow = 43,
    Sampler1DArray = 44,
    Sampler2DArray = 45,
    Sampler1DArrayShadow = 46,
    Sampler2DArrayShadow = 47,
    Sampler2DMS = 48,
    Sampler2DMSArray = 49,
    SamplerCubeShadow = 50,
    SamplerBuffer = 51,
    Sampler2DRect = 52,
    Sampler2DRectShadow = 53,
    ISampler1D = 54,
    ISampler2D = 55,
    ISampler3D = 56,
    ISamplerCube = 57,
    ISampler1DArray = 58,
    ISampler2DArray = 59,
    ISampler2DMS = 60,
    ISampler2DMSArray = 61,
    ISampler2DRect = 62,
    USampler1D = 63,
    USampler2D = 64,
    USampler3D = 65,
    USamplerCube = 66,
    USampler1DArray = 67,
    USampler2DArray = 68,
    USampler2DMS = 69,
    USampler2DMSArray = 70,
    USampler2DRect = 71,

    Image1D = 72,
    Image2D = 73,
    Image3D = 74,
    ImageCube = 75,
    ImageBuffer = 76,
    Image1DArray = 77,
    Image2DArray = 78,
    Image2DMS = 79,
    Image2DMSArray = 80,
    Image2DRect = 81,
    IImage1D = 82,
    IImage2D = 83,
    IImage3D = 84,
    IImageCube = 85,
    IImageBuffer = 86,
    IImage1DArray = 87,
    IImage2DArray = 88,
    IImage2DMS = 89,
    IImage2DMSArray = 90,
    IImage2DRect = 91,
    UImage1D = 92,
    UImage2D = 93,
    UImage3D = 94,
    UImageCube = 95,
    UImageBuffer = 96,
    UImage1DArray = 97,
    UImage2DArray = 98,
    UImage2DMS = 99,
    UImage2DMSArray = 100,
    UImage2DRect = 101,

    SubpassInput = 102,
    SubpassInputMS = 103,
    ISubpassInput = 104,
    ISubpassInputMS = 105,
    USubpassInput = 106,
    USubpassInputMS = 107,

    /// A user-defined struct, referenced through a struct index.
    Struct = 108,
}

impl Type {
    /// Returns whether this is a scalar, vector or matrix type.
    #[inline]
    pub fn is_numeric(self) -> bool {
        self.as_raw() <= Type::DMat4x3.as_raw()
    }

    /// Returns whether this is a matrix type.
    #[inline]
    pub fn is_matrix(self) -> bool {
        (Type::Mat2.as_raw()..=Type::DMat4x3.as_raw()).contains(&self.as_raw())
    }

    /// Returns whether this is a combined image/sampler type.
    #[inline]
    pub fn is_sampler(self) -> bool {
        (Type::Sampler1D.as_raw()..=Type::USampler2DRect.as_raw()).contains(&self.as_raw())
    }

    /// Returns whether this is a storage image type.
    #[inline]
    pub fn is_image(self) -> bool {
        (Type::Image1D.as_raw()..=Type::UImage2DRect.as_raw()).contains(&self.as_raw())
    }

    /// Returns whether this is a subpass input type.
    #[inline]
    pub fn is_subpass_input(self) -> bool {
        (Type::SubpassInput.as_raw()..=Type::USubpassInputMS.as_raw()).contains(&self.as_raw())
    }

    /// Returns whether the components of this type are 64 bits wide.
    pub fn is_double(self) -> bool {
        matches!(
            self,
            Type::Double
                | Type::DVec2
                | Type::DVec3
                | Type::DVec4
                | Type::DMat2
                | Type::DMat3
                | Type::DMat4
                | Type::DMat2x3
                | Type::DMat2x4
                | Type::DMat3x2
                | Type::DMat3x4
                | Type::DMat4x2
                | Type::DMat4x3
        )
    }

    /// Returns `(columns, rows)` of a numeric type. Scalars are `(1, 1)` and vectors `(1, n)`.
    pub fn dimensions(self) -> Option<(u32, u32)> {
        Some(match self {
            Type::Float | Type::Double | Type::Int | Type::UInt | Type::Bool => (1, 1),
            Type::Vec2 | Type::DVec2 | Type::IVec2 | Type::UVec2 | Type::BVec2 => (1, 2),
            Type::Vec3 | Type::DVec3 | Type::IVec3 | Type::UVec3 | Type::BVec3 => (1, 3),
            Type::Vec4 | Type::DVec4 | Type::IVec4 | Type::UVec4 | Type::BVec4 => (1, 4),
            Type::Mat2 | Type::DMat2 => (2, 2),
            Type::Mat3 | Type::DMat3 => (3, 3),
            Type::Mat4 | Type::DMat4 => (4, 4),
            Type::Mat2x3 | Type::DMat2x3 => (2, 3),
            Type::Mat2x4 | Type::DMat2x4 => (2, 4),
            Type::Mat3x2 | Type::DMat3x2 => (3, 2),
            Type::Mat3x4 | Type::DMat3x4 => (3, 4),
            Type::Mat4x2 | Type::DMat4x2 => (4, 2),
            Type::Mat4x3 | Type::DMat4x3 => (4, 3),
            _ => return None,
        })
    }
}

index_enum! {
    /// How a uniform is bound.
    UniformType;

    /// Push constants. The type is always `Struct`.
    PushConstant = 0,
    /// A uniform block. The type is always `Struct`.
    Block = 1,
    /// A shader storage block. The type is always `Struct`.
    BlockBuffer = 2,
    /// A storage image.
    Image = 3,
    /// A combined image and sampler.
    SampledImage = 4,
    /// A subpass input attachment.
    SubpassInput = 5,
    /// A free uniform outside of any block, used by targets without uniform blocks.
    Uniform = 6,
}

impl UniformType {
    /// Returns whether the uniform is backed by a struct.
    #[inline]
    pub fn is_block(self) -> bool {
        matches!(
            self,
            UniformType::PushConstant | UniformType::Block | UniformType::BlockBuffer
        )
    }

    /// Returns whether the uniform consumes a descriptor.
    #[inline]
    pub fn has_descriptor(self) -> bool {
        !matches!(self, UniformType::PushConstant | UniformType::Uniform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_encoding() {
        let expected = [
            (Stage::Vertex, 0),
            (Stage::TessellationControl, 1),
            (Stage::TessellationEvaluation, 2),
            (Stage::Geometry, 3),
            (Stage::Fragment, 4),
            (Stage::Compute, 5),
        ];

        for (stage, value) in expected {
            assert_eq!(stage.as_raw(), value);
            assert_eq!(Stage::from_raw(value), Some(stage));
            assert_eq!(Stage::from_name(stage.name()), Some(stage));
        }

        assert_eq!(Stage::ALL.len(), STAGE_COUNT);
        assert_eq!(Stage::from_raw(6), None);
    }

    #[test]
    fn type_encoding() {
        assert_eq!(Type::Float.as_raw(), 0);
        assert_eq!(Type::BVec4.as_raw(), 19);
        assert_eq!(Type::Mat4.as_raw(), 22);
        assert_eq!(Type::Sampler2D.as_raw(), 39);
        assert_eq!(Type::Image1D.as_raw(), 72);
        assert_eq!(Type::SubpassInput.as_raw(), 102);
        assert_eq!(Type::Struct.as_raw(), 108);

        for (index, ty) in Type::ALL.iter().enumerate() {
            assert_eq!(ty.as_raw(), index as u32);
        }

        assert_eq!(Type::from_raw(109), None);
    }

    #[test]
    fn type_classes() {
        assert!(Type::DMat4x3.is_matrix() && Type::DMat4x3.is_double());
        assert!(!Type::Vec4.is_matrix() && Type::Vec4.is_numeric());
        assert!(Type::USampler2DRect.is_sampler() && !Type::USampler2DRect.is_image());
        assert!(Type::Image2DMS.is_image());
        assert!(Type::USubpassInputMS.is_subpass_input());
        assert!(!Type::Struct.is_numeric());
        assert_eq!(Type::Mat3x4.dimensions(), Some((3, 4)));
        assert_eq!(Type::Sampler2D.dimensions(), None);
    }

    #[test]
    fn uniform_type_encoding() {
        assert_eq!(UniformType::PushConstant.as_raw(), 0);
        assert_eq!(UniformType::Block.as_raw(), 1);
        assert_eq!(UniformType::BlockBuffer.as_raw(), 2);
        assert_eq!(UniformType::Image.as_raw(), 3);
        assert_eq!(UniformType::SampledImage.as_raw(), 4);
        assert_eq!(UniformType::SubpassInput.as_raw(), 5);
        assert_eq!(UniformType::Uniform.as_raw(), 6);
        assert!(UniformType::PushConstant.is_block());
        assert!(!UniformType::PushConstant.has_descriptor());
    }
}
