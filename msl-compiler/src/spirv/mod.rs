// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Parsing and editing of SPIR-V modules.
//!
//! Only the instructions needed for reflection are decoded. Everything else is kept as raw words
//! so that the module can be edited in place and written back out.

use std::{
    error::Error,
    fmt::{Display, Error as FmtError, Formatter},
};

mod edit;

pub const MAGIC: u32 = 0x0723_0203;

/// The number of words in the module header.
pub const HEADER_WORDS: usize = 5;

#[allow(dead_code)]
pub mod op {
    pub const NOP: u16 = 0;
    pub const SOURCE_CONTINUED: u16 = 2;
    pub const SOURCE: u16 = 3;
    pub const SOURCE_EXTENSION: u16 = 4;
    pub const NAME: u16 = 5;
    pub const MEMBER_NAME: u16 = 6;
    pub const STRING: u16 = 7;
    pub const LINE: u16 = 8;
    pub const ENTRY_POINT: u16 = 15;
    pub const EXECUTION_MODE: u16 = 16;
    pub const CAPABILITY: u16 = 17;
    pub const TYPE_VOID: u16 = 19;
    pub const TYPE_BOOL: u16 = 20;
    pub const TYPE_INT: u16 = 21;
    pub const TYPE_FLOAT: u16 = 22;
    pub const TYPE_VECTOR: u16 = 23;
    pub const TYPE_MATRIX: u16 = 24;
    pub const TYPE_IMAGE: u16 = 25;
    pub const TYPE_SAMPLER: u16 = 26;
    pub const TYPE_SAMPLED_IMAGE: u16 = 27;
    pub const TYPE_ARRAY: u16 = 28;
    pub const TYPE_RUNTIME_ARRAY: u16 = 29;
    pub const TYPE_STRUCT: u16 = 30;
    pub const TYPE_POINTER: u16 = 32;
    pub const CONSTANT: u16 = 43;
    pub const SPEC_CONSTANT: u16 = 50;
    pub const FUNCTION: u16 = 54;
    pub const VARIABLE: u16 = 59;
    pub const ACCESS_CHAIN: u16 = 65;
    pub const DECORATE: u16 = 71;
    pub const MEMBER_DECORATE: u16 = 72;
    pub const DECORATION_GROUP: u16 = 73;
    pub const GROUP_DECORATE: u16 = 74;
    pub const GROUP_MEMBER_DECORATE: u16 = 75;
    pub const NO_LINE: u16 = 317;
    pub const MODULE_PROCESSED: u16 = 330;
    pub const DECORATE_ID: u16 = 332;
    pub const DECORATE_STRING: u16 = 5632;
    pub const MEMBER_DECORATE_STRING: u16 = 5633;
}

#[allow(dead_code)]
pub mod decoration {
    pub const BLOCK: u32 = 2;
    pub const BUFFER_BLOCK: u32 = 3;
    pub const ROW_MAJOR: u32 = 4;
    pub const COL_MAJOR: u32 = 5;
    pub const ARRAY_STRIDE: u32 = 6;
    pub const MATRIX_STRIDE: u32 = 7;
    pub const BUILT_IN: u32 = 11;
    pub const PATCH: u32 = 15;
    pub const LOCATION: u32 = 30;
    pub const COMPONENT: u32 = 31;
    pub const BINDING: u32 = 33;
    pub const DESCRIPTOR_SET: u32 = 34;
    pub const OFFSET: u32 = 35;
    pub const INPUT_ATTACHMENT_INDEX: u32 = 43;
}

#[allow(dead_code)]
pub mod built_in {
    pub const POSITION: u32 = 0;
    pub const POINT_SIZE: u32 = 1;
    pub const CLIP_DISTANCE: u32 = 3;
    pub const CULL_DISTANCE: u32 = 4;
}

#[allow(dead_code)]
pub mod storage_class {
    pub const UNIFORM_CONSTANT: u32 = 0;
    pub const INPUT: u32 = 1;
    pub const UNIFORM: u32 = 2;
    pub const OUTPUT: u32 = 3;
    pub const WORKGROUP: u32 = 4;
    pub const PRIVATE: u32 = 6;
    pub const FUNCTION: u32 = 7;
    pub const PUSH_CONSTANT: u32 = 9;
    pub const IMAGE: u32 = 11;
    pub const STORAGE_BUFFER: u32 = 12;
}

#[allow(dead_code)]
pub mod dim {
    pub const DIM_1D: u32 = 0;
    pub const DIM_2D: u32 = 1;
    pub const DIM_3D: u32 = 2;
    pub const CUBE: u32 = 3;
    pub const RECT: u32 = 4;
    pub const BUFFER: u32 = 5;
    pub const SUBPASS_DATA: u32 = 6;
}

pub mod execution_mode {
    pub const EARLY_FRAGMENT_TESTS: u32 = 9;
    pub const LOCAL_SIZE: u32 = 17;
}

/// Instructions that only carry debug information.
pub const DEBUG_OPCODES: &[u16] = &[
    op::SOURCE_CONTINUED,
    op::SOURCE,
    op::SOURCE_EXTENSION,
    op::STRING,
    op::LINE,
    op::NO_LINE,
    op::MODULE_PROCESSED,
];

/// Instructions that name ids.
pub const NAME_OPCODES: &[u16] = &[op::NAME, op::MEMBER_NAME];

/// A SPIR-V module, as words in host byte order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spirv {
    words: Vec<u32>,
}

impl Spirv {
    /// Parses a module from bytes, in either byte order.
    pub fn from_bytes(data: &[u8]) -> Result<Spirv, ParseError> {
        if data.len() < HEADER_WORDS * 4 || data.len() % 4 != 0 {
            return Err(ParseError::MissingHeader);
        }

        // The byte order is given by the magic number at the start of the file.
        let words: Vec<u32> = if data[..4] == MAGIC.to_le_bytes() {
            data.chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        } else if data[..4] == MAGIC.to_be_bytes() {
            data.chunks_exact(4)
                .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        } else {
            return Err(ParseError::WrongHeader);
        };

        Spirv::from_words(words)
    }

    /// Takes a module whose endianness has already been handled.
    pub fn from_words(words: Vec<u32>) -> Result<Spirv, ParseError> {
        if words.len() < HEADER_WORDS {
            return Err(ParseError::MissingHeader);
        }

        if words[0] != MAGIC {
            return Err(ParseError::WrongHeader);
        }

        let spirv = Spirv { words };

        // Every instruction must fit.
        for instruction in spirv.try_instructions() {
            instruction?;
        }

        Ok(spirv)
    }

    #[inline]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    #[inline]
    pub fn into_words(self) -> Vec<u32> {
        self.words
    }

    /// Returns the words as bytes in host byte order.
    #[inline]
    pub fn to_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.words).to_vec()
    }

    /// Returns `(major, minor)`.
    #[inline]
    pub fn version(&self) -> (u8, u8) {
        let version = self.words[1];

        (((version & 0x00ff_0000) >> 16) as u8, ((version & 0x0000_ff00) >> 8) as u8)
    }

    /// Returns one more than the largest id of the module.
    #[inline]
    pub fn bound(&self) -> u32 {
        self.words[3]
    }

    /// Iterates over the instructions. The module was validated on creation.
    pub fn instructions(&self) -> impl Iterator<Item = RawInstruction<'_>> {
        self.try_instructions().map_while(Result::ok)
    }

    fn try_instructions(&self) -> Instructions<'_> {
        Instructions {
            words: &self.words,
            offset: HEADER_WORDS,
        }
    }

    /// Decodes every instruction.
    pub fn decoded(&self) -> impl Iterator<Item = Instruction<'_>> {
        self.instructions().map(|instruction| instruction.decode())
    }
}

struct Instructions<'a> {
    words: &'a [u32],
    offset: usize,
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<RawInstruction<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = *self.words.get(self.offset)?;
        let word_count = (first >> 16) as usize;
        let opcode = (first & 0xffff) as u16;

        if word_count == 0 || self.words.len() - self.offset < word_count {
            self.offset = self.words.len();
            return Some(Err(ParseError::IncompleteInstruction));
        }

        let instruction = RawInstruction {
            offset: self.offset,
            opcode,
            operands: &self.words[self.offset + 1..self.offset + word_count],
        };
        self.offset += word_count;

        Some(Ok(instruction))
    }
}

/// An instruction as stored in the module.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawInstruction<'a> {
    /// The word offset of the instruction in the module.
    pub offset: usize,
    pub opcode: u16,
    pub operands: &'a [u32],
}

impl<'a> RawInstruction<'a> {
    /// The number of words, including the opcode word.
    #[inline]
    pub fn word_count(&self) -> usize {
        self.operands.len() + 1
    }

    pub fn decode(&self) -> Instruction<'a> {
        decode_instruction(self.opcode, self.operands).unwrap_or(Instruction::Unknown(self.opcode))
    }
}

/// The instructions used by reflection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction<'a> {
    Unknown(u16),
    Name {
        target_id: u32,
        name: String,
    },
    MemberName {
        target_id: u32,
        member: u32,
        name: String,
    },
    EntryPoint {
        execution_model: u32,
        id: u32,
        name: String,
        interface: &'a [u32],
    },
    ExecutionMode {
        target_id: u32,
        mode: u32,
        literals: &'a [u32],
    },
    TypeVoid {
        result_id: u32,
    },
    TypeBool {
        result_id: u32,
    },
    TypeInt {
        result_id: u32,
        width: u32,
        signedness: bool,
    },
    TypeFloat {
        result_id: u32,
        width: u32,
    },
    TypeVector {
        result_id: u32,
        component_id: u32,
        count: u32,
    },
    TypeMatrix {
        result_id: u32,
        column_type_id: u32,
        column_count: u32,
    },
    TypeImage {
        result_id: u32,
        sampled_type_id: u32,
        dim: u32,
        /// 0 = not a depth image, 1 = depth image, 2 = unknown.
        depth: u32,
        arrayed: bool,
        ms: bool,
        /// 1 = used with a sampler, 2 = storage image.
        sampled: u32,
    },
    TypeSampler {
        result_id: u32,
    },
    TypeSampledImage {
        result_id: u32,
        image_type_id: u32,
    },
    TypeArray {
        result_id: u32,
        type_id: u32,
        length_id: u32,
    },
    TypeRuntimeArray {
        result_id: u32,
        type_id: u32,
    },
    TypeStruct {
        result_id: u32,
        member_types: &'a [u32],
    },
    TypePointer {
        result_id: u32,
        storage_class: u32,
        type_id: u32,
    },
    Constant {
        result_type_id: u32,
        result_id: u32,
        data: &'a [u32],
    },
    SpecConstant {
        result_type_id: u32,
        result_id: u32,
        data: &'a [u32],
    },
    Variable {
        result_type_id: u32,
        result_id: u32,
        storage_class: u32,
    },
    Decorate {
        target_id: u32,
        decoration: u32,
        params: &'a [u32],
    },
    MemberDecorate {
        target_id: u32,
        member: u32,
        decoration: u32,
        params: &'a [u32],
    },
}

/// Returns `None` if the operands are too short for the opcode.
fn decode_instruction(opcode: u16, operands: &[u32]) -> Option<Instruction<'_>> {
    let operand = |index: usize| operands.get(index).copied();

    Some(match opcode {
        op::NAME => Instruction::Name {
            target_id: operand(0)?,
            name: parse_string(operands.get(1..)?).0,
        },
        op::MEMBER_NAME => Instruction::MemberName {
            target_id: operand(0)?,
            member: operand(1)?,
            name: parse_string(operands.get(2..)?).0,
        },
        op::ENTRY_POINT => {
            let (name, interface) = parse_string(operands.get(2..)?);

            Instruction::EntryPoint {
                execution_model: operand(0)?,
                id: operand(1)?,
                name,
                interface,
            }
        }
        op::EXECUTION_MODE => Instruction::ExecutionMode {
            target_id: operand(0)?,
            mode: operand(1)?,
            literals: operands.get(2..)?,
        },
        op::TYPE_VOID => Instruction::TypeVoid {
            result_id: operand(0)?,
        },
        op::TYPE_BOOL => Instruction::TypeBool {
            result_id: operand(0)?,
        },
        op::TYPE_INT => Instruction::TypeInt {
            result_id: operand(0)?,
            width: operand(1)?,
            signedness: operand(2)? != 0,
        },
        op::TYPE_FLOAT => Instruction::TypeFloat {
            result_id: operand(0)?,
            width: operand(1)?,
        },
        op::TYPE_VECTOR => Instruction::TypeVector {
            result_id: operand(0)?,
            component_id: operand(1)?,
            count: operand(2)?,
        },
        op::TYPE_MATRIX => Instruction::TypeMatrix {
            result_id: operand(0)?,
            column_type_id: operand(1)?,
            column_count: operand(2)?,
        },
        op::TYPE_IMAGE => Instruction::TypeImage {
            result_id: operand(0)?,
            sampled_type_id: operand(1)?,
            dim: operand(2)?,
            depth: operand(3)?,
            arrayed: operand(4)? != 0,
            ms: operand(5)? != 0,
            sampled: operand(6)?,
        },
        op::TYPE_SAMPLER => Instruction::TypeSampler {
            result_id: operand(0)?,
        },
        op::TYPE_SAMPLED_IMAGE => Instruction::TypeSampledImage {
            result_id: operand(0)?,
            image_type_id: operand(1)?,
        },
        op::TYPE_ARRAY => Instruction::TypeArray {
            result_id: operand(0)?,
            type_id: operand(1)?,
            length_id: operand(2)?,
        },
        op::TYPE_RUNTIME_ARRAY => Instruction::TypeRuntimeArray {
            result_id: operand(0)?,
            type_id: operand(1)?,
        },
        op::TYPE_STRUCT => Instruction::TypeStruct {
            result_id: operand(0)?,
            member_types: operands.get(1..)?,
        },
        op::TYPE_POINTER => Instruction::TypePointer {
            result_id: operand(0)?,
            storage_class: operand(1)?,
            type_id: operand(2)?,
        },
        op::CONSTANT => Instruction::Constant {
            result_type_id: operand(0)?,
            result_id: operand(1)?,
            data: operands.get(2..)?,
        },
        op::SPEC_CONSTANT => Instruction::SpecConstant {
            result_type_id: operand(0)?,
            result_id: operand(1)?,
            data: operands.get(2..)?,
        },
        op::VARIABLE => Instruction::Variable {
            result_type_id: operand(0)?,
            result_id: operand(1)?,
            storage_class: operand(2)?,
        },
        op::DECORATE => Instruction::Decorate {
            target_id: operand(0)?,
            decoration: operand(1)?,
            params: operands.get(2..)?,
        },
        op::MEMBER_DECORATE => Instruction::MemberDecorate {
            target_id: operand(0)?,
            member: operand(1)?,
            decoration: operand(2)?,
            params: operands.get(3..)?,
        },
        _ => Instruction::Unknown(opcode),
    })
}

/// Reads a nul-terminated string. Returns the string and the words after it.
pub fn parse_string(data: &[u32]) -> (String, &[u32]) {
    let bytes = data
        .iter()
        .flat_map(|&n| n.to_le_bytes())
        .take_while(|&b| b != 0)
        .collect::<Vec<u8>>();

    let r = (1 + bytes.len() / 4).min(data.len());
    let s = String::from_utf8_lossy(&bytes).into_owned();

    (s, &data[r..])
}

/// Encodes a string as nul-terminated, padded words.
pub fn string_words(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.resize((bytes.len() / 4 + 1) * 4, 0);

    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Error that can happen when parsing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseError {
    MissingHeader,
    WrongHeader,
    IncompleteInstruction,
}

impl Error for ParseError {}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(match self {
            ParseError::MissingHeader => "the SPIR-V header is missing",
            ParseError::WrongHeader => "the data doesn't start with the SPIR-V magic number",
            ParseError::IncompleteInstruction => "the last instruction of the SPIR-V is cut off",
        })
    }
}


#[cfg(test)]
mod tests {
    use super::{builder::Builder, *};

    #[test]
    fn byte_orders() {
        let spirv = Builder::new()
            .name(1, "position")
            .push(op::TYPE_FLOAT, &[2, 32])
            .build();

        let le: Vec<u8> = spirv.words().iter().flat_map(|w| w.to_le_bytes()).collect();
        let be: Vec<u8> = spirv.words().iter().flat_map(|w| w.to_be_bytes()).collect();

        assert_eq!(Spirv::from_bytes(&le).unwrap(), spirv);
        assert_eq!(Spirv::from_bytes(&be).unwrap(), spirv);
        assert_eq!(spirv.version(), (1, 0));
        assert_eq!(spirv.bound(), 100);
    }

    #[test]
    fn header_errors() {
        assert_eq!(Spirv::from_bytes(&[0; 8]), Err(ParseError::MissingHeader));
        assert_eq!(Spirv::from_bytes(&[0; 20]), Err(ParseError::WrongHeader));
        assert_eq!(
            Spirv::from_words(vec![MAGIC, 0x0001_0000, 0, 1, 0, 3 << 16]),
            Err(ParseError::IncompleteInstruction),
        );
    }

    #[test]
    fn decoding() {
        let spirv = Builder::new()
            .name(7, "color")
            .member_name(8, 1, "offset")
            .entry_point(4, 3, &[7, 9])
            .push(op::DECORATE, &[7, decoration::LOCATION, 2])
            .push(op::VARIABLE, &[10, 7, storage_class::OUTPUT])
            .build();

        let decoded: Vec<_> = spirv.decoded().collect();
        assert_eq!(
            decoded,
            [
                Instruction::Name {
                    target_id: 7,
                    name: "color".to_owned(),
                },
                Instruction::MemberName {
                    target_id: 8,
                    member: 1,
                    name: "offset".to_owned(),
                },
                Instruction::EntryPoint {
                    execution_model: 4,
                    id: 3,
                    name: "main".to_owned(),
                    interface: &[7, 9],
                },
                Instruction::Decorate {
                    target_id: 7,
                    decoration: decoration::LOCATION,
                    params: &[2],
                },
                Instruction::Variable {
                    result_type_id: 10,
                    result_id: 7,
                    storage_class: storage_class::OUTPUT,
                },
            ],
        );

        let offsets: Vec<_> = spirv.instructions().map(|i| i.offset).collect();
        assert_eq!(offsets[0], HEADER_WORDS);
    }

    #[test]
    fn strings() {
        // Exactly four bytes still needs a terminating word.
        assert_eq!(string_words("abcd").len(), 2);
        assert_eq!(parse_string(&string_words("abcd")).0, "abcd");
        assert_eq!(parse_string(&string_words("")).0, "");
    }
}
