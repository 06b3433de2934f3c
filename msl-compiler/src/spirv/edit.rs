// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

use super::{op, Spirv};

/// Instructions that may precede annotations in a module's logical layout.
const PREAMBLE_OPCODES: &[u16] = &[
    op::SOURCE_CONTINUED,
    op::SOURCE,
    op::SOURCE_EXTENSION,
    op::NAME,
    op::MEMBER_NAME,
    op::STRING,
    op::LINE,
    op::ENTRY_POINT,
    op::EXECUTION_MODE,
    op::CAPABILITY,
    op::NO_LINE,
    op::MODULE_PROCESSED,
    // OpExtension, OpExtInstImport, OpMemoryModel, OpExecutionModeId
    10,
    11,
    14,
    331,
];

const ANNOTATION_OPCODES: &[u16] = &[
    op::DECORATE,
    op::MEMBER_DECORATE,
    op::DECORATION_GROUP,
    op::GROUP_DECORATE,
    op::GROUP_MEMBER_DECORATE,
    op::DECORATE_ID,
    op::DECORATE_STRING,
    op::MEMBER_DECORATE_STRING,
];

impl Spirv {
    /// Returns the first literal of a decoration on `target_id`.
    pub fn decoration(&self, target_id: u32, decoration: u32) -> Option<u32> {
        self.instructions()
            .filter(|instruction| instruction.opcode == op::DECORATE)
            .find_map(|instruction| match instruction.operands {
                [target, dec, value, ..] if *target == target_id && *dec == decoration => {
                    Some(*value)
                }
                _ => None,
            })
    }

    /// Sets a decoration with one literal on `target_id`, adding it if it's missing.
    pub fn set_decoration(&mut self, target_id: u32, decoration: u32, value: u32) {
        let existing = self
            .instructions()
            .filter(|instruction| instruction.opcode == op::DECORATE)
            .find(|instruction| {
                matches!(
                    instruction.operands,
                    [target, dec, _, ..] if *target == target_id && *dec == decoration
                )
            })
            .map(|instruction| instruction.offset);

        if let Some(offset) = existing {
            self.words[offset + 3] = value;
            return;
        }

        let position = self.annotation_insert_position();
        let instruction = [
            (4 << 16) | op::DECORATE as u32,
            target_id,
            decoration,
            value,
        ];
        self.words.splice(position..position, instruction);
    }

    /// Removes every `OpDecorate` of `decoration` on `target_id`.
    pub fn remove_decoration(&mut self, target_id: u32, decoration: u32) {
        self.retain(|opcode, operands| {
            !(opcode == op::DECORATE
                && matches!(operands, [target, dec, ..] if *target == target_id && *dec == decoration))
        });
    }

    /// Removes every instruction with one of the given opcodes.
    pub fn strip(&mut self, opcodes: &[u16]) {
        self.retain(|opcode, _| !opcodes.contains(&opcode));
    }

    fn retain(&mut self, mut keep: impl FnMut(u16, &[u32]) -> bool) {
        let mut words = Vec::with_capacity(self.words.len());
        words.extend_from_slice(&self.words[..super::HEADER_WORDS]);

        for instruction in self.instructions() {
            if keep(instruction.opcode, instruction.operands) {
                let end = instruction.offset + instruction.word_count();
                words.extend_from_slice(&self.words[instruction.offset..end]);
            }
        }

        self.words = words;
    }

    /// Returns the word offset after the last annotation, or after the debug and mode-setting
    /// instructions if there are no annotations.
    fn annotation_insert_position(&self) -> usize {
        let mut last_annotation = None;
        let mut preamble_end = super::HEADER_WORDS;

        for instruction in self.instructions() {
            let end = instruction.offset + instruction.word_count();

            if ANNOTATION_OPCODES.contains(&instruction.opcode) {
                last_annotation = Some(end);
            } else if PREAMBLE_OPCODES.contains(&instruction.opcode) {
                preamble_end = end;
            } else {
                break;
            }
        }

        last_annotation.unwrap_or(preamble_end)
    }
}

#[cfg(test)]
mod tests {
    use crate::spirv::{builder::Builder, decoration, op, DEBUG_OPCODES};

    #[test]
    fn replace_and_insert_decorations() {
        let mut spirv = Builder::new()
            .push(op::CAPABILITY, &[1])
            .name(5, "texture")
            .push(op::DECORATE, &[5, decoration::BINDING, 0])
            .push(op::TYPE_FLOAT, &[2, 32])
            .build();

        spirv.set_decoration(5, decoration::BINDING, 3);
        assert_eq!(spirv.decoration(5, decoration::BINDING), Some(3));

        spirv.set_decoration(5, decoration::DESCRIPTOR_SET, 1);
        assert_eq!(spirv.decoration(5, decoration::DESCRIPTOR_SET), Some(1));

        // The new decoration goes after the existing one and before the types.
        let opcodes: Vec<_> = spirv.instructions().map(|i| i.opcode).collect();
        assert_eq!(
            opcodes,
            [op::CAPABILITY, op::NAME, op::DECORATE, op::DECORATE, op::TYPE_FLOAT],
        );

        spirv.remove_decoration(5, decoration::BINDING);
        assert_eq!(spirv.decoration(5, decoration::BINDING), None);
        assert_eq!(spirv.decoration(5, decoration::DESCRIPTOR_SET), Some(1));
    }

    #[test]
    fn insert_without_annotations() {
        let mut spirv = Builder::new()
            .push(op::CAPABILITY, &[1])
            .name(5, "color")
            .push(op::TYPE_FLOAT, &[2, 32])
            .build();

        spirv.set_decoration(5, decoration::LOCATION, 4);

        let opcodes: Vec<_> = spirv.instructions().map(|i| i.opcode).collect();
        assert_eq!(opcodes, [op::CAPABILITY, op::NAME, op::DECORATE, op::TYPE_FLOAT]);
        assert_eq!(spirv.decoration(5, decoration::LOCATION), Some(4));
    }

    #[test]
    fn strip_instructions() {
        let mut spirv = Builder::new()
            .push(op::SOURCE, &[2, 450])
            .name(5, "color")
            .push(op::MODULE_PROCESSED, &[0])
            .push(op::TYPE_FLOAT, &[2, 32])
            .build();

        spirv.strip(DEBUG_OPCODES);

        let opcodes: Vec<_> = spirv.instructions().map(|i| i.opcode).collect();
        assert_eq!(opcodes, [op::NAME, op::TYPE_FLOAT]);
    }
}
