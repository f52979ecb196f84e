//! Bytecode chunk for compiled functions.
//!
//! A `BytecodeChunk` holds the instruction stream of a single function and a
//! line table parallel to its bytes.

use super::{Address, OpCode, OperandShape};

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub offset: usize,
    pub op: OpCode,
    pub operands: Vec<u32>,
}

impl Instruction {
    /// Operand `index` decoded as an address.
    pub fn address(&self, index: usize) -> Option<Address> {
        self.operands.get(index).and_then(|&word| Address::decode(word))
    }

    pub fn word(&self, index: usize) -> Option<u32> {
        self.operands.get(index).copied()
    }

    /// Trailing operands of a counted instruction.
    pub fn trailing(&self) -> &[u32] {
        match self.op.operand_shape() {
            OperandShape::Fixed(_) => &[],
            OperandShape::Counted { fixed, .. } => self.operands.get(fixed..).unwrap_or(&[]),
        }
    }

    /// Byte offset of the next instruction.
    pub fn next_offset(&self) -> usize {
        self.offset + 1 + self.operands.len() * 4
    }
}

/// The compiled instruction stream of one function.
#[derive(Debug, Clone, Default)]
pub struct BytecodeChunk {
    code: Vec<u8>,
    /// Source line of each byte in `code`.
    lines: Vec<u32>,
}

impl BytecodeChunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an opcode.
    pub fn write_op(&mut self, op: OpCode, line: u32) {
        self.code.push(op as u8);
        self.lines.push(line);
    }

    /// Write a 32-bit operand word (big-endian).
    pub fn write_word(&mut self, value: u32, line: u32) {
        self.code.extend_from_slice(&value.to_be_bytes());
        self.lines.extend_from_slice(&[line; 4]);
    }

    pub fn write_address(&mut self, address: Address, line: u32) {
        self.write_word(address.encode(), line);
    }

    /// Write a whole instruction.
    pub fn write_instruction(&mut self, op: OpCode, operands: &[u32], line: u32) {
        self.write_op(op, line);
        for &operand in operands {
            self.write_word(operand, line);
        }
    }

    /// Get current code offset (for jump patching).
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    /// Emit a jump whose target is patched later. `operands` are the words
    /// preceding the target. Returns the offset of the target word.
    pub fn emit_jump(&mut self, op: OpCode, operands: &[u32], line: u32) -> usize {
        self.write_instruction(op, operands, line);
        let offset = self.code.len();
        self.write_word(u32::MAX, line);
        offset
    }

    /// Point the jump target word at `offset` to the current position.
    pub fn patch_jump(&mut self, offset: usize) {
        let target = self.code.len() as u32;
        self.patch_word(offset, target);
    }

    /// Overwrite an operand word in place.
    pub fn patch_word(&mut self, offset: usize, value: u32) {
        if let Some(bytes) = self.code.get_mut(offset..offset + 4) {
            bytes.copy_from_slice(&value.to_be_bytes());
        }
    }

    /// Emit an unconditional jump back to `target`.
    pub fn emit_loop(&mut self, target: usize, line: u32) {
        self.write_instruction(OpCode::Jump, &[target as u32], line);
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn lines(&self) -> &[u32] {
        &self.lines
    }

    /// Get the line number for a given offset.
    pub fn line_at(&self, offset: usize) -> Option<u32> {
        self.lines.get(offset).copied()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Read an operand word at the given offset (big-endian).
    pub fn read_word(&self, offset: usize) -> Option<u32> {
        let bytes = self.code.get(offset..offset + 4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_op(&self, offset: usize) -> Option<OpCode> {
        self.code.get(offset).and_then(|&b| OpCode::from_u8(b))
    }

    /// Decode the instruction starting at `offset`.
    pub fn instruction_at(&self, offset: usize) -> Option<Instruction> {
        let op = self.read_op(offset)?;
        let mut operands = Vec::new();
        let mut cursor = offset + 1;
        let mut read = |count: usize, operands: &mut Vec<u32>| -> Option<()> {
            for _ in 0..count {
                operands.push(self.read_word(cursor)?);
                cursor += 4;
            }
            Some(())
        };
        match op.operand_shape() {
            OperandShape::Fixed(count) => read(count, &mut operands)?,
            OperandShape::Counted { fixed, stride } => {
                read(fixed, &mut operands)?;
                let count = *operands.last()? as usize;
                read(count * stride, &mut operands)?;
            }
        }
        Some(Instruction {
            offset,
            op,
            operands,
        })
    }

    /// Decode the whole chunk. Decoding stops at the first malformed
    /// instruction.
    pub fn instructions(&self) -> Vec<Instruction> {
        let mut instructions = Vec::new();
        let mut offset = 0;
        while offset < self.code.len() {
            let Some(instruction) = self.instruction_at(offset) else {
                break;
            };
            offset = instruction.next_offset();
            instructions.push(instruction);
        }
        instructions
    }

    /// Extract all opcodes from the chunk, skipping operands.
    pub fn opcodes(&self) -> Vec<OpCode> {
        self.instructions().into_iter().map(|i| i.op).collect()
    }

    /// Check if this chunk contains exactly the given opcode sequence.
    ///
    /// Panics with a descriptive message if the sequences don't match.
    #[track_caller]
    pub fn assert_opcodes(&self, expected: &[OpCode]) {
        let actual = self.opcodes();
        assert_eq!(
            actual,
            expected,
            "Bytecode mismatch.\nExpected: {:?}\nActual:   {:?}",
            expected.iter().map(|op| op.name()).collect::<Vec<_>>(),
            actual.iter().map(|op| op.name()).collect::<Vec<_>>(),
        );
    }

    /// Check if this chunk contains the given opcodes (in order, but not
    /// necessarily contiguous).
    #[track_caller]
    pub fn assert_contains_opcodes(&self, expected: &[OpCode]) {
        let actual = self.opcodes();
        let mut expected_iter = expected.iter().peekable();

        for op in &actual {
            if expected_iter.peek() == Some(&op) {
                expected_iter.next();
            }
        }

        if expected_iter.peek().is_some() {
            let remaining: Vec<_> = expected_iter.map(|op| op.name()).collect();
            panic!(
                "Missing opcodes in sequence.\nExpected to find: {:?}\nActual bytecode:  {:?}",
                remaining,
                actual.iter().map(|op| op.name()).collect::<Vec<_>>(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_chunk_is_empty() {
        let chunk = BytecodeChunk::new();
        assert!(chunk.is_empty());
        assert!(chunk.instructions().is_empty());
    }

    #[test]
    fn instruction_round_trip() {
        let mut chunk = BytecodeChunk::new();
        chunk.write_instruction(
            OpCode::Assign,
            &[Address::Stack(1).encode(), Address::Constant(0).encode()],
            3,
        );
        assert_eq!(chunk.len(), 9);
        assert_eq!(chunk.line_at(0), Some(3));
        assert_eq!(chunk.line_at(8), Some(3));

        let instruction = chunk.instruction_at(0).unwrap();
        assert_eq!(instruction.op, OpCode::Assign);
        assert_eq!(instruction.address(0), Some(Address::Stack(1)));
        assert_eq!(instruction.address(1), Some(Address::Constant(0)));
        assert_eq!(instruction.next_offset(), 9);
    }

    #[test]
    fn counted_operands() {
        let mut chunk = BytecodeChunk::new();
        let args = [Address::Stack(2).encode(), Address::Stack(3).encode()];
        let mut operands = vec![Address::Stack(0).encode(), 5, args.len() as u32];
        operands.extend(args);
        chunk.write_instruction(OpCode::CallSelf, &operands, 1);
        chunk.write_instruction(OpCode::Return, &[Address::Nil.encode()], 2);

        let instructions = chunk.instructions();
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].trailing(), &args);
        assert_eq!(chunk.opcodes(), vec![OpCode::CallSelf, OpCode::Return]);
    }

    #[test]
    fn emit_and_patch_jump() {
        let mut chunk = BytecodeChunk::new();
        let condition = Address::Stack(0).encode();
        let jump = chunk.emit_jump(OpCode::JumpIfNot, &[condition], 1);
        chunk.write_instruction(OpCode::Return, &[Address::Nil.encode()], 2);
        chunk.patch_jump(jump);

        assert_eq!(jump, 5);
        assert_eq!(chunk.read_word(jump), Some(chunk.len() as u32));
    }

    #[test]
    fn emit_loop_targets_start() {
        let mut chunk = BytecodeChunk::new();
        let start = chunk.current_offset();
        chunk.write_instruction(OpCode::Return, &[Address::Nil.encode()], 1);
        chunk.emit_loop(start, 2);
        let jump = chunk.instruction_at(5).unwrap();
        assert_eq!(jump.op, OpCode::Jump);
        assert_eq!(jump.word(0), Some(start as u32));
    }

    #[test]
    fn read_word_out_of_bounds() {
        let chunk = BytecodeChunk::new();
        assert_eq!(chunk.read_word(0), None);
    }

    #[test]
    #[should_panic(expected = "Bytecode mismatch")]
    fn assert_opcodes_failure() {
        let mut chunk = BytecodeChunk::new();
        chunk.write_instruction(OpCode::Return, &[Address::Nil.encode()], 1);
        chunk.assert_opcodes(&[OpCode::Assign]);
    }

    #[test]
    fn assert_contains_opcodes_success() {
        let mut chunk = BytecodeChunk::new();
        chunk.write_instruction(OpCode::Assign, &[0, 0], 1);
        chunk.write_instruction(OpCode::Jump, &[0], 1);
        chunk.write_instruction(OpCode::Return, &[0], 1);
        chunk.assert_contains_opcodes(&[OpCode::Assign, OpCode::Return]);
    }

    #[test]
    #[should_panic(expected = "Missing opcodes")]
    fn assert_contains_opcodes_failure() {
        let mut chunk = BytecodeChunk::new();
        chunk.write_instruction(OpCode::Return, &[0], 1);
        chunk.assert_contains_opcodes(&[OpCode::Assign]);
    }
}
