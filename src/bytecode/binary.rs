/*!
  This module is responsible for the encoding and decoding of binary instructions.

  Every instruction occupies one fixed-width record:

  ```text
  [Opcode:8][SrcMode:8][DestMode:8][SrcOperand:64 LE][DestOperand:64 LE]
  ```

  Both operands are always written as full little-endian words, whatever their addressing
  mode.
*/

use crate::address::{AddressingMode};
use crate::error::EncodingError;
use super::{Instruction, Operation};

// If you change this you must also change `encode_instruction` and `decode_instruction`.
pub type Word = u64;
pub const WORD_SIZE: usize = std::mem::size_of::<Word>();

/// Width in bytes of one encoded instruction record.
pub const INSTRUCTION_WIDTH: usize = 1 + 1 + 1 + WORD_SIZE + WORD_SIZE;

pub type EncodedInstruction = [u8; INSTRUCTION_WIDTH];

const SRC_OPERAND_START  : usize = 3;
const DEST_OPERAND_START : usize = SRC_OPERAND_START + WORD_SIZE;

/// Encodes the five instruction fields into a record.
pub fn encode(
  opcode       : Operation,
  src_mode     : AddressingMode,
  dest_mode    : AddressingMode,
  src_operand  : Word,
  dest_operand : Word
) -> EncodedInstruction
{
  encode_instruction(&Instruction::new(opcode, src_mode, dest_mode, src_operand, dest_operand))
}

/// Encodes an instruction record. Raw field values are written as they are, valid or not.
pub fn encode_instruction(instruction: &Instruction) -> EncodedInstruction {
  let mut record = [0u8; INSTRUCTION_WIDTH];
  record[0] = instruction.opcode;
  record[1] = instruction.src_mode;
  record[2] = instruction.dest_mode;
  record[SRC_OPERAND_START..DEST_OPERAND_START]
    .copy_from_slice(&instruction.src_operand.to_le_bytes());
  record[DEST_OPERAND_START..INSTRUCTION_WIDTH]
    .copy_from_slice(&instruction.dest_operand.to_le_bytes());
  record
}

/**
  Decodes the record at the start of `bytes`. Bytes past the first record are ignored.

  Decoding never interprets the fields; use `validate` to check them.
*/
pub fn decode_instruction(bytes: &[u8]) -> Result<Instruction, EncodingError> {
  if bytes.len() < INSTRUCTION_WIDTH {
    return Err(EncodingError::TruncatedRecord {
      available : bytes.len(),
      expected  : INSTRUCTION_WIDTH
    });
  }

  let word_at = |start: usize| -> Word {
    let mut word_bytes = [0u8; WORD_SIZE];
    word_bytes.copy_from_slice(&bytes[start..start + WORD_SIZE]);
    Word::from_le_bytes(word_bytes)
  };

  Ok(Instruction {
    opcode       : bytes[0],
    src_mode     : bytes[1],
    dest_mode    : bytes[2],
    src_operand  : word_at(SRC_OPERAND_START),
    dest_operand : word_at(DEST_OPERAND_START),
  })
}

/**
  Checks that the opcode is a known operation and that each mode byte is exactly one of the
  legal mode values. Operand range needs no check: a `Word` holds every encodable value.
*/
pub fn validate(instruction: &Instruction) -> Result<(), EncodingError> {
  instruction.operation()?;
  instruction.src_addressing_mode()?;
  instruction.dest_addressing_mode()?;
  Ok(())
}

/// Decodes a whole program. A trailing partial record is an error.
pub fn decode_program(bytes: &[u8]) -> Result<Vec<Instruction>, EncodingError> {
  let whole_records = bytes.len() / INSTRUCTION_WIDTH * INSTRUCTION_WIDTH;
  if whole_records != bytes.len() {
    return Err(EncodingError::TruncatedRecord {
      available : bytes.len() - whole_records,
      expected  : INSTRUCTION_WIDTH
    });
  }
  bytes.chunks(INSTRUCTION_WIDTH).map(decode_instruction).collect()
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn record_is_nineteen_bytes() {
    assert_eq!(INSTRUCTION_WIDTH, 19);
  }

  #[test]
  fn layout_is_little_endian() {
    let record = encode(
      Operation::Mov,
      AddressingMode::Immediate,
      AddressingMode::Register,
      0x0102,
      7
    );
    assert_eq!(record[0], Operation::Mov.code());
    assert_eq!(record[1], 1);
    assert_eq!(record[2], 2);
    assert_eq!(&record[3..11], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
    assert_eq!(&record[11..19], &[7, 0, 0, 0, 0, 0, 0, 0]);
  }

  #[test]
  fn decode_inverts_encode() {
    let instruction = Instruction::new(
      Operation::Cmp,
      AddressingMode::Direct,
      AddressingMode::Immediate,
      Word::max_value(),
      0x8000_0000_0000_0001
    );
    assert_eq!(decode_instruction(&encode_instruction(&instruction)), Ok(instruction));
  }

  #[test]
  fn short_input_is_truncated() {
    let record = encode_instruction(&Instruction::nullary(Operation::Hlt));
    assert_eq!(
      decode_instruction(&record[..10]),
      Err(EncodingError::TruncatedRecord { available: 10, expected: 19 })
    );
    assert!(decode_instruction(&[]).is_err());
  }

  #[test]
  fn validate_names_the_offending_field() {
    let mut instruction = Instruction::nullary(Operation::Nop);
    assert_eq!(validate(&instruction), Ok(()));

    instruction.src_mode = 0x0C;
    assert_eq!(
      validate(&instruction),
      Err(EncodingError::InvalidEncoding { field: "src_mode", value: 0x0C })
    );

    instruction.opcode = 0;
    assert_eq!(
      validate(&instruction),
      Err(EncodingError::InvalidEncoding { field: "opcode", value: 0 })
    );
  }

  #[test]
  fn decode_program_rejects_a_torn_tail() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&encode_instruction(&Instruction::nullary(Operation::Nop)));
    bytes.extend_from_slice(&encode_instruction(&Instruction::nullary(Operation::Hlt)));
    assert_eq!(decode_program(&bytes).map(|program| program.len()), Ok(2));

    bytes.push(0xFF);
    assert_eq!(
      decode_program(&bytes),
      Err(EncodingError::TruncatedRecord { available: 1, expected: 19 })
    );
  }
}
