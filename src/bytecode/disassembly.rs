//! Human readable listings of binary programs.

use std::fmt::Write;

use crate::error::EncodingError;
use super::{decode_program, INSTRUCTION_WIDTH};

/**
  Lists every record of `bytecode` as `index  byte-offset  assembly`. Records that do not
  validate are still listed, with their raw opcode, so that a damaged program can be
  inspected. Only a torn trailing record is an error.
*/
pub fn disassemble(bytecode: &[u8]) -> Result<String, EncodingError> {
  let program = decode_program(bytecode)?;
  let mut listing = String::new();

  for (index, instruction) in program.iter().enumerate() {
    // Writing to a `String` cannot fail.
    let _ = writeln!(
      listing,
      "{:>5}  {:06x}  {}",
      index,
      index * INSTRUCTION_WIDTH,
      instruction
    );
  }

  if listing.is_empty() {
    listing.push_str("(empty program)\n");
  }
  Ok(listing)
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::assemble;

  #[test]
  fn listing_shows_index_offset_and_text() {
    let bytes = assemble("mov 5 r0\nadd r0 $0x10").unwrap();
    let listing = disassemble(&bytes).unwrap();
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(lines, vec![
      "    0  000000  MOV 5 R0",
      "    1  000013  ADD R0 $0x10",
      "    2  000026  HLT",
    ]);
  }

  #[test]
  fn unknown_opcodes_are_listed_raw() {
    let listing = disassemble(&[0u8; INSTRUCTION_WIDTH]).unwrap();
    assert_eq!(listing, "    0  000000  DB 0x00\n");
  }

  #[test]
  fn empty_and_torn_programs() {
    assert_eq!(disassemble(&[]).unwrap(), "(empty program)\n");
    assert!(disassemble(&[1, 2, 3]).is_err());
  }
}
