use std::convert::TryFrom;
use std::fmt::{Display, Formatter};

use strum_macros::{Display as StrumDisplay, EnumIter, EnumString, IntoStaticStr};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::address::{AddressingMode, ModeMask};
use crate::error::EncodingError;
use super::Word;

/**
  Opcodes of the virtual machine.

  The numeric codes are fixed: they are what is written into the first byte of every record,
  so changing one invalidates every assembled program. Code `0x00` is intentionally left
  unassigned so that a zero-filled record never decodes to a runnable instruction.

  The mnemonic of each opcode is its `strum` serialization, which gives the assembler a closed
  mnemonic-to-opcode table via `Operation::from_str`.
*/
#[derive(
  StrumDisplay, IntoStaticStr, EnumString, EnumIter, TryFromPrimitive, IntoPrimitive,
  Clone,        Copy,          Eq,         PartialEq, Debug,            Hash
)]
#[repr(u8)]
pub enum Operation {
  #[strum(serialize = "NOP")]  Nop  = 0x01,

  // Data movement
  #[strum(serialize = "MOV")]  Mov  = 0x02,
  #[strum(serialize = "PUSH")] Push = 0x03,
  #[strum(serialize = "POP")]  Pop  = 0x04,

  // Arithmetic
  #[strum(serialize = "ADD")]  Add  = 0x05,
  #[strum(serialize = "SUB")]  Sub  = 0x06,
  #[strum(serialize = "MUL")]  Mul  = 0x07,
  #[strum(serialize = "DIV")]  Div  = 0x08,

  // Bitwise (reserved)
  #[strum(serialize = "AND")]  And  = 0x09,
  #[strum(serialize = "OR")]   Or   = 0x0A,
  #[strum(serialize = "XOR")]  Xor  = 0x0B,
  #[strum(serialize = "NOT")]  Not  = 0x0C,
  #[strum(serialize = "LSH")]  Lsh  = 0x0D,
  #[strum(serialize = "RSH")]  Rsh  = 0x0E,

  // Comparison and branching
  #[strum(serialize = "JMP")]  Jmp  = 0x0F,
  #[strum(serialize = "CMP")]  Cmp  = 0x10,
  #[strum(serialize = "JEQ")]  Jeq  = 0x11,

  // Subroutines
  #[strum(serialize = "CALL")] Call = 200,
  #[strum(serialize = "RET")]  Ret  = 201,

  // Sized loads and stores (reserved)
  #[strum(serialize = "LD8")]  Ld8  = 240,
  #[strum(serialize = "LD16")] Ld16 = 241,
  #[strum(serialize = "LD32")] Ld32 = 242,
  #[strum(serialize = "LD64")] Ld64 = 243,
  #[strum(serialize = "ST8")]  St8  = 244,
  #[strum(serialize = "ST16")] St16 = 245,
  #[strum(serialize = "ST32")] St32 = 246,
  #[strum(serialize = "ST64")] St64 = 247,

  // System control
  #[strum(serialize = "RST")]  Rst  = 0xFE,
  #[strum(serialize = "HLT")]  Hlt  = 0xFF,
}

impl Operation {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  pub fn mnemonic(&self) -> &'static str {
    Into::<&'static str>::into(*self)
  }

  /**
    The addressing modes accepted in the (source, destination) slots.

    Single operand instructions take their operand in the destination slot, which is why
    `PUSH` and the jumps have a `NONE` source mask. `CMP` only reads, so both of its slots
    accept immediates.
  */
  pub fn operand_modes(&self) -> (ModeMask, ModeMask) {
    use Operation::*;
    match self {
      Nop | Ret | Rst | Hlt                 => (ModeMask::NONE, ModeMask::NONE),
      Push | Jmp | Jeq | Call               => (ModeMask::NONE, ModeMask::ALL),
      Pop | Not                             => (ModeMask::NONE, ModeMask::ALL_RW),
      Cmp                                   => (ModeMask::ALL,  ModeMask::ALL),
      | Mov | Add | Sub | Mul | Div
      | And | Or  | Xor | Lsh | Rsh
      | Ld8 | Ld16 | Ld32 | Ld64
      | St8 | St16 | St32 | St64            => (ModeMask::ALL,  ModeMask::ALL_RW),
    }
  }

  /// The number of operands the instruction is written with in assembly.
  pub fn arity(&self) -> usize {
    let (src, dest) = self.operand_modes();
    [src, dest].iter().filter(|mask| !mask.is_none()).count()
  }

  /// Reserved opcodes are encodable but have no execution semantics.
  pub fn is_reserved(&self) -> bool {
    use Operation::*;
    match self {
      | And | Or  | Xor | Not | Lsh | Rsh
      | Ld8 | Ld16 | Ld32 | Ld64
      | St8 | St16 | St32 | St64 => true,
      _ => false
    }
  }
}

/**
  One instruction record, holding the raw field values exactly as they appear in the binary
  encoding. Keeping the raw bytes, rather than decoding straight into enums, lets the machine
  report precisely which opcode or mode byte it could not handle.

  Use `Instruction::new` to build a record from typed parts, and `validate` (or the typed
  accessors) to go the other way.
*/
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct Instruction {
  pub opcode       : u8,
  pub src_mode     : u8,
  pub dest_mode    : u8,
  pub src_operand  : Word,
  pub dest_operand : Word,
}

impl Instruction {
  pub fn new(
    opcode       : Operation,
    src_mode     : AddressingMode,
    dest_mode    : AddressingMode,
    src_operand  : Word,
    dest_operand : Word
  ) -> Instruction
  {
    Instruction {
      opcode    : opcode.code(),
      src_mode  : src_mode.code(),
      dest_mode : dest_mode.code(),
      src_operand,
      dest_operand
    }
  }

  /// An instruction with neither operand, e.g. `HLT`.
  pub fn nullary(opcode: Operation) -> Instruction {
    Instruction::new(opcode, AddressingMode::None, AddressingMode::None, 0, 0)
  }

  pub fn operation(&self) -> Result<Operation, EncodingError> {
    Operation::try_from(self.opcode).map_err(|_| EncodingError::InvalidEncoding {
      field : "opcode",
      value : self.opcode as u64
    })
  }

  pub fn src_addressing_mode(&self) -> Result<AddressingMode, EncodingError> {
    AddressingMode::try_from(self.src_mode).map_err(|_| EncodingError::InvalidEncoding {
      field : "src_mode",
      value : self.src_mode as u64
    })
  }

  pub fn dest_addressing_mode(&self) -> Result<AddressingMode, EncodingError> {
    AddressingMode::try_from(self.dest_mode).map_err(|_| EncodingError::InvalidEncoding {
      field : "dest_mode",
      value : self.dest_mode as u64
    })
  }
}

/// Writes an operand back in the syntax the operand resolver accepts.
fn write_operand(f: &mut Formatter<'_>, mode: u8, value: Word) -> std::fmt::Result {
  match AddressingMode::try_from(mode) {
    Ok(AddressingMode::None)      => Ok(()),
    Ok(AddressingMode::Immediate) => write!(f, " {}", value),
    Ok(AddressingMode::Register)  => write!(f, " R{}", value),
    Ok(AddressingMode::Direct)    => write!(f, " ${:#X}", value),
    Ok(AddressingMode::Indirect)  => write!(f, " *R{}", value),
    Err(_)                        => write!(f, " ?{:#04x}:{}", mode, value),
  }
}

impl Display for Instruction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.operation() {
      Ok(operation) => write!(f, "{}", operation)?,
      Err(_)        => write!(f, "DB {:#04x}", self.opcode)?,
    }
    write_operand(f, self.src_mode, self.src_operand)?;
    write_operand(f, self.dest_mode, self.dest_operand)
  }
}
