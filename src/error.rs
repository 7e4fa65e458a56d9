//! Error types for the encoding, the assembler and the virtual machine.

use thiserror::Error;

use crate::address::{AddressingMode, ModeMask};
use crate::bytecode::Word;

/// Errors produced when turning bytes into instruction records and checking them.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum EncodingError {
  #[error("truncated instruction record: {available} of {expected} bytes available")]
  TruncatedRecord { available: usize, expected: usize },
  #[error("invalid encoding in field `{field}`: {value:#x}")]
  InvalidEncoding { field: &'static str, value: u64 },
}

/// Errors that abort assembly. Every variant carries the 1-based line of the source text it
/// was detected on.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum AssemblyError {
  #[error("line {line}: label `{name}` is already defined")]
  DuplicateLabel { line: usize, name: String },
  #[error("line {line}: constant `{name}` is already defined")]
  DuplicateConstant { line: usize, name: String },
  #[error("line {line}: `{name}` is not an operation")]
  UnknownMnemonic { line: usize, name: String },
  #[error("line {line}: `{token}` is not a valid operand")]
  InvalidOperandSyntax { line: usize, token: String },
  #[error("line {line}: `{token}` does not have a valid numeric value")]
  InvalidOperandValue { line: usize, token: String },
  #[error("line {line}: {source}")]
  InvalidEncoding { line: usize, source: EncodingError },
  #[error("line {line}: {mnemonic} requires {expected} operands but was given {actual}")]
  WrongArity { line: usize, mnemonic: &'static str, expected: usize, actual: usize },
  #[error(
    "line {line}: {mnemonic} does not accept {mode} addressing in its {slot} operand \
     (allowed: {allowed})"
  )]
  IllegalAddressingMode {
    line     : usize,
    mnemonic : &'static str,
    slot     : &'static str,
    mode     : AddressingMode,
    allowed  : ModeMask,
  },
  #[error("line {line}: malformed directive `{text}`")]
  InvalidDirective { line: usize, text: String },
  #[error("line {line}: malformed label `{text}`")]
  InvalidLabel { line: usize, text: String },
}

impl AssemblyError {
  /// The source line the error was detected on.
  pub fn line(&self) -> usize {
    match self {
      | AssemblyError::DuplicateLabel { line, .. }
      | AssemblyError::DuplicateConstant { line, .. }
      | AssemblyError::UnknownMnemonic { line, .. }
      | AssemblyError::InvalidOperandSyntax { line, .. }
      | AssemblyError::InvalidOperandValue { line, .. }
      | AssemblyError::InvalidEncoding { line, .. }
      | AssemblyError::WrongArity { line, .. }
      | AssemblyError::IllegalAddressingMode { line, .. }
      | AssemblyError::InvalidDirective { line, .. }
      | AssemblyError::InvalidLabel { line, .. } => *line
    }
  }
}

/// A `MachineConfig` that cannot be built.
#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum ConfigError {
  #[error("{field} must be at most {max}, got {value}")]
  TooLarge { field: &'static str, value: usize, max: usize },
}

/// Which piece of machine storage an out-of-bounds access hit.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Region {
  Register,
  Memory,
  Stack,
}

impl std::fmt::Display for Region {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Region::Register => write!(f, "register"),
      Region::Memory   => write!(f, "memory"),
      Region::Stack    => write!(f, "stack"),
    }
  }
}

/// Faults raised while running a program. All of them stop the machine.
#[derive(Debug, Error)]
pub enum ExecutionError {
  #[error("pc {pc}: {source}")]
  TruncatedRecord { pc: Word, source: EncodingError },
  #[error("pc {pc}: unsupported opcode {opcode:#04x}")]
  UnsupportedOpcode { pc: Word, opcode: u8 },
  #[error("pc {pc}: unsupported addressing mode {mode:#04x}")]
  UnsupportedAddressingMode { pc: Word, mode: u8 },
  #[error("pc {pc}: an immediate operand cannot be written to")]
  InvalidWriteTarget { pc: Word },
  #[error("pc {pc}: division by zero")]
  DivisionByZero { pc: Word },
  #[error("pc {pc}: {region} index {index} is out of bounds")]
  OutOfBoundsAccess { pc: Word, region: Region, index: Word },
  #[error("program read failed: {0}")]
  Io(#[from] std::io::Error),
}
