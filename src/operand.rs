//! The operand resolver turns one assembly operand token into an addressing mode and a word.
//!
//! | token          | mode      | value                    |
//! |----------------|-----------|--------------------------|
//! | `R5`           | register  | 5                        |
//! | `$0x100`, `$8` | direct    | 0x100, 8                 |
//! | `*R2`, `*2`    | indirect  | 2 (the register index)   |
//! | `42`, `0x2A`   | immediate | 42                       |

use std::fmt::{Display, Formatter};

use nom::{
  branch::alt,
  bytes::complete::tag,
  character::complete::{digit1, hex_digit1},
  combinator::{all_consuming, map_res},
  sequence::preceded,
  IResult
};
use thiserror::Error;

use crate::address::AddressingMode;
use crate::bytecode::Word;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Operand {
  pub mode  : AddressingMode,
  pub value : Word
}

impl Operand {
  /// The placeholder for an unused operand slot.
  pub const NONE: Operand = Operand { mode: AddressingMode::None, value: 0 };
}

impl Display for Operand {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}({})", self.mode, self.value)
  }
}

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum OperandError {
  #[error("unrecognized operand syntax")]
  InvalidSyntax,
  #[error("operand is not a valid number")]
  InvalidValue,
}

/// A decimal number or a `0X` prefixed hexadecimal number, expected to be uppercase.
fn number(text: &str) -> IResult<&str, Word> {
  alt((
    map_res(preceded(tag("0X"), hex_digit1), |digits: &str| Word::from_str_radix(digits, 16)),
    map_res(digit1, |digits: &str| digits.parse::<Word>())
  ))(text)
}

/**
  Extracts the numeric value of an operand, stripping its one character addressing prefix
  (`R`, `$` or `*`) if it has one. An indirect operand may name its register as `*R2`, so an
  `R` directly after `*` is stripped as well.
*/
pub fn to_int(token: &str) -> Result<Word, OperandError> {
  let token = token.to_uppercase();
  let digits = match token.chars().next() {
    Some('R') | Some('$') => &token[1..],
    Some('*')             => {
      let rest = &token[1..];
      rest.strip_prefix('R').unwrap_or(rest)
    }
    _                     => &token[..]
  };

  let value = match all_consuming(number)(digits) {
    Ok((_, value)) => Ok(value),
    Err(_)         => Err(OperandError::InvalidValue)
  };
  value
}

/// Classifies and evaluates a token. The checks run in order, so `R` and `$` prefixes win over
/// a numeric reading.
pub fn resolve(token: &str) -> Result<Operand, OperandError> {
  let token = token.to_uppercase();

  let mode =
    if token.starts_with('R') {
      AddressingMode::Register
    } else if token.starts_with('$') {
      AddressingMode::Direct
    } else if token.starts_with('*') {
      AddressingMode::Indirect
    } else if token.starts_with("0X") || is_decimal(&token) {
      AddressingMode::Immediate
    } else {
      return Err(OperandError::InvalidSyntax);
    };

  Ok(Operand { mode, value: to_int(&token)? })
}

fn is_decimal(token: &str) -> bool {
  !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}
