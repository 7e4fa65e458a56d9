//! Addressing modes say how the integer stored in an operand slot is interpreted, and
//! `ModeMask`s say which of those modes an opcode accepts in a given slot.

use std::fmt::{Display, Formatter};
use std::ops::BitOr;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The single mode value carried by an encoded operand slot. Values are bits so that
/// they can be combined into a `ModeMask`, but an encoded slot only ever holds one.
#[derive(
  TryFromPrimitive, IntoPrimitive,
  Clone, Copy, Eq, PartialEq, Debug, Hash
)]
#[repr(u8)]
pub enum AddressingMode {
  /// The slot is unused.
  None      = 0,
  /// The operand is the value itself: `123`, `0x7B`.
  Immediate = 1,
  /// The operand is a register index: `R1`.
  Register  = 2,
  /// The operand is a memory cell address: `$0x10`.
  Direct    = 4,
  /// The operand is a register holding a memory address: `*R1`.
  Indirect  = 8,
}

impl AddressingMode {
  pub fn code(&self) -> u8 {
    Into::<u8>::into(*self)
  }

  /// Only the modes that name a storage location can be written to.
  pub fn is_writable(&self) -> bool {
    ModeMask::ALL_RW.contains(*self)
  }
}

impl Display for AddressingMode {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      AddressingMode::None      => "none",
      AddressingMode::Immediate => "immediate",
      AddressingMode::Register  => "register",
      AddressingMode::Direct    => "direct",
      AddressingMode::Indirect  => "indirect",
    };
    write!(f, "{}", name)
  }
}

/**
  A set of addressing modes. Masks are an assembly-time notion: they describe which modes an
  opcode accepts for each operand slot. They never appear in the binary encoding.

  `ModeMask::NONE` is special: it means the slot takes no operand at all, so it "contains"
  only `AddressingMode::None`.
*/
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub struct ModeMask(u8);

impl ModeMask {
  pub const NONE   : ModeMask = ModeMask(0);
  pub const ALL    : ModeMask = ModeMask(1 | 2 | 4 | 8);
  pub const ALL_RW : ModeMask = ModeMask(2 | 4 | 8);

  pub fn bits(&self) -> u8 {
    self.0
  }

  pub fn is_none(&self) -> bool {
    self.0 == 0
  }

  pub fn contains(&self, mode: AddressingMode) -> bool {
    match mode {
      AddressingMode::None => self.is_none(),
      mode                 => self.0 & mode.code() != 0
    }
  }
}

impl From<AddressingMode> for ModeMask {
  fn from(mode: AddressingMode) -> ModeMask {
    ModeMask(mode.code())
  }
}

impl BitOr for ModeMask {
  type Output = ModeMask;
  fn bitor(self, rhs: ModeMask) -> ModeMask {
    ModeMask(self.0 | rhs.0)
  }
}

impl Display for ModeMask {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    if self.is_none() {
      return write!(f, "none");
    }
    let names: Vec<String> =
      [
        AddressingMode::Immediate,
        AddressingMode::Register,
        AddressingMode::Direct,
        AddressingMode::Indirect
      ]
        .iter()
        .filter(|mode| self.contains(**mode))
        .map(AddressingMode::to_string)
        .collect();
    write!(f, "{}", names.join("|"))
  }
}
