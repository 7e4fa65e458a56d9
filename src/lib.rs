/*!
  A tiny register machine: a fixed-width 19 byte instruction format, a two-pass assembler
  that produces it, a disassembler, and a virtual machine that interprets it straight from a
  seekable stream.

  ```text
  source text ──assemble──▶ records ──Machine::run──▶ MachineState
  ```
*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

pub mod address;
pub mod bytecode;
pub mod error;
pub mod operand;
pub mod vm;

pub use address::{AddressingMode, ModeMask};
pub use bytecode::{
  assemble, disassemble, Assembler, AssemblerOptions, Instruction, Operation, Word,
  INSTRUCTION_WIDTH
};
pub use error::{AssemblyError, ConfigError, EncodingError, ExecutionError, Region};
pub use vm::{run_program, Machine, MachineConfig, MachineState, Status, MAX_CELLS};
