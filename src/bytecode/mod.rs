/*!

  The VM uses a 64 bit little-endian word size. Every instruction is a fixed-width record of
  19 bytes, so instruction `i` of a program lives at byte offset `i * 19` and the program
  counter counts instructions, not bytes. The sizes of the record components are:

    Opcode:        8 bits
    Source mode:   8 bits
    Dest mode:     8 bits
    Source:       64 bits
    Dest:         64 bits

  An operand is a raw word whose meaning depends on its addressing mode: the value itself, a
  register index, or a memory address. Labels and constants do not appear in the bytecode.
  They exist only while assembling and are resolved to plain numbers before encoding.

  The fixed width wastes space on instructions with fewer than two operands, but it means any
  instruction can be fetched by seeking directly to it, which is how the VM reads programs.

*/

mod binary;
mod instruction;
mod assembly;
mod disassembly;

pub use binary::{
  encode, encode_instruction, decode_instruction, decode_program, validate,
  EncodedInstruction, Word, WORD_SIZE, INSTRUCTION_WIDTH
};
pub use instruction::{Instruction, Operation};
pub use assembly::{assemble, Assembler, AssemblerOptions};
pub use disassembly::disassemble;
