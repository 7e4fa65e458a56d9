/*!
  The human readable textual form of bytecode is called assembly. This module translates
  assembly source into binary instruction records in two passes.

  The first pass lays the program out: it applies directives, binds each label to the index
  of the instruction that follows it, and queues every instruction together with the `.ORG`
  offset in force where it appeared. The second pass substitutes labels and constants into
  the operands, resolves each operand to an addressing mode and value, relocates direct
  addresses by the queued offset, and encodes the result.

  Source text is case-insensitive. Everything from `;` to the end of a line is a comment.

  ```text
          .EQU LIMIT 10
          .ORG 0x100
          MOV 0 R0
  LOOP:
          ADD 1 R0
          MOV R0 $0       ; stored at memory[0x100]
          CMP R0 LIMIT
          JEQ DONE
          JMP LOOP
  DONE:
          HLT
  ```
*/

use std::collections::HashMap;
use std::str::FromStr;

use string_cache::DefaultAtom;
use nom::{
  branch::alt,
  bytes::complete::take_while1,
  character::complete::{char as one_char, space0, space1},
  combinator::{all_consuming, map, opt, recognize},
  multi::separated_list,
  sequence::{preceded, tuple},
  IResult
};
use tracing::debug;

use crate::address::AddressingMode;
use crate::error::AssemblyError;
use crate::operand::{self, Operand, OperandError};
use super::{encode_instruction, validate, Instruction, Operation, Word, INSTRUCTION_WIDTH};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AssemblerOptions {
  /// Emit a `NOP` as instruction 0. Labels account for the extra instruction.
  pub leading_nop: bool
}

/// Assembles `source` with default options.
pub fn assemble(source: &str) -> Result<Vec<u8>, AssemblyError> {
  Assembler::default().assemble(source)
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Assembler {
  options: AssemblerOptions
}

/// A comment-stripped, uppercased, non-empty source line and its 1-based line number.
struct SourceLine {
  number : usize,
  text   : String
}

/// An instruction queued by the first pass.
struct PendingInstruction {
  line      : usize,
  mnemonic  : String,
  operands  : Vec<String>,
  offset    : Word
}

/// Output of the first pass. Only lives for the duration of one assembly.
#[derive(Default)]
struct Layout {
  instructions : Vec<PendingInstruction>,
  labels       : HashMap<DefaultAtom, Word>,
  constants    : HashMap<DefaultAtom, String>
}

// region Line grammar

/// A mnemonic, directive name or operand: anything up to whitespace or a comma.
fn word(input: &str) -> IResult<&str, &str> {
  take_while1(|c: char| !c.is_whitespace() && c != ',')(input)
}

/// Operands are separated by whitespace, a comma, or both.
fn separator(input: &str) -> IResult<&str, &str> {
  alt((
    recognize(tuple((space0, one_char(','), space0))),
    space1
  ))(input)
}

/// `WORD [WORD[, ]WORD ...]`, consuming the whole line.
fn statement(input: &str) -> IResult<&str, (&str, Vec<&str>)> {
  all_consuming(tuple((
    word,
    map(
      opt(preceded(space1, separated_list(separator, word))),
      |operands| operands.unwrap_or_default()
    )
  )))(input)
}

fn is_identifier(name: &str) -> bool {
  let identifier: IResult<&str, &str> =
    all_consuming(take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'))(name);
  identifier.is_ok() && !name.starts_with(|c: char| c.is_ascii_digit())
}

// endregion

fn preprocess(source: &str) -> Vec<SourceLine> {
  source
    .lines()
    .enumerate()
    .filter_map(|(index, line)| {
      let code = line.split(';').next().unwrap_or("").trim();
      match code.is_empty() {
        true  => None,
        false => Some(SourceLine { number: index + 1, text: code.to_uppercase() })
      }
    })
    .collect()
}

impl Assembler {

  pub fn new(options: AssemblerOptions) -> Assembler {
    Assembler { options }
  }

  /// Assembles `source` into the binary program format: one record per instruction,
  /// terminated by a `HLT`. Nothing is returned unless the whole source assembles.
  pub fn assemble(&self, source: &str) -> Result<Vec<u8>, AssemblyError> {
    let instructions = self.assemble_instructions(source)?;
    let mut code = Vec::with_capacity(instructions.len() * INSTRUCTION_WIDTH);
    for instruction in &instructions {
      code.extend_from_slice(&encode_instruction(instruction));
    }
    Ok(code)
  }

  /// Like `assemble`, but stops short of encoding.
  pub fn assemble_instructions(&self, source: &str) -> Result<Vec<Instruction>, AssemblyError> {
    let lines  = preprocess(source);
    let layout = self.layout(&lines)?;

    debug!(
      instructions = layout.instructions.len(),
      labels       = layout.labels.len(),
      constants    = layout.constants.len(),
      "layout pass complete"
    );

    let mut instructions = Vec::with_capacity(layout.instructions.len() + 2);
    if self.options.leading_nop {
      instructions.push(Instruction::nullary(Operation::Nop));
    }
    for pending in &layout.instructions {
      instructions.push(self.translate(pending, &layout)?);
    }
    // Every program ends in a halt, whether or not the source has one.
    instructions.push(Instruction::nullary(Operation::Hlt));

    debug!(records = instructions.len(), "encoding pass complete");
    Ok(instructions)
  }

  // region Pass 1

  fn layout(&self, lines: &[SourceLine]) -> Result<Layout, AssemblyError> {
    let mut layout           = Layout::default();
    let mut offset: Word     = 0;
    let mut in_data_section  = false;
    // Index of the first queued instruction in the output.
    let base: Word = match self.options.leading_nop {
      true  => 1,
      false => 0
    };

    for line in lines {
      let text = line.text.as_str();

      if text.starts_with('.') {
        let (name, args) = match statement(&text[1..]) {
          Ok((_, parsed)) => parsed,
          Err(_)          => return Err(invalid_directive(line))
        };

        match (name, args.as_slice()) {

          ("ORG", [value]) => {
            let value = layout.constants
                              .get(&DefaultAtom::from(*value))
                              .map(String::as_str)
                              .unwrap_or(*value);
            offset = operand::to_int(value).map_err(|_| invalid_directive(line))?;
            debug!(line = line.number, offset, "origin set");
          }

          ("EQU", [constant, value]) => {
            if !is_identifier(constant) {
              return Err(invalid_directive(line));
            }
            let key = DefaultAtom::from(*constant);
            if layout.constants.contains_key(&key) {
              return Err(AssemblyError::DuplicateConstant {
                line : line.number,
                name : constant.to_string()
              });
            }
            layout.constants.insert(key, value.to_string());
          }

          ("DATA", []) => {
            debug!(line = line.number, "entering data section");
            in_data_section = true;
          }

          ("END", []) => {
            debug!(line = line.number, "end of assembly");
            break;
          }

          _ => return Err(invalid_directive(line))

        } // end match directive
        continue;
      }

      if in_data_section {
        // Data emission is not supported yet; the section's contents are skipped.
        continue;
      }

      if text.ends_with(':') {
        let name = text[..text.len() - 1].trim_end();
        if !is_identifier(name) {
          return Err(AssemblyError::InvalidLabel { line: line.number, text: text.to_string() });
        }
        let key = DefaultAtom::from(name);
        if layout.labels.contains_key(&key) {
          return Err(AssemblyError::DuplicateLabel {
            line : line.number,
            name : name.to_string()
          });
        }
        layout.labels.insert(key, base + layout.instructions.len() as Word);
        continue;
      }

      let (mnemonic, operands) = match statement(text) {
        Ok((_, parsed)) => parsed,
        Err(_)          => {
          return Err(AssemblyError::InvalidOperandSyntax {
            line  : line.number,
            token : text.to_string()
          })
        }
      };
      layout.instructions.push(PendingInstruction {
        line     : line.number,
        mnemonic : mnemonic.to_string(),
        operands : operands.iter().map(|operand| operand.to_string()).collect(),
        offset
      });
    } // end for line

    Ok(layout)
  }

  // endregion

  // region Pass 2

  fn translate(&self, pending: &PendingInstruction, layout: &Layout)
    -> Result<Instruction, AssemblyError>
  {
    let line = pending.line;
    let operation = Operation::from_str(&pending.mnemonic).map_err(|_| {
      AssemblyError::UnknownMnemonic { line, name: pending.mnemonic.clone() }
    })?;

    if pending.operands.len() != operation.arity() {
      return Err(AssemblyError::WrongArity {
        line,
        mnemonic : operation.mnemonic(),
        expected : operation.arity(),
        actual   : pending.operands.len()
      });
    }

    let mut resolved = Vec::with_capacity(pending.operands.len());
    for token in &pending.operands {
      resolved.push(resolve_operand(line, token, pending.offset, layout)?);
    }

    // One operand is the destination; two are `src dest`.
    let (src, dest) = match resolved.as_slice() {
      []          => (Operand::NONE, Operand::NONE),
      [dest]      => (Operand::NONE, *dest),
      [src, dest] => (*src, *dest),
      _           => unreachable!("operand count was checked against the arity")
    };

    let (src_allowed, dest_allowed) = operation.operand_modes();
    let slots = [("source", src, src_allowed), ("destination", dest, dest_allowed)];
    for (slot, operand, allowed) in slots.iter() {
      if !allowed.contains(operand.mode) {
        return Err(AssemblyError::IllegalAddressingMode {
          line,
          mnemonic : operation.mnemonic(),
          slot     : *slot,
          mode     : operand.mode,
          allowed  : *allowed
        });
      }
    }

    let instruction = Instruction::new(operation, src.mode, dest.mode, src.value, dest.value);
    validate(&instruction).map_err(|source| AssemblyError::InvalidEncoding { line, source })?;
    Ok(instruction)
  }

  // endregion
}

/// Substitutes labels and constants into `token` (one level only) and resolves the result.
/// Direct addresses are relocated by the instruction's `.ORG` offset.
fn resolve_operand(line: usize, token: &str, offset: Word, layout: &Layout)
  -> Result<Operand, AssemblyError>
{
  let substituted: String =
    if let Some(index) = layout.labels.get(&DefaultAtom::from(token)) {
      index.to_string()
    } else if let Some(index) = token.strip_prefix('$')
                                     .and_then(|name| layout.labels.get(&DefaultAtom::from(name))) {
      // `$LABEL` is the byte address of the labelled instruction.
      format!("${}", index * INSTRUCTION_WIDTH as Word)
    } else if let Some(value) = layout.constants.get(&DefaultAtom::from(token)) {
      value.clone()
    } else {
      token.to_string()
    };

  let mut operand = operand::resolve(&substituted).map_err(|error| match error {
    OperandError::InvalidSyntax => AssemblyError::InvalidOperandSyntax {
      line, token: token.to_string()
    },
    OperandError::InvalidValue  => AssemblyError::InvalidOperandValue {
      line, token: token.to_string()
    },
  })?;

  if operand.mode == AddressingMode::Direct {
    operand.value = operand.value.checked_add(offset).ok_or_else(|| {
      AssemblyError::InvalidOperandValue { line, token: token.to_string() }
    })?;
  }
  Ok(operand)
}

fn invalid_directive(line: &SourceLine) -> AssemblyError {
  AssemblyError::InvalidDirective { line: line.number, text: line.text.clone() }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::bytecode::{decode_program, Word};

  fn instructions(source: &str) -> Vec<Instruction> {
    Assembler::default().assemble_instructions(source).expect("assembly failed")
  }

  fn reg(index: Word) -> Operand {
    Operand { mode: AddressingMode::Register, value: index }
  }

  fn imm(value: Word) -> Operand {
    Operand { mode: AddressingMode::Immediate, value }
  }

  fn instr(operation: Operation, src: Operand, dest: Operand) -> Instruction {
    Instruction::new(operation, src.mode, dest.mode, src.value, dest.value)
  }

  #[test]
  fn statement_grammar() {
    assert_eq!(statement("MOV 5 R0"), Ok(("", ("MOV", vec!["5", "R0"]))));
    assert_eq!(statement("MOV 5, R0"), Ok(("", ("MOV", vec!["5", "R0"]))));
    assert_eq!(statement("MOV\t5 ,R0"), Ok(("", ("MOV", vec!["5", "R0"]))));
    assert_eq!(statement("HLT"), Ok(("", ("HLT", vec![]))));
    assert!(statement("MOV 5,").is_err());
  }

  #[test]
  fn empty_source_is_a_lone_halt() {
    assert_eq!(instructions(""), vec![Instruction::nullary(Operation::Hlt)]);
    assert_eq!(instructions("  ; nothing here\n\n"), vec![Instruction::nullary(Operation::Hlt)]);
  }

  #[test]
  fn operand_roles() {
    let program = instructions("nop\npush r3\nmov 5 r0\n");
    assert_eq!(program[0], Instruction::nullary(Operation::Nop));
    assert_eq!(program[1], instr(Operation::Push, Operand::NONE, reg(3)));
    assert_eq!(program[2], instr(Operation::Mov, imm(5), reg(0)));
    assert_eq!(program[3], Instruction::nullary(Operation::Hlt));
  }

  #[test]
  fn comments_and_case_are_ignored() {
    let program = instructions("  Add  R1,r2   ; r2 += r1\n");
    assert_eq!(program[0], instr(Operation::Add, reg(1), reg(2)));
  }

  #[test]
  fn forward_and_backward_labels() {
    let source = "
      start:
        jmp end
      middle:
        nop
        jmp start
      end:
        jmp middle
    ";
    let program = instructions(source);
    assert_eq!(program[0], instr(Operation::Jmp, Operand::NONE, imm(3)));
    assert_eq!(program[2], instr(Operation::Jmp, Operand::NONE, imm(0)));
    assert_eq!(program[3], instr(Operation::Jmp, Operand::NONE, imm(1)));
  }

  #[test]
  fn leading_nop_shifts_labels() {
    let assembler = Assembler::new(AssemblerOptions { leading_nop: true });
    let program = assembler.assemble_instructions("here:\njmp here").unwrap();
    assert_eq!(program[0], Instruction::nullary(Operation::Nop));
    assert_eq!(program[1], instr(Operation::Jmp, Operand::NONE, imm(1)));
  }

  #[test]
  fn org_relocates_direct_operands_only() {
    let program = instructions(".org 0x100\nmov $0 r1\nmov 0 $2\nmov r0 r1");
    assert_eq!(program[0].src_mode, AddressingMode::Direct.code());
    assert_eq!(program[0].src_operand, 0x100);
    assert_eq!(program[1].src_operand, 0);
    assert_eq!(program[1].dest_operand, 0x102);
    assert_eq!(program[2].src_operand, 0);
  }

  #[test]
  fn org_applies_until_the_next_org() {
    let program = instructions("mov $1 r0\n.org 16\nmov $1 r0\n.org 0\nmov $1 r0");
    let sources: Vec<Word> = program[..3].iter().map(|i| i.src_operand).collect();
    assert_eq!(sources, vec![1, 17, 1]);
  }

  #[test]
  fn constants_substitute_once() {
    let program = instructions(".equ LIMIT 10\n.equ SLOT $4\n.equ ALIAS LIMIT\nmov LIMIT SLOT");
    assert_eq!(program[0], Instruction::new(
      Operation::Mov, AddressingMode::Immediate, AddressingMode::Direct, 10, 4
    ));

    // `ALIAS` is bound to the text `LIMIT`, which is not substituted again.
    assert_eq!(
      Assembler::default().assemble_instructions(".equ ALIAS LIMIT\n.equ LIMIT 1\nmov ALIAS r0"),
      Err(AssemblyError::InvalidOperandSyntax { line: 3, token: "ALIAS".to_string() })
    );
  }

  #[test]
  fn org_accepts_a_constant() {
    let program = instructions(".equ BASE 0x20\n.org BASE\nmov $1 r0");
    assert_eq!(program[0].src_operand, 0x21);
  }

  #[test]
  fn dollar_label_is_a_byte_address() {
    let program = instructions("nop\ntarget:\nnop\nmov $target r0");
    assert_eq!(program[2].src_mode, AddressingMode::Direct.code());
    assert_eq!(program[2].src_operand, INSTRUCTION_WIDTH as Word);
  }

  #[test]
  fn end_stops_assembly() {
    let program = instructions("nop\n.end\nthis is not assembly");
    assert_eq!(program.len(), 2);
  }

  #[test]
  fn data_section_is_skipped() {
    let program = instructions("nop\n.data\nwhatever 1 2 3\nblob:\n.end");
    assert_eq!(program, vec![
      Instruction::nullary(Operation::Nop),
      Instruction::nullary(Operation::Hlt)
    ]);
  }

  #[test]
  fn duplicate_label() {
    assert_eq!(
      assemble("a:\nnop\nA:\nnop"),
      Err(AssemblyError::DuplicateLabel { line: 3, name: "A".to_string() })
    );
  }

  #[test]
  fn duplicate_constant() {
    assert_eq!(
      assemble(".equ X 1\n.equ X 2"),
      Err(AssemblyError::DuplicateConstant { line: 2, name: "X".to_string() })
    );
  }

  #[test]
  fn unknown_mnemonic() {
    assert_eq!(
      assemble("nop\n\nfrob r1 r2"),
      Err(AssemblyError::UnknownMnemonic { line: 3, name: "FROB".to_string() })
    );
  }

  #[test]
  fn operand_errors_carry_the_token() {
    assert_eq!(
      assemble("jmp nowhere"),
      Err(AssemblyError::InvalidOperandSyntax { line: 1, token: "NOWHERE".to_string() })
    );
    assert_eq!(
      assemble("mov 0xZZ r1"),
      Err(AssemblyError::InvalidOperandValue { line: 1, token: "0XZZ".to_string() })
    );
  }

  #[test]
  fn arity_is_checked() {
    assert_eq!(
      assemble("add r1"),
      Err(AssemblyError::WrongArity { line: 1, mnemonic: "ADD", expected: 2, actual: 1 })
    );
    assert_eq!(
      assemble("hlt r1"),
      Err(AssemblyError::WrongArity { line: 1, mnemonic: "HLT", expected: 0, actual: 1 })
    );
  }

  #[test]
  fn immediate_destination_is_illegal() {
    match assemble("mov r1 5") {
      Err(AssemblyError::IllegalAddressingMode { mnemonic, slot, mode, .. }) => {
        assert_eq!(mnemonic, "MOV");
        assert_eq!(slot, "destination");
        assert_eq!(mode, AddressingMode::Immediate);
      }
      other => panic!("unexpected result: {:?}", other)
    }
  }

  #[test]
  fn malformed_directives_and_labels() {
    assert!(matches!(assemble(".org"), Err(AssemblyError::InvalidDirective { line: 1, .. })));
    assert!(matches!(assemble(".org zz"), Err(AssemblyError::InvalidDirective { .. })));
    assert!(matches!(assemble(".equ 1X 2"), Err(AssemblyError::InvalidDirective { .. })));
    assert!(matches!(assemble(".include x"), Err(AssemblyError::InvalidDirective { .. })));
    assert!(matches!(assemble("two words:"), Err(AssemblyError::InvalidLabel { .. })));
  }

  #[test]
  fn reserved_opcodes_assemble() {
    let program = instructions("and r1 r2\nld64 $0 r1\nnot r3");
    assert_eq!(program[0].operation(), Ok(Operation::And));
    assert_eq!(program[1].operation(), Ok(Operation::Ld64));
    assert_eq!(program[2], instr(Operation::Not, Operand::NONE, reg(3)));
  }

  #[test]
  fn binary_output_is_the_encoded_instructions() {
    let source = "mov 5 r0\nloop:\nadd 1 r0\njmp loop";
    let bytes = assemble(source).unwrap();
    assert_eq!(bytes.len(), 4 * INSTRUCTION_WIDTH);
    assert_eq!(decode_program(&bytes).unwrap(), instructions(source));
  }
}
