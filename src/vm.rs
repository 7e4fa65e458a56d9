//! Structures and functions for the virtual machine that executes assembled programs.
//!
//! The machine reads its program straight from a seekable byte stream: instruction `pc` is
//! fetched by seeking to `pc * INSTRUCTION_WIDTH`, so a program never has to be loaded into
//! memory first and jumps cost a seek.

use std::convert::TryFrom;
use std::fmt::{Display, Formatter};
use std::io::{Cursor, Read, Seek, SeekFrom};

use prettytable::{format as TableFormat, Table};
use tracing::{debug, trace, warn};

use crate::address::AddressingMode;
use crate::bytecode::{decode_instruction, Instruction, Operation, Word, INSTRUCTION_WIDTH, WORD_SIZE};
use crate::error::{ConfigError, ExecutionError, Region};

/// Bit 0 of the status register: the last `CMP` found its operands equal.
pub const STATUS_EQUAL: Word = 0x1;

/// Upper bound on the size of each store a `MachineConfig` accepts.
pub const MAX_CELLS: usize = 1 << 24;

/// How many cells of each store the state table shows.
const DISPLAY_ROWS: usize = 16;

/// Storage sizes of a machine. The defaults are the architectural sizes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MachineConfig {
  pub registers    : usize,
  pub memory_cells : usize,
  pub stack_cells  : usize,
}

impl MachineConfig {
  /// Rejects store sizes above `MAX_CELLS`.
  pub fn validate(&self) -> Result<(), ConfigError> {
    let sizes = [
      ("registers",    self.registers),
      ("memory cells", self.memory_cells),
      ("stack cells",  self.stack_cells),
    ];
    for (field, value) in sizes.iter() {
      if *value > MAX_CELLS {
        return Err(ConfigError::TooLarge { field: *field, value: *value, max: MAX_CELLS });
      }
    }
    Ok(())
  }
}

impl Default for MachineConfig {
  fn default() -> MachineConfig {
    MachineConfig {
      registers    : 64,
      memory_cells : 8192,
      stack_cells  : 1024,
    }
  }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Status {
  Running,
  /// Stopped by `HLT` or by running off the end of the program.
  Halted,
  /// Stopped by an execution error.
  Faulted,
}

impl Display for Status {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Status::Running => write!(f, "Running"),
      Status::Halted  => write!(f, "Halted"),
      Status::Faulted => write!(f, "Faulted"),
    }
  }
}

/// Everything an executing program can observe or change.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineState {
  // Memory Stores
  pub registers : Vec<Word>,
  pub memory    : Vec<Word>,  // Addressed by cell in direct mode
  pub stack     : Vec<Word>,  // Only reachable through `PUSH` and `POP`

  // Registers //
  pub pc        : Word,       // Program Counter, an instruction index
  pub sp        : Word,       // Stack Pointer, a byte offset into `stack`
  pub sr        : Word,       // Status Register
  pub ra        : Word,       // Return Address, a single slot

  pub status    : Status,
}

impl MachineState {
  pub fn new(config: &MachineConfig) -> MachineState {
    MachineState {
      registers : vec![0; config.registers],
      memory    : vec![0; config.memory_cells],
      stack     : vec![0; config.stack_cells],
      pc        : 0,
      // The stack grows down from the top of its region.
      sp        : (config.stack_cells as Word).saturating_mul(WORD_SIZE as Word),
      sr        : 0,
      ra        : 0,
      status    : Status::Running,
    }
  }

  /// Whether the last `CMP` set the equal flag.
  pub fn equal_flag(&self) -> bool {
    self.sr & STATUS_EQUAL != 0
  }

  // region Display methods

  fn make_register_table(
    name      : char,
    registers : &[Word],
    highlight : usize,
    start     : usize
  ) -> Table
  {
    let mut table = Table::new();

    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(row![ubr->"Address", ubl->"Contents"]);

    for (i, value) in registers.iter().enumerate() {
      match i + start == highlight {

        true  => {
          table.add_row(
            row![r->format!("* --> {}[{}] =", name, i + start), format!("{:#x}", value)]
          );
        }

        false => {
          table.add_row(
            row![r->format!("{}[{}] =", name, i + start), format!("{:#x}", value)]
          );
        }

      } // end match on highlight
    } // end for
    table
  }

  // endregion
}

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for MachineState {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let shown_registers = self.registers.len().min(DISPLAY_ROWS);
    let shown_memory    = self.memory.len().min(DISPLAY_ROWS);
    // Live stack entries run from the slot `sp` points at up to the top.
    let stack_top       = (self.sp as usize / WORD_SIZE).min(self.stack.len());
    let stack_end       = self.stack.len().min(stack_top + DISPLAY_ROWS);

    let r_table = MachineState::make_register_table(
      'R', &self.registers[..shown_registers], usize::MAX, 0
    );
    let m_table = MachineState::make_register_table(
      'M', &self.memory[..shown_memory], usize::MAX, 0
    );
    let s_table = MachineState::make_register_table(
      'S', &self.stack[stack_top..stack_end], stack_top, stack_top
    );

    let mut combined_table = table!([r_table, m_table, s_table]);

    combined_table.set_titles(row![ub->"Registers", ub->"Memory", ub->"Stack"]);
    combined_table.set_format(*TABLE_DISPLAY_FORMAT);

    write!(
      f,
      "PC: {}  SP: {:#x}  SR: {}  RA: {}  {}\n{}",
      self.pc, self.sp, self.sr, self.ra, self.status, combined_table
    )
  }
}


/// The interpreter. It exclusively owns its `MachineState`; independent machines share nothing.
pub struct Machine {
  config : MachineConfig,
  state  : MachineState,
}

impl Default for Machine {
  fn default() -> Machine {
    Machine::new(MachineConfig::default())
  }
}

impl Machine {

  pub fn new(config: MachineConfig) -> Machine {
    Machine {
      config,
      state: MachineState::new(&config),
    }
  }

  pub fn config(&self) -> &MachineConfig {
    &self.config
  }

  /// The current state, e.g. for a per-cycle diagnostic dump between calls to `step`.
  pub fn state(&self) -> &MachineState {
    &self.state
  }

  pub fn into_state(self) -> MachineState {
    self.state
  }

  /// Restores every register and store to its initial value. The machine keeps running.
  pub fn reset(&mut self) {
    self.state = MachineState::new(&self.config);
  }

  // region Run loop

  /**
    Runs `program` until it halts or faults. On success the final state is returned. On a
    fault the error is returned and the machine keeps the state it had when the fault
    occurred, available through `state()`.

    A machine that is no longer running returns `Ok` with its current state immediately. That
    includes a machine that already faulted, so check `status` before trusting the result of a
    second call.
  */
  pub fn run<P: Read + Seek>(&mut self, program: &mut P) -> Result<&MachineState, ExecutionError> {
    while self.step(program)? == Status::Running {}
    debug!(pc = self.state.pc, status = %self.state.status, "machine stopped");
    Ok(&self.state)
  }

  /// Performs one fetch-decode-execute cycle and reports the resulting status.
  pub fn step<P: Read + Seek>(&mut self, program: &mut P) -> Result<Status, ExecutionError> {
    if self.state.status != Status::Running {
      return Ok(self.state.status);
    }

    let at = self.state.pc;
    let result =
      match Machine::fetch(program, at) {

        Ok(Some(instruction)) => {
          // Advance first, so control flow instructions can simply overwrite `pc`.
          self.state.pc = at.wrapping_add(1);
          self.execute(&instruction, at)
        }

        Ok(None) => {
          debug!(pc = at, "end of program");
          self.state.status = Status::Halted;
          Ok(())
        }

        Err(error) => Err(error)

      };

    if let Err(error) = result {
      warn!(pc = at, %error, "execution fault");
      self.state.pc     = at;
      self.state.status = Status::Faulted;
      return Err(error);
    }

    #[cfg(feature = "trace_computation")] println!("{}", self.state);

    Ok(self.state.status)
  }

  /// Reads the record for instruction `pc`. `None` means there is no whole record there,
  /// which ends the program.
  fn fetch<P: Read + Seek>(program: &mut P, pc: Word) -> Result<Option<Instruction>, ExecutionError> {
    let offset = match pc.checked_mul(INSTRUCTION_WIDTH as Word) {
      Some(offset) => offset,
      None         => return Ok(None)
    };
    program.seek(SeekFrom::Start(offset))?;

    let mut record = Vec::with_capacity(INSTRUCTION_WIDTH);
    program.by_ref().take(INSTRUCTION_WIDTH as u64).read_to_end(&mut record)?;

    match record.len() {
      0 => Ok(None),
      n if n < INSTRUCTION_WIDTH => {
        // A torn trailing record ends the program like a clean end of file.
        warn!(pc, available = n, "partial instruction record at end of program");
        Ok(None)
      }
      _ => {
        decode_instruction(&record)
          .map(Some)
          .map_err(|source| ExecutionError::TruncatedRecord { pc, source })
      }
    }
  }

  // endregion

  // region VM instruction methods

  fn execute(&mut self, instruction: &Instruction, at: Word) -> Result<(), ExecutionError> {
    use Operation::*;

    trace!(pc = at, %instruction, "execute");

    let operation = instruction.operation().map_err(|_| {
      ExecutionError::UnsupportedOpcode { pc: at, opcode: instruction.opcode }
    })?;
    let src  = (instruction.src_mode,  instruction.src_operand);
    let dest = (instruction.dest_mode, instruction.dest_operand);

    match operation {

      Nop => {}

      Mov => {
        let value = self.read(src, at)?;
        self.write(dest, value, at)?;
      }

      Add | Sub | Mul | Div => {
        let right = self.read(src, at)?;
        let left  = self.read(dest, at)?;
        let value = match operation {
          Add => left.wrapping_add(right),
          Sub => left.wrapping_sub(right),
          Mul => left.wrapping_mul(right),
          _   => {
            if right == 0 {
              return Err(ExecutionError::DivisionByZero { pc: at });
            }
            left / right
          }
        };
        self.write(dest, value, at)?;
      }

      // Single operand instructions carry their operand in the destination slot.
      Push => {
        let value = self.read(dest, at)?;
        self.push(value, at)?;
      }

      Pop => {
        let value = self.top_of_stack(at)?;
        self.write(dest, value, at)?;
        self.state.sp += WORD_SIZE as Word;
      }

      Jmp => {
        self.state.pc = self.read(dest, at)?;
      }

      Call => {
        // Only one return address is kept, so a nested call overwrites the outer one.
        let target = self.read(dest, at)?;
        self.state.ra = self.state.pc;
        self.state.pc = target;
      }

      Ret => {
        self.state.pc = self.state.ra;
        self.state.ra = 0;
      }

      Cmp => {
        let equal = self.read(src, at)? == self.read(dest, at)?;
        match equal {
          true  => self.state.sr |= STATUS_EQUAL,
          false => self.state.sr &= !STATUS_EQUAL,
        }
      }

      Jeq => {
        if self.state.equal_flag() {
          self.state.pc = self.read(dest, at)?;
          self.state.sr &= !STATUS_EQUAL;
        }
      }

      Rst => {
        debug!(pc = at, "reset");
        self.reset();
      }

      Hlt => {
        debug!(pc = at, "halt");
        self.state.status = Status::Halted;
      }

      | And | Or  | Xor | Not | Lsh | Rsh
      | Ld8 | Ld16 | Ld32 | Ld64
      | St8 | St16 | St32 | St64 => {
        return Err(ExecutionError::UnsupportedOpcode { pc: at, opcode: instruction.opcode });
      }

    } // end match operation

    Ok(())
  }

  /// Reads the value an operand denotes.
  fn read(&self, (mode, value): (u8, Word), at: Word) -> Result<Word, ExecutionError> {
    match AddressingMode::try_from(mode) {
      Ok(AddressingMode::Immediate) => Ok(value),
      Ok(AddressingMode::Register)  => {
        let index = slot(&self.state.registers, value, Region::Register, at)?;
        Ok(self.state.registers[index])
      }
      Ok(AddressingMode::Direct)    => {
        let index = slot(&self.state.memory, value, Region::Memory, at)?;
        Ok(self.state.memory[index])
      }
      // Indirect addressing has no execution semantics.
      _ => Err(ExecutionError::UnsupportedAddressingMode { pc: at, mode })
    }
  }

  /// Stores `data` in the location an operand denotes.
  fn write(&mut self, (mode, value): (u8, Word), data: Word, at: Word) -> Result<(), ExecutionError> {
    match AddressingMode::try_from(mode) {
      Ok(AddressingMode::Immediate) => Err(ExecutionError::InvalidWriteTarget { pc: at }),
      Ok(AddressingMode::Register)  => {
        let index = slot(&self.state.registers, value, Region::Register, at)?;
        self.state.registers[index] = data;
        Ok(())
      }
      Ok(AddressingMode::Direct)    => {
        let index = slot(&self.state.memory, value, Region::Memory, at)?;
        self.state.memory[index] = data;
        Ok(())
      }
      _ => Err(ExecutionError::UnsupportedAddressingMode { pc: at, mode })
    }
  }

  fn push(&mut self, value: Word, at: Word) -> Result<(), ExecutionError> {
    let overflow = ExecutionError::OutOfBoundsAccess {
      pc     : at,
      region : Region::Stack,
      index  : self.state.sp
    };
    let sp = self.state.sp.checked_sub(WORD_SIZE as Word).ok_or(overflow)?;
    let index = slot(&self.state.stack, sp / WORD_SIZE as Word, Region::Stack, at)?;

    self.state.stack[index] = value;
    self.state.sp = sp;
    Ok(())
  }

  /// The value `sp` points at. Fails when the stack is empty.
  fn top_of_stack(&self, at: Word) -> Result<Word, ExecutionError> {
    let index = slot(&self.state.stack, self.state.sp / WORD_SIZE as Word, Region::Stack, at)?;
    Ok(self.state.stack[index])
  }

  // endregion
}

/// Bounds-checks `index` against `store`.
fn slot(store: &[Word], index: Word, region: Region, at: Word) -> Result<usize, ExecutionError> {
  match usize::try_from(index) {
    Ok(i) if i < store.len() => Ok(i),
    _ => Err(ExecutionError::OutOfBoundsAccess { pc: at, region, index })
  }
}

/// Runs an in-memory program on a default machine and returns its final state.
pub fn run_program(bytecode: &[u8]) -> Result<MachineState, ExecutionError> {
  let mut machine = Machine::default();
  machine.run(&mut Cursor::new(bytecode))?;
  Ok(machine.into_state())
}
