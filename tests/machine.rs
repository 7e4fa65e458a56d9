use std::io::Cursor;

use proptest::prelude::*;
use tiny_vm::{
  assemble, run_program, ExecutionError, Machine, MachineConfig, MachineState, Status, Word,
  INSTRUCTION_WIDTH
};

fn run(source: &str) -> Result<MachineState, ExecutionError> {
  run_program(&assemble(source).expect("assembly failed"))
}

#[test]
fn add_two_registers() {
  let state = run("MOV 5 R0\nMOV 3 R1\nADD R0 R1\nHLT").unwrap();
  assert_eq!(state.registers[1], 8);
  assert_eq!(state.registers[0], 5);
  assert_eq!(state.status, Status::Halted);
}

#[test]
fn sum_demo() {
  let state = run(include_str!("../demos/sum.asm")).unwrap();
  assert_eq!(state.registers[1], 55);
  assert_eq!(state.memory[0x100], 55);
  assert_eq!(state.memory[0], 0);
}

#[test]
fn factorial_demo() {
  let state = run(include_str!("../demos/factorial.asm")).unwrap();
  assert_eq!(state.registers[0], 120);
  assert_eq!(state.sp, (MachineConfig::default().stack_cells * 8) as Word);
  assert_eq!(state.ra, 0);
}

#[test]
fn jeq_taken_clears_the_flag() {
  let state = run("MOV 0 R0\nCMP R0 0\nJEQ SKIP\nMOV 1 R1\nSKIP:\nHLT").unwrap();
  assert_eq!(state.registers[1], 0);
  assert_eq!(state.sr, 0);
}

#[test]
fn jeq_not_taken_falls_through() {
  let state = run("MOV 2 R0\nCMP R0 0\nJEQ SKIP\nMOV 1 R1\nSKIP:\nHLT").unwrap();
  assert_eq!(state.registers[1], 1);
  assert_eq!(state.sr, 0);
}

#[test]
fn push_pop_restores_value_and_sp() {
  let state = run("MOV 99 R4\nPUSH R4\nMOV 0 R4\nPOP R4").unwrap();
  assert_eq!(state.registers[4], 99);
  assert_eq!(state.sp, 1024 * 8);
}

#[test]
fn reserved_opcode_is_fatal() {
  match run("NOT R0") {
    Err(ExecutionError::UnsupportedOpcode { pc: 0, opcode }) => assert_eq!(opcode, 0x0C),
    other => panic!("unexpected result: {:?}", other.map(|state| state.status))
  }
}

#[test]
fn division_by_zero_is_fatal() {
  match run("MOV 1 R0\nDIV 0 R0") {
    Err(ExecutionError::DivisionByZero { pc: 1 }) => {}
    other => panic!("unexpected result: {:?}", other.map(|state| state.status))
  }
}

#[test]
fn call_returns_after_the_call() {
  let state = run("CALL F\nMOV 7 R1\nHLT\nF:\nMOV 3 R0\nRET").unwrap();
  assert_eq!(state.registers[0], 3);
  assert_eq!(state.registers[1], 7);
}

#[test]
fn fault_keeps_the_state_at_the_fault() {
  let bytes = assemble("MOV 1 R0\nPUSH 2\nPOP R1\nPOP R2\nMOV 5 R3").unwrap();
  let mut machine = Machine::default();
  assert!(machine.run(&mut Cursor::new(bytes)).is_err());

  let state = machine.state();
  assert_eq!(state.status, Status::Faulted);
  assert_eq!(state.pc, 3);
  assert_eq!(state.registers[0], 1);
  assert_eq!(state.registers[1], 2);
  assert_eq!(state.registers[3], 0);
}

#[test]
fn stepping_exposes_every_cycle() {
  let bytes = assemble("MOV 1 R0\nADD 1 R0\nADD 1 R0").unwrap();
  let mut machine = Machine::default();
  let mut program = Cursor::new(bytes);

  let mut seen = Vec::new();
  while machine.step(&mut program).unwrap() == Status::Running {
    seen.push(machine.state().registers[0]);
  }
  // The last cycle is the appended halt.
  assert_eq!(seen, vec![1, 2, 3]);
}

#[test]
fn empty_program_halts_immediately() {
  let state = run_program(&[]).unwrap();
  assert_eq!(state.status, Status::Halted);
  assert_eq!(state.pc, 0);
}

#[test]
fn torn_trailing_record_is_an_implicit_halt() {
  let mut bytes = assemble("MOV 1 R0").unwrap();
  bytes.truncate(bytes.len() - 1);
  assert_eq!(bytes.len(), 2 * INSTRUCTION_WIDTH - 1);

  let state = run_program(&bytes).unwrap();
  assert_eq!(state.status, Status::Halted);
  assert_eq!(state.registers[0], 1);
  assert_eq!(state.pc, 1);
}

#[test]
fn machines_are_independent() {
  let bytes = assemble("ADD 1 R0").unwrap();
  let mut first  = Machine::default();
  let mut second = Machine::default();
  first.run(&mut Cursor::new(bytes.clone())).unwrap();
  first.reset();
  first.run(&mut Cursor::new(bytes.clone())).unwrap();
  second.run(&mut Cursor::new(bytes)).unwrap();
  assert_eq!(first.state().registers[0], 1);
  assert_eq!(second.state().registers[0], 1);
}

proptest! {
  #[test]
  fn arithmetic_wraps_like_u64(a in any::<Word>(), b in any::<Word>()) {
    let source = format!("MOV {} R0\nMOV {} R1\nMOV R1 R2\nMOV R1 R3\nADD R0 R1\nSUB R0 R2\nMUL R0 R3", a, b);
    let state = run(&source).unwrap();
    prop_assert_eq!(state.registers[1], b.wrapping_add(a));
    prop_assert_eq!(state.registers[2], b.wrapping_sub(a));
    prop_assert_eq!(state.registers[3], b.wrapping_mul(a));
  }

  #[test]
  fn division_matches_integer_division(a in any::<Word>(), b in 1..=Word::max_value()) {
    let state = run(&format!("MOV {} R0\nDIV {} R0", a, b)).unwrap();
    prop_assert_eq!(state.registers[0], a / b);
  }

  #[test]
  fn stack_is_last_in_first_out(values in prop::collection::vec(any::<Word>(), 1..32)) {
    let mut source = String::new();
    for value in &values {
      source.push_str(&format!("PUSH {}\n", value));
    }
    for register in 0..values.len() {
      source.push_str(&format!("POP R{}\n", register));
    }
    let state = run(&source).unwrap();
    for (register, value) in values.iter().rev().enumerate() {
      prop_assert_eq!(state.registers[register], *value);
    }
    prop_assert_eq!(state.sp, 1024 * 8);
  }
}
