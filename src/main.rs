use std::{
  error::Error,
  fs::{self, File},
  io::BufReader,
  path::PathBuf
};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

use tiny_vm::{disassemble, Assembler, AssemblerOptions, Machine, MachineConfig};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Assemble a source file into a binary program
  Assemble {
    input: PathBuf,
    #[arg(short, long, default_value = "out.bin")]
    output: PathBuf,
    /// Emit a NOP as the first instruction
    #[arg(long)]
    leading_nop: bool,
  },
  /// Run a binary program
  Run {
    program: PathBuf,
    /// Print the final machine state
    #[arg(long)]
    dump: bool,
    #[arg(long, default_value_t = MachineConfig::default().registers)]
    registers: usize,
    #[arg(long, default_value_t = MachineConfig::default().memory_cells)]
    memory_cells: usize,
    #[arg(long, default_value_t = MachineConfig::default().stack_cells)]
    stack_cells: usize,
  },
  /// Print an indexed listing of a binary program
  Disasm {
    program: PathBuf,
  },
}

fn setup_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
  Registry::default()
    .with(filter)
    .with(fmt::layer().with_target(false))
    .init();
}

fn main() -> Result<(), Box<dyn Error>> {
  setup_tracing();

  #[cfg(feature = "trace_computation")]
  println!("Computation Tracing ENABLED");

  let cli = Cli::parse();

  match cli.command {

    Command::Assemble { input, output, leading_nop } => {
      let source    = fs::read_to_string(&input)?;
      let assembler = Assembler::new(AssemblerOptions { leading_nop });
      // Nothing is written unless the whole file assembles.
      let code      = assembler.assemble(&source)?;
      fs::write(&output, &code)?;
      info!(output = %output.display(), bytes = code.len(), "assembled");
    }

    Command::Run { program, dump, registers, memory_cells, stack_cells } => {
      let config = MachineConfig { registers, memory_cells, stack_cells };
      config.validate()?;
      let mut machine = Machine::new(config);
      let mut reader  = BufReader::new(File::open(&program)?);
      let result      = machine.run(&mut reader).map(|_| ());
      if dump {
        println!("{}", machine.state());
      }
      result?;
    }

    Command::Disasm { program } => {
      let code = fs::read(&program)?;
      print!("{}", disassemble(&code)?);
    }

  }

  Ok(())
}
