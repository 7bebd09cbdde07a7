//! LS-8 Emulator - CLI Entry Point
//!
//! `ls8-emu <program>` loads a `.ls8` file and runs it until `HLT`.
//! Flags switch to disassembly, assembly, tracing or the TUI debugger.
//!
//! Exit status: 0 on halt, 1 on usage errors, 2 when the program cannot be
//! loaded, 3 when execution fails.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use clap::error::ErrorKind;
use clap::{ArgAction, Parser};
use ls8::{assemble, disassemble, load_program, Cpu, CpuError, Program};
use ls8::asm::write_program;

const EXIT_USAGE: i32 = 1;
const EXIT_LOAD: i32 = 2;
const EXIT_EXECUTION: i32 = 3;

#[derive(Parser)]
#[command(name = "ls8-emu")]
#[command(version = "0.1.0")]
#[command(about = "An emulator of the LS-8 8-bit computer")]
struct Cli {
    /// Path to the .ls8 program (assembly source with --assemble)
    program: PathBuf,

    /// Abort with an error after this many instructions
    #[arg(short = 'n', long, value_name = "N")]
    max_cycles: Option<u64>,

    /// Print every executed instruction with registers and flags to stderr
    #[arg(short, long)]
    trace: bool,

    /// Print a disassembly of the program instead of running it
    #[arg(long, conflicts_with = "assemble")]
    disasm: bool,

    /// Assemble mnemonic source and print it in .ls8 form
    #[arg(long)]
    assemble: bool,

    /// Open the program in the interactive debugger
    #[arg(long, conflicts_with_all = ["disasm", "assemble"])]
    debug: bool,

    /// Write the final machine state as JSON to FILE
    #[arg(long, value_name = "FILE")]
    dump_state: Option<PathBuf>,

    /// More log output (repeat for more)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Silence log output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            eprintln!("ERROR: PROCESS RETURNED NON-ZERO EXIT CODE");
            eprintln!("{}", e);
            process::exit(EXIT_USAGE);
        }
    };

    ls8::logger::init(ls8::logger::level_from_verbosity(cli.verbose, cli.quiet));

    if cli.assemble {
        assemble_file(&cli.program);
        return;
    }

    let program = match load_program(&cli.program) {
        Ok(program) => program,
        Err(e) => fail(EXIT_LOAD, &e),
    };

    if cli.disasm {
        print!("{}", disassemble(&program.bytes));
        return;
    }

    if cli.debug {
        debug_program(program);
        return;
    }

    run_program(&cli, &program);
}

#[cfg(feature = "tui")]
fn debug_program(program: Program) {
    if let Err(e) = ls8::run_debugger(program.bytes) {
        fail(EXIT_EXECUTION, &e);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_program: Program) {
    fail(EXIT_USAGE, &"--debug needs a build with the `tui` feature");
}

fn fail(code: i32, err: &dyn std::fmt::Display) -> ! {
    eprintln!("ERROR: PROCESS RETURNED NON-ZERO EXIT CODE");
    eprintln!("{}", err);
    process::exit(code);
}

fn run_program(cli: &Cli, program: &Program) {
    let mut cpu = match Cpu::with_program(&program.bytes) {
        Ok(cpu) => cpu,
        Err(e) => fail(EXIT_LOAD, &e),
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = execute(&mut cpu, &mut out, cli.max_cycles, cli.trace);
    // Keep PRN output ahead of any diagnostic.
    let _ = out.flush();

    if let Some(path) = &cli.dump_state {
        dump_state(&cpu, path);
    }

    match result {
        Ok(()) => log::info!("SUCCESS after {} cycles", cpu.cycles),
        Err(e) => fail(EXIT_EXECUTION, &format_args!("{} (after {} cycles)", e, cpu.cycles)),
    }
}

fn execute<W: Write>(cpu: &mut Cpu, out: &mut W, max_cycles: Option<u64>, trace: bool) -> Result<(), CpuError> {
    while cpu.is_running() {
        if let Some(max) = max_cycles {
            if cpu.cycles >= max {
                return Err(CpuError::CycleLimit(max));
            }
        }

        let pc = cpu.regs.pc;
        let instr = cpu.step(out)?;

        if trace {
            let regs: Vec<String> = cpu.regs.general().iter().map(|r| format!("{:3}", r)).collect();
            eprintln!("{:03}: {:<10} R=[{}] PC={:03} FL={}",
                pc, instr.to_string(), regs.join(" "), cpu.regs.pc, cpu.regs.flags);
        }
    }
    Ok(())
}

fn dump_state(cpu: &Cpu, path: &Path) {
    let written = std::fs::File::create(path)
        .map_err(|e| e.to_string())
        .and_then(|file| serde_json::to_writer_pretty(file, cpu).map_err(|e| e.to_string()));

    match written {
        Ok(()) => log::debug!("wrote machine state to {}", path.display()),
        Err(e) => log::warn!("could not write state to {}: {}", path.display(), e),
    }
}

fn assemble_file(source_path: &Path) {
    let source = match std::fs::read_to_string(source_path) {
        Ok(s) => s,
        Err(e) => fail(EXIT_LOAD, &format_args!("cannot read {}: {}", source_path.display(), e)),
    };

    let bytes = match assemble(&source) {
        Ok(bytes) => bytes,
        Err(e) => fail(EXIT_LOAD, &e),
    };
    log::info!("assembled {} bytes", bytes.len());

    let stdout = std::io::stdout();
    if let Err(e) = write_program(&mut stdout.lock(), &Program::from(bytes)) {
        fail(EXIT_LOAD, &e);
    }
}
