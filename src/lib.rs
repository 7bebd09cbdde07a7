//! # LS-8 Emulator
//!
//! An emulator of the LS-8, an 8-bit computer with 256 bytes of memory,
//! eight byte-wide registers and a small fixed instruction set.
//!
//! Programs are text files of binary literals loaded at address 0 and run
//! by a fetch-decode-execute loop until `HLT` or a fatal error.

pub mod cpu;
pub mod asm;
pub mod logger;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use cpu::{Cpu, CpuState, CpuError, Flags, Memory, Registers, Instruction, Opcode};
pub use asm::{assemble, disassemble, AssemblerError, LoadError, Program, load_program, parse_program, save_program};
pub use logger::Logger;

#[cfg(feature = "tui")]
pub use tui::run_debugger;
