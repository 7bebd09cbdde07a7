//! Program text handling for the LS-8.
//!
//! This module provides:
//! - The loader for the binary-literal program format
//! - A small mnemonic assembler (text → program bytes)
//! - A disassembler (program bytes → readable text)

pub mod assembler;
pub mod disasm;
pub mod loader;

pub use assembler::{assemble, AssemblerError};
pub use disasm::disassemble;
pub use loader::{load_program, parse_program, save_program, write_program, LoadError, Program};
