//! CPU emulation for the LS-8.
//!
//! This module implements the complete LS-8 architecture:
//! - 256 bytes of memory, programs loaded at address 0
//! - 8 general-purpose registers, a program counter and an LGE flags register
//! - a 14-instruction set with register operands

pub mod memory;
pub mod registers;
pub mod decode;
pub mod execute;

pub use memory::{Memory, MemoryError, MEMORY_SIZE};
pub use registers::{Flags, Registers, RegisterError, REGISTER_COUNT};
pub use decode::{Instruction, Opcode, DecodeError};
pub use execute::{Cpu, CpuError, CpuState};
