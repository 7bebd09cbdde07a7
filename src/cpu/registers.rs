//! LS-8 CPU registers.
//!
//! The LS-8 has:
//! - R0-R7: eight general-purpose 8-bit registers
//! - PC: 8-bit program counter
//! - FL: flags register holding the equal, greater and less bits

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Number of general-purpose registers.
pub const REGISTER_COUNT: usize = 8;

/// Condition flags set by `CMP`.
///
/// Every compare overwrites all three bits; they never accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flags {
    equal: bool,
    greater: bool,
    less: bool,
}

impl Flags {
    /// Create a flags register with every bit cleared.
    pub const fn new() -> Self {
        Self { equal: false, greater: false, less: false }
    }

    /// Set the flags from comparing `a` against `b`.
    pub fn compare(&mut self, a: u8, b: u8) {
        self.equal = a == b;
        self.greater = a > b;
        self.less = a < b;
    }

    #[inline]
    pub fn is_equal(&self) -> bool {
        self.equal
    }

    #[inline]
    pub fn is_greater(&self) -> bool {
        self.greater
    }

    #[inline]
    pub fn is_less(&self) -> bool {
        self.less
    }

    /// Pack the flags as `00000LGE`.
    pub fn bits(&self) -> u8 {
        (self.less as u8) << 2 | (self.greater as u8) << 1 | self.equal as u8
    }
}

impl std::fmt::Display for Flags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bit = |set: bool, c: char| if set { c } else { '-' };
        write!(f, "{}{}{}", bit(self.less, 'L'), bit(self.greater, 'G'), bit(self.equal, 'E'))
    }
}

/// The LS-8 register file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    /// R0-R7
    gp: [u8; REGISTER_COUNT],

    /// PC: address of the next instruction to fetch
    pub pc: u8,

    /// FL: condition flags
    pub flags: Flags,
}

impl Registers {
    /// Create a new register file with all values zeroed.
    pub fn new() -> Self {
        Self {
            gp: [0; REGISTER_COUNT],
            pc: 0,
            flags: Flags::new(),
        }
    }

    /// Reset all registers to zero.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Read general-purpose register `index`.
    #[inline]
    pub fn get(&self, index: u8) -> Result<u8, RegisterError> {
        self.gp
            .get(index as usize)
            .copied()
            .ok_or(RegisterError::IndexOutOfRange(index))
    }

    /// Write general-purpose register `index`.
    #[inline]
    pub fn set(&mut self, index: u8, value: u8) -> Result<(), RegisterError> {
        let slot = self.gp
            .get_mut(index as usize)
            .ok_or(RegisterError::IndexOutOfRange(index))?;
        *slot = value;
        Ok(())
    }

    /// All general-purpose registers, R0 first.
    pub fn general(&self) -> &[u8; REGISTER_COUNT] {
        &self.gp
    }

    /// Move the program counter past an instruction `width` bytes long.
    /// Returns the old value.
    pub fn advance_pc(&mut self, width: usize) -> Result<u8, RegisterError> {
        let old = self.pc;
        let next = old as usize + width;
        self.pc = u8::try_from(next)
            .map_err(|_| RegisterError::ProgramCounterOutOfRange(next))?;
        Ok(old)
    }

    /// Set the program counter to an absolute address.
    pub fn jump(&mut self, addr: u8) {
        self.pc = addr;
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors raised by register file access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("register index {0} out of range (0-7)")]
    IndexOutOfRange(u8),

    #[error("program counter advanced to {0}, past the end of memory")]
    ProgramCounterOutOfRange(usize),
}
