//! LS-8 memory subsystem.
//!
//! The LS-8 has 256 bytes of RAM addressed by a single byte. Programs are
//! loaded at address 0 and share the space with any data they touch.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// The number of memory cells in the LS-8.
pub const MEMORY_SIZE: usize = 256;

/// LS-8 memory: 256 byte cells.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<u8>,
}

impl Memory {
    /// Create a new memory with all cells zeroed.
    pub fn new() -> Self {
        Self {
            cells: vec![0; MEMORY_SIZE],
        }
    }

    /// Read a cell by address (0-255).
    #[inline]
    pub fn read(&self, addr: usize) -> Result<u8, MemoryError> {
        self.cells
            .get(addr)
            .copied()
            .ok_or(MemoryError::AddressOutOfRange(addr))
    }

    /// Write a cell by address (0-255).
    #[inline]
    pub fn write(&mut self, addr: usize, value: u8) -> Result<(), MemoryError> {
        let cell = self.cells
            .get_mut(addr)
            .ok_or(MemoryError::AddressOutOfRange(addr))?;
        *cell = value;
        Ok(())
    }

    /// Clear all memory to zeros.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Load a program into memory starting at the given address.
    pub fn load_program(&mut self, start_addr: usize, program: &[u8]) -> Result<(), MemoryError> {
        let available = MEMORY_SIZE.saturating_sub(start_addr);
        if start_addr > MEMORY_SIZE || program.len() > available {
            return Err(MemoryError::ProgramTooLarge {
                size: program.len(),
                available,
            });
        }

        self.cells[start_addr..start_addr + program.len()].copy_from_slice(program);
        Ok(())
    }

    /// Dump memory contents (for debugging).
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, u8)> {
        let end = start.saturating_add(count).min(MEMORY_SIZE);
        (start.min(end)..end)
            .map(|i| (i, self.cells[i]))
            .collect()
    }

    /// The whole address space as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &MEMORY_SIZE)
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Address is outside valid memory range.
    #[error("memory address {0} out of range (0-255)")]
    AddressOutOfRange(usize),
    /// Program is too large to fit in memory.
    #[error("program size {size} exceeds available space {available}")]
    ProgramTooLarge { size: usize, available: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_read_write() {
        let mut mem = Memory::new();

        mem.write(10, 42).unwrap();
        assert_eq!(mem.read(10).unwrap(), 42);
        assert_eq!(mem.read(11).unwrap(), 0);
    }

    #[test]
    fn test_memory_bounds() {
        let mut mem = Memory::new();

        assert!(mem.read(0).is_ok());
        assert!(mem.read(255).is_ok());

        assert_eq!(mem.read(256), Err(MemoryError::AddressOutOfRange(256)));
        assert_eq!(mem.write(300, 1), Err(MemoryError::AddressOutOfRange(300)));
    }

    #[test]
    fn test_load_program() {
        let mut mem = Memory::new();

        mem.load_program(0, &[1, 2, 3]).unwrap();

        assert_eq!(mem.read(0).unwrap(), 1);
        assert_eq!(mem.read(1).unwrap(), 2);
        assert_eq!(mem.read(2).unwrap(), 3);
    }

    #[test]
    fn test_load_program_too_large() {
        let mut mem = Memory::new();
        let program = vec![0xAA; MEMORY_SIZE + 1];

        let err = mem.load_program(0, &program).unwrap_err();
        assert_eq!(err, MemoryError::ProgramTooLarge { size: 257, available: 256 });

        // A full image fits exactly.
        mem.load_program(0, &program[..MEMORY_SIZE]).unwrap();
        assert_eq!(mem.read(255).unwrap(), 0xAA);
    }

    #[test]
    fn test_dump_clamps_to_memory() {
        let mut mem = Memory::new();
        mem.write(254, 7).unwrap();

        let dump = mem.dump(253, 10);
        assert_eq!(dump, vec![(253, 0), (254, 7), (255, 0)]);
    }
}
