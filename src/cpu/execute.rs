//! CPU execution engine for the LS-8.
//!
//! Implements the fetch-decode-execute cycle and all instruction behaviors.

use std::io::Write;

use crate::cpu::{Memory, Registers};
use crate::cpu::decode::{self, Instruction, Opcode, DecodeError};
use crate::cpu::memory::MemoryError;
use crate::cpu::registers::RegisterError;
use serde::{Serialize, Deserialize};
use thiserror::Error;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (executed HLT instruction).
    Halted,
    /// CPU hit a fatal error and cannot continue.
    Error,
}

/// The LS-8 CPU together with its memory.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Instruction count.
    pub cycles: u64,
    /// Last executed instruction.
    last_instr: Option<Instruction>,
}

impl Cpu {
    /// Create a new CPU with zeroed state.
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            state: CpuState::Running,
            cycles: 0,
            last_instr: None,
        }
    }

    /// Create a CPU with `program` loaded at address 0.
    pub fn with_program(program: &[u8]) -> Result<Self, MemoryError> {
        let mut cpu = Self::new();
        cpu.load_program(program)?;
        Ok(cpu)
    }

    /// Reset the CPU to initial state.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.mem.clear();
        self.state = CpuState::Running;
        self.cycles = 0;
        self.last_instr = None;
    }

    /// Load a program into memory at address 0.
    pub fn load_program(&mut self, program: &[u8]) -> Result<(), MemoryError> {
        self.mem.load_program(0, program)
    }

    /// Execute a single instruction, writing any `PRN` output to `out`.
    ///
    /// Returns the instruction that was executed, or an error. Any error
    /// leaves the CPU in [`CpuState::Error`].
    pub fn step<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<Instruction, CpuError> {
        if self.state != CpuState::Running {
            return Err(CpuError::NotRunning(self.state));
        }

        match self.fetch_and_execute(out) {
            Ok(instr) => {
                self.cycles += 1;
                self.last_instr = Some(instr);
                Ok(instr)
            }
            Err(e) => {
                self.state = CpuState::Error;
                Err(e)
            }
        }
    }

    /// Run until halt or error.
    ///
    /// Returns the number of instructions executed.
    pub fn run<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;

        while self.state == CpuState::Running {
            self.step(out)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Run for at most `max_cycles` instructions.
    ///
    /// Stops early on halt; the caller checks [`Cpu::is_halted`] to tell the
    /// two apart.
    pub fn run_limited<W: Write + ?Sized>(&mut self, out: &mut W, max_cycles: u64) -> Result<u64, CpuError> {
        let start_cycles = self.cycles;
        let limit = self.cycles.saturating_add(max_cycles);

        while self.state == CpuState::Running && self.cycles < limit {
            self.step(out)?;
        }

        Ok(self.cycles - start_cycles)
    }

    /// Fetch and decode the instruction at the program counter.
    pub fn fetch(&self) -> Result<Instruction, CpuError> {
        let pc = self.regs.pc;
        let raw = self.mem.read(pc as usize)?;

        // Unknown opcodes fail before any operand byte is touched.
        let opcode = Opcode::from_byte(raw)
            .ok_or(CpuError::Decode { pc, source: DecodeError::UnknownOpcode(raw) })?;

        let mut operands = [0u8; 2];
        for (i, slot) in operands.iter_mut().take(opcode.operand_count()).enumerate() {
            *slot = self.mem.read(pc as usize + 1 + i)?;
        }

        decode::decode(raw, &operands).map_err(|source| CpuError::Decode { pc, source })
    }

    fn fetch_and_execute<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<Instruction, CpuError> {
        let instr = self.fetch()?;
        log::trace!("{:03}: {}", self.regs.pc, instr);
        self.execute(instr, out)?;
        Ok(instr)
    }

    /// Execute a decoded instruction located at the current program counter.
    fn execute<W: Write + ?Sized>(&mut self, instr: Instruction, out: &mut W) -> Result<(), CpuError> {
        match instr {
            // ==================== Control ====================

            Instruction::Hlt => {
                self.state = CpuState::Halted;
                return Ok(());
            }

            Instruction::Jmp { reg } => {
                let target = self.regs.get(reg)?;
                self.regs.jump(target);
                return Ok(());
            }

            Instruction::Jeq { reg } => {
                if self.regs.flags.is_equal() {
                    let target = self.regs.get(reg)?;
                    self.regs.jump(target);
                    return Ok(());
                }
            }

            Instruction::Jne { reg } => {
                if !self.regs.flags.is_equal() {
                    let target = self.regs.get(reg)?;
                    self.regs.jump(target);
                    return Ok(());
                }
            }

            // ==================== Data Transfer ====================

            Instruction::Ldi { reg, imm } => {
                self.regs.set(reg, imm)?;
            }

            Instruction::Prn { reg } => {
                let value = self.regs.get(reg)?;
                writeln!(out, "{}", value).map_err(|e| CpuError::Output(e.to_string()))?;
            }

            // ==================== ALU ====================

            Instruction::Cmp { a, b } => {
                let (x, y) = (self.regs.get(a)?, self.regs.get(b)?);
                self.regs.flags.compare(x, y);
            }

            Instruction::And { a, b } => self.alu(a, b, |x, y| Ok(x & y))?,
            Instruction::Or { a, b } => self.alu(a, b, |x, y| Ok(x | y))?,
            Instruction::Xor { a, b } => self.alu(a, b, |x, y| Ok(x ^ y))?,

            Instruction::Not { reg } => {
                let value = self.regs.get(reg)?;
                self.regs.set(reg, !value)?;
            }

            Instruction::Shl { a, b } => {
                self.alu(a, b, |x, y| Ok(x.checked_shl(y as u32).unwrap_or(0)))?
            }

            Instruction::Shr { a, b } => {
                self.alu(a, b, |x, y| Ok(x.checked_shr(y as u32).unwrap_or(0)))?
            }

            Instruction::Mod { a, b } => {
                self.alu(a, b, |x, y| x.checked_rem(y).ok_or(CpuError::DivideByZero))?
            }
        }

        self.regs.advance_pc(instr.width())?;
        Ok(())
    }

    /// Apply a binary operation to `R[a]` and `R[b]`, storing into `R[a]`.
    /// Nothing is written when `op` fails.
    fn alu<F>(&mut self, a: u8, b: u8, op: F) -> Result<(), CpuError>
    where
        F: FnOnce(u8, u8) -> Result<u8, CpuError>,
    {
        let x = self.regs.get(a)?;
        let y = self.regs.get(b)?;
        let result = op(x, y)?;
        self.regs.set(a, result)?;
        Ok(())
    }

    /// Get the last executed instruction.
    pub fn last_instruction(&self) -> Option<Instruction> {
        self.last_instr
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("state", &self.state)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur during CPU execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU not running: {0:?}")]
    NotRunning(CpuState),

    #[error("memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("register error: {0}")]
    RegisterError(#[from] RegisterError),

    #[error("{source} (at address {pc})")]
    Decode { pc: u8, source: DecodeError },

    #[error("divide by zero")]
    DivideByZero,

    #[error("output error: {0}")]
    Output(String),

    #[error("cycle limit of {0} reached without halting")]
    CycleLimit(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::encode;
    use proptest::prelude::*;

    fn make_program(instructions: &[Instruction]) -> Vec<u8> {
        instructions.iter().flat_map(encode).collect()
    }

    fn run_program(instructions: &[Instruction]) -> (Cpu, String, Result<u64, CpuError>) {
        let mut cpu = Cpu::with_program(&make_program(instructions)).unwrap();
        let mut out = Vec::new();
        let result = cpu.run(&mut out);
        (cpu, String::from_utf8(out).unwrap(), result)
    }

    #[test]
    fn test_cpu_halt() {
        let (cpu, out, result) = run_program(&[Instruction::Hlt]);

        assert_eq!(result.unwrap(), 1);
        assert!(cpu.is_halted());
        assert!(out.is_empty());
        assert_eq!(cpu.last_instruction(), Some(Instruction::Hlt));
    }

    #[test]
    fn test_ldi_then_prn() {
        let (cpu, out, result) = run_program(&[
            Instruction::Ldi { reg: 0, imm: 8 },
            Instruction::Prn { reg: 0 },
            Instruction::Hlt,
        ]);

        assert_eq!(result.unwrap(), 3);
        assert_eq!(out, "8\n");
        assert_eq!(cpu.regs.pc, 5);
    }

    #[test]
    fn test_jmp_sets_pc_only() {
        let mut cpu = Cpu::with_program(&make_program(&[
            Instruction::Ldi { reg: 2, imm: 42 },
            Instruction::Jmp { reg: 2 },
        ]))
        .unwrap();
        let mut out = std::io::sink();

        cpu.step(&mut out).unwrap();
        let before = cpu.regs.clone();
        cpu.step(&mut out).unwrap();

        assert_eq!(cpu.regs.pc, 42);
        assert_eq!(cpu.regs.general(), before.general());
        assert_eq!(cpu.regs.flags, before.flags);
    }

    #[test]
    fn test_jeq_jne_take_exactly_one_branch() {
        // R0 = 1, R1 = 1, R2 = jump target
        let prelude = [
            Instruction::Ldi { reg: 0, imm: 1 },
            Instruction::Ldi { reg: 1, imm: 1 },
            Instruction::Ldi { reg: 2, imm: 100 },
            Instruction::Cmp { a: 0, b: 1 },
        ];
        let base = make_program(&prelude).len() as u8;

        for (jump, taken) in [
            (Instruction::Jeq { reg: 2 }, true),
            (Instruction::Jne { reg: 2 }, false),
        ] {
            let mut program = prelude.to_vec();
            program.push(jump);
            let mut cpu = Cpu::with_program(&make_program(&program)).unwrap();
            let mut sink = std::io::sink();
            for _ in 0..program.len() {
                cpu.step(&mut sink).unwrap();
            }

            let expected = if taken { 100 } else { base + 2 };
            assert_eq!(cpu.regs.pc, expected, "{}", jump);
        }
    }

    #[test]
    fn test_conditional_loop() {
        // R0 accumulates bits until it equals R2; R3 holds the loop address.
        let program = [
            Instruction::Ldi { reg: 5, imm: 1 },
            Instruction::Ldi { reg: 0, imm: 0 },
            Instruction::Ldi { reg: 1, imm: 1 },
            Instruction::Ldi { reg: 2, imm: 7 },
            Instruction::Ldi { reg: 3, imm: 15 },
            // 15: loop
            Instruction::Or { a: 0, b: 1 },
            Instruction::Shl { a: 1, b: 5 },
            Instruction::Prn { reg: 0 },
            Instruction::Cmp { a: 0, b: 2 },
            Instruction::Jne { reg: 3 },
            Instruction::Hlt,
        ];

        let (cpu, out, result) = run_program(&program);

        assert_eq!(result.unwrap(), 5 + 5 * 3 + 1);
        assert_eq!(out, "1\n3\n7\n");
        assert!(cpu.is_halted());
        assert!(cpu.regs.flags.is_equal());
    }

    #[test]
    fn test_bitwise_ops_write_first_register() {
        let (cpu, _, result) = run_program(&[
            Instruction::Ldi { reg: 0, imm: 0b0000_0101 },
            Instruction::Ldi { reg: 1, imm: 0b0000_0011 },
            Instruction::Ldi { reg: 2, imm: 0b0000_0101 },
            Instruction::Ldi { reg: 3, imm: 0b0000_0101 },
            Instruction::And { a: 0, b: 1 },
            Instruction::Or { a: 2, b: 1 },
            Instruction::Xor { a: 3, b: 1 },
            Instruction::Not { reg: 1 },
            Instruction::Hlt,
        ]);

        result.unwrap();
        assert_eq!(cpu.regs.get(0).unwrap(), 0b0000_0001);
        assert_eq!(cpu.regs.get(2).unwrap(), 0b0000_0111);
        assert_eq!(cpu.regs.get(3).unwrap(), 0b0000_0110);
        assert_eq!(cpu.regs.get(1).unwrap(), 0b1111_1100);
    }

    #[test]
    fn test_shifts_are_logical() {
        let (cpu, _, result) = run_program(&[
            Instruction::Ldi { reg: 0, imm: 0b1001_0111 },
            Instruction::Ldi { reg: 1, imm: 0b1001_0111 },
            Instruction::Ldi { reg: 2, imm: 1 },
            Instruction::Ldi { reg: 3, imm: 9 },
            Instruction::Ldi { reg: 4, imm: 0xFF },
            Instruction::Shr { a: 0, b: 2 },
            Instruction::Shl { a: 1, b: 2 },
            Instruction::Shl { a: 4, b: 3 },
            Instruction::Hlt,
        ]);

        result.unwrap();
        assert_eq!(cpu.regs.get(0).unwrap(), 0b0100_1011);
        assert_eq!(cpu.regs.get(1).unwrap(), 0b0010_1110);
        assert_eq!(cpu.regs.get(4).unwrap(), 0);
    }

    #[test]
    fn test_mod() {
        let (cpu, _, result) = run_program(&[
            Instruction::Ldi { reg: 0, imm: 26 },
            Instruction::Ldi { reg: 1, imm: 7 },
            Instruction::Mod { a: 0, b: 1 },
            Instruction::Hlt,
        ]);

        result.unwrap();
        assert_eq!(cpu.regs.get(0).unwrap(), 5);
    }

    #[test]
    fn test_mod_by_zero_leaves_state() {
        let (cpu, _, result) = run_program(&[
            Instruction::Ldi { reg: 0, imm: 26 },
            Instruction::Mod { a: 0, b: 1 },
            Instruction::Hlt,
        ]);

        assert_eq!(result, Err(CpuError::DivideByZero));
        assert_eq!(cpu.state, CpuState::Error);
        assert_eq!(cpu.regs.get(0).unwrap(), 26);
        assert_eq!(cpu.regs.get(1).unwrap(), 0);
        assert_eq!(cpu.regs.pc, 3);
        assert_eq!(cpu.mem.read(3).unwrap(), Opcode::Mod.byte());
    }

    #[test]
    fn test_unknown_opcode_before_output() {
        let mut cpu = Cpu::with_program(&[0b0000_0010, 0b0100_0111, 0]).unwrap();
        let mut out = Vec::<u8>::new();

        let err = cpu.run(&mut out).unwrap_err();

        assert_eq!(err, CpuError::Decode { pc: 0, source: DecodeError::UnknownOpcode(2) });
        assert!(out.is_empty());
        assert_eq!(cpu.cycles, 0);
    }

    #[test]
    fn test_register_out_of_range() {
        let (_, _, result) = run_program(&[Instruction::Ldi { reg: 8, imm: 1 }]);
        assert_eq!(result, Err(CpuError::RegisterError(RegisterError::IndexOutOfRange(8))));
    }

    #[test]
    fn test_operand_past_end_of_memory() {
        let mut cpu = Cpu::new();
        cpu.mem.write(255, Opcode::Prn.byte()).unwrap();
        cpu.regs.jump(255);

        let err = cpu.step(&mut std::io::sink()).unwrap_err();
        assert_eq!(err, CpuError::MemoryError(MemoryError::AddressOutOfRange(256)));
    }

    #[test]
    fn test_zeroed_memory_is_unknown_opcode() {
        let mut cpu = Cpu::new();
        let err = cpu.run(&mut std::io::sink()).unwrap_err();
        assert_eq!(err, CpuError::Decode { pc: 0, source: DecodeError::UnknownOpcode(0) });
    }

    #[test]
    fn test_step_after_halt() {
        let (mut cpu, _, _) = run_program(&[Instruction::Hlt]);
        let err = cpu.step(&mut std::io::sink()).unwrap_err();
        assert_eq!(err, CpuError::NotRunning(CpuState::Halted));
    }

    #[test]
    fn test_run_limited_stops_infinite_loop() {
        let mut cpu = Cpu::with_program(&make_program(&[
            Instruction::Ldi { reg: 0, imm: 0 },
            Instruction::Jmp { reg: 0 },
        ]))
        .unwrap();

        let executed = cpu.run_limited(&mut std::io::sink(), 100).unwrap();

        assert_eq!(executed, 100);
        assert!(cpu.is_running());
    }

    #[test]
    fn test_reset() {
        let (mut cpu, _, _) = run_program(&[Instruction::Ldi { reg: 1, imm: 9 }, Instruction::Hlt]);
        cpu.reset();

        assert!(cpu.is_running());
        assert_eq!(cpu.cycles, 0);
        assert_eq!(cpu.regs, Registers::new());
        assert_eq!(cpu.mem, Memory::new());
    }

    #[test]
    fn test_deterministic_rerun() {
        let program = make_program(&[
            Instruction::Ldi { reg: 0, imm: 200 },
            Instruction::Ldi { reg: 1, imm: 3 },
            Instruction::Mod { a: 0, b: 1 },
            Instruction::Prn { reg: 0 },
            Instruction::Hlt,
        ]);

        let runs: Vec<_> = (0..2)
            .map(|_| {
                let mut cpu = Cpu::with_program(&program).unwrap();
                let mut out = Vec::<u8>::new();
                let result = cpu.run(&mut out);
                (out, result, cpu.regs)
            })
            .collect();

        assert_eq!(runs[0], runs[1]);
    }

    proptest! {
        #[test]
        fn ldi_prn_echoes_value(reg in 0u8..8, value: u8) {
            let (_, out, result) = run_program(&[
                Instruction::Ldi { reg, imm: value },
                Instruction::Prn { reg },
                Instruction::Hlt,
            ]);

            prop_assert!(result.is_ok());
            prop_assert_eq!(out, format!("{}\n", value));
        }

        #[test]
        fn alu_results_match_u8_ops(x: u8, y: u8) {
            let ops: [(Instruction, u8); 3] = [
                (Instruction::And { a: 0, b: 1 }, x & y),
                (Instruction::Or { a: 0, b: 1 }, x | y),
                (Instruction::Xor { a: 0, b: 1 }, x ^ y),
            ];
            for (op, expected) in ops {
                let (cpu, _, result) = run_program(&[
                    Instruction::Ldi { reg: 0, imm: x },
                    Instruction::Ldi { reg: 1, imm: y },
                    op,
                    Instruction::Hlt,
                ]);
                prop_assert!(result.is_ok());
                prop_assert_eq!(cpu.regs.get(0).unwrap(), expected);
                prop_assert_eq!(cpu.regs.get(1).unwrap(), y);
            }
        }
    }
}
