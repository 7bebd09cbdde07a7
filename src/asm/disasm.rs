//! Disassembler for LS-8 programs.
//!
//! Converts program bytes back to readable assembly.

use crate::cpu::decode::{decode, operand_count, Opcode};

/// Disassemble the instruction at `addr`, returning its text and width.
///
/// Unknown opcodes and instructions cut off by the end of `bytes` come back
/// as a single `DB` byte.
pub fn disassemble_at(bytes: &[u8], addr: usize) -> (String, usize) {
    let Some(&raw) = bytes.get(addr) else {
        return (String::new(), 0);
    };

    if Opcode::from_byte(raw).is_some() {
        let end = addr + 1 + operand_count(raw);
        if let Some(operands) = bytes.get(addr + 1..end) {
            if let Ok(instr) = decode(raw, operands) {
                return (instr.to_string(), instr.width());
            }
        }
    }

    (format!("DB {:#010b}", raw), 1)
}

/// Disassemble a byte slice, one instruction per line.
pub fn disassemble(bytes: &[u8]) -> String {
    let mut output = String::new();
    output.push_str("; LS-8 Disassembly\n");
    output.push_str("; -----------------\n\n");

    let mut addr = 0;
    while addr < bytes.len() {
        let (text, width) = disassemble_at(bytes, addr);
        let raw: Vec<String> = bytes[addr..addr + width]
            .iter()
            .map(|b| format!("{:08b}", b))
            .collect();
        output.push_str(&format!("{:03}: {:<12} ; {}\n", addr, text, raw.join(" ")));
        addr += width;
    }

    output
}
