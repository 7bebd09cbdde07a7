//! Instruction decoder for the LS-8.
//!
//! Every instruction starts with an opcode byte laid out as `AABCDDDD`:
//! - `AA`: number of operand bytes that follow (0-2)
//! - `B`: set for ALU operations
//! - `C`: set when the instruction writes the program counter
//! - `DDDD`: instruction identifier
//!
//! Operands are register indices or immediates, one byte each.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// The closed LS-8 opcode catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Hlt = 0b0000_0001,
    Ldi = 0b1000_0010,
    Prn = 0b0100_0111,
    Jmp = 0b0101_0100,
    Jeq = 0b0101_0101,
    Jne = 0b0101_0110,
    Cmp = 0b1010_0111,
    And = 0b1010_0001,
    Or = 0b1010_0101,
    Not = 0b0110_1110,
    Shl = 0b1010_1011,
    Shr = 0b1010_1100,
    Mod = 0b1010_0110,
    Xor = 0b1010_1001,
}

impl Opcode {
    /// Every opcode the machine understands.
    pub const ALL: [Opcode; 14] = [
        Opcode::Hlt,
        Opcode::Ldi,
        Opcode::Prn,
        Opcode::Jmp,
        Opcode::Jeq,
        Opcode::Jne,
        Opcode::Cmp,
        Opcode::And,
        Opcode::Or,
        Opcode::Not,
        Opcode::Shl,
        Opcode::Shr,
        Opcode::Mod,
        Opcode::Xor,
    ];

    /// Resolve an opcode byte through the dispatch table.
    #[inline]
    pub fn from_byte(byte: u8) -> Option<Self> {
        DISPATCH[byte as usize]
    }

    /// The encoded opcode byte.
    #[inline]
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Operand bytes following this opcode.
    #[inline]
    pub const fn operand_count(self) -> usize {
        operand_count(self as u8)
    }

    /// Assembly mnemonic.
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Hlt => "HLT",
            Opcode::Ldi => "LDI",
            Opcode::Prn => "PRN",
            Opcode::Jmp => "JMP",
            Opcode::Jeq => "JEQ",
            Opcode::Jne => "JNE",
            Opcode::Cmp => "CMP",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Not => "NOT",
            Opcode::Shl => "SHL",
            Opcode::Shr => "SHR",
            Opcode::Mod => "MOD",
            Opcode::Xor => "XOR",
        }
    }

    /// Look up an opcode by mnemonic, ignoring case.
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        // BOR is the name the original LS-8 material uses for OR.
        if name.eq_ignore_ascii_case("BOR") {
            return Some(Opcode::Or);
        }
        Self::ALL
            .into_iter()
            .find(|op| op.mnemonic().eq_ignore_ascii_case(name))
    }

    /// Whether the instruction writes the program counter itself.
    #[inline]
    pub const fn sets_pc(self) -> bool {
        self as u8 & 0b0001_0000 != 0
    }

    /// Whether the instruction is executed by the ALU.
    #[inline]
    pub const fn is_alu(self) -> bool {
        self as u8 & 0b0010_0000 != 0
    }
}

/// Opcode byte to opcode, indexed by the full byte. Unlisted bytes are `None`.
static DISPATCH: [Option<Opcode>; 256] = {
    let mut table = [None; 256];
    let mut i = 0;
    while i < Opcode::ALL.len() {
        let op = Opcode::ALL[i];
        table[op as usize] = Some(op);
        i += 1;
    }
    table
};

/// Number of operand bytes encoded in the two high bits of an opcode byte.
#[inline]
pub const fn operand_count(byte: u8) -> usize {
    (byte >> 6) as usize
}

/// Decoded LS-8 instruction.
///
/// `reg`, `a` and `b` are register indices. Binary ALU operations write
/// their result back into register `a`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== Control ====================

    /// Halt execution
    Hlt,

    /// Unconditional jump: PC := R[reg]
    Jmp { reg: u8 },

    /// Jump if equal: if E then PC := R[reg]
    Jeq { reg: u8 },

    /// Jump if not equal: if !E then PC := R[reg]
    Jne { reg: u8 },

    // ==================== Data Transfer ====================

    /// Load immediate: R[reg] := imm
    Ldi { reg: u8, imm: u8 },

    /// Print R[reg] as a decimal line
    Prn { reg: u8 },

    // ==================== ALU ====================

    /// Compare R[a] with R[b] and set the flags
    Cmp { a: u8, b: u8 },

    /// R[a] := R[a] & R[b]
    And { a: u8, b: u8 },

    /// R[a] := R[a] | R[b]
    Or { a: u8, b: u8 },

    /// R[a] := R[a] ^ R[b]
    Xor { a: u8, b: u8 },

    /// R[reg] := !R[reg]
    Not { reg: u8 },

    /// R[a] := R[a] << R[b], zero-filled
    Shl { a: u8, b: u8 },

    /// R[a] := R[a] >> R[b], zero-filled
    Shr { a: u8, b: u8 },

    /// R[a] := R[a] % R[b]
    Mod { a: u8, b: u8 },
}

impl Instruction {
    /// The opcode this instruction encodes to.
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Hlt => Opcode::Hlt,
            Instruction::Jmp { .. } => Opcode::Jmp,
            Instruction::Jeq { .. } => Opcode::Jeq,
            Instruction::Jne { .. } => Opcode::Jne,
            Instruction::Ldi { .. } => Opcode::Ldi,
            Instruction::Prn { .. } => Opcode::Prn,
            Instruction::Cmp { .. } => Opcode::Cmp,
            Instruction::And { .. } => Opcode::And,
            Instruction::Or { .. } => Opcode::Or,
            Instruction::Xor { .. } => Opcode::Xor,
            Instruction::Not { .. } => Opcode::Not,
            Instruction::Shl { .. } => Opcode::Shl,
            Instruction::Shr { .. } => Opcode::Shr,
            Instruction::Mod { .. } => Opcode::Mod,
        }
    }

    /// Encoded size in bytes: the opcode plus its operands.
    #[inline]
    pub fn width(&self) -> usize {
        1 + self.opcode().operand_count()
    }

    /// Operand bytes in encoding order.
    pub fn operands(&self) -> Vec<u8> {
        match *self {
            Instruction::Hlt => vec![],
            Instruction::Jmp { reg }
            | Instruction::Jeq { reg }
            | Instruction::Jne { reg }
            | Instruction::Prn { reg }
            | Instruction::Not { reg } => vec![reg],
            Instruction::Ldi { reg, imm } => vec![reg, imm],
            Instruction::Cmp { a, b }
            | Instruction::And { a, b }
            | Instruction::Or { a, b }
            | Instruction::Xor { a, b }
            | Instruction::Shl { a, b }
            | Instruction::Shr { a, b }
            | Instruction::Mod { a, b } => vec![a, b],
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.opcode().mnemonic())?;
        match *self {
            Instruction::Hlt => Ok(()),
            Instruction::Ldi { reg, imm } => write!(f, " R{},{}", reg, imm),
            _ => {
                let regs: Vec<String> = self.operands()
                    .iter()
                    .map(|r| format!("R{}", r))
                    .collect();
                write!(f, " {}", regs.join(","))
            }
        }
    }
}

/// Decode an opcode byte and the operand bytes that follow it.
///
/// `operands` must hold at least as many bytes as the opcode's
/// operand count; extra bytes are ignored.
pub fn decode(byte: u8, operands: &[u8]) -> Result<Instruction, DecodeError> {
    let opcode = Opcode::from_byte(byte).ok_or(DecodeError::UnknownOpcode(byte))?;
    let count = operand_count(byte);
    if operands.len() < count {
        return Err(DecodeError::MissingOperands {
            opcode: byte,
            expected: count,
            found: operands.len(),
        });
    }

    let x = operands.first().copied().unwrap_or(0);
    let y = operands.get(1).copied().unwrap_or(0);

    let instruction = match opcode {
        Opcode::Hlt => Instruction::Hlt,
        Opcode::Jmp => Instruction::Jmp { reg: x },
        Opcode::Jeq => Instruction::Jeq { reg: x },
        Opcode::Jne => Instruction::Jne { reg: x },
        Opcode::Ldi => Instruction::Ldi { reg: x, imm: y },
        Opcode::Prn => Instruction::Prn { reg: x },
        Opcode::Cmp => Instruction::Cmp { a: x, b: y },
        Opcode::And => Instruction::And { a: x, b: y },
        Opcode::Or => Instruction::Or { a: x, b: y },
        Opcode::Xor => Instruction::Xor { a: x, b: y },
        Opcode::Not => Instruction::Not { reg: x },
        Opcode::Shl => Instruction::Shl { a: x, b: y },
        Opcode::Shr => Instruction::Shr { a: x, b: y },
        Opcode::Mod => Instruction::Mod { a: x, b: y },
    };

    Ok(instruction)
}

/// Encode an instruction to its bytes.
pub fn encode(instr: &Instruction) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(instr.width());
    bytes.push(instr.opcode().byte());
    bytes.extend(instr.operands());
    bytes
}

/// Errors that can occur during instruction decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("operation unknown: opcode {0:#010b} not found")]
    UnknownOpcode(u8),

    #[error("opcode {opcode:#010b} needs {expected} operand bytes, found {found}")]
    MissingOperands { opcode: u8, expected: usize, found: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_table_covers_catalog() {
        let known = (0..=255u8).filter(|&b| Opcode::from_byte(b).is_some()).count();
        assert_eq!(known, Opcode::ALL.len());

        for op in Opcode::ALL {
            assert_eq!(Opcode::from_byte(op.byte()), Some(op));
        }
    }

    #[test]
    fn test_operand_count_from_high_bits() {
        assert_eq!(operand_count(0b0000_0001), 0);
        assert_eq!(operand_count(0b0100_0111), 1);
        assert_eq!(operand_count(0b1000_0010), 2);
        assert_eq!(Opcode::Cmp.operand_count(), 2);
        assert_eq!(Opcode::Not.operand_count(), 1);
        assert_eq!(Opcode::Hlt.operand_count(), 0);
    }

    #[test]
    fn test_decode_hlt() {
        assert_eq!(decode(0b0000_0001, &[]).unwrap(), Instruction::Hlt);
    }

    #[test]
    fn test_decode_ldi() {
        let instr = decode(0b1000_0010, &[0, 8]).unwrap();
        assert_eq!(instr, Instruction::Ldi { reg: 0, imm: 8 });
        assert_eq!(instr.width(), 3);
        assert_eq!(instr.to_string(), "LDI R0,8");
    }

    #[test]
    fn test_decode_unknown() {
        assert_eq!(
            decode(0b0000_0010, &[]),
            Err(DecodeError::UnknownOpcode(0b0000_0010))
        );
        assert_eq!(decode(0, &[]), Err(DecodeError::UnknownOpcode(0)));
    }

    #[test]
    fn test_decode_missing_operands() {
        let err = decode(Opcode::Cmp.byte(), &[1]).unwrap_err();
        assert_eq!(err, DecodeError::MissingOperands { opcode: 0b1010_0111, expected: 2, found: 1 });
    }

    #[test]
    fn test_control_and_alu_bits() {
        for op in [Opcode::Jmp, Opcode::Jeq, Opcode::Jne] {
            assert!(op.sets_pc());
        }
        assert!(!Opcode::Ldi.sets_pc());
        assert!(Opcode::Cmp.is_alu());
        assert!(Opcode::Not.is_alu());
        assert!(!Opcode::Prn.is_alu());
    }

    #[test]
    fn test_mnemonic_lookup() {
        assert_eq!(Opcode::from_mnemonic("ldi"), Some(Opcode::Ldi));
        assert_eq!(Opcode::from_mnemonic("BOR"), Some(Opcode::Or));
        assert_eq!(Opcode::from_mnemonic("NOP"), None);
    }

    #[test]
    fn test_encode_matches_width() {
        for instr in [
            Instruction::Hlt,
            Instruction::Prn { reg: 3 },
            Instruction::Shr { a: 1, b: 2 },
        ] {
            let bytes = encode(&instr);
            assert_eq!(bytes.len(), instr.width());
            assert_eq!(decode(bytes[0], &bytes[1..]).unwrap(), instr);
        }
    }
}
