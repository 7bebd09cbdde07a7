//! Simple assembler for LS-8 programs.
//!
//! Syntax:
//! ```text
//! ; Comment (`#` works too)
//! LOOP:           ; Define a label
//!     LDI R0,8    ; Load an immediate
//!     LDI R1,LOOP ; Labels are valid immediates
//!     PRN R0      ; Print a register
//!     JMP R1      ; Jump to the address held in R1
//!     HLT         ; Halt
//!
//!     DB 0x2A     ; Define a raw byte
//! ```

use crate::cpu::decode::Opcode;
use crate::cpu::MEMORY_SIZE;
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source code to program bytes.
pub fn assemble(source: &str) -> Result<Vec<u8>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// The assembler state.
struct Assembler {
    /// Symbol table (label -> address).
    symbols: HashMap<String, u8>,
    /// Pending references: (output_index, label, source_line).
    pending: Vec<(usize, String, usize)>,
    /// Output bytes.
    output: Vec<u8>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            pending: Vec::new(),
            output: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<u8>, AssemblerError> {
        // Pass 1: Collect labels and generate code
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: Resolve forward references
        self.resolve_references()?;

        Ok(std::mem::take(&mut self.output))
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let line = match line.find([';', '#']) {
            Some(idx) => &line[..idx],
            None => line,
        };
        let line = line.trim();

        if line.is_empty() {
            return Ok(());
        }

        if let Some((label, rest)) = line.split_once(':') {
            let label = label.trim().to_uppercase();
            if label.is_empty() {
                return Err(AssemblerError::SyntaxError { line: line_num, message: "empty label".into() });
            }
            let addr = self.current_addr(line_num)?;
            if self.symbols.insert(label.clone(), addr).is_some() {
                return Err(AssemblerError::DuplicateLabel { line: line_num, label });
            }

            let rest = rest.trim();
            if !rest.is_empty() {
                return self.process_instruction(rest, line_num);
            }
            return Ok(());
        }

        self.process_instruction(line, line_num)
    }

    fn process_instruction(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
            Some((m, rest)) => (m.to_uppercase(), rest.trim()),
            None => (line.to_uppercase(), ""),
        };
        let operands: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(str::trim).collect()
        };

        if mnemonic == "DB" {
            let [value] = operands[..] else {
                return Err(AssemblerError::SyntaxError { line: line_num, message: "DB takes one value".into() });
            };
            let byte = self.parse_value(value, line_num)?;
            return self.emit(byte, line_num);
        }

        let opcode = match mnemonic.as_str() {
            "HALT" => Opcode::Hlt,
            name => Opcode::from_mnemonic(name).ok_or_else(|| AssemblerError::UnknownMnemonic {
                line: line_num,
                mnemonic: mnemonic.clone(),
            })?,
        };

        if operands.len() != opcode.operand_count() {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!(
                    "{} takes {} operands, found {}",
                    opcode.mnemonic(),
                    opcode.operand_count(),
                    operands.len()
                ),
            });
        }

        self.emit(opcode.byte(), line_num)?;
        for (i, operand) in operands.into_iter().enumerate() {
            let byte = if opcode == Opcode::Ldi && i == 1 {
                self.parse_value(operand, line_num)?
            } else {
                parse_register(operand, line_num)?
            };
            self.emit(byte, line_num)?;
        }

        Ok(())
    }

    fn parse_value(&mut self, operand: &str, line_num: usize) -> Result<u8, AssemblerError> {
        let parsed = if let Some(hex) = operand.strip_prefix("0x").or_else(|| operand.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16).ok()
        } else if let Some(bin) = operand.strip_prefix("0b").or_else(|| operand.strip_prefix("0B")) {
            i64::from_str_radix(bin, 2).ok()
        } else if operand.starts_with(|c: char| c.is_ascii_digit() || c == '-') {
            Some(operand.parse::<i64>().map_err(|_| AssemblerError::SyntaxError {
                line: line_num,
                message: format!("invalid number: {}", operand),
            })?)
        } else {
            None
        };

        match parsed {
            Some(value) => u8::try_from(value)
                .map_err(|_| AssemblerError::ValueOutOfRange { line: line_num, value }),
            None if is_label(operand) => {
                // Label reference, patched in pass 2
                self.pending.push((self.output.len(), operand.to_uppercase(), line_num));
                Ok(0)
            }
            None => Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("invalid operand: {}", operand),
            }),
        }
    }

    fn current_addr(&self, line_num: usize) -> Result<u8, AssemblerError> {
        u8::try_from(self.output.len()).map_err(|_| AssemblerError::ProgramTooLarge { line: line_num })
    }

    fn emit(&mut self, byte: u8, line_num: usize) -> Result<(), AssemblerError> {
        if self.output.len() >= MEMORY_SIZE {
            return Err(AssemblerError::ProgramTooLarge { line: line_num });
        }
        self.output.push(byte);
        Ok(())
    }

    fn resolve_references(&mut self) -> Result<(), AssemblerError> {
        for (out_idx, label, line_num) in &self.pending {
            let addr = self.symbols.get(label)
                .ok_or_else(|| AssemblerError::UndefinedLabel {
                    line: *line_num,
                    label: label.clone(),
                })?;
            self.output[*out_idx] = *addr;
        }
        Ok(())
    }
}

fn is_label(operand: &str) -> bool {
    operand.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && operand.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_register(operand: &str, line_num: usize) -> Result<u8, AssemblerError> {
    operand
        .strip_prefix(['R', 'r'])
        .and_then(|n| n.parse::<u8>().ok())
        .filter(|&n| n < 8)
        .ok_or_else(|| AssemblerError::InvalidRegister {
            line: line_num,
            operand: operand.to_string(),
        })
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("invalid register on line {line}: {operand} (expected R0-R7)")]
    InvalidRegister { line: usize, operand: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("label defined twice on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i64 },

    #[error("program exceeds 256 bytes at line {line}")]
    ProgramTooLarge { line: usize },
}
