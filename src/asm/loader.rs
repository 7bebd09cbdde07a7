//! LS-8 program source format.
//!
//! A program is a plain text file:
//! - One byte per line, written as a base-2 literal (`10000010`)
//! - `#` starts a comment that runs to the end of the line
//! - Blank and comment-only lines are ignored
//!
//! Line order is memory order, starting at address 0.

use crate::cpu::MEMORY_SIZE;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use thiserror::Error;

/// A parsed program image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    /// The bytes to place in memory, address 0 first.
    pub bytes: Vec<u8>,
    /// The source line each byte came from, comments included.
    pub source_lines: Vec<String>,
}

impl Program {
    /// Create a new empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a byte.
    pub fn push(&mut self, byte: u8, source: &str) {
        self.bytes.push(byte);
        self.source_lines.push(source.to_string());
    }

    /// Get the number of bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Vec<u8>> for Program {
    fn from(bytes: Vec<u8>) -> Self {
        let source_lines = bytes.iter().map(|b| format!("{:08b}", b)).collect();
        Self { bytes, source_lines }
    }
}

/// Parse program text into a program image.
pub fn parse_program(source: &str) -> Result<Program, LoadError> {
    parse_lines(source.lines().map(|line| Ok(line.to_string())))
}

/// Load a program file from disk.
pub fn load_program<P: AsRef<Path>>(path: P) -> Result<Program, LoadError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LoadError::NotFound(path.display().to_string()),
        _ => LoadError::IoError(e.to_string()),
    })?;
    let reader = BufReader::new(file);

    let program = parse_lines(reader.lines())?;
    log::debug!("loaded {} bytes from {}", program.len(), path.display());
    Ok(program)
}

fn parse_lines<I>(lines: I) -> Result<Program, LoadError>
where
    I: IntoIterator<Item = std::io::Result<String>>,
{
    let mut program = Program::new();

    for (line_num, line_result) in lines.into_iter().enumerate() {
        let line = line_result.map_err(|e| LoadError::IoError(e.to_string()))?;
        let value = line.split('#').next().unwrap_or("").trim();

        if value.is_empty() {
            continue;
        }

        let byte = parse_byte(value).map_err(|message| LoadError::ParseError {
            line: line_num + 1,
            message,
        })?;

        if program.len() == MEMORY_SIZE {
            return Err(LoadError::TooLarge { limit: MEMORY_SIZE });
        }
        program.push(byte, line.trim());
    }

    Ok(program)
}

fn parse_byte(value: &str) -> Result<u8, String> {
    if !value.chars().all(|c| c == '0' || c == '1') {
        return Err(format!("expected a base-2 literal, found `{}`", value));
    }
    u8::from_str_radix(value, 2).map_err(|_| format!("`{}` does not fit in 8 bits", value))
}

/// Save a program file to disk.
pub fn save_program<P: AsRef<Path>>(path: P, program: &Program) -> Result<(), LoadError> {
    let mut file = std::fs::File::create(path.as_ref())
        .map_err(|e| LoadError::IoError(e.to_string()))?;
    write_program(&mut file, program).map_err(|e| LoadError::IoError(e.to_string()))
}

/// Write a program in source form to any writer.
pub fn write_program<W: Write + ?Sized>(out: &mut W, program: &Program) -> std::io::Result<()> {
    writeln!(out, "# LS-8 program")?;
    writeln!(out, "# {} bytes", program.len())?;
    writeln!(out)?;

    for (addr, byte) in program.bytes.iter().enumerate() {
        writeln!(out, "{:08b} # {:03}", byte, addr)?;
    }

    Ok(())
}

/// Errors that can occur while loading a program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("unknown file: cannot find file with name {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("program does not fit in {limit} bytes of memory")]
    TooLarge { limit: usize },
}
