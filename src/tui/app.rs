//! Debugger application state and logic.

use crate::Cpu;
use crate::asm::disasm::disassemble_at;
use crate::cpu::MEMORY_SIZE;
use std::collections::HashSet;

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    /// Original program for reference.
    pub program: Vec<u8>,
    /// Breakpoints (by address).
    pub breakpoints: HashSet<u8>,
    /// Everything the program has printed so far.
    pub output: Vec<u8>,
    /// Is the debugger running continuously?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view scroll offset, in rows of 8 bytes.
    pub mem_scroll: usize,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded program.
    pub fn new(program: Vec<u8>) -> Self {
        let mut app = Self {
            cpu: Cpu::new(),
            program,
            breakpoints: HashSet::new(),
            output: Vec::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'r' to run, 'q' to quit.".into(),
            mem_scroll: 0,
        };
        app.load();
        app
    }

    fn load(&mut self) {
        self.cpu = Cpu::new();
        self.output.clear();
        if let Err(e) = self.cpu.load_program(&self.program) {
            self.status = format!("Error: {}", e);
        }
    }

    /// Step one instruction.
    pub fn step(&mut self) {
        if !self.cpu.is_running() {
            self.status = format!("CPU stopped: {:?}", self.cpu.state);
            self.running = false;
            return;
        }

        let pc = self.cpu.regs.pc;
        match self.cpu.step(&mut self.output) {
            Ok(instr) => {
                self.status = format!("PC={:03}: {}", pc, instr);
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    /// Run until halt, breakpoint, or error.
    pub fn run(&mut self) {
        // Leave the breakpoint we are sitting on.
        if self.breakpoints.contains(&self.cpu.regs.pc) {
            self.step();
        }
        self.running = self.cpu.is_running();
        if self.running {
            self.status = "Running...".into();
        }
    }

    /// Run one iteration of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        if !self.cpu.is_running() {
            self.running = false;
            self.status = format!("Stopped after {} cycles: {:?}", self.cpu.cycles, self.cpu.state);
            return;
        }

        let pc = self.cpu.regs.pc;
        if self.breakpoints.contains(&pc) {
            self.running = false;
            self.status = format!("Breakpoint at PC={}", pc);
            return;
        }

        self.step();
    }

    /// Toggle breakpoint at current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.cpu.regs.pc;
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={}", pc);
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={}", pc);
        }
    }

    /// Reset CPU to initial state.
    pub fn reset(&mut self) {
        self.load();
        self.running = false;
        self.status = "Reset. Ready.".into();
    }

    /// Printed values, most recent last.
    pub fn output_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.output)
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Get disassembly around current PC as `(addr, text, is_current)`.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(u8, String, bool)> {
        let pc = self.cpu.regs.pc as usize;
        let mem = self.cpu.mem.as_slice();

        // Walk instruction boundaries from 0; resync at PC if a jump
        // landed inside an instruction.
        let mut listing = Vec::new();
        let mut addr = 0;
        while addr < MEMORY_SIZE {
            if addr > pc && listing.iter().all(|&(a, _)| a != pc) {
                listing.retain(|&(a, _)| a < pc);
                addr = pc;
            }
            let (text, width) = disassemble_at(mem, addr);
            listing.push((addr, text));
            addr += width.max(1);
        }

        let current = listing.iter().position(|&(a, _)| a == pc).unwrap_or(0);
        let start = current.saturating_sub(lines / 2);

        listing
            .into_iter()
            .skip(start)
            .take(lines)
            .map(|(a, text)| (a as u8, text, a == pc))
            .collect()
    }
}

/// Run the debugger with a program.
pub fn run_debugger(program: Vec<u8>) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;
    use std::time::Duration;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(program);

    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char('s') => {
                            app.running = false;
                            app.step();
                        }
                        KeyCode::Char('r') => app.run(),
                        KeyCode::Char('p') => {
                            app.running = false;
                            app.status = "Paused.".into();
                        }
                        KeyCode::Char('b') => app.toggle_breakpoint(),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => {
                            app.mem_scroll = app.mem_scroll.saturating_sub(1);
                        }
                        KeyCode::Down => {
                            if app.mem_scroll + 1 < MEMORY_SIZE / 8 {
                                app.mem_scroll += 1;
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        if app.running {
            app.tick();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::assemble;

    #[test]
    fn test_step_collects_output() {
        let program = assemble("LDI R0,8\nPRN R0\nHLT").unwrap();
        let mut app = DebuggerApp::new(program);

        app.step();
        app.step();
        assert_eq!(app.output_lines(), vec!["8"]);

        app.reset();
        assert!(app.output.is_empty());
        assert_eq!(app.cpu.regs.pc, 0);
    }

    #[test]
    fn test_run_stops_at_breakpoint() {
        let program = assemble("LDI R0,1\nLDI R1,2\nHLT").unwrap();
        let mut app = DebuggerApp::new(program);
        app.cpu.regs.jump(3);
        app.toggle_breakpoint();
        app.cpu.regs.jump(0);

        app.run();
        while app.running {
            app.tick();
        }

        assert_eq!(app.cpu.regs.pc, 3);
        assert!(app.cpu.is_running());
        assert!(app.status.contains("Breakpoint"));
    }

    #[test]
    fn test_disassembly_marks_pc() {
        let program = assemble("LDI R0,8\nPRN R0\nHLT").unwrap();
        let mut app = DebuggerApp::new(program);
        app.step();

        let listing = app.get_disassembly(4);
        assert_eq!(listing[0], (0, "LDI R0,8".to_string(), false));
        assert_eq!(listing[1], (3, "PRN R0".to_string(), true));
    }

    #[test]
    fn test_disassembly_resyncs_mid_instruction() {
        let program = assemble("LDI R0,8\nHLT").unwrap();
        let mut app = DebuggerApp::new(program);
        app.cpu.regs.jump(2);

        let listing = app.get_disassembly(3);
        assert!(listing.iter().any(|(a, _, current)| *a == 2 && *current));
    }
}
