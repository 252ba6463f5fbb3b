//! CPU execution engine.
//!
//! Implements the fetch-execute cycle and all instruction behaviors.
//! Execution faults (dividing by zero, executing a data cell, reading
//! an instruction cell as data) halt the machine rather than surfacing
//! as errors to the caller; the trace ring records them when debugging.

use crate::cpu::isa::{Instruction, Source};
use crate::cpu::memory::{Cell, Memory, MemoryError};
use crate::cpu::registers::{Flags, Registers};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use thiserror::Error;

/// Maximum number of trace entries retained; oldest are evicted.
const HISTORY_LIMIT: usize = 100;

/// CPU execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CpuState {
    /// CPU is running normally.
    Running,
    /// CPU has halted (HALT, fault, fetch past end, or external stop).
    Halted,
}

/// The machine: registers, flags, memory, and execution control.
#[derive(Clone, Serialize, Deserialize)]
pub struct Cpu {
    /// CPU registers.
    pub regs: Registers,
    /// Condition flags.
    pub flags: Flags,
    /// Main memory.
    pub mem: Memory,
    /// Current execution state.
    pub state: CpuState,
    /// Program counter.
    pub pc: usize,
    /// Monotonic count of successfully executed instructions.
    pub instruction_count: u64,
    breakpoints: BTreeSet<usize>,
    history: VecDeque<String>,
    input: VecDeque<u8>,
    output: Vec<u8>,
    debug_mode: bool,
    step_mode: bool,
}

impl Cpu {
    /// Create a new CPU with zeroed state and default-size memory.
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            flags: Flags::new(),
            mem: Memory::new(),
            state: CpuState::Running,
            pc: 0,
            instruction_count: 0,
            breakpoints: BTreeSet::new(),
            history: VecDeque::new(),
            input: VecDeque::new(),
            output: Vec::new(),
            debug_mode: false,
            step_mode: false,
        }
    }

    /// Reset execution state: registers, flags, pc, counters, trace,
    /// and both I/O buffers. Memory and breakpoints are left intact.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.flags.reset();
        self.state = CpuState::Running;
        self.pc = 0;
        self.instruction_count = 0;
        self.history.clear();
        self.input.clear();
        self.output.clear();
    }

    /// Load a program into memory at address 0.
    pub fn load_program(&mut self, program: &[Cell]) -> Result<(), MemoryError> {
        self.mem.load_program(0, program)
    }

    /// Fetch the cell at `pc` and advance.
    ///
    /// A program counter past the end of memory halts the machine and
    /// yields `None`.
    fn fetch(&mut self) -> Option<(usize, Cell)> {
        let at = self.pc;
        let cell = match self.mem.read(at) {
            Ok(cell) => cell,
            Err(_) => {
                self.state = CpuState::Halted;
                return None;
            }
        };

        if self.debug_mode {
            self.trace(format!("FETCH {:04X}: {}", at, cell));
        }
        self.pc += 1;
        Some((at, cell))
    }

    /// Execute one fetched cell.
    fn execute(&mut self, at: usize, cell: Cell) -> Result<(), ExecFault> {
        let instr = match cell {
            Cell::Instr(instr) => instr,
            Cell::Data(_) => return Err(ExecFault::NotExecutable { addr: at }),
        };

        match instr {
            // ==================== Data Transfer ====================
            Instruction::Load { reg, src } => {
                let value = match src {
                    Source::Imm(value) => value,
                    Source::Mem(addr) => match self.mem.read(addr)? {
                        Cell::Data(value) => value,
                        Cell::Instr(_) => return Err(ExecFault::NotData { addr }),
                    },
                };
                self.regs.set(reg, value);
                self.flags.update_zn(value as i32);
            }

            Instruction::Store { reg, addr } => {
                let value = self.regs.get(reg);
                self.mem.write(addr, Cell::Data(value))?;
            }

            // ==================== Arithmetic ====================
            Instruction::Add { dest, lhs, rhs } => {
                let sum = self.regs.get(lhs) as u16 + self.regs.get(rhs) as u16;
                let wrap = sum > 255;
                let result = (sum % 256) as u8;
                self.flags.carry = wrap;
                self.flags.overflow = wrap;
                self.regs.set(dest, result);
                self.flags.update_zn(result as i32);
            }

            Instruction::Sub { dest, lhs, rhs } => {
                let diff = self.regs.get(lhs) as i16 - self.regs.get(rhs) as i16;
                let borrow = diff < 0;
                let result = if borrow { (diff + 256) as u8 } else { diff as u8 };
                self.flags.carry = borrow;
                self.regs.set(dest, result);
                self.flags.update_zn(result as i32);
            }

            Instruction::Mul { dest, lhs, rhs } => {
                let product = self.regs.get(lhs) as u32 * self.regs.get(rhs) as u32;
                let wrap = product > 255;
                let result = (product % 256) as u8;
                self.flags.overflow = wrap;
                self.regs.set(dest, result);
                self.flags.update_zn(result as i32);
            }

            Instruction::Div { dest, lhs, rhs } => {
                let divisor = self.regs.get(rhs);
                if divisor == 0 {
                    return Err(ExecFault::DivisionByZero);
                }
                let quotient = self.regs.get(lhs) / divisor;
                self.regs.set(dest, quotient);
                self.flags.update_zn(quotient as i32);
            }

            Instruction::Cmp { lhs, rhs } => {
                // The unclamped difference: the one place `negative`
                // can be observed.
                let diff = self.regs.get(lhs) as i32 - self.regs.get(rhs) as i32;
                self.flags.update_zn(diff);
            }

            // ==================== Control Flow ====================
            Instruction::Jump { addr } => {
                self.pc = addr;
            }

            Instruction::Jz { addr } => {
                if self.flags.zero {
                    self.pc = addr;
                }
            }

            Instruction::Jnz { addr } => {
                if !self.flags.zero {
                    self.pc = addr;
                }
            }

            // ==================== I/O ====================
            Instruction::Input { reg } => {
                let value = self.input.pop_front().unwrap_or(0);
                self.regs.set(reg, value);
            }

            Instruction::Output { reg } => {
                self.output.push(self.regs.get(reg));
            }

            // ==================== Special ====================
            Instruction::Nop => {}

            Instruction::Halt => {
                self.state = CpuState::Halted;
            }
        }

        Ok(())
    }

    /// Execute a single fetch-execute cycle.
    ///
    /// Returns whether an instruction cycle ran: the HALT cycle itself
    /// returns `true`, the call after it `false`. Faults halt the
    /// machine instead of propagating.
    pub fn step(&mut self) -> bool {
        if self.state != CpuState::Running {
            return false;
        }

        let (at, cell) = match self.fetch() {
            Some(fetched) => fetched,
            None => return false,
        };

        match self.execute(at, cell) {
            Ok(()) => {
                self.instruction_count += 1;
                if self.debug_mode {
                    self.trace(format!(
                        "EXEC {} ; A={} B={} C={}",
                        cell, self.regs.a, self.regs.b, self.regs.c
                    ));
                }
            }
            Err(fault) => {
                if self.debug_mode {
                    self.trace(format!("ERROR {}", fault));
                }
                self.state = CpuState::Halted;
            }
        }

        true
    }

    /// Run until halt or breakpoint.
    ///
    /// A breakpoint stops the loop *before* executing the instruction
    /// at that address, arms step mode, and leaves the machine running
    /// so the caller can single-step or resume. Returns the number of
    /// instructions executed by this call.
    pub fn run(&mut self) -> u64 {
        self.run_limited(u64::MAX)
    }

    /// Run with an instruction-count ceiling.
    ///
    /// The ceiling bounds runaway programs; it is the only such bound
    /// the machine itself applies.
    pub fn run_limited(&mut self, max_steps: u64) -> u64 {
        self.step_mode = false;
        let start = self.instruction_count;

        while self.state == CpuState::Running && self.instruction_count - start < max_steps {
            if self.breakpoints.contains(&self.pc) {
                self.step_mode = true;
                if self.debug_mode {
                    let at = self.pc;
                    self.trace(format!("BREAK {:04X}", at));
                }
                break;
            }
            if !self.step() {
                break;
            }
        }

        self.instruction_count - start
    }

    /// Stop the machine from outside.
    pub fn halt(&mut self) {
        self.state = CpuState::Halted;
    }

    /// Check if the CPU is halted.
    pub fn is_halted(&self) -> bool {
        self.state == CpuState::Halted
    }

    /// Check if the CPU is running.
    pub fn is_running(&self) -> bool {
        self.state == CpuState::Running
    }

    // ==================== Debugging ====================

    /// Enable or disable trace recording.
    pub fn set_debug(&mut self, enabled: bool) {
        self.debug_mode = enabled;
    }

    /// Set a breakpoint. Breakpoints survive `reset`.
    pub fn set_breakpoint(&mut self, addr: usize) {
        self.breakpoints.insert(addr);
    }

    /// Remove a breakpoint.
    pub fn remove_breakpoint(&mut self, addr: usize) {
        self.breakpoints.remove(&addr);
    }

    /// Remove all breakpoints.
    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    /// The recorded trace, oldest first.
    pub fn history(&self) -> &VecDeque<String> {
        &self.history
    }

    fn trace(&mut self, message: String) {
        if !self.debug_mode {
            return;
        }
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history
            .push_back(format!("[{:04}] {}", self.instruction_count, message));
    }

    // ==================== I/O ====================

    /// Queue a byte for INPUT to consume.
    pub fn add_input(&mut self, value: u8) {
        self.input.push_back(value);
    }

    /// Drain and return everything OUTPUT has produced.
    pub fn get_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    /// Structured snapshot of the machine for front ends to render.
    pub fn status(&self) -> CpuStatus {
        CpuStatus {
            pc: self.pc,
            registers: self.regs,
            flags: self.flags,
            state: self.state,
            instruction_count: self.instruction_count,
            debug_mode: self.debug_mode,
            step_mode: self.step_mode,
            breakpoints: self.breakpoints.iter().copied().collect(),
            output: self.output.clone(),
        }
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
            .field("pc", &self.pc)
            .field("instruction_count", &self.instruction_count)
            .field("regs", &self.regs)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Point-in-time view of the machine state.
///
/// Plain data only; front ends decide how to present it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CpuStatus {
    pub pc: usize,
    pub registers: Registers,
    pub flags: Flags,
    pub state: CpuState,
    pub instruction_count: u64,
    pub debug_mode: bool,
    pub step_mode: bool,
    /// Sorted ascending.
    pub breakpoints: Vec<usize>,
    /// Pending output bytes (not drained).
    pub output: Vec<u8>,
}

/// Faults that halt execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecFault {
    #[error("division by zero")]
    DivisionByZero,

    #[error("cell at address {addr} holds data, not an instruction")]
    NotExecutable { addr: usize },

    #[error("cell at address {addr} holds an instruction, not data")]
    NotData { addr: usize },

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
}
