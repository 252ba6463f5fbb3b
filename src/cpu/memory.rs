//! Unified memory subsystem.
//!
//! A von Neumann machine keeps instructions and data in the same
//! address space. Each cell holds either a raw byte or a decoded
//! instruction record; the CPU and the assembler agree on this tagged
//! representation so no binary encoding step is needed in between.

use crate::cpu::isa::Instruction;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of memory cells.
pub const DEFAULT_MEMORY_SIZE: usize = 256;

/// A single memory cell: raw data byte or instruction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    /// A raw byte value (0-255). Not executable.
    Data(u8),
    /// A decoded instruction record.
    Instr(Instruction),
}

impl Default for Cell {
    fn default() -> Self {
        Cell::Data(0)
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Data(value) => write!(f, "DB {}", value),
            Cell::Instr(instr) => write!(f, "{}", instr),
        }
    }
}

/// Fixed-size addressable memory.
#[derive(Clone, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<Cell>,
}

impl Memory {
    /// Create a memory of the default size with all cells zeroed.
    pub fn new() -> Self {
        Self::with_size(DEFAULT_MEMORY_SIZE)
    }

    /// Create a memory of `size` cells, all zeroed.
    pub fn with_size(size: usize) -> Self {
        Self {
            cells: vec![Cell::default(); size],
        }
    }

    /// Number of addressable cells.
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    /// Read the cell at `addr`.
    pub fn read(&self, addr: usize) -> Result<Cell, MemoryError> {
        self.cells
            .get(addr)
            .copied()
            .ok_or(MemoryError::AddressOutOfRange {
                addr,
                size: self.cells.len(),
            })
    }

    /// Write `cell` at `addr`.
    pub fn write(&mut self, addr: usize, cell: Cell) -> Result<(), MemoryError> {
        let size = self.cells.len();
        match self.cells.get_mut(addr) {
            Some(slot) => {
                *slot = cell;
                Ok(())
            }
            None => Err(MemoryError::AddressOutOfRange { addr, size }),
        }
    }

    /// Reset every cell to zeroed data.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell = Cell::default();
        }
    }

    /// Load a program into memory starting at `start_addr`.
    pub fn load_program(&mut self, start_addr: usize, program: &[Cell]) -> Result<(), MemoryError> {
        if start_addr + program.len() > self.cells.len() {
            return Err(MemoryError::ProgramTooLarge {
                size: program.len(),
                available: self.cells.len().saturating_sub(start_addr),
            });
        }

        self.cells[start_addr..start_addr + program.len()].copy_from_slice(program);
        Ok(())
    }

    /// A window of cells for display, clamped to the memory size.
    ///
    /// This is the read-only surface a memory viewer consumes; the
    /// viewer never writes.
    pub fn dump(&self, start: usize, count: usize) -> Vec<(usize, Cell)> {
        let end = (start + count).min(self.cells.len());
        (start.min(end)..end).map(|i| (i, self.cells[i])).collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_default = self
            .cells
            .iter()
            .filter(|cell| **cell != Cell::default())
            .count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_default)
            .field("total_cells", &self.cells.len())
            .finish()
    }
}

/// Errors that can occur during memory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("memory address {addr} out of range (0-{})", size - 1)]
    AddressOutOfRange { addr: usize, size: usize },

    #[error("program size {size} exceeds available space {available}")]
    ProgramTooLarge { size: usize, available: usize },
}
