//! CPU register and flag state.
//!
//! Three general-purpose 8-bit registers (A, B, C) and four condition
//! flags. All register values wrap modulo 256; the program counter
//! lives on the CPU itself since it indexes memory, not the ALU.

use crate::cpu::isa::Reg;
use serde::{Deserialize, Serialize};

/// The register file: three general-purpose 8-bit registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registers {
    pub a: u8,
    pub b: u8,
    pub c: u8,
}

impl Registers {
    /// Create a new register file with all values zeroed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a register by name.
    pub fn get(&self, reg: Reg) -> u8 {
        match reg {
            Reg::A => self.a,
            Reg::B => self.b,
            Reg::C => self.c,
        }
    }

    /// Write a register by name.
    pub fn set(&mut self, reg: Reg, value: u8) {
        match reg {
            Reg::A => self.a = value,
            Reg::B => self.b = value,
            Reg::C => self.c = value,
        }
    }

    /// Reset all registers to zero.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Condition flags.
///
/// `zero` and `negative` track the last arithmetic result; `carry` and
/// `overflow` are set per-operation by the ALU. Register values are
/// wrapped into `[0, 255]` before the flags see them, so `negative`
/// only ever fires for CMP's unclamped difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flags {
    pub zero: bool,
    pub negative: bool,
    pub overflow: bool,
    pub carry: bool,
}

impl Flags {
    /// Create a new flag set with everything clear.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all flags.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Update zero and negative from a result value.
    pub fn update_zn(&mut self, value: i32) {
        self.zero = value == 0;
        self.negative = value < 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_by_name() {
        let mut regs = Registers::new();

        regs.set(Reg::A, 10);
        regs.set(Reg::B, 20);
        regs.set(Reg::C, 30);

        assert_eq!(regs.get(Reg::A), 10);
        assert_eq!(regs.get(Reg::B), 20);
        assert_eq!(regs.get(Reg::C), 30);
    }

    #[test]
    fn test_reset() {
        let mut regs = Registers::new();
        regs.set(Reg::A, 255);
        regs.reset();

        for reg in Reg::ALL {
            assert_eq!(regs.get(reg), 0);
        }
    }

    #[test]
    fn test_update_zn() {
        let mut flags = Flags::new();

        flags.update_zn(0);
        assert!(flags.zero);
        assert!(!flags.negative);

        flags.update_zn(42);
        assert!(!flags.zero);
        assert!(!flags.negative);

        flags.update_zn(-1);
        assert!(!flags.zero);
        assert!(flags.negative);
    }

    #[test]
    fn test_flags_reset() {
        let mut flags = Flags {
            zero: true,
            negative: true,
            overflow: true,
            carry: true,
        };

        flags.reset();
        assert_eq!(flags, Flags::default());
    }
}
