//! Two-pass assembler.
//!
//! Syntax:
//! ```text
//! ; Comment
//! START:              ; Define a label (a line of its own)
//!     LOAD A, #5      ; Immediate load
//!     LOAD B, 16      ; Load from address 16
//!     ADD C, A, B     ; C := A + B
//!     JUMP START      ; Jump to label
//!     HALT
//!     DB 42           ; Raw data byte
//! ```
//!
//! Assembly is fail-soft: diagnostics accumulate and both passes run
//! to completion, so one call reports every problem in the source. A
//! line with a diagnostic emits nothing and reserves no address.

use crate::cpu::isa::{Instruction, Reg, Source};
use crate::cpu::memory::Cell;
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source text into memory cells plus any diagnostics.
///
/// The cells are loadable as-is; by convention callers do not load a
/// program that produced diagnostics.
pub fn assemble(source: &str) -> (Vec<Cell>, Vec<AsmError>) {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// An address-position operand after classification.
enum AddrOperand {
    /// A concrete address (numeric literal or already-defined label).
    Fixed(usize),
    /// A label to be resolved in pass 2.
    Pending(String),
}

/// A LOAD source operand after classification.
enum SourceOperand {
    Resolved(Source),
    Pending(String),
}

/// The assembler state, rebuilt per `assemble` call.
struct Assembler {
    /// Symbol table (label -> cell address at definition).
    symbols: HashMap<String, usize>,
    /// Forward references (cell index, label) patched in pass 2.
    pending: Vec<(usize, String)>,
    /// Output cells, densely packed.
    cells: Vec<Cell>,
    /// Accumulated diagnostics.
    errors: Vec<AsmError>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            pending: Vec::new(),
            cells: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> (Vec<Cell>, Vec<AsmError>) {
        // Pass 1: parse lines, collect labels, emit cells
        for (line_idx, line) in source.lines().enumerate() {
            self.process_line(line, line_idx + 1);
        }

        // Pass 2: resolve forward references
        self.resolve_references();

        (std::mem::take(&mut self.cells), std::mem::take(&mut self.errors))
    }

    fn process_line(&mut self, raw: &str, line_num: usize) {
        let text = match raw.find(';') {
            Some(idx) => &raw[..idx],
            None => raw,
        };
        let text = text.trim().to_uppercase();

        if text.is_empty() {
            return;
        }

        // Label definitions are lines of their own.
        if let Some(name) = text.strip_suffix(':') {
            let name = name.trim();
            if is_valid_label(name) {
                self.symbols.insert(name.to_string(), self.cells.len());
            } else {
                self.errors.push(AsmError::InvalidLabel {
                    line: line_num,
                    name: name.to_string(),
                });
            }
            return;
        }

        let (mnemonic, rest) = match text.split_once(|c: char| c.is_whitespace()) {
            Some((mnemonic, rest)) => (mnemonic, rest.trim()),
            None => (text.as_str(), ""),
        };

        if mnemonic == "DB" {
            self.process_data(rest, line_num);
            return;
        }

        let operands: Vec<String> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(|op| op.trim().to_string()).collect()
        };

        self.process_instruction(mnemonic, &operands, line_num);
    }

    fn process_data(&mut self, operand: &str, line_num: usize) {
        if operand.is_empty() {
            self.errors.push(AsmError::OperandCount {
                line: line_num,
                mnemonic: "DB".to_string(),
                expected: 1,
                got: 0,
            });
            return;
        }

        let value: i64 = match operand.parse() {
            Ok(value) => value,
            Err(_) => {
                self.errors.push(AsmError::InvalidData {
                    line: line_num,
                    token: operand.to_string(),
                });
                return;
            }
        };

        if !(0..=255).contains(&value) {
            self.errors.push(AsmError::DataRange {
                line: line_num,
                value,
            });
            return;
        }

        self.cells.push(Cell::Data(value as u8));
    }

    fn process_instruction(&mut self, mnemonic: &str, operands: &[String], line_num: usize) {
        let expected = match mnemonic {
            "LOAD" | "STORE" | "CMP" => 2,
            "ADD" | "SUB" | "MUL" | "DIV" => 3,
            "JUMP" | "JZ" | "JNZ" | "INPUT" | "OUTPUT" => 1,
            "NOP" | "HALT" => 0,
            _ => {
                self.errors.push(AsmError::UnknownInstruction {
                    line: line_num,
                    mnemonic: mnemonic.to_string(),
                });
                return;
            }
        };

        if operands.len() != expected {
            self.errors.push(AsmError::OperandCount {
                line: line_num,
                mnemonic: mnemonic.to_string(),
                expected,
                got: operands.len(),
            });
            return;
        }

        match mnemonic {
            "LOAD" => {
                let Some(reg) = self.expect_reg(&operands[0], mnemonic, line_num) else {
                    return;
                };
                let Some(src) = self.expect_source(&operands[1], mnemonic, line_num) else {
                    return;
                };
                match src {
                    SourceOperand::Resolved(src) => {
                        self.cells.push(Cell::Instr(Instruction::Load { reg, src }));
                    }
                    SourceOperand::Pending(label) => {
                        self.pending.push((self.cells.len(), label));
                        self.cells.push(Cell::Instr(Instruction::Load {
                            reg,
                            src: Source::Mem(0),
                        }));
                    }
                }
            }

            "STORE" => {
                let Some(reg) = self.expect_reg(&operands[0], mnemonic, line_num) else {
                    return;
                };
                let Some(addr) = self.expect_addr(&operands[1], mnemonic, line_num) else {
                    return;
                };
                self.emit_addr_instr(addr, |addr| Instruction::Store { reg, addr });
            }

            "ADD" | "SUB" | "MUL" | "DIV" => {
                let Some(dest) = self.expect_reg(&operands[0], mnemonic, line_num) else {
                    return;
                };
                let Some(lhs) = self.expect_reg(&operands[1], mnemonic, line_num) else {
                    return;
                };
                let Some(rhs) = self.expect_reg(&operands[2], mnemonic, line_num) else {
                    return;
                };
                let instr = match mnemonic {
                    "ADD" => Instruction::Add { dest, lhs, rhs },
                    "SUB" => Instruction::Sub { dest, lhs, rhs },
                    "MUL" => Instruction::Mul { dest, lhs, rhs },
                    _ => Instruction::Div { dest, lhs, rhs },
                };
                self.cells.push(Cell::Instr(instr));
            }

            "CMP" => {
                let Some(lhs) = self.expect_reg(&operands[0], mnemonic, line_num) else {
                    return;
                };
                let Some(rhs) = self.expect_reg(&operands[1], mnemonic, line_num) else {
                    return;
                };
                self.cells.push(Cell::Instr(Instruction::Cmp { lhs, rhs }));
            }

            "JUMP" | "JZ" | "JNZ" => {
                let Some(addr) = self.expect_addr(&operands[0], mnemonic, line_num) else {
                    return;
                };
                match mnemonic {
                    "JUMP" => self.emit_addr_instr(addr, |addr| Instruction::Jump { addr }),
                    "JZ" => self.emit_addr_instr(addr, |addr| Instruction::Jz { addr }),
                    _ => self.emit_addr_instr(addr, |addr| Instruction::Jnz { addr }),
                }
            }

            "INPUT" | "OUTPUT" => {
                let Some(reg) = self.expect_reg(&operands[0], mnemonic, line_num) else {
                    return;
                };
                let instr = if mnemonic == "INPUT" {
                    Instruction::Input { reg }
                } else {
                    Instruction::Output { reg }
                };
                self.cells.push(Cell::Instr(instr));
            }

            "NOP" => self.cells.push(Cell::Instr(Instruction::Nop)),
            "HALT" => self.cells.push(Cell::Instr(Instruction::Halt)),

            _ => unreachable!("arity table covers every mnemonic"),
        }
    }

    /// A register-position operand. Anything else is a diagnostic and
    /// drops the line.
    fn expect_reg(&mut self, token: &str, mnemonic: &str, line_num: usize) -> Option<Reg> {
        if let Some(reg) = Reg::parse(token) {
            return Some(reg);
        }

        self.errors.push(AsmError::OperandType {
            line: line_num,
            mnemonic: mnemonic.to_string(),
            token: token.to_string(),
        });
        None
    }

    /// An address-position operand: numeric literal (any form), defined
    /// label, or forward reference. Registers are a kind mismatch.
    fn expect_addr(&mut self, token: &str, mnemonic: &str, line_num: usize) -> Option<AddrOperand> {
        if Reg::parse(token).is_some() {
            self.errors.push(AsmError::OperandType {
                line: line_num,
                mnemonic: mnemonic.to_string(),
                token: token.to_string(),
            });
            return None;
        }

        Some(self.classify_addr(token, line_num))
    }

    fn classify_addr(&mut self, token: &str, line_num: usize) -> AddrOperand {
        if let Some(hex) = token.strip_prefix("0X") {
            return match usize::from_str_radix(hex, 16) {
                Ok(addr) => AddrOperand::Fixed(addr),
                Err(_) => self.invalid_operand(token, line_num),
            };
        }

        if let Some(imm) = token.strip_prefix('#') {
            return match imm.parse::<u8>() {
                Ok(value) => AddrOperand::Fixed(value as usize),
                Err(_) => self.invalid_operand(token, line_num),
            };
        }

        if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
            return match token.parse::<usize>() {
                Ok(addr) => AddrOperand::Fixed(addr),
                Err(_) => self.invalid_operand(token, line_num),
            };
        }

        if let Some(&addr) = self.symbols.get(token) {
            return AddrOperand::Fixed(addr);
        }

        if is_valid_label(token) {
            return AddrOperand::Pending(token.to_string());
        }

        self.invalid_operand(token, line_num)
    }

    /// The LOAD source keeps the immediate/address distinction: `#n`
    /// is the literal, every other numeric form is a memory address.
    fn expect_source(
        &mut self,
        token: &str,
        mnemonic: &str,
        line_num: usize,
    ) -> Option<SourceOperand> {
        if Reg::parse(token).is_some() {
            self.errors.push(AsmError::OperandType {
                line: line_num,
                mnemonic: mnemonic.to_string(),
                token: token.to_string(),
            });
            return None;
        }

        if let Some(imm) = token.strip_prefix('#') {
            return match imm.parse::<u8>() {
                Ok(value) => Some(SourceOperand::Resolved(Source::Imm(value))),
                Err(_) => {
                    self.errors.push(AsmError::InvalidOperand {
                        line: line_num,
                        token: token.to_string(),
                    });
                    Some(SourceOperand::Resolved(Source::Mem(0)))
                }
            };
        }

        Some(match self.classify_addr(token, line_num) {
            AddrOperand::Fixed(addr) => SourceOperand::Resolved(Source::Mem(addr)),
            AddrOperand::Pending(label) => SourceOperand::Pending(label),
        })
    }

    fn invalid_operand(&mut self, token: &str, line_num: usize) -> AddrOperand {
        self.errors.push(AsmError::InvalidOperand {
            line: line_num,
            token: token.to_string(),
        });
        AddrOperand::Fixed(0)
    }

    fn emit_addr_instr(&mut self, addr: AddrOperand, make: impl FnOnce(usize) -> Instruction) {
        match addr {
            AddrOperand::Fixed(addr) => self.cells.push(Cell::Instr(make(addr))),
            AddrOperand::Pending(label) => {
                self.pending.push((self.cells.len(), label));
                self.cells.push(Cell::Instr(make(0)));
            }
        }
    }

    fn resolve_references(&mut self) {
        for (index, label) in std::mem::take(&mut self.pending) {
            match self.symbols.get(&label) {
                Some(&addr) => patch_address(&mut self.cells[index], addr),
                None => self.errors.push(AsmError::UndefinedLabel { name: label }),
            }
        }
    }
}

/// Patch the address slot of the instruction at a pending cell.
fn patch_address(cell: &mut Cell, addr: usize) {
    if let Cell::Instr(instr) = cell {
        match instr {
            Instruction::Load {
                src: Source::Mem(slot),
                ..
            }
            | Instruction::Store { addr: slot, .. }
            | Instruction::Jump { addr: slot }
            | Instruction::Jz { addr: slot }
            | Instruction::Jnz { addr: slot } => *slot = addr,
            _ => {}
        }
    }
}

/// Labels match `[A-Z][A-Z0-9_]*` (source is uppercased before this).
fn is_valid_label(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    #[error("invalid label on line {line}: {name}")]
    InvalidLabel { line: usize, name: String },

    #[error("unknown instruction on line {line}: {mnemonic}")]
    UnknownInstruction { line: usize, mnemonic: String },

    #[error("{mnemonic} on line {line} expects {expected} operand(s), got {got}")]
    OperandCount {
        line: usize,
        mnemonic: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid operand on line {line}: {token}")]
    InvalidOperand { line: usize, token: String },

    #[error("operand {token} on line {line} is not valid for {mnemonic}")]
    OperandType {
        line: usize,
        mnemonic: String,
        token: String,
    },

    #[error("invalid data value on line {line}: {token}")]
    InvalidData { line: usize, token: String },

    #[error("data value {value} on line {line} out of range (0-255)")]
    DataRange { line: usize, value: i64 },

    #[error("undefined label: {name}")]
    UndefinedLabel { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_simple() {
        let source = r#"
            ; Load two numbers and add them
            LOAD A, #5
            LOAD B, #3
            ADD C, A, B
            OUTPUT C
            HALT
        "#;

        let (cells, errors) = assemble(source);

        assert!(errors.is_empty());
        assert_eq!(cells.len(), 5);
        assert_eq!(
            cells[0],
            Cell::Instr(Instruction::Load {
                reg: Reg::A,
                src: Source::Imm(5),
            })
        );
        assert_eq!(cells[4], Cell::Instr(Instruction::Halt));
    }

    #[test]
    fn test_comma_without_spaces() {
        let (cells, errors) = assemble("LOAD A,#5\nHALT");

        assert!(errors.is_empty());
        assert_eq!(
            cells[0],
            Cell::Instr(Instruction::Load {
                reg: Reg::A,
                src: Source::Imm(5),
            })
        );
    }

    #[test]
    fn test_lowercase_source() {
        let (cells, errors) = assemble("load a, #9\noutput a\nhalt");

        assert!(errors.is_empty());
        assert_eq!(cells.len(), 3);
    }

    #[test]
    fn test_forward_reference() {
        let source = r#"
            JUMP END
            NOP
        END:
            HALT
        "#;

        let (cells, errors) = assemble(source);

        assert!(errors.is_empty());
        assert_eq!(cells[0], Cell::Instr(Instruction::Jump { addr: 2 }));
    }

    #[test]
    fn test_backward_reference() {
        let source = r#"
        LOOP:
            NOP
            JUMP LOOP
        "#;

        let (cells, errors) = assemble(source);

        assert!(errors.is_empty());
        assert_eq!(cells[1], Cell::Instr(Instruction::Jump { addr: 0 }));
    }

    #[test]
    fn test_load_from_label_address() {
        let source = r#"
            LOAD A, VALUE
            HALT
        VALUE:
            DB 42
        "#;

        let (cells, errors) = assemble(source);

        assert!(errors.is_empty());
        assert_eq!(
            cells[0],
            Cell::Instr(Instruction::Load {
                reg: Reg::A,
                src: Source::Mem(2),
            })
        );
        assert_eq!(cells[2], Cell::Data(42));
    }

    #[test]
    fn test_hex_operand() {
        let (cells, errors) = assemble("JUMP 0x10\nHALT");

        assert!(errors.is_empty());
        assert_eq!(cells[0], Cell::Instr(Instruction::Jump { addr: 16 }));
    }

    #[test]
    fn test_data_bytes() {
        let (cells, errors) = assemble("DB 0\nDB 255\nDB 17");

        assert!(errors.is_empty());
        assert_eq!(cells, vec![Cell::Data(0), Cell::Data(255), Cell::Data(17)]);
    }

    #[test]
    fn test_data_out_of_range() {
        let (cells, errors) = assemble("DB 300\nHALT");

        assert_eq!(cells.len(), 1);
        assert_eq!(
            errors,
            vec![AsmError::DataRange {
                line: 1,
                value: 300,
            }]
        );
    }

    #[test]
    fn test_data_not_numeric() {
        let (cells, errors) = assemble("DB POTATO");

        assert!(cells.is_empty());
        assert_eq!(
            errors,
            vec![AsmError::InvalidData {
                line: 1,
                token: "POTATO".to_string(),
            }]
        );
    }

    #[test]
    fn test_unknown_instruction() {
        let (cells, errors) = assemble("FROB A, B");

        assert!(cells.is_empty());
        assert_eq!(
            errors,
            vec![AsmError::UnknownInstruction {
                line: 1,
                mnemonic: "FROB".to_string(),
            }]
        );
    }

    #[test]
    fn test_operand_count() {
        let (cells, errors) = assemble("ADD A, B");

        assert!(cells.is_empty());
        assert_eq!(
            errors,
            vec![AsmError::OperandCount {
                line: 1,
                mnemonic: "ADD".to_string(),
                expected: 3,
                got: 2,
            }]
        );
    }

    #[test]
    fn test_operand_type_mismatch() {
        // Address where a register is required.
        let (cells, errors) = assemble("ADD 5, A, B");

        assert!(cells.is_empty());
        assert!(matches!(errors[0], AsmError::OperandType { line: 1, .. }));

        // Register where an address is required.
        let (_, errors) = assemble("JUMP A");
        assert!(matches!(errors[0], AsmError::OperandType { line: 1, .. }));
    }

    #[test]
    fn test_immediate_out_of_range() {
        let (_, errors) = assemble("LOAD A, #300");

        assert_eq!(
            errors,
            vec![AsmError::InvalidOperand {
                line: 1,
                token: "#300".to_string(),
            }]
        );
    }

    #[test]
    fn test_invalid_label() {
        let (cells, errors) = assemble("1BAD:\nHALT");

        assert_eq!(cells.len(), 1);
        assert_eq!(
            errors,
            vec![AsmError::InvalidLabel {
                line: 1,
                name: "1BAD".to_string(),
            }]
        );
    }

    #[test]
    fn test_undefined_label() {
        let (cells, errors) = assemble("JUMP NOWHERE\nHALT");

        // The cell is still emitted with a placeholder address.
        assert_eq!(cells[0], Cell::Instr(Instruction::Jump { addr: 0 }));
        assert_eq!(
            errors,
            vec![AsmError::UndefinedLabel {
                name: "NOWHERE".to_string(),
            }]
        );
    }

    #[test]
    fn test_dropped_lines_reserve_no_address() {
        let source = r#"
            FROB
            NOP
        HERE:
            HALT
        "#;

        let (cells, errors) = assemble(source);

        // The bad line emits nothing, so HERE is address 1.
        assert_eq!(errors.len(), 1);
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0], Cell::Instr(Instruction::Nop));
        assert_eq!(cells[1], Cell::Instr(Instruction::Halt));
    }

    #[test]
    fn test_all_diagnostics_accumulate() {
        let source = "FROB\nDB 999\nADD A\nHALT";

        let (cells, errors) = assemble(source);

        assert_eq!(cells.len(), 1);
        assert_eq!(errors.len(), 3);
    }
}
