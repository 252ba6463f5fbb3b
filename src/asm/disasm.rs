//! Textual views of assembled programs.
//!
//! Converts memory cells back to readable assembly, either bare
//! (disassembly) or interleaved with the original source (listing).

use crate::cpu::memory::Cell;

/// Render cells as `ADDR: text`, one per line, addresses in hex.
pub fn disassemble(cells: &[Cell]) -> String {
    let mut output = String::new();
    for (addr, cell) in cells.iter().enumerate() {
        output.push_str(&format!("{:04X}: {}\n", addr, cell));
    }
    output
}

/// Interleave source lines with their assembled cells.
///
/// Lines that emit nothing (blanks, comments, labels) are printed
/// unannotated. The pairing walks source and cells in step, so it can
/// drift when diagnostics dropped lines; listings are meant for
/// programs that assembled cleanly.
pub fn create_listing(source: &str, cells: &[Cell]) -> String {
    let mut output = String::new();
    output.push_str("Addr  Cell                  Source\n");
    output.push_str("----  ----                  ------\n");

    let mut next = 0;
    for line in source.lines() {
        let text = match line.find(';') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let text = text.trim();
        let emits = !text.is_empty() && !text.ends_with(':') && next < cells.len();

        if emits {
            output.push_str(&format!(
                "{:04X}  {:<20}  {}\n",
                next,
                cells[next].to_string(),
                line.trim_end()
            ));
            next += 1;
        } else {
            output.push_str(&format!("{:4}  {:20}  {}\n", "", "", line.trim_end()));
        }
    }

    output
}
