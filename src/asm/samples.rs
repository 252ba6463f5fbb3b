//! Built-in sample programs.
//!
//! Small demos exercising the whole instruction set; the CLI lists and
//! runs them by name.

/// A named demo program.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub name: &'static str,
    pub description: &'static str,
    pub source: &'static str,
}

const SAMPLES: [Sample; 4] = [
    Sample {
        name: "hello-world",
        description: "Emit the character codes for HELLO",
        source: "\
; Emit the character codes for \"HELLO\"
    LOAD A, #72     ; H
    OUTPUT A
    LOAD A, #69     ; E
    OUTPUT A
    LOAD A, #76     ; L
    OUTPUT A
    OUTPUT A        ; L again
    LOAD A, #79     ; O
    OUTPUT A
    HALT
",
    },
    Sample {
        name: "add-two-numbers",
        description: "Add two bytes stored in memory",
        source: "\
; Add the two bytes at X and Y
    LOAD A, X
    LOAD B, Y
    ADD C, A, B
    OUTPUT C
    HALT
X:
    DB 34
Y:
    DB 8
",
    },
    Sample {
        name: "count-to-ten",
        description: "Count from 1 to 10, emitting each value",
        source: "\
; Count from 1 to 10
    LOAD A, #1      ; counter
    LOAD B, #10     ; limit
    LOAD C, #1      ; increment
LOOP:
    OUTPUT A
    CMP A, B
    JZ DONE
    ADD A, A, C
    JUMP LOOP
DONE:
    HALT
",
    },
    Sample {
        name: "fibonacci",
        description: "Emit the Fibonacci sequence up to 144",
        source: "\
; Fibonacci numbers that fit in a byte
    LOAD A, #0      ; current
    LOAD B, #1      ; next
LOOP:
    OUTPUT A
    LOAD C, #144
    CMP A, C
    JZ DONE
    ADD C, A, B     ; C := A + B
    STORE B, SWAP
    LOAD A, SWAP    ; A := old B
    STORE C, SWAP
    LOAD B, SWAP    ; B := A + old B
    JUMP LOOP
DONE:
    HALT
SWAP:
    DB 0
",
    },
];

/// All built-in samples, in listing order.
pub fn samples() -> &'static [Sample] {
    &SAMPLES
}

/// Look up a sample by name.
pub fn find(name: &str) -> Option<&'static Sample> {
    SAMPLES.iter().find(|sample| sample.name == name)
}
