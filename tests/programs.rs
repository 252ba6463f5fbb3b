//! End-to-end tests: assemble source text and run it on the machine.

use neumann::asm::samples;
use neumann::{assemble, disassemble, AsmError, Cpu};

/// Assemble (expecting no diagnostics), load, and run with a ceiling.
fn run_source(source: &str) -> Cpu {
    let (cells, errors) = assemble(source);
    assert!(errors.is_empty(), "unexpected diagnostics: {:?}", errors);

    let mut cpu = Cpu::new();
    cpu.load_program(&cells).unwrap();
    cpu.run_limited(10_000);
    cpu
}

#[test]
fn add_two_immediates_and_output() {
    let source = "LOAD A,#5\nLOAD B,#3\nADD C,A,B\nOUTPUT C\nHALT";
    let (cells, errors) = assemble(source);

    assert_eq!(cells.len(), 5);
    assert!(errors.is_empty());

    let mut cpu = Cpu::new();
    cpu.load_program(&cells).unwrap();
    cpu.run();

    assert!(cpu.is_halted());
    assert_eq!(cpu.get_output(), vec![8]);
}

#[test]
fn forward_jump_is_taken() {
    let cpu = run_source("JUMP SKIP\nLOAD A,#1\nSKIP:\nLOAD A,#2\nHALT");

    assert!(cpu.is_halted());
    assert_eq!(cpu.regs.a, 2);
}

#[test]
fn division_by_zero_faults_on_the_third_step() {
    let (cells, errors) = assemble("LOAD A,#10\nLOAD B,#0\nDIV C,A,B\nHALT");
    assert!(errors.is_empty());

    let mut cpu = Cpu::new();
    cpu.load_program(&cells).unwrap();
    let executed = cpu.run();

    assert!(cpu.is_halted());
    assert_eq!(executed, 2);
    assert_eq!(cpu.regs.c, 0);
}

#[test]
fn out_of_range_data_is_one_error_and_no_record() {
    let (cells, errors) = assemble("DB 300");

    assert!(cells.is_empty());
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], AsmError::DataRange { value: 300, .. }));
}

#[test]
fn breakpoint_stops_run_before_the_marked_instruction() {
    let source = "LOAD A,#1\nLOAD B,#2\nLOAD C,#3\nOUTPUT C\nHALT";
    let (cells, errors) = assemble(source);
    assert!(errors.is_empty());
    assert_eq!(cells.len(), 5);

    let mut cpu = Cpu::new();
    cpu.load_program(&cells).unwrap();
    cpu.set_breakpoint(2);

    cpu.run();

    assert_eq!(cpu.pc, 2);
    assert!(cpu.is_running());
    assert!(cpu.status().step_mode);
    assert_eq!(cpu.regs.c, 0);
}

#[test]
fn rendered_cells_reassemble_to_the_same_program() {
    let source = "LOAD A,#5\nLOAD B,10\nADD C,A,B\nSTORE C,9\nJNZ 0\nHALT\nDB 200";
    let (cells, errors) = assemble(source);
    assert!(errors.is_empty());

    let rendered: String = cells.iter().map(|cell| format!("{}\n", cell)).collect();
    let (reassembled, errors) = assemble(&rendered);

    assert!(errors.is_empty());
    assert_eq!(cells, reassembled);
}

#[test]
fn disassembly_covers_every_cell() {
    let (cells, errors) = assemble("NOP\nHALT\nDB 1\nDB 2");
    assert!(errors.is_empty());

    let text = disassemble(&cells);
    assert_eq!(text.lines().count(), cells.len());
}

#[test]
fn input_bytes_are_consumed_front_first() {
    let source = "INPUT A\nINPUT B\nADD C,A,B\nOUTPUT C\nOUTPUT A\nHALT";
    let (cells, errors) = assemble(source);
    assert!(errors.is_empty());

    let mut cpu = Cpu::new();
    cpu.load_program(&cells).unwrap();
    cpu.add_input(20);
    cpu.add_input(22);
    cpu.run();

    assert_eq!(cpu.get_output(), vec![42, 20]);
}

#[test]
fn countdown_loop_with_conditional_exit() {
    let source = "\
    LOAD A, #5
    LOAD B, #1
LOOP:
    OUTPUT A
    SUB A, A, B
    JNZ LOOP
    HALT
";
    let mut cpu = run_source(source);

    assert!(cpu.is_halted());
    assert_eq!(cpu.get_output(), vec![5, 4, 3, 2, 1]);
}

#[test]
fn stored_values_survive_in_memory() {
    let source = "\
    LOAD A, #77
    STORE A, SLOT
    LOAD B, SLOT
    OUTPUT B
    HALT
SLOT:
    DB 0
";
    let mut cpu = run_source(source);

    assert_eq!(cpu.get_output(), vec![77]);
}

#[test]
fn sample_hello_world_output() {
    let sample = samples::find("hello-world").unwrap();
    let mut cpu = run_source(sample.source);

    assert!(cpu.is_halted());
    assert_eq!(cpu.get_output(), vec![72, 69, 76, 76, 79]);
}

#[test]
fn sample_add_two_numbers_output() {
    let sample = samples::find("add-two-numbers").unwrap();
    let mut cpu = run_source(sample.source);

    assert!(cpu.is_halted());
    assert_eq!(cpu.get_output(), vec![42]);
}

#[test]
fn sample_count_to_ten_output() {
    let sample = samples::find("count-to-ten").unwrap();
    let mut cpu = run_source(sample.source);

    assert!(cpu.is_halted());
    assert_eq!(cpu.get_output(), (1..=10).collect::<Vec<u8>>());
}

#[test]
fn sample_fibonacci_output() {
    let sample = samples::find("fibonacci").unwrap();
    let mut cpu = run_source(sample.source);

    assert!(cpu.is_halted());
    assert_eq!(
        cpu.get_output(),
        vec![0, 1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144]
    );
}

#[test]
fn every_sample_halts_within_the_ceiling() {
    for sample in samples::samples() {
        let cpu = run_source(sample.source);
        assert!(cpu.is_halted(), "{} did not halt", sample.name);
    }
}
