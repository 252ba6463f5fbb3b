//! CLI entry point.
//!
//! Commands:
//! - `neumann-emu run <program>` - Assemble and run a source file
//! - `neumann-emu asm <source>` - Assemble and print the result
//! - `neumann-emu samples` - List, show, or run the built-in demos

use clap::{Parser, Subcommand};
use neumann::asm::{assemble, create_listing, disassemble, find_sample, samples};
use neumann::{Cell, Cpu};

#[derive(Parser)]
#[command(name = "neumann-emu")]
#[command(version = "0.1.0")]
#[command(about = "An 8-bit von Neumann stored-program machine emulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble a program and run it until it halts
    Run {
        /// Path to the assembly source file
        program: String,
        /// Maximum number of instructions to execute
        #[arg(short, long, default_value = "10000")]
        max_steps: u64,
        /// Record and print the execution trace
        #[arg(short, long)]
        trace: bool,
        /// Input bytes for INPUT, comma-separated (e.g. 3,7,255)
        #[arg(short, long)]
        input: Option<String>,
        /// Set a breakpoint at an address (repeatable)
        #[arg(short = 'b', long = "break", value_name = "ADDR")]
        breakpoints: Vec<usize>,
        /// Print the final status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Assemble a source file and print the disassembly or listing
    Asm {
        /// Path to the assembly source file
        source: String,
        /// Print a source listing instead of a bare disassembly
        #[arg(short, long)]
        listing: bool,
    },
    /// List the built-in sample programs, or show/run one
    Samples {
        /// Sample name (omit to list all)
        name: Option<String>,
        /// Assemble and run the named sample
        #[arg(short, long)]
        run: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            program,
            max_steps,
            trace,
            input,
            breakpoints,
            json,
        } => {
            let source = read_source(&program);
            let cells = assemble_or_exit(&source);
            run_program(&cells, max_steps, trace, input.as_deref(), &breakpoints, json);
        }
        Commands::Asm { source, listing } => {
            assemble_file(&source, listing);
        }
        Commands::Samples { name, run } => {
            show_samples(name.as_deref(), run);
        }
    }
}

fn read_source(path: &str) -> String {
    match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("failed to read {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

/// Assemble, printing every diagnostic. A program with diagnostics is
/// never loaded.
fn assemble_or_exit(source: &str) -> Vec<Cell> {
    let (cells, errors) = assemble(source);
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("error: {}", error);
        }
        std::process::exit(1);
    }
    cells
}

fn run_program(
    cells: &[Cell],
    max_steps: u64,
    trace: bool,
    input: Option<&str>,
    breakpoints: &[usize],
    json: bool,
) {
    let mut cpu = Cpu::new();
    if let Err(e) = cpu.load_program(cells) {
        eprintln!("failed to load program: {}", e);
        std::process::exit(1);
    }

    cpu.set_debug(trace);
    for &addr in breakpoints {
        cpu.set_breakpoint(addr);
    }
    for value in parse_input(input) {
        cpu.add_input(value);
    }

    let mut remaining = max_steps;
    loop {
        let executed = cpu.run_limited(remaining);
        remaining = remaining.saturating_sub(executed);

        // A breakpoint stop leaves the machine running with step mode
        // armed; report it, step over, and resume.
        if cpu.is_running() && cpu.status().step_mode {
            println!("breakpoint at {:04X}", cpu.pc);
            print_status(&cpu, json);
            if remaining == 0 || !cpu.step() {
                break;
            }
            remaining = remaining.saturating_sub(1);
            continue;
        }
        break;
    }

    if trace {
        println!("--- trace ---");
        for entry in cpu.history() {
            println!("{}", entry);
        }
    }

    let output = cpu.get_output();
    println!("output: {:?}", output);
    print_status(&cpu, json);

    if cpu.is_running() && remaining == 0 {
        println!("reached the step ceiling ({}); use --max-steps to raise it", max_steps);
    }
}

fn print_status(cpu: &Cpu, json: bool) {
    let status = cpu.status();
    if json {
        match serde_json::to_string_pretty(&status) {
            Ok(rendered) => println!("{}", rendered),
            Err(e) => {
                eprintln!("failed to render status: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    println!(
        "pc={:04X} A={} B={} C={} zero={} negative={} overflow={} carry={} state={:?} executed={}",
        status.pc,
        status.registers.a,
        status.registers.b,
        status.registers.c,
        status.flags.zero,
        status.flags.negative,
        status.flags.overflow,
        status.flags.carry,
        status.state,
        status.instruction_count,
    );
}

fn parse_input(input: Option<&str>) -> Vec<u8> {
    let Some(input) = input else {
        return Vec::new();
    };

    let mut values = Vec::new();
    for token in input.split(',') {
        match token.trim().parse::<u8>() {
            Ok(value) => values.push(value),
            Err(_) => {
                eprintln!("invalid input byte: {}", token.trim());
                std::process::exit(1);
            }
        }
    }
    values
}

fn assemble_file(path: &str, listing: bool) {
    let source = read_source(path);
    let (cells, errors) = assemble(&source);

    if listing {
        print!("{}", create_listing(&source, &cells));
    } else {
        print!("{}", disassemble(&cells));
    }

    if !errors.is_empty() {
        for error in &errors {
            eprintln!("error: {}", error);
        }
        std::process::exit(1);
    }
}

fn show_samples(name: Option<&str>, run: bool) {
    let Some(name) = name else {
        for sample in samples() {
            println!("{:<18} {}", sample.name, sample.description);
        }
        return;
    };

    let Some(sample) = find_sample(name) else {
        eprintln!("no sample named {}", name);
        std::process::exit(1);
    };

    if run {
        let cells = assemble_or_exit(sample.source);
        run_program(&cells, 10_000, false, None, &[], false);
    } else {
        print!("{}", sample.source);
    }
}
