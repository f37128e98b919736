//! stackjit CLI
//!
//! Compiles one function of a bytecode program and prints the lowered IR,
//! the optimized and allocated IR, an assembly listing, or raw machine code.

use clap::{Parser, ValueEnum};
use colored::Colorize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use stackjit::error::CompileError;
use stackjit::{bytecode, compile_ir, ir, x64, CompileOptions, Function, HelperTable};

#[derive(Parser)]
#[command(name = "stackjit")]
#[command(version)]
#[command(about = "Optimizing x86-64 backend for stack bytecode", long_about = None)]
struct Cli {
    /// Input program (`-` reads stdin)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Indices selecting a nested function (default: the top level)
    #[arg(value_name = "PATH")]
    path: Vec<usize>,

    /// Input encoding
    #[arg(long, value_enum, default_value_t = Format::Bytecode)]
    format: Format,

    /// What to print
    #[arg(long, value_enum, default_value_t = Emit::Asm)]
    emit: Emit,

    /// Report statically provable runtime errors at compile time
    #[arg(long)]
    report_errors: bool,

    /// Skip the optimization passes
    #[arg(long)]
    no_optimize: bool,

    /// Size of the register pool
    #[arg(long, value_name = "N")]
    registers: Option<usize>,

    /// JSON file with compile options
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// How to print errors
    #[arg(long, value_enum, default_value_t = ErrorFormat::Human)]
    error_format: ErrorFormat,

    /// Output file path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log passes (-v) and allocation decisions (-vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Bytecode,
    Json,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// IR straight out of lowering
    Lowered,
    /// Optimized IR with registers
    Ir,
    /// Assembly listing
    Asm,
    /// Raw machine code
    Bin,
}

#[derive(Clone, Copy, ValueEnum)]
enum ErrorFormat {
    Human,
    Json,
}

/// Failure of a CLI step
enum Failure {
    Io(String),
    Compile(CompileError),
}

impl From<CompileError> for Failure {
    fn from(e: CompileError) -> Self {
        Failure::Compile(e)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure::Io(message)) => {
            eprintln!("{}: {}", "error".red().bold(), message);
            ExitCode::FAILURE
        }
        Err(Failure::Compile(e)) => {
            match cli.error_format {
                ErrorFormat::Json => eprintln!("{}", e.to_diagnostic().to_json()),
                ErrorFormat::Human => {
                    let label = if e.is_internal() {
                        "internal error"
                    } else {
                        "error"
                    };
                    eprintln!("{}[{}]: {}", label.red().bold(), e.code(), e);
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn read_input(file: &Path) -> Result<String, Failure> {
    if file.as_os_str() == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| Failure::Io(format!("could not read stdin: {}", e)))?;
        return Ok(text);
    }
    fs::read_to_string(file)
        .map_err(|e| Failure::Io(format!("could not read '{}': {}", file.display(), e)))
}

fn load_options(cli: &Cli) -> Result<CompileOptions, Failure> {
    let mut options = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| {
                Failure::Io(format!("could not read '{}': {}", path.display(), e))
            })?;
            CompileOptions::from_json(&text)?
        }
        None => CompileOptions::default(),
    };
    if cli.report_errors {
        options.report_compile_errors = true;
    }
    if cli.no_optimize {
        options.optimize = false;
    }
    if let Some(registers) = cli.registers {
        options.registers = registers;
    }
    options.validate()?;
    Ok(options)
}

/// One line per live operand: interval and register
fn describe_allocation(func: &ir::IrFunction) -> String {
    let mut out = String::from("allocation:\n");
    for id in func.operand_ids() {
        let op = func.operand(id);
        if !op.has_live_range() || op.slot().is_none() {
            continue;
        }
        let end = if op.is_dead() {
            "-".to_string()
        } else {
            op.live_end.to_string()
        };
        let place = match op.reg {
            Some(reg) => reg.to_string(),
            None => "memory".to_string(),
        };
        out.push_str(&format!(
            "  {:12} [{}, {}] {} {}\n",
            func.operand_name(id),
            op.live_start,
            end,
            place,
            op.types
        ));
    }
    out
}

fn run(cli: &Cli) -> Result<(), Failure> {
    let options = load_options(cli)?;
    let text = read_input(&cli.file)?;
    let program = match cli.format {
        Format::Bytecode => bytecode::parse(&text)?,
        Format::Json => Function::from_json(&text)?,
    };
    let function = program.select(&cli.path)?;

    let output: Vec<u8> = match cli.emit {
        Emit::Lowered => ir::lower_function(function)?.to_string().into_bytes(),
        Emit::Ir => {
            let func = compile_ir(function, &options)?;
            format!("{}\n{}", func, describe_allocation(&func)).into_bytes()
        }
        Emit::Asm | Emit::Bin => {
            let func = compile_ir(function, &options)?;
            let native = x64::generate(&func, &HelperTable::new())?;
            if cli.emit == Emit::Bin {
                native.code
            } else {
                let mut text = native.listing.join("\n");
                text.push('\n');
                text.into_bytes()
            }
        }
    };

    match &cli.output {
        Some(path) => {
            fs::write(path, &output).map_err(|e| {
                Failure::Io(format!("could not write '{}': {}", path.display(), e))
            })?;
            eprintln!(
                "{} {} ({} bytes)",
                "Wrote".green().bold(),
                path.display(),
                output.len()
            );
        }
        None => io::stdout()
            .write_all(&output)
            .map_err(|e| Failure::Io(format!("could not write stdout: {}", e)))?,
    }
    Ok(())
}
