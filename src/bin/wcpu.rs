use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use wcpu::{Cpu, DirLoader, ProgramImage};

#[derive(Parser)]
#[command(name = "wcpu", about = "Reference model of the WASM-subset CPU")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a module and step the CPU until it halts.
    Run {
        /// Path to a .wasm or .wat file.
        file: PathBuf,
        /// Step ceiling imposed on the run.
        #[arg(long, default_value_t = 1_000_000)]
        steps: u64,
        /// Directory of .wasm modules available for dynamic loading.
        #[arg(long)]
        modules: Option<PathBuf>,
    },
    /// Print the decoded image tables.
    Inspect {
        file: PathBuf,
    },
    /// Write the co-simulation memory image for a module.
    MemImage {
        file: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Total memory size in bytes.
        #[arg(long, default_value_t = 256)]
        size: usize,
    },
    /// Print testbench plusargs from a source's `;;` annotations.
    Expects {
        file: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            file,
            steps,
            modules,
        } => run(&file, steps, modules.as_deref()),
        Command::Inspect { file } => inspect(&file),
        Command::MemImage { file, output, size } => mem_image(&file, &output, size),
        Command::Expects { file } => expects(&file),
    }
}

/// Read a module, converting WAT text to binary when needed.
fn module_bytes(file: &Path) -> anyhow::Result<Vec<u8>> {
    if file.extension().is_some_and(|ext| ext == "wat") {
        let text = std::fs::read_to_string(file)?;
        Ok(wat::parse_str(&text)?)
    } else {
        Ok(std::fs::read(file)?)
    }
}

fn run(file: &Path, steps: u64, modules: Option<&Path>) -> anyhow::Result<()> {
    let image = ProgramImage::from_bytes(&module_bytes(file)?)?;
    let mut cpu = match modules {
        Some(dir) => Cpu::with_loader(image, Box::new(DirLoader::new(dir)?))?,
        None => Cpu::new(image)?,
    };
    let taken = cpu.run(steps)?;
    println!("halted after {taken} steps");
    println!("operand stack: {:?}", cpu.operand_stack());
    Ok(())
}

fn inspect(file: &Path) -> anyhow::Result<()> {
    let image = ProgramImage::from_bytes(&module_bytes(file)?)?;
    match image.start() {
        Some(id) => println!("start function: {id}"),
        None => println!("start function: none"),
    }
    let funcs = image.func_addrs().iter().zip(image.func_arities());
    for (id, (addr, arity)) in funcs.enumerate() {
        match addr {
            Some(addr) => println!("func {id}: arity {arity}, code at {addr:#x}"),
            None => println!("func {id}: arity {arity}, imported"),
        }
    }
    Ok(())
}

fn mem_image(file: &Path, output: &Path, size: usize) -> anyhow::Result<()> {
    let bytes = module_bytes(file)?;
    wcpu::memimage::write(&bytes, size, output)?;
    println!("wrote {size} bytes of memory to {}", output.display());
    Ok(())
}

fn expects(file: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)?;
    let pairs = wcpu::expect::parse(&text)?;
    for arg in wcpu::expect::plusargs(&pairs) {
        println!("{arg}");
    }
    Ok(())
}
