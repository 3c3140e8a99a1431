//! LegoVM - CLI

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use legovm::util::config::{load_config, load_user_config, VmConfig};
use legovm::util::logger::{self, LogLevel};
use legovm::{inspect_file, ImageReport, NAME, VERSION};

/// RXE program image loader and clump scheduler
#[derive(Parser, Debug)]
#[command(name = "legovm")]
#[command(author = "LegoVM Team")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Config file (RON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Memory pool capacity in bytes
    #[arg(long, value_name = "BYTES")]
    memory: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the header, region layout and clump table of an image
    Inspect {
        /// Image file to inspect
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Check that an image loads
    Check {
        /// Image file to check
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print version information
    Version,
}

fn resolve_config(args: &Args) -> Result<VmConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?,
        None => load_user_config().context("Failed to read user config")?,
    };
    config.apply_env().context("Invalid LEGOVM_* environment")?;
    if let Some(memory) = args.memory {
        config.memory_capacity = memory;
    }
    if args.verbose {
        config.log_level = "debug".to_string();
    }
    Ok(config)
}

fn print_report(
    path: &Path,
    report: &ImageReport,
) {
    let header = &report.header;
    println!("=== {} ({} bytes) ===\n", path.display(), report.size);

    println!("--- Header ---");
    println!("Version: {:#06x}", header.version);
    println!("Dstoc entries: {}", header.dstoc_entry_count);
    println!(
        "Dataspace: {} bytes initial, {} bytes static",
        header.ds_initial_size, header.ds_initial_static_size
    );
    println!("Defaults block: {} bytes", header.defaults_block_size);
    println!("Clumps: {}", header.clump_count);
    println!("Code words: {}\n", header.code_word_count);

    println!("--- Layout ---");
    let layout = &report.layout;
    for (name, region) in [
        ("dstoc", layout.dstoc),
        ("defaults", layout.defaults),
        ("clump records", layout.clump_records),
        ("dependencies", layout.dependencies),
        ("codespace", layout.codespace),
    ] {
        println!(
            "  {:<14} {:#06x}..{:#06x} ({} bytes)",
            name,
            region.offset,
            region.end(),
            region.len
        );
    }
    println!();

    println!(
        "--- Clumps ({} active at load) ---",
        report.num_active_clumps
    );
    for (i, clump) in report.clumps.iter().enumerate() {
        println!(
            "  [{:3}] fire_count={} start_pc={:#06x} dependents={:#06x}+{}",
            i,
            clump.fire_count(),
            clump.start_pc(),
            clump.dependents_start(),
            clump.dependents_len()
        );
    }
    if report.clumps.is_empty() {
        println!("  (empty)");
    }
    println!("\nMemory used at load: {} bytes", report.memory_used);
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    let level: LogLevel = config.log_level().context("Invalid log level")?;
    logger::init_with_level(level);

    if args.verbose {
        eprintln!("{} version: {}", NAME, VERSION);
        eprintln!("Host: {}", std::env::consts::OS);
    }

    match &args.command {
        Commands::Inspect { file, json } => {
            let report = inspect_file(file, &config)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(file, &report);
            }
        }
        Commands::Check { file } => {
            let report = inspect_file(file, &config)?;
            eprintln!(
                "Check passed: {} clumps, {} active",
                report.clumps.len(),
                report.num_active_clumps
            );
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}
