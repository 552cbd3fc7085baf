//! CLI entry point for the `socgen` SoC generator.

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{error, info};
use serde as _;
use serde_json as _;
use soc_builder::{assemble_platform, build, render_memory_map_json, trace_reset, RequestWindow};
use soc_core::SocDescription;
#[cfg(test)]
use tempfile as _;

#[derive(Parser)]
#[command(name = "socgen", version, about = "ice40-hx8k SoC address map and reset generator")]
struct Cli {
    /// Log every elaboration step
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the SoC and write linker, header, CSV and JSON artifacts
    Build {
        /// Platform TOML file (default: built-in ice40-hx8k board)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output directory
        #[arg(short, long, default_value = "generated")]
        out: PathBuf,
    },
    /// Print the memory map, constants and CSR banks
    Show {
        /// Platform TOML file (default: built-in ice40-hx8k board)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the JSON memory map instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Simulate power-on and external reset, printing reset transitions
    ResetTrace {
        /// Platform TOML file (default: built-in ice40-hx8k board)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Number of system clock edges to simulate
        #[arg(long, default_value_t = 8192)]
        edges: u64,
        /// External reset request window START..END (repeatable)
        #[arg(long = "request")]
        requests: Vec<RequestWindow>,
    },
}

fn print_summary(soc: &SocDescription) {
    println!("{} @ {} Hz", soc.device, soc.sys_clk_hz);
    println!();
    println!("{:<12} {:<10} {:<10} kind", "region", "base", "size");
    for region in soc.memory_map().iter() {
        println!(
            "{:<12} {:#010x} {:#010x} {}",
            region.name, region.base, region.size, region.kind
        );
    }
    println!();
    for constant in &soc.constants {
        println!("{:<28} {:#x}", constant.name, constant.value);
    }
    println!();
    for bank in soc.csr.iter() {
        println!("csr {:>2} {}", bank.index, bank.name);
    }
    println!();
    print!("{}", soc.clock_tree);
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Build { config, out } => {
            let report = build(config.as_deref(), &out)?;
            for path in &report.written {
                println!("{}", path.display());
            }
        }
        Commands::Show { config, json } => {
            let soc = assemble_platform(config.as_deref())?;
            if json {
                print!("{}", render_memory_map_json(&soc)?);
            } else {
                print_summary(&soc);
            }
        }
        Commands::ResetTrace {
            config,
            edges,
            requests,
        } => {
            let soc = assemble_platform(config.as_deref())?;
            info!(
                "tracing {edges} edges, POR {} cycles",
                soc.reset.por_cycles
            );
            for event in trace_reset(soc.reset_sequencer()?, edges, &requests) {
                println!("{event}");
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = run(cli) {
        error!("{err:#}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Commands};

    #[test]
    fn parses_reset_trace_windows() {
        let cli = Cli::try_parse_from([
            "socgen",
            "reset-trace",
            "--edges",
            "100",
            "--request",
            "10..20",
            "--request",
            "50..51",
        ])
        .expect("valid arguments");
        match cli.command {
            Commands::ResetTrace {
                edges, requests, ..
            } => {
                assert_eq!(edges, 100);
                assert_eq!(requests.len(), 2);
                assert_eq!(requests[1].assert_at, 50);
            }
            _ => panic!("expected reset-trace"),
        }
    }

    #[test]
    fn build_defaults_output_directory() {
        let cli = Cli::try_parse_from(["socgen", "-v", "build"]).expect("valid arguments");
        assert!(cli.verbose);
        match cli.command {
            Commands::Build { config, out } => {
                assert!(config.is_none());
                assert_eq!(out, std::path::PathBuf::from("generated"));
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn malformed_window_is_rejected() {
        assert!(Cli::try_parse_from(["socgen", "reset-trace", "--request", "20..10"]).is_err());
    }
}
