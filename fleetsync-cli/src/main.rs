//! FleetSync CLI - command-line interface
//!
//! Runs a synthetic fleet against the engine and manages the INI
//! configuration file.

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;

#[derive(Debug, Parser)]
#[command(name = "fleetsync", version, about = "Fleet telemetry sync and adaptive LOD engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a synthetic fleet and print engine diagnostics
    Simulate {
        /// Number of simulated units
        #[arg(long, default_value_t = 250)]
        units: usize,

        /// Simulation length in seconds
        #[arg(long, default_value_t = 30)]
        duration: u64,

        /// Telemetry update interval per unit in milliseconds
        #[arg(long, default_value_t = 100)]
        update_ms: u64,

        /// Peak frame time of the degrade/recover profile in milliseconds
        #[arg(long, default_value_t = 32)]
        peak_frame_ms: u64,

        /// Configuration file (defaults to ~/.config/fleetsync/config.ini)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Log filter, overrides the configured level (e.g. debug, fleetsync=trace)
        #[arg(long)]
        log_level: Option<String>,
    },

    /// View and modify configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate {
            units,
            duration,
            update_ms,
            peak_frame_ms,
            config,
            log_level,
        } => commands::simulate::run(SimulateArgs {
            units,
            duration_secs: duration,
            update_ms,
            peak_frame_ms,
            config,
            log_level,
        }),
        Commands::Config(command) => commands::config::run(command),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
