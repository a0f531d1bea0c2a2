mod commands;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::fmt;
use std::process;

use fundcast_core::{EngineError, ErrorEnvelope};

use commands::simulate::{PresetsArgs, SimulateArgs, ValidateArgs};

/// Monte Carlo venture fund construction analysis
#[derive(Parser)]
#[command(
    name = "fundcast",
    version,
    about = "Monte Carlo venture fund construction analysis",
    long_about = "Simulates the terminal multiple distribution (MOIC/TVPI) of a \
                  venture fund from its construction: stage allocations, check \
                  sizes, follow-on reserve, and market assumptions."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Monte Carlo simulation for a fund request
    Simulate(SimulateArgs),
    /// Validate a request and print the derived fund construction
    Validate(ValidateArgs),
    /// Print a preset market transition table
    Presets(PresetsArgs),
    /// Print version information
    Version,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

/// Command failures: engine errors keep their machine-readable envelope,
/// everything else degrades to a message.
#[derive(Debug)]
pub enum CliError {
    Engine(EngineError),
    Other(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Engine(err) => write!(f, "{err}"),
            CliError::Other(message) => f.write_str(message),
        }
    }
}

impl From<EngineError> for CliError {
    fn from(err: EngineError) -> Self {
        CliError::Engine(err)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Other(format!("failed to parse request: {err}"))
    }
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate(args) => commands::simulate::run_simulate(args),
        Commands::Validate(args) => commands::simulate::run_validate(args),
        Commands::Presets(args) => commands::simulate::run_presets(args),
        Commands::Version => {
            println!("fundcast {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            match cli.output {
                OutputFormat::Json => output::json::print_json(&value),
                OutputFormat::Table => output::table::print_table(&value),
                OutputFormat::Csv => output::csv_out::print_csv(&value),
                OutputFormat::Minimal => output::minimal::print_minimal(&value),
            }
            process::exit(0);
        }
        Err(err) => {
            if let (CliError::Engine(engine_err), OutputFormat::Json) = (&err, &cli.output) {
                let envelope = ErrorEnvelope::from(engine_err);
                if let Ok(json) = serde_json::to_string_pretty(&envelope) {
                    println!("{json}");
                }
            }
            eprintln!("{}: {}", "error".red().bold(), err);
            process::exit(1);
        }
    }
}
