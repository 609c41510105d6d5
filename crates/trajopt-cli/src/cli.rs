use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level (RUST_LOG directives are honored too)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print a setup file with every setting at its default
    PrintSetup {
        /// Write to a file instead of stdout
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
    },
    /// Solve the problem described by a setup file
    Solve {
        /// TOML setup file
        #[arg(long, value_hint = ValueHint::FilePath)]
        setup: PathBuf,
        /// Write the solution trajectory as CSV
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
    },
    /// Describe solver settings
    PropertyInfo {
        /// Setting to describe; all settings when omitted
        name: Option<String>,
    },
    /// List the built-in models a setup file can name
    Models,
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
