use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;

use config::Paths;

mod accounts;
mod categories;
mod config;
mod dump;
mod explain;
mod jsonc;
mod model;
mod ofx;
mod pipeline;
mod process;
mod processed;
mod statement;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    paths: Paths,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print transactions not seen by earlier runs.
    Process(process::Command),
    /// Print every transaction in a statement.
    Dump(dump::Command),
    /// Show which rule categorizes a transaction name.
    Explain(explain::Command),
}

fn main() -> Result<()> {
    fn get_rust_log() -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into())
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(get_rust_log()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Process(cmd) => process::execute_command(&cli.paths, cmd),
        Commands::Dump(cmd) => dump::execute_command(&cli.paths, cmd),
        Commands::Explain(cmd) => explain::execute_command(&cli.paths, cmd),
    }
}
