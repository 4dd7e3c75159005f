//! sprocket: stored-procedure metadata snapshots for code generation.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::*;

#[derive(Parser)]
#[command(
    name = "sprocket",
    version,
    about = "Analyze T-SQL routines into a typed, incremental metadata snapshot"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze routines and write the snapshot
    Snapshot(commands::snapshot::SnapshotArgs),
    /// Show fingerprint and object counts of the current snapshot
    Status(commands::status::StatusArgs),
    /// Verify the snapshot is up to date (CI guard)
    Check(commands::check::CheckArgs),
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Snapshot(args) => commands::snapshot::run(args),
        Command::Status(args) => commands::status::run(args),
        Command::Check(args) => commands::check::run(args),
    };
    if let Err(e) = result {
        eprintln!("{} {e:#}", "✗".red().bold());
        std::process::exit(1);
    }
}
