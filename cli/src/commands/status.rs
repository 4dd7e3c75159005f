//! `sprocket status`: show what the current snapshot contains.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use colored::*;
use sprocket_core::snapshot::{INDEX_FILE, SnapshotIndex};

use crate::config::{Config, find_project_root};

#[derive(Args)]
pub struct StatusArgs {
    /// Project directory (defaults to the nearest sprocket.toml)
    #[arg(long, env = "SPROCKET_PROJECT")]
    pub project: Option<PathBuf>,

    /// Snapshot directory (default: <project>/snapshot)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Print the raw index as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let root = find_project_root(args.project)?;
    let config = Config::load(&root)?;
    let out = args
        .out
        .or_else(|| config.out.as_ref().map(|o| root.join(o)))
        .unwrap_or_else(|| root.join("snapshot"));

    let index_path = out.join(INDEX_FILE);
    let Some(index) = SnapshotIndex::load(&index_path)? else {
        bail!(
            "no snapshot at {}; run {} first",
            out.display(),
            "sprocket snapshot".cyan()
        );
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&index)?);
        return Ok(());
    }

    println!("{}", "📋 Snapshot Status".cyan().bold());
    println!();
    println!("  Directory: {}", out.display().to_string().yellow());
    println!("  Fingerprint: {}", index.fingerprint.as_str().green());
    println!(
        "  Parser: tool {} / result sets v{}",
        index.parser.tool_version, index.parser.result_set_parser_version
    );
    println!();
    println!("  Procedures: {}", index.stats.procedures);
    println!("  Functions: {}", index.stats.functions);
    println!("  Table types: {}", index.stats.table_types);
    println!("  Scalar types: {}", index.stats.user_defined_types);
    println!("  Tables: {}", index.stats.tables);
    println!("  Views: {}", index.stats.views);
    Ok(())
}
