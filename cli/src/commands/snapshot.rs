//! `sprocket snapshot`: run the analysis pipeline and update the snapshot.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use sprocket_core::snapshot::ObjectFilter;
use sprocket_core::source::FileSource;
use sprocket_core::{PipelineOptions, PipelineReport, run_snapshot};

use crate::config::{Config, find_project_root, project_name};

pub const CACHE_FILE: &str = ".sprocket-cache.json";

#[derive(Args)]
pub struct SnapshotArgs {
    /// Project directory (defaults to the nearest sprocket.toml)
    #[arg(long, env = "SPROCKET_PROJECT")]
    pub project: Option<PathBuf>,

    /// Snapshot output directory (default: <project>/snapshot)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Disable the tick cache and re-extract every routine
    #[arg(long)]
    pub no_cache: bool,

    /// Print per-object diagnostics
    #[arg(long, short)]
    pub verbose: bool,

    /// Process only objects whose schema.name contains PATTERN
    #[arg(long, value_name = "PATTERN")]
    pub only: Option<String>,
}

pub fn run(args: SnapshotArgs) -> Result<()> {
    let root = find_project_root(args.project)?;
    let config = Config::load(&root)?;
    let project = project_name(&config, &root);
    let out = args
        .out
        .or_else(|| config.out.as_ref().map(|o| root.join(o)))
        .unwrap_or_else(|| root.join("snapshot"));
    let cache_path = root.join(CACHE_FILE);

    println!(
        "{} Analyzing project '{}' ({})",
        "→".cyan(),
        project.yellow(),
        root.display()
    );

    let source = FileSource::open(&root, &project)
        .with_context(|| format!("cannot open project at {}", root.display()))?;

    let options = PipelineOptions {
        use_cache: !args.no_cache && config.cache.unwrap_or(true),
        included_schemas: config.schemas.clone(),
        filter: args.only.as_deref().map(ObjectFilter::new),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        ..PipelineOptions::default()
    };

    let verbose = args.verbose;
    let report = run_snapshot(&source, &out, Some(&cache_path), &options, |done, total, name| {
        if verbose && total > 0 {
            let pct = done * 100 / total;
            println!("  {} {name}", format!("[{pct:>3}%]").dimmed());
        }
    })?;

    print_summary(&report, &out.display().to_string());
    if verbose {
        print_diagnostics(&report);
    }
    Ok(())
}

fn print_summary(report: &PipelineReport, out: &str) {
    if report.is_noop() {
        println!("{} Snapshot unchanged (zero writes)", "✓".green());
    } else {
        println!("{} Snapshot written to {}", "✓".green().bold(), out);
    }
    println!("  Fingerprint: {}", report.fingerprint.as_str().yellow());
    println!(
        "  Routines: {} ({} extracted, {} cached, {} forwarded)",
        report.routines_total, report.extracted, report.skipped, report.forwarded
    );
    println!(
        "  Columns: {} resolved, {} unresolved, {} nullability upgrades",
        report.columns_resolved, report.columns_unresolved, report.nullability_upgrades
    );
    println!(
        "  Files: {} new, {} updated, {} unchanged, {} pruned",
        report.files_created, report.files_updated, report.files_unchanged, report.files_pruned
    );
    if report.parse_failures > 0 {
        println!(
            "  {} {} routine(s) could not be parsed",
            "⚠".yellow(),
            report.parse_failures
        );
    }
}

fn print_diagnostics(report: &PipelineReport) {
    if report.diagnostics.is_empty() {
        return;
    }
    println!();
    println!("{}", "Diagnostics".cyan().bold());
    for diagnostic in &report.diagnostics {
        println!("  {} {}", "⚠".yellow(), diagnostic);
    }
}
