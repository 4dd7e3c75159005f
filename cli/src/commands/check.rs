//! `sprocket check`: verify the committed snapshot matches the sources.
//!
//! Runs the pipeline into a scratch directory and compares Fingerprints;
//! exits non-zero when the snapshot is stale. Meant for CI.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::*;
use sprocket_core::snapshot::{INDEX_FILE, SnapshotIndex};
use sprocket_core::source::FileSource;
use sprocket_core::{PipelineOptions, run_snapshot};

use crate::config::{Config, find_project_root, project_name};

#[derive(Args)]
pub struct CheckArgs {
    /// Project directory (defaults to the nearest sprocket.toml)
    #[arg(long, env = "SPROCKET_PROJECT")]
    pub project: Option<PathBuf>,

    /// Snapshot directory to verify (default: <project>/snapshot)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn run(args: CheckArgs) -> Result<()> {
    let root = find_project_root(args.project)?;
    let config = Config::load(&root)?;
    let project = project_name(&config, &root);
    let out = args
        .out
        .or_else(|| config.out.as_ref().map(|o| root.join(o)))
        .unwrap_or_else(|| root.join("snapshot"));

    let committed = SnapshotIndex::load(&out.join(INDEX_FILE))?
        .map(|index| index.fingerprint)
        .unwrap_or_default();

    let source = FileSource::open(&root, &project)
        .with_context(|| format!("cannot open project at {}", root.display()))?;

    let scratch = std::env::temp_dir().join(format!("sprocket-check-{}", std::process::id()));
    let options = PipelineOptions {
        use_cache: false,
        included_schemas: config.schemas.clone(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        ..PipelineOptions::default()
    };
    let result = run_snapshot(&source, &scratch, None, &options, |_, _, _| {});
    let cleanup = std::fs::remove_dir_all(&scratch);
    let report = result?;
    cleanup.ok();

    if committed == report.fingerprint {
        println!(
            "{} Snapshot is up to date ({})",
            "✓".green(),
            report.fingerprint
        );
        Ok(())
    } else {
        bail!(
            "snapshot is stale: committed {} != current {}; run {}",
            committed,
            report.fingerprint,
            "sprocket snapshot".cyan()
        );
    }
}
