//! Project configuration: `sprocket.toml` at the project root, merged with
//! CLI flags (flags win).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "sprocket.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project identity; defaults to the directory name.
    pub project: Option<String>,
    /// Schemas to include; empty means all.
    pub schemas: Vec<String>,
    /// Snapshot output directory, relative to the project root.
    pub out: Option<PathBuf>,
    /// Tick-cache toggle (default on).
    pub cache: Option<bool>,
}

impl Config {
    pub fn load(root: &Path) -> Result<Config> {
        let path = root.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                toml::from_str(&text).with_context(|| format!("invalid {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(e).with_context(|| format!("cannot read {}", path.display())),
        }
    }
}

/// Resolve the project root: an explicit directory wins; otherwise walk up
/// from the current directory to the nearest `sprocket.toml`, falling back to
/// the current directory itself.
pub fn find_project_root(explicit: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        anyhow::ensure!(dir.is_dir(), "not a directory: {}", dir.display());
        return Ok(dir);
    }
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    let mut dir = cwd.as_path();
    loop {
        if dir.join(CONFIG_FILE).is_file() {
            return Ok(dir.to_path_buf());
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return Ok(cwd),
        }
    }
}

/// The project display name: configured, or the root directory's name.
pub fn project_name(config: &Config, root: &Path) -> String {
    config
        .project
        .clone()
        .or_else(|| root.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "sprocket".to_string())
}
