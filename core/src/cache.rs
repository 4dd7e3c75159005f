//! The local tick cache: skip detection only, independent of content hashes.
//!
//! Keyed by a run fingerprint derived from project identity, included
//! schemas and routine count; a different fingerprint starts a fresh cache
//! namespace with no cross-fingerprint reuse.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::snapshot::fingerprint;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CacheEntry {
    pub schema: String,
    pub name: String,
    pub modified_ticks: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct RunCache {
    pub fingerprint: String,
    pub created_utc: DateTime<Utc>,
    pub procedures: Vec<CacheEntry>,
}

impl Default for RunCache {
    fn default() -> Self {
        Self {
            fingerprint: String::new(),
            created_utc: DateTime::<Utc>::UNIX_EPOCH,
            procedures: Vec::new(),
        }
    }
}

impl RunCache {
    /// Load a cache file; any unreadable or unparsable cache is treated as
    /// absent, never as an error.
    pub fn load(path: &Path) -> Option<RunCache> {
        let text = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&text).ok()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        std::fs::write(path, json).map_err(|e| Error::io(path, e))
    }

    pub fn lookup_ticks(&self, schema: &str, name: &str) -> Option<i64> {
        self.procedures
            .iter()
            .find(|e| e.schema.eq_ignore_ascii_case(schema) && e.name.eq_ignore_ascii_case(name))
            .map(|e| e.modified_ticks)
    }
}

/// The cache namespace key: project identity, included schemas and routine
/// count. Any change starts a fresh namespace.
pub fn run_fingerprint(project: &str, schemas: &[String], routine_count: usize) -> String {
    let mut parts: Vec<String> = schemas.iter().map(|s| s.to_lowercase()).collect();
    parts.push(format!("project:{project}"));
    parts.push(format!("routines:{routine_count}"));
    fingerprint(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = RunCache {
            fingerprint: run_fingerprint("demo", &["dbo".into()], 3),
            created_utc: Utc::now(),
            procedures: vec![CacheEntry {
                schema: "dbo".into(),
                name: "GetUser".into(),
                modified_ticks: 42,
            }],
        };
        cache.save(&path).unwrap();
        let back = RunCache::load(&path).unwrap();
        assert_eq!(back.fingerprint, cache.fingerprint);
        assert_eq!(back.lookup_ticks("DBO", "getuser"), Some(42));
    }

    #[test]
    fn test_fingerprint_depends_on_inputs() {
        let base = run_fingerprint("demo", &["dbo".into()], 3);
        assert_ne!(base, run_fingerprint("demo", &["dbo".into()], 4));
        assert_ne!(base, run_fingerprint("other", &["dbo".into()], 3));
        assert_ne!(base, run_fingerprint("demo", &["dbo".into(), "sales".into()], 3));
    }

    #[test]
    fn test_missing_cache_is_none() {
        assert!(RunCache::load(Path::new("/nonexistent/cache.json")).is_none());
    }
}
