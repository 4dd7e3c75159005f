//! The content-addressed snapshot store: one file per object under category
//! directories, plus the `index.json` manifest.
//!
//! Before any write the existing file is re-read and re-hashed (a stored
//! hash is never trusted); bytes go to disk only on mismatch, so a no-op run
//! produces zero filesystem writes. Writes are temp-then-rename, so a crash
//! leaves either the previous or the fully-written file, never a torn one.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::canonical::canonical_json;
use super::hash::{content_hash, fingerprint};
use super::index::{
    FUNCTIONS_VERSION, IndexEntry, ParserInfo, SCHEMA_VERSION, SnapshotIndex, SnapshotStats,
};

pub const INDEX_FILE: &str = "index.json";

/// Snapshot object categories, each with its own directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Category {
    Procedures,
    Functions,
    TableTypes,
    UserDefinedTypes,
    Tables,
    Views,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Procedures,
        Category::Functions,
        Category::TableTypes,
        Category::UserDefinedTypes,
        Category::Tables,
        Category::Views,
    ];

    pub fn dir(&self) -> &'static str {
        match self {
            Category::Procedures => "procedures",
            Category::Functions => "functions",
            Category::TableTypes => "tabletypes",
            Category::UserDefinedTypes => "types",
            Category::Tables => "tables",
            Category::Views => "views",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Canonical bytes matched the file on disk; nothing written.
    Unchanged,
    Updated,
    Created,
}

/// Scope of a partial run: only matching objects are processed, and pruning
/// is restricted to matching files.
#[derive(Debug, Clone)]
pub struct ObjectFilter {
    needle: String,
}

impl ObjectFilter {
    pub fn new(pattern: &str) -> Self {
        Self {
            needle: pattern.to_lowercase(),
        }
    }

    pub fn matches(&self, schema: &str, name: &str) -> bool {
        format!("{schema}.{name}").to_lowercase().contains(&self.needle)
    }

    fn matches_file(&self, file_name: &str) -> bool {
        file_name.to_lowercase().contains(&self.needle)
    }
}

fn object_file_name(schema: &str, name: &str) -> String {
    let sanitized: String = format!("{schema}.{name}")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '$' | '#') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{sanitized}.json")
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct ObjectProbe {
    schema: String,
    name: String,
}

pub struct SnapshotStore {
    root: PathBuf,
    filter: Option<ObjectFilter>,
    seen: BTreeMap<&'static str, BTreeSet<String>>,
    entries: BTreeMap<&'static str, Vec<IndexEntry>>,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub pruned: usize,
}

impl SnapshotStore {
    pub fn open(root: impl Into<PathBuf>, filter: Option<ObjectFilter>) -> Self {
        Self {
            root: root.into(),
            filter,
            seen: BTreeMap::new(),
            entries: BTreeMap::new(),
            created: 0,
            updated: 0,
            unchanged: 0,
            pruned: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn object_path(&self, category: Category, schema: &str, name: &str) -> PathBuf {
        self.root
            .join(category.dir())
            .join(object_file_name(schema, name))
    }

    /// Serialize, hash and (only when changed) atomically write one object.
    pub fn write_object<T: Serialize>(
        &mut self,
        category: Category,
        schema: &str,
        name: &str,
        value: &T,
    ) -> Result<WriteOutcome> {
        let bytes = canonical_json(value)?;
        let hash = content_hash(&bytes);
        let file = object_file_name(schema, name);
        let path = self.root.join(category.dir()).join(&file);

        self.seen
            .entry(category.dir())
            .or_default()
            .insert(file.clone());
        self.entries
            .entry(category.dir())
            .or_default()
            .push(IndexEntry {
                schema: schema.to_string(),
                name: name.to_string(),
                file,
                hash: hash.clone(),
            });

        // Never trust a stored hash: re-read and re-hash what is on disk.
        let existing = match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::io(&path, e)),
        };
        if let Some(existing) = &existing {
            if content_hash(existing) == hash {
                self.unchanged += 1;
                return Ok(WriteOutcome::Unchanged);
            }
        }

        atomic_write(&path, &bytes)?;
        if existing.is_some() {
            self.updated += 1;
            Ok(WriteOutcome::Updated)
        } else {
            self.created += 1;
            Ok(WriteOutcome::Created)
        }
    }

    /// Delete files from previous runs that are absent from the current write
    /// set. In a filtered run pruning is restricted to matching files.
    pub fn prune(&mut self) -> Result<usize> {
        let mut removed = 0usize;
        for category in Category::ALL {
            let dir = self.root.join(category.dir());
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::io(&dir, e)),
            };
            let seen = self.seen.get(category.dir());
            for entry in entries {
                let entry = entry.map_err(|e| Error::io(&dir, e))?;
                let file_name = entry.file_name().to_string_lossy().to_string();
                if !file_name.ends_with(".json") {
                    continue;
                }
                if seen.is_some_and(|s| s.contains(&file_name)) {
                    continue;
                }
                if let Some(filter) = &self.filter {
                    if !filter.matches_file(&file_name) {
                        continue;
                    }
                }
                fs::remove_file(entry.path()).map_err(|e| Error::io(entry.path(), e))?;
                removed += 1;
            }
        }
        self.pruned = removed;
        Ok(removed)
    }

    /// Build and write `index.json`. Entries cover the whole snapshot: in a
    /// filtered run, untouched files on disk are re-read and re-hashed so the
    /// manifest and Fingerprint always describe the full object set.
    pub fn write_index(&mut self, parser: ParserInfo) -> Result<SnapshotIndex> {
        self.absorb_disk_entries()?;

        let mut parts = Vec::new();
        for (dir, entries) in &self.entries {
            for e in entries {
                parts.push(format!("{}:{}.{}:{}", dir, e.schema, e.name, e.hash));
            }
        }
        let fingerprint = fingerprint(parts);

        let mut take = |category: Category| -> Vec<IndexEntry> {
            let mut entries = self.entries.remove(category.dir()).unwrap_or_default();
            entries.sort_by(|a, b| (&a.schema, &a.name).cmp(&(&b.schema, &b.name)));
            entries
        };
        let procedures = take(Category::Procedures);
        let functions = take(Category::Functions);
        let table_types = take(Category::TableTypes);
        let user_defined_types = take(Category::UserDefinedTypes);
        let tables = take(Category::Tables);
        let views = take(Category::Views);

        let index = SnapshotIndex {
            schema_version: SCHEMA_VERSION,
            fingerprint,
            parser,
            stats: SnapshotStats {
                procedures: procedures.len(),
                functions: functions.len(),
                table_types: table_types.len(),
                user_defined_types: user_defined_types.len(),
                tables: tables.len(),
                views: views.len(),
            },
            procedures,
            table_types,
            user_defined_types,
            tables,
            views,
            functions,
            functions_version: FUNCTIONS_VERSION,
        };

        let bytes = canonical_json(&index)?;
        let path = self.index_path();
        let unchanged = fs::read(&path)
            .map(|existing| content_hash(&existing) == content_hash(&bytes))
            .unwrap_or(false);
        if !unchanged {
            atomic_write(&path, &bytes)?;
        }
        Ok(index)
    }

    fn absorb_disk_entries(&mut self) -> Result<()> {
        for category in Category::ALL {
            let dir = self.root.join(category.dir());
            let read_dir = match fs::read_dir(&dir) {
                Ok(read_dir) => read_dir,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::io(&dir, e)),
            };
            for entry in read_dir {
                let entry = entry.map_err(|e| Error::io(&dir, e))?;
                let file_name = entry.file_name().to_string_lossy().to_string();
                if !file_name.ends_with(".json") {
                    continue;
                }
                if self
                    .seen
                    .get(category.dir())
                    .is_some_and(|s| s.contains(&file_name))
                {
                    continue;
                }
                let bytes = fs::read(entry.path()).map_err(|e| Error::io(entry.path(), e))?;
                let probe: ObjectProbe = match serde_json::from_slice(&bytes) {
                    Ok(probe) => probe,
                    Err(_) => continue,
                };
                if probe.schema.is_empty() && probe.name.is_empty() {
                    continue;
                }
                self.entries
                    .entry(category.dir())
                    .or_default()
                    .push(IndexEntry {
                        schema: probe.schema,
                        name: probe.name,
                        file: file_name,
                        hash: content_hash(&bytes),
                    });
            }
        }
        Ok(())
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(|e| Error::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| Error::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RoutineSnapshot;

    fn snapshot(schema: &str, name: &str) -> RoutineSnapshot {
        RoutineSnapshot {
            schema: schema.into(),
            name: name.into(),
            ..RoutineSnapshot::default()
        }
    }

    #[test]
    fn test_write_then_rewrite_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SnapshotStore::open(dir.path(), None);
        let doc = snapshot("dbo", "GetUser");
        assert_eq!(
            store
                .write_object(Category::Procedures, "dbo", "GetUser", &doc)
                .unwrap(),
            WriteOutcome::Created
        );

        let mut store = SnapshotStore::open(dir.path(), None);
        assert_eq!(
            store
                .write_object(Category::Procedures, "dbo", "GetUser", &doc)
                .unwrap(),
            WriteOutcome::Unchanged
        );
        assert_eq!(store.unchanged, 1);
    }

    #[test]
    fn test_prune_removes_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SnapshotStore::open(dir.path(), None);
        store
            .write_object(Category::Procedures, "dbo", "Old", &snapshot("dbo", "Old"))
            .unwrap();

        let mut store = SnapshotStore::open(dir.path(), None);
        store
            .write_object(Category::Procedures, "dbo", "New", &snapshot("dbo", "New"))
            .unwrap();
        assert_eq!(store.prune().unwrap(), 1);
        assert!(!store.object_path(Category::Procedures, "dbo", "Old").exists());
        assert!(store.object_path(Category::Procedures, "dbo", "New").exists());
    }

    #[test]
    fn test_filtered_prune_keeps_nonmatching_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SnapshotStore::open(dir.path(), None);
        store
            .write_object(Category::Procedures, "dbo", "KeepMe", &snapshot("dbo", "KeepMe"))
            .unwrap();
        store
            .write_object(Category::Procedures, "dbo", "SalesOld", &snapshot("dbo", "SalesOld"))
            .unwrap();

        let mut store = SnapshotStore::open(dir.path(), Some(ObjectFilter::new("sales")));
        assert_eq!(store.prune().unwrap(), 1);
        assert!(store.object_path(Category::Procedures, "dbo", "KeepMe").exists());
    }

    #[test]
    fn test_index_covers_files_outside_filter() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SnapshotStore::open(dir.path(), None);
        store
            .write_object(Category::Procedures, "dbo", "A", &snapshot("dbo", "A"))
            .unwrap();
        store
            .write_object(Category::Procedures, "dbo", "B", &snapshot("dbo", "B"))
            .unwrap();
        let full = store.write_index(ParserInfo::default()).unwrap();

        // A filtered run touching only A still indexes B.
        let mut store = SnapshotStore::open(dir.path(), Some(ObjectFilter::new("dbo.a")));
        store
            .write_object(Category::Procedures, "dbo", "A", &snapshot("dbo", "A"))
            .unwrap();
        let filtered = store.write_index(ParserInfo::default()).unwrap();
        assert_eq!(filtered.procedures.len(), 2);
        assert_eq!(filtered.fingerprint, full.fingerprint);
    }

    #[test]
    fn test_fingerprint_flips_on_object_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SnapshotStore::open(dir.path(), None);
        store
            .write_object(Category::Procedures, "dbo", "P", &snapshot("dbo", "P"))
            .unwrap();
        let first = store.write_index(ParserInfo::default()).unwrap();

        let mut store = SnapshotStore::open(dir.path(), None);
        let mut changed = snapshot("dbo", "P");
        changed.used_fallback = true;
        store
            .write_object(Category::Procedures, "dbo", "P", &changed)
            .unwrap();
        let second = store.write_index(ParserInfo::default()).unwrap();
        assert_ne!(first.fingerprint, second.fingerprint);
    }
}
