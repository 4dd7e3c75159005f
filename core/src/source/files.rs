//! File-backed metadata source: a project directory with a `schema.json`
//! physical-metadata document and one `.sql` file per routine. File mtimes
//! provide the modified ticks.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::UNIX_EPOCH;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::model::{
    DatabaseSchema, MetaColumn, Parameter, RoutineDescriptor, RoutineKind, ScalarTypeMetadata,
    TableMetadata, TableTypeMetadata,
};

use super::MetadataSource;
use super::params::extract_parameters;

pub const SCHEMA_FILE: &str = "schema.json";

static CREATE_ROUTINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)\bCREATE\s+(?:OR\s+ALTER\s+)?(PROC(?:EDURE)?|FUNCTION)\s+((?:\[[^\]]+\]|[\w$#]+)(?:\s*\.\s*(?:\[[^\]]+\]|[\w$#]+))*)",
    )
    .expect("create routine pattern")
});

struct FileRoutine {
    descriptor: RoutineDescriptor,
    definition: String,
}

pub struct FileSource {
    project: String,
    schema_doc: DatabaseSchema,
    routines: Vec<FileRoutine>,
}

impl FileSource {
    /// Read a project directory: `schema.json` (optional; missing metadata
    /// just means every base-table lookup misses) and all `.sql` files
    /// containing a CREATE PROCEDURE/FUNCTION, recursively.
    pub fn open(root: &Path, project: &str) -> Result<Self> {
        let schema_path = root.join(SCHEMA_FILE);
        let schema_doc = match std::fs::read_to_string(&schema_path) {
            Ok(text) => {
                DatabaseSchema::from_json(&text).map_err(|e| Error::json(&schema_path, e))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DatabaseSchema::default(),
            Err(e) => return Err(Error::io(&schema_path, e)),
        };

        let mut sql_files = Vec::new();
        collect_sql_files(root, &mut sql_files)?;
        sql_files.sort();

        let mut routines = Vec::new();
        for path in sql_files {
            let definition =
                std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
            let Some((kind, schema, name)) = routine_identity(&definition, &path) else {
                continue;
            };
            let meta = std::fs::metadata(&path).map_err(|e| Error::io(&path, e))?;
            let modified_ticks = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| (d.as_nanos() / 100) as i64)
                .unwrap_or_default();
            routines.push(FileRoutine {
                descriptor: RoutineDescriptor {
                    object_id: object_id(&schema, &name),
                    schema,
                    name,
                    kind,
                    modified_ticks,
                },
                definition,
            });
        }

        Ok(Self {
            project: project.to_string(),
            schema_doc,
            routines,
        })
    }

    fn find(&self, schema: &str, name: &str) -> Option<&FileRoutine> {
        self.routines.iter().find(|r| {
            r.descriptor.schema.eq_ignore_ascii_case(schema)
                && r.descriptor.name.eq_ignore_ascii_case(name)
        })
    }
}

fn collect_sql_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io(dir, e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            collect_sql_files(&path, out)?;
        } else if name.to_lowercase().ends_with(".sql") {
            out.push(path);
        }
    }
    Ok(())
}

/// Identify a routine from its CREATE statement, falling back to a
/// `schema.name.sql` file name.
fn routine_identity(definition: &str, path: &Path) -> Option<(RoutineKind, String, String)> {
    if let Some(caps) = CREATE_ROUTINE_RE.captures(definition) {
        let kind = if caps[1].to_lowercase().starts_with("proc") {
            RoutineKind::Procedure
        } else {
            RoutineKind::Function
        };
        let mut parts: Vec<String> = caps[2]
            .split('.')
            .map(|p| p.trim().trim_matches(['[', ']']).to_string())
            .collect();
        let name = parts.pop()?;
        let schema = parts.pop().unwrap_or_else(|| "dbo".to_string());
        return Some((kind, schema, name));
    }
    let stem = path.file_stem()?.to_string_lossy();
    let (schema, name) = stem.split_once('.')?;
    Some((
        RoutineKind::Procedure,
        schema.to_string(),
        name.to_string(),
    ))
}

fn object_id(schema: &str, name: &str) -> i64 {
    let digest = Sha256::digest(format!("{}.{}", schema, name).to_lowercase().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

impl MetadataSource for FileSource {
    fn project_name(&self) -> &str {
        &self.project
    }

    fn schemas(&self) -> Result<Vec<String>> {
        let mut schemas: Vec<String> = self
            .routines
            .iter()
            .map(|r| r.descriptor.schema.to_lowercase())
            .collect();
        schemas.sort();
        schemas.dedup();
        Ok(schemas)
    }

    fn routines(&self) -> Result<Vec<RoutineDescriptor>> {
        Ok(self.routines.iter().map(|r| r.descriptor.clone()).collect())
    }

    fn routine_definition(&self, schema: &str, name: &str) -> Result<String> {
        self.find(schema, name)
            .map(|r| r.definition.clone())
            .ok_or_else(|| Error::Metadata(format!("no definition for {schema}.{name}")))
    }

    fn routine_parameters(&self, schema: &str, name: &str) -> Result<Vec<Parameter>> {
        let routine = self
            .find(schema, name)
            .ok_or_else(|| Error::Metadata(format!("no definition for {schema}.{name}")))?;
        Ok(extract_parameters(
            &routine.definition,
            &self.schema_doc,
            schema,
        ))
    }

    fn tables(&self) -> Result<Vec<TableMetadata>> {
        Ok(self.schema_doc.tables.clone())
    }

    fn views(&self) -> Result<Vec<TableMetadata>> {
        Ok(self.schema_doc.views.clone())
    }

    fn table_types(&self) -> Result<Vec<TableTypeMetadata>> {
        Ok(self.schema_doc.table_types.clone())
    }

    fn scalar_types(&self) -> Result<Vec<ScalarTypeMetadata>> {
        Ok(self.schema_doc.scalar_types.clone())
    }

    fn table_columns(&self, schema: &str, table: &str) -> Result<Option<Vec<MetaColumn>>> {
        Ok(self
            .schema_doc
            .table(schema, table)
            .map(|t| t.columns.clone()))
    }

    fn view_columns(&self, schema: &str, view: &str) -> Result<Option<Vec<MetaColumn>>> {
        Ok(self
            .schema_doc
            .view(schema, view)
            .map(|v| v.columns.clone()))
    }

    fn table_type_columns(&self, schema: &str, name: &str) -> Result<Option<Vec<MetaColumn>>> {
        Ok(self
            .schema_doc
            .table_type(schema, name)
            .map(|t| t.columns.clone()))
    }
}
