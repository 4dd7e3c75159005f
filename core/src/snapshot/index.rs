//! The `index.json` manifest: one entry per object, aggregate stats and the
//! snapshot Fingerprint.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const SCHEMA_VERSION: u32 = 2;

/// Version tag of the function-shape analysis; bumped when function handling
/// changes in a way that invalidates generated code.
pub const FUNCTIONS_VERSION: u32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ParserInfo {
    pub tool_version: String,
    pub result_set_parser_version: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SnapshotStats {
    pub procedures: usize,
    pub functions: usize,
    pub table_types: usize,
    pub user_defined_types: usize,
    pub tables: usize,
    pub views: usize,
}

/// Identity of one snapshot file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct IndexEntry {
    pub schema: String,
    pub name: String,
    pub file: String,
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SnapshotIndex {
    pub schema_version: u32,
    pub fingerprint: String,
    pub parser: ParserInfo,
    pub stats: SnapshotStats,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub procedures: Vec<IndexEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub table_types: Vec<IndexEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub user_defined_types: Vec<IndexEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<IndexEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<IndexEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<IndexEntry>,

    pub functions_version: u32,
}

impl SnapshotIndex {
    pub fn load(path: &Path) -> Result<Option<SnapshotIndex>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(path, e)),
        };
        let index = serde_json::from_str(&text).map_err(|e| Error::json(path, e))?;
        Ok(Some(index))
    }
}
