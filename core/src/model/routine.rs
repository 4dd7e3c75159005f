use serde::{Deserialize, Serialize};

use super::resultset::ResultSet;
use super::{is_false, is_zero_i32, is_zero_u8};

/// Routine kind. Functions get their own snapshot category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoutineKind {
    #[default]
    Procedure,
    Function,
}

impl RoutineKind {
    pub(crate) fn is_default(v: &RoutineKind) -> bool {
        *v == RoutineKind::Procedure
    }
}

/// Identity and modification state of one routine. The modified ticks are the
/// source of truth for change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineDescriptor {
    pub schema: String,
    pub name: String,
    pub kind: RoutineKind,
    pub object_id: i64,
    pub modified_ticks: i64,
}

impl RoutineDescriptor {
    /// Canonical `schema.name` label used in diagnostics and lookups.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Case-insensitive lookup key.
    pub fn key(&self) -> String {
        self.qualified_name().to_lowercase()
    }
}

/// One routine parameter, with its type reference resolved against scalar and
/// table user types or built-ins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Parameter {
    pub name: String,

    /// Schema of a user-defined type reference; absent for built-ins.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_schema: Option<String>,

    pub sql_type: String,

    #[serde(skip_serializing_if = "is_false")]
    pub nullable: bool,

    #[serde(skip_serializing_if = "is_zero_i32")]
    pub max_length: i32,

    #[serde(skip_serializing_if = "is_zero_u8")]
    pub precision: u8,

    #[serde(skip_serializing_if = "is_zero_u8")]
    pub scale: u8,

    #[serde(skip_serializing_if = "is_false")]
    pub is_output: bool,

    #[serde(skip_serializing_if = "is_false")]
    pub has_default: bool,

    #[serde(skip_serializing_if = "is_false")]
    pub is_table_type: bool,
}

/// A captured EXEC target. Persisted so hydrated routines can re-enter
/// forwarding without a re-parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ExecTargetRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
    /// Dynamic SQL (`EXEC(@sql)`, `sp_executesql`, variable targets) is never
    /// resolved, only recorded.
    #[serde(skip_serializing_if = "is_false")]
    pub dynamic: bool,
}

/// The per-routine snapshot document, one file per object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct RoutineSnapshot {
    pub schema: String,
    pub name: String,

    #[serde(skip_serializing_if = "RoutineKind::is_default")]
    pub kind: RoutineKind,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub result_sets: Vec<ResultSet>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exec_targets: Vec<ExecTargetRef>,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub parse_error_count: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_parse_error: Option<String>,

    /// The structured parser gave up and the secondary regex path ran.
    #[serde(skip_serializing_if = "is_false")]
    pub used_fallback: bool,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}
