use serde::{Deserialize, Serialize};

use super::column::Column;
use super::is_false;

/// One result set produced by a routine, in statement order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ResultSet {
    #[serde(skip_serializing_if = "is_false")]
    pub returns_json: bool,

    /// FOR JSON without WITHOUT_ARRAY_WRAPPER wraps rows in an array.
    #[serde(skip_serializing_if = "is_false")]
    pub returns_json_array: bool,

    /// ROOT('x') of the FOR JSON clause.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_root: Option<String>,

    /// Forwarding provenance: the routine this set was cloned from. Denotes
    /// provenance, not ownership; recomputed against the target every run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exec_source_schema: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exec_source_name: Option<String>,

    #[serde(skip_serializing_if = "is_false")]
    pub has_select_star: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<Column>,
}

impl ResultSet {
    /// True when this set carries shape a consumer can use: columns, a
    /// wildcard projection, or a JSON envelope.
    pub fn is_meaningful(&self) -> bool {
        !self.columns.is_empty() || self.has_select_star || self.returns_json
    }

    pub fn is_forwarded(&self) -> bool {
        self.exec_source_name.is_some()
    }
}
