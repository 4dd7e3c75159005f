use serde::{Deserialize, Serialize};

use super::{is_false, is_zero_i32, is_zero_u8};

/// One physical column of a table, view or table type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct MetaColumn {
    pub name: String,
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
    pub is_identity: bool,
}

/// A table or view with its column list. Views share the shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TableMetadata {
    pub schema: String,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<MetaColumn>,
}

impl TableMetadata {
    pub fn new(schema: &str, name: &str) -> Self {
        Self {
            schema: schema.to_string(),
            name: name.to_string(),
            columns: Vec::new(),
        }
    }

    /// Builder: add a column with just a type.
    pub fn column(mut self, name: &str, sql_type: &str, nullable: bool) -> Self {
        self.columns.push(MetaColumn {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            nullable,
            ..MetaColumn::default()
        });
        self
    }
}

/// A user-defined table type (UDTT).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct TableTypeMetadata {
    pub schema: String,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<MetaColumn>,
}

/// A scalar user-defined type aliasing a built-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ScalarTypeMetadata {
    pub schema: String,
    pub name: String,
    pub base_type: String,

    #[serde(skip_serializing_if = "is_false")]
    pub nullable: bool,

    #[serde(skip_serializing_if = "is_zero_i32")]
    pub max_length: i32,

    #[serde(skip_serializing_if = "is_zero_u8")]
    pub precision: u8,

    #[serde(skip_serializing_if = "is_zero_u8")]
    pub scale: u8,
}

/// The physical metadata document (`schema.json` of a file-backed project).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct DatabaseSchema {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<TableMetadata>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<TableMetadata>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub table_types: Vec<TableTypeMetadata>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scalar_types: Vec<ScalarTypeMetadata>,
}

impl DatabaseSchema {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    fn find<'a>(
        list: &'a [TableMetadata],
        schema: &str,
        name: &str,
    ) -> Option<&'a TableMetadata> {
        list.iter()
            .find(|t| t.schema.eq_ignore_ascii_case(schema) && t.name.eq_ignore_ascii_case(name))
    }

    pub fn table(&self, schema: &str, name: &str) -> Option<&TableMetadata> {
        Self::find(&self.tables, schema, name)
    }

    pub fn view(&self, schema: &str, name: &str) -> Option<&TableMetadata> {
        Self::find(&self.views, schema, name)
    }

    pub fn table_type(&self, schema: &str, name: &str) -> Option<&TableTypeMetadata> {
        self.table_types
            .iter()
            .find(|t| t.schema.eq_ignore_ascii_case(schema) && t.name.eq_ignore_ascii_case(name))
    }

    pub fn scalar_type(&self, schema: &str, name: &str) -> Option<&ScalarTypeMetadata> {
        self.scalar_types
            .iter()
            .find(|t| t.schema.eq_ignore_ascii_case(schema) && t.name.eq_ignore_ascii_case(name))
    }
}
