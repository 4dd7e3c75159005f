//! Metadata collaborators: where routine definitions and physical schema
//! metadata come from.
//!
//! The pipeline only ever talks to [`MetadataSource`]. [`FileSource`] reads a
//! project directory (`schema.json` plus one `.sql` file per routine);
//! [`MemorySource`] backs tests and embedding.

mod files;
mod memory;
pub(crate) mod params;

pub use self::files::FileSource;
pub use self::memory::MemorySource;

use crate::error::Result;
use crate::model::{
    MetaColumn, Parameter, RoutineDescriptor, ScalarTypeMetadata, TableMetadata,
    TableTypeMetadata,
};

/// Everything the pipeline needs to know about the database, supplied by an
/// external collaborator. Lookups are awaited synchronously per routine; the
/// per-run memo in `RunContext` keeps round trips down.
pub trait MetadataSource {
    /// Stable project identity, part of the run fingerprint.
    fn project_name(&self) -> &str;

    fn schemas(&self) -> Result<Vec<String>>;

    /// All routines with identity and modification state.
    fn routines(&self) -> Result<Vec<RoutineDescriptor>>;

    fn routine_definition(&self, schema: &str, name: &str) -> Result<String>;

    fn routine_parameters(&self, schema: &str, name: &str) -> Result<Vec<Parameter>>;

    fn tables(&self) -> Result<Vec<TableMetadata>>;

    fn views(&self) -> Result<Vec<TableMetadata>>;

    fn table_types(&self) -> Result<Vec<TableTypeMetadata>>;

    fn scalar_types(&self) -> Result<Vec<ScalarTypeMetadata>>;

    /// Column list of a base table, `Ok(None)` when the table is unknown.
    fn table_columns(&self, schema: &str, table: &str) -> Result<Option<Vec<MetaColumn>>>;

    fn view_columns(&self, schema: &str, view: &str) -> Result<Option<Vec<MetaColumn>>>;

    fn table_type_columns(&self, schema: &str, name: &str) -> Result<Option<Vec<MetaColumn>>>;
}
