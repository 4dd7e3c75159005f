//! In-memory metadata source for tests and embedding.

use crate::error::{Error, Result};
use crate::model::{
    DatabaseSchema, MetaColumn, Parameter, RoutineDescriptor, RoutineKind, ScalarTypeMetadata,
    TableMetadata, TableTypeMetadata,
};

use super::MetadataSource;
use super::params::extract_parameters;

#[derive(Default)]
pub struct MemorySource {
    project: String,
    schema_doc: DatabaseSchema,
    routines: Vec<(RoutineDescriptor, String)>,
}

impl MemorySource {
    pub fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            ..Self::default()
        }
    }

    pub fn with_table(mut self, table: TableMetadata) -> Self {
        self.schema_doc.tables.push(table);
        self
    }

    pub fn with_view(mut self, view: TableMetadata) -> Self {
        self.schema_doc.views.push(view);
        self
    }

    pub fn with_table_type(mut self, table_type: TableTypeMetadata) -> Self {
        self.schema_doc.table_types.push(table_type);
        self
    }

    pub fn with_scalar_type(mut self, scalar: ScalarTypeMetadata) -> Self {
        self.schema_doc.scalar_types.push(scalar);
        self
    }

    pub fn with_procedure(
        self,
        schema: &str,
        name: &str,
        modified_ticks: i64,
        definition: &str,
    ) -> Self {
        self.with_routine(RoutineKind::Procedure, schema, name, modified_ticks, definition)
    }

    pub fn with_function(
        self,
        schema: &str,
        name: &str,
        modified_ticks: i64,
        definition: &str,
    ) -> Self {
        self.with_routine(RoutineKind::Function, schema, name, modified_ticks, definition)
    }

    fn with_routine(
        mut self,
        kind: RoutineKind,
        schema: &str,
        name: &str,
        modified_ticks: i64,
        definition: &str,
    ) -> Self {
        let object_id = self.routines.len() as i64 + 1;
        self.routines.push((
            RoutineDescriptor {
                schema: schema.to_string(),
                name: name.to_string(),
                kind,
                object_id,
                modified_ticks,
            },
            definition.to_string(),
        ));
        self
    }

    /// Bump a routine's modification state in place, as a source change would.
    pub fn touch(&mut self, schema: &str, name: &str, modified_ticks: i64) {
        for (descriptor, _) in &mut self.routines {
            if descriptor.schema.eq_ignore_ascii_case(schema)
                && descriptor.name.eq_ignore_ascii_case(name)
            {
                descriptor.modified_ticks = modified_ticks;
            }
        }
    }

    /// Remove a routine, as a dropped object would.
    pub fn remove(&mut self, schema: &str, name: &str) {
        self.routines.retain(|(d, _)| {
            !(d.schema.eq_ignore_ascii_case(schema) && d.name.eq_ignore_ascii_case(name))
        });
    }

    fn find(&self, schema: &str, name: &str) -> Option<&(RoutineDescriptor, String)> {
        self.routines.iter().find(|(d, _)| {
            d.schema.eq_ignore_ascii_case(schema) && d.name.eq_ignore_ascii_case(name)
        })
    }
}

impl MetadataSource for MemorySource {
    fn project_name(&self) -> &str {
        &self.project
    }

    fn schemas(&self) -> Result<Vec<String>> {
        let mut schemas: Vec<String> = self
            .routines
            .iter()
            .map(|(d, _)| d.schema.to_lowercase())
            .collect();
        schemas.sort();
        schemas.dedup();
        Ok(schemas)
    }

    fn routines(&self) -> Result<Vec<RoutineDescriptor>> {
        Ok(self.routines.iter().map(|(d, _)| d.clone()).collect())
    }

    fn routine_definition(&self, schema: &str, name: &str) -> Result<String> {
        self.find(schema, name)
            .map(|(_, def)| def.clone())
            .ok_or_else(|| Error::Metadata(format!("no definition for {schema}.{name}")))
    }

    fn routine_parameters(&self, schema: &str, name: &str) -> Result<Vec<Parameter>> {
        let (_, definition) = self
            .find(schema, name)
            .ok_or_else(|| Error::Metadata(format!("no definition for {schema}.{name}")))?;
        Ok(extract_parameters(definition, &self.schema_doc, schema))
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
