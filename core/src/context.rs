//! Per-run state: memoized metadata lookups, dedup logging, diagnostics and
//! cooperative cancellation.
//!
//! All of this is threaded through the pipeline as an explicit value and
//! cleared at run start; nothing here outlives a run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Diagnostic, DiagnosticKind, Error, Result};
use crate::model::MetaColumn;
use crate::source::MetadataSource;

/// Cooperative cancellation flag, checked between routines and around
/// metadata round trips.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Mutable state for one pipeline run.
pub struct RunContext {
    /// `schema.table` (lowercase) -> columns; `None` memoizes a known miss so
    /// a missing table costs one round trip, not one per column.
    table_memo: HashMap<String, Option<Vec<MetaColumn>>>,
    table_type_memo: HashMap<String, Option<Vec<MetaColumn>>>,
    /// Dedup keys for base-table resolutions, `schema.proc|column->type`, so
    /// cache hydration passes don't double-count.
    logged_bindings: HashSet<String>,
    cancel: CancelFlag,
    pub diagnostics: Vec<Diagnostic>,
    /// Distinct base-table resolutions this run (rule-6 dedup counter).
    pub table_resolutions: usize,
    /// Columns whose nullability was upgraded by outer-join origin.
    pub nullability_upgrades: usize,
}

impl RunContext {
    pub fn new() -> Self {
        Self::with_cancel(CancelFlag::new())
    }

    pub fn with_cancel(cancel: CancelFlag) -> Self {
        Self {
            table_memo: HashMap::new(),
            table_type_memo: HashMap::new(),
            logged_bindings: HashSet::new(),
            cancel,
            diagnostics: Vec::new(),
            table_resolutions: 0,
            nullability_upgrades: 0,
        }
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn diag(
        &mut self,
        kind: DiagnosticKind,
        object: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic::new(kind, object, message));
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }

    /// Record a base-table resolution once per `schema.proc|column->type`.
    /// Returns true the first time the key is seen.
    pub fn log_binding_once(&mut self, key: String) -> bool {
        self.logged_bindings.insert(key)
    }

    /// Look up one column of `schema.table`, checking base tables first and
    /// views second. Memoized per run. Source errors are demoted to misses;
    /// per-object failures never abort the run.
    pub fn source_column<M: MetadataSource>(
        &mut self,
        source: &M,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Option<MetaColumn> {
        let key = format!("{}.{}", schema.to_lowercase(), table.to_lowercase());
        if !self.table_memo.contains_key(&key) {
            let fetched = match source.table_columns(schema, table) {
                Ok(Some(cols)) => Some(cols),
                Ok(None) => match source.view_columns(schema, table) {
                    Ok(found) => found,
                    Err(e) => {
                        self.diag(
                            DiagnosticKind::MetadataLookupMiss,
                            format!("{schema}.{table}"),
                            e.to_string(),
                        );
                        None
                    }
                },
                Err(e) => {
                    self.diag(
                        DiagnosticKind::MetadataLookupMiss,
                        format!("{schema}.{table}"),
                        e.to_string(),
                    );
                    None
                }
            };
            self.table_memo.insert(key.clone(), fetched);
        }
        self.table_memo
            .get(&key)?
            .as_ref()?
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(column))
            .cloned()
    }

    /// Memoized UDTT field lookup.
    pub fn table_type_column<M: MetadataSource>(
        &mut self,
        source: &M,
        schema: &str,
        name: &str,
        column: &str,
    ) -> Option<MetaColumn> {
        let key = format!("{}.{}", schema.to_lowercase(), name.to_lowercase());
        if !self.table_type_memo.contains_key(&key) {
            let fetched = source.table_type_columns(schema, name).ok().flatten();
            self.table_type_memo.insert(key.clone(), fetched);
        }
        self.table_type_memo
            .get(&key)?
            .as_ref()?
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(column))
            .cloned()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TableMetadata;
    use crate::source::MemorySource;

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        let ctx = RunContext::with_cancel(flag.clone());
        assert!(ctx.check_cancelled().is_ok());
        flag.cancel();
        assert!(matches!(ctx.check_cancelled(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_source_column_memoizes_misses() {
        let source = MemorySource::new("demo")
            .with_table(TableMetadata::new("dbo", "Users").column("Id", "int", false));
        let mut ctx = RunContext::new();

        assert!(ctx.source_column(&source, "dbo", "Users", "Id").is_some());
        assert!(ctx.source_column(&source, "dbo", "Nope", "Id").is_none());
        // Second miss hits the memo, not the source.
        assert!(ctx.source_column(&source, "dbo", "Nope", "Other").is_none());
    }

    #[test]
    fn test_binding_dedup() {
        let mut ctx = RunContext::new();
        assert!(ctx.log_binding_once("dbo.P|Id->int".into()));
        assert!(!ctx.log_binding_once("dbo.P|Id->int".into()));
    }
}
