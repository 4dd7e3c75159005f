//! The incremental orchestrator: decides per routine whether to reuse the
//! cached shape or re-run extraction, resolution and forwarding, then updates
//! the snapshot store and the tick cache.
//!
//! Single-threaded and sequential by design; the forwarding pass runs only
//! after extraction has completed for every routine.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;

use crate::cache::{CacheEntry, RunCache, run_fingerprint};
use crate::context::{CancelFlag, RunContext};
use crate::error::{Diagnostic, DiagnosticKind, Result};
use crate::extract::{RESULT_SET_PARSER_VERSION, extract_result_shape};
use crate::forward::{ForwardState, resolve_forwarding};
use crate::model::{
    ExecTargetRef, Parameter, ResultSet, RoutineDescriptor, RoutineKind, RoutineSnapshot,
};
use crate::resolve::resolve_routine;
use crate::snapshot::{Category, ObjectFilter, ParserInfo, SnapshotStore};
use crate::source::MetadataSource;

/// Working record for one routine within a run.
#[derive(Debug, Clone)]
pub struct RoutineAnalysis {
    pub descriptor: RoutineDescriptor,
    pub parameters: Vec<Parameter>,
    pub result_sets: Vec<ResultSet>,
    pub exec_targets: Vec<ExecTargetRef>,
    pub parse_error_count: u32,
    pub first_parse_error: Option<String>,
    pub used_fallback: bool,
    /// Shape came from the prior snapshot instead of a re-parse.
    pub hydrated: bool,
    pub forward_state: ForwardState,
}

impl RoutineAnalysis {
    fn into_snapshot(self) -> RoutineSnapshot {
        RoutineSnapshot {
            schema: self.descriptor.schema,
            name: self.descriptor.name,
            kind: self.descriptor.kind,
            parameters: self.parameters,
            result_sets: self.result_sets,
            exec_targets: self.exec_targets,
            parse_error_count: self.parse_error_count,
            first_parse_error: self.first_parse_error,
            used_fallback: self.used_fallback,
        }
    }
}

pub struct PipelineOptions {
    pub use_cache: bool,
    /// Schema filter; empty means every schema the source reports.
    pub included_schemas: Vec<String>,
    /// Partial-run object filter; restricts processing and pruning.
    pub filter: Option<ObjectFilter>,
    pub cancel: CancelFlag,
    pub tool_version: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            included_schemas: Vec::new(),
            filter: None,
            cancel: CancelFlag::new(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    /// Snapshot Fingerprint after the run.
    pub fingerprint: String,
    /// Cache namespace key of this run.
    pub run_fingerprint: String,
    pub routines_total: usize,
    pub extracted: usize,
    pub skipped: usize,
    pub parse_failures: usize,
    pub forwarded: usize,
    pub columns_resolved: usize,
    pub columns_unresolved: usize,
    pub table_resolutions: usize,
    pub nullability_upgrades: usize,
    pub files_created: usize,
    pub files_updated: usize,
    pub files_unchanged: usize,
    pub files_pruned: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl PipelineReport {
    /// Zero filesystem writes happened.
    pub fn is_noop(&self) -> bool {
        self.files_created == 0 && self.files_updated == 0 && self.files_pruned == 0
    }
}

/// Run the full pipeline against one metadata source.
pub fn run_snapshot<M, F>(
    source: &M,
    out_dir: &Path,
    cache_path: Option<&Path>,
    options: &PipelineOptions,
    mut progress: F,
) -> Result<PipelineReport>
where
    M: MetadataSource,
    F: FnMut(usize, usize, &str),
{
    let mut ctx = RunContext::with_cancel(options.cancel.clone());
    let mut report = PipelineReport::default();

    // Total unavailability of the metadata source is the one fatal error.
    let schemas = included_schemas(source, options)?;
    let mut routines: Vec<RoutineDescriptor> = source
        .routines()?
        .into_iter()
        .filter(|r| schemas.iter().any(|s| s.eq_ignore_ascii_case(&r.schema)))
        .collect();
    routines.sort_by(|a, b| a.key().cmp(&b.key()));

    report.run_fingerprint = run_fingerprint(source.project_name(), &schemas, routines.len());
    report.routines_total = routines.len();

    let prior_cache = match cache_path {
        Some(path) if options.use_cache => {
            RunCache::load(path).filter(|c| c.fingerprint == report.run_fingerprint)
        }
        _ => None,
    };

    let mut store = SnapshotStore::open(out_dir, options.filter.clone());
    let mut analyses: BTreeMap<String, RoutineAnalysis> = BTreeMap::new();

    let total = routines.len();
    for (i, descriptor) in routines.iter().enumerate() {
        ctx.check_cancelled()?;
        progress(i, total, &descriptor.qualified_name());

        if let Some(filter) = &options.filter {
            if !filter.matches(&descriptor.schema, &descriptor.name) {
                continue;
            }
        }

        let tick_match = prior_cache
            .as_ref()
            .and_then(|c| c.lookup_ticks(&descriptor.schema, &descriptor.name))
            == Some(descriptor.modified_ticks);

        // A tick match alone is not enough: the prior snapshot must actually
        // hydrate, otherwise the routine is re-parsed in full.
        let analysis = if tick_match {
            match hydrate(&store, descriptor) {
                Some(analysis) => {
                    report.skipped += 1;
                    analysis
                }
                None => {
                    report.extracted += 1;
                    analyze(&mut ctx, source, descriptor)
                }
            }
        } else {
            report.extracted += 1;
            analyze(&mut ctx, source, descriptor)
        };

        analyses.insert(descriptor.key(), analysis);
    }

    // Hard phase barrier: forwarding needs every routine extracted first.
    report.forwarded = resolve_forwarding(&mut ctx, &mut analyses);

    for analysis in analyses.values() {
        let (resolved, unresolved) = count_columns(&analysis.result_sets);
        report.columns_resolved += resolved;
        report.columns_unresolved += unresolved;
    }

    write_snapshot(&mut ctx, source, &mut store, analyses, options)?;

    if let Err(e) = store.prune() {
        ctx.diag(DiagnosticKind::SnapshotIo, "prune", e.to_string());
    }
    match store.write_index(ParserInfo {
        tool_version: options.tool_version.clone(),
        result_set_parser_version: RESULT_SET_PARSER_VERSION,
    }) {
        Ok(index) => report.fingerprint = index.fingerprint,
        Err(e) => ctx.diag(DiagnosticKind::SnapshotIo, "index.json", e.to_string()),
    }

    if let Some(path) = cache_path {
        let cache = updated_cache(prior_cache, &report.run_fingerprint, &routines, options);
        if let Err(e) = cache.save(path) {
            ctx.diag(DiagnosticKind::SnapshotIo, "cache", e.to_string());
        }
    }

    report.files_created = store.created;
    report.files_updated = store.updated;
    report.files_unchanged = store.unchanged;
    report.files_pruned = store.pruned;
    report.parse_failures = ctx.count(DiagnosticKind::ParseFailure);
    report.table_resolutions = ctx.table_resolutions;
    report.nullability_upgrades = ctx.nullability_upgrades;
    report.diagnostics = std::mem::take(&mut ctx.diagnostics);

    Ok(report)
}

fn included_schemas<M: MetadataSource>(
    source: &M,
    options: &PipelineOptions,
) -> Result<Vec<String>> {
    let mut schemas = if options.included_schemas.is_empty() {
        source.schemas()?
    } else {
        options.included_schemas.clone()
    };
    for s in &mut schemas {
        *s = s.to_lowercase();
    }
    schemas.sort();
    schemas.dedup();
    Ok(schemas)
}

fn category_of(kind: RoutineKind) -> Category {
    match kind {
        RoutineKind::Procedure => Category::Procedures,
        RoutineKind::Function => Category::Functions,
    }
}

/// Reconstruct a routine's analysis from the prior snapshot file. `None`
/// (missing, unreadable or shapeless file) forces a full re-parse.
fn hydrate(store: &SnapshotStore, descriptor: &RoutineDescriptor) -> Option<RoutineAnalysis> {
    let path = store.object_path(
        category_of(descriptor.kind),
        &descriptor.schema,
        &descriptor.name,
    );
    let bytes = std::fs::read(path).ok()?;
    let snapshot: RoutineSnapshot = serde_json::from_slice(&bytes).ok()?;
    if snapshot.result_sets.is_empty() {
        return None;
    }
    Some(RoutineAnalysis {
        descriptor: descriptor.clone(),
        parameters: snapshot.parameters,
        result_sets: snapshot.result_sets,
        exec_targets: snapshot.exec_targets,
        parse_error_count: snapshot.parse_error_count,
        first_parse_error: snapshot.first_parse_error,
        used_fallback: snapshot.used_fallback,
        hydrated: true,
        forward_state: ForwardState::NoForward,
    })
}

fn analyze<M: MetadataSource>(
    ctx: &mut RunContext,
    source: &M,
    descriptor: &RoutineDescriptor,
) -> RoutineAnalysis {
    let object = descriptor.qualified_name();

    let definition = match source.routine_definition(&descriptor.schema, &descriptor.name) {
        Ok(definition) => definition,
        Err(e) => {
            ctx.diag(DiagnosticKind::ParseFailure, &object, e.to_string());
            return RoutineAnalysis {
                descriptor: descriptor.clone(),
                parameters: Vec::new(),
                result_sets: Vec::new(),
                exec_targets: Vec::new(),
                parse_error_count: 1,
                first_parse_error: Some(e.to_string()),
                used_fallback: true,
                hydrated: false,
                forward_state: ForwardState::NoForward,
            };
        }
    };

    let parameters = source
        .routine_parameters(&descriptor.schema, &descriptor.name)
        .unwrap_or_default();

    let extraction =
        extract_result_shape(ctx, &descriptor.schema, &descriptor.name, &definition);
    let result_sets = resolve_routine(ctx, source, descriptor, &parameters, &extraction.result_sets);

    RoutineAnalysis {
        descriptor: descriptor.clone(),
        parameters,
        result_sets,
        exec_targets: extraction.exec_targets,
        parse_error_count: extraction.error_count,
        first_parse_error: extraction.first_error,
        used_fallback: extraction.used_fallback,
        hydrated: false,
        forward_state: ForwardState::NoForward,
    }
}

fn write_snapshot<M: MetadataSource>(
    ctx: &mut RunContext,
    source: &M,
    store: &mut SnapshotStore,
    analyses: BTreeMap<String, RoutineAnalysis>,
    options: &PipelineOptions,
) -> Result<()> {
    let passes_filter = |schema: &str, name: &str| {
        options
            .filter
            .as_ref()
            .map(|f| f.matches(schema, name))
            .unwrap_or(true)
    };
    let in_schemas = |schema: &str| {
        options.included_schemas.is_empty()
            || options
                .included_schemas
                .iter()
                .any(|s| s.eq_ignore_ascii_case(schema))
    };

    for (_, analysis) in analyses {
        ctx.check_cancelled()?;
        let category = category_of(analysis.descriptor.kind);
        let schema = analysis.descriptor.schema.clone();
        let name = analysis.descriptor.name.clone();
        let snapshot = analysis.into_snapshot();
        if let Err(e) = store.write_object(category, &schema, &name, &snapshot) {
            ctx.diag(
                DiagnosticKind::SnapshotIo,
                format!("{schema}.{name}"),
                e.to_string(),
            );
        }
    }

    for table in source.tables().unwrap_or_default() {
        if in_schemas(&table.schema) && passes_filter(&table.schema, &table.name) {
            if let Err(e) = store.write_object(Category::Tables, &table.schema, &table.name, &table)
            {
                ctx.diag(DiagnosticKind::SnapshotIo, table.schema.clone(), e.to_string());
            }
        }
    }
    for view in source.views().unwrap_or_default() {
        if in_schemas(&view.schema) && passes_filter(&view.schema, &view.name) {
            if let Err(e) = store.write_object(Category::Views, &view.schema, &view.name, &view) {
                ctx.diag(DiagnosticKind::SnapshotIo, view.schema.clone(), e.to_string());
            }
        }
    }
    for table_type in source.table_types().unwrap_or_default() {
        if in_schemas(&table_type.schema) && passes_filter(&table_type.schema, &table_type.name) {
            if let Err(e) = store.write_object(
                Category::TableTypes,
                &table_type.schema,
                &table_type.name,
                &table_type,
            ) {
                ctx.diag(
                    DiagnosticKind::SnapshotIo,
                    table_type.schema.clone(),
                    e.to_string(),
                );
            }
        }
    }
    for scalar in source.scalar_types().unwrap_or_default() {
        if in_schemas(&scalar.schema) && passes_filter(&scalar.schema, &scalar.name) {
            if let Err(e) = store.write_object(
                Category::UserDefinedTypes,
                &scalar.schema,
                &scalar.name,
                &scalar,
            ) {
                ctx.diag(
                    DiagnosticKind::SnapshotIo,
                    scalar.schema.clone(),
                    e.to_string(),
                );
            }
        }
    }

    Ok(())
}

fn updated_cache(
    prior: Option<RunCache>,
    run_fingerprint: &str,
    routines: &[RoutineDescriptor],
    options: &PipelineOptions,
) -> RunCache {
    let mut cache = prior.unwrap_or_default();
    cache.fingerprint = run_fingerprint.to_string();
    cache.created_utc = Utc::now();
    for descriptor in routines {
        if let Some(filter) = &options.filter {
            if !filter.matches(&descriptor.schema, &descriptor.name) {
                continue;
            }
        }
        match cache
            .procedures
            .iter_mut()
            .find(|e| {
                e.schema.eq_ignore_ascii_case(&descriptor.schema)
                    && e.name.eq_ignore_ascii_case(&descriptor.name)
            }) {
            Some(entry) => entry.modified_ticks = descriptor.modified_ticks,
            None => cache.procedures.push(CacheEntry {
                schema: descriptor.schema.clone(),
                name: descriptor.name.clone(),
                modified_ticks: descriptor.modified_ticks,
            }),
        }
    }
    cache
        .procedures
        .sort_by(|a, b| (&a.schema, &a.name).cmp(&(&b.schema, &b.name)));
    cache
}

fn count_columns(sets: &[ResultSet]) -> (usize, usize) {
    fn walk(columns: &[crate::model::Column], resolved: &mut usize, unresolved: &mut usize) {
        for col in columns {
            if col.sql_type.is_some() {
                *resolved += 1;
            } else {
                *unresolved += 1;
            }
            walk(&col.columns, resolved, unresolved);
        }
    }
    let mut resolved = 0;
    let mut unresolved = 0;
    for rs in sets {
        walk(&rs.columns, &mut resolved, &mut unresolved);
    }
    (resolved, unresolved)
}
