//! End-to-end pipeline tests over an in-memory metadata source and a real
//! temp-dir snapshot store.

use std::path::Path;

use pretty_assertions::{assert_eq, assert_ne};
use sprocket_core::model::{RoutineSnapshot, TableMetadata};
use sprocket_core::snapshot::{INDEX_FILE, SnapshotIndex};
use sprocket_core::source::MemorySource;
use sprocket_core::{PipelineOptions, run_snapshot};

fn read_proc(out: &Path, schema: &str, name: &str) -> RoutineSnapshot {
    let path = out.join("procedures").join(format!("{schema}.{name}.json"));
    let text = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{path:?}: {e}"));
    serde_json::from_str(&text).unwrap()
}

fn read_index(out: &Path) -> SnapshotIndex {
    SnapshotIndex::load(&out.join(INDEX_FILE)).unwrap().unwrap()
}

#[test]
fn json_scalar_wrapper_shape() {
    // Scenario A: one set, returns JSON, no array wrapper, one column.
    let source = MemorySource::new("demo").with_procedure(
        "dbo",
        "GetOne",
        10,
        "CREATE PROC dbo.GetOne AS SELECT 1 AS Id FOR JSON PATH, WITHOUT_ARRAY_WRAPPER;",
    );
    let out = tempfile::tempdir().unwrap();
    let report = run_snapshot(&source, out.path(), None, &PipelineOptions::default(), |_, _, _| {})
        .unwrap();
    assert_eq!(report.parse_failures, 0);

    let snap = read_proc(out.path(), "dbo", "GetOne");
    assert_eq!(snap.result_sets.len(), 1);
    let rs = &snap.result_sets[0];
    assert!(rs.returns_json);
    assert!(!rs.returns_json_array);
    assert_eq!(rs.columns.len(), 1);
    assert_eq!(rs.columns[0].name, "Id");
    assert_eq!(rs.columns[0].sql_type.as_deref(), Some("int"));
}

#[test]
fn mixed_wrapper_appends_forwarded_sets() {
    // Scenario B: local set first, then a provenance-tagged clone of the
    // target's JSON set.
    let source = MemorySource::new("demo")
        .with_procedure(
            "dbo",
            "Target",
            1,
            "CREATE PROC dbo.Target AS SELECT 'ok' AS Status FOR JSON PATH;",
        )
        .with_procedure(
            "dbo",
            "Caller",
            2,
            "CREATE PROC dbo.Caller AS SELECT 42 AS LocalValue; EXEC dbo.Target;",
        );
    let out = tempfile::tempdir().unwrap();
    let report = run_snapshot(&source, out.path(), None, &PipelineOptions::default(), |_, _, _| {})
        .unwrap();
    assert_eq!(report.forwarded, 1);

    let caller = read_proc(out.path(), "dbo", "Caller");
    assert_eq!(caller.result_sets.len(), 2);

    let local = &caller.result_sets[0];
    assert!(!local.returns_json);
    assert_eq!(local.columns[0].name, "LocalValue");
    assert_eq!(local.columns[0].sql_type.as_deref(), Some("int"));
    assert!(local.exec_source_name.is_none());

    let forwarded = &caller.result_sets[1];
    assert!(forwarded.returns_json);
    assert_eq!(forwarded.exec_source_schema.as_deref(), Some("dbo"));
    assert_eq!(forwarded.exec_source_name.as_deref(), Some("Target"));
    let target = read_proc(out.path(), "dbo", "Target");
    assert_eq!(forwarded.columns.len(), target.result_sets[0].columns.len());
    assert_eq!(forwarded.columns[0].name, "Status");
}

#[test]
fn pure_wrapper_clones_target_shape() {
    let source = MemorySource::new("demo")
        .with_procedure(
            "dbo",
            "Target",
            1,
            "CREATE PROC dbo.Target AS SELECT 7 AS Answer;",
        )
        .with_procedure("dbo", "Wrapper", 2, "CREATE PROC dbo.Wrapper AS EXEC dbo.Target;");
    let out = tempfile::tempdir().unwrap();
    run_snapshot(&source, out.path(), None, &PipelineOptions::default(), |_, _, _| {}).unwrap();

    let wrapper = read_proc(out.path(), "dbo", "Wrapper");
    assert_eq!(wrapper.result_sets.len(), 1);
    assert_eq!(wrapper.result_sets[0].exec_source_name.as_deref(), Some("Target"));
    assert_eq!(wrapper.result_sets[0].columns[0].name, "Answer");
    assert_eq!(
        wrapper.result_sets[0].columns[0].sql_type.as_deref(),
        Some("int")
    );
}

#[test]
fn aggregate_literal_class_propagates() {
    // Scenario C.
    let source = MemorySource::new("demo").with_procedure(
        "dbo",
        "Agg",
        3,
        "CREATE PROC dbo.Agg AS SELECT SUM(IIF(x = 1, 1, 0)) AS 'c' FROM dbo.T;",
    );
    let out = tempfile::tempdir().unwrap();
    run_snapshot(&source, out.path(), None, &PipelineOptions::default(), |_, _, _| {}).unwrap();

    let snap = read_proc(out.path(), "dbo", "Agg");
    let col = &snap.result_sets[0].columns[0];
    assert_eq!(col.name, "c");
    assert!(col.is_aggregate);
    assert_eq!(col.aggregate_function.as_deref(), Some("sum"));
    assert_eq!(col.sql_type.as_deref(), Some("int"));
}

#[test]
fn rerun_on_unchanged_source_is_noop() {
    let source = MemorySource::new("demo")
        .with_table(TableMetadata::new("dbo", "Users").column("Email", "nvarchar(256)", true))
        .with_procedure(
            "dbo",
            "GetUsers",
            5,
            "CREATE PROC dbo.GetUsers AS SELECT u.Email FROM dbo.Users u;",
        );
    let out = tempfile::tempdir().unwrap();
    let cache = out.path().join("cache").join("run.json");

    let first = run_snapshot(
        &source,
        out.path(),
        Some(&cache),
        &PipelineOptions::default(),
        |_, _, _| {},
    )
    .unwrap();
    assert!(first.files_created > 0);
    assert_eq!(first.skipped, 0);

    let second = run_snapshot(
        &source,
        out.path(),
        Some(&cache),
        &PipelineOptions::default(),
        |_, _, _| {},
    )
    .unwrap();
    assert!(second.is_noop(), "second run must write nothing");
    assert_eq!(second.skipped, 1);
    assert_eq!(second.fingerprint, first.fingerprint);
}

#[test]
fn tick_match_without_hydration_data_forces_reparse() {
    // Scenario D: the first snapshot has no shape data for the routine, so
    // the tick match alone must not skip re-parsing.
    let source = MemorySource::new("demo").with_procedure(
        "dbo",
        "NoShape",
        9,
        "CREATE PROC dbo.NoShape AS UPDATE dbo.T SET x = 1;",
    );
    let out = tempfile::tempdir().unwrap();
    let cache = out.path().join("run-cache.json");

    let first = run_snapshot(
        &source,
        out.path(),
        Some(&cache),
        &PipelineOptions::default(),
        |_, _, _| {},
    )
    .unwrap();
    assert_eq!(first.extracted, 1);
    let snap = read_proc(out.path(), "dbo", "NoShape");
    assert!(snap.result_sets.is_empty());

    let second = run_snapshot(
        &source,
        out.path(),
        Some(&cache),
        &PipelineOptions::default(),
        |_, _, _| {},
    )
    .unwrap();
    assert_eq!(second.skipped, 0, "no hydration data, no skip");
    assert_eq!(second.extracted, 1);
}

#[test]
fn cache_skip_requires_tick_match() {
    let mut source = MemorySource::new("demo").with_procedure(
        "dbo",
        "P",
        100,
        "CREATE PROC dbo.P AS SELECT 1 AS Id;",
    );
    let out = tempfile::tempdir().unwrap();
    let cache = out.path().join("run-cache.json");
    let options = PipelineOptions::default();

    run_snapshot(&source, out.path(), Some(&cache), &options, |_, _, _| {}).unwrap();

    // Changed routine: always fully re-extracted.
    source.touch("dbo", "P", 200);
    let report = run_snapshot(&source, out.path(), Some(&cache), &options, |_, _, _| {}).unwrap();
    assert_eq!(report.skipped, 0);
    assert_eq!(report.extracted, 1);
}

#[test]
fn dropped_routine_is_pruned_and_fingerprint_changes() {
    let mut source = MemorySource::new("demo")
        .with_procedure("dbo", "Keep", 1, "CREATE PROC dbo.Keep AS SELECT 1 AS A;")
        .with_procedure("dbo", "Drop", 2, "CREATE PROC dbo.Drop AS SELECT 2 AS B;");
    let out = tempfile::tempdir().unwrap();
    let options = PipelineOptions::default();

    let first = run_snapshot(&source, out.path(), None, &options, |_, _, _| {}).unwrap();

    source.remove("dbo", "Drop");
    let second = run_snapshot(&source, out.path(), None, &options, |_, _, _| {}).unwrap();
    assert_eq!(second.files_pruned, 1);
    assert_ne!(second.fingerprint, first.fingerprint);
    assert!(!out.path().join("procedures/dbo.Drop.json").exists());

    let index = read_index(out.path());
    assert_eq!(index.stats.procedures, 1);
    assert_eq!(index.fingerprint, second.fingerprint);
}

#[test]
fn dynamic_sql_is_left_unresolved() {
    let source = MemorySource::new("demo").with_procedure(
        "dbo",
        "Dyn",
        4,
        "CREATE PROC dbo.Dyn AS EXEC sp_executesql N'SELECT 1';",
    );
    let out = tempfile::tempdir().unwrap();
    let report = run_snapshot(&source, out.path(), None, &PipelineOptions::default(), |_, _, _| {})
        .unwrap();
    assert_eq!(report.forwarded, 0);

    let snap = read_proc(out.path(), "dbo", "Dyn");
    assert!(snap.result_sets.is_empty());
    assert!(snap.exec_targets.iter().all(|t| t.dynamic));
}

#[test]
fn index_records_parser_versions_and_counts() {
    let source = MemorySource::new("demo")
        .with_table(TableMetadata::new("dbo", "Users").column("Id", "int", false))
        .with_procedure("dbo", "P", 1, "CREATE PROC dbo.P AS SELECT 1 AS Id;");
    let out = tempfile::tempdir().unwrap();
    run_snapshot(&source, out.path(), None, &PipelineOptions::default(), |_, _, _| {}).unwrap();

    let index = read_index(out.path());
    assert!(!index.parser.tool_version.is_empty());
    assert!(index.parser.result_set_parser_version >= 1);
    assert_eq!(index.stats.procedures, 1);
    assert_eq!(index.stats.tables, 1);
    assert_eq!(index.procedures.len(), 1);
    assert_eq!(index.procedures[0].file, "dbo.P.json");
    assert_eq!(index.procedures[0].hash.len(), 16);
}
