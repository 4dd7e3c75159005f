//! Result-shape extraction: routine definition text in, `ResultSet` trees and
//! EXEC targets out.
//!
//! Extraction never raises. A whole-routine parse failure yields an empty
//! shape with an error count, the first message and a fallback marker; the
//! secondary regex path still captures EXEC targets so wrappers keep
//! forwarding. Processing of other routines always continues.

pub(crate) mod body;
mod exec;
mod scope;
mod shape;

pub use self::body::{split_batches, split_routine_body};
pub use self::exec::scan_exec_targets;
pub use self::shape::MAX_JSON_DEPTH;

use sqlparser::dialect::MsSqlDialect;
use sqlparser::parser::Parser;

use crate::context::RunContext;
use crate::error::DiagnosticKind;
use crate::model::{ExecTargetRef, ResultSet};

/// Version tag of the shape extractor, recorded in the snapshot index so
/// consumers can detect when shapes need a rebuild.
pub const RESULT_SET_PARSER_VERSION: u32 = 4;

/// Everything extraction learned about one routine.
#[derive(Debug, Clone, Default)]
pub struct ShapeExtraction {
    pub result_sets: Vec<ResultSet>,
    pub exec_targets: Vec<ExecTargetRef>,
    pub error_count: u32,
    pub first_error: Option<String>,
    pub used_fallback: bool,
}

impl ShapeExtraction {
    fn record_error(&mut self, message: impl Into<String>) {
        self.error_count += 1;
        if self.first_error.is_none() {
            self.first_error = Some(message.into());
        }
    }
}

/// Extract the result shape of one routine definition.
pub fn extract_result_shape(
    ctx: &mut RunContext,
    schema: &str,
    name: &str,
    definition: &str,
) -> ShapeExtraction {
    let object = format!("{schema}.{name}");
    let mut extraction = ShapeExtraction::default();

    // Definitions scripted with SET options carry multiple batches; the one
    // with the CREATE is the routine.
    let batch = split_batches(definition)
        .into_iter()
        .find(|b| {
            let upper = b.to_uppercase();
            upper.contains("CREATE") && (upper.contains("PROC") || upper.contains("FUNCTION"))
        })
        .unwrap_or(definition);

    let body = match split_routine_body(batch) {
        Some((_, body)) => body,
        None => batch,
    };

    extraction.exec_targets = scan_exec_targets(body);

    let dialect = MsSqlDialect {};
    match Parser::parse_sql(&dialect, body) {
        Ok(statements) => {
            extraction.result_sets = shape::resultsets_of_statements(ctx, &object, &statements);
        }
        Err(first_err) => {
            // Salvage statement by statement; T-SQL control flow the parser
            // does not know degrades single statements, not the routine.
            let mut salvaged = 0usize;
            for stmt_text in body::split_statements(body) {
                match Parser::parse_sql(&dialect, stmt_text) {
                    Ok(statements) => {
                        salvaged += 1;
                        extraction
                            .result_sets
                            .extend(shape::resultsets_of_statements(ctx, &object, &statements));
                    }
                    Err(e) => extraction.record_error(e.to_string()),
                }
            }
            if salvaged == 0 {
                extraction.result_sets.clear();
                extraction.used_fallback = true;
                if extraction.error_count == 0 {
                    extraction.record_error(first_err.to_string());
                }
                ctx.diag(
                    DiagnosticKind::ParseFailure,
                    &object,
                    extraction
                        .first_error
                        .clone()
                        .unwrap_or_else(|| "unparsable definition".to_string()),
                );
            }
        }
    }

    extraction
}
