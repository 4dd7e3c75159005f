//! Type resolution: a staged rule chain that fills in SQL types for the
//! columns extraction left pending.
//!
//! Rules apply in strict order and stop at the first match. Concrete columns
//! are never revisited; ambiguous columns skip the chain entirely and stay
//! untyped. Forced nullability (outer-join origin) upgrades the result
//! regardless of which rule fired, idempotently.

mod patterns;

use crate::context::RunContext;
use crate::error::DiagnosticKind;
use crate::model::{
    Column, ExpressionKind, JSON_TYPE, LiteralClass, Parameter, ResultSet, RoutineDescriptor,
};
use crate::source::MetadataSource;
use crate::typename;

/// String literals longer than this resolve to `nvarchar(max)`.
const TEXT_LENGTH_CAP: u32 = 4000;

/// Resolve every pending column of a routine's result sets, by
/// copy-replacement. The input is never mutated.
pub fn resolve_routine<M: MetadataSource>(
    ctx: &mut RunContext,
    source: &M,
    owner: &RoutineDescriptor,
    parameters: &[Parameter],
    sets: &[ResultSet],
) -> Vec<ResultSet> {
    sets.iter()
        .map(|rs| {
            let mut resolved = rs.clone();
            resolved.columns = rs
                .columns
                .iter()
                .map(|col| resolve_column(ctx, source, owner, parameters, col))
                .collect();
            resolved
        })
        .collect()
}

pub fn resolve_column<M: MetadataSource>(
    ctx: &mut RunContext,
    source: &M,
    owner: &RoutineDescriptor,
    parameters: &[Parameter],
    column: &Column,
) -> Column {
    let mut col = column.clone();
    col.columns = column
        .columns
        .iter()
        .map(|child| resolve_column(ctx, source, owner, parameters, child))
        .collect();

    if col.is_concrete() {
        upgrade_nullability(ctx, &mut col);
        return col;
    }

    if col.is_ambiguous {
        // Never guessed; left untyped, distinct from the fallback.
        ctx.diag(
            DiagnosticKind::TypeUnresolved,
            owner.qualified_name(),
            format!("column `{}` left untyped after ambiguous binding", col.name),
        );
        upgrade_nullability(ctx, &mut col);
        return col;
    }

    apply_rules(ctx, source, owner, parameters, &mut col);
    upgrade_nullability(ctx, &mut col);
    col
}

fn apply_rules<M: MetadataSource>(
    ctx: &mut RunContext,
    source: &M,
    owner: &RoutineDescriptor,
    parameters: &[Parameter],
    col: &mut Column,
) {
    // 1. JSON containers keep the symbolic type, never expanded to text.
    if col.is_json_container() {
        col.sql_type = Some(JSON_TYPE.to_string());
        col.nullable = true;
        return;
    }

    // 2. JSON_QUERY without an expanded container.
    if col.kind == ExpressionKind::JsonQuery {
        col.sql_type = Some("nvarchar(max)".to_string());
        col.nullable = true;
        col.max_length = -1;
        return;
    }

    // 3. Explicit CAST/CONVERT target, verbatim.
    if let Some(cast) = col.hints.cast_type.clone() {
        match typename::parse_type_name(&cast) {
            Ok(parsed) => {
                col.sql_type = Some(parsed.canonical());
                col.max_length = parsed.max_length();
            }
            Err(_) => col.sql_type = Some(cast),
        }
        return;
    }

    // 4. Aggregate table.
    if let Some(func) = col.aggregate_function.clone() {
        let (sql_type, nullable) = match func.as_str() {
            "count" => ("int", false),
            "count_big" => ("bigint", false),
            "avg" => ("decimal(18,2)", true),
            "exists" => ("bit", false),
            // sum/min/max preserve the operand literal class.
            _ => match col.hints.literal {
                Some(LiteralClass::Integer) => ("int", true),
                _ => ("decimal(18,2)", true),
            },
        };
        col.sql_type = Some(sql_type.to_string());
        if nullable {
            col.nullable = true;
        }
        return;
    }

    // 5. Literal inspection.
    match col.hints.literal {
        Some(LiteralClass::Integer) => {
            col.sql_type = Some("int".to_string());
            return;
        }
        Some(LiteralClass::Decimal) => {
            col.sql_type = Some("decimal(18,2)".to_string());
            return;
        }
        Some(LiteralClass::Text(len)) => {
            if len > TEXT_LENGTH_CAP {
                col.sql_type = Some("nvarchar(max)".to_string());
                col.max_length = -1;
            } else {
                let len = len.max(1);
                col.sql_type = Some(format!("nvarchar({len})"));
                col.max_length = len as i32;
            }
            return;
        }
        Some(LiteralClass::Guid) => {
            col.sql_type = Some("uniqueidentifier".to_string());
            return;
        }
        Some(LiteralClass::Null) | None => {}
    }

    // 6. Base-table binding against the memoized metadata index.
    if let Some(binding) = col.hints.source.clone() {
        let schema = binding
            .schema
            .clone()
            .unwrap_or_else(|| owner.schema.clone());
        let mut hit = ctx.source_column(source, &schema, &binding.table, &binding.column);
        if hit.is_none() && binding.schema.is_none() && !schema.eq_ignore_ascii_case("dbo") {
            hit = ctx.source_column(source, "dbo", &binding.table, &binding.column);
        }
        match hit {
            Some(meta) => {
                col.sql_type = Some(meta.sql_type.clone());
                col.nullable = meta.nullable;
                col.max_length = meta.max_length;
                let key = format!(
                    "{}|{}->{}",
                    owner.qualified_name(),
                    col.name,
                    meta.sql_type
                );
                if ctx.log_binding_once(key) {
                    ctx.table_resolutions += 1;
                }
                return;
            }
            None => {
                // Recorded, not guessed; later rules may still type the column.
                ctx.diag(
                    DiagnosticKind::MetadataLookupMiss,
                    owner.qualified_name(),
                    format!(
                        "no metadata for {}.{}.{}",
                        schema, binding.table, binding.column
                    ),
                );
            }
        }
    }

    // 7. Table-type field binding via the sole table-typed parameter.
    if let Some(param) = sole_table_type_parameter(parameters) {
        let type_schema = param.type_schema.as_deref().unwrap_or(&owner.schema);
        if let Some(meta) =
            ctx.table_type_column(source, type_schema, &param.sql_type, &col.name)
        {
            col.sql_type = Some(meta.sql_type.clone());
            col.nullable = meta.nullable;
            col.max_length = meta.max_length;
            return;
        }
    }

    // 8. Name-pattern heuristics.
    if let Some(pattern) = patterns::name_pattern_type(&col.name) {
        col.sql_type = Some(pattern.sql_type.to_string());
        col.max_length = pattern.max_length;
        return;
    }

    // 9. Fallback.
    col.sql_type = Some("nvarchar(max)".to_string());
    col.nullable = true;
    col.max_length = -1;
}

fn sole_table_type_parameter(parameters: &[Parameter]) -> Option<&Parameter> {
    let mut found = None;
    for param in parameters.iter().filter(|p| p.is_table_type) {
        if found.is_some() {
            return None;
        }
        found = Some(param);
    }
    found
}

fn upgrade_nullability(ctx: &mut RunContext, col: &mut Column) {
    if col.hints.forced_nullable && !col.nullable {
        col.nullable = true;
        ctx.nullability_upgrades += 1;
    }
}
