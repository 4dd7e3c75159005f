//! The SELECT walker: turns parsed queries into `ResultSet`/`Column` trees.
//!
//! Projection expressions map onto the closed `ExpressionKind` union; JSON
//! subqueries recurse with a hard depth ceiling; column references bind to
//! the FROM scope only when unambiguous.

use sqlparser::ast::{
    Expr, Function, FunctionArg, FunctionArgExpr, FunctionArguments, Query, Select, SelectItem,
    SetExpr, Statement, Value,
};

use crate::context::RunContext;
use crate::error::DiagnosticKind;
use crate::model::{Column, ExpressionKind, LiteralClass, ResultSet, SourceBinding};

use super::scope::{FromScope, SingleBinding};

/// Nested-JSON recursion ceiling. Deeper containers are left unexpanded
/// (`deferred`), never an error.
pub const MAX_JSON_DEPTH: u8 = 8;

const AGGREGATES: &[&str] = &["count", "count_big", "sum", "avg", "min", "max"];

/// Build result sets for every top-level query statement, in order.
pub(crate) fn resultsets_of_statements(
    ctx: &mut RunContext,
    object: &str,
    statements: &[Statement],
) -> Vec<ResultSet> {
    let mut sets = Vec::new();
    for stmt in statements {
        if let Statement::Query(query) = stmt {
            if let Some(rs) = resultset_of_query(ctx, object, query, 0) {
                sets.push(rs);
            }
        }
    }
    sets
}

fn select_of_query(query: &Query) -> Option<&Select> {
    let mut body = &*query.body;
    loop {
        match body {
            SetExpr::Select(select) => return Some(select.as_ref()),
            SetExpr::Query(inner) => body = &*inner.body,
            // UNION/EXCEPT/INTERSECT: the first branch fixes the shape.
            SetExpr::SetOperation { left, .. } => body = &**left,
            _ => return None,
        }
    }
}

fn for_json_flags(query: &Query) -> Option<(bool, Option<String>)> {
    use sqlparser::ast::ForClause;
    match &query.for_clause {
        Some(ForClause::Json {
            root,
            without_array_wrapper,
            ..
        }) => Some((!*without_array_wrapper, root.clone())),
        _ => None,
    }
}

pub(crate) fn resultset_of_query(
    ctx: &mut RunContext,
    object: &str,
    query: &Query,
    depth: u8,
) -> Option<ResultSet> {
    let select = select_of_query(query)?;

    // SELECT ... INTO and variable-assignment SELECTs return nothing to the
    // client.
    if select.into.is_some() || is_assignment_select(select) {
        return None;
    }

    let mut rs = ResultSet::default();
    if let Some((as_array, root)) = for_json_flags(query) {
        rs.returns_json = true;
        rs.returns_json_array = as_array;
        rs.json_root = root;
    }

    let scope = FromScope::of_select(select);
    for item in &select.projection {
        match item {
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(_, _) => {
                rs.has_select_star = true;
            }
            SelectItem::UnnamedExpr(expr) => {
                let name = trailing_name(expr).unwrap_or_default();
                rs.columns
                    .push(column_of_expr(ctx, object, &scope, name, expr, depth));
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                rs.columns.push(column_of_expr(
                    ctx,
                    object,
                    &scope,
                    alias.value.clone(),
                    expr,
                    depth,
                ));
            }
        }
    }
    Some(rs)
}

fn is_assignment_select(select: &Select) -> bool {
    select.projection.iter().any(|item| {
        if let SelectItem::UnnamedExpr(Expr::BinaryOp { left, op, .. }) = item {
            matches!(op, sqlparser::ast::BinaryOperator::Eq)
                && matches!(&**left, Expr::Identifier(id) if id.value.starts_with('@'))
        } else {
            false
        }
    })
}

/// Alias fallback: the trailing identifier of the expression.
fn trailing_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(id) => Some(id.value.clone()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|id| id.value.clone()),
        Expr::Cast { expr, .. } => trailing_name(expr),
        Expr::Nested(inner) => trailing_name(inner),
        _ => None,
    }
}

fn unwrap_subquery(expr: &Expr) -> Option<&Query> {
    match expr {
        Expr::Subquery(query) => Some(query.as_ref()),
        Expr::Nested(inner) => unwrap_subquery(inner),
        _ => None,
    }
}

fn function_name(func: &Function) -> String {
    func.name
        .0
        .last()
        .and_then(|part| part.as_ident())
        .map(|ident| ident.value.to_lowercase())
        .unwrap_or_default()
}

fn function_arg_exprs(func: &Function) -> Vec<&Expr> {
    match &func.args {
        FunctionArguments::List(list) => list
            .args
            .iter()
            .filter_map(|arg| match arg {
                FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => Some(e),
                FunctionArg::Named {
                    arg: FunctionArgExpr::Expr(e),
                    ..
                } => Some(e),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Literal classification of an expression, propagated through aggregates,
/// IIF branches, CASE results and computed arithmetic. Best-effort.
fn literal_class(expr: &Expr) -> Option<LiteralClass> {
    match expr {
        Expr::Value(value) => literal_class_of_value(&value.value),
        Expr::Nested(inner) => literal_class(inner),
        Expr::UnaryOp { expr, .. } => literal_class(expr),
        Expr::BinaryOp { left, op, right } => {
            use sqlparser::ast::BinaryOperator::*;
            if !matches!(op, Plus | Minus | Multiply | Divide | Modulo) {
                return None;
            }
            let lhs = literal_class(left)?;
            let rhs = literal_class(right)?;
            LiteralClass::combine(Some(lhs), rhs)
        }
        Expr::Function(func) => {
            let args = function_arg_exprs(func);
            match function_name(func).as_str() {
                "count" | "count_big" => Some(LiteralClass::Integer),
                "avg" => Some(LiteralClass::Decimal),
                "sum" | "min" | "max" => combined_class(&args),
                // IIF(cond, a, b): the condition does not contribute.
                "iif" => combined_class(args.get(1..).unwrap_or_default()),
                _ => None,
            }
        }
        Expr::Case {
            conditions,
            else_result,
            ..
        } => {
            let mut class = None;
            for when in conditions {
                class = LiteralClass::combine(class, literal_class(&when.result)?);
            }
            if let Some(else_result) = else_result {
                class = LiteralClass::combine(class, literal_class(else_result)?);
            }
            class
        }
        _ => None,
    }
}

fn combined_class(exprs: &[&Expr]) -> Option<LiteralClass> {
    let mut class = None;
    for expr in exprs {
        class = LiteralClass::combine(class, literal_class(expr)?);
    }
    class
}

fn literal_class_of_value(value: &Value) -> Option<LiteralClass> {
    match value {
        Value::Number(text, _) => {
            if text.contains('.') || text.contains('e') || text.contains('E') {
                Some(LiteralClass::Decimal)
            } else {
                Some(LiteralClass::Integer)
            }
        }
        Value::SingleQuotedString(s) | Value::NationalStringLiteral(s) => {
            if uuid::Uuid::parse_str(s).is_ok() {
                Some(LiteralClass::Guid)
            } else {
                Some(LiteralClass::Text(s.chars().count() as u32))
            }
        }
        Value::Boolean(_) => Some(LiteralClass::Integer),
        Value::Null => Some(LiteralClass::Null),
        _ => None,
    }
}

fn is_zero_or_one(expr: &Expr) -> bool {
    match expr {
        Expr::Value(v) => matches!(&v.value, Value::Number(n, _) if n == "0" || n == "1"),
        Expr::Nested(inner) => is_zero_or_one(inner),
        _ => false,
    }
}

fn cast_target_text(data_type: &sqlparser::ast::DataType) -> String {
    data_type.to_string().to_lowercase().replace(", ", ",")
}

pub(crate) fn column_of_expr(
    ctx: &mut RunContext,
    object: &str,
    scope: &FromScope,
    name: String,
    expr: &Expr,
    depth: u8,
) -> Column {
    match expr {
        Expr::Identifier(id) if id.value.starts_with('@') => {
            let mut col = Column::named(name);
            col.kind = ExpressionKind::Computed;
            col
        }
        Expr::Identifier(id) => {
            let mut col = Column::named(name);
            match scope.resolve_single() {
                SingleBinding::Table(table) => {
                    col.hints.forced_nullable = table.forced_nullable;
                    if let Some(table_name) = &table.table {
                        col.hints.source = Some(SourceBinding {
                            schema: table.schema.clone(),
                            table: table_name.clone(),
                            column: id.value.clone(),
                        });
                    }
                }
                SingleBinding::Ambiguous => {
                    col.is_ambiguous = true;
                    ctx.diag(
                        DiagnosticKind::AmbiguousBinding,
                        object,
                        format!("column `{}` matches more than one table in scope", id.value),
                    );
                }
                SingleBinding::None => {}
            }
            col
        }
        Expr::CompoundIdentifier(parts) => {
            let mut col = Column::named(name);
            match parts.as_slice() {
                [qualifier, column] => {
                    if let Some(table) = scope.resolve_qualifier(&qualifier.value) {
                        col.hints.forced_nullable = table.forced_nullable;
                        if let Some(table_name) = &table.table {
                            col.hints.source = Some(SourceBinding {
                                schema: table.schema.clone(),
                                table: table_name.clone(),
                                column: column.value.clone(),
                            });
                        }
                    }
                }
                [schema, table, column] => {
                    let forced = scope
                        .resolve_qualifier(&table.value)
                        .map(|t| t.forced_nullable)
                        .unwrap_or(false);
                    col.hints.forced_nullable = forced;
                    col.hints.source = Some(SourceBinding {
                        schema: Some(schema.value.clone()),
                        table: table.value.clone(),
                        column: column.value.clone(),
                    });
                }
                _ => {}
            }
            col
        }
        Expr::Value(value) => {
            let mut col = Column::named(name);
            col.kind = ExpressionKind::Literal;
            col.hints.literal = literal_class_of_value(&value.value);
            if matches!(value.value, Value::Null) {
                col.nullable = true;
            }
            col
        }
        Expr::Cast { expr, data_type, .. } => {
            let mut col = column_of_expr(ctx, object, scope, name, expr, depth);
            col.kind = ExpressionKind::Cast;
            col.hints.cast_type = Some(cast_target_text(data_type));
            col.hints.literal = None;
            col
        }
        Expr::Convert {
            data_type: Some(data_type),
            ..
        } => {
            let mut col = Column::named(name);
            col.kind = ExpressionKind::Cast;
            col.hints.cast_type = Some(cast_target_text(data_type));
            col
        }
        Expr::Exists { .. } => {
            let mut col = Column::named(name);
            col.kind = ExpressionKind::FunctionCall;
            col.is_aggregate = true;
            col.aggregate_function = Some("exists".to_string());
            col
        }
        Expr::Subquery(query) => {
            if for_json_flags(query).is_some() {
                json_container_column(ctx, object, name, query, depth)
            } else {
                scalar_subquery_column(ctx, object, name, query, depth)
            }
        }
        Expr::Function(func) => {
            let fname = function_name(func);
            let args = function_arg_exprs(func);

            if fname == "json_query" {
                if let Some(query) = args.first().and_then(|e| unwrap_subquery(e)) {
                    if for_json_flags(query).is_some() {
                        return json_container_column(ctx, object, name, query, depth);
                    }
                }
                let mut col = Column::named(name);
                col.kind = ExpressionKind::JsonQuery;
                return col;
            }

            let mut col = Column::named(name);
            col.kind = ExpressionKind::FunctionCall;
            if AGGREGATES.contains(&fname.as_str()) {
                col.is_aggregate = true;
                col.aggregate_function = Some(fname.clone());
                col.hints.literal = combined_class(&args);
                // MIN/MAX of a single cast literal adopts the cast's type.
                if matches!(fname.as_str(), "min" | "max") {
                    if let [Expr::Cast { data_type, .. }] = args.as_slice() {
                        col.hints.cast_type = Some(cast_target_text(data_type));
                    }
                }
            } else {
                col.hints.literal = literal_class(expr);
            }
            col
        }
        Expr::Case {
            conditions,
            else_result,
            ..
        } => {
            let mut col = Column::named(name);
            col.kind = ExpressionKind::Computed;
            let bit_shaped = !conditions.is_empty()
                && conditions.iter().all(|when| is_zero_or_one(&when.result))
                && else_result.as_deref().map(is_zero_or_one).unwrap_or(true);
            if bit_shaped {
                col.sql_type = Some("bit".to_string());
                if else_result.is_none() {
                    col.nullable = true;
                }
            } else {
                col.hints.literal = literal_class(expr);
            }
            col
        }
        Expr::Nested(inner) => column_of_expr(ctx, object, scope, name, inner, depth),
        other => {
            let mut col = Column::named(name);
            col.kind = ExpressionKind::Computed;
            col.hints.literal = literal_class(other);
            col
        }
    }
}

fn json_container_column(
    ctx: &mut RunContext,
    object: &str,
    name: String,
    query: &Query,
    depth: u8,
) -> Column {
    let mut col = Column::named(name);
    col.kind = ExpressionKind::JsonQuery;
    col.nullable = true;
    if depth >= MAX_JSON_DEPTH {
        col.deferred = true;
        return col;
    }
    match resultset_of_query(ctx, object, query, depth + 1) {
        Some(child) => col.columns = child.columns,
        None => col.deferred = true,
    }
    col
}

/// A scalar subquery adopts the classification of its single projected
/// expression, renamed and forced nullable.
fn scalar_subquery_column(
    ctx: &mut RunContext,
    object: &str,
    name: String,
    query: &Query,
    depth: u8,
) -> Column {
    let fallback = |name: String| {
        let mut col = Column::named(name);
        col.kind = ExpressionKind::Computed;
        col.nullable = true;
        col
    };
    if depth >= MAX_JSON_DEPTH {
        return fallback(name);
    }
    let Some(select) = select_of_query(query) else {
        return fallback(name);
    };
    let inner_scope = FromScope::of_select(select);
    let expr = match select.projection.as_slice() {
        [SelectItem::UnnamedExpr(expr)] => expr,
        [SelectItem::ExprWithAlias { expr, .. }] => expr,
        _ => return fallback(name),
    };
    let mut col = column_of_expr(ctx, object, &inner_scope, name, expr, depth + 1);
    col.nullable = true;
    col.hints.forced_nullable = true;
    col
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::MsSqlDialect;
    use sqlparser::parser::Parser;

    fn extract(sql: &str) -> Vec<ResultSet> {
        let stmts = Parser::parse_sql(&MsSqlDialect {}, sql).unwrap();
        let mut ctx = RunContext::new();
        resultsets_of_statements(&mut ctx, "dbo.Test", &stmts)
    }

    #[test]
    fn test_for_json_path_without_wrapper() {
        let sets = extract("SELECT 1 AS Id FOR JSON PATH, WITHOUT_ARRAY_WRAPPER");
        assert_eq!(sets.len(), 1);
        assert!(sets[0].returns_json);
        assert!(!sets[0].returns_json_array);
        assert_eq!(sets[0].columns.len(), 1);
        assert_eq!(sets[0].columns[0].name, "Id");
    }

    #[test]
    fn test_for_json_root() {
        let sets = extract("SELECT 1 AS Id FOR JSON PATH, ROOT('data')");
        assert!(sets[0].returns_json);
        assert!(sets[0].returns_json_array);
        assert_eq!(sets[0].json_root.as_deref(), Some("data"));
    }

    #[test]
    fn test_quoted_dotted_alias_is_kept_verbatim() {
        let sets = extract("SELECT 1 AS 'meta.count' FOR JSON PATH");
        assert_eq!(sets[0].columns[0].name, "meta.count");
    }

    #[test]
    fn test_trailing_identifier_alias() {
        let sets = extract("SELECT u.DisplayName FROM dbo.Users u");
        assert_eq!(sets[0].columns[0].name, "DisplayName");
        let binding = sets[0].columns[0].hints.source.as_ref().unwrap();
        assert_eq!(binding.table, "Users");
        assert_eq!(binding.column, "DisplayName");
    }

    #[test]
    fn test_sum_iif_literal_class() {
        let sets = extract("SELECT SUM(IIF(x = 1, 1, 0)) AS 'c' FROM dbo.T");
        let col = &sets[0].columns[0];
        assert!(col.is_aggregate);
        assert_eq!(col.aggregate_function.as_deref(), Some("sum"));
        assert_eq!(col.hints.literal, Some(LiteralClass::Integer));
    }

    #[test]
    fn test_case_when_bit_shaped() {
        let sets = extract("SELECT CASE WHEN a = 1 THEN 1 ELSE 0 END AS IsOn FROM dbo.T");
        assert_eq!(sets[0].columns[0].sql_type.as_deref(), Some("bit"));
    }

    #[test]
    fn test_ambiguous_single_part_reference() {
        let sets = extract("SELECT Id FROM dbo.A, dbo.B");
        assert!(sets[0].columns[0].is_ambiguous);
        assert!(sets[0].columns[0].sql_type.is_none());
    }

    #[test]
    fn test_select_star_flag() {
        let sets = extract("SELECT * FROM dbo.Users");
        assert!(sets[0].has_select_star);
        assert!(sets[0].columns.is_empty());
    }

    #[test]
    fn test_nested_json_subquery_becomes_container() {
        let sets = extract(
            "SELECT o.Id, (SELECT i.Sku AS Sku FROM dbo.Items i FOR JSON PATH) AS Lines \
             FROM dbo.Orders o FOR JSON PATH",
        );
        let lines = &sets[0].columns[1];
        assert_eq!(lines.kind, ExpressionKind::JsonQuery);
        assert_eq!(lines.columns.len(), 1);
        assert_eq!(lines.columns[0].name, "Sku");
    }

    #[test]
    fn test_cast_target_captured() {
        let sets = extract("SELECT CAST(Total AS decimal(18, 2)) AS Total FROM dbo.Orders");
        let col = &sets[0].columns[0];
        assert_eq!(col.kind, ExpressionKind::Cast);
        assert_eq!(col.hints.cast_type.as_deref(), Some("decimal(18,2)"));
    }

    #[test]
    fn test_assignment_select_produces_no_set() {
        let sets = extract("SELECT @total = COUNT(*) FROM dbo.Orders");
        assert!(sets.is_empty());
    }

    #[test]
    fn test_left_join_forces_nullable_hint() {
        let sets =
            extract("SELECT b.Title FROM dbo.A a LEFT JOIN dbo.B b ON a.Id = b.AId");
        assert!(sets[0].columns[0].hints.forced_nullable);
    }
}
