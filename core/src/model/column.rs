use serde::{Deserialize, Serialize};

use super::{is_false, is_zero_i32};

/// The JSON container sentinel type. Columns carrying it are structural and
/// are never expanded to a textual SQL type.
pub const JSON_TYPE: &str = "json";

/// What kind of expression produced a column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpressionKind {
    /// A direct column reference (`a.Name`, `Name`).
    #[default]
    Identifier,
    /// A function call, including aggregates.
    FunctionCall,
    /// CAST/CONVERT with an explicit target type.
    Cast,
    /// Arithmetic, CASE, scalar subqueries and anything else computed.
    Computed,
    /// `JSON_QUERY(...)` or a projected `(SELECT ... FOR JSON ...)`.
    JsonQuery,
    /// A bare literal.
    Literal,
}

impl ExpressionKind {
    pub(crate) fn is_default(v: &ExpressionKind) -> bool {
        *v == ExpressionKind::Identifier
    }
}

/// What a [`ColumnReference`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceKind {
    Procedure,
    Function,
    Table,
    TableType,
}

/// Provenance of a column that was copied from another object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ColumnReference {
    pub kind: ReferenceKind,
    pub schema: String,
    pub name: String,
}

/// Literal classification captured by the extractor and consumed by the
/// resolution chain. Integer-vs-decimal class propagates through aggregates
/// and computed arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralClass {
    Integer,
    Decimal,
    /// Quoted string with its character length.
    Text(u32),
    Guid,
    Null,
}

impl LiteralClass {
    /// Combine two operand classes the way computed arithmetic does: the
    /// result is integer only when every operand is integer-class. Text
    /// operands keep the longer length. `Null` is the identity. A mix of
    /// unrelated classes yields `None`. Best-effort by design.
    pub fn combine(a: Option<LiteralClass>, b: LiteralClass) -> Option<LiteralClass> {
        use LiteralClass::*;
        let Some(a) = a else {
            return Some(b);
        };
        match (a, b) {
            (Null, x) | (x, Null) => Some(x),
            (Integer, Integer) => Some(Integer),
            (Integer, Decimal) | (Decimal, Integer) | (Decimal, Decimal) => Some(Decimal),
            (Text(x), Text(y)) => Some(Text(x.max(y))),
            (Guid, Guid) => Some(Guid),
            _ => None,
        }
    }
}

/// Source binding of a directly-referenced column, recorded only when the
/// owning table is unambiguous in scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBinding {
    pub schema: Option<String>,
    pub table: String,
    pub column: String,
}

/// Extractor-internal facts the resolution chain consumes. Never serialized;
/// hydrated columns come back without hints, which is fine because hydration
/// only reuses concrete columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnHints {
    /// CAST/CONVERT target type text, normalized lowercase.
    pub cast_type: Option<String>,
    /// Literal class of the expression itself (or its combined operands).
    pub literal: Option<LiteralClass>,
    /// Bound source column, when unambiguous.
    pub source: Option<SourceBinding>,
    /// The column originates from the nullable side of an outer join.
    pub forced_nullable: bool,
}

/// One projected column. Recursive: JSON container columns own their child
/// columns; a container with zero children is a deliberate unexpanded
/// container (forwarded or deferred), not an empty one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Column {
    pub name: String,

    /// Resolved SQL type. `None` means still pending (or deliberately left
    /// unresolved for ambiguous references).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_type: Option<String>,

    #[serde(skip_serializing_if = "is_false")]
    pub nullable: bool,

    #[serde(skip_serializing_if = "is_zero_i32")]
    pub max_length: i32,

    #[serde(skip_serializing_if = "is_false")]
    pub is_aggregate: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate_function: Option<String>,

    #[serde(skip_serializing_if = "ExpressionKind::is_default")]
    pub kind: ExpressionKind,

    /// Child columns; present only when this column is a JSON container.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<Column>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<ColumnReference>,

    /// Expansion was deliberately deferred (recursion ceiling reached).
    #[serde(skip_serializing_if = "is_false")]
    pub deferred: bool,

    #[serde(skip_serializing_if = "is_false")]
    pub is_ambiguous: bool,

    #[serde(skip)]
    pub hints: ColumnHints,
}

impl Column {
    pub fn named(name: impl Into<String>) -> Self {
        Column {
            name: name.into(),
            ..Column::default()
        }
    }

    /// A type is concrete when it is non-empty and not the JSON sentinel.
    /// Concrete columns are never re-typed.
    pub fn is_concrete(&self) -> bool {
        self.sql_type
            .as_deref()
            .is_some_and(|t| !t.is_empty() && t != JSON_TYPE)
    }

    /// True when this column is a JSON container: it owns children, or it is
    /// an unexpanded (deferred/forwarded) JsonQuery projection.
    pub fn is_json_container(&self) -> bool {
        !self.columns.is_empty() || (self.kind == ExpressionKind::JsonQuery && self.deferred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concrete_excludes_json_sentinel() {
        let mut col = Column::named("Payload");
        assert!(!col.is_concrete());
        col.sql_type = Some(JSON_TYPE.to_string());
        assert!(!col.is_concrete());
        col.sql_type = Some("nvarchar(max)".to_string());
        assert!(col.is_concrete());
    }

    #[test]
    fn test_literal_class_combine() {
        use LiteralClass::*;
        assert_eq!(LiteralClass::combine(None, Integer), Some(Integer));
        assert_eq!(LiteralClass::combine(Some(Integer), Integer), Some(Integer));
        assert_eq!(LiteralClass::combine(Some(Integer), Decimal), Some(Decimal));
        assert_eq!(LiteralClass::combine(Some(Null), Integer), Some(Integer));
        assert_eq!(LiteralClass::combine(Some(Text(5)), Text(9)), Some(Text(9)));
        assert_eq!(LiteralClass::combine(Some(Guid), Integer), None);
    }

    #[test]
    fn test_serialized_defaults_are_omitted() {
        let col = Column::named("Id");
        let json = serde_json::to_string(&col).unwrap();
        assert_eq!(json, r#"{"Name":"Id"}"#);
    }
}
