//! Data model for routine shapes and physical schema metadata.
//!
//! Everything serialized here follows the snapshot conventions: PascalCase
//! keys, defaults omitted (false booleans, zero numerics, empty collections
//! and `None` are absent rather than explicit). Field declaration order is
//! the canonical key order.

mod column;
mod resultset;
mod routine;
mod schema;

pub use self::column::{
    Column, ColumnHints, ColumnReference, ExpressionKind, JSON_TYPE, LiteralClass, ReferenceKind,
    SourceBinding,
};
pub use self::resultset::ResultSet;
pub use self::routine::{ExecTargetRef, Parameter, RoutineDescriptor, RoutineKind, RoutineSnapshot};
pub use self::schema::{
    DatabaseSchema, MetaColumn, ScalarTypeMetadata, TableMetadata, TableTypeMetadata,
};

pub(crate) fn is_false(v: &bool) -> bool {
    !*v
}

pub(crate) fn is_zero_i32(v: &i32) -> bool {
    *v == 0
}

pub(crate) fn is_zero_u8(v: &u8) -> bool {
    *v == 0
}
