//! Parser for declared SQL type text: `nvarchar(50)`, `decimal(18, 2)`,
//! `varbinary(max)`, `[dbo].[OrderIdList]`.
//!
//! Shared by parameter extraction, cast-target normalization and metadata
//! loading, so every component agrees on what a type name means.

use nom::branch::alt;
use nom::bytes::complete::{tag_no_case, take_until, take_while1};
use nom::character::complete::{char, multispace0, u32 as dec_u32};
use nom::combinator::{all_consuming, map, opt, value};
use nom::sequence::{delimited, preceded};
use nom::{IResult, Parser};

use crate::error::{Error, Result};

/// Arguments of a type name. A single argument is a length for character and
/// binary types and a precision for everything else; interpretation is left
/// to the accessors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TypeArgs {
    #[default]
    None,
    Max,
    One(u32),
    Two(u32, u32),
}

/// A parsed SQL type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTypeName {
    /// Schema qualifier of a user-defined type; absent for built-ins.
    pub schema: Option<String>,
    pub base: String,
    pub args: TypeArgs,
}

const BUILTINS: &[&str] = &[
    "bigint",
    "binary",
    "bit",
    "char",
    "date",
    "datetime",
    "datetime2",
    "datetimeoffset",
    "decimal",
    "float",
    "geography",
    "geometry",
    "hierarchyid",
    "image",
    "int",
    "money",
    "nchar",
    "ntext",
    "numeric",
    "nvarchar",
    "real",
    "rowversion",
    "smalldatetime",
    "smallint",
    "smallmoney",
    "sql_variant",
    "text",
    "time",
    "timestamp",
    "tinyint",
    "uniqueidentifier",
    "varbinary",
    "varchar",
    "xml",
];

impl SqlTypeName {
    pub fn is_builtin(&self) -> bool {
        self.schema.is_none() && BUILTINS.contains(&self.base.to_lowercase().as_str())
    }

    /// Canonical text: built-ins lowercase with normalized argument spacing,
    /// user-defined types with their original casing.
    pub fn canonical(&self) -> String {
        let base = if self.is_builtin() {
            self.base.to_lowercase()
        } else {
            self.base.clone()
        };
        match self.args {
            TypeArgs::None => base,
            TypeArgs::Max => format!("{base}(max)"),
            TypeArgs::One(n) => format!("{base}({n})"),
            TypeArgs::Two(p, s) => format!("{base}({p},{s})"),
        }
    }

    /// Character length, for character/binary types. `-1` is MAX.
    pub fn max_length(&self) -> i32 {
        let lower = self.base.to_lowercase();
        let is_sized = matches!(
            lower.as_str(),
            "char" | "nchar" | "varchar" | "nvarchar" | "binary" | "varbinary"
        );
        match self.args {
            TypeArgs::Max if is_sized => -1,
            TypeArgs::One(n) if is_sized => n as i32,
            _ => 0,
        }
    }

    pub fn precision(&self) -> u8 {
        match (self.args, self.base.to_lowercase().as_str()) {
            (TypeArgs::One(p), "decimal" | "numeric") => p as u8,
            (TypeArgs::Two(p, _), "decimal" | "numeric") => p as u8,
            _ => 0,
        }
    }

    pub fn scale(&self) -> u8 {
        match (self.args, self.base.to_lowercase().as_str()) {
            (TypeArgs::Two(_, s), "decimal" | "numeric") => s as u8,
            _ => 0,
        }
    }
}

fn ident(i: &str) -> IResult<&str, String> {
    alt((
        map(delimited(char('['), take_until("]"), char(']')), |s: &str| {
            s.to_string()
        }),
        map(
            take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '#')),
            |s: &str| s.to_string(),
        ),
    ))
    .parse(i)
}

fn qualified(i: &str) -> IResult<&str, (Option<String>, String)> {
    map(
        (
            ident,
            opt(preceded((multispace0, char('.'), multispace0), ident)),
        ),
        |(first, second)| match second {
            Some(name) => (Some(first), name),
            None => (None, first),
        },
    )
    .parse(i)
}

fn type_args(i: &str) -> IResult<&str, TypeArgs> {
    delimited(
        preceded(multispace0, char('(')),
        preceded(
            multispace0,
            alt((
                value(TypeArgs::Max, tag_no_case("max")),
                map(
                    (
                        dec_u32,
                        opt(preceded((multispace0, char(','), multispace0), dec_u32)),
                    ),
                    |(first, second)| match second {
                        Some(s) => TypeArgs::Two(first, s),
                        None => TypeArgs::One(first),
                    },
                ),
            )),
        ),
        preceded(multispace0, char(')')),
    )
    .parse(i)
}

fn type_name(i: &str) -> IResult<&str, SqlTypeName> {
    map(
        (
            preceded(multispace0, qualified),
            opt(type_args),
            multispace0,
        ),
        |((schema, base), args, _)| SqlTypeName {
            schema,
            base,
            args: args.unwrap_or_default(),
        },
    )
    .parse(i)
}

/// Parse a complete type name; trailing garbage is an error.
pub fn parse_type_name(input: &str) -> Result<SqlTypeName> {
    match all_consuming(type_name).parse(input) {
        Ok((_, t)) => Ok(t),
        Err(_) => Err(Error::TypeName(input.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_builtin() {
        let t = parse_type_name("int").unwrap();
        assert_eq!(t.base, "int");
        assert_eq!(t.args, TypeArgs::None);
        assert_eq!(t.canonical(), "int");
    }

    #[test]
    fn test_sized_nvarchar() {
        let t = parse_type_name("NVARCHAR(50)").unwrap();
        assert_eq!(t.canonical(), "nvarchar(50)");
        assert_eq!(t.max_length(), 50);
    }

    #[test]
    fn test_nvarchar_max() {
        let t = parse_type_name("nvarchar ( MAX )").unwrap();
        assert_eq!(t.canonical(), "nvarchar(max)");
        assert_eq!(t.max_length(), -1);
    }

    #[test]
    fn test_decimal_precision_scale() {
        let t = parse_type_name("decimal(18, 2)").unwrap();
        assert_eq!(t.canonical(), "decimal(18,2)");
        assert_eq!(t.precision(), 18);
        assert_eq!(t.scale(), 2);
        assert_eq!(t.max_length(), 0);
    }

    #[test]
    fn test_bracketed_udt() {
        let t = parse_type_name("[dbo].[OrderIdList]").unwrap();
        assert_eq!(t.schema.as_deref(), Some("dbo"));
        assert_eq!(t.base, "OrderIdList");
        assert!(!t.is_builtin());
        assert_eq!(t.canonical(), "OrderIdList");
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(parse_type_name("int OUTPUT").is_err());
    }
}
