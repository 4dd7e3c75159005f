//! Parameter extraction from CREATE PROCEDURE/FUNCTION headers.
//!
//! A scanner-based pass over the header text (comments and string defaults
//! blanked, brackets kept): name, declared type, default, OUTPUT and
//! READONLY, with type references resolved against scalar and table user
//! types or built-ins.

use std::sync::LazyLock;

use regex::Regex;

use crate::extract::body::{code_mask_keep_brackets, split_routine_body};
use crate::extract::split_batches;
use crate::model::{DatabaseSchema, Parameter};
use crate::typename;

static HEADER_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)\bCREATE\s+(?:OR\s+ALTER\s+)?(?:PROC(?:EDURE)?|FUNCTION)\s+((?:\[[^\]]+\]|[\w$#]+)(?:\s*\.\s*(?:\[[^\]]+\]|[\w$#]+))*)",
    )
    .expect("header name pattern")
});

static PARAM_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*(@[\w$#]+)\s*(.*)$").expect("param name pattern"));

static TRAILING_FLAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(output|out|readonly)\s*$").expect("trailing flag pattern")
});

/// Blank every non-code byte to a space, keeping byte offsets stable.
/// Non-ASCII bytes are blanked too so the result stays one byte per byte.
fn blanked(text: &str) -> String {
    let mask = code_mask_keep_brackets(text);
    text.bytes()
        .zip(mask)
        .map(|(b, live)| if live && b.is_ascii() { b as char } else { ' ' })
        .collect()
}

/// Extract the declared parameters of a routine definition.
pub(crate) fn extract_parameters(
    definition: &str,
    schema_doc: &DatabaseSchema,
    default_schema: &str,
) -> Vec<Parameter> {
    let batch = split_batches(definition)
        .into_iter()
        .find(|b| {
            let upper = b.to_uppercase();
            upper.contains("CREATE") && (upper.contains("PROC") || upper.contains("FUNCTION"))
        })
        .unwrap_or(definition);

    let header = match split_routine_body(batch) {
        Some((header, _)) => header,
        None => batch,
    };

    let masked = blanked(header);
    let Some(name_match) = HEADER_NAME_RE.captures(&masked).and_then(|c| c.get(1)) else {
        return Vec::new();
    };

    let region_start = name_match.end();
    let region = &header[region_start..];
    let region_masked = &masked[region_start..];

    let (decls, decls_masked) = parameter_region(region, region_masked);

    split_top_level(decls, decls_masked, b',')
        .into_iter()
        .filter_map(|(text, masked)| parse_parameter(text, masked, schema_doc, default_schema))
        .collect()
}

/// Narrow the post-name header to the parameter declarations: either the
/// parenthesized list, or everything up to a standalone WITH/RETURNS/FOR.
fn parameter_region<'a>(region: &'a str, masked: &'a str) -> (&'a str, &'a str) {
    let trimmed_offset = masked.len() - masked.trim_start().len();
    let after = &masked[trimmed_offset..];
    if after.starts_with('(') {
        let mut depth = 0i32;
        for (i, b) in after.bytes().enumerate() {
            match b {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        let start = trimmed_offset + 1;
                        let end = trimmed_offset + i;
                        return (&region[start..end], &masked[start..end]);
                    }
                }
                _ => {}
            }
        }
    }

    let mut end = region.len();
    let mut depth = 0i32;
    let bytes = masked.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ if depth == 0 => {
                for kw in [&b"WITH"[..], b"RETURNS", b"FOR"] {
                    if bytes.len() - i >= kw.len()
                        && bytes[i..i + kw.len()].eq_ignore_ascii_case(kw)
                        && (i == 0 || !is_word_byte(bytes[i - 1]))
                        && (i + kw.len() == bytes.len() || !is_word_byte(bytes[i + kw.len()]))
                    {
                        end = i;
                        i = bytes.len();
                        break;
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    (&region[..end], &masked[..end])
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'@' || b == b'#' || b == b'$'
}

/// Split on a separator at paren depth zero, using the masked text for
/// structure and returning matching slices of both.
fn split_top_level<'a>(
    text: &'a str,
    masked: &'a str,
    separator: u8,
) -> Vec<(&'a str, &'a str)> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, b) in masked.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth -= 1,
            b if b == separator && depth == 0 => {
                out.push((&text[start..i], &masked[start..i]));
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push((&text[start..], &masked[start..]));
    out.retain(|(t, _)| !t.trim().is_empty());
    out
}

fn parse_parameter(
    text: &str,
    masked: &str,
    schema_doc: &DatabaseSchema,
    default_schema: &str,
) -> Option<Parameter> {
    let caps = PARAM_NAME_RE.captures(masked)?;
    let name = caps.get(1)?.as_str().to_string();
    let rest_start = caps.get(2)?.start();

    let mut rest = text[rest_start..].trim().to_string();
    let mut rest_masked = masked[rest_start..].trim().to_string();

    let mut is_output = false;
    let mut readonly = false;
    loop {
        let Some(m) = TRAILING_FLAG_RE.find(&rest_masked) else {
            break;
        };
        match m.as_str().trim().to_lowercase().as_str() {
            "output" | "out" => is_output = true,
            "readonly" => readonly = true,
            _ => {}
        }
        rest.truncate(m.start());
        rest_masked.truncate(m.start());
        rest = rest.trim_end().to_string();
        rest_masked = rest_masked.trim_end().to_string();
    }

    let (type_part, has_default) = match split_top_level(&rest, &rest_masked, b'=').as_slice() {
        [(only, _)] => (only.trim(), false),
        [(first, _), ..] => (first.trim(), true),
        [] => ("", false),
    };

    // Optional `@p AS int` form.
    let type_text = type_part
        .strip_prefix("AS ")
        .or_else(|| type_part.strip_prefix("as "))
        .or_else(|| type_part.strip_prefix("As "))
        .unwrap_or(type_part)
        .trim();

    let mut param = Parameter {
        name,
        has_default,
        is_output,
        nullable: true,
        ..Parameter::default()
    };

    match typename::parse_type_name(type_text) {
        Ok(parsed) => {
            if parsed.is_builtin() {
                param.sql_type = parsed.canonical();
                param.max_length = parsed.max_length();
                param.precision = parsed.precision();
                param.scale = parsed.scale();
            } else {
                let type_schema = parsed.schema.as_deref().unwrap_or(default_schema);
                if let Some(table_type) = schema_doc.table_type(type_schema, &parsed.base) {
                    param.type_schema = Some(table_type.schema.clone());
                    param.sql_type = table_type.name.clone();
                    param.is_table_type = true;
                    param.nullable = false;
                } else if let Some(scalar) = schema_doc.scalar_type(type_schema, &parsed.base) {
                    param.type_schema = Some(scalar.schema.clone());
                    param.sql_type = scalar.name.clone();
                    param.nullable = scalar.nullable;
                    param.max_length = scalar.max_length;
                    param.precision = scalar.precision;
                    param.scale = scalar.scale;
                } else {
                    param.type_schema = parsed.schema.clone();
                    param.sql_type = parsed.base.clone();
                }
            }
        }
        Err(_) => {
            param.sql_type = type_text.to_lowercase();
        }
    }

    if readonly {
        param.is_table_type = true;
        param.nullable = false;
    }

    Some(param)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MetaColumn, TableTypeMetadata};

    fn empty_schema() -> DatabaseSchema {
        DatabaseSchema::default()
    }

    #[test]
    fn test_simple_parameters() {
        let def = "CREATE PROCEDURE dbo.GetUser @Id int, @Email nvarchar(256) AS SELECT 1;";
        let params = extract_parameters(def, &empty_schema(), "dbo");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "@Id");
        assert_eq!(params[0].sql_type, "int");
        assert_eq!(params[1].sql_type, "nvarchar(256)");
        assert_eq!(params[1].max_length, 256);
    }

    #[test]
    fn test_parenthesized_function_parameters() {
        let def = "CREATE FUNCTION dbo.Fmt (@Value decimal(18, 2), @Suffix nvarchar(10) = N'x') \
                   RETURNS nvarchar(50) AS BEGIN RETURN '' END";
        let params = extract_parameters(def, &empty_schema(), "dbo");
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].sql_type, "decimal(18,2)");
        assert_eq!(params[0].precision, 18);
        assert!(params[1].has_default);
    }

    #[test]
    fn test_output_and_default() {
        let def = "CREATE PROC dbo.P @Total int = 0 OUTPUT, @Name nvarchar(50) OUT AS SELECT 1;";
        let params = extract_parameters(def, &empty_schema(), "dbo");
        assert!(params[0].is_output);
        assert!(params[0].has_default);
        assert!(params[1].is_output);
        assert!(!params[1].has_default);
    }

    #[test]
    fn test_readonly_table_type() {
        let mut schema = empty_schema();
        schema.table_types.push(TableTypeMetadata {
            schema: "dbo".into(),
            name: "OrderIdList".into(),
            columns: vec![MetaColumn {
                name: "Id".into(),
                sql_type: "int".into(),
                ..MetaColumn::default()
            }],
        });
        let def =
            "CREATE PROC dbo.P @Ids [dbo].[OrderIdList] READONLY AS SELECT 1;";
        let params = extract_parameters(def, &schema, "dbo");
        assert_eq!(params.len(), 1);
        assert!(params[0].is_table_type);
        assert_eq!(params[0].sql_type, "OrderIdList");
        assert_eq!(params[0].type_schema.as_deref(), Some("dbo"));
    }

    #[test]
    fn test_default_containing_keyword() {
        let def = "CREATE PROC dbo.P @Mode nvarchar(10) = 'AS OUTPUT' AS SELECT 1;";
        let params = extract_parameters(def, &empty_schema(), "dbo");
        assert_eq!(params.len(), 1);
        assert!(params[0].has_default);
        assert!(!params[0].is_output);
    }

    #[test]
    fn test_no_parameters() {
        let def = "CREATE PROCEDURE dbo.Ping AS SELECT 1;";
        assert!(extract_parameters(def, &empty_schema(), "dbo").is_empty());
    }
}
