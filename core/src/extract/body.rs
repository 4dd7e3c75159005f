//! Definition-text surgery: GO batch splitting, header/body splitting and
//! statement splitting, all aware of comments, string literals and bracketed
//! identifiers so a stray keyword inside a literal never fools us.

/// Per-byte code mask: `true` where the byte is live SQL, `false` inside
/// `--` / `/* */` comments, `'...'` strings and `[...]` identifiers.
pub(crate) fn code_mask(sql: &str) -> Vec<bool> {
    code_mask_impl(sql, true)
}

/// Like [`code_mask`], but bracketed identifiers stay live. Header analysis
/// needs `[dbo].[Type]` visible while comments and strings are blanked.
pub(crate) fn code_mask_keep_brackets(sql: &str) -> Vec<bool> {
    code_mask_impl(sql, false)
}

fn code_mask_impl(sql: &str, mask_brackets: bool) -> Vec<bool> {
    let bytes = sql.as_bytes();
    let mut mask = vec![true; bytes.len()];
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    mask[i] = false;
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                // T-SQL block comments nest.
                let mut depth = 0usize;
                while i < bytes.len() {
                    if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'*') {
                        depth += 1;
                        mask[i] = false;
                        mask[i + 1] = false;
                        i += 2;
                    } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/') {
                        depth -= 1;
                        mask[i] = false;
                        mask[i + 1] = false;
                        i += 2;
                        if depth == 0 {
                            break;
                        }
                    } else {
                        mask[i] = false;
                        i += 1;
                    }
                }
            }
            b'\'' => {
                mask[i] = false;
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'\'' {
                        // Doubled quote is an escaped quote.
                        if bytes.get(i + 1) == Some(&b'\'') {
                            mask[i] = false;
                            mask[i + 1] = false;
                            i += 2;
                            continue;
                        }
                        mask[i] = false;
                        i += 1;
                        break;
                    }
                    mask[i] = false;
                    i += 1;
                }
            }
            b'[' => {
                if !mask_brackets {
                    i += 1;
                    while i < bytes.len() && bytes[i] != b']' {
                        i += 1;
                    }
                    if i < bytes.len() {
                        i += 1;
                    }
                    continue;
                }
                mask[i] = false;
                i += 1;
                while i < bytes.len() && bytes[i] != b']' {
                    mask[i] = false;
                    i += 1;
                }
                if i < bytes.len() {
                    mask[i] = false;
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    mask
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'@' || b == b'#' || b == b'$'
}

/// Find the next standalone keyword (case-insensitive, word-bounded, live
/// code, paren depth zero) at or after `from`. Returns its byte offset.
pub(crate) fn find_keyword(sql: &str, mask: &[bool], keyword: &str, from: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    let kw = keyword.as_bytes();
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        if mask[i] {
            match bytes[i] {
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ => {}
            }
            if i >= from
                && depth == 0
                && bytes[i..].len() >= kw.len()
                && bytes[i..i + kw.len()].eq_ignore_ascii_case(kw)
            {
                let before_ok = i == 0 || !is_word_byte(bytes[i - 1]);
                let after_ok = i + kw.len() >= bytes.len() || !is_word_byte(bytes[i + kw.len()]);
                // The whole keyword must be live code.
                if before_ok && after_ok && mask[i..i + kw.len()].iter().all(|m| *m) {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

/// Split a script on GO batch separators (a line consisting of `GO` alone).
pub fn split_batches(sql: &str) -> Vec<&str> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    for line in sql.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("go") || trimmed.eq_ignore_ascii_case("go;") {
            batches.push(&sql[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    batches.push(&sql[start..]);
    batches.retain(|b| !b.trim().is_empty());
    batches
}

/// Split a routine definition into (header, body) at the first standalone
/// `AS` outside parens, comments, strings and brackets. Covers procedures
/// (`CREATE PROC ... AS <body>`) and both function forms (`RETURNS ... AS
/// RETURN`/`AS BEGIN`). The AS of a `WITH EXECUTE AS ...` clause does not
/// end the header.
pub fn split_routine_body(definition: &str) -> Option<(&str, &str)> {
    let mask = code_mask(definition);
    let mut from = 0;
    loop {
        let at = find_keyword(definition, &mask, "AS", from)?;
        let execute_as = previous_word(definition, &mask, at)
            .is_some_and(|w| w.eq_ignore_ascii_case("execute"));
        if execute_as {
            from = at + 2;
            continue;
        }
        return Some((&definition[..at], &definition[at + 2..]));
    }
}

/// The live word immediately before byte offset `at`, if any.
fn previous_word<'a>(sql: &'a str, mask: &[bool], at: usize) -> Option<&'a str> {
    let bytes = sql.as_bytes();
    let mut end = at;
    while end > 0 && (!mask[end - 1] || bytes[end - 1].is_ascii_whitespace()) {
        end -= 1;
    }
    if end == 0 {
        return None;
    }
    let mut start = end;
    while start > 0 && mask[start - 1] && is_word_byte(bytes[start - 1]) {
        start -= 1;
    }
    if start == end {
        return None;
    }
    Some(&sql[start..end])
}

/// Split a body into `;`-separated statements (live-code semicolons only).
/// Used as a salvage pass when the whole body fails to parse.
pub(crate) fn split_statements(body: &str) -> Vec<&str> {
    let mask = code_mask(body);
    let bytes = body.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    for (i, b) in bytes.iter().enumerate() {
        if *b == b';' && mask[i] {
            out.push(&body[start..i]);
            start = i + 1;
        }
    }
    out.push(&body[start..]);
    out.retain(|s| !s.trim().is_empty());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_batches() {
        let sql = "SET ANSI_NULLS ON\nGO\nCREATE PROC dbo.P AS SELECT 1;\nGO\n";
        let batches = split_batches(sql);
        assert_eq!(batches.len(), 2);
        assert!(batches[1].contains("CREATE PROC"));
    }

    #[test]
    fn test_header_split_ignores_as_in_comment() {
        let def = "CREATE PROC dbo.P -- not AS here\n/* AS */ @x int AS SELECT 1";
        let (header, body) = split_routine_body(def).unwrap();
        assert!(header.contains("@x int"));
        assert_eq!(body.trim(), "SELECT 1");
    }

    #[test]
    fn test_header_split_ignores_as_in_string_default() {
        let def = "CREATE PROC dbo.P @x nvarchar(10) = 'AS' AS SELECT @x";
        let (header, _) = split_routine_body(def).unwrap();
        assert!(header.contains("'AS'"));
    }

    #[test]
    fn test_inline_tvf_splits_at_first_as() {
        let def = "CREATE FUNCTION dbo.F (@a int) RETURNS TABLE AS RETURN (SELECT @a AS V)";
        let (_, body) = split_routine_body(def).unwrap();
        assert!(body.trim_start().to_uppercase().starts_with("RETURN"));
    }

    #[test]
    fn test_execute_as_clause_does_not_end_header() {
        let def = "CREATE PROC dbo.P WITH EXECUTE AS OWNER AS SELECT 1 AS One";
        let (header, body) = split_routine_body(def).unwrap();
        assert!(header.contains("EXECUTE AS OWNER"));
        assert!(body.trim_start().to_uppercase().starts_with("SELECT"));
    }

    #[test]
    fn test_statement_split_skips_string_semicolons() {
        let body = "SELECT 'a;b' AS X; SELECT 2";
        let stmts = split_statements(body);
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_nested_block_comments() {
        let mask = code_mask("/* outer /* inner */ still */ SELECT");
        let live: String = "/* outer /* inner */ still */ SELECT"
            .bytes()
            .zip(&mask)
            .filter(|(_, m)| **m)
            .map(|(b, _)| b as char)
            .collect();
        assert_eq!(live.trim(), "SELECT");
    }
}
