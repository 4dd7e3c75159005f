//! EXEC target capture.
//!
//! A token scan over the routine body finds `EXEC`/`EXECUTE` statements and
//! records their targets. Only a single statically-named target makes a
//! routine forwarding-eligible; `EXEC(@sql)`, `sp_executesql` and variable
//! targets are dynamic and are recorded but never resolved.

use std::sync::LazyLock;

use regex::Regex;
use sqlparser::dialect::MsSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::model::ExecTargetRef;

static EXEC_FALLBACK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)\bEXEC(?:UTE)?\s+(?:@[\w$#]+\s*=\s*)?((?:\[[^\]]+\]|[A-Za-z_#][\w$#]*)(?:\s*\.\s*(?:\[[^\]]+\]|[A-Za-z_#][\w$#]*))*|@[\w$#]+|\()",
    )
    .expect("exec fallback pattern")
});

/// Scan a body for EXEC targets, deduplicated by (schema, name). Falls back
/// to a regex scan when the text cannot even be tokenized.
pub fn scan_exec_targets(body: &str) -> Vec<ExecTargetRef> {
    let dialect = MsSqlDialect {};
    let tokens = match Tokenizer::new(&dialect, body).tokenize() {
        Ok(tokens) => tokens,
        Err(_) => return fallback_scan(body),
    };

    let mut scanner = TokenScanner { tokens, pos: 0 };
    let mut targets: Vec<ExecTargetRef> = Vec::new();
    while let Some(target) = scanner.next_exec_target() {
        let duplicate = targets.iter().any(|t| {
            t.dynamic == target.dynamic
                && t.name.eq_ignore_ascii_case(&target.name)
                && match (&t.schema, &target.schema) {
                    (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
                    (None, None) => true,
                    _ => false,
                }
        });
        if !duplicate {
            targets.push(target);
        }
    }
    targets
}

struct TokenScanner {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenScanner {
    fn skip_trivia(&mut self) {
        while matches!(self.tokens.get(self.pos), Some(Token::Whitespace(_))) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<&Token> {
        self.skip_trivia();
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Token> {
        self.skip_trivia();
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    /// Advance to the next EXEC keyword and parse its target.
    fn next_exec_target(&mut self) -> Option<ExecTargetRef> {
        loop {
            let token = self.tokens.get(self.pos)?;
            self.pos += 1;
            let Token::Word(w) = token else { continue };
            if !w.value.eq_ignore_ascii_case("exec") && !w.value.eq_ignore_ascii_case("execute") {
                continue;
            }
            if let Some(target) = self.parse_target() {
                return Some(target);
            }
        }
    }

    fn parse_target(&mut self) -> Option<ExecTargetRef> {
        // EXEC(@sql) and EXEC ('...') are dynamic SQL.
        if matches!(self.peek(), Some(Token::LParen)) {
            return Some(ExecTargetRef {
                schema: None,
                name: "(dynamic)".to_string(),
                dynamic: true,
            });
        }

        let mut first = match self.bump() {
            Some(Token::Word(w)) => w.value.clone(),
            _ => return None,
        };

        // `EXEC @ret = dbo.Target` assigns the return code; skip past the
        // assignment. A variable with no `=` is a variable target: dynamic.
        if first.starts_with('@') {
            if matches!(self.peek(), Some(Token::Eq)) {
                self.bump();
                first = match self.bump() {
                    Some(Token::Word(w)) => w.value.clone(),
                    _ => {
                        return Some(ExecTargetRef {
                            schema: None,
                            name: "(dynamic)".to_string(),
                            dynamic: true,
                        });
                    }
                };
            }
            if first.starts_with('@') {
                return Some(ExecTargetRef {
                    schema: None,
                    name: first,
                    dynamic: true,
                });
            }
        }

        let mut parts = vec![first];
        while matches!(self.peek(), Some(Token::Period)) {
            self.bump();
            match self.bump() {
                Some(Token::Word(w)) => parts.push(w.value.clone()),
                _ => break,
            }
        }

        // Keep at most schema.name; a database qualifier is dropped.
        let name = parts.pop()?;
        let schema = parts.pop();
        let dynamic = name.eq_ignore_ascii_case("sp_executesql");
        Some(ExecTargetRef {
            schema,
            name,
            dynamic,
        })
    }
}

fn fallback_scan(body: &str) -> Vec<ExecTargetRef> {
    let mut targets: Vec<ExecTargetRef> = Vec::new();
    for cap in EXEC_FALLBACK_RE.captures_iter(body) {
        let raw = cap.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let target = if raw == "(" || raw.starts_with('@') {
            ExecTargetRef {
                schema: None,
                name: "(dynamic)".to_string(),
                dynamic: true,
            }
        } else {
            let mut parts: Vec<String> = raw
                .split('.')
                .map(|p| p.trim().trim_matches(['[', ']']).to_string())
                .collect();
            let name = match parts.pop() {
                Some(n) if !n.is_empty() => n,
                _ => continue,
            };
            let schema = parts.pop().filter(|s| !s.is_empty());
            let dynamic = name.eq_ignore_ascii_case("sp_executesql");
            ExecTargetRef {
                schema,
                name,
                dynamic,
            }
        };
        if !targets.iter().any(|t| {
            t.name.eq_ignore_ascii_case(&target.name) && t.schema == target.schema
        }) {
            targets.push(target);
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_static_target() {
        let targets = scan_exec_targets("EXEC dbo.GetOrders @Top = 10");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].schema.as_deref(), Some("dbo"));
        assert_eq!(targets[0].name, "GetOrders");
        assert!(!targets[0].dynamic);
    }

    #[test]
    fn test_bracketed_and_unqualified() {
        let targets = scan_exec_targets("EXECUTE [Sales].[Totals]; EXEC Refresh");
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].name, "Totals");
        assert_eq!(targets[1].schema, None);
        assert_eq!(targets[1].name, "Refresh");
    }

    #[test]
    fn test_dynamic_sql_flagged() {
        let targets = scan_exec_targets("EXEC(@sql)");
        assert_eq!(targets.len(), 1);
        assert!(targets[0].dynamic);

        let targets = scan_exec_targets("EXEC sp_executesql @stmt");
        assert!(targets[0].dynamic);
    }

    #[test]
    fn test_return_code_assignment() {
        let targets = scan_exec_targets("EXEC @rc = dbo.DoWork");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name, "DoWork");
        assert!(!targets[0].dynamic);
    }

    #[test]
    fn test_duplicates_collapse() {
        let targets = scan_exec_targets("EXEC dbo.X; EXEC dbo.X;");
        assert_eq!(targets.len(), 1);
    }

    #[test]
    fn test_exec_inside_comment_ignored() {
        let targets = scan_exec_targets("-- EXEC dbo.NotReal\nSELECT 1");
        assert!(targets.is_empty());
    }
}
