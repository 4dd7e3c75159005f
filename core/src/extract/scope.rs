//! FROM-clause scope: which tables a column reference can bind to, and which
//! of them sit on the nullable side of an outer join.

use sqlparser::ast::{Join, JoinOperator, Select, TableFactor};

/// One relation in scope. `table == None` marks a derived table or another
/// unbindable relation; it still counts for ambiguity.
#[derive(Debug, Clone, Default)]
pub struct ScopeTable {
    pub alias: Option<String>,
    pub schema: Option<String>,
    pub table: Option<String>,
    pub forced_nullable: bool,
}

impl ScopeTable {
    fn matches_qualifier(&self, qualifier: &str) -> bool {
        if let Some(alias) = &self.alias {
            return alias.eq_ignore_ascii_case(qualifier);
        }
        self.table
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(qualifier))
    }
}

#[derive(Debug, Clone, Default)]
pub struct FromScope {
    pub tables: Vec<ScopeTable>,
}

impl FromScope {
    pub fn of_select(select: &Select) -> FromScope {
        let mut scope = FromScope::default();
        for twj in &select.from {
            scope.push_relation(&twj.relation, false);
            for join in &twj.joins {
                scope.push_join(join);
            }
        }
        scope
    }

    fn push_relation(&mut self, relation: &TableFactor, forced_nullable: bool) {
        match relation {
            TableFactor::Table { name, alias, .. } => {
                let mut parts: Vec<String> = name
                    .0
                    .iter()
                    .filter_map(|part| part.as_ident().map(|ident| ident.value.clone()))
                    .collect();
                let table = parts.pop();
                let schema = parts.pop();
                self.tables.push(ScopeTable {
                    alias: alias.as_ref().map(|a| a.name.value.clone()),
                    schema,
                    table,
                    forced_nullable,
                });
            }
            TableFactor::Derived { alias, .. } => {
                self.tables.push(ScopeTable {
                    alias: alias.as_ref().map(|a| a.name.value.clone()),
                    forced_nullable,
                    ..ScopeTable::default()
                });
            }
            _ => {
                self.tables.push(ScopeTable {
                    forced_nullable,
                    ..ScopeTable::default()
                });
            }
        }
    }

    fn push_join(&mut self, join: &Join) {
        match &join.join_operator {
            // LEFT JOIN and LEFT OUTER JOIN parse as distinct variants.
            JoinOperator::Left(_) | JoinOperator::LeftOuter(_) | JoinOperator::OuterApply => {
                self.push_relation(&join.relation, true);
            }
            JoinOperator::FullOuter(_) => {
                for t in &mut self.tables {
                    t.forced_nullable = true;
                }
                self.push_relation(&join.relation, true);
            }
            JoinOperator::Right(_) | JoinOperator::RightOuter(_) => {
                // The preserved side is the right one; everything already in
                // scope becomes nullable.
                for t in &mut self.tables {
                    t.forced_nullable = true;
                }
                self.push_relation(&join.relation, false);
            }
            _ => self.push_relation(&join.relation, false),
        }
    }

    /// Resolve a qualified reference (`alias.Col`, `Table.Col`).
    pub fn resolve_qualifier(&self, qualifier: &str) -> Option<&ScopeTable> {
        self.tables.iter().find(|t| t.matches_qualifier(qualifier))
    }

    /// Resolve an unqualified reference: unambiguous only with exactly one
    /// relation in scope. More than one candidate is never guessed.
    pub fn resolve_single(&self) -> SingleBinding<'_> {
        match self.tables.len() {
            0 => SingleBinding::None,
            1 => SingleBinding::Table(&self.tables[0]),
            _ => SingleBinding::Ambiguous,
        }
    }
}

pub enum SingleBinding<'a> {
    None,
    Table(&'a ScopeTable),
    Ambiguous,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::ast::{SetExpr, Statement};
    use sqlparser::dialect::MsSqlDialect;
    use sqlparser::parser::Parser;

    fn scope_of(sql: &str) -> FromScope {
        let stmts = Parser::parse_sql(&MsSqlDialect {}, sql).unwrap();
        let Statement::Query(q) = &stmts[0] else {
            panic!("expected query");
        };
        let SetExpr::Select(sel) = &*q.body else {
            panic!("expected select");
        };
        FromScope::of_select(sel)
    }

    #[test]
    fn test_single_table_binding() {
        let scope = scope_of("SELECT Id FROM dbo.Users");
        assert!(matches!(scope.resolve_single(), SingleBinding::Table(_)));
        let t = scope.resolve_qualifier("users").unwrap();
        assert_eq!(t.schema.as_deref(), Some("dbo"));
    }

    #[test]
    fn test_two_tables_are_ambiguous() {
        let scope = scope_of("SELECT Id FROM dbo.A, dbo.B");
        assert!(matches!(scope.resolve_single(), SingleBinding::Ambiguous));
    }

    #[test]
    fn test_left_join_marks_joined_side_nullable() {
        let scope = scope_of("SELECT 1 FROM dbo.A a LEFT JOIN dbo.B b ON a.Id = b.AId");
        let a = scope.resolve_qualifier("a").unwrap();
        let b = scope.resolve_qualifier("b").unwrap();
        assert!(!a.forced_nullable);
        assert!(b.forced_nullable);
    }

    #[test]
    fn test_right_join_marks_prior_side_nullable() {
        let scope = scope_of("SELECT 1 FROM dbo.A a RIGHT JOIN dbo.B b ON a.Id = b.AId");
        assert!(scope.resolve_qualifier("a").unwrap().forced_nullable);
        assert!(!scope.resolve_qualifier("b").unwrap().forced_nullable);
    }
}
