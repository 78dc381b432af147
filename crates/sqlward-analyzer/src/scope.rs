//! Scope resolution.
//!
//! Each `SELECT`, `WITH`, or subquery boundary gets a `ScopeFrame`: an
//! ordered set of relation bindings plus a parent link. Column references
//! resolve leaf-to-root; CTE names bind in the `With`-body scope and shadow
//! policy tables.

use sqlward_core::CompiledTable;

/// Result of resolving a column reference against a scope chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnCheck {
    /// The reference resolves to an allowed column.
    Allowed,
    /// The reference resolves to no allowed column, or is ambiguous.
    NotAllowed,
    /// The reference lands on a denied table; the table error already
    /// covers it.
    Skipped,
}

/// What a FROM-clause name is bound to.
#[derive(Debug)]
pub(crate) enum Binding<'p> {
    /// A policy table, possibly aliased.
    Table {
        table: &'p CompiledTable,
        alias: Option<String>,
    },
    /// A CTE or derived-table alias. `columns` holds the projection names
    /// that could be determined; `opaque` is set when some could not.
    Derived { columns: Vec<String>, opaque: bool },
    /// A table reference that failed policy lookup.
    Denied,
}

struct Relation<'p> {
    /// Lowercase alias-or-name key; `None` for an anonymous derived table.
    key: Option<String>,
    binding: Binding<'p>,
}

/// A CTE name visible to nested FROM clauses.
struct CteBinding {
    name_lower: String,
    columns: Vec<String>,
    opaque: bool,
}

/// One lexical scope: relation bindings for column resolution plus CTE
/// bindings referencable as tables further down.
pub(crate) struct ScopeFrame<'p, 'a> {
    parent: Option<&'a ScopeFrame<'p, 'a>>,
    relations: Vec<Relation<'p>>,
    ctes: Vec<CteBinding>,
}

impl<'p, 'a> ScopeFrame<'p, 'a> {
    pub fn child(parent: Option<&'a ScopeFrame<'p, 'a>>) -> Self {
        Self {
            parent,
            relations: Vec::new(),
            ctes: Vec::new(),
        }
    }

    pub fn push_table(&mut self, table: &'p CompiledTable, alias: Option<String>) {
        let key = alias
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_else(|| table.name().to_lowercase());
        self.relations.push(Relation {
            key: Some(key),
            binding: Binding::Table { table, alias },
        });
    }

    pub fn push_derived(&mut self, key: Option<String>, columns: Vec<String>, opaque: bool) {
        self.relations.push(Relation {
            key: key.map(|k| k.to_lowercase()),
            binding: Binding::Derived { columns, opaque },
        });
    }

    pub fn push_denied(&mut self, key: String) {
        self.relations.push(Relation {
            key: Some(key.to_lowercase()),
            binding: Binding::Denied,
        });
    }

    pub fn push_cte(&mut self, name: &str, columns: Vec<String>, opaque: bool) {
        self.ctes.push(CteBinding {
            name_lower: name.to_lowercase(),
            columns,
            opaque,
        });
    }

    /// Resolve a CTE name (lowercase) through the scope chain. Later CTEs
    /// shadow earlier and outer ones; within one frame the nearest
    /// definition wins.
    pub fn resolve_cte(&self, name_lower: &str) -> Option<(Vec<String>, bool)> {
        let mut frame = Some(self);
        while let Some(f) = frame {
            if let Some(cte) = f.ctes.iter().rev().find(|c| c.name_lower == name_lower) {
                return Some((cte.columns.clone(), cte.opaque));
            }
            frame = f.parent;
        }
        None
    }

    /// The policy tables bound in this frame, in source order.
    pub fn table_bindings(&self) -> impl Iterator<Item = (&'p CompiledTable, Option<&str>)> + '_ {
        self.relations.iter().filter_map(|r| match &r.binding {
            Binding::Table { table, alias } => Some((*table, alias.as_deref())),
            _ => None,
        })
    }

    /// Find the relation binding a qualifier refers to, in this frame or
    /// an enclosing one.
    pub fn find_relation(&self, qualifier: &[String]) -> Option<&Binding<'p>> {
        let qual_lower: Vec<String> = qualifier.iter().map(|q| q.to_lowercase()).collect();
        let mut frame = Some(self);
        while let Some(f) = frame {
            for relation in &f.relations {
                if relation_matches(relation, &qual_lower) {
                    return Some(&relation.binding);
                }
            }
            frame = f.parent;
        }
        None
    }

    /// Resolve a column reference. `lenient` relaxes the ambiguity rule
    /// for `USING (col)` columns, which name a column shared by both join
    /// sides.
    pub fn check_column(&self, qualifier: &[String], name: &str, lenient: bool) -> ColumnCheck {
        let name_lower = name.to_lowercase();

        if !qualifier.is_empty() {
            if let Some(binding) = self.find_relation(qualifier) {
                return match binding {
                    Binding::Table { table, .. } => {
                        if table.allows_column(&name_lower) {
                            ColumnCheck::Allowed
                        } else {
                            ColumnCheck::NotAllowed
                        }
                    }
                    Binding::Derived { columns, opaque } => {
                        if *opaque || columns.iter().any(|c| c.to_lowercase() == name_lower) {
                            ColumnCheck::Allowed
                        } else {
                            ColumnCheck::NotAllowed
                        }
                    }
                    Binding::Denied => ColumnCheck::Skipped,
                };
            }
            // Unknown qualifier: fall through to a name-only search, the
            // most forgiving reading of the reference.
        }

        self.check_unqualified(&name_lower, lenient)
    }

    fn check_unqualified(&self, name_lower: &str, lenient: bool) -> ColumnCheck {
        let mut saw_denied = false;
        let mut frame = Some(self);
        while let Some(f) = frame {
            let mut candidates = 0usize;
            let mut derived_hit = false;
            for relation in &f.relations {
                match &relation.binding {
                    Binding::Table { table, .. } => {
                        if table.allows_column(name_lower) {
                            candidates += 1;
                        }
                    }
                    Binding::Derived { columns, opaque } => {
                        if *opaque || columns.iter().any(|c| c.to_lowercase() == name_lower) {
                            derived_hit = true;
                        }
                    }
                    Binding::Denied => saw_denied = true,
                }
            }
            if candidates == 1 {
                return ColumnCheck::Allowed;
            }
            if candidates > 1 {
                // Ambiguous across visible tables.
                return if lenient {
                    ColumnCheck::Allowed
                } else {
                    ColumnCheck::NotAllowed
                };
            }
            if derived_hit {
                return ColumnCheck::Allowed;
            }
            frame = f.parent;
        }
        if saw_denied {
            ColumnCheck::Skipped
        } else {
            ColumnCheck::NotAllowed
        }
    }
}

fn relation_matches(relation: &Relation<'_>, qual_lower: &[String]) -> bool {
    match &relation.binding {
        Binding::Table { table, alias } => match qual_lower {
            [q] => {
                alias
                    .as_deref()
                    .map(|a| a.to_lowercase() == *q)
                    .unwrap_or(false)
                    || table.name().to_lowercase() == *q
            }
            [db, t] => table.matches_reference(Some(db.as_str()), t.as_str()),
            _ => qual_lower
                .last()
                .map(|t| table.name().to_lowercase() == *t)
                .unwrap_or(false),
        },
        Binding::Derived { .. } | Binding::Denied => match qual_lower {
            [q] => relation.key.as_deref() == Some(q.as_str()),
            _ => qual_lower
                .last()
                .map(|t| relation.key.as_deref() == Some(t.as_str()))
                .unwrap_or(false),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlward_core::Policy;

    fn compiled() -> sqlward_core::CompiledPolicy {
        Policy::from_json(
            r#"{
                "tables": [
                    {
                        "table_name": "orders",
                        "database_name": "orders_db",
                        "columns": ["id", "account_id"]
                    },
                    {
                        "table_name": "products",
                        "columns": ["id", "product_name"]
                    }
                ]
            }"#,
        )
        .unwrap()
        .validate()
        .unwrap()
    }

    #[test]
    fn test_unqualified_resolution() {
        let policy = compiled();
        let mut frame = ScopeFrame::child(None);
        frame.push_table(policy.resolve(None, "orders").unwrap(), None);

        assert_eq!(frame.check_column(&[], "account_id", false), ColumnCheck::Allowed);
        assert_eq!(frame.check_column(&[], "ACCOUNT_ID", false), ColumnCheck::Allowed);
        assert_eq!(frame.check_column(&[], "secret", false), ColumnCheck::NotAllowed);
    }

    #[test]
    fn test_ambiguity_across_tables() {
        let policy = compiled();
        let mut frame = ScopeFrame::child(None);
        frame.push_table(policy.resolve(None, "orders").unwrap(), None);
        frame.push_table(policy.resolve(None, "products").unwrap(), None);

        // `id` is in both tables.
        assert_eq!(frame.check_column(&[], "id", false), ColumnCheck::NotAllowed);
        assert_eq!(frame.check_column(&[], "id", true), ColumnCheck::Allowed);
        // Qualification disambiguates.
        assert_eq!(
            frame.check_column(&["orders".to_string()], "id", false),
            ColumnCheck::Allowed
        );
        // Unique columns resolve unqualified.
        assert_eq!(
            frame.check_column(&[], "product_name", false),
            ColumnCheck::Allowed
        );
    }

    #[test]
    fn test_alias_and_database_qualifiers() {
        let policy = compiled();
        let mut frame = ScopeFrame::child(None);
        frame.push_table(
            policy.resolve(None, "orders").unwrap(),
            Some("o".to_string()),
        );

        assert_eq!(
            frame.check_column(&["o".to_string()], "account_id", false),
            ColumnCheck::Allowed
        );
        // The bare table name still qualifies even when aliased.
        assert_eq!(
            frame.check_column(&["orders".to_string()], "account_id", false),
            ColumnCheck::Allowed
        );
        assert_eq!(
            frame.check_column(&["orders_db".to_string(), "orders".to_string()], "id", false),
            ColumnCheck::Allowed
        );
        assert_eq!(
            frame.check_column(&["o".to_string()], "secret", false),
            ColumnCheck::NotAllowed
        );
    }

    #[test]
    fn test_derived_and_denied_bindings() {
        let mut frame = ScopeFrame::child(None);
        frame.push_derived(
            Some("c".to_string()),
            vec!["id".to_string()],
            false,
        );
        frame.push_denied("users".to_string());

        assert_eq!(
            frame.check_column(&["c".to_string()], "id", false),
            ColumnCheck::Allowed
        );
        assert_eq!(
            frame.check_column(&["c".to_string()], "missing", false),
            ColumnCheck::NotAllowed
        );
        assert_eq!(
            frame.check_column(&["users".to_string()], "anything", false),
            ColumnCheck::Skipped
        );
    }

    #[test]
    fn test_parent_chain_and_cte_shadowing() {
        let policy = compiled();
        let mut outer = ScopeFrame::child(None);
        outer.push_cte("c", vec!["id".to_string()], false);
        outer.push_table(policy.resolve(None, "orders").unwrap(), None);

        let inner = ScopeFrame::child(Some(&outer));
        assert!(inner.resolve_cte("c").is_some());
        assert!(inner.resolve_cte("missing").is_none());
        // Correlated reference to the outer table.
        assert_eq!(inner.check_column(&[], "account_id", false), ColumnCheck::Allowed);
    }
}
