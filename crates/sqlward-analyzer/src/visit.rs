//! Expression traversal.
//!
//! One walker serves column collection, function checking, and subquery
//! discovery. Subqueries are surfaced to the visitor rather than descended
//! into: they open their own scope and are analyzed separately.

use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, ObjectName, Query, Subscript,
    WindowType,
};

/// A column reference: qualifier parts (table/alias, optionally
/// database-qualified) plus the column name, original spelling.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColumnRef {
    pub qualifier: Vec<String>,
    pub name: String,
}

/// Receiver for walk events.
pub(crate) trait ExprVisitor {
    fn column(&mut self, _column: ColumnRef) {}
    fn function(&mut self, _name: &ObjectName) {}
    fn subquery(&mut self, _query: &mut Query) {}
}

/// Walk an expression tree, reporting column references, function calls,
/// and subqueries. Expression kinds with no column content are ignored;
/// unrecognized kinds fall through silently.
pub(crate) fn walk_expr(expr: &mut Expr, visitor: &mut impl ExprVisitor) {
    match expr {
        Expr::Identifier(ident) => visitor.column(ColumnRef {
            qualifier: Vec::new(),
            name: ident.value.clone(),
        }),
        Expr::CompoundIdentifier(parts) => {
            if let Some((name, qualifier)) = parts.split_last() {
                visitor.column(ColumnRef {
                    qualifier: qualifier.iter().map(|i| i.value.clone()).collect(),
                    name: name.value.clone(),
                });
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            walk_expr(left, visitor);
            walk_expr(right, visitor);
        }
        Expr::UnaryOp { expr, .. } => walk_expr(expr, visitor),
        Expr::Nested(inner) => walk_expr(inner, visitor),
        Expr::IsNull(inner)
        | Expr::IsNotNull(inner)
        | Expr::IsTrue(inner)
        | Expr::IsNotTrue(inner)
        | Expr::IsFalse(inner)
        | Expr::IsNotFalse(inner)
        | Expr::IsUnknown(inner)
        | Expr::IsNotUnknown(inner) => walk_expr(inner, visitor),
        Expr::IsDistinctFrom(left, right) | Expr::IsNotDistinctFrom(left, right) => {
            walk_expr(left, visitor);
            walk_expr(right, visitor);
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            walk_expr(expr, visitor);
            walk_expr(low, visitor);
            walk_expr(high, visitor);
        }
        Expr::InList { expr, list, .. } => {
            walk_expr(expr, visitor);
            for item in list {
                walk_expr(item, visitor);
            }
        }
        Expr::InSubquery { expr, subquery, .. } => {
            walk_expr(expr, visitor);
            visitor.subquery(subquery);
        }
        Expr::InUnnest {
            expr, array_expr, ..
        } => {
            walk_expr(expr, visitor);
            walk_expr(array_expr, visitor);
        }
        Expr::Like { expr, pattern, .. }
        | Expr::ILike { expr, pattern, .. }
        | Expr::SimilarTo { expr, pattern, .. } => {
            walk_expr(expr, visitor);
            walk_expr(pattern, visitor);
        }
        Expr::Cast { expr, .. } => walk_expr(expr, visitor),
        Expr::Extract { expr, .. } => walk_expr(expr, visitor),
        Expr::Ceil { expr, .. } | Expr::Floor { expr, .. } => walk_expr(expr, visitor),
        Expr::Substring {
            expr,
            substring_from,
            substring_for,
            ..
        } => {
            walk_expr(expr, visitor);
            if let Some(from) = substring_from {
                walk_expr(from, visitor);
            }
            if let Some(length) = substring_for {
                walk_expr(length, visitor);
            }
        }
        Expr::Trim {
            expr,
            trim_what,
            trim_characters,
            ..
        } => {
            walk_expr(expr, visitor);
            if let Some(what) = trim_what {
                walk_expr(what, visitor);
            }
            if let Some(characters) = trim_characters {
                for c in characters {
                    walk_expr(c, visitor);
                }
            }
        }
        Expr::Position { expr, r#in } => {
            walk_expr(expr, visitor);
            walk_expr(r#in, visitor);
        }
        Expr::Overlay {
            expr,
            overlay_what,
            overlay_from,
            overlay_for,
        } => {
            walk_expr(expr, visitor);
            walk_expr(overlay_what, visitor);
            walk_expr(overlay_from, visitor);
            if let Some(length) = overlay_for {
                walk_expr(length, visitor);
            }
        }
        Expr::Collate { expr, .. } => walk_expr(expr, visitor),
        Expr::AnyOp { left, right, .. } | Expr::AllOp { left, right, .. } => {
            walk_expr(left, visitor);
            walk_expr(right, visitor);
        }
        Expr::AtTimeZone {
            timestamp,
            time_zone,
        } => {
            walk_expr(timestamp, visitor);
            walk_expr(time_zone, visitor);
        }
        Expr::Function(function) => {
            visitor.function(&function.name);
            walk_function_arguments(&mut function.parameters, visitor);
            walk_function_arguments(&mut function.args, visitor);
            if let Some(filter) = &mut function.filter {
                walk_expr(filter, visitor);
            }
            if let Some(WindowType::WindowSpec(spec)) = &mut function.over {
                for e in &mut spec.partition_by {
                    walk_expr(e, visitor);
                }
                for o in &mut spec.order_by {
                    walk_expr(&mut o.expr, visitor);
                }
            }
            for o in &mut function.within_group {
                walk_expr(&mut o.expr, visitor);
            }
        }
        Expr::Case {
            operand,
            conditions,
            results,
            else_result,
        } => {
            if let Some(operand) = operand {
                walk_expr(operand, visitor);
            }
            for condition in conditions {
                walk_expr(condition, visitor);
            }
            for result in results {
                walk_expr(result, visitor);
            }
            if let Some(else_result) = else_result {
                walk_expr(else_result, visitor);
            }
        }
        Expr::Tuple(items) => {
            for item in items {
                walk_expr(item, visitor);
            }
        }
        Expr::GroupingSets(sets) | Expr::Cube(sets) | Expr::Rollup(sets) => {
            for set in sets {
                for e in set {
                    walk_expr(e, visitor);
                }
            }
        }
        Expr::Array(array) => {
            for e in &mut array.elem {
                walk_expr(e, visitor);
            }
        }
        Expr::Interval(interval) => walk_expr(&mut interval.value, visitor),
        Expr::Subscript { expr, subscript } => {
            walk_expr(expr, visitor);
            match subscript.as_mut() {
                Subscript::Index { index } => walk_expr(index, visitor),
                Subscript::Slice {
                    lower_bound,
                    upper_bound,
                    stride,
                } => {
                    for bound in [lower_bound, upper_bound, stride].into_iter().flatten() {
                        walk_expr(bound, visitor);
                    }
                }
            }
        }
        Expr::Subquery(query) => visitor.subquery(query),
        Expr::Exists { subquery, .. } => visitor.subquery(subquery),
        _ => {}
    }
}

fn walk_function_arguments(args: &mut FunctionArguments, visitor: &mut impl ExprVisitor) {
    match args {
        FunctionArguments::None => {}
        FunctionArguments::Subquery(query) => visitor.subquery(query),
        FunctionArguments::List(list) => {
            for arg in &mut list.args {
                let arg_expr = match arg {
                    FunctionArg::Named { arg, .. } => arg,
                    FunctionArg::Unnamed(arg) => arg,
                };
                if let FunctionArgExpr::Expr(expr) = arg_expr {
                    walk_expr(expr, visitor);
                }
            }
        }
    }
}

/// Whether the expression references any column at all.
pub(crate) fn contains_column(expr: &mut Expr) -> bool {
    struct Finder {
        found: bool,
    }
    impl ExprVisitor for Finder {
        fn column(&mut self, _column: ColumnRef) {
            self.found = true;
        }
        fn subquery(&mut self, _query: &mut Query) {
            // A subquery is never a constant; treat it as column content.
            self.found = true;
        }
    }
    let mut finder = Finder { found: false };
    walk_expr(expr, &mut finder);
    finder.found
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn parse_expr(text: &str) -> Expr {
        let sql = format!("SELECT {}", text);
        let mut statements = Parser::parse_sql(&GenericDialect {}, &sql).unwrap();
        let query = match statements.remove(0) {
            sqlparser::ast::Statement::Query(q) => q,
            _ => unreachable!(),
        };
        match *query.body {
            sqlparser::ast::SetExpr::Select(select) => match select.projection.into_iter().next() {
                Some(sqlparser::ast::SelectItem::UnnamedExpr(e)) => e,
                _ => unreachable!(),
            },
            _ => unreachable!(),
        }
    }

    fn columns_of(text: &str) -> Vec<ColumnRef> {
        struct Collect(Vec<ColumnRef>);
        impl ExprVisitor for Collect {
            fn column(&mut self, column: ColumnRef) {
                self.0.push(column);
            }
        }
        let mut expr = parse_expr(text);
        let mut collect = Collect(Vec::new());
        walk_expr(&mut expr, &mut collect);
        collect.0
    }

    #[test]
    fn test_collects_plain_and_qualified_columns() {
        let refs = columns_of("a + o.b * f(c.d.e)");
        let names: Vec<&str> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "e"]);
        assert_eq!(refs[1].qualifier, vec!["o"]);
        assert_eq!(refs[2].qualifier, vec!["c", "d"]);
    }

    #[test]
    fn test_case_and_between() {
        let refs = columns_of("CASE WHEN x BETWEEN lo AND hi THEN y ELSE z END");
        let names: Vec<&str> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["x", "lo", "hi", "y", "z"]);
    }

    #[test]
    fn test_subquery_not_descended() {
        let refs = columns_of("x IN (SELECT hidden FROM t)");
        let names: Vec<&str> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["x"]);
    }

    #[test]
    fn test_contains_column() {
        assert!(contains_column(&mut parse_expr("a = 1")));
        assert!(!contains_column(&mut parse_expr("1 = 1")));
        assert!(!contains_column(&mut parse_expr("NULL IS NULL")));
        assert!(contains_column(&mut parse_expr("(SELECT 1) = 1")));
    }
}
