//! Always-true predicate detection and removal.
//!
//! An always-true expression is a Boolean expression that constant-folds to
//! true without referencing any column: `1 = 1`, `TRUE`, `'a' = 'a'`,
//! `NULL IS NULL`. Such a clause appearing as a top-level conjunct of the
//! WHERE, or as a disjunct inside one, is removed; removing the last
//! conjunct deletes the WHERE. Tautologies over columns (`x = x`) are out
//! of scope: detection stays purely syntactic over constants.

use sqlparser::ast::{BinaryOperator, Expr, UnaryOperator, Value};

use crate::analyzer::AnalysisContext;
use crate::visit::contains_column;

const ALWAYS_TRUE: &str = "Always-True expression is not allowed";

/// Remove always-true conjuncts and disjuncts from a WHERE clause.
pub(crate) fn prune_where(ctx: &mut AnalysisContext<'_>, selection: &mut Option<Expr>) {
    if let Some(expr) = selection.take() {
        *selection = prune_conjunct(ctx, expr);
    }
}

/// Prune one conjunct; `None` means the whole conjunct was constant true.
fn prune_conjunct(ctx: &mut AnalysisContext<'_>, expr: Expr) -> Option<Expr> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => match (prune_conjunct(ctx, *left), prune_conjunct(ctx, *right)) {
            (Some(l), Some(r)) => Some(Expr::BinaryOp {
                left: Box::new(l),
                op: BinaryOperator::And,
                right: Box::new(r),
            }),
            (Some(kept), None) | (None, Some(kept)) => Some(kept),
            (None, None) => None,
        },
        Expr::Nested(inner) => {
            prune_conjunct(ctx, *inner).map(|pruned| Expr::Nested(Box::new(pruned)))
        }
        mut other => {
            if is_always_true(&mut other) {
                ctx.error(ALWAYS_TRUE);
                return None;
            }
            if matches!(
                other,
                Expr::BinaryOp {
                    op: BinaryOperator::Or,
                    ..
                }
            ) {
                prune_disjuncts(ctx, other)
            } else {
                Some(other)
            }
        }
    }
}

/// Prune the disjuncts of an OR chain. A constant-true disjunct would make
/// the whole clause vacuous, so dropping it only tightens the query.
fn prune_disjuncts(ctx: &mut AnalysisContext<'_>, expr: Expr) -> Option<Expr> {
    let mut disjuncts = Vec::new();
    flatten_or(expr, &mut disjuncts);

    let mut kept = Vec::new();
    for disjunct in disjuncts {
        match prune_conjunct(ctx, disjunct) {
            Some(d) => kept.push(d),
            None => {}
        }
    }

    let mut kept = kept.into_iter();
    let first = kept.next()?;
    Some(kept.fold(first, |acc, d| Expr::BinaryOp {
        left: Box::new(acc),
        op: BinaryOperator::Or,
        right: Box::new(d),
    }))
}

fn flatten_or(expr: Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Or,
            right,
        } => {
            flatten_or(*left, out);
            flatten_or(*right, out);
        }
        Expr::Nested(inner)
            if matches!(
                &*inner,
                Expr::BinaryOp {
                    op: BinaryOperator::Or,
                    ..
                } | Expr::Nested(_)
            ) =>
        {
            flatten_or(*inner, out)
        }
        other => out.push(other),
    }
}

/// Whether the expression is provably true from constants alone.
pub(crate) fn is_always_true(expr: &mut Expr) -> bool {
    !contains_column(expr) && const_eval(expr) == Some(Const::Bool(true))
}

/// Constant folding domain.
#[derive(Debug, Clone, PartialEq)]
enum Const {
    Bool(bool),
    Num(f64),
    Str(String),
    Null,
}

/// Three-valued view of a constant for AND/OR.
fn truth(c: &Const) -> Option<Option<bool>> {
    match c {
        Const::Bool(b) => Some(Some(*b)),
        Const::Null => Some(None),
        _ => None,
    }
}

fn const_eval(expr: &Expr) -> Option<Const> {
    match expr {
        Expr::Value(value) => match value {
            Value::Number(text, _) => text.parse::<f64>().ok().map(Const::Num),
            Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => {
                Some(Const::Str(s.clone()))
            }
            Value::Boolean(b) => Some(Const::Bool(*b)),
            Value::Null => Some(Const::Null),
            _ => None,
        },
        Expr::Nested(inner) => const_eval(inner),
        Expr::UnaryOp { op, expr } => {
            let inner = const_eval(expr)?;
            match op {
                UnaryOperator::Not => match inner {
                    Const::Bool(b) => Some(Const::Bool(!b)),
                    Const::Null => Some(Const::Null),
                    _ => None,
                },
                UnaryOperator::Minus => match inner {
                    Const::Num(n) => Some(Const::Num(-n)),
                    _ => None,
                },
                UnaryOperator::Plus => match inner {
                    Const::Num(n) => Some(Const::Num(n)),
                    _ => None,
                },
                _ => None,
            }
        }
        Expr::BinaryOp { left, op, right } => {
            let l = const_eval(left)?;
            let r = const_eval(right)?;
            match op {
                BinaryOperator::And => fold_and_or(l, r, true),
                BinaryOperator::Or => fold_and_or(l, r, false),
                BinaryOperator::Eq
                | BinaryOperator::NotEq
                | BinaryOperator::Lt
                | BinaryOperator::LtEq
                | BinaryOperator::Gt
                | BinaryOperator::GtEq => fold_comparison(op, l, r),
                _ => None,
            }
        }
        Expr::IsNull(inner) => {
            Some(Const::Bool(const_eval(inner)? == Const::Null))
        }
        Expr::IsNotNull(inner) => {
            Some(Const::Bool(const_eval(inner)? != Const::Null))
        }
        Expr::IsTrue(inner) => Some(Const::Bool(const_eval(inner)? == Const::Bool(true))),
        Expr::IsNotTrue(inner) => Some(Const::Bool(const_eval(inner)? != Const::Bool(true))),
        Expr::IsFalse(inner) => Some(Const::Bool(const_eval(inner)? == Const::Bool(false))),
        Expr::IsNotFalse(inner) => Some(Const::Bool(const_eval(inner)? != Const::Bool(false))),
        Expr::Between {
            expr,
            negated,
            low,
            high,
        } => {
            let value = num(const_eval(expr)?)?;
            let low = num(const_eval(low)?)?;
            let high = num(const_eval(high)?)?;
            Some(Const::Bool((low <= value && value <= high) != *negated))
        }
        Expr::InList {
            expr,
            list,
            negated,
        } => {
            let value = const_eval(expr)?;
            let mut found = false;
            for item in list {
                if const_eval(item)? == value {
                    found = true;
                }
            }
            Some(Const::Bool(found != *negated))
        }
        _ => None,
    }
}

fn num(c: Const) -> Option<f64> {
    match c {
        Const::Num(n) => Some(n),
        _ => None,
    }
}

/// Kleene AND/OR over constants.
fn fold_and_or(l: Const, r: Const, is_and: bool) -> Option<Const> {
    let l = truth(&l)?;
    let r = truth(&r)?;
    let absorbing = !is_and;
    if l == Some(absorbing) || r == Some(absorbing) {
        return Some(Const::Bool(absorbing));
    }
    match (l, r) {
        (Some(a), Some(b)) => Some(Const::Bool(if is_and { a && b } else { a || b })),
        _ => Some(Const::Null),
    }
}

fn fold_comparison(op: &BinaryOperator, l: Const, r: Const) -> Option<Const> {
    if l == Const::Null || r == Const::Null {
        return Some(Const::Null);
    }
    let ordering = match (&l, &r) {
        (Const::Num(a), Const::Num(b)) => a.partial_cmp(b)?,
        (Const::Str(a), Const::Str(b)) => a.cmp(b),
        (Const::Bool(a), Const::Bool(b)) => {
            return match op {
                BinaryOperator::Eq => Some(Const::Bool(a == b)),
                BinaryOperator::NotEq => Some(Const::Bool(a != b)),
                _ => None,
            };
        }
        _ => return None,
    };
    let result = match op {
        BinaryOperator::Eq => ordering.is_eq(),
        BinaryOperator::NotEq => !ordering.is_eq(),
        BinaryOperator::Lt => ordering.is_lt(),
        BinaryOperator::LtEq => ordering.is_le(),
        BinaryOperator::Gt => ordering.is_gt(),
        BinaryOperator::GtEq => ordering.is_ge(),
        _ => return None,
    };
    Some(Const::Bool(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn parse_where(condition: &str) -> Expr {
        let sql = format!("SELECT x FROM t WHERE {}", condition);
        let mut statements = Parser::parse_sql(&GenericDialect {}, &sql).unwrap();
        let query = match statements.remove(0) {
            sqlparser::ast::Statement::Query(q) => q,
            _ => unreachable!(),
        };
        match *query.body {
            sqlparser::ast::SetExpr::Select(select) => select.selection.unwrap(),
            _ => unreachable!(),
        }
    }

    fn always_true(condition: &str) -> bool {
        is_always_true(&mut parse_where(condition))
    }

    #[test]
    fn test_constant_true_forms() {
        assert!(always_true("1 = 1"));
        assert!(always_true("TRUE"));
        assert!(always_true("'a' = 'a'"));
        assert!(always_true("NULL IS NULL"));
        assert!(always_true("2 > 1"));
        assert!(always_true("NOT FALSE"));
        assert!(always_true("(1 = 1)"));
        assert!(always_true("1 BETWEEN 0 AND 2"));
        assert!(always_true("1 IN (1, 2)"));
        assert!(always_true("1 = 1 OR 1 = 2"));
    }

    #[test]
    fn test_not_constant_true() {
        // References a column.
        assert!(!always_true("x = x"));
        assert!(!always_true("x = 1"));
        // Constant but false or unknown.
        assert!(!always_true("1 = 2"));
        assert!(!always_true("FALSE"));
        assert!(!always_true("NULL = NULL"));
        assert!(!always_true("NULL IS NOT NULL"));
        assert!(!always_true("1 = NULL"));
    }
}
