//! Rewriting helpers and canonical serialization.
//!
//! The analyzer mutates the parsed AST in place; the canonical repaired
//! query is its `Display` rendering (keywords uppercased, identifier
//! spelling preserved, single spacing). `fixed` is populated only when the
//! rendering differs from the canonical rendering of the unmutated parse,
//! which also makes the comparison insensitive to whitespace and comments
//! in the input.

use sqlparser::ast::{BinaryOperator, Expr};

/// Conjoin a predicate onto an optional prior WHERE expression.
///
/// The prior expression is parenthesized only when its top level is a
/// disjunction; anything binding at least as tightly as `AND` needs no
/// parentheses.
pub(crate) fn conjoin(prior: Option<Expr>, predicate: Expr) -> Expr {
    match prior {
        None => predicate,
        Some(existing) => {
            let left = if matches!(
                existing,
                Expr::BinaryOp {
                    op: BinaryOperator::Or,
                    ..
                }
            ) {
                Expr::Nested(Box::new(existing))
            } else {
                existing
            };
            Expr::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::And,
                right: Box::new(predicate),
            }
        }
    }
}
