//! Row-level restriction enforcement.
//!
//! For every policy table referenced in a scope, each restriction must be
//! satisfied by some top-level conjunct of that scope's WHERE clause. The
//! test is implication: the conjunct must be at least as restrictive as the
//! policy predicate. A top-level `OR` satisfies a restriction only when
//! every disjunct does. Unsatisfied restrictions are reported and the
//! policy predicate is conjoined onto the WHERE.

use sqlparser::ast::{BinaryOperator, Expr, Ident, Select, Value};

use sqlward_core::{CmpOp, CompiledTable, Restriction, ScalarValue};

use crate::analyzer::AnalysisContext;
use crate::rewrite::conjoin;
use crate::scope::ScopeFrame;

/// Enforce every restriction of every table bound in `frame` against the
/// SELECT's WHERE clause, injecting missing predicates.
pub(crate) fn enforce(ctx: &mut AnalysisContext<'_>, select: &mut Select, frame: &ScopeFrame<'_, '_>) {
    let bindings: Vec<(&CompiledTable, Option<&str>)> = frame.table_bindings().collect();

    for (table, alias) in &bindings {
        let duplicated = bindings
            .iter()
            .filter(|(other, _)| other.name() == table.name())
            .count()
            > 1;
        let prefix = alias
            .map(str::to_string)
            .or_else(|| duplicated.then(|| table.name().to_string()));

        for restriction in table.restrictions() {
            let satisfied = select
                .selection
                .as_ref()
                .map(|w| {
                    let mut conjuncts = Vec::new();
                    split_conjuncts(w, &mut conjuncts);
                    conjuncts
                        .iter()
                        .any(|c| satisfies(c, restriction, table, *alias))
                })
                .unwrap_or(false);

            if !satisfied {
                let column = match &prefix {
                    Some(p) => format!("{}.{}", p, restriction.column()),
                    None => restriction.column().to_string(),
                };
                ctx.error(format!(
                    "Missing restriction for table: {} column: {} value: {}",
                    table.name(),
                    column,
                    restriction.value_text()
                ));
                let predicate = build_predicate(prefix.as_deref(), restriction);
                select.selection = Some(conjoin(select.selection.take(), predicate));
            }
        }
    }
}

/// Flatten the top-level AND chain, looking through parentheses.
fn split_conjuncts<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            split_conjuncts(left, out);
            split_conjuncts(right, out);
        }
        Expr::Nested(inner) => split_conjuncts(inner, out),
        other => out.push(other),
    }
}

/// Whether a single conjunct implies the restriction.
fn satisfies(
    conjunct: &Expr,
    restriction: &Restriction,
    table: &CompiledTable,
    alias: Option<&str>,
) -> bool {
    match conjunct {
        Expr::Nested(inner) => satisfies(inner, restriction, table, alias),
        // An OR is opaque unless every disjunct independently satisfies.
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Or,
            right,
        } => {
            satisfies(left, restriction, table, alias)
                && satisfies(right, restriction, table, alias)
        }
        Expr::BinaryOp { left, op, right } => {
            let conj_op = match comparison_op(op) {
                Some(op) => op,
                None => return false,
            };
            // Orient so the column is on the left.
            let (op, value) = if column_matches(left, restriction, table, alias) {
                (conj_op, right)
            } else if column_matches(right, restriction, table, alias) {
                (conj_op.flipped(), left)
            } else {
                return false;
            };
            match literal_value(value) {
                Some(value) => implies(op, &value, restriction),
                None => false,
            }
        }
        Expr::Between {
            expr,
            negated: false,
            low,
            high,
        } => {
            if !column_matches(expr, restriction, table, alias) {
                return false;
            }
            let (low, high) = match (numeric_literal(low), numeric_literal(high)) {
                (Some(l), Some(h)) => (l, h),
                _ => return false,
            };
            match restriction {
                Restriction::Between {
                    low: r_low,
                    high: r_high,
                    ..
                } => *r_low <= low && high <= *r_high,
                Restriction::Cmp { op, value, .. } => match op {
                    CmpOp::Lt => high < *value,
                    CmpOp::LtEq => high <= *value,
                    CmpOp::Gt => low > *value,
                    CmpOp::GtEq => low >= *value,
                },
                _ => false,
            }
        }
        Expr::InList {
            expr,
            list,
            negated: false,
        } => {
            if !column_matches(expr, restriction, table, alias) {
                return false;
            }
            let mut values = Vec::with_capacity(list.len());
            for item in list {
                match literal_value(item) {
                    Some(v) => values.push(v),
                    None => return false,
                }
            }
            !values.is_empty()
                && values
                    .iter()
                    .all(|v| implies(ConjOp::Eq, v, restriction))
        }
        _ => false,
    }
}

/// Comparison shape of a conjunct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConjOp {
    Eq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl ConjOp {
    fn flipped(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Lt => Self::Gt,
            Self::LtEq => Self::GtEq,
            Self::Gt => Self::Lt,
            Self::GtEq => Self::LtEq,
        }
    }
}

fn comparison_op(op: &BinaryOperator) -> Option<ConjOp> {
    match op {
        BinaryOperator::Eq => Some(ConjOp::Eq),
        BinaryOperator::Lt => Some(ConjOp::Lt),
        BinaryOperator::LtEq => Some(ConjOp::LtEq),
        BinaryOperator::Gt => Some(ConjOp::Gt),
        BinaryOperator::GtEq => Some(ConjOp::GtEq),
        _ => None,
    }
}

/// Whether `col <op> value` implies the restriction.
fn implies(op: ConjOp, value: &ScalarValue, restriction: &Restriction) -> bool {
    match restriction {
        Restriction::Eq { value: expected, .. } => op == ConjOp::Eq && scalar_eq(value, expected),
        Restriction::In { values, .. } => {
            op == ConjOp::Eq && values.iter().any(|v| scalar_eq(value, v))
        }
        Restriction::Cmp {
            op: r_op,
            value: bound,
            ..
        } => {
            let value = match value.as_f64() {
                Some(v) => v,
                None => return false,
            };
            match op {
                ConjOp::Eq => r_op.eval(value, *bound),
                ConjOp::Lt => matches!(r_op, CmpOp::Lt | CmpOp::LtEq) && value <= *bound,
                ConjOp::LtEq => match r_op {
                    CmpOp::Lt => value < *bound,
                    CmpOp::LtEq => value <= *bound,
                    _ => false,
                },
                ConjOp::Gt => matches!(r_op, CmpOp::Gt | CmpOp::GtEq) && value >= *bound,
                ConjOp::GtEq => match r_op {
                    CmpOp::Gt => value > *bound,
                    CmpOp::GtEq => value >= *bound,
                    _ => false,
                },
            }
        }
        Restriction::Between { low, high, .. } => {
            op == ConjOp::Eq
                && value
                    .as_f64()
                    .map(|v| *low <= v && v <= *high)
                    .unwrap_or(false)
        }
    }
}

/// Value equality: numeric values compare numerically, strings exactly.
fn scalar_eq(left: &ScalarValue, right: &ScalarValue) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) => l == r,
        _ => matches!(
            (left, right),
            (ScalarValue::Str(l), ScalarValue::Str(r)) if l == r
        ),
    }
}

/// Whether the expression is a reference to the restriction's column on the
/// bound table. A qualifier must name the binding: its alias when aliased,
/// its table name otherwise.
fn column_matches(
    expr: &Expr,
    restriction: &Restriction,
    table: &CompiledTable,
    alias: Option<&str>,
) -> bool {
    let column_lower = restriction.column().to_lowercase();
    match expr {
        Expr::Nested(inner) => column_matches(inner, restriction, table, alias),
        Expr::Identifier(ident) => ident.value.to_lowercase() == column_lower,
        Expr::CompoundIdentifier(parts) => match parts.split_last() {
            Some((name, qualifier)) => {
                let expected = alias
                    .map(str::to_lowercase)
                    .unwrap_or_else(|| table.name().to_lowercase());
                name.value.to_lowercase() == column_lower
                    && qualifier
                        .last()
                        .map(|q| q.value.to_lowercase() == expected)
                        .unwrap_or(false)
            }
            None => false,
        },
        _ => false,
    }
}

/// Extract a literal scalar from an expression, if it is one.
fn literal_value(expr: &Expr) -> Option<ScalarValue> {
    match expr {
        Expr::Nested(inner) => literal_value(inner),
        Expr::UnaryOp {
            op: sqlparser::ast::UnaryOperator::Minus,
            expr,
        } => match literal_value(expr)? {
            ScalarValue::Int(i) => Some(ScalarValue::Int(-i)),
            ScalarValue::Float(f) => Some(ScalarValue::Float(-f)),
            ScalarValue::Str(_) => None,
        },
        Expr::Value(Value::Number(text, _)) => {
            if let Ok(i) = text.parse::<i64>() {
                Some(ScalarValue::Int(i))
            } else {
                text.parse::<f64>().ok().map(ScalarValue::Float)
            }
        }
        Expr::Value(Value::SingleQuotedString(s)) => Some(ScalarValue::Str(s.clone())),
        _ => None,
    }
}

fn numeric_literal(expr: &Expr) -> Option<f64> {
    literal_value(expr).and_then(|v| v.as_f64())
}

/// Build the predicate expression for an unsatisfied restriction.
pub(crate) fn build_predicate(prefix: Option<&str>, restriction: &Restriction) -> Expr {
    let column = column_expr(prefix, restriction.column());
    match restriction {
        Restriction::Eq { value, .. } => Expr::BinaryOp {
            left: Box::new(column),
            op: BinaryOperator::Eq,
            right: Box::new(scalar_expr(value)),
        },
        Restriction::Cmp { op, value, .. } => Expr::BinaryOp {
            left: Box::new(column),
            op: match op {
                CmpOp::Lt => BinaryOperator::Lt,
                CmpOp::LtEq => BinaryOperator::LtEq,
                CmpOp::Gt => BinaryOperator::Gt,
                CmpOp::GtEq => BinaryOperator::GtEq,
            },
            right: Box::new(number_expr(*value)),
        },
        Restriction::Between { low, high, .. } => Expr::Between {
            expr: Box::new(column),
            negated: false,
            low: Box::new(number_expr(*low)),
            high: Box::new(number_expr(*high)),
        },
        Restriction::In { values, .. } => Expr::InList {
            expr: Box::new(column),
            list: values.iter().map(scalar_expr).collect(),
            negated: false,
        },
    }
}

fn column_expr(prefix: Option<&str>, column: &str) -> Expr {
    match prefix {
        Some(p) => Expr::CompoundIdentifier(vec![Ident::new(p), Ident::new(column)]),
        None => Expr::Identifier(Ident::new(column)),
    }
}

fn scalar_expr(value: &ScalarValue) -> Expr {
    match value {
        ScalarValue::Int(i) => Expr::Value(Value::Number(i.to_string(), false)),
        ScalarValue::Float(f) => Expr::Value(Value::Number(f.to_string(), false)),
        ScalarValue::Str(s) => Expr::Value(Value::SingleQuotedString(s.clone())),
    }
}

fn number_expr(value: f64) -> Expr {
    Expr::Value(Value::Number(value.to_string(), false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;
    use sqlward_core::Policy;

    fn table_with(restriction_json: &str) -> sqlward_core::CompiledPolicy {
        Policy::from_json(&format!(
            r#"{{
                "tables": [
                    {{
                        "table_name": "orders",
                        "columns": ["id", "account_id", "price"],
                        "restrictions": [{}]
                    }}
                ]
            }}"#,
            restriction_json
        ))
        .unwrap()
        .validate()
        .unwrap()
    }

    fn check(policy: &sqlward_core::CompiledPolicy, condition: &str) -> bool {
        let sql = format!("SELECT id FROM orders WHERE {}", condition);
        let mut statements = Parser::parse_sql(&GenericDialect {}, &sql).unwrap();
        let query = match statements.remove(0) {
            sqlparser::ast::Statement::Query(q) => q,
            _ => unreachable!(),
        };
        let selection = match *query.body {
            sqlparser::ast::SetExpr::Select(select) => select.selection.unwrap(),
            _ => unreachable!(),
        };
        let table = policy.resolve(None, "orders").unwrap();
        let restriction = &table.restrictions()[0];
        let mut conjuncts = Vec::new();
        split_conjuncts(&selection, &mut conjuncts);
        conjuncts
            .iter()
            .any(|c| satisfies(c, restriction, table, None))
    }

    #[test]
    fn test_eq_restriction() {
        let policy = table_with(r#"{"column": "account_id", "value": 123}"#);
        assert!(check(&policy, "account_id = 123"));
        assert!(check(&policy, "123 = account_id"));
        assert!(check(&policy, "orders.account_id = 123"));
        assert!(check(&policy, "x = 1 AND account_id = 123"));
        assert!(!check(&policy, "account_id = 456"));
        assert!(!check(&policy, "account_id = 123 OR account_id = 456"));
        assert!(check(&policy, "account_id = 123 OR account_id = 123"));
        assert!(!check(&policy, "NOT account_id = 123"));
        assert!(!check(&policy, "account_id < 123"));
    }

    #[test]
    fn test_string_eq_restriction() {
        let policy = table_with(r#"{"column": "account_id", "value": "acme"}"#);
        assert!(check(&policy, "account_id = 'acme'"));
        assert!(!check(&policy, "account_id = 'other'"));
        assert!(!check(&policy, "account_id = 123"));
    }

    #[test]
    fn test_cmp_restriction() {
        let policy = table_with(r#"{"column": "price", "operation": "<", "value": 100}"#);
        assert!(check(&policy, "price < 100"));
        assert!(check(&policy, "price < 50"));
        assert!(check(&policy, "price <= 99"));
        assert!(check(&policy, "price = 50"));
        assert!(check(&policy, "50 > price"));
        assert!(!check(&policy, "price < 200"));
        assert!(!check(&policy, "price <= 100"));
        assert!(!check(&policy, "price > 50"));
    }

    #[test]
    fn test_between_restriction() {
        let policy =
            table_with(r#"{"column": "price", "operation": "BETWEEN", "values": [80, 150]}"#);
        assert!(check(&policy, "price BETWEEN 80 AND 150"));
        assert!(check(&policy, "price BETWEEN 90 AND 120"));
        assert!(check(&policy, "price = 100"));
        assert!(check(&policy, "price IN (90, 100)"));
        assert!(!check(&policy, "price BETWEEN 70 AND 150"));
        assert!(!check(&policy, "price BETWEEN 100 AND 200"));
        assert!(!check(&policy, "price = 200"));
        assert!(!check(&policy, "price NOT BETWEEN 80 AND 150"));
    }

    #[test]
    fn test_in_restriction() {
        let policy =
            table_with(r#"{"column": "account_id", "operation": "IN", "values": [1, 2, 3]}"#);
        assert!(check(&policy, "account_id IN (1, 2)"));
        assert!(check(&policy, "account_id = 2"));
        assert!(!check(&policy, "account_id IN (1, 9)"));
        assert!(!check(&policy, "account_id NOT IN (1, 2)"));
    }

    #[test]
    fn test_alias_qualifier_must_match() {
        let policy = table_with(r#"{"column": "account_id", "value": 123}"#);
        let table = policy.resolve(None, "orders").unwrap();
        let restriction = &table.restrictions()[0];

        let parse = |condition: &str| {
            let sql = format!("SELECT id FROM orders AS o WHERE {}", condition);
            let mut statements = Parser::parse_sql(&GenericDialect {}, &sql).unwrap();
            match statements.remove(0) {
                sqlparser::ast::Statement::Query(q) => match *q.body {
                    sqlparser::ast::SetExpr::Select(select) => select.selection.unwrap(),
                    _ => unreachable!(),
                },
                _ => unreachable!(),
            }
        };

        let aliased = parse("o.account_id = 123");
        assert!(satisfies(&aliased, restriction, table, Some("o")));
        // A stale qualifier does not satisfy an aliased binding.
        let stale = parse("orders.account_id = 123");
        assert!(!satisfies(&stale, restriction, table, Some("o")));
        // Unqualified satisfies either way.
        let bare = parse("account_id = 123");
        assert!(satisfies(&bare, restriction, table, Some("o")));
    }

    #[test]
    fn test_predicate_rendering() {
        let eq = build_predicate(
            None,
            &Restriction::Eq {
                column: "account_id".to_string(),
                value: ScalarValue::Int(123),
            },
        );
        assert_eq!(eq.to_string(), "account_id = 123");

        let between = build_predicate(
            Some("p"),
            &Restriction::Between {
                column: "price".to_string(),
                low: 80.0,
                high: 150.0,
            },
        );
        assert_eq!(between.to_string(), "p.price BETWEEN 80 AND 150");

        let in_list = build_predicate(
            None,
            &Restriction::In {
                column: "cat".to_string(),
                values: vec![
                    ScalarValue::Str("a".to_string()),
                    ScalarValue::Str("b".to_string()),
                ],
            },
        );
        assert_eq!(in_list.to_string(), "cat IN ('a', 'b')");
    }
}
