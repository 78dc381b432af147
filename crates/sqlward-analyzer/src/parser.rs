//! SQL parser adapter.
//!
//! Wraps `sqlparser` behind the analyzer's contract: dialect resolution,
//! single-statement parsing, and classification of statement kinds the
//! policy layer rejects outright. Comments are stripped by the tokenizer;
//! the one place they matter is a comment-only projection list, which this
//! module detects so the caller can report it as a verdict error rather
//! than a parse failure.

use sqlparser::ast::Statement;
use sqlparser::dialect::{dialect_from_str, Dialect, GenericDialect};
use sqlparser::parser::Parser;

use crate::error::AnalyzerError;

/// Default dialect tag: a Trino/Presto-like superset.
pub const DEFAULT_DIALECT: &str = "trino";

/// Resolve a dialect tag to a parser dialect.
///
/// `trino`, `presto`, and the empty string map to `GenericDialect`
/// (sqlparser has no Trino dialect; Generic is the closest superset).
/// Everything else goes through `sqlparser`'s own registry.
pub(crate) fn resolve_dialect(name: &str) -> Result<Box<dyn Dialect>, AnalyzerError> {
    match name.to_lowercase().as_str() {
        "" | "trino" | "presto" | "generic" => Ok(Box::new(GenericDialect {})),
        other => {
            dialect_from_str(other).ok_or_else(|| AnalyzerError::UnknownDialect(name.to_string()))
        }
    }
}

/// Parse exactly one statement. Multi-statement input is rejected.
pub(crate) fn parse_single(sql: &str, dialect: &dyn Dialect) -> Result<Statement, AnalyzerError> {
    let mut statements =
        Parser::parse_sql(dialect, sql).map_err(|e| AnalyzerError::Parse(e.to_string()))?;
    match statements.len() {
        0 => Err(AnalyzerError::EmptyStatement),
        1 => Ok(statements.remove(0)),
        n => Err(AnalyzerError::MultipleStatements(n)),
    }
}

/// Verdict error for a statement kind the analyzer does not permit.
/// Only `SELECT` (`Statement::Query`) passes the gate.
pub(crate) fn statement_kind_error(statement: &Statement) -> String {
    let kind = match statement {
        Statement::Insert { .. } => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete { .. } => "DELETE",
        Statement::Drop { .. } => "DROP",
        Statement::Truncate { .. } => "TRUNCATE",
        Statement::Merge { .. } => "MERGE",
        Statement::AlterTable { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterView { .. }
        | Statement::AlterRole { .. } => "ALTER",
        Statement::CreateTable { .. }
        | Statement::CreateView { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateFunction { .. } => "CREATE",
        Statement::Explain { .. } => "EXPLAIN",
        Statement::Grant { .. } => "GRANT",
        Statement::Revoke { .. } => "REVOKE",
        Statement::ShowTables { .. }
        | Statement::ShowColumns { .. }
        | Statement::ShowDatabases { .. }
        | Statement::ShowSchemas { .. }
        | Statement::ShowFunctions { .. }
        | Statement::ShowCreate { .. }
        | Statement::ShowVariable { .. }
        | Statement::ShowVariables { .. } => "SHOW",
        _ => return "Could not find a query statement".to_string(),
    };
    format!("{} statement is not allowed", kind)
}

/// Detect a projection list that is empty once comments are removed
/// (`SELECT /* nothing here */ FROM t`). The parser reports these as
/// syntax errors; the analyzer reports them as a missing-projection
/// verdict instead.
pub(crate) fn is_comment_only_projection(sql: &str) -> bool {
    let stripped = strip_comments(sql);
    let mut tokens = stripped.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(first), Some(second)) => {
            first.eq_ignore_ascii_case("select") && second.eq_ignore_ascii_case("from")
        }
        (Some(first), None) => first.eq_ignore_ascii_case("select"),
        _ => false,
    }
}

/// Remove `--` and `/* ... */` comments, respecting string literals and
/// quoted identifiers. Comments are replaced by a single space so token
/// boundaries survive.
fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                // Copy the quoted region verbatim; doubled quotes escape.
                out.push(c);
                while let Some(inner) = chars.next() {
                    out.push(inner);
                    if inner == c {
                        if chars.peek() == Some(&c) {
                            out.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                chars.next();
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
                out.push(' ');
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_select() {
        let dialect = resolve_dialect(DEFAULT_DIALECT).unwrap();
        let stmt = parse_single("SELECT id FROM orders", dialect.as_ref()).unwrap();
        assert!(matches!(stmt, Statement::Query(_)));
    }

    #[test]
    fn test_multi_statement_rejected() {
        let dialect = resolve_dialect(DEFAULT_DIALECT).unwrap();
        let err = parse_single("SELECT 1; SELECT 2", dialect.as_ref()).unwrap_err();
        assert!(matches!(err, AnalyzerError::MultipleStatements(2)));
    }

    #[test]
    fn test_unparseable_input() {
        let dialect = resolve_dialect(DEFAULT_DIALECT).unwrap();
        let err = parse_single("this is not sql", dialect.as_ref()).unwrap_err();
        assert!(matches!(err, AnalyzerError::Parse(_)));
    }

    #[test]
    fn test_dialect_aliases() {
        assert!(resolve_dialect("trino").is_ok());
        assert!(resolve_dialect("presto").is_ok());
        assert!(resolve_dialect("").is_ok());
        assert!(resolve_dialect("postgres").is_ok());
        assert!(resolve_dialect("no-such-dialect").is_err());
    }

    #[test]
    fn test_statement_kind_errors() {
        let dialect = resolve_dialect(DEFAULT_DIALECT).unwrap();
        let cases = [
            ("DROP TABLE orders", "DROP statement is not allowed"),
            ("DELETE FROM orders", "DELETE statement is not allowed"),
            (
                "UPDATE orders SET id = 1",
                "UPDATE statement is not allowed",
            ),
            (
                "INSERT INTO orders (id) VALUES (1)",
                "INSERT statement is not allowed",
            ),
            (
                "TRUNCATE TABLE orders",
                "TRUNCATE statement is not allowed",
            ),
            (
                "CREATE TABLE t (id INT)",
                "CREATE statement is not allowed",
            ),
        ];
        for (sql, expected) in cases {
            let stmt = parse_single(sql, dialect.as_ref()).unwrap();
            assert_eq!(statement_kind_error(&stmt), expected, "for {sql}");
        }
    }

    #[test]
    fn test_strip_comments() {
        assert_eq!(
            strip_comments("SELECT id -- trailing\nFROM t"),
            "SELECT id  FROM t"
        );
        assert_eq!(strip_comments("SELECT /* x */ id"), "SELECT   id");
        // Comment markers inside literals are preserved.
        assert_eq!(strip_comments("SELECT '--not a comment'"), "SELECT '--not a comment'");
        assert_eq!(strip_comments("SELECT 'it''s /* fine */'"), "SELECT 'it''s /* fine */'");
    }

    #[test]
    fn test_comment_only_projection() {
        assert!(is_comment_only_projection("SELECT /* nothing */ FROM t"));
        assert!(is_comment_only_projection("SELECT -- nothing\nFROM t"));
        assert!(!is_comment_only_projection("SELECT id FROM t"));
        assert!(!is_comment_only_projection("DROP TABLE t"));
    }
}
