//! # sqlward-analyzer
//!
//! SQL query analysis and rewriting against an allow-list policy.
//!
//! This crate provides functionality to:
//! - Parse a SQL statement with a selectable dialect (Trino-leaning default)
//! - Resolve table references, aliases, CTE bindings, and subquery scopes
//! - Validate projected and referenced columns against the policy
//! - Detect anti-patterns: `SELECT *`, always-true predicates, forbidden
//!   statement kinds, references to tables outside the policy
//! - Enforce row-level restrictions by injecting missing predicates
//! - Serialize the repaired query back to canonical SQL
//!
//! ## How It Works
//!
//! The analyzer walks the query against the policy, collects every
//! violation, and repairs what it can:
//!
//! **Before (from agent):**
//! ```sql
//! SELECT id, name FROM orders WHERE 1 = 1
//! ```
//!
//! **After (repaired):**
//! ```sql
//! SELECT id FROM orders WHERE account_id = 123
//! ```
//!
//! ## Example
//!
//! ```
//! use sqlward_analyzer::{verify_sql, Policy};
//!
//! let policy = Policy::from_json(r#"{
//!     "tables": [{
//!         "table_name": "orders",
//!         "columns": ["id", "product_name", "account_id"],
//!         "restrictions": [{"column": "account_id", "value": 123}]
//!     }]
//! }"#)?;
//!
//! let verdict = verify_sql("SELECT id FROM orders WHERE account_id = 123", &policy)?;
//! assert!(verdict.allowed);
//!
//! let verdict = verify_sql("SELECT id, secret FROM orders", &policy)?;
//! assert!(!verdict.allowed);
//! assert_eq!(
//!     verdict.fixed.as_deref(),
//!     Some("SELECT id FROM orders WHERE account_id = 123"),
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Each call owns its AST, performs no I/O, and touches no shared mutable
//! state; a [`SqlGuard`] may be shared across threads.

mod always_true;
mod analyzer;
pub mod error;
mod parser;
mod projection;
mod restriction;
mod rewrite;
mod scope;
mod visit;

use sqlparser::ast::Statement;

use sqlward_core::CompiledPolicy;

pub use analyzer::AnalyzerOptions;
pub use error::AnalyzerError;
pub use parser::DEFAULT_DIALECT;
pub use sqlward_core::{Policy, PolicyError, PolicyLoadError, Verdict};

use analyzer::AnalysisContext;

/// A validated policy plus analyzer configuration, ready to verify queries.
pub struct SqlGuard {
    policy: CompiledPolicy,
    dialect: String,
    options: AnalyzerOptions,
}

impl SqlGuard {
    /// Validate a policy and build a guard with the default (Trino-like)
    /// dialect.
    pub fn new(policy: &Policy) -> Result<Self, PolicyError> {
        Ok(Self {
            policy: policy.validate()?,
            dialect: DEFAULT_DIALECT.to_string(),
            options: AnalyzerOptions::default(),
        })
    }

    /// Select the SQL dialect used for parsing.
    pub fn with_dialect(mut self, dialect: &str) -> Result<Self, AnalyzerError> {
        parser::resolve_dialect(dialect)?;
        self.dialect = dialect.to_string();
        Ok(self)
    }

    /// Replace the analyzer options.
    pub fn with_options(mut self, options: AnalyzerOptions) -> Self {
        self.options = options;
        self
    }

    /// Verify one SQL statement against the policy.
    ///
    /// Policy violations land in the returned [`Verdict`]; only input-plane
    /// failures (unparseable SQL, multiple statements, unknown dialect) are
    /// `Err`.
    pub fn verify(&self, sql: &str) -> Result<Verdict, AnalyzerError> {
        let dialect = parser::resolve_dialect(&self.dialect).map_err(|_| {
            AnalyzerError::Internal(anyhow::anyhow!(
                "dialect '{}' failed to resolve after construction",
                self.dialect
            ))
        })?;

        let statement = match parser::parse_single(sql, dialect.as_ref()) {
            Ok(statement) => statement,
            Err(AnalyzerError::Parse(message)) => {
                if parser::is_comment_only_projection(sql) {
                    return Ok(Verdict::rejected("No legal elements in SELECT clause"));
                }
                return Err(AnalyzerError::Parse(message));
            }
            Err(other) => return Err(other),
        };

        match statement {
            Statement::Query(mut query) => {
                let original = query.to_string();

                let mut ctx = AnalysisContext::new(&self.policy, &self.options);
                ctx.analyze_query(&mut query, None);
                tracing::debug!(
                    errors = ctx.errors.len(),
                    unfixable = ctx.unfixable,
                    "analysis complete"
                );

                let fixed = if !ctx.unfixable && !ctx.errors.is_empty() {
                    let rewritten = query.to_string();
                    (rewritten != original).then_some(rewritten)
                } else {
                    None
                };
                Ok(Verdict {
                    allowed: ctx.errors.is_empty(),
                    errors: ctx.errors,
                    fixed,
                    risk: 0.0,
                })
            }
            other => Ok(Verdict::rejected(parser::statement_kind_error(&other))),
        }
    }
}

/// Verify a SQL statement against a policy with the default dialect.
pub fn verify_sql(sql: &str, policy: &Policy) -> Result<Verdict, AnalyzerError> {
    SqlGuard::new(policy)?.verify(sql)
}

/// Verify a SQL statement against a policy, parsing with the named dialect.
pub fn verify_sql_with_dialect(
    sql: &str,
    policy: &Policy,
    dialect: &str,
) -> Result<Verdict, AnalyzerError> {
    SqlGuard::new(policy)?.with_dialect(dialect)?.verify(sql)
}
