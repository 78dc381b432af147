//! Error types for the analyzer crate.
//!
//! These are input-plane failures: they abort the call before a verdict is
//! produced. Policy violations found during analysis are never errors at
//! this level; they accumulate into `Verdict::errors` instead.

use thiserror::Error;

use sqlward_core::PolicyError;

/// Errors that abort verification before a verdict is produced.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// SQL parsing failed.
    #[error("failed to parse SQL: {0}")]
    Parse(String),

    /// More than one statement was supplied.
    #[error("expected a single SQL statement, found {0}")]
    MultipleStatements(usize),

    /// The input contained no statement at all.
    #[error("no SQL statement found")]
    EmptyStatement,

    /// The requested dialect is not recognized.
    #[error("unknown SQL dialect: {0}")]
    UnknownDialect(String),

    /// The policy failed validation.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Internal invariant breach; always a bug.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
