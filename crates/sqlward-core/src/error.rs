//! Error types for policy loading and validation.
//!
//! Loading errors (`PolicyLoadError`) cover I/O and deserialization.
//! Validation errors (`PolicyError`) cover violations of the policy
//! invariants, organized by kind so callers can branch without parsing
//! message text.

use std::fmt;
use std::path::Path;

/// Error type for policy loading from files or strings.
#[derive(Debug, thiserror::Error)]
pub enum PolicyLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported policy file extension: {0}")]
    UnsupportedExtension(String),
}

impl PolicyLoadError {
    pub(crate) fn unsupported_extension(path: &Path) -> Self {
        Self::UnsupportedExtension(path.display().to_string())
    }
}

/// Error type for policy validation failures.
///
/// Carries the kind of violation plus a message naming the offending
/// table/column/operation path.
#[derive(Debug, Clone)]
pub struct PolicyError {
    /// The kind of policy violation.
    pub kind: PolicyErrorKind,
    /// Human-readable error message.
    pub message: String,
}

impl PolicyError {
    /// Create a new policy error.
    pub fn new(kind: PolicyErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create an empty table name error.
    pub fn empty_table_name() -> Self {
        Self::new(
            PolicyErrorKind::EmptyTableName,
            "Policy contains a table with an empty name",
        )
    }

    /// Create an empty column list error.
    pub fn empty_column_list(table: &str) -> Self {
        Self::new(
            PolicyErrorKind::EmptyColumnList,
            format!("Table '{}' has an empty column list", table),
        )
    }

    /// Create a restriction-on-unknown-column error.
    pub fn restriction_column_unknown(table: &str, column: &str) -> Self {
        Self::new(
            PolicyErrorKind::RestrictionColumnUnknown,
            format!(
                "Restriction column '{}' is not in the allowed columns of table '{}'",
                column, table
            ),
        )
    }

    /// Create an unsupported restriction operation error.
    pub fn unsupported_restriction(table: &str, column: &str, operation: &str) -> Self {
        Self::new(
            PolicyErrorKind::UnsupportedRestriction,
            format!(
                "Restriction on '{}.{}' uses unsupported operation '{}'",
                table, column, operation
            ),
        )
    }

    /// Create a missing restriction value error.
    pub fn missing_restriction_value(table: &str, column: &str) -> Self {
        Self::new(
            PolicyErrorKind::MissingRestrictionValue,
            format!(
                "Restriction on '{}.{}' has neither 'value' nor 'values'",
                table, column
            ),
        )
    }

    /// Create an expected-scalar-value error.
    pub fn expected_scalar_value(table: &str, column: &str, operation: &str) -> Self {
        Self::new(
            PolicyErrorKind::ExpectedScalarValue,
            format!(
                "Restriction on '{}.{}' with operation '{}' requires a single scalar value",
                table, column, operation
            ),
        )
    }

    /// Create a non-numeric comparison value error.
    pub fn non_numeric_comparison(table: &str, column: &str, operation: &str) -> Self {
        Self::new(
            PolicyErrorKind::NonNumericComparison,
            format!(
                "Restriction on '{}.{}' with operation '{}' requires a numeric value",
                table, column, operation
            ),
        )
    }

    /// Create an invalid BETWEEN restriction error.
    pub fn invalid_between(table: &str, column: &str, reason: &str) -> Self {
        Self::new(
            PolicyErrorKind::InvalidBetween,
            format!(
                "BETWEEN restriction on '{}.{}' is invalid: {}",
                table, column, reason
            ),
        )
    }

    /// Create an invalid IN restriction error.
    pub fn invalid_in(table: &str, column: &str, reason: &str) -> Self {
        Self::new(
            PolicyErrorKind::InvalidIn,
            format!(
                "IN restriction on '{}.{}' is invalid: {}",
                table, column, reason
            ),
        )
    }
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PolicyError {}

/// Categories of policy validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyErrorKind {
    /// A table entry has an empty name.
    EmptyTableName,
    /// A table entry has no allowed columns.
    EmptyColumnList,
    /// A restriction targets a column outside the allowed column list.
    RestrictionColumnUnknown,
    /// A restriction uses an operation outside `= < > <= >= BETWEEN IN`.
    UnsupportedRestriction,
    /// A restriction has neither `value` nor `values`.
    MissingRestrictionValue,
    /// A scalar operation was given a list (or no scalar).
    ExpectedScalarValue,
    /// An ordering comparison was given a non-numeric value.
    NonNumericComparison,
    /// BETWEEN does not have exactly two ascending numeric bounds.
    InvalidBetween,
    /// IN is empty or mixes value types.
    InvalidIn,
}
