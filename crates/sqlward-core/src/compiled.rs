//! Policy validation and the compiled, immutable policy form.
//!
//! [`Policy::validate`] checks every policy invariant up front and produces
//! a [`CompiledPolicy`] with identifiers canonicalized to lowercase for
//! comparison (original spelling is kept for messages and rewriting) and
//! restrictions lowered into the [`Restriction`] sum type.

use std::collections::HashSet;

use crate::error::PolicyError;
use crate::policy::{Policy, RestrictionSpec, TablePolicy};
use crate::value::ScalarValue;

/// A validated, immutable policy ready for query analysis.
///
/// Shared read-only across verification calls; no interior mutability.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    tables: Vec<CompiledTable>,
}

impl CompiledPolicy {
    /// The allowed tables, in policy order.
    pub fn tables(&self) -> &[CompiledTable] {
        &self.tables
    }

    /// Resolve a table reference by optional database qualifier and table
    /// name (both lowercase). An unqualified reference matches regardless
    /// of the policy's `database_name`; a qualified reference must match it.
    pub fn resolve(&self, database: Option<&str>, name: &str) -> Option<&CompiledTable> {
        self.tables.iter().find(|t| t.matches_reference(database, name))
    }
}

/// A single validated table entry.
#[derive(Debug, Clone)]
pub struct CompiledTable {
    name: String,
    name_lower: String,
    database_lower: Option<String>,
    columns: Vec<String>,
    columns_lower: HashSet<String>,
    restrictions: Vec<Restriction>,
}

impl CompiledTable {
    /// Table name in its original spelling.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Allowed columns in policy order, original spelling.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether a column (lowercase) is in the allowed column list.
    pub fn allows_column(&self, column_lower: &str) -> bool {
        self.columns_lower.contains(column_lower)
    }

    /// Row-level restrictions on this table.
    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    /// Whether a reference with an optional database qualifier and table
    /// name (both lowercase) refers to this table.
    pub fn matches_reference(&self, database: Option<&str>, name: &str) -> bool {
        if name != self.name_lower {
            return false;
        }
        match database {
            None => true,
            Some(db) => self.database_lower.as_deref() == Some(db),
        }
    }
}

/// Ordering comparison operators usable in restrictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CmpOp {
    /// SQL spelling of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
        }
    }

    /// Whether `left <op> right` holds.
    pub fn eval(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::LtEq => left <= right,
            Self::Gt => left > right,
            Self::GtEq => left >= right,
        }
    }
}

/// A validated row-level restriction, matched exhaustively by the
/// restriction enforcer.
#[derive(Debug, Clone, PartialEq)]
pub enum Restriction {
    /// `column = value`; the value may be numeric or string.
    Eq { column: String, value: ScalarValue },
    /// `column < value` (and `<=`, `>`, `>=`); numeric only.
    Cmp { column: String, op: CmpOp, value: f64 },
    /// `column BETWEEN low AND high`; numeric, `low < high`.
    Between { column: String, low: f64, high: f64 },
    /// `column IN (values...)`; non-empty, single primitive type.
    In {
        column: String,
        values: Vec<ScalarValue>,
    },
}

impl Restriction {
    /// The restricted column, original spelling.
    pub fn column(&self) -> &str {
        match self {
            Self::Eq { column, .. }
            | Self::Cmp { column, .. }
            | Self::Between { column, .. }
            | Self::In { column, .. } => column,
        }
    }

    /// Message rendering of the restriction value: scalars bare, lists as
    /// `[a, b]` with strings quoted.
    pub fn value_text(&self) -> String {
        match self {
            Self::Eq { value, .. } => value.to_string(),
            Self::Cmp { value, .. } => value.to_string(),
            Self::Between { low, high, .. } => format!("[{}, {}]", low, high),
            Self::In { values, .. } => {
                let rendered: Vec<String> = values.iter().map(|v| v.to_sql()).collect();
                format!("[{}]", rendered.join(", "))
            }
        }
    }
}

impl Policy {
    /// Validate this policy, producing the compiled form the analyzer
    /// consumes. The analyzer refuses to run on an invalid policy.
    pub fn validate(&self) -> Result<CompiledPolicy, PolicyError> {
        let mut tables = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            tables.push(compile_table(table)?);
        }
        Ok(CompiledPolicy { tables })
    }
}

fn compile_table(table: &TablePolicy) -> Result<CompiledTable, PolicyError> {
    if table.table_name.trim().is_empty() {
        return Err(PolicyError::empty_table_name());
    }
    if table.columns.is_empty() {
        return Err(PolicyError::empty_column_list(&table.table_name));
    }

    let columns_lower: HashSet<String> =
        table.columns.iter().map(|c| c.to_lowercase()).collect();

    let mut restrictions = Vec::with_capacity(table.restrictions.len());
    for spec in &table.restrictions {
        if !columns_lower.contains(&spec.column.to_lowercase()) {
            return Err(PolicyError::restriction_column_unknown(
                &table.table_name,
                &spec.column,
            ));
        }
        restrictions.push(compile_restriction(&table.table_name, spec)?);
    }

    Ok(CompiledTable {
        name: table.table_name.clone(),
        name_lower: table.table_name.to_lowercase(),
        database_lower: table.database_name.as_ref().map(|d| d.to_lowercase()),
        columns: table.columns.clone(),
        columns_lower,
        restrictions,
    })
}

fn compile_restriction(
    table: &str,
    spec: &RestrictionSpec,
) -> Result<Restriction, PolicyError> {
    let column = spec.column.clone();

    // Normalize: a list accidentally placed in `value` counts as `values`.
    let list = match (&spec.values, &spec.value) {
        (Some(values), _) => Some(values.clone()),
        (None, Some(serde_json::Value::Array(items))) => Some(items.clone()),
        _ => None,
    };
    let scalar = match &spec.value {
        Some(serde_json::Value::Array(_)) | None => None,
        Some(v) => Some(v),
    };

    match spec.operation.to_uppercase().as_str() {
        "=" => {
            if list.is_some() {
                return Err(PolicyError::expected_scalar_value(table, &column, "="));
            }
            let raw = scalar
                .ok_or_else(|| PolicyError::missing_restriction_value(table, &column))?;
            let value = ScalarValue::from_json(raw)
                .ok_or_else(|| PolicyError::expected_scalar_value(table, &column, "="))?;
            Ok(Restriction::Eq { column, value })
        }
        op @ ("<" | ">" | "<=" | ">=") => {
            if list.is_some() {
                return Err(PolicyError::expected_scalar_value(table, &column, op));
            }
            let raw = scalar
                .ok_or_else(|| PolicyError::missing_restriction_value(table, &column))?;
            let value = ScalarValue::from_json(raw)
                .and_then(|v| v.as_f64())
                .ok_or_else(|| PolicyError::non_numeric_comparison(table, &column, op))?;
            let op = match op {
                "<" => CmpOp::Lt,
                ">" => CmpOp::Gt,
                "<=" => CmpOp::LtEq,
                _ => CmpOp::GtEq,
            };
            Ok(Restriction::Cmp { column, op, value })
        }
        "BETWEEN" => {
            let items =
                list.ok_or_else(|| PolicyError::missing_restriction_value(table, &column))?;
            if items.len() != 2 {
                return Err(PolicyError::invalid_between(
                    table,
                    &column,
                    "expected exactly two bounds",
                ));
            }
            let bounds: Vec<f64> = items
                .iter()
                .filter_map(|v| ScalarValue::from_json(v).and_then(|s| s.as_f64()))
                .collect();
            if bounds.len() != 2 {
                return Err(PolicyError::invalid_between(
                    table,
                    &column,
                    "bounds must be numeric",
                ));
            }
            if bounds[0] >= bounds[1] {
                return Err(PolicyError::invalid_between(
                    table,
                    &column,
                    "lower bound must be less than upper bound",
                ));
            }
            Ok(Restriction::Between {
                column,
                low: bounds[0],
                high: bounds[1],
            })
        }
        "IN" => {
            let items =
                list.ok_or_else(|| PolicyError::missing_restriction_value(table, &column))?;
            if items.is_empty() {
                return Err(PolicyError::invalid_in(table, &column, "empty value list"));
            }
            let mut values = Vec::with_capacity(items.len());
            for item in &items {
                let value = ScalarValue::from_json(item).ok_or_else(|| {
                    PolicyError::invalid_in(table, &column, "values must be primitive")
                })?;
                values.push(value);
            }
            let homogeneous = values
                .windows(2)
                .all(|w| std::mem::discriminant(&w[0]) == std::mem::discriminant(&w[1]));
            if !homogeneous {
                return Err(PolicyError::invalid_in(
                    table,
                    &column,
                    "values must share a single primitive type",
                ));
            }
            Ok(Restriction::In { column, values })
        }
        other => Err(PolicyError::unsupported_restriction(table, &column, other)),
    }
}
