//! The declarative allow-list policy and its loaders.
//!
//! The canonical policy form is a list of tables:
//!
//! ```json
//! {
//!   "tables": [
//!     {
//!       "table_name": "orders",
//!       "columns": ["id", "product_name", "account_id"],
//!       "restrictions": [{"column": "account_id", "value": 123}]
//!     }
//!   ]
//! }
//! ```
//!
//! A legacy shape where `tables` is a mapping of name to body is also
//! accepted and normalized to the list form at this boundary; the rest of
//! the crate only sees the list form.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::PolicyLoadError;

/// An allow-list policy: the set of tables a query may touch.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Policy {
    /// Allowed tables, in policy order. Missing means no table is allowed.
    #[serde(default, deserialize_with = "tables_list_or_map")]
    pub tables: Vec<TablePolicy>,
}

/// A single allowed table: its name, allowed columns, and row-level
/// restrictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablePolicy {
    /// Table name (matched case-insensitively).
    pub table_name: String,

    /// Optional database/schema qualifier the table may be referenced
    /// through (e.g. `orders_db.orders`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,

    /// Allowed columns, in the order `SELECT *` expands to.
    pub columns: Vec<String>,

    /// Restrictions that must appear in every query touching this table.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restrictions: Vec<RestrictionSpec>,
}

/// Raw restriction as written in the policy document.
///
/// `operation` defaults to `=`. Scalar operations use `value`; `BETWEEN`
/// and `IN` use `values` (a list accidentally placed in `value` is also
/// accepted and normalized during validation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestrictionSpec {
    /// Target column (must be in the table's allowed columns).
    pub column: String,

    /// One of `=`, `<`, `>`, `<=`, `>=`, `BETWEEN`, `IN`.
    #[serde(default = "default_operation")]
    pub operation: String,

    /// Scalar value for scalar operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,

    /// Value list for `BETWEEN` (exactly two) and `IN` (one or more).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<serde_json::Value>>,
}

fn default_operation() -> String {
    "=".to_string()
}

impl Policy {
    /// Parse a policy from JSON content.
    pub fn from_json(content: &str) -> Result<Self, PolicyLoadError> {
        serde_json::from_str(content).map_err(PolicyLoadError::from)
    }

    /// Parse a policy from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, PolicyLoadError> {
        serde_yaml::from_str(content).map_err(PolicyLoadError::from)
    }

    /// Load a policy from a `.json`, `.yaml`, or `.yml` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyLoadError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            _ => Err(PolicyLoadError::unsupported_extension(path)),
        }
    }
}

/// Table body in the legacy map form: a `TablePolicy` without the name,
/// which comes from the map key.
#[derive(Debug, Deserialize)]
struct TableBody {
    #[serde(default)]
    database_name: Option<String>,
    columns: Vec<String>,
    #[serde(default)]
    restrictions: Vec<RestrictionSpec>,
}

fn tables_list_or_map<'de, D>(deserializer: D) -> Result<Vec<TablePolicy>, D::Error>
where
    D: Deserializer<'de>,
{
    struct TablesShape;

    impl<'de> Visitor<'de> for TablesShape {
        type Value = Vec<TablePolicy>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a list of table policies or a map of table name to body")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut tables = Vec::new();
            while let Some(table) = seq.next_element::<TablePolicy>()? {
                tables.push(table);
            }
            Ok(tables)
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut tables = Vec::new();
            while let Some((table_name, body)) = map.next_entry::<String, TableBody>()? {
                tables.push(TablePolicy {
                    table_name,
                    database_name: body.database_name,
                    columns: body.columns,
                    restrictions: body.restrictions,
                });
            }
            Ok(tables)
        }
    }

    deserializer.deserialize_any(TablesShape)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_form() {
        let policy = Policy::from_json(
            r#"{
                "tables": [
                    {
                        "table_name": "orders",
                        "columns": ["id", "product_name", "account_id"],
                        "restrictions": [{"column": "account_id", "value": 123}]
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(policy.tables.len(), 1);
        assert_eq!(policy.tables[0].table_name, "orders");
        assert_eq!(policy.tables[0].columns.len(), 3);
        assert_eq!(policy.tables[0].restrictions.len(), 1);
        assert_eq!(policy.tables[0].restrictions[0].operation, "=");
    }

    #[test]
    fn test_legacy_map_form() {
        let policy = Policy::from_json(
            r#"{
                "tables": {
                    "orders": {
                        "columns": ["id", "account_id"],
                        "restrictions": [{"column": "account_id", "value": 123}]
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(policy.tables.len(), 1);
        assert_eq!(policy.tables[0].table_name, "orders");
        assert_eq!(policy.tables[0].columns, vec!["id", "account_id"]);
    }

    #[test]
    fn test_database_name_and_explicit_operation() {
        let policy = Policy::from_json(
            r#"{
                "tables": [
                    {
                        "table_name": "products",
                        "database_name": "orders_db",
                        "columns": ["prod_id", "price"],
                        "restrictions": [
                            {"column": "price", "operation": "BETWEEN", "values": [80, 150]}
                        ]
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(policy.tables[0].database_name.as_deref(), Some("orders_db"));
        assert_eq!(policy.tables[0].restrictions[0].operation, "BETWEEN");
    }

    #[test]
    fn test_yaml_form() {
        let policy = Policy::from_yaml(
            r#"
tables:
  - table_name: orders
    columns: [id, account_id]
"#,
        )
        .unwrap();

        assert_eq!(policy.tables[0].table_name, "orders");
        assert!(policy.tables[0].restrictions.is_empty());
    }
}
