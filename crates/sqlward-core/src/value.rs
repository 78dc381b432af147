//! Scalar restriction values.

use std::fmt;

/// A primitive restriction value: integer, float, or string.
///
/// Booleans and nulls are not valid restriction values and are rejected
/// during policy validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl ScalarValue {
    /// Convert a JSON scalar into a `ScalarValue`. Returns `None` for
    /// booleans, nulls, arrays, and objects.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Int(i))
                } else {
                    n.as_f64().map(Self::Float)
                }
            }
            serde_json::Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    /// Whether this value is numeric (integer or float).
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// Numeric view of this value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Str(_) => None,
        }
    }

    /// Render as a SQL literal: strings are single-quoted with embedded
    /// quotes doubled, numbers are bare.
    pub fn to_sql(&self) -> String {
        match self {
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

/// Message rendering: numbers bare, strings bare (they are quoted only in
/// SQL position).
impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(v) => write!(f, "{}", v),
            Self::Str(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(ScalarValue::from_json(&json!(123)), Some(ScalarValue::Int(123)));
        assert_eq!(
            ScalarValue::from_json(&json!(1.5)),
            Some(ScalarValue::Float(1.5))
        );
        assert_eq!(
            ScalarValue::from_json(&json!("abc")),
            Some(ScalarValue::Str("abc".to_string()))
        );
        assert_eq!(ScalarValue::from_json(&json!(true)), None);
        assert_eq!(ScalarValue::from_json(&json!(null)), None);
        assert_eq!(ScalarValue::from_json(&json!([1, 2])), None);
    }

    #[test]
    fn test_sql_rendering() {
        assert_eq!(ScalarValue::Int(123).to_sql(), "123");
        assert_eq!(ScalarValue::Float(1.5).to_sql(), "1.5");
        assert_eq!(ScalarValue::Str("a'b".to_string()).to_sql(), "'a''b'");
    }

    #[test]
    fn test_message_rendering() {
        assert_eq!(ScalarValue::Int(123).to_string(), "123");
        assert_eq!(ScalarValue::Str("abc".to_string()).to_string(), "abc");
    }
}
