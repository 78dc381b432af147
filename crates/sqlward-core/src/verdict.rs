//! The analysis verdict returned to callers.

use serde::{Deserialize, Serialize};

/// Result of verifying a query against a policy.
///
/// `allowed` is true exactly when no violation was found. `fixed` holds the
/// repaired query when mutation produced a strictly different canonical
/// serialization; it is `None` for compliant and for unfixable queries.
/// `risk` is reserved for external scorers; the analyzer itself always
/// reports `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Whether the query is allowed to run as written.
    pub allowed: bool,

    /// Every violation found, in discovery order, deduplicated.
    pub errors: Vec<String>,

    /// The repaired query, if a strictly different safe form exists.
    pub fixed: Option<String>,

    /// Risk score in `[0, 1]`, attached by an external collaborator.
    #[serde(default)]
    pub risk: f64,
}

impl Verdict {
    /// A verdict approving the query as written.
    pub fn approved() -> Self {
        Self {
            allowed: true,
            errors: Vec::new(),
            fixed: None,
            risk: 0.0,
        }
    }

    /// A verdict rejecting the query outright, with no repaired form.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            allowed: false,
            errors: vec![error.into()],
            fixed: None,
            risk: 0.0,
        }
    }

    /// Attach an externally computed risk score, clamped to `[0, 1]`.
    pub fn with_risk(mut self, risk: f64) -> Self {
        self.risk = risk.clamp(0.0, 1.0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_shape() {
        let verdict = Verdict::rejected("Table users is not allowed");
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "allowed": false,
                "errors": ["Table users is not allowed"],
                "fixed": null,
                "risk": 0.0
            })
        );
    }

    #[test]
    fn test_risk_clamped() {
        assert_eq!(Verdict::approved().with_risk(1.5).risk, 1.0);
        assert_eq!(Verdict::approved().with_risk(-0.5).risk, 0.0);
    }
}
