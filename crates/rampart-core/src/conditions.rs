//! Condition evaluation for branch tasks.
//!
//! Branch predicates are side-effect-free reads over the field store.
//! Evaluation is deterministic: the same store state always selects the same
//! branch.

use crate::fields::FieldStore;
use serde::{Deserialize, Serialize};

/// A condition evaluated against the field store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Condition {
    /// Compare a field value against an expected value.
    Field {
        field: String,
        op: CompareOp,
        value: serde_json::Value,
    },
    /// The field has been written.
    IsSet(String),
    /// The field has not been written.
    NotSet(String),
    /// All sub-conditions must be true.
    And(Vec<Condition>),
    /// At least one sub-condition must be true.
    Or(Vec<Condition>),
    /// Negate a condition.
    Not(Box<Condition>),
}

impl Condition {
    /// Shorthand for a field equality check.
    pub fn field_eq(field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Condition::Field {
            field: field.into(),
            op: CompareOp::Eq,
            value: value.into(),
        }
    }
}

/// Comparison operators for field conditions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// String/array contains value.
    Contains,
    StartsWith,
    EndsWith,
    /// String matches regex pattern.
    Matches,
    /// Value is in a set.
    In,
    /// Value is not in a set.
    NotIn,
}

/// Evaluates conditions against a field store.
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Evaluates a condition. Unset or unknown fields compare as false.
    pub fn evaluate(condition: &Condition, fields: &FieldStore) -> bool {
        match condition {
            Condition::Field { field, op, value } => {
                match fields.get(field).ok().flatten() {
                    Some(actual) => Self::compare(&actual.to_json(), op, value),
                    None => false,
                }
            }
            Condition::IsSet(field) => fields.get(field).ok().flatten().is_some(),
            Condition::NotSet(field) => fields.get(field).ok().flatten().is_none(),
            Condition::And(conditions) => {
                conditions.iter().all(|c| Self::evaluate(c, fields))
            }
            Condition::Or(conditions) => conditions.iter().any(|c| Self::evaluate(c, fields)),
            Condition::Not(condition) => !Self::evaluate(condition, fields),
        }
    }

    fn compare(actual: &serde_json::Value, op: &CompareOp, expected: &serde_json::Value) -> bool {
        match op {
            CompareOp::Eq => actual == expected,
            CompareOp::Ne => actual != expected,
            CompareOp::Gt => compare_numeric(actual, expected, |a, b| a > b),
            CompareOp::Gte => compare_numeric(actual, expected, |a, b| a >= b),
            CompareOp::Lt => compare_numeric(actual, expected, |a, b| a < b),
            CompareOp::Lte => compare_numeric(actual, expected, |a, b| a <= b),
            CompareOp::Contains => match (actual, expected) {
                (serde_json::Value::String(haystack), serde_json::Value::String(needle)) => {
                    haystack.contains(needle.as_str())
                }
                (serde_json::Value::Array(arr), _) => arr.contains(expected),
                _ => false,
            },
            CompareOp::StartsWith => match (actual, expected) {
                (serde_json::Value::String(s), serde_json::Value::String(prefix)) => {
                    s.starts_with(prefix.as_str())
                }
                _ => false,
            },
            CompareOp::EndsWith => match (actual, expected) {
                (serde_json::Value::String(s), serde_json::Value::String(suffix)) => {
                    s.ends_with(suffix.as_str())
                }
                _ => false,
            },
            CompareOp::Matches => match (actual, expected) {
                (serde_json::Value::String(s), serde_json::Value::String(pattern)) => {
                    regex::Regex::new(pattern)
                        .map(|re| re.is_match(s))
                        .unwrap_or(false)
                }
                _ => false,
            },
            CompareOp::In => match expected {
                serde_json::Value::Array(arr) => arr.contains(actual),
                _ => false,
            },
            CompareOp::NotIn => match expected {
                serde_json::Value::Array(arr) => !arr.contains(actual),
                _ => true,
            },
        }
    }
}

/// Helper to compare two JSON values numerically, with a lexicographic
/// fallback for string pairs.
fn compare_numeric(
    a: &serde_json::Value,
    b: &serde_json::Value,
    cmp: fn(f64, f64) -> bool,
) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(a_num), Some(b_num)) => cmp(a_num, b_num),
        _ => match (a.as_str(), b.as_str()) {
            (Some(a_str), Some(b_str)) => {
                let ord = a_str.cmp(b_str);
                cmp(ord as i8 as f64, 0.0)
            }
            _ => false,
        },
    }
}

fn as_f64(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse::<f64>().ok(),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::schema::names;
    use crate::fields::{ransomware_schema, FieldValue};
    use serde_json::json;

    fn store() -> FieldStore {
        FieldStore::new(ransomware_schema())
    }

    #[test]
    fn test_field_eq_on_enumeration() {
        let store = store();
        store
            .set(
                names::ENCRYPTION_STATUS,
                FieldValue::enumeration("Confirmed"),
                "t",
            )
            .unwrap();

        let cond = Condition::field_eq(names::ENCRYPTION_STATUS, "Confirmed");
        assert!(ConditionEvaluator::evaluate(&cond, &store));

        let cond = Condition::field_eq(names::ENCRYPTION_STATUS, "Recovered");
        assert!(!ConditionEvaluator::evaluate(&cond, &store));
    }

    #[test]
    fn test_missing_field_is_false() {
        let store = store();
        let cond = Condition::field_eq(names::STRAIN, "LockFile");
        assert!(!ConditionEvaluator::evaluate(&cond, &store));
    }

    #[test]
    fn test_is_set_and_not_set() {
        let store = store();
        assert!(ConditionEvaluator::evaluate(
            &Condition::NotSet(names::STRAIN.into()),
            &store
        ));

        store
            .set(names::STRAIN, FieldValue::scalar("LockFile"), "t")
            .unwrap();
        assert!(ConditionEvaluator::evaluate(
            &Condition::IsSet(names::STRAIN.into()),
            &store
        ));
    }

    #[test]
    fn test_numeric_comparison_on_scalar_string() {
        let store = store();
        store
            .set(names::ENCRYPTED_ENDPOINTS, FieldValue::scalar("45"), "t")
            .unwrap();

        assert!(ConditionEvaluator::evaluate(
            &Condition::Field {
                field: names::ENCRYPTED_ENDPOINTS.into(),
                op: CompareOp::Gt,
                value: json!(10),
            },
            &store
        ));
        assert!(!ConditionEvaluator::evaluate(
            &Condition::Field {
                field: names::ENCRYPTED_ENDPOINTS.into(),
                op: CompareOp::Gt,
                value: json!(45),
            },
            &store
        ));
    }

    #[test]
    fn test_contains_on_string_list() {
        let store = store();
        store
            .append_string(names::CRYPTO_ADDRESS_TYPE, "bitcoin", "t")
            .unwrap();

        assert!(ConditionEvaluator::evaluate(
            &Condition::Field {
                field: names::CRYPTO_ADDRESS_TYPE.into(),
                op: CompareOp::Contains,
                value: json!("bitcoin"),
            },
            &store
        ));
        assert!(!ConditionEvaluator::evaluate(
            &Condition::Field {
                field: names::CRYPTO_ADDRESS_TYPE.into(),
                op: CompareOp::Contains,
                value: json!("monero"),
            },
            &store
        ));
    }

    #[test]
    fn test_composite_conditions() {
        let store = store();
        store
            .set(
                names::ENCRYPTION_STATUS,
                FieldValue::enumeration("Confirmed"),
                "t",
            )
            .unwrap();
        store
            .set(names::ENCRYPTED_ENDPOINTS, FieldValue::scalar("45"), "t")
            .unwrap();

        let cond = Condition::And(vec![
            Condition::field_eq(names::ENCRYPTION_STATUS, "Confirmed"),
            Condition::Field {
                field: names::ENCRYPTED_ENDPOINTS.into(),
                op: CompareOp::Gte,
                value: json!(10),
            },
        ]);
        assert!(ConditionEvaluator::evaluate(&cond, &store));

        let cond = Condition::Not(Box::new(cond));
        assert!(!ConditionEvaluator::evaluate(&cond, &store));
    }

    #[test]
    fn test_or_condition() {
        let store = store();
        store
            .set(names::STRAIN, FieldValue::scalar("LockFile"), "t")
            .unwrap();

        let cond = Condition::Or(vec![
            Condition::field_eq(names::STRAIN, "Conti"),
            Condition::field_eq(names::STRAIN, "LockFile"),
        ]);
        assert!(ConditionEvaluator::evaluate(&cond, &store));
    }

    #[test]
    fn test_deterministic_under_same_snapshot() {
        let store = store();
        store
            .set(
                names::ENCRYPTION_STATUS,
                FieldValue::enumeration("Decrypting"),
                "t",
            )
            .unwrap();

        let cond = Condition::Field {
            field: names::ENCRYPTION_STATUS.into(),
            op: CompareOp::In,
            value: json!(["Confirmed", "Decrypting"]),
        };
        for _ in 0..10 {
            assert!(ConditionEvaluator::evaluate(&cond, &store));
        }
    }

    #[test]
    fn test_matches_invalid_regex_is_false() {
        let store = store();
        store
            .set(names::STRAIN, FieldValue::scalar("LockFile"), "t")
            .unwrap();

        assert!(!ConditionEvaluator::evaluate(
            &Condition::Field {
                field: names::STRAIN.into(),
                op: CompareOp::Matches,
                value: json!("[unclosed"),
            },
            &store
        ));
    }

    #[test]
    fn test_condition_serialization_roundtrip() {
        let cond = Condition::And(vec![
            Condition::field_eq(names::ENCRYPTION_STATUS, "Confirmed"),
            Condition::Not(Box::new(Condition::NotSet(names::HOSTS.into()))),
        ]);

        let json = serde_json::to_string(&cond).unwrap();
        let back: Condition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cond);
    }
}
