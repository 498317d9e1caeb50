//! Label conditions used to pick among candidate parents
//!
//! A condition is a rule `label operator value -> parent id`. Operators come
//! from a fixed whitelist; names outside it are rejected when the condition is
//! built, so evaluating a condition can never fail.

use crate::error::ResolutionError;
use crate::events::Labels;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a condition
///
/// Both operands are compared as strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Contains,
    StartsWith,
    EndsWith,
}

impl Operator {
    /// All supported operators
    pub const ALL: [Operator; 9] = [
        Operator::Equal,
        Operator::NotEqual,
        Operator::LessThan,
        Operator::LessOrEqual,
        Operator::GreaterThan,
        Operator::GreaterOrEqual,
        Operator::Contains,
        Operator::StartsWith,
        Operator::EndsWith,
    ];

    /// Canonical name used in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::LessThan => "<",
            Operator::LessOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::Contains => "contains",
            Operator::StartsWith => "starts_with",
            Operator::EndsWith => "ends_with",
        }
    }

    /// Apply the operator as `actual <op> expected`
    pub fn compare(&self, actual: &str, expected: &str) -> bool {
        match self {
            Operator::Equal => actual == expected,
            Operator::NotEqual => actual != expected,
            Operator::LessThan => actual < expected,
            Operator::LessOrEqual => actual <= expected,
            Operator::GreaterThan => actual > expected,
            Operator::GreaterOrEqual => actual >= expected,
            Operator::Contains => actual.contains(expected),
            Operator::StartsWith => actual.starts_with(expected),
            Operator::EndsWith => actual.ends_with(expected),
        }
    }
}

impl FromStr for Operator {
    type Err = ResolutionError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let operator = match name.trim() {
            "==" => Operator::Equal,
            "!=" => Operator::NotEqual,
            "<" => Operator::LessThan,
            "<=" => Operator::LessOrEqual,
            ">" => Operator::GreaterThan,
            ">=" => Operator::GreaterOrEqual,
            "contains" | "include?" => Operator::Contains,
            "starts_with" | "start_with?" => Operator::StartsWith,
            "ends_with" | "end_with?" => Operator::EndsWith,
            other => return Err(ResolutionError::UnsupportedOperator(other.to_string())),
        };
        Ok(operator)
    }
}

impl TryFrom<String> for Operator {
    type Error = ResolutionError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        name.parse()
    }
}

impl From<Operator> for String {
    fn from(operator: Operator) -> Self {
        operator.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single `label operator value -> parent` rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Condition {
    /// Label looked up on the instance
    pub key: String,
    /// Comparison applied to the label value
    pub operator: Operator,
    /// Value the label is compared against
    pub value: String,
    /// Parent selected when the condition holds
    pub parent_id: String,
}

impl Condition {
    /// Build a condition from an operator name
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError::UnsupportedOperator` if `operator` is not in
    /// the supported set.
    pub fn parse(
        key: impl Into<String>,
        operator: &str,
        value: impl Into<String>,
        parent_id: impl Into<String>,
    ) -> Result<Self, ResolutionError> {
        Ok(Self {
            key: key.into(),
            operator: operator.parse()?,
            value: value.into(),
            parent_id: parent_id.into(),
        })
    }

    /// Evaluate the condition against an instance's labels
    ///
    /// A missing label compares as the empty string.
    pub fn evaluate(&self, labels: &Labels) -> bool {
        let actual = labels.get(&self.key).map(String::as_str).unwrap_or("");
        self.operator.compare(actual, &self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label_set(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_operator_names_round_trip() {
        for operator in Operator::ALL {
            assert_eq!(operator.as_str().parse::<Operator>().unwrap(), operator);
        }
    }

    #[test]
    fn test_operator_aliases() {
        assert_eq!("include?".parse::<Operator>().unwrap(), Operator::Contains);
        assert_eq!(
            "start_with?".parse::<Operator>().unwrap(),
            Operator::StartsWith
        );
        assert_eq!("end_with?".parse::<Operator>().unwrap(), Operator::EndsWith);
    }

    #[test]
    fn test_unsupported_operator_rejected() {
        let result = "=~".parse::<Operator>();
        assert_eq!(
            result,
            Err(ResolutionError::UnsupportedOperator("=~".to_string()))
        );

        let result = Condition::parse("namespace", "send", "ns1", "node-agg");
        assert!(matches!(
            result,
            Err(ResolutionError::UnsupportedOperator(name)) if name == "send"
        ));
    }

    #[test]
    fn test_equality_operators() {
        let labels = label_set(&[("namespace", "kube-system")]);

        let eq = Condition::parse("namespace", "==", "kube-system", "p").unwrap();
        let ne = Condition::parse("namespace", "!=", "kube-system", "p").unwrap();

        assert!(eq.evaluate(&labels));
        assert!(!ne.evaluate(&labels));
    }

    #[test]
    fn test_substring_operators() {
        let labels = label_set(&[("node", "aks-nodepool1-1234")]);

        assert!(Condition::parse("node", "contains", "nodepool1", "p")
            .unwrap()
            .evaluate(&labels));
        assert!(Condition::parse("node", "starts_with", "aks-", "p")
            .unwrap()
            .evaluate(&labels));
        assert!(Condition::parse("node", "ends_with", "1234", "p")
            .unwrap()
            .evaluate(&labels));
        assert!(!Condition::parse("node", "ends_with", "aks", "p")
            .unwrap()
            .evaluate(&labels));
    }

    #[test]
    fn test_ordering_operators_are_lexicographic() {
        let labels = label_set(&[("tier", "b")]);

        assert!(Condition::parse("tier", "<", "c", "p")
            .unwrap()
            .evaluate(&labels));
        assert!(Condition::parse("tier", "<=", "b", "p")
            .unwrap()
            .evaluate(&labels));
        assert!(Condition::parse("tier", ">", "a", "p")
            .unwrap()
            .evaluate(&labels));
        assert!(!Condition::parse("tier", ">=", "c", "p")
            .unwrap()
            .evaluate(&labels));

        // "10" sorts before "9" as a string
        let labels = label_set(&[("count", "10")]);
        assert!(Condition::parse("count", "<", "9", "p")
            .unwrap()
            .evaluate(&labels));
    }

    #[test]
    fn test_missing_label_is_empty_string() {
        let labels = Labels::new();

        assert!(Condition::parse("role", "==", "", "p")
            .unwrap()
            .evaluate(&labels));
        assert!(Condition::parse("role", "!=", "master", "p")
            .unwrap()
            .evaluate(&labels));
        assert!(!Condition::parse("role", "==", "master", "p")
            .unwrap()
            .evaluate(&labels));
    }

    #[test]
    fn test_condition_deserialization_validates_operator() {
        let ok: Condition = serde_json::from_str(
            r#"{"key": "namespace", "operator": "==", "value": "ns1", "parent_id": "node-agg"}"#,
        )
        .unwrap();
        assert_eq!(ok.operator, Operator::Equal);

        let bad: Result<Condition, _> = serde_json::from_str(
            r#"{"key": "namespace", "operator": "matches", "value": "ns1", "parent_id": "node-agg"}"#,
        );
        assert!(bad.is_err());
    }
}
