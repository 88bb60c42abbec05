//! Safety validation over a parsed filter.
//!
//! Walks the whole tree and collects every finding instead of stopping at the
//! first one, so a caller can report all problems at once. Validation never
//! fails; an empty result means the tree passed.

use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ast::{Node, Value};
use crate::policy::QueryPolicy;
use crate::translate::is_valid_field_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    InvalidFieldName,
    FieldNotAllowed,
    DisallowedField,
    StringTooLong,
    SqlInjectionDetected,
    TooManyValues,
    TooManyInValues,
    MaxDepthExceeded,
    EmptyQuery,
    QueryTooLong,
    WildcardsNotAllowed,
    NegativeOffset,
    NegativePage,
    InvalidSortDirection,
}

impl ValidationCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationCode::InvalidFieldName => "INVALID_FIELD_NAME",
            ValidationCode::FieldNotAllowed => "FIELD_NOT_ALLOWED",
            ValidationCode::DisallowedField => "DISALLOWED_FIELD",
            ValidationCode::StringTooLong => "STRING_TOO_LONG",
            ValidationCode::SqlInjectionDetected => "SQL_INJECTION_DETECTED",
            ValidationCode::TooManyValues => "TOO_MANY_VALUES",
            ValidationCode::TooManyInValues => "TOO_MANY_IN_VALUES",
            ValidationCode::MaxDepthExceeded => "MAX_DEPTH_EXCEEDED",
            ValidationCode::EmptyQuery => "EMPTY_QUERY",
            ValidationCode::QueryTooLong => "QUERY_TOO_LONG",
            ValidationCode::WildcardsNotAllowed => "WILDCARDS_NOT_ALLOWED",
            ValidationCode::NegativeOffset => "NEGATIVE_OFFSET",
            ValidationCode::NegativePage => "NEGATIVE_PAGE",
            ValidationCode::InvalidSortDirection => "INVALID_SORT_DIRECTION",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation finding. `field` is empty when the finding is not
/// tied to a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub code: ValidationCode,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: ValidationCode) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

static INJECTION_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn injection_patterns() -> &'static [Regex] {
    INJECTION_PATTERNS.get_or_init(|| {
        [
            r"(?i);\s*(drop|delete|insert|update|alter|truncate)\s+",
            r"(?i)union\s+select",
            r"--",
            r"(?s)/\*.*\*/",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("injection pattern is a valid regex"))
        .collect()
    })
}

/// True when `s` matches one of the SQL injection heuristics.
pub fn contains_sql_injection(s: &str) -> bool {
    injection_patterns().iter().any(|re| re.is_match(s))
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    policy: Arc<QueryPolicy>,
}

impl Validator {
    pub fn new(policy: Arc<QueryPolicy>) -> Self {
        Self { policy }
    }

    /// Collect every policy violation in `node`.
    pub fn validate(&self, node: &Node) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        self.validate_node(node, 1, &mut errors);
        errors
    }

    pub fn is_valid(&self, node: &Node) -> bool {
        self.validate(node).is_empty()
    }

    fn validate_node(&self, node: &Node, depth: usize, errors: &mut Vec<ValidationError>) {
        if depth > self.policy.max_depth {
            errors.push(ValidationError::new(
                "",
                "Query exceeds maximum depth",
                ValidationCode::MaxDepthExceeded,
            ));
            return;
        }

        match node {
            Node::Binary { left, right, .. } => {
                self.validate_node(left, depth + 1, errors);
                self.validate_node(right, depth + 1, errors);
            }
            Node::Unary { child, .. } => self.validate_node(child, depth + 1, errors),
            Node::Field { name } => self.validate_field(name, errors),
            Node::Literal(value) => self.validate_value(value, "", errors),
            Node::List(values) => {
                if values.len() > self.policy.max_in_values {
                    errors.push(ValidationError::new(
                        "",
                        format!("List exceeds maximum of {} values", self.policy.max_in_values),
                        ValidationCode::TooManyValues,
                    ));
                }
                for value in values {
                    self.validate_value(value, "", errors);
                }
            }
            Node::Range { field, min, max } => {
                self.validate_node(field, depth + 1, errors);
                self.validate_value(min, "min", errors);
                self.validate_value(max, "max", errors);
            }
            Node::FullText { query, fields, .. } => self.validate_full_text(query, fields, errors),
            Node::In { field, values, .. } => {
                self.validate_node(field, depth + 1, errors);
                if values.len() > self.policy.max_in_values {
                    errors.push(ValidationError::new(
                        "",
                        format!(
                            "IN clause exceeds maximum of {} values",
                            self.policy.max_in_values
                        ),
                        ValidationCode::TooManyInValues,
                    ));
                }
                for value in values {
                    self.validate_value(value, "", errors);
                }
            }
        }
    }

    fn validate_field(&self, name: &str, errors: &mut Vec<ValidationError>) {
        if !is_valid_field_name(name) {
            errors.push(ValidationError::new(
                name,
                "Invalid field name format",
                ValidationCode::InvalidFieldName,
            ));
        } else if self.policy.is_disallowed(name) {
            errors.push(ValidationError::new(
                name,
                "Field is not allowed in queries",
                ValidationCode::DisallowedField,
            ));
        } else if !self.policy.is_allowed(name) {
            errors.push(ValidationError::new(
                name,
                "Field is not in allowed list",
                ValidationCode::FieldNotAllowed,
            ));
        }
    }

    /// Length and injection checks on string values; numbers always pass.
    fn validate_value(&self, value: &Value, field: &str, errors: &mut Vec<ValidationError>) {
        let Value::String(s) = value else {
            return;
        };
        if s.chars().count() > self.policy.max_string_length {
            errors.push(ValidationError::new(
                field,
                format!(
                    "String value exceeds maximum length of {}",
                    self.policy.max_string_length
                ),
                ValidationCode::StringTooLong,
            ));
        }
        if contains_sql_injection(s) {
            tracing::warn!(field, "SQL injection pattern detected in filter value");
            errors.push(ValidationError::new(
                field,
                "Value contains potentially dangerous SQL patterns",
                ValidationCode::SqlInjectionDetected,
            ));
        }
    }

    fn validate_full_text(&self, query: &str, fields: &[String], errors: &mut Vec<ValidationError>) {
        if query.trim().is_empty() {
            errors.push(ValidationError::new(
                "query",
                "Full-text search query cannot be empty",
                ValidationCode::EmptyQuery,
            ));
            return;
        }
        if query.chars().count() > self.policy.max_string_length {
            errors.push(ValidationError::new(
                "query",
                "Full-text search query exceeds maximum length",
                ValidationCode::QueryTooLong,
            ));
        }
        if !self.policy.allow_wildcards && query.contains(['*', '?']) {
            errors.push(ValidationError::new(
                "query",
                "Wildcards are not allowed in full-text search",
                ValidationCode::WildcardsNotAllowed,
            ));
        }
        if contains_sql_injection(query) {
            tracing::warn!("SQL injection pattern detected in full-text query");
            errors.push(ValidationError::new(
                "query",
                "Value contains potentially dangerous SQL patterns",
                ValidationCode::SqlInjectionDetected,
            ));
        }
        for field in fields {
            self.validate_field(field, errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{parse_query, parse_simple_query, BinaryOperator};

    fn codes(errors: &[ValidationError]) -> Vec<ValidationCode> {
        errors.iter().map(|e| e.code).collect()
    }

    fn validator_with(policy: QueryPolicy) -> Validator {
        Validator::new(Arc::new(policy))
    }

    #[test]
    fn test_clean_query_passes() {
        let node = parse_query("status = 'active' AND score > 50").unwrap();
        let validator = Validator::default();
        assert!(validator.validate(&node).is_empty());
        assert!(validator.is_valid(&node));
    }

    #[test]
    fn test_injection_detected() {
        let node = Node::compare("name", BinaryOperator::Eq, "; DROP TABLE users;--");
        let errors = Validator::default().validate(&node);
        assert!(codes(&errors).contains(&ValidationCode::SqlInjectionDetected));
    }

    #[test]
    fn test_injection_patterns() {
        for s in [
            "x; delete from t",
            "1 UNION SELECT password",
            "admin'--",
            "a /* hidden */ b",
            ";TRUNCATE   users",
        ] {
            assert!(contains_sql_injection(s), "{}", s);
        }
        for s in ["active", "drop shipping", "semi; colon", "a - b", "update later"] {
            assert!(!contains_sql_injection(s), "{}", s);
        }
    }

    #[test]
    fn test_injection_in_full_text() {
        let node = parse_simple_query("; DROP TABLE users;--", &[]).unwrap();
        let errors = Validator::default().validate(&node);
        assert_eq!(codes(&errors), vec![ValidationCode::SqlInjectionDetected]);
        assert_eq!(errors[0].field, "query");
    }

    #[test]
    fn test_field_checks() {
        let validator = validator_with(QueryPolicy {
            allowed_fields: ["status".to_string(), "title".to_string()]
                .into_iter()
                .collect(),
            disallowed_fields: ["password".to_string()].into_iter().collect(),
            ..QueryPolicy::default()
        });

        let errors = validator.validate(&Node::field("bad-name"));
        assert_eq!(codes(&errors), vec![ValidationCode::InvalidFieldName]);
        assert_eq!(errors[0].field, "bad-name");

        let errors = validator.validate(&Node::field("password"));
        assert_eq!(codes(&errors), vec![ValidationCode::DisallowedField]);

        let errors = validator.validate(&Node::field("email"));
        assert_eq!(codes(&errors), vec![ValidationCode::FieldNotAllowed]);

        assert!(validator.is_valid(&Node::field("title")));
    }

    #[test]
    fn test_string_too_long() {
        let validator = validator_with(QueryPolicy {
            max_string_length: 5,
            ..QueryPolicy::default()
        });
        let node = Node::compare("a", BinaryOperator::Eq, "toolong");
        let errors = validator.validate(&node);
        assert_eq!(codes(&errors), vec![ValidationCode::StringTooLong]);
        assert_eq!(errors[0].message, "String value exceeds maximum length of 5");

        let node = Node::range("a", "aaaaaaa", "b");
        let errors = validator.validate(&node);
        assert_eq!(codes(&errors), vec![ValidationCode::StringTooLong]);
        assert_eq!(errors[0].field, "min");
    }

    #[test]
    fn test_in_and_list_limits() {
        let validator = validator_with(QueryPolicy {
            max_in_values: 2,
            ..QueryPolicy::default()
        });
        let node = parse_query("id IN (1, 2, 3)").unwrap();
        assert_eq!(
            codes(&validator.validate(&node)),
            vec![ValidationCode::TooManyInValues]
        );

        let node = Node::List(vec![1.into(), 2.into(), 3.into()]);
        assert_eq!(
            codes(&validator.validate(&node)),
            vec![ValidationCode::TooManyValues]
        );
    }

    #[test]
    fn test_full_text_checks() {
        let validator = validator_with(QueryPolicy {
            allow_wildcards: false,
            max_string_length: 10,
            ..QueryPolicy::default()
        });

        let errors = validator.validate(&Node::full_text("", vec![]));
        assert_eq!(codes(&errors), vec![ValidationCode::EmptyQuery]);

        let errors = validator.validate(&Node::full_text("cat*", vec![]));
        assert_eq!(codes(&errors), vec![ValidationCode::WildcardsNotAllowed]);

        let errors = validator.validate(&Node::full_text("a very long query", vec![]));
        assert_eq!(codes(&errors), vec![ValidationCode::QueryTooLong]);

        let errors = validator.validate(&Node::full_text("cats", vec!["1bad".into()]));
        assert_eq!(codes(&errors), vec![ValidationCode::InvalidFieldName]);

        // wildcards allowed by default
        assert!(Validator::default().is_valid(&Node::full_text("cat*", vec![])));
    }

    #[test]
    fn test_depth_boundary() {
        let validator = validator_with(QueryPolicy {
            max_depth: 3,
            ..QueryPolicy::default()
        });
        let ok = Node::not(Node::compare("a", BinaryOperator::Eq, 1));
        assert_eq!(ok.depth(), 3);
        assert!(validator.is_valid(&ok));

        let too_deep = Node::not(ok);
        let errors = validator.validate(&too_deep);
        // both operands of the comparison sit past the limit
        assert_eq!(
            codes(&errors),
            vec![ValidationCode::MaxDepthExceeded, ValidationCode::MaxDepthExceeded]
        );
    }

    #[test]
    fn test_collects_multiple_errors() {
        let node = Node::and(
            Node::compare("1x", BinaryOperator::Eq, "ok"),
            Node::compare("name", BinaryOperator::Eq, "x UNION SELECT 1"),
        );
        let errors = Validator::default().validate(&node);
        assert_eq!(
            codes(&errors),
            vec![
                ValidationCode::InvalidFieldName,
                ValidationCode::SqlInjectionDetected
            ]
        );
    }

    #[test]
    fn test_validation_error_display_and_serde() {
        let err = ValidationError::new("status", "Field is not in allowed list", ValidationCode::FieldNotAllowed);
        assert_eq!(err.to_string(), "status: Field is not in allowed list");

        let err = ValidationError::new("", "Query exceeds maximum depth", ValidationCode::MaxDepthExceeded);
        assert_eq!(err.to_string(), "Query exceeds maximum depth");

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "MAX_DEPTH_EXCEEDED");
        assert_eq!(ValidationCode::SqlInjectionDetected.as_str(), "SQL_INJECTION_DETECTED");
    }
}
