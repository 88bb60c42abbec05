//! Field name checks shared by both backends and the validator.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::TranslateError;
use crate::options::QueryOptions;
use crate::policy::QueryPolicy;

static FIELD_NAME_REGEX: OnceLock<Regex> = OnceLock::new();

fn field_name_regex() -> &'static Regex {
    FIELD_NAME_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
            .expect("field name pattern is a valid regex")
    })
}

/// `name` or `table.name`, ASCII word characters only.
pub fn is_valid_field_name(name: &str) -> bool {
    field_name_regex().is_match(name)
}

/// Check a public field name and map it to its storage name.
///
/// Order: format, deny-list, allow-list, then mapping. The mapped name is
/// trusted and may carry a suffix such as `title.keyword`.
pub fn resolve_field(
    name: &str,
    options: &QueryOptions,
    policy: &QueryPolicy,
) -> Result<String, TranslateError> {
    if !is_valid_field_name(name) {
        return Err(TranslateError::InvalidField(name.to_string()));
    }
    if policy.is_disallowed(name) {
        return Err(TranslateError::FieldNotAllowed(name.to_string()));
    }
    if !options.allowed_fields.is_empty() && !options.allowed_fields.contains(name) {
        return Err(TranslateError::FieldNotAllowed(name.to_string()));
    }
    Ok(options
        .field_mapping
        .get(name)
        .cloned()
        .unwrap_or_else(|| name.to_string()))
}
