//! Shared safety policy and pagination limits.
//!
//! One [`QueryPolicy`] is built at startup (defaults, or a TOML file under the
//! user config directory) and shared through an `Arc` by the validator, the
//! translators and [`SafeQueryLimits`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::options::{QueryOptions, SortDirection};
use crate::validator::{ValidationCode, ValidationError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryPolicy {
    /// Maximum tree depth; the root counts as 1.
    pub max_depth: usize,
    pub max_in_values: usize,
    pub max_string_length: usize,
    pub max_limit: i64,
    pub default_limit: i64,
    pub max_offset: i64,
    /// Allow `*` and `?` in free-text queries.
    pub allow_wildcards: bool,
    /// Empty means every well-formed field is allowed.
    pub allowed_fields: BTreeSet<String>,
    /// Always rejected, even when listed in `allowed_fields`.
    pub disallowed_fields: BTreeSet<String>,
    pub timeout_secs: u64,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_in_values: 1000,
            max_string_length: 1000,
            max_limit: 100,
            default_limit: 20,
            max_offset: 10_000,
            allow_wildcards: true,
            allowed_fields: BTreeSet::new(),
            disallowed_fields: BTreeSet::new(),
            timeout_secs: 30,
        }
    }
}

impl QueryPolicy {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("filterql")
            .join("policy.toml")
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let policy: QueryPolicy =
            toml::from_str(content).context("Failed to parse query policy")?;
        policy.check()?;
        Ok(policy)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read policy file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid policy file {}", path.display()))
    }

    /// Load from the user config directory, or defaults when no file exists.
    pub fn load_or_default() -> Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no policy file, using defaults");
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write policy file {}", path.display()))?;
        Ok(())
    }

    /// Reject policies whose limits contradict each other.
    pub fn check(&self) -> Result<()> {
        if self.max_depth == 0 {
            bail!("max_depth must be at least 1");
        }
        if self.max_limit < 1 {
            bail!("max_limit must be at least 1");
        }
        if self.default_limit > self.max_limit {
            bail!(
                "default_limit ({}) exceeds max_limit ({})",
                self.default_limit,
                self.max_limit
            );
        }
        if let Some(field) = self.allowed_fields.intersection(&self.disallowed_fields).next() {
            bail!("field '{}' is both allowed and disallowed", field);
        }
        Ok(())
    }

    pub fn is_disallowed(&self, field: &str) -> bool {
        self.disallowed_fields.contains(field)
    }

    pub fn is_allowed(&self, field: &str) -> bool {
        self.allowed_fields.is_empty() || self.allowed_fields.contains(field)
    }
}

/// Pagination limits for the request layer.
#[derive(Debug, Clone, Default)]
pub struct SafeQueryLimits {
    policy: Arc<QueryPolicy>,
}

impl SafeQueryLimits {
    pub fn new(policy: Arc<QueryPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &QueryPolicy {
        &self.policy
    }

    /// Clamp `limit` into `[1, max_limit]` and `offset` into `[0, max_offset]`,
    /// and stamp the policy limits onto `opts`.
    pub fn apply_limits(&self, opts: &mut QueryOptions) {
        opts.max_limit = self.policy.max_limit;
        opts.default_limit = self.policy.default_limit;
        opts.apply_safe_limit();
        opts.offset = opts.offset.clamp(0, self.policy.max_offset.max(0));
    }

    /// Report problems with `opts` without changing them.
    pub fn validate_query_options(&self, opts: &QueryOptions) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if opts.offset < 0 {
            errors.push(ValidationError::new(
                "offset",
                "Offset cannot be negative",
                ValidationCode::NegativeOffset,
            ));
        }
        if opts.page < 0 {
            errors.push(ValidationError::new(
                "page",
                "Page cannot be negative",
                ValidationCode::NegativePage,
            ));
        }
        if !opts.order_dir.is_empty() && SortDirection::parse(&opts.order_dir).is_none() {
            errors.push(ValidationError::new(
                "order_dir",
                "Sort direction must be ASC or DESC",
                ValidationCode::InvalidSortDirection,
            ));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = QueryPolicy::default();
        assert_eq!(policy.max_depth, 10);
        assert_eq!(policy.max_in_values, 1000);
        assert_eq!(policy.max_offset, 10_000);
        assert!(policy.allow_wildcards);
        assert!(policy.check().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let policy = QueryPolicy::from_toml_str(
            r#"
            max_depth = 4
            allowed_fields = ["status", "title"]
            "#,
        )
        .unwrap();
        assert_eq!(policy.max_depth, 4);
        assert_eq!(policy.max_limit, 100);
        assert!(policy.is_allowed("title"));
        assert!(!policy.is_allowed("password"));
    }

    #[test]
    fn test_from_toml_rejects_incoherent_policy() {
        assert!(QueryPolicy::from_toml_str("max_depth = 0").is_err());
        assert!(QueryPolicy::from_toml_str("max_limit = 10\ndefault_limit = 20").is_err());
        assert!(QueryPolicy::from_toml_str("max_limit = 0\ndefault_limit = 0").is_err());
        assert!(QueryPolicy::from_toml_str(
            "allowed_fields = [\"a\"]\ndisallowed_fields = [\"a\"]"
        )
        .is_err());
        assert!(QueryPolicy::from_toml_str("max_depth = \"deep\"").is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("policy.toml");

        let policy = QueryPolicy {
            max_in_values: 50,
            allow_wildcards: false,
            disallowed_fields: ["password_hash".to_string()].into_iter().collect(),
            ..QueryPolicy::default()
        };
        policy.save(&path).unwrap();

        let loaded = QueryPolicy::load(&path).unwrap();
        assert_eq!(loaded, policy);
        assert!(loaded.is_disallowed("password_hash"));
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = QueryPolicy::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read policy file"));
    }

    #[test]
    fn test_config_path_location() {
        let path = QueryPolicy::config_path();
        assert!(path.ends_with("filterql/policy.toml"));
    }

    #[test]
    fn test_apply_limits() {
        let limits = SafeQueryLimits::default();
        let mut opts = QueryOptions {
            limit: 1000,
            offset: 50_000,
            max_limit: 5000,
            ..QueryOptions::default()
        };
        limits.apply_limits(&mut opts);
        assert_eq!(opts.limit, 100);
        assert_eq!(opts.offset, 10_000);
        assert_eq!(opts.max_limit, 100);

        opts.limit = 0;
        opts.offset = -3;
        limits.apply_limits(&mut opts);
        assert_eq!(opts.limit, 20);
        assert_eq!(opts.offset, 0);
    }

    #[test]
    fn test_apply_limits_custom_policy() {
        let limits = SafeQueryLimits::new(Arc::new(QueryPolicy {
            max_limit: 10,
            default_limit: 5,
            max_offset: 100,
            ..QueryPolicy::default()
        }));
        let mut opts = QueryOptions {
            limit: -1,
            offset: 500,
            ..QueryOptions::default()
        };
        limits.apply_limits(&mut opts);
        assert_eq!(opts.limit, 5);
        assert_eq!(opts.offset, 100);
        assert_eq!(opts.default_limit, 5);
    }

    #[test]
    fn test_validate_query_options() {
        let limits = SafeQueryLimits::default();
        assert!(limits
            .validate_query_options(&QueryOptions::default())
            .is_empty());

        let opts = QueryOptions {
            offset: -1,
            page: -2,
            order_dir: "sideways".into(),
            ..QueryOptions::default()
        };
        let errors = limits.validate_query_options(&opts);
        let codes: Vec<ValidationCode> = errors.iter().map(|e| e.code).collect();
        assert_eq!(
            codes,
            vec![
                ValidationCode::NegativeOffset,
                ValidationCode::NegativePage,
                ValidationCode::InvalidSortDirection
            ]
        );
        assert_eq!(errors[0].field, "offset");
        // validation never mutates
        assert_eq!(opts.offset, -1);
    }

    #[test]
    fn test_validate_accepts_empty_sort_direction() {
        let limits = SafeQueryLimits::default();
        let opts = QueryOptions {
            order_dir: String::new(),
            ..QueryOptions::default()
        };
        assert!(limits.validate_query_options(&opts).is_empty());
    }

    #[test]
    fn test_validate_sort_direction_ignores_case() {
        let limits = SafeQueryLimits::default();
        for dir in ["ASC", "DESC", "asc", "desc", "Asc"] {
            let opts = QueryOptions {
                order_dir: dir.to_string(),
                ..QueryOptions::default()
            };
            assert!(limits.validate_query_options(&opts).is_empty(), "{}", dir);
        }

        let opts = QueryOptions {
            order_dir: "ascending".to_string(),
            ..QueryOptions::default()
        };
        let errors = limits.validate_query_options(&opts);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, ValidationCode::InvalidSortDirection);
    }
}
