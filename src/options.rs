//! Per-request options and translation output.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ast::Value;
use crate::error::TranslateError;
use crate::policy::QueryPolicy;

pub const DEFAULT_LIMIT: i64 = 20;
pub const DEFAULT_MAX_LIMIT: i64 = 100;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Sort direction for generated `ORDER BY` and search `sort` clauses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    /// Case-insensitive parse of `ASC` / `DESC`.
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("asc") {
            Some(SortDirection::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Some(SortDirection::Desc)
        } else {
            None
        }
    }

    /// Like [`SortDirection::parse`], falling back to `Desc`.
    pub fn parse_or_default(s: &str) -> Self {
        Self::parse(s).unwrap_or_default()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Spelling used by the search query DSL.
    pub fn as_search_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options controlling a single translation: pagination, sort, safety limits
/// and field handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    pub limit: i64,
    pub offset: i64,
    /// 1-based page number. When positive it overrides `offset`.
    pub page: i64,
    pub order_by: Option<String>,
    /// `ASC` or `DESC`; anything else sorts descending.
    pub order_dir: String,
    pub max_limit: i64,
    pub default_limit: i64,
    /// Public field name → storage field name.
    pub field_mapping: HashMap<String, String>,
    /// Empty means every well-formed field is allowed.
    pub allowed_fields: HashSet<String>,
    /// Passed through to the executing driver.
    pub timeout: Duration,
    pub request_id: Option<String>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            page: 1,
            order_by: None,
            order_dir: SortDirection::Desc.as_str().to_string(),
            max_limit: DEFAULT_MAX_LIMIT,
            default_limit: DEFAULT_LIMIT,
            field_mapping: HashMap::new(),
            allowed_fields: HashSet::new(),
            timeout: DEFAULT_TIMEOUT,
            request_id: None,
        }
    }
}

impl QueryOptions {
    /// Options seeded from a policy's limits and allow-list.
    pub fn from_policy(policy: &QueryPolicy) -> Self {
        Self {
            limit: policy.default_limit,
            max_limit: policy.max_limit,
            default_limit: policy.default_limit,
            allowed_fields: policy.allowed_fields.iter().cloned().collect(),
            timeout: Duration::from_secs(policy.timeout_secs),
            ..Self::default()
        }
    }

    pub fn with_field_mapping(mut self, from: &str, to: &str) -> Self {
        self.field_mapping.insert(from.to_string(), to.to_string());
        self
    }

    pub fn with_allowed_fields(mut self, fields: &[&str]) -> Self {
        self.allowed_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_order(mut self, field: &str, dir: SortDirection) -> Self {
        self.order_by = Some(field.to_string());
        self.order_dir = dir.as_str().to_string();
        self
    }

    pub fn sort_direction(&self) -> SortDirection {
        SortDirection::parse_or_default(&self.order_dir)
    }

    /// Clamp `limit` into `[1, max_limit]`. Non-positive limits take
    /// `default_limit` first.
    pub fn apply_safe_limit(&mut self) {
        let max = self.max_limit.max(1);
        if self.limit <= 0 {
            self.limit = self.default_limit;
        }
        self.limit = self.limit.clamp(1, max);
    }

    /// Derive `offset` from `page` when a page is given.
    pub fn calculate_offset(&mut self) {
        if self.page > 0 {
            self.offset = (self.page - 1).saturating_mul(self.limit);
        }
    }
}

/// Output of a translation. SQL callers read `sql` and `args`; search callers
/// read `es_query`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub sql: String,
    /// `args[i]` binds placeholder `$(i + 1)`.
    pub args: Vec<Value>,
    pub es_query: Option<serde_json::Value>,
    pub limit: i64,
    pub offset: i64,
    pub fields: Vec<String>,
    pub errors: Vec<TranslateError>,
}

impl QueryResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn add_error(&mut self, err: TranslateError) {
        self.errors.push(err);
    }
}
