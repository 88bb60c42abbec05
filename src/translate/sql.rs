/// Filter AST → parameterized PostgreSQL.
///
/// Literals never reach the SQL text: each one is pushed onto the argument
/// list and replaced by the next `$N` placeholder, in left-to-right,
/// depth-first order. Identifiers are checked against the field name pattern
/// and the allow-list before they are emitted.
use std::sync::Arc;

use crate::ast::{parse_query, BinaryOperator, Node, UnaryOperator, Value};
use crate::error::{QueryError, TranslateError};
use crate::options::{QueryOptions, QueryResult};
use crate::policy::QueryPolicy;

use super::fields::{is_valid_field_name, resolve_field};

/// Column holding the precomputed `tsvector` for global full-text search.
pub const SEARCH_VECTOR_COLUMN: &str = "search_vector";
/// Text search configuration passed to `to_tsvector` / `to_tsquery`.
pub const TEXT_SEARCH_CONFIG: &str = "english";

/// Characters with meaning inside a tsquery; stripped from user words.
const TSQUERY_OPERATORS: &[char] = &['&', '|', '!', '(', ')', ':', '*', '\'', '\\', '<'];

#[derive(Debug, Clone)]
pub struct SqlTranslator {
    options: QueryOptions,
    policy: Arc<QueryPolicy>,
    table_alias: Option<String>,
}

impl SqlTranslator {
    pub fn new(options: QueryOptions) -> Self {
        Self::with_policy(Arc::new(QueryPolicy::default()), options)
    }

    pub fn with_policy(policy: Arc<QueryPolicy>, options: QueryOptions) -> Self {
        Self {
            options,
            policy,
            table_alias: None,
        }
    }

    /// Prefix every emitted field with `alias.`.
    pub fn with_table_alias(mut self, alias: &str) -> Self {
        self.set_table_alias(alias);
        self
    }

    pub fn set_table_alias(&mut self, alias: &str) {
        self.table_alias = if alias.is_empty() {
            None
        } else {
            Some(alias.to_string())
        };
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn policy(&self) -> &QueryPolicy {
        &self.policy
    }

    /// Lower `node` to a `WHERE` fragment. Placeholders start at `$1`.
    pub fn translate(&self, node: &Node) -> Result<QueryResult, TranslateError> {
        self.translate_with_offset(node, 0)
    }

    /// Lower `node` with placeholders numbered from `start + 1`, for embedding
    /// in a statement that already binds `start` arguments.
    pub fn translate_with_offset(
        &self,
        node: &Node,
        start: usize,
    ) -> Result<QueryResult, TranslateError> {
        let mut builder = SqlBuilder::new(self, start);
        let sql = builder.lower(node, 1).map_err(|err| {
            tracing::warn!(kind = node.kind(), error = %err, "SQL translation failed");
            err
        })?;

        let (limit, offset) = self.pagination();
        tracing::debug!(
            kind = node.kind(),
            args = builder.args.len(),
            limit,
            offset,
            "translated filter to SQL"
        );

        Ok(QueryResult {
            sql,
            args: builder.args,
            limit,
            offset,
            fields: builder.fields,
            ..QueryResult::default()
        })
    }

    /// Like [`SqlTranslator::translate`], but failures are recorded in the
    /// result's `errors` instead of being returned.
    pub fn try_translate(&self, node: &Node) -> QueryResult {
        match self.translate(node) {
            Ok(result) => result,
            Err(err) => {
                let (limit, offset) = self.pagination();
                let mut result = QueryResult {
                    limit,
                    offset,
                    ..QueryResult::default()
                };
                result.add_error(err);
                result
            }
        }
    }

    /// Parse `input` and lower it.
    pub fn translate_str(&self, input: &str) -> Result<QueryResult, QueryError> {
        let node = parse_query(input)?;
        Ok(self.translate(&node)?)
    }

    /// `SELECT cols FROM table [WHERE ..] [ORDER BY ..] LIMIT $n OFFSET $n+1`.
    ///
    /// `order_by` falls back to the options' sort field. An unrecognized sort
    /// direction sorts descending.
    pub fn build_select_query(
        &self,
        table: &str,
        columns: &[&str],
        where_node: Option<&Node>,
        order_by: Option<&str>,
    ) -> Result<QueryResult, TranslateError> {
        check_table(table)?;
        for column in columns {
            check_identifier(column)?;
        }

        let mut builder = SqlBuilder::new(self, 0);
        let mut sql = if columns.is_empty() {
            format!("SELECT * FROM {}", table)
        } else {
            format!("SELECT {} FROM {}", columns.join(", "), table)
        };

        if let Some(node) = where_node {
            let clause = builder.lower(node, 1)?;
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }

        if let Some(order) = order_by.or(self.options.order_by.as_deref()) {
            check_identifier(order)?;
            sql.push_str(&format!(
                " ORDER BY {} {}",
                order,
                self.options.sort_direction()
            ));
        }

        let (limit, offset) = self.pagination();
        let limit_placeholder = builder.bind(Value::Integer(limit));
        let offset_placeholder = builder.bind(Value::Integer(offset));
        sql.push_str(&format!(
            " LIMIT {} OFFSET {}",
            limit_placeholder, offset_placeholder
        ));

        tracing::debug!(table, args = builder.args.len(), limit, offset, "built select query");

        Ok(QueryResult {
            sql,
            args: builder.args,
            limit,
            offset,
            fields: columns.iter().map(|c| c.to_string()).collect(),
            ..QueryResult::default()
        })
    }

    /// `SELECT COUNT(*) FROM table [WHERE ..]`, numbered from `$1`.
    pub fn build_count_query(
        &self,
        table: &str,
        where_node: Option<&Node>,
    ) -> Result<QueryResult, TranslateError> {
        check_table(table)?;

        let mut builder = SqlBuilder::new(self, 0);
        let sql = match where_node {
            Some(node) => format!("SELECT COUNT(*) FROM {} WHERE {}", table, builder.lower(node, 1)?),
            None => format!("SELECT COUNT(*) FROM {}", table),
        };

        Ok(QueryResult {
            sql,
            args: builder.args,
            fields: builder.fields,
            ..QueryResult::default()
        })
    }

    /// Effective `(limit, offset)` after the safe-limit policy.
    fn pagination(&self) -> (i64, i64) {
        let mut opts = self.options.clone();
        opts.apply_safe_limit();
        opts.calculate_offset();
        (opts.limit, opts.offset)
    }
}

fn check_table(name: &str) -> Result<(), TranslateError> {
    if name.is_empty() {
        return Err(TranslateError::MissingTable);
    }
    check_identifier(name)
}

fn check_identifier(name: &str) -> Result<(), TranslateError> {
    if !is_valid_field_name(name) {
        return Err(TranslateError::InvalidField(name.to_string()));
    }
    Ok(())
}

/// Per-call lowering state.
struct SqlBuilder<'a> {
    translator: &'a SqlTranslator,
    /// Arguments already bound by the enclosing statement.
    base: usize,
    args: Vec<Value>,
    fields: Vec<String>,
}

impl<'a> SqlBuilder<'a> {
    fn new(translator: &'a SqlTranslator, base: usize) -> Self {
        Self {
            translator,
            base,
            args: Vec::new(),
            fields: Vec::new(),
        }
    }

    fn bind(&mut self, value: Value) -> String {
        self.args.push(value);
        format!("${}", self.base + self.args.len())
    }

    fn bind_all(&mut self, values: &[Value]) -> Result<String, TranslateError> {
        let max = self.translator.policy.max_in_values;
        if values.len() > max {
            return Err(TranslateError::TooManyInValues {
                count: values.len(),
                max,
            });
        }
        let placeholders: Vec<String> = values.iter().map(|v| self.bind(v.clone())).collect();
        Ok(placeholders.join(", "))
    }

    fn lower(&mut self, node: &Node, depth: usize) -> Result<String, TranslateError> {
        let max = self.translator.policy.max_depth;
        if depth > max {
            return Err(TranslateError::MaxDepthExceeded { max });
        }

        match node {
            Node::Binary { op, left, right } => self.lower_binary(*op, left, right, depth),
            Node::Unary { op, child } => self.lower_unary(*op, child, depth),
            Node::Field { name } => self.column(name),
            Node::Literal(value) => Ok(self.bind(value.clone())),
            Node::List(values) => Ok(format!("({})", self.bind_all(values)?)),
            Node::Range { field, min, max } => {
                let column = self.lower_field_operand(field, "BETWEEN", depth)?;
                let min = self.bind(min.clone());
                let max = self.bind(max.clone());
                Ok(format!("{} BETWEEN {} AND {}", column, min, max))
            }
            Node::FullText { query, fields, .. } => self.lower_full_text(query, fields),
            Node::In {
                field,
                values,
                negated,
            } => {
                let op = if *negated { "NOT IN" } else { "IN" };
                let column = self.lower_field_operand(field, op, depth)?;
                if values.is_empty() {
                    // x IN () matches nothing; x NOT IN () matches everything
                    return Ok(if *negated { "TRUE" } else { "FALSE" }.to_string());
                }
                let placeholders = self.bind_all(values)?;
                Ok(format!("{} {} ({})", column, op, placeholders))
            }
        }
    }

    fn lower_binary(
        &mut self,
        op: BinaryOperator,
        left: &Node,
        right: &Node,
        depth: usize,
    ) -> Result<String, TranslateError> {
        if op.is_logical() {
            let l = self.lower(left, depth + 1)?;
            let r = self.lower(right, depth + 1)?;
            return Ok(format!("({} {} {})", l, op, r));
        }

        match (left, right) {
            (Node::Field { .. }, Node::Literal(value)) if op.is_pattern() => {
                check_like_pattern(op, value)?;
            }
            (Node::Field { .. }, Node::Literal(_)) => {}
            (Node::Literal(_), Node::Field { .. }) if !op.is_pattern() => {}
            _ => {
                return Err(TranslateError::InvalidOperands {
                    op: op.to_string(),
                    expected: if op.is_pattern() {
                        "a field on the left and a pattern on the right"
                    } else {
                        "one field and one literal operand"
                    },
                })
            }
        }

        let l = self.lower(left, depth + 1)?;
        let r = self.lower(right, depth + 1)?;
        Ok(format!("{} {} {}", l, op, r))
    }

    fn lower_unary(
        &mut self,
        op: UnaryOperator,
        child: &Node,
        depth: usize,
    ) -> Result<String, TranslateError> {
        match op {
            UnaryOperator::Not => Ok(format!("NOT ({})", self.lower(child, depth + 1)?)),
            UnaryOperator::IsNull => Ok(format!(
                "{} IS NULL",
                self.lower_field_operand(child, op.as_str(), depth)?
            )),
            UnaryOperator::IsNotNull => Ok(format!(
                "{} IS NOT NULL",
                self.lower_field_operand(child, op.as_str(), depth)?
            )),
            UnaryOperator::Exists => Ok(format!(
                "EXISTS ({})",
                self.lower_field_operand(child, op.as_str(), depth)?
            )),
        }
    }

    /// Lower a child that must be a field reference, one level below `depth`.
    fn lower_field_operand(
        &mut self,
        node: &Node,
        op: &str,
        depth: usize,
    ) -> Result<String, TranslateError> {
        match node {
            Node::Field { .. } => self.lower(node, depth + 1),
            _ => Err(TranslateError::InvalidOperands {
                op: op.to_string(),
                expected: "a field operand",
            }),
        }
    }

    fn lower_full_text(&mut self, query: &str, fields: &[String]) -> Result<String, TranslateError> {
        let tsquery = to_tsquery(query);
        if tsquery.is_empty() {
            return Err(TranslateError::EmptyQuery);
        }

        let columns = fields
            .iter()
            .map(|f| self.column(f))
            .collect::<Result<Vec<_>, _>>()?;
        let placeholder = self.bind(Value::String(tsquery));

        if columns.is_empty() {
            return Ok(format!(
                "{} @@ to_tsquery('{}', {})",
                SEARCH_VECTOR_COLUMN, TEXT_SEARCH_CONFIG, placeholder
            ));
        }

        let vectors: Vec<String> = columns
            .iter()
            .map(|c| format!("to_tsvector('{}', COALESCE({}, ''))", TEXT_SEARCH_CONFIG, c))
            .collect();
        Ok(format!(
            "({}) @@ to_tsquery('{}', {})",
            vectors.join(" || "),
            TEXT_SEARCH_CONFIG,
            placeholder
        ))
    }

    fn column(&mut self, name: &str) -> Result<String, TranslateError> {
        let translator = self.translator;
        let resolved = resolve_field(name, &translator.options, &translator.policy)?;
        if !self.fields.iter().any(|f| f == &resolved) {
            self.fields.push(resolved.clone());
        }
        Ok(match &translator.table_alias {
            Some(alias) => format!("{}.{}", alias, resolved),
            None => resolved,
        })
    }
}

/// Reject non-string patterns and short patterns with a leading wildcard,
/// which force a full scan.
fn check_like_pattern(op: BinaryOperator, value: &Value) -> Result<(), TranslateError> {
    let pattern = value
        .as_str()
        .ok_or_else(|| TranslateError::UnsupportedOperator {
            op: op.to_string(),
            reason: "pattern must be a string",
        })?;
    if pattern.starts_with('%') && pattern.chars().count() < 4 {
        return Err(TranslateError::InvalidLikePattern {
            pattern: pattern.to_string(),
        });
    }
    Ok(())
}

/// Whitespace-separated words of `query` with tsquery operators removed.
/// Both backends treat a query with no remaining words as empty.
pub(super) fn search_words(query: &str) -> impl Iterator<Item = String> + '_ {
    query
        .split_whitespace()
        .map(|word| word.replace(TSQUERY_OPERATORS, ""))
        .filter(|word| !word.is_empty())
}

/// `funny cats` → `funny:* & cats:*`.
fn to_tsquery(query: &str) -> String {
    search_words(query)
        .map(|word| format!("{}:*", word))
        .collect::<Vec<_>>()
        .join(" & ")
}
