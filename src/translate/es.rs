/// Filter AST → Elasticsearch / OpenSearch query DSL.
///
/// Produces `serde_json::Value` documents. Field checks, the allow-list and
/// the depth and IN limits match the SQL backend.
use std::sync::Arc;

use serde_json::{json, Map, Value as Json};

use crate::ast::{parse_query, BinaryOperator, Node, UnaryOperator};
use crate::error::{QueryError, TranslateError};
use crate::options::{QueryOptions, QueryResult, SortDirection};
use crate::policy::QueryPolicy;

use super::fields::resolve_field;
use super::sql::search_words;

/// Catch-all field used for global full-text search.
pub const ALL_FIELD: &str = "_all";

#[derive(Debug, Clone)]
pub struct EsTranslator {
    options: QueryOptions,
    policy: Arc<QueryPolicy>,
}

impl EsTranslator {
    pub fn new(options: QueryOptions) -> Self {
        Self::with_policy(Arc::new(QueryPolicy::default()), options)
    }

    pub fn with_policy(policy: Arc<QueryPolicy>, options: QueryOptions) -> Self {
        Self { options, policy }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Lower `node` to a query clause, returned in `es_query`.
    pub fn translate(&self, node: &Node) -> Result<QueryResult, TranslateError> {
        let mut builder = EsBuilder::new(self);
        let query = builder.lower(node, 1).map_err(|err| {
            tracing::warn!(kind = node.kind(), error = %err, "search translation failed");
            err
        })?;

        let (limit, offset) = self.pagination();
        tracing::debug!(kind = node.kind(), limit, offset, "translated filter to search query");

        Ok(QueryResult {
            es_query: Some(query),
            limit,
            offset,
            fields: builder.fields,
            ..QueryResult::default()
        })
    }

    /// Like [`EsTranslator::translate`], but failures are recorded in the
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

    /// Full search request: `{query, from, size, sort}`.
    pub fn build_search_query(
        &self,
        node: &Node,
        sort_field: Option<&str>,
        sort_dir: SortDirection,
    ) -> Result<QueryResult, TranslateError> {
        let mut builder = EsBuilder::new(self);
        let query = builder.lower(node, 1)?;
        let sort = builder.sort_clause(sort_field, sort_dir)?;
        Ok(self.assemble(query, sort, builder.fields))
    }

    /// `match_all` when there are no filters, otherwise every filter in a
    /// non-scoring `bool.filter`.
    pub fn build_match_all_query(
        &self,
        filters: &[Node],
        sort_field: Option<&str>,
        sort_dir: SortDirection,
    ) -> Result<QueryResult, TranslateError> {
        let mut builder = EsBuilder::new(self);
        let query = if filters.is_empty() {
            json!({ "match_all": {} })
        } else {
            let clauses = filters
                .iter()
                .map(|f| builder.lower(f, 1))
                .collect::<Result<Vec<_>, _>>()?;
            json!({ "bool": { "filter": clauses } })
        };
        let sort = builder.sort_clause(sort_field, sort_dir)?;
        Ok(self.assemble(query, sort, builder.fields))
    }

    fn assemble(&self, query: Json, sort: Option<Json>, fields: Vec<String>) -> QueryResult {
        let (limit, offset) = self.pagination();

        let mut request = Map::new();
        request.insert("query".to_string(), query);
        request.insert("from".to_string(), json!(offset));
        request.insert("size".to_string(), json!(limit));
        if let Some(sort) = sort {
            request.insert("sort".to_string(), sort);
        }

        QueryResult {
            es_query: Some(Json::Object(request)),
            limit,
            offset,
            fields,
            ..QueryResult::default()
        }
    }

    fn pagination(&self) -> (i64, i64) {
        let mut opts = self.options.clone();
        opts.apply_safe_limit();
        opts.calculate_offset();
        (opts.limit, opts.offset)
    }
}

/// Per-call lowering state.
struct EsBuilder<'a> {
    translator: &'a EsTranslator,
    fields: Vec<String>,
}

impl<'a> EsBuilder<'a> {
    fn new(translator: &'a EsTranslator) -> Self {
        Self {
            translator,
            fields: Vec::new(),
        }
    }

    fn lower(&mut self, node: &Node, depth: usize) -> Result<Json, TranslateError> {
        let max = self.translator.policy.max_depth;
        if depth > max {
            return Err(TranslateError::MaxDepthExceeded { max });
        }

        match node {
            Node::Binary { op, left, right } => self.lower_binary(*op, left, right, depth),
            Node::Unary { op, child } => self.lower_unary(*op, child, depth),
            Node::Field { .. } | Node::Literal(_) | Node::List(_) => {
                Err(TranslateError::UnsupportedNode(node.kind()))
            }
            Node::Range { field, min, max } => {
                let field = self.field_operand(field, "BETWEEN", depth)?;
                Ok(json!({
                    "range": { field: { "gte": Json::from(min), "lte": Json::from(max) } }
                }))
            }
            Node::FullText {
                query,
                fields,
                boost,
            } => self.lower_full_text(query, fields, *boost),
            Node::In {
                field,
                values,
                negated,
            } => {
                let max = self.translator.policy.max_in_values;
                if values.len() > max {
                    return Err(TranslateError::TooManyInValues {
                        count: values.len(),
                        max,
                    });
                }
                let op = if *negated { "NOT IN" } else { "IN" };
                let field = self.field_operand(field, op, depth)?;
                let values: Vec<Json> = values.iter().map(Json::from).collect();
                let terms = json!({ "terms": { field: values } });
                Ok(if *negated { must_not(terms) } else { terms })
            }
        }
    }

    fn lower_binary(
        &mut self,
        op: BinaryOperator,
        left: &Node,
        right: &Node,
        depth: usize,
    ) -> Result<Json, TranslateError> {
        match op {
            BinaryOperator::And => {
                let l = self.lower(left, depth + 1)?;
                let r = self.lower(right, depth + 1)?;
                Ok(json!({ "bool": { "must": [l, r] } }))
            }
            BinaryOperator::Or => {
                let l = self.lower(left, depth + 1)?;
                let r = self.lower(right, depth + 1)?;
                Ok(json!({ "bool": { "should": [l, r], "minimum_should_match": 1 } }))
            }
            BinaryOperator::Like | BinaryOperator::ILike => {
                let (field, pattern) = match (left, right) {
                    (Node::Field { name }, Node::Literal(value)) => (name, value),
                    _ => {
                        return Err(TranslateError::InvalidOperands {
                            op: op.to_string(),
                            expected: "a field on the left and a pattern on the right",
                        })
                    }
                };
                self.check_depth(depth + 1)?;
                let pattern = pattern
                    .as_str()
                    .ok_or_else(|| TranslateError::UnsupportedOperator {
                        op: op.to_string(),
                        reason: "pattern must be a string",
                    })?;
                let field = self.field(field)?;
                Ok(json!({
                    "wildcard": {
                        field: {
                            "value": like_to_wildcard(pattern),
                            "case_insensitive": op == BinaryOperator::ILike,
                        }
                    }
                }))
            }
            _ => {
                let (field, value, flipped) = match (left, right) {
                    (Node::Field { name }, Node::Literal(value)) => (name, value, false),
                    (Node::Literal(value), Node::Field { name }) => (name, value, true),
                    _ => {
                        return Err(TranslateError::InvalidOperands {
                            op: op.to_string(),
                            expected: "one field and one literal operand",
                        })
                    }
                };
                self.check_depth(depth + 1)?;
                let field = self.field(field)?;
                let value = Json::from(value);

                // `5 < score` reads as `score > 5`
                let op = if flipped { mirror(op) } else { op };
                Ok(match op {
                    BinaryOperator::Eq => json!({ "term": { field: value } }),
                    BinaryOperator::NotEq => must_not(json!({ "term": { field: value } })),
                    BinaryOperator::Gt => json!({ "range": { field: { "gt": value } } }),
                    BinaryOperator::GtEq => json!({ "range": { field: { "gte": value } } }),
                    BinaryOperator::Lt => json!({ "range": { field: { "lt": value } } }),
                    BinaryOperator::LtEq => json!({ "range": { field: { "lte": value } } }),
                    BinaryOperator::And
                    | BinaryOperator::Or
                    | BinaryOperator::Like
                    | BinaryOperator::ILike => {
                        return Err(TranslateError::UnsupportedOperator {
                            op: op.to_string(),
                            reason: "not a comparison",
                        })
                    }
                })
            }
        }
    }

    fn lower_unary(
        &mut self,
        op: UnaryOperator,
        child: &Node,
        depth: usize,
    ) -> Result<Json, TranslateError> {
        match op {
            UnaryOperator::Not => Ok(must_not(self.lower(child, depth + 1)?)),
            UnaryOperator::IsNull => {
                let field = self.field_operand(child, op.as_str(), depth)?;
                Ok(must_not(json!({ "exists": { "field": field } })))
            }
            UnaryOperator::IsNotNull | UnaryOperator::Exists => {
                let field = self.field_operand(child, op.as_str(), depth)?;
                Ok(json!({ "exists": { "field": field } }))
            }
        }
    }

    fn lower_full_text(
        &mut self,
        query: &str,
        fields: &[String],
        boost: Option<f64>,
    ) -> Result<Json, TranslateError> {
        if search_words(query).next().is_none() {
            return Err(TranslateError::EmptyQuery);
        }
        let boost = boost.filter(|b| *b > 0.0);

        let mut fields = fields
            .iter()
            .map(|f| self.field(f))
            .collect::<Result<Vec<_>, _>>()?;

        if fields.len() > 1 {
            let mut body = json!({
                "query": query,
                "fields": fields,
                "fuzziness": "AUTO",
                "operator": "and",
            });
            if let Some(boost) = boost {
                body["boost"] = json!(boost);
            }
            return Ok(json!({ "multi_match": body }));
        }

        let target = fields.pop().unwrap_or_else(|| ALL_FIELD.to_string());
        let mut body = json!({ "query": query, "fuzziness": "AUTO" });
        if let Some(boost) = boost {
            body["boost"] = json!(boost);
        }
        Ok(json!({ "match": { target: body } }))
    }

    fn check_depth(&self, depth: usize) -> Result<(), TranslateError> {
        let max = self.translator.policy.max_depth;
        if depth > max {
            return Err(TranslateError::MaxDepthExceeded { max });
        }
        Ok(())
    }

    /// Resolve a child that must be a field reference, one level below `depth`.
    fn field_operand(&mut self, node: &Node, op: &str, depth: usize) -> Result<String, TranslateError> {
        match node {
            Node::Field { name } => {
                self.check_depth(depth + 1)?;
                self.field(name)
            }
            _ => Err(TranslateError::InvalidOperands {
                op: op.to_string(),
                expected: "a field operand",
            }),
        }
    }

    fn field(&mut self, name: &str) -> Result<String, TranslateError> {
        let translator = self.translator;
        let resolved = resolve_field(name, &translator.options, &translator.policy)?;
        if !self.fields.iter().any(|f| f == &resolved) {
            self.fields.push(resolved.clone());
        }
        Ok(resolved)
    }

    fn sort_clause(
        &mut self,
        sort_field: Option<&str>,
        sort_dir: SortDirection,
    ) -> Result<Option<Json>, TranslateError> {
        match sort_field.filter(|f| !f.is_empty()) {
            Some(name) => {
                let field = self.field(name)?;
                Ok(Some(json!([{ field: sort_dir.as_search_str() }])))
            }
            None => Ok(None),
        }
    }
}

fn must_not(clause: Json) -> Json {
    json!({ "bool": { "must_not": [clause] } })
}

/// Swap sides of a comparison: `a < b` ⇔ `b > a`.
fn mirror(op: BinaryOperator) -> BinaryOperator {
    match op {
        BinaryOperator::Gt => BinaryOperator::Lt,
        BinaryOperator::GtEq => BinaryOperator::LtEq,
        BinaryOperator::Lt => BinaryOperator::Gt,
        BinaryOperator::LtEq => BinaryOperator::GtEq,
        other => other,
    }
}

/// SQL LIKE pattern → wildcard pattern. `%` and `_` become `*` and `?`;
/// `\%` and `\_` stay literal; literal `*` and `?` are escaped.
fn like_to_wildcard(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(next @ ('%' | '_')) => out.push(next),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            },
            '%' => out.push('*'),
            '_' => out.push('?'),
            '*' | '?' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}
