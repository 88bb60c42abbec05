//! Filter expression AST types.
//!
//! This module defines the tree produced by the parser and consumed by the
//! validator and both lowering backends. The node set is closed: every pass
//! matches on [`Node`] exhaustively, so adding a variant is a compile error in
//! each consumer until it is handled.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Primitive value carried by literals, lists, ranges and IN lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(x) => serde_json::Value::from(*x),
            Value::String(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

/// Binary operators: logical connectives and comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Logical
    And,
    Or,
    // Comparison
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    // Pattern
    Like,
    ILike,
}

impl BinaryOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "!=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Like => "LIKE",
            BinaryOperator::ILike => "ILIKE",
        }
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    pub fn is_pattern(self) -> bool {
        matches!(self, BinaryOperator::Like | BinaryOperator::ILike)
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
    IsNull,
    IsNotNull,
    Exists,
}

impl UnaryOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOperator::Not => "NOT",
            UnaryOperator::IsNull => "IS NULL",
            UnaryOperator::IsNotNull => "IS NOT NULL",
            UnaryOperator::Exists => "EXISTS",
        }
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core expression type. Recursive to support arbitrary nesting.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// `left op right` for AND/OR and comparisons.
    Binary {
        op: BinaryOperator,
        left: Box<Node>,
        right: Box<Node>,
    },
    /// `op child` (NOT, IS NULL, IS NOT NULL, EXISTS).
    Unary { op: UnaryOperator, child: Box<Node> },
    /// Column or attribute reference: `col` or `table.col`.
    Field { name: String },
    /// Literal value.
    Literal(Value),
    /// Bare value list.
    List(Vec<Value>),
    /// `field BETWEEN min AND max`.
    Range {
        field: Box<Node>,
        min: Value,
        max: Value,
    },
    /// Free-text search. No fields means a global search.
    FullText {
        query: String,
        fields: Vec<String>,
        boost: Option<f64>,
    },
    /// `field [NOT] IN (values)`.
    In {
        field: Box<Node>,
        values: Vec<Value>,
        negated: bool,
    },
}

impl Node {
    pub fn field(name: impl Into<String>) -> Self {
        Node::Field { name: name.into() }
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Node::Literal(value.into())
    }

    pub fn binary(op: BinaryOperator, left: Node, right: Node) -> Self {
        Node::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOperator, child: Node) -> Self {
        Node::Unary {
            op,
            child: Box::new(child),
        }
    }

    pub fn and(left: Node, right: Node) -> Self {
        Node::binary(BinaryOperator::And, left, right)
    }

    pub fn or(left: Node, right: Node) -> Self {
        Node::binary(BinaryOperator::Or, left, right)
    }

    pub fn not(child: Node) -> Self {
        Node::unary(UnaryOperator::Not, child)
    }

    /// `field op value`, the common comparison shape.
    pub fn compare(field: &str, op: BinaryOperator, value: impl Into<Value>) -> Self {
        Node::binary(op, Node::field(field), Node::literal(value))
    }

    pub fn range(field: &str, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        Node::Range {
            field: Box::new(Node::field(field)),
            min: min.into(),
            max: max.into(),
        }
    }

    pub fn in_list(field: &str, values: Vec<Value>, negated: bool) -> Self {
        Node::In {
            field: Box::new(Node::field(field)),
            values,
            negated,
        }
    }

    pub fn full_text(query: impl Into<String>, fields: Vec<String>) -> Self {
        Node::FullText {
            query: query.into(),
            fields,
            boost: None,
        }
    }

    /// Short name of the node kind, used in logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Binary { op, .. } if op.is_logical() => "logical",
            Node::Binary { .. } => "comparison",
            Node::Unary { .. } => "unary",
            Node::Field { .. } => "field",
            Node::Literal(_) => "literal",
            Node::List(_) => "list",
            Node::Range { .. } => "range",
            Node::FullText { .. } => "fulltext",
            Node::In { .. } => "in",
        }
    }

    /// Nesting depth of the tree. The root counts as 1 and every child,
    /// operands included, is one level deeper.
    pub fn depth(&self) -> usize {
        match self {
            Node::Binary { left, right, .. } => 1 + left.depth().max(right.depth()),
            Node::Unary { child, .. } => 1 + child.depth(),
            Node::Range { field, .. } | Node::In { field, .. } => 1 + field.depth(),
            Node::Field { .. } | Node::Literal(_) | Node::List(_) | Node::FullText { .. } => 1,
        }
    }
}

fn join_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Binary { op, left, right } => write!(f, "({} {} {})", left, op, right),
            Node::Unary { op, child } => write!(f, "({} {})", op, child),
            Node::Field { name } => f.write_str(name),
            Node::Literal(value) => write!(f, "{}", value),
            Node::List(values) => write!(f, "[{}]", join_values(values)),
            Node::Range { field, min, max } => {
                write!(f, "({} BETWEEN {} AND {})", field, min, max)
            }
            Node::FullText { query, fields, .. } => {
                write!(f, "FULLTEXT({:?}, fields=[{}])", query, fields.join(", "))
            }
            Node::In {
                field,
                values,
                negated,
            } => {
                let op = if *negated { "NOT IN" } else { "IN" };
                write!(f, "({} {} [{}])", field, op, join_values(values))
            }
        }
    }
}
