//! Error types for filterql.
//!
//! Lexing, parsing and translation failures abort the current call and are
//! reported through these enums. Validation findings are not errors in this
//! sense; see [`crate::validator::ValidationError`].

use thiserror::Error;

/// Failure while turning raw input into tokens.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    #[error("unterminated string at line {line}, column {column}")]
    UnterminatedString { line: usize, column: usize },

    #[error("unexpected character '{ch}' at line {line}, column {column}")]
    UnexpectedCharacter { ch: char, line: usize, column: usize },
}

/// Failure while building an AST from tokens.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("empty query")]
    EmptyQuery,

    #[error("expected {expected}, found {found} at line {line}, column {column}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },

    #[error("invalid number '{text}' at line {line}, column {column}")]
    InvalidNumber {
        text: String,
        line: usize,
        column: usize,
    },

    #[error("BETWEEN bounds must be literal values, found {found} at line {line}, column {column}")]
    InvalidBetweenBound {
        found: String,
        line: usize,
        column: usize,
    },

    #[error("query nested too deeply at line {line}, column {column}")]
    TooDeep { line: usize, column: usize },

    #[error(transparent)]
    Lex(#[from] LexError),
}

/// Failure while lowering an AST to SQL or to a search document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslateError {
    #[error("empty query")]
    EmptyQuery,

    #[error("invalid field name: {0}")]
    InvalidField(String),

    #[error("field not allowed: {0}")]
    FieldNotAllowed(String),

    #[error("unsupported operator: {op} ({reason})")]
    UnsupportedOperator { op: String, reason: &'static str },

    #[error("{0} node cannot be translated directly")]
    UnsupportedNode(&'static str),

    #[error("{op} requires {expected}")]
    InvalidOperands { op: String, expected: &'static str },

    #[error("max query depth exceeded (max {max})")]
    MaxDepthExceeded { max: usize },

    #[error("too many IN values: got {count}, max {max}")]
    TooManyInValues { count: usize, max: usize },

    #[error("invalid LIKE pattern {pattern:?}: leading wildcard requires at least 3 characters")]
    InvalidLikePattern { pattern: String },

    #[error("table name required")]
    MissingTable,
}

/// Any failure on the text → output path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("translate error: {0}")]
    Translate(#[from] TranslateError),
}

impl From<LexError> for QueryError {
    fn from(err: LexError) -> Self {
        QueryError::Parse(ParseError::Lex(err))
    }
}
