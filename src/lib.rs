//! Safe filter expression compiler.
//!
//! Parses a small SQL-like filter language and lowers it to a parameterized
//! PostgreSQL `WHERE` fragment or to a search query DSL document.
//!
//! ```
//! use filterql::{parse_query, QueryOptions, SqlTranslator, Validator};
//!
//! let node = parse_query("status = 'active' AND score > 50").unwrap();
//! assert!(Validator::default().is_valid(&node));
//!
//! let result = SqlTranslator::new(QueryOptions::default()).translate(&node).unwrap();
//! assert_eq!(result.sql, "(status = $1 AND score > $2)");
//! ```
pub mod ast;
pub mod error;
pub mod options;
pub mod policy;
pub mod translate;
pub mod validator;


pub use ast::{parse, parse_query, parse_simple_query, tokenize, Node, Value};
pub use error::{LexError, ParseError, QueryError, TranslateError};
pub use options::{QueryOptions, QueryResult, SortDirection};
pub use policy::{QueryPolicy, SafeQueryLimits};
pub use translate::{EsTranslator, SqlTranslator};
pub use validator::{ValidationCode, ValidationError, Validator};
