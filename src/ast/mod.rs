/// Filter expression front-end.
///
/// ```text
/// Input ("status = 'active' AND score > 50")
///       ↓
/// Lexer                  (lexer.rs)
///       ↓
/// Parser                 (parser.rs)
///       ↓
/// Filter AST             (types.rs)
///       ↓
/// Validator / SQL / search backends (crate::validator, crate::translate)
/// ```
pub mod lexer;
pub mod parser;
pub mod types;

// Re-export key types for convenience
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::{parse, parse_query, parse_simple_query};
pub use types::*;
