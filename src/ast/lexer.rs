/// Filter expression tokenizer.
///
/// Produces a flat token stream for the parser. Positions are 1-based and
/// point at the first character of each token. `IS` and `NULL` are left as
/// identifiers; the parser resolves them by text.
use std::fmt;

use crate::error::LexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Colon,

    // Comparison
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,

    // Keywords
    And,
    Or,
    Not,
    Like,
    ILike,
    In,
    Between,

    // Literals and identifiers
    Ident,
    String,
    Number,

    Eof,
}

impl TokenKind {
    /// Human-readable description used in parse errors.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Eq => "'='",
            TokenKind::NotEq => "'!='",
            TokenKind::Gt => "'>'",
            TokenKind::GtEq => "'>='",
            TokenKind::Lt => "'<'",
            TokenKind::LtEq => "'<='",
            TokenKind::And => "AND",
            TokenKind::Or => "OR",
            TokenKind::Not => "NOT",
            TokenKind::Like => "LIKE",
            TokenKind::ILike => "ILIKE",
            TokenKind::In => "IN",
            TokenKind::Between => "BETWEEN",
            TokenKind::Ident => "identifier",
            TokenKind::String => "string",
            TokenKind::Number => "number",
            TokenKind::Eof => "end of input",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text, or the unescaped contents for string literals.
    pub text: String,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            column,
        }
    }

    /// True for an identifier whose text matches `word` case-insensitively.
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Ident && self.text.eq_ignore_ascii_case(word)
    }
}

pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos + 1).copied()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.pos += 1;
        }
    }

    fn read_while<F>(&mut self, predicate: F) -> String
    where
        F: Fn(char) -> bool,
    {
        let mut result = String::new();
        while let Some(ch) = self.current() {
            if !predicate(ch) {
                break;
            }
            result.push(ch);
            self.advance();
        }
        result
    }

    /// Consume the whole input and return the token stream, terminated by EOF.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.current() {
            if ch.is_whitespace() {
                self.advance();
                continue;
            }

            let (line, column) = (self.line, self.column);

            let single = match ch {
                '(' => Some(TokenKind::LParen),
                ')' => Some(TokenKind::RParen),
                '[' => Some(TokenKind::LBracket),
                ']' => Some(TokenKind::RBracket),
                ',' => Some(TokenKind::Comma),
                ':' => Some(TokenKind::Colon),
                '=' => Some(TokenKind::Eq),
                _ => None,
            };
            if let Some(kind) = single {
                self.advance();
                tokens.push(Token::new(kind, ch.to_string(), line, column));
                continue;
            }

            match ch {
                '!' if self.peek() == Some('=') => {
                    self.advance();
                    self.advance();
                    tokens.push(Token::new(TokenKind::NotEq, "!=", line, column));
                }
                '<' => {
                    self.advance();
                    let (kind, text) = match self.current() {
                        Some('=') => (TokenKind::LtEq, "<="),
                        Some('>') => (TokenKind::NotEq, "<>"),
                        _ => (TokenKind::Lt, "<"),
                    };
                    if text.len() == 2 {
                        self.advance();
                    }
                    tokens.push(Token::new(kind, text, line, column));
                }
                '>' => {
                    self.advance();
                    if self.current() == Some('=') {
                        self.advance();
                        tokens.push(Token::new(TokenKind::GtEq, ">=", line, column));
                    } else {
                        tokens.push(Token::new(TokenKind::Gt, ">", line, column));
                    }
                }
                '\'' | '"' => {
                    let text = self.read_string(ch, line, column)?;
                    tokens.push(Token::new(TokenKind::String, text, line, column));
                }
                _ if ch.is_ascii_digit() || ch == '-' || ch == '.' => {
                    let text = self.read_number();
                    tokens.push(Token::new(TokenKind::Number, text, line, column));
                }
                _ if ch.is_ascii_alphabetic() || ch == '_' => {
                    let text =
                        self.read_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
                    let kind = keyword_kind(&text).unwrap_or(TokenKind::Ident);
                    tokens.push(Token::new(kind, text, line, column));
                }
                _ => {
                    return Err(LexError::UnexpectedCharacter { ch, line, column });
                }
            }
        }

        tokens.push(Token::new(TokenKind::Eof, "", self.line, self.column));
        tracing::trace!(count = tokens.len(), "tokenized filter expression");
        Ok(tokens)
    }

    /// Read a quoted string. Escaped quotes become the quote character; any
    /// other backslash sequence is kept verbatim so LIKE escapes survive.
    fn read_string(&mut self, quote: char, line: usize, column: usize) -> Result<String, LexError> {
        self.advance(); // opening quote
        let mut result = String::new();

        while let Some(ch) = self.current() {
            if ch == quote {
                self.advance();
                return Ok(result);
            }
            if ch == '\\' {
                match self.peek() {
                    Some(next) if next == '\'' || next == '"' => {
                        result.push(next);
                        self.advance();
                        self.advance();
                        continue;
                    }
                    Some(next) => {
                        result.push('\\');
                        result.push(next);
                        self.advance();
                        self.advance();
                        continue;
                    }
                    None => break,
                }
            }
            result.push(ch);
            self.advance();
        }

        Err(LexError::UnterminatedString { line, column })
    }

    /// Optional leading `-`, digits, at most one `.`. Validation of the text
    /// happens in the parser.
    fn read_number(&mut self) -> String {
        let mut result = String::new();
        if self.current() == Some('-') {
            result.push('-');
            self.advance();
        }

        let mut has_dot = false;
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                result.push(ch);
            } else if ch == '.' && !has_dot {
                has_dot = true;
                result.push(ch);
            } else {
                break;
            }
            self.advance();
        }
        result
    }
}

fn keyword_kind(word: &str) -> Option<TokenKind> {
    match word.to_ascii_uppercase().as_str() {
        "AND" => Some(TokenKind::And),
        "OR" => Some(TokenKind::Or),
        "NOT" => Some(TokenKind::Not),
        "LIKE" => Some(TokenKind::Like),
        "ILIKE" => Some(TokenKind::ILike),
        "IN" => Some(TokenKind::In),
        "BETWEEN" => Some(TokenKind::Between),
        _ => None,
    }
}

/// Tokenize `input`. The returned stream always ends with an EOF token.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(input).tokenize()
}
