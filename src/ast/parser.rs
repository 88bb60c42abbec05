/// Filter expression parser.
///
/// Recursive descent over the lexer's token stream. Precedence, lowest first:
/// `OR`, `AND`, `NOT`, then a comparison suffix on a primary (`=`, `IN`,
/// `BETWEEN`, `IS NULL`, ...). Operand shapes are not checked here; the
/// translators reject a comparison between two fields, for example.
use crate::error::ParseError;

use super::lexer::{tokenize, Token, TokenKind};
use super::types::*;

/// Ceiling on parenthesis and `NOT` nesting, and on the depth of the tree
/// built from `AND`/`OR` chains. Well above any configured `max_depth`, so
/// the translators and the validator still report overdeep queries; this
/// only keeps the recursion off the end of the stack.
pub const MAX_NESTING: usize = 256;

/// Parse a token stream into a single expression tree.
pub fn parse(tokens: Vec<Token>) -> Result<Node, ParseError> {
    Parser::new(tokens)?.parse()
}

/// Tokenize and parse `input`.
pub fn parse_query(input: &str) -> Result<Node, ParseError> {
    let tokens = tokenize(input)?;
    parse(tokens)
}

/// Build a free-text node from plain search text, bypassing the lexer.
/// Returns `None` when there is nothing to search for.
pub fn parse_simple_query(text: &str, fields: &[&str]) -> Option<Node> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(Node::full_text(
        text,
        fields.iter().map(|f| f.to_string()).collect(),
    ))
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
}

impl Parser {
    /// Fails with `EmptyQuery` when the stream holds nothing but EOF.
    pub fn new(mut tokens: Vec<Token>) -> Result<Self, ParseError> {
        match tokens.first() {
            None => return Err(ParseError::EmptyQuery),
            Some(t) if t.kind == TokenKind::Eof => return Err(ParseError::EmptyQuery),
            Some(_) => {}
        }
        // Hand-built streams may omit EOF; the cursor relies on it.
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let (line, column) = tokens
                .last()
                .map(|t| (t.line, t.column + t.text.chars().count()))
                .unwrap_or((1, 1));
            tokens.push(Token::new(TokenKind::Eof, "", line, column));
        }
        Ok(Self {
            tokens,
            pos: 0,
            nesting: 0,
        })
    }

    pub fn parse(mut self) -> Result<Node, ParseError> {
        let node = self.parse_or()?;
        if self.current().kind != TokenKind::Eof {
            return Err(self.unexpected("end of input"));
        }
        Ok(node)
    }

    fn current(&self) -> &Token {
        // `new` guarantees a trailing EOF, and `advance` never moves past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.current();
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: describe_found(token),
            line: token.line,
            column: token.column,
        }
    }

    fn too_deep(&self) -> ParseError {
        let token = self.current();
        ParseError::TooDeep {
            line: token.line,
            column: token.column,
        }
    }

    /// Step one level into a parenthesized group or a `NOT`.
    fn enter(&mut self) -> Result<(), ParseError> {
        if self.nesting >= MAX_NESTING {
            return Err(self.too_deep());
        }
        self.nesting += 1;
        Ok(())
    }

    fn leave(&mut self) {
        self.nesting -= 1;
    }

    fn parse_or(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_and()?;
        let mut depth = left.depth();
        while self.check(TokenKind::Or) {
            let err = self.too_deep();
            self.advance();
            let right = self.parse_and()?;
            depth = 1 + depth.max(right.depth());
            if depth > MAX_NESTING {
                return Err(err);
            }
            left = Node::or(left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Node, ParseError> {
        let mut left = self.parse_not()?;
        let mut depth = left.depth();
        while self.check(TokenKind::And) {
            let err = self.too_deep();
            self.advance();
            let right = self.parse_not()?;
            depth = 1 + depth.max(right.depth());
            if depth > MAX_NESTING {
                return Err(err);
            }
            left = Node::and(left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Node, ParseError> {
        if self.check(TokenKind::Not) {
            self.enter()?;
            self.advance();
            let child = self.parse_not();
            self.leave();
            return Ok(Node::not(child?));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Node, ParseError> {
        let left = self.parse_primary()?;

        if let Some(op) = comparison_operator(self.current().kind) {
            self.advance();
            let right = self.parse_primary()?;
            return Ok(Node::binary(op, left, right));
        }

        let kind = self.current().kind;
        match kind {
            TokenKind::In => {
                self.advance();
                let values = self.parse_list()?;
                Ok(Node::In {
                    field: Box::new(left),
                    values,
                    negated: false,
                })
            }
            _ if self.at_not_in() => {
                self.advance();
                self.advance();
                let values = self.parse_list()?;
                Ok(Node::In {
                    field: Box::new(left),
                    values,
                    negated: true,
                })
            }
            TokenKind::Between => {
                self.advance();
                let min = self.parse_between_bound()?;
                self.expect(TokenKind::And)?;
                let max = self.parse_between_bound()?;
                Ok(Node::Range {
                    field: Box::new(left),
                    min,
                    max,
                })
            }
            _ if self.current().is_word("IS") => {
                self.advance();
                let op = if self.check(TokenKind::Not) || self.current().is_word("NOT") {
                    self.advance();
                    UnaryOperator::IsNotNull
                } else {
                    UnaryOperator::IsNull
                };
                if !self.current().is_word("NULL") {
                    return Err(self.unexpected("NULL"));
                }
                self.advance();
                Ok(Node::unary(op, left))
            }
            _ => Ok(left),
        }
    }

    /// `NOT IN`, with `NOT` either as the keyword token or as a bare word.
    fn at_not_in(&self) -> bool {
        let token = self.current();
        (token.kind == TokenKind::Not || token.is_word("NOT")) && self.peek().kind == TokenKind::In
    }

    fn parse_primary(&mut self) -> Result<Node, ParseError> {
        let kind = self.current().kind;
        match kind {
            TokenKind::LParen => {
                self.enter()?;
                self.advance();
                let expr = self.parse_or();
                self.leave();
                let expr = expr?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Ident => {
                let token = self.advance();
                Ok(Node::Field { name: token.text })
            }
            TokenKind::String | TokenKind::Number => Ok(Node::Literal(self.parse_value()?)),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_value(&mut self) -> Result<Value, ParseError> {
        let kind = self.current().kind;
        match kind {
            TokenKind::String => Ok(Value::String(self.advance().text)),
            TokenKind::Number => {
                let token = self.advance();
                parse_number(&token)
            }
            _ => Err(self.unexpected("value")),
        }
    }

    fn parse_between_bound(&mut self) -> Result<Value, ParseError> {
        let kind = self.current().kind;
        match kind {
            TokenKind::String | TokenKind::Number => self.parse_value(),
            _ => {
                let token = self.current();
                Err(ParseError::InvalidBetweenBound {
                    found: describe_found(token),
                    line: token.line,
                    column: token.column,
                })
            }
        }
    }

    /// `(a, b)` or `[a, b]`; the closing bracket must match the opening one.
    fn parse_list(&mut self) -> Result<Vec<Value>, ParseError> {
        let open = self.current().kind;
        let close = match open {
            TokenKind::LParen => TokenKind::RParen,
            TokenKind::LBracket => TokenKind::RBracket,
            _ => return Err(self.unexpected("'(' or '['")),
        };
        self.advance();

        let mut values = Vec::new();
        if self.check(close) {
            self.advance();
            return Ok(values);
        }

        loop {
            values.push(self.parse_value()?);
            if self.check(TokenKind::Comma) {
                self.advance();
                continue;
            }
            self.expect(close)?;
            return Ok(values);
        }
    }
}

fn comparison_operator(kind: TokenKind) -> Option<BinaryOperator> {
    match kind {
        TokenKind::Eq => Some(BinaryOperator::Eq),
        TokenKind::NotEq => Some(BinaryOperator::NotEq),
        TokenKind::Gt => Some(BinaryOperator::Gt),
        TokenKind::GtEq => Some(BinaryOperator::GtEq),
        TokenKind::Lt => Some(BinaryOperator::Lt),
        TokenKind::LtEq => Some(BinaryOperator::LtEq),
        TokenKind::Like => Some(BinaryOperator::Like),
        TokenKind::ILike => Some(BinaryOperator::ILike),
        _ => None,
    }
}

/// Integer unless the text carries a decimal point. Floats that overflow to
/// infinity are rejected.
fn parse_number(token: &Token) -> Result<Value, ParseError> {
    let invalid = || ParseError::InvalidNumber {
        text: token.text.clone(),
        line: token.line,
        column: token.column,
    };
    if token.text.contains('.') {
        token
            .text
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Value::Float)
            .ok_or_else(invalid)
    } else {
        token
            .text
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| invalid())
    }
}

fn describe_found(token: &Token) -> String {
    match token.kind {
        TokenKind::Eof => "end of input".to_string(),
        TokenKind::String => format!("string {:?}", token.text),
        _ => format!("'{}'", token.text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LexError;

    fn parse_ok(input: &str) -> Node {
        parse_query(input).unwrap_or_else(|e| panic!("failed to parse {:?}: {}", input, e))
    }

    #[test]
    fn test_parse_simple_comparison() {
        let node = parse_ok("status = 'active'");
        assert_eq!(node, Node::compare("status", BinaryOperator::Eq, "active"));
    }

    #[test]
    fn test_parse_all_comparison_operators() {
        let cases = [
            ("a = 1", BinaryOperator::Eq),
            ("a != 1", BinaryOperator::NotEq),
            ("a <> 1", BinaryOperator::NotEq),
            ("a > 1", BinaryOperator::Gt),
            ("a >= 1", BinaryOperator::GtEq),
            ("a < 1", BinaryOperator::Lt),
            ("a <= 1", BinaryOperator::LtEq),
            ("a LIKE 1", BinaryOperator::Like),
            ("a ilike 1", BinaryOperator::ILike),
        ];
        for (input, op) in cases {
            assert_eq!(parse_ok(input), Node::compare("a", op, 1), "{}", input);
        }
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_ok("score > 50"), Node::compare("score", BinaryOperator::Gt, 50));
        assert_eq!(
            parse_ok("ratio >= 0.75"),
            Node::compare("ratio", BinaryOperator::GtEq, 0.75)
        );
        assert_eq!(
            parse_ok("delta < -3"),
            Node::compare("delta", BinaryOperator::Lt, -3)
        );
    }

    #[test]
    fn test_parse_invalid_number() {
        let err = parse_query("a = -").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidNumber {
                text: "-".into(),
                line: 1,
                column: 5
            }
        );

        let err = parse_query("a = 99999999999999999999").unwrap_err();
        assert!(matches!(err, ParseError::InvalidNumber { .. }));
    }

    #[test]
    fn test_parse_float_overflow() {
        let input = format!("score > 1{}.0", "0".repeat(400));
        let err = parse_query(&input).unwrap_err();
        assert!(matches!(err, ParseError::InvalidNumber { line: 1, column: 9, .. }));

        let input = format!("score > 1{}.0", "0".repeat(300));
        assert_eq!(
            parse_ok(&input),
            Node::compare("score", BinaryOperator::Gt, 1e300)
        );
    }

    #[test]
    fn test_parse_deep_parentheses() {
        let input = format!("{}a = 1{}", "(".repeat(100_000), ")".repeat(100_000));
        let err = parse_query(&input).unwrap_err();
        assert_eq!(
            err,
            ParseError::TooDeep {
                line: 1,
                column: MAX_NESTING + 1
            }
        );

        let input = format!("{}a = 1{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert_eq!(parse_ok(&input), Node::compare("a", BinaryOperator::Eq, 1));
    }

    #[test]
    fn test_parse_deep_not() {
        let input = format!("{}a = 1", "NOT ".repeat(200_000));
        let err = parse_query(&input).unwrap_err();
        assert_eq!(
            err,
            ParseError::TooDeep {
                line: 1,
                column: MAX_NESTING * 4 + 1
            }
        );

        let input = format!("{}a = 1", "NOT ".repeat(MAX_NESTING));
        assert_eq!(parse_ok(&input).depth(), MAX_NESTING + 2);
    }

    #[test]
    fn test_parse_long_chain() {
        let long = vec!["a = 1"; 100_000].join(" AND ");
        let err = parse_query(&long).unwrap_err();
        assert!(matches!(err, ParseError::TooDeep { .. }));

        let short = vec!["a = 1"; 200].join(" OR ");
        assert_eq!(parse_ok(&short).depth(), 201);
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let node = parse_ok("a = 1 OR b = 2 AND c = 3");
        let expected = Node::or(
            Node::compare("a", BinaryOperator::Eq, 1),
            Node::and(
                Node::compare("b", BinaryOperator::Eq, 2),
                Node::compare("c", BinaryOperator::Eq, 3),
            ),
        );
        assert_eq!(node, expected);
    }

    #[test]
    fn test_logical_left_associative() {
        let node = parse_ok("a = 1 AND b = 2 AND c = 3");
        assert_eq!(
            node.to_string(),
            "(((a = 1) AND (b = 2)) AND (c = 3))"
        );
    }

    #[test]
    fn test_parentheses_override_precedence() {
        let node = parse_ok("(a = 1 OR b = 2) AND c = 3");
        assert_eq!(node.to_string(), "(((a = 1) OR (b = 2)) AND (c = 3))");
    }

    #[test]
    fn test_parse_not() {
        let node = parse_ok("NOT status = 'deleted'");
        assert_eq!(
            node,
            Node::not(Node::compare("status", BinaryOperator::Eq, "deleted"))
        );

        let node = parse_ok("not not a = 1");
        assert_eq!(node.depth(), 4);
    }

    #[test]
    fn test_parse_in_list() {
        let node = parse_ok("status IN ('active', 'pending')");
        assert_eq!(
            node,
            Node::in_list("status", vec!["active".into(), "pending".into()], false)
        );

        let node = parse_ok("id in [1, 2, 3]");
        assert_eq!(
            node,
            Node::in_list("id", vec![1.into(), 2.into(), 3.into()], false)
        );
    }

    #[test]
    fn test_parse_empty_in_list() {
        assert_eq!(parse_ok("id IN ()"), Node::in_list("id", vec![], false));
        assert_eq!(parse_ok("id IN []"), Node::in_list("id", vec![], false));
    }

    #[test]
    fn test_parse_not_in() {
        let node = parse_ok("id NOT IN (1, 2)");
        assert_eq!(node, Node::in_list("id", vec![1.into(), 2.into()], true));
    }

    #[test]
    fn test_parse_not_in_identifier_spelling() {
        // hand-built stream where NOT arrives as a plain identifier
        let tokens = vec![
            Token::new(TokenKind::Ident, "id", 1, 1),
            Token::new(TokenKind::Ident, "not", 1, 4),
            Token::new(TokenKind::In, "IN", 1, 8),
            Token::new(TokenKind::LParen, "(", 1, 11),
            Token::new(TokenKind::Number, "1", 1, 12),
            Token::new(TokenKind::RParen, ")", 1, 13),
            Token::new(TokenKind::Eof, "", 1, 14),
        ];
        assert_eq!(
            parse(tokens).unwrap(),
            Node::in_list("id", vec![1.into()], true)
        );
    }

    #[test]
    fn test_parse_mismatched_list_brackets() {
        let err = parse_query("id IN (1, 2]").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { ref expected, .. } if expected == "')'"));
    }

    #[test]
    fn test_parse_list_requires_commas() {
        let err = parse_query("id IN (1 2)").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));

        let err = parse_query("id IN (1,)").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { ref expected, .. } if expected == "value"));
    }

    #[test]
    fn test_parse_between() {
        let node = parse_ok("vote_score BETWEEN 10 AND 100");
        assert_eq!(node, Node::range("vote_score", 10, 100));

        let node = parse_ok("created BETWEEN '2024-01-01' AND '2024-12-31' AND a = 1");
        assert_eq!(
            node,
            Node::and(
                Node::range("created", "2024-01-01", "2024-12-31"),
                Node::compare("a", BinaryOperator::Eq, 1)
            )
        );
    }

    #[test]
    fn test_parse_between_requires_and() {
        let err = parse_query("score BETWEEN 1 OR 2").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { ref expected, .. } if expected == "AND"));
    }

    #[test]
    fn test_parse_between_rejects_field_bound() {
        let err = parse_query("score BETWEEN low AND 10").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidBetweenBound {
                found: "'low'".into(),
                line: 1,
                column: 15
            }
        );
    }

    #[test]
    fn test_parse_is_null() {
        let node = parse_ok("deleted_at IS NULL");
        assert_eq!(
            node,
            Node::unary(UnaryOperator::IsNull, Node::field("deleted_at"))
        );

        let node = parse_ok("deleted_at is not null");
        assert_eq!(
            node,
            Node::unary(UnaryOperator::IsNotNull, Node::field("deleted_at"))
        );
    }

    #[test]
    fn test_parse_is_requires_null() {
        let err = parse_query("deleted_at IS 5").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { ref expected, .. } if expected == "NULL"));
    }

    #[test]
    fn test_parse_qualified_field() {
        let node = parse_ok("users.status = 'x'");
        assert_eq!(node, Node::compare("users.status", BinaryOperator::Eq, "x"));
    }

    #[test]
    fn test_parse_bare_primary() {
        assert_eq!(parse_ok("active"), Node::field("active"));
        assert_eq!(parse_ok("'text'"), Node::literal("text"));
    }

    #[test]
    fn test_parse_empty_query() {
        assert_eq!(parse_query(""), Err(ParseError::EmptyQuery));
        assert_eq!(parse_query("   \n "), Err(ParseError::EmptyQuery));
        assert_eq!(parse(vec![]), Err(ParseError::EmptyQuery));
    }

    #[test]
    fn test_parse_unterminated_string() {
        let err = parse_query("name = 'test").unwrap_err();
        assert_eq!(
            err,
            ParseError::Lex(LexError::UnterminatedString { line: 1, column: 8 })
        );
    }

    #[test]
    fn test_parse_missing_operand() {
        let err = parse_query("status =").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedToken {
                expected: "expression".into(),
                found: "end of input".into(),
                line: 1,
                column: 9
            }
        );
    }

    #[test]
    fn test_parse_unclosed_group() {
        let err = parse_query("(a = 1 AND b = 2").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { ref expected, .. } if expected == "')'"));
    }

    #[test]
    fn test_parse_trailing_tokens() {
        let err = parse_query("a = 1 b = 2").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedToken {
                expected: "end of input".into(),
                found: "'b'".into(),
                line: 1,
                column: 7
            }
        );

        let err = parse_query("a = 1)").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { .. }));
    }

    #[test]
    fn test_parse_without_trailing_eof() {
        let tokens = vec![
            Token::new(TokenKind::Ident, "a", 1, 1),
            Token::new(TokenKind::Eq, "=", 1, 3),
        ];
        let err = parse(tokens).unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { ref found, .. } if found == "end of input"));
    }

    #[test]
    fn test_parse_simple_query() {
        let node = parse_simple_query("funny cats", &["title", "description"]).unwrap();
        assert_eq!(
            node,
            Node::full_text("funny cats", vec!["title".into(), "description".into()])
        );

        assert!(parse_simple_query("", &["title"]).is_none());
        assert!(parse_simple_query("   ", &[]).is_none());

        let node = parse_simple_query("global", &[]).unwrap();
        assert!(matches!(node, Node::FullText { ref fields, .. } if fields.is_empty()));
    }
}
