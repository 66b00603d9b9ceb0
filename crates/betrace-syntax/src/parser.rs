//! Recursive-descent parser turning a token stream into a [`RuleAst`].
//!
//! Grounded on the teacher's `bulloak::parser`: a `Cell<usize>` tracks the
//! current token index so the public entry point can hand out an immutable
//! `ParserI` view, and every production is a small method that either
//! returns an AST node or an [`Error`] carrying the exact offending span.
//!
//! Grammar (precedence lowest to highest): `or` < `and` < `not` < primary.
//!
//! ```text
//! rule        := "when" "{" expr "}" obligation
//! obligation  := ("always" | "never") "{" expr "}"
//! expr        := or_expr
//! or_expr     := and_expr ("or" and_expr)*
//! and_expr    := not_expr ("and" not_expr)*
//! not_expr    := "not" not_expr | primary
//! primary     := count_expr | chain_expr | "(" expr ")"
//! count_expr  := "count" "(" ident ")" rel_op (number | "count" "(" ident ")")
//! chain_expr  := ident ("." "where" "(" condition ")")*
//! condition   := ident rel_op value | ident "contains" value
//! value       := number | "true" | "false" | string | ident
//! ```
//!
//! The legacy v1 surface (`trace.has(op)`, `trace.count(op) rel_op ...`) is
//! accepted by the same grammar, at the same `primary` position, and folds
//! into the identical `Predicate`/`Count` AST nodes the v2 spellings build:
//!
//! ```text
//! primary     := count_expr | chain_expr | v1_has | "(" expr ")"
//! v1_has      := "trace" "." "has" "(" ident ")"
//! count_expr  := ("count" "(" ident ")" | "trace" "." "count" "(" ident ")") count_rhs
//! count_rhs   := rel_op (number | "count" "(" ident ")" | "trace" "." "count" "(" ident ")")
//! ```

use std::{borrow::Borrow, cell::Cell, fmt, result};

use betrace_core::LexSpan as Span;
use thiserror::Error as ThisError;

use crate::{
    ast::{CondOp, Condition, CountOperand, Expr, Obligation, RelOp, RuleAst, Value},
    error::BeTraceError,
    tokenizer::{Token, TokenKind},
};

type Result<T> = result::Result<T, Error>;

/// An error raised while parsing tokens into a [`RuleAst`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    text: String,
    span: Span,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.format_error(f)
    }
}

impl std::error::Error for Error {}

impl BeTraceError<ErrorKind> for Error {
    fn kind(&self) -> &ErrorKind {
        &self.kind
    }
    fn text(&self) -> &str {
        &self.text
    }
    fn span(&self) -> &Span {
        &self.span
    }
}

/// The specific grammar violation encountered.
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ErrorKind {
    /// Found a token where a different, specific one was expected.
    #[error("expected {expected}, found {found:?}")]
    Expected {
        /// A human-readable description of what was expected.
        expected: &'static str,
        /// The lexeme actually found.
        found: String,
    },
    /// Reached end of input mid-production.
    #[error("unexpected end of input")]
    UnexpectedEof,
    /// A `count()` right-hand side was neither a number nor `count(...)`.
    #[error("count() comparisons require a number or another count(), found {0:?}")]
    InvalidCountRhs(String),
}

/// A parser for BeTrace rule source tokens.
pub struct Parser {
    current: Cell<usize>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Creates a parser ready to consume a fresh token stream.
    #[must_use]
    pub fn new() -> Self {
        Self { current: Cell::new(0) }
    }

    /// Parses `tokens` (as produced by [`crate::tokenizer::Tokenizer`]) into
    /// a [`RuleAst`].
    ///
    /// # Errors
    /// Returns an [`Error`] at the first token that doesn't match the
    /// grammar.
    pub fn parse(&self, text: &str, tokens: &[Token]) -> Result<RuleAst> {
        self.current.set(0);
        ParserI::new(self, text, tokens).parse()
    }
}

struct ParserI<'t, P> {
    text: &'t str,
    tokens: &'t [Token],
    parser: P,
}

impl<'t, P: Borrow<Parser>> ParserI<'t, P> {
    fn new(parser: P, text: &'t str, tokens: &'t [Token]) -> Self {
        Self { text, tokens, parser }
    }

    fn parser(&self) -> &Parser {
        self.parser.borrow()
    }

    fn error(&self, span: Span, kind: ErrorKind) -> Error {
        Error { kind, text: self.text.to_string(), span }
    }

    fn index(&self) -> usize {
        self.parser().current.get()
    }

    fn current(&self) -> &Token {
        &self.tokens[self.index().min(self.tokens.len() - 1)]
    }

    fn advance(&self) -> &Token {
        let tok = self.current();
        if tok.kind != TokenKind::Eof {
            self.parser().current.set(self.index() + 1);
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn peek_kind(&self, ahead: usize) -> &TokenKind {
        &self.tokens[(self.index() + ahead).min(self.tokens.len() - 1)].kind
    }

    fn expect(&self, kind: TokenKind, expected: &'static str) -> Result<&Token> {
        if self.current().kind == kind {
            Ok(self.advance())
        } else if self.current().kind == TokenKind::Eof {
            Err(self.error(self.current().span, ErrorKind::UnexpectedEof))
        } else {
            let found = self.current().lexeme.clone();
            let span = self.current().span;
            Err(self.error(span, ErrorKind::Expected { expected, found }))
        }
    }

    fn parse(&self) -> Result<RuleAst> {
        let when_kw = self.expect(TokenKind::When, "'when'")?;
        let start = when_kw.span.start;
        self.expect(TokenKind::LBrace, "'{'")?;
        let when = self.parse_expr()?;
        self.expect(TokenKind::RBrace, "'}'")?;

        let obligation = self.parse_obligation()?;
        let end = self.current().span.start;
        Ok(RuleAst { when, obligation, span: Span::new(start, end) })
    }

    fn parse_obligation(&self) -> Result<Obligation> {
        let (is_always, kw_span) = if self.check(&TokenKind::Always) {
            (true, self.advance().span)
        } else if self.check(&TokenKind::Never) {
            (false, self.advance().span)
        } else {
            let found = self.current().lexeme.clone();
            let span = self.current().span;
            return Err(self.error(span, ErrorKind::Expected { expected: "'always' or 'never'", found }));
        };
        let _ = kw_span;
        self.expect(TokenKind::LBrace, "'{'")?;
        let expr = self.parse_expr()?;
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(if is_always { Obligation::Always(expr) } else { Obligation::Never(expr) })
    }

    fn parse_expr(&self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            let span = Span::new(lhs.span().start, rhs.span().end);
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs), span);
        }
        Ok(lhs)
    }

    fn parse_and(&self) -> Result<Expr> {
        let mut lhs = self.parse_not()?;
        while self.check(&TokenKind::And) {
            self.advance();
            let rhs = self.parse_not()?;
            let span = Span::new(lhs.span().start, rhs.span().end);
            lhs = Expr::And(Box::new(lhs), Box::new(rhs), span);
        }
        Ok(lhs)
    }

    fn parse_not(&self) -> Result<Expr> {
        if self.check(&TokenKind::Not) {
            let start = self.advance().span.start;
            let inner = self.parse_not()?;
            let span = Span::new(start, inner.span().end);
            return Ok(Expr::Not(Box::new(inner), span));
        }
        self.parse_primary()
    }

    fn parse_primary(&self) -> Result<Expr> {
        if self.check(&TokenKind::LParen) {
            self.advance();
            let inner = self.parse_expr()?;
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(inner);
        }
        if self.check(&TokenKind::Count) {
            return self.parse_count();
        }
        if self.looking_at_v1_trace_call("has") {
            return self.parse_v1_has();
        }
        if self.looking_at_v1_trace_call("count") {
            return self.parse_v1_count();
        }
        self.parse_chain()
    }

    /// True iff the upcoming tokens are the v1 `trace.<method>(` spelling --
    /// `Ident("trace") Dot <method> LParen`. `method` is matched by lexeme
    /// rather than token kind: `count` lexes as the `Count` keyword token
    /// even right after a `.`, while `has` lexes as a plain `Ident`. Plain
    /// chain expressions like `trace.thing` (no following call) fall
    /// through to `chain_expr` untouched.
    fn looking_at_v1_trace_call(&self, method: &str) -> bool {
        self.check(&TokenKind::Ident)
            && self.current().lexeme == "trace"
            && self.peek_kind(1) == &TokenKind::Dot
            && self.tokens[(self.index() + 2).min(self.tokens.len() - 1)].lexeme == method
            && self.peek_kind(3) == &TokenKind::LParen
    }

    fn parse_v1_has(&self) -> Result<Expr> {
        let start = self.advance().span.start; // 'trace'
        self.advance(); // '.'
        self.advance(); // 'has'
        self.expect(TokenKind::LParen, "'('")?;
        let operation = self.parse_dotted_ident()?;
        let end = self.expect(TokenKind::RParen, "')'")?.span.end;
        Ok(Expr::Predicate { operation, span: Span::new(start, end) })
    }

    fn parse_v1_count(&self) -> Result<Expr> {
        let start = self.advance().span.start; // 'trace'
        self.advance(); // '.'
        self.advance(); // 'count'
        self.expect(TokenKind::LParen, "'('")?;
        let operation = self.parse_dotted_ident()?;
        self.expect(TokenKind::RParen, "')'")?;
        self.parse_count_rhs(start, operation)
    }

    fn parse_count(&self) -> Result<Expr> {
        let start = self.advance().span.start;
        self.expect(TokenKind::LParen, "'('")?;
        let operation = self.parse_dotted_ident()?;
        self.expect(TokenKind::RParen, "')'")?;
        self.parse_count_rhs(start, operation)
    }

    /// Parses the `rel_op (number | count(ident) | trace.count(ident))`
    /// tail shared by `count(op) ...` and its v1 spelling `trace.count(op) ...`.
    fn parse_count_rhs(&self, start: betrace_core::Position, operation: String) -> Result<Expr> {
        let op = self.parse_rel_op()?;

        if self.check(&TokenKind::Count) {
            self.advance();
            self.expect(TokenKind::LParen, "'('")?;
            let other = self.parse_dotted_ident()?;
            let end = self.expect(TokenKind::RParen, "')'")?.span.end;
            return Ok(Expr::Count {
                operation,
                op,
                rhs: CountOperand::Operation(other),
                span: Span::new(start, end),
            });
        }

        if self.looking_at_v1_trace_call("count") {
            self.advance(); // 'trace'
            self.advance(); // '.'
            self.advance(); // 'count'
            self.expect(TokenKind::LParen, "'('")?;
            let other = self.parse_dotted_ident()?;
            let end = self.expect(TokenKind::RParen, "')'")?.span.end;
            return Ok(Expr::Count {
                operation,
                op,
                rhs: CountOperand::Operation(other),
                span: Span::new(start, end),
            });
        }

        if self.check(&TokenKind::Number) {
            let tok = self.advance();
            let n: f64 = tok.lexeme.parse().expect("tokenizer guarantees a valid float literal");
            let end = tok.span.end;
            let lit = n as i64;
            return Ok(Expr::Count { operation, op, rhs: CountOperand::Literal(lit), span: Span::new(start, end) });
        }

        let found = self.current().lexeme.clone();
        let span = self.current().span;
        Err(self.error(span, ErrorKind::InvalidCountRhs(found)))
    }

    fn parse_chain(&self) -> Result<Expr> {
        let start = self.current().span.start;
        let operation = self.parse_dotted_ident()?;
        let span = Span::new(start, self.previous_span().end);
        let mut expr = Expr::Predicate { operation, span };

        while self.check(&TokenKind::Dot) {
            self.advance();
            self.expect(TokenKind::Where, "'where'")?;
            self.expect(TokenKind::LParen, "'('")?;
            let condition = self.parse_condition()?;
            let end = self.expect(TokenKind::RParen, "')'")?.span.end;
            let span = Span::new(expr.span().start, end);
            expr = Expr::Where { inner: Box::new(expr), condition, span };
        }

        Ok(expr)
    }

    fn parse_condition(&self) -> Result<Condition> {
        let start = self.current().span.start;
        let attr_path = self.parse_dotted_ident()?;

        if self.check(&TokenKind::Contains) {
            self.advance();
            let value = self.parse_value()?;
            let end = self.previous_span().end;
            return Ok(Condition { attr_path, op: CondOp::Contains, value, span: Span::new(start, end) });
        }

        let op = CondOp::Rel(self.parse_rel_op()?);
        let value = self.parse_value()?;
        let end = self.previous_span().end;
        Ok(Condition { attr_path, op, value, span: Span::new(start, end) })
    }

    fn parse_rel_op(&self) -> Result<RelOp> {
        let op = match self.current().kind {
            TokenKind::EqEq => RelOp::Eq,
            TokenKind::BangEq => RelOp::Ne,
            TokenKind::Lt => RelOp::Lt,
            TokenKind::LtEq => RelOp::Le,
            TokenKind::Gt => RelOp::Gt,
            TokenKind::GtEq => RelOp::Ge,
            _ => {
                let found = self.current().lexeme.clone();
                let span = self.current().span;
                return Err(self.error(span, ErrorKind::Expected { expected: "a comparison operator", found }));
            }
        };
        self.advance();
        Ok(op)
    }

    fn parse_value(&self) -> Result<Value> {
        let tok = self.current();
        let value = match tok.kind {
            TokenKind::Number => Value::Number(tok.lexeme.parse().expect("tokenizer validated this number")),
            TokenKind::True => Value::Bool(true),
            TokenKind::False => Value::Bool(false),
            TokenKind::Str => Value::Str(tok.lexeme.clone()),
            TokenKind::Ident => Value::Ident(tok.lexeme.clone()),
            _ => {
                let found = tok.lexeme.clone();
                let span = tok.span;
                return Err(self.error(span, ErrorKind::Expected { expected: "a value", found }));
            }
        };
        self.advance();
        Ok(value)
    }

    /// Joins an `ident ('.' ident)*` sequence into a single dotted name,
    /// stopping before a `.` that introduces a `.where(...)` chain suffix
    /// rather than another name segment.
    fn parse_dotted_ident(&self) -> Result<String> {
        let first = self.expect(TokenKind::Ident, "an identifier")?;
        let mut name = first.lexeme.clone();
        while self.check(&TokenKind::Dot) && self.peek_kind(1) == &TokenKind::Ident {
            self.advance();
            let seg = self.expect(TokenKind::Ident, "an identifier")?;
            name.push('.');
            name.push_str(&seg.lexeme);
        }
        Ok(name)
    }

    fn previous_span(&self) -> Span {
        self.tokens[self.index().saturating_sub(1).min(self.tokens.len() - 1)].span
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tokenizer::Tokenizer;

    fn parse(src: &str) -> Result<RuleAst> {
        let tokens = Tokenizer::new().tokenize(src).unwrap();
        Parser::new().parse(src, &tokens)
    }

    #[test]
    fn parses_minimal_always_rule() {
        let ast = parse("when { payment.charge_card } always { payment.emit_receipt }").unwrap();
        assert!(matches!(ast.when, Expr::Predicate { .. }));
        assert!(matches!(ast.obligation, Obligation::Always(Expr::Predicate { .. })));
    }

    #[test]
    fn parses_never_rule() {
        let ast = parse("when { a } never { b }").unwrap();
        assert!(matches!(ast.obligation, Obligation::Never(_)));
    }

    #[test]
    fn parses_where_chain() {
        let ast = parse(r#"when { payment.charge_card.where(amount > 1000) } always { payment.flag } "#).unwrap();
        match ast.when {
            Expr::Where { condition, .. } => {
                assert_eq!(condition.attr_path, "amount");
                assert_eq!(condition.op, CondOp::Rel(RelOp::Gt));
                assert_eq!(condition.value, Value::Number(1000.0));
            }
            other => panic!("expected Where, got {other:?}"),
        }
    }

    #[test]
    fn parses_count_comparison() {
        let ast = parse("when { a } always { count(http.request) >= 3 }").unwrap();
        match ast.obligation.expr() {
            Expr::Count { operation, op, rhs, .. } => {
                assert_eq!(operation, "http.request");
                assert_eq!(*op, RelOp::Ge);
                assert_eq!(*rhs, CountOperand::Literal(3));
            }
            other => panic!("expected Count, got {other:?}"),
        }
    }

    #[test]
    fn parses_count_to_count_comparison() {
        let ast = parse("when { a } always { count(http.request) == count(http.response) }").unwrap();
        match ast.obligation.expr() {
            Expr::Count { rhs: CountOperand::Operation(name), .. } => assert_eq!(name, "http.response"),
            other => panic!("expected Count with operation rhs, got {other:?}"),
        }
    }

    #[test]
    fn parses_boolean_combinators_with_not_binding_tighter_than_and_or() {
        let ast = parse("when { a } always { a and not b or c }").unwrap();
        assert!(matches!(ast.obligation.expr(), Expr::Or(..)));
    }

    #[test]
    fn parenthesized_expr_overrides_precedence() {
        let ast = parse("when { a } always { not (a or b) }").unwrap();
        match ast.obligation.expr() {
            Expr::Not(inner, _) => assert!(matches!(**inner, Expr::Or(..))),
            other => panic!("expected Not(Or), got {other:?}"),
        }
    }

    #[test]
    fn reports_expected_brace() {
        let err = parse("when payment.charge_card } always { payment.flag }").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Expected { expected: "'{'", .. }));
    }

    #[test]
    fn reports_unexpected_eof() {
        let err = parse("when { payment.charge_card }").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::UnexpectedEof);
    }

    #[test]
    fn v1_trace_has_parses_to_the_same_ast_shape_as_a_bare_predicate() {
        let v1 = parse("when { trace.has(payment.charge_card) } always { trace.has(payment.emit_receipt) }").unwrap();
        match v1.when {
            Expr::Predicate { operation, .. } => assert_eq!(operation, "payment.charge_card"),
            other => panic!("expected Predicate, got {other:?}"),
        }
        match v1.obligation {
            Obligation::Always(Expr::Predicate { operation, .. }) => {
                assert_eq!(operation, "payment.emit_receipt");
            }
            other => panic!("expected Always(Predicate), got {other:?}"),
        }
    }

    #[test]
    fn v1_trace_count_parses_to_the_same_ast_shape_as_count() {
        let ast = parse("when { a } always { trace.count(http.request) >= 3 }").unwrap();
        match ast.obligation.expr() {
            Expr::Count { operation, op, rhs, .. } => {
                assert_eq!(operation, "http.request");
                assert_eq!(*op, RelOp::Ge);
                assert_eq!(*rhs, CountOperand::Literal(3));
            }
            other => panic!("expected Count, got {other:?}"),
        }
    }

    #[test]
    fn v1_trace_count_to_trace_count_comparison() {
        let ast = parse("when { a } always { trace.count(http.request) == trace.count(http.response) }").unwrap();
        match ast.obligation.expr() {
            Expr::Count { rhs: CountOperand::Operation(name), .. } => assert_eq!(name, "http.response"),
            other => panic!("expected Count with operation rhs, got {other:?}"),
        }
    }

    #[test]
    fn v1_and_v2_combinators_compose_in_a_single_expression() {
        let ast = parse("when { a } always { trace.has(x) and not trace.has(y) }").unwrap();
        match ast.obligation.expr() {
            Expr::And(lhs, rhs, _) => {
                assert!(matches!(**lhs, Expr::Predicate { .. }));
                assert!(matches!(**rhs, Expr::Not(..)));
            }
            other => panic!("expected And(Predicate, Not), got {other:?}"),
        }
    }

    #[test]
    fn a_bare_trace_dotted_ident_without_a_call_is_still_an_ordinary_chain() {
        // `trace.thing` with no `(...)` suffix is not the v1 compat form --
        // it is a perfectly ordinary dotted operation name.
        let ast = parse("when { a } always { trace.thing } ").unwrap();
        match ast.obligation.expr() {
            Expr::Predicate { operation, .. } => assert_eq!(operation, "trace.thing"),
            other => panic!("expected Predicate, got {other:?}"),
        }
    }
}
