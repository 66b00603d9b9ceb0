//! Turns rule source text into a flat token stream.
//!
//! Grounded on the teacher's `bulloak::tokenizer`: a `Cell<Position>` holds
//! the scan cursor so the public `tokenize` can hand out an immutable
//! `TokenizerI` view over `&self`, `scan`/`peek`/`char` advance one char at
//! a time tracking line/column, and `Error` carries the offending span plus
//! a copy of the original text so it can later be rendered with carets.

use std::{borrow::Borrow, cell::Cell, fmt, result};

use betrace_core::{LexSpan as Span, Position};
use thiserror::Error as ThisError;

use crate::error::BeTraceError;

type Result<T> = result::Result<T, Error>;

/// An error raised while turning rule source text into tokens.
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

/// The specific lexical problem encountered.
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ErrorKind {
    /// A character that cannot start or continue any token.
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    /// A string literal that reached end-of-input without a closing quote.
    #[error("unterminated string literal")]
    UnterminatedString,
    /// A numeric literal that failed to parse, e.g. `1.2.3`.
    #[error("invalid number literal {0:?}")]
    InvalidNumber(String),
}

/// The kind of a lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// A dotted identifier, e.g. `payment.charge_card` or `amount`.
    Ident,
    /// A numeric literal.
    Number,
    /// A double-quoted string literal (already unescaped).
    Str,
    /// `when`
    When,
    /// `always`
    Always,
    /// `never`
    Never,
    /// `and`
    And,
    /// `or`
    Or,
    /// `not`
    Not,
    /// `where`
    Where,
    /// `count`
    Count,
    /// `contains`
    Contains,
    /// `true`
    True,
    /// `false`
    False,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `==`
    EqEq,
    /// `!=`
    BangEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// End of input.
    Eof,
}

/// One lexical token: its kind, source span, and literal text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// The kind of token.
    pub kind: TokenKind,
    /// The span of source text this token covers.
    pub span: Span,
    /// The raw lexeme (decoded, for strings).
    pub lexeme: String,
}

/// Tokenizes BeTrace rule source text.
pub struct Tokenizer {
    pos: Cell<Position>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    /// Creates a tokenizer ready to scan from the start of a fresh input.
    #[must_use]
    pub fn new() -> Self {
        Self { pos: Cell::new(Position::new(0, 1, 1)) }
    }

    /// Tokenizes `text` into a flat stream, terminated by an [`TokenKind::Eof`]
    /// token.
    ///
    /// # Errors
    /// Returns an [`Error`] at the first unscannable character or malformed
    /// literal.
    pub fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
        self.pos.set(Position::new(0, 1, 1));
        TokenizerI::new(self, text).tokenize()
    }
}

struct TokenizerI<'s, T> {
    text: &'s str,
    tokenizer: T,
}

impl<'s, T: Borrow<Tokenizer>> TokenizerI<'s, T> {
    fn new(tokenizer: T, text: &'s str) -> Self {
        Self { text, tokenizer }
    }

    fn tokenizer(&self) -> &Tokenizer {
        self.tokenizer.borrow()
    }

    fn error(&self, span: Span, kind: ErrorKind) -> Error {
        Error { kind, text: self.text.to_string(), span }
    }

    fn is_eof(&self) -> bool {
        self.offset() == self.text.len()
    }

    fn offset(&self) -> usize {
        self.tokenizer().pos.get().offset
    }

    fn pos(&self) -> Position {
        self.tokenizer().pos.get()
    }

    fn span(&self) -> Span {
        Span::splat(self.pos())
    }

    fn char(&self) -> char {
        self.text[self.offset()..]
            .chars()
            .next()
            .unwrap_or_else(|| panic!("expected char at offset {}", self.offset()))
    }

    fn peek(&self) -> Option<char> {
        self.text[self.offset()..].chars().nth(1)
    }

    /// Advances the cursor by one character, returning the new current
    /// character, or `None` at end-of-input.
    fn scan(&self) -> Option<char> {
        if self.is_eof() {
            return None;
        }
        let Position { mut offset, mut line, mut column } = self.pos();
        if self.char() == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
        offset += self.char().len_utf8();
        self.tokenizer().pos.set(Position::new(offset, line, column));
        self.text[offset..].chars().next()
    }

    fn tokenize(&self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            if self.is_eof() {
                break;
            }
            tokens.push(self.scan_token()?);
        }
        let eof_pos = self.pos();
        tokens.push(Token { kind: TokenKind::Eof, span: Span::splat(eof_pos), lexeme: String::new() });
        Ok(tokens)
    }

    fn skip_whitespace(&self) {
        while !self.is_eof() && self.char().is_whitespace() {
            self.scan();
        }
    }

    fn scan_token(&self) -> Result<Token> {
        let start = self.pos();
        let c = self.char();
        match c {
            '{' => self.single(TokenKind::LBrace, start),
            '}' => self.single(TokenKind::RBrace, start),
            '(' => self.single(TokenKind::LParen, start),
            ')' => self.single(TokenKind::RParen, start),
            '.' => self.single(TokenKind::Dot, start),
            ',' => self.single(TokenKind::Comma, start),
            '=' if self.peek() == Some('=') => self.double(TokenKind::EqEq, "==", start),
            '!' if self.peek() == Some('=') => self.double(TokenKind::BangEq, "!=", start),
            '<' if self.peek() == Some('=') => self.double(TokenKind::LtEq, "<=", start),
            '>' if self.peek() == Some('=') => self.double(TokenKind::GtEq, ">=", start),
            '<' => self.single(TokenKind::Lt, start),
            '>' => self.single(TokenKind::Gt, start),
            '"' => self.scan_string(start),
            c if c.is_ascii_digit() => self.scan_number(start),
            c if is_ident_start(c) => Ok(self.scan_ident(start)),
            c => Err(self.error(self.span(), ErrorKind::UnexpectedChar(c))),
        }
    }

    fn single(&self, kind: TokenKind, start: Position) -> Result<Token> {
        let lexeme = self.char().to_string();
        self.scan();
        Ok(Token { kind, span: Span::new(start, start), lexeme })
    }

    fn double(&self, kind: TokenKind, lexeme: &str, start: Position) -> Result<Token> {
        self.scan();
        let end = self.pos();
        self.scan();
        Ok(Token { kind, span: Span::new(start, end), lexeme: lexeme.to_string() })
    }

    fn scan_ident(&self, start: Position) -> Token {
        let mut lexeme = String::new();
        loop {
            lexeme.push(self.char());
            let end = self.pos();
            if self.peek().is_some_and(is_ident_continue) {
                self.scan();
            } else {
                self.scan();
                let kind = keyword_kind(&lexeme).unwrap_or(TokenKind::Ident);
                return Token { kind, span: Span::new(start, end), lexeme };
            }
        }
    }

    fn scan_number(&self, start: Position) -> Result<Token> {
        let mut lexeme = String::new();
        let mut end = self.pos();
        loop {
            lexeme.push(self.char());
            end = self.pos();
            let continues = self
                .peek()
                .is_some_and(|c| c.is_ascii_digit() || (c == '.' && !lexeme.contains('.')));
            if continues {
                self.scan();
            } else {
                break;
            }
        }
        self.scan();
        if lexeme.parse::<f64>().is_err() {
            return Err(self.error(Span::new(start, end), ErrorKind::InvalidNumber(lexeme)));
        }
        Ok(Token { kind: TokenKind::Number, span: Span::new(start, end), lexeme })
    }

    fn scan_string(&self, start: Position) -> Result<Token> {
        let mut lexeme = String::new();
        self.scan();
        loop {
            if self.is_eof() {
                return Err(self.error(Span::new(start, self.pos()), ErrorKind::UnterminatedString));
            }
            if self.char() == '"' {
                let end = self.pos();
                self.scan();
                return Ok(Token { kind: TokenKind::Str, span: Span::new(start, end), lexeme });
            }
            lexeme.push(self.char());
            self.scan();
        }
    }
}

fn is_ident_start(c: char) -> bool {
    unicode_xid::UnicodeXID::is_xid_start(c) || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    unicode_xid::UnicodeXID::is_xid_continue(c) || c == '_'
}

fn keyword_kind(lexeme: &str) -> Option<TokenKind> {
    Some(match lexeme {
        "when" => TokenKind::When,
        "always" => TokenKind::Always,
        "never" => TokenKind::Never,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "where" => TokenKind::Where,
        "count" => TokenKind::Count,
        "contains" => TokenKind::Contains,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        _ => return None,
    })
}
