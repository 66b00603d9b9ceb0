//! Shared error-formatting machinery for the lexer, parser, and validator.
//!
//! Mirrors the teacher's `bulloak_syntax::error::BulloakError` trait: every
//! sub-error type carries its own `kind`, the original source text, and a
//! span, and gets a caret-annotated `Display` impl for free by implementing
//! this trait and delegating `fmt::Display` to [`BeTraceError::format_error`].

use std::{cmp, fmt};

use betrace_core::LexSpan as Span;

/// A trait implemented by every positional error in this crate
/// (`tokenizer::Error`, `parser::Error`, `semantics::Error`), giving them a
/// uniform, caret-annotated `Display` rendering.
pub trait BeTraceError<K: fmt::Display>: std::error::Error {
    /// The specific kind of error.
    #[must_use]
    fn kind(&self) -> &K;

    /// The original rule text in which this error occurred.
    #[must_use]
    fn text(&self) -> &str;

    /// The span at which this error occurred.
    #[must_use]
    fn span(&self) -> &Span;

    /// Formats this error with a caret-annotated excerpt of the offending
    /// line, the way the teacher's `format_error` does.
    fn format_error(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let divider = repeat_str("-", 79);
        writeln!(f, "{divider}")?;

        let start_offset = self.span().start.offset;
        let end_offset = self.span().end.offset;
        if start_offset == end_offset && start_offset == 0 {
            write!(f, "betrace error: {}", self.kind())?;
            return Ok(());
        }

        writeln!(f, "betrace error: {}\n", self.kind())?;
        let notated = self.notate();
        writeln!(f, "{notated}")?;
        writeln!(f, "--- (line {}, column {}) ---", self.span().start.line, self.span().start.column)?;
        Ok(())
    }

    /// Renders the offending line with carets (`^`) under the span.
    fn notate(&self) -> String {
        let mut notated = String::new();
        if let Some(line) = self.text().lines().nth(self.span().start.line.saturating_sub(1)) {
            notated.push_str(line);
            notated.push('\n');
            notated.push_str(&repeat_str(" ", self.span().start.column.saturating_sub(1)));
            let note_len = self.span().end.column.saturating_sub(self.span().start.column) + 1;
            let note_len = cmp::max(1, note_len);
            notated.push_str(&repeat_str("^", note_len));
            notated.push('\n');
        }
        notated
    }
}

fn repeat_str(s: &str, n: usize) -> String {
    std::iter::repeat(s).take(n).collect()
}

#[cfg(test)]
mod tests {
    use betrace_core::{LexSpan as Span, Position};
    use pretty_assertions::assert_eq;
    use thiserror::Error;

    use super::{repeat_str, BeTraceError};

    #[derive(Error, Clone, Debug, Eq, PartialEq)]
    pub struct TestError {
        #[source]
        kind: TestErrorKind,
        text: String,
        span: Span,
    }

    #[derive(Error, Clone, Debug, Eq, PartialEq)]
    pub enum TestErrorKind {
        #[error("unexpected token '{0}'")]
        TokenUnexpected(String),
    }

    impl BeTraceError<TestErrorKind> for TestError {
        fn kind(&self) -> &TestErrorKind {
            &self.kind
        }
        fn text(&self) -> &str {
            &self.text
        }
        fn span(&self) -> &Span {
            &self.span
        }
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            self.format_error(f)
        }
    }

    #[test]
    fn notates_the_offending_line() {
        let err = TestError {
            kind: TestErrorKind::TokenUnexpected("world".to_owned()),
            text: "hello\nworld\n".to_owned(),
            span: Span::new(Position::new(6, 2, 1), Position::new(10, 2, 5)),
        };
        let rendered = format!("{err}");

        let mut expected = String::new();
        expected.push_str(&repeat_str("-", 79));
        expected.push('\n');
        expected.push_str(&format!("betrace error: {}\n\n", err.kind()));
        expected.push_str("world\n");
        expected.push_str("^^^^^\n\n");
        expected.push_str(&format!(
            "--- (line {}, column {}) ---\n",
            err.span().start.line,
            err.span().start.column
        ));
        assert_eq!(rendered, expected);
    }
}
