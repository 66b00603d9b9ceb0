//! Static validation of a parsed rule, run once at registration time.
//!
//! Grounded on the teacher's `bulloak::semantics::SemanticAnalyzer`: a
//! struct that walks the tree via [`crate::visitor::Visitor`], accumulating
//! a `Vec` of findings rather than failing at the first one, so a rule
//! author sees every problem in one pass.
//!
//! `spec.md` §4.2 frames this component as "advisory above the hard
//! errors; enforcement happens in the Interpreter" -- resource limits
//! (expression depth) are therefore a runtime concern of `betrace_interp`,
//! not this module. Every check named here is purely structural, and every
//! one of them is a warning: the grammar itself already guarantees a
//! parsed [`RuleAst`] has a `when` and exactly one obligation, so there is
//! currently no condition under which a *syntactically valid* rule gets
//! rejected at this stage. [`ErrorKind`] is kept non-exhaustive, the same
//! way the teacher keeps `__Nonexhaustive` markers on its error enums, so a
//! future structural check that does need to reject a rule has somewhere
//! to live without an API break.

use std::fmt;

use betrace_core::LexSpan as Span;
use thiserror::Error as ThisError;

use crate::{
    ast::{CondOp, CountOperand, Expr, Obligation, RelOp, RuleAst, Value},
    error::BeTraceError,
    visitor::Visitor,
};

/// The threshold above which `count(op) > N` (or any relational comparison
/// against a literal) is considered likely to scan an impractically large
/// span set (`spec.md` §4.2).
pub const COUNT_PERFORMANCE_THRESHOLD: i64 = 1000;

/// The minimum operation-name length that doesn't trigger the
/// "unconventional name" warning (`spec.md` §4.2: "at least three
/// characters and contain a dot").
pub const MIN_CONVENTIONAL_NAME_LEN: usize = 3;

type Result<T> = std::result::Result<T, Error>;

/// A hard validation failure: the rule is rejected.
///
/// See the module docs: the grammar already guarantees the structural
/// properties `spec.md` lists as mandatory, so in practice this is never
/// constructed today.
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

/// Reserved for future hard validation failures.
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[non_exhaustive]
pub enum ErrorKind {}

/// A soft finding: the rule is still registered, but the author should see
/// this.
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("{kind}")]
pub struct Warning {
    kind: WarningKind,
    span: Span,
}

impl Warning {
    /// The kind of this warning.
    #[must_use]
    pub fn kind(&self) -> &WarningKind {
        &self.kind
    }

    /// The span this warning refers to.
    #[must_use]
    pub fn span(&self) -> Span {
        self.span
    }
}

/// The specific condition that triggered a [`Warning`], each grounded on
/// one of the structural checks `spec.md` §4.2 enumerates.
#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum WarningKind {
    /// "Operation names must be at least three characters and contain a
    /// dot (warning otherwise: 'unconventional name')."
    #[error("'{0}' is an unconventional operation name (expected at least {MIN_CONVENTIONAL_NAME_LEN} characters and a dot)")]
    UnconventionalName(String),
    /// "Exact equality on high-cardinality numeric attributes emits a
    /// 'fragile' warning."
    #[error("exact equality on numeric attribute '{0}' is fragile; consider a range comparison")]
    FragileNumericEquality(String),
    /// "`count(op) > N` with N > 1000 emits a performance warning."
    #[error("count({0}) compares against {1}, which may scan an impractically large span set")]
    ExpensiveCountThreshold(String, i64),
    /// "`Or` at the top level emits a readability warning."
    #[error("top-level 'or' in {0} reduces readability; consider restructuring into separate rules")]
    TopLevelOr(&'static str),
}

/// Walks a parsed rule once, collecting errors and warnings.
pub struct Validator<'t> {
    text: &'t str,
    errors: Vec<Error>,
    warnings: Vec<Warning>,
}

impl<'t> Validator<'t> {
    /// Creates a validator over the rule's original source text (used to
    /// render caret-annotated errors).
    #[must_use]
    pub fn new(text: &'t str) -> Self {
        Self { text, errors: Vec::new(), warnings: Vec::new() }
    }

    /// Runs every static check over `rule`, returning the accumulated
    /// errors and warnings.
    ///
    /// A non-empty `errors` means the rule must not be registered.
    pub fn analyze(mut self, rule: &RuleAst) -> (Vec<Error>, Vec<Warning>) {
        let _ = self.visit_rule(rule);
        (self.errors, self.warnings)
    }

    #[allow(dead_code)]
    fn error(&self, span: Span, kind: ErrorKind) -> Error {
        Error { kind, text: self.text.to_string(), span }
    }

    fn warn(&mut self, span: Span, kind: WarningKind) {
        self.warnings.push(Warning { kind, span });
    }

    fn check_operation_name(&mut self, name: &str, span: Span) {
        if name.len() < MIN_CONVENTIONAL_NAME_LEN || !name.contains('.') {
            self.warn(span, WarningKind::UnconventionalName(name.to_string()));
        }
    }
}

impl Visitor for Validator<'_> {
    type Output = ();
    type Error = ();

    fn visit_rule(&mut self, rule: &RuleAst) -> std::result::Result<Self::Output, Self::Error> {
        if matches!(rule.when, Expr::Or(..)) {
            self.warn(rule.when.span(), WarningKind::TopLevelOr("the 'when' clause"));
        }
        if matches!(rule.obligation.expr(), Expr::Or(..)) {
            self.warn(rule.obligation.expr().span(), WarningKind::TopLevelOr("the obligation clause"));
        }

        let _ = self.visit_expr(&rule.when);
        let _ = self.visit_obligation(&rule.obligation);
        Ok(())
    }

    fn visit_obligation(&mut self, obligation: &Obligation) -> std::result::Result<Self::Output, Self::Error> {
        self.visit_expr(obligation.expr())
    }

    fn visit_expr(&mut self, expr: &Expr) -> std::result::Result<Self::Output, Self::Error> {
        match expr {
            Expr::Predicate { operation, span } => {
                self.check_operation_name(operation, *span);
            }
            Expr::Where { inner, condition, .. } => {
                let _ = self.visit_expr(inner);
                let _ = self.visit_condition(condition);
            }
            Expr::Count { operation, op, rhs, span } => {
                self.check_operation_name(operation, *span);
                if let CountOperand::Literal(n) = rhs {
                    if *n > COUNT_PERFORMANCE_THRESHOLD {
                        self.warn(*span, WarningKind::ExpensiveCountThreshold(operation.clone(), *n));
                    }
                }
                if let CountOperand::Operation(other) = rhs {
                    self.check_operation_name(other, *span);
                }
                let _ = op;
            }
            Expr::Not(inner, _) => {
                let _ = self.visit_expr(inner);
            }
            Expr::And(lhs, rhs, _) | Expr::Or(lhs, rhs, _) => {
                let _ = self.visit_expr(lhs);
                let _ = self.visit_expr(rhs);
            }
        }
        Ok(())
    }

    fn visit_condition(&mut self, condition: &crate::ast::Condition) -> std::result::Result<Self::Output, Self::Error> {
        if condition.op == CondOp::Rel(RelOp::Eq) && matches!(condition.value, Value::Number(_)) {
            self.warn(condition.span, WarningKind::FragileNumericEquality(condition.attr_path.clone()));
        }
        Ok(())
    }
}
