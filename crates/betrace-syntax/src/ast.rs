//! The typed abstract syntax the parser produces and the interpreter
//! consumes.
//!
//! `spec.md` §3 describes the AST as a tagged tree with a closed set of
//! node variants (`Predicate`, `Where`, `Count`/`CountCompare`, `And`,
//! `Or`, `Not`, and the top-level `Rule`). This module expresses that as a
//! discriminated sum (`Expr`) following the teacher's `Ast` enum shape in
//! `bulloak_syntax::ast` -- one variant per grammar production, each
//! wrapping a struct that carries the node's own span.

use betrace_core::LexSpan as Span;

/// A relational operator, shared by attribute conditions and count
/// comparisons where applicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl RelOp {
    /// Evaluates this operator over an already-computed ordering result.
    #[must_use]
    pub fn apply_ordering(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match (self, ordering) {
            (RelOp::Eq, Equal) | (RelOp::Le, Equal | Less) | (RelOp::Ge, Equal | Greater) => true,
            (RelOp::Ne, Less | Greater) => true,
            (RelOp::Lt, Less) | (RelOp::Gt, Greater) => true,
            _ => false,
        }
    }

    /// Evaluates this operator over two `f64` operands.
    #[must_use]
    pub fn apply_f64(self, lhs: f64, rhs: f64) -> bool {
        match lhs.partial_cmp(&rhs) {
            Some(ordering) => self.apply_ordering(ordering),
            // NaN: only `!=` is meaningfully true.
            None => matches!(self, RelOp::Ne),
        }
    }
}

/// The comparison operator used in an attribute condition; a superset of
/// [`RelOp`] that also allows substring containment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondOp {
    /// One of the six relational operators.
    Rel(RelOp),
    /// `contains`: substring containment on the canonical string forms.
    Contains,
}

/// The right-hand side of an attribute condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A numeric literal.
    Number(f64),
    /// A boolean literal.
    Bool(bool),
    /// A bare identifier, treated as a string (`spec.md` §3).
    Ident(String),
    /// A quoted string literal.
    Str(String),
}

impl Value {
    /// Returns this value as a canonical string, the same conversion the
    /// interpreter applies to span attribute values.
    #[must_use]
    pub fn canonical_string(&self) -> String {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    format!("{n:.0}")
                } else {
                    n.to_string()
                }
            }
            Value::Bool(b) => b.to_string(),
            Value::Ident(s) | Value::Str(s) => s.clone(),
        }
    }

    /// Returns this value as a canonical number, if it parses as one.
    #[must_use]
    pub fn as_canonical_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(_) => None,
            Value::Ident(s) | Value::Str(s) => betrace_core::attribute::parse_canonical_number(s),
        }
    }
}

/// An attribute condition: `attr_path op value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// The dotted attribute path, or the reserved `operationName`.
    pub attr_path: String,
    /// The comparison operator.
    pub op: CondOp,
    /// The right-hand side.
    pub value: Value,
    /// The span of the whole condition.
    pub span: Span,
}

/// The right-hand operand of a `count(...)` comparison: either an integer
/// literal or another operation's cardinality.
#[derive(Debug, Clone, PartialEq)]
pub enum CountOperand {
    /// A literal integer, e.g. `count(http.request) > 5`.
    Literal(i64),
    /// Another operation's span count, e.g.
    /// `count(http.request) != count(http.response)`.
    Operation(String),
}

/// A boolean-valued expression node.
///
/// This is the `Expr` of `spec.md`'s grammar: `OrExpr`, `AndExpr`,
/// `NotExpr`, and `Primary` all fold into this single recursive type, the
/// same way the teacher's `Ast` enum folds `Condition`/`Action` into one
/// recursive type rather than one type per grammar production.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `spec.md`'s `Predicate(opname)`: true iff the span set for this
    /// operation name is non-empty.
    Predicate {
        /// The dotted operation name.
        operation: String,
        /// The span of this node.
        span: Span,
    },
    /// `spec.md`'s `Where(inner, condition)`: restricts the predicate's
    /// span set by an attribute condition. Chained `.where()` calls nest,
    /// combining with implicit AND.
    Where {
        /// The predicate (or nested `Where`) being filtered.
        inner: Box<Expr>,
        /// The filter condition.
        condition: Condition,
        /// The span of this node.
        span: Span,
    },
    /// `spec.md`'s `Count(opname, op, n)`: cardinality compared against an
    /// integer literal or another operation's cardinality.
    Count {
        /// The operation name whose span count is being compared.
        operation: String,
        /// The comparison operator.
        op: RelOp,
        /// The right-hand operand.
        rhs: CountOperand,
        /// The span of this node.
        span: Span,
    },
    /// Boolean AND, short-circuiting on a false left operand.
    And(Box<Expr>, Box<Expr>, Span),
    /// Boolean OR, short-circuiting on a true left operand.
    Or(Box<Expr>, Box<Expr>, Span),
    /// Boolean negation.
    Not(Box<Expr>, Span),
}

impl Expr {
    /// Returns the span of this node.
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Expr::Predicate { span, .. }
            | Expr::Where { span, .. }
            | Expr::Count { span, .. }
            | Expr::And(_, _, span)
            | Expr::Or(_, _, span)
            | Expr::Not(_, span) => *span,
        }
    }

    /// The maximum depth of this expression tree, counting the root as
    /// depth 1. Used by the interpreter's resource limit (`spec.md` §4.3).
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Expr::Predicate { .. } | Expr::Count { .. } => 1,
            Expr::Where { inner, .. } | Expr::Not(inner, _) => 1 + inner.depth(),
            Expr::And(l, r, _) | Expr::Or(l, r, _) => 1 + l.depth().max(r.depth()),
        }
    }
}

/// The obligation half of a rule: what must hold (or must not hold) when
/// `when` matches.
#[derive(Debug, Clone, PartialEq)]
pub enum Obligation {
    /// The obligation expression must match.
    Always(Expr),
    /// The obligation expression must not match.
    Never(Expr),
}

impl Obligation {
    /// The wrapped obligation expression, regardless of polarity.
    #[must_use]
    pub fn expr(&self) -> &Expr {
        match self {
            Obligation::Always(e) | Obligation::Never(e) => e,
        }
    }
}

/// The top-level AST produced by a successful parse: `when { .. }
/// (always|never) { .. }`.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleAst {
    /// The triggering condition.
    pub when: Expr,
    /// The obligation that must (not) hold when `when` matches.
    pub obligation: Obligation,
    /// The span of the whole rule expression.
    pub span: Span,
}

impl RuleAst {
    /// The maximum depth across both the `when` and obligation
    /// sub-expressions.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.when.depth().max(self.obligation.expr().depth()) + 1
    }

    /// Every distinct operation name this rule's `when` and obligation
    /// reference, used to precompute the dispatch index described in
    /// `spec.md` §3 ("derived: a pre-computed set of operation-name
    /// prefixes it examines").
    #[must_use]
    pub fn operation_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_operation_names(&self.when, &mut names);
        collect_operation_names(self.obligation.expr(), &mut names);
        names.sort();
        names.dedup();
        names
    }
}

fn collect_operation_names(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Predicate { operation, .. } => out.push(operation.clone()),
        Expr::Where { inner, .. } => collect_operation_names(inner, out),
        Expr::Count { operation, rhs, .. } => {
            out.push(operation.clone());
            if let CountOperand::Operation(other) = rhs {
                out.push(other.clone());
            }
        }
        Expr::Not(inner, _) => collect_operation_names(inner, out),
        Expr::And(l, r, _) | Expr::Or(l, r, _) => {
            collect_operation_names(l, out);
            collect_operation_names(r, out);
        }
    }
}
