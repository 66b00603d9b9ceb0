//! A compiled rule: parsed AST plus its pre-computed operation-name index.
//!
//! `spec.md` §3 calls this out as a rule's "derived" data: "compiled AST
//! plus a pre-computed set of operation-name prefixes it examines (used for
//! dispatch)." Computing [`RuleAst::operation_names`] once per compile and
//! reusing it to skip rules whose names don't intersect a trace's
//! operations is a performance optimization, but it is *not* semantically
//! free: a rule can be true, and an obligation can fail, purely because an
//! operation is *absent* (`not op`, `count(op) < n`, `count(a) == count(b)`
//! when both are absent). For such a rule, skipping the interpreter just
//! because none of its operation names appear in the trace would silently
//! drop a real violation. [`CompiledRule::new`] precomputes whether a rule
//! can ever be satisfied this way; [`CompiledRule::intersects`] only gates
//! dispatch for rules where it can't.

use std::cmp::Ordering;
use std::collections::HashSet;

use betrace_syntax::{CountOperand, Expr, RelOp, RuleAst};

/// A rule whose text has already been parsed, with its dispatch index
/// pre-computed so the evaluator doesn't re-derive it on every trace.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    /// The parsed, validated rule.
    pub ast: RuleAst,
    /// Every distinct operation name this rule's `when`/obligation
    /// reference, sorted and deduplicated.
    pub operation_names: Vec<String>,
    /// `false` if any node in this rule could be true (or an obligation
    /// could fail) with every referenced operation absent from the trace --
    /// in that case [`Self::intersects`] must not be used to skip the
    /// interpreter.
    dispatch_safe: bool,
}

impl CompiledRule {
    /// Compiles `ast`, precomputing its dispatch index.
    #[must_use]
    pub fn new(ast: RuleAst) -> Self {
        let operation_names = ast.operation_names();
        let dispatch_safe = expr_is_dispatch_safe(&ast.when) && expr_is_dispatch_safe(ast.obligation.expr());
        Self { ast, operation_names, dispatch_safe }
    }

    /// True if the interpreter might need to run against this trace: either
    /// this rule references at least one operation name present in
    /// `trace_operations`, or the rule contains a node (`not`, or a
    /// zero-satisfiable `count`/count-to-count comparison) that can be true
    /// purely from absence, in which case dispatch can never safely skip it.
    #[must_use]
    pub fn intersects(&self, trace_operations: &HashSet<&str>) -> bool {
        !self.dispatch_safe || self.operation_names.iter().any(|name| trace_operations.contains(name.as_str()))
    }
}

/// True iff `expr` can only ever be satisfied by the *presence* of spans --
/// i.e. every operation name it mentions must be present in the trace for
/// the node to have any chance of being true. `Not` flips that (its operand
/// being false, e.g. because a referenced operation is absent, makes `Not`
/// true), and a `count`/count-to-count comparison satisfiable at zero counts
/// has the same effect, so both make a rule unsafe to skip on absence.
fn expr_is_dispatch_safe(expr: &Expr) -> bool {
    match expr {
        Expr::Predicate { .. } | Expr::Where { .. } => true,
        Expr::Count { op, rhs, .. } => !zero_satisfiable(*op, rhs),
        Expr::Not(..) => false,
        Expr::And(l, r, _) | Expr::Or(l, r, _) => expr_is_dispatch_safe(l) && expr_is_dispatch_safe(r),
    }
}

/// True iff `op` applied to two absent (zero) counts would hold: a literal
/// rhs is checked against `0`, and an operation rhs is checked against
/// equality, since both operands would independently be `0` if both of
/// their operations are absent from the trace.
fn zero_satisfiable(op: RelOp, rhs: &CountOperand) -> bool {
    match rhs {
        CountOperand::Literal(n) => op.apply_ordering(0_i64.cmp(n)),
        CountOperand::Operation(_) => op.apply_ordering(Ordering::Equal),
    }
}
