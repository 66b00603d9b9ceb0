//! The resource-bounded tree-walking evaluator (C3).
//!
//! Grounded on the recursive, one-match-arm-per-node-kind traversal style
//! `betrace_syntax`'s own `parser`/`semantics`/`printer` modules use over
//! the same [`Expr`] tree (itself grounded on the teacher's recursive
//! `Visitor` dispatch) -- this module generalizes that shape from "produce
//! an AST" / "produce warnings" to "produce a boolean," adding the
//! depth-guarded recursion and per-operation span-set cache `spec.md` §4.3
//! requires.

use std::collections::HashMap;

use betrace_core::trace::Span;
use betrace_syntax::{CondOp, Condition, CountOperand, Expr, Obligation, RuleAst, Value};

use crate::{
    context::{DepthGuard, DEFAULT_MAX_DEPTH},
    dispatch::CompiledRule,
    error::InterpError,
};

/// Per-evaluation cache of `S(op)` span-set indices, keyed by operation
/// name. `spec.md` §4.3: "materialized lazily and cached within a single
/// evaluation to make chained `Where` clauses O(|S(op)|) rather than
/// O(|spans|)."
type SpanSetCache = HashMap<String, Vec<usize>>;

/// Evaluates rule ASTs against a trace's span list, honoring the per-thread
/// depth cap described in `spec.md` §4.3/§5.
#[derive(Debug, Clone, Copy)]
pub struct Interpreter {
    max_depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl Interpreter {
    /// Creates an interpreter with a custom depth cap (`spec.md` §4.3:
    /// "configurable maximum, default 128").
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Evaluates a standalone boolean expression against `spans`.
    ///
    /// # Errors
    /// [`InterpError::ResourceLimitExceeded`] if traversal exceeds the
    /// configured depth cap.
    pub fn evaluate_expr(&self, expr: &Expr, spans: &[Span]) -> Result<bool, InterpError> {
        let mut cache = SpanSetCache::new();
        self.eval_expr(expr, spans, &mut cache)
    }

    /// Evaluates `rule` against `spans`, returning `true` iff the rule is
    /// *violated*: `spec.md` §4.3's `Rule(when, Always(expr))` (violation
    /// iff `when` holds and `expr` doesn't) and `Rule(when, Never(expr))`
    /// (violation iff `when` holds and `expr` does).
    ///
    /// `when` is evaluated first and short-circuits: if it's false the
    /// obligation is never checked and this returns `Ok(false)`.
    ///
    /// # Errors
    /// Propagates [`InterpError`] from either sub-expression.
    pub fn evaluate(&self, rule: &RuleAst, spans: &[Span]) -> Result<bool, InterpError> {
        let mut cache = SpanSetCache::new();
        if !self.eval_expr(&rule.when, spans, &mut cache)? {
            return Ok(false);
        }
        let obligation_holds = self.eval_expr(rule.obligation.expr(), spans, &mut cache)?;
        Ok(match rule.obligation {
            Obligation::Always(_) => !obligation_holds,
            Obligation::Never(_) => obligation_holds,
        })
    }

    /// Evaluates every rule in `rules` independently against the same
    /// `spans`, returning one result per rule in input order.
    ///
    /// `spec.md` §4.5's failure policy ("a single rule failing ... does not
    /// abort evaluation of other rules") falls out of the return type: a
    /// failing rule's slot is `Err`, every other slot is unaffected.
    #[must_use]
    pub fn evaluate_rules(&self, rules: &[CompiledRule], spans: &[Span]) -> Vec<Result<bool, InterpError>> {
        rules.iter().map(|rule| self.evaluate(&rule.ast, spans)).collect()
    }

    fn eval_expr(&self, expr: &Expr, spans: &[Span], cache: &mut SpanSetCache) -> Result<bool, InterpError> {
        match expr {
            Expr::Predicate { .. } | Expr::Where { .. } => {
                Ok(!self.resolve_indices(expr, spans, cache)?.is_empty())
            }
            Expr::Count { operation, op, rhs, .. } => {
                let _guard = DepthGuard::enter(self.max_depth)?;
                let lhs = self.span_set(operation, spans, cache).len() as i64;
                let rhs = match rhs {
                    CountOperand::Literal(n) => *n,
                    CountOperand::Operation(other) => self.span_set(other, spans, cache).len() as i64,
                };
                Ok(op.apply_ordering(lhs.cmp(&rhs)))
            }
            Expr::And(l, r, _) => {
                let _guard = DepthGuard::enter(self.max_depth)?;
                Ok(self.eval_expr(l, spans, cache)? && self.eval_expr(r, spans, cache)?)
            }
            Expr::Or(l, r, _) => {
                let _guard = DepthGuard::enter(self.max_depth)?;
                Ok(self.eval_expr(l, spans, cache)? || self.eval_expr(r, spans, cache)?)
            }
            Expr::Not(inner, _) => {
                let _guard = DepthGuard::enter(self.max_depth)?;
                Ok(!self.eval_expr(inner, spans, cache)?)
            }
        }
    }

    /// Resolves the span-set indices a `Predicate` or `Where` node denotes.
    /// Chained `Where`s intersect by recursing into `inner` first and then
    /// filtering, which is exactly implicit AND over restrictions.
    fn resolve_indices(&self, expr: &Expr, spans: &[Span], cache: &mut SpanSetCache) -> Result<Vec<usize>, InterpError> {
        let _guard = DepthGuard::enter(self.max_depth)?;
        match expr {
            Expr::Predicate { operation, .. } => Ok(self.span_set(operation, spans, cache).to_vec()),
            Expr::Where { inner, condition, .. } => {
                let base = self.resolve_indices(inner, spans, cache)?;
                Ok(base.into_iter().filter(|&i| condition_matches(condition, &spans[i])).collect())
            }
            other => Err(InterpError::EvaluationError(format!(
                "resolve_indices called on a node with no span set: {other:?}"
            ))),
        }
    }

    /// Returns (computing and caching on first use) the indices of `spans`
    /// whose operation equals `operation`, preserving input order.
    fn span_set<'c>(&self, operation: &str, spans: &[Span], cache: &'c mut SpanSetCache) -> &'c [usize] {
        cache
            .entry(operation.to_string())
            .or_insert_with(|| {
                spans
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.operation == operation)
                    .map(|(i, _)| i)
                    .collect()
            })
            .as_slice()
    }
}

/// Evaluates a single attribute condition against one span.
///
/// `spec.md` §4.3: attribute lookup resolves the two reserved pseudo-names
/// via [`Span::attribute`]; a miss is `false`, not an error. Both operands
/// are compared numerically if they both parse as canonical numbers,
/// otherwise as canonical strings; `contains` is always string substring
/// containment.
fn condition_matches(condition: &Condition, span: &Span) -> bool {
    let Some(attr) = span.attribute(&condition.attr_path) else { return false };
    match condition.op {
        CondOp::Contains => attr.canonical_string().contains(&condition.value.canonical_string()),
        CondOp::Rel(relop) => match (attr.as_canonical_number(), as_canonical_number(&condition.value)) {
            (Some(a), Some(b)) => relop.apply_f64(a, b),
            _ => relop.apply_ordering(attr.canonical_string().cmp(&condition.value.canonical_string())),
        },
    }
}

fn as_canonical_number(value: &Value) -> Option<f64> {
    value.as_canonical_number()
}

#[cfg(test)]
mod tests {
    use betrace_core::{tenant::TenantId, trace::Span as TraceSpan};
    use betrace_syntax::compile;
    use chrono::{DateTime, Utc};
    use pretty_assertions::assert_eq;

    use super::*;

    fn tenant() -> TenantId {
        TenantId::new("acme")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn span(operation: &str) -> TraceSpan {
        TraceSpan::new("t1", operation, operation, "svc", at(0), at(1), tenant()).unwrap()
    }

    fn rule(src: &str) -> RuleAst {
        compile(src).unwrap().0
    }

    #[test]
    fn predicate_true_iff_span_set_nonempty() {
        let interp = Interpreter::default();
        let rule = rule("when { payment.charge } always { payment.receipt }");
        assert!(!interp.evaluate(&rule, &[]).unwrap());
        assert!(interp.evaluate(&rule, &[span("payment.charge")]).unwrap());
    }

    #[test]
    fn s1_payment_fraud_rule() {
        let interp = Interpreter::default();
        let rule = rule("when { payment.charge_card.where(amount > 1000) } always { payment.fraud_check }");

        let trace_a = vec![
            span("payment.charge_card").with_attribute("amount", 5000_i64),
            span("payment.fraud_check"),
        ];
        assert!(!interp.evaluate(&rule, &trace_a).unwrap(), "trace A: no violation");

        let trace_b = vec![span("payment.charge_card").with_attribute("amount", 5000_i64)];
        assert!(interp.evaluate(&rule, &trace_b).unwrap(), "trace B: violation");

        let trace_c = vec![span("payment.charge_card").with_attribute("amount", 500_i64)];
        assert!(!interp.evaluate(&rule, &trace_c).unwrap(), "trace C: amount below threshold, no match");
    }

    #[test]
    fn s2_agent_approval_never_rule() {
        let interp = Interpreter::default();
        let rule = rule(
            "when { agent.tool_use.where(tool_requires_approval == true) } never { human.approval_granted }",
        );

        let unapproved = vec![span("agent.tool_use").with_attribute("tool_requires_approval", true)];
        assert!(interp.evaluate(&rule, &unapproved).unwrap());

        let approved = vec![
            span("agent.tool_use").with_attribute("tool_requires_approval", true),
            span("human.approval_granted"),
        ];
        assert!(!interp.evaluate(&rule, &approved).unwrap());
    }

    #[test]
    fn s3_count_mismatch() {
        let interp = Interpreter::default();
        let rule = rule("when { count(http.request) != count(http.response) } always { alert }");

        let mismatched =
            vec![span("http.request"), span("http.request"), span("http.request"), span("http.response"), span("http.response")];
        assert!(interp.evaluate(&rule, &mismatched).unwrap());

        let matched = vec![
            span("http.request"),
            span("http.request"),
            span("http.request"),
            span("http.response"),
            span("http.response"),
            span("http.response"),
        ];
        assert!(!interp.evaluate(&rule, &matched).unwrap());
    }

    #[test]
    fn s4_chained_where() {
        let interp = Interpreter::default();
        let rule = rule(
            r#"when { payment.where(amount > 1000).where(currency == "USD") } always { extra_verification }"#,
        );

        let matching = vec![span("payment").with_attribute("amount", 5000_i64).with_attribute("currency", "USD")];
        assert!(interp.evaluate(&rule, &matching).unwrap());

        let wrong_currency = vec![span("payment").with_attribute("amount", 5000_i64).with_attribute("currency", "EUR")];
        assert!(!interp.evaluate(&rule, &wrong_currency).unwrap());
    }

    #[test]
    fn missing_attribute_is_false_not_error() {
        let interp = Interpreter::default();
        let rule = rule("when { payment.where(amount > 1000) } always { payment.receipt }");
        let trace = vec![span("payment")];
        assert!(!interp.evaluate(&rule, &trace).unwrap());
    }

    #[test]
    fn numeric_string_attribute_compares_numerically() {
        let interp = Interpreter::default();
        let rule = rule("when { payment.where(amount > 1000) } always { payment.receipt }");
        let trace = vec![span("payment").with_attribute("amount", "5000")];
        assert!(interp.evaluate(&rule, &trace).unwrap());
    }

    #[test]
    fn depth_limit_is_never_satisfied_by_a_boolean() {
        let interp = Interpreter::new(2);
        let rule = rule("when { a } always { not (not (not b)) }");
        let err = interp.evaluate(&rule, &[]).unwrap_err();
        assert!(matches!(err, InterpError::ResourceLimitExceeded { .. }));
    }

    #[test]
    fn or_short_circuits_and_never_touches_the_right_operand() {
        // "a or not (not b)": the right branch is 3 levels deeper than the
        // left. A depth cap of 2 comfortably covers evaluating just the
        // left predicate but would trip `ResourceLimitExceeded` if the
        // right branch were evaluated too -- so this only passes if `or`
        // actually short-circuits on a true left operand.
        let capped = Interpreter::new(2);
        let rule = rule("when { a } always { a or not (not b) }");
        assert!(capped.evaluate(&rule, &[span("a")]).unwrap());
    }

    #[test]
    fn and_short_circuits_and_never_touches_the_right_operand() {
        let capped = Interpreter::new(2);
        let rule = rule("when { a } always { b and not (not c) }");
        assert!(!capped.evaluate(&rule, &[span("a")]).unwrap());
    }
}
