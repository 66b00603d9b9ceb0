//! The Evaluator: drives rule evaluation for a single completed trace.
//!
//! `spec.md` §4.5. Grounded on the teacher's `Checker::check(ctx: &Context)
//! -> Vec<Violation>` shape (`crates/foundry/src/check/rules/mod.rs`): a
//! pure function over an immutable context producing a list of violations,
//! generalized here to loop over every enabled rule in a compiled snapshot
//! instead of a fixed set of structural checks.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use betrace_core::Trace;
use betrace_interp::Interpreter;
use betrace_store::{CompiledRuleSnapshot, Filesystem, RuleStore, SigningKeyring, Violation, ViolationStore};
use betrace_syntax::Obligation;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::error::{EvalError, Result};

/// Orchestrates the Rule Store, the Interpreter, and the Violation Store
/// against a single trace.
pub struct Evaluator<F: Filesystem> {
    rule_store: Arc<RuleStore<F>>,
    violation_store: Arc<ViolationStore<F>>,
    keyring: Arc<dyn SigningKeyring>,
    interpreter: Interpreter,
}

impl<F: Filesystem> Evaluator<F> {
    /// Builds an evaluator over the given stores and signing keyring, using
    /// the interpreter's default depth cap.
    #[must_use]
    pub fn new(
        rule_store: Arc<RuleStore<F>>,
        violation_store: Arc<ViolationStore<F>>,
        keyring: Arc<dyn SigningKeyring>,
    ) -> Self {
        Self { rule_store, violation_store, keyring, interpreter: Interpreter::default() }
    }

    /// Overrides the interpreter's depth cap, builder-style.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.interpreter = Interpreter::new(max_depth);
        self
    }

    /// Evaluates every enabled rule against `trace`, storing a
    /// [`Violation`] for each match and returning the ids of the rules
    /// that produced one, in rule-registration order.
    ///
    /// Steps, per `spec.md` §4.5: (1) obtain the current compiled-rule
    /// snapshot; (2) defensively copy the span list (TOCTOU guard); (3)
    /// for each enabled rule, call the interpreter; (4) for each
    /// violation, construct a record and hand it to the Violation Store.
    ///
    /// # Errors
    /// Returns [`EvalError::Cancelled`] if `cancellation` is already
    /// cancelled before any rule has run, or [`EvalError::Store`] if a
    /// Violation Store write fails. A single rule failing with
    /// `ResourceLimitExceeded` or `EvaluationError` never reaches this
    /// return: it's logged and recorded against that rule only, per
    /// `spec.md` §4.5's failure policy.
    pub fn evaluate_trace(
        &self,
        trace: &Trace,
        cancellation: &CancellationToken,
    ) -> Result<Vec<String>> {
        if cancellation.is_cancelled() {
            return Err(EvalError::Cancelled);
        }

        let snapshot = self.rule_store.compiled_snapshot();
        let spans = trace.snapshot();
        let trace_operations: HashSet<&str> = spans.iter().map(|s| s.operation.as_str()).collect();

        let mut violated_rule_ids = Vec::new();
        for snap in &snapshot {
            if snap.compiled.intersects(&trace_operations) {
                match self.interpreter.evaluate(&snap.compiled.ast, &spans) {
                    Ok(true) => {
                        let violation = build_violation(snap, trace.trace_id());
                        self.violation_store.store(violation, self.keyring.as_ref())?;
                        info!(rule_id = %snap.rule.id, trace_id = trace.trace_id(), "rule violated");
                        violated_rule_ids.push(snap.rule.id.clone());
                    }
                    Ok(false) => {}
                    Err(err) => {
                        warn!(
                            rule_id = %snap.rule.id,
                            error = %err,
                            "rule evaluation failed; recorded against this rule only"
                        );
                    }
                }
            }

            if cancellation.is_cancelled() {
                break;
            }
        }
        Ok(violated_rule_ids)
    }
}

fn build_violation(snap: &CompiledRuleSnapshot, trace_id: &str) -> Violation {
    let message = match &snap.compiled.ast.obligation {
        Obligation::Always(_) => format!(
            "rule \"{}\": the when condition matched but the always obligation did not hold",
            snap.rule.name
        ),
        Obligation::Never(_) => format!(
            "rule \"{}\": the when condition matched and the never obligation also matched",
            snap.rule.name
        ),
    };
    Violation {
        id: Uuid::new_v4().to_string(),
        rule_id: snap.rule.id.clone(),
        rule_name: snap.rule.name.clone(),
        severity: snap.rule.severity,
        tenant_id: snap.rule.tenant_id.clone(),
        trace_id: trace_id.to_owned(),
        created_at: Utc::now(),
        message,
        attributes: BTreeMap::new(),
        signature: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use betrace_core::{AttributeValue, Span, TenantId};
    use betrace_store::{InMemoryFilesystem, Rule, Severity, StaticKeyring};

    fn tenant() -> TenantId {
        TenantId::new("acme")
    }

    fn at(secs: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::<chrono::Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn span(trace_id: &str, id: &str, offset: i64, operation: &str) -> Span {
        Span::new(trace_id, id, operation, "svc", at(offset), at(offset), tenant()).unwrap()
    }

    fn rule_record(id: &str, source: &str) -> Rule {
        let now = Utc::now();
        Rule {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            severity: Severity::High,
            enabled: true,
            tenant_id: tenant(),
            tags: Vec::new(),
            version: 0,
            registration_seq: 0,
            created_at: now,
            updated_at: now,
            source: source.into(),
        }
    }

    fn evaluator(
        rules: &[(&str, &str)],
    ) -> Evaluator<InMemoryFilesystem> {
        let rule_store = Arc::new(RuleStore::open("/data/rules", InMemoryFilesystem::new()).unwrap());
        for (id, source) in rules {
            rule_store.create(rule_record(id, source)).unwrap();
        }
        let violation_store =
            Arc::new(ViolationStore::open("/data/violations", InMemoryFilesystem::new()).unwrap());
        let keyring: Arc<dyn SigningKeyring> =
            Arc::new(StaticKeyring::new().with_secret(tenant(), b"s3cr3t".to_vec()));
        Evaluator::new(rule_store, violation_store, keyring)
    }

    #[test]
    fn s1_payment_fraud_rule_violates_only_when_fraud_check_is_absent() {
        let eval = evaluator(&[(
            "payment-fraud",
            "when { payment.charge_card.where(amount > 1000) } always { payment.fraud_check }",
        )]);

        let no_violation = Trace::new(vec![
            span("t1", "s1", 0, "payment.charge_card")
                .with_attribute("amount", AttributeValue::Int(5000)),
            span("t1", "s2", 1, "payment.fraud_check"),
        ])
        .unwrap();
        assert!(eval.evaluate_trace(&no_violation, &CancellationToken::new()).unwrap().is_empty());

        let violation = Trace::new(vec![span("t2", "s1", 0, "payment.charge_card")
            .with_attribute("amount", AttributeValue::Int(5000))])
        .unwrap();
        let violated = eval.evaluate_trace(&violation, &CancellationToken::new()).unwrap();
        assert_eq!(violated, vec!["payment-fraud"]);
    }

    #[test]
    fn a_violation_is_durably_stored_and_verifiable() {
        let rule_store = Arc::new(RuleStore::open("/data/rules", InMemoryFilesystem::new()).unwrap());
        rule_store
            .create(rule_record(
                "payment-fraud",
                "when { payment.charge_card.where(amount > 1000) } always { payment.fraud_check }",
            ))
            .unwrap();
        let violation_store =
            Arc::new(ViolationStore::open("/data/violations", InMemoryFilesystem::new()).unwrap());
        let keyring: Arc<dyn SigningKeyring> =
            Arc::new(StaticKeyring::new().with_secret(tenant(), b"s3cr3t".to_vec()));
        let eval = Evaluator::new(rule_store, violation_store.clone(), keyring.clone());

        let trace = Trace::new(vec![span("t1", "s1", 0, "payment.charge_card")
            .with_attribute("amount", AttributeValue::Int(5000))])
        .unwrap();
        eval.evaluate_trace(&trace, &CancellationToken::new()).unwrap();

        let stored = violation_store.query(&betrace_store::QueryFilter::default());
        assert_eq!(stored.len(), 1);
        assert!(violation_store.verify(&stored[0].id, keyring.as_ref()));
    }

    #[test]
    fn rules_whose_operations_never_appear_in_the_trace_are_skipped_without_error() {
        let eval = evaluator(&[("unrelated", "when { http.request } always { http.response }")]);
        let trace = Trace::new(vec![span("t1", "s1", 0, "payment.charge_card")]).unwrap();
        assert!(eval.evaluate_trace(&trace, &CancellationToken::new()).unwrap().is_empty());
    }

    #[test]
    fn a_rule_that_exceeds_the_depth_cap_does_not_block_other_rules() {
        let rule_store = Arc::new(RuleStore::open("/data/rules", InMemoryFilesystem::new()).unwrap());
        rule_store.create(rule_record("deep", "when { a } always { not (not (not b)) }")).unwrap();
        rule_store.create(rule_record("shallow", "when { a } always { a }")).unwrap();
        let violation_store =
            Arc::new(ViolationStore::open("/data/violations", InMemoryFilesystem::new()).unwrap());
        let keyring: Arc<dyn SigningKeyring> =
            Arc::new(StaticKeyring::new().with_secret(tenant(), b"s3cr3t".to_vec()));
        let eval = Evaluator::new(rule_store, violation_store, keyring).with_max_depth(2);

        let trace = Trace::new(vec![span("t1", "s1", 0, "a")]).unwrap();
        // "deep"'s obligation exceeds depth 2 and is skipped with a warning;
        // "shallow"'s `when`/obligation both hold, so it produces no violation.
        let violated = eval.evaluate_trace(&trace, &CancellationToken::new()).unwrap();
        assert!(violated.is_empty());
    }

    #[test]
    fn cancellation_stops_remaining_rules_but_keeps_already_found_violations() {
        let eval = evaluator(&[
            ("r1", "when { a } always { b }"),
            ("r2", "when { a } always { b }"),
        ]);
        let trace = Trace::new(vec![span("t1", "s1", 0, "a")]).unwrap();

        let cancellation = CancellationToken::new();
        cancellation.cancel();
        // already cancelled before any rule runs -> Cancelled, no partial work
        assert!(matches!(
            eval.evaluate_trace(&trace, &cancellation),
            Err(EvalError::Cancelled)
        ));
    }
}
