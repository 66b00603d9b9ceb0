//! `betrace evaluate`: the Evaluation service of `spec.md` §6 --
//! `EvaluateTrace(traceId, spans) -> []ruleId`, one-shot from a JSON file
//! of spans rather than a live ingest pipeline (out of scope for the
//! core).

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use betrace_core::{Span, Trace};
use betrace_eval::{CancellationToken, Evaluator};
use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

/// `betrace evaluate`.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct Evaluate {
    /// A JSON file containing the trace's spans (an array of
    /// [`betrace_core::Span`] records, all sharing a trace id).
    #[arg(long)]
    pub trace: PathBuf,
}

/// Runs `betrace evaluate`: loads the trace, evaluates every enabled rule
/// for the configured tenant against it, and prints the ids of the rules
/// that produced a violation.
///
/// # Errors
/// Propagates a malformed input file, a rule-store/violation-store
/// failure, or [`betrace_eval::EvalError::Cancelled`] (never raised here,
/// since this command never cancels its own token).
pub fn run(cmd: &Evaluate, config: &EngineConfig) -> anyhow::Result<()> {
    let bytes = fs::read(&cmd.trace)?;
    let spans: Vec<Span> = serde_json::from_slice(&bytes)?;
    let trace = Trace::new(spans)?;

    let rule_store = Arc::new(config.rule_store()?);
    let violation_store = Arc::new(config.violation_store()?);
    let evaluator = Evaluator::new(rule_store, violation_store, config.keyring())
        .with_max_depth(config.max_depth);

    let violated = evaluator.evaluate_trace(&trace, &CancellationToken::new())?;
    if violated.is_empty() {
        println!("{}: no rule violations for trace {:?}", "success".green(), trace.trace_id());
    } else {
        println!(
            "{}: {} rule(s) violated for trace {:?}: {}",
            "warn".yellow(),
            violated.len(),
            trace.trace_id(),
            violated.join(", ")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use betrace_core::{AttributeValue, TenantId};
    use betrace_store::Rule;

    use super::*;

    fn config(dir: &std::path::Path) -> EngineConfig {
        EngineConfig {
            data_dir: dir.to_path_buf(),
            tenant: TenantId::new("acme"),
            signing_key: "s3cr3t".into(),
            max_depth: betrace_interp::DEFAULT_MAX_DEPTH,
        }
    }

    fn write_rule(cfg: &EngineConfig, id: &str, source: &str) {
        let now = chrono::Utc::now();
        cfg.rule_store()
            .unwrap()
            .create(Rule {
                id: id.into(),
                name: id.into(),
                description: String::new(),
                severity: betrace_store::Severity::High,
                enabled: true,
                tenant_id: cfg.tenant.clone(),
                tags: Vec::new(),
                version: 0,
                registration_seq: 0,
                created_at: now,
                updated_at: now,
                source: source.into(),
            })
            .unwrap();
    }

    fn at(secs: i64) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::<chrono::Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn evaluate_reads_spans_from_a_json_file_and_reports_a_violation() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        write_rule(
            &cfg,
            "payment-fraud",
            "when { payment.charge_card.where(amount > 1000) } always { payment.fraud_check }",
        );

        let span = Span::new("t1", "s1", "payment.charge_card", "svc", at(0), at(0), cfg.tenant.clone())
            .unwrap()
            .with_attribute("amount", AttributeValue::Int(5000));
        let trace_path = dir.path().join("trace.json");
        fs::write(&trace_path, serde_json::to_vec(&vec![span]).unwrap()).unwrap();

        run(&Evaluate { trace: trace_path }, &cfg).unwrap();

        let stored = cfg.violation_store().unwrap().query(&betrace_store::QueryFilter::default());
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].rule_id, "payment-fraud");
    }

    #[test]
    fn an_unrelated_trace_produces_no_violations() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        write_rule(&cfg, "unrelated", "when { http.request } always { http.response }");

        let span = Span::new("t1", "s1", "payment.charge_card", "svc", at(0), at(0), cfg.tenant.clone())
            .unwrap();
        let trace_path = dir.path().join("trace.json");
        fs::write(&trace_path, serde_json::to_vec(&vec![span]).unwrap()).unwrap();

        run(&Evaluate { trace: trace_path }, &cfg).unwrap();
        let stored = cfg.violation_store().unwrap().query(&betrace_store::QueryFilter::default());
        assert!(stored.is_empty());
    }
}
