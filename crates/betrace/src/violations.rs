//! `betrace violations ...`: the Violation service of `spec.md` §6 --
//! `get`, `query`, and `verify` (`Store` is never a direct CLI command;
//! violations are only ever produced by `betrace evaluate`).

use betrace_store::QueryFilter;
use clap::Subcommand;
use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::rules::SeverityArg;

/// `betrace violations <action>`.
#[derive(Debug, Clone, Subcommand, Serialize, Deserialize)]
pub enum ViolationsAction {
    /// Print a single violation.
    Get(Get),
    /// List violations, optionally filtered by rule id and/or severity.
    Query(Query),
    /// Recompute a violation's signature and report whether it matches.
    Verify(Verify),
}

/// `betrace violations get`.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct Get {
    /// The id of the violation to print.
    #[arg(long)]
    pub id: String,
}

/// `betrace violations query`.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct Query {
    /// Restrict to violations produced by this rule.
    #[arg(long)]
    pub rule_id: Option<String>,
    /// Restrict to violations at this severity.
    #[arg(long, value_enum)]
    pub severity: Option<SeverityArg>,
    /// Cap the number of records returned; `0` means no cap.
    #[arg(long, default_value_t = 0)]
    pub limit: usize,
}

/// `betrace violations verify`.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct Verify {
    /// The id of the violation to verify.
    #[arg(long)]
    pub id: String,
}

/// Dispatches a `betrace violations <action>` invocation.
pub fn run(action: &ViolationsAction, config: &EngineConfig) -> anyhow::Result<()> {
    let store = config.violation_store()?;
    let keyring = config.keyring();
    match action {
        ViolationsAction::Get(cmd) => {
            let violation = store
                .get(&cmd.id)
                .ok_or_else(|| anyhow::anyhow!("violation {:?} not found", cmd.id))?;
            println!("{}", serde_json::to_string_pretty(&violation)?);
        }
        ViolationsAction::Query(cmd) => {
            let filter = QueryFilter {
                rule_id: cmd.rule_id.clone(),
                severity: cmd.severity.map(Into::into),
                limit: cmd.limit,
            };
            let violations = store.query(&filter);
            println!("{}", serde_json::to_string_pretty(&violations)?);
        }
        ViolationsAction::Verify(cmd) => {
            if store.verify(&cmd.id, keyring.as_ref()) {
                println!("{}: violation {:?} is authentic", "success".green(), cmd.id);
            } else {
                println!("{}: violation {:?} failed verification", "error".red(), cmd.id);
                anyhow::bail!("verification failed for {:?}", cmd.id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use betrace_core::TenantId;
    use betrace_store::{Severity, Violation};

    use super::*;

    fn config(dir: &std::path::Path) -> EngineConfig {
        EngineConfig {
            data_dir: dir.to_path_buf(),
            tenant: TenantId::new("acme"),
            signing_key: "s3cr3t".into(),
            max_depth: betrace_interp::DEFAULT_MAX_DEPTH,
        }
    }

    fn store_one(cfg: &EngineConfig, id: &str, rule_id: &str, severity: Severity) {
        let violation = Violation {
            id: id.into(),
            rule_id: rule_id.into(),
            rule_name: "sample".into(),
            severity,
            tenant_id: cfg.tenant.clone(),
            trace_id: "t1".into(),
            created_at: chrono::Utc::now(),
            message: "obligation not satisfied".into(),
            attributes: std::collections::BTreeMap::new(),
            signature: String::new(),
        };
        cfg.violation_store().unwrap().store(violation, cfg.keyring().as_ref()).unwrap();
    }

    #[test]
    fn verify_succeeds_for_a_signed_violation() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        store_one(&cfg, "v1", "r1", Severity::High);
        run(&ViolationsAction::Verify(Verify { id: "v1".into() }), &cfg).unwrap();
    }

    #[test]
    fn verify_fails_for_an_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let err = run(&ViolationsAction::Verify(Verify { id: "missing".into() }), &cfg);
        assert!(err.is_err());
    }

    #[test]
    fn query_filters_by_rule_id() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        store_one(&cfg, "v1", "r1", Severity::High);
        store_one(&cfg, "v2", "r2", Severity::High);
        run(
            &ViolationsAction::Query(Query { rule_id: Some("r1".into()), severity: None, limit: 0 }),
            &cfg,
        )
        .unwrap();
        let matching = cfg
            .violation_store()
            .unwrap()
            .query(&QueryFilter { rule_id: Some("r1".into()), ..Default::default() });
        assert_eq!(matching.len(), 1);
    }
}
