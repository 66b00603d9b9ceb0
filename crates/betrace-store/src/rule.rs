//! The persisted rule record and its compiled, dispatch-ready counterpart.

use betrace_core::TenantId;
use betrace_interp::CompiledRule;
use betrace_syntax::{compile, RuleAst};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// A rule's severity, reflected verbatim into every violation it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Lowest severity.
    Low,
    /// Default severity for most rules.
    Medium,
    /// Escalated severity.
    High,
    /// Highest severity.
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// The durable, client-facing rule record.
///
/// `spec.md` §3: "Identity: stable id ... Metadata: name, description,
/// severity, enabled flag, tenant id, tags, version counter, created/updated
/// instants. Source: expression text." The compiled AST is *not* stored on
/// this struct -- it's derived data, recomputed from `source` on load and
/// cached alongside in a [`crate::CompiledRuleSnapshot`], matching "Derived:
/// compiled AST plus a pre-computed set of operation-name prefixes."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Stable id, unique within a tenant.
    pub id: String,
    /// Human-facing name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Severity reflected into violations this rule produces.
    pub severity: Severity,
    /// Whether the Evaluator considers this rule.
    pub enabled: bool,
    /// The tenant that owns this rule.
    pub tenant_id: TenantId,
    /// Free-form labels.
    pub tags: Vec<String>,
    /// Incremented on every successful `Update`.
    pub version: u64,
    /// Monotonically assigned by the store on `Create` and never changed
    /// afterward. `spec.md` §5's "within a single trace, violations are
    /// emitted in rule-registration order" needs a total order that
    /// survives a `HashMap`'s unspecified iteration order -- this field is
    /// that order.
    pub registration_seq: u64,
    /// Creation instant.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Instant of the most recent successful mutation.
    pub updated_at: chrono::DateTime<chrono::Utc>,
    /// The rule's expression text, the only form actually persisted --
    /// the AST is re-derived from this on load.
    pub source: String,
}

impl Rule {
    /// Parses [`Rule::source`], failing with [`StoreError::Invalid`] if it
    /// doesn't compile. `spec.md` §3: "enabled rules always have a
    /// successfully validated AST" -- this is the check that enforces it.
    pub fn compile(&self) -> Result<RuleAst> {
        compile(&self.source)
            .map(|(ast, _warnings)| ast)
            .map_err(|err| StoreError::Invalid(err.to_string()))
    }
}

/// A rule paired with its compiled AST and dispatch index, produced once
/// per mutation and handed to the Evaluator by value.
///
/// `spec.md` §4.4's "Observer contract": "The Evaluator obtains a
/// compiled-rule snapshot ... via a single call; the snapshot is immutable.
/// The Rule Store re-compiles only on mutation, not on every read."
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRuleSnapshot {
    /// The persisted record this snapshot was compiled from.
    pub rule: Rule,
    /// The parsed AST plus its dispatch index.
    pub compiled: CompiledRule,
}

impl CompiledRuleSnapshot {
    pub(crate) fn build(rule: Rule) -> Result<Self> {
        let ast = rule.compile()?;
        let compiled = CompiledRule::new(ast);
        Ok(Self { rule, compiled })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(source: &str) -> Rule {
        let now = chrono::DateTime::<chrono::Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        Rule {
            id: "r1".into(),
            name: "sample".into(),
            description: String::new(),
            severity: Severity::Medium,
            enabled: true,
            tenant_id: TenantId::new("acme"),
            tags: Vec::new(),
            version: 1,
            registration_seq: 0,
            created_at: now,
            updated_at: now,
            source: source.into(),
        }
    }

    #[test]
    fn compiles_well_formed_source() {
        let rule = sample("when { payment.charge } always { payment.receipt }");
        assert!(rule.compile().is_ok());
    }

    #[test]
    fn rejects_malformed_source_as_invalid() {
        let rule = sample("when { payment.charge } always {");
        assert!(matches!(rule.compile(), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn snapshot_precomputes_operation_names() {
        let rule = sample("when { a.b } always { c.d }");
        let snapshot = CompiledRuleSnapshot::build(rule).unwrap();
        assert_eq!(snapshot.compiled.operation_names, vec!["a.b", "c.d"]);
    }
}
