//! The Violation Store: the durable, signed record of every rule violation.
//!
//! Same `RwLock` + atomic-persistence discipline as [`crate::RuleStore`],
//! reusing the [`Filesystem`] trait -- `spec.md` §4.6 calls for the same
//! readers-writer concurrency model as the Rule Store.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use tracing::info;

use crate::error::Result;
use crate::filesystem::Filesystem;
use crate::rule::Severity;
use crate::violation::{SigningKeyring, Violation};

const VIOLATIONS_FILE: &str = "violations.json";

struct Ledger {
    /// Insertion order, preserved exactly -- `spec.md` §4.6 Query
    /// ordering: "insertion order; later insertions later in the result."
    records: Vec<Violation>,
    index: HashMap<String, usize>,
}

/// Optional filters for [`ViolationStore::query`].
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Restrict to violations produced by this rule.
    pub rule_id: Option<String>,
    /// Restrict to violations at this severity.
    pub severity: Option<Severity>,
    /// Cap the number of records returned; `0` (the default) means no cap.
    pub limit: usize,
}

/// The durable, signed log of violations for one tenant's data directory.
pub struct ViolationStore<F: Filesystem> {
    data_dir: PathBuf,
    fs: F,
    ledger: RwLock<Ledger>,
}

impl<F: Filesystem> ViolationStore<F> {
    /// Opens (or initializes) a violation store rooted at `data_dir`, with
    /// the same clean-start-on-missing-file semantics as
    /// [`crate::RuleStore::open`].
    pub fn open(data_dir: impl Into<PathBuf>, fs: F) -> Result<Self> {
        let data_dir = data_dir.into();
        fs.make_dir(&data_dir)?;
        let path = data_dir.join(VIOLATIONS_FILE);
        let records: Vec<Violation> = match fs.read(&path)? {
            None => Vec::new(),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                crate::error::StoreError::Persistence(format!("corrupt violation store: {e}"))
            })?,
        };
        let index = records.iter().enumerate().map(|(i, v)| (v.id.clone(), i)).collect();
        Ok(Self { data_dir, fs, ledger: RwLock::new(Ledger { records, index }) })
    }

    fn path(&self) -> PathBuf {
        self.data_dir.join(VIOLATIONS_FILE)
    }

    fn persist(&self, ledger: &Ledger) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&ledger.records)
            .map_err(|e| crate::error::StoreError::Persistence(e.to_string()))?;
        self.fs.write_atomic(&self.path(), &bytes)
    }

    /// Signs `violation` under `keyring` and inserts it, durably
    /// persisting before returning.
    ///
    /// `spec.md` §4.6: "computes signature, inserts into the index;
    /// idempotent on violation id" -- storing the same id twice is a
    /// successful no-op, not an error, since the Evaluator's retry path
    /// may re-deliver a violation after a transient failure.
    pub fn store(&self, mut violation: Violation, keyring: &dyn SigningKeyring) -> Result<()> {
        let mut guard = self.ledger.write().unwrap();
        if guard.index.contains_key(&violation.id) {
            return Ok(());
        }
        violation.sign(keyring)?;
        let id = violation.id.clone();
        guard.index.insert(id.clone(), guard.records.len());
        guard.records.push(violation);
        if let Err(err) = self.persist(&guard) {
            guard.records.pop();
            guard.index.remove(&id);
            return Err(err);
        }
        info!(violation_id = %id, "violation stored");
        Ok(())
    }

    /// Single-record read.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Violation> {
        let guard = self.ledger.read().unwrap();
        guard.index.get(id).map(|&i| guard.records[i].clone())
    }

    /// Filtered scan in insertion order, capped by `filter.limit` (`0`
    /// meaning unlimited).
    #[must_use]
    pub fn query(&self, filter: &QueryFilter) -> Vec<Violation> {
        let guard = self.ledger.read().unwrap();
        let matching = guard.records.iter().filter(|v| {
            filter.rule_id.as_deref().map_or(true, |id| v.rule_id == id)
                && filter.severity.map_or(true, |sev| v.severity == sev)
        });
        if filter.limit == 0 {
            matching.cloned().collect()
        } else {
            matching.take(filter.limit).cloned().collect()
        }
    }

    /// Re-computes the signature of the record with `id` and compares it
    /// in constant time, returning `false` if the record doesn't exist.
    #[must_use]
    pub fn verify(&self, id: &str, keyring: &dyn SigningKeyring) -> bool {
        self.get(id).is_some_and(|v| v.verify(keyring))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::filesystem::InMemoryFilesystem;
    use betrace_core::TenantId;
    use crate::violation::StaticKeyring;

    fn keyring() -> StaticKeyring {
        StaticKeyring::new().with_secret(TenantId::new("acme"), b"s3cr3t".to_vec())
    }

    fn violation(id: &str, rule_id: &str, severity: Severity) -> Violation {
        Violation {
            id: id.into(),
            rule_id: rule_id.into(),
            rule_name: "sample".into(),
            severity,
            tenant_id: TenantId::new("acme"),
            trace_id: "t1".into(),
            created_at: chrono::DateTime::<chrono::Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
            message: "violated".into(),
            attributes: std::collections::BTreeMap::new(),
            signature: String::new(),
        }
    }

    fn store() -> ViolationStore<InMemoryFilesystem> {
        ViolationStore::open("/data", InMemoryFilesystem::new()).unwrap()
    }

    #[test]
    fn store_then_verify_succeeds() {
        let store = store();
        store.store(violation("v1", "r1", Severity::High), &keyring()).unwrap();
        assert!(store.verify("v1", &keyring()));
    }

    #[test]
    fn storing_the_same_id_twice_is_idempotent() {
        let store = store();
        store.store(violation("v1", "r1", Severity::High), &keyring()).unwrap();
        store.store(violation("v1", "r1", Severity::High), &keyring()).unwrap();
        assert_eq!(store.query(&QueryFilter::default()).len(), 1);
    }

    #[test]
    fn query_returns_insertion_order() {
        let store = store();
        store.store(violation("v1", "r1", Severity::Low), &keyring()).unwrap();
        store.store(violation("v2", "r1", Severity::Low), &keyring()).unwrap();
        store.store(violation("v3", "r1", Severity::Low), &keyring()).unwrap();
        let ids: Vec<_> = store.query(&QueryFilter::default()).into_iter().map(|v| v.id).collect();
        assert_eq!(ids, vec!["v1", "v2", "v3"]);
    }

    #[test]
    fn query_filters_by_rule_id_and_severity() {
        let store = store();
        store.store(violation("v1", "r1", Severity::High), &keyring()).unwrap();
        store.store(violation("v2", "r2", Severity::High), &keyring()).unwrap();
        store.store(violation("v3", "r1", Severity::Low), &keyring()).unwrap();

        let by_rule = store.query(&QueryFilter { rule_id: Some("r1".into()), ..Default::default() });
        assert_eq!(by_rule.len(), 2);

        let by_severity =
            store.query(&QueryFilter { severity: Some(Severity::High), ..Default::default() });
        assert_eq!(by_severity.len(), 2);

        let both = store.query(&QueryFilter {
            rule_id: Some("r1".into()),
            severity: Some(Severity::High),
            ..Default::default()
        });
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].id, "v1");
    }

    #[test]
    fn query_respects_limit() {
        let store = store();
        for i in 0..5 {
            store.store(violation(&format!("v{i}"), "r1", Severity::Low), &keyring()).unwrap();
        }
        let limited = store.query(&QueryFilter { limit: 2, ..Default::default() });
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn verify_is_false_for_an_unknown_id() {
        let store = store();
        assert!(!store.verify("missing", &keyring()));
    }

    #[test]
    fn a_fresh_store_on_the_same_filesystem_observes_prior_stores() {
        let shared = std::sync::Arc::new(InMemoryFilesystem::new());
        {
            let first = ViolationStore::open("/data", shared.clone()).unwrap();
            first.store(violation("v1", "r1", Severity::High), &keyring()).unwrap();
        }
        let second = ViolationStore::open("/data", shared).unwrap();
        assert!(second.get("v1").is_some());
    }
}
