//! The Rule Store: the authoritative, durable set of rules for a tenant.
//!
//! `spec.md` §4.4. In-memory `HashMap` behind a `std::sync::RwLock`
//! (single-writer/many-reader discipline), guarding both the map and the
//! durable write so a reader never observes an in-memory change that isn't
//! yet on disk -- mirroring the teacher's own "hold the lock across the
//! whole mutation" discipline in its scaffold-writing backends.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{Result, StoreError};
use crate::filesystem::Filesystem;
use crate::rule::{CompiledRuleSnapshot, Rule};

const RULES_FILE: &str = "rules.json";

/// The durable, in-memory-backed set of rules for one tenant's data
/// directory.
pub struct RuleStore<F: Filesystem> {
    data_dir: PathBuf,
    fs: F,
    rules: RwLock<HashMap<String, Rule>>,
    next_seq: AtomicU64,
}

impl<F: Filesystem> RuleStore<F> {
    /// Opens (or initializes) a rule store rooted at `data_dir`.
    ///
    /// `spec.md` §4.4: "On startup, the store reads the live path; absence
    /// of the file is a clean start, not an error; any parse/deserialize
    /// failure is reported as a startup error."
    pub fn open(data_dir: impl Into<PathBuf>, fs: F) -> Result<Self> {
        let data_dir = data_dir.into();
        fs.make_dir(&data_dir)?;
        let path = data_dir.join(RULES_FILE);
        let rules = match fs.read(&path)? {
            None => {
                info!(path = %path.display(), "no existing rule store file, starting clean");
                HashMap::new()
            }
            Some(bytes) => {
                let map: BTreeMap<String, Rule> = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Persistence(format!("corrupt rule store: {e}")))?;
                info!(path = %path.display(), count = map.len(), "loaded rule store");
                map.into_iter().collect()
            }
        };
        let next_seq = rules.values().map(|r| r.registration_seq).max().map_or(0, |m| m + 1);
        Ok(Self { data_dir, fs, rules: RwLock::new(rules), next_seq: AtomicU64::new(next_seq) })
    }

    fn path(&self) -> PathBuf {
        self.data_dir.join(RULES_FILE)
    }

    /// Serializes `rules` into the canonical byte stream the store
    /// persists: a `BTreeMap` so key order (and therefore the bytes) is
    /// deterministic regardless of `HashMap` iteration order.
    fn persist(&self, rules: &HashMap<String, Rule>) -> Result<()> {
        let canonical: BTreeMap<&String, &Rule> = rules.iter().collect();
        let bytes = serde_json::to_vec_pretty(&canonical)
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        self.fs.write_atomic(&self.path(), &bytes)
    }

    /// Inserts `rule`, failing with [`StoreError::AlreadyExists`] if its id
    /// is already present. Sets `created_at`/`updated_at` to now and
    /// `version` to 1, ignoring whatever the caller supplied there.
    pub fn create(&self, mut rule: Rule) -> Result<()> {
        if rule.id.is_empty() {
            return Err(StoreError::Invalid("rule id must not be empty".into()));
        }
        let mut guard = self.rules.write().unwrap();
        if guard.contains_key(&rule.id) {
            return Err(StoreError::AlreadyExists(rule.id));
        }
        let now = Utc::now();
        rule.created_at = now;
        rule.updated_at = now;
        rule.version = 1;
        rule.registration_seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = rule.id.clone();
        guard.insert(id.clone(), rule);
        if let Err(err) = self.persist(&guard) {
            guard.remove(&id);
            return Err(err);
        }
        info!(rule_id = %id, "rule created");
        Ok(())
    }

    /// Replaces the rule at `rule.id`, failing with
    /// [`StoreError::NotFound`] if absent. Preserves `created_at` and
    /// `registration_seq`, increments `version`, and sets `updated_at` to
    /// now.
    pub fn update(&self, rule: Rule) -> Result<()> {
        let mut guard = self.rules.write().unwrap();
        let Some(existing) = guard.get(&rule.id) else {
            return Err(StoreError::NotFound(rule.id));
        };
        let mut replacement = rule;
        replacement.created_at = existing.created_at;
        replacement.registration_seq = existing.registration_seq;
        replacement.version = existing.version + 1;
        replacement.updated_at = Utc::now();
        let previous = guard.insert(replacement.id.clone(), replacement.clone());
        if let Err(err) = self.persist(&guard) {
            match previous {
                Some(prev) => {
                    guard.insert(prev.id.clone(), prev);
                }
                None => {
                    guard.remove(&replacement.id);
                }
            }
            return Err(err);
        }
        info!(rule_id = %replacement.id, version = replacement.version, "rule updated");
        Ok(())
    }

    /// Removes the rule with `id`, failing with [`StoreError::NotFound`]
    /// if absent.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut guard = self.rules.write().unwrap();
        let Some(removed) = guard.remove(id) else {
            return Err(StoreError::NotFound(id.to_owned()));
        };
        if let Err(err) = self.persist(&guard) {
            guard.insert(removed.id.clone(), removed);
            return Err(err);
        }
        info!(rule_id = %id, "rule deleted");
        Ok(())
    }

    /// Non-mutating single-record read.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Rule> {
        self.rules.read().unwrap().get(id).cloned()
    }

    /// Non-mutating full scan, in no particular order (callers that need a
    /// stable order should sort on `id`).
    #[must_use]
    pub fn list(&self) -> Vec<Rule> {
        self.rules.read().unwrap().values().cloned().collect()
    }

    /// Sets `enabled = true` on the rule with `id`.
    pub fn enable(&self, id: &str) -> Result<()> {
        self.set_enabled(id, true)
    }

    /// Sets `enabled = false` on the rule with `id`.
    pub fn disable(&self, id: &str) -> Result<()> {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut guard = self.rules.write().unwrap();
        let Some(existing) = guard.get(id) else {
            return Err(StoreError::NotFound(id.to_owned()));
        };
        if existing.enabled == enabled {
            return Ok(());
        }
        let mut updated = existing.clone();
        updated.enabled = enabled;
        updated.updated_at = Utc::now();
        guard.insert(id.to_owned(), updated);
        if let Err(err) = self.persist(&guard) {
            guard.insert(id.to_owned(), existing.clone());
            return Err(err);
        }
        Ok(())
    }

    /// Compiles every enabled rule and returns an immutable snapshot for
    /// the Evaluator's observer contract (`spec.md` §4.4): "The Evaluator
    /// obtains a compiled-rule snapshot ... via a single call ... The Rule
    /// Store re-compiles only on mutation, not on every read." A rule that
    /// fails to compile is skipped with a warning rather than failing the
    /// whole snapshot -- its `enabled` bit alone doesn't guarantee a valid
    /// AST if the stored source was corrupted out of band. Sorted by
    /// `registration_seq` so the Evaluator sees rules in rule-registration
    /// order regardless of the backing `HashMap`'s iteration order
    /// (`spec.md` §5).
    #[must_use]
    pub fn compiled_snapshot(&self) -> Vec<CompiledRuleSnapshot> {
        let guard = self.rules.read().unwrap();
        let mut enabled: Vec<Rule> = guard.values().filter(|rule| rule.enabled).cloned().collect();
        enabled.sort_by_key(|rule| rule.registration_seq);
        enabled
            .into_iter()
            .filter_map(|rule| match CompiledRuleSnapshot::build(rule) {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    warn!(error = %err, "skipping rule that failed to recompile");
                    None
                }
            })
            .collect()
    }

    /// The data directory this store is rooted at.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
