//! Resolved engine configuration shared by every subcommand.
//!
//! Built once in [`crate::cli::run`] from the merged CLI/figment layer and
//! passed by reference to each command module -- the data directory, the
//! tenant this invocation operates on, its signing secret, and the
//! interpreter's depth cap.

use std::path::PathBuf;
use std::sync::Arc;

use betrace_core::TenantId;
use betrace_store::{RuleStore, SigningKeyring, StaticKeyring, StdFilesystem, ViolationStore};

const RULES_SUBDIR: &str = "rules";
const VIOLATIONS_SUBDIR: &str = "violations";

/// Configuration resolved from CLI arguments (and, through `figment`, any
/// future config-file/env layer) shared by every subcommand.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory holding this tenant's rule store and violation store.
    pub data_dir: PathBuf,
    /// The tenant this invocation operates on.
    pub tenant: TenantId,
    /// This tenant's violation-signing secret.
    pub signing_key: String,
    /// Overrides [`betrace_interp::DEFAULT_MAX_DEPTH`] for this invocation.
    pub max_depth: usize,
}

impl EngineConfig {
    /// Opens this tenant's rule store, rooted at `<data_dir>/rules`.
    pub fn rule_store(&self) -> anyhow::Result<RuleStore<StdFilesystem>> {
        Ok(RuleStore::open(self.data_dir.join(RULES_SUBDIR), StdFilesystem)?)
    }

    /// Opens this tenant's violation store, rooted at `<data_dir>/violations`.
    pub fn violation_store(&self) -> anyhow::Result<ViolationStore<StdFilesystem>> {
        Ok(ViolationStore::open(self.data_dir.join(VIOLATIONS_SUBDIR), StdFilesystem)?)
    }

    /// Builds a single-tenant signing keyring backed by this invocation's
    /// `--signing-key`. Production deployments with more than one tenant
    /// would bind [`SigningKeyring`] to a secrets manager instead; the CLI
    /// only ever operates on one tenant per invocation.
    #[must_use]
    pub fn keyring(&self) -> Arc<dyn SigningKeyring> {
        Arc::new(
            StaticKeyring::new().with_secret(self.tenant.clone(), self.signing_key.clone().into_bytes()),
        )
    }
}
