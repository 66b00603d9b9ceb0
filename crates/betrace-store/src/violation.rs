//! The violation record and its HMAC signature.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use betrace_core::TenantId;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Result, StoreError};
use crate::rule::Severity;

type HmacSha256 = Hmac<Sha256>;

/// Per-tenant secret lookup for violation signing.
///
/// `spec.md` §9's general stance that I/O and secret boundaries are narrow
/// traits: the spec never says where per-tenant secrets come from, only
/// that they exist, so production backs this with a secrets manager and
/// tests back it with a fixed in-memory map.
pub trait SigningKeyring: Send + Sync {
    /// Returns the signing secret for `tenant_id`, or `None` if the tenant
    /// has no configured key.
    fn secret_for(&self, tenant_id: &TenantId) -> Option<Vec<u8>>;
}

/// A fixed, in-memory [`SigningKeyring`] -- the production binding is left
/// to the embedding application; this is what tests (and a single-tenant
/// deployment) use directly.
#[derive(Debug, Default, Clone)]
pub struct StaticKeyring {
    secrets: std::collections::HashMap<TenantId, Vec<u8>>,
}

impl StaticKeyring {
    /// Builds an empty keyring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `secret` for `tenant_id`, builder-style.
    #[must_use]
    pub fn with_secret(mut self, tenant_id: TenantId, secret: impl Into<Vec<u8>>) -> Self {
        self.secrets.insert(tenant_id, secret.into());
        self
    }
}

impl SigningKeyring for StaticKeyring {
    fn secret_for(&self, tenant_id: &TenantId) -> Option<Vec<u8>> {
        self.secrets.get(tenant_id).cloned()
    }
}

/// An immutable record of a rule violation.
///
/// `spec.md` §3: "Identity (uuid), rule id, rule name snapshot, severity,
/// tenant id, trace id, creation instant, human-readable message, optional
/// structured attributes, and a cryptographic signature over the
/// canonicalized record plus a per-tenant signing key."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Opaque unique identity.
    pub id: String,
    /// The rule that produced this violation.
    pub rule_id: String,
    /// The rule's name at the moment of evaluation -- a snapshot, not a
    /// live reference, so a later rule rename doesn't retroactively change
    /// history.
    pub rule_name: String,
    /// Severity, copied from the rule at evaluation time.
    pub severity: Severity,
    /// The tenant this violation belongs to.
    pub tenant_id: TenantId,
    /// The trace that triggered the violation.
    pub trace_id: String,
    /// When the Evaluator produced this record.
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Human-readable explanation.
    pub message: String,
    /// Optional structured attributes, e.g. the matched span ids.
    pub attributes: std::collections::BTreeMap<String, String>,
    /// URL-safe base64 HMAC-SHA256 over the fields above, under the
    /// owning tenant's signing secret. Empty until [`Violation::sign`] is
    /// called.
    pub signature: String,
}

impl Violation {
    /// The byte encoding the signature covers: every immutable field in a
    /// fixed order, attribute pairs sorted by key (`BTreeMap` iterates in
    /// key order already, so this just concatenates the canonical fields).
    ///
    /// `spec.md` §4.6: "an HMAC over the canonical encoding of its
    /// immutable fields (rule id, severity, tenant id, trace id, creation
    /// instant, message, sorted attribute pairs)".
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(self.rule_id.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.severity.to_string().as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.tenant_id.as_str().as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.trace_id.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.created_at.to_rfc3339().as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.message.as_bytes());
        for (k, v) in &self.attributes {
            buf.push(0);
            buf.extend_from_slice(k.as_bytes());
            buf.push(b'=');
            buf.extend_from_slice(v.as_bytes());
        }
        buf
    }

    /// Computes this violation's signature under `keyring`'s secret for
    /// its tenant, writing it into `self.signature`.
    ///
    /// # Errors
    /// Returns [`StoreError::Invalid`] if `keyring` has no secret for this
    /// violation's tenant.
    pub fn sign(&mut self, keyring: &dyn SigningKeyring) -> Result<()> {
        self.signature = self.compute_signature(keyring)?;
        Ok(())
    }

    /// Recomputes the signature and compares it against `self.signature`
    /// in constant time.
    ///
    /// `spec.md` §4.6: "`Verify(id)`: re-computes the signature and
    /// compares in constant time."
    #[must_use]
    pub fn verify(&self, keyring: &dyn SigningKeyring) -> bool {
        let Ok(expected) = self.compute_signature(keyring) else {
            return false;
        };
        expected.len() == self.signature.len()
            && constant_time_eq(expected.as_bytes(), self.signature.as_bytes())
    }

    fn compute_signature(&self, keyring: &dyn SigningKeyring) -> Result<String> {
        let secret = keyring
            .secret_for(&self.tenant_id)
            .ok_or_else(|| StoreError::Invalid(format!("no signing key for tenant {}", self.tenant_id)))?;
        let mut mac = HmacSha256::new_from_slice(&secret)
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        mac.update(&self.canonical_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }
}

/// Constant-time byte-slice comparison, used so [`Violation::verify`]
/// doesn't leak timing information about how much of the signature
/// matched.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
