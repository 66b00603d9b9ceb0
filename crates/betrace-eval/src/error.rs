//! The Evaluator's error kind.
//!
//! `spec.md` §6's Evaluation service: "Errors: `Cancelled` | `Persistence`."
//! A single rule failing with `ResourceLimitExceeded`/`EvaluationError`
//! never reaches this type -- `spec.md` §4.5's failure policy records it
//! against that rule only, it doesn't abort or fail the call.

use thiserror::Error;

/// A convenience alias for results produced by the Evaluator.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors `EvaluateTrace` itself can fail with -- as opposed to a single
/// rule's evaluation failure, which is recorded per-rule and never
/// surfaces here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EvalError {
    /// The caller's [`crate::CancellationToken`] was already cancelled
    /// before any rule ran.
    #[error("evaluation cancelled")]
    Cancelled,

    /// The Violation Store failed to durably record a violation.
    /// `spec.md` §4.5: "A Violation-Store failure surfaces to the caller
    /// unchanged."
    #[error(transparent)]
    Store(#[from] betrace_store::StoreError),
}
