//! Errors the interpreter raises while evaluating a rule.

use thiserror::Error;

/// An error raised while evaluating a rule's AST against a trace's spans.
///
/// Grounded on the teacher's `ViolationKind` (`crates/foundry/src/check/violation.rs`):
/// a `#[non_exhaustive]` `thiserror` enum with one `#[error("...")]` variant
/// per distinct failure, so a caller can match on kind without the crate
/// forfeiting the right to add a new failure mode later.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum InterpError {
    /// Traversal exceeded the configured depth cap (`spec.md` §4.3).
    #[error("expression depth {depth} exceeds the configured limit of {limit}")]
    ResourceLimitExceeded {
        /// The configured maximum depth.
        limit: usize,
        /// The depth actually reached when the limit tripped.
        depth: usize,
    },
    /// An internal invariant was violated during interpretation (e.g. a
    /// `resolve_indices` call reached a node kind with no span set).
    #[error("internal evaluation error: {0}")]
    EvaluationError(String),
}
