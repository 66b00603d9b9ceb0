//! Error kinds raised by the Rule Store and Violation Store.
//!
//! Follows the teacher's `ViolationKind` pattern in
//! `crates/foundry/src/check/violation.rs` (`#[derive(Error)]`,
//! `#[non_exhaustive]`, one `#[error("...")]` message per variant) rather
//! than a generic `anyhow::Error`, since both stores are library surfaces
//! whose callers need to match on failure kind.

use thiserror::Error;

/// A convenience alias for results produced by either store.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the Rule Store or the Violation Store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// `Create` was called with an id already present in the store.
    #[error("rule {0:?} already exists")]
    AlreadyExists(String),

    /// `Update`/`Delete`/`Get`/`Enable`/`Disable` referenced an id that
    /// isn't present.
    #[error("{0:?} not found")]
    NotFound(String),

    /// A value failed a shape or range check (empty id, unknown severity).
    #[error("invalid value: {0}")]
    Invalid(String),

    /// A durable read or write failed. Wraps the underlying filesystem
    /// condition; a mutation that hits this rolls back its in-memory
    /// change before returning.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<betrace_core::CoreError> for StoreError {
    fn from(err: betrace_core::CoreError) -> Self {
        match err {
            betrace_core::CoreError::Invalid(reason) => StoreError::Invalid(reason),
        }
    }
}
