//! The error kind shared by the data model; every other `betrace-*` crate
//! defines its own error enum (see `spec.md` §7 for the full stable
//! vocabulary: `ParseError`, `ValidationWarning`, `AlreadyExists`,
//! `NotFound`, `Invalid`, `Persistence`, `ResourceLimitExceeded`,
//! `EvaluationError`, `Cancelled`) and wraps this one where a model
//! invariant breach needs to surface through it.

use thiserror::Error;

/// A convenience alias for results produced by the data model.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the shared data model (`Span`, `Trace`, `TenantId`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A value failed a shape or range check (e.g. `Span::start > end`,
    /// an empty trace id).
    #[error("invalid value: {0}")]
    Invalid(String),
}
