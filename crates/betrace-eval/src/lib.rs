#![warn(missing_docs, unreachable_pub, unused, rust_2021_compatibility)]
#![warn(clippy::all, clippy::pedantic)]

//! The Evaluator (C5): wires the Rule Store and the Interpreter together
//! to drive rule evaluation for a single completed trace, handing any
//! resulting violations to the Violation Store.
//!
//! [`Evaluator`] is the single entry point the transport layer (out of
//! scope here) calls per completed trace. It owns no mutable state of its
//! own beyond the interpreter's depth cap; the Rule Store and Violation
//! Store it's built from remain the sources of truth.

pub mod cancellation;
pub mod error;
pub mod evaluator;

pub use cancellation::CancellationToken;
pub use error::{EvalError, Result};
pub use evaluator::Evaluator;
