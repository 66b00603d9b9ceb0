#![warn(missing_docs, unreachable_pub, unused, rust_2021_compatibility)]
#![warn(clippy::all, clippy::pedantic)]

//! The resource-bounded interpreter that evaluates a compiled rule against
//! a trace's spans.
//!
//! [`Interpreter`] is the single entry point: it walks a [`betrace_syntax::RuleAst`]
//! (or a bare [`betrace_syntax::Expr`]) against an ordered `&[betrace_core::trace::Span]`,
//! returning whether the rule is violated. Evaluation never mutates the
//! spans it's given and never retains references past the call that
//! produced the result.

pub mod context;
pub mod dispatch;
pub mod error;
pub mod interpreter;

pub use context::DEFAULT_MAX_DEPTH;
pub use dispatch::CompiledRule;
pub use error::InterpError;
pub use interpreter::Interpreter;
