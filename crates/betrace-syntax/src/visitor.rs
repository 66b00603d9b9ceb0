//! The tree-walk contract shared by static analysis and (eventually) other
//! passes over a [`crate::ast::Expr`] tree.
//!
//! Mirrors the teacher's `bulloak_syntax::visitor::Visitor`: one method per
//! node shape, threading an `Output`/`Error` pair through each call.

use crate::ast::{Condition, Expr, Obligation, RuleAst};

/// A visitor over the rule AST.
pub trait Visitor {
    /// The value produced by a successful visit.
    type Output;
    /// The value produced by a failed visit.
    type Error;

    /// Visits the top-level rule.
    fn visit_rule(&mut self, rule: &RuleAst) -> Result<Self::Output, Self::Error>;
    /// Visits the obligation half of a rule.
    fn visit_obligation(&mut self, obligation: &Obligation) -> Result<Self::Output, Self::Error>;
    /// Visits a boolean-valued expression node.
    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    /// Visits an attribute condition inside a `.where(...)`.
    fn visit_condition(&mut self, condition: &Condition) -> Result<Self::Output, Self::Error>;
}
