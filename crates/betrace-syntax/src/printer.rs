//! Renders a [`RuleAst`] back to canonical rule source text.
//!
//! Supplements the distilled spec: nothing in the original grammar forced a
//! canonical textual form, but the rule store persists rules as the text an
//! author submitted (`spec.md` §4/§7), and diagnostics and the CLI's `rules
//! show` output are easiest to keep faithful by re-deriving text from the
//! AST instead of keeping the author's original formatting around as a
//! second source of truth. The property this buys is printer idempotence:
//! `parse(print(parse(src)))` produces the same AST as `parse(src)`.

use std::fmt::Write as _;

use crate::ast::{CondOp, Condition, Expr, Obligation, RelOp, RuleAst, Value};

/// Renders `rule` back to its canonical textual form.
#[must_use]
pub fn print(rule: &RuleAst) -> String {
    let mut out = String::new();
    write!(out, "when {{ {} }} ", print_expr(&rule.when)).unwrap();
    match &rule.obligation {
        Obligation::Always(e) => write!(out, "always {{ {} }}", print_expr(e)).unwrap(),
        Obligation::Never(e) => write!(out, "never {{ {} }}", print_expr(e)).unwrap(),
    }
    out
}

fn print_expr(expr: &Expr) -> String {
    match expr {
        Expr::Predicate { operation, .. } => operation.clone(),
        Expr::Where { inner, condition, .. } => {
            format!("{}.where({})", print_expr(inner), print_condition(condition))
        }
        Expr::Count { operation, op, rhs, .. } => {
            let rhs = match rhs {
                crate::ast::CountOperand::Literal(n) => n.to_string(),
                crate::ast::CountOperand::Operation(other) => format!("count({other})"),
            };
            format!("count({operation}) {} {rhs}", print_rel_op(*op))
        }
        Expr::And(lhs, rhs, _) => format!("{} and {}", parenthesize(lhs), parenthesize(rhs)),
        Expr::Or(lhs, rhs, _) => format!("{} or {}", parenthesize(lhs), parenthesize(rhs)),
        Expr::Not(inner, _) => format!("not {}", parenthesize(inner)),
    }
}

/// Wraps `expr` in parentheses when printing it as an operand of `and`/`or`
/// would otherwise change its parse under the grammar's precedence.
fn parenthesize(expr: &Expr) -> String {
    match expr {
        Expr::And(..) | Expr::Or(..) => format!("({})", print_expr(expr)),
        _ => print_expr(expr),
    }
}

fn print_condition(condition: &Condition) -> String {
    let value = print_value(&condition.value);
    match condition.op {
        CondOp::Rel(op) => format!("{} {} {value}", condition.attr_path, print_rel_op(op)),
        CondOp::Contains => format!("{} contains {value}", condition.attr_path),
    }
}

fn print_value(value: &Value) -> String {
    match value {
        Value::Number(n) => {
            if n.fract() == 0.0 && n.is_finite() {
                format!("{n:.0}")
            } else {
                n.to_string()
            }
        }
        Value::Bool(b) => b.to_string(),
        Value::Ident(s) => s.clone(),
        // The tokenizer's `scan_string` does no escape processing at all: it
        // copies characters verbatim until the next literal `"`, which means
        // a parsed `Str` can never contain an embedded quote, and a raw `\`
        // in the lexeme is data, not an escape introducer. Using Rust's
        // `Debug` formatter here would backslash-escape that `\` and break
        // idempotence, since the tokenizer has no matching unescape step.
        Value::Str(s) => format!("\"{s}\""),
    }
}

fn print_rel_op(op: RelOp) -> &'static str {
    match op {
        RelOp::Eq => "==",
        RelOp::Ne => "!=",
        RelOp::Lt => "<",
        RelOp::Le => "<=",
        RelOp::Gt => ">",
        RelOp::Ge => ">=",
    }
}
