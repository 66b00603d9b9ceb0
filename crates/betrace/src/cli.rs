//! `betrace`'s top-level CLI surface and configuration.
//!
//! Grounded on the teacher's `crates/bulloak/src/cli.rs`: a `clap`-derived
//! `Cli` struct merged over defaults via `figment`
//! (`Figment::new().merge(Serialized::defaults(Cli::parse())).extract()`),
//! dispatching to one handler per top-level command.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use figment::providers::Serialized;
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::{evaluate, rules, violations};

/// `betrace`'s configuration, parsed from the command line and merged over
/// defaults through `figment` -- the same layering the teacher's CLI uses,
/// left open for a future config-file provider to merge underneath the
/// CLI arguments without changing any command's own code.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Data directory holding this tenant's rule store and violation store.
    #[arg(long, global = true, default_value = "./betrace-data")]
    pub data_dir: PathBuf,

    /// Tenant id to operate on.
    #[arg(long, global = true, default_value = "default")]
    pub tenant: String,

    /// Signing secret for this tenant's violation records. Reads from
    /// `BETRACE_SIGNING_KEY` if the flag is omitted.
    #[arg(long, global = true, env = "BETRACE_SIGNING_KEY", default_value = "betrace-dev-signing-key")]
    pub signing_key: String,

    /// Overrides the interpreter's depth cap (`spec.md` §4.3 default: 128).
    #[arg(long, global = true, default_value_t = betrace_interp::DEFAULT_MAX_DEPTH)]
    pub max_depth: usize,

    /// `betrace`'s commands.
    #[clap(subcommand)]
    pub command: Commands,
}

/// `betrace`'s commands, one per external service `spec.md` §6 names.
#[derive(Debug, Clone, Subcommand, Serialize, Deserialize)]
pub enum Commands {
    /// `betrace rules <action>` -- the Rule service.
    #[command(subcommand)]
    Rules(rules::RulesAction),
    /// `betrace evaluate` -- the Evaluation service.
    Evaluate(evaluate::Evaluate),
    /// `betrace violations <action>` -- the Violation service.
    #[command(subcommand)]
    Violations(violations::ViolationsAction),
}

/// Main entrypoint of `betrace`'s execution.
pub fn run() -> anyhow::Result<()> {
    let cli: Cli = Figment::new().merge(Serialized::defaults(Cli::parse())).extract()?;

    let config = EngineConfig {
        data_dir: cli.data_dir.clone(),
        tenant: betrace_core::TenantId::new(cli.tenant.clone()),
        signing_key: cli.signing_key.clone(),
        max_depth: cli.max_depth,
    };

    match &cli.command {
        Commands::Rules(action) => rules::run(action, &config),
        Commands::Evaluate(cmd) => evaluate::run(cmd, &config),
        Commands::Violations(action) => violations::run(action, &config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_rules_create_invocation() {
        let cli = Cli::parse_from([
            "betrace",
            "--tenant",
            "acme",
            "rules",
            "create",
            "--id",
            "r1",
            "--name",
            "sample",
            "--source",
            "when { a.b } always { c.d }",
        ]);
        assert_eq!(cli.tenant, "acme");
        assert!(matches!(cli.command, Commands::Rules(rules::RulesAction::Create(_))));
    }

    #[test]
    fn parses_an_evaluate_invocation() {
        let cli = Cli::parse_from(["betrace", "evaluate", "--trace", "trace.json"]);
        assert!(matches!(cli.command, Commands::Evaluate(_)));
    }

    #[test]
    fn defaults_max_depth_to_the_interpreter_default() {
        let cli = Cli::parse_from(["betrace", "violations", "query"]);
        assert_eq!(cli.max_depth, betrace_interp::DEFAULT_MAX_DEPTH);
    }
}
