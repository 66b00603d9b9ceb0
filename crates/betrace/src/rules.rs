//! `betrace rules ...`: the Rule service of `spec.md` §6 --
//! `create`/`update`/`delete`/`get`/`list`/`enable`/`disable`.

use std::fs;
use std::path::PathBuf;

use betrace_core::TenantId;
use betrace_store::{Rule, Severity};
use clap::{Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

/// `betrace rules <action>`.
#[derive(Debug, Clone, Subcommand, Serialize, Deserialize)]
pub enum RulesAction {
    /// Create a new rule.
    Create(Create),
    /// Replace an existing rule's metadata and source.
    Update(Update),
    /// Delete a rule.
    Delete(Delete),
    /// Print a single rule.
    Get(Get),
    /// List every rule for the configured tenant.
    List(List),
    /// Enable a rule.
    Enable(Enable),
    /// Disable a rule.
    Disable(Disable),
}

/// The severities a rule can be authored at, mirroring
/// [`betrace_store::Severity`] with the `ValueEnum` clap needs to parse it
/// from a flag.
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityArg {
    /// Lowest severity.
    Low,
    /// Default severity for most rules.
    Medium,
    /// Escalated severity.
    High,
    /// Highest severity.
    Critical,
}

impl From<SeverityArg> for Severity {
    fn from(value: SeverityArg) -> Self {
        match value {
            SeverityArg::Low => Severity::Low,
            SeverityArg::Medium => Severity::Medium,
            SeverityArg::High => Severity::High,
            SeverityArg::Critical => Severity::Critical,
        }
    }
}

/// Reads a rule's source text from `--source` if given, else from
/// `--source-file`. `clap`'s `ArgGroup` enforces exactly one is present.
fn read_source(source: &Option<String>, source_file: &Option<PathBuf>) -> anyhow::Result<String> {
    match (source, source_file) {
        (Some(text), _) => Ok(text.clone()),
        (None, Some(path)) => Ok(fs::read_to_string(path)?),
        (None, None) => anyhow::bail!("one of --source or --source-file is required"),
    }
}

/// `betrace rules create`.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct Create {
    /// Stable id for the new rule, unique within the tenant.
    #[arg(long)]
    pub id: String,
    /// Human-facing name.
    #[arg(long)]
    pub name: String,
    /// Free-form description.
    #[arg(long, default_value = "")]
    pub description: String,
    /// Severity reflected into violations this rule produces.
    #[arg(long, value_enum, default_value = "medium")]
    pub severity: SeverityArg,
    /// Free-form labels, comma-separated.
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
    /// The rule's expression text, inline.
    #[arg(long, group = "source-text")]
    pub source: Option<String>,
    /// The rule's expression text, read from a file.
    #[arg(long, group = "source-text")]
    pub source_file: Option<PathBuf>,
    /// Create the rule disabled rather than enabled.
    #[arg(long, default_value_t = false)]
    pub disabled: bool,
}

/// `betrace rules update`.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct Update {
    /// The id of the rule to replace.
    #[arg(long)]
    pub id: String,
    /// New name; defaults to the existing name if omitted.
    #[arg(long)]
    pub name: Option<String>,
    /// New description; defaults to the existing description if omitted.
    #[arg(long)]
    pub description: Option<String>,
    /// New severity; defaults to the existing severity if omitted.
    #[arg(long, value_enum)]
    pub severity: Option<SeverityArg>,
    /// New tags, comma-separated; defaults to the existing tags if omitted.
    #[arg(long, value_delimiter = ',')]
    pub tags: Option<Vec<String>>,
    /// New expression text, inline.
    #[arg(long, group = "source-text")]
    pub source: Option<String>,
    /// New expression text, read from a file.
    #[arg(long, group = "source-text")]
    pub source_file: Option<PathBuf>,
}

/// `betrace rules delete`.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct Delete {
    /// The id of the rule to delete.
    #[arg(long)]
    pub id: String,
}

/// `betrace rules get`.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct Get {
    /// The id of the rule to print.
    #[arg(long)]
    pub id: String,
}

/// `betrace rules list`.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct List;

/// `betrace rules enable`.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct Enable {
    /// The id of the rule to enable.
    #[arg(long)]
    pub id: String,
}

/// `betrace rules disable`.
#[derive(Debug, Clone, clap::Args, Serialize, Deserialize)]
pub struct Disable {
    /// The id of the rule to disable.
    #[arg(long)]
    pub id: String,
}

/// Dispatches a `betrace rules <action>` invocation.
pub fn run(action: &RulesAction, config: &EngineConfig) -> anyhow::Result<()> {
    let store = config.rule_store()?;
    match action {
        RulesAction::Create(cmd) => {
            let source = read_source(&cmd.source, &cmd.source_file)?;
            let now = chrono::Utc::now();
            let rule = Rule {
                id: cmd.id.clone(),
                name: cmd.name.clone(),
                description: cmd.description.clone(),
                severity: cmd.severity.into(),
                enabled: !cmd.disabled,
                tenant_id: config.tenant.clone(),
                tags: cmd.tags.clone(),
                version: 0,
                registration_seq: 0,
                created_at: now,
                updated_at: now,
                source,
            };
            store.create(rule)?;
            println!("{}: created rule {:?}", "success".green(), cmd.id);
        }
        RulesAction::Update(cmd) => {
            let existing = store
                .get(&cmd.id)
                .ok_or_else(|| anyhow::anyhow!("rule {:?} not found", cmd.id))?;
            let source = match (&cmd.source, &cmd.source_file) {
                (None, None) => existing.source.clone(),
                _ => read_source(&cmd.source, &cmd.source_file)?,
            };
            let rule = Rule {
                id: existing.id.clone(),
                name: cmd.name.clone().unwrap_or(existing.name),
                description: cmd.description.clone().unwrap_or(existing.description),
                severity: cmd.severity.map_or(existing.severity, Into::into),
                enabled: existing.enabled,
                tenant_id: existing.tenant_id,
                tags: cmd.tags.clone().unwrap_or(existing.tags),
                version: existing.version,
                registration_seq: existing.registration_seq,
                created_at: existing.created_at,
                updated_at: existing.updated_at,
                source,
            };
            store.update(rule)?;
            println!("{}: updated rule {:?}", "success".green(), cmd.id);
        }
        RulesAction::Delete(cmd) => {
            store.delete(&cmd.id)?;
            println!("{}: deleted rule {:?}", "success".green(), cmd.id);
        }
        RulesAction::Get(cmd) => {
            let rule = store
                .get(&cmd.id)
                .ok_or_else(|| anyhow::anyhow!("rule {:?} not found", cmd.id))?;
            println!("{}", serde_json::to_string_pretty(&rule)?);
        }
        RulesAction::List(_) => {
            let mut rules = store.list();
            rules.sort_by(|a, b| a.registration_seq.cmp(&b.registration_seq));
            println!("{}", serde_json::to_string_pretty(&rules)?);
        }
        RulesAction::Enable(cmd) => {
            store.enable(&cmd.id)?;
            println!("{}: enabled rule {:?}", "success".green(), cmd.id);
        }
        RulesAction::Disable(cmd) => {
            store.disable(&cmd.id)?;
            println!("{}: disabled rule {:?}", "success".green(), cmd.id);
        }
    }
    Ok(())
}
