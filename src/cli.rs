//! CLI surface for homestead.
//!
//! Thin handlers over the library: open the stores from config, run the
//! requested operation, render human or `--json` output.

use std::ffi::OsString;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::config::{self, Config};
use crate::namespace::{FsNamespaceStore, NamespaceStore};
use crate::provision::{NamespaceOutcome, ProvisioningService};
use crate::reconcile::{ReconcileMode, ReconciliationEngine};
use crate::record::{RecordStore, SqliteRecordStore};
use crate::Result;

#[derive(Parser, Debug)]
#[command(
    name = "homestead",
    version,
    about = "Per-user storage namespace provisioning and reconciliation",
    arg_required_else_help = true
)]
pub struct Cli {
    /// Machine-readable JSON output.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Debug output (repeat for more).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory, identity table, and namespace root.
    Init,

    /// Onboard a new user: identity record plus namespace directory.
    Provision {
        #[arg(long)]
        username: String,
        #[arg(long)]
        contact: String,
        #[arg(long)]
        secret: String,
    },

    /// Repair divergence between the identity table and the namespace tree.
    Reconcile {
        /// What to do with orphaned entries.
        #[arg(long, value_enum, default_value_t = ModeArg::Quarantine)]
        mode: ModeArg,
    },

    /// List active user identifiers.
    Users,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ModeArg {
    Purge,
    Quarantine,
}

impl From<ModeArg> for ReconcileMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Purge => ReconcileMode::Purge,
            ModeArg::Quarantine => ReconcileMode::Quarantine,
        }
    }
}

pub fn parse_from<I, T>(args: I) -> Cli
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Cli::parse_from(args)
}

pub fn run(cli: Cli) -> Result<()> {
    let config = config::load()?;
    match cli.command {
        Commands::Init => run_init(&config, cli.json),
        Commands::Provision {
            username,
            contact,
            secret,
        } => run_provision(&config, &username, &contact, &secret, cli.json),
        Commands::Reconcile { mode } => run_reconcile(&config, mode.into(), cli.json),
        Commands::Users => run_users(&config, cli.json),
    }
}

fn open_stores(config: &Config) -> Result<(Arc<dyn RecordStore>, Arc<dyn NamespaceStore>)> {
    let records = SqliteRecordStore::open(&config.db_path)?;
    let namespaces = FsNamespaceStore::new(&config.namespace_root, &config.quarantine_root)?;
    Ok((Arc::new(records), Arc::new(namespaces)))
}

fn run_init(config: &Config, json: bool) -> Result<()> {
    // Opening the store initializes the schema on first use.
    SqliteRecordStore::open(&config.db_path)?;
    let namespaces = FsNamespaceStore::new(&config.namespace_root, &config.quarantine_root)?;
    std::fs::create_dir_all(namespaces.root()).map_err(|source| {
        crate::namespace::NamespaceError::Io {
            path: namespaces.root().to_path_buf(),
            source,
        }
    })?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "db_path": config.db_path,
                "namespace_root": config.namespace_root,
                "quarantine_root": config.quarantine_root,
            })
        );
    } else {
        println!("identity table: {}", config.db_path.display());
        println!("namespace root: {}", config.namespace_root.display());
        println!("quarantine root: {}", config.quarantine_root.display());
    }
    Ok(())
}

fn run_provision(
    config: &Config,
    username: &str,
    contact: &str,
    secret: &str,
    json: bool,
) -> Result<()> {
    let (records, namespaces) = open_stores(config)?;
    let service = ProvisioningService::new(records, namespaces, config.allocation.max_attempts);
    let provisioned = service.provision(username, contact, secret)?;

    if json {
        println!("{}", serde_json::to_string(&provisioned)?);
    } else {
        match &provisioned.namespace {
            NamespaceOutcome::Created => println!("provisioned {}", provisioned.user_id),
            NamespaceOutcome::Deferred { reason } => println!(
                "provisioned {} (namespace deferred: {reason})",
                provisioned.user_id
            ),
        }
    }
    Ok(())
}

fn run_reconcile(config: &Config, mode: ReconcileMode, json: bool) -> Result<()> {
    let (records, namespaces) = open_stores(config)?;
    let engine = ReconciliationEngine::new(records, namespaces);
    let report = engine.reconcile(mode)?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else if report.is_empty() {
        println!("nothing to repair");
    } else {
        println!(
            "removed {} relocated {} healed {} errors {}",
            report.removed.len(),
            report.relocated.len(),
            report.healed.len(),
            report.errors.len()
        );
        for failure in &report.errors {
            println!("  failed {}: {}", failure.id, failure.reason);
        }
    }
    Ok(())
}

fn run_users(config: &Config, json: bool) -> Result<()> {
    let (records, _) = open_stores(config)?;
    let ids = records.list_active()?;

    if json {
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        println!("{}", serde_json::to_string(&ids)?);
    } else {
        for id in &ids {
            println!("{id}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn reconcile_mode_defaults_to_quarantine() {
        let cli = parse_from(["homestead", "reconcile"]);
        match cli.command {
            Commands::Reconcile { mode } => {
                assert!(matches!(ReconcileMode::from(mode), ReconcileMode::Quarantine));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
