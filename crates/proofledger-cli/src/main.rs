//! proofledger - proof record and ticket ledger
//!
//! Runs one ledger operation per invocation and prints its JSON result.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proofledger_core::config::{LedgerConfig, StoreBackend};
use proofledger_core::identity::{IdentityProvider, provider_for};
use proofledger_core::store::LedgerStore;
use proofledger_core::ProofRecordsContract;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod input;

const DEFAULT_CONFIG: &str = "proofledger.toml";

type Contract = ProofRecordsContract<Box<dyn LedgerStore>, Box<dyn IdentityProvider>>;

/// proofledger - proof record and ticket ledger
#[derive(Parser, Debug)]
#[command(name = "proofledger")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file [default: proofledger.toml if present]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// `SQLite` database file (overrides the configured store)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Caller identity stamped into `createdBy`
    #[arg(long)]
    identity: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that the ledger is readable
    Init,

    // === Proof records ===
    /// Create a proof record from a JSON payload (inline, @file or -)
    CreateRecord {
        /// Record JSON
        payload: String,
    },

    /// Show one proof record
    Record {
        /// Record key
        key: String,
    },

    /// List every proof record
    Records,

    /// List proof records whose field equals a value
    RecordsByField {
        /// Field name
        field: String,

        /// Value to match
        value: String,
    },

    /// Show the version history of a key
    History {
        /// Record or ticket key
        key: String,
    },

    // === Tickets ===
    /// Create a ticket from a JSON payload (inline, @file or -)
    CreateTicket {
        /// Ticket JSON
        payload: String,
    },

    /// Show one ticket
    Ticket {
        /// Ticket key
        key: String,
    },

    /// List every ticket
    Tickets,

    /// List tickets whose field equals a value
    TicketsByField {
        /// Field name
        field: String,

        /// Value to match
        value: String,
    },

    // === Reconciliation ===
    /// Compare weights grouped by press increment
    ComparePress {
        /// Delete violating proof records
        #[arg(long)]
        delete: bool,
    },

    /// Compare weights grouped by store increment
    CompareStore {
        /// Delete violating proof records
        #[arg(long)]
        delete: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    let config = load_config(&cli)?;
    let store = config.open_store().context("failed to open ledger store")?;
    let contract: Contract = ProofRecordsContract::new(store, provider_for(config.identity.as_deref()))
        .with_query_failure_policy(config.duplicates.on_query_error);

    let output = run(&contract, &cli.command)?;
    println!("{output}");
    Ok(())
}

fn load_config(cli: &Cli) -> Result<LedgerConfig> {
    let mut config = match &cli.config {
        Some(path) => LedgerConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG).exists() => {
            LedgerConfig::from_file(Path::new(DEFAULT_CONFIG))
                .with_context(|| format!("failed to load {DEFAULT_CONFIG}"))?
        },
        None => LedgerConfig::default(),
    };

    if let Some(db) = &cli.db {
        config.store.backend = StoreBackend::Sqlite;
        config.store.path = Some(db.clone());
    }
    if let Some(identity) = &cli.identity {
        config.identity = Some(identity.clone());
    }
    config.validate().context("invalid configuration")?;

    debug!(backend = ?config.store.backend, path = ?config.store.path, "configuration resolved");
    Ok(config)
}

fn run(contract: &Contract, command: &Commands) -> Result<String> {
    let output = match command {
        Commands::Init => {
            contract.init_ledger().context("failed to initialise ledger")?;
            r#"{"success":true}"#.to_string()
        },
        Commands::CreateRecord { payload } => {
            contract.create_proof_record(&input::read_payload(payload)?)
        },
        Commands::Record { key } => contract.query_proof_record(key)?,
        Commands::Records => contract.query_all_proof_records()?,
        Commands::RecordsByField { field, value } => contract.query_records_by_field(field, value),
        Commands::History { key } => contract.get_record_history(key)?,
        Commands::CreateTicket { payload } => contract.create_ticket(&input::read_payload(payload)?),
        Commands::Ticket { key } => contract.query_ticket(key)?,
        Commands::Tickets => contract.query_all_tickets()?,
        Commands::TicketsByField { field, value } => contract.query_tickets_by_field(field, value),
        Commands::ComparePress { delete } => {
            contract.compare_weights_by_press_increment(&delete.to_string())
        },
        Commands::CompareStore { delete } => {
            contract.compare_weights_by_store_increment(&delete.to_string())
        },
    };
    Ok(output)
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
    fn db_flag_overrides_backend() {
        let cli = Cli::parse_from(["proofledger", "--db", "/tmp/x.db", "--identity", "alice", "records"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.store.path, Some(PathBuf::from("/tmp/x.db")));
        assert_eq!(config.identity.as_deref(), Some("alice"));
    }

    #[test]
    fn blank_identity_is_rejected() {
        let cli = Cli::parse_from(["proofledger", "--db", "/tmp/x.db", "--identity", " ", "records"]);
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn compare_flag_parses() {
        let cli = Cli::parse_from(["proofledger", "compare-press", "--delete"]);
        assert!(matches!(cli.command, Commands::ComparePress { delete: true }));
    }
}
