use clap::Parser;
use laundry_engine::application::engine::{Collaborators, LaundryEngine};
use laundry_engine::config::{EngineSettings, load_prices};
use laundry_engine::domain::machine::Machine;
use laundry_engine::domain::ports::{Clock, RecordStoreRef};
use laundry_engine::domain::user::{Branch, UserProfile};
use laundry_engine::infrastructure::clock::SystemClock;
use laundry_engine::infrastructure::in_memory::{
    InMemoryBranchDirectory, InMemoryMachineCatalog, InMemoryRecordStore, InMemoryUserDirectory,
};
use laundry_engine::infrastructure::ledger::LedgerPaymentGateway;
use laundry_engine::interfaces::csv::catalog_reader::CatalogReader;
use laundry_engine::interfaces::json::command_reader::CommandReader;
use laundry_engine::interfaces::json::outcome_writer::OutcomeWriter;
use miette::{IntoDiagnostic, Result, WrapErr};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{self, BufReader, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON-lines file of commands to run
    input: PathBuf,

    /// Machines CSV (serial, branch_id, machine_type, weight, is_active)
    #[arg(long)]
    machines: Option<PathBuf>,

    /// Users CSV (user_id, email, phone, first_name, last_name, profile_image_url, role)
    #[arg(long)]
    users: Option<PathBuf>,

    /// Branches CSV (branch_id, owner_user_id)
    #[arg(long)]
    branches: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JSON price list overriding the defaults
    #[arg(long)]
    prices: Option<PathBuf>,

    #[command(flatten)]
    settings: EngineSettings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let prices = cli
        .prices
        .as_deref()
        .map(load_prices)
        .transpose()?
        .unwrap_or_default();
    let config = cli.settings.into_config(prices)?;

    let store = open_store(cli.db_path)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let machines = InMemoryMachineCatalog::new(store.clone());
    for machine in read_rows::<Machine>(cli.machines.as_deref(), "machines")? {
        machines.add(machine).await;
    }
    let users = InMemoryUserDirectory::new();
    for user in read_rows::<UserProfile>(cli.users.as_deref(), "users")? {
        users.add(user).await;
    }
    let branches = InMemoryBranchDirectory::new();
    for branch in read_rows::<Branch>(cli.branches.as_deref(), "branches")? {
        branches.add(branch).await;
    }

    let payments = LedgerPaymentGateway::new(store.clone(), clock.clone(), config.payment_ttl);
    let engine = LaundryEngine::new(
        Collaborators {
            store,
            payments: Arc::new(payments),
            machines: Arc::new(machines),
            users: Arc::new(users),
            branches: Arc::new(branches),
            clock,
        },
        &config,
    );
    let scheduler = engine.start_scheduler();

    let file = File::open(&cli.input)
        .into_diagnostic()
        .wrap_err_with(|| format!("cannot open command file {}", cli.input.display()))?;
    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());
    for command in CommandReader::new(BufReader::new(file)).commands() {
        match command {
            Ok(command) => {
                let op = command.name();
                let outcome = command.execute(&engine).await;
                if let Err(e) = &outcome {
                    info!(op, reason = e.reason(), error = %e, "Command rejected");
                }
                writer.write(&outcome).into_diagnostic()?;
            }
            Err(e) => warn!(error = ?e, "Skipping malformed command"),
        }
    }
    writer.flush().into_diagnostic()?;

    scheduler.stop().await;
    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<PathBuf>) -> Result<RecordStoreRef> {
    use laundry_engine::infrastructure::rocksdb::RocksDbRecordStore;

    match db_path {
        Some(path) => {
            let store = RocksDbRecordStore::open(&path)?;
            info!(path = %path.display(), "Using RocksDB record store");
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryRecordStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<PathBuf>) -> Result<RecordStoreRef> {
    if db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
        );
    }
    Ok(Arc::new(InMemoryRecordStore::new()))
}

/// Loads a seed catalog, skipping rows that fail to parse.
fn read_rows<T: DeserializeOwned>(path: Option<&Path>, catalog: &str) -> Result<Vec<T>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let file = File::open(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("cannot open {catalog} file {}", path.display()))?;

    let mut rows = Vec::new();
    for row in CatalogReader::new(file).rows() {
        match row {
            Ok(row) => rows.push(row),
            Err(e) => warn!(catalog, error = %e, "Skipping malformed catalog row"),
        }
    }
    info!(catalog, count = rows.len(), "Catalog loaded");
    Ok(rows)
}
