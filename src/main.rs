use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payledger::application::controller::{ControllerConfig, PluginController};
use payledger::application::registry::PluginRegistry;
use payledger::domain::ports::PaymentStoreBox;
use payledger::infrastructure::in_memory::InMemoryPaymentStore;
#[cfg(feature = "storage-rocksdb")]
use payledger::infrastructure::rocksdb::RocksDBStore;
use payledger::infrastructure::sandbox::{SandboxBehaviour, SandboxPlugin};
use payledger::interfaces::csv::operation_reader::OperationReader;
use payledger::interfaces::csv::script_runner::ScriptRunner;
use payledger::interfaces::csv::summary_writer::SummaryWriter;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input operations CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// How long a gateway call may take before the transaction is left pending
    #[arg(long, env = "PAYLEDGER_DISPATCH_TIMEOUT_MS", default_value_t = 30_000)]
    dispatch_timeout_ms: u64,

    /// Currency for instruction rows that leave the column empty
    #[arg(long, env = "PAYLEDGER_CURRENCY", default_value = "EUR")]
    currency: String,

    /// Log filter, e.g. `info` or `payledger=debug`
    #[arg(long, env = "PAYLEDGER_LOG", default_value = "warn")]
    log_level: String,
}

fn open_store(db_path: Option<PathBuf>) -> Result<PaymentStoreBox> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => Ok(Box::new(RocksDBStore::open(path).into_diagnostic()?)),
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Box::new(InMemoryPaymentStore::new()))
        }
        None => Ok(Box::new(InMemoryPaymentStore::new())),
    }
}

fn sandbox_plugins() -> PluginRegistry {
    let mut plugins = PluginRegistry::new();
    plugins.register_queryable("sandbox", Arc::new(SandboxPlugin::new(SandboxBehaviour::Settle)));
    plugins.register(
        "sandbox_decline",
        Arc::new(SandboxPlugin::new(SandboxBehaviour::Decline)),
    );
    plugins.register(
        "sandbox_partial",
        Arc::new(SandboxPlugin::new(SandboxBehaviour::SettleHalf)),
    );
    plugins
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).into_diagnostic()?)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    let controller = PluginController::new(
        open_store(cli.db_path)?,
        sandbox_plugins(),
        ControllerConfig {
            dispatch_timeout: Duration::from_millis(cli.dispatch_timeout_ms),
        },
    );

    // Process operations
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = OperationReader::new(file);
    let mut runner = ScriptRunner::new(&controller, cli.currency);
    for record in reader.operations() {
        match record {
            Ok(record) => {
                if let Err(e) = runner.run(record).await {
                    eprintln!("Error processing operation: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading operation: {}", e);
            }
        }
    }

    // Output final state
    let rows = runner.summary().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = SummaryWriter::new(stdout.lock());
    writer.write_rows(rows).into_diagnostic()?;

    Ok(())
}
