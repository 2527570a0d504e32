use clap::Parser;
use marketflow::application::engine::{MarketEngine, Stores};
use marketflow::config::LifecycleConfig;
use marketflow::infrastructure::clock::SystemClock;
use marketflow::infrastructure::push::LogPushTransport;
use marketflow::interfaces::csv::command_reader::CommandReader;
use marketflow::interfaces::csv::record_writer::RecordWriter;
use marketflow::interfaces::replay::Replayer;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Lifecycle commands CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// TOML file with lifecycle settings; `MARKETFLOW_*` variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log every stored notification as a push delivery.
    #[arg(long)]
    log_push: bool,
}

fn load_config(path: Option<&PathBuf>) -> marketflow::error::Result<LifecycleConfig> {
    match path {
        Some(path) => LifecycleConfig::from_file(path)?
            .with_overrides(|name| std::env::var(name).ok()),
        None => LifecycleConfig::from_env(),
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    use marketflow::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "opening rocksdb store");
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok(Stores::shared(store))
        }
        None => Ok(Stores::in_memory()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' \
             feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Stores::in_memory())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marketflow=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref()).into_diagnostic()?;
    let stores = open_stores(cli.db_path)?;
    let clock = Arc::new(SystemClock);
    let engine = if cli.log_push {
        MarketEngine::with_push(stores, clock, config, Arc::new(LogPushTransport))
    } else {
        MarketEngine::new(stores, clock, config)
    };

    let file = File::open(cli.input).into_diagnostic()?;
    let mut replayer = Replayer::new(engine);
    for (line, command) in CommandReader::new(file).commands().enumerate() {
        // Line 1 is the header.
        let line = line + 2;
        match command {
            Ok(command) => {
                if let Err(e) = replayer.apply(command).await {
                    eprintln!("Error applying command on line {}: {}", line, e);
                }
            }
            Err(e) => {
                eprintln!("Error reading command on line {}: {}", line, e);
            }
        }
    }

    let engine = replayer.engine();
    engine.notifications.settled().await;
    let orders = engine.orders.all_orders().await.into_diagnostic()?;
    let bookings = engine.bookings.all_bookings().await.into_diagnostic()?;
    tracing::info!(orders = orders.len(), bookings = bookings.len(), "replay finished");

    let stdout = io::stdout();
    let mut writer = RecordWriter::new(stdout.lock());
    writer.write_records(&orders, &bookings).into_diagnostic()?;

    Ok(())
}
