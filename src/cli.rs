//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{validate_database_config, Backend};
use crate::domain::error::LedgerError;
use crate::domain::ledger::{LedgerService, ModifyOutcome};
use crate::domain::ledger_entry::{
    parse_date, DailyEntry, EntryId, LedgerEntry, StrategyId, UserId,
};
use crate::domain::page::{PageRequest, DEFAULT_PAGE_SIZE};
use crate::ports::config_port::ConfigPort;
use crate::ports::entry_source_port::EntrySource;
use crate::ports::ledger_port::LedgerPort;

#[derive(Parser, Debug)]
#[command(name = "stratledger", about = "Daily performance ledger for trading strategies")]
pub struct Cli {
    /// INI configuration file
    #[arg(short, long, global = true, default_value = "stratledger.ini")]
    pub config: PathBuf,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the ledger schema
    Init,
    /// Register a strategy and print its id
    RegisterStrategy {
        #[arg(long)]
        name: String,
        #[arg(long)]
        owner: i64,
    },
    /// Record a batch of days from a CSV file (date,transaction,daily_profit_loss)
    Import {
        #[arg(long)]
        strategy: i64,
        #[arg(long)]
        user: i64,
        file: PathBuf,
    },
    /// Change the figures recorded for one day
    Modify {
        #[arg(long)]
        strategy: i64,
        #[arg(long)]
        user: i64,
        #[arg(long)]
        date: String,
        #[arg(long)]
        transactions: i64,
        #[arg(long, allow_hyphen_values = true)]
        profit_loss: String,
    },
    /// Delete one recorded day by entry id
    Delete {
        #[arg(long)]
        strategy: i64,
        #[arg(long)]
        user: i64,
        #[arg(long)]
        entry: i64,
    },
    /// Delete a strategy's whole ledger and reset its summary
    DeleteAll {
        #[arg(long)]
        strategy: i64,
        #[arg(long)]
        user: i64,
    },
    /// Print one page of a strategy's ledger
    List {
        #[arg(long)]
        strategy: i64,
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        size: u32,
        #[arg(long, default_value = "desc")]
        order: String,
    },
    /// Print the current rows between two dates, inclusive, oldest first
    Range {
        #[arg(long)]
        strategy: i64,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Print every stored row for one day, superseded rows included
    History {
        #[arg(long)]
        strategy: i64,
        #[arg(long)]
        date: String,
    },
    /// Start the HTTP API
    Serve,
}

pub fn run(cli: Cli) -> ExitCode {
    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn dispatch(cli: Cli) -> Result<(), LedgerError> {
    let config = load_config(&cli.config)?;
    init_tracing(&config);

    match cli.command {
        Command::Init => {
            open_store(&config)?.initialize_schema()?;
            eprintln!("Ledger schema ready");
            Ok(())
        }
        Command::Serve => run_serve(config),
        Command::RegisterStrategy { name, owner } => {
            let strategy = ledger(&config)?.register_strategy(&name, UserId(owner))?;
            println!("{}", strategy.id);
            Ok(())
        }
        Command::Import {
            strategy,
            user,
            file,
        } => run_import(&ledger(&config)?, StrategyId(strategy), UserId(user), file),
        Command::Modify {
            strategy,
            user,
            date,
            transactions,
            profit_loss,
        } => {
            let entry = DailyEntry::parse(&date, transactions, &profit_loss)?;
            let outcome =
                ledger(&config)?.modify_daily_entry(StrategyId(strategy), UserId(user), &entry)?;
            match outcome {
                ModifyOutcome::UpdatedInPlace(id) => eprintln!("Updated entry {id}"),
                ModifyOutcome::Superseded {
                    retired,
                    replacement,
                } => eprintln!("Entry {retired} was processed; superseded by {replacement}"),
            }
            Ok(())
        }
        Command::Delete {
            strategy,
            user,
            entry,
        } => {
            ledger(&config)?.delete_daily_entry(StrategyId(strategy), UserId(user), EntryId(entry))?;
            eprintln!("Deleted entry {entry}");
            Ok(())
        }
        Command::DeleteAll { strategy, user } => {
            ledger(&config)?.delete_all_daily_entries(StrategyId(strategy), UserId(user))?;
            eprintln!("Cleared ledger of strategy {strategy}");
            Ok(())
        }
        Command::List {
            strategy,
            page,
            size,
            order,
        } => {
            let request = PageRequest::new(page, size, order.parse()?)?;
            let result = ledger(&config)?.list_daily_entries(StrategyId(strategy), &request)?;
            print_entries(&result.content);
            eprintln!(
                "page {} of {} ({} entries)",
                result.page + 1,
                result.total_pages().max(1),
                result.total_elements
            );
            Ok(())
        }
        Command::Range { strategy, from, to } => {
            let (from, to) = (parse_date(&from)?, parse_date(&to)?);
            let rows = ledger(&config)?.entries_between(StrategyId(strategy), from, to)?;
            print_entries(&rows);
            eprintln!("{} entries between {from} and {to}", rows.len());
            Ok(())
        }
        Command::History { strategy, date } => {
            let date = parse_date(&date)?;
            let rows = ledger(&config)?.entry_history(StrategyId(strategy), date)?;
            if rows.is_empty() {
                return Err(LedgerError::DailyAnalysisNotFound {
                    strategy_id: StrategyId(strategy),
                    date,
                });
            }
            print_entries(&rows);
            Ok(())
        }
    }
}

fn ledger(config: &dyn ConfigPort) -> Result<LedgerService, LedgerError> {
    Ok(LedgerService::with_owner_guard(open_store(config)?))
}

fn run_import(
    service: &LedgerService,
    strategy_id: StrategyId,
    acting: UserId,
    file: PathBuf,
) -> Result<(), LedgerError> {
    eprintln!("Reading entries from {}", file.display());
    let entries = CsvAdapter::new(file).read_entries()?;
    service.create_daily_entries(strategy_id, acting, &entries)?;
    eprintln!("Recorded {} days for strategy {strategy_id}", entries.len());
    Ok(())
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, LedgerError> {
    FileConfigAdapter::from_file(path)
}

/// Installs the global subscriber. `RUST_LOG` wins over `[log] filter`.
fn init_tracing(config: &dyn ConfigPort) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(
            config
                .get_string("log", "filter")
                .unwrap_or_else(|| "warn".to_string()),
        )
    });
    // A subscriber may already be installed when `run` is called repeatedly.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Opens the configured backend without touching its schema.
pub fn open_store(config: &dyn ConfigPort) -> Result<Arc<dyn LedgerPort + Send + Sync>, LedgerError> {
    match validate_database_config(config)? {
        Backend::Sqlite => open_sqlite(config),
        Backend::Postgres => open_postgres(config),
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(config: &dyn ConfigPort) -> Result<Arc<dyn LedgerPort + Send + Sync>, LedgerError> {
    use crate::adapters::sqlite_adapter::SqliteAdapter;

    let adapter = SqliteAdapter::from_config(config)?;
    // A fresh in-memory database has no schema yet.
    if config.get_string("database", "path").as_deref() == Some(":memory:") {
        adapter.initialize_schema()?;
    }
    Ok(Arc::new(adapter))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_config: &dyn ConfigPort) -> Result<Arc<dyn LedgerPort + Send + Sync>, LedgerError> {
    Err(backend_unavailable("sqlite"))
}

#[cfg(feature = "postgres")]
fn open_postgres(config: &dyn ConfigPort) -> Result<Arc<dyn LedgerPort + Send + Sync>, LedgerError> {
    use crate::adapters::postgres_adapter::PostgresAdapter;

    Ok(Arc::new(PostgresAdapter::from_config(config)?))
}

#[cfg(not(feature = "postgres"))]
fn open_postgres(_config: &dyn ConfigPort) -> Result<Arc<dyn LedgerPort + Send + Sync>, LedgerError> {
    Err(backend_unavailable("postgres"))
}

#[cfg(any(not(feature = "sqlite"), not(feature = "postgres")))]
fn backend_unavailable(backend: &str) -> LedgerError {
    LedgerError::ConfigInvalid {
        section: "database".into(),
        key: "backend".into(),
        reason: format!("stratledger was built without the {backend} feature"),
    }
}

fn print_entries(entries: &[LedgerEntry]) {
    println!(
        "{:>8}  {:<10}  {:>12}  {:>16}  {}",
        "id", "date", "transactions", "profit_loss", "processed"
    );
    for e in entries {
        println!(
            "{:>8}  {:<10}  {:>12}  {:>16}  {}",
            e.id.0,
            e.date.to_string(),
            e.transaction_count,
            e.profit_loss.to_string(),
            if e.processed { "yes" } else { "no" }
        );
    }
}

#[cfg(any(feature = "web-sqlite", feature = "web-postgres"))]
fn run_serve(config: FileConfigAdapter) -> Result<(), LedgerError> {
    use crate::adapters::web::{build_router, AppState};
    use crate::domain::config_validation::validate_web_config;

    let settings = validate_web_config(&config)?;
    let service = LedgerService::with_owner_guard(open_store(&config)?);
    let router = build_router(AppState {
        service: Arc::new(service),
        default_page_size: settings.default_page_size,
    });

    eprintln!("Starting web server on {}", settings.listen);
    tokio::runtime::Runtime::new()?.block_on(async {
        let listener = tokio::net::TcpListener::bind(settings.listen).await?;
        axum::serve(listener, router).await
    })?;
    Ok(())
}

#[cfg(not(any(feature = "web-sqlite", feature = "web-postgres")))]
fn run_serve(_config: FileConfigAdapter) -> Result<(), LedgerError> {
    Err(LedgerError::ConfigInvalid {
        section: "web".into(),
        key: "listen".into(),
        reason: "stratledger was built without the web feature".into(),
    })
}
