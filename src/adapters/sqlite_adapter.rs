//! SQLite ledger store.
//!
//! Units of work run in `BEGIN IMMEDIATE` transactions, so concurrent writers
//! serialize on the database lock. A partial unique index over current rows is
//! the final guard against two rows for one (strategy, date).

use chrono::{NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::domain::error::LedgerError;
use crate::domain::ledger_entry::{
    DailyEntry, EntryId, LedgerEntry, StrategyId, UserId, DATE_FORMAT,
};
use crate::domain::page::{Page, PageRequest};
use crate::domain::strategy::{LedgerSummary, StrategyRef};
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::{LedgerPort, LedgerTx};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS strategies (
        strategy_id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        owner_id INTEGER NOT NULL,
        total_transactions INTEGER NOT NULL DEFAULT 0,
        cumulative_profit_loss TEXT NOT NULL DEFAULT '0',
        last_aggregated_date TEXT
    );
    CREATE TABLE IF NOT EXISTS daily_analysis (
        daily_analysis_id INTEGER PRIMARY KEY AUTOINCREMENT,
        strategy_id INTEGER NOT NULL REFERENCES strategies(strategy_id),
        daily_date TEXT NOT NULL,
        transaction_count INTEGER NOT NULL CHECK (transaction_count >= 0),
        profit_loss TEXT NOT NULL,
        processed INTEGER NOT NULL DEFAULT 0,
        superseded_at TEXT
    );
    CREATE UNIQUE INDEX IF NOT EXISTS ux_daily_analysis_current
        ON daily_analysis(strategy_id, daily_date) WHERE superseded_at IS NULL;
    CREATE INDEX IF NOT EXISTS idx_daily_analysis_strategy_date
        ON daily_analysis(strategy_id, daily_date);";

const ENTRY_COLUMNS: &str =
    "daily_analysis_id, strategy_id, daily_date, transaction_count, profit_loss, processed";

const STRATEGY_COLUMNS: &str =
    "strategy_id, name, owner_id, total_transactions, cumulative_profit_loss, last_aggregated_date";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, LedgerError> {
        let db_path = config.require_string("database", "path")?;
        if db_path == ":memory:" {
            return Self::in_memory();
        }

        let pool_size = config.get_int("database", "pool_size", 4).max(1) as u32;
        Self::open(Path::new(&db_path), pool_size)
    }

    /// Opens a database file shared by up to `pool_size` connections.
    /// Writers wait on each other through `busy_timeout`.
    pub fn open(path: &Path, pool_size: u32) -> Result<Self, LedgerError> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        });
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(pool_error)?;

        debug!(path = %path.display(), pool_size, "sqlite ledger store opened");
        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, LedgerError> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>, LedgerError> {
        self.pool.get().map_err(pool_error)
    }
}

fn pool_error(e: r2d2::Error) -> LedgerError {
    LedgerError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> LedgerError {
    LedgerError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        id: EntryId(row.get(0)?),
        strategy_id: StrategyId(row.get(1)?),
        date: date_column(row, 2)?,
        transaction_count: row.get(3)?,
        profit_loss: decimal_column(row, 4)?,
        processed: row.get(5)?,
    })
}

fn strategy_from_row(row: &Row<'_>) -> rusqlite::Result<StrategyRef> {
    let last_aggregated_date = match row.get::<_, Option<String>>(5)? {
        Some(raw) => {
            Some(NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(5, e))?)
        }
        None => None,
    };
    Ok(StrategyRef {
        id: StrategyId(row.get(0)?),
        name: row.get(1)?,
        owner_id: UserId(row.get(2)?),
        summary: LedgerSummary {
            total_transactions: row.get(3)?,
            cumulative_profit_loss: decimal_column(row, 4)?,
            last_aggregated_date,
        },
    })
}

fn select_strategy(
    conn: &Connection,
    strategy_id: StrategyId,
) -> Result<Option<StrategyRef>, LedgerError> {
    conn.query_row(
        &format!("SELECT {STRATEGY_COLUMNS} FROM strategies WHERE strategy_id = ?1"),
        params![strategy_id.0],
        strategy_from_row,
    )
    .optional()
    .map_err(query_error)
}

fn select_entries(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<LedgerEntry>, LedgerError> {
    let mut stmt = conn.prepare(sql).map_err(query_error)?;
    let rows = stmt
        .query_map(params, entry_from_row)
        .map_err(query_error)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row.map_err(query_error)?);
    }
    Ok(entries)
}

/// [`LedgerTx`] over an open SQLite transaction.
struct SqliteUnit<'c> {
    conn: &'c Connection,
}

impl SqliteUnit<'_> {
    fn insert_row(
        &self,
        strategy_id: StrategyId,
        date: NaiveDate,
        transaction_count: u32,
        profit_loss: Decimal,
    ) -> Result<EntryId, LedgerError> {
        self.conn
            .execute(
                "INSERT INTO daily_analysis
                    (strategy_id, daily_date, transaction_count, profit_loss, processed)
                 VALUES (?1, ?2, ?3, ?4, 0)",
                params![
                    strategy_id.0,
                    format_date(date),
                    transaction_count,
                    profit_loss.to_string()
                ],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    LedgerError::DailyAnalysisAlreadyExists { strategy_id, date }
                } else {
                    query_error(e)
                }
            })?;
        Ok(EntryId(self.conn.last_insert_rowid()))
    }

    fn expect_one(&self, changed: usize, entry_id: EntryId) -> Result<(), LedgerError> {
        if changed == 0 {
            return Err(LedgerError::InvalidEntryReference { entry_id });
        }
        Ok(())
    }
}

impl LedgerTx for SqliteUnit<'_> {
    fn find_strategy(
        &mut self,
        strategy_id: StrategyId,
    ) -> Result<Option<StrategyRef>, LedgerError> {
        select_strategy(self.conn, strategy_id)
    }

    fn reset_strategy_summary(&mut self, strategy_id: StrategyId) -> Result<(), LedgerError> {
        let changed = self
            .conn
            .execute(
                "UPDATE strategies
                 SET total_transactions = 0, cumulative_profit_loss = '0',
                     last_aggregated_date = NULL
                 WHERE strategy_id = ?1",
                params![strategy_id.0],
            )
            .map_err(query_error)?;
        if changed == 0 {
            return Err(LedgerError::StrategyNotFound { strategy_id });
        }
        Ok(())
    }

    fn find_by_strategy_and_date(
        &mut self,
        strategy_id: StrategyId,
        date: NaiveDate,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM daily_analysis
                     WHERE strategy_id = ?1 AND daily_date = ?2 AND superseded_at IS NULL"
                ),
                params![strategy_id.0, format_date(date)],
                entry_from_row,
            )
            .optional()
            .map_err(query_error)
    }

    fn find_by_id(&mut self, entry_id: EntryId) -> Result<Option<LedgerEntry>, LedgerError> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM daily_analysis
                     WHERE daily_analysis_id = ?1 AND superseded_at IS NULL"
                ),
                params![entry_id.0],
                entry_from_row,
            )
            .optional()
            .map_err(query_error)
    }

    fn insert(
        &mut self,
        strategy_id: StrategyId,
        entry: &DailyEntry,
    ) -> Result<EntryId, LedgerError> {
        self.insert_row(
            strategy_id,
            entry.date,
            entry.transaction_count,
            entry.profit_loss,
        )
    }

    fn update_in_place(
        &mut self,
        entry_id: EntryId,
        transaction_count: u32,
        profit_loss: Decimal,
    ) -> Result<(), LedgerError> {
        let changed = self
            .conn
            .execute(
                "UPDATE daily_analysis SET transaction_count = ?1, profit_loss = ?2
                 WHERE daily_analysis_id = ?3 AND superseded_at IS NULL",
                params![transaction_count, profit_loss.to_string(), entry_id.0],
            )
            .map_err(query_error)?;
        self.expect_one(changed, entry_id)
    }

    fn supersede(
        &mut self,
        entry_id: EntryId,
        transaction_count: u32,
        profit_loss: Decimal,
    ) -> Result<EntryId, LedgerError> {
        let old = self
            .find_by_id(entry_id)?
            .ok_or(LedgerError::InvalidEntryReference { entry_id })?;

        let changed = self
            .conn
            .execute(
                "UPDATE daily_analysis SET superseded_at = ?1
                 WHERE daily_analysis_id = ?2 AND superseded_at IS NULL",
                params![Utc::now().to_rfc3339(), entry_id.0],
            )
            .map_err(query_error)?;
        self.expect_one(changed, entry_id)?;

        self.insert_row(old.strategy_id, old.date, transaction_count, profit_loss)
    }

    fn set_processed(&mut self, entry_id: EntryId, processed: bool) -> Result<(), LedgerError> {
        let changed = self
            .conn
            .execute(
                "UPDATE daily_analysis SET processed = ?1
                 WHERE daily_analysis_id = ?2 AND superseded_at IS NULL",
                params![processed, entry_id.0],
            )
            .map_err(query_error)?;
        self.expect_one(changed, entry_id)
    }

    fn delete_by_id(&mut self, entry_id: EntryId) -> Result<(), LedgerError> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM daily_analysis
                 WHERE daily_analysis_id = ?1 AND superseded_at IS NULL",
                params![entry_id.0],
            )
            .map_err(query_error)?;
        self.expect_one(changed, entry_id)
    }

    fn find_earliest_after(
        &mut self,
        strategy_id: StrategyId,
        date: NaiveDate,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM daily_analysis
                     WHERE strategy_id = ?1 AND daily_date > ?2 AND superseded_at IS NULL
                     ORDER BY daily_date ASC LIMIT 1"
                ),
                params![strategy_id.0, format_date(date)],
                entry_from_row,
            )
            .optional()
            .map_err(query_error)
    }

    fn delete_all_by_strategy(&mut self, strategy_id: StrategyId) -> Result<usize, LedgerError> {
        self.conn
            .execute(
                "DELETE FROM daily_analysis WHERE strategy_id = ?1",
                params![strategy_id.0],
            )
            .map_err(query_error)
    }
}

impl LedgerPort for SqliteAdapter {
    fn initialize_schema(&self) -> Result<(), LedgerError> {
        self.connection()?
            .execute_batch(SCHEMA)
            .map_err(query_error)
    }

    fn atomically(
        &self,
        work: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<(), LedgerError>,
    ) -> Result<(), LedgerError> {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_error)?;

        // Dropping `tx` on the error path rolls the unit back.
        work(&mut SqliteUnit { conn: &tx })?;

        tx.commit().map_err(query_error)
    }

    fn list_entries(
        &self,
        strategy_id: StrategyId,
        request: &PageRequest,
    ) -> Result<Page<LedgerEntry>, LedgerError> {
        let conn = self.connection()?;

        let total: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM daily_analysis
                 WHERE strategy_id = ?1 AND superseded_at IS NULL",
                params![strategy_id.0],
                |row| row.get(0),
            )
            .map_err(query_error)?;

        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM daily_analysis
             WHERE strategy_id = ?1 AND superseded_at IS NULL
             ORDER BY daily_date {} LIMIT ?2 OFFSET ?3",
            request.order.as_sql()
        );
        let offset = i64::try_from(request.offset()).unwrap_or(i64::MAX);
        let content = select_entries(&conn, &sql, params![strategy_id.0, request.size, offset])?;

        Ok(Page::new(content, request, total.max(0) as u64))
    }

    fn entries_in_range(
        &self,
        strategy_id: StrategyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM daily_analysis
             WHERE strategy_id = ?1 AND daily_date >= ?2 AND daily_date <= ?3
               AND superseded_at IS NULL
             ORDER BY daily_date ASC"
        );
        select_entries(
            &conn,
            &sql,
            params![strategy_id.0, format_date(from), format_date(to)],
        )
    }

    fn entry_history(
        &self,
        strategy_id: StrategyId,
        date: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM daily_analysis
             WHERE strategy_id = ?1 AND daily_date = ?2
             ORDER BY daily_analysis_id ASC"
        );
        select_entries(&conn, &sql, params![strategy_id.0, format_date(date)])
    }

    fn register_strategy(
        &self,
        name: &str,
        owner_id: UserId,
    ) -> Result<StrategyRef, LedgerError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO strategies (name, owner_id) VALUES (?1, ?2)",
            params![name, owner_id.0],
        )
        .map_err(query_error)?;

        Ok(StrategyRef {
            id: StrategyId(conn.last_insert_rowid()),
            name: name.to_string(),
            owner_id,
            summary: LedgerSummary::default(),
        })
    }

    fn get_strategy(&self, strategy_id: StrategyId) -> Result<Option<StrategyRef>, LedgerError> {
        let conn = self.connection()?;
        select_strategy(&conn, strategy_id)
    }

    fn update_strategy_summary(
        &self,
        strategy_id: StrategyId,
        summary: &LedgerSummary,
    ) -> Result<(), LedgerError> {
        let conn = self.connection()?;
        let changed = conn
            .execute(
                "UPDATE strategies
                 SET total_transactions = ?1, cumulative_profit_loss = ?2,
                     last_aggregated_date = ?3
                 WHERE strategy_id = ?4",
                params![
                    summary.total_transactions,
                    summary.cumulative_profit_loss.to_string(),
                    summary.last_aggregated_date.map(format_date),
                    strategy_id.0
                ],
            )
            .map_err(query_error)?;
        if changed == 0 {
            return Err(LedgerError::StrategyNotFound { strategy_id });
        }
        Ok(())
    }
}
