//! PostgreSQL ledger store.
//!
//! Every unit of work locks the strategy row (`SELECT ... FOR UPDATE`) before
//! touching its entries, so mutations of one strategy serialize while other
//! strategies proceed in parallel.

use chrono::NaiveDate;
use postgres::error::SqlState;
use postgres::{NoTls, Row, Transaction};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::error::LedgerError;
use crate::domain::ledger_entry::{DailyEntry, EntryId, LedgerEntry, StrategyId, UserId};
use crate::domain::page::{Page, PageRequest};
use crate::domain::strategy::{LedgerSummary, StrategyRef};
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::{LedgerPort, LedgerTx};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS strategies (
        strategy_id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        owner_id BIGINT NOT NULL,
        total_transactions BIGINT NOT NULL DEFAULT 0,
        cumulative_profit_loss NUMERIC(19, 2) NOT NULL DEFAULT 0,
        last_aggregated_date DATE
    );
    CREATE TABLE IF NOT EXISTS daily_analysis (
        daily_analysis_id BIGSERIAL PRIMARY KEY,
        strategy_id BIGINT NOT NULL REFERENCES strategies(strategy_id),
        daily_date DATE NOT NULL,
        transaction_count INTEGER NOT NULL CHECK (transaction_count >= 0),
        profit_loss NUMERIC(19, 2) NOT NULL,
        processed BOOLEAN NOT NULL DEFAULT FALSE,
        superseded_at TIMESTAMPTZ
    );
    CREATE UNIQUE INDEX IF NOT EXISTS ux_daily_analysis_current
        ON daily_analysis(strategy_id, daily_date) WHERE superseded_at IS NULL;
    CREATE INDEX IF NOT EXISTS idx_daily_analysis_strategy_date
        ON daily_analysis(strategy_id, daily_date);";

const ENTRY_COLUMNS: &str =
    "daily_analysis_id, strategy_id, daily_date, transaction_count, profit_loss, processed";

const STRATEGY_COLUMNS: &str =
    "strategy_id, name, owner_id, total_transactions, cumulative_profit_loss, last_aggregated_date";

type Manager = PostgresConnectionManager<NoTls>;

pub struct PostgresAdapter {
    pool: Pool<Manager>,
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, LedgerError> {
        let conninfo = config.require_string("database", "conninfo")?;
        let pg_config: postgres::Config =
            conninfo.parse().map_err(|e: postgres::Error| LedgerError::ConfigInvalid {
                section: "database".into(),
                key: "conninfo".into(),
                reason: e.to_string(),
            })?;

        let pool_size = config.get_int("database", "pool_size", 4).max(1) as u32;
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(PostgresConnectionManager::new(pg_config, NoTls))
            .map_err(pool_error)?;

        debug!(pool_size, "postgres ledger store opened");
        Ok(Self { pool })
    }

    fn connection(&self) -> Result<PooledConnection<Manager>, LedgerError> {
        self.pool.get().map_err(pool_error)
    }
}

fn pool_error(e: r2d2::Error) -> LedgerError {
    LedgerError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: postgres::Error) -> LedgerError {
    LedgerError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn count_column(row: &Row, idx: usize) -> Result<u32, LedgerError> {
    let raw: i32 = row.try_get(idx).map_err(query_error)?;
    u32::try_from(raw).map_err(|_| LedgerError::DatabaseQuery {
        reason: format!("negative transaction count {raw} in daily_analysis"),
    })
}

fn entry_from_row(row: &Row) -> Result<LedgerEntry, LedgerError> {
    Ok(LedgerEntry {
        id: EntryId(row.try_get(0).map_err(query_error)?),
        strategy_id: StrategyId(row.try_get(1).map_err(query_error)?),
        date: row.try_get(2).map_err(query_error)?,
        transaction_count: count_column(row, 3)?,
        profit_loss: row.try_get(4).map_err(query_error)?,
        processed: row.try_get(5).map_err(query_error)?,
    })
}

fn strategy_from_row(row: &Row) -> Result<StrategyRef, LedgerError> {
    Ok(StrategyRef {
        id: StrategyId(row.try_get(0).map_err(query_error)?),
        name: row.try_get(1).map_err(query_error)?,
        owner_id: UserId(row.try_get(2).map_err(query_error)?),
        summary: LedgerSummary {
            total_transactions: row.try_get(3).map_err(query_error)?,
            cumulative_profit_loss: row.try_get(4).map_err(query_error)?,
            last_aggregated_date: row.try_get(5).map_err(query_error)?,
        },
    })
}

fn entries_from_rows(rows: Vec<Row>) -> Result<Vec<LedgerEntry>, LedgerError> {
    rows.iter().map(entry_from_row).collect()
}

fn to_pg_count(transaction_count: u32) -> Result<i32, LedgerError> {
    i32::try_from(transaction_count).map_err(|_| LedgerError::InvalidEntry {
        reason: format!("transaction count {transaction_count} is too large"),
    })
}

/// [`LedgerTx`] over an open PostgreSQL transaction.
struct PostgresUnit<'a, 't> {
    tx: &'a mut Transaction<'t>,
}

impl PostgresUnit<'_, '_> {
    fn insert_row(
        &mut self,
        strategy_id: StrategyId,
        date: NaiveDate,
        transaction_count: u32,
        profit_loss: Decimal,
    ) -> Result<EntryId, LedgerError> {
        let count = to_pg_count(transaction_count)?;
        let row = self
            .tx
            .query_one(
                "INSERT INTO daily_analysis
                    (strategy_id, daily_date, transaction_count, profit_loss, processed)
                 VALUES ($1, $2, $3, $4, FALSE)
                 RETURNING daily_analysis_id",
                &[&strategy_id.0, &date, &count, &profit_loss],
            )
            .map_err(|e| {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    LedgerError::DailyAnalysisAlreadyExists { strategy_id, date }
                } else {
                    query_error(e)
                }
            })?;
        Ok(EntryId(row.try_get(0).map_err(query_error)?))
    }

    fn select_entry(
        &mut self,
        sql: &str,
        params: &[&(dyn postgres::types::ToSql + Sync)],
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        self.tx
            .query_opt(sql, params)
            .map_err(query_error)?
            .as_ref()
            .map(entry_from_row)
            .transpose()
    }
}

fn expect_one(changed: u64, entry_id: EntryId) -> Result<(), LedgerError> {
    if changed == 0 {
        return Err(LedgerError::InvalidEntryReference { entry_id });
    }
    Ok(())
}

impl LedgerTx for PostgresUnit<'_, '_> {
    fn find_strategy(
        &mut self,
        strategy_id: StrategyId,
    ) -> Result<Option<StrategyRef>, LedgerError> {
        self.tx
            .query_opt(
                &format!(
                    "SELECT {STRATEGY_COLUMNS} FROM strategies WHERE strategy_id = $1 FOR UPDATE"
                ),
                &[&strategy_id.0],
            )
            .map_err(query_error)?
            .as_ref()
            .map(strategy_from_row)
            .transpose()
    }

    fn reset_strategy_summary(&mut self, strategy_id: StrategyId) -> Result<(), LedgerError> {
        let changed = self
            .tx
            .execute(
                "UPDATE strategies
                 SET total_transactions = 0, cumulative_profit_loss = 0,
                     last_aggregated_date = NULL
                 WHERE strategy_id = $1",
                &[&strategy_id.0],
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
        self.select_entry(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM daily_analysis
                 WHERE strategy_id = $1 AND daily_date = $2 AND superseded_at IS NULL"
            ),
            &[&strategy_id.0, &date],
        )
    }

    fn find_by_id(&mut self, entry_id: EntryId) -> Result<Option<LedgerEntry>, LedgerError> {
        self.select_entry(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM daily_analysis
                 WHERE daily_analysis_id = $1 AND superseded_at IS NULL"
            ),
            &[&entry_id.0],
        )
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
        let count = to_pg_count(transaction_count)?;
        let changed = self
            .tx
            .execute(
                "UPDATE daily_analysis SET transaction_count = $1, profit_loss = $2
                 WHERE daily_analysis_id = $3 AND superseded_at IS NULL",
                &[&count, &profit_loss, &entry_id.0],
            )
            .map_err(query_error)?;
        expect_one(changed, entry_id)
    }

    fn supersede(
        &mut self,
        entry_id: EntryId,
        transaction_count: u32,
        profit_loss: Decimal,
    ) -> Result<EntryId, LedgerError> {
        let row = self
            .tx
            .query_opt(
                "UPDATE daily_analysis SET superseded_at = now()
                 WHERE daily_analysis_id = $1 AND superseded_at IS NULL
                 RETURNING strategy_id, daily_date",
                &[&entry_id.0],
            )
            .map_err(query_error)?
            .ok_or(LedgerError::InvalidEntryReference { entry_id })?;

        let strategy_id = StrategyId(row.try_get(0).map_err(query_error)?);
        let date: NaiveDate = row.try_get(1).map_err(query_error)?;
        self.insert_row(strategy_id, date, transaction_count, profit_loss)
    }

    fn set_processed(&mut self, entry_id: EntryId, processed: bool) -> Result<(), LedgerError> {
        let changed = self
            .tx
            .execute(
                "UPDATE daily_analysis SET processed = $1
                 WHERE daily_analysis_id = $2 AND superseded_at IS NULL",
                &[&processed, &entry_id.0],
            )
            .map_err(query_error)?;
        expect_one(changed, entry_id)
    }

    fn delete_by_id(&mut self, entry_id: EntryId) -> Result<(), LedgerError> {
        let changed = self
            .tx
            .execute(
                "DELETE FROM daily_analysis
                 WHERE daily_analysis_id = $1 AND superseded_at IS NULL",
                &[&entry_id.0],
            )
            .map_err(query_error)?;
        expect_one(changed, entry_id)
    }

    fn find_earliest_after(
        &mut self,
        strategy_id: StrategyId,
        date: NaiveDate,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        self.select_entry(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM daily_analysis
                 WHERE strategy_id = $1 AND daily_date > $2 AND superseded_at IS NULL
                 ORDER BY daily_date ASC LIMIT 1"
            ),
            &[&strategy_id.0, &date],
        )
    }

    fn delete_all_by_strategy(&mut self, strategy_id: StrategyId) -> Result<usize, LedgerError> {
        let removed = self
            .tx
            .execute(
                "DELETE FROM daily_analysis WHERE strategy_id = $1",
                &[&strategy_id.0],
            )
            .map_err(query_error)?;
        Ok(removed as usize)
    }
}

impl LedgerPort for PostgresAdapter {
    fn initialize_schema(&self) -> Result<(), LedgerError> {
        self.connection()?.batch_execute(SCHEMA).map_err(query_error)
    }

    fn atomically(
        &self,
        work: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<(), LedgerError>,
    ) -> Result<(), LedgerError> {
        let mut conn = self.connection()?;
        let mut tx = conn.transaction().map_err(query_error)?;

        // An uncommitted transaction rolls back on drop.
        work(&mut PostgresUnit { tx: &mut tx })?;

        tx.commit().map_err(query_error)
    }

    fn list_entries(
        &self,
        strategy_id: StrategyId,
        request: &PageRequest,
    ) -> Result<Page<LedgerEntry>, LedgerError> {
        let mut conn = self.connection()?;

        let total: i64 = conn
            .query_one(
                "SELECT COUNT(*) FROM daily_analysis
                 WHERE strategy_id = $1 AND superseded_at IS NULL",
                &[&strategy_id.0],
            )
            .and_then(|row| row.try_get(0))
            .map_err(query_error)?;

        let limit = i64::from(request.size);
        let offset = i64::try_from(request.offset()).unwrap_or(i64::MAX);
        let rows = conn
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM daily_analysis
                     WHERE strategy_id = $1 AND superseded_at IS NULL
                     ORDER BY daily_date {} LIMIT $2 OFFSET $3",
                    request.order.as_sql()
                ),
                &[&strategy_id.0, &limit, &offset],
            )
            .map_err(query_error)?;

        Ok(Page::new(
            entries_from_rows(rows)?,
            request,
            total.max(0) as u64,
        ))
    }

    fn entries_in_range(
        &self,
        strategy_id: StrategyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = self
            .connection()?
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM daily_analysis
                     WHERE strategy_id = $1 AND daily_date >= $2 AND daily_date <= $3
                       AND superseded_at IS NULL
                     ORDER BY daily_date ASC"
                ),
                &[&strategy_id.0, &from, &to],
            )
            .map_err(query_error)?;
        entries_from_rows(rows)
    }

    fn entry_history(
        &self,
        strategy_id: StrategyId,
        date: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = self
            .connection()?
            .query(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM daily_analysis
                     WHERE strategy_id = $1 AND daily_date = $2
                     ORDER BY daily_analysis_id ASC"
                ),
                &[&strategy_id.0, &date],
            )
            .map_err(query_error)?;
        entries_from_rows(rows)
    }

    fn register_strategy(
        &self,
        name: &str,
        owner_id: UserId,
    ) -> Result<StrategyRef, LedgerError> {
        let row = self
            .connection()?
            .query_one(
                "INSERT INTO strategies (name, owner_id) VALUES ($1, $2) RETURNING strategy_id",
                &[&name, &owner_id.0],
            )
            .map_err(query_error)?;

        Ok(StrategyRef {
            id: StrategyId(row.try_get(0).map_err(query_error)?),
            name: name.to_string(),
            owner_id,
            summary: LedgerSummary::default(),
        })
    }

    fn get_strategy(&self, strategy_id: StrategyId) -> Result<Option<StrategyRef>, LedgerError> {
        self.connection()?
            .query_opt(
                &format!("SELECT {STRATEGY_COLUMNS} FROM strategies WHERE strategy_id = $1"),
                &[&strategy_id.0],
            )
            .map_err(query_error)?
            .as_ref()
            .map(strategy_from_row)
            .transpose()
    }

    fn update_strategy_summary(
        &self,
        strategy_id: StrategyId,
        summary: &LedgerSummary,
    ) -> Result<(), LedgerError> {
        let changed = self
            .connection()?
            .execute(
                "UPDATE strategies
                 SET total_transactions = $1, cumulative_profit_loss = $2,
                     last_aggregated_date = $3
                 WHERE strategy_id = $4",
                &[
                    &summary.total_transactions,
                    &summary.cumulative_profit_loss,
                    &summary.last_aggregated_date,
                    &strategy_id.0,
                ],
            )
            .map_err(query_error)?;
        if changed == 0 {
            return Err(LedgerError::StrategyNotFound { strategy_id });
        }
        Ok(())
    }
}
