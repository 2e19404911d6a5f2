#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use std::sync::Arc;

use stratledger::adapters::memory_adapter::MemoryAdapter;
use stratledger::domain::error::LedgerError;
use stratledger::domain::ledger::LedgerService;
use stratledger::domain::ledger_entry::{
    DailyEntry, EntryId, LedgerEntry, StrategyId, UserId,
};
use stratledger::domain::page::{Page, PageRequest, SortOrder};
use stratledger::domain::strategy::{LedgerSummary, StrategyRef};
use stratledger::ports::ledger_port::{LedgerPort, LedgerTx};

pub const OWNER: UserId = UserId(1);
pub const STRANGER: UserId = UserId(2);

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn entry(day: &str, count: i64, pl: &str) -> DailyEntry {
    DailyEntry::parse(day, count, pl).unwrap()
}

/// One transaction, one unit of profit, `offset` days after 2024-01-01.
pub fn entry_on(offset: u32) -> DailyEntry {
    let day = date(2024, 1, 1) + Days::new(u64::from(offset));
    DailyEntry::new(day, 1, Decimal::ONE).unwrap()
}

pub type SharedStore = Arc<dyn LedgerPort + Send + Sync>;

/// Service over `store` with one strategy owned by [`OWNER`].
pub fn service_with_strategy(store: SharedStore) -> (LedgerService, StrategyId) {
    let service = LedgerService::with_owner_guard(store);
    let strategy = service.register_strategy("Momentum", OWNER).unwrap();
    (service, strategy.id)
}

pub fn memory_store() -> SharedStore {
    Arc::new(MemoryAdapter::new())
}

#[cfg(feature = "sqlite")]
pub fn sqlite_store() -> SharedStore {
    use stratledger::adapters::sqlite_adapter::SqliteAdapter;

    let adapter = SqliteAdapter::in_memory().unwrap();
    adapter.initialize_schema().unwrap();
    Arc::new(adapter)
}

/// File-backed SQLite store under `dir`, pooled so threads get their own connections.
#[cfg(feature = "sqlite")]
pub fn sqlite_file_store(dir: &std::path::Path) -> SharedStore {
    use stratledger::adapters::sqlite_adapter::SqliteAdapter;

    let adapter = SqliteAdapter::open(&dir.join("ledger.db"), 4).unwrap();
    adapter.initialize_schema().unwrap();
    Arc::new(adapter)
}

pub fn all_entries(service: &LedgerService, id: StrategyId) -> Vec<LedgerEntry> {
    let req = PageRequest::new(0, 100, SortOrder::Asc).unwrap();
    service.list_daily_entries(id, &req).unwrap().content
}

/// Stands in for the downstream aggregation job.
pub fn mark_processed(store: &dyn LedgerPort, entries: &[LedgerEntry]) {
    store
        .atomically(&mut |tx| {
            for e in entries {
                tx.set_processed(e.id, true)?;
            }
            Ok(())
        })
        .unwrap();
}

/// Store whose units fail at the final delete, after every other step ran.
pub struct FailingDeleteStore {
    pub inner: SharedStore,
}

struct FailingDeleteTx<'a> {
    inner: &'a mut dyn LedgerTx,
}

impl LedgerTx for FailingDeleteTx<'_> {
    fn find_strategy(&mut self, id: StrategyId) -> Result<Option<StrategyRef>, LedgerError> {
        self.inner.find_strategy(id)
    }

    fn reset_strategy_summary(&mut self, id: StrategyId) -> Result<(), LedgerError> {
        self.inner.reset_strategy_summary(id)
    }

    fn find_by_strategy_and_date(
        &mut self,
        id: StrategyId,
        date: NaiveDate,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        self.inner.find_by_strategy_and_date(id, date)
    }

    fn find_by_id(&mut self, id: EntryId) -> Result<Option<LedgerEntry>, LedgerError> {
        self.inner.find_by_id(id)
    }

    fn insert(&mut self, id: StrategyId, entry: &DailyEntry) -> Result<EntryId, LedgerError> {
        self.inner.insert(id, entry)
    }

    fn update_in_place(
        &mut self,
        id: EntryId,
        transaction_count: u32,
        profit_loss: Decimal,
    ) -> Result<(), LedgerError> {
        self.inner.update_in_place(id, transaction_count, profit_loss)
    }

    fn supersede(
        &mut self,
        id: EntryId,
        transaction_count: u32,
        profit_loss: Decimal,
    ) -> Result<EntryId, LedgerError> {
        self.inner.supersede(id, transaction_count, profit_loss)
    }

    fn set_processed(&mut self, id: EntryId, processed: bool) -> Result<(), LedgerError> {
        self.inner.set_processed(id, processed)
    }

    fn delete_by_id(&mut self, _id: EntryId) -> Result<(), LedgerError> {
        Err(LedgerError::Database {
            reason: "simulated failure".into(),
        })
    }

    fn find_earliest_after(
        &mut self,
        id: StrategyId,
        date: NaiveDate,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        self.inner.find_earliest_after(id, date)
    }

    fn delete_all_by_strategy(&mut self, id: StrategyId) -> Result<usize, LedgerError> {
        self.inner.delete_all_by_strategy(id)
    }
}

impl LedgerPort for FailingDeleteStore {
    fn initialize_schema(&self) -> Result<(), LedgerError> {
        self.inner.initialize_schema()
    }

    fn atomically(
        &self,
        work: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<(), LedgerError>,
    ) -> Result<(), LedgerError> {
        self.inner.atomically(&mut |tx| work(&mut FailingDeleteTx { inner: tx }))
    }

    fn list_entries(
        &self,
        id: StrategyId,
        request: &PageRequest,
    ) -> Result<Page<LedgerEntry>, LedgerError> {
        self.inner.list_entries(id, request)
    }

    fn entries_in_range(
        &self,
        id: StrategyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.inner.entries_in_range(id, from, to)
    }

    fn entry_history(&self, id: StrategyId, date: NaiveDate) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.inner.entry_history(id, date)
    }

    fn register_strategy(&self, name: &str, owner: UserId) -> Result<StrategyRef, LedgerError> {
        self.inner.register_strategy(name, owner)
    }

    fn get_strategy(&self, id: StrategyId) -> Result<Option<StrategyRef>, LedgerError> {
        self.inner.get_strategy(id)
    }

    fn update_strategy_summary(
        &self,
        id: StrategyId,
        summary: &LedgerSummary,
    ) -> Result<(), LedgerError> {
        self.inner.update_strategy_summary(id, summary)
    }
}
