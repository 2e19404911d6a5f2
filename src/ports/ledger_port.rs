//! Ledger storage port.
//!
//! Mutations happen inside [`LedgerPort::atomically`]: the store hands the
//! closure a [`LedgerTx`] and commits only if the closure returns `Ok`. Any
//! error rolls the whole unit back.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::error::LedgerError;
use crate::domain::ledger_entry::{DailyEntry, EntryId, LedgerEntry, StrategyId, UserId};
use crate::domain::page::{Page, PageRequest};
use crate::domain::strategy::{LedgerSummary, StrategyRef};

/// Operations available inside one unit of work.
///
/// Lookups only ever see current rows; rows retired by [`LedgerTx::supersede`]
/// are visible through [`LedgerPort::entry_history`] alone.
pub trait LedgerTx {
    fn find_strategy(&mut self, strategy_id: StrategyId)
    -> Result<Option<StrategyRef>, LedgerError>;

    fn reset_strategy_summary(&mut self, strategy_id: StrategyId) -> Result<(), LedgerError>;

    fn find_by_strategy_and_date(
        &mut self,
        strategy_id: StrategyId,
        date: NaiveDate,
    ) -> Result<Option<LedgerEntry>, LedgerError>;

    fn find_by_id(&mut self, entry_id: EntryId) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Inserts a new `processed = false` row. Fails with
    /// [`LedgerError::DailyAnalysisAlreadyExists`] if the date is taken.
    fn insert(&mut self, strategy_id: StrategyId, entry: &DailyEntry)
    -> Result<EntryId, LedgerError>;

    fn update_in_place(
        &mut self,
        entry_id: EntryId,
        transaction_count: u32,
        profit_loss: Decimal,
    ) -> Result<(), LedgerError>;

    /// Retires the row and inserts its `processed = false` replacement for the
    /// same (strategy, date).
    fn supersede(
        &mut self,
        entry_id: EntryId,
        transaction_count: u32,
        profit_loss: Decimal,
    ) -> Result<EntryId, LedgerError>;

    fn set_processed(&mut self, entry_id: EntryId, processed: bool) -> Result<(), LedgerError>;

    fn delete_by_id(&mut self, entry_id: EntryId) -> Result<(), LedgerError>;

    /// The current entry with the smallest date strictly after `date`.
    fn find_earliest_after(
        &mut self,
        strategy_id: StrategyId,
        date: NaiveDate,
    ) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Removes every row of the strategy, retired ones included. Returns the row count.
    fn delete_all_by_strategy(&mut self, strategy_id: StrategyId) -> Result<usize, LedgerError>;
}

/// Durable ledger storage.
pub trait LedgerPort {
    /// Creates tables and indexes that do not exist yet.
    fn initialize_schema(&self) -> Result<(), LedgerError>;

    fn atomically(
        &self,
        work: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<(), LedgerError>,
    ) -> Result<(), LedgerError>;

    fn list_entries(
        &self,
        strategy_id: StrategyId,
        request: &PageRequest,
    ) -> Result<Page<LedgerEntry>, LedgerError>;

    /// Current entries with `from <= date <= to`, oldest first.
    fn entries_in_range(
        &self,
        strategy_id: StrategyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Every row ever stored for the date, retired ones included, oldest first.
    fn entry_history(
        &self,
        strategy_id: StrategyId,
        date: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, LedgerError>;

    fn register_strategy(&self, name: &str, owner_id: UserId)
    -> Result<StrategyRef, LedgerError>;

    fn get_strategy(&self, strategy_id: StrategyId) -> Result<Option<StrategyRef>, LedgerError>;

    /// Written by downstream aggregation jobs; the ledger itself only resets it.
    fn update_strategy_summary(
        &self,
        strategy_id: StrategyId,
        summary: &LedgerSummary,
    ) -> Result<(), LedgerError>;
}
