//! In-process ledger store.
//!
//! A unit of work runs against a copy of the state while the mutex is held;
//! the copy replaces the live state only when the unit succeeds.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::domain::error::LedgerError;
use crate::domain::ledger_entry::{DailyEntry, EntryId, LedgerEntry, StrategyId, UserId};
use crate::domain::page::{Page, PageRequest, SortOrder};
use crate::domain::strategy::{LedgerSummary, StrategyRef};
use crate::ports::ledger_port::{LedgerPort, LedgerTx};

#[derive(Debug, Clone)]
struct StoredEntry {
    entry: LedgerEntry,
    retired: bool,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    last_strategy_id: i64,
    last_entry_id: i64,
    strategies: BTreeMap<StrategyId, StrategyRef>,
    entries: BTreeMap<EntryId, StoredEntry>,
}

impl MemoryState {
    fn current(&self, strategy_id: StrategyId) -> impl Iterator<Item = &LedgerEntry> {
        self.entries
            .values()
            .filter(move |s| !s.retired && s.entry.strategy_id == strategy_id)
            .map(|s| &s.entry)
    }

    fn current_mut(&mut self, entry_id: EntryId) -> Result<&mut LedgerEntry, LedgerError> {
        self.entries
            .get_mut(&entry_id)
            .filter(|s| !s.retired)
            .map(|s| &mut s.entry)
            .ok_or(LedgerError::InvalidEntryReference { entry_id })
    }

    fn push_entry(
        &mut self,
        strategy_id: StrategyId,
        date: NaiveDate,
        transaction_count: u32,
        profit_loss: Decimal,
    ) -> Result<EntryId, LedgerError> {
        if self.current(strategy_id).any(|e| e.date == date) {
            return Err(LedgerError::DailyAnalysisAlreadyExists { strategy_id, date });
        }
        self.last_entry_id += 1;
        let id = EntryId(self.last_entry_id);
        self.entries.insert(
            id,
            StoredEntry {
                entry: LedgerEntry {
                    id,
                    strategy_id,
                    date,
                    transaction_count,
                    profit_loss,
                    processed: false,
                },
                retired: false,
            },
        );
        Ok(id)
    }
}

impl LedgerTx for MemoryState {
    fn find_strategy(
        &mut self,
        strategy_id: StrategyId,
    ) -> Result<Option<StrategyRef>, LedgerError> {
        Ok(self.strategies.get(&strategy_id).cloned())
    }

    fn reset_strategy_summary(&mut self, strategy_id: StrategyId) -> Result<(), LedgerError> {
        self.strategies
            .get_mut(&strategy_id)
            .ok_or(LedgerError::StrategyNotFound { strategy_id })?
            .reset_summary();
        Ok(())
    }

    fn find_by_strategy_and_date(
        &mut self,
        strategy_id: StrategyId,
        date: NaiveDate,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.current(strategy_id).find(|e| e.date == date).cloned())
    }

    fn find_by_id(&mut self, entry_id: EntryId) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self
            .entries
            .get(&entry_id)
            .filter(|s| !s.retired)
            .map(|s| s.entry.clone()))
    }

    fn insert(
        &mut self,
        strategy_id: StrategyId,
        entry: &DailyEntry,
    ) -> Result<EntryId, LedgerError> {
        self.push_entry(
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
        let entry = self.current_mut(entry_id)?;
        entry.transaction_count = transaction_count;
        entry.profit_loss = profit_loss;
        Ok(())
    }

    fn supersede(
        &mut self,
        entry_id: EntryId,
        transaction_count: u32,
        profit_loss: Decimal,
    ) -> Result<EntryId, LedgerError> {
        let (strategy_id, date) = {
            let old = self.current_mut(entry_id)?;
            (old.strategy_id, old.date)
        };
        if let Some(stored) = self.entries.get_mut(&entry_id) {
            stored.retired = true;
        }
        self.push_entry(strategy_id, date, transaction_count, profit_loss)
    }

    fn set_processed(&mut self, entry_id: EntryId, processed: bool) -> Result<(), LedgerError> {
        self.current_mut(entry_id)?.processed = processed;
        Ok(())
    }

    fn delete_by_id(&mut self, entry_id: EntryId) -> Result<(), LedgerError> {
        self.current_mut(entry_id)?;
        self.entries.remove(&entry_id);
        Ok(())
    }

    fn find_earliest_after(
        &mut self,
        strategy_id: StrategyId,
        date: NaiveDate,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self
            .current(strategy_id)
            .filter(|e| e.date > date)
            .min_by_key(|e| e.date)
            .cloned())
    }

    fn delete_all_by_strategy(&mut self, strategy_id: StrategyId) -> Result<usize, LedgerError> {
        let before = self.entries.len();
        self.entries
            .retain(|_, s| s.entry.strategy_id != strategy_id);
        Ok(before - self.entries.len())
    }
}

#[derive(Debug, Default)]
pub struct MemoryAdapter {
    state: Mutex<MemoryState>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, LedgerError> {
        self.state.lock().map_err(|_| LedgerError::Database {
            reason: "ledger state lock poisoned".into(),
        })
    }
}

impl LedgerPort for MemoryAdapter {
    fn initialize_schema(&self) -> Result<(), LedgerError> {
        Ok(())
    }

    fn atomically(
        &self,
        work: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<(), LedgerError>,
    ) -> Result<(), LedgerError> {
        let mut state = self.lock()?;
        let mut draft = state.clone();
        work(&mut draft)?;
        *state = draft;
        Ok(())
    }

    fn list_entries(
        &self,
        strategy_id: StrategyId,
        request: &PageRequest,
    ) -> Result<Page<LedgerEntry>, LedgerError> {
        let state = self.lock()?;
        let mut entries: Vec<LedgerEntry> = state.current(strategy_id).cloned().collect();
        entries.sort_by_key(|e| e.date);
        if request.order == SortOrder::Desc {
            entries.reverse();
        }
        let total = entries.len() as u64;
        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let content = entries
            .into_iter()
            .skip(offset)
            .take(request.size as usize)
            .collect();
        Ok(Page::new(content, request, total))
    }

    fn entries_in_range(
        &self,
        strategy_id: StrategyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let state = self.lock()?;
        let mut entries: Vec<LedgerEntry> = state
            .current(strategy_id)
            .filter(|e| e.date >= from && e.date <= to)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.date);
        Ok(entries)
    }

    fn entry_history(
        &self,
        strategy_id: StrategyId,
        date: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let state = self.lock()?;
        // BTreeMap iteration is in id order, which is insertion order.
        Ok(state
            .entries
            .values()
            .filter(|s| s.entry.strategy_id == strategy_id && s.entry.date == date)
            .map(|s| s.entry.clone())
            .collect())
    }

    fn register_strategy(
        &self,
        name: &str,
        owner_id: UserId,
    ) -> Result<StrategyRef, LedgerError> {
        let mut state = self.lock()?;
        state.last_strategy_id += 1;
        let strategy = StrategyRef {
            id: StrategyId(state.last_strategy_id),
            name: name.to_string(),
            owner_id,
            summary: LedgerSummary::default(),
        };
        state.strategies.insert(strategy.id, strategy.clone());
        Ok(strategy)
    }

    fn get_strategy(&self, strategy_id: StrategyId) -> Result<Option<StrategyRef>, LedgerError> {
        Ok(self.lock()?.strategies.get(&strategy_id).cloned())
    }

    fn update_strategy_summary(
        &self,
        strategy_id: StrategyId,
        summary: &LedgerSummary,
    ) -> Result<(), LedgerError> {
        let mut state = self.lock()?;
        let strategy = state
            .strategies
            .get_mut(&strategy_id)
            .ok_or(LedgerError::StrategyNotFound { strategy_id })?;
        strategy.summary = summary.clone();
        Ok(())
    }
}
