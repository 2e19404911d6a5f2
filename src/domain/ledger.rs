//! Daily performance ledger engine.
//!
//! Every mutation resolves the strategy, checks ownership and then touches the
//! store, all inside a single [`LedgerPort::atomically`] unit so that a failure
//! at any step leaves the ledger as it was.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::error::LedgerError;
use crate::domain::ledger_entry::{
    ensure_unique_dates, DailyEntry, EntryId, LedgerEntry, StrategyId, UserId,
};
use crate::domain::page::{Page, PageRequest};
use crate::domain::strategy::StrategyRef;
use crate::ports::ledger_port::{LedgerPort, LedgerTx};
use crate::ports::ownership_port::{OwnershipGuard, StrategyOwnerGuard};

/// What a modify did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifyOutcome {
    UpdatedInPlace(EntryId),
    Superseded { retired: EntryId, replacement: EntryId },
}

pub struct LedgerService {
    store: Arc<dyn LedgerPort + Send + Sync>,
    guard: Arc<dyn OwnershipGuard + Send + Sync>,
}

impl LedgerService {
    pub fn new(
        store: Arc<dyn LedgerPort + Send + Sync>,
        guard: Arc<dyn OwnershipGuard + Send + Sync>,
    ) -> Self {
        Self { store, guard }
    }

    /// Service that only lets a strategy's recorded owner mutate its ledger.
    pub fn with_owner_guard(store: Arc<dyn LedgerPort + Send + Sync>) -> Self {
        Self::new(store, Arc::new(StrategyOwnerGuard))
    }

    pub fn store(&self) -> &Arc<dyn LedgerPort + Send + Sync> {
        &self.store
    }

    /// Records a batch of days. Either every day is stored or none is.
    pub fn create_daily_entries(
        &self,
        strategy_id: StrategyId,
        acting: UserId,
        entries: &[DailyEntry],
    ) -> Result<(), LedgerError> {
        if entries.is_empty() {
            return Err(LedgerError::invalid_entry("batch must contain at least one entry"));
        }
        ensure_unique_dates(entries)?;

        self.store.atomically(&mut |tx| {
            let strategy = self.authorize(tx, strategy_id, acting)?;
            for entry in entries {
                if tx.find_by_strategy_and_date(strategy.id, entry.date)?.is_some() {
                    return Err(LedgerError::DailyAnalysisAlreadyExists {
                        strategy_id: strategy.id,
                        date: entry.date,
                    });
                }
                tx.insert(strategy.id, entry)?;
            }
            Ok(())
        })?;

        info!(%strategy_id, %acting, count = entries.len(), "daily entries created");
        Ok(())
    }

    /// Changes the figures recorded for an existing day.
    ///
    /// An unprocessed row is edited in place. A processed row is never touched;
    /// it is retired and replaced by a fresh unprocessed row for the same date.
    pub fn modify_daily_entry(
        &self,
        strategy_id: StrategyId,
        acting: UserId,
        entry: &DailyEntry,
    ) -> Result<ModifyOutcome, LedgerError> {
        let mut outcome = None;

        self.store.atomically(&mut |tx| {
            let strategy = self.authorize(tx, strategy_id, acting)?;
            let existing = tx
                .find_by_strategy_and_date(strategy.id, entry.date)?
                .ok_or(LedgerError::DailyAnalysisNotFound {
                    strategy_id: strategy.id,
                    date: entry.date,
                })?;

            outcome = Some(if existing.processed {
                let replacement =
                    tx.supersede(existing.id, entry.transaction_count, entry.profit_loss)?;
                ModifyOutcome::Superseded {
                    retired: existing.id,
                    replacement,
                }
            } else {
                tx.update_in_place(existing.id, entry.transaction_count, entry.profit_loss)?;
                ModifyOutcome::UpdatedInPlace(existing.id)
            });
            Ok(())
        })?;

        let outcome = outcome.ok_or_else(|| LedgerError::Database {
            reason: "modify committed without an outcome".into(),
        })?;
        match outcome {
            ModifyOutcome::UpdatedInPlace(id) => {
                info!(%strategy_id, date = %entry.date, entry_id = %id, "daily entry updated in place")
            }
            ModifyOutcome::Superseded {
                retired,
                replacement,
            } => info!(
                %strategy_id,
                date = %entry.date,
                %retired,
                %replacement,
                "processed daily entry superseded"
            ),
        }
        Ok(outcome)
    }

    /// Removes one day and marks the next recorded day as needing reprocessing.
    pub fn delete_daily_entry(
        &self,
        strategy_id: StrategyId,
        acting: UserId,
        entry_id: EntryId,
    ) -> Result<(), LedgerError> {
        self.store.atomically(&mut |tx| {
            let strategy = self.authorize(tx, strategy_id, acting)?;
            let target = tx
                .find_by_id(entry_id)?
                .filter(|e| e.strategy_id == strategy.id)
                .ok_or(LedgerError::InvalidEntryReference { entry_id })?;

            // Only the immediate successor is invalidated.
            if let Some(next) = tx.find_earliest_after(strategy.id, target.date)? {
                tx.set_processed(next.id, false)?;
                debug!(
                    %strategy_id,
                    deleted = %target.date,
                    stale = %next.date,
                    "successor marked for reprocessing"
                );
            }

            tx.delete_by_id(target.id)
        })?;

        info!(%strategy_id, %acting, %entry_id, "daily entry deleted");
        Ok(())
    }

    /// Clears the strategy's cached summary and removes its whole ledger.
    pub fn delete_all_daily_entries(
        &self,
        strategy_id: StrategyId,
        acting: UserId,
    ) -> Result<(), LedgerError> {
        let mut removed = 0;

        self.store.atomically(&mut |tx| {
            let strategy = self.authorize(tx, strategy_id, acting)?;
            tx.reset_strategy_summary(strategy.id)?;
            removed = tx.delete_all_by_strategy(strategy.id)?;
            Ok(())
        })?;

        info!(%strategy_id, %acting, removed, "ledger cleared");
        Ok(())
    }

    pub fn list_daily_entries(
        &self,
        strategy_id: StrategyId,
        request: &PageRequest,
    ) -> Result<Page<LedgerEntry>, LedgerError> {
        self.strategy(strategy_id)?;
        self.store.list_entries(strategy_id, request)
    }

    pub fn entries_between(
        &self,
        strategy_id: StrategyId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        if from > to {
            return Err(LedgerError::InvalidPage {
                reason: format!("range start {from} is after range end {to}"),
            });
        }
        self.strategy(strategy_id)?;
        self.store.entries_in_range(strategy_id, from, to)
    }

    pub fn entry_history(
        &self,
        strategy_id: StrategyId,
        date: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.strategy(strategy_id)?;
        self.store.entry_history(strategy_id, date)
    }

    pub fn strategy(&self, strategy_id: StrategyId) -> Result<StrategyRef, LedgerError> {
        self.store
            .get_strategy(strategy_id)?
            .ok_or(LedgerError::StrategyNotFound { strategy_id })
    }

    pub fn register_strategy(&self, name: &str, owner: UserId) -> Result<StrategyRef, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidStrategy {
                reason: "strategy name must not be empty".into(),
            });
        }
        let strategy = self.store.register_strategy(name, owner)?;
        info!(strategy_id = %strategy.id, owner = %owner, "strategy registered");
        Ok(strategy)
    }

    fn authorize(
        &self,
        tx: &mut dyn LedgerTx,
        strategy_id: StrategyId,
        acting: UserId,
    ) -> Result<StrategyRef, LedgerError> {
        let strategy = tx
            .find_strategy(strategy_id)?
            .ok_or(LedgerError::StrategyNotFound { strategy_id })?;
        if !self.guard.is_owner(&strategy, acting) {
            warn!(%strategy_id, %acting, "ledger mutation refused for non-owner");
            return Err(LedgerError::Forbidden {
                strategy_id,
                user_id: acting,
            });
        }
        Ok(strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_adapter::MemoryAdapter;
    use crate::domain::page::SortOrder;
    use crate::domain::strategy::LedgerSummary;
    use rust_decimal::Decimal;

    const OWNER: UserId = UserId(100);
    const STRANGER: UserId = UserId(200);

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(day: &str, count: i64, pl: &str) -> DailyEntry {
        DailyEntry::parse(day, count, pl).unwrap()
    }

    fn setup() -> (Arc<MemoryAdapter>, LedgerService, StrategyId) {
        let store = Arc::new(MemoryAdapter::new());
        let service = LedgerService::with_owner_guard(store.clone());
        let strategy = service.register_strategy("Trend", OWNER).unwrap();
        (store, service, strategy.id)
    }

    fn all_entries(service: &LedgerService, id: StrategyId) -> Vec<LedgerEntry> {
        let req = PageRequest::new(0, 100, SortOrder::Asc).unwrap();
        service.list_daily_entries(id, &req).unwrap().content
    }

    fn mark_all_processed(store: &MemoryAdapter, entries: &[LedgerEntry]) {
        store
            .atomically(&mut |tx| {
                for e in entries {
                    tx.set_processed(e.id, true)?;
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn create_persists_unprocessed_entries() {
        let (_store, service, id) = setup();
        service
            .create_daily_entries(
                id,
                OWNER,
                &[entry("2024-01-01", 2, "10"), entry("2024-01-02", 1, "-3.5")],
            )
            .unwrap();

        let stored = all_entries(&service, id);
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|e| !e.processed));
        assert_eq!(stored[1].profit_loss, Decimal::new(-350, 2));
    }

    #[test]
    fn create_rejects_empty_batch() {
        let (_store, service, id) = setup();
        let err = service.create_daily_entries(id, OWNER, &[]).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEntry { .. }));
    }

    #[test]
    fn create_rejects_duplicate_dates_before_lookup() {
        let (_store, service, _id) = setup();
        // Unknown strategy: the in-request check still wins.
        let err = service
            .create_daily_entries(
                StrategyId(999),
                OWNER,
                &[entry("2024-01-01", 1, "1"), entry("2024-01-01", 2, "2")],
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateDateInRequest { .. }));
    }

    #[test]
    fn create_is_all_or_nothing_when_a_date_exists() {
        let (_store, service, id) = setup();
        service
            .create_daily_entries(id, OWNER, &[entry("2024-01-02", 1, "1")])
            .unwrap();

        let err = service
            .create_daily_entries(
                id,
                OWNER,
                &[entry("2024-01-01", 1, "1"), entry("2024-01-02", 1, "1")],
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::DailyAnalysisAlreadyExists { .. }));

        let stored = all_entries(&service, id);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].date, date(2024, 1, 2));
    }

    #[test]
    fn create_unknown_strategy() {
        let (_store, service, _id) = setup();
        let err = service
            .create_daily_entries(StrategyId(999), OWNER, &[entry("2024-01-01", 1, "1")])
            .unwrap_err();
        assert!(matches!(err, LedgerError::StrategyNotFound { .. }));
    }

    #[test]
    fn modify_unprocessed_updates_in_place() {
        let (_store, service, id) = setup();
        service
            .create_daily_entries(id, OWNER, &[entry("2024-01-01", 1, "5")])
            .unwrap();
        let before = all_entries(&service, id)[0].clone();

        let outcome = service
            .modify_daily_entry(id, OWNER, &entry("2024-01-01", 4, "12.25"))
            .unwrap();
        assert_eq!(outcome, ModifyOutcome::UpdatedInPlace(before.id));

        let after = all_entries(&service, id);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, before.id);
        assert_eq!(after[0].transaction_count, 4);
        assert_eq!(after[0].profit_loss, Decimal::new(1225, 2));
        assert!(!after[0].processed);
    }

    #[test]
    fn modify_processed_supersedes() {
        let (store, service, id) = setup();
        service
            .create_daily_entries(id, OWNER, &[entry("2024-01-01", 1, "5")])
            .unwrap();
        let before = all_entries(&service, id);
        mark_all_processed(&store, &before);

        let outcome = service
            .modify_daily_entry(id, OWNER, &entry("2024-01-01", 9, "-1"))
            .unwrap();
        let ModifyOutcome::Superseded {
            retired,
            replacement,
        } = outcome
        else {
            panic!("expected supersession, got {outcome:?}");
        };
        assert_eq!(retired, before[0].id);
        assert_ne!(replacement, retired);

        let after = all_entries(&service, id);
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, replacement);
        assert_eq!(after[0].transaction_count, 9);
        assert!(!after[0].processed);

        let history = service.entry_history(id, date(2024, 1, 1)).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].processed);
        assert_eq!(history[0].transaction_count, 1);
    }

    #[test]
    fn modify_missing_date() {
        let (_store, service, id) = setup();
        let err = service
            .modify_daily_entry(id, OWNER, &entry("2024-01-01", 1, "1"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::DailyAnalysisNotFound { .. }));
    }

    #[test]
    fn delete_marks_successor_stale() {
        let (store, service, id) = setup();
        service
            .create_daily_entries(
                id,
                OWNER,
                &[
                    entry("2024-01-01", 1, "1"),
                    entry("2024-01-02", 1, "1"),
                    entry("2024-01-03", 1, "1"),
                ],
            )
            .unwrap();
        let stored = all_entries(&service, id);
        mark_all_processed(&store, &stored);

        service.delete_daily_entry(id, OWNER, stored[1].id).unwrap();

        let after = all_entries(&service, id);
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].date, date(2024, 1, 1));
        assert!(after[0].processed);
        assert_eq!(after[1].date, date(2024, 1, 3));
        assert!(!after[1].processed);
    }

    #[test]
    fn delete_latest_changes_nothing_else() {
        let (store, service, id) = setup();
        service
            .create_daily_entries(
                id,
                OWNER,
                &[entry("2024-01-01", 1, "1"), entry("2024-01-02", 1, "1")],
            )
            .unwrap();
        let stored = all_entries(&service, id);
        mark_all_processed(&store, &stored);

        service.delete_daily_entry(id, OWNER, stored[1].id).unwrap();

        let after = all_entries(&service, id);
        assert_eq!(after.len(), 1);
        assert!(after[0].processed);
    }

    #[test]
    fn delete_entry_of_other_strategy_is_invalid_reference() {
        let (_store, service, id) = setup();
        let other = service.register_strategy("Other", OWNER).unwrap();
        service
            .create_daily_entries(other.id, OWNER, &[entry("2024-01-01", 1, "1")])
            .unwrap();
        let foreign = all_entries(&service, other.id)[0].id;

        let err = service.delete_daily_entry(id, OWNER, foreign).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEntryReference { .. }));
        assert_eq!(all_entries(&service, other.id).len(), 1);
    }

    #[test]
    fn delete_all_clears_entries_and_summary() {
        let (store, service, id) = setup();
        service
            .create_daily_entries(
                id,
                OWNER,
                &[entry("2024-01-01", 1, "1"), entry("2024-01-02", 1, "1")],
            )
            .unwrap();
        store
            .update_strategy_summary(
                id,
                &LedgerSummary {
                    total_transactions: 2,
                    cumulative_profit_loss: Decimal::new(200, 2),
                    last_aggregated_date: Some(date(2024, 1, 2)),
                },
            )
            .unwrap();

        service.delete_all_daily_entries(id, OWNER).unwrap();

        assert!(all_entries(&service, id).is_empty());
        let strategy = store.get_strategy(id).unwrap().unwrap();
        assert!(strategy.summary.is_reset());
    }

    #[test]
    fn non_owner_mutations_are_forbidden_and_side_effect_free() {
        let (_store, service, id) = setup();
        service
            .create_daily_entries(id, OWNER, &[entry("2024-01-01", 1, "1")])
            .unwrap();
        let before = all_entries(&service, id);

        let results = [
            service.create_daily_entries(id, STRANGER, &[entry("2024-01-05", 1, "1")]),
            service
                .modify_daily_entry(id, STRANGER, &entry("2024-01-01", 7, "7"))
                .map(|_| ()),
            service.delete_daily_entry(id, STRANGER, before[0].id),
            service.delete_all_daily_entries(id, STRANGER),
        ];
        for result in results {
            assert!(matches!(result, Err(LedgerError::Forbidden { .. })));
        }
        assert_eq!(all_entries(&service, id), before);
    }

    #[test]
    fn list_unknown_strategy() {
        let (_store, service, _id) = setup();
        let err = service
            .list_daily_entries(StrategyId(999), &PageRequest::default())
            .unwrap_err();
        assert!(matches!(err, LedgerError::StrategyNotFound { .. }));
    }

    #[test]
    fn entries_between_rejects_inverted_range() {
        let (_store, service, id) = setup();
        let err = service
            .entries_between(id, date(2024, 2, 1), date(2024, 1, 1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPage { .. }));
    }

    #[test]
    fn entries_between_unknown_strategy() {
        let (_store, service, _id) = setup();
        let err = service
            .entries_between(StrategyId(999), date(2024, 1, 1), date(2024, 1, 31))
            .unwrap_err();
        assert!(matches!(err, LedgerError::StrategyNotFound { .. }));
    }

    #[test]
    fn register_rejects_blank_name() {
        let (_store, service, _id) = setup();
        let err = service.register_strategy("   ", OWNER).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidStrategy { .. }));
    }
}
