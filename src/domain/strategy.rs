//! Strategy references as seen by the ledger.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::ledger_entry::{StrategyId, UserId};

/// Denormalized aggregate fields cached on the strategy by downstream jobs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedgerSummary {
    pub total_transactions: i64,
    pub cumulative_profit_loss: Decimal,
    pub last_aggregated_date: Option<NaiveDate>,
}

impl LedgerSummary {
    pub fn is_reset(&self) -> bool {
        *self == LedgerSummary::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyRef {
    pub id: StrategyId,
    pub name: String,
    pub owner_id: UserId,
    pub summary: LedgerSummary,
}

impl StrategyRef {
    pub fn reset_summary(&mut self) {
        self.summary = LedgerSummary::default();
    }
}
