//! Ownership capability consumed by the ledger engine.

use crate::domain::ledger_entry::UserId;
use crate::domain::strategy::StrategyRef;

/// Decides whether an identity may mutate a strategy's ledger.
pub trait OwnershipGuard {
    fn is_owner(&self, strategy: &StrategyRef, identity: UserId) -> bool;
}

/// Grants access to the identity recorded as the strategy's owner, and nobody else.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyOwnerGuard;

impl OwnershipGuard for StrategyOwnerGuard {
    fn is_owner(&self, strategy: &StrategyRef, identity: UserId) -> bool {
        strategy.owner_id == identity
    }
}
