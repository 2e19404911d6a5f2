//! Source of daily entry batches for bulk import.

use crate::domain::error::LedgerError;
use crate::domain::ledger_entry::DailyEntry;

pub trait EntrySource {
    /// Reads a whole batch. Dates are not yet checked for uniqueness.
    fn read_entries(&self) -> Result<Vec<DailyEntry>, LedgerError>;
}
