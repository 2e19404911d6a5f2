//! CSV import of daily entry batches.
//!
//! Expected columns, by position: `date,transaction,daily_profit_loss`. The
//! header row is required and skipped.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use crate::domain::error::LedgerError;
use crate::domain::ledger_entry::DailyEntry;
use crate::ports::entry_source_port::EntrySource;

pub struct CsvAdapter {
    path: PathBuf,
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl EntrySource for CsvAdapter {
    fn read_entries(&self) -> Result<Vec<DailyEntry>, LedgerError> {
        let file = File::open(&self.path)?;
        parse_entries(file)
    }
}

/// Parses a CSV batch. Errors name the offending line.
pub fn parse_entries(reader: impl Read) -> Result<Vec<DailyEntry>, LedgerError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut entries = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| LedgerError::invalid_entry(format!("CSV parse error: {e}")))?;
        let line = record.position().map_or(0, |p| p.line());

        let field = |idx: usize, name: &str| {
            record
                .get(idx)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| LedgerError::invalid_entry(format!("line {line}: missing {name} column")))
        };

        let date = field(0, "date")?;
        let transaction_count: i64 = field(1, "transaction")?.parse().map_err(|e| {
            LedgerError::invalid_entry(format!("line {line}: invalid transaction value: {e}"))
        })?;
        let profit_loss = field(2, "daily_profit_loss")?;

        let entry = DailyEntry::parse(date, transaction_count, profit_loss).map_err(|e| match e {
            LedgerError::InvalidEntry { reason } => {
                LedgerError::invalid_entry(format!("line {line}: {reason}"))
            }
            other => other,
        })?;
        entries.push(entry);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::fs;
    use tempfile::TempDir;

    const BATCH: &str = "date,transaction,daily_profit_loss\n\
        2024-01-15,3,120.50\n\
        2024-01-16, 0 ,-42\n\
        2024-01-17,12,0.05\n";

    #[test]
    fn read_entries_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("batch.csv");
        fs::write(&path, BATCH).unwrap();

        let entries = CsvAdapter::new(path).read_entries().unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(entries[0].transaction_count, 3);
        assert_eq!(entries[0].profit_loss, Decimal::new(12050, 2));
        assert_eq!(entries[1].transaction_count, 0);
        assert_eq!(entries[1].profit_loss.to_string(), "-42.00");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = CsvAdapter::new(dir.path().join("absent.csv"))
            .read_entries()
            .unwrap_err();
        assert!(matches!(err, LedgerError::Io(_)));
    }

    #[test]
    fn header_only_file_is_empty_batch() {
        let entries = parse_entries("date,transaction,daily_profit_loss\n".as_bytes()).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn bad_row_names_its_line() {
        let csv = "date,transaction,daily_profit_loss\n\
            2024-01-15,3,1\n\
            2024-01-16,-2,1\n";
        match parse_entries(csv.as_bytes()) {
            Err(LedgerError::InvalidEntry { reason }) => {
                assert!(reason.starts_with("line 3:"), "got: {reason}");
            }
            other => panic!("expected InvalidEntry, got: {other:?}"),
        }
    }

    #[test]
    fn missing_column_is_invalid() {
        let csv = "date,transaction,daily_profit_loss\n2024-01-15,3,\n";
        let err = parse_entries(csv.as_bytes()).unwrap_err();
        match err {
            LedgerError::InvalidEntry { reason } => assert!(reason.contains("daily_profit_loss")),
            other => panic!("expected InvalidEntry, got: {other}"),
        }
    }

    #[test]
    fn non_numeric_transaction_is_invalid() {
        let csv = "date,transaction,daily_profit_loss\n2024-01-15,many,1\n";
        assert!(matches!(
            parse_entries(csv.as_bytes()),
            Err(LedgerError::InvalidEntry { .. })
        ));
    }
}
