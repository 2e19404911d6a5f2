//! Daily ledger entries and their identifiers.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::domain::error::LedgerError;

/// Number of fractional digits the ledger keeps for profit/loss amounts.
pub const PROFIT_LOSS_SCALE: u32 = 2;

/// Integer digits an amount may carry: `NUMERIC(19, 2)` leaves 17.
pub const PROFIT_LOSS_INTEGER_DIGITS: u32 = 17;

/// Largest transaction count every backend can store (`INTEGER` on Postgres).
pub const MAX_TRANSACTION_COUNT: u32 = i32::MAX as u32;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                $name(value)
            }
        }
    };
}

id_type!(
    /// Identifier of a registered strategy.
    StrategyId
);
id_type!(
    /// Identifier of a stored ledger row.
    EntryId
);
id_type!(
    /// Identity of an acting user, as resolved by the authentication boundary.
    UserId
);

/// One stored performance record for a (strategy, date).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub strategy_id: StrategyId,
    pub date: NaiveDate,
    pub transaction_count: u32,
    pub profit_loss: Decimal,
    /// `true` once downstream aggregation has folded this day in.
    pub processed: bool,
}

/// A validated day of performance data submitted by a strategy owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyEntry {
    pub date: NaiveDate,
    pub transaction_count: u32,
    pub profit_loss: Decimal,
}

impl DailyEntry {
    /// Validates the raw values and rescales the amount to [`PROFIT_LOSS_SCALE`].
    pub fn new(
        date: NaiveDate,
        transaction_count: i64,
        profit_loss: Decimal,
    ) -> Result<Self, LedgerError> {
        let transaction_count = u32::try_from(transaction_count)
            .ok()
            .filter(|count| *count <= MAX_TRANSACTION_COUNT)
            .ok_or_else(|| {
                LedgerError::invalid_entry(format!(
                    "transaction count for {date} must be a non-negative integer \
                     no greater than {MAX_TRANSACTION_COUNT}, got {transaction_count}"
                ))
            })?;

        let limit = Decimal::from(10_i64.pow(PROFIT_LOSS_INTEGER_DIGITS));
        if profit_loss.abs() >= limit {
            return Err(LedgerError::invalid_entry(format!(
                "profit/loss {profit_loss} for {date} exceeds {PROFIT_LOSS_INTEGER_DIGITS} integer digits"
            )));
        }

        let mut amount = profit_loss.normalize();
        if amount.scale() > PROFIT_LOSS_SCALE {
            return Err(LedgerError::invalid_entry(format!(
                "profit/loss {profit_loss} for {date} has more than {PROFIT_LOSS_SCALE} decimal places"
            )));
        }
        amount.rescale(PROFIT_LOSS_SCALE);
        // `rescale` leaves the value untouched when the mantissa cannot hold the new scale.
        if amount.scale() != PROFIT_LOSS_SCALE {
            return Err(LedgerError::invalid_entry(format!(
                "profit/loss {profit_loss} for {date} cannot be stored with {PROFIT_LOSS_SCALE} decimal places"
            )));
        }

        Ok(Self {
            date,
            transaction_count,
            profit_loss: amount,
        })
    }

    /// Parses the textual form used by CSV imports, CLI flags and JSON payloads.
    pub fn parse(date: &str, transaction_count: i64, profit_loss: &str) -> Result<Self, LedgerError> {
        let date = parse_date(date)?;
        let amount = Decimal::from_str(profit_loss.trim()).map_err(|e| {
            LedgerError::invalid_entry(format!("invalid profit/loss '{profit_loss}': {e}"))
        })?;
        Self::new(date, transaction_count, amount)
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, LedgerError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        LedgerError::invalid_entry(format!("invalid date '{value}', expected YYYY-MM-DD"))
    })
}

/// Rejects a batch that names the same date twice. Runs before any storage access.
pub fn ensure_unique_dates(entries: &[DailyEntry]) -> Result<(), LedgerError> {
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(entry.date) {
            return Err(LedgerError::DuplicateDateInRequest { date: entry.date });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parse_accepts_well_formed_values() {
        let entry = DailyEntry::parse("2024-01-02", 3, "-125.5").unwrap();
        assert_eq!(entry.date, date(2024, 1, 2));
        assert_eq!(entry.transaction_count, 3);
        assert_eq!(entry.profit_loss, Decimal::new(-12550, 2));
        assert_eq!(entry.profit_loss.to_string(), "-125.50");
    }

    #[test]
    fn parse_rejects_bad_date() {
        let err = DailyEntry::parse("2024-13-01", 1, "1").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEntry { .. }));
    }

    #[test]
    fn parse_rejects_unparseable_amount() {
        let err = DailyEntry::parse("2024-01-01", 1, "12,5").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEntry { .. }));
    }

    #[test]
    fn negative_transaction_count_is_invalid() {
        let err = DailyEntry::new(date(2024, 1, 1), -1, Decimal::ZERO).unwrap_err();
        match err {
            LedgerError::InvalidEntry { reason } => assert!(reason.contains("non-negative")),
            other => panic!("expected InvalidEntry, got: {other}"),
        }
    }

    #[test]
    fn transaction_count_above_integer_column_is_invalid() {
        let err = DailyEntry::new(date(2024, 1, 1), 3_000_000_000, Decimal::ONE).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEntry { .. }));

        let at_limit =
            DailyEntry::new(date(2024, 1, 1), i64::from(MAX_TRANSACTION_COUNT), Decimal::ONE)
                .unwrap();
        assert_eq!(at_limit.transaction_count, MAX_TRANSACTION_COUNT);
    }

    #[test]
    fn amount_beyond_seventeen_integer_digits_is_invalid() {
        let err = DailyEntry::parse("2024-01-01", 1, "100000000000000000000").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEntry { .. }));

        let err = DailyEntry::parse("2024-01-01", 1, "-100000000000000000").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEntry { .. }));

        let largest = DailyEntry::parse("2024-01-01", 1, "99999999999999999.99").unwrap();
        assert_eq!(largest.profit_loss.to_string(), "99999999999999999.99");
    }

    #[test]
    fn decimal_max_is_rejected_instead_of_kept_unscaled() {
        let err = DailyEntry::new(date(2024, 1, 1), 1, Decimal::MAX).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEntry { .. }));
    }

    #[test]
    fn accepted_amounts_always_carry_ledger_scale() {
        for raw in ["0", "-7", "12.5", "99999999999999999"] {
            let entry = DailyEntry::parse("2024-01-01", 1, raw).unwrap();
            assert_eq!(entry.profit_loss.scale(), PROFIT_LOSS_SCALE, "amount {raw}");
        }
    }

    #[test]
    fn excess_precision_is_invalid() {
        let err = DailyEntry::parse("2024-01-01", 1, "0.125").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidEntry { .. }));
    }

    #[test]
    fn trailing_zeros_do_not_count_as_precision() {
        let entry = DailyEntry::parse("2024-01-01", 1, "10.5000").unwrap();
        assert_eq!(entry.profit_loss.to_string(), "10.50");
    }

    #[test]
    fn unique_dates_pass() {
        let entries = vec![
            DailyEntry::parse("2024-01-01", 1, "1").unwrap(),
            DailyEntry::parse("2024-01-02", 1, "1").unwrap(),
        ];
        assert!(ensure_unique_dates(&entries).is_ok());
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let entries = vec![
            DailyEntry::parse("2024-01-01", 1, "1").unwrap(),
            DailyEntry::parse("2024-01-02", 1, "1").unwrap(),
            DailyEntry::parse("2024-01-01", 5, "7").unwrap(),
        ];
        match ensure_unique_dates(&entries) {
            Err(LedgerError::DuplicateDateInRequest { date: d }) => {
                assert_eq!(d, date(2024, 1, 1))
            }
            other => panic!("expected DuplicateDateInRequest, got: {other:?}"),
        }
    }

    #[test]
    fn ids_display_as_numbers() {
        assert_eq!(StrategyId(12).to_string(), "12");
        assert_eq!(EntryId::from(7), EntryId(7));
    }
}
