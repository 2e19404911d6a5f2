//! Domain error types for the daily performance ledger.

use chrono::NaiveDate;

use crate::domain::ledger_entry::{EntryId, StrategyId, UserId};

/// Coarse classification of a [`LedgerError`], used by the CLI and HTTP
/// adapters to pick exit codes and status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    Invalid,
    Internal,
}

/// Top-level error type for stratledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("strategy {strategy_id} not found")]
    StrategyNotFound { strategy_id: StrategyId },

    #[error("no daily analysis for strategy {strategy_id} on {date}")]
    DailyAnalysisNotFound {
        strategy_id: StrategyId,
        date: NaiveDate,
    },

    #[error("user {user_id} does not own strategy {strategy_id}")]
    Forbidden {
        strategy_id: StrategyId,
        user_id: UserId,
    },

    #[error("date {date} appears more than once in the request")]
    DuplicateDateInRequest { date: NaiveDate },

    #[error("daily analysis for strategy {strategy_id} on {date} already exists")]
    DailyAnalysisAlreadyExists {
        strategy_id: StrategyId,
        date: NaiveDate,
    },

    #[error("invalid daily entry: {reason}")]
    InvalidEntry { reason: String },

    #[error("invalid strategy: {reason}")]
    InvalidStrategy { reason: String },

    #[error("invalid page request: {reason}")]
    InvalidPage { reason: String },

    #[error("invalid daily analysis reference {entry_id}")]
    InvalidEntryReference { entry_id: EntryId },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::StrategyNotFound { .. } | LedgerError::DailyAnalysisNotFound { .. } => {
                ErrorKind::NotFound
            }
            LedgerError::Forbidden { .. } => ErrorKind::Forbidden,
            LedgerError::DuplicateDateInRequest { .. }
            | LedgerError::DailyAnalysisAlreadyExists { .. } => ErrorKind::Conflict,
            LedgerError::InvalidEntry { .. }
            | LedgerError::InvalidStrategy { .. }
            | LedgerError::InvalidPage { .. }
            | LedgerError::InvalidEntryReference { .. } => ErrorKind::Invalid,
            LedgerError::Database { .. }
            | LedgerError::DatabaseQuery { .. }
            | LedgerError::ConfigParse { .. }
            | LedgerError::ConfigMissing { .. }
            | LedgerError::ConfigInvalid { .. }
            | LedgerError::Io(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn invalid_entry(reason: impl Into<String>) -> Self {
        LedgerError::InvalidEntry {
            reason: reason.into(),
        }
    }
}

impl From<&LedgerError> for std::process::ExitCode {
    fn from(err: &LedgerError) -> Self {
        let code: u8 = match err {
            LedgerError::Io(_) => 1,
            LedgerError::ConfigParse { .. }
            | LedgerError::ConfigMissing { .. }
            | LedgerError::ConfigInvalid { .. } => 2,
            LedgerError::Database { .. } | LedgerError::DatabaseQuery { .. } => 3,
            other => match other.kind() {
                ErrorKind::Invalid => 4,
                ErrorKind::NotFound => 5,
                ErrorKind::Forbidden => 6,
                ErrorKind::Conflict => 7,
                ErrorKind::Internal => 1,
            },
        };
        std::process::ExitCode::from(code)
    }
}
