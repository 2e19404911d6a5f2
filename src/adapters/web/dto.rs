//! Request and response bodies.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::error::LedgerError;
use crate::domain::ledger_entry::{parse_date, DailyEntry, LedgerEntry};
use crate::domain::page::Page;
use crate::domain::strategy::StrategyRef;

/// Envelope shared by every response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub is_success: bool,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(result: T) -> Self {
        Self {
            is_success: true,
            code: "OK",
            message: "request succeeded".into(),
            result: Some(result),
        }
    }

    pub fn created(result: T) -> Self {
        Self {
            is_success: true,
            code: "CREATED",
            message: "resource created".into(),
            result: Some(result),
        }
    }

    pub fn failure(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            code,
            message: message.into(),
            result: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn empty() -> Self {
        Self {
            is_success: true,
            code: "OK",
            message: "request succeeded".into(),
            result: None,
        }
    }
}

/// One submitted day. The amount may be a JSON number or a decimal string.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyEntryPayload {
    pub date: String,
    pub transaction: i64,
    pub daily_profit_loss: Decimal,
}

impl DailyEntryPayload {
    pub fn into_entry(self) -> Result<DailyEntry, LedgerError> {
        DailyEntry::new(parse_date(&self.date)?, self.transaction, self.daily_profit_loss)
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterStrategyPayload {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub order: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAnalysisResponse {
    pub daily_analysis_id: i64,
    pub daily_date: String,
    pub transaction: u32,
    pub daily_profit_loss: Decimal,
    /// `"YES"` once aggregated downstream, `"NO"` while it needs processing.
    pub proceed: &'static str,
}

impl From<LedgerEntry> for DailyAnalysisResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            daily_analysis_id: entry.id.0,
            daily_date: entry.date.to_string(),
            transaction: entry.transaction_count,
            daily_profit_loss: entry.profit_loss,
            proceed: if entry.processed { "YES" } else { "NO" },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyResponse {
    pub strategy_id: i64,
    pub name: String,
    pub owner_id: i64,
}

impl From<StrategyRef> for StrategyResponse {
    fn from(strategy: StrategyRef) -> Self {
        Self {
            strategy_id: strategy.id.0,
            name: strategy.name,
            owner_id: strategy.owner_id.0,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u64,
    pub first: bool,
    pub last: bool,
}

impl<T> From<Page<T>> for PageResponse<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            total_pages: page.total_pages(),
            first: page.is_first(),
            last: page.is_last(),
            page: page.page,
            size: page.size,
            total_elements: page.total_elements,
            content: page.content,
        }
    }
}
