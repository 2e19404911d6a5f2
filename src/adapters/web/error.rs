//! HTTP error responses for the web adapter.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::domain::error::{ErrorKind, LedgerError};

use super::dto::ApiResponse;

#[derive(Debug)]
pub struct WebError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl WebError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_INPUT_VALUE", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            message,
        )
    }
}

pub fn status_from_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Invalid => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Stable machine-readable code for each ledger failure.
pub fn error_code(err: &LedgerError) -> &'static str {
    match err {
        LedgerError::StrategyNotFound { .. } => "STRATEGY_NOT_FOUND",
        LedgerError::DailyAnalysisNotFound { .. } => "DAILY_ANALYSIS_NOT_FOUND",
        LedgerError::Forbidden { .. } => "FORBIDDEN_ACCESS",
        LedgerError::DuplicateDateInRequest { .. } => "DUPLICATE_DATE_IN_REQUEST",
        LedgerError::DailyAnalysisAlreadyExists { .. } => "DAILY_ANALYSIS_ALREADY_EXISTS",
        LedgerError::InvalidEntryReference { .. } => "INVALID_TYPE_VALUE",
        LedgerError::InvalidEntry { .. }
        | LedgerError::InvalidStrategy { .. }
        | LedgerError::InvalidPage { .. } => "INVALID_INPUT_VALUE",
        LedgerError::Database { .. }
        | LedgerError::DatabaseQuery { .. }
        | LedgerError::ConfigParse { .. }
        | LedgerError::ConfigMissing { .. }
        | LedgerError::ConfigInvalid { .. }
        | LedgerError::Io(_) => "INTERNAL_SERVER_ERROR",
    }
}

impl From<LedgerError> for WebError {
    fn from(err: LedgerError) -> Self {
        let kind = err.kind();
        if kind == ErrorKind::Internal {
            tracing::error!(error = %err, "ledger request failed");
            return Self::internal("internal server error");
        }
        Self::new(status_from_kind(kind), error_code(&err), err.to_string())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()>::failure(self.code, self.message);
        (self.status, Json(body)).into_response()
    }
}
