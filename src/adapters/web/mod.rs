//! JSON HTTP adapter over the ledger service.
//!
//! Identity is taken from the `X-User-Id` header set by the upstream
//! authentication boundary. Store calls are blocking and run on
//! `spawn_blocking`.

mod auth;
mod dto;
mod error;
mod handlers;

pub use auth::{ActingUser, USER_ID_HEADER};
pub use dto::{ApiResponse, DailyAnalysisResponse, DailyEntryPayload, PageResponse};
pub use error::WebError;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::domain::ledger::LedgerService;

pub struct AppState {
    pub service: Arc<LedgerService>,
    pub default_page_size: u32,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/strategies", post(handlers::register_strategy))
        .route(
            "/api/strategies/{id}/daily-analysis",
            get(handlers::list_daily_analysis)
                .post(handlers::create_daily_analysis)
                .patch(handlers::modify_daily_analysis)
                .delete(handlers::delete_all_daily_analysis),
        )
        .route(
            "/api/strategies/{id}/daily-analysis/history",
            get(handlers::daily_analysis_history),
        )
        .route(
            "/api/strategies/{id}/daily-analysis/range",
            get(handlers::daily_analysis_range),
        )
        .route(
            "/api/strategies/{id}/daily-analysis/{analysis_id}",
            delete(handlers::delete_daily_analysis),
        )
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
