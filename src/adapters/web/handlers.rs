//! HTTP request handlers for the web adapter.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::domain::error::LedgerError;
use crate::domain::ledger::LedgerService;
use crate::domain::ledger_entry::{parse_date, DailyEntry, EntryId, StrategyId};
use crate::domain::page::{PageRequest, SortOrder};

use super::dto::{
    ApiResponse, DailyAnalysisResponse, DailyEntryPayload, HistoryParams, ListParams,
    PageResponse, RangeParams, RegisterStrategyPayload, StrategyResponse,
};
use super::{ActingUser, AppState, WebError};

type Reply<T> = Result<Json<ApiResponse<T>>, WebError>;

/// Runs a blocking ledger call off the async executor.
async fn with_service<T, F>(state: &AppState, f: F) -> Result<T, WebError>
where
    F: FnOnce(&LedgerService) -> Result<T, LedgerError> + Send + 'static,
    T: Send + 'static,
{
    let service = Arc::clone(&state.service);
    tokio::task::spawn_blocking(move || f(service.as_ref()))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "ledger task panicked");
            WebError::internal("internal server error")
        })?
        .map_err(WebError::from)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, WebError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| WebError::bad_request(rejection.body_text()))
}

pub async fn create_daily_analysis(
    State(state): State<Arc<AppState>>,
    Path(strategy_id): Path<i64>,
    ActingUser(acting): ActingUser,
    payload: Result<Json<Vec<DailyEntryPayload>>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<()>>), WebError> {
    let entries = body(payload)?
        .into_iter()
        .map(DailyEntryPayload::into_entry)
        .collect::<Result<Vec<DailyEntry>, _>>()?;

    with_service(&state, move |service| {
        service.create_daily_entries(StrategyId(strategy_id), acting, &entries)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            code: "CREATED",
            message: "resource created".into(),
            ..ApiResponse::empty()
        }),
    ))
}

pub async fn modify_daily_analysis(
    State(state): State<Arc<AppState>>,
    Path(strategy_id): Path<i64>,
    ActingUser(acting): ActingUser,
    payload: Result<Json<DailyEntryPayload>, JsonRejection>,
) -> Reply<()> {
    let entry = body(payload)?.into_entry()?;

    with_service(&state, move |service| {
        service.modify_daily_entry(StrategyId(strategy_id), acting, &entry)
    })
    .await?;

    Ok(Json(ApiResponse::empty()))
}

pub async fn delete_daily_analysis(
    State(state): State<Arc<AppState>>,
    Path((strategy_id, analysis_id)): Path<(i64, i64)>,
    ActingUser(acting): ActingUser,
) -> Reply<()> {
    with_service(&state, move |service| {
        service.delete_daily_entry(StrategyId(strategy_id), acting, EntryId(analysis_id))
    })
    .await?;

    Ok(Json(ApiResponse::empty()))
}

pub async fn delete_all_daily_analysis(
    State(state): State<Arc<AppState>>,
    Path(strategy_id): Path<i64>,
    ActingUser(acting): ActingUser,
) -> Reply<()> {
    with_service(&state, move |service| {
        service.delete_all_daily_entries(StrategyId(strategy_id), acting)
    })
    .await?;

    Ok(Json(ApiResponse::empty()))
}

pub async fn list_daily_analysis(
    State(state): State<Arc<AppState>>,
    Path(strategy_id): Path<i64>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Reply<PageResponse<DailyAnalysisResponse>> {
    let Query(params) = params.map_err(|r| WebError::bad_request(r.body_text()))?;
    let order = match params.order.as_deref() {
        Some(raw) => raw.parse()?,
        None => SortOrder::default(),
    };
    let request = PageRequest::new(
        params.page.unwrap_or(0),
        params.size.unwrap_or(state.default_page_size),
        order,
    )?;

    let page = with_service(&state, move |service| {
        service.list_daily_entries(StrategyId(strategy_id), &request)
    })
    .await?;

    Ok(Json(ApiResponse::ok(
        page.map(DailyAnalysisResponse::from).into(),
    )))
}

pub async fn daily_analysis_history(
    State(state): State<Arc<AppState>>,
    Path(strategy_id): Path<i64>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Reply<Vec<DailyAnalysisResponse>> {
    let Query(params) = params.map_err(|r| WebError::bad_request(r.body_text()))?;
    let date = parse_date(&params.date)?;

    let rows = with_service(&state, move |service| {
        service.entry_history(StrategyId(strategy_id), date)
    })
    .await?;

    Ok(Json(ApiResponse::ok(
        rows.into_iter().map(DailyAnalysisResponse::from).collect(),
    )))
}

pub async fn daily_analysis_range(
    State(state): State<Arc<AppState>>,
    Path(strategy_id): Path<i64>,
    params: Result<Query<RangeParams>, QueryRejection>,
) -> Reply<Vec<DailyAnalysisResponse>> {
    let Query(params) = params.map_err(|r| WebError::bad_request(r.body_text()))?;
    let (from, to) = (parse_date(&params.from)?, parse_date(&params.to)?);

    let rows = with_service(&state, move |service| {
        service.entries_between(StrategyId(strategy_id), from, to)
    })
    .await?;

    Ok(Json(ApiResponse::ok(
        rows.into_iter().map(DailyAnalysisResponse::from).collect(),
    )))
}

pub async fn register_strategy(
    State(state): State<Arc<AppState>>,
    ActingUser(acting): ActingUser,
    payload: Result<Json<RegisterStrategyPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<StrategyResponse>>), WebError> {
    let payload = body(payload)?;

    let strategy = with_service(&state, move |service| {
        service.register_strategy(&payload.name, acting)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::created(strategy.into())),
    ))
}

pub async fn not_found() -> WebError {
    WebError::not_found("no such route")
}
