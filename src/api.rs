use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    middleware,
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::error::{ApiError, ApiErrorWithMeta};
use crate::ledger::{DeleteOutcome, Ledger, ToggleOutcome};
use crate::responses::{ApiOk, Pagination, RequestMeta, meta_middleware};
use crate::types::{AccountOpening, AccountStatus, NewAccountOpening, UserActivity};

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

/// The application state.
#[derive(Clone)]
pub struct AppState {
    /// The points ledger.
    pub ledger: Arc<Ledger>,
}

/// Paging parameters for list endpoints.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// 1-based page number.
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// The request to toggle an account's status.
#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    /// The status the caller saw. A mismatch means someone else already
    /// toggled the account.
    pub expected_status: AccountStatus,
}

/// The response for a user's balance.
#[derive(Serialize)]
pub struct BalanceResponse {
    /// The ID of the user.
    pub user_id: i64,
    /// The user's running point total.
    pub points: i64,
    pub actions_completed: i64,
    pub referral_count: i64,
}

pub fn init_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/accounts",
            get(list_accounts_handler).post(open_account_handler),
        )
        .route("/accounts/{id}", delete(delete_account_handler))
        .route("/accounts/{id}/toggle", post(toggle_status_handler))
        .route("/users/{user_id}", get(get_balance_handler))
        .route("/users/{user_id}/activities", get(list_activities_handler))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(middleware::from_fn(meta_middleware))
}

async fn list_accounts_handler(
    State(st): State<AppState>,
    Query(q): Query<PageQuery>,
    Extension(meta): Extension<RequestMeta>,
) -> Result<ApiOk<Vec<AccountOpening>>, ApiErrorWithMeta> {
    let page = q.page.unwrap_or(1).max(1);
    let per_page = q.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    let offset = (page as i64 - 1) * per_page as i64;

    let (accounts, total) = st
        .ledger
        .list_accounts(per_page as i64, offset)
        .await
        .map_err(|e| ApiError::from_ledger(e, meta.clone()))?;

    Ok(
        ApiOk::ok("accounts fetched", accounts, meta)
            .with_pagination(Pagination::new(page, per_page, total.max(0) as u64)),
    )
}

async fn open_account_handler(
    State(st): State<AppState>,
    Extension(meta): Extension<RequestMeta>,
    Json(req): Json<NewAccountOpening>,
) -> Result<ApiOk<AccountOpening>, ApiErrorWithMeta> {
    let account = st
        .ledger
        .open_account(req)
        .await
        .map_err(|e| ApiError::from_ledger(e, meta.clone()))?;

    Ok(ApiOk::created("account request created", account, meta))
}

async fn toggle_status_handler(
    State(st): State<AppState>,
    Path(id): Path<i64>,
    Extension(meta): Extension<RequestMeta>,
    Json(req): Json<ToggleRequest>,
) -> Result<ApiOk<ToggleOutcome>, ApiErrorWithMeta> {
    let outcome = st
        .ledger
        .toggle_status(id, Some(req.expected_status))
        .await
        .map_err(|e| ApiError::from_ledger(e, meta.clone()))?;

    Ok(ApiOk::ok("account status toggled", outcome, meta))
}

async fn delete_account_handler(
    State(st): State<AppState>,
    Path(id): Path<i64>,
    Extension(meta): Extension<RequestMeta>,
) -> Result<ApiOk<DeleteOutcome>, ApiErrorWithMeta> {
    let outcome = st
        .ledger
        .delete_account(id)
        .await
        .map_err(|e| ApiError::from_ledger(e, meta.clone()))?;

    Ok(ApiOk::ok("account deleted", outcome, meta))
}

async fn get_balance_handler(
    State(st): State<AppState>,
    Path(user_id): Path<i64>,
    Extension(meta): Extension<RequestMeta>,
) -> Result<ApiOk<BalanceResponse>, ApiErrorWithMeta> {
    let user = st
        .ledger
        .user(user_id)
        .await
        .map_err(|e| ApiError::from_ledger(e, meta.clone()))?;

    Ok(ApiOk::ok(
        "balance fetched",
        BalanceResponse {
            user_id: user.id,
            points: user.points,
            actions_completed: user.actions_completed,
            referral_count: user.referral_count,
        },
        meta,
    ))
}

async fn list_activities_handler(
    State(st): State<AppState>,
    Path(user_id): Path<i64>,
    Extension(meta): Extension<RequestMeta>,
) -> Result<ApiOk<Vec<UserActivity>>, ApiErrorWithMeta> {
    let activities = st
        .ledger
        .activities(user_id)
        .await
        .map_err(|e| ApiError::from_ledger(e, meta.clone()))?;

    Ok(ApiOk::ok("activities fetched", activities, meta))
}
