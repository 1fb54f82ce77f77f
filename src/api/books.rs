//! Society expense and income endpoints (admin only).

use axum::{
    extract::{Query, State},
    Json,
};

use super::{respond, ApiResult};
use crate::auth::Caller;
use crate::models::{
    BooksFilter, RecordExpenseRequest, RecordIncomeRequest, SaccoExpense, SaccoIncome,
};
use crate::AppState;

/// POST /api/expenses
pub async fn record_expense(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<RecordExpenseRequest>,
) -> ApiResult<SaccoExpense> {
    let result = async {
        caller.require_admin()?;
        state.repo.record_expense(&request, caller.id()).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/expenses?dateFrom=&dateTo=&category=
pub async fn list_expenses(
    State(state): State<AppState>,
    caller: Caller,
    Query(filter): Query<BooksFilter>,
) -> ApiResult<Vec<SaccoExpense>> {
    let result = async {
        caller.require_admin()?;
        state.repo.list_expenses(&filter).await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/income
pub async fn record_income(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<RecordIncomeRequest>,
) -> ApiResult<SaccoIncome> {
    let result = async {
        caller.require_admin()?;
        state.repo.record_income(&request, caller.id()).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/income?dateFrom=&dateTo=&category=
pub async fn list_income(
    State(state): State<AppState>,
    caller: Caller,
    Query(filter): Query<BooksFilter>,
) -> ApiResult<Vec<SaccoIncome>> {
    let result = async {
        caller.require_admin()?;
        state.repo.list_income(&filter).await
    }
    .await;
    respond(&state, result).await
}
