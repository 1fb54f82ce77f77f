//! Share capital, contribution, summary and eligibility endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{respond, ApiResult};
use crate::auth::Caller;
use crate::models::{
    BulkContributionRequest, BulkShareCapitalRequest, IncompleteShareCapital, LoanEligibility,
    MemberShareSummary, MissingContribution, MonthlyContribution, PeriodQuery,
    RecordContributionRequest, RecordShareCapitalRequest, ShareCapitalPayment,
};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct YearQuery {
    #[serde(default)]
    pub year: Option<i64>,
}

/// POST /api/share-capital (admin)
pub async fn record_share_capital(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<RecordShareCapitalRequest>,
) -> ApiResult<ShareCapitalPayment> {
    let result = async {
        caller.require_admin()?;
        let settings = state.repo.get_settings().await?;
        state
            .repo
            .record_share_capital(&settings, &request, caller.id())
            .await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/share-capital/bulk - All or nothing (admin).
pub async fn bulk_record_share_capital(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<BulkShareCapitalRequest>,
) -> ApiResult<Vec<ShareCapitalPayment>> {
    let result = async {
        caller.require_admin()?;
        let settings = state.repo.get_settings().await?;
        state
            .repo
            .bulk_record_share_capital(&settings, &request.payments, caller.id())
            .await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/members/:id/share-capital
pub async fn list_share_capital(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Vec<ShareCapitalPayment>> {
    let result = async {
        caller.require_self_or_admin(&id)?;
        state.repo.list_share_capital(&id).await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/contributions (admin)
pub async fn record_contribution(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<RecordContributionRequest>,
) -> ApiResult<MonthlyContribution> {
    let result = async {
        caller.require_admin()?;
        let settings = state.repo.get_settings().await?;
        state
            .repo
            .record_contribution(
                &settings,
                &request,
                caller.id(),
                state.config.unique_monthly_contributions,
            )
            .await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/contributions/bulk - All or nothing (admin).
pub async fn bulk_record_contributions(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<BulkContributionRequest>,
) -> ApiResult<Vec<MonthlyContribution>> {
    let result = async {
        caller.require_admin()?;
        let settings = state.repo.get_settings().await?;
        state
            .repo
            .bulk_record_contributions(
                &settings,
                &request.contributions,
                caller.id(),
                state.config.unique_monthly_contributions,
            )
            .await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/members/:id/contributions?year=
pub async fn list_contributions(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Query(query): Query<YearQuery>,
) -> ApiResult<Vec<MonthlyContribution>> {
    let result = async {
        caller.require_self_or_admin(&id)?;
        state.repo.list_contributions(&id, query.year).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/members/:id/summary
pub async fn get_share_summary(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<MemberShareSummary> {
    let result = async {
        caller.require_self_or_admin(&id)?;
        state.repo.require_member(&id).await?;
        let settings = state.repo.get_settings().await?;
        state.repo.get_share_summary(&settings, &id).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/summaries (admin)
pub async fn list_share_summaries(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Vec<MemberShareSummary>> {
    let result = async {
        caller.require_admin()?;
        state.repo.list_share_summaries().await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/summaries/recalculate (admin)
pub async fn recalculate_summaries(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Vec<MemberShareSummary>> {
    let result = async {
        caller.require_admin()?;
        let settings = state.repo.get_settings().await?;
        state
            .repo
            .recalculate_all_summaries(&settings, caller.id())
            .await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/reports/missing-contributions?year=&month= (admin)
pub async fn missing_contributions(
    State(state): State<AppState>,
    caller: Caller,
    Query(period): Query<PeriodQuery>,
) -> ApiResult<Vec<MissingContribution>> {
    let result = async {
        caller.require_admin()?;
        state
            .repo
            .missing_contributions(period.year, period.month)
            .await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/reports/incomplete-share-capital (admin)
pub async fn incomplete_share_capital(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Vec<IncompleteShareCapital>> {
    let result = async {
        caller.require_admin()?;
        let settings = state.repo.get_settings().await?;
        state.repo.incomplete_share_capital(&settings).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/members/:id/eligibility
pub async fn loan_eligibility(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<LoanEligibility> {
    let result = async {
        caller.require_self_or_admin(&id)?;
        let settings = state.repo.get_settings().await?;
        state.repo.loan_eligibility(&settings, &id).await
    }
    .await;
    respond(&state, result).await
}
