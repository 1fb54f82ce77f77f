//! Dividend endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{respond, ApiResult};
use crate::auth::Caller;
use crate::models::{
    DeclareDividendRequest, DistributionDetail, DividendDistribution, MemberDividend,
};
use crate::AppState;

/// POST /api/dividends (admin)
pub async fn declare_dividend(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<DeclareDividendRequest>,
) -> ApiResult<DistributionDetail> {
    let result = async {
        caller.require_admin()?;
        let settings = state.repo.get_settings().await?;
        state
            .repo
            .declare_dividend(&settings, &request, caller.id())
            .await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/dividends (admin)
pub async fn list_distributions(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Vec<DividendDistribution>> {
    let result = async {
        caller.require_admin()?;
        state.repo.list_distributions().await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/dividends/:id - Includes every member's allocation (admin).
pub async fn get_distribution(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<DistributionDetail> {
    let result = async {
        caller.require_admin()?;
        state.repo.get_distribution(&id).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/members/:id/dividends
pub async fn member_dividends(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Vec<MemberDividend>> {
    let result = async {
        caller.require_self_or_admin(&id)?;
        state.repo.member_dividends(&id).await
    }
    .await;
    respond(&state, result).await
}
