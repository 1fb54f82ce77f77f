//! Guarantor request endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{respond, ApiResult};
use crate::auth::Caller;
use crate::models::{
    CreateGuarantorRequest, GuarantorLimit, GuarantorRequest, RespondGuarantorRequest,
};
use crate::AppState;

/// POST /api/guarantor-requests - The applicant asks another member.
pub async fn request_guarantee(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<CreateGuarantorRequest>,
) -> ApiResult<GuarantorRequest> {
    let result = state.repo.request_guarantee(caller.id(), &request).await;
    respond(&state, result).await
}

/// GET /api/guarantor-requests - All for administrators; sent or received
/// for members.
pub async fn list_guarantor_requests(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Vec<GuarantorRequest>> {
    let scope = (!caller.is_admin()).then(|| caller.id());
    let result = state.repo.list_guarantor_requests(scope).await;
    respond(&state, result).await
}

/// POST /api/guarantor-requests/:id/respond - The guarantor accepts or declines.
pub async fn respond_to_guarantor_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(response): Json<RespondGuarantorRequest>,
) -> ApiResult<GuarantorRequest> {
    let result = async {
        let settings = state.repo.get_settings().await?;
        state
            .repo
            .respond_to_guarantor_request(&settings, &id, caller.id(), &response)
            .await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/guarantor-requests/:id/cancel
pub async fn cancel_guarantor_request(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<GuarantorRequest> {
    let result = state.repo.cancel_guarantor_request(&id, caller.id()).await;
    respond(&state, result).await
}

/// GET /api/members/:id/guarantor-limit
pub async fn guarantor_limit(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<GuarantorLimit> {
    let result = async {
        caller.require_self_or_admin(&id)?;
        let settings = state.repo.get_settings().await?;
        state.repo.guarantor_limit(&settings, &id).await
    }
    .await;
    respond(&state, result).await
}
