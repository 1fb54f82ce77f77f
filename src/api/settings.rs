//! Settings API endpoints.

use axum::{extract::State, Json};

use super::{respond, ApiResult};
use crate::auth::Caller;
use crate::models::{RevisionInfo, SaccoSettings, UpdateSettingsRequest};
use crate::AppState;

/// GET /api/settings - Current SACCO settings.
pub async fn get_settings(State(state): State<AppState>, _caller: Caller) -> ApiResult<SaccoSettings> {
    let result = state.repo.get_settings().await;
    respond(&state, result).await
}

/// PUT /api/settings - Partial update (admin).
pub async fn update_settings(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<UpdateSettingsRequest>,
) -> ApiResult<SaccoSettings> {
    let result = async {
        caller.require_admin()?;
        state.repo.update_settings(&request, caller.id()).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/revision - Revision metadata for change detection.
pub async fn get_revision(State(state): State<AppState>) -> ApiResult<RevisionInfo> {
    let result = state.repo.get_revision_info().await;
    respond(&state, result).await
}
