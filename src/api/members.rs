//! Member and KYC document API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{respond, ApiResult};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::models::{
    DocumentVerification, Member, MemberDashboard, MemberDocument, MemberFilter,
    MemberFinancialSummary, MemberStatusChange, SetActiveRequest, SetHoldRequest,
    SetShareCapitalTermRequest, SetVerificationRequest, UpdateProfileRequest,
    UploadDocumentRequest,
};
use crate::AppState;

/// GET /api/members - List members (admin).
pub async fn list_members(
    State(state): State<AppState>,
    caller: Caller,
    Query(filter): Query<MemberFilter>,
) -> ApiResult<Vec<Member>> {
    let result = async {
        caller.require_admin()?;
        state.repo.list_members(&filter).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/members/me - The calling account.
pub async fn get_me(State(state): State<AppState>, caller: Caller) -> ApiResult<Member> {
    respond(&state, Ok(caller.member)).await
}

/// GET /api/members/:id - Get a single member.
pub async fn get_member(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Member> {
    let result = async {
        caller.require_self_or_admin(&id)?;
        state.repo.require_member(&id).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/members/:id/dashboard
pub async fn member_dashboard(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<MemberDashboard> {
    let result = async {
        caller.require_self_or_admin(&id)?;
        let settings = state.repo.get_settings().await?;
        state.repo.member_dashboard(&settings, &id).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/members/:id/financial-summary
pub async fn member_financial_summary(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<MemberFinancialSummary> {
    let result = async {
        caller.require_self_or_admin(&id)?;
        let settings = state.repo.get_settings().await?;
        state.repo.member_financial_summary(&settings, &id).await
    }
    .await;
    respond(&state, result).await
}

/// PUT /api/members/:id/profile - Update name and phone.
pub async fn update_profile(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<Member> {
    let result = async {
        caller.require_self_or_admin(&id)?;
        state.repo.update_profile(&id, &request, caller.id()).await
    }
    .await;
    respond(&state, result).await
}

async fn change_status(
    state: &AppState,
    caller: &Caller,
    id: &str,
    change: MemberStatusChange,
) -> Result<Member, AppError> {
    caller.require_admin()?;
    state.repo.set_member_status(id, &change, caller.id()).await
}

/// PUT /api/members/:id/verification
pub async fn set_verification(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<SetVerificationRequest>,
) -> ApiResult<Member> {
    let change = MemberStatusChange::Verification(request.verified);
    let result = change_status(&state, &caller, &id, change).await;
    respond(&state, result).await
}

/// PUT /api/members/:id/hold
pub async fn set_hold(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<SetHoldRequest>,
) -> ApiResult<Member> {
    let change = MemberStatusChange::Hold {
        on_hold: request.on_hold,
        reason: request.reason,
    };
    let result = change_status(&state, &caller, &id, change).await;
    respond(&state, result).await
}

/// PUT /api/members/:id/active
pub async fn set_active(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<SetActiveRequest>,
) -> ApiResult<Member> {
    let result = async {
        if !request.active && caller.id() == id {
            return Err(AppError::Validation(
                "You cannot deactivate your own account".to_string(),
            ));
        }
        change_status(&state, &caller, &id, MemberStatusChange::Active(request.active)).await
    }
    .await;
    respond(&state, result).await
}

/// PUT /api/members/:id/share-capital-term
pub async fn set_share_capital_term(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<SetShareCapitalTermRequest>,
) -> ApiResult<Member> {
    let change = MemberStatusChange::ShareCapitalTerm(request.term_months);
    let result = change_status(&state, &caller, &id, change).await;
    respond(&state, result).await
}

/// POST /api/members/:id/documents - Upload a KYC document reference (self).
pub async fn upload_document(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<UploadDocumentRequest>,
) -> ApiResult<MemberDocument> {
    let result = async {
        if caller.id() != id {
            return Err(AppError::Forbidden(
                "Documents can only be uploaded by the member themselves".to_string(),
            ));
        }
        state
            .repo
            .upload_document(&id, request.document_type, &request.storage_ref)
            .await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/members/:id/documents
pub async fn list_documents(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Vec<MemberDocument>> {
    let result = async {
        caller.require_self_or_admin(&id)?;
        state.repo.list_documents(&id).await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/documents/:id/verify (admin)
pub async fn verify_document(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<DocumentVerification> {
    let result = async {
        caller.require_admin()?;
        state.repo.verify_document(&id, caller.id()).await
    }
    .await;
    respond(&state, result).await
}
