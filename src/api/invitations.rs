//! Invitation and onboarding API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{respond, ApiResult};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::models::{
    AcceptInvitationRequest, CreateInvitationRequest, Invitation, Member, SaccoSettings,
};
use crate::notify::{invitation_email, Mailer};
use crate::AppState;

/// Delivery for invitation emails. A failed send aborts the request.
fn deliver_invitation<'a>(
    mailer: &'a dyn Mailer,
    settings: &'a SaccoSettings,
) -> impl FnOnce(&Invitation) -> Result<(), AppError> + 'a {
    move |invitation| {
        mailer
            .send(&invitation_email(settings, invitation))
            .map_err(|e| {
                tracing::warn!(email = %invitation.email, "Invitation email failed: {}", e);
                AppError::Email(e.to_string())
            })
    }
}

/// POST /api/invitations - Invite a prospective member (admin).
pub async fn create_invitation(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<CreateInvitationRequest>,
) -> ApiResult<Invitation> {
    let result = async {
        caller.require_admin()?;
        let settings = state.repo.get_settings().await?;
        state
            .repo
            .create_invitation(
                &request,
                state.config.invitation_ttl_hours,
                caller.id(),
                deliver_invitation(state.mailer.as_ref(), &settings),
            )
            .await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/invitations (admin)
pub async fn list_invitations(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Vec<Invitation>> {
    let result = async {
        caller.require_admin()?;
        state.repo.list_invitations().await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/invitations/:id/resend - New OTP and expiry (admin).
pub async fn resend_invitation(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Invitation> {
    let result = async {
        caller.require_admin()?;
        let settings = state.repo.get_settings().await?;
        state
            .repo
            .resend_invitation(
                &id,
                state.config.invitation_ttl_hours,
                caller.id(),
                deliver_invitation(state.mailer.as_ref(), &settings),
            )
            .await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/invitations/accept - Redeem an OTP. Needs no member identity.
pub async fn accept_invitation(
    State(state): State<AppState>,
    Json(request): Json<AcceptInvitationRequest>,
) -> ApiResult<Member> {
    let result = state.repo.accept_invitation(&request).await;
    respond(&state, result).await
}
