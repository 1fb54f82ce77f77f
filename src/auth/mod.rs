//! Request authentication.
//!
//! Two layers: an optional pre-shared key gate for the whole API (constant-time
//! comparison), and the [`Caller`] extractor that resolves the `x-member-id`
//! header to a stored account and carries its role into the handlers.

use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use subtle::ConstantTimeEq;

use crate::errors::{codes, AppError, AppErrorWithRevision, ErrorDetails, ErrorResponse};
use crate::models::Member;
use crate::AppState;

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header carrying the id of the acting member.
pub const MEMBER_ID_HEADER: &str = "x-member-id";

/// PSK authentication layer function that takes the expected PSK as a parameter.
pub async fn psk_auth_layer(
    expected_psk: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    // If no PSK is configured, allow all requests (dev mode)
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        });

    match provided {
        Some(key) if constant_time_compare(key, &expected) => next.run(request).await,
        Some(_) => unauthorized_response("Invalid API key"),
        None => unauthorized_response("Missing or invalid API key"),
    }
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorResponse {
        success: false,
        error: ErrorDetails {
            code: codes::UNAUTHORIZED.to_string(),
            message: message.to_string(),
            details: None,
        },
        revision_id: 0,
    };

    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

/// The authenticated account behind a request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub member: Member,
}

impl Caller {
    pub fn id(&self) -> &str {
        &self.member.id
    }

    pub fn is_admin(&self) -> bool {
        self.member.is_admin()
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Administrator access required".to_string()))
        }
    }

    /// Members may act on their own records; administrators on anyone's.
    pub fn require_self_or_admin(&self, member_id: &str) -> Result<(), AppError> {
        if self.is_admin() || self.member.id == member_id {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "You can only access your own records".to_string(),
            ))
        }
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppErrorWithRevision;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let revision_id = state.repo.get_revision_id().await.unwrap_or(0);
        let reject = |error| AppErrorWithRevision { error, revision_id };

        let member_id = parts
            .headers
            .get(MEMBER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| reject(AppError::Unauthorized("Missing x-member-id header".to_string())))?;

        let member = state
            .repo
            .get_member(member_id)
            .await
            .map_err(reject)?
            .ok_or_else(|| reject(AppError::Unauthorized("Unknown member".to_string())))?;

        if !member.is_active {
            return Err(reject(AppError::Forbidden(
                "This account has been deactivated".to_string(),
            )));
        }

        Ok(Caller { member })
    }
}
