//! Audit, reporting and society-wide notification endpoints.

use axum::{
    extract::{Query, State},
    Json,
};

use super::{respond, ApiResult};
use crate::auth::Caller;
use crate::models::{
    ActivityAction, ActivityFilter, ActivityLog, BatchOutcome, FinancialSummary,
    MassEmailRequest, PeriodQuery, Transaction, TransactionFilter,
};
use crate::notify::{contribution_reminder_email, mass_email, send_batch};
use crate::AppState;

/// GET /api/activity?action=&actorId=&limit= (admin)
pub async fn list_activity(
    State(state): State<AppState>,
    caller: Caller,
    Query(filter): Query<ActivityFilter>,
) -> ApiResult<Vec<ActivityLog>> {
    let result = async {
        caller.require_admin()?;
        state.repo.list_activity(&filter).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/transactions?type=&memberId=&limit=
///
/// Members only ever see their own entries.
pub async fn list_transactions(
    State(state): State<AppState>,
    caller: Caller,
    Query(mut filter): Query<TransactionFilter>,
) -> ApiResult<Vec<Transaction>> {
    if !caller.is_admin() {
        filter.member_id = Some(caller.id().to_string());
    }
    let result = state.repo.list_transactions(&filter).await;
    respond(&state, result).await
}

/// GET /api/reports/financial-summary (admin)
pub async fn financial_summary(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<FinancialSummary> {
    let result = async {
        caller.require_admin()?;
        state.repo.financial_summary().await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/notifications/mass-email (admin) - Every active member.
pub async fn send_mass_email(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<MassEmailRequest>,
) -> ApiResult<BatchOutcome> {
    let result = async {
        caller.require_admin()?;
        request.validate()?;
        let settings = state.repo.get_settings().await?;
        let members = state.repo.active_members().await?;
        let outcome = send_batch(
            state.mailer.as_ref(),
            members
                .iter()
                .map(|m| mass_email(&settings, m, &request.subject, &request.message)),
        );
        tracing::info!(
            sent = outcome.sent_count,
            failed = outcome.failed_count,
            "Mass email sent"
        );
        state
            .repo
            .record_batch(
                ActivityAction::MassEmail,
                caller.id(),
                outcome,
                &format!("mass email '{}'", request.subject.trim()),
            )
            .await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/notifications/contribution-reminders (admin) - Members with no
/// contribution for the given month.
pub async fn send_contribution_reminders(
    State(state): State<AppState>,
    caller: Caller,
    Json(period): Json<PeriodQuery>,
) -> ApiResult<BatchOutcome> {
    let result = async {
        caller.require_admin()?;
        let settings = state.repo.get_settings().await?;
        let missing = state
            .repo
            .missing_contributions(period.year, period.month)
            .await?;
        let outcome = send_batch(
            state.mailer.as_ref(),
            missing.iter().map(|m| {
                contribution_reminder_email(&settings, &m.email, &m.full_name, m.year, m.month)
            }),
        );
        state
            .repo
            .record_batch(
                ActivityAction::RemindersSent,
                caller.id(),
                outcome,
                &format!("contribution reminders for {}-{:02}", period.year, period.month),
            )
            .await
    }
    .await;
    respond(&state, result).await
}
