//! Loan application, loan lifecycle and repayment endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{respond, ApiResult};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::models::{
    ActivityAction, ApproveApplicationRequest, BatchOutcome, DisburseLoanRequest, DuePayments, Loan,
    LoanApplication, LoanApplicationRequest, LoanFilter, LoanRepayment, LoanStatement, LoanStatus,
    Member, RecordRepaymentRequest, RejectApplicationRequest, ReminderRequest, ReminderScope,
    RepaymentOutcome, SaccoSettings, ScheduleEntry,
};
use crate::notify::{
    loan_approved_email, loan_disbursed_email, loan_rejected_email, loan_settled_email,
    payment_received_email, payment_reminder_email, send_batch, send_best_effort, OutboundEmail,
};
use crate::AppState;

/// Email a member about their loan. Failures are logged and swallowed.
async fn notify_member<F>(state: &AppState, member_id: &str, build: F)
where
    F: FnOnce(&SaccoSettings, &Member) -> OutboundEmail,
{
    let loaded = async {
        let settings = state.repo.get_settings().await?;
        let member = state.repo.require_member(member_id).await?;
        Ok::<_, AppError>((settings, member))
    }
    .await;
    match loaded {
        Ok((settings, member)) => {
            send_best_effort(state.mailer.as_ref(), &build(&settings, &member));
        }
        Err(e) => tracing::warn!(member = %member_id, "Notification skipped: {}", e),
    }
}

/// The loan, provided the caller owns it or is an administrator.
async fn visible_loan(state: &AppState, caller: &Caller, id: &str) -> Result<Loan, AppError> {
    let loan = state.repo.require_loan(id).await?;
    caller.require_self_or_admin(&loan.member_id)?;
    Ok(loan)
}

// ==================== APPLICATIONS ====================

/// POST /api/loan-applications - Members apply for themselves; administrators
/// may apply on behalf of a member.
pub async fn apply_for_loan(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<LoanApplicationRequest>,
) -> ApiResult<LoanApplication> {
    let result = async {
        let member_id = match &request.member_id {
            Some(id) => {
                caller.require_self_or_admin(id)?;
                id.clone()
            }
            None => caller.id().to_string(),
        };
        let settings = state.repo.get_settings().await?;
        state
            .repo
            .apply_for_loan(&settings, &member_id, &request, caller.id())
            .await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/loan-applications - All for administrators, own for members.
pub async fn list_applications(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Vec<LoanApplication>> {
    let scope = (!caller.is_admin()).then(|| caller.id());
    let result = state.repo.list_applications(scope).await;
    respond(&state, result).await
}

/// GET /api/loan-applications/:id
pub async fn get_application(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<LoanApplication> {
    let result = async {
        let application = state.repo.require_application(&id).await?;
        caller.require_self_or_admin(&application.member_id)?;
        Ok::<_, AppError>(application)
    }
    .await;
    respond(&state, result).await
}

/// POST /api/loan-applications/:id/cancel - Applicant withdraws.
pub async fn cancel_application(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<LoanApplication> {
    let result = async {
        let application = state.repo.require_application(&id).await?;
        if application.member_id != caller.id() {
            return Err(AppError::Forbidden(
                "Only the applicant can cancel an application".to_string(),
            ));
        }
        state.repo.cancel_application(&id, caller.id()).await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/loan-applications/:id/approve (admin)
pub async fn approve_application(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    request: Option<Json<ApproveApplicationRequest>>,
) -> ApiResult<Loan> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let result = async {
        caller.require_admin()?;
        let settings = state.repo.get_settings().await?;
        state
            .repo
            .approve_application(&settings, &id, &request, caller.id())
            .await
    }
    .await;

    if let Ok(loan) = &result {
        notify_member(&state, &loan.member_id, |settings, member| {
            loan_approved_email(settings, member, loan)
        })
        .await;
    }
    respond(&state, result).await
}

/// POST /api/loan-applications/:id/reject (admin)
pub async fn reject_application(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<RejectApplicationRequest>,
) -> ApiResult<LoanApplication> {
    let result = async {
        caller.require_admin()?;
        state
            .repo
            .reject_application(&id, &request.reason, caller.id())
            .await
    }
    .await;

    if let Ok(application) = &result {
        let reason = application.rejection_reason.clone().unwrap_or_default();
        notify_member(&state, &application.member_id, |settings, member| {
            loan_rejected_email(settings, member, &reason)
        })
        .await;
    }
    respond(&state, result).await
}

// ==================== LOANS ====================

/// GET /api/loans?status=&memberId= - All for administrators, own for members.
pub async fn list_loans(
    State(state): State<AppState>,
    caller: Caller,
    Query(filter): Query<LoanFilter>,
) -> ApiResult<Vec<Loan>> {
    let result = async {
        let status = match &filter.status {
            Some(s) => Some(LoanStatus::from_str(s).ok_or_else(|| {
                AppError::Validation(format!("Unknown loan status '{}'", s))
            })?),
            None => None,
        };
        let member_id = if caller.is_admin() {
            filter.member_id.as_deref()
        } else {
            Some(caller.id())
        };
        state.repo.list_loans(status, member_id).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/loans/:id
pub async fn get_loan(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Loan> {
    let result = visible_loan(&state, &caller, &id).await;
    respond(&state, result).await
}

/// POST /api/loans/:id/disburse (admin)
pub async fn disburse_loan(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    request: Option<Json<DisburseLoanRequest>>,
) -> ApiResult<Loan> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let result = async {
        caller.require_admin()?;
        state.repo.disburse_loan(&id, &request, caller.id()).await
    }
    .await;

    if let Ok(loan) = &result {
        notify_member(&state, &loan.member_id, |settings, member| {
            loan_disbursed_email(settings, member, loan)
        })
        .await;
    }
    respond(&state, result).await
}

/// POST /api/loans/:id/repayments (admin)
pub async fn record_repayment(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<RecordRepaymentRequest>,
) -> ApiResult<RepaymentOutcome> {
    let result = async {
        caller.require_admin()?;
        state.repo.record_repayment(&id, &request, caller.id()).await
    }
    .await;

    if let Ok(outcome) = &result {
        let loan = &outcome.loan;
        notify_member(&state, &loan.member_id, |settings, member| {
            payment_received_email(settings, member, loan, outcome.repayment.amount)
        })
        .await;
        if outcome.settled {
            notify_member(&state, &loan.member_id, |settings, member| {
                loan_settled_email(settings, member, loan)
            })
            .await;
        }
    }
    respond(&state, result).await
}

/// GET /api/loans/:id/repayments
pub async fn list_repayments(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Vec<LoanRepayment>> {
    let result = async {
        visible_loan(&state, &caller, &id).await?;
        state.repo.list_repayments(&id).await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/loans/:id/default (admin)
pub async fn mark_defaulted(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Loan> {
    let result = async {
        caller.require_admin()?;
        state.repo.mark_defaulted(&id, caller.id()).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/loans/:id/schedule
pub async fn get_schedule(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Vec<ScheduleEntry>> {
    let result = async {
        visible_loan(&state, &caller, &id).await?;
        state.repo.get_schedule(&id).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/loans/:id/statement
pub async fn loan_statement(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<LoanStatement> {
    let result = async {
        visible_loan(&state, &caller, &id).await?;
        state.repo.loan_statement(&id).await
    }
    .await;
    respond(&state, result).await
}

/// GET /api/reports/due-payments (admin)
pub async fn due_payments(State(state): State<AppState>, caller: Caller) -> ApiResult<DuePayments> {
    let result = async {
        caller.require_admin()?;
        state
            .repo
            .due_payments(state.config.reminder_window_days)
            .await
    }
    .await;
    respond(&state, result).await
}

/// POST /api/notifications/payment-reminders (admin) - One email per loan.
pub async fn send_payment_reminders(
    State(state): State<AppState>,
    caller: Caller,
    request: Option<Json<ReminderRequest>>,
) -> ApiResult<BatchOutcome> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let result = async {
        caller.require_admin()?;
        let scope = request.scope()?;
        let settings = state.repo.get_settings().await?;
        let due = state
            .repo
            .due_payments(state.config.reminder_window_days)
            .await?;

        let mut emails = Vec::new();
        if matches!(scope, ReminderScope::Overdue | ReminderScope::All) {
            emails.extend(due.overdue.iter().map(|d| payment_reminder_email(&settings, d, true)));
        }
        if matches!(scope, ReminderScope::Upcoming | ReminderScope::All) {
            emails.extend(due.upcoming.iter().map(|d| payment_reminder_email(&settings, d, false)));
        }
        let outcome = send_batch(state.mailer.as_ref(), emails);
        tracing::info!(
            scope = %scope,
            sent = outcome.sent_count,
            failed = outcome.failed_count,
            "Payment reminders sent"
        );
        state
            .repo
            .record_batch(
                ActivityAction::RemindersSent,
                caller.id(),
                outcome,
                &format!("{} payment reminders", scope),
            )
            .await
    }
    .await;
    respond(&state, result).await
}
