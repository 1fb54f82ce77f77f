//! Guarantor requests and guarantee capacity.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::ledger::load_summary;
use super::repository::{bump_revision, code, log_activity, money, new_id};
use super::Repository;
use crate::engine::guarantee::{
    acceptance_headroom, guarantee_capacity, AcceptedGuarantee, GuaranteeCapacity,
};
use crate::engine::money::round_money;
use crate::errors::AppError;
use crate::models::{
    ActivityAction, ApplicationStatus, CreateGuarantorRequest, GuarantorLimit, GuarantorRequest,
    GuarantorStatus, LoanStatus, RespondGuarantorRequest, Role, SaccoSettings,
};

impl Repository {
    /// Ask another member to guarantee part of a pending application.
    pub async fn request_guarantee(
        &self,
        requester_id: &str,
        request: &CreateGuarantorRequest,
    ) -> Result<GuarantorRequest, AppError> {
        request.validate()?;
        let application = self.require_application(&request.application_id).await?;
        if application.member_id != requester_id {
            return Err(AppError::Forbidden(
                "Only the applicant can request guarantors".to_string(),
            ));
        }
        if application.status != ApplicationStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Loan application is {}, not PENDING",
                application.status
            )));
        }
        if request.guarantor_id == requester_id {
            return Err(AppError::Validation(
                "You cannot guarantee your own loan".to_string(),
            ));
        }
        let guarantor = self.require_member(&request.guarantor_id).await?;
        if guarantor.role != Role::Member || !guarantor.is_active {
            return Err(AppError::Validation(format!(
                "{} cannot act as a guarantor",
                guarantor.full_name
            )));
        }

        let guarantee = GuarantorRequest {
            id: new_id(),
            application_id: application.id.clone(),
            requester_id: requester_id.to_string(),
            guarantor_id: guarantor.id.clone(),
            guarantee_amount: round_money(request.guarantee_amount),
            status: GuarantorStatus::Pending,
            message: request.message.clone(),
            response_message: None,
            requested_at: Utc::now(),
            responded_at: None,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO guarantor_requests (id, application_id, requester_id, guarantor_id, guarantee_amount, status, message, requested_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&guarantee.id)
        .bind(&guarantee.application_id)
        .bind(&guarantee.requester_id)
        .bind(&guarantee.guarantor_id)
        .bind(guarantee.guarantee_amount.to_string())
        .bind(guarantee.status.as_str())
        .bind(&guarantee.message)
        .bind(guarantee.requested_at)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM guarantor_requests WHERE application_id = ? AND guarantor_id = ? AND status = ?",
        )
        .bind(&guarantee.application_id)
        .bind(&guarantee.guarantor_id)
        .bind(GuarantorStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let open: i64 = row.try_get("n")?;
        if open > 1 {
            return Err(AppError::Validation(format!(
                "{} already has an open request for this application",
                guarantor.full_name
            )));
        }

        log_activity(
            &mut tx,
            Some(requester_id),
            ActivityAction::GuarantorRequested,
            format!(
                "Requested {} guarantee from {} for application {}",
                guarantee.guarantee_amount, guarantor.email, application.id
            ),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(guarantee)
    }

    pub async fn get_guarantor_request(
        &self,
        id: &str,
    ) -> Result<Option<GuarantorRequest>, AppError> {
        let row = sqlx::query("SELECT * FROM guarantor_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(request_from_row).transpose()
    }

    async fn require_guarantor_request(&self, id: &str) -> Result<GuarantorRequest, AppError> {
        self.get_guarantor_request(id)
            .await?
            .ok_or_else(|| AppError::not_found("Guarantor request", id))
    }

    /// Accept or decline a request addressed to `guarantor_id`. Accepting is
    /// bounded by the guarantor's available capacity.
    pub async fn respond_to_guarantor_request(
        &self,
        settings: &SaccoSettings,
        id: &str,
        guarantor_id: &str,
        response: &RespondGuarantorRequest,
    ) -> Result<GuarantorRequest, AppError> {
        let request = self.require_guarantor_request(id).await?;
        if request.guarantor_id != guarantor_id {
            return Err(AppError::Forbidden(
                "Only the requested guarantor can respond".to_string(),
            ));
        }
        if request.status != GuarantorStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "Guarantor request is {}, not PENDING",
                request.status
            )));
        }

        if response.accept {
            let mut conn = self.pool.acquire().await?;
            let (capacity, accepted) = capacity_of(&mut conn, settings, guarantor_id).await?;
            let headroom = acceptance_headroom(&capacity, &accepted);
            if request.guarantee_amount > headroom {
                return Err(AppError::Validation(format!(
                    "Guarantee of {} exceeds available capacity of {}",
                    request.guarantee_amount, headroom
                )));
            }
        }

        let status = if response.accept {
            GuarantorStatus::Accepted
        } else {
            GuarantorStatus::Rejected
        };
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE guarantor_requests SET status = ?, response_message = ?, responded_at = ? WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(&response.response_message)
        .bind(Utc::now())
        .bind(id)
        .bind(GuarantorStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::InvalidState(
                "Guarantor request is no longer pending".to_string(),
            ));
        }
        log_activity(
            &mut tx,
            Some(guarantor_id),
            ActivityAction::GuarantorResponded,
            format!("{} guarantor request {}", status, id),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.require_guarantor_request(id).await
    }

    pub async fn cancel_guarantor_request(
        &self,
        id: &str,
        requester_id: &str,
    ) -> Result<GuarantorRequest, AppError> {
        let request = self.require_guarantor_request(id).await?;
        if request.requester_id != requester_id {
            return Err(AppError::Forbidden(
                "Only the requester can cancel a guarantor request".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE guarantor_requests SET status = ?, responded_at = ? WHERE id = ? AND status = ?",
        )
        .bind(GuarantorStatus::Cancelled.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(GuarantorStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::InvalidState(format!(
                "Guarantor request is {}, not PENDING",
                request.status
            )));
        }
        log_activity(
            &mut tx,
            Some(requester_id),
            ActivityAction::GuarantorCancelled,
            format!("Cancelled guarantor request {}", id),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.require_guarantor_request(id).await
    }

    /// All requests, or only those a member sent or received.
    pub async fn list_guarantor_requests(
        &self,
        member_id: Option<&str>,
    ) -> Result<Vec<GuarantorRequest>, AppError> {
        let rows = match member_id {
            Some(member_id) => {
                sqlx::query(
                    "SELECT * FROM guarantor_requests WHERE requester_id = ? OR guarantor_id = ? ORDER BY requested_at DESC",
                )
                .bind(member_id)
                .bind(member_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM guarantor_requests ORDER BY requested_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(request_from_row).collect()
    }

    /// Current guarantee capacity, recomputed and stored as a snapshot.
    pub async fn guarantor_limit(
        &self,
        settings: &SaccoSettings,
        member_id: &str,
    ) -> Result<GuarantorLimit, AppError> {
        self.require_member(member_id).await?;

        let (capacity, _) = {
            let mut conn = self.pool.acquire().await?;
            capacity_of(&mut conn, settings, member_id).await?
        };
        let limit = GuarantorLimit {
            member_id: member_id.to_string(),
            total_guaranteed: capacity.total_guaranteed,
            active_guarantees: capacity.active_guarantees,
            maximum_guarantee_amount: capacity.maximum,
            available_guarantee_amount: capacity.available,
            updated_at: Utc::now(),
        };
        sqlx::query(
            r#"
            INSERT INTO guarantor_limits (
                member_id, total_guaranteed, active_guarantees, maximum_guarantee_amount,
                available_guarantee_amount, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(member_id) DO UPDATE SET
                total_guaranteed = excluded.total_guaranteed,
                active_guarantees = excluded.active_guarantees,
                maximum_guarantee_amount = excluded.maximum_guarantee_amount,
                available_guarantee_amount = excluded.available_guarantee_amount,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&limit.member_id)
        .bind(limit.total_guaranteed.to_string())
        .bind(limit.active_guarantees)
        .bind(limit.maximum_guarantee_amount.to_string())
        .bind(limit.available_guarantee_amount.to_string())
        .bind(limit.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(limit)
    }
}

/// Rescan the member's accepted guarantees against their contributions.
async fn capacity_of(
    conn: &mut SqliteConnection,
    settings: &SaccoSettings,
    member_id: &str,
) -> Result<(GuaranteeCapacity, Vec<AcceptedGuarantee>), AppError> {
    let summary = load_summary(conn, settings, member_id).await?;
    let rows = sqlx::query(
        r#"
        SELECT g.guarantee_amount, l.status AS loan_status, a.status AS application_status
        FROM guarantor_requests g
        JOIN loan_applications a ON a.id = g.application_id
        LEFT JOIN loans l ON l.application_id = g.application_id
        WHERE g.guarantor_id = ? AND g.status = ?
        "#,
    )
    .bind(member_id)
    .bind(GuarantorStatus::Accepted.as_str())
    .fetch_all(&mut *conn)
    .await?;

    let accepted = rows
        .iter()
        .map(|row| {
            let status: Option<String> = row.try_get("loan_status")?;
            let application_status: String = row.try_get("application_status")?;
            Ok(AcceptedGuarantee {
                amount: money(row, "guarantee_amount")?,
                loan_status: status.as_deref().and_then(LoanStatus::from_str),
                awaiting_review: ApplicationStatus::from_str(&application_status)
                    == Some(ApplicationStatus::Pending),
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let capacity = guarantee_capacity(summary.total_contributions, &accepted);
    Ok((capacity, accepted))
}

fn request_from_row(row: &SqliteRow) -> Result<GuarantorRequest, AppError> {
    Ok(GuarantorRequest {
        id: row.try_get("id")?,
        application_id: row.try_get("application_id")?,
        requester_id: row.try_get("requester_id")?,
        guarantor_id: row.try_get("guarantor_id")?,
        guarantee_amount: money(row, "guarantee_amount")?,
        status: code(row, "status", GuarantorStatus::from_str)?,
        message: row.try_get("message")?,
        response_message: row.try_get("response_message")?,
        requested_at: row.try_get("requested_at")?,
        responded_at: row.try_get("responded_at")?,
    })
}
