//! Loan applications, the loan lifecycle, schedules and repayments.

use chrono::{Days, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::ledger::eligibility_for;
use super::repository::{bump_revision, code, insert_transaction, log_activity, money, new_id};
use super::Repository;
use crate::engine::allocation::{allocate_payment, apply_to_balance};
use crate::engine::amortization::{
    generate_schedule, total_expected_repayment, INSTALLMENT_INTERVAL_DAYS,
};
use crate::engine::money::{percent_of_amount, round_money, HUNDRED};
use crate::engine::statement::{build_statement, due_for_loan, refresh_overdue, DueOwner};
use crate::errors::AppError;
use crate::models::{
    ActivityAction, ApplicationStatus, ApproveApplicationRequest, DisburseLoanRequest,
    DuePayments, GuarantorStatus, Loan, LoanApplication, LoanApplicationRequest, LoanRepayment,
    LoanStatement, LoanStatus, NewTransaction, RecordRepaymentRequest, RepaymentOutcome, Role,
    SaccoSettings, ScheduleEntry, ScheduleStatus, TransactionType,
};

impl Repository {
    // ==================== APPLICATIONS ====================

    /// File an application for `member_id`. The member must currently be
    /// eligible and the amount must be within their limit.
    pub async fn apply_for_loan(
        &self,
        settings: &SaccoSettings,
        member_id: &str,
        request: &LoanApplicationRequest,
        actor_id: &str,
    ) -> Result<LoanApplication, AppError> {
        request.validate(settings.maximum_loan_term_months)?;
        let member = self.require_member(member_id).await?;
        if member.role != Role::Member {
            return Err(AppError::Validation(
                "Only members can apply for loans".to_string(),
            ));
        }

        let eligibility = {
            let mut conn = self.pool.acquire().await?;
            eligibility_for(&mut conn, settings, &member).await?
        };
        if !eligibility.eligible {
            let reason = eligibility
                .reason
                .unwrap_or_else(|| "Member is not eligible for a loan".to_string());
            tracing::warn!(member = %member.id, reason = %reason, "Loan application refused");
            return Err(AppError::Validation(reason));
        }
        let amount = round_money(request.amount);
        if amount > eligibility.max_loan_amount {
            return Err(AppError::Validation(format!(
                "Requested amount {} exceeds the maximum loan amount of {}",
                amount, eligibility.max_loan_amount
            )));
        }

        let now = Utc::now();
        let application = LoanApplication {
            id: new_id(),
            member_id: member.id.clone(),
            amount,
            purpose: request.purpose.trim().to_string(),
            term_months: request.term_months,
            status: ApplicationStatus::Pending,
            application_date: now,
            reviewed_at: None,
            reviewed_by: None,
            rejection_reason: None,
            loan_id: None,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO loan_applications (id, member_id, amount, purpose, term_months, status, application_date, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&application.id)
        .bind(&application.member_id)
        .bind(application.amount.to_string())
        .bind(&application.purpose)
        .bind(application.term_months)
        .bind(application.status.as_str())
        .bind(application.application_date)
        .bind(application.updated_at)
        .execute(&mut *tx)
        .await?;
        log_activity(
            &mut tx,
            Some(actor_id),
            ActivityAction::LoanApplied,
            format!(
                "{} applied for {} over {} months",
                member.email, application.amount, application.term_months
            ),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(application)
    }

    pub async fn get_application(&self, id: &str) -> Result<Option<LoanApplication>, AppError> {
        let row = sqlx::query("SELECT * FROM loan_applications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(application_from_row).transpose()
    }

    pub async fn require_application(&self, id: &str) -> Result<LoanApplication, AppError> {
        self.get_application(id)
            .await?
            .ok_or_else(|| AppError::not_found("Loan application", id))
    }

    pub async fn list_applications(
        &self,
        member_id: Option<&str>,
    ) -> Result<Vec<LoanApplication>, AppError> {
        let rows = match member_id {
            Some(member_id) => {
                sqlx::query(
                    "SELECT * FROM loan_applications WHERE member_id = ? ORDER BY application_date DESC",
                )
                .bind(member_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query("SELECT * FROM loan_applications ORDER BY application_date DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(application_from_row).collect()
    }

    /// Withdraw a pending application along with its open guarantor requests.
    pub async fn cancel_application(
        &self,
        id: &str,
        actor_id: &str,
    ) -> Result<LoanApplication, AppError> {
        let mut tx = self.pool.begin().await?;
        close_pending_application(&mut tx, id, ApplicationStatus::Cancelled, actor_id, None).await?;
        close_guarantor_requests(&mut tx, id).await?;
        log_activity(
            &mut tx,
            Some(actor_id),
            ActivityAction::LoanApplicationCancelled,
            format!("Cancelled loan application {}", id),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        self.require_application(id).await
    }

    pub async fn reject_application(
        &self,
        id: &str,
        reason: &str,
        actor_id: &str,
    ) -> Result<LoanApplication, AppError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::Validation(
                "A rejection reason is required".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;
        close_pending_application(&mut tx, id, ApplicationStatus::Rejected, actor_id, Some(reason))
            .await?;
        close_guarantor_requests(&mut tx, id).await?;
        log_activity(
            &mut tx,
            Some(actor_id),
            ActivityAction::LoanRejected,
            format!("Rejected loan application {}: {}", id, reason),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(application = %id, "Loan application rejected");
        self.require_application(id).await
    }

    /// Approve a pending application and create its loan.
    pub async fn approve_application(
        &self,
        settings: &SaccoSettings,
        id: &str,
        request: &ApproveApplicationRequest,
        actor_id: &str,
    ) -> Result<Loan, AppError> {
        let application = self.require_application(id).await?;
        let interest_rate = request.interest_rate.unwrap_or(settings.loan_interest_rate);
        if interest_rate < Decimal::ZERO || interest_rate > HUNDRED {
            return Err(AppError::Validation(
                "Interest rate must be between 0 and 100".to_string(),
            ));
        }

        let now = Utc::now();
        let principal = application.amount;
        let processing_fee = percent_of_amount(principal, settings.loan_processing_fee_percentage);
        let insurance_fee = percent_of_amount(principal, settings.loan_insurance_percentage);
        let total = total_expected_repayment(principal, interest_rate, application.term_months);

        let loan = Loan {
            id: new_id(),
            application_id: application.id.clone(),
            member_id: application.member_id.clone(),
            principal_amount: principal,
            interest_rate: round_money(interest_rate),
            term_months: application.term_months,
            status: LoanStatus::Approved,
            processing_fee,
            insurance_fee,
            disbursed_amount: round_money(principal - processing_fee - insurance_fee),
            total_expected_repayment: total,
            total_repaid: round_money(Decimal::ZERO),
            remaining_balance: total,
            approval_date: Some(now.date_naive()),
            approved_by: Some(actor_id.to_string()),
            disbursement_date: None,
            expected_completion_date: None,
            settled_at: None,
            created_at: now,
            updated_at: now,
            version: 1,
        };

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE loan_applications SET status = ?, reviewed_at = ?, reviewed_by = ?, loan_id = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(ApplicationStatus::Approved.as_str())
        .bind(now)
        .bind(actor_id)
        .bind(&loan.id)
        .bind(now)
        .bind(id)
        .bind(ApplicationStatus::Pending.as_str())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::InvalidState(format!(
                "Loan application {} is no longer pending",
                id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO loans (
                id, application_id, member_id, principal_amount, interest_rate, term_months,
                status, processing_fee, insurance_fee, disbursed_amount, total_expected_repayment,
                total_repaid, remaining_balance, approval_date, approved_by, created_at,
                updated_at, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(&loan.id)
        .bind(&loan.application_id)
        .bind(&loan.member_id)
        .bind(loan.principal_amount.to_string())
        .bind(loan.interest_rate.to_string())
        .bind(loan.term_months)
        .bind(loan.status.as_str())
        .bind(loan.processing_fee.to_string())
        .bind(loan.insurance_fee.to_string())
        .bind(loan.disbursed_amount.to_string())
        .bind(loan.total_expected_repayment.to_string())
        .bind(loan.total_repaid.to_string())
        .bind(loan.remaining_balance.to_string())
        .bind(loan.approval_date)
        .bind(&loan.approved_by)
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .execute(&mut *tx)
        .await?;

        log_activity(
            &mut tx,
            Some(actor_id),
            ActivityAction::LoanApproved,
            format!(
                "Approved loan of {} at {}% for member {}",
                loan.principal_amount, loan.interest_rate, loan.member_id
            ),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(loan = %loan.id, member = %loan.member_id, "Loan approved");
        Ok(loan)
    }

    // ==================== LOANS ====================

    pub async fn get_loan(&self, id: &str) -> Result<Option<Loan>, AppError> {
        let mut conn = self.pool.acquire().await?;
        find_loan(&mut conn, id).await
    }

    pub async fn require_loan(&self, id: &str) -> Result<Loan, AppError> {
        self.get_loan(id)
            .await?
            .ok_or_else(|| AppError::not_found("Loan", id))
    }

    pub async fn list_loans(
        &self,
        status: Option<LoanStatus>,
        member_id: Option<&str>,
    ) -> Result<Vec<Loan>, AppError> {
        let mut sql = String::from("SELECT * FROM loans WHERE 1 = 1");
        if status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if member_id.is_some() {
            sql.push_str(" AND member_id = ?");
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut query = sqlx::query(&sql);
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        if let Some(member_id) = member_id {
            query = query.bind(member_id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(loan_from_row).collect()
    }

    /// Pay out an approved loan and lay down its repayment schedule. The
    /// expected repayment is re-based on the generated schedule.
    pub async fn disburse_loan(
        &self,
        id: &str,
        request: &DisburseLoanRequest,
        actor_id: &str,
    ) -> Result<Loan, AppError> {
        let loan = self.require_loan(id).await?;
        if loan.status != LoanStatus::Approved {
            return Err(AppError::InvalidState(format!(
                "Only approved loans can be disbursed; loan is {}",
                loan.status
            )));
        }

        let disbursed_on = request
            .disbursement_date
            .unwrap_or_else(|| Utc::now().date_naive());
        let installments = generate_schedule(
            loan.principal_amount,
            loan.interest_rate,
            loan.term_months,
            disbursed_on,
        )?;
        let total = round_money(installments.iter().map(|i| i.amount_due).sum());
        let completion_days = u64::try_from(loan.term_months)
            .ok()
            .and_then(|t| t.checked_mul(INSTALLMENT_INTERVAL_DAYS))
            .ok_or_else(|| AppError::Validation("Invalid loan term".to_string()))?;
        let expected_completion = disbursed_on
            .checked_add_days(Days::new(completion_days))
            .ok_or_else(|| AppError::Validation("Completion date out of range".to_string()))?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE loans SET
                status = ?, disbursement_date = ?, expected_completion_date = ?,
                total_expected_repayment = ?, remaining_balance = ?, updated_at = ?,
                version = version + 1
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(LoanStatus::Disbursed.as_str())
        .bind(disbursed_on)
        .bind(expected_completion)
        .bind(total.to_string())
        .bind(round_money(total - loan.total_repaid).to_string())
        .bind(now)
        .bind(id)
        .bind(LoanStatus::Approved.as_str())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::InvalidState(format!(
                "Loan {} is no longer awaiting disbursement",
                id
            )));
        }

        for installment in &installments {
            sqlx::query(
                r#"
                INSERT INTO repayment_schedule (
                    id, loan_id, installment_number, due_date, principal_amount,
                    interest_amount, amount_due, amount_paid, remaining_amount, status
                ) VALUES (?, ?, ?, ?, ?, ?, ?, '0.00', ?, ?)
                "#,
            )
            .bind(new_id())
            .bind(id)
            .bind(installment.installment_number)
            .bind(installment.due_date)
            .bind(installment.principal_amount.to_string())
            .bind(installment.interest_amount.to_string())
            .bind(installment.amount_due.to_string())
            .bind(installment.amount_due.to_string())
            .bind(ScheduleStatus::Pending.as_str())
            .execute(&mut *tx)
            .await?;
        }

        insert_transaction(
            &mut tx,
            &NewTransaction {
                member_id: &loan.member_id,
                transaction_type: TransactionType::LoanDisbursement,
                amount: loan.principal_amount,
                cost: loan.processing_fee + loan.insurance_fee,
                reference_id: Some(&loan.id),
                description: format!(
                    "Loan disbursement of {} ({} paid out after fees)",
                    loan.principal_amount, loan.disbursed_amount
                ),
                transaction_date: disbursed_on,
                recorded_by: Some(actor_id),
            },
        )
        .await?;
        log_activity(
            &mut tx,
            Some(actor_id),
            ActivityAction::LoanDisbursed,
            format!(
                "Disbursed loan {} with {} installments",
                loan.id,
                installments.len()
            ),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(loan = %id, total = %total, "Loan disbursed");
        self.require_loan(id).await
    }

    /// Record a repayment. The loan row is updated first, guarded by its
    /// version, so two concurrent repayments cannot both apply.
    pub async fn record_repayment(
        &self,
        id: &str,
        request: &RecordRepaymentRequest,
        actor_id: &str,
    ) -> Result<RepaymentOutcome, AppError> {
        let loan = self.require_loan(id).await?;
        if loan.status != LoanStatus::Disbursed {
            return Err(AppError::InvalidState(format!(
                "Repayments can only be recorded on disbursed loans; loan is {}",
                loan.status
            )));
        }
        if let Some(expected) = request.expected_version {
            if loan.version != expected {
                return Err(AppError::Conflict {
                    message: format!(
                        "Version mismatch: expected {}, current {}",
                        expected, loan.version
                    ),
                    current_version: loan.version,
                });
            }
        }

        let amount = round_money(request.amount);
        let balance = apply_to_balance(loan.total_repaid, loan.remaining_balance, amount)?;
        let now = Utc::now();
        let paid_on = request.payment_date.unwrap_or_else(|| now.date_naive());
        let next_status = if balance.settled {
            LoanStatus::Settled
        } else {
            LoanStatus::Disbursed
        };

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE loans SET
                total_repaid = ?, remaining_balance = ?, status = ?, settled_at = ?,
                updated_at = ?, version = version + 1
            WHERE id = ? AND version = ? AND status = ?
            "#,
        )
        .bind(round_money(balance.total_repaid).to_string())
        .bind(round_money(balance.remaining_balance).to_string())
        .bind(next_status.as_str())
        .bind(balance.settled.then_some(now))
        .bind(now)
        .bind(id)
        .bind(loan.version)
        .bind(LoanStatus::Disbursed.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            drop(tx);
            let current = self.get_loan(id).await?;
            tracing::warn!(loan = %id, "Concurrent repayment rejected");
            return Err(AppError::Conflict {
                message: "Concurrent modification detected".to_string(),
                current_version: current.map(|l| l.version).unwrap_or(0),
            });
        }

        let repayment = LoanRepayment {
            id: new_id(),
            loan_id: loan.id.clone(),
            amount,
            payment_date: paid_on,
            reference_number: request.reference_number.clone(),
            payment_method: request.payment_method.clone(),
            notes: request.notes.clone(),
            recorded_by: actor_id.to_string(),
            created_at: now,
        };
        sqlx::query(
            "INSERT INTO loan_repayments (id, loan_id, amount, payment_date, reference_number, payment_method, notes, recorded_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&repayment.id)
        .bind(&repayment.loan_id)
        .bind(repayment.amount.to_string())
        .bind(repayment.payment_date)
        .bind(&repayment.reference_number)
        .bind(&repayment.payment_method)
        .bind(&repayment.notes)
        .bind(&repayment.recorded_by)
        .bind(repayment.created_at)
        .execute(&mut *tx)
        .await?;

        let mut schedule = load_schedule(&mut tx, id).await?;
        let allocation = allocate_payment(&mut schedule, amount, paid_on);
        for &i in &allocation.touched {
            save_schedule_entry(&mut tx, &schedule[i]).await?;
        }
        if allocation.unallocated > Decimal::ZERO {
            tracing::debug!(loan = %id, unallocated = %allocation.unallocated, "Repayment exceeds outstanding schedule");
        }

        insert_transaction(
            &mut tx,
            &NewTransaction {
                member_id: &loan.member_id,
                transaction_type: TransactionType::LoanRepayment,
                amount,
                cost: Decimal::ZERO,
                reference_id: Some(&repayment.id),
                description: format!("Loan repayment on {}", loan.id),
                transaction_date: paid_on,
                recorded_by: Some(actor_id),
            },
        )
        .await?;
        log_activity(
            &mut tx,
            Some(actor_id),
            ActivityAction::LoanRepayment,
            format!("Recorded repayment of {} on loan {}", amount, loan.id),
        )
        .await?;
        if balance.settled {
            log_activity(
                &mut tx,
                Some(actor_id),
                ActivityAction::LoanSettled,
                format!("Loan {} fully repaid", loan.id),
            )
            .await?;
        }
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        if balance.settled {
            tracing::info!(loan = %id, "Loan settled");
        }

        let allocations = allocation
            .touched
            .iter()
            .map(|&i| schedule[i].clone())
            .collect();
        Ok(RepaymentOutcome {
            repayment,
            loan: self.require_loan(id).await?,
            allocations,
            settled: balance.settled,
        })
    }

    pub async fn mark_defaulted(&self, id: &str, actor_id: &str) -> Result<Loan, AppError> {
        let loan = self.require_loan(id).await?;
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE loans SET status = ?, updated_at = ?, version = version + 1 WHERE id = ? AND status = ?",
        )
        .bind(LoanStatus::Defaulted.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(LoanStatus::Disbursed.as_str())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::InvalidState(format!(
                "Only disbursed loans can be marked defaulted; loan is {}",
                loan.status
            )));
        }
        log_activity(
            &mut tx,
            Some(actor_id),
            ActivityAction::LoanDefaulted,
            format!("Marked loan {} as defaulted with {} outstanding", id, loan.remaining_balance),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::warn!(loan = %id, "Loan marked defaulted");
        self.require_loan(id).await
    }

    pub async fn list_repayments(&self, loan_id: &str) -> Result<Vec<LoanRepayment>, AppError> {
        let rows = sqlx::query(
            "SELECT * FROM loan_repayments WHERE loan_id = ? ORDER BY payment_date, created_at",
        )
        .bind(loan_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(repayment_from_row).collect()
    }

    /// The loan's schedule with past-due PENDING entries flagged OVERDUE.
    pub async fn get_schedule(&self, loan_id: &str) -> Result<Vec<ScheduleEntry>, AppError> {
        self.require_loan(loan_id).await?;
        let today = Utc::now().date_naive();

        let mut conn = self.pool.acquire().await?;
        let mut schedule = load_schedule(&mut conn, loan_id).await?;
        let changed = refresh_overdue(&mut schedule, today);
        drop(conn);

        if !changed.is_empty() {
            let mut tx = self.pool.begin().await?;
            for &i in &changed {
                mark_overdue(&mut tx, &schedule[i]).await?;
            }
            tx.commit().await?;
        }
        Ok(schedule)
    }

    pub async fn loan_statement(&self, loan_id: &str) -> Result<LoanStatement, AppError> {
        let loan = self.require_loan(loan_id).await?;
        let schedule = self.get_schedule(loan_id).await?;
        let repayments = self.list_repayments(loan_id).await?;
        let now = Utc::now();
        Ok(build_statement(
            &loan,
            schedule,
            repayments,
            now.date_naive(),
            now,
        ))
    }

    /// Outstanding installments of disbursed loans, split into overdue and
    /// due within `window_days`.
    pub async fn due_payments(&self, window_days: i64) -> Result<DuePayments, AppError> {
        let today = Utc::now().date_naive();
        let rows = sqlx::query(
            r#"
            SELECT l.id AS loan_id, l.member_id, m.full_name, m.email
            FROM loans l JOIN members m ON m.id = l.member_id
            WHERE l.status = ?
            ORDER BY m.full_name
            "#,
        )
        .bind(LoanStatus::Disbursed.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut conn = self.pool.acquire().await?;
        let mut due = DuePayments::default();
        for row in &rows {
            let loan_id: String = row.try_get("loan_id")?;
            let member_id: String = row.try_get("member_id")?;
            let member_name: String = row.try_get("full_name")?;
            let member_email: String = row.try_get("email")?;

            let schedule = load_schedule(&mut conn, &loan_id).await?;
            let owner = DueOwner {
                loan_id: &loan_id,
                member_id: &member_id,
                member_name: &member_name,
                member_email: &member_email,
            };
            let (overdue, upcoming) = due_for_loan(&owner, &schedule, today, window_days);
            due.overdue.extend(overdue);
            due.upcoming.extend(upcoming);
        }
        due.overdue.sort_by(|a, b| b.days_overdue.cmp(&a.days_overdue));
        due.upcoming.sort_by_key(|d| d.earliest_due_date);
        Ok(due)
    }
}

async fn close_pending_application(
    conn: &mut SqliteConnection,
    id: &str,
    status: ApplicationStatus,
    actor_id: &str,
    reason: Option<&str>,
) -> Result<(), AppError> {
    let now = Utc::now();
    let result = sqlx::query(
        "UPDATE loan_applications SET status = ?, reviewed_at = ?, reviewed_by = ?, rejection_reason = ?, updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(status.as_str())
    .bind(now)
    .bind(actor_id)
    .bind(reason)
    .bind(now)
    .bind(id)
    .bind(ApplicationStatus::Pending.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        let exists = sqlx::query("SELECT status FROM loan_applications WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        return match exists {
            Some(row) => {
                let current: String = row.try_get("status")?;
                Err(AppError::InvalidState(format!(
                    "Loan application is {}, not PENDING",
                    current
                )))
            }
            None => Err(AppError::not_found("Loan application", id)),
        };
    }
    Ok(())
}

async fn close_guarantor_requests(
    conn: &mut SqliteConnection,
    application_id: &str,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE guarantor_requests SET status = ?, responded_at = ? WHERE application_id = ? AND status = ?",
    )
    .bind(GuarantorStatus::Cancelled.as_str())
    .bind(Utc::now())
    .bind(application_id)
    .bind(GuarantorStatus::Pending.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(super) async fn find_loan(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Loan>, AppError> {
    let row = sqlx::query("SELECT * FROM loans WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(loan_from_row).transpose()
}

async fn load_schedule(
    conn: &mut SqliteConnection,
    loan_id: &str,
) -> Result<Vec<ScheduleEntry>, AppError> {
    let rows = sqlx::query(
        "SELECT * FROM repayment_schedule WHERE loan_id = ? ORDER BY installment_number",
    )
    .bind(loan_id)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(schedule_from_row).collect()
}

async fn save_schedule_entry(
    conn: &mut SqliteConnection,
    entry: &ScheduleEntry,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE repayment_schedule SET amount_paid = ?, remaining_amount = ?, status = ?, paid_date = ? WHERE id = ?",
    )
    .bind(round_money(entry.amount_paid).to_string())
    .bind(round_money(entry.remaining_amount).to_string())
    .bind(entry.status.as_str())
    .bind(entry.paid_date)
    .bind(&entry.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// Only flips entries still PENDING so a concurrent payment is never undone.
async fn mark_overdue(conn: &mut SqliteConnection, entry: &ScheduleEntry) -> Result<(), AppError> {
    sqlx::query("UPDATE repayment_schedule SET status = ? WHERE id = ? AND status = ?")
        .bind(ScheduleStatus::Overdue.as_str())
        .bind(&entry.id)
        .bind(ScheduleStatus::Pending.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn application_from_row(row: &SqliteRow) -> Result<LoanApplication, AppError> {
    Ok(LoanApplication {
        id: row.try_get("id")?,
        member_id: row.try_get("member_id")?,
        amount: money(row, "amount")?,
        purpose: row.try_get("purpose")?,
        term_months: row.try_get("term_months")?,
        status: code(row, "status", ApplicationStatus::from_str)?,
        application_date: row.try_get("application_date")?,
        reviewed_at: row.try_get("reviewed_at")?,
        reviewed_by: row.try_get("reviewed_by")?,
        rejection_reason: row.try_get("rejection_reason")?,
        loan_id: row.try_get("loan_id")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(super) fn loan_from_row(row: &SqliteRow) -> Result<Loan, AppError> {
    Ok(Loan {
        id: row.try_get("id")?,
        application_id: row.try_get("application_id")?,
        member_id: row.try_get("member_id")?,
        principal_amount: money(row, "principal_amount")?,
        interest_rate: money(row, "interest_rate")?,
        term_months: row.try_get("term_months")?,
        status: code(row, "status", LoanStatus::from_str)?,
        processing_fee: money(row, "processing_fee")?,
        insurance_fee: money(row, "insurance_fee")?,
        disbursed_amount: money(row, "disbursed_amount")?,
        total_expected_repayment: money(row, "total_expected_repayment")?,
        total_repaid: money(row, "total_repaid")?,
        remaining_balance: money(row, "remaining_balance")?,
        approval_date: row.try_get("approval_date")?,
        approved_by: row.try_get("approved_by")?,
        disbursement_date: row.try_get("disbursement_date")?,
        expected_completion_date: row.try_get("expected_completion_date")?,
        settled_at: row.try_get("settled_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
    })
}

fn schedule_from_row(row: &SqliteRow) -> Result<ScheduleEntry, AppError> {
    Ok(ScheduleEntry {
        id: row.try_get("id")?,
        loan_id: row.try_get("loan_id")?,
        installment_number: row.try_get("installment_number")?,
        due_date: row.try_get("due_date")?,
        principal_amount: money(row, "principal_amount")?,
        interest_amount: money(row, "interest_amount")?,
        amount_due: money(row, "amount_due")?,
        amount_paid: money(row, "amount_paid")?,
        remaining_amount: money(row, "remaining_amount")?,
        status: code(row, "status", ScheduleStatus::from_str)?,
        paid_date: row.try_get("paid_date")?,
    })
}

fn repayment_from_row(row: &SqliteRow) -> Result<LoanRepayment, AppError> {
    Ok(LoanRepayment {
        id: row.try_get("id")?,
        loan_id: row.try_get("loan_id")?,
        amount: money(row, "amount")?,
        payment_date: row.try_get("payment_date")?,
        reference_number: row.try_get("reference_number")?,
        payment_method: row.try_get("payment_method")?,
        notes: row.try_get("notes")?,
        recorded_by: row.try_get("recorded_by")?,
        created_at: row.try_get("created_at")?,
    })
}
