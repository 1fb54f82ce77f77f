//! Share capital, monthly contributions, member summaries and eligibility.

use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::members::{find_member, member_from_row};
use super::repository::{
    adjust_pool, bump_revision, insert_transaction, log_activity, money, new_id, pool_total,
    sum_column,
};
use super::Repository;
use crate::engine::money::{completion_percentage, non_negative, round_money};
use crate::engine::shares::{
    loan_eligibility, pool_percentage, share_figures, ContributionAmount, EligibilityInput,
};
use crate::errors::AppError;
use crate::models::{
    validate_period, ActivityAction, IncompleteShareCapital, LoanEligibility, LoanStatus, Member,
    MemberShareSummary, MissingContribution, MonthlyContribution, NewTransaction,
    RecordContributionRequest, RecordShareCapitalRequest, Role, SaccoSettings,
    ShareCapitalPayment, TransactionType,
};

impl Repository {
    // ==================== SHARE CAPITAL ====================

    pub async fn record_share_capital(
        &self,
        settings: &SaccoSettings,
        request: &RecordShareCapitalRequest,
        actor_id: &str,
    ) -> Result<ShareCapitalPayment, AppError> {
        request.validate()?;
        let member = self.require_ledger_member(&request.member_id).await?;

        let mut tx = self.pool.begin().await?;
        let payment = insert_share_capital(&mut tx, settings, &member, request, actor_id).await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(payment)
    }

    /// Record several share capital payments atomically: either all are
    /// stored or none.
    pub async fn bulk_record_share_capital(
        &self,
        settings: &SaccoSettings,
        requests: &[RecordShareCapitalRequest],
        actor_id: &str,
    ) -> Result<Vec<ShareCapitalPayment>, AppError> {
        if requests.is_empty() {
            return Err(AppError::Validation(
                "At least one share capital payment is required".to_string(),
            ));
        }
        let mut members = Vec::with_capacity(requests.len());
        for (i, request) in requests.iter().enumerate() {
            request.validate().map_err(|e| {
                AppError::Validation(format!("Payment {}: {}", i + 1, e.message()))
            })?;
            members.push(self.require_ledger_member(&request.member_id).await?);
        }

        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(requests.len());
        for (request, member) in requests.iter().zip(&members) {
            stored.push(insert_share_capital(&mut tx, settings, member, request, actor_id).await?);
        }
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(count = stored.len(), "Bulk share capital recorded");
        Ok(stored)
    }

    pub async fn list_share_capital(
        &self,
        member_id: &str,
    ) -> Result<Vec<ShareCapitalPayment>, AppError> {
        let rows = sqlx::query(
            "SELECT * FROM share_capital_payments WHERE member_id = ? ORDER BY transaction_date, created_at",
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(share_capital_from_row).collect()
    }

    /// Active members whose share capital is below the target.
    pub async fn incomplete_share_capital(
        &self,
        settings: &SaccoSettings,
    ) -> Result<Vec<IncompleteShareCapital>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT m.id, m.email, m.full_name, m.share_capital_term,
                   COALESCE(s.total_share_capital, '0.00') AS total_share_capital
            FROM members m
            LEFT JOIN share_summaries s ON s.member_id = m.id
            WHERE m.role = ? AND m.is_active = 1
            ORDER BY m.full_name
            "#,
        )
        .bind(Role::Member.as_str())
        .fetch_all(&self.pool)
        .await?;

        let target = round_money(settings.share_value);
        let mut result = Vec::new();
        for row in &rows {
            let paid = money(row, "total_share_capital")?;
            let completion = completion_percentage(paid, target);
            if completion >= crate::engine::money::HUNDRED {
                continue;
            }
            result.push(IncompleteShareCapital {
                member_id: row.try_get("id")?,
                full_name: row.try_get("full_name")?,
                email: row.try_get("email")?,
                share_capital_term: row.try_get("share_capital_term")?,
                total_share_capital: paid,
                share_capital_target: target,
                completion_percentage: completion,
                remaining_amount: round_money(non_negative(target - paid)),
            });
        }
        Ok(result)
    }

    // ==================== MONTHLY CONTRIBUTIONS ====================

    pub async fn record_contribution(
        &self,
        settings: &SaccoSettings,
        request: &RecordContributionRequest,
        actor_id: &str,
        unique_per_month: bool,
    ) -> Result<MonthlyContribution, AppError> {
        request.validate()?;
        let member = self.require_ledger_member(&request.member_id).await?;

        let mut tx = self.pool.begin().await?;
        let contribution =
            insert_contribution(&mut tx, settings, &member, request, actor_id, unique_per_month)
                .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(contribution)
    }

    /// Record several contributions atomically: either all are stored or none.
    pub async fn bulk_record_contributions(
        &self,
        settings: &SaccoSettings,
        requests: &[RecordContributionRequest],
        actor_id: &str,
        unique_per_month: bool,
    ) -> Result<Vec<MonthlyContribution>, AppError> {
        if requests.is_empty() {
            return Err(AppError::Validation(
                "At least one contribution is required".to_string(),
            ));
        }
        for (i, request) in requests.iter().enumerate() {
            request.validate().map_err(|e| {
                AppError::Validation(format!("Contribution {}: {}", i + 1, e.message()))
            })?;
        }

        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(requests.len());
        for request in requests {
            let member = find_member(&mut tx, &request.member_id)
                .await?
                .ok_or_else(|| AppError::not_found("Member", &request.member_id))?;
            ensure_ledger_member(&member)?;
            stored.push(
                insert_contribution(&mut tx, settings, &member, request, actor_id, unique_per_month)
                    .await?,
            );
        }
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(count = stored.len(), "Bulk contributions recorded");
        Ok(stored)
    }

    pub async fn list_contributions(
        &self,
        member_id: &str,
        year: Option<i64>,
    ) -> Result<Vec<MonthlyContribution>, AppError> {
        let rows = match year {
            Some(year) => {
                sqlx::query(
                    "SELECT * FROM monthly_contributions WHERE member_id = ? AND year = ? ORDER BY year, month, created_at",
                )
                .bind(member_id)
                .bind(year)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM monthly_contributions WHERE member_id = ? ORDER BY year, month, created_at",
                )
                .bind(member_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(contribution_from_row).collect()
    }

    /// Active members not on hold with nothing recorded for the month.
    pub async fn missing_contributions(
        &self,
        year: i64,
        month: i64,
    ) -> Result<Vec<MissingContribution>, AppError> {
        validate_period(year, month)?;
        let rows = sqlx::query(
            r#"
            SELECT m.* FROM members m
            WHERE m.role = ? AND m.is_active = 1 AND m.is_on_hold = 0
              AND NOT EXISTS (
                  SELECT 1 FROM monthly_contributions c
                  WHERE c.member_id = m.id AND c.year = ? AND c.month = ?
              )
            ORDER BY m.full_name
            "#,
        )
        .bind(Role::Member.as_str())
        .bind(year)
        .bind(month)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let member = member_from_row(row)?;
                Ok(MissingContribution {
                    member_id: member.id,
                    full_name: member.full_name,
                    email: member.email,
                    membership_number: member.membership_number,
                    year,
                    month,
                })
            })
            .collect()
    }

    // ==================== SUMMARIES ====================

    /// A member's summary with the pool percentage derived from the running
    /// pool total. Members with no summary yet get an empty one.
    pub async fn get_share_summary(
        &self,
        settings: &SaccoSettings,
        member_id: &str,
    ) -> Result<MemberShareSummary, AppError> {
        let mut conn = self.pool.acquire().await?;
        load_summary(&mut conn, settings, member_id).await
    }

    pub async fn list_share_summaries(&self) -> Result<Vec<MemberShareSummary>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let pool = pool_total(&mut conn).await?;
        let rows = sqlx::query(
            "SELECT s.* FROM share_summaries s JOIN members m ON m.id = s.member_id ORDER BY m.full_name",
        )
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(|row| summary_from_row(row, pool)).collect()
    }

    /// Recompute every member's summary with the current settings and rebuild
    /// the pool total from scratch.
    pub async fn recalculate_all_summaries(
        &self,
        settings: &SaccoSettings,
        actor_id: &str,
    ) -> Result<Vec<MemberShareSummary>, AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE meta SET pool_deposits = '0.00' WHERE id = 1")
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE share_summaries SET total_deposits = '0.00'")
            .execute(&mut *tx)
            .await?;

        let ids: Vec<String> = sqlx::query("SELECT id FROM members WHERE role = ? ORDER BY full_name")
            .bind(Role::Member.as_str())
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .map(|r| r.try_get("id"))
            .collect::<Result<_, _>>()?;

        for id in &ids {
            recompute_summary(&mut tx, settings, id).await?;
        }

        log_activity(
            &mut tx,
            Some(actor_id),
            ActivityAction::SummariesRecalculated,
            format!("Recalculated {} member summaries", ids.len()),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(members = ids.len(), "Share summaries recalculated");
        self.list_share_summaries().await
    }

    // ==================== ELIGIBILITY ====================

    pub async fn loan_eligibility(
        &self,
        settings: &SaccoSettings,
        member_id: &str,
    ) -> Result<LoanEligibility, AppError> {
        let member = self.require_member(member_id).await?;
        let mut conn = self.pool.acquire().await?;
        eligibility_for(&mut conn, settings, &member).await
    }

    async fn require_ledger_member(&self, member_id: &str) -> Result<Member, AppError> {
        let member = self.require_member(member_id).await?;
        ensure_ledger_member(&member)?;
        Ok(member)
    }
}

pub(super) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(super) fn ensure_ledger_member(member: &Member) -> Result<(), AppError> {
    if member.role != Role::Member {
        return Err(AppError::Validation(format!(
            "{} is not a member account",
            member.email
        )));
    }
    Ok(())
}

async fn insert_share_capital(
    conn: &mut SqliteConnection,
    settings: &SaccoSettings,
    member: &Member,
    request: &RecordShareCapitalRequest,
    actor_id: &str,
) -> Result<ShareCapitalPayment, AppError> {
    let payment = ShareCapitalPayment {
        id: new_id(),
        member_id: member.id.clone(),
        amount: round_money(request.amount),
        transaction_date: request.transaction_date.unwrap_or_else(today),
        reference_number: request.reference_number.clone(),
        transaction_code: request.transaction_code.clone(),
        message: request.message.clone(),
        recorded_by: actor_id.to_string(),
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO share_capital_payments (id, member_id, amount, transaction_date, reference_number, transaction_code, message, recorded_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&payment.id)
    .bind(&payment.member_id)
    .bind(payment.amount.to_string())
    .bind(payment.transaction_date)
    .bind(&payment.reference_number)
    .bind(&payment.transaction_code)
    .bind(&payment.message)
    .bind(&payment.recorded_by)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;

    insert_transaction(
        conn,
        &NewTransaction {
            member_id: &payment.member_id,
            transaction_type: TransactionType::ShareCapital,
            amount: payment.amount,
            cost: Decimal::ZERO,
            reference_id: Some(&payment.id),
            description: format!("Share capital payment by {}", member.full_name),
            transaction_date: payment.transaction_date,
            recorded_by: Some(actor_id),
        },
    )
    .await?;
    recompute_summary(conn, settings, &member.id).await?;
    log_activity(
        conn,
        Some(actor_id),
        ActivityAction::ShareCapitalRecorded,
        format!("Recorded share capital of {} for {}", payment.amount, member.email),
    )
    .await?;

    Ok(payment)
}

async fn insert_contribution(
    conn: &mut SqliteConnection,
    settings: &SaccoSettings,
    member: &Member,
    request: &RecordContributionRequest,
    actor_id: &str,
    unique_per_month: bool,
) -> Result<MonthlyContribution, AppError> {
    let contribution = MonthlyContribution {
        id: new_id(),
        member_id: member.id.clone(),
        year: request.year,
        month: request.month,
        amount: round_money(request.amount),
        transaction_date: request.transaction_date.unwrap_or_else(today),
        reference_number: request.reference_number.clone(),
        transaction_code: request.transaction_code.clone(),
        message: request.message.clone(),
        recorded_by: actor_id.to_string(),
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO monthly_contributions (id, member_id, year, month, amount, transaction_date, reference_number, transaction_code, message, recorded_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&contribution.id)
    .bind(&contribution.member_id)
    .bind(contribution.year)
    .bind(contribution.month)
    .bind(contribution.amount.to_string())
    .bind(contribution.transaction_date)
    .bind(&contribution.reference_number)
    .bind(&contribution.transaction_code)
    .bind(&contribution.message)
    .bind(&contribution.recorded_by)
    .bind(contribution.created_at)
    .execute(&mut *conn)
    .await?;

    // Counted after the insert so two writers cannot both pass the check.
    if unique_per_month {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM monthly_contributions WHERE member_id = ? AND year = ? AND month = ?",
        )
        .bind(&member.id)
        .bind(request.year)
        .bind(request.month)
        .fetch_one(&mut *conn)
        .await?;
        let n: i64 = row.try_get("n")?;
        if n > 1 {
            return Err(AppError::Validation(format!(
                "A contribution for {}-{:02} is already recorded for {}",
                request.year, request.month, member.email
            )));
        }
    }

    insert_transaction(
        conn,
        &NewTransaction {
            member_id: &contribution.member_id,
            transaction_type: TransactionType::MonthlyContribution,
            amount: contribution.amount,
            cost: Decimal::ZERO,
            reference_id: Some(&contribution.id),
            description: format!(
                "Monthly contribution {}-{:02} by {}",
                contribution.year, contribution.month, member.full_name
            ),
            transaction_date: contribution.transaction_date,
            recorded_by: Some(actor_id),
        },
    )
    .await?;
    recompute_summary(conn, settings, &member.id).await?;
    log_activity(
        conn,
        Some(actor_id),
        ActivityAction::ContributionRecorded,
        format!(
            "Recorded contribution of {} for {}-{:02} for {}",
            contribution.amount, contribution.year, contribution.month, member.email
        ),
    )
    .await?;

    Ok(contribution)
}

/// Recompute one member's totals from their payments, store them, and move
/// the pool total by the change in their deposits.
pub(super) async fn recompute_summary(
    conn: &mut SqliteConnection,
    settings: &SaccoSettings,
    member_id: &str,
) -> Result<MemberShareSummary, AppError> {
    let share_rows = sqlx::query("SELECT amount FROM share_capital_payments WHERE member_id = ?")
        .bind(member_id)
        .fetch_all(&mut *conn)
        .await?;
    let share_capital = share_rows
        .iter()
        .map(|r| money(r, "amount"))
        .collect::<Result<Vec<_>, _>>()?;

    let contribution_rows =
        sqlx::query("SELECT year, amount FROM monthly_contributions WHERE member_id = ?")
            .bind(member_id)
            .fetch_all(&mut *conn)
            .await?;
    let contributions = contribution_rows
        .iter()
        .map(|r| {
            Ok(ContributionAmount {
                year: r.try_get("year")?,
                amount: money(r, "amount")?,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let figures = share_figures(
        settings,
        &share_capital,
        &contributions,
        i64::from(Utc::now().year()),
    );

    let previous = sqlx::query("SELECT total_deposits FROM share_summaries WHERE member_id = ?")
        .bind(member_id)
        .fetch_optional(&mut *conn)
        .await?;
    let previous_deposits = match &previous {
        Some(row) => money(row, "total_deposits")?,
        None => Decimal::ZERO,
    };

    sqlx::query(
        r#"
        INSERT INTO share_summaries (
            member_id, total_share_capital, share_capital_target,
            share_capital_completion_percentage, number_of_shares, total_contributions,
            current_year_contributions, previous_year_contributions, total_deposits, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(member_id) DO UPDATE SET
            total_share_capital = excluded.total_share_capital,
            share_capital_target = excluded.share_capital_target,
            share_capital_completion_percentage = excluded.share_capital_completion_percentage,
            number_of_shares = excluded.number_of_shares,
            total_contributions = excluded.total_contributions,
            current_year_contributions = excluded.current_year_contributions,
            previous_year_contributions = excluded.previous_year_contributions,
            total_deposits = excluded.total_deposits,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(member_id)
    .bind(figures.total_share_capital.to_string())
    .bind(figures.share_capital_target.to_string())
    .bind(figures.completion_percentage.to_string())
    .bind(figures.number_of_shares.to_string())
    .bind(figures.total_contributions.to_string())
    .bind(figures.current_year_contributions.to_string())
    .bind(figures.previous_year_contributions.to_string())
    .bind(figures.total_deposits.to_string())
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    adjust_pool(conn, figures.total_deposits - previous_deposits).await?;

    load_summary(conn, settings, member_id).await
}

pub(super) async fn load_summary(
    conn: &mut SqliteConnection,
    settings: &SaccoSettings,
    member_id: &str,
) -> Result<MemberShareSummary, AppError> {
    let pool = pool_total(conn).await?;
    let row = sqlx::query("SELECT * FROM share_summaries WHERE member_id = ?")
        .bind(member_id)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => summary_from_row(&row, pool),
        None => Ok(empty_summary(settings, member_id)),
    }
}

fn empty_summary(settings: &SaccoSettings, member_id: &str) -> MemberShareSummary {
    let figures = share_figures(settings, &[], &[], i64::from(Utc::now().year()));
    let zero = round_money(Decimal::ZERO);
    MemberShareSummary {
        member_id: member_id.to_string(),
        total_share_capital: figures.total_share_capital,
        share_capital_target: figures.share_capital_target,
        share_capital_completion_percentage: figures.completion_percentage,
        number_of_shares: figures.number_of_shares,
        total_contributions: figures.total_contributions,
        current_year_contributions: figures.current_year_contributions,
        previous_year_contributions: figures.previous_year_contributions,
        total_deposits: figures.total_deposits,
        percentage_of_total_pool: zero,
        total_dividends_received: zero,
        last_dividend_amount: zero,
        last_dividend_date: None,
        updated_at: Utc::now(),
    }
}

/// Eligibility of `member` from their stored summary and active loans.
pub(super) async fn eligibility_for(
    conn: &mut SqliteConnection,
    settings: &SaccoSettings,
    member: &Member,
) -> Result<LoanEligibility, AppError> {
    let summary = load_summary(conn, settings, &member.id).await?;
    let rows = sqlx::query("SELECT remaining_balance FROM loans WHERE member_id = ? AND status IN (?, ?)")
        .bind(&member.id)
        .bind(LoanStatus::Approved.as_str())
        .bind(LoanStatus::Disbursed.as_str())
        .fetch_all(&mut *conn)
        .await?;
    let balances = rows
        .iter()
        .map(|r| money(r, "remaining_balance"))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(loan_eligibility(
        settings,
        &EligibilityInput {
            member,
            total_deposits: summary.total_deposits,
            completion_percentage: summary.share_capital_completion_percentage,
            active_loan_balances: &balances,
        },
    ))
}

/// Sum of all recorded share capital and contributions across members.
pub(super) async fn ledger_totals(
    conn: &mut SqliteConnection,
) -> Result<(Decimal, Decimal), AppError> {
    let share_rows = sqlx::query("SELECT amount FROM share_capital_payments")
        .fetch_all(&mut *conn)
        .await?;
    let contribution_rows = sqlx::query("SELECT amount FROM monthly_contributions")
        .fetch_all(&mut *conn)
        .await?;
    Ok((
        sum_column(&share_rows, "amount")?,
        sum_column(&contribution_rows, "amount")?,
    ))
}

fn summary_from_row(row: &SqliteRow, pool: Decimal) -> Result<MemberShareSummary, AppError> {
    let total_deposits = money(row, "total_deposits")?;
    Ok(MemberShareSummary {
        member_id: row.try_get("member_id")?,
        total_share_capital: money(row, "total_share_capital")?,
        share_capital_target: money(row, "share_capital_target")?,
        share_capital_completion_percentage: money(row, "share_capital_completion_percentage")?,
        number_of_shares: money(row, "number_of_shares")?,
        total_contributions: money(row, "total_contributions")?,
        current_year_contributions: money(row, "current_year_contributions")?,
        previous_year_contributions: money(row, "previous_year_contributions")?,
        total_deposits,
        percentage_of_total_pool: pool_percentage(total_deposits, pool),
        total_dividends_received: money(row, "total_dividends_received")?,
        last_dividend_amount: money(row, "last_dividend_amount")?,
        last_dividend_date: row.try_get("last_dividend_date")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(super) fn share_capital_from_row(row: &SqliteRow) -> Result<ShareCapitalPayment, AppError> {
    Ok(ShareCapitalPayment {
        id: row.try_get("id")?,
        member_id: row.try_get("member_id")?,
        amount: money(row, "amount")?,
        transaction_date: row.try_get("transaction_date")?,
        reference_number: row.try_get("reference_number")?,
        transaction_code: row.try_get("transaction_code")?,
        message: row.try_get("message")?,
        recorded_by: row.try_get("recorded_by")?,
        created_at: row.try_get("created_at")?,
    })
}

pub(super) fn contribution_from_row(row: &SqliteRow) -> Result<MonthlyContribution, AppError> {
    Ok(MonthlyContribution {
        id: row.try_get("id")?,
        member_id: row.try_get("member_id")?,
        year: row.try_get("year")?,
        month: row.try_get("month")?,
        amount: money(row, "amount")?,
        transaction_date: row.try_get("transaction_date")?,
        reference_number: row.try_get("reference_number")?,
        transaction_code: row.try_get("transaction_code")?,
        message: row.try_get("message")?,
        recorded_by: row.try_get("recorded_by")?,
        created_at: row.try_get("created_at")?,
    })
}
