//! Activity log, transaction ledger and the derived financial summary.

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::books::books_totals;
use super::ledger::ledger_totals;
use super::members::member_from_row;
use super::repository::{bump_revision, code, log_activity, money, sum_column};
use super::Repository;
use crate::engine::money::{non_negative, round_money};
use crate::errors::AppError;
use crate::models::{
    ActivityAction, ActivityFilter, ActivityLog, BatchOutcome, FinancialSummary, LoanStatus, Member, Role,
    Transaction, TransactionFilter, TransactionType,
};

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

impl Repository {
    /// Newest first.
    pub async fn list_activity(&self, filter: &ActivityFilter) -> Result<Vec<ActivityLog>, AppError> {
        let action = match &filter.action {
            Some(a) => Some(ActivityAction::from_str(a).ok_or_else(|| {
                AppError::Validation(format!("Unknown activity action '{}'", a))
            })?),
            None => None,
        };

        let mut sql = String::from("SELECT * FROM activity_logs WHERE 1 = 1");
        if action.is_some() {
            sql.push_str(" AND action = ?");
        }
        if filter.actor_id.is_some() {
            sql.push_str(" AND actor_id = ?");
        }
        sql.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(action) = action {
            query = query.bind(action.as_str());
        }
        if let Some(actor_id) = &filter.actor_id {
            query = query.bind(actor_id);
        }
        let rows = query
            .bind(clamp_limit(filter.limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(activity_from_row).collect()
    }

    pub async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, AppError> {
        let transaction_type = match &filter.transaction_type {
            Some(t) => Some(TransactionType::from_str(t).ok_or_else(|| {
                AppError::Validation(format!("Unknown transaction type '{}'", t))
            })?),
            None => None,
        };

        let mut sql = String::from("SELECT * FROM transactions WHERE 1 = 1");
        if transaction_type.is_some() {
            sql.push_str(" AND transaction_type = ?");
        }
        if filter.member_id.is_some() {
            sql.push_str(" AND member_id = ?");
        }
        sql.push_str(" ORDER BY transaction_date DESC, created_at DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(t) = transaction_type {
            query = query.bind(t.as_str());
        }
        if let Some(member_id) = &filter.member_id {
            query = query.bind(member_id);
        }
        let rows = query
            .bind(clamp_limit(filter.limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(transaction_from_row).collect()
    }

    /// Society-wide figures derived from the ledgers on every call.
    pub async fn financial_summary(&self) -> Result<FinancialSummary, AppError> {
        let mut conn = self.pool.acquire().await?;
        let (total_share_capital, total_contributions) = ledger_totals(&mut conn).await?;

        let loans = sqlx::query(
            "SELECT status, principal_amount, processing_fee, insurance_fee, remaining_balance FROM loans",
        )
        .fetch_all(&mut *conn)
        .await?;
        let mut outstanding = Decimal::ZERO;
        let mut disbursed_principal = Decimal::ZERO;
        let mut fees = Decimal::ZERO;
        for row in &loans {
            let status = code(row, "status", LoanStatus::from_str)?;
            // Loans that have ever been paid out.
            if matches!(
                status,
                LoanStatus::Disbursed | LoanStatus::Settled | LoanStatus::Defaulted
            ) {
                disbursed_principal += money(row, "principal_amount")?;
                fees += money(row, "processing_fee")? + money(row, "insurance_fee")?;
            }
            if status == LoanStatus::Disbursed {
                outstanding += money(row, "remaining_balance")?;
            }
        }

        let repayments = sqlx::query("SELECT amount FROM loan_repayments")
            .fetch_all(&mut *conn)
            .await?;
        let total_repaid = sum_column(&repayments, "amount")?;
        let dividend_rows = sqlx::query("SELECT amount FROM member_dividends")
            .fetch_all(&mut *conn)
            .await?;
        let dividends = sum_column(&dividend_rows, "amount")?;

        let (other_income, operating_expenses) = books_totals(&mut conn).await?;

        let counts = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(CASE WHEN is_active = 1 AND is_on_hold = 0 THEN 1 ELSE 0 END), 0) AS active FROM members WHERE role = ?",
        )
        .bind(Role::Member.as_str())
        .fetch_one(&mut *conn)
        .await?;

        let interest_income = round_money(non_negative(total_repaid - disbursed_principal));
        let fees_income = round_money(fees);
        let outstanding = round_money(outstanding);
        let cash_at_hand = round_money(
            total_share_capital + total_contributions + other_income
                - outstanding
                - dividends
                - operating_expenses,
        );
        let total_income = round_money(interest_income + fees_income + other_income);
        let total_expenses = round_money(dividends + operating_expenses);

        Ok(FinancialSummary {
            total_share_capital,
            total_contributions,
            outstanding_loans: outstanding,
            interest_income,
            fees_income,
            dividend_payments: dividends,
            other_income,
            operating_expenses,
            cash_at_hand,
            total_assets: round_money(cash_at_hand + outstanding),
            total_income,
            total_expenses,
            net_income: round_money(total_income - total_expenses),
            active_members: counts.try_get("active")?,
            total_members: counts.try_get("total")?,
        })
    }

    /// Active members for society-wide emails.
    pub async fn active_members(&self) -> Result<Vec<Member>, AppError> {
        let rows = sqlx::query(
            "SELECT * FROM members WHERE role = ? AND is_active = 1 ORDER BY full_name",
        )
        .bind(Role::Member.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(member_from_row).collect()
    }

    /// Record that an email batch went out.
    pub async fn record_batch(
        &self,
        action: ActivityAction,
        actor_id: &str,
        outcome: BatchOutcome,
        what: &str,
    ) -> Result<BatchOutcome, AppError> {
        let mut tx = self.pool.begin().await?;
        log_activity(
            &mut tx,
            Some(actor_id),
            action,
            format!(
                "Sent {}: {} delivered, {} failed",
                what, outcome.sent_count, outcome.failed_count
            ),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;
        Ok(outcome)
    }
}

fn activity_from_row(row: &SqliteRow) -> Result<ActivityLog, AppError> {
    Ok(ActivityLog {
        id: row.try_get("id")?,
        actor_id: row.try_get("actor_id")?,
        action: code(row, "action", ActivityAction::from_str)?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction, AppError> {
    Ok(Transaction {
        id: row.try_get("id")?,
        member_id: row.try_get("member_id")?,
        transaction_type: code(row, "transaction_type", TransactionType::from_str)?,
        amount: money(row, "amount")?,
        cost: money(row, "cost")?,
        reference_id: row.try_get("reference_id")?,
        description: row.try_get("description")?,
        transaction_date: row.try_get("transaction_date")?,
        recorded_by: row.try_get("recorded_by")?,
        created_at: row.try_get("created_at")?,
    })
}
