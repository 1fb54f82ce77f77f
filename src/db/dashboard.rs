//! Member dashboard and personal financial summary.

use sqlx::Row;

use super::ledger::{contribution_from_row, ensure_ledger_member, share_capital_from_row, today};
use super::loans::loan_from_row;
use super::Repository;
use crate::engine::money::round_money;
use crate::errors::AppError;
use crate::models::{
    DocumentChecklist, LoanStatus, MemberDashboard, MemberFinancialSummary, NextContributionDue,
    SaccoSettings, RECENT_CONTRIBUTIONS, RECENT_SHARE_CAPITAL,
};

impl Repository {
    pub async fn member_dashboard(
        &self,
        settings: &SaccoSettings,
        member_id: &str,
    ) -> Result<MemberDashboard, AppError> {
        let member = self.require_member(member_id).await?;
        ensure_ledger_member(&member)?;

        let share_summary = self.get_share_summary(settings, member_id).await?;
        let documents = self.list_documents(member_id).await?;

        let recent_contributions = sqlx::query(
            "SELECT * FROM monthly_contributions WHERE member_id = ? ORDER BY year DESC, month DESC, created_at DESC LIMIT ?",
        )
        .bind(member_id)
        .bind(RECENT_CONTRIBUTIONS)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(contribution_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        let recent_share_capital = sqlx::query(
            "SELECT * FROM share_capital_payments WHERE member_id = ? ORDER BY transaction_date DESC, created_at DESC LIMIT ?",
        )
        .bind(member_id)
        .bind(RECENT_SHARE_CAPITAL)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(share_capital_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        let today = today();
        let next = NextContributionDue::after(today, false);
        let paid: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM monthly_contributions WHERE member_id = ? AND year = ? AND month = ?",
        )
        .bind(member_id)
        .bind(next.year)
        .bind(next.month)
        .fetch_one(&self.pool)
        .await?
        .try_get("n")?;

        let active_loans = sqlx::query(
            "SELECT * FROM loans WHERE member_id = ? AND status IN (?, ?) ORDER BY created_at DESC",
        )
        .bind(member_id)
        .bind(LoanStatus::Approved.as_str())
        .bind(LoanStatus::Disbursed.as_str())
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(loan_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        let latest_dividend = self.member_dividends(member_id).await?.into_iter().next();

        Ok(MemberDashboard {
            profile: member,
            documents: DocumentChecklist::from_documents(&documents),
            share_summary,
            recent_contributions,
            next_contribution_due: NextContributionDue::after(today, paid > 0),
            recent_share_capital,
            active_loans,
            latest_dividend,
        })
    }

    pub async fn member_financial_summary(
        &self,
        settings: &SaccoSettings,
        member_id: &str,
    ) -> Result<MemberFinancialSummary, AppError> {
        let member = self.require_member(member_id).await?;
        ensure_ledger_member(&member)?;
        let summary = self.get_share_summary(settings, member_id).await?;

        Ok(MemberFinancialSummary {
            member_id: member.id,
            monthly_contributions: summary.total_contributions,
            share_capital: summary.total_share_capital,
            total_investments: round_money(summary.total_contributions + summary.total_share_capital),
        })
    }
}
