//! Dividend declarations.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::repository::{bump_revision, code, insert_transaction, log_activity, money, new_id};
use super::Repository;
use crate::engine::dividends::{allocate_dividend, DividendBasis};
use crate::engine::money::round_money;
use crate::errors::AppError;
use crate::models::{
    ActivityAction, DeclareDividendRequest, DistributionDetail, DividendDistribution,
    DividendMethod, MemberDividend, NewTransaction, Role, SaccoSettings, TransactionType,
};

impl Repository {
    /// Declare a dividend and pay it out to active members in one transaction.
    pub async fn declare_dividend(
        &self,
        settings: &SaccoSettings,
        request: &DeclareDividendRequest,
        actor_id: &str,
    ) -> Result<DistributionDetail, AppError> {
        request.validate()?;

        let rows = sqlx::query(
            r#"
            SELECT m.id, s.total_share_capital, s.total_deposits
            FROM members m JOIN share_summaries s ON s.member_id = m.id
            WHERE m.role = ? AND m.is_active = 1
            ORDER BY m.created_at, m.id
            "#,
        )
        .bind(Role::Member.as_str())
        .fetch_all(&self.pool)
        .await?;
        let bases = rows
            .iter()
            .map(|row| {
                Ok(DividendBasis {
                    member_id: row.try_get("id")?,
                    share_capital: money(row, "total_share_capital")?,
                    deposits: money(row, "total_deposits")?,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        let method = settings.dividend_calculation_method;
        let shares = allocate_dividend(request.total_amount, method, &bases)?;

        let now = Utc::now();
        let distribution = DividendDistribution {
            id: new_id(),
            total_amount: round_money(request.total_amount),
            distribution_date: request
                .distribution_date
                .unwrap_or_else(|| now.date_naive()),
            source: request.source.trim().to_string(),
            description: request.description.clone(),
            calculation_method: method,
            recipients: shares.len() as i64,
            declared_by: actor_id.to_string(),
            created_at: now,
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO dividend_distributions (id, total_amount, distribution_date, source, description, calculation_method, recipients, declared_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&distribution.id)
        .bind(distribution.total_amount.to_string())
        .bind(distribution.distribution_date)
        .bind(&distribution.source)
        .bind(&distribution.description)
        .bind(distribution.calculation_method.as_str())
        .bind(distribution.recipients)
        .bind(&distribution.declared_by)
        .bind(distribution.created_at)
        .execute(&mut *tx)
        .await?;

        let mut allocations = Vec::with_capacity(shares.len());
        for share in shares {
            let allocation = MemberDividend {
                id: new_id(),
                distribution_id: distribution.id.clone(),
                member_id: share.member_id,
                amount: share.amount,
                weight_percentage: share.weight_percentage,
                share_capital_basis: share.share_capital_basis,
                deposits_basis: share.deposits_basis,
                distribution_date: distribution.distribution_date,
            };
            sqlx::query(
                "INSERT INTO member_dividends (id, distribution_id, member_id, amount, weight_percentage, share_capital_basis, deposits_basis, distribution_date) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&allocation.id)
            .bind(&allocation.distribution_id)
            .bind(&allocation.member_id)
            .bind(allocation.amount.to_string())
            .bind(allocation.weight_percentage.to_string())
            .bind(allocation.share_capital_basis.to_string())
            .bind(allocation.deposits_basis.to_string())
            .bind(allocation.distribution_date)
            .execute(&mut *tx)
            .await?;

            let row = sqlx::query(
                "SELECT total_dividends_received FROM share_summaries WHERE member_id = ?",
            )
            .bind(&allocation.member_id)
            .fetch_one(&mut *tx)
            .await?;
            let received = money(&row, "total_dividends_received")? + allocation.amount;
            sqlx::query(
                "UPDATE share_summaries SET total_dividends_received = ?, last_dividend_amount = ?, last_dividend_date = ?, updated_at = ? WHERE member_id = ?",
            )
            .bind(round_money(received).to_string())
            .bind(allocation.amount.to_string())
            .bind(allocation.distribution_date)
            .bind(now)
            .bind(&allocation.member_id)
            .execute(&mut *tx)
            .await?;

            insert_transaction(
                &mut tx,
                &NewTransaction {
                    member_id: &allocation.member_id,
                    transaction_type: TransactionType::DividendPayment,
                    amount: allocation.amount,
                    cost: Decimal::ZERO,
                    reference_id: Some(&distribution.id),
                    description: format!("Dividend from {}", distribution.source),
                    transaction_date: distribution.distribution_date,
                    recorded_by: Some(actor_id),
                },
            )
            .await?;
            allocations.push(allocation);
        }

        log_activity(
            &mut tx,
            Some(actor_id),
            ActivityAction::DividendDeclared,
            format!(
                "Declared dividend of {} across {} members ({})",
                distribution.total_amount, distribution.recipients, method
            ),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(
            distribution = %distribution.id,
            total = %distribution.total_amount,
            recipients = distribution.recipients,
            "Dividend declared"
        );
        Ok(DistributionDetail {
            distribution,
            allocations,
        })
    }

    pub async fn list_distributions(&self) -> Result<Vec<DividendDistribution>, AppError> {
        let rows = sqlx::query(
            "SELECT * FROM dividend_distributions ORDER BY distribution_date DESC, created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(distribution_from_row).collect()
    }

    pub async fn get_distribution(&self, id: &str) -> Result<DistributionDetail, AppError> {
        let row = sqlx::query("SELECT * FROM dividend_distributions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Dividend distribution", id))?;
        let distribution = distribution_from_row(&row)?;

        let rows = sqlx::query(
            "SELECT * FROM member_dividends WHERE distribution_id = ? ORDER BY rowid",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        let allocations = rows
            .iter()
            .map(member_dividend_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DistributionDetail {
            distribution,
            allocations,
        })
    }

    pub async fn member_dividends(&self, member_id: &str) -> Result<Vec<MemberDividend>, AppError> {
        let rows = sqlx::query(
            "SELECT * FROM member_dividends WHERE member_id = ? ORDER BY distribution_date DESC",
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(member_dividend_from_row).collect()
    }
}

fn distribution_from_row(row: &SqliteRow) -> Result<DividendDistribution, AppError> {
    Ok(DividendDistribution {
        id: row.try_get("id")?,
        total_amount: money(row, "total_amount")?,
        distribution_date: row.try_get("distribution_date")?,
        source: row.try_get("source")?,
        description: row.try_get("description")?,
        calculation_method: code(row, "calculation_method", DividendMethod::from_str)?,
        recipients: row.try_get("recipients")?,
        declared_by: row.try_get("declared_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn member_dividend_from_row(row: &SqliteRow) -> Result<MemberDividend, AppError> {
    Ok(MemberDividend {
        id: row.try_get("id")?,
        distribution_id: row.try_get("distribution_id")?,
        member_id: row.try_get("member_id")?,
        amount: money(row, "amount")?,
        weight_percentage: money(row, "weight_percentage")?,
        share_capital_basis: money(row, "share_capital_basis")?,
        deposits_basis: money(row, "deposits_basis")?,
        distribution_date: row.try_get("distribution_date")?,
    })
}
