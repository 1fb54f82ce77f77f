//! Settings row.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::repository::{bump_revision, code, log_activity, money};
use super::Repository;
use crate::errors::AppError;
use crate::models::{ActivityAction, DividendMethod, SaccoSettings, UpdateSettingsRequest};

impl Repository {
    pub async fn get_settings(&self) -> Result<SaccoSettings, AppError> {
        let mut conn = self.pool.acquire().await?;
        load_settings(&mut conn).await
    }

    /// Partial update. Stored summaries are not recomputed.
    pub async fn update_settings(
        &self,
        request: &UpdateSettingsRequest,
        actor_id: &str,
    ) -> Result<SaccoSettings, AppError> {
        let mut tx = self.pool.begin().await?;
        let current = load_settings(&mut tx).await?;
        let mut next = request.apply_to(&current)?;
        next.updated_at = Utc::now();
        next.updated_by = Some(actor_id.to_string());

        sqlx::query(
            r#"
            UPDATE settings SET
                name = ?, share_value = ?, minimum_monthly_contribution = ?, loan_interest_rate = ?,
                maximum_loan_multiplier = ?, loan_processing_fee_percentage = ?,
                loan_insurance_percentage = ?, maximum_loan_term_months = ?,
                dividend_calculation_method = ?, contact_phone = ?, contact_email = ?,
                postal_address = ?, physical_address = ?, updated_at = ?, updated_by = ?
            WHERE id = 1
            "#,
        )
        .bind(&next.name)
        .bind(next.share_value.to_string())
        .bind(next.minimum_monthly_contribution.to_string())
        .bind(next.loan_interest_rate.to_string())
        .bind(next.maximum_loan_multiplier.to_string())
        .bind(next.loan_processing_fee_percentage.to_string())
        .bind(next.loan_insurance_percentage.to_string())
        .bind(next.maximum_loan_term_months)
        .bind(next.dividend_calculation_method.as_str())
        .bind(&next.contact_phone)
        .bind(&next.contact_email)
        .bind(&next.postal_address)
        .bind(&next.physical_address)
        .bind(next.updated_at)
        .bind(&next.updated_by)
        .execute(&mut *tx)
        .await?;

        log_activity(
            &mut tx,
            Some(actor_id),
            ActivityAction::SettingsUpdated,
            "Updated SACCO settings",
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        tracing::info!(actor = %actor_id, "Settings updated");
        Ok(next)
    }
}

pub(super) async fn load_settings(conn: &mut SqliteConnection) -> Result<SaccoSettings, AppError> {
    let row = sqlx::query("SELECT * FROM settings WHERE id = 1")
        .fetch_one(&mut *conn)
        .await?;
    settings_from_row(&row)
}

fn settings_from_row(row: &SqliteRow) -> Result<SaccoSettings, AppError> {
    Ok(SaccoSettings {
        name: row.try_get("name")?,
        share_value: money(row, "share_value")?,
        minimum_monthly_contribution: money(row, "minimum_monthly_contribution")?,
        loan_interest_rate: money(row, "loan_interest_rate")?,
        maximum_loan_multiplier: money(row, "maximum_loan_multiplier")?,
        loan_processing_fee_percentage: money(row, "loan_processing_fee_percentage")?,
        loan_insurance_percentage: money(row, "loan_insurance_percentage")?,
        maximum_loan_term_months: row.try_get("maximum_loan_term_months")?,
        dividend_calculation_method: code(row, "dividend_calculation_method", DividendMethod::from_str)?,
        contact_phone: row.try_get("contact_phone")?,
        contact_email: row.try_get("contact_email")?,
        postal_address: row.try_get("postal_address")?,
        physical_address: row.try_get("physical_address")?,
        updated_at: row.try_get("updated_at")?,
        updated_by: row.try_get("updated_by")?,
    })
}
