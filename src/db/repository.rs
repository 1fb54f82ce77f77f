//! Database repository shared plumbing.
//!
//! The `Repository` methods live in one file per resource group; this module
//! holds the pool, revision tracking and the helpers every group uses inside
//! its transactions.

use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::engine::money::round_money;
use crate::errors::AppError;
use crate::models::{ActivityAction, NewTransaction, RevisionInfo, Transaction};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("revision_id")?)
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.try_get("revision_id")?,
            generated_at: row.try_get("generated_at")?,
        })
    }

    /// Running total of every member's deposits.
    pub async fn pool_deposits(&self) -> Result<Decimal, AppError> {
        let mut conn = self.pool.acquire().await?;
        pool_total(&mut conn).await
    }
}

// ==================== TRANSACTION HELPERS ====================

/// Increment the revision ID and return the new value.
pub(super) async fn bump_revision(conn: &mut SqliteConnection) -> Result<i64, AppError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
        .bind(&now)
        .execute(&mut *conn)
        .await?;
    let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
        .fetch_one(&mut *conn)
        .await?;
    Ok(row.try_get("revision_id")?)
}

pub(super) async fn log_activity(
    conn: &mut SqliteConnection,
    actor_id: Option<&str>,
    action: ActivityAction,
    description: impl Into<String>,
) -> Result<(), AppError> {
    let description = description.into();
    sqlx::query(
        "INSERT INTO activity_logs (id, actor_id, action, description, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(new_id())
    .bind(actor_id)
    .bind(action.as_str())
    .bind(&description)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    tracing::debug!(action = %action, actor = ?actor_id, "{}", description);
    Ok(())
}

pub(super) async fn insert_transaction(
    conn: &mut SqliteConnection,
    new: &NewTransaction<'_>,
) -> Result<Transaction, AppError> {
    let transaction = Transaction {
        id: new_id(),
        member_id: new.member_id.to_string(),
        transaction_type: new.transaction_type,
        amount: round_money(new.amount),
        cost: round_money(new.cost),
        reference_id: new.reference_id.map(str::to_string),
        description: new.description.clone(),
        transaction_date: new.transaction_date,
        recorded_by: new.recorded_by.map(str::to_string),
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO transactions (id, member_id, transaction_type, amount, cost, reference_id, description, transaction_date, recorded_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&transaction.id)
    .bind(&transaction.member_id)
    .bind(transaction.transaction_type.as_str())
    .bind(transaction.amount.to_string())
    .bind(transaction.cost.to_string())
    .bind(&transaction.reference_id)
    .bind(&transaction.description)
    .bind(transaction.transaction_date)
    .bind(&transaction.recorded_by)
    .bind(transaction.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(transaction)
}

pub(super) async fn pool_total(conn: &mut SqliteConnection) -> Result<Decimal, AppError> {
    let row = sqlx::query("SELECT pool_deposits FROM meta WHERE id = 1")
        .fetch_one(&mut *conn)
        .await?;
    money(&row, "pool_deposits")
}

/// Apply a change in one member's deposits to the running pool total.
pub(super) async fn adjust_pool(conn: &mut SqliteConnection, delta: Decimal) -> Result<(), AppError> {
    if delta.is_zero() {
        return Ok(());
    }
    let next = round_money(pool_total(conn).await? + delta);
    sqlx::query("UPDATE meta SET pool_deposits = ? WHERE id = 1")
        .bind(next.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// ==================== ROW HELPERS ====================

pub(super) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Read a decimal stored as TEXT.
pub(super) fn money(row: &SqliteRow, column: &str) -> Result<Decimal, AppError> {
    let text: String = row.try_get(column)?;
    Ok(Decimal::from_str(&text)?)
}

/// Read an enum stored as its string code.
pub(super) fn code<T>(
    row: &SqliteRow,
    column: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<T, AppError> {
    let text: String = row.try_get(column)?;
    parse(&text).ok_or_else(|| {
        AppError::Database(format!("Unexpected value '{}' in column {}", text, column))
    })
}

/// Sum a single decimal TEXT column over a result set.
pub(super) fn sum_column(rows: &[SqliteRow], column: &str) -> Result<Decimal, AppError> {
    rows.iter()
        .map(|r| money(r, column))
        .sum::<Result<Decimal, AppError>>()
        .map(round_money)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_revision_starts_at_zero_and_bumps() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("t.sqlite")).await.unwrap();
        let repo = Repository::new(pool.clone());
        assert_eq!(repo.get_revision_id().await.unwrap(), 0);

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(bump_revision(&mut conn).await.unwrap(), 1);
        assert_eq!(repo.get_revision_id().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_pool_adjusts_by_delta() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("t.sqlite")).await.unwrap();
        let repo = Repository::new(pool.clone());

        let mut conn = pool.acquire().await.unwrap();
        adjust_pool(&mut conn, Decimal::new(150050, 2)).await.unwrap();
        adjust_pool(&mut conn, Decimal::new(-50, 2)).await.unwrap();
        drop(conn);

        assert_eq!(repo.pool_deposits().await.unwrap(), Decimal::new(1500, 0));
    }
}
