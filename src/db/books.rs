//! Society expenses and income.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::ledger::today;
use super::repository::{bump_revision, code, log_activity, money, new_id, sum_column};
use super::Repository;
use crate::engine::money::round_money;
use crate::errors::AppError;
use crate::models::{
    ActivityAction, BooksFilter, ExpenseCategory, IncomeCategory, RecordExpenseRequest,
    RecordIncomeRequest, SaccoExpense, SaccoIncome,
};

impl Repository {
    pub async fn record_expense(
        &self,
        request: &RecordExpenseRequest,
        actor_id: &str,
    ) -> Result<SaccoExpense, AppError> {
        request.validate()?;
        let expense = SaccoExpense {
            id: new_id(),
            expense_date: request.expense_date.unwrap_or_else(today),
            amount: round_money(request.amount),
            description: request.description.trim().to_string(),
            category: request.category,
            payment_method: request.payment_method.trim().to_string(),
            reference_number: request.reference_number.clone(),
            transaction_cost: round_money(request.transaction_cost.unwrap_or(Decimal::ZERO)),
            recorded_by: actor_id.to_string(),
            created_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO sacco_expenses (id, expense_date, amount, description, category, payment_method, reference_number, transaction_cost, recorded_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&expense.id)
        .bind(expense.expense_date)
        .bind(expense.amount.to_string())
        .bind(&expense.description)
        .bind(expense.category.as_str())
        .bind(&expense.payment_method)
        .bind(&expense.reference_number)
        .bind(expense.transaction_cost.to_string())
        .bind(&expense.recorded_by)
        .bind(expense.created_at)
        .execute(&mut *tx)
        .await?;
        log_activity(
            &mut tx,
            Some(actor_id),
            ActivityAction::ExpenseRecorded,
            format!("Recorded {} expense of {}", expense.category, expense.amount),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(expense)
    }

    /// Newest first.
    pub async fn list_expenses(&self, filter: &BooksFilter) -> Result<Vec<SaccoExpense>, AppError> {
        filter.validate()?;
        let category = match &filter.category {
            Some(c) => Some(ExpenseCategory::from_str(c).ok_or_else(|| {
                AppError::Validation(format!("Unknown expense category '{}'", c))
            })?),
            None => None,
        };
        let sql = books_sql("sacco_expenses", "expense_date", filter, category.is_some());
        let mut query = sqlx::query(&sql);
        if let Some(from) = filter.date_from {
            query = query.bind(from);
        }
        if let Some(to) = filter.date_to {
            query = query.bind(to);
        }
        if let Some(category) = category {
            query = query.bind(category.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(expense_from_row).collect()
    }

    pub async fn record_income(
        &self,
        request: &RecordIncomeRequest,
        actor_id: &str,
    ) -> Result<SaccoIncome, AppError> {
        request.validate()?;
        let income = SaccoIncome {
            id: new_id(),
            income_date: request.income_date.unwrap_or_else(today),
            amount: round_money(request.amount),
            description: request.description.trim().to_string(),
            category: request.category,
            payment_method: request.payment_method.trim().to_string(),
            reference_number: request.reference_number.clone(),
            recorded_by: actor_id.to_string(),
            created_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO sacco_income (id, income_date, amount, description, category, payment_method, reference_number, recorded_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&income.id)
        .bind(income.income_date)
        .bind(income.amount.to_string())
        .bind(&income.description)
        .bind(income.category.as_str())
        .bind(&income.payment_method)
        .bind(&income.reference_number)
        .bind(&income.recorded_by)
        .bind(income.created_at)
        .execute(&mut *tx)
        .await?;
        log_activity(
            &mut tx,
            Some(actor_id),
            ActivityAction::IncomeRecorded,
            format!("Recorded {} income of {}", income.category, income.amount),
        )
        .await?;
        bump_revision(&mut tx).await?;
        tx.commit().await?;

        Ok(income)
    }

    /// Newest first.
    pub async fn list_income(&self, filter: &BooksFilter) -> Result<Vec<SaccoIncome>, AppError> {
        filter.validate()?;
        let category = match &filter.category {
            Some(c) => Some(IncomeCategory::from_str(c).ok_or_else(|| {
                AppError::Validation(format!("Unknown income category '{}'", c))
            })?),
            None => None,
        };
        let sql = books_sql("sacco_income", "income_date", filter, category.is_some());
        let mut query = sqlx::query(&sql);
        if let Some(from) = filter.date_from {
            query = query.bind(from);
        }
        if let Some(to) = filter.date_to {
            query = query.bind(to);
        }
        if let Some(category) = category {
            query = query.bind(category.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(income_from_row).collect()
    }
}

/// `SELECT` over one of the books tables with the filter's optional clauses,
/// in bind order: date from, date to, category.
fn books_sql(table: &str, date_column: &str, filter: &BooksFilter, by_category: bool) -> String {
    let mut sql = format!("SELECT * FROM {} WHERE 1 = 1", table);
    if filter.date_from.is_some() {
        sql.push_str(&format!(" AND {} >= ?", date_column));
    }
    if filter.date_to.is_some() {
        sql.push_str(&format!(" AND {} <= ?", date_column));
    }
    if by_category {
        sql.push_str(" AND category = ?");
    }
    sql.push_str(&format!(" ORDER BY {} DESC, created_at DESC", date_column));
    sql
}

/// All other income and all operating expenses, transaction costs included.
pub(super) async fn books_totals(conn: &mut SqliteConnection) -> Result<(Decimal, Decimal), AppError> {
    let income_rows = sqlx::query("SELECT amount FROM sacco_income")
        .fetch_all(&mut *conn)
        .await?;
    let expense_rows = sqlx::query("SELECT amount, transaction_cost FROM sacco_expenses")
        .fetch_all(&mut *conn)
        .await?;
    let expenses =
        sum_column(&expense_rows, "amount")? + sum_column(&expense_rows, "transaction_cost")?;
    Ok((sum_column(&income_rows, "amount")?, round_money(expenses)))
}

fn expense_from_row(row: &SqliteRow) -> Result<SaccoExpense, AppError> {
    Ok(SaccoExpense {
        id: row.try_get("id")?,
        expense_date: row.try_get("expense_date")?,
        amount: money(row, "amount")?,
        description: row.try_get("description")?,
        category: code(row, "category", ExpenseCategory::from_str)?,
        payment_method: row.try_get("payment_method")?,
        reference_number: row.try_get("reference_number")?,
        transaction_cost: money(row, "transaction_cost")?,
        recorded_by: row.try_get("recorded_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn income_from_row(row: &SqliteRow) -> Result<SaccoIncome, AppError> {
    Ok(SaccoIncome {
        id: row.try_get("id")?,
        income_date: row.try_get("income_date")?,
        amount: money(row, "amount")?,
        description: row.try_get("description")?,
        category: code(row, "category", IncomeCategory::from_str)?,
        payment_method: row.try_get("payment_method")?,
        reference_number: row.try_get("reference_number")?,
        recorded_by: row.try_get("recorded_by")?,
        created_at: row.try_get("created_at")?,
    })
}
