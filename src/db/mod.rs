//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for all application data. Monetary values are
//! stored as decimal TEXT so no precision is lost on the way through.

mod books;
mod dashboard;
mod dividends;
mod guarantors;
mod invitations;
mod ledger;
mod loans;
mod members;
mod reports;
mod repository;
mod settings;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::models::SaccoSettings;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL DEFAULT 1,
            revision_id INTEGER NOT NULL DEFAULT 0,
            pool_deposits TEXT NOT NULL DEFAULT '0.00',
            generated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        INSERT OR IGNORE INTO meta (id, schema_version, revision_id, pool_deposits, generated_at)
        VALUES (1, 1, 0, '0.00', datetime('now'));
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            name TEXT NOT NULL,
            share_value TEXT NOT NULL,
            minimum_monthly_contribution TEXT NOT NULL,
            loan_interest_rate TEXT NOT NULL,
            maximum_loan_multiplier TEXT NOT NULL,
            loan_processing_fee_percentage TEXT NOT NULL,
            loan_insurance_percentage TEXT NOT NULL,
            maximum_loan_term_months INTEGER NOT NULL,
            dividend_calculation_method TEXT NOT NULL,
            contact_phone TEXT,
            contact_email TEXT,
            postal_address TEXT,
            physical_address TEXT,
            updated_at TEXT NOT NULL,
            updated_by TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    let defaults = SaccoSettings::default();
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO settings (
            id, name, share_value, minimum_monthly_contribution, loan_interest_rate,
            maximum_loan_multiplier, loan_processing_fee_percentage, loan_insurance_percentage,
            maximum_loan_term_months, dividend_calculation_method, updated_at
        ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&defaults.name)
    .bind(defaults.share_value.to_string())
    .bind(defaults.minimum_monthly_contribution.to_string())
    .bind(defaults.loan_interest_rate.to_string())
    .bind(defaults.maximum_loan_multiplier.to_string())
    .bind(defaults.loan_processing_fee_percentage.to_string())
    .bind(defaults.loan_insurance_percentage.to_string())
    .bind(defaults.maximum_loan_term_months)
    .bind(defaults.dividend_calculation_method.as_str())
    .bind(defaults.updated_at)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS members (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            phone_number TEXT,
            role TEXT NOT NULL,
            membership_number TEXT UNIQUE,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_verified INTEGER NOT NULL DEFAULT 0,
            is_on_hold INTEGER NOT NULL DEFAULT 0,
            on_hold_reason TEXT,
            share_capital_term INTEGER NOT NULL DEFAULT 12,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS invitations (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            otp TEXT NOT NULL,
            share_capital_term INTEGER NOT NULL,
            expires_at TEXT NOT NULL,
            is_used INTEGER NOT NULL DEFAULT 0,
            invited_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            used_at TEXT
        );

        CREATE TABLE IF NOT EXISTS member_documents (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL REFERENCES members(id),
            document_type TEXT NOT NULL,
            storage_ref TEXT NOT NULL,
            is_verified INTEGER NOT NULL DEFAULT 0,
            uploaded_at TEXT NOT NULL,
            verified_at TEXT,
            verified_by TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS share_capital_payments (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL REFERENCES members(id),
            amount TEXT NOT NULL,
            transaction_date TEXT NOT NULL,
            reference_number TEXT,
            transaction_code TEXT,
            message TEXT,
            recorded_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS monthly_contributions (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL REFERENCES members(id),
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            amount TEXT NOT NULL,
            transaction_date TEXT NOT NULL,
            reference_number TEXT,
            transaction_code TEXT,
            message TEXT,
            recorded_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS share_summaries (
            member_id TEXT PRIMARY KEY REFERENCES members(id),
            total_share_capital TEXT NOT NULL,
            share_capital_target TEXT NOT NULL,
            share_capital_completion_percentage TEXT NOT NULL,
            number_of_shares TEXT NOT NULL,
            total_contributions TEXT NOT NULL,
            current_year_contributions TEXT NOT NULL,
            previous_year_contributions TEXT NOT NULL,
            total_deposits TEXT NOT NULL,
            total_dividends_received TEXT NOT NULL DEFAULT '0.00',
            last_dividend_amount TEXT NOT NULL DEFAULT '0.00',
            last_dividend_date TEXT,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS loan_applications (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL REFERENCES members(id),
            amount TEXT NOT NULL,
            purpose TEXT NOT NULL,
            term_months INTEGER NOT NULL,
            status TEXT NOT NULL,
            application_date TEXT NOT NULL,
            reviewed_at TEXT,
            reviewed_by TEXT,
            rejection_reason TEXT,
            loan_id TEXT,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS loans (
            id TEXT PRIMARY KEY,
            application_id TEXT NOT NULL UNIQUE REFERENCES loan_applications(id),
            member_id TEXT NOT NULL REFERENCES members(id),
            principal_amount TEXT NOT NULL,
            interest_rate TEXT NOT NULL,
            term_months INTEGER NOT NULL,
            status TEXT NOT NULL,
            processing_fee TEXT NOT NULL,
            insurance_fee TEXT NOT NULL,
            disbursed_amount TEXT NOT NULL,
            total_expected_repayment TEXT NOT NULL,
            total_repaid TEXT NOT NULL,
            remaining_balance TEXT NOT NULL,
            approval_date TEXT,
            approved_by TEXT,
            disbursement_date TEXT,
            expected_completion_date TEXT,
            settled_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS repayment_schedule (
            id TEXT PRIMARY KEY,
            loan_id TEXT NOT NULL REFERENCES loans(id),
            installment_number INTEGER NOT NULL,
            due_date TEXT NOT NULL,
            principal_amount TEXT NOT NULL,
            interest_amount TEXT NOT NULL,
            amount_due TEXT NOT NULL,
            amount_paid TEXT NOT NULL,
            remaining_amount TEXT NOT NULL,
            status TEXT NOT NULL,
            paid_date TEXT,
            UNIQUE (loan_id, installment_number)
        );

        CREATE TABLE IF NOT EXISTS loan_repayments (
            id TEXT PRIMARY KEY,
            loan_id TEXT NOT NULL REFERENCES loans(id),
            amount TEXT NOT NULL,
            payment_date TEXT NOT NULL,
            reference_number TEXT,
            payment_method TEXT,
            notes TEXT,
            recorded_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS guarantor_requests (
            id TEXT PRIMARY KEY,
            application_id TEXT NOT NULL REFERENCES loan_applications(id),
            requester_id TEXT NOT NULL REFERENCES members(id),
            guarantor_id TEXT NOT NULL REFERENCES members(id),
            guarantee_amount TEXT NOT NULL,
            status TEXT NOT NULL,
            message TEXT,
            response_message TEXT,
            requested_at TEXT NOT NULL,
            responded_at TEXT
        );

        CREATE TABLE IF NOT EXISTS guarantor_limits (
            member_id TEXT PRIMARY KEY REFERENCES members(id),
            total_guaranteed TEXT NOT NULL,
            active_guarantees INTEGER NOT NULL,
            maximum_guarantee_amount TEXT NOT NULL,
            available_guarantee_amount TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dividend_distributions (
            id TEXT PRIMARY KEY,
            total_amount TEXT NOT NULL,
            distribution_date TEXT NOT NULL,
            source TEXT NOT NULL,
            description TEXT,
            calculation_method TEXT NOT NULL,
            recipients INTEGER NOT NULL,
            declared_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS member_dividends (
            id TEXT PRIMARY KEY,
            distribution_id TEXT NOT NULL REFERENCES dividend_distributions(id),
            member_id TEXT NOT NULL REFERENCES members(id),
            amount TEXT NOT NULL,
            weight_percentage TEXT NOT NULL,
            share_capital_basis TEXT NOT NULL,
            deposits_basis TEXT NOT NULL,
            distribution_date TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL,
            transaction_type TEXT NOT NULL,
            amount TEXT NOT NULL,
            cost TEXT NOT NULL DEFAULT '0.00',
            reference_id TEXT,
            description TEXT NOT NULL,
            transaction_date TEXT NOT NULL,
            recorded_by TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS activity_logs (
            id TEXT PRIMARY KEY,
            actor_id TEXT,
            action TEXT NOT NULL,
            description TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sacco_expenses (
            id TEXT PRIMARY KEY,
            expense_date TEXT NOT NULL,
            amount TEXT NOT NULL,
            description TEXT NOT NULL,
            category TEXT NOT NULL,
            payment_method TEXT NOT NULL,
            reference_number TEXT,
            transaction_cost TEXT NOT NULL DEFAULT '0.00',
            recorded_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sacco_income (
            id TEXT PRIMARY KEY,
            income_date TEXT NOT NULL,
            amount TEXT NOT NULL,
            description TEXT NOT NULL,
            category TEXT NOT NULL,
            payment_method TEXT NOT NULL,
            reference_number TEXT,
            recorded_by TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_invitations_email ON invitations(email);
        CREATE INDEX IF NOT EXISTS idx_documents_member ON member_documents(member_id);
        CREATE INDEX IF NOT EXISTS idx_share_capital_member ON share_capital_payments(member_id);
        CREATE INDEX IF NOT EXISTS idx_contributions_period ON monthly_contributions(member_id, year, month);
        CREATE INDEX IF NOT EXISTS idx_applications_member ON loan_applications(member_id);
        CREATE INDEX IF NOT EXISTS idx_loans_member ON loans(member_id);
        CREATE INDEX IF NOT EXISTS idx_loans_status ON loans(status);
        CREATE INDEX IF NOT EXISTS idx_schedule_due ON repayment_schedule(loan_id, due_date);
        CREATE INDEX IF NOT EXISTS idx_repayments_loan ON loan_repayments(loan_id);
        CREATE INDEX IF NOT EXISTS idx_guarantor_requests_guarantor ON guarantor_requests(guarantor_id);
        CREATE INDEX IF NOT EXISTS idx_member_dividends_member ON member_dividends(member_id);
        CREATE INDEX IF NOT EXISTS idx_transactions_member ON transactions(member_id);
        CREATE INDEX IF NOT EXISTS idx_activity_created ON activity_logs(created_at);
        CREATE INDEX IF NOT EXISTS idx_expenses_date ON sacco_expenses(expense_date);
        CREATE INDEX IF NOT EXISTS idx_income_date ON sacco_income(income_date);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
