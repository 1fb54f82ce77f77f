//! Derived reports and batch notification results.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

/// Revision metadata for change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSummary {
    pub total_share_capital: Decimal,
    pub total_contributions: Decimal,
    pub outstanding_loans: Decimal,
    pub interest_income: Decimal,
    pub fees_income: Decimal,
    pub dividend_payments: Decimal,
    /// Recorded society income other than loan interest and fees
    pub other_income: Decimal,
    /// Recorded society expenses including their transaction costs
    pub operating_expenses: Decimal,
    pub cash_at_hand: Decimal,
    pub total_assets: Decimal,
    pub total_income: Decimal,
    pub total_expenses: Decimal,
    pub net_income: Decimal,
    pub active_members: i64,
    pub total_members: i64,
}

/// Counts returned by sequential, non-fatal email batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub sent_count: i64,
    pub failed_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MassEmailRequest {
    pub subject: String,
    pub message: String,
}

impl MassEmailRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.subject.trim().is_empty() || self.message.trim().is_empty() {
            return Err(AppError::Validation(
                "Subject and message are required".to_string(),
            ));
        }
        Ok(())
    }
}
