//! Share capital, monthly contributions and the derived member summary.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareCapitalPayment {
    pub id: String,
    pub member_id: String,
    pub amount: Decimal,
    pub transaction_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyContribution {
    pub id: String,
    pub member_id: String,
    pub year: i64,
    pub month: i64,
    pub amount: Decimal,
    pub transaction_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordShareCapitalRequest {
    pub member_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub transaction_date: Option<NaiveDate>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub transaction_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RecordShareCapitalRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_amount(self.amount)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkShareCapitalRequest {
    pub payments: Vec<RecordShareCapitalRequest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordContributionRequest {
    pub member_id: String,
    pub year: i64,
    pub month: i64,
    pub amount: Decimal,
    #[serde(default)]
    pub transaction_date: Option<NaiveDate>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub transaction_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RecordContributionRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_period(self.year, self.month)?;
        validate_amount(self.amount)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkContributionRequest {
    pub contributions: Vec<RecordContributionRequest>,
}

fn validate_amount(amount: Decimal) -> Result<(), AppError> {
    super::require_positive_money(amount, "Amount")
}

pub fn validate_period(year: i64, month: i64) -> Result<(), AppError> {
    if !(1..=12).contains(&month) {
        return Err(AppError::Validation(format!(
            "Month must be between 1 and 12, got {}",
            month
        )));
    }
    if year < 2000 {
        return Err(AppError::Validation(format!(
            "Year must be 2000 or later, got {}",
            year
        )));
    }
    Ok(())
}

/// Derived per-member totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberShareSummary {
    pub member_id: String,
    pub total_share_capital: Decimal,
    pub share_capital_target: Decimal,
    pub share_capital_completion_percentage: Decimal,
    pub number_of_shares: Decimal,
    pub total_contributions: Decimal,
    pub current_year_contributions: Decimal,
    pub previous_year_contributions: Decimal,
    pub total_deposits: Decimal,
    /// Derived on read from the running pool total
    pub percentage_of_total_pool: Decimal,
    pub total_dividends_received: Decimal,
    pub last_dividend_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_dividend_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodQuery {
    pub year: i64,
    pub month: i64,
}

/// An active member with no contribution for the requested month.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingContribution {
    pub member_id: String,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership_number: Option<String>,
    pub year: i64,
    pub month: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncompleteShareCapital {
    pub member_id: String,
    pub full_name: String,
    pub email: String,
    pub share_capital_term: i64,
    pub total_share_capital: Decimal,
    pub share_capital_target: Decimal,
    pub completion_percentage: Decimal,
    pub remaining_amount: Decimal,
}

/// Loan eligibility with the breakdown that produced it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanEligibility {
    pub member_id: String,
    pub eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub max_loan_amount: Decimal,
    pub deposits: Decimal,
    pub multiplier: Decimal,
    pub has_active_loans: bool,
    pub outstanding_loans: Decimal,
    pub share_capital_complete: bool,
    pub is_verified: bool,
    pub is_on_hold: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_period_bounds() {
        assert!(validate_period(2024, 1).is_ok());
        assert!(validate_period(2024, 12).is_ok());
        assert!(validate_period(2024, 0).is_err());
        assert!(validate_period(2024, 13).is_err());
        assert!(validate_period(1999, 6).is_err());
    }

    #[test]
    fn test_contribution_amount_must_be_positive() {
        let req = RecordContributionRequest {
            member_id: "m".into(),
            year: 2024,
            month: 3,
            amount: dec!(0),
            transaction_date: None,
            reference_number: None,
            transaction_code: None,
            message: None,
        };
        assert!(matches!(req.validate(), Err(AppError::Validation(_))));
    }
}
