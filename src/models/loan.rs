//! Loan applications, loans, repayment schedules and repayments.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;

string_enum! {
    ApplicationStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
        Cancelled => "CANCELLED",
    }
}

string_enum! {
    /// Lifecycle of a loan. SETTLED, REJECTED and DEFAULTED are terminal.
    LoanStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Disbursed => "DISBURSED",
        Settled => "SETTLED",
        Rejected => "REJECTED",
        Defaulted => "DEFAULTED",
    }
}

string_enum! {
    ScheduleStatus {
        Pending => "PENDING",
        Partial => "PARTIAL",
        Paid => "PAID",
        Overdue => "OVERDUE",
    }
}

string_enum! {
    /// Which installments a reminder batch targets.
    ReminderScope {
        Overdue => "OVERDUE",
        Upcoming => "UPCOMING",
        All => "ALL",
    }
}

impl LoanStatus {
    /// Loans whose balance still counts against the member.
    pub fn is_active(&self) -> bool {
        matches!(self, LoanStatus::Approved | LoanStatus::Disbursed)
    }
}

impl ScheduleStatus {
    pub fn is_outstanding(&self) -> bool {
        !matches!(self, ScheduleStatus::Paid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanApplication {
    pub id: String,
    pub member_id: String,
    pub amount: Decimal,
    pub purpose: String,
    pub term_months: i64,
    pub status: ApplicationStatus,
    pub application_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loan_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: String,
    pub application_id: String,
    pub member_id: String,
    pub principal_amount: Decimal,
    /// Annual rate in percent
    pub interest_rate: Decimal,
    pub term_months: i64,
    pub status: LoanStatus,
    pub processing_fee: Decimal,
    pub insurance_fee: Decimal,
    pub disbursed_amount: Decimal,
    pub total_expected_repayment: Decimal,
    pub total_repaid: Decimal,
    pub remaining_balance: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disbursement_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_completion_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub id: String,
    pub loan_id: String,
    pub installment_number: i64,
    pub due_date: NaiveDate,
    pub principal_amount: Decimal,
    pub interest_amount: Decimal,
    pub amount_due: Decimal,
    pub amount_paid: Decimal,
    pub remaining_amount: Decimal,
    pub status: ScheduleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanRepayment {
    pub id: String,
    pub loan_id: String,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub recorded_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanApplicationRequest {
    /// Set by an administrator applying on behalf of a member
    #[serde(default)]
    pub member_id: Option<String>,
    pub amount: Decimal,
    pub purpose: String,
    pub term_months: i64,
}

impl LoanApplicationRequest {
    pub fn validate(&self, maximum_term_months: i64) -> Result<(), AppError> {
        super::require_positive_money(self.amount, "Loan amount")?;
        if self.term_months < 1 || self.term_months > maximum_term_months {
            return Err(AppError::Validation(format!(
                "Loan term must be between 1 and {} months",
                maximum_term_months
            )));
        }
        if self.purpose.trim().is_empty() {
            return Err(AppError::Validation("Loan purpose is required".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveApplicationRequest {
    #[serde(default)]
    pub interest_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectApplicationRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisburseLoanRequest {
    #[serde(default)]
    pub disbursement_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRepaymentRequest {
    pub amount: Decimal,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Expected loan version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Result of recording a repayment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepaymentOutcome {
    pub repayment: LoanRepayment,
    pub loan: Loan,
    /// Schedule entries touched by this payment
    pub allocations: Vec<ScheduleEntry>,
    pub settled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanFilter {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub member_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanStatement {
    pub loan_id: String,
    pub member_id: String,
    pub status: LoanStatus,
    pub principal_amount: Decimal,
    pub interest_rate: Decimal,
    pub term_months: i64,
    pub total_expected_repayment: Decimal,
    pub total_repaid: Decimal,
    pub remaining_balance: Decimal,
    pub payoff_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_payment_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_payment_amount: Option<Decimal>,
    pub overdue_amount: Decimal,
    pub schedule: Vec<ScheduleEntry>,
    pub repayments: Vec<LoanRepayment>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueInstallment {
    pub installment_number: i64,
    pub due_date: NaiveDate,
    pub remaining_amount: Decimal,
    pub days_overdue: i64,
}

/// Outstanding installments of one loan that need attention.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanDue {
    pub loan_id: String,
    pub member_id: String,
    pub member_name: String,
    pub member_email: String,
    pub total_due: Decimal,
    pub earliest_due_date: NaiveDate,
    pub days_overdue: i64,
    pub installments: Vec<DueInstallment>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuePayments {
    pub overdue: Vec<LoanDue>,
    pub upcoming: Vec<LoanDue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderRequest {
    #[serde(default)]
    pub scope: Option<String>,
}

impl ReminderRequest {
    pub fn scope(&self) -> Result<ReminderScope, AppError> {
        match &self.scope {
            None => Ok(ReminderScope::All),
            Some(s) => ReminderScope::from_str(s).ok_or_else(|| {
                AppError::Validation(format!(
                    "Unknown reminder scope '{}', expected overdue, upcoming or all",
                    s
                ))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(amount: Decimal, term: i64, purpose: &str) -> LoanApplicationRequest {
        LoanApplicationRequest {
            member_id: None,
            amount,
            purpose: purpose.to_string(),
            term_months: term,
        }
    }

    #[test]
    fn test_application_validation() {
        assert!(request(dec!(1000), 12, "School fees").validate(36).is_ok());
        assert!(request(dec!(0), 12, "School fees").validate(36).is_err());
        assert!(request(dec!(0.004), 12, "School fees").validate(36).is_err());
        assert!(request(dec!(1000), 0, "School fees").validate(36).is_err());
        assert!(request(dec!(1000), 37, "School fees").validate(36).is_err());
        assert!(request(dec!(1000), 12, "  ").validate(36).is_err());
    }

    #[test]
    fn test_reminder_scope_parsing() {
        let req = ReminderRequest {
            scope: Some("overdue".into()),
        };
        assert_eq!(req.scope().unwrap(), ReminderScope::Overdue);
        assert_eq!(ReminderRequest::default().scope().unwrap(), ReminderScope::All);
        let bad = ReminderRequest {
            scope: Some("later".into()),
        };
        assert!(bad.scope().is_err());
    }

    #[test]
    fn test_active_statuses() {
        assert!(LoanStatus::Approved.is_active());
        assert!(LoanStatus::Disbursed.is_active());
        assert!(!LoanStatus::Settled.is_active());
    }
}
