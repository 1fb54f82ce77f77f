//! Append-only activity log and typed transaction ledger.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

string_enum! {
    ActivityAction {
        MemberInvited => "MEMBER_INVITED",
        InvitationResent => "INVITATION_RESENT",
        InvitationAccepted => "INVITATION_ACCEPTED",
        MemberCreated => "MEMBER_CREATED",
        ProfileUpdated => "PROFILE_UPDATED",
        MemberVerification => "MEMBER_VERIFICATION",
        MemberHold => "MEMBER_HOLD",
        MemberActivation => "MEMBER_ACTIVATION",
        ShareCapitalTermChanged => "SHARE_CAPITAL_TERM_CHANGED",
        DocumentUploaded => "DOCUMENT_UPLOADED",
        DocumentVerified => "DOCUMENT_VERIFIED",
        SettingsUpdated => "SETTINGS_UPDATED",
        ShareCapitalRecorded => "SHARE_CAPITAL_RECORDED",
        ContributionRecorded => "CONTRIBUTION_RECORDED",
        SummariesRecalculated => "SUMMARIES_RECALCULATED",
        LoanApplied => "LOAN_APPLIED",
        LoanApplicationCancelled => "LOAN_APPLICATION_CANCELLED",
        LoanApproved => "LOAN_APPROVED",
        LoanRejected => "LOAN_REJECTED",
        LoanDisbursed => "LOAN_DISBURSED",
        LoanRepayment => "LOAN_REPAYMENT",
        LoanSettled => "LOAN_SETTLED",
        LoanDefaulted => "LOAN_DEFAULTED",
        GuarantorRequested => "GUARANTOR_REQUESTED",
        GuarantorResponded => "GUARANTOR_RESPONDED",
        GuarantorCancelled => "GUARANTOR_CANCELLED",
        DividendDeclared => "DIVIDEND_DECLARED",
        ExpenseRecorded => "EXPENSE_RECORDED",
        IncomeRecorded => "INCOME_RECORDED",
        MassEmail => "MASS_EMAIL",
        RemindersSent => "REMINDERS_SENT",
    }
}

string_enum! {
    TransactionType {
        ShareCapital => "SHARE_CAPITAL",
        MonthlyContribution => "MONTHLY_CONTRIBUTION",
        LoanDisbursement => "LOAN_DISBURSEMENT",
        LoanRepayment => "LOAN_REPAYMENT",
        DividendPayment => "DIVIDEND_PAYMENT",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    pub action: ActivityAction,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub member_id: String,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    /// Charges deducted at source (loan fees)
    pub cost: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    pub description: String,
    pub transaction_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for appending to the transaction ledger.
#[derive(Debug, Clone)]
pub struct NewTransaction<'a> {
    pub member_id: &'a str,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub cost: Decimal,
    pub reference_id: Option<&'a str>,
    pub description: String,
    pub transaction_date: NaiveDate,
    pub recorded_by: Option<&'a str>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityFilter {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFilter {
    #[serde(default, rename = "type")]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub member_id: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}
