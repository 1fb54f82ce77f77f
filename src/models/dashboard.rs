//! A member's one-page overview of their standing with the society.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use super::{
    DocumentType, Loan, Member, MemberDividend, MemberDocument, MemberShareSummary,
    MonthlyContribution, ShareCapitalPayment,
};

/// How many of the newest records the dashboard shows.
pub const RECENT_CONTRIBUTIONS: i64 = 12;
pub const RECENT_SHARE_CAPITAL: i64 = 10;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub fn month_name(month: i64) -> &'static str {
    usize::try_from(month - 1)
        .ok()
        .and_then(|i| MONTH_NAMES.get(i))
        .copied()
        .unwrap_or("")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentState {
    pub uploaded: bool,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChecklist {
    pub id_front: DocumentState,
    pub id_back: DocumentState,
    pub passport: DocumentState,
}

impl DocumentChecklist {
    pub fn from_documents(documents: &[MemberDocument]) -> Self {
        let state = |kind: DocumentType| {
            let mut of_kind = documents.iter().filter(|d| d.document_type == kind).peekable();
            let uploaded = of_kind.peek().is_some();
            DocumentState {
                uploaded,
                verified: of_kind.any(|d| d.is_verified),
            }
        };
        Self {
            id_front: state(DocumentType::IdFront),
            id_back: state(DocumentType::IdBack),
            passport: state(DocumentType::Passport),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextContributionDue {
    pub year: i64,
    pub month: i64,
    pub month_name: &'static str,
    pub is_current_month_paid: bool,
}

impl NextContributionDue {
    /// The current month until it is paid, then the month after.
    pub fn after(today: NaiveDate, current_month_paid: bool) -> Self {
        let (mut year, mut month) = (i64::from(today.year()), i64::from(today.month()));
        if current_month_paid {
            if month == 12 {
                year += 1;
                month = 1;
            } else {
                month += 1;
            }
        }
        Self {
            year,
            month,
            month_name: month_name(month),
            is_current_month_paid: current_month_paid,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDashboard {
    pub profile: Member,
    pub documents: DocumentChecklist,
    pub share_summary: MemberShareSummary,
    pub recent_contributions: Vec<MonthlyContribution>,
    pub next_contribution_due: NextContributionDue,
    pub recent_share_capital: Vec<ShareCapitalPayment>,
    /// APPROVED and DISBURSED loans
    pub active_loans: Vec<Loan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_dividend: Option<MemberDividend>,
}

/// Savings held by a member, share capital included.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberFinancialSummary {
    pub member_id: String,
    pub monthly_contributions: Decimal,
    pub share_capital: Decimal,
    pub total_investments: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn document(kind: DocumentType, verified: bool) -> MemberDocument {
        MemberDocument {
            id: "d".into(),
            member_id: "m".into(),
            document_type: kind,
            storage_ref: "s3://kyc/d".into(),
            is_verified: verified,
            uploaded_at: Utc::now(),
            verified_at: None,
            verified_by: None,
        }
    }

    #[test]
    fn test_document_checklist() {
        let docs = [
            document(DocumentType::IdFront, false),
            document(DocumentType::IdFront, true),
            document(DocumentType::IdBack, false),
            document(DocumentType::Other, true),
        ];
        let checklist = DocumentChecklist::from_documents(&docs);
        assert_eq!(checklist.id_front, DocumentState { uploaded: true, verified: true });
        assert_eq!(checklist.id_back, DocumentState { uploaded: true, verified: false });
        assert_eq!(checklist.passport, DocumentState::default());
    }

    #[test]
    fn test_next_due_rolls_over_year_end() {
        let dec = NaiveDate::from_ymd_opt(2025, 12, 10).unwrap();
        let due = NextContributionDue::after(dec, true);
        assert_eq!((due.year, due.month, due.month_name), (2026, 1, "January"));

        let unpaid = NextContributionDue::after(dec, false);
        assert_eq!((unpaid.year, unpaid.month), (2025, 12));
        assert!(!unpaid.is_current_month_paid);
    }

    #[test]
    fn test_month_name_out_of_range() {
        assert_eq!(month_name(3), "March");
        assert_eq!(month_name(0), "");
        assert_eq!(month_name(13), "");
    }
}
