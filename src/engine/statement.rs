//! Overdue detection, loan statements and due-payment grouping.

use chrono::{DateTime, Days, NaiveDate, Utc};
use rust_decimal::Decimal;

use super::money::round_money;
use crate::models::{
    DueInstallment, Loan, LoanDue, LoanRepayment, LoanStatement, ScheduleEntry, ScheduleStatus,
};

/// Flag PENDING entries whose due date has passed as OVERDUE. Returns the
/// indices that changed.
pub fn refresh_overdue(entries: &mut [ScheduleEntry], today: NaiveDate) -> Vec<usize> {
    let mut changed = Vec::new();
    for (i, entry) in entries.iter_mut().enumerate() {
        if entry.status == ScheduleStatus::Pending && entry.due_date < today {
            entry.status = ScheduleStatus::Overdue;
            changed.push(i);
        }
    }
    changed
}

fn outstanding(entries: &[ScheduleEntry]) -> impl Iterator<Item = &ScheduleEntry> {
    entries
        .iter()
        .filter(|e| e.status.is_outstanding() && e.remaining_amount > Decimal::ZERO)
}

pub fn build_statement(
    loan: &Loan,
    schedule: Vec<ScheduleEntry>,
    repayments: Vec<LoanRepayment>,
    today: NaiveDate,
    generated_at: DateTime<Utc>,
) -> LoanStatement {
    let next = outstanding(&schedule)
        .min_by_key(|e| (e.due_date, e.installment_number))
        .map(|e| (e.due_date, e.remaining_amount));
    let overdue_amount = round_money(
        outstanding(&schedule)
            .filter(|e| e.due_date < today)
            .map(|e| e.remaining_amount)
            .sum(),
    );

    LoanStatement {
        loan_id: loan.id.clone(),
        member_id: loan.member_id.clone(),
        status: loan.status,
        principal_amount: loan.principal_amount,
        interest_rate: loan.interest_rate,
        term_months: loan.term_months,
        total_expected_repayment: loan.total_expected_repayment,
        total_repaid: loan.total_repaid,
        remaining_balance: loan.remaining_balance,
        payoff_amount: loan.remaining_balance,
        next_payment_date: next.map(|(date, _)| date),
        next_payment_amount: next.map(|(_, amount)| amount),
        overdue_amount,
        schedule,
        repayments,
        generated_at,
    }
}

/// Who a due-payment group belongs to.
#[derive(Debug, Clone)]
pub struct DueOwner<'a> {
    pub loan_id: &'a str,
    pub member_id: &'a str,
    pub member_name: &'a str,
    pub member_email: &'a str,
}

fn group(owner: &DueOwner<'_>, installments: Vec<DueInstallment>) -> Option<LoanDue> {
    let earliest = installments.iter().map(|i| i.due_date).min()?;
    let days_overdue = installments.iter().map(|i| i.days_overdue).max().unwrap_or(0);
    Some(LoanDue {
        loan_id: owner.loan_id.to_string(),
        member_id: owner.member_id.to_string(),
        member_name: owner.member_name.to_string(),
        member_email: owner.member_email.to_string(),
        total_due: round_money(installments.iter().map(|i| i.remaining_amount).sum()),
        earliest_due_date: earliest,
        days_overdue,
        installments,
    })
}

/// Split a loan's outstanding entries into an overdue group and a group due
/// within `window_days` of `today`.
pub fn due_for_loan(
    owner: &DueOwner<'_>,
    entries: &[ScheduleEntry],
    today: NaiveDate,
    window_days: i64,
) -> (Option<LoanDue>, Option<LoanDue>) {
    let horizon = u64::try_from(window_days)
        .ok()
        .and_then(|days| today.checked_add_days(Days::new(days)))
        .unwrap_or(NaiveDate::MAX);
    let mut overdue = Vec::new();
    let mut upcoming = Vec::new();

    let mut sorted: Vec<&ScheduleEntry> = outstanding(entries).collect();
    sorted.sort_by_key(|e| (e.due_date, e.installment_number));

    for entry in sorted {
        let item = DueInstallment {
            installment_number: entry.installment_number,
            due_date: entry.due_date,
            remaining_amount: entry.remaining_amount,
            days_overdue: (today - entry.due_date).num_days().max(0),
        };
        if entry.due_date < today {
            overdue.push(item);
        } else if entry.due_date <= horizon {
            upcoming.push(item);
        }
    }

    (group(owner, overdue), group(owner, upcoming))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LoanStatus;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(n: i64, due: NaiveDate, remaining: Decimal, status: ScheduleStatus) -> ScheduleEntry {
        ScheduleEntry {
            id: format!("e{}", n),
            loan_id: "loan".into(),
            installment_number: n,
            due_date: due,
            principal_amount: dec!(1000),
            interest_amount: Decimal::ZERO,
            amount_due: dec!(1000),
            amount_paid: dec!(1000) - remaining,
            remaining_amount: remaining,
            status,
            paid_date: None,
        }
    }

    fn loan() -> Loan {
        Loan {
            id: "loan".into(),
            application_id: "app".into(),
            member_id: "m1".into(),
            principal_amount: dec!(3000),
            interest_rate: dec!(0),
            term_months: 3,
            status: LoanStatus::Disbursed,
            processing_fee: dec!(30),
            insurance_fee: dec!(30),
            disbursed_amount: dec!(2940),
            total_expected_repayment: dec!(3000),
            total_repaid: dec!(1400),
            remaining_balance: dec!(1600),
            approval_date: Some(date(2024, 1, 1)),
            approved_by: Some("admin".into()),
            disbursement_date: Some(date(2024, 1, 1)),
            expected_completion_date: Some(date(2024, 3, 31)),
            settled_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 3,
        }
    }

    #[test]
    fn test_refresh_overdue_only_touches_pending_past_due() {
        let mut entries = vec![
            entry(1, date(2024, 1, 31), dec!(0), ScheduleStatus::Paid),
            entry(2, date(2024, 3, 1), dec!(600), ScheduleStatus::Partial),
            entry(3, date(2024, 3, 10), dec!(1000), ScheduleStatus::Pending),
            entry(4, date(2024, 4, 10), dec!(1000), ScheduleStatus::Pending),
        ];
        let changed = refresh_overdue(&mut entries, date(2024, 3, 15));
        assert_eq!(changed, vec![2]);
        assert_eq!(entries[1].status, ScheduleStatus::Partial);
        assert_eq!(entries[2].status, ScheduleStatus::Overdue);
        assert_eq!(entries[3].status, ScheduleStatus::Pending);
    }

    #[test]
    fn test_statement_next_payment_and_overdue_amount() {
        let schedule = vec![
            entry(1, date(2024, 1, 31), dec!(0), ScheduleStatus::Paid),
            entry(2, date(2024, 3, 1), dec!(600), ScheduleStatus::Partial),
            entry(3, date(2024, 3, 31), dec!(1000), ScheduleStatus::Pending),
        ];
        let statement = build_statement(&loan(), schedule, Vec::new(), date(2024, 3, 15), Utc::now());
        assert_eq!(statement.next_payment_date, Some(date(2024, 3, 1)));
        assert_eq!(statement.next_payment_amount, Some(dec!(600)));
        assert_eq!(statement.overdue_amount, dec!(600));
        assert_eq!(statement.payoff_amount, dec!(1600));
    }

    #[test]
    fn test_due_for_loan_groups_by_window() {
        let entries = vec![
            entry(1, date(2024, 3, 1), dec!(1000), ScheduleStatus::Overdue),
            entry(2, date(2024, 3, 18), dec!(1000), ScheduleStatus::Pending),
            entry(3, date(2024, 4, 30), dec!(1000), ScheduleStatus::Pending),
        ];
        let owner = DueOwner {
            loan_id: "loan",
            member_id: "m1",
            member_name: "Member One",
            member_email: "m1@example.com",
        };
        let (overdue, upcoming) = due_for_loan(&owner, &entries, date(2024, 3, 15), 7);
        let overdue = overdue.unwrap();
        assert_eq!(overdue.days_overdue, 14);
        assert_eq!(overdue.total_due, dec!(1000));
        let upcoming = upcoming.unwrap();
        assert_eq!(upcoming.installments.len(), 1);
        assert_eq!(upcoming.earliest_due_date, date(2024, 3, 18));
    }

    #[test]
    fn test_nothing_due() {
        let entries = vec![entry(1, date(2024, 6, 1), dec!(1000), ScheduleStatus::Pending)];
        let owner = DueOwner {
            loan_id: "loan",
            member_id: "m1",
            member_name: "Member One",
            member_email: "m1@example.com",
        };
        let (overdue, upcoming) = due_for_loan(&owner, &entries, date(2024, 3, 15), 7);
        assert!(overdue.is_none());
        assert!(upcoming.is_none());
    }

    #[test]
    fn test_huge_window_does_not_overflow() {
        let entries = vec![entry(1, date(2030, 6, 1), dec!(1000), ScheduleStatus::Pending)];
        let owner = DueOwner {
            loan_id: "loan",
            member_id: "m1",
            member_name: "Member One",
            member_email: "m1@example.com",
        };
        let (_, upcoming) = due_for_loan(&owner, &entries, date(2024, 3, 15), i64::MAX);
        assert_eq!(upcoming.unwrap().installments.len(), 1);
    }
}
