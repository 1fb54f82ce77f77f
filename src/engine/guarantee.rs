//! Guarantee capacity of a member.

use rust_decimal::Decimal;

use super::money::{non_negative, round_money};
use crate::models::LoanStatus;

/// An accepted guarantee and the status of the loan it backs, if one exists yet.
#[derive(Debug, Clone, Copy)]
pub struct AcceptedGuarantee {
    pub amount: Decimal,
    pub loan_status: Option<LoanStatus>,
    /// The backing application is still PENDING review
    pub awaiting_review: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuaranteeCapacity {
    pub total_guaranteed: Decimal,
    pub active_guarantees: i64,
    pub maximum: Decimal,
    pub available: Decimal,
}

/// Contributions (share capital excluded) minus guarantees still committed
/// to APPROVED or DISBURSED loans, floored at zero.
pub fn guarantee_capacity(
    total_contributions: Decimal,
    accepted: &[AcceptedGuarantee],
) -> GuaranteeCapacity {
    let committed: Vec<Decimal> = accepted
        .iter()
        .filter(|g| g.loan_status.is_some_and(|s| s.is_active()))
        .map(|g| g.amount)
        .collect();

    let total_guaranteed = round_money(committed.iter().copied().sum());

    GuaranteeCapacity {
        total_guaranteed,
        active_guarantees: committed.len() as i64,
        maximum: round_money(total_contributions),
        available: round_money(non_negative(total_contributions - total_guaranteed)),
    }
}

/// Room left for accepting another guarantee. Acceptances on applications
/// still under review are held against capacity here, so a guarantor cannot
/// promise the same savings to several pending applications.
pub fn acceptance_headroom(capacity: &GuaranteeCapacity, accepted: &[AcceptedGuarantee]) -> Decimal {
    let reserved: Decimal = accepted
        .iter()
        .filter(|g| g.loan_status.is_none() && g.awaiting_review)
        .map(|g| g.amount)
        .sum();
    round_money(non_negative(capacity.available - reserved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn accepted(amount: Decimal, status: Option<LoanStatus>) -> AcceptedGuarantee {
        AcceptedGuarantee {
            amount,
            loan_status: status,
            awaiting_review: status.is_none(),
        }
    }

    #[test]
    fn test_only_active_loans_commit_capacity() {
        let cap = guarantee_capacity(
            dec!(10000),
            &[
                accepted(dec!(3000), Some(LoanStatus::Disbursed)),
                accepted(dec!(1000), Some(LoanStatus::Approved)),
                accepted(dec!(5000), Some(LoanStatus::Settled)),
                accepted(dec!(2000), None),
            ],
        );
        assert_eq!(cap.total_guaranteed, dec!(4000));
        assert_eq!(cap.active_guarantees, 2);
        assert_eq!(cap.maximum, dec!(10000));
        assert_eq!(cap.available, dec!(6000));
    }

    #[test]
    fn test_available_never_negative() {
        let cap = guarantee_capacity(
            dec!(1000),
            &[accepted(dec!(2500), Some(LoanStatus::Disbursed))],
        );
        assert_eq!(cap.available, Decimal::ZERO);
        assert_eq!(cap.total_guaranteed, dec!(2500));
    }

    #[test]
    fn test_pending_acceptances_reserve_headroom() {
        let held = [
            accepted(dec!(3000), None),
            accepted(dec!(1000), Some(LoanStatus::Disbursed)),
            AcceptedGuarantee {
                amount: dec!(4000),
                loan_status: None,
                awaiting_review: false,
            },
        ];
        let cap = guarantee_capacity(dec!(5000), &held);
        assert_eq!(cap.available, dec!(4000));
        assert_eq!(acceptance_headroom(&cap, &held), dec!(1000));

        let over = [held[0], accepted(dec!(3000), None)];
        let cap = guarantee_capacity(dec!(5000), &over);
        assert_eq!(acceptance_headroom(&cap, &over), Decimal::ZERO);
    }
}
