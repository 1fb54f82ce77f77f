//! Flat-interest loan pricing and repayment schedule generation.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::money::{round_money, HUNDRED};
use crate::errors::AppError;
use crate::models::MAX_LOAN_TERM_MONTHS;

/// Installments fall due every 30 days after disbursement.
pub const INSTALLMENT_INTERVAL_DAYS: u64 = 30;

/// One row of a generated repayment schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct Installment {
    pub installment_number: i64,
    pub due_date: NaiveDate,
    pub principal_amount: Decimal,
    pub interest_amount: Decimal,
    pub amount_due: Decimal,
}

pub fn monthly_rate(annual_rate: Decimal) -> Decimal {
    annual_rate / HUNDRED / dec!(12)
}

/// `principal × (1 + monthly_rate × term)`, rounded to cents.
pub fn total_expected_repayment(principal: Decimal, annual_rate: Decimal, term_months: i64) -> Decimal {
    let rate = monthly_rate(annual_rate);
    round_money(principal + principal * rate * Decimal::from(term_months))
}

/// Due date of installment `n`.
pub fn due_date(disbursed_on: NaiveDate, n: i64) -> Result<NaiveDate, AppError> {
    let days = u64::try_from(n)
        .ok()
        .and_then(|n| n.checked_mul(INSTALLMENT_INTERVAL_DAYS))
        .ok_or_else(|| AppError::Validation(format!("Invalid installment number {}", n)))?;
    disbursed_on
        .checked_add_days(Days::new(days))
        .ok_or_else(|| AppError::Validation("Due date out of range".to_string()))
}

/// Build the schedule for a disbursed loan.
///
/// Each installment pays interest on the principal still outstanding plus
/// whatever is left of the level payment. All amounts are rounded to cents and
/// the final installment takes the exact remaining principal, so the principal
/// column always sums to `principal`.
pub fn generate_schedule(
    principal: Decimal,
    annual_rate: Decimal,
    term_months: i64,
    disbursed_on: NaiveDate,
) -> Result<Vec<Installment>, AppError> {
    if !(1..=MAX_LOAN_TERM_MONTHS).contains(&term_months) {
        return Err(AppError::Validation(format!(
            "Loan term must be between 1 and {} months",
            MAX_LOAN_TERM_MONTHS
        )));
    }
    let principal = round_money(principal);
    if principal <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Loan principal must be at least 0.01".to_string(),
        ));
    }
    if annual_rate < Decimal::ZERO {
        return Err(AppError::Validation(
            "Interest rate must not be negative".to_string(),
        ));
    }

    let rate = monthly_rate(annual_rate);
    let term = Decimal::from(term_months);
    let total_interest = principal * rate * term;
    let level_payment = (principal + total_interest) / term;

    let mut remaining = principal;
    let mut schedule = Vec::with_capacity(term_months as usize);

    for n in 1..=term_months {
        let interest = round_money(remaining * rate);
        let principal_part = if n == term_months {
            remaining
        } else {
            round_money((level_payment - interest).min(remaining).max(Decimal::ZERO))
        };
        remaining -= principal_part;

        schedule.push(Installment {
            installment_number: n,
            due_date: due_date(disbursed_on, n)?,
            principal_amount: principal_part,
            interest_amount: interest,
            amount_due: round_money(principal_part + interest),
        });
    }

    Ok(schedule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_total_expected_repayment() {
        // 10% a year for 12 months on 120,000 is 12,000 of interest.
        assert_eq!(
            total_expected_repayment(dec!(120000), dec!(10), 12),
            dec!(132000)
        );
        assert_eq!(total_expected_repayment(dec!(5000), dec!(0), 6), dec!(5000));
    }

    #[test]
    fn test_due_dates_step_thirty_days() {
        let schedule = generate_schedule(dec!(12000), dec!(12), 3, date(2024, 1, 31)).unwrap();
        assert_eq!(schedule[0].due_date, date(2024, 3, 1));
        assert_eq!(schedule[1].due_date, date(2024, 3, 31));
        assert_eq!(schedule[2].due_date, date(2024, 4, 30));
    }

    #[test]
    fn test_first_installment_breakdown() {
        // monthly rate 1%, level payment (12000 + 360) / 3 = 4120
        let schedule = generate_schedule(dec!(12000), dec!(12), 3, date(2024, 1, 1)).unwrap();
        assert_eq!(schedule[0].interest_amount, dec!(120.00));
        assert_eq!(schedule[0].principal_amount, dec!(4000.00));
        assert_eq!(schedule[0].amount_due, dec!(4120.00));
        assert_eq!(schedule[1].interest_amount, dec!(80.00));
        assert_eq!(schedule[1].principal_amount, dec!(4040.00));
        let last = schedule.last().unwrap();
        assert_eq!(last.principal_amount, dec!(3960.00));
        assert_eq!(last.amount_due, dec!(3999.60));
    }

    #[test]
    fn test_zero_interest_is_level() {
        let schedule = generate_schedule(dec!(1000), dec!(0), 3, date(2024, 1, 1)).unwrap();
        assert_eq!(schedule[0].amount_due, dec!(333.33));
        assert_eq!(schedule[1].amount_due, dec!(333.33));
        assert_eq!(schedule[2].amount_due, dec!(333.34));
        assert!(schedule.iter().all(|i| i.interest_amount.is_zero()));
    }

    #[test]
    fn test_rejects_zero_term() {
        assert!(matches!(
            generate_schedule(dec!(1000), dec!(10), 0, date(2024, 1, 1)),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_term_and_sub_cent_principal() {
        assert!(matches!(
            generate_schedule(dec!(1000), dec!(10), i64::MAX, date(2024, 1, 1)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            generate_schedule(dec!(0.004), dec!(10), 12, date(2024, 1, 1)),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_deterministic() {
        let a = generate_schedule(dec!(75000), dec!(13.5), 24, date(2024, 5, 5)).unwrap();
        let b = generate_schedule(dec!(75000), dec!(13.5), 24, date(2024, 5, 5)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_principal_sums_exactly_for_common_terms() {
        for term in [1, 12, 24, 36] {
            for rate in [dec!(0), dec!(7.25), dec!(10), dec!(18)] {
                let schedule = generate_schedule(dec!(100000), rate, term, date(2024, 1, 1)).unwrap();
                let sum: Decimal = schedule.iter().map(|i| i.principal_amount).sum();
                assert_eq!(sum, dec!(100000), "term {} rate {}", term, rate);
                assert_eq!(schedule.len() as i64, term);
            }
        }
    }

    proptest! {
        #[test]
        fn property_principal_column_sums_to_principal(
            cents in 100i64..1_000_000_000,
            rate_bps in 0i64..5000,
            term in 1i64..=60,
        ) {
            let principal = Decimal::new(cents, 2);
            let rate = Decimal::new(rate_bps, 2);
            let schedule = generate_schedule(principal, rate, term, date(2024, 1, 1)).unwrap();

            let sum: Decimal = schedule.iter().map(|i| i.principal_amount).sum();
            prop_assert_eq!(sum, principal);
            prop_assert!(schedule.iter().all(|i| i.principal_amount >= Decimal::ZERO));
            prop_assert!(schedule.iter().all(|i| i.amount_due == i.principal_amount + i.interest_amount));
        }
    }
}
