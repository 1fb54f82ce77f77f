//! Member share aggregation and loan eligibility.

use rust_decimal::Decimal;

use super::money::{completion_percentage, percentage_of, round_money};
use crate::models::{LoanEligibility, Member, SaccoSettings};

/// A single contribution reduced to what aggregation needs.
#[derive(Debug, Clone, Copy)]
pub struct ContributionAmount {
    pub year: i64,
    pub amount: Decimal,
}

/// Totals derived from a member's payments.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareFigures {
    pub total_share_capital: Decimal,
    pub share_capital_target: Decimal,
    pub completion_percentage: Decimal,
    pub number_of_shares: Decimal,
    pub total_contributions: Decimal,
    pub current_year_contributions: Decimal,
    pub previous_year_contributions: Decimal,
    pub total_deposits: Decimal,
}

impl ShareFigures {
    pub fn is_share_capital_complete(&self) -> bool {
        self.completion_percentage >= super::money::HUNDRED
    }
}

/// Recompute a member's totals from their full payment history.
pub fn share_figures(
    settings: &SaccoSettings,
    share_capital: &[Decimal],
    contributions: &[ContributionAmount],
    current_year: i64,
) -> ShareFigures {
    let total_share_capital = round_money(share_capital.iter().copied().sum());
    let total_contributions = round_money(contributions.iter().map(|c| c.amount).sum());
    let year_total = |year: i64| {
        round_money(
            contributions
                .iter()
                .filter(|c| c.year == year)
                .map(|c| c.amount)
                .sum(),
        )
    };

    let share_value = settings.share_value;
    let number_of_shares = if share_value > Decimal::ZERO {
        round_money(total_share_capital / share_value)
    } else {
        round_money(Decimal::ZERO)
    };

    ShareFigures {
        total_share_capital,
        share_capital_target: round_money(share_value),
        completion_percentage: completion_percentage(total_share_capital, share_value),
        number_of_shares,
        total_contributions,
        current_year_contributions: year_total(current_year),
        previous_year_contributions: year_total(current_year - 1),
        total_deposits: round_money(total_share_capital + total_contributions),
    }
}

/// A member's share of the pool, in percent.
pub fn pool_percentage(member_deposits: Decimal, pool_total: Decimal) -> Decimal {
    percentage_of(member_deposits, pool_total)
}

/// Inputs for an eligibility decision.
#[derive(Debug, Clone)]
pub struct EligibilityInput<'a> {
    pub member: &'a Member,
    pub total_deposits: Decimal,
    pub completion_percentage: Decimal,
    /// Remaining balances of the member's APPROVED and DISBURSED loans
    pub active_loan_balances: &'a [Decimal],
}

/// Decide whether a member may borrow and how much.
///
/// Checks run in a fixed order and every failing check overwrites the reason,
/// so the last failing check is the one reported.
pub fn loan_eligibility(settings: &SaccoSettings, input: &EligibilityInput<'_>) -> LoanEligibility {
    let member = input.member;
    let multiplier = settings.maximum_loan_multiplier;
    let mut max_loan_amount = round_money(input.total_deposits * multiplier);

    let has_active_loans = !input.active_loan_balances.is_empty();
    let outstanding: Decimal = round_money(input.active_loan_balances.iter().copied().sum());

    let mut eligible = true;
    let mut reason = None;

    if has_active_loans {
        if outstanding >= max_loan_amount {
            eligible = false;
            reason = Some("You already have active loans that exceed your eligibility.".to_string());
        } else {
            max_loan_amount -= outstanding;
        }
    }

    let share_capital_complete = input.completion_percentage >= super::money::HUNDRED;
    if !share_capital_complete {
        eligible = false;
        reason = Some(
            "You must complete your share capital contribution before applying for a loan."
                .to_string(),
        );
    }

    if !member.is_verified {
        eligible = false;
        reason = Some("Your account must be fully verified before applying for a loan.".to_string());
    }

    if member.is_on_hold {
        eligible = false;
        reason = Some(format!(
            "Your account is currently on hold. Reason: {}",
            member.on_hold_reason.as_deref().unwrap_or("not given")
        ));
    }

    LoanEligibility {
        member_id: member.id.clone(),
        eligible,
        reason: if eligible { None } else { reason },
        max_loan_amount: if eligible {
            max_loan_amount
        } else {
            round_money(Decimal::ZERO)
        },
        deposits: input.total_deposits,
        multiplier,
        has_active_loans,
        outstanding_loans: outstanding,
        share_capital_complete,
        is_verified: member.is_verified,
        is_on_hold: member.is_on_hold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn member(verified: bool, on_hold: bool) -> Member {
        Member {
            id: "m1".into(),
            email: "m1@example.com".into(),
            full_name: "Member One".into(),
            phone_number: None,
            role: Role::Member,
            membership_number: None,
            is_active: true,
            is_verified: verified,
            is_on_hold: on_hold,
            on_hold_reason: on_hold.then(|| "arrears".to_string()),
            share_capital_term: 12,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            version: 1,
        }
    }

    fn contribution(year: i64, amount: Decimal) -> ContributionAmount {
        ContributionAmount { year, amount }
    }

    #[test]
    fn test_share_figures() {
        let settings = SaccoSettings::default();
        let figures = share_figures(
            &settings,
            &[dec!(2000), dec!(500)],
            &[
                contribution(2024, dec!(1000)),
                contribution(2024, dec!(1000)),
                contribution(2023, dec!(700)),
                contribution(2021, dec!(300)),
            ],
            2024,
        );
        assert_eq!(figures.total_share_capital, dec!(2500));
        assert_eq!(figures.completion_percentage, dec!(50));
        assert_eq!(figures.number_of_shares, dec!(0.5));
        assert_eq!(figures.total_contributions, dec!(3000));
        assert_eq!(figures.current_year_contributions, dec!(2000));
        assert_eq!(figures.previous_year_contributions, dec!(700));
        assert_eq!(figures.total_deposits, dec!(5500));
    }

    #[test]
    fn test_completion_clamped_at_hundred() {
        let settings = SaccoSettings::default();
        let figures = share_figures(&settings, &[dec!(9000)], &[], 2024);
        assert_eq!(figures.completion_percentage, dec!(100));
        assert!(figures.is_share_capital_complete());
    }

    #[test]
    fn test_zero_share_value_does_not_divide() {
        let settings = SaccoSettings {
            share_value: Decimal::ZERO,
            ..SaccoSettings::default()
        };
        let figures = share_figures(&settings, &[dec!(100)], &[], 2024);
        assert_eq!(figures.completion_percentage, Decimal::ZERO);
        assert_eq!(figures.number_of_shares, Decimal::ZERO);
    }

    #[test]
    fn test_pool_percentages_sum_to_hundred() {
        let deposits = [dec!(1000), dec!(2000), dec!(3000), dec!(333.33)];
        let pool: Decimal = deposits.iter().copied().sum();
        let total: Decimal = deposits.iter().map(|d| pool_percentage(*d, pool)).sum();
        assert!((total - dec!(100)).abs() <= dec!(0.04), "sum was {}", total);
        assert_eq!(pool_percentage(dec!(1000), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_eligible_member_gets_multiplied_deposits() {
        let settings = SaccoSettings::default();
        let m = member(true, false);
        let result = loan_eligibility(
            &settings,
            &EligibilityInput {
                member: &m,
                total_deposits: dec!(20000),
                completion_percentage: dec!(100),
                active_loan_balances: &[],
            },
        );
        assert!(result.eligible);
        assert_eq!(result.max_loan_amount, dec!(60000));
        assert!(result.reason.is_none());
    }

    #[test]
    fn test_outstanding_loans_reduce_limit() {
        let settings = SaccoSettings::default();
        let m = member(true, false);
        let result = loan_eligibility(
            &settings,
            &EligibilityInput {
                member: &m,
                total_deposits: dec!(20000),
                completion_percentage: dec!(100),
                active_loan_balances: &[dec!(15000)],
            },
        );
        assert!(result.eligible);
        assert!(result.has_active_loans);
        assert_eq!(result.max_loan_amount, dec!(45000));
        assert_eq!(result.outstanding_loans, dec!(15000));
    }

    #[test]
    fn test_outstanding_at_limit_is_ineligible() {
        let settings = SaccoSettings::default();
        let m = member(true, false);
        let result = loan_eligibility(
            &settings,
            &EligibilityInput {
                member: &m,
                total_deposits: dec!(10000),
                completion_percentage: dec!(100),
                active_loan_balances: &[dec!(30000)],
            },
        );
        assert!(!result.eligible);
        assert_eq!(result.max_loan_amount, Decimal::ZERO);
        assert!(result.reason.unwrap().contains("active loans"));
    }

    #[test]
    fn test_last_failing_check_wins() {
        let settings = SaccoSettings::default();
        let m = member(false, true);
        let result = loan_eligibility(
            &settings,
            &EligibilityInput {
                member: &m,
                total_deposits: dec!(1000000),
                completion_percentage: dec!(40),
                active_loan_balances: &[],
            },
        );
        assert!(!result.eligible);
        assert!(result.reason.unwrap().contains("on hold"));
        assert!(!result.share_capital_complete);

        let unverified = member(false, false);
        let result = loan_eligibility(
            &settings,
            &EligibilityInput {
                member: &unverified,
                total_deposits: dec!(1000000),
                completion_percentage: dec!(100),
                active_loan_balances: &[],
            },
        );
        assert!(result.reason.unwrap().contains("verified"));
    }

    #[test]
    fn test_incomplete_share_capital_is_ineligible_regardless_of_deposits() {
        let settings = SaccoSettings::default();
        let m = member(true, false);
        let result = loan_eligibility(
            &settings,
            &EligibilityInput {
                member: &m,
                total_deposits: dec!(10000000),
                completion_percentage: dec!(99.99),
                active_loan_balances: &[],
            },
        );
        assert!(!result.eligible);
        assert!(result.reason.unwrap().contains("share capital"));
    }
}
