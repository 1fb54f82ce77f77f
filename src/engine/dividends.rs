//! Splitting a declared dividend across members.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::money::{round_money, truncate_money, HUNDRED};
use crate::errors::AppError;
use crate::models::DividendMethod;

/// What a member holds at declaration time.
#[derive(Debug, Clone)]
pub struct DividendBasis {
    pub member_id: String,
    pub share_capital: Decimal,
    pub deposits: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DividendShare {
    pub member_id: String,
    pub amount: Decimal,
    pub weight_percentage: Decimal,
    pub share_capital_basis: Decimal,
    pub deposits_basis: Decimal,
}

fn fraction(part: Decimal, whole: Decimal) -> Decimal {
    if whole > Decimal::ZERO {
        part / whole
    } else {
        Decimal::ZERO
    }
}

/// Allocate `total` in proportion to each member's weight under `method`.
///
/// `BOTH` weighs a member by the mean of their share-capital fraction and
/// their deposit fraction. Members with no weight are left out. Every share
/// but the last is truncated to cents and the last recipient takes the
/// remainder, so the allocations add up to `total` exactly and none is
/// negative.
pub fn allocate_dividend(
    total: Decimal,
    method: DividendMethod,
    bases: &[DividendBasis],
) -> Result<Vec<DividendShare>, AppError> {
    let total = round_money(total);
    if total <= Decimal::ZERO {
        return Err(AppError::Validation(
            "Dividend amount must be at least 0.01".to_string(),
        ));
    }

    let share_total: Decimal = bases.iter().map(|b| b.share_capital).sum();
    let deposit_total: Decimal = bases.iter().map(|b| b.deposits).sum();

    let weighted: Vec<(&DividendBasis, Decimal)> = bases
        .iter()
        .map(|b| {
            let weight = match method {
                DividendMethod::Shares => b.share_capital,
                DividendMethod::Deposits => b.deposits,
                DividendMethod::Both => {
                    (fraction(b.share_capital, share_total) + fraction(b.deposits, deposit_total))
                        / dec!(2)
                }
            };
            (b, weight)
        })
        .filter(|(_, w)| *w > Decimal::ZERO)
        .collect();

    let total_weight: Decimal = weighted.iter().map(|(_, w)| *w).sum();
    if total_weight <= Decimal::ZERO {
        return Err(AppError::Validation(
            "No member holds any weight under the configured dividend method".to_string(),
        ));
    }

    let mut allocated = Decimal::ZERO;
    let last = weighted.len() - 1;
    let mut shares = Vec::with_capacity(weighted.len());

    for (i, (basis, weight)) in weighted.into_iter().enumerate() {
        let frac = weight / total_weight;
        let amount = if i == last {
            round_money(total - allocated)
        } else {
            truncate_money(total * frac)
        };
        allocated += amount;
        shares.push(DividendShare {
            member_id: basis.member_id.clone(),
            amount,
            weight_percentage: round_money(frac * HUNDRED),
            share_capital_basis: basis.share_capital,
            deposits_basis: basis.deposits,
        });
    }

    Ok(shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn basis(id: &str, share_capital: Decimal, deposits: Decimal) -> DividendBasis {
        DividendBasis {
            member_id: id.to_string(),
            share_capital,
            deposits,
        }
    }

    #[test]
    fn test_shares_method_is_proportional() {
        let shares = allocate_dividend(
            dec!(1000),
            DividendMethod::Shares,
            &[basis("a", dec!(5000), dec!(9000)), basis("b", dec!(15000), dec!(1000))],
        )
        .unwrap();
        assert_eq!(shares[0].amount, dec!(250));
        assert_eq!(shares[1].amount, dec!(750));
        assert_eq!(shares[0].weight_percentage, dec!(25));
    }

    #[test]
    fn test_both_method_averages_fractions() {
        // a: 25% of shares, 90% of deposits => 57.5%
        let shares = allocate_dividend(
            dec!(1000),
            DividendMethod::Both,
            &[basis("a", dec!(5000), dec!(9000)), basis("b", dec!(15000), dec!(1000))],
        )
        .unwrap();
        assert_eq!(shares[0].amount, dec!(575));
        assert_eq!(shares[1].amount, dec!(425));
    }

    #[test]
    fn test_rounding_absorbed_by_last_recipient() {
        let shares = allocate_dividend(
            dec!(100),
            DividendMethod::Deposits,
            &[
                basis("a", dec!(0), dec!(1)),
                basis("b", dec!(0), dec!(1)),
                basis("c", dec!(0), dec!(1)),
            ],
        )
        .unwrap();
        let sum: Decimal = shares.iter().map(|s| s.amount).sum();
        assert_eq!(sum, dec!(100));
        assert_eq!(shares[0].amount, dec!(33.33));
        assert_eq!(shares[2].amount, dec!(33.34));
    }

    #[test]
    fn test_tiny_dividend_never_allocates_negative_amounts() {
        let bases: Vec<DividendBasis> = (0..6)
            .map(|i| basis(&format!("m{}", i), dec!(100), dec!(0)))
            .collect();
        let shares = allocate_dividend(dec!(0.03), DividendMethod::Shares, &bases).unwrap();

        assert!(shares.iter().all(|s| s.amount >= Decimal::ZERO));
        let sum: Decimal = shares.iter().map(|s| s.amount).sum();
        assert_eq!(sum, dec!(0.03));
        assert_eq!(shares[5].amount, dec!(0.03));
    }

    #[test]
    fn test_sub_cent_total_rejected() {
        assert!(matches!(
            allocate_dividend(dec!(0.004), DividendMethod::Shares, &[basis("a", dec!(1), dec!(1))]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_weight_members_excluded() {
        let shares = allocate_dividend(
            dec!(500),
            DividendMethod::Shares,
            &[basis("a", dec!(0), dec!(100)), basis("b", dec!(100), dec!(100))],
        )
        .unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].member_id, "b");
        assert_eq!(shares[0].amount, dec!(500));
    }

    #[test]
    fn test_zero_total_weight_rejected() {
        assert!(matches!(
            allocate_dividend(dec!(500), DividendMethod::Shares, &[basis("a", dec!(0), dec!(10))]),
            Err(AppError::Validation(_))
        ));
        assert!(allocate_dividend(dec!(500), DividendMethod::Both, &[]).is_err());
    }
}
