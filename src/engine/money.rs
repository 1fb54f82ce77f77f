//! Rounding and percentage helpers for monetary values.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

pub const HUNDRED: Decimal = dec!(100);

/// Round to cents, half away from zero, always carrying two decimal places.
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Round toward zero to cents. Used for partial shares of a fixed total so the
/// pieces never add up to more than the whole.
pub fn truncate_money(value: Decimal) -> Decimal {
    let mut truncated = value.round_dp_with_strategy(2, RoundingStrategy::ToZero);
    truncated.rescale(2);
    truncated
}

/// `part / whole × 100` rounded to two places; zero when `whole` is not positive.
pub fn percentage_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole <= Decimal::ZERO {
        return round_money(Decimal::ZERO);
    }
    round_money(part / whole * HUNDRED)
}

/// `amount × pct / 100` rounded to cents.
pub fn percent_of_amount(amount: Decimal, pct: Decimal) -> Decimal {
    round_money(amount * pct / HUNDRED)
}

/// Truncating variant of [`percentage_of`], capped at 100. Used where a value
/// just short of the target must not be reported as complete.
pub fn completion_percentage(paid: Decimal, target: Decimal) -> Decimal {
    if target <= Decimal::ZERO {
        return round_money(Decimal::ZERO);
    }
    let mut pct = (paid / target * HUNDRED)
        .min(HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::ToZero);
    pct.rescale(2);
    pct
}

/// Clamp at zero.
pub fn non_negative(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_money_half_away_from_zero() {
        assert_eq!(round_money(dec!(1.005)), dec!(1.01));
        assert_eq!(round_money(dec!(-1.005)), dec!(-1.01));
        assert_eq!(round_money(dec!(2.004)), dec!(2.00));
        assert_eq!(round_money(dec!(5000)).to_string(), "5000.00");
    }

    #[test]
    fn test_truncate_money_drops_fraction_of_a_cent() {
        assert_eq!(truncate_money(dec!(0.005)), dec!(0.00));
        assert_eq!(truncate_money(dec!(33.339)), dec!(33.33));
        assert_eq!(truncate_money(dec!(12)).to_string(), "12.00");
    }

    #[test]
    fn test_percentage_of_zero_whole() {
        assert_eq!(percentage_of(dec!(10), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(percentage_of(dec!(25), dec!(200)), dec!(12.5));
    }

    #[test]
    fn test_completion_is_capped_and_truncated() {
        assert_eq!(completion_percentage(dec!(7500), dec!(5000)), dec!(100));
        assert_eq!(completion_percentage(dec!(4999.99), dec!(5000)), dec!(99.99));
        assert_eq!(completion_percentage(dec!(2500), dec!(5000)), dec!(50));
        assert_eq!(completion_percentage(dec!(100), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_percent_of_amount() {
        assert_eq!(percent_of_amount(dec!(100000), dec!(1)), dec!(1000));
        assert_eq!(percent_of_amount(dec!(333.33), dec!(1.5)), dec!(5.00));
    }
}
