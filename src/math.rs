//! Fixed-point helpers shared by the AMM, clearing house and DNR math.
//!
//! Every validator must land on the same digits, so division always rounds
//! to [`PRECISION`] fractional digits with midpoint-to-even, and conversions to
//! coin amounts go through one of the three integer helpers below.

use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};

/// Fractional digits carried by every quotient.
pub const PRECISION: u32 = 18;

/// Division rounded to [`PRECISION`] digits. `None` on a zero divisor.
pub fn quo(numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    numerator
        .checked_div(denominator)
        .map(|q| q.round_dp_with_strategy(PRECISION, RoundingStrategy::MidpointNearestEven))
}

/// Product rounded to [`PRECISION`] digits. `None` when it leaves the `Decimal` range.
pub fn mul(a: Decimal, b: Decimal) -> Option<Decimal> {
    a.checked_mul(b)
        .map(|p| p.round_dp_with_strategy(PRECISION, RoundingStrategy::MidpointNearestEven))
}

pub fn sqrt(value: Decimal) -> Option<Decimal> {
    value
        .sqrt()
        .map(|r| r.round_dp_with_strategy(PRECISION, RoundingStrategy::MidpointNearestEven))
}

/// Banker's rounding to a whole coin amount.
pub fn round_int(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
}

pub fn ceil_int(value: Decimal) -> Decimal {
    value.ceil()
}

pub fn truncate_int(value: Decimal) -> Decimal {
    value.trunc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn quo_rounds_half_even() {
        assert_eq!(quo(dec!(1), dec!(3)).unwrap(), dec!(0.333333333333333333));
        assert_eq!(quo(dec!(2), dec!(3)).unwrap(), dec!(0.666666666666666667));
        assert!(quo(dec!(1), Decimal::ZERO).is_none());
    }

    #[test]
    fn mul_rounds_and_reports_overflow() {
        assert_eq!(mul(dec!(0.1), dec!(0.3)).unwrap(), dec!(0.03));
        assert_eq!(mul(dec!(10), dec!(1000)).unwrap(), dec!(10000));
        assert!(mul(dec!(10_000_000_000_000_000_000_000_000_000), dec!(10)).is_none());
        assert!(mul(Decimal::MAX, dec!(-2)).is_none());
    }

    #[test]
    fn integer_conversions() {
        assert_eq!(round_int(dec!(2.5)), dec!(2));
        assert_eq!(round_int(dec!(3.5)), dec!(4));
        assert_eq!(ceil_int(dec!(19.0001)), dec!(20));
        assert_eq!(ceil_int(dec!(-24.9)), dec!(-24));
        assert_eq!(truncate_int(dec!(9999.99)), dec!(9999));
    }

    #[test]
    fn sqrt_of_perfect_square() {
        assert_eq!(sqrt(dec!(10000)).unwrap(), dec!(100));
        assert!(sqrt(dec!(-1)).is_none());
    }
}
