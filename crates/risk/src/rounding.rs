// In crates/risk/src/rounding.rs

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places used when a field has no usable reference value.
pub const FALLBACK_DECIMALS: u32 = 3;

/// Decimal places shown by a field's current value.
///
/// Trailing zeros do not count, and a value with no fractional part falls
/// back to [`FALLBACK_DECIMALS`], so `"97.50"` gives 1 and `"100"` gives 3.
pub fn decimals_of(reference: Decimal) -> u32 {
    match reference.normalize().scale() {
        0 => FALLBACK_DECIMALS,
        scale => scale,
    }
}

/// Rounds a price half away from zero.
pub fn round_price(value: Decimal, decimals: Option<u32>) -> Decimal {
    value.round_dp_with_strategy(
        decimals.unwrap_or(FALLBACK_DECIMALS),
        RoundingStrategy::MidpointAwayFromZero,
    )
}

/// Rounds a quantity toward zero so a cap is never exceeded.
pub fn round_quantity(value: Decimal, decimals: Option<u32>) -> Decimal {
    value.round_dp_with_strategy(decimals.unwrap_or(FALLBACK_DECIMALS), RoundingStrategy::ToZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decimals_of_ignores_trailing_zeros() {
        assert_eq!(decimals_of(dec!(97.50)), 1);
        assert_eq!(decimals_of(dec!(0.00125)), 5);
        assert_eq!(decimals_of(dec!(100)), FALLBACK_DECIMALS);
        assert_eq!(decimals_of(dec!(0)), FALLBACK_DECIMALS);
    }

    #[test]
    fn test_round_price_goes_half_away_from_zero() {
        assert_eq!(round_price(dec!(1.2345), Some(3)), dec!(1.235));
        assert_eq!(round_price(dec!(1.25), Some(1)), dec!(1.3));
        assert_eq!(round_price(dec!(104.00049), None), dec!(104.000));
    }

    #[test]
    fn test_round_quantity_truncates() {
        assert_eq!(round_quantity(dec!(6.6669), Some(3)), dec!(6.666));
        assert_eq!(round_quantity(dec!(49.99), Some(0)), dec!(49));
    }
}
